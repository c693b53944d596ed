//! ### 22 - File System
//!
//! File contents travel as hex text; `+URDBLOCK` answers with a quoted block
//! that is read from the response text.
pub mod responses;

use atat::atat_derive::AtatCmd;
use responses::FileSystemSize;

use super::NoResponse;

/// 22.2 Download file +UDWNFILE
///
/// Stores (writes) a file into the file system. The stream of bytes can be
/// entered after the '>' prompt has been provided. If the file already exists,
/// the data is appended. If the data transfer stops, after 20 s the command is
/// stopped and an error result code is returned.
#[derive(Clone, AtatCmd)]
#[at_cmd("+UDWNFILE", NoResponse, timeout_ms = 20000)]
pub struct PrepareDownloadFile<'a> {
    #[at_arg(position = 0, len = 248)]
    pub filename: &'a str,
    #[at_arg(position = 1)]
    pub size: usize,
}

/// 22.3 List files information +ULSTFILE
///
/// Lists the stored files as `+ULSTFILE: "a","b",...`.
#[derive(Clone, AtatCmd)]
#[at_cmd("+ULSTFILE=0", NoResponse)]
pub struct ListFiles;

/// 22.3 List files information +ULSTFILE
///
/// Free space on the user file system, in bytes.
#[derive(Clone, AtatCmd)]
#[at_cmd("+ULSTFILE=1", FileSystemSize)]
pub struct GetFreeSpace;

/// 22.3 List files information +ULSTFILE
///
/// Size of the given file, in bytes.
#[derive(Clone, AtatCmd)]
#[at_cmd("+ULSTFILE=2,", FileSystemSize, value_sep = false)]
pub struct GetFileSize<'a> {
    #[at_arg(position = 0, len = 248)]
    pub filename: &'a str,
}

/// 22.5 Partial read file +URDBLOCK
///
/// Reads `size` bytes starting at `offset`.
#[derive(Clone, AtatCmd)]
#[at_cmd("+URDBLOCK", NoResponse, timeout_ms = 10000)]
pub struct ReadBlock<'a> {
    #[at_arg(position = 0, len = 248)]
    pub filename: &'a str,
    #[at_arg(position = 1)]
    pub offset: usize,
    #[at_arg(position = 2)]
    pub size: usize,
}

/// 22.6 Delete file +UDELFILE
#[derive(Clone, AtatCmd)]
#[at_cmd("+UDELFILE", NoResponse, timeout_ms = 10000)]
pub struct DeleteFile<'a> {
    #[at_arg(position = 0, len = 248)]
    pub filename: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use atat::AtatCmd;

    #[test]
    fn file_size_query() {
        let mut buf = [0u8; 64];
        let len = GetFileSize { filename: "log.txt" }.write(&mut buf);
        assert_eq!(&buf[..len], b"AT+ULSTFILE=2,\"log.txt\"\r\n");

        let size = GetFileSize { filename: "log.txt" }
            .parse(Ok(b"+ULSTFILE: 42"))
            .unwrap();
        assert_eq!(size.size, 42);
    }

    #[test]
    fn read_block() {
        let mut buf = [0u8; 64];
        let len = ReadBlock {
            filename: "a",
            offset: 8,
            size: 64,
        }
        .write(&mut buf);
        assert_eq!(&buf[..len], b"AT+URDBLOCK=\"a\",8,64\r\n");
    }
}
