//! Files on the module's user file system.
//!
//! Contents are stored hex encoded, two characters per byte, so binary data
//! survives the text based transfer commands. Sizes and offsets reported by
//! this module are in bytes of the original data.

use core::cell::RefCell;

use embassy_time::Duration;
use heapless::String;

use crate::command::file_system::{
    DeleteFile, GetFileSize, GetFreeSpace, ListFiles, PrepareDownloadFile, ReadBlock,
};
use crate::error::Error;
use crate::hex;
use crate::modem::Modem;
use crate::module_timing;
use crate::traits::{Clock, Transport};

/// Longest file name the module accepts.
pub const MAX_FILENAME_LEN: usize = 248;

/// Bytes hex encoded and written per chunk during a download.
const WRITE_CHUNK: usize = 64;

/// Upper bound for the bytes fetched by one `+URDBLOCK`.
const READ_CHUNK: usize = 128;

/// Room for `+URDBLOCK: "<name>",<size>,""` around the hex data.
const BLOCK_OVERHEAD: usize = 32;

pub struct FileUtils<'d, T, C, const N: usize>
where
    T: Transport,
    C: Clock,
{
    modem: &'d RefCell<Modem<'d, T, C, N>>,
    files: String<N>,
    count: usize,
}

impl<'d, T, C, const N: usize> FileUtils<'d, T, C, N>
where
    T: Transport,
    C: Clock,
{
    pub fn new(modem: &'d RefCell<Modem<'d, T, C, N>>) -> Self {
        Self {
            modem,
            files: String::new(),
            count: 0,
        }
    }

    /// Read the file list, retrying for up to 10 s while the file system
    /// is not ready yet.
    pub fn begin(&mut self) -> Result<(), Error> {
        let timeout = Duration::from_secs(10);
        let start = self.modem.try_borrow_mut()?.now();
        loop {
            match self.refresh() {
                Ok(()) => return Ok(()),
                Err(e) => debug!("File list not available: {:?}", e),
            }
            let mut modem = self.modem.try_borrow_mut()?;
            if modem.elapsed_since(start) >= timeout {
                return Err(Error::Timeout);
            }
            modem.delay(module_timing::poll_interval());
        }
    }

    /// Re-read the file list with `AT+ULSTFILE=0`.
    pub fn refresh(&mut self) -> Result<(), Error> {
        let cell = self.modem;
        let mut modem = cell.try_borrow_mut()?;
        let response = modem.request_text(&ListFiles)?;
        let list = response
            .split_once(':')
            .map_or("", |(_, list)| list.trim());

        self.files.clear();
        self.files.push_str(list).map_err(|_| Error::Overflow)?;
        self.count = names(&self.files).count();
        Ok(())
    }

    /// Number of files in the last list read.
    pub fn file_count(&self) -> usize {
        self.count
    }

    /// Names from the last list read.
    pub fn list_files(&self) -> impl Iterator<Item = &str> {
        names(&self.files)
    }

    pub fn exists(&mut self, filename: &str) -> Result<bool, Error> {
        self.refresh()?;
        Ok(self.list_files().any(|name| name == filename))
    }

    /// Store `data` in `filename`, replacing the file unless `append` is set.
    pub fn download_file(
        &mut self,
        filename: &str,
        data: &[u8],
        append: bool,
    ) -> Result<usize, Error> {
        if !append {
            if let Err(e) = self.delete_file(filename) {
                debug!("Nothing to replace in {:?}: {:?}", filename, e);
            }
        }

        {
            let mut modem = self.modem.try_borrow_mut()?;
            modem.send_cmd(&PrepareDownloadFile {
                filename,
                size: data.len() * 2,
            })?;
            modem.wait_for_prompt(module_timing::file_prompt_timeout())?;

            let mut wire = [0u8; 2 * WRITE_CHUNK];
            for chunk in data.chunks(WRITE_CHUNK) {
                let n = hex::encode_to_slice(chunk, &mut wire)?;
                modem.write(&wire[..n])?;
            }
            modem
                .wait_for_response(module_timing::file_prompt_timeout())?
                .into_result()?;
        }

        if !self.list_files().any(|name| name == filename) {
            self.refresh()?;
        }
        Ok(data.len())
    }

    /// Store `data` in a new file. An existing file is left alone and its
    /// size returned.
    pub fn create_file(&mut self, filename: &str, data: &[u8]) -> Result<usize, Error> {
        match self.file_size(filename) {
            Ok(size) if size > 0 => Ok(size),
            _ => self.download_file(filename, data, true),
        }
    }

    /// Read `filename` into `buf`, up to its length. Returns the number of
    /// bytes read.
    pub fn read_file(&mut self, filename: &str, buf: &mut [u8]) -> Result<usize, Error> {
        let size = self.file_size(filename)?.min(buf.len());
        let chunk = READ_CHUNK
            .min(N.saturating_sub(filename.len() + BLOCK_OVERHEAD) / 2)
            .max(1);

        let mut read = 0;
        while read < size {
            let len = chunk.min(size - read);
            let n = self.read_block(filename, read, &mut buf[read..read + len])?;
            if n == 0 {
                break;
            }
            read += n;
        }
        Ok(read)
    }

    /// Read `buf.len()` bytes of `filename` starting at byte `offset`.
    pub fn read_block(
        &mut self,
        filename: &str,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<usize, Error> {
        let mut modem = self.modem.try_borrow_mut()?;
        let response = modem.request_text(&ReadBlock {
            filename,
            offset: offset * 2,
            size: buf.len() * 2,
        })?;
        let data = block_data(response).ok_or(Error::Parse)?;
        Ok(hex::decode_to_slice(data.as_bytes(), buf)?)
    }

    /// Size of `filename` in bytes (`AT+ULSTFILE=2`).
    pub fn file_size(&mut self, filename: &str) -> Result<usize, Error> {
        let size = self
            .modem
            .try_borrow_mut()?
            .query(&GetFileSize { filename })?;
        Ok(size.size / 2)
    }

    /// Free space on the file system in bytes as stored, i.e. twice what a
    /// download can still hold.
    pub fn free_space(&mut self) -> Result<usize, Error> {
        Ok(self.modem.try_borrow_mut()?.query(&GetFreeSpace)?.size)
    }

    pub fn delete_file(&mut self, filename: &str) -> Result<(), Error> {
        self.modem
            .try_borrow_mut()?
            .request(&DeleteFile { filename })?;
        self.refresh()
    }

    /// Delete every listed file, returning how many were removed.
    pub fn delete_files(&mut self) -> Result<usize, Error> {
        let mut deleted = 0;
        for _ in 0..self.count {
            let Some(last) = self.list_files().last() else {
                break;
            };
            let mut name: String<MAX_FILENAME_LEN> = String::new();
            name.push_str(last).map_err(|_| Error::Overflow)?;
            self.delete_file(&name)?;
            deleted += 1;
        }
        Ok(deleted)
    }
}

/// File names of a `+ULSTFILE: "a","b"` list.
fn names(list: &str) -> impl Iterator<Item = &str> {
    list.split(',')
        .map(|name| name.trim().trim_matches('"'))
        .filter(|name| !name.is_empty())
}

/// Hex data of `+URDBLOCK: "<name>",<size>,"<data>"`.
fn block_data(response: &str) -> Option<&str> {
    let (_, rest) = response.split_once(':')?;
    let rest = rest.trim_start().strip_prefix('"')?;
    let (_name, rest) = rest.split_once('"')?;
    let (_size, data) = rest.strip_prefix(',')?.split_once(',')?;
    Some(data.trim().trim_matches('"'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{mock, Reply};
    use std::format;
    use std::rc::Rc;
    use std::string::{String as StdString, ToString};
    use std::vec::Vec;

    fn listing(files: &[StdString]) -> Reply {
        let quoted: Vec<StdString> = files.iter().map(|f| format!("\"{}\"", f)).collect();
        Reply::lines(&[&format!("+ULSTFILE: {}", quoted.join(","))])
    }

    #[test]
    fn list_and_lookup() {
        let (transport, clock, _state) = mock(|cmd| match cmd {
            "AT+ULSTFILE=0" => Reply::lines(&["+ULSTFILE: \"a.txt\",\"b.bin\""]),
            _ => Reply::ok(),
        });
        let modem = RefCell::new(Modem::<_, _>::new(transport, clock));
        let mut files = FileUtils::new(&modem);

        files.begin().unwrap();
        assert_eq!(files.file_count(), 2);
        assert_eq!(files.list_files().collect::<Vec<_>>(), ["a.txt", "b.bin"]);
        assert_eq!(files.exists("b.bin"), Ok(true));
        assert_eq!(files.exists("c.txt"), Ok(false));
    }

    #[test]
    fn empty_file_system() {
        let (transport, clock, _state) = mock(|cmd| match cmd {
            "AT+ULSTFILE=0" => Reply::lines(&["+ULSTFILE:"]),
            _ => Reply::ok(),
        });
        let modem = RefCell::new(Modem::<_, _>::new(transport, clock));
        let mut files = FileUtils::new(&modem);

        files.begin().unwrap();
        assert_eq!(files.file_count(), 0);
        assert_eq!(files.delete_files(), Ok(0));
    }

    #[test]
    fn download_writes_hex() {
        let (transport, clock, state) = mock(|cmd| match cmd {
            "AT+UDELFILE=\"cfg\"" => Reply::text("\r\n+CME ERROR: 1612\r\n"),
            "AT+UDWNFILE=\"cfg\",8" => Reply::prompt(8, "\r\nOK\r\n"),
            "AT+ULSTFILE=0" => Reply::lines(&["+ULSTFILE: \"cfg\""]),
            _ => Reply::ok(),
        });
        let modem = RefCell::new(Modem::<_, _>::new(transport, clock));
        let mut files = FileUtils::new(&modem);

        assert_eq!(files.download_file("cfg", &[0xDE, 0xAD, 0xBE, 0xEF], false), Ok(4));
        assert_eq!(state.borrow().payloads(), [b"DEADBEEF".to_vec()]);
        assert_eq!(
            state.borrow().commands(),
            ["AT+UDELFILE=\"cfg\"", "AT+UDWNFILE=\"cfg\",8", "AT+ULSTFILE=0"]
        );
        assert_eq!(files.file_count(), 1);
    }

    #[test]
    fn read_block_decodes_hex() {
        let (transport, clock, _state) = mock(|cmd| match cmd {
            "AT+URDBLOCK=\"cfg\",2,4" => Reply::lines(&["+URDBLOCK: \"cfg\",4,\"BEEF\""]),
            _ => Reply::ok(),
        });
        let modem = RefCell::new(Modem::<_, _>::new(transport, clock));
        let mut files = FileUtils::new(&modem);

        let mut buf = [0u8; 2];
        assert_eq!(files.read_block("cfg", 1, &mut buf), Ok(2));
        assert_eq!(buf, [0xBE, 0xEF]);
    }

    #[test]
    fn read_file_in_chunks() {
        let (transport, clock, state) = mock(|cmd| match cmd {
            "AT+ULSTFILE=2,\"big\"" => Reply::lines(&["+ULSTFILE: 600"]),
            "AT+URDBLOCK=\"big\",0,256" => {
                Reply::lines(&[&format!("+URDBLOCK: \"big\",256,\"{}\"", "AA".repeat(128))])
            }
            "AT+URDBLOCK=\"big\",256,256" => {
                Reply::lines(&[&format!("+URDBLOCK: \"big\",256,\"{}\"", "BB".repeat(128))])
            }
            "AT+URDBLOCK=\"big\",512,88" => {
                Reply::lines(&[&format!("+URDBLOCK: \"big\",88,\"{}\"", "CC".repeat(44))])
            }
            _ => Reply::error(),
        });
        let modem = RefCell::new(Modem::<_, _>::new(transport, clock));
        let mut files = FileUtils::new(&modem);

        let mut buf = [0u8; 400];
        assert_eq!(files.read_file("big", &mut buf), Ok(300));
        assert!(buf[..128].iter().all(|&b| b == 0xAA));
        assert!(buf[128..256].iter().all(|&b| b == 0xBB));
        assert!(buf[256..300].iter().all(|&b| b == 0xCC));
        assert_eq!(state.borrow().commands().len(), 4);
    }

    #[test]
    fn sizes() {
        let (transport, clock, _state) = mock(|cmd| match cmd {
            "AT+ULSTFILE=1" => Reply::lines(&["+ULSTFILE: 1048576"]),
            "AT+ULSTFILE=2,\"cfg\"" => Reply::lines(&["+ULSTFILE: 8"]),
            _ => Reply::ok(),
        });
        let modem = RefCell::new(Modem::<_, _>::new(transport, clock));
        let mut files = FileUtils::new(&modem);

        assert_eq!(files.free_space(), Ok(1_048_576));
        assert_eq!(files.file_size("cfg"), Ok(4));
        assert_eq!(files.create_file("cfg", b"ignored"), Ok(4));
    }

    #[test]
    fn delete_everything() {
        let stored = Rc::new(RefCell::new(std::vec!["a".to_string(), "b".to_string()]));
        let store = stored.clone();
        let (transport, clock, state) = mock(move |cmd| {
            if cmd == "AT+ULSTFILE=0" {
                return listing(&store.borrow());
            }
            if let Some(name) = cmd.strip_prefix("AT+UDELFILE=") {
                store.borrow_mut().retain(|f| format!("\"{}\"", f) != name);
            }
            Reply::ok()
        });
        let modem = RefCell::new(Modem::<_, _>::new(transport, clock));
        let mut files = FileUtils::new(&modem);

        files.refresh().unwrap();
        assert_eq!(files.delete_files(), Ok(2));
        assert!(stored.borrow().is_empty());
        assert_eq!(files.file_count(), 0);
        assert_eq!(
            state.borrow().commands(),
            [
                "AT+ULSTFILE=0",
                "AT+UDELFILE=\"b\"",
                "AT+ULSTFILE=0",
                "AT+UDELFILE=\"a\"",
                "AT+ULSTFILE=0"
            ]
        );
    }

    #[test]
    fn block_parsing() {
        assert_eq!(block_data("+URDBLOCK: \"a,b\",4,\"0A0B\""), Some("0A0B"));
        assert_eq!(block_data("+URDBLOCK: 4"), None);
    }
}
