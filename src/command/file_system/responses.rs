//! Responses for File System Commands
use atat::atat_derive::AtatResp;

/// 22.3 List files information +ULSTFILE
#[derive(Debug, Clone, AtatResp)]
pub struct FileSystemSize {
    #[at_arg(position = 0)]
    pub size: usize,
}
