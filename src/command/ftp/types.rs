//! Argument and parameter types used by FTP Commands and Responses
use atat::atat_derive::AtatEnum;

/// `<op_code>` of `+UFTP`
#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FtpParameter {
    /// 0: FTP server IP address
    IpAddress = 0,
    /// 1: FTP server name
    ServerName = 1,
    /// 2: username
    Username = 2,
    /// 3: password
    Password = 3,
    /// 4: account
    Account = 4,
    /// 6: 0 active, 1 passive mode
    PassiveMode = 6,
    /// 7: FTP server port
    Port = 7,
}

/// `<op_code>` of `+UFTPC`, also reported back in `+UUFTPCR`
#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FtpOperation {
    Logout = 0,
    Login = 1,
    DeleteFile = 2,
    RenameFile = 3,
    /// Download from the server into the module's file system
    RetrieveFile = 4,
    /// Upload from the module's file system to the server
    StoreFile = 5,
    /// Download from the server over a direct link
    RetrieveDirect = 6,
    /// Upload to the server over a direct link
    StoreDirect = 7,
    ChangeDirectory = 8,
    CreateDirectory = 10,
    RemoveDirectory = 11,
}
