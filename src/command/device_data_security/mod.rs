//! ### 26 - SSL/TLS certificates and private keys manager
//!
pub mod types;

use atat::atat_derive::AtatCmd;
use types::SecurityDataType;

use super::NoResponse;

/// 26.1 SSL/TLS certificates and private keys manager +USECMNG
///
/// Imports a certificate or private key from a stream of `data_size` bytes
/// written after the `>` prompt. If an existing name is used the data is
/// overridden.
#[derive(Clone, AtatCmd)]
#[at_cmd("+USECMNG=0,", NoResponse, value_sep = false, timeout_ms = 10000)]
pub struct PrepareSecurityDataImport<'a> {
    #[at_arg(position = 0)]
    pub data_type: SecurityDataType,
    #[at_arg(position = 1, len = 200)]
    pub internal_name: &'a str,
    #[at_arg(position = 2)]
    pub data_size: usize,
}

/// 26.1 SSL/TLS certificates and private keys manager +USECMNG
///
/// Removes an imported certificate or private key.
#[derive(Clone, AtatCmd)]
#[at_cmd("+USECMNG=2,", NoResponse, value_sep = false)]
pub struct DeleteSecurityData<'a> {
    #[at_arg(position = 0)]
    pub data_type: SecurityDataType,
    #[at_arg(position = 1, len = 200)]
    pub internal_name: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use atat::AtatCmd;

    #[test]
    fn import_and_delete() {
        let mut buf = [0u8; 64];
        let len = PrepareSecurityDataImport {
            data_type: SecurityDataType::TrustedRootCA,
            internal_name: "root",
            data_size: 1200,
        }
        .write(&mut buf);
        assert_eq!(&buf[..len], b"AT+USECMNG=0,0,\"root\",1200\r\n");

        let len = DeleteSecurityData {
            data_type: SecurityDataType::ClientPrivateKey,
            internal_name: "key",
        }
        .write(&mut buf);
        assert_eq!(&buf[..len], b"AT+USECMNG=2,2,\"key\"\r\n");
    }
}
