//! Argument and parameter types used by the certificate manager
use atat::atat_derive::AtatEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SecurityDataType {
    TrustedRootCA = 0,
    ClientCertificate = 1,
    ClientPrivateKey = 2,
}
