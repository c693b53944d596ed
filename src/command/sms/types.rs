//! Argument and parameter types used by Short Messages Service Commands and Responses
use atat::atat_derive::AtatEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageFormat {
    Pdu = 0,
    Text = 1,
}

/// `<flag>` of `+CMGD`, selecting which messages beyond `<index>` are removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeleteFlag {
    /// 0: delete the message at `<index>` only
    Index = 0,
    /// 1: delete all read messages
    Read = 1,
    /// 2: delete all read and sent messages
    ReadAndSent = 2,
    /// 3: delete all read, sent and unsent messages
    ReadSentAndUnsent = 3,
    /// 4: delete all messages
    All = 4,
}
