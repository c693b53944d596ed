/// Outward summary of a connection state machine.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NetworkStatus {
    #[default]
    Idle,
    Connecting,
    Ready,
    Error,
    Off,
}

/// 3GPP registration status, as reported by `+CEREG`.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    #[default]
    None,
    NotRegistering,
    Home,
    Searching,
    Denied,
    OutOfCoverage,
    Roaming,
    SmsOnlyHome,
    SmsOnlyRoaming,
    Emergency,
}

impl From<u8> for Status {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::NotRegistering,
            1 => Self::Home,
            2 => Self::Searching,
            3 => Self::Denied,
            4 => Self::OutOfCoverage,
            5 => Self::Roaming,
            6 => Self::SmsOnlyHome,
            7 => Self::SmsOnlyRoaming,
            8 => Self::Emergency,
            _ => Self::None,
        }
    }
}

impl Status {
    /// Parse the `<stat>` field of a `+CEREG: <n>,<stat>[,...]` response.
    ///
    /// A response carrying a single field is taken to be the status itself.
    pub fn from_response(response: &str) -> Option<Self> {
        let (_, fields) = response.trim().split_once(':')?;
        let mut fields = fields.split(',').map(str::trim);
        let first = fields.next()?;
        let stat = fields.next().unwrap_or(first);
        stat.parse::<u8>().ok().map(Self::from)
    }

    pub fn registered(&self) -> bool {
        matches!(self, Status::Home | Status::Roaming | Status::Emergency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_is_the_second_field() {
        assert_eq!(Status::from_response("+CEREG: 0,1"), Some(Status::Home));
        assert_eq!(Status::from_response("+CEREG: 2,5,\"1A2B\",\"01A2B3C4\",7"), Some(Status::Roaming));
        assert_eq!(Status::from_response("+CEREG: 3"), Some(Status::Denied));
        assert_eq!(Status::from_response("+CEREG: 0,12"), Some(Status::None));
        assert_eq!(Status::from_response("garbage"), None);
    }

    #[test]
    fn registered_states() {
        assert!(Status::from(1).registered());
        assert!(Status::from(5).registered());
        assert!(Status::from(8).registered());
        assert!(!Status::from(2).registered());
        assert!(!Status::from(3).registered());
    }
}
