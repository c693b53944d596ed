//! ### 18 - Packet Switched Data Services Commands
//!
//! A PDP context can be either primary or secondary. In LTE, PS data
//! connections are referred to as EPS bearers: EPS bearers are conceptually
//! equivalent to the legacy PDP contexts. The initial EPS bearer established
//! during LTE attach procedure is actually a default EPS bearer.
pub mod types;

use atat::atat_derive::AtatCmd;
use types::{AuthenticationType, ContextId, GPRSAttachedState, PowerSavingMode};

use super::NoResponse;

/// 18.4 PDP context definition +CGDCONT
///
/// Defines the connection parameters for a PDP context, identified by the local
/// context identification parameter <cid>. Each context is permanently stored
/// so that its definition is persistent over power cycles.
#[derive(Clone, AtatCmd)]
#[at_cmd("+CGDCONT", NoResponse)]
pub struct SetPDPContextDefinition<'a> {
    #[at_arg(position = 0)]
    pub cid: ContextId,
    #[at_arg(position = 1, len = 6)]
    pub pdp_type: &'a str,
    #[at_arg(position = 2, len = 99)]
    pub apn: &'a str,
}

/// 18.14 GPRS attach or detach +CGATT
///
/// Register (attach) the MT to, or deregister (detach) the MT from the GPRS
/// service.
#[derive(Clone, AtatCmd)]
#[at_cmd("+CGATT", NoResponse, timeout_ms = 180000)]
pub struct SetGPRSAttached {
    #[at_arg(position = 0)]
    pub state: GPRSAttachedState,
}

/// 18.16 PDP context activate or deactivate +CGACT
///
/// Lists the activation state of every defined context as
/// `+CGACT: <cid>,<status>` lines, read from the response text.
#[derive(Clone, AtatCmd)]
#[at_cmd("+CGACT?", NoResponse, timeout_ms = 150000)]
pub struct GetPDPContextState;

/// 18.18 Show PDP address +CGPADDR
///
/// Answers `+CGPADDR: <cid>,<PDP_addr>`, read from the response text.
#[derive(Clone, AtatCmd)]
#[at_cmd("+CGPADDR", NoResponse)]
pub struct GetPDPAddress {
    #[at_arg(position = 0)]
    pub cid: ContextId,
}

/// 18.31 PDP context authentication +UAUTHREQ
///
/// Configures the authentication parameters of a defined PDP context. The
/// credentials are omitted when `auth_type` is `None`.
#[derive(Clone, AtatCmd)]
#[at_cmd("+UAUTHREQ", NoResponse)]
pub struct SetAuthParameters<'a> {
    #[at_arg(position = 0)]
    pub cid: ContextId,
    #[at_arg(position = 1)]
    pub auth_type: AuthenticationType,
    #[at_arg(position = 2, len = 64)]
    pub username: Option<&'a str>,
    #[at_arg(position = 3, len = 64)]
    pub password: Option<&'a str>,
}

/// 18.36 EPS network registration status +CEREG
///
/// Answers `+CEREG: <n>,<stat>[,...]`; the status is read from the response
/// text with [`crate::registration::Status::from_response`].
#[derive(Clone, AtatCmd)]
#[at_cmd("+CEREG?", NoResponse)]
pub struct GetEPSNetworkRegistrationStatus;

/// 18.37 Power saving mode setting +CPSMS
///
/// Enables or disables the UE's power saving mode (PSM).
#[derive(Clone, AtatCmd)]
#[at_cmd("+CPSMS", NoResponse, timeout_ms = 40000)]
pub struct SetPowerSavingMode {
    #[at_arg(position = 0)]
    pub mode: PowerSavingMode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use atat::AtatCmd;

    #[test]
    fn context_definition() {
        let mut buf = [0u8; 64];
        let len = SetPDPContextDefinition {
            cid: ContextId(1),
            pdp_type: "IP",
            apn: "iot.example",
        }
        .write(&mut buf);
        assert_eq!(&buf[..len], b"AT+CGDCONT=1,\"IP\",\"iot.example\"\r\n");
    }

    #[test]
    fn authentication_with_and_without_credentials() {
        let mut buf = [0u8; 64];
        let len = SetAuthParameters {
            cid: ContextId(1),
            auth_type: AuthenticationType::None,
            username: None,
            password: None,
        }
        .write(&mut buf);
        assert_eq!(&buf[..len], b"AT+UAUTHREQ=1,0\r\n");

        let len = SetAuthParameters {
            cid: ContextId(1),
            auth_type: AuthenticationType::CHAP,
            username: Some("user"),
            password: Some("pass"),
        }
        .write(&mut buf);
        assert_eq!(&buf[..len], b"AT+UAUTHREQ=1,2,\"user\",\"pass\"\r\n");
    }
}
