//! ### 5 - Mobile equipment control and status Commands
//!
pub mod responses;
pub mod types;

use atat::atat_derive::AtatCmd;
use responses::Clock;
use types::{AutomaticTimezone, Functionality, ResetMode, TerminationErrorMode};

use super::NoResponse;

/// 5.2 Module switch off +CPWROFF
///
/// Switches off the MT. During shut-down current settings are saved in
/// module's non-volatile memory.
#[derive(Clone, AtatCmd)]
#[at_cmd("+CPWROFF", NoResponse, timeout_ms = 40000)]
pub struct ModuleSwitchOff;

/// 5.3 Set module functionality +CFUN
///
/// Selects the level of functionality <fun> in the MT.
#[derive(Clone, AtatCmd)]
#[at_cmd("+CFUN", NoResponse, timeout_ms = 180000)]
pub struct SetModuleFunctionality {
    #[at_arg(position = 0)]
    pub fun: Functionality,
    #[at_arg(position = 1)]
    pub rst: Option<ResetMode>,
}

/// 5.19 Report mobile termination error +CMEE
///
/// Configures the formatting of the result code +CME ERROR: <err> as an
/// indication of an error relating to the functionality of the MT.
#[derive(Clone, AtatCmd)]
#[at_cmd("+CMEE", NoResponse)]
pub struct SetReportMobileTerminationError {
    #[at_arg(position = 0)]
    pub n: TerminationErrorMode,
}

/// 5.8 Clock +CCLK
///
/// Reads the real-time clock of the MT.
#[derive(Clone, AtatCmd)]
#[at_cmd("+CCLK?", Clock)]
pub struct GetClock;

/// 5.10 Automatic time zone update +CTZU
///
/// Configures the automatic time zone update via NITZ.
#[derive(Clone, AtatCmd)]
#[at_cmd("+CTZU", NoResponse)]
pub struct SetAutomaticTimezoneUpdate {
    #[at_arg(position = 0)]
    pub on_off: AutomaticTimezone,
}
