//! ### 4 - General Commands
//!
//! Both identification commands answer with a bare value line, read from the
//! response text.

use atat::atat_derive::AtatCmd;

use super::NoResponse;

/// 4.7 IMEI identification +CGSN
///
/// Returns the product serial number, the International Mobile Equipment
/// Identity (IMEI) of the MT.
#[derive(Clone, AtatCmd)]
#[at_cmd("+CGSN", NoResponse)]
pub struct GetIMEI;

/// 4.12 Card identification +CCID
///
/// Returns the ICCID (Integrated Circuit Card ID) of the SIM-card. ICCID is a
/// serial number identifying the SIM.
#[derive(Clone, AtatCmd)]
#[at_cmd("+CCID", NoResponse)]
pub struct GetCCID;
