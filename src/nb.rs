//! Network attach, modem identity, clock and power control.

use core::cell::RefCell;

use embassy_time::{Duration, Instant};
use heapless::String;

use crate::command::device_lock::{GetPinStatus, SetPin};
use crate::command::general::{GetCCID, GetIMEI};
use crate::command::ip_transport_layer::{HexMode, SetHexMode};
use crate::command::mobile_control::types::{
    AutomaticTimezone, Functionality, TerminationErrorMode,
};
use crate::command::mobile_control::{
    GetClock, ModuleSwitchOff, SetAutomaticTimezoneUpdate, SetModuleFunctionality,
    SetReportMobileTerminationError,
};
use crate::command::psn::types::{ContextId, GPRSAttachedState, PowerSavingMode};
use crate::command::psn::{
    GetEPSNetworkRegistrationStatus, SetAuthParameters, SetGPRSAttached,
    SetPDPContextDefinition, SetPowerSavingMode,
};
use crate::command::sms::types::MessageFormat;
use crate::command::sms::SetMessageFormat;
use crate::config::NetworkConfig;
use crate::error::Error;
use crate::modem::{Modem, Outcome};
use crate::module_timing;
use crate::registration::{NetworkStatus, Status};
use crate::traits::{Clock, Transport};

/// Context used for the data session.
pub(crate) const CONTEXT_ID: ContextId = ContextId(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum State {
    Idle,
    DisableErrors,
    WaitDisableErrors,
    MinimumFunctionality,
    WaitMinimumFunctionality,
    CheckSim,
    WaitCheckSim,
    UnlockSim,
    WaitUnlockSim,
    DetachData,
    WaitDetachData,
    SetMessageFormat,
    WaitSetMessageFormat,
    SetHexMode,
    WaitSetHexMode,
    AutomaticTimeZone,
    WaitAutomaticTimeZone,
    SetApn,
    WaitSetApn,
    SetApnAuth,
    WaitSetApnAuth,
    FullFunctionality,
    WaitFullFunctionality,
    CheckRegistration,
    WaitCheckRegistration,
    Done,
    Failed,
}

enum Step {
    /// A command was written; wait for its outcome.
    Sent(State),
    /// The outcome was consumed; continue with the next state right away.
    Next(State),
}

/// Network attach state machine.
///
/// ```ignore
/// let modem = RefCell::new(Modem::new(serial, clock));
/// let mut nb = Nb::new(&modem);
/// nb.begin(NetworkConfig::new().with_apn(Apn::Given { name: "iot", username: None, password: None }))?;
/// ```
pub struct Nb<'d, 'a, T, C, const N: usize>
where
    T: Transport,
    C: Clock,
{
    modem: &'d RefCell<Modem<'d, T, C, N>>,
    config: NetworkConfig<'a>,
    state: State,
    status: NetworkStatus,
    started: Option<Instant>,
}

impl<'d, 'a, T, C, const N: usize> Nb<'d, 'a, T, C, N>
where
    T: Transport,
    C: Clock,
{
    pub fn new(modem: &'d RefCell<Modem<'d, T, C, N>>) -> Self {
        Self {
            modem,
            config: NetworkConfig::new(),
            state: State::Idle,
            status: NetworkStatus::Idle,
            started: None,
        }
    }

    /// Bring up the modem and arm the attach sequence. The sequence itself
    /// runs in [`Nb::ready`].
    pub fn start(&mut self, config: NetworkConfig<'a>) -> Result<(), Error> {
        let mut modem = self.modem.try_borrow_mut()?;
        if let Err(e) = modem.begin(config.soft_reset) {
            error!("Modem did not come up: {:?}", e);
            self.state = State::Failed;
            self.status = NetworkStatus::Error;
            return Err(e);
        }
        self.started = Some(modem.now());
        self.config = config;
        self.state = State::DisableErrors;
        self.status = NetworkStatus::Idle;
        Ok(())
    }

    /// Blocking attach: [`Nb::start`], then drive [`Nb::ready`] until the
    /// sequence ends.
    pub fn begin(&mut self, config: NetworkConfig<'a>) -> Result<NetworkStatus, Error> {
        self.start(config)?;
        loop {
            match self.ready() {
                Ok(()) => return Ok(self.status),
                Err(nb::Error::Other(e)) => return Err(e),
                Err(nb::Error::WouldBlock) => self
                    .modem
                    .try_borrow_mut()?
                    .delay(module_timing::poll_interval()),
            }
        }
    }

    pub fn status(&self) -> NetworkStatus {
        self.status
    }

    /// Advance the attach sequence by at most one command round-trip.
    pub fn ready(&mut self) -> nb::Result<(), Error> {
        match self.state {
            State::Idle => return Err(nb::Error::Other(Error::Uninitialized)),
            State::Done => return Ok(()),
            State::Failed => return Err(nb::Error::Other(Error::SequenceAborted)),
            _ => {}
        }

        let cell = self.modem;
        let mut guard = cell.try_borrow_mut().map_err(Error::from)?;
        let modem = &mut *guard;

        if let (Some(timeout), Some(started)) = (self.config.timeout, self.started) {
            if modem.elapsed_since(started) >= timeout {
                error!("Network attach timed out in {:?}", self.state);
                modem.abort();
                return Err(self.fail(Error::Timeout));
            }
        }

        let outcome = match modem.poll_step() {
            Err(nb::Error::Other(e)) => {
                error!("Network attach abandoned in {:?}: {:?}", self.state, e);
                return Err(self.fail(e));
            }
            step => step?,
        };
        self.advance(modem, outcome)
    }

    fn advance(
        &mut self,
        modem: &mut Modem<'d, T, C, N>,
        mut outcome: Outcome,
    ) -> nb::Result<(), Error> {
        loop {
            let step = match self.state {
                State::DisableErrors => {
                    modem.try_send_cmd(&SetReportMobileTerminationError {
                        n: TerminationErrorMode::Disabled,
                    })?;
                    Step::Sent(State::WaitDisableErrors)
                }
                State::WaitDisableErrors => {
                    self.configured(outcome, State::DisableErrors, State::MinimumFunctionality)?
                }
                State::MinimumFunctionality => {
                    modem.try_send_cmd(&SetModuleFunctionality {
                        fun: Functionality::Minimum,
                        rst: None,
                    })?;
                    Step::Sent(State::WaitMinimumFunctionality)
                }
                State::WaitMinimumFunctionality => {
                    self.configured(outcome, State::MinimumFunctionality, State::CheckSim)?
                }
                State::CheckSim => {
                    modem.try_send_cmd(&GetPinStatus)?;
                    Step::Sent(State::WaitCheckSim)
                }
                State::WaitCheckSim => match outcome {
                    Outcome::Success => {
                        let response = modem.response().trim_end();
                        if response.ends_with("READY") {
                            Step::Next(State::DetachData)
                        } else if response.ends_with("SIM PIN") {
                            Step::Next(State::UnlockSim)
                        } else {
                            error!("SIM not usable: {:?}", response);
                            return Err(self.fail(Error::SequenceAborted));
                        }
                    }
                    _ => {
                        debug!("SIM not ready yet, probing again");
                        Step::Next(State::CheckSim)
                    }
                },
                State::UnlockSim => {
                    let Some(pin) = self.config.pin else {
                        error!("SIM is locked and no PIN is configured");
                        return Err(self.fail(Error::SequenceAborted));
                    };
                    modem.try_send_cmd(&SetPin { pin })?;
                    Step::Sent(State::WaitUnlockSim)
                }
                State::WaitUnlockSim => {
                    self.configured(outcome, State::UnlockSim, State::DetachData)?
                }
                State::DetachData => {
                    modem.try_send_cmd(&SetGPRSAttached {
                        state: GPRSAttachedState::Detached,
                    })?;
                    Step::Sent(State::WaitDetachData)
                }
                State::WaitDetachData => {
                    self.configured(outcome, State::DetachData, State::SetMessageFormat)?
                }
                State::SetMessageFormat => {
                    modem.try_send_cmd(&SetMessageFormat {
                        mode: MessageFormat::Text,
                    })?;
                    Step::Sent(State::WaitSetMessageFormat)
                }
                State::WaitSetMessageFormat => {
                    self.configured(outcome, State::SetMessageFormat, State::SetHexMode)?
                }
                State::SetHexMode => {
                    modem.try_send_cmd(&SetHexMode {
                        hex_mode_disable: HexMode::Enabled,
                    })?;
                    Step::Sent(State::WaitSetHexMode)
                }
                State::WaitSetHexMode => {
                    self.configured(outcome, State::SetHexMode, State::AutomaticTimeZone)?
                }
                State::AutomaticTimeZone => {
                    modem.try_send_cmd(&SetAutomaticTimezoneUpdate {
                        on_off: AutomaticTimezone::EnabledLocal,
                    })?;
                    Step::Sent(State::WaitAutomaticTimeZone)
                }
                State::WaitAutomaticTimeZone => {
                    self.configured(outcome, State::AutomaticTimeZone, State::SetApn)?
                }
                State::SetApn => {
                    modem.try_send_cmd(&SetPDPContextDefinition {
                        cid: CONTEXT_ID,
                        pdp_type: "IP",
                        apn: self.config.apn.name(),
                    })?;
                    Step::Sent(State::WaitSetApn)
                }
                State::WaitSetApn => self.configured(outcome, State::SetApn, State::SetApnAuth)?,
                State::SetApnAuth => {
                    let credentials = self.config.apn.credentials();
                    modem.try_send_cmd(&SetAuthParameters {
                        cid: CONTEXT_ID,
                        auth_type: self.config.auth_type(),
                        username: credentials.map(|(username, _)| username),
                        password: credentials.map(|(_, password)| password),
                    })?;
                    Step::Sent(State::WaitSetApnAuth)
                }
                State::WaitSetApnAuth => {
                    self.configured(outcome, State::SetApnAuth, State::FullFunctionality)?
                }
                State::FullFunctionality => {
                    modem.try_send_cmd(&SetModuleFunctionality {
                        fun: Functionality::Full,
                        rst: None,
                    })?;
                    Step::Sent(State::WaitFullFunctionality)
                }
                State::WaitFullFunctionality => {
                    self.configured(outcome, State::FullFunctionality, State::CheckRegistration)?
                }
                State::CheckRegistration => {
                    modem.try_send_cmd(&GetEPSNetworkRegistrationStatus)?;
                    Step::Sent(State::WaitCheckRegistration)
                }
                State::WaitCheckRegistration => {
                    if !outcome.is_success() {
                        let e = outcome.into_result().err().unwrap_or(Error::SequenceAborted);
                        return Err(self.fail(e));
                    }
                    match Status::from_response(modem.response()) {
                        Some(Status::Home | Status::Roaming | Status::Emergency) => {
                            info!("Registered on network");
                            self.status = NetworkStatus::Ready;
                            Step::Next(State::Done)
                        }
                        Some(Status::Searching) => {
                            self.status = NetworkStatus::Connecting;
                            Step::Next(State::CheckRegistration)
                        }
                        Some(Status::Denied) => {
                            error!("Network registration denied");
                            return Err(self.fail(Error::SequenceAborted));
                        }
                        status => {
                            trace!("Not registered yet: {:?}", status);
                            Step::Next(State::CheckRegistration)
                        }
                    }
                }
                State::Done => return Ok(()),
                State::Idle | State::Failed => return Err(nb::Error::Other(Error::SequenceAborted)),
            };

            match step {
                Step::Sent(next) => {
                    self.state = next;
                    return Err(nb::Error::WouldBlock);
                }
                Step::Next(next) => {
                    self.state = next;
                    outcome = Outcome::Pending;
                }
            }
        }
    }

    /// Outcome policy of a configuration step: success continues, any error
    /// ends the sequence.
    fn configured(
        &mut self,
        outcome: Outcome,
        retry: State,
        next: State,
    ) -> Result<Step, nb::Error<Error>> {
        match outcome {
            Outcome::Success => Ok(Step::Next(next)),
            // The outcome went elsewhere; issue the step again.
            Outcome::Pending => Ok(Step::Next(retry)),
            outcome => {
                error!("{:?} failed: {:?}", retry, outcome);
                let e = outcome.into_result().err().unwrap_or(Error::SequenceAborted);
                Err(self.fail(e))
            }
        }
    }

    fn fail(&mut self, e: Error) -> nb::Error<Error> {
        self.state = State::Failed;
        self.status = NetworkStatus::Error;
        nb::Error::Other(e)
    }

    /// Power the module off (`AT+CPWROFF`, up to 40 s), then release the
    /// transport whether or not the module confirmed.
    pub fn shutdown(&mut self) -> Result<(), Error> {
        let mut modem = self.modem.try_borrow_mut()?;
        let result = modem.request(&ModuleSwitchOff);
        if let Err(e) = &result {
            warn!("Power off not confirmed: {:?}", e);
        }
        modem.end();
        self.state = State::Idle;
        self.status = NetworkStatus::Off;
        result
    }

    /// Release the transport without talking to the module.
    pub fn secure_shutdown(&mut self) -> Result<(), Error> {
        self.modem.try_borrow_mut()?.end();
        self.state = State::Idle;
        self.status = NetworkStatus::Off;
        Ok(())
    }

    pub fn imei(&mut self) -> Result<String<32>, Error> {
        let mut modem = self.modem.try_borrow_mut()?;
        value_of(modem.request_text(&GetIMEI)?)
    }

    pub fn iccid(&mut self) -> Result<String<32>, Error> {
        let mut modem = self.modem.try_borrow_mut()?;
        value_of(modem.request_text(&GetCCID)?)
    }

    /// Network time as Unix seconds (UTC).
    pub fn time(&mut self) -> Result<u64, Error> {
        let (local, offset) = self.clock()?;
        u64::try_from(local - offset).map_err(|_| Error::Parse)
    }

    /// Network time as Unix seconds in the local time zone.
    pub fn local_time(&mut self) -> Result<u64, Error> {
        let (local, _) = self.clock()?;
        u64::try_from(local).map_err(|_| Error::Parse)
    }

    fn clock(&mut self) -> Result<(i64, i64), Error> {
        let clock = self.modem.try_borrow_mut()?.query(&GetClock)?;
        parse_clock(&clock.time).ok_or(Error::Parse)
    }

    /// Enable or disable 3GPP power saving mode (`AT+CPSMS`).
    pub fn set_low_power_mode(&mut self, enabled: bool) -> Result<(), Error> {
        let mode = if enabled {
            PowerSavingMode::Enabled
        } else {
            PowerSavingMode::Disabled
        };
        self.modem
            .try_borrow_mut()?
            .request(&SetPowerSavingMode { mode })
    }

    /// The module is registered on its home network, roaming, or attached
    /// for emergency service.
    pub fn is_access_alive(&mut self) -> Result<bool, Error> {
        let mut modem = self.modem.try_borrow_mut()?;
        let response = modem.request_text(&GetEPSNetworkRegistrationStatus)?;
        Ok(Status::from_response(response).is_some_and(|s| s.registered()))
    }
}

/// The value of a single-value response, with or without a `+CMD: ` prefix.
fn value_of(response: &str) -> Result<String<32>, Error> {
    let value = match response.split_once(':') {
        Some((_, value)) => value,
        None => response,
    };
    let mut s = String::new();
    s.push_str(value.trim().trim_matches('"'))
        .map_err(|_| Error::Overflow)?;
    Ok(s)
}

/// Parse `yy/MM/dd,hh:mm:ss±zz` into local Unix seconds and the zone offset
/// in seconds.
pub(crate) fn parse_clock(s: &str) -> Option<(i64, i64)> {
    let s = s.trim().trim_matches('"');
    let (date, time) = s.split_once(',')?;

    let mut date = date.split('/');
    let year: i64 = date.next()?.parse().ok()?;
    let month: u32 = date.next()?.parse().ok()?;
    let day: u32 = date.next()?.parse().ok()?;

    let zone_at = time.find(|c| c == '+' || c == '-')?;
    let (time, zone) = time.split_at(zone_at);
    let mut time = time.split(':');
    let hour: i64 = time.next()?.parse().ok()?;
    let minute: i64 = time.next()?.parse().ok()?;
    let second: i64 = time.next()?.parse().ok()?;

    let quarters: i64 = zone[1..].parse().ok()?;
    let offset = quarters * 15 * 60;
    let offset = if zone.starts_with('-') { -offset } else { offset };

    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    let days = days_from_civil(2000 + year, month, day);
    Some((days * 86_400 + hour * 3600 + minute * 60 + second, offset))
}

/// Days since 1970-01-01 of a proleptic Gregorian date.
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = if year >= 0 { year } else { year - 399 } / 400;
    let yoe = year - era * 400;
    let month = i64::from(month);
    let mp = if month > 2 { month - 3 } else { month + 9 };
    let doy = (153 * mp + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}
