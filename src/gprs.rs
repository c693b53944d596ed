//! Packet data attach and detach.

use core::cell::RefCell;

use embassy_time::{Duration, Instant};
use embedded_nal::Ipv4Addr;

use crate::command::psn::types::GPRSAttachedState;
use crate::command::psn::{GetPDPAddress, GetPDPContextState, SetGPRSAttached};
use crate::error::Error;
use crate::modem::{Modem, Outcome};
use crate::nb::CONTEXT_ID;
use crate::registration::NetworkStatus;
use crate::traits::{Clock, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum State {
    Idle,
    Attach,
    WaitAttach,
    CheckAttached,
    WaitCheckAttached,
    Detach,
    WaitDetach,
}

/// Poll interval of the blocking attach, slower than the network attach
/// since activation takes seconds.
const ATTACH_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct Gprs<'d, T, C, const N: usize>
where
    T: Transport,
    C: Clock,
{
    modem: &'d RefCell<Modem<'d, T, C, N>>,
    state: State,
    status: NetworkStatus,
    timeout: Option<Duration>,
}

impl<'d, T, C, const N: usize> Gprs<'d, T, C, N>
where
    T: Transport,
    C: Clock,
{
    pub fn new(modem: &'d RefCell<Modem<'d, T, C, N>>) -> Self {
        Self {
            modem,
            state: State::Idle,
            status: NetworkStatus::Idle,
            timeout: None,
        }
    }

    /// Deadline of the blocking [`Gprs::attach`].
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    pub fn status(&self) -> NetworkStatus {
        self.status
    }

    /// Start attaching; progress with [`Gprs::ready`].
    pub fn start_attach(&mut self) {
        self.state = State::Attach;
        self.status = NetworkStatus::Connecting;
    }

    /// Start detaching; progress with [`Gprs::ready`].
    pub fn start_detach(&mut self) {
        self.state = State::Detach;
    }

    /// Blocking attach: `AT+CGATT=1`, then `AT+CGACT?` until the context is
    /// active.
    pub fn attach(&mut self) -> Result<NetworkStatus, Error> {
        self.start_attach();
        let start = self.now()?;
        loop {
            match self.ready() {
                Ok(()) => return Ok(self.status),
                Err(nb::Error::Other(e)) => return Err(e),
                Err(nb::Error::WouldBlock) => {}
            }

            let mut modem = self.modem.try_borrow_mut()?;
            if let Some(timeout) = self.timeout {
                if modem.elapsed_since(start) >= timeout {
                    warn!("Packet data attach timed out");
                    modem.abort();
                    self.state = State::Idle;
                    self.status = NetworkStatus::Error;
                    return Err(Error::Timeout);
                }
            }
            modem.delay(ATTACH_POLL_INTERVAL);
        }
    }

    /// Blocking detach (`AT+CGATT=0`).
    pub fn detach(&mut self) -> Result<NetworkStatus, Error> {
        self.start_detach();
        loop {
            match self.ready() {
                Ok(()) => return Ok(self.status),
                Err(nb::Error::Other(e)) => return Err(e),
                Err(nb::Error::WouldBlock) => self
                    .modem
                    .try_borrow_mut()?
                    .delay(crate::module_timing::poll_interval()),
            }
        }
    }

    pub fn ready(&mut self) -> nb::Result<(), Error> {
        let cell = self.modem;
        let mut modem = cell.try_borrow_mut().map_err(Error::from)?;
        let mut outcome = match modem.poll_step() {
            Err(nb::Error::Other(e)) => {
                warn!("Packet data {:?} abandoned: {:?}", self.state, e);
                self.state = State::Idle;
                self.status = NetworkStatus::Error;
                return Err(nb::Error::Other(e));
            }
            step => step?,
        };

        loop {
            match self.state {
                State::Idle => return Ok(()),
                State::Attach => {
                    modem.try_send_cmd(&SetGPRSAttached {
                        state: GPRSAttachedState::Attached,
                    })?;
                    self.state = State::WaitAttach;
                    return Err(nb::Error::WouldBlock);
                }
                State::WaitAttach => match outcome {
                    Outcome::Success => self.state = State::CheckAttached,
                    Outcome::Pending => self.state = State::Attach,
                    outcome => {
                        error!("Packet data attach rejected: {:?}", outcome);
                        return Err(self.fail(outcome));
                    }
                },
                State::CheckAttached => {
                    modem.try_send_cmd(&GetPDPContextState)?;
                    self.state = State::WaitCheckAttached;
                    return Err(nb::Error::WouldBlock);
                }
                State::WaitCheckAttached => match outcome {
                    Outcome::Success if modem.response().trim_end().ends_with("1,1") => {
                        info!("PDP context active");
                        self.state = State::Idle;
                        self.status = NetworkStatus::Ready;
                        return Ok(());
                    }
                    Outcome::Success | Outcome::Pending => self.state = State::CheckAttached,
                    outcome => return Err(self.fail(outcome)),
                },
                State::Detach => {
                    modem.try_send_cmd(&SetGPRSAttached {
                        state: GPRSAttachedState::Detached,
                    })?;
                    self.state = State::WaitDetach;
                    return Err(nb::Error::WouldBlock);
                }
                State::WaitDetach => match outcome {
                    Outcome::Success => {
                        self.state = State::Idle;
                        self.status = NetworkStatus::Idle;
                        return Ok(());
                    }
                    Outcome::Pending => self.state = State::Detach,
                    outcome => return Err(self.fail(outcome)),
                },
            }
            outcome = Outcome::Pending;
        }
    }

    fn fail(&mut self, outcome: Outcome) -> nb::Error<Error> {
        self.state = State::Idle;
        self.status = NetworkStatus::Error;
        nb::Error::Other(outcome.into_result().err().unwrap_or(Error::SequenceAborted))
    }

    /// Address assigned to the data context, from `+CGPADDR: 1,<addr>`.
    pub fn ip_address(&mut self) -> Result<Ipv4Addr, Error> {
        let mut modem = self.modem.try_borrow_mut()?;
        let response = modem.request_text(&GetPDPAddress { cid: CONTEXT_ID })?;
        parse_address(response).ok_or(Error::Parse)
    }

    fn now(&self) -> Result<Instant, Error> {
        Ok(self.modem.try_borrow_mut()?.now())
    }
}

fn parse_address(response: &str) -> Option<Ipv4Addr> {
    let (_, fields) = response.split_once(':')?;
    let (_, addr) = fields.split_once(',')?;
    addr.trim().trim_matches('"').parse().ok()
}
