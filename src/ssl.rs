//! Loading TLS root certificates, client certificates and keys into the
//! module's security data store.

use core::cell::RefCell;

use atat::AtatCmd;
use embassy_time::{Duration, Instant};

use crate::command::device_data_security::types::SecurityDataType;
use crate::command::device_data_security::{DeleteSecurityData, PrepareSecurityDataImport};
use crate::error::Error;
use crate::modem::{Modem, Outcome};
use crate::module_timing;
use crate::traits::{Clock, Transport};

/// A named entry of the security data store. Empty `data` removes the
/// entry instead of importing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Certificate<'a> {
    pub data_type: SecurityDataType,
    pub name: &'a str,
    pub data: &'a [u8],
}

impl<'a> Certificate<'a> {
    pub const fn root_ca(name: &'a str, data: &'a [u8]) -> Self {
        Self {
            data_type: SecurityDataType::TrustedRootCA,
            name,
            data,
        }
    }

    pub const fn client_certificate(name: &'a str, data: &'a [u8]) -> Self {
        Self {
            data_type: SecurityDataType::ClientCertificate,
            name,
            data,
        }
    }

    pub const fn client_private_key(name: &'a str, data: &'a [u8]) -> Self {
        Self {
            data_type: SecurityDataType::ClientPrivateKey,
            name,
            data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum State {
    Load,
    WaitLoadResponse,
    WaitDeleteResponse,
    Done,
    Failed,
}

/// Walks a list of [`Certificate`]s, importing or removing one per step.
pub struct CertificateLoader<'d, 'c, T, C, const N: usize>
where
    T: Transport,
    C: Clock,
{
    modem: &'d RefCell<Modem<'d, T, C, N>>,
    certificates: &'c [Certificate<'c>],
    index: usize,
    state: State,
}

impl<'d, 'c, T, C, const N: usize> CertificateLoader<'d, 'c, T, C, N>
where
    T: Transport,
    C: Clock,
{
    pub fn new(
        modem: &'d RefCell<Modem<'d, T, C, N>>,
        certificates: &'c [Certificate<'c>],
    ) -> Self {
        Self {
            modem,
            certificates,
            index: 0,
            state: State::Load,
        }
    }

    /// All entries have been processed.
    pub fn is_loaded(&self) -> bool {
        self.state == State::Done
    }

    /// Start over with the first entry.
    pub fn restart(&mut self) {
        self.index = 0;
        self.state = State::Load;
    }

    /// Blocking load of every entry. Gives up with [`Error::Timeout`] when a
    /// single entry makes no progress within the import command's timeout.
    pub fn load(&mut self) -> Result<(), Error> {
        let step_timeout =
            Duration::from_millis(u64::from(PrepareSecurityDataImport::MAX_TIMEOUT_MS));
        let mut index = self.index;
        let mut since = self.now()?;

        loop {
            match self.ready() {
                Ok(()) => return Ok(()),
                Err(nb::Error::Other(e)) => return Err(e),
                Err(nb::Error::WouldBlock) => {}
            }

            let mut modem = self.modem.try_borrow_mut()?;
            if self.index != index {
                index = self.index;
                since = modem.now();
            } else if modem.elapsed_since(since) >= step_timeout {
                error!("Certificate {} stuck in {:?}", self.index, self.state);
                modem.abort();
                self.state = State::Failed;
                return Err(Error::Timeout);
            }
            modem.delay(module_timing::poll_interval());
        }
    }

    pub fn ready(&mut self) -> nb::Result<(), Error> {
        match self.state {
            State::Done => return Ok(()),
            State::Failed => return Err(nb::Error::Other(Error::SequenceAborted)),
            _ => {}
        }

        let cell = self.modem;
        let mut modem = cell.try_borrow_mut().map_err(Error::from)?;
        let mut outcome = match modem.poll_step() {
            Err(nb::Error::Other(e)) => {
                error!("Certificate {} abandoned: {:?}", self.index, e);
                self.state = State::Failed;
                return Err(nb::Error::Other(e));
            }
            step => step?,
        };

        loop {
            match self.state {
                State::Load => {
                    let Some(cert) = self.certificates.get(self.index) else {
                        debug!("{} certificates processed", self.certificates.len());
                        self.state = State::Done;
                        return Ok(());
                    };

                    if cert.data.is_empty() {
                        modem.try_send_cmd(&DeleteSecurityData {
                            data_type: cert.data_type,
                            internal_name: cert.name,
                        })?;
                        self.state = State::WaitDeleteResponse;
                        return Err(nb::Error::WouldBlock);
                    }

                    modem.try_send_cmd(&PrepareSecurityDataImport {
                        data_type: cert.data_type,
                        internal_name: cert.name,
                        data_size: cert.data.len(),
                    })?;
                    let written = modem
                        .wait_for_prompt(module_timing::prompt_timeout())
                        .and_then(|()| modem.write(cert.data));
                    if let Err(e) = written {
                        error!("Importing {:?} failed: {:?}", cert.name, e);
                        self.state = State::Failed;
                        return Err(nb::Error::Other(e));
                    }
                    self.state = State::WaitLoadResponse;
                    return Err(nb::Error::WouldBlock);
                }
                State::WaitLoadResponse => match outcome {
                    Outcome::Success => self.next(),
                    Outcome::Pending => self.state = State::Load,
                    outcome => {
                        error!("Certificate {} rejected: {:?}", self.index, outcome);
                        self.state = State::Failed;
                        return Err(nb::Error::Other(
                            outcome.into_result().err().unwrap_or(Error::SequenceAborted),
                        ));
                    }
                },
                State::WaitDeleteResponse => {
                    // Removing an entry that does not exist is an error on
                    // the module, which is fine here.
                    if !outcome.is_success() {
                        debug!("Removal of certificate {}: {:?}", self.index, outcome);
                    }
                    self.next();
                }
                State::Done => return Ok(()),
                State::Failed => return Err(nb::Error::Other(Error::SequenceAborted)),
            }
            outcome = Outcome::Pending;
        }
    }

    fn next(&mut self) {
        self.index += 1;
        self.state = State::Load;
    }

    fn now(&self) -> Result<Instant, Error> {
        Ok(self.modem.try_borrow_mut()?.now())
    }
}
