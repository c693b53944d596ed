use embassy_time::Duration;

use crate::command::psn::types::AuthenticationType;
use crate::module_timing;

/// Tuning of the AT transport engine.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModemConfig {
    pub(crate) quiet_interval: Duration,
    pub(crate) response_timeout: Duration,
    pub(crate) binary_echo: bool,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ModemConfig {
    pub const fn new() -> Self {
        ModemConfig {
            quiet_interval: module_timing::command_quiet_interval(),
            response_timeout: module_timing::default_response_timeout(),
            binary_echo: true,
        }
    }

    /// Minimum silence on the line, counted from the last response or URC,
    /// before the next command is written.
    pub fn with_quiet_interval(self, quiet_interval: Duration) -> Self {
        ModemConfig {
            quiet_interval,
            ..self
        }
    }

    pub fn with_response_timeout(self, response_timeout: Duration) -> Self {
        ModemConfig {
            response_timeout,
            ..self
        }
    }

    /// The modem does not echo raw payload bytes back (e.g. `ATE0`).
    pub fn without_binary_echo(self) -> Self {
        ModemConfig {
            binary_echo: false,
            ..self
        }
    }
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Apn<'a> {
    #[default]
    None,
    Given {
        name: &'a str,
        username: Option<&'a str>,
        password: Option<&'a str>,
    },
}

impl<'a> Apn<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            Apn::None => "",
            Apn::Given { name, .. } => name,
        }
    }

    pub fn credentials(&self) -> Option<(&'a str, &'a str)> {
        match self {
            Apn::Given {
                username: Some(username),
                password,
                ..
            } => Some((username, password.unwrap_or(""))),
            _ => None,
        }
    }
}

/// Parameters of the network attach sequence.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NetworkConfig<'a> {
    pub(crate) pin: Option<&'a str>,
    pub(crate) apn: Apn<'a>,
    pub(crate) authentication: Option<AuthenticationType>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) soft_reset: bool,
}

impl<'a> NetworkConfig<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pin(self, pin: &'a str) -> Self {
        NetworkConfig {
            pin: Some(pin),
            ..self
        }
    }

    pub fn with_apn(self, apn: Apn<'a>) -> Self {
        NetworkConfig { apn, ..self }
    }

    /// Authentication used when the APN carries credentials. Defaults to CHAP.
    pub fn with_authentication(self, authentication: AuthenticationType) -> Self {
        NetworkConfig {
            authentication: Some(authentication),
            ..self
        }
    }

    /// Overall deadline for the whole attach sequence, counted from its start.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        NetworkConfig {
            timeout: Some(timeout),
            ..self
        }
    }

    /// Issue `AT+CFUN=15` before attaching.
    pub fn with_soft_reset(self) -> Self {
        NetworkConfig {
            soft_reset: true,
            ..self
        }
    }

    pub(crate) fn auth_type(&self) -> AuthenticationType {
        match (self.apn.credentials(), self.authentication) {
            (None, _) => AuthenticationType::None,
            (Some(_), Some(auth)) => auth,
            (Some(_), None) => AuthenticationType::CHAP,
        }
    }
}
