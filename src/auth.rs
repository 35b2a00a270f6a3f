use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("a password is required to run research")]
    PasswordRequired,

    #[error("incorrect password")]
    Denied,
}

/// Proof that the access gate let this run through. Only `AccessGate` can
/// construct one, and the pipeline refuses to start without it.
#[derive(Debug)]
pub struct Authorization {
    _private: (),
}

#[derive(Debug, Clone, Default)]
pub struct AccessGate {
    passwords: Vec<String>,
}

impl AccessGate {
    pub fn new(passwords: Vec<String>) -> Self {
        Self { passwords }
    }

    pub fn is_open(&self) -> bool {
        self.passwords.is_empty()
    }

    pub fn authorize(&self, password: Option<&str>) -> Result<Authorization, AccessError> {
        if self.is_open() {
            debug!("no passwords configured, access gate is open");
            return Ok(Authorization { _private: () });
        }

        let password = password.ok_or(AccessError::PasswordRequired)?;
        if self.passwords.iter().any(|p| p == password) {
            Ok(Authorization { _private: () })
        } else {
            Err(AccessError::Denied)
        }
    }
}

#[cfg(test)]
pub(crate) fn test_authorization() -> Authorization {
    Authorization { _private: () }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_gate_authorizes_without_password() {
        let gate = AccessGate::default();
        assert!(gate.is_open());
        assert!(gate.authorize(None).is_ok());
    }

    #[test]
    fn configured_gate_checks_password() {
        let gate = AccessGate::new(vec!["first".into(), "second".into()]);
        assert!(gate.authorize(Some("second")).is_ok());
        assert_eq!(gate.authorize(Some("wrong")).unwrap_err(), AccessError::Denied);
        assert_eq!(
            gate.authorize(None).unwrap_err(),
            AccessError::PasswordRequired
        );
    }
}
