//! Session acquisition with bounded retries and trusted-auth fallback.

use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use super::Store;
use crate::core::{CxpError, RunConfig};

const ODBC_DRIVER: &str = "ODBC Driver 17 for SQL Server";

/// How a session authenticates against the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// User and password from the configuration.
    SqlLogin,
    /// Integrated authentication of the process identity.
    Trusted,
}

impl AuthMethod {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SqlLogin => "sql_login",
            Self::Trusted => "trusted",
        }
    }
}

/// Everything needed to reach the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub server: String,
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub command_timeout: Option<Duration>,
}

impl ConnectionSettings {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
            command_timeout: config.command_timeout,
        }
    }

    /// Methods to try, in order. SQL login only when both credentials exist.
    pub fn auth_methods(&self) -> Vec<AuthMethod> {
        let mut methods = Vec::with_capacity(2);
        if self.user.is_some() && self.password.is_some() {
            methods.push(AuthMethod::SqlLogin);
        }
        methods.push(AuthMethod::Trusted);
        methods
    }

    /// ODBC-style connection string for `auth`.
    pub fn connection_string(&self, auth: AuthMethod) -> String {
        self.render(auth, self.password.as_deref().unwrap_or_default())
    }

    /// [`Self::connection_string`] with the password replaced, for logs.
    pub fn masked(&self, auth: AuthMethod) -> String {
        self.render(auth, "****")
    }

    fn render(&self, auth: AuthMethod, password: &str) -> String {
        let base = format!(
            "DRIVER={{{ODBC_DRIVER}}};SERVER={};DATABASE={}",
            self.server, self.database
        );
        match auth {
            AuthMethod::SqlLogin => format!(
                "{base};UID={};PWD={password}",
                self.user.as_deref().unwrap_or_default()
            ),
            AuthMethod::Trusted => format!("{base};Trusted_Connection=yes"),
        }
    }
}

/// Linear backoff: attempt `n` waits `base_delay × n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            ..Self::default()
        }
    }

    /// Delay after the failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Opens sessions; implemented per backend.
pub trait Connector {
    type Session: Store;

    fn connect(
        &mut self,
        settings: &ConnectionSettings,
        auth: AuthMethod,
    ) -> Result<Self::Session, CxpError>;
}

/// Open a session, retrying each auth method up to `policy.max_retries`
/// times before moving to the next one.
pub fn open_session<C: Connector>(
    connector: &mut C,
    settings: &ConnectionSettings,
    policy: &RetryPolicy,
) -> Result<C::Session, CxpError> {
    let mut last_error = None;
    for auth in settings.auth_methods() {
        for attempt in 1..=policy.max_retries.max(1) {
            match connector.connect(settings, auth) {
                Ok(session) => {
                    info!(
                        auth = auth.name(),
                        attempt,
                        target = %settings.masked(auth),
                        "database session opened"
                    );
                    return Ok(session);
                }
                Err(err) => {
                    warn!(auth = auth.name(), attempt, error = %err, "connection attempt failed");
                    last_error = Some(err);
                    if attempt < policy.max_retries {
                        thread::sleep(policy.delay(attempt));
                    }
                }
            }
        }
    }
    Err(CxpError::Connection(match last_error {
        Some(err) => format!(
            "could not connect to {}/{}: {err}",
            settings.server, settings.database
        ),
        None => format!("no auth method for {}/{}", settings.server, settings.database),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    struct FlakyConnector {
        fail_sql: bool,
        fail_trusted_times: u32,
        calls: Vec<AuthMethod>,
    }

    impl Connector for FlakyConnector {
        type Session = MemoryStore;

        fn connect(
            &mut self,
            _settings: &ConnectionSettings,
            auth: AuthMethod,
        ) -> Result<MemoryStore, CxpError> {
            self.calls.push(auth);
            match auth {
                AuthMethod::SqlLogin if self.fail_sql => Err(CxpError::Connection("login failed".into())),
                AuthMethod::Trusted if self.fail_trusted_times > 0 => {
                    self.fail_trusted_times -= 1;
                    Err(CxpError::Connection("timeout".into()))
                }
                _ => Ok(MemoryStore::new()),
            }
        }
    }

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            server: "sql01".into(),
            database: "CxP".into(),
            user: Some("rpa".into()),
            password: Some("s3creto".into()),
            command_timeout: None,
        }
    }

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::ZERO,
        }
    }

    #[test]
    fn falls_back_to_trusted_auth() {
        let mut connector = FlakyConnector {
            fail_sql: true,
            fail_trusted_times: 1,
            calls: Vec::new(),
        };
        assert!(open_session(&mut connector, &settings(), &fast(3)).is_ok());
        assert_eq!(
            connector.calls,
            vec![
                AuthMethod::SqlLogin,
                AuthMethod::SqlLogin,
                AuthMethod::SqlLogin,
                AuthMethod::Trusted,
                AuthMethod::Trusted,
            ]
        );
    }

    #[test]
    fn exhausted_retries_escalate() {
        let mut connector = FlakyConnector {
            fail_sql: true,
            fail_trusted_times: 10,
            calls: Vec::new(),
        };
        let err = open_session(&mut connector, &settings(), &fast(2)).unwrap_err();
        assert!(matches!(err, CxpError::Connection(_)));
        assert!(err.is_fatal());
        assert_eq!(connector.calls.len(), 4);
    }

    #[test]
    fn without_credentials_only_trusted_is_tried() {
        let mut s = settings();
        s.password = None;
        assert_eq!(s.auth_methods(), vec![AuthMethod::Trusted]);
    }

    #[test]
    fn password_never_appears_masked() {
        let s = settings();
        assert!(s.connection_string(AuthMethod::SqlLogin).contains("PWD=s3creto"));
        let masked = s.masked(AuthMethod::SqlLogin);
        assert!(!masked.contains("s3creto"));
        assert!(masked.contains("PWD=****"));
        assert!(s.masked(AuthMethod::Trusted).ends_with("Trusted_Connection=yes"));
    }

    #[test]
    fn backoff_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(3), Duration::from_secs(3));
    }
}
