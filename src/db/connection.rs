//! Postgres connection establishment with bounded retries.

use diesel::prelude::*;
use diesel::PgConnection;
use log::{info, warn};
use std::num::NonZeroU32;
use std::thread;
use std::time::Duration;

#[derive(Clone)]
pub struct ConnectionSettings {
    /// Full connection URL including credentials. Never logged.
    pub url: String,
    /// Credential-free description for logs, e.g. `db.internal:5432/laundry`.
    pub target: String,
    pub retries: NonZeroU32,
    pub retry_delay: Duration,
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("target", &self.target)
            .field("retries", &self.retries)
            .field("retry_delay", &self.retry_delay)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl ConnectionSettings {
    /// Connection URL with libpq's `connect_timeout` applied.
    pub fn url_with_timeout(&self) -> String {
        if self.url.contains("connect_timeout=") {
            return self.url.clone();
        }
        let sep = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}connect_timeout={}", self.url, sep, self.connect_timeout.as_secs().max(1))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("could not connect to {target} after {attempts} attempt(s): {last}")]
pub struct ConnectError {
    pub target: String,
    pub attempts: u32,
    #[source]
    pub last: diesel::ConnectionError,
}

pub fn establish(settings: &ConnectionSettings) -> Result<PgConnection, ConnectError> {
    let url = settings.url_with_timeout();
    let attempts = settings.retries.get();
    let mut attempt = 1;
    loop {
        info!("Connecting to database {} (attempt {}/{})", settings.target, attempt, attempts);
        match PgConnection::establish(&url) {
            Ok(conn) => {
                info!("Database connection successful");
                return Ok(conn);
            }
            Err(e) if attempt < attempts => {
                warn!(
                    "Connection attempt {} failed: {}; retrying in {}s",
                    attempt,
                    e,
                    settings.retry_delay.as_secs()
                );
                thread::sleep(settings.retry_delay);
                attempt += 1;
            }
            Err(e) => {
                return Err(ConnectError {
                    target: settings.target.clone(),
                    attempts,
                    last: e,
                });
            }
        }
    }
}
