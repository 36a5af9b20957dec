//! Server-side timeout configuration.
//!
//! Values default to the RFC 5321 recommendations for a receiving server:
//! five minutes between commands and thirty minutes for a whole connection.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTimeouts {
    /// How long a session may sit idle between reads before the watchdog fires.
    ///
    /// Default: 300 seconds
    #[serde(default = "defaults::idle_secs")]
    pub idle_secs: u64,

    /// Maximum total connection duration.
    ///
    /// Default: 1800 seconds
    #[serde(default = "defaults::connection_secs")]
    pub connection_secs: u64,
}

impl ServerTimeouts {
    pub const fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }

    pub const fn connection(&self) -> Duration {
        Duration::from_secs(self.connection_secs)
    }
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            idle_secs: defaults::idle_secs(),
            connection_secs: defaults::connection_secs(),
        }
    }
}

mod defaults {
    pub const fn idle_secs() -> u64 {
        300
    }

    pub const fn connection_secs() -> u64 {
        1800
    }
}
