use async_trait::async_trait;
use postern_common::{error::SessionError, internal};

use crate::{
    handler::{ConnectHandler, Outcome},
    policy::Network,
    session::SmtpSession,
};

/// Marks clients from the listed networks as blocklisted. Such clients may
/// still connect, but recipients are refused until they authenticate.
#[derive(Debug, Clone, Default)]
pub struct Blocklist {
    networks: Vec<Network>,
}

impl Blocklist {
    pub const fn new(networks: Vec<Network>) -> Self {
        Self { networks }
    }

    pub fn networks(&self) -> &[Network] {
        &self.networks
    }
}

#[async_trait]
impl ConnectHandler for Blocklist {
    async fn on_connect(&self, session: &mut dyn SmtpSession) -> Result<Outcome, SessionError> {
        let ip = session.state().remote_ip;

        if let Some(network) = self.networks.iter().find(|network| network.contains(ip)) {
            internal!(level = INFO, "Connection from {ip} is blocklisted by {network}");
            session.state_mut().blocklisted = true;
        }

        Ok(Outcome::Continue)
    }
}
