use std::net::{IpAddr, SocketAddr};

use ulid::Ulid;

/// Per-connection facts that outlive a single mail transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub id: Ulid,
    pub peer: SocketAddr,
    /// The host name of the client. No reverse lookup is made, so this is
    /// the textual form of the remote IP.
    pub remote_host: String,
    pub remote_ip: IpAddr,
    /// The authenticated user, if any.
    pub user: Option<String>,
    pub relaying_allowed: bool,
    pub auth_required: bool,
    pub blocklisted: bool,
    /// The name given with HELO or EHLO.
    pub helo: Option<String>,
    /// Whether the client greeted with EHLO.
    pub extended: bool,
}

impl SessionState {
    pub fn new(peer: SocketAddr) -> Self {
        let remote_ip = peer.ip().to_canonical();

        Self {
            id: Ulid::new(),
            peer,
            remote_host: remote_ip.to_string(),
            remote_ip,
            user: None,
            relaying_allowed: false,
            auth_required: false,
            blocklisted: false,
            helo: None,
            extended: false,
        }
    }
}
