use std::net::SocketAddr;

use futures_util::future::join_all;
use serde::Deserialize;
use tokio::{
    net::TcpListener,
    sync::broadcast::{Receiver, error::RecvError},
};

use crate::{
    Signal,
    error::{ListenerError, ProtocolError},
    internal,
    traits::protocol::{Protocol, SessionHandler},
};

#[derive(Deserialize)]
#[serde(bound(deserialize = ""))]
pub struct Listener<Proto: Protocol> {
    #[serde(skip)]
    handler: Proto,
    socket: SocketAddr,
    #[serde(default)]
    args: Proto::Args,
}

impl<Proto: Protocol> Listener<Proto> {
    pub fn new(socket: SocketAddr, args: Proto::Args) -> Self {
        Self {
            handler: Proto::default(),
            socket,
            args,
        }
    }

    pub const fn socket(&self) -> SocketAddr {
        self.socket
    }

    pub const fn args(&self) -> &Proto::Args {
        &self.args
    }

    /// Replace this listener's arguments, e.g. to inject runtime resources
    /// that cannot come from a configuration file.
    pub fn map_args<F>(&mut self, f: F)
    where
        F: FnOnce(Proto::Args) -> Proto::Args,
    {
        let args = std::mem::take(&mut self.args);
        self.args = f(args);
    }

    ///
    /// Validate this listener's arguments against its protocol
    ///
    /// # Errors
    /// Whatever the protocol reports as invalid about its arguments
    ///
    #[tracing::instrument(skip(self), fields(socket = %self.socket))]
    pub fn init(&mut self) -> Result<(), ProtocolError> {
        self.handler.validate(&mut self.args)
    }

    ///
    /// Bind the configured socket and serve connections until shutdown
    ///
    /// # Errors
    /// If the socket cannot be bound, or accepting a connection fails
    ///
    pub async fn serve(&self, shutdown: Receiver<Signal>) -> Result<(), ListenerError> {
        let listener =
            TcpListener::bind(self.socket)
                .await
                .map_err(|source| ListenerError::BindFailed {
                    address: self.socket.to_string(),
                    source,
                })?;

        self.serve_on(listener, shutdown).await
    }

    ///
    /// Serve connections from an already bound listener until shutdown
    ///
    /// # Errors
    /// If accepting a connection fails
    ///
    #[tracing::instrument(level = "trace", skip_all, fields(protocol = Proto::ty()))]
    pub async fn serve_on(
        &self,
        listener: TcpListener,
        mut shutdown: Receiver<Signal>,
    ) -> Result<(), ListenerError> {
        let local = listener.local_addr().unwrap_or(self.socket);
        internal!(level = INFO, "Serving {} on {}", Proto::ty(), local);

        let mut sessions = Vec::default();

        loop {
            tokio::select! {
                sig = shutdown.recv() => {
                    if matches!(sig, Ok(Signal::Shutdown) | Err(RecvError::Closed)) {
                        internal!(
                            level = INFO,
                            "{} Listener {} received shutdown signal, finishing {} sessions ...",
                            Proto::ty(),
                            local,
                            sessions.len()
                        );
                        join_all(sessions).await;
                        return Ok(());
                    }
                }

                connection = listener.accept() => {
                    let (stream, peer) = connection?;
                    tracing::debug!("Connection received on {local} from {peer}");

                    let session = self.handler.handle(stream, peer, &self.args);
                    let signal = shutdown.resubscribe();

                    sessions.push(tokio::spawn(async move {
                        match session.run(signal).await {
                            Err(err) if err.is_client_error() => {
                                internal!(level = DEBUG, "Session with {peer} ended: {err}");
                            }
                            Err(err) => internal!(level = ERROR, "Session with {peer} failed: {err}"),
                            Ok(()) => {}
                        }
                    }));

                    sessions.retain(|session| !session.is_finished());
                }
            }
        }
    }
}
