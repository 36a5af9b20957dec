use futures_util::future::join_all;
use serde::Deserialize;
use tokio::sync::broadcast::Receiver;

use crate::{
    Signal, error::ControllerError, internal, listener::Listener, traits::Protocol,
};

#[derive(Default, Deserialize)]
#[serde(bound(deserialize = ""))]
pub struct Controller<Proto: Protocol> {
    #[serde(alias = "listener")]
    listeners: Vec<Listener<Proto>>,
}

impl<Proto: Protocol> Controller<Proto> {
    pub const fn new(listeners: Vec<Listener<Proto>>) -> Self {
        Self { listeners }
    }

    pub fn listeners(&self) -> &[Listener<Proto>] {
        &self.listeners
    }

    /// Map over the args of all listeners, allowing modification before initialization
    ///
    /// This is useful for injecting dependencies that cannot be deserialized from
    /// the configuration file, such as the shared delivery sink.
    pub fn map_args<F>(&mut self, f: F)
    where
        F: Fn(Proto::Args) -> Proto::Args,
    {
        for listener in &mut self.listeners {
            listener.map_args(&f);
        }
    }

    ///
    /// Initialise this controller
    ///
    /// # Errors
    /// If there are no listeners, or any listener's arguments fail validation
    ///
    pub fn init(&mut self) -> Result<(), ControllerError> {
        internal!("Initialising Controller for {}", Proto::ty());

        if self.listeners.is_empty() {
            return Err(ControllerError::NoListeners(Proto::ty()));
        }

        self.listeners
            .iter_mut()
            .try_for_each(Listener::init)
            .map_err(ControllerError::from)
    }

    ///
    /// # Errors
    /// If any of the listeners have a failure
    ///
    #[tracing::instrument(level = "trace", skip_all, fields(protocol = Proto::ty()))]
    pub async fn control(self, signal: Receiver<Signal>) -> Result<(), ControllerError> {
        join_all(
            self.listeners
                .iter()
                .map(|listener| listener.serve(signal.resubscribe())),
        )
        .await
        .into_iter()
        .try_for_each(|result| result.map_err(ControllerError::from))
    }
}
