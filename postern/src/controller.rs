use std::{
    path::Path,
    sync::{Arc, LazyLock},
};

use postern_common::{Signal, controller::Controller, internal, logging};
use postern_smtp::Smtp;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::delivery::Delivery;

#[derive(Default, Deserialize)]
pub struct Postern {
    #[serde(alias = "smtp")]
    smtp_controller: Controller<Smtp>,
    #[serde(default)]
    delivery: Delivery,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[tracing::instrument(level = "trace")]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    Ok(())
}

impl Postern {
    ///
    /// Load a controller from a RON configuration file
    ///
    /// # Errors
    /// If the file cannot be read, or is not a valid configuration
    ///
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config from {}: {e}", path.display())
        })?;

        Ok(ron::from_str(&content)?)
    }

    pub const fn smtp(&self) -> &Controller<Smtp> {
        &self.smtp_controller
    }

    pub const fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    ///
    /// Create the delivery sink, hand it to every SMTP listener, and
    /// validate the listeners
    ///
    /// # Errors
    /// If the sink cannot be created, there are no listeners, or a listener
    /// is misconfigured
    ///
    pub fn init(&mut self) -> anyhow::Result<()> {
        let sink = self.delivery.sink()?;
        self.smtp_controller
            .map_args(|args| args.with_sink(Arc::clone(&sink)));

        self.smtp_controller.init()?;
        Ok(())
    }

    /// Run this controller, and everything it controls
    ///
    /// # Errors
    ///
    /// This function will return an error if the listeners fail to
    /// initialise, or a listener cannot serve its socket.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn run(mut self) -> anyhow::Result<()> {
        logging::init();

        internal!("Controller running");

        self.init()?;

        let control = self
            .smtp_controller
            .control(SHUTDOWN_BROADCAST.subscribe());
        tokio::pin!(control);

        let ret = tokio::select! {
            r = &mut control => r.map_err(anyhow::Error::from),
            r = shutdown() => match r {
                // Listeners finish their sessions before returning
                Ok(()) => tokio::select! {
                    r = &mut control => r.map_err(anyhow::Error::from),
                    _ = tokio::signal::ctrl_c() => {
                        internal!(level = WARN, "Forcing shutdown");
                        Ok(())
                    }
                },
                Err(err) => Err(err),
            },
        };

        internal!("Shutting down...");

        ret
    }
}
