//! The ordered registry of handlers, built once and shared by every session.

use std::{fmt, sync::Arc};

use ahash::AHashMap;

use crate::handler::{CommandHandler, ConnectHandler, MessageHandler};

#[derive(Default)]
pub struct HandlerChain {
    connect: Vec<Arc<dyn ConnectHandler>>,
    commands: AHashMap<String, Vec<Arc<dyn CommandHandler>>>,
    message: Vec<Arc<dyn MessageHandler>>,
}

impl HandlerChain {
    #[must_use]
    pub fn builder() -> HandlerChainBuilder {
        HandlerChainBuilder::default()
    }

    pub fn connect_handlers(&self) -> &[Arc<dyn ConnectHandler>] {
        &self.connect
    }

    /// Handlers registered for `verb`, in registration order. `None` means
    /// the verb is not recognised.
    pub fn command_handlers(&self, verb: &str) -> Option<&[Arc<dyn CommandHandler>]> {
        self.commands
            .get(verb)
            .or_else(|| self.commands.get(&verb.to_ascii_uppercase()))
            .map(Vec::as_slice)
    }

    pub fn message_handlers(&self) -> &[Arc<dyn MessageHandler>] {
        &self.message
    }

    /// Every registered verb, sorted.
    pub fn commands(&self) -> Vec<&str> {
        let mut verbs = self.commands.keys().map(String::as_str).collect::<Vec<_>>();
        verbs.sort_unstable();
        verbs
    }
}

impl fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerChain")
            .field("connect", &self.connect)
            .field("commands", &self.commands())
            .field("message", &self.message)
            .finish()
    }
}

/// Builder for [`HandlerChain`]
#[derive(Default)]
pub struct HandlerChainBuilder {
    chain: HandlerChain,
}

impl HandlerChainBuilder {
    /// Append a handler to run when a client connects
    #[must_use]
    pub fn connect<H: ConnectHandler + 'static>(mut self, handler: H) -> Self {
        self.chain.connect.push(Arc::new(handler));
        self
    }

    /// Append a handler under every verb it reports
    #[must_use]
    pub fn command<H: CommandHandler + 'static>(mut self, handler: H) -> Self {
        let handler: Arc<dyn CommandHandler> = Arc::new(handler);

        for verb in handler.commands() {
            self.chain
                .commands
                .entry(verb.to_ascii_uppercase())
                .or_default()
                .push(Arc::clone(&handler));
        }

        self
    }

    /// Append a handler to run for every completed message
    #[must_use]
    pub fn message<H: MessageHandler + 'static>(mut self, handler: H) -> Self {
        self.chain.message.push(Arc::new(handler));
        self
    }

    /// Finish the chain; it cannot be changed afterwards.
    #[must_use]
    pub fn build(self) -> HandlerChain {
        self.chain
    }
}
