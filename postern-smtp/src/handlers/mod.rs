//! The handlers every server runs, and the chain that registers them.

mod blocklist;
mod data;
mod greeting;
mod headers;
mod mail;
mod rcpt;
mod simple;

pub use self::{
    blocklist::Blocklist,
    data::Data,
    greeting::Greeting,
    headers::{HeaderCheck, ReceivedHeader},
    mail::MailFrom,
    rcpt::RcptTo,
    simple::{Expn, Help, Noop, Quit, Rset, Vrfy},
};
use crate::chain::HandlerChainBuilder;

/// A chain builder with the standard command set and message handlers
/// registered. Callers may append further handlers before building.
#[must_use]
pub fn core() -> HandlerChainBuilder {
    HandlerChainBuilder::default()
        .command(Greeting)
        .command(MailFrom)
        .command(RcptTo)
        .command(Data)
        .command(Rset)
        .command(Noop)
        .command(Quit)
        .command(Vrfy)
        .command(Expn)
        .command(Help)
        .message(HeaderCheck)
        .message(ReceivedHeader)
}
