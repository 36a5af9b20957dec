//! Configuration types shared between the listener and session layers.

pub mod timeouts;

pub use timeouts::ServerTimeouts;
