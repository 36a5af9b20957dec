pub mod controller;
pub mod delivery;

pub use controller::{Postern, SHUTDOWN_BROADCAST};
pub use delivery::Delivery;
