//! Core types for the gateway.

pub mod message;
pub mod stream;
pub mod usage;
pub mod wire;

pub use message::*;
pub use stream::*;
pub use usage::*;
pub use wire::*;
