//! Gantry — a Messages-API gateway over a single-shot agent engine.
//!
//! The execution engine behind this gateway accepts exactly one synthesized
//! input turn per invocation and pushes back a live event stream. Gantry
//! flattens a multi-turn conversation into that single turn and translates
//! the engine's events into the public Messages wire protocol, either as one
//! aggregated response or as a server-sent event stream.
//!
//! # Quick Start
//!
//! ```
//! use gantry::flatten::flatten_conversation;
//! use gantry::types::ChatMessage;
//!
//! let turns = vec![
//!     ChatMessage::user("Hi"),
//!     ChatMessage::assistant("Hello"),
//!     ChatMessage::user("What's 2+2?"),
//! ];
//! let flat = flatten_conversation(&turns).unwrap();
//! // One history block plus the current question.
//! assert_eq!(flat.input.content.len(), 2);
//! ```

pub mod engine;
pub mod error;
pub mod flatten;
pub mod metrics;
pub mod prelude;
pub mod server;
pub mod translate;
pub mod types;
