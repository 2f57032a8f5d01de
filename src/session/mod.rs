//! Durable per-chat session state.

pub mod model;

pub use model::*;
