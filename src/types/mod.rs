//! Core types used throughout the library.

pub mod config;
pub mod context;
pub mod message;
pub mod model;
pub mod streaming;

// Re-export commonly used types
pub use config::*;
pub use context::*;
pub use message::*;
pub use model::*;
pub use streaming::*;
