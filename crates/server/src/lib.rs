//! Server-side authorities for the Jamloft sync core.
//!
//! All canonical state lives behind [`engine::Engine`], a single-writer
//! dispatcher: handlers run to completion, mutate sequentially, and return
//! the deliveries to fan out. There is no parallel mutation and therefore no
//! locking.

pub mod document;
pub mod engine;
pub mod playlist;

pub use document::{ApplyOutcome, DocumentStore};
pub use engine::{Delivery, Engine, TICK_INTERVAL_MS};
pub use playlist::Playlist;
