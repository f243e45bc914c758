//! Wire message surface between Jamloft clients and the sync server.
//!
//! Every message is a `channel`-tagged envelope whose payload fields use the
//! camelCase names the web clients already speak. Client→server refs travel
//! as raw strings and are validated server-side; server→client refs are
//! already-validated [`model::VideoRef`]s.

pub mod messages;

pub use messages::{ClientId, ClientMessage, CursorPos, PlaybackState, ServerMessage};
