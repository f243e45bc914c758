//! Client-side mirrors for the Jamloft sync core.
//!
//! Neither component here ever becomes authoritative: the [`Follower`]
//! replays playback timeline snapshots and corrects local drift, and the
//! [`Reconciler`] merges authoritative document updates into an
//! optimistically edited mirror without visible reversion.

pub mod bridge;
pub mod follower;
pub mod pending;
pub mod reconciler;

pub use bridge::{BridgeError, ServerBridge};
pub use follower::{Correction, Follower, LocalPlayer, DRIFT_THRESHOLD_MS, SYNC_INTERVAL_MS};
pub use pending::{FieldKey, FieldValue, PendingEdit, PendingResolution, PENDING_TTL_MS};
pub use reconciler::Reconciler;
