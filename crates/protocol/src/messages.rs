use serde::{Deserialize, Serialize};

use model::{Operation, Rational, SongDocument, VideoRef};

/// Opaque connection identifier assigned by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u64);

/// Ephemeral presence cursor inside a document editor.
///
/// Fire-and-forget: never acknowledged, never persisted, dropped under load
/// without consequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPos {
    pub lane: f64,
    pub step: f64,
}

/// Canonical playback timeline snapshot broadcast to the playback topic.
///
/// While `is_playing` is false, `base_timestamp` carries the frozen elapsed
/// milliseconds instead of a wall-clock anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    #[serde(rename = "ref")]
    pub video: VideoRef,
    pub base_index: u32,
    pub base_timestamp: i64,
    pub playback_rate: Rational,
    pub is_playing: bool,
}

/// Messages sent from a client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload")]
pub enum ClientMessage {
    #[serde(rename = "playback.reportOrder")]
    ReportOrder { order: Vec<String> },
    #[serde(rename = "playback.reportDuration")]
    ReportDuration {
        #[serde(rename = "ref")]
        video: String,
        seconds: f64,
    },
    #[serde(rename = "playback.ended")]
    Ended {
        #[serde(rename = "ref")]
        video: String,
    },
    #[serde(rename = "playback.requestState")]
    RequestState {},
    #[serde(rename = "playback.setVideo")]
    SetVideo {
        #[serde(rename = "ref")]
        video: String,
    },
    #[serde(rename = "playback.skip")]
    Skip {},
    #[serde(rename = "playback.enqueue")]
    Enqueue { refs: Vec<String> },
    #[serde(rename = "playback.clearQueue")]
    ClearQueue {},
    #[serde(rename = "playback.setPaused")]
    SetPaused { paused: bool },
    #[serde(rename = "playback.setRate")]
    SetRate { rate: Rational },
    #[serde(rename = "doc.join", rename_all = "camelCase")]
    DocJoin { document_id: String },
    #[serde(rename = "doc.leave", rename_all = "camelCase")]
    DocLeave { document_id: String },
    #[serde(rename = "doc.applyOps", rename_all = "camelCase")]
    DocApplyOps {
        document_id: String,
        client_revision: u64,
        operations: Vec<Operation>,
    },
    #[serde(rename = "doc.cursor", rename_all = "camelCase")]
    DocCursor {
        document_id: String,
        cursor: CursorPos,
    },
}

/// Messages broadcast or delivered by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload")]
pub enum ServerMessage {
    #[serde(rename = "playback.state")]
    PlaybackState(PlaybackState),
    #[serde(rename = "doc.snapshot", rename_all = "camelCase")]
    DocSnapshot {
        document: SongDocument,
        revision: u64,
    },
    #[serde(rename = "doc.delta", rename_all = "camelCase")]
    DocDelta {
        document_id: String,
        operations: Vec<Operation>,
        revision: u64,
    },
    #[serde(rename = "doc.cursor", rename_all = "camelCase")]
    DocCursor {
        document_id: String,
        client: ClientId,
        cursor: CursorPos,
    },
}
