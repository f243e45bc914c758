use serde::{Deserialize, Serialize};

use crate::doc::{Clip, Note, Pattern, SfxEvent};

/// One document mutation.
///
/// Operations carry only tag-relevant fields and are never assumed
/// idempotent by the authority; the wire tag is the snake_case variant name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    #[serde(rename_all = "camelCase")]
    ToggleStep { lane: u32, step: u32 },
    #[serde(rename_all = "camelCase")]
    SetTempo { tempo: f64 },
    #[serde(rename_all = "camelCase")]
    NoteAdd { note: Note },
    #[serde(rename_all = "camelCase")]
    NoteUpdate {
        id: String,
        #[serde(flatten)]
        patch: NotePatch,
    },
    #[serde(rename_all = "camelCase")]
    NoteDelete { id: String },
    #[serde(rename_all = "camelCase")]
    PatternAdd { pattern: Pattern },
    #[serde(rename_all = "camelCase")]
    PatternUpdate {
        id: String,
        #[serde(flatten)]
        patch: PatternPatch,
    },
    #[serde(rename_all = "camelCase")]
    PatternDelete { id: String },
    #[serde(rename_all = "camelCase")]
    PatternSelect { id: Option<String> },
    #[serde(rename_all = "camelCase")]
    ClipAdd { clip: Clip },
    #[serde(rename_all = "camelCase")]
    ClipUpdate {
        id: String,
        #[serde(flatten)]
        patch: ClipPatch,
    },
    #[serde(rename_all = "camelCase")]
    ClipDelete { id: String },
    #[serde(rename_all = "camelCase")]
    SfxAdd { sfx: SfxEvent },
    #[serde(rename_all = "camelCase")]
    SfxUpdate {
        id: String,
        #[serde(flatten)]
        patch: SfxPatch,
    },
    #[serde(rename_all = "camelCase")]
    SfxDelete { id: String },
    #[serde(rename_all = "camelCase")]
    SetBars { bars: u32 },
    #[serde(rename_all = "camelCase")]
    SetLoop {
        enabled: bool,
        start_bar: f64,
        end_bar: f64,
    },
    #[serde(rename_all = "camelCase")]
    SetTransport {
        playing: bool,
        base_bar: f64,
        base_timestamp: i64,
    },
}

impl Operation {
    /// True when the effect of the operation cannot be safely derived from a
    /// diff alone, so the authority pushes a full snapshot alongside the
    /// delta.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::PatternAdd { .. }
                | Self::PatternUpdate { .. }
                | Self::PatternDelete { .. }
                | Self::PatternSelect { .. }
                | Self::ClipAdd { .. }
                | Self::ClipUpdate { .. }
                | Self::ClipDelete { .. }
                | Self::SfxAdd { .. }
                | Self::SfxUpdate { .. }
                | Self::SfxDelete { .. }
                | Self::SetBars { .. }
        )
    }
}

/// Partial note update; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_step: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length_steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f32>,
}

/// Partial pattern update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bars: Option<u32>,
}

/// Partial clip update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_step: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length_steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_id: Option<String>,
}

/// Partial sfx update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SfxPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_step: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length_steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gain: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pan: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_ms: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::{NotePatch, Operation};

    #[test]
    fn operations_tag_with_snake_case_type() {
        let op = Operation::ToggleStep { lane: 2, step: 7 };
        let json = serde_json::to_value(&op).expect("serialize");
        assert_eq!(json["type"], "toggle_step");
        assert_eq!(json["lane"], 2);
        assert_eq!(json["step"], 7);
    }

    #[test]
    fn update_patch_fields_flatten_into_the_operation() {
        let op = Operation::NoteUpdate {
            id: "n1".into(),
            patch: NotePatch {
                start_step: Some(4),
                ..NotePatch::default()
            },
        };
        let json = serde_json::to_value(&op).expect("serialize");
        assert_eq!(json["type"], "note_update");
        assert_eq!(json["startStep"], 4);
        assert!(json.get("lengthSteps").is_none());
    }

    #[test]
    fn structural_flag_covers_shape_changing_operations() {
        assert!(Operation::SetBars { bars: 2 }.is_structural());
        assert!(Operation::PatternDelete { id: "p".into() }.is_structural());
        assert!(!Operation::ToggleStep { lane: 0, step: 0 }.is_structural());
        assert!(!Operation::SetTempo { tempo: 120.0 }.is_structural());
    }
}
