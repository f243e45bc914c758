use std::collections::HashMap;

use tracing::debug;

use model::{
    ClipPatch, NotePatch, Operation, PatternPatch, SfxPatch, SongDocument, apply_batch,
};

use crate::pending::{
    ClipField, FieldKey, FieldValue, NoteField, PatternField, PendingEdit, PendingResolution,
    SfxField,
};

/// Client-side document mirror with optimistic edits.
///
/// Every locally initiated mutation is applied to the mirror and recorded as
/// a pending edit before the operation is sent, so an authoritative snapshot
/// racing the echo cannot visibly revert the edit. Deltas always apply (the
/// authority broadcasts already-clamped operations); snapshots merge
/// field-by-field against the pending map.
#[derive(Debug, Default)]
pub struct Reconciler {
    document: Option<SongDocument>,
    pending: HashMap<FieldKey, PendingEdit>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(&self) -> Option<&SongDocument> {
        self.document.as_ref()
    }

    /// Revision of the mirror, 0 before the first snapshot.
    pub fn revision(&self) -> u64 {
        self.document.as_ref().map_or(0, |doc| doc.revision)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Applies local edits optimistically and returns the clamped operations
    /// to send to the authority.
    ///
    /// Pending edits are recorded here, before the caller gets the chance to
    /// transmit anything, which is what makes the snapshot race safe.
    pub fn apply_local(&mut self, operations: &[Operation], now_ms: i64) -> Vec<Operation> {
        let Some(doc) = self.document.as_mut() else {
            return Vec::new();
        };
        let outcome = apply_batch(doc, operations);
        for operation in &outcome.applied {
            for (key, value) in pending_entries(doc, operation) {
                self.pending.insert(key, PendingEdit::new(value, now_ms));
            }
        }
        outcome.applied
    }

    /// Applies an authoritative operation delta to the mirror.
    ///
    /// Absolute operations replay as-is; a matching value confirms the
    /// corresponding pending edit. Step toggles are relative, so an echo of
    /// our own toggle is consumed instead of replayed (replaying would undo
    /// the optimistic flip).
    pub fn on_delta(&mut self, operations: &[Operation], revision: u64) {
        let Some(mut doc) = self.document.take() else {
            return;
        };

        for operation in operations {
            if let Operation::ToggleStep { lane, step } = operation {
                let key = FieldKey::Step {
                    lane: *lane,
                    step: *step,
                };
                let is_echo = self
                    .pending
                    .get(&key)
                    .is_some_and(|edit| read_field(&doc, &key).as_ref() == Some(&edit.desired));
                if is_echo {
                    self.pending.remove(&key);
                    continue;
                }
                apply_batch(&mut doc, std::slice::from_ref(operation));
            } else {
                apply_batch(&mut doc, std::slice::from_ref(operation));
                for (key, value) in pending_entries(&doc, operation) {
                    if self
                        .pending
                        .get(&key)
                        .is_some_and(|edit| edit.desired == value)
                    {
                        self.pending.remove(&key);
                    }
                }
            }
        }

        doc.revision = revision;
        self.document = Some(doc);
    }

    /// Merges an authoritative full snapshot without discarding in-flight
    /// edits.
    ///
    /// Each pending field resolves independently: a matching snapshot value
    /// confirms it, a mismatch younger than the TTL keeps the local value on
    /// top of the adopted snapshot, and anything older is treated as an
    /// abandoned edit whose acknowledgement was lost.
    pub fn on_snapshot(&mut self, mut document: SongDocument, revision: u64, now_ms: i64) {
        document.revision = revision;

        let mut kept: Vec<(FieldKey, FieldValue)> = Vec::new();
        self.pending.retain(|key, edit| {
            match edit.resolve(read_field(&document, key).as_ref(), now_ms) {
                PendingResolution::Confirmed => {
                    debug!(?key, "pending edit confirmed by snapshot");
                    false
                }
                PendingResolution::Abandoned => {
                    debug!(?key, "pending edit abandoned");
                    false
                }
                PendingResolution::KeptLocal => {
                    kept.push((key.clone(), edit.desired.clone()));
                    true
                }
            }
        });

        for (key, desired) in kept {
            if let Some(operation) = write_back_op(&document, &key, &desired) {
                apply_batch(&mut document, &[operation]);
            }
        }

        self.document = Some(document);
    }

    /// Drops pending edits whose TTL has elapsed. The snapshot path already
    /// does this; sessions that only ever see deltas call it periodically to
    /// bound the map.
    pub fn prune_expired(&mut self, now_ms: i64) {
        self.pending
            .retain(|_, edit| now_ms - edit.since_ms < crate::pending::PENDING_TTL_MS);
    }
}

/// Field/value pairs a (just applied) operation pins, read back from the
/// document so the recorded desire matches what the mirror actually holds.
fn pending_entries(doc: &SongDocument, operation: &Operation) -> Vec<(FieldKey, FieldValue)> {
    let mut entries = Vec::new();
    let push = |key: FieldKey, entries: &mut Vec<(FieldKey, FieldValue)>| {
        if let Some(value) = read_field(doc, &key) {
            entries.push((key, value));
        }
    };

    match operation {
        Operation::ToggleStep { lane, step } => push(
            FieldKey::Step {
                lane: *lane,
                step: *step,
            },
            &mut entries,
        ),
        Operation::SetTempo { .. } => push(FieldKey::Tempo, &mut entries),
        Operation::SetBars { .. } => push(FieldKey::Bars, &mut entries),
        Operation::PatternSelect { .. } => push(FieldKey::ActivePattern, &mut entries),
        Operation::SetLoop { .. } => push(FieldKey::LoopRegion, &mut entries),
        Operation::SetTransport { .. } => push(FieldKey::Transport, &mut entries),
        Operation::NoteUpdate { id, patch } => {
            let fields = [
                (patch.start_step.is_some(), NoteField::StartStep),
                (patch.length_steps.is_some(), NoteField::LengthSteps),
                (patch.pitch.is_some(), NoteField::Pitch),
                (patch.velocity.is_some(), NoteField::Velocity),
            ];
            for (present, field) in fields {
                if present {
                    push(
                        FieldKey::Note {
                            id: id.clone(),
                            field,
                        },
                        &mut entries,
                    );
                }
            }
        }
        Operation::PatternUpdate { id, patch } => {
            let fields = [
                (patch.name.is_some(), PatternField::Name),
                (patch.bars.is_some(), PatternField::Bars),
            ];
            for (present, field) in fields {
                if present {
                    push(
                        FieldKey::Pattern {
                            id: id.clone(),
                            field,
                        },
                        &mut entries,
                    );
                }
            }
        }
        Operation::ClipUpdate { id, patch } => {
            let fields = [
                (patch.track.is_some(), ClipField::Track),
                (patch.start_step.is_some(), ClipField::StartStep),
                (patch.length_steps.is_some(), ClipField::LengthSteps),
                (patch.pattern_id.is_some(), ClipField::PatternRef),
            ];
            for (present, field) in fields {
                if present {
                    push(
                        FieldKey::Clip {
                            id: id.clone(),
                            field,
                        },
                        &mut entries,
                    );
                }
            }
        }
        Operation::SfxUpdate { id, patch } => {
            let fields = [
                (patch.track.is_some(), SfxField::Track),
                (patch.start_step.is_some(), SfxField::StartStep),
                (patch.length_steps.is_some(), SfxField::LengthSteps),
                (patch.gain.is_some(), SfxField::Gain),
                (patch.pan.is_some(), SfxField::Pan),
                (patch.offset_ms.is_some(), SfxField::OffsetMs),
            ];
            for (present, field) in fields {
                if present {
                    push(
                        FieldKey::Sfx {
                            id: id.clone(),
                            field,
                        },
                        &mut entries,
                    );
                }
            }
        }
        // Entity adds and deletes ride on the echo delta path alone.
        _ => {}
    }

    entries
}

fn read_field(doc: &SongDocument, key: &FieldKey) -> Option<FieldValue> {
    match key {
        FieldKey::Step { lane, step } => doc
            .grid
            .get(*lane as usize)?
            .get(*step as usize)
            .map(|value| FieldValue::Flag(*value)),
        FieldKey::Tempo => Some(FieldValue::Int(i64::from(doc.tempo))),
        FieldKey::Bars => Some(FieldValue::Int(i64::from(doc.bars))),
        FieldKey::ActivePattern => Some(FieldValue::MaybeText(doc.active_pattern_id.clone())),
        FieldKey::LoopRegion => Some(FieldValue::Loop {
            enabled: doc.transport.loop_enabled,
            start_bar: doc.transport.loop_start_bar,
            end_bar: doc.transport.loop_end_bar,
        }),
        FieldKey::Transport => Some(FieldValue::Transport {
            playing: doc.transport.playing,
            base_bar: doc.transport.base_bar,
            base_timestamp: doc.transport.base_timestamp,
        }),
        FieldKey::Note { id, field } => {
            let note = doc.note(id)?;
            Some(match field {
                NoteField::StartStep => FieldValue::Int(i64::from(note.start_step)),
                NoteField::LengthSteps => FieldValue::Int(i64::from(note.length_steps)),
                NoteField::Pitch => FieldValue::Int(i64::from(note.pitch)),
                NoteField::Velocity => FieldValue::Float(f64::from(note.velocity)),
            })
        }
        FieldKey::Pattern { id, field } => {
            let pattern = doc.pattern(id)?;
            Some(match field {
                PatternField::Name => FieldValue::Text(pattern.name.clone()),
                PatternField::Bars => FieldValue::Int(i64::from(pattern.bars)),
            })
        }
        FieldKey::Clip { id, field } => {
            let clip = doc.clip(id)?;
            Some(match field {
                ClipField::Track => FieldValue::Int(i64::from(clip.track)),
                ClipField::StartStep => FieldValue::Int(i64::from(clip.start_step)),
                ClipField::LengthSteps => FieldValue::Int(i64::from(clip.length_steps)),
                ClipField::PatternRef => FieldValue::Text(clip.pattern_id.clone()),
            })
        }
        FieldKey::Sfx { id, field } => {
            let sfx = doc.sfx(id)?;
            Some(match field {
                SfxField::Track => FieldValue::Int(i64::from(sfx.track)),
                SfxField::StartStep => FieldValue::Int(i64::from(sfx.start_step)),
                SfxField::LengthSteps => FieldValue::Int(i64::from(sfx.length_steps)),
                SfxField::Gain => FieldValue::Float(f64::from(sfx.gain)),
                SfxField::Pan => FieldValue::Float(f64::from(sfx.pan)),
                SfxField::OffsetMs => FieldValue::Int(i64::from(sfx.offset_ms)),
            })
        }
    }
}

/// Builds the operation that re-applies a kept local value on top of a
/// freshly adopted snapshot. Going through the normal operation path keeps
/// every clamp intact even when the snapshot changed the document shape.
fn write_back_op(doc: &SongDocument, key: &FieldKey, desired: &FieldValue) -> Option<Operation> {
    match (key, desired) {
        (FieldKey::Step { lane, step }, FieldValue::Flag(value)) => match read_field(doc, key) {
            Some(FieldValue::Flag(current)) if current != *value => Some(Operation::ToggleStep {
                lane: *lane,
                step: *step,
            }),
            _ => None,
        },
        (FieldKey::Tempo, FieldValue::Int(value)) => Some(Operation::SetTempo {
            tempo: *value as f64,
        }),
        (FieldKey::Bars, FieldValue::Int(value)) => Some(Operation::SetBars {
            bars: *value as u32,
        }),
        (FieldKey::ActivePattern, FieldValue::MaybeText(id)) => {
            Some(Operation::PatternSelect { id: id.clone() })
        }
        (
            FieldKey::LoopRegion,
            FieldValue::Loop {
                enabled,
                start_bar,
                end_bar,
            },
        ) => Some(Operation::SetLoop {
            enabled: *enabled,
            start_bar: *start_bar,
            end_bar: *end_bar,
        }),
        (
            FieldKey::Transport,
            FieldValue::Transport {
                playing,
                base_bar,
                base_timestamp,
            },
        ) => Some(Operation::SetTransport {
            playing: *playing,
            base_bar: *base_bar,
            base_timestamp: *base_timestamp,
        }),
        (FieldKey::Note { id, field }, value) => {
            let mut patch = NotePatch::default();
            match (field, value) {
                (NoteField::StartStep, FieldValue::Int(v)) => patch.start_step = Some(*v as u32),
                (NoteField::LengthSteps, FieldValue::Int(v)) => {
                    patch.length_steps = Some(*v as u32)
                }
                (NoteField::Pitch, FieldValue::Int(v)) => patch.pitch = Some(*v as u8),
                (NoteField::Velocity, FieldValue::Float(v)) => patch.velocity = Some(*v as f32),
                _ => return None,
            }
            Some(Operation::NoteUpdate {
                id: id.clone(),
                patch,
            })
        }
        (FieldKey::Pattern { id, field }, value) => {
            let mut patch = PatternPatch::default();
            match (field, value) {
                (PatternField::Name, FieldValue::Text(v)) => patch.name = Some(v.clone()),
                (PatternField::Bars, FieldValue::Int(v)) => patch.bars = Some(*v as u32),
                _ => return None,
            }
            Some(Operation::PatternUpdate {
                id: id.clone(),
                patch,
            })
        }
        (FieldKey::Clip { id, field }, value) => {
            let mut patch = ClipPatch::default();
            match (field, value) {
                (ClipField::Track, FieldValue::Int(v)) => patch.track = Some(*v as u32),
                (ClipField::StartStep, FieldValue::Int(v)) => patch.start_step = Some(*v as u32),
                (ClipField::LengthSteps, FieldValue::Int(v)) => {
                    patch.length_steps = Some(*v as u32)
                }
                (ClipField::PatternRef, FieldValue::Text(v)) => patch.pattern_id = Some(v.clone()),
                _ => return None,
            }
            Some(Operation::ClipUpdate {
                id: id.clone(),
                patch,
            })
        }
        (FieldKey::Sfx { id, field }, value) => {
            let mut patch = SfxPatch::default();
            match (field, value) {
                (SfxField::Track, FieldValue::Int(v)) => patch.track = Some(*v as u32),
                (SfxField::StartStep, FieldValue::Int(v)) => patch.start_step = Some(*v as u32),
                (SfxField::LengthSteps, FieldValue::Int(v)) => {
                    patch.length_steps = Some(*v as u32)
                }
                (SfxField::Gain, FieldValue::Float(v)) => patch.gain = Some(*v as f32),
                (SfxField::Pan, FieldValue::Float(v)) => patch.pan = Some(*v as f32),
                (SfxField::OffsetMs, FieldValue::Int(v)) => patch.offset_ms = Some(*v as i32),
                _ => return None,
            }
            Some(Operation::SfxUpdate {
                id: id.clone(),
                patch,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use model::{Clip, ClipPatch, Operation, Pattern, SongDocument, apply_batch};

    use super::Reconciler;

    /// Document with one pattern and one clip at start step 5.
    fn seeded_doc() -> SongDocument {
        let mut doc = SongDocument::new("room-1");
        apply_batch(
            &mut doc,
            &[
                Operation::PatternAdd {
                    pattern: Pattern {
                        id: "p1".into(),
                        name: "verse".into(),
                        bars: 2,
                        notes: Vec::new(),
                    },
                },
                Operation::ClipAdd {
                    clip: Clip {
                        id: "c1".into(),
                        track: 0,
                        start_step: 5,
                        length_steps: 4,
                        pattern_id: "p1".into(),
                    },
                },
            ],
        );
        doc
    }

    fn move_clip(start_step: u32) -> Operation {
        Operation::ClipUpdate {
            id: "c1".into(),
            patch: ClipPatch {
                start_step: Some(start_step),
                ..ClipPatch::default()
            },
        }
    }

    fn clip_start(reconciler: &Reconciler) -> u32 {
        reconciler
            .document()
            .expect("mirror should exist")
            .clip("c1")
            .expect("clip should exist")
            .start_step
    }

    #[test]
    fn local_edits_before_join_are_ignored() {
        let mut reconciler = Reconciler::new();
        assert!(reconciler.apply_local(&[move_clip(10)], 0).is_empty());
        assert_eq!(reconciler.pending_count(), 0);
    }

    #[test]
    fn snapshot_within_ttl_does_not_revert_an_in_flight_edit() {
        let mut reconciler = Reconciler::new();
        reconciler.on_snapshot(seeded_doc(), 1, 0);

        let sent = reconciler.apply_local(&[move_clip(10)], 1_000);
        assert_eq!(sent.len(), 1);
        assert_eq!(clip_start(&reconciler), 10);

        // Authoritative snapshot still showing the old position arrives
        // before the echo: the local display must not snap back.
        reconciler.on_snapshot(seeded_doc(), 2, 2_000);
        assert_eq!(clip_start(&reconciler), 10);
        assert_eq!(reconciler.revision(), 2);
        assert_eq!(reconciler.pending_count(), 1);

        // The echo confirms and clears the pending edit.
        reconciler.on_delta(&sent, 3);
        assert_eq!(clip_start(&reconciler), 10);
        assert_eq!(reconciler.pending_count(), 0);
        assert_eq!(reconciler.revision(), 3);
    }

    #[test]
    fn snapshot_after_ttl_wins_over_an_abandoned_edit() {
        let mut reconciler = Reconciler::new();
        reconciler.on_snapshot(seeded_doc(), 1, 0);
        reconciler.apply_local(&[move_clip(10)], 1_000);

        reconciler.on_snapshot(seeded_doc(), 5, 6_500);
        assert_eq!(clip_start(&reconciler), 5);
        assert_eq!(reconciler.pending_count(), 0);
    }

    #[test]
    fn snapshot_missing_the_edited_entity_abandons_the_edit() {
        let mut reconciler = Reconciler::new();
        reconciler.on_snapshot(seeded_doc(), 1, 0);
        reconciler.apply_local(&[move_clip(10)], 1_000);

        reconciler.on_snapshot(SongDocument::new("room-1"), 2, 1_500);
        assert_eq!(reconciler.pending_count(), 0);
        assert!(reconciler.document().expect("mirror").clip("c1").is_none());
    }

    #[test]
    fn own_toggle_echo_is_consumed_not_replayed() {
        let mut reconciler = Reconciler::new();
        reconciler.on_snapshot(SongDocument::new("room-1"), 0, 0);

        let sent = reconciler.apply_local(&[Operation::ToggleStep { lane: 0, step: 0 }], 100);
        assert!(reconciler.document().expect("mirror").grid[0][0]);

        reconciler.on_delta(&sent, 1);
        assert!(reconciler.document().expect("mirror").grid[0][0]);
        assert_eq!(reconciler.pending_count(), 0);
    }

    #[test]
    fn foreign_toggle_applies_normally() {
        let mut reconciler = Reconciler::new();
        reconciler.on_snapshot(SongDocument::new("room-1"), 0, 0);

        reconciler.on_delta(&[Operation::ToggleStep { lane: 2, step: 3 }], 1);
        assert!(reconciler.document().expect("mirror").grid[2][3]);
        assert_eq!(reconciler.revision(), 1);
    }

    #[test]
    fn same_delta_stream_converges_mirrors_with_different_local_edits() {
        let mut alice = Reconciler::new();
        let mut bob = Reconciler::new();
        alice.on_snapshot(SongDocument::new("room-1"), 0, 0);
        bob.on_snapshot(SongDocument::new("room-1"), 0, 0);

        // Different unconfirmed local edits on each side.
        let alice_ops = alice.apply_local(&[Operation::ToggleStep { lane: 0, step: 0 }], 100);
        let bob_ops = bob.apply_local(&[Operation::SetTempo { tempo: 150.0 }], 100);

        // Authority applies Alice's batch then Bob's and broadcasts both.
        alice.on_delta(&alice_ops, 1);
        bob.on_delta(&alice_ops, 1);
        alice.on_delta(&bob_ops, 2);
        bob.on_delta(&bob_ops, 2);

        assert_eq!(alice.document(), bob.document());
        assert_eq!(alice.pending_count(), 0);
        assert_eq!(bob.pending_count(), 0);
    }

    #[test]
    fn kept_local_value_is_reclamped_against_the_new_shape() {
        let mut reconciler = Reconciler::new();
        reconciler.on_snapshot(seeded_doc(), 1, 0);
        reconciler.apply_local(&[move_clip(40)], 1_000);

        // The authority shrank the grid to 32 steps in the meantime; the
        // kept local start step must land inside the new bounds.
        let mut shrunk = seeded_doc();
        apply_batch(&mut shrunk, &[Operation::SetBars { bars: 2 }]);
        reconciler.on_snapshot(shrunk, 3, 2_000);

        assert_eq!(clip_start(&reconciler), 31);
    }

    #[test]
    fn prune_expired_drops_stale_entries() {
        let mut reconciler = Reconciler::new();
        reconciler.on_snapshot(seeded_doc(), 1, 0);
        reconciler.apply_local(&[move_clip(10)], 1_000);

        reconciler.prune_expired(5_999);
        assert_eq!(reconciler.pending_count(), 1);
        reconciler.prune_expired(6_000);
        assert_eq!(reconciler.pending_count(), 0);
    }
}
