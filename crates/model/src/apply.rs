use tracing::debug;

use crate::doc::{
    Clip, LANES, MAX_BARS, MAX_PITCH, MAX_TEMPO, MAX_VELOCITY, MIN_BARS, MIN_PITCH, MIN_TEMPO,
    MIN_VELOCITY, Note, Pattern, SfxEvent, SongDocument, TRACK_COUNT,
};
use crate::ops::{ClipPatch, NotePatch, Operation, PatternPatch, SfxPatch};

const MIN_GAIN: f32 = 0.0;
const MAX_GAIN: f32 = 2.0;
const MAX_SFX_OFFSET_MS: i32 = 1_000;

/// Result of applying one operation batch.
///
/// `applied` holds the operations as actually applied, with every field
/// already clamped; rebroadcasting these (rather than the raw client input)
/// is what lets mirrors converge by replaying the identical mutations.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub applied: Vec<Operation>,
    pub structural: bool,
}

impl BatchOutcome {
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Applies a batch of operations to a document.
///
/// Well-formed operations are validated, clamped into the document's current
/// bounds and applied; malformed operations are dropped silently. The
/// revision counter is untouched here: bumping it once per accepted batch is
/// the owning authority's job.
pub fn apply_batch(doc: &mut SongDocument, operations: &[Operation]) -> BatchOutcome {
    let mut applied = Vec::with_capacity(operations.len());
    let mut structural = false;

    for operation in operations {
        match apply_operation(doc, operation) {
            Some(echo) => {
                structural |= echo.is_structural();
                applied.push(echo);
            }
            None => debug!(document = %doc.id, ?operation, "operation dropped"),
        }
    }

    BatchOutcome {
        applied,
        structural,
    }
}

fn apply_operation(doc: &mut SongDocument, operation: &Operation) -> Option<Operation> {
    match operation {
        Operation::ToggleStep { lane, step } => toggle_step(doc, *lane, *step),
        Operation::SetTempo { tempo } => set_tempo(doc, *tempo),
        Operation::NoteAdd { note } => note_add(doc, note),
        Operation::NoteUpdate { id, patch } => note_update(doc, id, patch),
        Operation::NoteDelete { id } => note_delete(doc, id),
        Operation::PatternAdd { pattern } => pattern_add(doc, pattern),
        Operation::PatternUpdate { id, patch } => pattern_update(doc, id, patch),
        Operation::PatternDelete { id } => pattern_delete(doc, id),
        Operation::PatternSelect { id } => pattern_select(doc, id.as_deref()),
        Operation::ClipAdd { clip } => clip_add(doc, clip),
        Operation::ClipUpdate { id, patch } => clip_update(doc, id, patch),
        Operation::ClipDelete { id } => clip_delete(doc, id),
        Operation::SfxAdd { sfx } => sfx_add(doc, sfx),
        Operation::SfxUpdate { id, patch } => sfx_update(doc, id, patch),
        Operation::SfxDelete { id } => sfx_delete(doc, id),
        Operation::SetBars { bars } => set_bars(doc, *bars),
        Operation::SetLoop {
            enabled,
            start_bar,
            end_bar,
        } => set_loop(doc, *enabled, *start_bar, *end_bar),
        Operation::SetTransport {
            playing,
            base_bar,
            base_timestamp,
        } => set_transport(doc, *playing, *base_bar, *base_timestamp),
    }
}

fn toggle_step(doc: &mut SongDocument, lane: u32, step: u32) -> Option<Operation> {
    let lane = (lane as usize).min(LANES.len() - 1);
    let step = step.min(doc.total_steps() - 1);
    let cell = &mut doc.grid[lane][step as usize];
    *cell = !*cell;
    Some(Operation::ToggleStep {
        lane: lane as u32,
        step,
    })
}

fn set_tempo(doc: &mut SongDocument, tempo: f64) -> Option<Operation> {
    if !tempo.is_finite() {
        return None;
    }
    let rounded = tempo.round().clamp(f64::from(MIN_TEMPO), f64::from(MAX_TEMPO)) as u32;
    doc.tempo = rounded;
    Some(Operation::SetTempo {
        tempo: f64::from(rounded),
    })
}

fn note_add(doc: &mut SongDocument, note: &Note) -> Option<Operation> {
    if note.id.is_empty() || doc.note(&note.id).is_some() {
        return None;
    }
    let clamped = clamp_note(doc.total_steps(), note)?;
    doc.notes.push(clamped.clone());
    Some(Operation::NoteAdd { note: clamped })
}

fn note_update(doc: &mut SongDocument, id: &str, patch: &NotePatch) -> Option<Operation> {
    if let Some(velocity) = patch.velocity
        && !velocity.is_finite()
    {
        return None;
    }
    let total = doc.total_steps();
    let note = doc.note_mut(id)?;

    let mut echo = NotePatch::default();
    if let Some(start_step) = patch.start_step {
        note.start_step = start_step.min(total - 1);
        echo.start_step = Some(note.start_step);
    }
    if let Some(length_steps) = patch.length_steps {
        note.length_steps = length_steps;
        echo.length_steps = Some(length_steps);
    }
    if let Some(pitch) = patch.pitch {
        note.pitch = pitch.clamp(MIN_PITCH, MAX_PITCH);
        echo.pitch = Some(note.pitch);
    }
    if let Some(velocity) = patch.velocity {
        note.velocity = velocity.clamp(MIN_VELOCITY, MAX_VELOCITY);
        echo.velocity = Some(note.velocity);
    }

    // Moving the start can push the tail past the grid end.
    note.length_steps = note.length_steps.clamp(1, total - note.start_step);
    if echo.length_steps.is_some() {
        echo.length_steps = Some(note.length_steps);
    }

    Some(Operation::NoteUpdate {
        id: id.to_owned(),
        patch: echo,
    })
}

fn note_delete(doc: &mut SongDocument, id: &str) -> Option<Operation> {
    let before = doc.notes.len();
    doc.notes.retain(|note| note.id != id);
    (doc.notes.len() < before).then(|| Operation::NoteDelete { id: id.to_owned() })
}

fn pattern_add(doc: &mut SongDocument, pattern: &Pattern) -> Option<Operation> {
    if pattern.id.is_empty() || doc.pattern(&pattern.id).is_some() {
        return None;
    }
    let bars = pattern.bars.clamp(MIN_BARS, MAX_BARS);
    let pattern_total = bars * doc.steps_per_bar;
    let notes = pattern
        .notes
        .iter()
        .filter_map(|note| clamp_note(pattern_total, note))
        .collect();
    let clamped = Pattern {
        id: pattern.id.clone(),
        name: pattern.name.clone(),
        bars,
        notes,
    };
    doc.patterns.push(clamped.clone());
    Some(Operation::PatternAdd { pattern: clamped })
}

fn pattern_update(doc: &mut SongDocument, id: &str, patch: &PatternPatch) -> Option<Operation> {
    let steps_per_bar = doc.steps_per_bar;
    let pattern = doc.pattern_mut(id)?;

    let mut echo = PatternPatch::default();
    if let Some(name) = &patch.name {
        pattern.name = name.clone();
        echo.name = Some(name.clone());
    }
    if let Some(bars) = patch.bars {
        pattern.bars = bars.clamp(MIN_BARS, MAX_BARS);
        echo.bars = Some(pattern.bars);
        let pattern_total = pattern.bars * steps_per_bar;
        for note in &mut pattern.notes {
            clamp_note_in_place(pattern_total, note);
        }
    }

    Some(Operation::PatternUpdate {
        id: id.to_owned(),
        patch: echo,
    })
}

fn pattern_delete(doc: &mut SongDocument, id: &str) -> Option<Operation> {
    let before = doc.patterns.len();
    doc.patterns.retain(|pattern| pattern.id != id);
    if doc.patterns.len() == before {
        return None;
    }
    // Placements of a deleted pattern go with it.
    doc.clips.retain(|clip| clip.pattern_id != id);
    if doc.active_pattern_id.as_deref() == Some(id) {
        doc.active_pattern_id = None;
    }
    Some(Operation::PatternDelete { id: id.to_owned() })
}

fn pattern_select(doc: &mut SongDocument, id: Option<&str>) -> Option<Operation> {
    if let Some(id) = id
        && doc.pattern(id).is_none()
    {
        return None;
    }
    doc.active_pattern_id = id.map(str::to_owned);
    Some(Operation::PatternSelect {
        id: doc.active_pattern_id.clone(),
    })
}

fn clip_add(doc: &mut SongDocument, clip: &Clip) -> Option<Operation> {
    if clip.id.is_empty() || doc.clip(&clip.id).is_some() || doc.pattern(&clip.pattern_id).is_none()
    {
        return None;
    }
    let (start_step, length_steps) =
        clamp_step_range(doc.total_steps(), clip.start_step, clip.length_steps);
    let clamped = Clip {
        id: clip.id.clone(),
        track: clip.track.min(TRACK_COUNT - 1),
        start_step,
        length_steps,
        pattern_id: clip.pattern_id.clone(),
    };
    doc.clips.push(clamped.clone());
    Some(Operation::ClipAdd { clip: clamped })
}

fn clip_update(doc: &mut SongDocument, id: &str, patch: &ClipPatch) -> Option<Operation> {
    if let Some(pattern_id) = &patch.pattern_id
        && doc.pattern(pattern_id).is_none()
    {
        return None;
    }
    let total = doc.total_steps();
    let clip = doc.clip_mut(id)?;

    let mut echo = ClipPatch::default();
    if let Some(track) = patch.track {
        clip.track = track.min(TRACK_COUNT - 1);
        echo.track = Some(clip.track);
    }
    if let Some(start_step) = patch.start_step {
        clip.start_step = start_step.min(total - 1);
        echo.start_step = Some(clip.start_step);
    }
    if let Some(length_steps) = patch.length_steps {
        clip.length_steps = length_steps;
        echo.length_steps = Some(length_steps);
    }
    if let Some(pattern_id) = &patch.pattern_id {
        clip.pattern_id = pattern_id.clone();
        echo.pattern_id = Some(pattern_id.clone());
    }

    clip.length_steps = clip.length_steps.clamp(1, total - clip.start_step);
    if echo.length_steps.is_some() {
        echo.length_steps = Some(clip.length_steps);
    }

    Some(Operation::ClipUpdate {
        id: id.to_owned(),
        patch: echo,
    })
}

fn clip_delete(doc: &mut SongDocument, id: &str) -> Option<Operation> {
    let before = doc.clips.len();
    doc.clips.retain(|clip| clip.id != id);
    (doc.clips.len() < before).then(|| Operation::ClipDelete { id: id.to_owned() })
}

fn sfx_add(doc: &mut SongDocument, sfx: &SfxEvent) -> Option<Operation> {
    if sfx.id.is_empty() || sfx.source_ref.is_empty() || doc.sfx(&sfx.id).is_some() {
        return None;
    }
    if !sfx.gain.is_finite() || !sfx.pan.is_finite() {
        return None;
    }
    let (start_step, length_steps) =
        clamp_step_range(doc.total_steps(), sfx.start_step, sfx.length_steps);
    let clamped = SfxEvent {
        id: sfx.id.clone(),
        track: sfx.track.min(TRACK_COUNT - 1),
        start_step,
        length_steps,
        source_ref: sfx.source_ref.clone(),
        gain: sfx.gain.clamp(MIN_GAIN, MAX_GAIN),
        pan: sfx.pan.clamp(-1.0, 1.0),
        offset_ms: sfx.offset_ms.clamp(-MAX_SFX_OFFSET_MS, MAX_SFX_OFFSET_MS),
    };
    doc.sfx_events.push(clamped.clone());
    Some(Operation::SfxAdd { sfx: clamped })
}

fn sfx_update(doc: &mut SongDocument, id: &str, patch: &SfxPatch) -> Option<Operation> {
    if let Some(gain) = patch.gain
        && !gain.is_finite()
    {
        return None;
    }
    if let Some(pan) = patch.pan
        && !pan.is_finite()
    {
        return None;
    }
    let total = doc.total_steps();
    let sfx = doc.sfx_mut(id)?;

    let mut echo = SfxPatch::default();
    if let Some(track) = patch.track {
        sfx.track = track.min(TRACK_COUNT - 1);
        echo.track = Some(sfx.track);
    }
    if let Some(start_step) = patch.start_step {
        sfx.start_step = start_step.min(total - 1);
        echo.start_step = Some(sfx.start_step);
    }
    if let Some(length_steps) = patch.length_steps {
        sfx.length_steps = length_steps;
        echo.length_steps = Some(length_steps);
    }
    if let Some(gain) = patch.gain {
        sfx.gain = gain.clamp(MIN_GAIN, MAX_GAIN);
        echo.gain = Some(sfx.gain);
    }
    if let Some(pan) = patch.pan {
        sfx.pan = pan.clamp(-1.0, 1.0);
        echo.pan = Some(sfx.pan);
    }
    if let Some(offset_ms) = patch.offset_ms {
        sfx.offset_ms = offset_ms.clamp(-MAX_SFX_OFFSET_MS, MAX_SFX_OFFSET_MS);
        echo.offset_ms = Some(sfx.offset_ms);
    }

    sfx.length_steps = sfx.length_steps.clamp(1, total - sfx.start_step);
    if echo.length_steps.is_some() {
        echo.length_steps = Some(sfx.length_steps);
    }

    Some(Operation::SfxUpdate {
        id: id.to_owned(),
        patch: echo,
    })
}

fn sfx_delete(doc: &mut SongDocument, id: &str) -> Option<Operation> {
    let before = doc.sfx_events.len();
    doc.sfx_events.retain(|sfx| sfx.id != id);
    (doc.sfx_events.len() < before).then(|| Operation::SfxDelete { id: id.to_owned() })
}

fn set_bars(doc: &mut SongDocument, bars: u32) -> Option<Operation> {
    let bars = bars.clamp(MIN_BARS, MAX_BARS);
    doc.bars = bars;
    let total = doc.total_steps();

    for row in &mut doc.grid {
        row.resize(total as usize, false);
    }
    for note in &mut doc.notes {
        clamp_note_in_place(total, note);
    }
    for clip in &mut doc.clips {
        let (start_step, length_steps) = clamp_step_range(total, clip.start_step, clip.length_steps);
        clip.start_step = start_step;
        clip.length_steps = length_steps;
    }
    for sfx in &mut doc.sfx_events {
        let (start_step, length_steps) = clamp_step_range(total, sfx.start_step, sfx.length_steps);
        sfx.start_step = start_step;
        sfx.length_steps = length_steps;
    }

    let bars_f = f64::from(bars);
    let transport = &mut doc.transport;
    transport.base_bar = transport.base_bar.min(bars_f);
    transport.loop_start_bar = transport.loop_start_bar.min(bars_f);
    transport.loop_end_bar = transport.loop_end_bar.min(bars_f);
    if transport.loop_end_bar <= transport.loop_start_bar {
        transport.loop_enabled = false;
        transport.loop_start_bar = 0.0;
        transport.loop_end_bar = bars_f;
    }

    Some(Operation::SetBars { bars })
}

fn set_loop(doc: &mut SongDocument, enabled: bool, start_bar: f64, end_bar: f64) -> Option<Operation> {
    if !start_bar.is_finite() || !end_bar.is_finite() {
        return None;
    }
    let bars_f = f64::from(doc.bars);
    let mut enabled = enabled;
    let mut start_bar = start_bar.clamp(0.0, bars_f);
    let mut end_bar = end_bar.clamp(0.0, bars_f);
    if end_bar <= start_bar {
        enabled = false;
        start_bar = 0.0;
        end_bar = bars_f;
    }

    doc.transport.loop_enabled = enabled;
    doc.transport.loop_start_bar = start_bar;
    doc.transport.loop_end_bar = end_bar;
    Some(Operation::SetLoop {
        enabled,
        start_bar,
        end_bar,
    })
}

fn set_transport(
    doc: &mut SongDocument,
    playing: bool,
    base_bar: f64,
    base_timestamp: i64,
) -> Option<Operation> {
    if !base_bar.is_finite() {
        return None;
    }
    let base_bar = base_bar.clamp(0.0, f64::from(doc.bars));
    doc.transport.playing = playing;
    doc.transport.base_bar = base_bar;
    doc.transport.base_timestamp = base_timestamp;
    Some(Operation::SetTransport {
        playing,
        base_bar,
        base_timestamp,
    })
}

fn clamp_note(total: u32, note: &Note) -> Option<Note> {
    if !note.velocity.is_finite() {
        return None;
    }
    let (start_step, length_steps) = clamp_step_range(total, note.start_step, note.length_steps);
    Some(Note {
        id: note.id.clone(),
        pitch: note.pitch.clamp(MIN_PITCH, MAX_PITCH),
        velocity: note.velocity.clamp(MIN_VELOCITY, MAX_VELOCITY),
        start_step,
        length_steps,
    })
}

fn clamp_note_in_place(total: u32, note: &mut Note) {
    let (start_step, length_steps) = clamp_step_range(total, note.start_step, note.length_steps);
    note.start_step = start_step;
    note.length_steps = length_steps;
}

fn clamp_step_range(total: u32, start_step: u32, length_steps: u32) -> (u32, u32) {
    let start_step = start_step.min(total - 1);
    let length_steps = length_steps.clamp(1, total - start_step);
    (start_step, length_steps)
}

#[cfg(test)]
mod tests {
    use super::{BatchOutcome, apply_batch};
    use crate::doc::{Clip, LANES, Note, Pattern, SongDocument};
    use crate::ops::{NotePatch, Operation};

    fn doc() -> SongDocument {
        SongDocument::new("room-1")
    }

    fn note(id: &str, start_step: u32, length_steps: u32) -> Note {
        Note {
            id: id.into(),
            pitch: 60,
            velocity: 0.8,
            start_step,
            length_steps,
        }
    }

    fn pattern(id: &str) -> Pattern {
        Pattern {
            id: id.into(),
            name: format!("pattern {id}"),
            bars: 2,
            notes: Vec::new(),
        }
    }

    fn assert_in_bounds(doc: &SongDocument) {
        let total = doc.total_steps();
        for note in &doc.notes {
            assert!(note.start_step + note.length_steps <= total, "note {note:?}");
            assert!(note.length_steps >= 1);
        }
        for clip in &doc.clips {
            assert!(clip.start_step + clip.length_steps <= total, "clip {clip:?}");
        }
        for sfx in &doc.sfx_events {
            assert!(sfx.start_step + sfx.length_steps <= total, "sfx {sfx:?}");
        }
    }

    #[test]
    fn same_batch_from_same_state_is_deterministic() {
        let base = {
            let mut base = doc();
            apply_batch(
                &mut base,
                &[Operation::PatternAdd {
                    pattern: pattern("p1"),
                }],
            );
            base
        };
        let batch = vec![
            Operation::ToggleStep { lane: 1, step: 5 },
            Operation::SetTempo { tempo: 133.4 },
            Operation::ClipAdd {
                clip: Clip {
                    id: "c1".into(),
                    track: 99,
                    start_step: 100,
                    length_steps: 50,
                    pattern_id: "p1".into(),
                },
            },
        ];

        let mut left = base.clone();
        let mut right = base.clone();
        let left_outcome = apply_batch(&mut left, &batch);
        let right_outcome = apply_batch(&mut right, &batch);

        assert_eq!(left, right);
        assert_eq!(left_outcome, right_outcome);
    }

    #[test]
    fn toggle_step_clamps_lane_and_step_into_bounds() {
        let mut doc = doc();
        let outcome = apply_batch(&mut doc, &[Operation::ToggleStep { lane: 40, step: 999 }]);

        let last_lane = LANES.len() - 1;
        let last_step = doc.total_steps() - 1;
        assert!(doc.grid[last_lane][last_step as usize]);
        assert_eq!(
            outcome.applied,
            vec![Operation::ToggleStep {
                lane: last_lane as u32,
                step: last_step,
            }]
        );
    }

    #[test]
    fn set_tempo_rounds_and_clamps() {
        let mut doc = doc();
        apply_batch(&mut doc, &[Operation::SetTempo { tempo: 133.6 }]);
        assert_eq!(doc.tempo, 134);

        apply_batch(&mut doc, &[Operation::SetTempo { tempo: 999.0 }]);
        assert_eq!(doc.tempo, 240);

        apply_batch(&mut doc, &[Operation::SetTempo { tempo: 2.0 }]);
        assert_eq!(doc.tempo, 40);
    }

    #[test]
    fn non_finite_tempo_is_dropped() {
        let mut doc = doc();
        let outcome = apply_batch(
            &mut doc,
            &[Operation::SetTempo {
                tempo: f64::NAN,
            }],
        );
        assert!(outcome.is_empty());
        assert_eq!(doc.tempo, 120);
    }

    #[test]
    fn note_add_clamps_into_bounds_and_rejects_duplicates() {
        let mut doc = doc();
        let mut wild = note("n1", 500, 500);
        wild.pitch = 5;
        wild.velocity = 3.0;

        let outcome = apply_batch(&mut doc, &[Operation::NoteAdd { note: wild.clone() }]);
        assert_eq!(outcome.applied.len(), 1);
        let stored = doc.note("n1").expect("note should exist");
        assert_eq!(stored.start_step, 63);
        assert_eq!(stored.length_steps, 1);
        assert_eq!(stored.pitch, 21);
        assert_eq!(stored.velocity, 1.0);
        assert_in_bounds(&doc);

        let duplicate = apply_batch(&mut doc, &[Operation::NoteAdd { note: wild }]);
        assert!(duplicate.is_empty());
        assert_eq!(doc.notes.len(), 1);
    }

    #[test]
    fn note_update_keeps_tail_inside_grid_when_start_moves() {
        let mut doc = doc();
        apply_batch(&mut doc, &[Operation::NoteAdd { note: note("n1", 0, 16) }]);

        apply_batch(
            &mut doc,
            &[Operation::NoteUpdate {
                id: "n1".into(),
                patch: NotePatch {
                    start_step: Some(60),
                    ..NotePatch::default()
                },
            }],
        );

        let stored = doc.note("n1").expect("note should exist");
        assert_eq!(stored.start_step, 60);
        assert_eq!(stored.length_steps, 4);
        assert_in_bounds(&doc);
    }

    #[test]
    fn update_of_unknown_entity_is_dropped() {
        let mut doc = doc();
        let outcome = apply_batch(
            &mut doc,
            &[Operation::NoteUpdate {
                id: "ghost".into(),
                patch: NotePatch {
                    pitch: Some(70),
                    ..NotePatch::default()
                },
            }],
        );
        assert!(outcome.is_empty());
    }

    #[test]
    fn pattern_delete_cascades_to_clips_and_active_selection() {
        let mut doc = doc();
        apply_batch(
            &mut doc,
            &[
                Operation::PatternAdd { pattern: pattern("p1") },
                Operation::PatternAdd { pattern: pattern("p2") },
                Operation::PatternSelect { id: Some("p1".into()) },
                Operation::ClipAdd {
                    clip: Clip {
                        id: "c1".into(),
                        track: 0,
                        start_step: 0,
                        length_steps: 16,
                        pattern_id: "p1".into(),
                    },
                },
                Operation::ClipAdd {
                    clip: Clip {
                        id: "c2".into(),
                        track: 1,
                        start_step: 0,
                        length_steps: 16,
                        pattern_id: "p2".into(),
                    },
                },
            ],
        );

        let outcome = apply_batch(&mut doc, &[Operation::PatternDelete { id: "p1".into() }]);
        assert_eq!(outcome.applied.len(), 1);
        assert!(doc.pattern("p1").is_none());
        assert!(doc.clip("c1").is_none());
        assert!(doc.clip("c2").is_some());
        assert_eq!(doc.active_pattern_id, None);
    }

    #[test]
    fn pattern_select_of_unknown_pattern_is_dropped() {
        let mut doc = doc();
        let outcome = apply_batch(
            &mut doc,
            &[Operation::PatternSelect { id: Some("ghost".into()) }],
        );
        assert!(outcome.is_empty());
        assert_eq!(doc.active_pattern_id, None);
    }

    #[test]
    fn clip_add_requires_existing_pattern() {
        let mut doc = doc();
        let outcome = apply_batch(
            &mut doc,
            &[Operation::ClipAdd {
                clip: Clip {
                    id: "c1".into(),
                    track: 0,
                    start_step: 0,
                    length_steps: 8,
                    pattern_id: "ghost".into(),
                },
            }],
        );
        assert!(outcome.is_empty());
        assert!(doc.clips.is_empty());
    }

    #[test]
    fn set_bars_resize_truncates_grid_and_clamps_entities() {
        let mut doc = doc();
        assert_eq!(doc.total_steps(), 64);
        apply_batch(
            &mut doc,
            &[
                Operation::ToggleStep { lane: 0, step: 63 },
                Operation::NoteAdd { note: note("n1", 50, 10) },
            ],
        );

        let outcome = apply_batch(&mut doc, &[Operation::SetBars { bars: 2 }]);
        assert!(outcome.structural);
        assert_eq!(doc.total_steps(), 32);
        for row in &doc.grid {
            assert_eq!(row.len(), 32);
        }
        let stored = doc.note("n1").expect("note should exist");
        assert_eq!(stored.start_step, 31);
        assert_eq!(stored.length_steps, 1);
        assert_in_bounds(&doc);
    }

    #[test]
    fn set_bars_growth_zero_pads_grid_rows() {
        let mut doc = doc();
        apply_batch(&mut doc, &[Operation::ToggleStep { lane: 0, step: 10 }]);
        apply_batch(&mut doc, &[Operation::SetBars { bars: 8 }]);

        assert_eq!(doc.total_steps(), 128);
        assert!(doc.grid[0][10]);
        assert!(!doc.grid[0][127]);
    }

    #[test]
    fn set_loop_normalizes_inverted_region() {
        let mut doc = doc();
        let outcome = apply_batch(
            &mut doc,
            &[Operation::SetLoop {
                enabled: true,
                start_bar: 3.0,
                end_bar: 1.0,
            }],
        );
        assert_eq!(
            outcome.applied,
            vec![Operation::SetLoop {
                enabled: false,
                start_bar: 0.0,
                end_bar: 4.0,
            }]
        );
        assert!(!doc.transport.loop_enabled);
    }

    #[test]
    fn empty_or_fully_malformed_batch_is_a_no_op() {
        let mut doc = doc();
        let before = doc.clone();

        let empty: BatchOutcome = apply_batch(&mut doc, &[]);
        assert!(empty.is_empty());

        let malformed = apply_batch(
            &mut doc,
            &[
                Operation::NoteDelete { id: "ghost".into() },
                Operation::SetTempo { tempo: f64::INFINITY },
            ],
        );
        assert!(malformed.is_empty());
        assert_eq!(doc, before);
    }

    #[test]
    fn malformed_operations_do_not_block_the_rest_of_the_batch() {
        let mut doc = doc();
        let outcome = apply_batch(
            &mut doc,
            &[
                Operation::NoteDelete { id: "ghost".into() },
                Operation::ToggleStep { lane: 0, step: 0 },
            ],
        );
        assert_eq!(outcome.applied.len(), 1);
        assert!(doc.grid[0][0]);
    }
}
