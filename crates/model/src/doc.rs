use serde::{Deserialize, Serialize};

/// Fixed lane set of the step grid, top to bottom.
pub const LANES: [&str; 8] = [
    "kick",
    "snare",
    "clap",
    "hat_closed",
    "hat_open",
    "tom_low",
    "tom_high",
    "perc",
];

/// Number of arrangement tracks clips and sfx events can target.
pub const TRACK_COUNT: u32 = 8;

pub const MIN_TEMPO: u32 = 40;
pub const MAX_TEMPO: u32 = 240;
pub const MIN_BARS: u32 = 1;
pub const MAX_BARS: u32 = 32;
pub const MIN_PITCH: u8 = 21;
pub const MAX_PITCH: u8 = 108;
pub const MIN_VELOCITY: f32 = 0.05;
pub const MAX_VELOCITY: f32 = 1.0;

const DEFAULT_TEMPO: u32 = 120;
const DEFAULT_BARS: u32 = 4;
const DEFAULT_STEPS_PER_BAR: u32 = 16;

/// One piano-roll note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub pitch: u8,
    pub velocity: f32,
    pub start_step: u32,
    pub length_steps: u32,
}

/// A named note pattern with its own bar length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub id: String,
    pub name: String,
    pub bars: u32,
    pub notes: Vec<Note>,
}

/// Placement of a pattern on an arrangement track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: String,
    pub track: u32,
    pub start_step: u32,
    pub length_steps: u32,
    pub pattern_id: String,
}

/// One-shot sample event on an arrangement track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SfxEvent {
    pub id: String,
    pub track: u32,
    pub start_step: u32,
    pub length_steps: u32,
    pub source_ref: String,
    pub gain: f32,
    pub pan: f32,
    pub offset_ms: i32,
}

/// Shared transport block.
///
/// `base_bar`/`base_timestamp` anchor the playhead the same way the playback
/// timeline anchors video position; the loop region is expressed in bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transport {
    pub playing: bool,
    pub base_bar: f64,
    pub base_timestamp: i64,
    pub loop_enabled: bool,
    pub loop_start_bar: f64,
    pub loop_end_bar: f64,
}

impl Transport {
    fn new(bars: u32) -> Self {
        Self {
            playing: false,
            base_bar: 0.0,
            base_timestamp: 0,
            loop_enabled: false,
            loop_start_bar: 0.0,
            loop_end_bar: f64::from(bars),
        }
    }
}

/// Canonical collaborative sequencer document.
///
/// Mutated only through [`crate::apply::apply_batch`]; `revision` strictly
/// increases on every accepted batch and is bumped by the owning authority,
/// never by the application function itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongDocument {
    pub id: String,
    pub tempo: u32,
    pub bars: u32,
    pub steps_per_bar: u32,
    /// `grid[lane][step]`, one row per entry in [`LANES`].
    pub grid: Vec<Vec<bool>>,
    /// Legacy flat note list kept for older clients.
    pub notes: Vec<Note>,
    pub patterns: Vec<Pattern>,
    pub active_pattern_id: Option<String>,
    pub clips: Vec<Clip>,
    pub sfx_events: Vec<SfxEvent>,
    pub transport: Transport,
    pub revision: u64,
}

impl SongDocument {
    /// Creates an empty document for `id` with default dimensions.
    pub fn new(id: impl Into<String>) -> Self {
        let bars = DEFAULT_BARS;
        let steps_per_bar = DEFAULT_STEPS_PER_BAR;
        let total = (bars * steps_per_bar) as usize;
        Self {
            id: id.into(),
            tempo: DEFAULT_TEMPO,
            bars,
            steps_per_bar,
            grid: vec![vec![false; total]; LANES.len()],
            notes: Vec::new(),
            patterns: Vec::new(),
            active_pattern_id: None,
            clips: Vec::new(),
            sfx_events: Vec::new(),
            transport: Transport::new(bars),
            revision: 0,
        }
    }

    /// Total step count of the document grid.
    pub fn total_steps(&self) -> u32 {
        self.bars * self.steps_per_bar
    }

    pub fn pattern(&self, id: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|pattern| pattern.id == id)
    }

    pub(crate) fn pattern_mut(&mut self, id: &str) -> Option<&mut Pattern> {
        self.patterns.iter_mut().find(|pattern| pattern.id == id)
    }

    pub fn note(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|note| note.id == id)
    }

    pub(crate) fn note_mut(&mut self, id: &str) -> Option<&mut Note> {
        self.notes.iter_mut().find(|note| note.id == id)
    }

    pub fn clip(&self, id: &str) -> Option<&Clip> {
        self.clips.iter().find(|clip| clip.id == id)
    }

    pub(crate) fn clip_mut(&mut self, id: &str) -> Option<&mut Clip> {
        self.clips.iter_mut().find(|clip| clip.id == id)
    }

    pub fn sfx(&self, id: &str) -> Option<&SfxEvent> {
        self.sfx_events.iter().find(|sfx| sfx.id == id)
    }

    pub(crate) fn sfx_mut(&mut self, id: &str) -> Option<&mut SfxEvent> {
        self.sfx_events.iter_mut().find(|sfx| sfx.id == id)
    }
}
