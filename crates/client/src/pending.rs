/// How long an unconfirmed local edit shields its field from snapshots.
pub const PENDING_TTL_MS: i64 = 5_000;

/// Identity of one reconciled document field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Step { lane: u32, step: u32 },
    Tempo,
    Bars,
    ActivePattern,
    LoopRegion,
    Transport,
    Note { id: String, field: NoteField },
    Pattern { id: String, field: PatternField },
    Clip { id: String, field: ClipField },
    Sfx { id: String, field: SfxField },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteField {
    StartStep,
    LengthSteps,
    Pitch,
    Velocity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternField {
    Name,
    Bars,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClipField {
    Track,
    StartStep,
    LengthSteps,
    PatternRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SfxField {
    Track,
    StartStep,
    LengthSteps,
    Gain,
    Pan,
    OffsetMs,
}

/// Comparable value of one document field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Flag(bool),
    Int(i64),
    Float(f64),
    Text(String),
    MaybeText(Option<String>),
    Loop {
        enabled: bool,
        start_bar: f64,
        end_bar: f64,
    },
    Transport {
        playing: bool,
        base_bar: f64,
        base_timestamp: i64,
    },
}

/// An optimistic local edit awaiting its authoritative echo.
///
/// The edit sits in the `Unconfirmed` state from creation; resolving it
/// against authoritative data moves it to `Confirmed` (matching echo) or
/// `Abandoned` (TTL expired, or the entity disappeared), both of which drop
/// it from the map.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEdit {
    pub desired: FieldValue,
    pub since_ms: i64,
}

/// Outcome of resolving one pending edit against an authoritative value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingResolution {
    Confirmed,
    KeptLocal,
    Abandoned,
}

impl PendingEdit {
    pub fn new(desired: FieldValue, since_ms: i64) -> Self {
        Self { desired, since_ms }
    }

    /// Resolves this edit against the authoritative field value.
    ///
    /// `authoritative` is `None` when the entity no longer exists in the
    /// authoritative document; a field of a deleted entity cannot be kept.
    pub fn resolve(&self, authoritative: Option<&FieldValue>, now_ms: i64) -> PendingResolution {
        let Some(authoritative) = authoritative else {
            return PendingResolution::Abandoned;
        };
        if *authoritative == self.desired {
            return PendingResolution::Confirmed;
        }
        if now_ms - self.since_ms >= PENDING_TTL_MS {
            return PendingResolution::Abandoned;
        }
        PendingResolution::KeptLocal
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldValue, PENDING_TTL_MS, PendingEdit, PendingResolution};

    #[test]
    fn matching_echo_confirms() {
        let edit = PendingEdit::new(FieldValue::Int(10), 0);
        assert_eq!(
            edit.resolve(Some(&FieldValue::Int(10)), 100),
            PendingResolution::Confirmed
        );
    }

    #[test]
    fn young_mismatch_keeps_the_local_value() {
        let edit = PendingEdit::new(FieldValue::Int(10), 0);
        assert_eq!(
            edit.resolve(Some(&FieldValue::Int(5)), PENDING_TTL_MS - 1),
            PendingResolution::KeptLocal
        );
    }

    #[test]
    fn expired_mismatch_is_abandoned() {
        let edit = PendingEdit::new(FieldValue::Int(10), 0);
        assert_eq!(
            edit.resolve(Some(&FieldValue::Int(5)), PENDING_TTL_MS),
            PendingResolution::Abandoned
        );
    }

    #[test]
    fn missing_entity_is_abandoned_even_when_young() {
        let edit = PendingEdit::new(FieldValue::Int(10), 0);
        assert_eq!(edit.resolve(None, 1), PendingResolution::Abandoned);
    }
}
