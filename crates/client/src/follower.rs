use tracing::debug;

use model::VideoRef;
use protocol::PlaybackState;

/// Local cadence of the drift check, independent of message arrival.
pub const SYNC_INTERVAL_MS: i64 = 250;

/// Divergence beyond which the local position is hard-seeked.
pub const DRIFT_THRESHOLD_MS: f64 = 150.0;

/// Mirror of the local media element the follower steers.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalPlayer {
    pub video: Option<VideoRef>,
    pub position_ms: f64,
    pub rate: f64,
    pub playing: bool,
}

impl Default for LocalPlayer {
    fn default() -> Self {
        Self {
            video: None,
            position_ms: 0.0,
            rate: 1.0,
            playing: false,
        }
    }
}

/// Instruction for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Correction {
    Load { video: VideoRef, position_ms: f64 },
    Seek { position_ms: f64 },
    SetRate { rate: f64 },
    SetPlaying { playing: bool },
}

/// Replays authoritative playback state locally.
///
/// Runs on a fixed cadence ([`SYNC_INTERVAL_MS`]) so one dropped update
/// cannot desync indefinitely: the last snapshot keeps re-anchoring the
/// local position until the guaranteed once-per-second broadcast replaces
/// it. Only ever reads `serverNow` and the latest snapshot.
#[derive(Debug, Default)]
pub struct Follower {
    latest: Option<PlaybackState>,
    player: LocalPlayer,
    last_tick_ms: Option<i64>,
}

impl Follower {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn player(&self) -> &LocalPlayer {
        &self.player
    }

    /// Records the newest timeline snapshot; corrections happen on the next
    /// tick.
    pub fn on_state(&mut self, state: PlaybackState) {
        self.latest = Some(state);
    }

    /// One cadence step at server-aligned `server_now_ms`.
    ///
    /// Integrates the simulated local position, then compares against the
    /// canonical position computed from the latest snapshot and returns the
    /// corrections the presentation layer must perform.
    pub fn sync_tick(&mut self, server_now_ms: i64) -> Vec<Correction> {
        if let Some(last_tick) = self.last_tick_ms
            && self.player.playing
        {
            self.player.position_ms += (server_now_ms - last_tick) as f64 * self.player.rate;
        }
        self.last_tick_ms = Some(server_now_ms);

        let Some(state) = self.latest.clone() else {
            return Vec::new();
        };

        let rate = f64::from(state.playback_rate.num) / f64::from(state.playback_rate.den);
        // While paused the broadcast base_timestamp is the frozen elapsed.
        let canonical_ms = if state.is_playing {
            (server_now_ms - state.base_timestamp) as f64 * rate
        } else {
            state.base_timestamp as f64
        };

        let mut corrections = Vec::new();

        if self.player.video.as_ref() != Some(&state.video) {
            debug!(video = %state.video, position_ms = canonical_ms, "switching item");
            self.player.video = Some(state.video.clone());
            self.player.position_ms = canonical_ms;
            corrections.push(Correction::Load {
                video: state.video.clone(),
                position_ms: canonical_ms,
            });
        } else if (self.player.position_ms - canonical_ms).abs() > DRIFT_THRESHOLD_MS {
            debug!(
                local_ms = self.player.position_ms,
                canonical_ms, "drift above threshold"
            );
            self.player.position_ms = canonical_ms;
            corrections.push(Correction::Seek {
                position_ms: canonical_ms,
            });
        }

        if self.player.rate != rate {
            self.player.rate = rate;
            corrections.push(Correction::SetRate { rate });
        }
        if self.player.playing != state.is_playing {
            self.player.playing = state.is_playing;
            corrections.push(Correction::SetPlaying {
                playing: state.is_playing,
            });
        }

        corrections
    }
}
