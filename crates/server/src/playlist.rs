use std::collections::HashMap;

use tracing::{debug, info};

use model::{Rational, VideoRef};
use protocol::PlaybackState;

/// Server-authoritative playback timeline.
///
/// Created lazily by the first accepted order report and mutated only here.
/// `base_timestamp` is a wall-clock anchor while playing; while paused it
/// holds the frozen elapsed milliseconds of the current entry, so pausing
/// needs no extra position field.
#[derive(Debug, Default)]
pub struct Playlist {
    state: Option<PlaylistState>,
}

#[derive(Debug)]
struct PlaylistState {
    order: Vec<VideoRef>,
    base_index: usize,
    base_timestamp: i64,
    rate: Rational,
    paused: bool,
    durations: HashMap<VideoRef, f64>,
    queue: Vec<VideoRef>,
}

impl Playlist {
    pub fn is_bootstrapped(&self) -> bool {
        self.state.is_some()
    }

    /// First-writer-wins bootstrap: accepted only while no order exists.
    ///
    /// Duplicate refs are dropped, keeping the first occurrence. Returns
    /// true when the playlist was created.
    pub fn bootstrap(&mut self, order: Vec<VideoRef>, now_ms: i64) -> bool {
        if self.state.is_some() {
            debug!("order report ignored: playlist already bootstrapped");
            return false;
        }
        let mut unique = Vec::with_capacity(order.len());
        for video in order {
            if !unique.contains(&video) {
                unique.push(video);
            }
        }
        if unique.is_empty() {
            return false;
        }

        info!(entries = unique.len(), "playlist bootstrapped");
        self.state = Some(PlaylistState {
            order: unique,
            base_index: 0,
            base_timestamp: now_ms,
            rate: Rational::ONE,
            paused: false,
            durations: HashMap::new(),
            queue: Vec::new(),
        });
        true
    }

    /// Caches the reported duration of one entry.
    pub fn cache_duration(&mut self, video: VideoRef, seconds: f64) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        if !seconds.is_finite() || seconds <= 0.0 {
            debug!(%video, seconds, "duration report dropped");
            return;
        }
        state.durations.insert(video, seconds);
    }

    /// Moves to the next entry.
    ///
    /// A non-empty forced-play queue preempts natural rotation: its head is
    /// de-duplicated to the front of the order and playback restarts there,
    /// unpaused. Otherwise the index increments modulo the order length.
    pub fn advance(&mut self, now_ms: i64) -> bool {
        let Some(state) = self.state.as_mut() else {
            return false;
        };

        if state.queue.is_empty() {
            state.base_index = (state.base_index + 1) % state.order.len();
            state.base_timestamp = if state.paused { 0 } else { now_ms };
        } else {
            let next = state.queue.remove(0);
            state.promote_to_front(next, now_ms);
        }

        info!(
            base_index = state.base_index,
            video = %state.order[state.base_index],
            "playlist advanced"
        );
        true
    }

    /// Forces one entry to play immediately (privileged path).
    pub fn force_video(&mut self, video: VideoRef, now_ms: i64) -> bool {
        let Some(state) = self.state.as_mut() else {
            return false;
        };
        info!(%video, "video forced");
        state.promote_to_front(video, now_ms);
        true
    }

    /// Appends entries to the forced-play queue, skipping duplicates.
    pub fn enqueue(&mut self, videos: Vec<VideoRef>) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        for video in videos {
            if !state.queue.contains(&video) {
                state.queue.push(video);
            }
        }
    }

    pub fn clear_queue(&mut self) {
        if let Some(state) = self.state.as_mut() {
            state.queue.clear();
        }
    }

    /// Pauses or resumes, preserving the current position.
    pub fn set_paused(&mut self, paused: bool, now_ms: i64) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        if state.paused == paused {
            return;
        }
        if paused {
            state.base_timestamp = state.elapsed_ms(now_ms);
        } else {
            state.base_timestamp = now_ms - state.rate.unscale_ms(state.base_timestamp);
        }
        state.paused = paused;
    }

    /// Changes the playback rate, re-anchoring so position is preserved.
    pub fn set_rate(&mut self, rate: Rational, now_ms: i64) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        let position = state.elapsed_ms(now_ms);
        state.rate = rate;
        if !state.paused {
            state.base_timestamp = now_ms - rate.unscale_ms(position);
        }
    }

    /// Periodic 1 Hz evaluation: advances past the current entry once its
    /// cached duration has elapsed. Returns true when an advance happened.
    pub fn tick(&mut self, now_ms: i64) -> bool {
        let due = {
            let Some(state) = self.state.as_ref() else {
                return false;
            };
            if state.paused {
                false
            } else {
                let current = &state.order[state.base_index];
                match state.durations.get(current) {
                    Some(seconds) => state.elapsed_ms(now_ms) as f64 >= seconds * 1_000.0,
                    None => false,
                }
            }
        };
        if due {
            self.advance(now_ms);
        }
        due
    }

    /// Current computed state for broadcast, if bootstrapped.
    pub fn snapshot(&self) -> Option<PlaybackState> {
        let state = self.state.as_ref()?;
        Some(PlaybackState {
            video: state.order[state.base_index].clone(),
            base_index: state.base_index as u32,
            base_timestamp: state.base_timestamp,
            playback_rate: state.rate,
            is_playing: !state.paused,
        })
    }
}

impl PlaylistState {
    /// Elapsed media time of the current entry in milliseconds.
    fn elapsed_ms(&self, now_ms: i64) -> i64 {
        if self.paused {
            self.base_timestamp
        } else {
            self.rate.scale_ms(now_ms - self.base_timestamp)
        }
    }

    fn promote_to_front(&mut self, video: VideoRef, now_ms: i64) {
        self.order.retain(|entry| *entry != video);
        self.order.insert(0, video);
        self.base_index = 0;
        self.base_timestamp = now_ms;
        self.paused = false;
    }
}
