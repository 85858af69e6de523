//
// ===============================
// MARK: Beat <-> device time mapping
// ===============================
//

/// The device time at which `beat` occurred (or will occur).
///
/// Together with the tempo this defines an affine map between musical
/// time and the output device's clock. An anchor is replaced wholesale on
/// every play, seek, tempo change and loop restart; it is never nudged
/// incrementally.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct PlaybackAnchor {
    /// Musical position in beats.
    pub beat: f64,

    /// Device clock time in seconds.
    pub device_time: f64,
}

impl PlaybackAnchor {
    #[inline]
    pub fn new(beat: f64, device_time: f64) -> Self {
        Self { beat, device_time }
    }
}

/// Pure conversion between beats and device time.
///
/// This struct:
/// - is copyable
/// - holds no state beyond the anchor, tempo and score length
/// - has no error conditions (tempo > 0 is enforced upstream)
#[derive(Debug, Copy, Clone)]
pub struct TimeMapper {
    anchor: PlaybackAnchor,

    /// Tempo in BPM
    tempo: f64,

    /// Length of the score in beats (upper clamp for positions)
    total_beats: f64,
}

impl TimeMapper {
    #[inline]
    pub fn new(anchor: PlaybackAnchor, tempo: f64, total_beats: f64) -> Self {
        debug_assert!(tempo > 0.0, "tempo must be positive, got {tempo}");
        Self {
            anchor,
            tempo,
            total_beats,
        }
    }

    /// Musical position at a device time, clamped to the score.
    #[inline]
    pub fn beat_at(&self, device_time: f64) -> f64 {
        let beat = self.anchor.beat + (device_time - self.anchor.device_time) * self.tempo / 60.0;
        beat.clamp(0.0, self.total_beats)
    }

    /// Device time at which a beat sounds under the current anchor.
    #[inline]
    pub fn time_for_beat(&self, beat: f64) -> f64 {
        self.anchor.device_time + (beat - self.anchor.beat) * 60.0 / self.tempo
    }

    // -------------------------------
    // MARK: Durations
    // -------------------------------

    #[inline]
    pub fn seconds_for_beats(&self, beats: f64) -> f64 {
        seconds_for_beats(beats, self.tempo)
    }

    #[inline]
    pub fn beats_for_seconds(&self, seconds: f64) -> f64 {
        beats_for_seconds(seconds, self.tempo)
    }

    #[inline]
    pub fn anchor(&self) -> PlaybackAnchor {
        self.anchor
    }

    #[inline]
    pub fn tempo(&self) -> f64 {
        self.tempo
    }
}

#[inline]
pub fn seconds_for_beats(beats: f64, tempo: f64) -> f64 {
    beats * 60.0 / tempo
}

#[inline]
pub fn beats_for_seconds(seconds: f64, tempo: f64) -> f64 {
    seconds * tempo / 60.0
}

//
// ===================================
// MARK: Position readout
// ===================================
//

/// Beats per bar used for bar/beat labels.
pub const BEATS_PER_BAR: f64 = 4.0;

/// `mm:ss` for a musical position at a tempo (whole seconds, truncated).
pub fn format_clock(beats: f64, tempo: f64) -> String {
    let total_seconds = seconds_for_beats(beats, tempo).max(0.0).floor() as u64;
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

/// `Bar n, Beat x.xx`, both 1-based.
pub fn format_bar_beat(beat: f64) -> String {
    let bar = (beat / BEATS_PER_BAR).floor() as i64 + 1;
    let beat_in_bar = beat.rem_euclid(BEATS_PER_BAR) + 1.0;
    format!("Bar {}, Beat {:.2}", bar, beat_in_bar)
}
