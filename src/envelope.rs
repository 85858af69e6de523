// Per-note gain envelope.
//
// An attack / sustain / release shape scheduled as automation points on a
// voice's amplitude gain. Attack and release are capped in absolute terms
// and as fractions of the note, so a very short note never ramps for
// longer than it lasts.

use crate::graph::Automation;

/// Near-silent gain used instead of zero so ramps stay well defined.
pub const GAIN_FLOOR: f32 = 0.0001;

pub const MAX_ATTACK_SECONDS: f64 = 0.08;
pub const ATTACK_FRACTION: f64 = 0.2;
pub const MAX_RELEASE_SECONDS: f64 = 0.12;
pub const RELEASE_FRACTION: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEnvelope {
    pub start: f64,
    pub attack: f64,
    pub release: f64,
    /// Time the release ramp begins.
    pub sustain_until: f64,
    /// Time the gain is back at the floor.
    pub end: f64,
    pub peak: f32,
}

impl NoteEnvelope {
    /// Shape an envelope for a note sounding `duration` seconds from `start`.
    pub fn new(start: f64, duration: f64, peak: f32) -> Self {
        let attack = MAX_ATTACK_SECONDS.min(duration * ATTACK_FRACTION);
        let release = MAX_RELEASE_SECONDS.min(duration * RELEASE_FRACTION);
        let sustain_until = (start + attack).max(start + duration - release);

        Self {
            start,
            attack,
            release,
            sustain_until,
            end: start + duration,
            peak,
        }
    }

    /// Automation points for the amplitude gain, in time order.
    pub fn points(&self) -> [Automation; 4] {
        [
            Automation::SetValue {
                value: GAIN_FLOOR,
                time: self.start,
            },
            Automation::LinearRamp {
                value: self.peak,
                time: self.start + self.attack,
            },
            Automation::SetValue {
                value: self.peak,
                time: self.sustain_until,
            },
            Automation::LinearRamp {
                value: GAIN_FLOOR,
                time: self.end,
            },
        ]
    }
}

/// Quick fade used when a voice is cut short: drop pending points and
/// glide to the floor from `now`.
pub fn fade_out(now: f64, time_constant: f64) -> [Automation; 2] {
    [
        Automation::Cancel { from: now },
        Automation::SetTarget {
            target: GAIN_FLOOR,
            time: now,
            time_constant,
        },
    ]
}
