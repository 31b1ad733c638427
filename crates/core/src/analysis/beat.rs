use crate::config::BeatConfig;

/// Phase of the beat detector's hold cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeatPhase {
    /// A beat may fire on the next call that exceeds the cutoff.
    ArmedLow,
    /// A beat just fired; re-firing is suppressed until the hold runs out.
    Holding,
}

/// Adaptive-threshold beat detector.
///
/// Each call compares the incoming volume against a cutoff that jumps to
/// `volume * sensitivity` when a beat fires and decays by `decay_rate` on
/// every quiet or held cycle afterwards. A hold window of `hold_frames`
/// cycles keeps a sustained loud passage from firing every frame.
#[derive(Debug, Clone)]
pub struct BeatDetector {
    cutoff: f32,
    hold_counter: u32,
    phase: BeatPhase,
    hold_frames: u32,
    decay_rate: f32,
    sensitivity: f32,
    minimum_volume: f32,
}

impl BeatDetector {
    /// Creates an armed detector with a zero cutoff.
    pub fn new(config: &BeatConfig) -> Self {
        Self {
            cutoff: 0.0,
            hold_counter: 0,
            phase: BeatPhase::ArmedLow,
            hold_frames: config.hold_frames,
            decay_rate: config.decay_rate.clamp(0.0, 1.0),
            sensitivity: config.sensitivity,
            minimum_volume: config.minimum_volume,
        }
    }

    /// Feeds one analysis cycle's volume and reports whether a beat fired.
    pub fn update(&mut self, volume: f32) -> bool {
        if volume < self.minimum_volume {
            self.cutoff *= 1.0 - self.decay_rate;
            return false;
        }

        if volume > self.cutoff && self.phase == BeatPhase::ArmedLow {
            self.cutoff = volume * self.sensitivity;
            self.hold_counter = self.hold_frames;
            self.phase = if self.hold_frames == 0 {
                BeatPhase::ArmedLow
            } else {
                BeatPhase::Holding
            };
            return true;
        }

        if self.phase == BeatPhase::Holding {
            self.hold_counter = self.hold_counter.saturating_sub(1);
            if self.hold_counter == 0 {
                self.phase = BeatPhase::ArmedLow;
                return false;
            }
        }

        self.cutoff = (self.cutoff * (1.0 - self.decay_rate)).max(self.minimum_volume);
        false
    }

    /// Current adaptive threshold.
    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    /// Returns the current phase of the hold cycle.
    pub fn phase(&self) -> BeatPhase {
        self.phase
    }

    /// Returns the cycles left before the detector re-arms.
    pub fn hold_counter(&self) -> u32 {
        self.hold_counter
    }

    /// Returns the detector to its initial armed state.
    pub fn reset(&mut self) {
        self.cutoff = 0.0;
        self.hold_counter = 0;
        self.phase = BeatPhase::ArmedLow;
    }
}
