use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::config::AnalyzerConfig;

mod beat;

pub use beat::{BeatDetector, BeatPhase};

/// Number of frequency bands reported per frame.
pub const LEVEL_BANDS: usize = 16;

/// Sum of squared Hann window values divided by the squared coherent gain.
/// A full-scale sine that lands inside one band reports an energy of ~1.0.
const HANN_ENERGY_SPREAD: f32 = 1.5;

/// Audio features for a single analysis cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFrame {
    /// Normalised [0, 1] loudness of the window.
    pub volume: f32,
    /// Normalised [0, 1] band energies ordered from bass to treble.
    pub levels: [f32; LEVEL_BANDS],
    /// Raw time-domain samples of the window.
    pub waveform: Vec<f32>,
    pub is_beat: bool,
    /// Adaptive threshold the beat detector compared `volume` against.
    pub beat_cutoff: f32,
}

impl AudioFrame {
    /// Neutral frame for a silent or missing window.
    pub fn silent(waveform: Vec<f32>, beat_cutoff: f32) -> Self {
        Self {
            volume: 0.0,
            levels: [0.0; LEVEL_BANDS],
            waveform,
            is_beat: false,
            beat_cutoff,
        }
    }

    /// Mean of the lowest four bands.
    pub fn bass(&self) -> f32 {
        self.levels[..4].iter().sum::<f32>() / 4.0
    }

    /// Mean of the highest four bands.
    pub fn treble(&self) -> f32 {
        self.levels[LEVEL_BANDS - 4..].iter().sum::<f32>() / 4.0
    }
}

/// Turns windows of raw samples into [`AudioFrame`]s.
///
/// Extraction is total: empty, silent, too short or non-finite input yields a
/// neutral frame instead of an error, so the frame loop never has to branch on
/// analysis failures.
pub struct AudioFeatureExtractor {
    volume_sensitivity: f32,
    beats: BeatDetector,
    frames_analyzed: u64,
    fft_planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl AudioFeatureExtractor {
    /// Creates an extractor. FFT plans are built lazily on the first window.
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            volume_sensitivity: config.volume_sensitivity.max(0.0),
            beats: BeatDetector::new(&config.beat),
            frames_analyzed: 0,
            fft_planner: RealFftPlanner::new(),
            fft: None,
        }
    }

    /// Analyses one window of samples.
    pub fn analyze(&mut self, samples: &[f32]) -> AudioFrame {
        self.frames_analyzed += 1;
        let waveform: Vec<f32> = samples
            .iter()
            .map(|sample| if sample.is_finite() { *sample } else { 0.0 })
            .collect();

        let volume = (compute_rms(&waveform) * self.volume_sensitivity).clamp(0.0, 1.0);
        let is_beat = self.beats.update(volume);
        let beat_cutoff = self.beats.cutoff();

        if volume <= 0.0 {
            return AudioFrame::silent(waveform, beat_cutoff);
        }

        let levels = self.compute_levels(&waveform);
        AudioFrame {
            volume,
            levels,
            waveform,
            is_beat,
            beat_cutoff,
        }
    }

    /// Number of windows analysed since construction or the last reset.
    pub fn frames_analyzed(&self) -> u64 {
        self.frames_analyzed
    }

    /// Returns the beat detector state.
    pub fn beat_detector(&self) -> &BeatDetector {
        &self.beats
    }

    /// Clears beat tracking state while preserving configuration and FFT plans.
    pub fn reset(&mut self) {
        self.beats.reset();
        self.frames_analyzed = 0;
    }

    fn compute_levels(&mut self, samples: &[f32]) -> [f32; LEVEL_BANDS] {
        let mut levels = [0.0; LEVEL_BANDS];
        let len = samples.len();
        if len < 2 {
            return levels;
        }

        let sensitivity = self.volume_sensitivity;
        let fft = self.prepare_fft(len);
        for (index, value) in samples.iter().enumerate() {
            fft.input[index] = *value * hann_value(index, len);
        }

        if let Err(err) = fft
            .plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)
        {
            tracing::warn!(%err, len, "spectrum analysis failed, reporting silent levels");
            return levels;
        }

        // Skip the DC bin and split the remaining bins linearly.
        let bins = &fft.spectrum[1..];
        let count = bins.len();
        let coherent_gain = len as f32 / 4.0;
        for (band, level) in levels.iter_mut().enumerate() {
            let start = band * count / LEVEL_BANDS;
            let end = (band + 1) * count / LEVEL_BANDS;
            if start >= end {
                continue;
            }
            let energy: f32 = bins[start..end]
                .iter()
                .map(|bin| {
                    let magnitude = bin.norm() / coherent_gain;
                    magnitude * magnitude
                })
                .sum();
            let normalised = (energy / HANN_ENERGY_SPREAD).sqrt() * sensitivity;
            *level = if normalised.is_finite() {
                normalised.clamp(0.0, 1.0)
            } else {
                0.0
            };
        }

        levels
    }

    fn prepare_fft(&mut self, size: usize) -> &mut FftResources {
        let planner = &mut self.fft_planner;
        let fft = self
            .fft
            .get_or_insert_with(|| FftResources::plan(planner, size));
        if fft.size != size {
            *fft = FftResources::plan(planner, size);
        }
        fft
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl FftResources {
    fn plan(planner: &mut RealFftPlanner<f32>, size: usize) -> Self {
        let plan = planner.plan_fft_forward(size);
        Self {
            size,
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        }
    }
}

impl fmt::Debug for AudioFeatureExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioFeatureExtractor")
            .field("volume_sensitivity", &self.volume_sensitivity)
            .field("beats", &self.beats)
            .field("frames_analyzed", &self.frames_analyzed)
            .field("fft", &self.fft)
            .finish()
    }
}

impl fmt::Debug for FftResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftResources")
            .field("size", &self.size)
            .finish()
    }
}

fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum / samples.len() as f32).sqrt()
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}
