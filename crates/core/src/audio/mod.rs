use std::{
    collections::VecDeque,
    f32::consts::PI,
    fmt,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{Result, ShowError};

/// Supplier of fixed-size windows of mono time-domain samples.
pub trait AudioSource {
    /// Returns the next window of at most `len` samples, or `None` once the
    /// source is exhausted.
    fn next_window(&mut self, len: usize) -> Result<Option<Vec<f32>>>;

    /// Sample rate of the produced windows.
    fn sample_rate(&self) -> u32;
}

/// Live capture buffer shared between an audio callback and the frame loop.
///
/// The capture side calls [`AudioInput::push_samples`] from its own thread;
/// the frame loop reads the most recent window through an [`AudioInputHandle`].
#[derive(Debug, Clone)]
pub struct AudioInput {
    sample_rate: u32,
    capacity: usize,
    shared: Arc<Mutex<VecDeque<f32>>>,
}

impl AudioInput {
    /// Creates a buffer retaining at most `capacity` recent samples.
    pub fn new(sample_rate: u32, capacity: usize) -> Self {
        Self {
            sample_rate,
            capacity: capacity.max(1),
            shared: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    /// Returns the capture sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Appends captured samples, discarding the oldest ones beyond capacity.
    pub fn push_samples(&self, samples: &[f32]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let mut buffer = self.lock()?;
        buffer.extend(samples.iter().copied());
        let overflow = buffer.len().saturating_sub(self.capacity);
        buffer.drain(..overflow);
        Ok(())
    }

    /// Number of samples currently buffered.
    pub fn buffered(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    /// Returns a reader for the frame loop.
    pub fn handle(&self) -> AudioInputHandle {
        AudioInputHandle {
            input: self.clone(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, VecDeque<f32>>> {
        self.shared
            .lock()
            .map_err(|_| ShowError::msg("audio input buffer has been poisoned"))
    }
}

/// Frame-loop view over an [`AudioInput`]. Always yields a full window; when
/// fewer samples have been captured the window is left-padded with silence.
#[derive(Clone)]
pub struct AudioInputHandle {
    input: AudioInput,
}

impl AudioSource for AudioInputHandle {
    fn next_window(&mut self, len: usize) -> Result<Option<Vec<f32>>> {
        let buffer = self.input.lock()?;
        let available = buffer.len().min(len);
        let mut window = vec![0.0; len - available];
        window.extend(buffer.iter().skip(buffer.len() - available).copied());
        Ok(Some(window))
    }

    fn sample_rate(&self) -> u32 {
        self.input.sample_rate
    }
}

impl fmt::Debug for AudioInputHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioInputHandle").finish()
    }
}

/// Reads a WAV file into memory and plays it back window by window, downmixed
/// to mono.
#[derive(Debug, Clone)]
pub struct WavSource {
    sample_rate: u32,
    samples: Vec<f32>,
    position: usize,
}

impl WavSource {
    /// Loads every sample of the file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let channels = usize::from(spec.channels.max(1));

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|value| value as f32 / scale))
                    .collect::<std::result::Result<_, _>>()?
            }
        };

        let samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect::<Vec<_>>();

        tracing::info!(
            path = %path.display(),
            sample_rate = spec.sample_rate,
            channels,
            samples = samples.len(),
            "loaded wav input"
        );

        Ok(Self::from_samples(spec.sample_rate, samples))
    }

    /// Creates a source over already decoded mono samples.
    pub fn from_samples(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            samples,
            position: 0,
        }
    }

    /// Returns the number of mono samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback length in seconds.
    pub fn duration_seconds(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate.max(1) as f32
    }
}

impl AudioSource for WavSource {
    fn next_window(&mut self, len: usize) -> Result<Option<Vec<f32>>> {
        if self.position >= self.samples.len() || len == 0 {
            return Ok(None);
        }

        let end = (self.position + len).min(self.samples.len());
        let window = self.samples[self.position..end].to_vec();
        self.position = end;
        Ok(Some(window))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Endless synthetic test signal: a decaying low kick on every beat over a
/// quiet sine bed.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    sample_rate: u32,
    bpm: f32,
    position: u64,
}

impl SignalGenerator {
    const KICK_HZ: f32 = 60.0;
    const KICK_DECAY: f32 = 25.0;
    const KICK_GAIN: f32 = 0.9;
    const BED_HZ: f32 = 220.0;
    const BED_GAIN: f32 = 0.05;

    /// Creates a generator kicking `bpm` times per minute.
    pub fn new(sample_rate: u32, bpm: f32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            bpm: bpm.max(1.0),
            position: 0,
        }
    }

    /// Sample at absolute position `index`. Time is tracked in `f64` and
    /// reduced to the beat and bed phases before narrowing, so long runs keep
    /// per-sample resolution.
    fn sample(&self, index: u64) -> f32 {
        let t = index as f64 / f64::from(self.sample_rate);
        let beat_seconds = 60.0 / f64::from(self.bpm);
        let since_beat = (t % beat_seconds) as f32;
        let bed_phase = (f64::from(Self::BED_HZ) * t).fract() as f32;

        let kick = Self::KICK_GAIN
            * (-since_beat * Self::KICK_DECAY).exp()
            * (2.0 * PI * Self::KICK_HZ * since_beat).sin();
        let bed = Self::BED_GAIN * (2.0 * PI * bed_phase).sin();
        kick + bed
    }
}

impl AudioSource for SignalGenerator {
    fn next_window(&mut self, len: usize) -> Result<Option<Vec<f32>>> {
        let start = self.position;
        self.position += len as u64;
        Ok(Some((start..self.position).map(|index| self.sample(index)).collect()))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Source that only ever produces zeros.
#[derive(Debug, Clone, Copy)]
pub struct Silence {
    pub sample_rate: u32,
}

impl AudioSource for Silence {
    fn next_window(&mut self, len: usize) -> Result<Option<Vec<f32>>> {
        Ok(Some(vec![0.0; len]))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
