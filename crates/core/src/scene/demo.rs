//! Stand-in scenes used by the command line show and the tests.
//!
//! They keep only the numeric state a renderer would read (scales, rotations),
//! derived from each [`AudioFrame`] the way the installation's scenes react to
//! volume, band levels and beats.

use crate::AudioFrame;

use super::{Scene, SceneCatalog, SceneDescriptor};

/// Phase advance per tick, shared by the animated scenes.
const PHASE_STEP: f32 = 0.01;

/// A row of triangles that jumps in scale on every beat.
#[derive(Debug, Clone, Default)]
pub struct TriangleRow {
    scales: Vec<f32>,
}

impl TriangleRow {
    const TRIANGLES: usize = 5;

    pub fn scales(&self) -> &[f32] {
        &self.scales
    }
}

impl Scene for TriangleRow {
    fn start(&mut self) {
        self.scales = vec![1.0; Self::TRIANGLES];
    }

    fn stop(&mut self) {
        self.scales.clear();
    }

    fn tick(&mut self, frame: &AudioFrame) {
        if frame.is_beat {
            let scale = 1.0 + (frame.volume * 2.0).cos();
            self.scales.iter_mut().for_each(|value| *value = scale);
        }
    }
}

/// Concentric rings whose depth follows a slow oscillator, with a random ring
/// kicked on each beat.
#[derive(Debug, Clone, Default)]
pub struct TorusRings {
    depths: Vec<f32>,
    phase: f32,
    beats: u64,
}

impl TorusRings {
    const RINGS: usize = 10;

    pub fn depths(&self) -> &[f32] {
        &self.depths
    }

    pub fn beats_seen(&self) -> u64 {
        self.beats
    }
}

impl Scene for TorusRings {
    fn start(&mut self) {
        self.depths = vec![0.0; Self::RINGS];
        self.phase = 0.0;
        self.beats = 0;
    }

    fn stop(&mut self) {
        self.depths.clear();
    }

    fn tick(&mut self, frame: &AudioFrame) {
        self.phase += PHASE_STEP;
        let swing = self.phase.cos();
        for (index, depth) in self.depths.iter_mut().enumerate() {
            *depth = 10.0 * swing * index as f32 + 0.001;
        }
        if frame.is_beat && !self.depths.is_empty() {
            // Pick the ring from the band layout so the kick is reproducible.
            let loudest = frame
                .levels
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(index, _)| index)
                .unwrap_or(0);
            let ring = loudest % self.depths.len();
            self.depths[ring] = -30.0 * frame.volume.cos();
            self.beats += 1;
        }
    }
}

/// Full-screen pulse whose brightness jumps on beats and eases back toward
/// the running volume.
#[derive(Debug, Clone, Default)]
pub struct BeatPulse {
    brightness: f32,
    bass: f32,
}

impl BeatPulse {
    const RELEASE: f32 = 0.9;

    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    pub fn bass(&self) -> f32 {
        self.bass
    }
}

impl Scene for BeatPulse {
    fn start(&mut self) {
        self.brightness = 0.0;
        self.bass = 0.0;
    }

    fn stop(&mut self) {
        self.brightness = 0.0;
    }

    fn tick(&mut self, frame: &AudioFrame) {
        self.bass = frame.bass();
        self.brightness = if frame.is_beat {
            1.0
        } else {
            (self.brightness * Self::RELEASE).max(frame.volume)
        };
    }
}

/// Background layer catalog: the reserved empty scene plus the ring scenes.
pub fn background_catalog() -> SceneCatalog {
    let mut catalog = SceneCatalog::with_empty();
    catalog.register(SceneDescriptor::new("torusRings", TorusRings::default()));
    catalog.register(SceneDescriptor::new("beatPulse", BeatPulse::default()));
    catalog
}

/// Foreground layer catalog: the reserved empty scene plus the triangle row.
pub fn foreground_catalog() -> SceneCatalog {
    let mut catalog = SceneCatalog::with_empty();
    catalog.register(SceneDescriptor::new("triangleRow", TriangleRow::default()));
    catalog
}

/// Demo catalog for a layer name; unknown names get the background set.
pub fn catalog_for(layer: &str) -> SceneCatalog {
    match layer {
        "foreground" => foreground_catalog(),
        _ => background_catalog(),
    }
}
