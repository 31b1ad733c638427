use crate::{render::RedrawTarget, AudioFeatureExtractor, AudioFrame, SceneScheduler};

/// Per-frame driver: analyse one window, hand the frame to every layer, then
/// ask for a redraw. Owns no scene or audio state beyond a frame counter.
#[derive(Debug, Default)]
pub struct Dispatcher {
    frames: u64,
}

impl Dispatcher {
    /// Creates a dispatcher that has not seen any frame yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames dispatched so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Analyses `window`, forwards the frame to every active layer and asks
    /// `renderer` for a redraw.
    pub fn on_frame<R: RedrawTarget + ?Sized>(
        &mut self,
        window: &[f32],
        extractor: &mut AudioFeatureExtractor,
        layers: &mut [SceneScheduler],
        renderer: &mut R,
    ) -> AudioFrame {
        let frame = extractor.analyze(window);
        for layer in layers.iter_mut() {
            layer.tick(&frame);
        }
        renderer.request_redraw(self.frames);
        self.frames += 1;

        if frame.is_beat {
            tracing::trace!(frame = self.frames, volume = frame.volume, "beat");
        }
        frame
    }
}
