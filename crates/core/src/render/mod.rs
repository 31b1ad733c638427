/// Receiver of per-frame redraw requests. Drawing itself belongs to the
/// windowing layer; the dispatcher only signals that scene state changed.
pub trait RedrawTarget {
    fn request_redraw(&mut self, frame_index: u64);
}

/// Headless redraw target that records what was requested.
#[derive(Debug, Default, Clone)]
pub struct RenderGraph {
    redraws: u64,
    last_frame: Option<u64>,
}

impl RenderGraph {
    /// Creates a graph with no recorded redraws.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total redraw requests received.
    pub fn redraws(&self) -> u64 {
        self.redraws
    }

    /// Returns the index of the most recently requested frame.
    pub fn last_frame(&self) -> Option<u64> {
        self.last_frame
    }
}

impl RedrawTarget for RenderGraph {
    fn request_redraw(&mut self, frame_index: u64) {
        self.redraws += 1;
        self.last_frame = Some(frame_index);
    }
}

impl<T: RedrawTarget + ?Sized> RedrawTarget for Box<T> {
    fn request_redraw(&mut self, frame_index: u64) {
        (**self).request_redraw(frame_index);
    }
}
