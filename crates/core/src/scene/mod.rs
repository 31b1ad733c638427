use std::fmt;

use crate::AudioFrame;

mod catalog;
pub mod demo;

pub use catalog::{SceneCatalog, SceneId};

/// Capability set every visual scene provides to the scheduler.
///
/// The scheduler guarantees that `tick` is only called between a `start` and
/// the following `stop`, so implementations do not need to guard against it.
pub trait Scene {
    fn start(&mut self);
    fn stop(&mut self);
    fn tick(&mut self, frame: &AudioFrame);
}

/// Named catalog entry wrapping a scene implementation.
pub struct SceneDescriptor {
    pub name: String,
    pub scene: Box<dyn Scene>,
}

impl SceneDescriptor {
    /// Wraps `scene` under `name`.
    pub fn new(name: impl Into<String>, scene: impl Scene + 'static) -> Self {
        Self {
            name: name.into(),
            scene: Box::new(scene),
        }
    }

    /// The reserved no-op scene shown when a layer is emptied.
    pub fn empty() -> Self {
        Self::new(EmptyScene::NAME, EmptyScene)
    }
}

impl fmt::Debug for SceneDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneDescriptor")
            .field("name", &self.name)
            .finish()
    }
}

/// Scene with no content. Rotating onto it blanks the layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyScene;

impl EmptyScene {
    pub const NAME: &'static str = "empty";
}

impl Scene for EmptyScene {
    fn start(&mut self) {}

    fn stop(&mut self) {}

    fn tick(&mut self, _frame: &AudioFrame) {}
}
