//! Core library for the Reactive Show installation.
//!
//! Audio windows are turned into [`AudioFrame`]s (volume, sixteen band levels,
//! waveform, beat flag) once per display frame and forwarded to the scene
//! active on each layer. Independently, every layer's [`SceneScheduler`]
//! rotates among its catalog on a jittered timer and accepts manual commands.
//! [`Show`] ties both timing sources together on a single thread.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod render;
pub mod scene;
pub mod scheduler;
pub mod show;
pub mod timeline;

pub use analysis::{AudioFeatureExtractor, AudioFrame, BeatDetector, BeatPhase, LEVEL_BANDS};
pub use audio::{AudioInput, AudioInputHandle, AudioSource, Silence, SignalGenerator, WavSource};
pub use config::{AnalyzerConfig, AppConfig, AudioConfig, BeatConfig, LayerConfig};
pub use dispatch::Dispatcher;
pub use error::{Result, ShowError};
pub use render::{RedrawTarget, RenderGraph};
pub use scene::{EmptyScene, Scene, SceneCatalog, SceneDescriptor, SceneId};
pub use scheduler::{Activity, SceneCommand, SceneScheduler};
pub use show::{LayerSummary, RunSummary, ScriptedCommand, Show};
pub use timeline::{LayerId, PendingRotation, PlaybackClock, RotationToken, TimerQueue};
