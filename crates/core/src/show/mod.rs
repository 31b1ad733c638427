use std::{fmt, str::FromStr, time::Duration};

use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;

use crate::{
    audio::AudioSource,
    config::{AppConfig, LayerConfig},
    render::RedrawTarget,
    scene::SceneCatalog,
    timeline::{LayerId, PendingRotation, PlaybackClock, RotationToken, TimerQueue},
    AudioFeatureExtractor, AudioFrame, Dispatcher, Result, SceneCommand, SceneScheduler, ShowError,
};

/// A manual command to replay at a fixed show time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedCommand {
    pub at: Duration,
    pub layer: String,
    pub command: SceneCommand,
}

impl FromStr for ScriptedCommand {
    type Err = ShowError;

    /// Parses `SECONDS:LAYER:COMMAND`, e.g. `12.5:foreground:random`.
    fn from_str(value: &str) -> Result<Self> {
        let mut parts = value.splitn(3, ':');
        let (Some(at), Some(layer), Some(command)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ShowError::msg(format!(
                "scripted command `{value}` must look like SECONDS:LAYER:COMMAND"
            )));
        };

        let seconds: f64 = at
            .trim()
            .parse()
            .map_err(|_| ShowError::msg(format!("invalid command time `{at}`")))?;
        let at = Duration::try_from_secs_f64(seconds)
            .map_err(|_| ShowError::msg(format!("invalid command time `{seconds}`")))?;

        Ok(Self {
            at,
            layer: layer.trim().to_string(),
            command: command.parse()?,
        })
    }
}

/// Totals reported by [`Show::run_for`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub frames: u64,
    pub beats: u64,
    pub rotations: u64,
    pub layers: Vec<LayerSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayerSummary {
    pub name: String,
    pub current: Option<String>,
    pub active: bool,
    pub rotations: u64,
}

/// Cooperative single-threaded runtime for the installation.
///
/// Two timing sources meet here: display frames ([`Show::on_frame`]) and
/// per-layer rotation timers ([`Show::advance_to`]). Neither blocks; the caller
/// interleaves them in time order.
pub struct Show {
    block_size: usize,
    seed: Option<u64>,
    source: Box<dyn AudioSource>,
    source_exhausted: bool,
    extractor: AudioFeatureExtractor,
    layers: Vec<SceneScheduler>,
    dispatcher: Dispatcher,
    renderer: Box<dyn RedrawTarget>,
    timers: TimerQueue<RotationToken>,
    clock: PlaybackClock,
}

impl Show {
    /// Creates a show without layers. Fails if `config` does not validate.
    pub fn new(
        config: &AppConfig,
        source: Box<dyn AudioSource>,
        renderer: Box<dyn RedrawTarget>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            block_size: config.audio.block_size,
            seed: config.seed,
            source,
            source_exhausted: false,
            extractor: AudioFeatureExtractor::new(&config.analyzer),
            layers: Vec::new(),
            dispatcher: Dispatcher::new(),
            renderer,
            timers: TimerQueue::new(),
            clock: PlaybackClock::start(),
        })
    }

    /// Builds a show with one layer per configured entry, asking `catalogs`
    /// for each layer's scenes.
    pub fn from_config<F>(
        config: &AppConfig,
        source: Box<dyn AudioSource>,
        renderer: Box<dyn RedrawTarget>,
        mut catalogs: F,
    ) -> Result<Self>
    where
        F: FnMut(&str) -> SceneCatalog,
    {
        let mut show = Self::new(config, source, renderer)?;
        for layer in &config.layers {
            let catalog = catalogs(&layer.name);
            show.add_layer(layer.clone(), catalog)?;
        }
        Ok(show)
    }

    /// Registers a layer. Fails on an invalid interval, an empty catalog or a
    /// duplicate layer name.
    pub fn add_layer(&mut self, config: LayerConfig, catalog: SceneCatalog) -> Result<LayerId> {
        if self.layer_by_name(&config.name).is_some() {
            return Err(ShowError::InvalidConfig(format!(
                "layer `{}` is configured twice",
                config.name
            )));
        }

        let id = LayerId(self.layers.len());
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id.0 as u64)),
            None => StdRng::from_entropy(),
        };
        let scheduler = SceneScheduler::new(id, config, catalog, rng)?;
        tracing::info!(
            layer = scheduler.name(),
            scenes = scheduler.catalog().len(),
            "layer registered"
        );
        self.layers.push(scheduler);
        Ok(id)
    }

    /// Starts every layer on its initial scene. Layers without a configured
    /// initial scene open on the empty scene and rotate straight away.
    pub fn start(&mut self) -> Result<()> {
        let now = self.clock.now();
        for index in 0..self.layers.len() {
            let layer = &mut self.layers[index];
            let initial = layer.config().initial_scene.clone();
            let pending = match initial.as_deref() {
                Some(name) => vec![layer.start_named(name, now)?],
                None => {
                    let opening = layer
                        .catalog()
                        .empty_scene()
                        .unwrap_or(crate::scene::SceneId(0));
                    let mut armed = vec![layer.start(opening, now)?];
                    armed.extend(layer.rotate(now));
                    armed
                }
            };
            for rotation in pending {
                self.enqueue(rotation);
            }
        }
        Ok(())
    }

    /// Pulls one window from the audio source and dispatches the resulting
    /// frame. An exhausted or failing source yields silence.
    pub fn on_frame(&mut self) -> AudioFrame {
        let window = match self.source.next_window(self.block_size) {
            Ok(Some(window)) => window,
            Ok(None) => {
                if !self.source_exhausted {
                    tracing::info!("audio source exhausted, continuing with silence");
                    self.source_exhausted = true;
                }
                vec![0.0; self.block_size]
            }
            Err(err) => {
                tracing::warn!(%err, "audio source failed, substituting silence");
                vec![0.0; self.block_size]
            }
        };

        self.dispatcher.on_frame(
            &window,
            &mut self.extractor,
            &mut self.layers,
            &mut self.renderer,
        )
    }

    /// Moves the clock to `now` and fires every rotation due by then, in due
    /// order, each at its own due instant. Rotations re-armed along the way
    /// fire within the same call when they fall due before `now`.
    ///
    /// A rotation re-armed with a zero interval waits for the next call.
    /// Superseded timer entries are dropped without effect. Returns the number
    /// of rotations performed.
    pub fn advance_to(&mut self, now: Duration) -> usize {
        self.clock.advance_to(now);
        let now = self.clock.now();

        let mut fired = 0;
        let mut deferred = Vec::new();
        while let Some((at, token)) = self.timers.pop_due(now) {
            let Some(layer) = self.layers.get_mut(token.layer.0) else {
                continue;
            };
            let Some(next) = layer.fire(token, at) else {
                continue;
            };
            fired += 1;
            if next.due > at {
                self.enqueue(next);
            } else {
                deferred.push(next);
            }
        }

        for pending in deferred {
            self.enqueue(pending);
        }
        fired
    }

    /// Applies a manual command to a layer at the current clock time.
    pub fn command(&mut self, layer: LayerId, command: SceneCommand) -> Result<()> {
        let now = self.clock.now();
        let scheduler = self
            .layers
            .get_mut(layer.0)
            .ok_or_else(|| ShowError::UnknownLayer(format!("#{}", layer.0)))?;
        if let Some(pending) = scheduler.apply(command, now) {
            self.enqueue(pending);
        }
        Ok(())
    }

    /// Applies a manual command to the layer called `layer`.
    pub fn command_by_name(&mut self, layer: &str, command: SceneCommand) -> Result<()> {
        let id = self
            .layer_by_name(layer)
            .ok_or_else(|| ShowError::UnknownLayer(layer.to_string()))?;
        self.command(id, command)
    }

    /// Runs the show in virtual time for `duration`, one frame every
    /// `frame_interval`, replaying `script` at its timestamps.
    pub fn run_for(
        &mut self,
        duration: Duration,
        frame_interval: Duration,
        script: &[ScriptedCommand],
    ) -> Result<RunSummary> {
        if frame_interval.is_zero() {
            return Err(ShowError::InvalidConfig("frame interval must be positive".into()));
        }
        for entry in script {
            if self.layer_by_name(&entry.layer).is_none() {
                return Err(ShowError::UnknownLayer(entry.layer.clone()));
            }
        }

        let mut script: Vec<&ScriptedCommand> = script.iter().collect();
        script.sort_by_key(|entry| entry.at);
        let mut script = script.into_iter().peekable();

        let start = self.clock.now();
        let scheduled_at = |entry: &ScriptedCommand| start.saturating_add(entry.at);
        let end = start.saturating_add(duration);
        let mut summary = RunSummary::default();
        let mut frame_at = start;

        while frame_at < end {
            while let Some(entry) = script.next_if(|entry| scheduled_at(entry) <= frame_at) {
                self.advance_to(scheduled_at(entry));
                self.command_by_name(&entry.layer, entry.command)?;
            }
            self.advance_to(frame_at);

            let frame = self.on_frame();
            summary.frames += 1;
            if frame.is_beat {
                summary.beats += 1;
            }
            frame_at = frame_at.saturating_add(frame_interval);
        }
        self.advance_to(end);

        summary.rotations = self.layers.iter().map(SceneScheduler::rotations).sum();
        summary.layers = self.layer_summaries();
        Ok(summary)
    }

    /// Cancels every pending rotation and stops the active scenes.
    pub fn shutdown(&mut self) {
        for layer in &mut self.layers {
            layer.shutdown();
        }
        self.timers.clear();
        tracing::info!(frames = self.dispatcher.frames(), "show shut down");
    }

    /// Returns the id of the layer called `name`.
    pub fn layer_by_name(&self, name: &str) -> Option<LayerId> {
        self.layers
            .iter()
            .position(|layer| layer.name() == name)
            .map(LayerId)
    }

    /// Returns the scheduler behind `id`.
    pub fn layer(&self, id: LayerId) -> Option<&SceneScheduler> {
        self.layers.get(id.0)
    }

    pub fn layers(&self) -> &[SceneScheduler] {
        &self.layers
    }

    /// Returns the name of the scene current on layer `id`.
    pub fn current_name(&self, id: LayerId) -> Option<&str> {
        self.layer(id).and_then(SceneScheduler::current_name)
    }

    /// Returns a snapshot of every layer.
    pub fn layer_summaries(&self) -> Vec<LayerSummary> {
        self.layers
            .iter()
            .map(|layer| LayerSummary {
                name: layer.name().to_string(),
                current: layer.current_name().map(str::to_string),
                active: layer.is_active(),
                rotations: layer.rotations(),
            })
            .collect()
    }

    /// Returns the show clock.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Timer entries still queued, including superseded ones not yet popped.
    pub fn queued_timers(&self) -> usize {
        self.timers.len()
    }

    /// Returns the number of frames dispatched so far.
    pub fn frames(&self) -> u64 {
        self.dispatcher.frames()
    }

    fn enqueue(&mut self, pending: PendingRotation) {
        self.timers.schedule(pending.due, pending.token);
    }
}

impl fmt::Debug for Show {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Show")
            .field("block_size", &self.block_size)
            .field("layers", &self.layers)
            .field("timers", &self.timers.len())
            .field("clock", &self.clock)
            .field("frames", &self.dispatcher.frames())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{Silence, WavSource},
        scene::demo,
        RenderGraph,
    };

    struct Unplugged;

    impl AudioSource for Unplugged {
        fn next_window(&mut self, _len: usize) -> Result<Option<Vec<f32>>> {
            Err(ShowError::msg("capture device unplugged"))
        }

        fn sample_rate(&self) -> u32 {
            48_000
        }
    }

    fn config(min_ms: u64, max_ms: u64) -> AppConfig {
        AppConfig {
            layers: vec![
                LayerConfig::named("background").with_interval(
                    Duration::from_millis(min_ms),
                    Duration::from_millis(max_ms),
                ),
                LayerConfig::named("foreground").with_interval(
                    Duration::from_millis(min_ms),
                    Duration::from_millis(max_ms),
                ),
            ],
            seed: Some(17),
            ..AppConfig::default()
        }
    }

    fn show(config: &AppConfig) -> Show {
        Show::from_config(
            config,
            Box::new(Silence { sample_rate: 48_000 }),
            Box::new(RenderGraph::new()),
            demo::catalog_for,
        )
        .unwrap()
    }

    #[test]
    fn parses_scripted_commands() {
        let entry: ScriptedCommand = "12.5:foreground:random".parse().unwrap();
        assert_eq!(entry.at, Duration::from_millis(12_500));
        assert_eq!(entry.layer, "foreground");
        assert_eq!(entry.command, SceneCommand::Random);

        assert!("12.5:foreground".parse::<ScriptedCommand>().is_err());
        assert!("soon:foreground:stop".parse::<ScriptedCommand>().is_err());
        assert!("-1:foreground:stop".parse::<ScriptedCommand>().is_err());
        assert!("1:foreground:dance".parse::<ScriptedCommand>().is_err());
    }

    #[test]
    fn start_opens_on_empty_then_rotates_each_layer() {
        let config = config(1_000, 2_000);
        let mut show = show(&config);
        show.start().unwrap();

        for layer in show.layers() {
            assert!(layer.is_active());
            assert_eq!(layer.rotations(), 1);
            assert!(layer.pending().is_some());
        }
        // Opening rotation supersedes the first armed timer.
        assert_eq!(show.queued_timers(), 4);
    }

    #[test]
    fn configured_initial_scene_skips_opening_rotation() {
        let mut config = config(1_000, 2_000);
        config.layers[1].initial_scene = Some("triangleRow".to_string());
        let mut show = show(&config);
        show.start().unwrap();

        let foreground = show.layer_by_name("foreground").unwrap();
        assert_eq!(show.current_name(foreground), Some("triangleRow"));
        assert_eq!(show.layer(foreground).unwrap().rotations(), 0);
    }

    #[test]
    fn unknown_initial_scene_fails_start() {
        let mut config = config(1_000, 2_000);
        config.layers[0].initial_scene = Some("missing".to_string());
        let mut show = show(&config);
        assert!(matches!(show.start(), Err(ShowError::UnknownScene { .. })));
    }

    #[test]
    fn timers_fire_once_per_due_rotation_and_skip_stale_entries() {
        let config = config(1_000, 1_000);
        let mut show = show(&config);
        show.start().unwrap();

        assert_eq!(show.advance_to(Duration::from_millis(999)), 0);
        assert_eq!(show.advance_to(Duration::from_millis(1_000)), 2);
        assert_eq!(show.advance_to(Duration::from_millis(1_500)), 0);

        let background = show.layer_by_name("background").unwrap();
        show.command(background, SceneCommand::Random).unwrap();
        // Background re-armed at 2.5s; its 2.0s entry is now stale.
        assert_eq!(show.advance_to(Duration::from_millis(2_000)), 1);
        assert_eq!(show.advance_to(Duration::from_millis(2_500)), 1);
        assert_eq!(show.layer(background).unwrap().rotations(), 4);
    }

    #[test]
    fn zero_interval_rotation_waits_for_the_next_advance() {
        let config = config(0, 0);
        let mut show = show(&config);
        show.start().unwrap();

        assert_eq!(show.advance_to(Duration::ZERO), 2);
        assert_eq!(show.advance_to(Duration::ZERO), 2);
    }

    #[test]
    fn long_advance_catches_up_on_every_missed_rotation() {
        let mut config = config(60_000, 60_000);
        config.layers.truncate(1);
        let mut show = show(&config);
        show.start().unwrap();

        assert_eq!(show.advance_to(Duration::from_secs(600)), 10);
        let background = show.layer(LayerId(0)).unwrap();
        assert_eq!(background.rotations(), 11);
        assert_eq!(
            background.pending().map(|pending| pending.due),
            Some(Duration::from_secs(660))
        );
        assert_eq!(show.advance_to(Duration::from_secs(659)), 0);
        assert_eq!(show.advance_to(Duration::from_secs(660)), 1);
    }

    #[test]
    fn short_intervals_fire_several_times_between_frames() {
        let mut config = config(4, 4);
        config.layers.truncate(1);
        let mut show = show(&config);
        show.start().unwrap();

        assert_eq!(show.advance_to(Duration::from_millis(17)), 4);
        assert_eq!(show.advance_to(Duration::from_millis(20)), 1);
    }

    #[test]
    fn exhausted_source_continues_with_full_silent_frames() {
        let config = config(60_000, 60_000);
        let block = config.audio.block_size;
        let mut show = Show::from_config(
            &config,
            Box::new(WavSource::from_samples(48_000, vec![0.5; block * 2])),
            Box::new(RenderGraph::new()),
            demo::catalog_for,
        )
        .unwrap();
        show.start().unwrap();

        for _ in 0..2 {
            let frame = show.on_frame();
            assert_eq!(frame.waveform.len(), block);
            assert!(frame.volume > 0.0);
        }
        assert!(!show.source_exhausted);

        for _ in 0..3 {
            let frame = show.on_frame();
            assert_eq!(frame.waveform.len(), block);
            assert_eq!(frame.volume, 0.0);
            assert!(!frame.is_beat);
        }
        assert!(show.source_exhausted);
        assert_eq!(show.frames(), 5);
    }

    #[test]
    fn failing_source_yields_silence_and_the_show_keeps_running() {
        let config = config(100, 100);
        let mut show = Show::from_config(
            &config,
            Box::new(Unplugged),
            Box::new(RenderGraph::new()),
            demo::catalog_for,
        )
        .unwrap();
        show.start().unwrap();

        let frame = show.on_frame();
        assert_eq!(frame.waveform, vec![0.0; config.audio.block_size]);
        assert_eq!(frame.volume, 0.0);

        let summary = show
            .run_for(Duration::from_secs(1), Duration::from_millis(10), &[])
            .unwrap();
        assert_eq!(summary.frames, 100);
        assert_eq!(summary.beats, 0);
        assert!(summary.rotations > 2);
    }

    #[test]
    fn far_future_script_entries_never_fire() {
        let config = config(1_000, 2_000);
        let mut show = show(&config);
        show.start().unwrap();
        show.advance_to(Duration::from_secs(1));

        let script = vec![ScriptedCommand {
            at: Duration::MAX,
            layer: "foreground".to_string(),
            command: SceneCommand::Stop,
        }];
        let summary = show
            .run_for(Duration::from_secs(1), Duration::from_millis(10), &script)
            .unwrap();

        assert_eq!(summary.frames, 100);
        assert!(show.layers().iter().all(SceneScheduler::is_active));
    }

    #[test]
    fn commands_reject_unknown_layers() {
        let config = config(1_000, 2_000);
        let mut show = show(&config);
        assert!(matches!(
            show.command_by_name("sideways", SceneCommand::Stop),
            Err(ShowError::UnknownLayer(_))
        ));
        assert!(show.command(LayerId(9), SceneCommand::Stop).is_err());
    }

    #[test]
    fn duplicate_layer_names_are_rejected() {
        let mut config = config(1_000, 2_000);
        config.layers[1].name = "background".to_string();
        let built = Show::from_config(
            &config,
            Box::new(Silence { sample_rate: 48_000 }),
            Box::new(RenderGraph::new()),
            demo::catalog_for,
        );
        assert!(matches!(built, Err(ShowError::InvalidConfig(_))));
    }

    #[test]
    fn shutdown_stops_everything() {
        let config = config(1_000, 2_000);
        let mut show = show(&config);
        show.start().unwrap();
        show.shutdown();

        assert_eq!(show.queued_timers(), 0);
        assert!(show.layers().iter().all(|layer| !layer.is_active()));
        assert_eq!(show.advance_to(Duration::from_secs(60)), 0);
    }

    #[test]
    fn run_for_counts_frames_and_replays_script() {
        let config = config(60_000, 60_000);
        let mut show = show(&config);
        show.start().unwrap();

        let script = vec!["0.5:foreground:stop".parse().unwrap()];
        let summary = show
            .run_for(Duration::from_secs(1), Duration::from_millis(10), &script)
            .unwrap();

        assert_eq!(summary.frames, 100);
        assert_eq!(summary.beats, 0);
        assert_eq!(summary.rotations, 2);
        let foreground = summary
            .layers
            .iter()
            .find(|layer| layer.name == "foreground")
            .unwrap();
        assert!(!foreground.active);
        assert!(foreground.current.is_some());
        assert_eq!(show.now(), Duration::from_secs(1));
    }

    #[test]
    fn run_for_rejects_bad_arguments() {
        let config = config(1_000, 2_000);
        let mut show = show(&config);
        assert!(show
            .run_for(Duration::from_secs(1), Duration::ZERO, &[])
            .is_err());

        let script = vec!["0.1:nowhere:stop".parse().unwrap()];
        assert!(matches!(
            show.run_for(Duration::from_secs(1), Duration::from_millis(10), &script),
            Err(ShowError::UnknownLayer(_))
        ));
    }
}
