use std::{fmt, str::FromStr, time::Duration};

use rand::{rngs::StdRng, Rng};

use crate::{
    config::LayerConfig,
    scene::{SceneCatalog, SceneId},
    timeline::{format_countdown, LayerId, PendingRotation, RotationToken},
    AudioFrame, Result, ShowError,
};

/// What a layer is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// No scene receives frames. `last` remembers the scene that was stopped,
    /// `None` before the layer has ever started.
    Stopped { last: Option<SceneId> },
    Active(SceneId),
}

/// Manual commands accepted per layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneCommand {
    Restart,
    Stop,
    Random,
    Empty,
}

impl FromStr for SceneCommand {
    type Err = ShowError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "restart" => Ok(Self::Restart),
            "stop" => Ok(Self::Stop),
            "random" => Ok(Self::Random),
            "empty" => Ok(Self::Empty),
            other => Err(ShowError::msg(format!(
                "unknown scene command `{other}` (expected restart, stop, random or empty)"
            ))),
        }
    }
}

impl fmt::Display for SceneCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Restart => "restart",
            Self::Stop => "stop",
            Self::Random => "random",
            Self::Empty => "empty",
        };
        f.write_str(name)
    }
}

/// Rotates one layer through its catalog on a jittered timer.
///
/// The scheduler never talks to a timer queue directly. Every operation that
/// arms a rotation returns the [`PendingRotation`] for the caller to enqueue,
/// and [`SceneScheduler::fire`] ignores any token other than the latest one,
/// so superseded queue entries fall through as no-ops.
pub struct SceneScheduler {
    layer: LayerId,
    config: LayerConfig,
    catalog: SceneCatalog,
    rng: StdRng,
    activity: Activity,
    generation: u64,
    pending: Option<PendingRotation>,
    rotations: u64,
}

impl SceneScheduler {
    /// Creates a stopped scheduler. Fails on an inverted interval or an empty
    /// catalog.
    pub fn new(
        layer: LayerId,
        config: LayerConfig,
        catalog: SceneCatalog,
        rng: StdRng,
    ) -> Result<Self> {
        config.validate()?;
        if catalog.is_empty() {
            return Err(ShowError::EmptyCatalog(config.name.clone()));
        }

        Ok(Self {
            layer,
            config,
            catalog,
            rng,
            activity: Activity::Stopped { last: None },
            generation: 0,
            pending: None,
            rotations: 0,
        })
    }

    /// Returns the layer this scheduler drives.
    pub fn layer(&self) -> LayerId {
        self.layer
    }

    /// Returns the configured layer name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the layer configuration.
    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    /// Returns the scenes this layer rotates through.
    pub fn catalog(&self) -> &SceneCatalog {
        &self.catalog
    }

    /// Returns what the layer is currently showing.
    pub fn activity(&self) -> Activity {
        self.activity
    }

    /// Returns `true` while a scene receives frames.
    pub fn is_active(&self) -> bool {
        matches!(self.activity, Activity::Active(_))
    }

    /// The active scene, or the last one shown while stopped.
    pub fn current(&self) -> Option<SceneId> {
        match self.activity {
            Activity::Active(id) => Some(id),
            Activity::Stopped { last } => last,
        }
    }

    /// Returns the name of [`SceneScheduler::current`].
    pub fn current_name(&self) -> Option<&str> {
        self.current().and_then(|id| self.catalog.name(id))
    }

    /// Returns the rotation currently armed, if any.
    pub fn pending(&self) -> Option<PendingRotation> {
        self.pending
    }

    /// Number of rotations performed so far.
    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    /// Starts `initial` and arms the first rotation.
    pub fn start(&mut self, initial: SceneId, now: Duration) -> Result<PendingRotation> {
        if !self.catalog.contains(initial) {
            return Err(ShowError::UnknownScene {
                layer: self.config.name.clone(),
                scene: format!("#{}", initial.0),
            });
        }

        if let Activity::Active(previous) = self.activity {
            self.stop_scene(previous);
        }
        self.start_scene(initial);
        self.activity = Activity::Active(initial);
        Ok(self.arm(now))
    }

    /// Starts the first scene registered under `name`.
    pub fn start_named(&mut self, name: &str, now: Duration) -> Result<PendingRotation> {
        let id = self.catalog.find(name).ok_or_else(|| ShowError::UnknownScene {
            layer: self.config.name.clone(),
            scene: name.to_string(),
        })?;
        self.start(id, now)
    }

    /// Stops the current scene, starts a random one and re-arms the timer.
    pub fn rotate(&mut self, now: Duration) -> Option<PendingRotation> {
        let previous = match self.activity {
            Activity::Active(id) => Some(id),
            Activity::Stopped { last: Some(id) } => Some(id),
            Activity::Stopped { last: None } => {
                tracing::debug!(
                    layer = %self.config.name,
                    "rotation ignored, layer never started"
                );
                return None;
            }
        };

        let exclude = if self.config.avoid_repeats { previous } else { None };
        let next = self.catalog.pick_random(&mut self.rng, exclude)?;

        if let Activity::Active(id) = self.activity {
            self.stop_scene(id);
        }
        self.start_scene(next);
        self.activity = Activity::Active(next);
        self.rotations += 1;

        tracing::info!(
            layer = %self.config.name,
            index = next.0,
            scene = self.catalog.name(next).unwrap_or_default(),
            "picked scene"
        );
        Some(self.arm(now))
    }

    /// Timer entry point. Tokens other than the latest armed one are ignored.
    pub fn fire(&mut self, token: RotationToken, now: Duration) -> Option<PendingRotation> {
        match self.pending {
            Some(pending) if pending.token == token => {
                self.pending = None;
                self.rotate(now)
            }
            _ => {
                tracing::trace!(
                    layer = %self.config.name,
                    generation = token.generation,
                    "ignoring superseded rotation"
                );
                None
            }
        }
    }

    /// Stops and restarts the current scene without touching rotation timing.
    ///
    /// A stopped layer starts its last scene again; if nothing is armed at
    /// that point a fresh rotation is scheduled so the layer keeps rotating.
    pub fn restart(&mut self, now: Duration) -> Option<PendingRotation> {
        match self.activity {
            Activity::Active(id) => {
                self.stop_scene(id);
                self.start_scene(id);
                None
            }
            Activity::Stopped { last: Some(id) } => {
                self.start_scene(id);
                self.activity = Activity::Active(id);
                match self.pending {
                    Some(_) => None,
                    None => Some(self.arm(now)),
                }
            }
            Activity::Stopped { last: None } => None,
        }
    }

    /// Stops the current scene. The pending rotation survives unless the layer
    /// is configured with `stop_cancels_rotation`.
    pub fn stop(&mut self) -> bool {
        let Activity::Active(id) = self.activity else {
            return false;
        };

        self.stop_scene(id);
        self.activity = Activity::Stopped { last: Some(id) };
        if self.config.stop_cancels_rotation {
            self.cancel();
        }
        true
    }

    /// Replaces the current scene with the catalog's reserved empty scene.
    pub fn to_empty(&mut self, now: Duration) -> Option<PendingRotation> {
        let Some(empty) = self.catalog.empty_scene() else {
            tracing::warn!(layer = %self.config.name, "no empty scene registered");
            return None;
        };

        match self.activity {
            Activity::Stopped { last: None } => return None,
            Activity::Active(id) => self.stop_scene(id),
            Activity::Stopped { last: Some(_) } => {}
        }
        self.start_scene(empty);
        self.activity = Activity::Active(empty);
        Some(self.arm(now))
    }

    /// Applies a manual command, returning any newly armed rotation.
    pub fn apply(&mut self, command: SceneCommand, now: Duration) -> Option<PendingRotation> {
        tracing::debug!(layer = %self.config.name, %command, "manual command");
        match command {
            SceneCommand::Restart => self.restart(now),
            SceneCommand::Stop => {
                self.stop();
                None
            }
            SceneCommand::Random => self.rotate(now),
            SceneCommand::Empty => self.to_empty(now),
        }
    }

    /// Forwards a frame to the active scene. Returns whether a scene received it.
    pub fn tick(&mut self, frame: &AudioFrame) -> bool {
        let Activity::Active(id) = self.activity else {
            return false;
        };
        match self.catalog.scene_mut(id) {
            Some(scene) => {
                scene.tick(frame);
                true
            }
            None => false,
        }
    }

    /// Invalidates the pending rotation, if any.
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.pending = None;
    }

    /// Cancels rotation and stops the active scene.
    pub fn shutdown(&mut self) {
        self.cancel();
        self.stop();
    }

    fn arm(&mut self, now: Duration) -> PendingRotation {
        self.generation += 1;
        let interval = self.draw_interval();
        let pending = PendingRotation {
            token: RotationToken {
                layer: self.layer,
                generation: self.generation,
            },
            due: now.saturating_add(interval),
            interval,
        };
        self.pending = Some(pending);

        tracing::debug!(
            layer = %self.config.name,
            interval_ms = interval.as_millis() as u64,
            countdown = %format_countdown(interval),
            "next rotation armed"
        );
        pending
    }

    fn draw_interval(&mut self) -> Duration {
        let millis = self
            .rng
            .gen_range(self.config.interval_min_ms..=self.config.interval_max_ms);
        Duration::from_millis(millis)
    }

    fn start_scene(&mut self, id: SceneId) {
        tracing::debug!(
            layer = %self.config.name,
            scene = self.catalog.name(id).unwrap_or_default(),
            "starting scene"
        );
        if let Some(scene) = self.catalog.scene_mut(id) {
            scene.start();
        }
    }

    fn stop_scene(&mut self, id: SceneId) {
        tracing::debug!(
            layer = %self.config.name,
            scene = self.catalog.name(id).unwrap_or_default(),
            "stopping scene"
        );
        if let Some(scene) = self.catalog.scene_mut(id) {
            scene.stop();
        }
    }
}

impl fmt::Debug for SceneScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneScheduler")
            .field("layer", &self.layer)
            .field("name", &self.config.name)
            .field("activity", &self.activity)
            .field("generation", &self.generation)
            .field("pending", &self.pending)
            .field("scenes", &self.catalog.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use rand::SeedableRng;

    use super::*;
    use crate::scene::{Scene, SceneDescriptor};

    type Journal = Rc<RefCell<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        journal: Journal,
    }

    impl Scene for Recorder {
        fn start(&mut self) {
            self.journal.borrow_mut().push(format!("start:{}", self.name));
        }

        fn stop(&mut self) {
            self.journal.borrow_mut().push(format!("stop:{}", self.name));
        }

        fn tick(&mut self, _frame: &AudioFrame) {
            self.journal.borrow_mut().push(format!("tick:{}", self.name));
        }
    }

    fn catalog(names: &[&'static str], journal: &Journal) -> SceneCatalog {
        let mut catalog = SceneCatalog::new();
        for name in names {
            let descriptor = SceneDescriptor::new(
                *name,
                Recorder {
                    name: *name,
                    journal: journal.clone(),
                },
            );
            if *name == "empty" {
                catalog.register_empty(descriptor);
            } else {
                catalog.register(descriptor);
            }
        }
        catalog
    }

    fn layer(min_ms: u64, max_ms: u64) -> LayerConfig {
        LayerConfig {
            interval_min_ms: min_ms,
            interval_max_ms: max_ms,
            ..LayerConfig::named("background")
        }
    }

    fn scheduler_with(
        config: LayerConfig,
        names: &[&'static str],
        seed: u64,
    ) -> (SceneScheduler, Journal) {
        let journal = Journal::default();
        let scheduler = SceneScheduler::new(
            LayerId(0),
            config,
            catalog(names, &journal),
            StdRng::seed_from_u64(seed),
        )
        .unwrap();
        (scheduler, journal)
    }

    fn scheduler(names: &[&'static str]) -> (SceneScheduler, Journal) {
        scheduler_with(layer(1_000, 2_000), names, 42)
    }

    fn silent_frame() -> AudioFrame {
        AudioFrame::silent(Vec::new(), 0.0)
    }

    fn events(journal: &Journal) -> Vec<String> {
        journal.borrow().clone()
    }

    #[test]
    fn two_rotations_stop_before_each_start() {
        let (mut scheduler, journal) = scheduler_with(layer(0, 0), &["empty", "torus"], 9);
        let empty = scheduler.catalog().find("empty").unwrap();

        let first = scheduler.start(empty, Duration::ZERO).unwrap();
        assert_eq!(first.due, Duration::ZERO);
        let mut active = vec![scheduler.current_name().unwrap().to_string()];
        for _ in 0..2 {
            scheduler.rotate(Duration::ZERO).unwrap();
            active.push(scheduler.current_name().unwrap().to_string());
        }

        assert_eq!(active[0], "empty");
        assert!(active[1..].iter().all(|name| name == "empty" || name == "torus"));

        let log = events(&journal);
        assert_eq!(log.len(), 5);
        assert_eq!(log[0], "start:empty");
        assert_eq!(log[1], format!("stop:{}", active[0]));
        assert_eq!(log[2], format!("start:{}", active[1]));
        assert_eq!(log[3], format!("stop:{}", active[1]));
        assert_eq!(log[4], format!("start:{}", active[2]));
    }

    #[test]
    fn rotate_stops_old_once_then_starts_new_once() {
        let (mut scheduler, journal) = scheduler(&["empty", "torus", "dots"]);
        scheduler.start(SceneId(1), Duration::ZERO).unwrap();
        journal.borrow_mut().clear();

        scheduler.rotate(Duration::from_millis(5)).unwrap();
        let new_name = scheduler.current_name().unwrap().to_string();
        assert_eq!(events(&journal), vec!["stop:torus".to_string(), format!("start:{new_name}")]);
        assert_eq!(scheduler.rotations(), 1);
    }

    #[test]
    fn stop_before_start_is_a_no_op() {
        let (mut scheduler, journal) = scheduler(&["empty", "torus"]);

        assert!(!scheduler.stop());
        assert_eq!(scheduler.activity(), Activity::Stopped { last: None });
        assert!(scheduler.rotate(Duration::ZERO).is_none());
        assert!(scheduler.restart(Duration::ZERO).is_none());
        assert!(scheduler.to_empty(Duration::ZERO).is_none());
        assert!(!scheduler.tick(&silent_frame()));
        assert!(scheduler.current_name().is_none());
        assert!(events(&journal).is_empty());
    }

    #[test]
    fn repeated_stop_leaves_state_unchanged() {
        let (mut scheduler, journal) = scheduler(&["empty", "torus"]);
        scheduler.start(SceneId(1), Duration::ZERO).unwrap();

        assert!(scheduler.stop());
        let state = scheduler.activity();
        assert!(!scheduler.stop());
        assert_eq!(scheduler.activity(), state);
        assert_eq!(events(&journal), vec!["start:torus", "stop:torus"]);
        assert_eq!(scheduler.current_name(), Some("torus"));
    }

    #[test]
    fn superseded_tokens_are_ignored() {
        let (mut scheduler, journal) = scheduler(&["empty", "torus"]);
        let first = scheduler.start(SceneId(0), Duration::ZERO).unwrap();
        let second = scheduler.rotate(Duration::from_millis(10)).unwrap();
        assert_ne!(first.token, second.token);

        let before = events(&journal);
        assert!(scheduler.fire(first.token, first.due).is_none());
        assert_eq!(events(&journal), before);
        assert_eq!(scheduler.pending(), Some(second));

        assert!(scheduler.fire(second.token, second.due).is_some());
        assert!(scheduler.fire(second.token, second.due).is_none());
    }

    #[test]
    fn only_the_latest_token_is_valid_after_many_commands() {
        let (mut scheduler, _journal) = scheduler(&["empty", "torus", "dots"]);
        let mut issued = vec![scheduler.start(SceneId(0), Duration::ZERO).unwrap()];
        let commands = [
            SceneCommand::Random,
            SceneCommand::Restart,
            SceneCommand::Empty,
            SceneCommand::Stop,
            SceneCommand::Restart,
            SceneCommand::Random,
        ];
        for (step, command) in commands.iter().enumerate() {
            if let Some(pending) = scheduler.apply(*command, Duration::from_millis(step as u64)) {
                issued.push(pending);
            }
        }

        let latest = *issued.last().unwrap();
        assert_eq!(scheduler.pending(), Some(latest));
        for stale in &issued[..issued.len() - 1] {
            assert!(scheduler.fire(stale.token, stale.due).is_none());
        }
        assert!(scheduler.fire(latest.token, latest.due).is_some());
    }

    #[test]
    fn stopped_layer_resumes_at_next_rotation_by_default() {
        let (mut scheduler, journal) = scheduler(&["empty", "torus"]);
        let pending = scheduler.start(SceneId(1), Duration::ZERO).unwrap();
        scheduler.stop();
        assert_eq!(scheduler.pending(), Some(pending));

        scheduler.fire(pending.token, pending.due).unwrap();
        assert!(scheduler.is_active());
        let log = events(&journal);
        assert_eq!(&log[..2], &["start:torus", "stop:torus"]);
        assert_eq!(log.len(), 3, "a stopped scene is not stopped twice: {log:?}");
        assert!(log[2].starts_with("start:"));
    }

    #[test]
    fn stop_can_cancel_the_pending_rotation() {
        let config = LayerConfig {
            stop_cancels_rotation: true,
            ..layer(1_000, 2_000)
        };
        let (mut scheduler, _journal) = scheduler_with(config, &["empty", "torus"], 1);
        let pending = scheduler.start(SceneId(1), Duration::ZERO).unwrap();

        scheduler.stop();
        assert!(scheduler.pending().is_none());
        assert!(scheduler.fire(pending.token, pending.due).is_none());
        assert!(!scheduler.is_active());

        let rearmed = scheduler.restart(Duration::from_secs(1));
        assert!(rearmed.is_some());
        assert!(scheduler.is_active());
    }

    #[test]
    fn restart_keeps_rotation_timing() {
        let (mut scheduler, journal) = scheduler(&["empty", "torus"]);
        let pending = scheduler.start(SceneId(1), Duration::ZERO).unwrap();
        journal.borrow_mut().clear();

        assert!(scheduler.restart(Duration::from_millis(300)).is_none());
        assert_eq!(scheduler.pending(), Some(pending));
        assert_eq!(events(&journal), vec!["stop:torus", "start:torus"]);
    }

    #[test]
    fn restart_after_stop_starts_last_scene_without_rearming() {
        let (mut scheduler, journal) = scheduler(&["empty", "torus"]);
        let pending = scheduler.start(SceneId(1), Duration::ZERO).unwrap();
        scheduler.stop();

        assert!(scheduler.restart(Duration::from_millis(10)).is_none());
        assert_eq!(scheduler.activity(), Activity::Active(SceneId(1)));
        assert_eq!(scheduler.pending(), Some(pending));
        assert_eq!(events(&journal), vec!["start:torus", "stop:torus", "start:torus"]);
    }

    #[test]
    fn to_empty_switches_to_reserved_scene_and_rearms() {
        let (mut scheduler, journal) = scheduler(&["empty", "torus"]);
        let first = scheduler.start(SceneId(1), Duration::ZERO).unwrap();

        let second = scheduler.to_empty(Duration::from_millis(50)).unwrap();
        assert_eq!(scheduler.current_name(), Some("empty"));
        assert_ne!(first.token, second.token);
        assert!(second.due >= Duration::from_millis(1_050));
        assert_eq!(events(&journal), vec!["start:torus", "stop:torus", "start:empty"]);
    }

    #[test]
    fn to_empty_without_reserved_scene_is_a_no_op() {
        let (mut scheduler, journal) = scheduler(&["torus", "dots"]);
        scheduler.start(SceneId(0), Duration::ZERO).unwrap();

        assert!(scheduler.to_empty(Duration::ZERO).is_none());
        assert_eq!(scheduler.current_name(), Some("torus"));
        assert_eq!(events(&journal), vec!["start:torus"]);
    }

    #[test]
    fn frames_reach_only_the_active_scene() {
        let (mut scheduler, journal) = scheduler(&["empty", "torus"]);
        scheduler.start(SceneId(1), Duration::ZERO).unwrap();

        assert!(scheduler.tick(&silent_frame()));
        scheduler.stop();
        assert!(!scheduler.tick(&silent_frame()));
        assert_eq!(events(&journal), vec!["start:torus", "tick:torus", "stop:torus"]);
    }

    #[test]
    fn rejects_bad_configuration() {
        let journal = Journal::default();
        let inverted = SceneScheduler::new(
            LayerId(0),
            layer(2_000, 1_000),
            catalog(&["empty"], &journal),
            StdRng::seed_from_u64(0),
        );
        assert!(matches!(inverted, Err(ShowError::InvalidInterval { .. })));

        let empty = SceneScheduler::new(
            LayerId(0),
            layer(0, 0),
            SceneCatalog::new(),
            StdRng::seed_from_u64(0),
        );
        assert!(matches!(empty, Err(ShowError::EmptyCatalog(name)) if name == "background"));
    }

    #[test]
    fn start_rejects_unknown_scenes() {
        let (mut scheduler, _journal) = scheduler(&["empty"]);
        assert!(scheduler.start(SceneId(4), Duration::ZERO).is_err());
        assert!(matches!(
            scheduler.start_named("nope", Duration::ZERO),
            Err(ShowError::UnknownScene { .. })
        ));
        assert!(scheduler.start_named("empty", Duration::ZERO).is_ok());
    }

    #[test]
    fn intervals_are_redrawn_within_bounds() {
        let (mut scheduler, _journal) = scheduler(&["empty", "torus"]);
        let mut now = Duration::ZERO;
        let mut pending = scheduler.start(SceneId(0), now).unwrap();
        let mut intervals = Vec::new();
        for _ in 0..50 {
            assert_eq!(pending.due, now + pending.interval);
            intervals.push(pending.interval);
            now = pending.due;
            pending = scheduler.fire(pending.token, now).unwrap();
        }

        let min = Duration::from_millis(1_000);
        let max = Duration::from_millis(2_000);
        assert!(intervals.iter().all(|interval| *interval >= min && *interval <= max));
        assert!(intervals.windows(2).any(|pair| pair[0] != pair[1]));
    }

    #[test]
    fn avoid_repeats_never_picks_current() {
        let config = LayerConfig {
            avoid_repeats: true,
            ..layer(0, 0)
        };
        let (mut scheduler, _journal) = scheduler_with(config, &["empty", "torus", "dots"], 5);
        scheduler.start(SceneId(0), Duration::ZERO).unwrap();
        let mut previous = scheduler.current();
        for _ in 0..100 {
            scheduler.rotate(Duration::ZERO);
            assert_ne!(scheduler.current(), previous);
            previous = scheduler.current();
        }
    }

    #[test]
    fn shutdown_stops_and_disarms() {
        let (mut scheduler, journal) = scheduler(&["empty", "torus"]);
        let pending = scheduler.start(SceneId(1), Duration::ZERO).unwrap();

        scheduler.shutdown();
        assert!(!scheduler.is_active());
        assert!(scheduler.pending().is_none());
        assert!(scheduler.fire(pending.token, pending.due).is_none());
        assert_eq!(events(&journal), vec!["start:torus", "stop:torus"]);
    }

    #[test]
    fn huge_intervals_saturate_instead_of_overflowing() {
        let (mut scheduler, _journal) = scheduler_with(layer(u64::MAX, u64::MAX), &["torus"], 5);

        let pending = scheduler.start(SceneId(0), Duration::MAX).unwrap();
        assert_eq!(pending.due, Duration::MAX);
        assert_eq!(pending.interval, Duration::from_millis(u64::MAX));
    }

    #[test]
    fn parses_commands() {
        assert_eq!("Random".parse::<SceneCommand>().unwrap(), SceneCommand::Random);
        assert_eq!(" empty ".parse::<SceneCommand>().unwrap(), SceneCommand::Empty);
        assert_eq!(SceneCommand::Restart.to_string(), "restart");
        assert!("explode".parse::<SceneCommand>().is_err());
    }
}
