//! Per-car track animation
//!
//! A [`CarAnimation`] moves one car from the start of its track to the
//! finish line over `distance / velocity` milliseconds, as handed out by
//! the engine endpoint. The position is advanced by a frame loop that
//! wakes once per display refresh, so any number of cars progress
//! independently on the same runtime.
//!
//! Every frame loop carries a generation number. A frame is only committed
//! while its generation is current, and the check happens under the same
//! lock that [`CarAnimation::stop`] takes, so once `stop` returns no earlier
//! loop can move the car again.

use crate::backend::{BackendError, RaceBackend};
use crate::config::DEFAULT_TRACK_LENGTH;
use crate::lock;
use crate::model::{CarId, DriveResponse, EngineResponse};
use crate::units::{Pixels, Progress, Seconds};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnimationError {
    #[error("failed to start engine of car {car_id}: {source}")]
    EngineStart {
        car_id: CarId,
        #[source]
        source: BackendError,
    },

    #[error("engine of car {car_id} returned unusable parameters (velocity {}, distance {})", .engine.velocity, .engine.distance)]
    InvalidEngine {
        car_id: CarId,
        engine: EngineResponse,
    },

    #[error("car {car_id} stopped while driving: {source}")]
    DriveFailed {
        car_id: CarId,
        #[source]
        source: BackendError,
    },

    #[error("car {car_id} was refused drive mode")]
    DriveRefused { car_id: CarId },
}

/// Coarse lifecycle published to completion waiters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnimationPhase {
    Idle,
    Running,
    /// Crossed the finish line after the measured race time
    Finished(Seconds),
}

/// Render-ready copy of an animation's state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationSnapshot {
    pub position: Pixels,
    pub track_length: Pixels,
    pub is_running: bool,
    pub finished: bool,
    pub engine_started: bool,
    pub race_time: Option<Seconds>,
}

impl AnimationSnapshot {
    pub fn progress(&self) -> Progress {
        Progress::along(self.position, self.track_length)
    }
}

#[derive(Debug)]
struct AnimationState {
    position: f64,
    track_length: f64,
    is_running: bool,
    finished: bool,
    engine_started: bool,
    /// Bumped by every start and stop; stale engine replies compare against it
    run: u64,
    /// Bumped whenever a frame loop is spawned or cancelled
    generation: u64,
    full_duration: Option<Duration>,
    started_at: Option<Instant>,
    race_time: Option<Seconds>,
    frames: Option<CancellationToken>,
}

impl AnimationState {
    fn new(track_length: f64) -> Self {
        Self {
            position: 0.0,
            track_length,
            is_running: false,
            finished: false,
            engine_started: false,
            run: 0,
            generation: 0,
            full_duration: None,
            started_at: None,
            race_time: None,
            frames: None,
        }
    }

    fn cancel_frames(&mut self) {
        self.generation += 1;
        if let Some(token) = self.frames.take() {
            token.cancel();
        }
    }

    fn phase(&self) -> AnimationPhase {
        if self.is_running {
            AnimationPhase::Running
        } else if self.finished {
            AnimationPhase::Finished(self.race_time.unwrap_or_default())
        } else {
            AnimationPhase::Idle
        }
    }

    fn snapshot(&self) -> AnimationSnapshot {
        AnimationSnapshot {
            position: Pixels(self.position),
            track_length: Pixels(self.track_length),
            is_running: self.is_running,
            finished: self.finished,
            engine_started: self.engine_started,
            race_time: self.race_time,
        }
    }
}

struct Shared {
    state: Mutex<AnimationState>,
    phase: watch::Sender<AnimationPhase>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, AnimationState> {
        lock(&self.state)
    }

    fn publish(&self, state: &AnimationState) {
        self.phase.send_replace(state.phase());
    }

    /// Commit one frame; false ends the loop that produced it
    fn commit_frame(&self, generation: u64, progress: f64) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }

        let length = state.track_length;
        state.position = (length * progress).clamp(0.0, length);
        if progress < 1.0 {
            return true;
        }

        state.position = length;
        state.finished = true;
        state.is_running = false;
        state.engine_started = false;
        state.frames = None;
        state.race_time = state
            .started_at
            .map(|t| Seconds::from_duration(t.elapsed()));
        self.publish(&state);
        false
    }
}

/// Handle to one car's animation; clones share the same state
#[derive(Clone)]
pub struct CarAnimation {
    car_id: CarId,
    backend: Arc<dyn RaceBackend>,
    frame_interval: Duration,
    shared: Arc<Shared>,
}

impl CarAnimation {
    pub fn new(
        car_id: CarId,
        backend: Arc<dyn RaceBackend>,
        track_length: Pixels,
        frame_interval: Duration,
    ) -> Self {
        let length = if track_length.is_usable_length() {
            track_length.0
        } else {
            warn!(
                "Car {} got unusable track length {}, using {}",
                car_id, track_length.0, DEFAULT_TRACK_LENGTH
            );
            DEFAULT_TRACK_LENGTH
        };
        let (phase, _) = watch::channel(AnimationPhase::Idle);

        Self {
            car_id,
            backend,
            frame_interval,
            shared: Arc::new(Shared {
                state: Mutex::new(AnimationState::new(length)),
                phase,
            }),
        }
    }

    pub fn car_id(&self) -> CarId {
        self.car_id
    }

    pub fn has_finished(&self) -> bool {
        self.shared.lock().finished
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().is_running
    }

    pub fn position(&self) -> Pixels {
        Pixels(self.shared.lock().position)
    }

    pub fn snapshot(&self) -> AnimationSnapshot {
        self.shared.lock().snapshot()
    }

    pub fn phase(&self) -> AnimationPhase {
        *self.shared.phase.borrow()
    }

    /// Watch the animation's phase transitions
    pub fn subscribe(&self) -> watch::Receiver<AnimationPhase> {
        self.shared.phase.subscribe()
    }

    /// Resolves as soon as the animation is not running
    ///
    /// Yields the race time if the car crossed the finish line, None if it
    /// was stopped, broke down, or never started.
    pub async fn settled(&self) -> Option<Seconds> {
        let mut rx = self.shared.phase.subscribe();
        let phase = match rx.wait_for(|p| *p != AnimationPhase::Running).await {
            Ok(phase) => *phase,
            Err(_) => AnimationPhase::Idle,
        };
        match phase {
            AnimationPhase::Finished(time) => Some(time),
            _ => None,
        }
    }

    /// Start the engine and drive to the finish line
    ///
    /// Returns once the drive request settles. A no-op while already running.
    pub async fn start(&self) -> Result<(), AnimationError> {
        match self.begin() {
            Some(run) => self.run_engine(run).await,
            None => Ok(()),
        }
    }

    /// Fire-and-forget [`start`](Self::start)
    ///
    /// The car is marked running before this returns, so a caller waiting
    /// on [`settled`](Self::settled) right after never sees the previous run.
    /// Returns None if the car was already running.
    pub fn launch(&self) -> Option<JoinHandle<Result<(), AnimationError>>> {
        let run = self.begin()?;
        let this = self.clone();
        Some(tokio::spawn(async move { this.run_engine(run).await }))
    }

    /// Halt the frame loop; safe to call any number of times, before or after start
    pub fn stop(&self, keep_position: bool) {
        let mut state = self.shared.lock();
        state.run += 1;
        state.cancel_frames();
        state.is_running = false;
        state.engine_started = false;

        if !keep_position {
            state.position = 0.0;
            state.finished = false;
            state.race_time = None;
        }
        self.shared.publish(&state);
    }

    /// Apply a new track length, keeping normalized progress
    ///
    /// A running car continues from the same fraction of the new track with
    /// the remaining share of its original duration.
    pub fn set_track_length(&self, length: Pixels) {
        if !length.is_usable_length() {
            warn!(
                "Ignoring unusable track length {} for car {}",
                length.0, self.car_id
            );
            return;
        }

        let mut state = self.shared.lock();
        let progress = Progress::along(Pixels(state.position), Pixels(state.track_length));
        state.track_length = length.0;
        state.position = progress.at(length).0;

        if state.is_running && state.engine_started {
            debug!(
                "Car {} resumes at {:.3} of a {}px track",
                self.car_id, progress.0, length.0
            );
            self.spawn_frames(&mut state, progress.0);
        }
    }

    fn begin(&self) -> Option<u64> {
        let mut state = self.shared.lock();
        if state.is_running {
            debug!("Car {} is already running", self.car_id);
            return None;
        }

        state.run += 1;
        state.cancel_frames();
        state.is_running = true;
        state.finished = false;
        state.engine_started = false;
        state.position = 0.0;
        state.full_duration = None;
        state.started_at = None;
        state.race_time = None;
        self.shared.publish(&state);
        Some(state.run)
    }

    async fn run_engine(&self, run: u64) -> Result<(), AnimationError> {
        let car_id = self.car_id;

        let engine = match self.backend.start_engine(car_id).await {
            Ok(engine) => engine,
            Err(source) => {
                error!("Failed to start car {}: {}", car_id, source);
                self.abandon(run);
                return Err(AnimationError::EngineStart { car_id, source });
            }
        };

        let Some(duration) = engine.duration() else {
            error!(
                "Car {} got unusable engine parameters {:?}",
                car_id, engine
            );
            self.abandon(run);
            return Err(AnimationError::InvalidEngine { car_id, engine });
        };

        if !self.engage(run, duration) {
            debug!("Car {} was stopped before its engine started", car_id);
            return Ok(());
        }

        // Drive failures freeze the car where it is; nothing is rolled back
        match self.backend.drive(car_id).await {
            Ok(DriveResponse { success: true }) => Ok(()),
            Ok(DriveResponse { success: false }) => {
                if !self.halt(run) {
                    return Ok(());
                }
                warn!("Drive mode refused for car {}", car_id);
                Err(AnimationError::DriveRefused { car_id })
            }
            Err(source) => {
                if !self.halt(run) {
                    return Ok(());
                }
                warn!("Drive mode warning for car {}: {}", car_id, source);
                Err(AnimationError::DriveFailed { car_id, source })
            }
        }
    }

    /// Engine parameters arrived: begin moving unless the run was superseded
    fn engage(&self, run: u64, duration: Duration) -> bool {
        let mut state = self.shared.lock();
        if state.run != run || !state.is_running {
            return false;
        }

        state.engine_started = true;
        state.full_duration = Some(duration);
        state.started_at = Some(Instant::now());
        self.spawn_frames(&mut state, 0.0);
        true
    }

    /// Engine failed mid-run: stop in place
    fn halt(&self, run: u64) -> bool {
        let mut state = self.shared.lock();
        if state.run != run || !state.is_running {
            return false;
        }

        state.cancel_frames();
        state.is_running = false;
        state.engine_started = false;
        self.shared.publish(&state);
        true
    }

    /// Engine never started: back to the start line
    fn abandon(&self, run: u64) {
        let mut state = self.shared.lock();
        if state.run != run {
            return;
        }

        state.cancel_frames();
        state.is_running = false;
        state.engine_started = false;
        state.position = 0.0;
        state.finished = false;
        self.shared.publish(&state);
    }

    fn spawn_frames(&self, state: &mut AnimationState, initial_progress: f64) {
        state.cancel_frames();
        let Some(duration) = state.full_duration else {
            return;
        };

        let token = CancellationToken::new();
        state.frames = Some(token.clone());
        tokio::spawn(run_frames(
            self.shared.clone(),
            state.generation,
            token,
            duration,
            initial_progress,
            self.frame_interval,
        ));
    }
}

impl std::fmt::Debug for CarAnimation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CarAnimation")
            .field("car_id", &self.car_id)
            .field("state", &self.snapshot())
            .finish()
    }
}

/// Frame loop: position = length * (initial + elapsed / duration)
async fn run_frames(
    shared: Arc<Shared>,
    generation: u64,
    cancel: CancellationToken,
    duration: Duration,
    initial_progress: f64,
    frame_interval: Duration,
) {
    let started = Instant::now();
    let mut ticker = time::interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let progress = if duration.is_zero() {
            1.0
        } else {
            initial_progress + started.elapsed().as_secs_f64() / duration.as_secs_f64()
        };

        if !shared.commit_frame(generation, progress) {
            break;
        }
    }
}
