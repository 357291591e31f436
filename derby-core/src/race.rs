//! Race coordination for one garage view
//!
//! A [`RaceView`] owns the animation handle of every car on its tracks.
//! Handles are created when tracks are rendered and stopped and dropped when
//! the tracks are re-rendered or a car is removed, so none outlives the view.
//!
//! A race launches every car at once and waits on each animation's
//! completion signal; the first car to report a finish wins. At most one
//! race is active per view.

use crate::animation::{AnimationError, AnimationSnapshot, CarAnimation};
use crate::backend::{BackendError, RaceBackend};
use crate::config::DerbyConfig;
use crate::lock;
use crate::model::{Car, CarId};
use crate::units::{Pixels, Seconds};
use crate::winners;
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Smallest time a winner record can hold
const MIN_RACE_TIME: f64 = 0.01;

#[derive(Error, Debug)]
pub enum RaceError {
    #[error("car {car_id} won in {time:.2}s but the result could not be saved: {source}")]
    Persist {
        car_id: CarId,
        time: f64,
        #[source]
        source: BackendError,
    },

    #[error("car {0} is not on this view's tracks")]
    UnknownCar(CarId),

    #[error(transparent)]
    Animation(#[from] AnimationError),
}

/// The winner overlay's content
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WinnerAnnouncement {
    pub car: Car,
    /// Race time in seconds, as persisted
    pub time: f64,
    /// Total wins of the car including this one
    pub wins: u32,
    pub declared_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RaceEvent {
    Started { cars: usize },
    Winner(WinnerAnnouncement),
    NoFinisher,
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RaceOutcome {
    /// A race was already active; nothing was started
    AlreadyRacing,
    Winner(WinnerAnnouncement),
    /// Every car stopped without crossing the finish line
    NoFinisher,
    /// The race was reset before anyone finished
    Reset,
}

/// A car's track together with its animation handle
#[derive(Debug, Clone)]
pub struct Track {
    pub car: Car,
    pub animation: CarAnimation,
}

/// Render-ready view of one track
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSnapshot {
    pub car: Car,
    pub animation: AnimationSnapshot,
}

pub struct RaceView {
    backend: Arc<dyn RaceBackend>,
    frame_interval: Duration,
    track_length: Mutex<Pixels>,
    tracks: Mutex<Vec<Track>>,
    /// Present while a race is active
    race: Mutex<Option<CancellationToken>>,
    overlay: Mutex<Option<WinnerAnnouncement>>,
    events: broadcast::Sender<RaceEvent>,
}

impl RaceView {
    pub fn new(backend: Arc<dyn RaceBackend>, frame_interval: Duration, track_length: Pixels) -> Self {
        let (events, _) = broadcast::channel(32);

        Self {
            backend,
            frame_interval,
            track_length: Mutex::new(track_length),
            tracks: Mutex::new(Vec::new()),
            race: Mutex::new(None),
            overlay: Mutex::new(None),
            events,
        }
    }

    pub fn from_config(backend: Arc<dyn RaceBackend>, config: &DerbyConfig) -> Self {
        Self::new(backend, config.frame_interval(), Pixels(config.track_length))
    }

    /// Replace all tracks with fresh animations for `cars`
    ///
    /// Ends any active race and stops every previous animation.
    pub fn render_tracks(&self, cars: &[Car]) {
        if let Some(token) = lock(&self.race).take() {
            debug!("Re-render ends the active race");
            token.cancel();
        }

        let length = *lock(&self.track_length);
        let fresh: Vec<Track> = cars
            .iter()
            .map(|car| Track {
                car: car.clone(),
                animation: CarAnimation::new(
                    car.id,
                    self.backend.clone(),
                    length,
                    self.frame_interval,
                ),
            })
            .collect();

        let previous = std::mem::replace(&mut *lock(&self.tracks), fresh);
        for track in previous {
            track.animation.stop(false);
        }
    }

    /// Stop and drop the track of a removed car
    pub fn remove_track(&self, car_id: CarId) -> bool {
        let mut tracks = lock(&self.tracks);
        match tracks.iter().position(|t| t.car.id == car_id) {
            Some(index) => {
                tracks.remove(index).animation.stop(false);
                true
            }
            None => false,
        }
    }

    pub fn tracks(&self) -> Vec<TrackSnapshot> {
        lock(&self.tracks)
            .iter()
            .map(|t| TrackSnapshot {
                car: t.car.clone(),
                animation: t.animation.snapshot(),
            })
            .collect()
    }

    pub fn animation(&self, car_id: CarId) -> Option<CarAnimation> {
        lock(&self.tracks)
            .iter()
            .find(|t| t.car.id == car_id)
            .map(|t| t.animation.clone())
    }

    /// Layout changed: every track gets the new length
    pub fn resize(&self, length: Pixels) {
        if !length.is_usable_length() {
            warn!("Ignoring unusable track length {}", length.0);
            return;
        }
        *lock(&self.track_length) = length;
        for track in lock(&self.tracks).iter() {
            track.animation.set_track_length(length);
        }
    }

    pub fn is_racing(&self) -> bool {
        lock(&self.race).is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RaceEvent> {
        self.events.subscribe()
    }

    /// The winner overlay currently shown, if any
    pub fn overlay(&self) -> Option<WinnerAnnouncement> {
        lock(&self.overlay).clone()
    }

    /// Close the winner overlay, optionally resetting the race with it
    pub fn dismiss_overlay(&self, reset: bool) {
        lock(&self.overlay).take();
        if reset {
            self.reset_race();
        }
    }

    /// Start a single car outside of a race
    pub async fn start_car(&self, car_id: CarId) -> Result<(), RaceError> {
        let animation = self.animation(car_id).ok_or(RaceError::UnknownCar(car_id))?;
        animation.start().await?;
        Ok(())
    }

    /// Stop a single car and return it to the start line
    pub async fn stop_car(&self, car_id: CarId) -> Result<(), RaceError> {
        let animation = self.animation(car_id).ok_or(RaceError::UnknownCar(car_id))?;
        animation.stop(false);

        if let Err(e) = self.backend.stop_engine(car_id).await {
            warn!("Failed to stop engine of car {}: {}", car_id, e);
        }
        Ok(())
    }

    /// Race every car on the view and persist the winner
    ///
    /// The race stays active after it concludes until [`reset_race`](Self::reset_race).
    pub async fn start_race(&self) -> Result<RaceOutcome, RaceError> {
        let token = {
            let mut race = lock(&self.race);
            if race.is_some() {
                debug!("Race already in progress");
                return Ok(RaceOutcome::AlreadyRacing);
            }
            let token = CancellationToken::new();
            *race = Some(token.clone());
            token
        };
        lock(&self.overlay).take();

        let entrants: Vec<Track> = lock(&self.tracks).clone();
        info!("Race started with {} cars", entrants.len());
        let _ = self.events.send(RaceEvent::Started {
            cars: entrants.len(),
        });

        // Fire and forget: a car that fails to start only drops itself out
        for track in &entrants {
            let _ = track.animation.launch();
        }

        let mut finishers: FuturesUnordered<_> = entrants
            .iter()
            .map(|track| async move { (&track.car, track.animation.settled().await) })
            .collect();

        let (winner, race_time) = loop {
            tokio::select! {
                _ = token.cancelled() => return Ok(RaceOutcome::Reset),
                next = finishers.next() => match next {
                    Some((car, Some(time))) => break (car.clone(), time),
                    Some((car, None)) => debug!("Car {} is out of the race", car.id),
                    None => {
                        info!("Race ended without a finisher");
                        let _ = self.events.send(RaceEvent::NoFinisher);
                        return Ok(RaceOutcome::NoFinisher);
                    }
                },
            }
        };
        drop(finishers);

        self.announce(&token, winner, race_time).await
    }

    /// End the active race and return every car to the start line
    ///
    /// Returns false when no race was active.
    pub fn reset_race(&self) -> bool {
        let Some(token) = lock(&self.race).take() else {
            return false;
        };
        token.cancel();
        lock(&self.overlay).take();

        for track in lock(&self.tracks).iter() {
            track.animation.stop(false);
        }
        info!("Race reset");
        let _ = self.events.send(RaceEvent::Reset);
        true
    }

    async fn announce(
        &self,
        token: &CancellationToken,
        car: Car,
        race_time: Seconds,
    ) -> Result<RaceOutcome, RaceError> {
        let time = race_time.rounded().max(MIN_RACE_TIME);
        info!("Car {} ({}) wins in {:.2}s", car.id, car.name, time);

        let record = match winners::record_win(self.backend.as_ref(), car.id, time).await {
            Ok(record) => record,
            Err(source) => {
                error!("Failed to save winner {}: {}", car.id, source);
                return Err(RaceError::Persist {
                    car_id: car.id,
                    time,
                    source,
                });
            }
        };

        let announcement = WinnerAnnouncement {
            car,
            time,
            wins: record.wins,
            declared_at: Utc::now(),
        };

        // A reset while saving wins: the record stays, the overlay does not
        let race = lock(&self.race);
        if race.is_none() || token.is_cancelled() {
            debug!("Race was reset while car {} was being saved", announcement.car.id);
            return Ok(RaceOutcome::Reset);
        }
        *lock(&self.overlay) = Some(announcement.clone());
        let _ = self.events.send(RaceEvent::Winner(announcement.clone()));
        drop(race);
        Ok(RaceOutcome::Winner(announcement))
    }
}
