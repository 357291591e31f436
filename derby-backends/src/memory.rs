//! In-process resource store with a simulated engine
//!
//! Follows json-server semantics for the garage and winners collections
//! (1-based pages, column sort, total count, auto-incremented ids) and
//! simulates the engine endpoint: `started` hands out a random velocity,
//! `drive` takes `distance / velocity` milliseconds and may break down on
//! the way, `stopped` ends the session and interrupts any drive.

use async_trait::async_trait;
use derby_core::backend::{BackendError, RaceBackend};
use derby_core::model::*;
use rand::Rng;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Random engine parameters handed out on `started`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineProfile {
    pub min_velocity: f64,
    pub max_velocity: f64,
    pub distance: f64,
    /// Probability in `[0, 1]` that a drive breaks down
    pub breakdown_chance: f64,
}

impl Default for EngineProfile {
    fn default() -> Self {
        Self {
            min_velocity: 50.0,
            max_velocity: 200.0,
            distance: 500_000.0,
            breakdown_chance: 0.0,
        }
    }
}

impl EngineProfile {
    pub fn with_breakdown_chance(mut self, chance: f64) -> Self {
        self.breakdown_chance = if chance.is_finite() {
            chance.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }
}

/// Fixed engine behaviour for one car
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineScript {
    pub velocity: f64,
    pub distance: f64,
    /// Break down this long into the drive instead of finishing
    pub breaks_after: Option<Duration>,
}

impl EngineScript {
    pub fn finishes(velocity: f64, distance: f64) -> Self {
        Self {
            velocity,
            distance,
            breaks_after: None,
        }
    }

    pub fn breaks(velocity: f64, distance: f64, after: Duration) -> Self {
        Self {
            velocity,
            distance,
            breaks_after: Some(after),
        }
    }
}

/// The cars json-server ships in its sample database
pub fn sample_cars() -> Vec<NewCar> {
    [
        ("Tesla", "#e6e6fa"),
        ("BMW", "#fede00"),
        ("Mercedes", "#6c779f"),
        ("Ford", "#ef3c40"),
    ]
    .into_iter()
    .map(|(name, color)| NewCar {
        name: name.to_string(),
        color: color.to_string(),
    })
    .collect()
}

struct EngineSession {
    engine: EngineResponse,
    driving: bool,
    stopped: CancellationToken,
}

#[derive(Default)]
struct Store {
    cars: BTreeMap<CarId, Car>,
    next_id: CarId,
    winners: BTreeMap<CarId, Winner>,
    engines: HashMap<CarId, EngineSession>,
}

impl Store {
    fn car(&self, id: CarId) -> Result<&Car, BackendError> {
        self.cars.get(&id).ok_or(BackendError::NotFound { resource: "car", id })
    }
}

/// How a drive will end, decided when it begins
enum DrivePlan {
    Finish(Duration),
    BreakDown(Duration),
}

pub struct InMemoryBackend {
    store: Mutex<Store>,
    profile: EngineProfile,
    scripts: HashMap<CarId, EngineScript>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store {
                next_id: 1,
                ..Store::default()
            }),
            profile: EngineProfile::default(),
            scripts: HashMap::new(),
        }
    }

    /// A store holding [`sample_cars`]
    pub fn seeded() -> Self {
        Self::new().with_cars(sample_cars())
    }

    pub fn with_cars(self, cars: impl IntoIterator<Item = NewCar>) -> Self {
        {
            let mut store = self.lock();
            for car in cars {
                let id = store.next_id;
                store.next_id += 1;
                store.cars.insert(id, Car::from_new(id, car));
            }
        }
        self
    }

    pub fn with_winners(self, winners: impl IntoIterator<Item = Winner>) -> Self {
        self.lock()
            .winners
            .extend(winners.into_iter().map(|w| (w.id, w)));
        self
    }

    pub fn with_profile(mut self, profile: EngineProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_script(mut self, id: CarId, script: EngineScript) -> Self {
        self.scripts.insert(id, script);
        self
    }

    pub fn car_count(&self) -> usize {
        self.lock().cars.len()
    }

    pub fn winner(&self, id: CarId) -> Option<Winner> {
        self.lock().winners.get(&id).cloned()
    }

    /// Whether the car currently holds a started engine
    pub fn engine_started(&self, id: CarId) -> bool {
        self.lock().engines.contains_key(&id)
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn draw_engine(&self, id: CarId) -> EngineResponse {
        if let Some(script) = self.scripts.get(&id) {
            return EngineResponse {
                velocity: script.velocity,
                distance: script.distance,
            };
        }
        let (low, high) = ordered(self.profile.min_velocity, self.profile.max_velocity);
        let velocity = rand::thread_rng().gen_range(low..=high).round();
        EngineResponse {
            velocity,
            distance: self.profile.distance,
        }
    }

    fn plan_drive(&self, id: CarId, engine: &EngineResponse) -> DrivePlan {
        let full = engine.duration().unwrap_or_default();
        if let Some(script) = self.scripts.get(&id) {
            return match script.breaks_after {
                Some(after) => DrivePlan::BreakDown(after.min(full)),
                None => DrivePlan::Finish(full),
            };
        }

        let mut rng = rand::thread_rng();
        if rng.gen_bool(self.profile.breakdown_chance.clamp(0.0, 1.0)) {
            DrivePlan::BreakDown(full.mul_f64(rng.gen_range(0.1..0.9)))
        } else {
            DrivePlan::Finish(full)
        }
    }
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Slice out one page after sorting, json-server style
fn paginate<T: Clone, K: SortColumn>(
    mut items: Vec<T>,
    query: &PageQuery<K>,
    compare: impl Fn(&T, &T, K) -> Ordering,
) -> Page<T> {
    if let Some(sort) = query.sort {
        items.sort_by(|a, b| {
            let ordering = compare(a, b, sort.by);
            match sort.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
    }

    let total = items.len();
    let items = match query.limit {
        Some(limit) => {
            let skip = (query.page.max(1) as usize - 1) * limit as usize;
            items.into_iter().skip(skip).take(limit as usize).collect()
        }
        None => items,
    };
    Page { items, total }
}

fn compare_cars(a: &Car, b: &Car, by: CarSortBy) -> Ordering {
    match by {
        CarSortBy::Id => a.id.cmp(&b.id),
        CarSortBy::Name => a.name.cmp(&b.name),
        CarSortBy::Color => a.color.cmp(&b.color),
    }
}

fn compare_winners(a: &Winner, b: &Winner, by: WinnersSortBy) -> Ordering {
    match by {
        WinnersSortBy::Id => a.id.cmp(&b.id),
        WinnersSortBy::Wins => a.wins.cmp(&b.wins),
        WinnersSortBy::Time => a.time.total_cmp(&b.time),
    }
}

fn check_car(car: &NewCar) -> Result<(), BackendError> {
    if car.name.trim().is_empty() {
        return Err(BackendError::Invalid("car name is required".to_string()));
    }
    Ok(())
}

/// A stored winner has won at least once in a positive time
fn check_winner(wins: u32, time: f64) -> Result<(), BackendError> {
    if wins == 0 {
        return Err(BackendError::Invalid("wins must be at least 1".to_string()));
    }
    if !time.is_finite() || time <= 0.0 {
        return Err(BackendError::Invalid(format!(
            "time must be a positive number of seconds, got {}",
            time
        )));
    }
    Ok(())
}

#[async_trait]
impl RaceBackend for InMemoryBackend {
    async fn list_cars(&self, query: &PageQuery<CarSortBy>) -> Result<Page<Car>, BackendError> {
        let cars: Vec<Car> = self.lock().cars.values().cloned().collect();
        Ok(paginate(cars, query, compare_cars))
    }

    async fn get_car(&self, id: CarId) -> Result<Option<Car>, BackendError> {
        Ok(self.lock().cars.get(&id).cloned())
    }

    async fn create_car(&self, car: &NewCar) -> Result<Car, BackendError> {
        check_car(car)?;
        let mut store = self.lock();
        let id = store.next_id;
        store.next_id += 1;
        let created = Car::from_new(id, car.clone());
        store.cars.insert(id, created.clone());
        debug!("Created car {}", id);
        Ok(created)
    }

    async fn update_car(&self, id: CarId, car: &NewCar) -> Result<Car, BackendError> {
        check_car(car)?;
        let mut store = self.lock();
        store.car(id)?;
        let updated = Car::from_new(id, car.clone());
        store.cars.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete_car(&self, id: CarId) -> Result<(), BackendError> {
        let mut store = self.lock();
        store.car(id)?;
        store.cars.remove(&id);
        if let Some(session) = store.engines.remove(&id) {
            session.stopped.cancel();
        }
        debug!("Deleted car {}", id);
        Ok(())
    }

    async fn start_engine(&self, id: CarId) -> Result<EngineResponse, BackendError> {
        let engine = self.draw_engine(id);
        let mut store = self.lock();
        store.car(id)?;

        let session = EngineSession {
            engine,
            driving: false,
            stopped: CancellationToken::new(),
        };
        if let Some(previous) = store.engines.insert(id, session) {
            previous.stopped.cancel();
        }
        debug!("Engine {} started at {} px/s", id, engine.velocity);
        Ok(engine)
    }

    async fn stop_engine(&self, id: CarId) -> Result<EngineResponse, BackendError> {
        let mut store = self.lock();
        store.car(id)?;

        let distance = match store.engines.remove(&id) {
            Some(session) => {
                session.stopped.cancel();
                session.engine.distance
            }
            None => self.profile.distance,
        };
        Ok(EngineResponse {
            velocity: 0.0,
            distance,
        })
    }

    async fn drive(&self, id: CarId) -> Result<DriveResponse, BackendError> {
        let (plan, stopped) = {
            let mut store = self.lock();
            let Some(session) = store.engines.get_mut(&id) else {
                return Err(BackendError::NotFound {
                    resource: "engine",
                    id,
                });
            };
            if session.driving {
                return Err(BackendError::TooManyRequests(id));
            }
            session.driving = true;
            let engine = session.engine;
            let stopped = session.stopped.clone();
            (self.plan_drive(id, &engine), stopped)
        };

        let (wait, breaks) = match plan {
            DrivePlan::Finish(wait) => (wait, false),
            DrivePlan::BreakDown(wait) => (wait, true),
        };

        tokio::select! {
            _ = stopped.cancelled() => {
                debug!("Drive of car {} interrupted by stop", id);
                return Ok(DriveResponse { success: false });
            }
            _ = tokio::time::sleep(wait) => {}
        }

        if let Some(session) = self.lock().engines.get_mut(&id) {
            session.driving = false;
        }
        if breaks {
            info!("Engine of car {} broke down after {:?}", id, wait);
            return Err(BackendError::EngineBroken(id));
        }
        Ok(DriveResponse { success: true })
    }

    async fn list_winners(
        &self,
        query: &PageQuery<WinnersSortBy>,
    ) -> Result<Page<Winner>, BackendError> {
        let winners: Vec<Winner> = self.lock().winners.values().cloned().collect();
        Ok(paginate(winners, query, compare_winners))
    }

    async fn get_winner(&self, id: CarId) -> Result<Option<Winner>, BackendError> {
        Ok(self.lock().winners.get(&id).cloned())
    }

    async fn create_winner(&self, winner: &Winner) -> Result<Winner, BackendError> {
        check_winner(winner.wins, winner.time)?;
        let mut store = self.lock();
        if store.winners.contains_key(&winner.id) {
            return Err(BackendError::Conflict(format!(
                "winner {} already exists",
                winner.id
            )));
        }
        store.winners.insert(winner.id, winner.clone());
        Ok(winner.clone())
    }

    async fn update_winner(
        &self,
        id: CarId,
        update: &WinnerUpdate,
    ) -> Result<Winner, BackendError> {
        check_winner(update.wins, update.time)?;
        let mut store = self.lock();
        let winner = store.winners.get_mut(&id).ok_or(BackendError::NotFound {
            resource: "winner",
            id,
        })?;
        winner.wins = update.wins;
        winner.time = update.time;
        Ok(winner.clone())
    }

    async fn delete_winner(&self, id: CarId) -> Result<(), BackendError> {
        self.lock()
            .winners
            .remove(&id)
            .map(|_| ())
            .ok_or(BackendError::NotFound {
                resource: "winner",
                id,
            })
    }
}
