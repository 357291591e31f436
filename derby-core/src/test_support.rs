//! Scripted backend for unit tests: fixed engine parameters per car and an
//! in-memory winners table.

use crate::backend::{BackendError, RaceBackend};
use crate::model::*;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

struct Script {
    engine: EngineResponse,
    breaks_after: Option<Duration>,
}

#[derive(Default)]
pub(crate) struct ScriptedBackend {
    scripts: HashMap<CarId, Script>,
    winners: Mutex<BTreeMap<CarId, Winner>>,
    stop_calls: AtomicUsize,
    start_delay: Duration,
    winner_delay: Duration,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_car(mut self, id: CarId, velocity: f64, distance: f64) -> Self {
        self.scripts.insert(
            id,
            Script {
                engine: EngineResponse { velocity, distance },
                breaks_after: None,
            },
        );
        self
    }

    pub fn with_breakdown(mut self, id: CarId, velocity: f64, distance: f64, after: Duration) -> Self {
        self.scripts.insert(
            id,
            Script {
                engine: EngineResponse { velocity, distance },
                breaks_after: Some(after),
            },
        );
        self
    }

    pub fn with_winner(self, winner: Winner) -> Self {
        crate::lock(&self.winners).insert(winner.id, winner);
        self
    }

    /// Delay every engine start reply
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Delay every winner lookup
    pub fn with_winner_delay(mut self, delay: Duration) -> Self {
        self.winner_delay = delay;
        self
    }

    pub fn winner(&self, id: CarId) -> Option<Winner> {
        crate::lock(&self.winners).get(&id).cloned()
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    fn script(&self, id: CarId) -> Result<&Script, BackendError> {
        self.scripts.get(&id).ok_or(BackendError::NotFound {
            resource: "car",
            id,
        })
    }
}

fn unscripted<T>() -> Result<T, BackendError> {
    Err(BackendError::Invalid("not scripted".to_string()))
}

#[async_trait]
impl RaceBackend for ScriptedBackend {
    async fn list_cars(&self, _query: &PageQuery<CarSortBy>) -> Result<Page<Car>, BackendError> {
        unscripted()
    }

    async fn get_car(&self, _id: CarId) -> Result<Option<Car>, BackendError> {
        unscripted()
    }

    async fn create_car(&self, _car: &NewCar) -> Result<Car, BackendError> {
        unscripted()
    }

    async fn update_car(&self, _id: CarId, _car: &NewCar) -> Result<Car, BackendError> {
        unscripted()
    }

    async fn delete_car(&self, _id: CarId) -> Result<(), BackendError> {
        unscripted()
    }

    async fn start_engine(&self, id: CarId) -> Result<EngineResponse, BackendError> {
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        Ok(self.script(id)?.engine)
    }

    async fn stop_engine(&self, id: CarId) -> Result<EngineResponse, BackendError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(EngineResponse {
            velocity: 0.0,
            distance: self.script(id)?.engine.distance,
        })
    }

    async fn drive(&self, id: CarId) -> Result<DriveResponse, BackendError> {
        let (full, breaks_after) = {
            let script = self.script(id)?;
            (script.engine.duration(), script.breaks_after)
        };
        match breaks_after {
            Some(after) => {
                tokio::time::sleep(after).await;
                Err(BackendError::EngineBroken(id))
            }
            None => {
                tokio::time::sleep(full.unwrap_or_default()).await;
                Ok(DriveResponse { success: true })
            }
        }
    }

    async fn list_winners(
        &self,
        _query: &PageQuery<WinnersSortBy>,
    ) -> Result<Page<Winner>, BackendError> {
        unscripted()
    }

    async fn get_winner(&self, id: CarId) -> Result<Option<Winner>, BackendError> {
        if !self.winner_delay.is_zero() {
            tokio::time::sleep(self.winner_delay).await;
        }
        Ok(self.winner(id))
    }

    async fn create_winner(&self, winner: &Winner) -> Result<Winner, BackendError> {
        let mut winners = crate::lock(&self.winners);
        if winners.contains_key(&winner.id) {
            return Err(BackendError::Conflict(format!("winner {} exists", winner.id)));
        }
        winners.insert(winner.id, winner.clone());
        Ok(winner.clone())
    }

    async fn update_winner(
        &self,
        id: CarId,
        update: &WinnerUpdate,
    ) -> Result<Winner, BackendError> {
        let mut winners = crate::lock(&self.winners);
        let winner = winners.get_mut(&id).ok_or(BackendError::NotFound {
            resource: "winner",
            id,
        })?;
        winner.wins = update.wins;
        winner.time = update.time;
        Ok(winner.clone())
    }

    async fn delete_winner(&self, id: CarId) -> Result<(), BackendError> {
        crate::lock(&self.winners)
            .remove(&id)
            .map(|_| ())
            .ok_or(BackendError::NotFound {
                resource: "winner",
                id,
            })
    }
}
