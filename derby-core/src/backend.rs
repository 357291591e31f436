//! Backend trait definition
//!
//! The garage, winners and engine resources live behind a REST-style
//! resource server. Everything in this crate talks to it through
//! [`RaceBackend`], so the HTTP client and the in-process store are
//! interchangeable.

use crate::model::{
    Car, CarId, CarSortBy, DriveResponse, EngineResponse, NewCar, Page, PageQuery, Winner,
    WinnerUpdate, WinnersSortBy,
};
use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: CarId },

    #[error("engine of car {0} broke down")]
    EngineBroken(CarId),

    #[error("car {0} is already driving")]
    TooManyRequests(CarId),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound { .. })
    }
}

/// Trait for garage/winners/engine resource backends
///
/// Single-item fetches return `Ok(None)` for a missing item rather than an
/// error. Mutations echo the stored item.
#[async_trait]
pub trait RaceBackend: Send + Sync {
    /// Page of cars plus the total number of cars
    async fn list_cars(&self, query: &PageQuery<CarSortBy>) -> Result<Page<Car>, BackendError>;

    async fn get_car(&self, id: CarId) -> Result<Option<Car>, BackendError>;

    async fn create_car(&self, car: &NewCar) -> Result<Car, BackendError>;

    async fn update_car(&self, id: CarId, car: &NewCar) -> Result<Car, BackendError>;

    async fn delete_car(&self, id: CarId) -> Result<(), BackendError>;

    /// Start the engine and receive the velocity/distance for a race attempt
    async fn start_engine(&self, id: CarId) -> Result<EngineResponse, BackendError>;

    async fn stop_engine(&self, id: CarId) -> Result<EngineResponse, BackendError>;

    /// Switch a started engine to drive mode
    ///
    /// Resolves once the car would have crossed the finish line, or fails
    /// with [`BackendError::EngineBroken`] if the engine breaks down first.
    async fn drive(&self, id: CarId) -> Result<DriveResponse, BackendError>;

    async fn list_winners(
        &self,
        query: &PageQuery<WinnersSortBy>,
    ) -> Result<Page<Winner>, BackendError>;

    async fn get_winner(&self, id: CarId) -> Result<Option<Winner>, BackendError>;

    async fn create_winner(&self, winner: &Winner) -> Result<Winner, BackendError>;

    async fn update_winner(&self, id: CarId, update: &WinnerUpdate)
        -> Result<Winner, BackendError>;

    async fn delete_winner(&self, id: CarId) -> Result<(), BackendError>;
}
