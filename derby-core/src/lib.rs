//! Derby Core Library
//!
//! This crate provides the data model, the backend trait, and the client-side
//! engines of the Derby racing garage: per-car track animation, race
//! coordination with winner detection, and paginated/sorted list controllers.

pub mod animation;
pub mod backend;
pub mod config;
pub mod garage;
pub mod leaderboard;
pub mod model;
pub mod pagination;
pub mod race;
pub mod units;
pub mod winners;

#[cfg(test)]
mod test_support;

pub use animation::{AnimationError, CarAnimation};
pub use backend::{BackendError, RaceBackend};
pub use config::DerbyConfig;
pub use garage::Garage;
pub use leaderboard::Leaderboard;
pub use model::{Car, CarId, Winner, WinnerWithCar};
pub use pagination::PagedList;
pub use race::{RaceOutcome, RaceView};

/// Lock a std mutex, recovering the data if a panicking holder poisoned it
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
