//! Winner persistence with best-time merging
//!
//! A race result never overwrites a better one: an existing record gains a
//! win and keeps the smaller of the two times.
//!
//! The read-then-write below is not atomic across independent clients. Two
//! clients recording a win for the same car at the same moment can both
//! observe "no record" (one create then fails with a conflict) or both read
//! the same `wins` (one increment is lost).

use crate::backend::{BackendError, RaceBackend};
use crate::model::{CarId, Winner};
use tracing::{debug, info};

/// Record a win for `car_id` in `time` seconds and return the stored record
pub async fn record_win(
    backend: &dyn RaceBackend,
    car_id: CarId,
    time: f64,
) -> Result<Winner, BackendError> {
    if !time.is_finite() || time <= 0.0 {
        return Err(BackendError::Invalid(format!(
            "race time must be positive, got {}",
            time
        )));
    }

    match backend.get_winner(car_id).await? {
        Some(existing) => {
            let merged = existing.merged(time);
            debug!(
                "Car {} wins again: {} -> {} wins, best {:.2}s",
                car_id, existing.wins, merged.wins, merged.time
            );
            backend.update_winner(car_id, &merged.update()).await
        }
        None => {
            info!("Car {} records its first win in {:.2}s", car_id, time);
            backend.create_winner(&Winner::first(car_id, time)).await
        }
    }
}

/// Drop the winner record of a deleted car; a missing record is fine
pub async fn forget_winner(backend: &dyn RaceBackend, car_id: CarId) -> Result<(), BackendError> {
    match backend.delete_winner(car_id).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}
