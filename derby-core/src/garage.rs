//! Garage view controller
//!
//! Combines the paginated car list with the race view of the cars on the
//! current page, plus the create/update form and bulk generation.

use crate::backend::{BackendError, RaceBackend};
use crate::config::DerbyConfig;
use crate::lock;
use crate::model::{Car, CarId, CarSortBy, NewCar, Page, PageQuery};
use crate::pagination::{ListChange, ListSnapshot, PageSource, PagedList};
use crate::race::{RaceError, RaceOutcome, RaceView};
use crate::units::Pixels;
use crate::winners;
use async_trait::async_trait;
use futures::future::try_join_all;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, warn};

/// Cars created by one click of "generate"
pub const GENERATED_CARS: usize = 100;

const BRANDS: &[&str] = &["Tesla", "Ford", "Porsche", "BMW", "Audi", "Mercedes", "Toyota"];
const MODELS: &[&str] = &["Model S", "Mustang", "911", "M5", "A4", "C-Class", "Supra"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CarFormError {
    #[error("car name is required")]
    MissingName,

    #[error("car color is required")]
    MissingColor,

    #[error("no car selected")]
    NothingSelected,
}

#[derive(Error, Debug)]
pub enum GarageError {
    #[error(transparent)]
    Form(#[from] CarFormError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Race(#[from] RaceError),
}

/// Check the form fields; the name is trimmed
pub fn validate_car(form: &NewCar) -> Result<NewCar, CarFormError> {
    let name = form.name.trim();
    if name.is_empty() {
        return Err(CarFormError::MissingName);
    }
    if form.color.trim().is_empty() {
        return Err(CarFormError::MissingColor);
    }
    Ok(NewCar {
        name: name.to_string(),
        color: form.color.trim().to_string(),
    })
}

/// A random "Brand Model" car with a random `#rrggbb` color
pub fn random_car(rng: &mut impl Rng) -> NewCar {
    let brand = BRANDS.choose(rng).copied().unwrap_or("Tesla");
    let model = MODELS.choose(rng).copied().unwrap_or("Model S");
    NewCar {
        name: format!("{} {}", brand, model),
        color: format!("#{:06x}", rng.gen_range(0..=0xFF_FFFFu32)),
    }
}

/// Cars of the garage collection
pub struct GarageSource {
    backend: Arc<dyn RaceBackend>,
}

#[async_trait]
impl PageSource for GarageSource {
    type Item = Car;
    type SortKey = CarSortBy;

    async fn fetch(&self, query: &PageQuery<CarSortBy>) -> Result<Page<Car>, BackendError> {
        self.backend.list_cars(query).await
    }
}

pub struct Garage {
    backend: Arc<dyn RaceBackend>,
    cars: PagedList<GarageSource>,
    race: RaceView,
    selected: Mutex<Option<CarId>>,
}

impl Garage {
    pub fn new(backend: Arc<dyn RaceBackend>, config: &DerbyConfig) -> Self {
        let source = GarageSource {
            backend: backend.clone(),
        };
        Self {
            cars: PagedList::new(source, config.garage_page_size),
            race: RaceView::from_config(backend.clone(), config),
            backend,
            selected: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> ListSnapshot<Car, CarSortBy> {
        self.cars.snapshot()
    }

    pub fn race(&self) -> &RaceView {
        &self.race
    }

    pub fn selected(&self) -> Option<CarId> {
        *lock(&self.selected)
    }

    // === Paging ===

    pub async fn load(&self) -> ListChange {
        let change = self.cars.load().await;
        self.rerender(change)
    }

    pub async fn next_page(&self) -> ListChange {
        let change = self.cars.next_page().await;
        self.rerender(change)
    }

    pub async fn prev_page(&self) -> ListChange {
        let change = self.cars.prev_page().await;
        self.rerender(change)
    }

    fn rerender(&self, change: ListChange) -> ListChange {
        if change.reloaded() {
            self.race.render_tracks(&self.cars.snapshot().items);
        }
        change
    }

    // === Car form ===

    pub async fn create_car(&self, form: &NewCar) -> Result<Car, GarageError> {
        let car = validate_car(form)?;
        let created = self.backend.create_car(&car).await?;
        info!("Created car {} ({})", created.id, created.name);
        self.load().await;
        Ok(created)
    }

    /// Select a car for editing and return it to prefill the form
    pub async fn select_car(&self, id: CarId) -> Result<Car, GarageError> {
        let on_page = self.cars.snapshot().items.into_iter().find(|c| c.id == id);
        let car = match on_page {
            Some(car) => car,
            None => self
                .backend
                .get_car(id)
                .await?
                .ok_or(BackendError::NotFound { resource: "car", id })?,
        };
        *lock(&self.selected) = Some(car.id);
        Ok(car)
    }

    /// Apply the form to the selected car and clear the selection
    pub async fn update_selected(&self, form: &NewCar) -> Result<Car, GarageError> {
        let id = self.selected().ok_or(CarFormError::NothingSelected)?;
        let car = validate_car(form)?;
        let updated = self.backend.update_car(id, &car).await?;
        info!("Updated car {} to {} {}", id, updated.name, updated.color);
        *lock(&self.selected) = None;
        self.load().await;
        Ok(updated)
    }

    /// Delete a car along with its winner record
    pub async fn delete_car(&self, id: CarId) -> Result<(), GarageError> {
        self.backend.delete_car(id).await?;
        if let Err(e) = winners::forget_winner(self.backend.as_ref(), id).await {
            warn!("Car {} deleted but its winner record remains: {}", id, e);
        }

        {
            let mut selected = lock(&self.selected);
            if *selected == Some(id) {
                *selected = None;
            }
        }
        self.race.remove_track(id);
        let change = self.cars.remove_local(id).await;
        self.rerender(change);
        info!("Deleted car {}", id);
        Ok(())
    }

    /// Create `count` random cars concurrently, then reload the page
    pub async fn generate_cars(&self, count: usize) -> Result<Vec<Car>, GarageError> {
        let forms: Vec<NewCar> = {
            let mut rng = rand::thread_rng();
            (0..count).map(|_| random_car(&mut rng)).collect()
        };
        let result = try_join_all(forms.iter().map(|car| self.backend.create_car(car))).await;
        // Cars created before a failure are already stored
        self.load().await;
        let created = result?;
        info!("Generated {} cars", created.len());
        Ok(created)
    }

    // === Race controls ===

    pub async fn start_race(&self) -> Result<RaceOutcome, GarageError> {
        Ok(self.race.start_race().await?)
    }

    pub fn reset_race(&self) -> bool {
        self.race.reset_race()
    }

    pub async fn start_car(&self, id: CarId) -> Result<(), GarageError> {
        Ok(self.race.start_car(id).await?)
    }

    pub async fn stop_car(&self, id: CarId) -> Result<(), GarageError> {
        Ok(self.race.stop_car(id).await?)
    }

    pub fn resize(&self, track_length: Pixels) {
        self.race.resize(track_length);
    }
}
