//! Garage and leaderboard data model
//!
//! Defines the resources exchanged with the backend (cars, engine
//! parameters, winners) and the query/page types used by list controllers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Identity of a car, shared by its winner record
pub type CarId = u32;

/// A car as stored in the garage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Car {
    pub id: CarId,
    pub name: String,
    /// CSS color, usually `#rrggbb`
    pub color: String,
}

/// Body for creating or replacing a car
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCar {
    pub name: String,
    pub color: String,
}

impl Car {
    pub fn from_new(id: CarId, car: NewCar) -> Self {
        Self {
            id,
            name: car.name,
            color: car.color,
        }
    }
}

// === Engine ===

/// Engine parameters handed out when an engine is started
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineResponse {
    pub velocity: f64,
    pub distance: f64,
}

impl EngineResponse {
    /// Time to cover the whole track: `distance / velocity` milliseconds
    ///
    /// Returns None for a stopped engine (zero velocity) or nonsense values.
    pub fn duration(&self) -> Option<Duration> {
        if !self.velocity.is_finite() || !self.distance.is_finite() {
            return None;
        }
        if self.velocity <= 0.0 || self.distance < 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(self.distance / self.velocity / 1000.0).ok()
    }
}

/// Result of switching an engine to drive mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveResponse {
    pub success: bool,
}

/// Engine control states accepted by the engine endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    Started,
    Stopped,
    Drive,
}

impl EngineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineStatus::Started => "started",
            EngineStatus::Stopped => "stopped",
            EngineStatus::Drive => "drive",
        }
    }
}

// === Winners ===

/// A car's win record
///
/// Invariant: `wins >= 1` and `time > 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Winner {
    pub id: CarId,
    pub wins: u32,
    /// Best race time in seconds
    pub time: f64,
}

impl Winner {
    /// Record for a car's first win
    pub fn first(id: CarId, time: f64) -> Self {
        Self { id, wins: 1, time }
    }

    /// Record after one more win in `time` seconds; best time never regresses
    pub fn merged(&self, time: f64) -> Self {
        Self {
            id: self.id,
            wins: self.wins.saturating_add(1),
            time: self.time.min(time),
        }
    }

    pub fn update(&self) -> WinnerUpdate {
        WinnerUpdate {
            wins: self.wins,
            time: self.time,
        }
    }
}

/// Body for replacing a winner record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinnerUpdate {
    pub wins: u32,
    pub time: f64,
}

/// Winner joined with its car's display fields, assembled per render
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinnerWithCar {
    #[serde(flatten)]
    pub winner: Winner,
    pub car: Car,
}

// === Sorting and pagination ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

impl SortOrder {
    pub fn toggled(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ASC" => Ok(SortOrder::Asc),
            "DESC" => Ok(SortOrder::Desc),
            _ => Err(UnknownValue(s.to_string())),
        }
    }
}

/// A query value that names no known variant
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown value '{0}'")]
pub struct UnknownValue(pub String);

/// A column a list resource can be sorted by
pub trait SortColumn: Copy + PartialEq + Send + Sync + 'static {
    /// Value of the `_sort` query parameter
    fn as_param(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WinnersSortBy {
    Id,
    Wins,
    Time,
}

impl SortColumn for WinnersSortBy {
    fn as_param(&self) -> &'static str {
        match self {
            WinnersSortBy::Id => "id",
            WinnersSortBy::Wins => "wins",
            WinnersSortBy::Time => "time",
        }
    }
}

impl FromStr for WinnersSortBy {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(WinnersSortBy::Id),
            "wins" => Ok(WinnersSortBy::Wins),
            "time" => Ok(WinnersSortBy::Time),
            _ => Err(UnknownValue(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarSortBy {
    Id,
    Name,
    Color,
}

impl SortColumn for CarSortBy {
    fn as_param(&self) -> &'static str {
        match self {
            CarSortBy::Id => "id",
            CarSortBy::Name => "name",
            CarSortBy::Color => "color",
        }
    }
}

impl FromStr for CarSortBy {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(CarSortBy::Id),
            "name" => Ok(CarSortBy::Name),
            "color" => Ok(CarSortBy::Color),
            _ => Err(UnknownValue(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort<K> {
    pub by: K,
    pub order: SortOrder,
}

impl<K: SortColumn> Sort<K> {
    pub fn asc(by: K) -> Self {
        Self {
            by,
            order: SortOrder::Asc,
        }
    }

    /// Clicking a column: same column flips the order, a new column starts ascending
    pub fn toggle(current: Option<Sort<K>>, column: K) -> Self {
        match current {
            Some(sort) if sort.by == column => Sort {
                by: column,
                order: sort.order.toggled(),
            },
            _ => Sort::asc(column),
        }
    }
}

/// One page request against a list resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery<K> {
    /// 1-based page number
    pub page: u32,
    /// Page size; None fetches the whole collection
    pub limit: Option<u32>,
    pub sort: Option<Sort<K>>,
}

impl<K: SortColumn> PageQuery<K> {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: Some(limit),
            sort: None,
        }
    }

    /// Whole collection, unpaginated
    pub fn all() -> Self {
        Self {
            page: 1,
            limit: None,
            sort: None,
        }
    }

    pub fn sorted(mut self, sort: Option<Sort<K>>) -> Self {
        self.sort = sort;
        self
    }

    /// Query string pairs in json-server style (`_page`, `_limit`, `_sort`, `_order`)
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(4);
        if let Some(limit) = self.limit {
            params.push(("_page", self.page.to_string()));
            params.push(("_limit", limit.to_string()));
        }
        if let Some(sort) = self.sort {
            params.push(("_sort", sort.by.as_param().to_string()));
            params.push(("_order", sort.order.as_str().to_string()));
        }
        params
    }
}

/// One page of a list resource with the backend's authoritative total
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

/// Items a list controller can remove locally by identity
pub trait Listed {
    fn list_id(&self) -> CarId;
}

impl Listed for Car {
    fn list_id(&self) -> CarId {
        self.id
    }
}

impl Listed for Winner {
    fn list_id(&self) -> CarId {
        self.id
    }
}

impl Listed for WinnerWithCar {
    fn list_id(&self) -> CarId {
        self.winner.id
    }
}
