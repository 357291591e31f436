//! Winners leaderboard controller

use crate::backend::{BackendError, RaceBackend};
use crate::config::DerbyConfig;
use crate::model::{
    CarId, Page, PageQuery, Sort, SortOrder, Winner, WinnerWithCar, WinnersSortBy,
};
use crate::pagination::{ListChange, ListSnapshot, PageSource, PagedList};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Winners joined with their cars
pub struct WinnersSource {
    backend: Arc<dyn RaceBackend>,
}

impl WinnersSource {
    async fn with_car(&self, winner: Winner) -> Option<WinnerWithCar> {
        match self.backend.get_car(winner.id).await {
            Ok(Some(car)) => Some(WinnerWithCar { winner, car }),
            Ok(None) => {
                warn!("Winner {} has no car, skipping", winner.id);
                None
            }
            Err(e) => {
                warn!("Failed to fetch car of winner {}: {}", winner.id, e);
                None
            }
        }
    }
}

#[async_trait]
impl PageSource for WinnersSource {
    type Item = WinnerWithCar;
    type SortKey = WinnersSortBy;

    async fn fetch(
        &self,
        query: &PageQuery<WinnersSortBy>,
    ) -> Result<Page<WinnerWithCar>, BackendError> {
        let page = self.backend.list_winners(query).await?;
        let joined = join_all(page.items.into_iter().map(|w| self.with_car(w))).await;
        Ok(Page {
            items: joined.into_iter().flatten().collect(),
            total: page.total,
        })
    }
}

/// One rendered leaderboard line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardRow {
    /// 1-based rank across all pages
    pub position: usize,
    pub car_id: CarId,
    pub name: String,
    pub color: String,
    pub wins: u32,
    pub time: f64,
}

pub struct Leaderboard {
    winners: PagedList<WinnersSource>,
}

impl Leaderboard {
    pub fn new(backend: Arc<dyn RaceBackend>, config: &DerbyConfig) -> Self {
        let list = PagedList::new(WinnersSource { backend }, config.winners_page_size)
            .with_sort(Sort::asc(WinnersSortBy::Time));
        Self { winners: list }
    }

    pub fn snapshot(&self) -> ListSnapshot<WinnerWithCar, WinnersSortBy> {
        self.winners.snapshot()
    }

    pub async fn refresh(&self) -> ListChange {
        self.winners.load().await
    }

    pub async fn next_page(&self) -> ListChange {
        self.winners.next_page().await
    }

    pub async fn prev_page(&self) -> ListChange {
        self.winners.prev_page().await
    }

    pub async fn set_sort(&self, column: WinnersSortBy) -> ListChange {
        self.winners.set_sort(column).await
    }

    pub fn rows(&self) -> Vec<LeaderboardRow> {
        let snapshot = self.winners.snapshot();
        let offset = (snapshot.page as usize - 1) * snapshot.page_size as usize;
        snapshot
            .items
            .into_iter()
            .enumerate()
            .map(|(index, entry)| LeaderboardRow {
                position: offset + index + 1,
                car_id: entry.winner.id,
                name: entry.car.name,
                color: entry.car.color,
                wins: entry.winner.wins,
                time: entry.winner.time,
            })
            .collect()
    }

    /// Arrow shown next to a column header, only for the active sort column
    pub fn sort_indicator(&self, column: WinnersSortBy) -> Option<&'static str> {
        match self.winners.sort() {
            Some(sort) if sort.by == column => Some(match sort.order {
                SortOrder::Asc => "↑",
                SortOrder::Desc => "↓",
            }),
            _ => None,
        }
    }
}
