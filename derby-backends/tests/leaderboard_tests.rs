//! Leaderboard controller running against the in-memory store

use derby_backends::InMemoryBackend;
use derby_core::config::DerbyConfig;
use derby_core::model::{NewCar, Winner, WinnersSortBy};
use derby_core::pagination::{ListChange, ListStatus};
use derby_core::Leaderboard;
use std::sync::Arc;

fn backend_with_winners(count: u32) -> Arc<InMemoryBackend> {
    let cars = (1..=count).map(|i| NewCar {
        name: format!("Car {}", i),
        color: "#abcdef".to_string(),
    });
    // Car i won i times, and car 1 holds the best time
    let winners = (1..=count).map(|i| Winner {
        id: i,
        wins: i,
        time: 1.0 + f64::from(i) / 10.0,
    });
    Arc::new(InMemoryBackend::new().with_cars(cars).with_winners(winners))
}

#[tokio::test]
async fn test_default_sort_is_best_time_first() {
    let backend = backend_with_winners(3);
    let board = Leaderboard::new(backend, &DerbyConfig::default());

    assert_eq!(board.refresh().await, ListChange::Applied);
    let rows = board.rows();
    let ids: Vec<_> = rows.iter().map(|r| r.car_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(rows[0].name, "Car 1");
    assert_eq!(rows[0].color, "#abcdef");
    assert_eq!(rows[2].wins, 3);

    assert_eq!(board.sort_indicator(WinnersSortBy::Time), Some("↑"));
    assert_eq!(board.sort_indicator(WinnersSortBy::Wins), None);
}

#[tokio::test]
async fn test_sort_toggle_flips_indicator_and_order() {
    let backend = backend_with_winners(3);
    let board = Leaderboard::new(backend, &DerbyConfig::default());
    board.refresh().await;

    board.set_sort(WinnersSortBy::Time).await;
    assert_eq!(board.sort_indicator(WinnersSortBy::Time), Some("↓"));
    let ids: Vec<_> = board.rows().iter().map(|r| r.car_id).collect();
    assert_eq!(ids, vec![3, 2, 1]);

    board.set_sort(WinnersSortBy::Wins).await;
    assert_eq!(board.sort_indicator(WinnersSortBy::Wins), Some("↑"));
    assert_eq!(board.sort_indicator(WinnersSortBy::Time), None);
    assert_eq!(board.rows()[0].wins, 1);
}

#[tokio::test]
async fn test_positions_continue_across_pages() {
    let backend = backend_with_winners(20);
    let board = Leaderboard::new(backend, &DerbyConfig::default());
    board.refresh().await;

    assert_eq!(board.next_page().await, ListChange::Applied);
    let rows = board.rows();
    assert_eq!(rows.len(), 10);
    assert_eq!(rows[0].position, 11);
    assert_eq!(rows[9].position, 20);

    assert_eq!(board.prev_page().await, ListChange::Applied);
    assert_eq!(board.rows()[0].position, 1);
}

#[tokio::test]
async fn test_partial_second_page_is_not_reachable() {
    let backend = backend_with_winners(12);
    let board = Leaderboard::new(backend, &DerbyConfig::default());
    board.refresh().await;

    assert!(!board.snapshot().has_next());
    assert_eq!(board.next_page().await, ListChange::Unchanged);
    assert_eq!(board.snapshot().page, 1);
}

#[tokio::test]
async fn test_winner_without_car_is_skipped() {
    let backend = Arc::new(
        InMemoryBackend::new()
            .with_cars(vec![NewCar {
                name: "Ford Mustang".to_string(),
                color: "#ff0000".to_string(),
            }])
            .with_winners(vec![Winner::first(1, 2.5), Winner::first(9, 1.5)]),
    );
    let board = Leaderboard::new(backend, &DerbyConfig::default());
    board.refresh().await;

    let snapshot = board.snapshot();
    assert_eq!(snapshot.total, 2);
    assert_eq!(snapshot.status, ListStatus::Ready);
    let rows = board.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "Ford Mustang");
}
