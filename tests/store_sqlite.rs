// Contract tests for the SQLite-backed claim store.

use chrono::{Duration, Utc};
use tempfile::tempdir;

use geoclaim::{
    quota, ClaimStore, Coordinates, Database, NewClaim, Poi, PoiKind, StoreError,
};

fn open_db(dir: &tempfile::TempDir) -> Database {
    Database::new(dir.path().join("claims.db"), 60).expect("database should initialize")
}

fn poi(id: &str) -> Poi {
    Poi {
        id: id.into(),
        name: format!("POI {id}"),
        coordinates: Coordinates::new(52.3579, 4.8686),
        kind: PoiKind::Park,
        category: "leisure".into(),
    }
}

fn claim(user_id: &str, poi_id: &str, seconds: u32, days_ago: i64) -> NewClaim {
    let start = Utc::now() - Duration::days(days_ago);
    NewClaim {
        user_id: user_id.into(),
        poi_id: poi_id.into(),
        start_time: start,
        end_time: start + Duration::seconds(seconds as i64),
        seconds_earned: seconds,
        period_key: quota::period_key(start),
    }
}

#[tokio::test]
async fn upsert_poi_is_idempotent_and_updates() {
    let dir = tempdir().unwrap();
    let db = open_db(&dir);

    let mut target = poi("osm_1");
    db.upsert_poi(&target).await.unwrap();
    target.name = "Renamed".into();
    db.upsert_poi(&target).await.unwrap();

    let loaded = db.get_poi("osm_1").await.unwrap().unwrap();
    assert_eq!(loaded.name, "Renamed");
    assert_eq!(loaded.kind, PoiKind::Park);
    assert!(db.get_poi("osm_2").await.unwrap().is_none());
}

#[tokio::test]
async fn daily_sum_respects_the_local_day_window() {
    let dir = tempdir().unwrap();
    let db = open_db(&dir);

    db.insert_claim(claim("alice", "osm_1", 25, 0)).await.unwrap();
    db.insert_claim(claim("alice", "osm_1", 15, 0)).await.unwrap();
    db.insert_claim(claim("alice", "osm_1", 50, 1)).await.unwrap();
    db.insert_claim(claim("bob", "osm_1", 30, 0)).await.unwrap();
    db.insert_claim(claim("alice", "osm_2", 30, 0)).await.unwrap();

    let (day_start, day_end) = quota::local_day_bounds(Utc::now());
    let used = db
        .daily_seconds_for_poi("alice", "osm_1", day_start, day_end)
        .await
        .unwrap();
    // Yesterday's 50 s and other users/POIs do not count.
    assert_eq!(used, 40);

    let empty = db
        .daily_seconds_for_poi("carol", "osm_1", day_start, day_end)
        .await
        .unwrap();
    assert_eq!(empty, 0);
}

#[tokio::test]
async fn insert_rejects_claims_past_the_daily_cap() {
    let dir = tempdir().unwrap();
    let db = open_db(&dir);

    db.insert_claim(claim("alice", "osm_1", 70, 0)).await.unwrap();
    let err = db
        .insert_claim(claim("alice", "osm_1", 5, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DailyCapExceeded { cap: 60 }));

    // A different day is a fresh budget.
    db.insert_claim(claim("alice", "osm_1", 20, 1)).await.unwrap();
    // And a different POI.
    db.insert_claim(claim("alice", "osm_2", 20, 0)).await.unwrap();
}

#[tokio::test]
async fn king_requires_strictly_greatest_total() {
    let dir = tempdir().unwrap();
    let db = open_db(&dir);

    db.insert_claim(claim("alice", "osm_1", 40, 2)).await.unwrap();
    db.insert_claim(claim("alice", "osm_1", 30, 1)).await.unwrap();
    db.insert_claim(claim("bob", "osm_1", 50, 1)).await.unwrap();

    assert!(db.is_user_king_of_poi("alice", "osm_1").await.unwrap());
    assert!(!db.is_user_king_of_poi("bob", "osm_1").await.unwrap());

    // Bob draws level: a tie dethrones everyone.
    db.insert_claim(claim("bob", "osm_1", 20, 0)).await.unwrap();
    assert!(!db.is_user_king_of_poi("alice", "osm_1").await.unwrap());
    assert!(!db.is_user_king_of_poi("bob", "osm_1").await.unwrap());

    // No claims at all: nobody is king.
    assert!(!db.is_user_king_of_poi("alice", "osm_9").await.unwrap());
}

#[tokio::test]
async fn leaderboard_orders_by_total_descending() {
    let dir = tempdir().unwrap();
    let db = open_db(&dir);

    db.insert_claim(claim("alice", "osm_1", 30, 1)).await.unwrap();
    db.insert_claim(claim("bob", "osm_1", 50, 1)).await.unwrap();
    db.insert_claim(claim("carol", "osm_1", 10, 1)).await.unwrap();

    let board = db.poi_leaderboard("osm_1", 10).await.unwrap();
    let order: Vec<(&str, u32)> = board
        .iter()
        .map(|e| (e.user_id.as_str(), e.total_seconds))
        .collect();
    assert_eq!(order, vec![("bob", 50), ("alice", 30), ("carol", 10)]);

    let top_one = db.poi_leaderboard("osm_1", 1).await.unwrap();
    assert_eq!(top_one.len(), 1);
    assert_eq!(top_one[0].user_id, "bob");
}

#[tokio::test]
async fn claims_round_trip_through_listing() {
    let dir = tempdir().unwrap();
    let db = open_db(&dir);

    let submitted = claim("alice", "osm_1", 70, 0);
    let saved = db.insert_claim(submitted.clone()).await.unwrap();
    assert!(!saved.id.is_empty());
    assert_eq!(saved.seconds_earned, 70);

    let listed = db.claims_for_user("alice").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, saved.id);
    assert_eq!(listed[0].poi_id, "osm_1");
    assert_eq!(listed[0].period_key, submitted.period_key);
    // RFC 3339 storage keeps sub-second precision close enough to compare
    // at second granularity.
    assert_eq!(
        listed[0].start_time.timestamp(),
        submitted.start_time.timestamp()
    );
}
