use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::models::{Claim, Coordinates, LeaderboardEntry, NewClaim, Poi, PoiKind};
use crate::quota;

use super::{into_store_error, migrations::run_migrations, ClaimStore, StoreError};

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

fn to_u32(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("value {value} does not fit a seconds counter"))
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid datetime '{value}': {err}"))
}

/// SQLite-backed claim store. All access goes through one worker thread that
/// owns the connection; callers await the result over a oneshot channel.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
    daily_cap: u32,
}

impl Database {
    pub fn new(db_path: PathBuf, daily_cap: u32) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("geoclaim-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }
                if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
                    error!("Failed to enable foreign keys: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Database initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
            daily_cap,
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    pub async fn get_poi(&self, poi_id: &str) -> Result<Option<Poi>, StoreError> {
        let poi_id = poi_id.to_string();
        self.execute(move |conn| {
            conn.query_row(
                "SELECT id, name, latitude, longitude, kind, category FROM pois WHERE id = ?1",
                params![poi_id],
                |row| {
                    Ok(Poi {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        coordinates: Coordinates::new(row.get(2)?, row.get(3)?),
                        kind: PoiKind::from_tag(&row.get::<_, String>(4)?),
                        category: row.get(5)?,
                    })
                },
            )
            .optional()
            .context("failed to load poi")
        })
        .await
        .map_err(into_store_error)
    }

    pub async fn claims_for_user(&self, user_id: &str) -> Result<Vec<Claim>, StoreError> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, user_id, poi_id, start_time, end_time, seconds_earned, period_key
                     FROM claims WHERE user_id = ?1 ORDER BY start_time",
                )
                .context("failed to prepare claim listing")?;
            let rows = stmt
                .query_map(params![user_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                })
                .context("failed to run claim listing")?;

            let mut claims = Vec::new();
            for row in rows {
                let (id, user_id, poi_id, start, end, seconds, period_key) =
                    row.context("failed to read claim row")?;
                claims.push(Claim {
                    id,
                    user_id,
                    poi_id,
                    start_time: parse_datetime(&start)?,
                    end_time: parse_datetime(&end)?,
                    seconds_earned: to_u32(seconds)?,
                    period_key,
                });
            }
            Ok(claims)
        })
        .await
        .map_err(into_store_error)
    }
}

#[async_trait]
impl ClaimStore for Database {
    async fn daily_seconds_for_poi(
        &self,
        user_id: &str,
        poi_id: &str,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        let user_id = user_id.to_string();
        let poi_id = poi_id.to_string();
        self.execute(move |conn| {
            let total: i64 = conn
                .query_row(
                    "SELECT COALESCE(SUM(seconds_earned), 0) FROM claims
                     WHERE user_id = ?1 AND poi_id = ?2 AND start_time >= ?3 AND start_time < ?4",
                    params![
                        user_id,
                        poi_id,
                        day_start.to_rfc3339(),
                        day_end.to_rfc3339()
                    ],
                    |row| row.get(0),
                )
                .context("failed to sum daily claim seconds")?;
            to_u32(total)
        })
        .await
        .map_err(into_store_error)
    }

    async fn is_user_king_of_poi(&self, user_id: &str, poi_id: &str) -> Result<bool, StoreError> {
        let top = self.poi_leaderboard(poi_id, 2).await?;
        Ok(match top.as_slice() {
            [] => false,
            [first] => first.user_id == user_id,
            [first, second, ..] => {
                first.user_id == user_id && first.total_seconds > second.total_seconds
            }
        })
    }

    async fn upsert_poi(&self, poi: &Poi) -> Result<(), StoreError> {
        let record = poi.clone();
        let created_at = Utc::now();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO pois (id, name, latitude, longitude, kind, category, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     latitude = excluded.latitude,
                     longitude = excluded.longitude,
                     kind = excluded.kind,
                     category = excluded.category",
                params![
                    record.id,
                    record.name,
                    record.coordinates.latitude,
                    record.coordinates.longitude,
                    record.kind.as_str(),
                    record.category,
                    created_at.to_rfc3339(),
                ],
            )
            .context("failed to upsert poi")?;
            Ok(())
        })
        .await
        .map_err(into_store_error)
    }

    async fn insert_claim(&self, claim: NewClaim) -> Result<Claim, StoreError> {
        let (day_start, day_end) = quota::local_day_bounds(claim.start_time);
        let cap = self.daily_cap;
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let record = claim;

        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open claim transaction")?;

            // Cap check and insert in one transaction so concurrent callers
            // through this store cannot both slip under the cap.
            let used: i64 = tx
                .query_row(
                    "SELECT COALESCE(SUM(seconds_earned), 0) FROM claims
                     WHERE user_id = ?1 AND poi_id = ?2 AND start_time >= ?3 AND start_time < ?4",
                    params![
                        record.user_id,
                        record.poi_id,
                        day_start.to_rfc3339(),
                        day_end.to_rfc3339()
                    ],
                    |row| row.get(0),
                )
                .context("failed to read daily total before insert")?;

            if used >= cap as i64 {
                return Err(anyhow::Error::new(StoreError::DailyCapExceeded { cap }));
            }

            tx.execute(
                "INSERT INTO claims (id, user_id, poi_id, start_time, end_time, seconds_earned, period_key, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    record.user_id,
                    record.poi_id,
                    record.start_time.to_rfc3339(),
                    record.end_time.to_rfc3339(),
                    record.seconds_earned as i64,
                    record.period_key,
                    created_at.to_rfc3339(),
                ],
            )
            .context("failed to insert claim")?;

            tx.commit().context("failed to commit claim")?;

            Ok(Claim {
                id,
                user_id: record.user_id,
                poi_id: record.poi_id,
                start_time: record.start_time,
                end_time: record.end_time,
                seconds_earned: record.seconds_earned,
                period_key: record.period_key,
            })
        })
        .await
        .map_err(into_store_error)
    }

    async fn poi_leaderboard(
        &self,
        poi_id: &str,
        limit: u32,
    ) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let poi_id = poi_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT user_id, SUM(seconds_earned) AS total FROM claims
                     WHERE poi_id = ?1 GROUP BY user_id
                     ORDER BY total DESC, user_id ASC LIMIT ?2",
                )
                .context("failed to prepare leaderboard query")?;
            let rows = stmt
                .query_map(params![poi_id, limit as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })
                .context("failed to run leaderboard query")?;

            let mut entries = Vec::new();
            for row in rows {
                let (user_id, total) = row.context("failed to read leaderboard row")?;
                entries.push(LeaderboardEntry {
                    user_id,
                    total_seconds: to_u32(total)?,
                });
            }
            Ok(entries)
        })
        .await
        .map_err(into_store_error)
    }
}
