//! SQLite-backed [`IndexStore`], for hosts where a transactional store is
//! preferable to one JSON document in object storage.
//!
//! All connection work runs on a dedicated thread; async callers hand it
//! closures and await the reply over a oneshot channel.

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tokio::sync::oneshot;

use crate::db::{
    helpers::{parse_datetime, to_i64},
    index::{IndexDocument, IndexStore},
    migrations::run_migrations,
    models::Baseline,
};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "visual_baseline::sqlite";

use crate::{log_debug, log_error, log_info};

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct WorkerInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for WorkerInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                log_error!("Failed to send shutdown to index DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                log_error!("Failed to join index DB thread: {join_err:?}");
            }
        }
    }
}

#[derive(Clone)]
pub struct SqliteIndexStore {
    inner: Arc<WorkerInner>,
    db_path: Arc<PathBuf>,
}

impl SqliteIndexStore {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create index directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("baseline-index-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite index database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    log_error!("Failed to enable WAL mode: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run index migrations");
                if ready_tx.send(init_result).is_err() {
                    log_error!("Index DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => task(&mut conn),
                        DbCommand::Shutdown => break,
                    }
                }

                log_debug!("Index database thread shutting down");
            })
            .with_context(|| "failed to spawn index database worker thread")?;

        ready_rx
            .recv()
            .context("index database worker exited before signaling readiness")??;

        log_info!("Baseline index database opened at {}", db_path.display());

        Ok(Self {
            inner: Arc::new(WorkerInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
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
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                log_error!("Index DB caller dropped before receiving result");
            }
        }));

        self.inner
            .sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to index DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("index database thread terminated unexpectedly"))?
    }

    /// When the index was last persisted, if ever.
    pub async fn last_persisted(&self) -> Result<Option<DateTime<Utc>>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare("SELECT updated_at FROM index_meta WHERE id = 1")?;
            let mut rows = stmt.query([])?;
            match rows.next()? {
                Some(row) => Ok(Some(parse_datetime(&row.get::<_, String>(0)?, "updated_at")?)),
                None => Ok(None),
            }
        })
        .await
    }
}

#[async_trait]
impl IndexStore for SqliteIndexStore {
    async fn load(&self) -> Result<Vec<Baseline>> {
        self.execute(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, payload FROM baselines ORDER BY updated_at DESC, id ASC")?;
            let mut rows = stmt.query([])?;
            let mut baselines = Vec::new();
            while let Some(row) = rows.next()? {
                let id: String = row.get(0)?;
                let payload: String = row.get(1)?;
                let baseline: Baseline = serde_json::from_str(&payload)
                    .with_context(|| format!("failed to decode baseline row {id}"))?;
                baselines.push(baseline);
            }
            Ok(baselines)
        })
        .await
    }

    async fn persist(&self, document: &IndexDocument) -> Result<()> {
        let document = document.clone();
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open index transaction")?;

            tx.execute("DELETE FROM baselines", [])?;
            for baseline in &document.baselines {
                let payload = serde_json::to_string(baseline)?;
                tx.execute(
                    "INSERT INTO baselines (id, owner, repo, branch, route, viewport, commit_sha, fingerprint, updated_at, payload)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        baseline.id,
                        baseline.repository.owner,
                        baseline.repository.name,
                        baseline.repository.branch,
                        baseline.route,
                        baseline.viewport,
                        baseline.metadata.commit,
                        baseline.fingerprint,
                        baseline.updated_at.to_rfc3339(),
                        payload,
                    ],
                )
                .with_context(|| format!("failed to insert baseline {}", baseline.id))?;
            }

            tx.execute(
                "INSERT INTO index_meta (id, version, updated_at, count)
                 VALUES (1, ?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                     version = excluded.version,
                     updated_at = excluded.updated_at,
                     count = excluded.count",
                params![
                    document.version,
                    document.updated_at.to_rfc3339(),
                    to_i64(document.count as u64)?,
                ],
            )?;

            tx.commit().context("failed to commit index transaction")?;
            Ok(())
        })
        .await
    }
}
