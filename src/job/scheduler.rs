use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{JobDefaults, POLL_SLICE, STOP_JOIN_TIMEOUT};
use crate::db::catalog::{read_entries_in_range, read_max_id};
use crate::db::writer::PriceWriter;
use crate::error::{AppError, Result};
use crate::job::ingest::ingest_names;
use crate::job::latency::{LatencySnapshot, WindowLatency};
use crate::job::status::{seconds_until, AlternationStatus, JobStatus, Progress};
use crate::job::strategy::{CredentialIndex, CredentialStrategy, FailurePolicy};
use crate::normalizer::as_i64;

/// Optional overrides accepted by `start()`; absent fields use the job defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartRequest {
    pub start_id: Option<i64>,
    pub batch_size: Option<i64>,
    pub interval_sec: Option<u64>,
}

impl StartRequest {
    /// Parse a `{startId, batchSize, intervalSec}` body. Each field is read on
    /// its own: integers or integer strings, null or absent for the default.
    /// An empty body means all defaults. Negative intervals clamp to 1 like
    /// the other settings do in `start()`; a field that is not an integer at
    /// all rejects the whole body.
    pub fn from_body(body: &[u8]) -> Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let value: serde_json::Value = serde_json::from_slice(body)?;
        if !value.is_object() {
            return Err(AppError::BadRequest("start body must be a JSON object".to_string()));
        }
        let field = |key: &str| -> Result<Option<i64>> {
            match value.get(key) {
                None | Some(serde_json::Value::Null) => Ok(None),
                Some(v) => as_i64(v)
                    .map(Some)
                    .ok_or_else(|| AppError::BadRequest(format!("{key} must be an integer, got {v}"))),
            }
        };
        Ok(Self {
            start_id: field("startId")?,
            batch_size: field("batchSize")?,
            interval_sec: field("intervalSec")?.map(|secs| secs.max(1) as u64),
        })
    }
}

/// Windowed batch-ingestion job: walks catalog ids `[start_id, max_id]` in
/// fixed-size windows, one external batch call per window, with a delay
/// between windows. Pausable, resumable and stoppable from any task.
///
/// All job state sits behind one mutex. The lock is only ever held for
/// in-memory reads and writes; catalog reads, API calls and price writes
/// happen with it released, so `status()` never waits on I/O.
#[derive(Clone)]
pub struct WindowScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    name: &'static str,
    pool: SqlitePool,
    writer: PriceWriter,
    strategy: CredentialStrategy,
    failures: FailurePolicy,
    defaults: JobDefaults,
    state: Mutex<SchedulerState>,
    /// Fired by control operations so the loop re-checks state without
    /// waiting out a full polling slice.
    wake: Notify,
    latency: WindowLatency,
}

#[derive(Debug)]
struct SchedulerState {
    running: bool,
    paused: bool,
    max_id: i64,
    completed_count: i64,
    current_start_id: i64,
    batch_size: i64,
    interval_secs: u64,
    last_processed_range: Option<(i64, i64)>,
    next_run_at: Option<Instant>,
    next_credential: CredentialIndex,
    last_error: Option<String>,
    failed_windows: u64,
    /// Bumped on every start. A loop only commits progress for its own run,
    /// so a loop that outlived stop's join window cannot touch a newer run.
    run_id: u64,
    run: Option<RunHandle>,
}

#[derive(Debug)]
struct RunHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// What one pass of `process_window` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowOutcome {
    /// Cursor outside `[1, max_id]`; nothing read, nothing advanced.
    Skipped,
    /// No entries (or no names) in range; cursor advanced anyway.
    Empty { start_id: i64, end_id: i64 },
    Written { start_id: i64, end_id: i64, names: usize, rows: usize },
}

impl WindowScheduler {
    pub fn new(
        name: &'static str,
        pool: SqlitePool,
        strategy: CredentialStrategy,
        failures: FailurePolicy,
        defaults: JobDefaults,
    ) -> Self {
        let state = SchedulerState {
            running: false,
            paused: false,
            max_id: 0,
            completed_count: 0,
            current_start_id: 0,
            batch_size: defaults.batch_size,
            interval_secs: defaults.interval_secs,
            last_processed_range: None,
            next_run_at: None,
            next_credential: CredentialStrategy::FIRST,
            last_error: None,
            failed_windows: 0,
            run_id: 0,
            run: None,
        };
        Self {
            inner: Arc::new(Inner {
                name,
                writer: PriceWriter::new(pool.clone()),
                pool,
                strategy,
                failures,
                defaults,
                state: Mutex::new(state),
                wake: Notify::new(),
                latency: WindowLatency::new(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Launch the background loop. Already running: returns the current status
    /// unchanged. Missing credentials: fails and the job stays idle.
    pub async fn start(&self, req: StartRequest) -> Result<JobStatus> {
        if self.inner.lock_state().running {
            return Ok(self.status());
        }
        self.inner.strategy.validate()?;
        let max_id = read_max_id(&self.inner.pool).await?;

        let mut state = self.inner.lock_state();
        // Lost a race with a concurrent start while reading max_id.
        if state.running {
            drop(state);
            return Ok(self.status());
        }

        let start_id = req.start_id.unwrap_or(1).max(1);
        state.running = true;
        state.paused = false;
        state.batch_size = req.batch_size.unwrap_or(self.inner.defaults.batch_size).max(1);
        state.interval_secs = req.interval_sec.unwrap_or(self.inner.defaults.interval_secs).max(1);
        state.max_id = max_id;
        state.current_start_id = start_id;
        state.completed_count = start_id - 1;
        state.last_processed_range = None;
        state.next_run_at = None;
        state.next_credential = CredentialStrategy::FIRST;
        state.last_error = None;
        state.failed_windows = 0;
        state.run_id += 1;

        let run_id = state.run_id;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&self.inner).run_loop(cancel.clone(), run_id));
        state.run = Some(RunHandle { cancel, task });

        info!(
            job = self.inner.name,
            start_id,
            max_id,
            batch_size = state.batch_size,
            interval_secs = state.interval_secs,
            "Job started"
        );
        drop(state);
        Ok(self.status())
    }

    /// Takes effect between windows; an in-flight window always completes.
    pub fn pause(&self) -> JobStatus {
        {
            let mut state = self.inner.lock_state();
            if state.running && !state.paused {
                state.paused = true;
                info!(job = self.inner.name, cursor = state.current_start_id, "Job paused");
            }
        }
        self.inner.wake.notify_waiters();
        self.status()
    }

    pub fn resume(&self) -> JobStatus {
        {
            let mut state = self.inner.lock_state();
            if state.running && state.paused {
                state.paused = false;
                info!(job = self.inner.name, cursor = state.current_start_id, "Job resumed");
            }
        }
        self.inner.wake.notify_waiters();
        self.status()
    }

    /// Signal the loop, wait up to `STOP_JOIN_TIMEOUT` for it to exit, then
    /// reset to idle whether or not it did. Never blocks longer than that.
    pub async fn stop(&self) -> JobStatus {
        let run = self.inner.lock_state().run.take();
        if let Some(run) = run {
            run.cancel.cancel();
            self.inner.wake.notify_waiters();
            if timeout(STOP_JOIN_TIMEOUT, run.task).await.is_err() {
                warn!(
                    job = self.inner.name,
                    "Loop did not exit within {:?}; forcing idle",
                    STOP_JOIN_TIMEOUT
                );
            }
        }
        {
            let mut state = self.inner.lock_state();
            state.running = false;
            state.paused = false;
            state.next_run_at = None;
            // A loop that missed the join window may still finish its window; it
            // must not write progress into the idle snapshot.
            state.run_id += 1;
        }
        info!(job = self.inner.name, "Job stopped");
        self.status()
    }

    pub fn status(&self) -> JobStatus {
        self.inner.status()
    }

    pub fn latency(&self) -> LatencySnapshot {
        self.inner.latency.snapshot()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        // Nothing panics while holding the lock; recover rather than propagate poison.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn status(&self) -> JobStatus {
        let state = self.lock_state();
        let progress = Progress {
            running: state.running,
            paused: state.paused,
            max_id: state.max_id,
            completed_count: state.completed_count,
            current_start_id: state.current_start_id,
            batch_size: state.batch_size,
        };
        JobStatus {
            running: state.running,
            paused: state.paused,
            state: progress.state(),
            max_id: state.max_id,
            completed_count: state.completed_count,
            percent: progress.percent(),
            current_start_id: state.current_start_id,
            current_end_id_next: progress.next_window_end(),
            last_processed_range: state.last_processed_range,
            next_run_seconds: seconds_until(state.next_run_at, Instant::now()),
            interval_sec: state.interval_secs,
            batch_size: state.batch_size,
            failed_windows: state.failed_windows,
            alternation: self.strategy.is_alternating().then(|| AlternationStatus {
                next_client_id: state.next_credential,
                alternating: true,
                last_error: state.last_error.clone(),
            }),
        }
    }

    async fn run_loop(self: Arc<Self>, cancel: CancellationToken, run_id: u64) {
        debug!(job = self.name, run_id, "Loop starting");
        while !cancel.is_cancelled() {
            if !self.wait_while_paused(&cancel).await {
                break;
            }

            let credential = self.lock_state().next_credential;
            let result = self.process_window(run_id).await;
            self.record_outcome(run_id, credential, result);

            let done = {
                let mut state = self.lock_state();
                if state.run_id != run_id {
                    break;
                }
                state.next_run_at = Some(Instant::now() + Duration::from_secs(state.interval_secs));
                state.completed_count >= state.max_id
            };
            if done {
                self.finish(run_id);
                break;
            }

            self.wait_interval(&cancel).await;
        }
        debug!(job = self.name, run_id, "Loop exited");
    }

    /// Idle until unpaused. Returns false when stop was requested meanwhile.
    async fn wait_while_paused(&self, cancel: &CancellationToken) -> bool {
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            if !self.lock_state().paused {
                return true;
            }
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = self.wake.notified() => {}
                _ = sleep(POLL_SLICE) => {}
            }
        }
    }

    /// Wait out the inter-window interval, returning early on stop or pause.
    async fn wait_interval(&self, cancel: &CancellationToken) {
        let interval = Duration::from_secs(self.lock_state().interval_secs);
        let deadline = Instant::now() + interval;
        loop {
            if cancel.is_cancelled() || self.lock_state().paused {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            let slice = POLL_SLICE.min(deadline - now);
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = self.wake.notified() => {}
                _ = sleep(slice) => {}
            }
        }
    }

    /// Read one window of the catalog, fetch its prices, write them, then
    /// advance the cursor. A failed fetch or write leaves the cursor where it
    /// was so the same window is retried next round.
    async fn process_window(&self, run_id: u64) -> Result<WindowOutcome> {
        let (start_id, end_id, credential) = {
            let state = self.lock_state();
            let start_id = state.current_start_id;
            let end_id = state.max_id.min(start_id + state.batch_size - 1);
            (start_id, end_id, state.next_credential)
        };
        if start_id > end_id || start_id <= 0 {
            return Ok(WindowOutcome::Skipped);
        }

        let entries = read_entries_in_range(&self.pool, start_id, end_id).await?;
        let names: Vec<String> = entries
            .into_iter()
            .map(|e| e.market_hash_name)
            .filter(|n| !n.trim().is_empty())
            .collect();
        if names.is_empty() {
            self.advance(run_id, start_id, end_id);
            return Ok(WindowOutcome::Empty { start_id, end_id });
        }

        let started = std::time::Instant::now();
        let client = self.strategy.client_for(credential);
        let summary = ingest_names(client.as_ref(), &self.writer, &names).await?;
        self.latency.record(started.elapsed());

        self.advance(run_id, start_id, end_id);
        Ok(WindowOutcome::Written {
            start_id,
            end_id,
            names: names.len(),
            rows: summary.written.rows,
        })
    }

    fn advance(&self, run_id: u64, start_id: i64, end_id: i64) {
        let mut state = self.lock_state();
        if state.run_id != run_id {
            return;
        }
        state.last_processed_range = Some((start_id, end_id));
        state.completed_count = end_id;
        state.current_start_id = end_id + 1;
    }

    /// Apply the failure policy and pass the credential turn along. The turn
    /// passes on failure too, so one bad key cannot stall the schedule.
    fn record_outcome(&self, run_id: u64, credential: CredentialIndex, result: Result<WindowOutcome>) {
        let mut state = self.lock_state();
        if state.run_id != run_id {
            return;
        }
        match result {
            Ok(outcome) => {
                match outcome {
                    WindowOutcome::Written { start_id, end_id, names, rows } => info!(
                        job = self.name,
                        start_id,
                        end_id,
                        credential,
                        names,
                        rows,
                        "Window processed"
                    ),
                    WindowOutcome::Empty { start_id, end_id } => {
                        info!(job = self.name, start_id, end_id, "Window empty, skipped ahead")
                    }
                    WindowOutcome::Skipped => debug!(job = self.name, "No window to process"),
                }
                if self.failures == FailurePolicy::Recorded {
                    state.last_error = None;
                }
            }
            Err(e) => {
                state.failed_windows += 1;
                warn!(
                    job = self.name,
                    start_id = state.current_start_id,
                    credential,
                    "Window failed, will retry: {e}"
                );
                if self.failures == FailurePolicy::Recorded {
                    state.last_error = Some(e.to_string());
                }
            }
        }
        state.next_credential = self.strategy.next_after(credential);
    }

    /// Cursor exhausted the catalog: go idle without an external stop call.
    fn finish(&self, run_id: u64) {
        let mut state = self.lock_state();
        if state.run_id != run_id {
            return;
        }
        state.running = false;
        state.paused = false;
        state.next_run_at = None;
        // Dropping our own JoinHandle detaches the task; it exits right after this.
        state.run = None;
        info!(
            job = self.name,
            completed_count = state.completed_count,
            max_id = state.max_id,
            "Job finished: catalog exhausted"
        );
    }
}
