//! Per-source sync loops
//!
//! Every enabled source gets two independent tasks, one for the qualified
//! list and one for the ranked list:
//!
//! ```text
//! Idle --initial delay--> Running --cycle ends (ok or failed)--> Sleeping --interval--> Running
//! ```
//!
//! A failed or panicking cycle is logged and counted, then the loop sleeps
//! as usual. The cancellation token is only observed while sleeping, so a
//! running cycle always finishes its transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use ranksync_common::catalog::SourceKind;
use ranksync_common::config::{SchedulerConfig, SourceConfig};
use ranksync_common::events::EventSink;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::SyncResult;
use crate::services::{
    ChangeNotifier, PageFetcher, QualifiedContext, QualifiedSetReconciler, RankedWatermarkMerger,
};
use crate::sources::RankingSource;

/// Which list a loop keeps in sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopKind {
    Qualified,
    Ranked,
}

impl LoopKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopKind::Qualified => "qualified",
            LoopKind::Ranked => "ranked",
        }
    }
}

/// Loop state machine position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Idle,
    Running,
    Sleeping,
}

/// Observable status of one loop
#[derive(Debug, Clone, Serialize)]
pub struct LoopStatus {
    pub source: SourceKind,
    pub kind: LoopKind,
    pub state: LoopState,
    pub cycles_ok: u64,
    pub cycles_failed: u64,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualified_snapshot_size: Option<usize>,
}

impl LoopStatus {
    fn new(source: SourceKind, kind: LoopKind) -> Self {
        Self {
            source,
            kind,
            state: LoopState::Idle,
            cycles_ok: 0,
            cycles_failed: 0,
            last_started_at: None,
            last_finished_at: None,
            last_error: None,
            qualified_snapshot_size: None,
        }
    }
}

/// Shared loop status table, read by the health endpoint
#[derive(Clone, Default)]
pub struct LoopRegistry {
    inner: Arc<RwLock<BTreeMap<String, LoopStatus>>>,
}

impl LoopRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(source: SourceKind, kind: LoopKind) -> String {
        format!("{}.{}", source.as_str(), kind.as_str())
    }

    pub async fn register(&self, source: SourceKind, kind: LoopKind) {
        self.inner
            .write()
            .await
            .insert(Self::key(source, kind), LoopStatus::new(source, kind));
    }

    async fn update<F>(&self, source: SourceKind, kind: LoopKind, apply: F)
    where
        F: FnOnce(&mut LoopStatus),
    {
        let mut loops = self.inner.write().await;
        let status = loops
            .entry(Self::key(source, kind))
            .or_insert_with(|| LoopStatus::new(source, kind));
        apply(status);
    }

    pub async fn get(&self, source: SourceKind, kind: LoopKind) -> Option<LoopStatus> {
        self.inner.read().await.get(&Self::key(source, kind)).cloned()
    }

    /// All loops, ordered by source then kind
    pub async fn snapshot(&self) -> Vec<LoopStatus> {
        self.inner.read().await.values().cloned().collect()
    }
}

/// What a successful cycle reports back to the loop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleSummary {
    pub rows_written: u64,
    pub notified: usize,
    pub qualified_snapshot_size: Option<usize>,
}

/// One unit of periodic work
#[async_trait]
pub trait SyncCycle: Send {
    fn source(&self) -> SourceKind;
    fn kind(&self) -> LoopKind;
    async fn run_cycle(&mut self) -> SyncResult<CycleSummary>;
}

/// Qualified loop body: the reconciler plus the snapshot it owns
pub struct QualifiedLoop {
    reconciler: QualifiedSetReconciler,
    ctx: QualifiedContext,
    source: SourceKind,
}

impl QualifiedLoop {
    pub fn new(reconciler: QualifiedSetReconciler, source: SourceKind) -> Self {
        Self {
            reconciler,
            ctx: QualifiedContext::new(),
            source,
        }
    }
}

#[async_trait]
impl SyncCycle for QualifiedLoop {
    fn source(&self) -> SourceKind {
        self.source
    }

    fn kind(&self) -> LoopKind {
        LoopKind::Qualified
    }

    async fn run_cycle(&mut self) -> SyncResult<CycleSummary> {
        let report = self.reconciler.reconcile(&mut self.ctx).await?;
        Ok(CycleSummary {
            rows_written: report.rows_written,
            notified: report.notified,
            qualified_snapshot_size: Some(report.snapshot_size),
        })
    }
}

/// Ranked loop body
pub struct RankedLoop {
    merger: RankedWatermarkMerger,
    source: SourceKind,
}

impl RankedLoop {
    pub fn new(merger: RankedWatermarkMerger, source: SourceKind) -> Self {
        Self { merger, source }
    }
}

#[async_trait]
impl SyncCycle for RankedLoop {
    fn source(&self) -> SourceKind {
        self.source
    }

    fn kind(&self) -> LoopKind {
        LoopKind::Ranked
    }

    async fn run_cycle(&mut self) -> SyncResult<CycleSummary> {
        let report = self.merger.merge_ranked().await?;
        Ok(CycleSummary {
            rows_written: report.rows_written,
            notified: report.notified,
            qualified_snapshot_size: None,
        })
    }
}

/// Delay before the first cycle and between cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    pub initial_delay: Duration,
    pub interval: Duration,
}

/// Sleep for `duration`, returns `false` if cancelled first
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Drive `cycle` until `cancel` fires
pub async fn run_loop<C: SyncCycle>(
    mut cycle: C,
    timing: LoopTiming,
    registry: LoopRegistry,
    cancel: CancellationToken,
) {
    let source = cycle.source();
    let kind = cycle.kind();
    registry.register(source, kind).await;

    info!(
        source = %source,
        loop_kind = kind.as_str(),
        initial_delay_secs = timing.initial_delay.as_secs_f64(),
        interval_secs = timing.interval.as_secs_f64(),
        "Sync loop scheduled"
    );

    if !sleep_or_cancel(timing.initial_delay, &cancel).await {
        info!(source = %source, loop_kind = kind.as_str(), "Sync loop cancelled before first cycle");
        return;
    }

    loop {
        registry
            .update(source, kind, |status| {
                status.state = LoopState::Running;
                status.last_started_at = Some(Utc::now());
            })
            .await;

        info!(source = %source, loop_kind = kind.as_str(), "Sync cycle started");

        let result = AssertUnwindSafe(cycle.run_cycle()).catch_unwind().await;

        let failure = match result {
            Ok(Ok(summary)) => {
                info!(
                    source = %source,
                    loop_kind = kind.as_str(),
                    rows_written = summary.rows_written,
                    notified = summary.notified,
                    "Sync cycle finished"
                );
                registry
                    .update(source, kind, |status| {
                        status.cycles_ok += 1;
                        status.last_error = None;
                        if summary.qualified_snapshot_size.is_some() {
                            status.qualified_snapshot_size = summary.qualified_snapshot_size;
                        }
                    })
                    .await;
                None
            }
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => Some(format!("cycle panicked: {}", panic_message(panic.as_ref()))),
        };

        if let Some(message) = failure {
            error!(source = %source, loop_kind = kind.as_str(), error = %message, "Sync cycle failed");
            registry
                .update(source, kind, |status| {
                    status.cycles_failed += 1;
                    status.last_error = Some(message);
                })
                .await;
        }

        registry
            .update(source, kind, |status| {
                status.state = LoopState::Sleeping;
                status.last_finished_at = Some(Utc::now());
            })
            .await;

        if !sleep_or_cancel(timing.interval, &cancel).await {
            break;
        }
    }

    info!(source = %source, loop_kind = kind.as_str(), "Sync loop stopped");
}

/// Spawn the qualified and ranked loops of one source
pub fn spawn_source_loops(
    pool: SqlitePool,
    source: Arc<dyn RankingSource>,
    source_config: &SourceConfig,
    scheduler: &SchedulerConfig,
    sink: Arc<dyn EventSink>,
    registry: LoopRegistry,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let kind = source.kind();
    let fetcher = PageFetcher::from_config(source_config);
    let notifier = ChangeNotifier::new(sink, kind);

    let reconciler = QualifiedSetReconciler::new(
        pool.clone(),
        Arc::clone(&source),
        fetcher.clone(),
        notifier.clone(),
        scheduler.max_conflict_retries,
    );
    let merger = RankedWatermarkMerger::new(
        pool,
        source,
        fetcher,
        notifier,
        scheduler.max_conflict_retries,
    );

    vec![
        tokio::spawn(run_loop(
            QualifiedLoop::new(reconciler, kind),
            LoopTiming {
                initial_delay: scheduler.qualified_initial_delay(),
                interval: scheduler.interval(),
            },
            registry.clone(),
            cancel.clone(),
        )),
        tokio::spawn(run_loop(
            RankedLoop::new(merger, kind),
            LoopTiming {
                initial_delay: scheduler.ranked_initial_delay(),
                interval: scheduler.interval(),
            },
            registry,
            cancel,
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, SyncError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails, then panics, then succeeds forever
    struct FlakyCycle {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SyncCycle for FlakyCycle {
        fn source(&self) -> SourceKind {
            SourceKind::BeatLeader
        }

        fn kind(&self) -> LoopKind {
            LoopKind::Ranked
        }

        async fn run_cycle(&mut self) -> SyncResult<CycleSummary> {
            match self.calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err(SyncError::Fetch(FetchError::Timeout("slow".to_string()))),
                1 => panic!("bad record"),
                _ => Ok(CycleSummary::default()),
            }
        }
    }

    fn fast() -> LoopTiming {
        LoopTiming {
            initial_delay: Duration::from_millis(1),
            interval: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_loop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = LoopRegistry::new();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_loop(
            FlakyCycle { calls: Arc::clone(&calls) },
            fast(),
            registry.clone(),
            cancel.clone(),
        ));

        for _ in 0..400 {
            if calls.load(Ordering::SeqCst) >= 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        handle.await.unwrap();

        assert!(calls.load(Ordering::SeqCst) >= 4);
        let status = registry.get(SourceKind::BeatLeader, LoopKind::Ranked).await.unwrap();
        assert_eq!(status.cycles_failed, 2);
        assert!(status.cycles_ok >= 2);
        assert_eq!(status.last_error, None);
        assert_eq!(status.state, LoopState::Sleeping);
    }

    #[tokio::test]
    async fn test_cancel_during_initial_delay() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = LoopRegistry::new();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_loop(
            FlakyCycle { calls: Arc::clone(&calls) },
            LoopTiming {
                initial_delay: Duration::from_secs(3600),
                interval: Duration::from_secs(3600),
            },
            registry.clone(),
            cancel.clone(),
        ));

        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let status = registry.get(SourceKind::BeatLeader, LoopKind::Ranked).await.unwrap();
        assert_eq!(status.state, LoopState::Idle);
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");

        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
    }
}
