//! Both loops of one source running against a shared catalog

mod helpers;

use helpers::*;
use ranksync_common::catalog::{Characteristic, DifficultyTier, SourceKind};
use ranksync_common::config::{SchedulerConfig, SourceConfig};
use ranksync_scraper::scheduler::{spawn_source_loops, LoopKind, LoopRegistry, LoopState};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use Characteristic::Standard;
use DifficultyTier::{Expert, Hard};

async fn wait_for_cycles(registry: &LoopRegistry, source: SourceKind) -> bool {
    for _ in 0..300 {
        let mut done = true;
        for kind in [LoopKind::Qualified, LoopKind::Ranked] {
            let ok = registry.get(source, kind).await.map(|s| s.cycles_ok).unwrap_or(0);
            done &= ok >= 1;
        }
        if done {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_source_loops_sync_and_stop_on_cancel() {
    let (_dir, pool) = create_test_db().await;
    seed_map(&pool, 1, &[("qqq", &[(Standard, Hard)])]).await;
    seed_map(&pool, 2, &[("rrr", &[(Standard, Expert)])]).await;

    let source = Arc::new(ScriptedSource::new(
        SourceKind::ScoreSaber,
        vec![
            qualified_entry("qqq", Standard, Hard, Some(day(2024, 6, 1))),
            ranked_entry("rrr", Standard, Expert, 7.5, Some(day(2024, 6, 2))),
        ],
    ));
    let sink = Arc::new(RecordingSink::new());

    let mut source_config = SourceConfig::with_base_url("http://unused.invalid");
    source_config.page_size = 10;
    source_config.page_delay_ms = 0;

    let scheduler = SchedulerConfig {
        qualified_initial_delay_secs: 0,
        ranked_initial_delay_secs: 0,
        interval_secs: 3600,
        max_conflict_retries: 5,
    };

    let registry = LoopRegistry::new();
    let cancel = CancellationToken::new();

    let handles = spawn_source_loops(
        pool.clone(),
        source,
        &source_config,
        &scheduler,
        sink.clone(),
        registry.clone(),
        cancel.clone(),
    );
    assert_eq!(handles.len(), 2);

    assert!(wait_for_cycles(&registry, SourceKind::ScoreSaber).await);

    cancel.cancel();
    for handle in handles {
        handle.await.unwrap();
    }

    let qualified = registry.get(SourceKind::ScoreSaber, LoopKind::Qualified).await.unwrap();
    assert_eq!(qualified.state, LoopState::Sleeping);
    assert_eq!(qualified.qualified_snapshot_size, Some(1));
    assert_eq!(qualified.cycles_failed, 0);

    let map = map_state(&pool, SourceKind::ScoreSaber, 1).await;
    assert!(map.qualified);
    assert_eq!(map.qualified_at.as_deref(), Some("2024-06-01T00:00:00.000Z"));

    let map = map_state(&pool, SourceKind::ScoreSaber, 2).await;
    assert!(map.ranked);

    let difficulty = difficulty_state(&pool, SourceKind::ScoreSaber, "rrr", Standard, Expert).await;
    assert_eq!(difficulty.stars, Some(7.5));

    let mut keys = sink.routing_keys();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            "maps.1.updated.qualified".to_string(),
            "maps.2.updated.ranked".to_string()
        ]
    );
}

#[tokio::test]
async fn test_cancel_before_first_cycle_touches_nothing() {
    let (_dir, pool) = create_test_db().await;
    seed_map(&pool, 1, &[("qqq", &[(Standard, Hard)])]).await;
    let before = dump_catalog(&pool).await;

    let source = Arc::new(ScriptedSource::new(
        SourceKind::BeatLeader,
        vec![qualified_entry("qqq", Standard, Hard, Some(day(2024, 6, 1)))],
    ));

    let registry = LoopRegistry::new();
    let cancel = CancellationToken::new();
    let handles = spawn_source_loops(
        pool.clone(),
        source.clone(),
        &SourceConfig::with_base_url("http://unused.invalid"),
        &SchedulerConfig::default(),
        Arc::new(RecordingSink::new()),
        registry.clone(),
        cancel.clone(),
    );

    cancel.cancel();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(source.request_count(), 0);
    assert_eq!(dump_catalog(&pool).await, before);
}
