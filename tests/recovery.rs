mod common;

use std::{sync::Arc, time::Duration};

use chain_log_monitor::{
    Admission, DedupEngine, GapCheck, GapMonitor, Recovery, RecoveryOutcome, assert_emitted,
    assert_eventually, test_utils::log_at,
};
use common::Harness;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn reorged_log_triggers_recovery_from_the_watermark() {
    let harness = Harness::new(520, 500);
    harness.chain.push_logs([log_at(505, 2, 0), log_at(510, 3, 0)]);
    let cancel = CancellationToken::new();
    tokio::spawn(harness.coordinator(1_000).run(cancel.clone()));

    let admission = harness.test.processor.process(&log_at(480, 1, 0)).await;

    assert_eq!(admission, Admission::ReorgSignal { block_number: 480, watermark: 500 });
    assert_eventually!(harness.test.state.last_processed_block() == 520);
    assert_eventually!(harness.test.state.recovery() == Recovery::Idle);
    assert_emitted!(harness.test.sink, [(505, 0), (510, 0)]);
    assert_eq!(harness.chain.calls(), vec![(501, 520)]);

    let stats = harness.test.state.snapshot().stats;
    assert_eq!(stats.reorgs_detected, 1);
    assert_eq!(stats.recoveries_completed, 1);
    cancel.cancel();
}

#[tokio::test]
async fn old_logs_are_accepted_while_recovery_runs() {
    let harness = Harness::new(520, 500);
    assert!(harness.test.state.begin_recovery().is_some());

    let late = harness.test.processor.process(&log_at(495, 1, 0)).await;

    assert!(late.is_accepted());
    assert_eq!(harness.test.state.last_processed_block(), 500);
    harness.test.state.end_recovery();
}

#[tokio::test]
async fn large_gap_is_recovered_in_bounded_windows() -> anyhow::Result<()> {
    let harness = Harness::new(6_000, 1_000);
    harness.chain.push_logs((1..=50).map(|n| log_at(1_000 + n * 100, n, 0)));
    let gaps = GapMonitor::new(Arc::clone(&harness.test.state), harness.chain.clone(), 2);

    let check = gaps.check_once().await?;
    assert_eq!(check, GapCheck::Behind { head: 6_000, watermark: 1_000, raised: true });
    assert!(harness.test.state.take_backfill_signal());

    let outcome = harness.coordinator(1_000).recover(&CancellationToken::new()).await?;

    assert_eq!(outcome, RecoveryOutcome::CaughtUp { from: 1_001, to: 6_000, windows: 5 });
    assert_eq!(harness.test.sink.len(), 50);
    let calls = harness.chain.calls();
    assert_eq!(calls.len(), 50);
    assert!(calls.iter().all(|(from, to)| to - from < 100));
    assert_eq!(gaps.check_once().await?, GapCheck::InSync { head: 6_000, watermark: 6_000 });
    Ok(())
}

#[tokio::test]
async fn concurrent_recoveries_share_one_slot() -> anyhow::Result<()> {
    let harness = Harness::new(2_000, 1_000);
    harness.chain.set_latency(Duration::from_millis(1));
    let first = harness.coordinator(1_000);
    let second = harness.coordinator(1_000);
    let cancel = CancellationToken::new();

    let (a, b) = tokio::join!(first.recover(&cancel), second.recover(&cancel));

    assert_eq!(a?, RecoveryOutcome::CaughtUp { from: 1_001, to: 2_000, windows: 1 });
    assert_eq!(b?, RecoveryOutcome::AlreadyRunning);
    assert_eq!(harness.chain.calls().len(), 10);
    Ok(())
}

#[tokio::test]
async fn signal_storm_runs_backfills_one_at_a_time() {
    let harness = Harness::new(3_000, 1_000);
    harness.chain.set_latency(Duration::from_millis(1));
    let cancel = CancellationToken::new();
    tokio::spawn(harness.coordinator(500).run(cancel.clone()));

    let mut raisers = tokio::task::JoinSet::new();
    for _ in 0..20 {
        let state = Arc::clone(&harness.test.state);
        raisers.spawn(async move {
            for _ in 0..5 {
                state.raise_backfill();
                tokio::task::yield_now().await;
            }
        });
    }
    raisers.join_all().await;

    assert_eventually!(harness.test.state.last_processed_block() == 3_000);
    assert_eventually!(harness.test.state.snapshot().recovery == Recovery::Idle);

    // a single walker produces consecutive, non-overlapping requests
    let calls = harness.chain.calls();
    assert_eq!(calls.first(), Some(&(1_001, 1_100)));
    assert!(calls.windows(2).all(|pair| pair[1].0 == pair[0].1 + 1));
    assert_eq!(calls.last(), Some(&(2_901, 3_000)));

    let stats = harness.test.state.snapshot().stats;
    assert_eq!(stats.signals_raised + stats.signals_coalesced, 100);
    assert!(stats.signals_coalesced > 0);
    cancel.cancel();
}

#[tokio::test]
async fn oversized_ranges_are_halved_until_accepted() -> anyhow::Result<()> {
    let harness = Harness::with_engine(100, 0, DedupEngine::default(), 100);
    harness.chain.set_range_limit(Some(25));
    harness.chain.push_logs((1..=100).step_by(7).map(|block| log_at(block, block, 0)));

    let report =
        harness.executor.fetch(1, 100, &harness.test.processor, &CancellationToken::new()).await?;

    assert!(report.is_complete());
    assert!(report.skipped.is_empty());
    assert_eq!(report.accepted, 15);
    assert_eq!(
        harness.chain.calls(),
        vec![(1, 100), (1, 50), (1, 25), (26, 50), (51, 100), (51, 75), (76, 100)]
    );
    Ok(())
}

#[tokio::test]
async fn halving_terminates_when_every_range_is_rejected() -> anyhow::Result<()> {
    let harness = Harness::with_engine(100, 0, DedupEngine::default(), 16);
    harness.chain.set_range_limit(Some(0));

    let report =
        harness.executor.fetch(1, 16, &harness.test.processor, &CancellationToken::new()).await?;

    assert_eq!(report.skipped, (1..=16).collect::<Vec<_>>());
    assert_eq!(harness.chain.calls().len(), 31);
    assert_eq!(report.completed_through(), 16);
    Ok(())
}

#[tokio::test]
async fn failed_backfill_is_retried_until_it_completes() {
    let harness = Harness::new(3_000, 1_000);
    harness.chain.fail_range(2_500..=2_500);
    let cancel = CancellationToken::new();
    tokio::spawn(harness.coordinator(1_000).run(cancel.clone()));

    harness.test.state.raise_backfill();
    assert_eventually!(harness.test.state.last_processed_block() == 2_400);
    harness.chain.clear_failures();

    assert_eventually!(harness.test.state.last_processed_block() == 3_000);
    assert!(harness.test.state.snapshot().stats.recoveries_completed >= 2);
    cancel.cancel();
}
