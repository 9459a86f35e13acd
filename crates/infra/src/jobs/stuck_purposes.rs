use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use calculaud_purposes::{StuckPolicy, StuckReport};

use crate::store::{ProcurementStore, StoreResult};

/// One pass of the stuck-purpose rule: load candidates, pick the stuck ones
/// and flag them in a single store call.
#[instrument(skip(store), fields(threshold_days = policy.threshold_days), err)]
pub async fn run_stuck_scan(
    store: &dyn ProcurementStore,
    policy: StuckPolicy,
    now: DateTime<Utc>,
) -> StoreResult<StuckReport> {
    let candidates = store.load_purposes(&StuckPolicy::candidate_filter()).await?;
    let stuck = policy.find_stuck(candidates.iter(), now);
    let flagged = store.flag_purposes(&stuck, now).await?;

    let report = StuckReport {
        checked: candidates.len(),
        flagged: flagged as usize,
        flagged_ids: stuck,
        threshold_days: policy.threshold_days,
    };
    info!(
        checked = report.checked,
        flagged = report.flagged,
        flagged_ids = ?report.flagged_ids,
        "stuck purpose scan finished"
    );
    Ok(report)
}

/// Config for the periodic in-process scan.
#[derive(Debug, Clone)]
pub struct StuckPurposeRunner {
    pub interval: Duration,
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub policy: StuckPolicy,
}

impl Default for StuckPurposeRunner {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 60 * 60),
            max_retries: 5,
            base_backoff: Duration::from_millis(250),
            policy: StuckPolicy::default(),
        }
    }
}

/// Handle for the running scan task.
#[derive(Debug)]
pub struct StuckPurposeRunnerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl StuckPurposeRunnerHandle {
    /// Stop the task and wait for an in-flight scan to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            warn!(error = %e, "stuck purpose runner task ended abnormally");
        }
    }
}

impl StuckPurposeRunner {
    pub fn new(interval: Duration, policy: StuckPolicy) -> Self {
        Self {
            interval,
            policy,
            ..Self::default()
        }
    }

    /// Spawn the scan loop on the current tokio runtime.
    ///
    /// - Schedule: once at startup, then every `interval`
    /// - Failures: logged and retried with bounded exponential backoff; a
    ///   run that exhausts its retries waits for the next tick
    pub fn spawn(&self, store: Arc<dyn ProcurementStore>) -> StuckPurposeRunnerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let cfg = self.clone();
        let join = tokio::spawn(runner_loop(cfg, store, shutdown_rx));
        StuckPurposeRunnerHandle {
            shutdown: shutdown_tx,
            join,
        }
    }
}

async fn runner_loop(
    cfg: StuckPurposeRunner,
    store: Arc<dyn ProcurementStore>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(interval_secs = cfg.interval.as_secs(), "stuck purpose runner started");

    let mut ticker = tokio::time::interval(cfg.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    'outer: loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown_rx.changed() => break,
        }

        let mut failures: u32 = 0;
        loop {
            match run_stuck_scan(store.as_ref(), cfg.policy, Utc::now()).await {
                Ok(_) => break,
                Err(e) => {
                    failures += 1;
                    warn!(error = %e, attempt = failures, "stuck purpose scan failed");
                    if failures > cfg.max_retries {
                        break;
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(backoff(cfg.base_backoff, failures)) => {}
                        _ = shutdown_rx.changed() => break 'outer,
                    }
                }
            }
        }
    }

    info!("stuck purpose runner stopped");
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    // Exponential backoff: base * 2^(attempt-1), capped.
    let pow = 1u32 << attempt.saturating_sub(1).min(10);
    let ms = base.as_millis().saturating_mul(pow as u128);
    Duration::from_millis(ms.min(10_000) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use calculaud_purposes::{NewEmf, NewPurpose, PurposeFilter, PurposeStatus};
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn scan_flags_only_stale_live_purposes() {
        let store = InMemoryStore::new();
        let stale = store.create_purpose(&NewPurpose::default(), at(1), None).await.unwrap();
        let completed = NewPurpose {
            status: PurposeStatus::Completed,
            ..NewPurpose::default()
        };
        store.create_purpose(&completed, at(1), None).await.unwrap();
        let recent = store.create_purpose(&NewPurpose::default(), at(1), None).await.unwrap();
        let emf = NewEmf {
            emf_id: "E-9".into(),
            ..NewEmf::default()
        };
        store.create_emf(recent.purpose.id, emf, at(20)).await.unwrap();

        let report = run_stuck_scan(&store, StuckPolicy::new(10), at(25)).await.unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(report.flagged, 1);
        assert_eq!(report.flagged_ids, vec![stale.purpose.id]);

        let flagged = PurposeFilter {
            is_flagged: Some(true),
            ..PurposeFilter::default()
        };
        assert_eq!(store.load_purposes(&flagged).await.unwrap().len(), 1);

        // Flagged purposes are no longer candidates.
        let again = run_stuck_scan(&store, StuckPolicy::new(10), at(26)).await.unwrap();
        assert_eq!(again.checked, 1);
        assert_eq!(again.flagged, 0);
    }

    #[tokio::test]
    async fn runner_scans_on_start_and_shuts_down() {
        let store = Arc::new(InMemoryStore::new());
        store
            .create_purpose(&NewPurpose::default(), Utc::now() - chrono::Duration::days(30), None)
            .await
            .unwrap();

        let runner = StuckPurposeRunner::new(Duration::from_secs(3600), StuckPolicy::default());
        let handle = runner.spawn(store.clone());

        let filter = PurposeFilter {
            is_flagged: Some(true),
            ..PurposeFilter::default()
        };
        let mut flagged = 0;
        for _ in 0..50 {
            flagged = store.load_purposes(&filter).await.unwrap().len();
            if flagged == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(flagged, 1);
        handle.shutdown().await;
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let base = Duration::from_millis(250);
        assert_eq!(backoff(base, 1), Duration::from_millis(250));
        assert_eq!(backoff(base, 3), Duration::from_millis(1000));
        assert_eq!(backoff(base, 20), Duration::from_millis(10_000));
    }
}
