//! Background container garbage collection.
//!
//! The reaper is the safety net for everything the orchestrator misses:
//! orphaned containers whose sessions were never deleted, containers whose
//! store TTL lapsed while they kept running, and leftovers from a process
//! restarted mid-create. One sweep runs at a time; individual failures are
//! logged and never abort the sweep.

use crate::config::Settings;
use crate::container::{CREATED_AT_LABEL, Runtime, SESSION_LABEL, orchestrator::short_id};
use crate::store::SessionStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Age-based sandbox reclamation task.
pub struct Reaper {
    runtime: Arc<dyn Runtime>,
    store: SessionStore,
    interval: Duration,
    max_age_seconds: i64,
}

impl Reaper {
    pub fn new(runtime: Arc<dyn Runtime>, store: SessionStore, settings: &Settings) -> Self {
        Self {
            runtime,
            store,
            interval: Duration::from_secs(settings.cleanup_interval_seconds.max(1)),
            max_age_seconds: settings.cleanup_max_container_age_seconds,
        }
    }

    /// Run the periodic sweep until `shutdown` fires.
    ///
    /// The sweep is awaited inline, so at most one is in flight; a sweep
    /// that overruns the interval delays the next tick instead of stacking.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                interval_seconds = self.interval.as_secs(),
                max_container_age_seconds = self.max_age_seconds,
                "Reaper started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.sweep().await;
                        if removed > 0 {
                            info!(removed, "Reaper sweep complete");
                        }
                    }
                    _ = shutdown.changed() => {
                        info!("Reaper shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Remove every labelled container past the age ceiling, together with
    /// its store record. Returns the number reclaimed.
    pub async fn sweep(&self) -> usize {
        let containers = match self.runtime.list_labelled(SESSION_LABEL).await {
            Ok(containers) => containers,
            Err(e) => {
                warn!("Reaper could not list containers: {}", e);
                return 0;
            }
        };

        let now = Utc::now();
        let mut removed = 0;

        for container in containers {
            let Some(age) = container_age_seconds(&container.labels, now) else {
                continue;
            };
            if age < self.max_age_seconds {
                continue;
            }

            let session_id = container.labels.get(SESSION_LABEL).cloned();
            if let Err(e) = self.runtime.remove(&container.id, true).await {
                warn!(
                    container_id = short_id(&container.id),
                    "Reaper failed to remove container: {}", e
                );
                continue;
            }
            if let Some(ref session_id) = session_id {
                if let Err(e) = self.store.delete(session_id).await {
                    warn!(%session_id, "Reaper failed to clear session record: {}", e);
                }
            }

            removed += 1;
            info!(
                container_id = short_id(&container.id),
                session_id = session_id.as_deref().unwrap_or(""),
                age_seconds = age,
                "Removed expired container"
            );
        }

        removed
    }
}

/// Age in seconds from the `created_at` label; `None` when the label is
/// missing or unparseable (such containers are skipped, never destroyed).
fn container_age_seconds(labels: &HashMap<String, String>, now: DateTime<Utc>) -> Option<i64> {
    let created_at = labels.get(CREATED_AT_LABEL)?;
    let created_at = DateTime::parse_from_rfc3339(created_at).ok()?;
    Some((now - created_at.with_timezone(&Utc)).num_seconds())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn labels(created_at: Option<&str>) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        labels.insert(SESSION_LABEL.to_string(), "s1".to_string());
        if let Some(ts) = created_at {
            labels.insert(CREATED_AT_LABEL.to_string(), ts.to_string());
        }
        labels
    }

    #[test]
    fn test_age_from_label() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let age =
            container_age_seconds(&labels(Some("2026-01-01T11:45:00+00:00")), now).unwrap();
        assert_eq!(age, 900);
    }

    #[test]
    fn test_age_accepts_zulu_suffix() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 1, 0).unwrap();
        let age = container_age_seconds(&labels(Some("2026-01-01T00:00:00Z")), now).unwrap();
        assert_eq!(age, 60);
    }

    #[test]
    fn test_missing_or_bad_label_is_skipped() {
        let now = Utc::now();
        assert!(container_age_seconds(&labels(None), now).is_none());
        assert!(container_age_seconds(&labels(Some("yesterday")), now).is_none());
    }

    #[test]
    fn test_future_created_at_is_not_eligible() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let age = container_age_seconds(&labels(Some("2026-01-01T01:00:00+00:00")), now).unwrap();
        assert!(age < 0);
    }
}
