use std::time::Duration;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio::time::interval;
use tracing::{debug, info};

use super::MemoryBackend;
use crate::{JobEvent, JobId};

/// Reclaims jobs whose worker died or stalled past the lease deadline.
pub struct LeaseReaper {
    backend: MemoryBackend,
    interval: Duration,
}

impl LeaseReaper {
    pub fn new(backend: MemoryBackend) -> Self {
        Self {
            backend,
            interval: Duration::from_secs(30),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Tick until `shutdown` fires.
    pub async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = interval(self.interval);
        info!(interval = ?self.interval, "lease reaper started");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let reclaimed = self.reap_expired_leases();
                    if reclaimed > 0 {
                        info!(reclaimed, "reclaimed expired leases");
                    } else {
                        debug!("no expired leases");
                    }
                }
            }
        }

        info!("lease reaper stopped");
    }

    /// Put every expired lease back in line. Returns how many were reclaimed.
    pub fn reap_expired_leases(&self) -> usize {
        let now = Utc::now();
        let reclaimed: Vec<(JobId, String)> = {
            let mut jobs = self.backend.jobs.write();
            jobs.values_mut()
                .filter(|record| record.lease_expired(now))
                .map(|record| {
                    record.reclaim();
                    (record.job_id.clone(), record.message.queue.clone())
                })
                .collect()
        };

        for (job_id, queue) in &reclaimed {
            debug!(job_id = %job_id, "reclaiming expired lease");
            self.backend.requeue(job_id, queue);
            self.backend.emit(JobEvent::LeaseExpired {
                job_id: job_id.clone(),
                at: now,
            });
        }

        reclaimed.len()
    }
}
