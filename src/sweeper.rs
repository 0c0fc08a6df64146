// Periodic background maintenance owned by a component

use std::{sync::Weak, time::Duration};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval_at, MissedTickBehavior},
};

use crate::context::instant_after;

// First sweep runs one full period after spawn. The task also exits once
// the swept component is gone.
#[derive(Debug)]
pub struct Sweeper {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    pub fn spawn<T, F>(name: &'static str, period: Duration, target: Weak<T>, sweep: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> usize + Send + 'static,
    {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(instant_after(period), period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            tracing::debug!(
                sweeper = name,
                period_ms = period.as_millis() as u64,
                "sweeper started"
            );

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let Some(component) = target.upgrade() else {
                            break;
                        };

                        let removed = sweep(&component);
                        if removed > 0 {
                            tracing::debug!(sweeper = name, removed, "sweep evicted entries");
                        }
                    }
                }
            }

            tracing::debug!(sweeper = name, "sweeper stopped");
        });

        Self {
            name,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub async fn stop(mut self) {
        self.shutdown.send_replace(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
