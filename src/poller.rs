//! Fixed-interval poll of the stats command, feeding the speed panel.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::error::Result;
use crate::hosts;
use crate::models::domain::{IpFamily, PollResponse};
use crate::source::{DatasetCommand, StatsSource};
use crate::view::{SpeedView, View};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Auxiliary refreshes run at the start of every cycle.
#[derive(Debug, Clone)]
pub struct RefreshOptions {
    pub leases: Option<PathBuf>,
    pub dataset: Option<DatasetCommand>,
    pub resolve: bool,
    pub resolve_timeout: Duration,
    pub resolve_limit: usize,
    /// How long an address whose lookup failed is left alone.
    pub resolve_retry: Duration,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            leases: None,
            dataset: None,
            resolve: false,
            resolve_timeout: Duration::from_millis(1000),
            resolve_limit: 1000,
            resolve_retry: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub ipv4_rows: Option<usize>,
    pub ipv6_rows: Option<usize>,
}

type Observer = Arc<dyn Fn() + Send + Sync>;

pub struct Poller<S, V: View> {
    source: Arc<S>,
    view: Arc<Mutex<SpeedView<V>>>,
    refresh: RefreshOptions,
    observer: Option<Observer>,
}

impl<S, V> Poller<S, V>
where
    S: StatsSource + 'static,
    V: View + Send + 'static,
    V::Chart: Send,
{
    pub fn new(source: S, view: Arc<Mutex<SpeedView<V>>>) -> Self {
        Self {
            source: Arc::new(source),
            view,
            refresh: RefreshOptions::default(),
            observer: None,
        }
    }

    pub fn with_refresh(mut self, refresh: RefreshOptions) -> Self {
        self.refresh = refresh;
        self
    }

    /// Called after every cycle that rendered something.
    pub fn on_cycle(mut self, observer: impl Fn() + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// One poll: both families are fetched concurrently, and a failure of
    /// either skips rendering for the whole cycle.
    pub async fn poll_cycle(&self) -> Result<CycleReport> {
        self.refresh_sources().await;

        let fetched = futures::try_join!(
            self.source.fetch(IpFamily::Ipv4),
            self.source.fetch(IpFamily::Ipv6)
        );
        let (ipv4, ipv6) = match fetched {
            Ok(results) => results,
            Err(e) => {
                tracing::error!(error = %e, "error polling data");
                return Err(e);
            }
        };

        let report = {
            let mut view = self.view.lock().await;
            CycleReport {
                ipv4_rows: view.render_host_speed(&or_empty(ipv4), IpFamily::Ipv4),
                ipv6_rows: view.render_host_speed(&or_empty(ipv6), IpFamily::Ipv6),
            }
        };

        if let Some(observer) = &self.observer {
            observer();
        }

        if self.refresh.resolve {
            self.resolve_names().await;
        }

        Ok(report)
    }

    /// Starts polling every `interval` until the returned handle is stopped.
    pub fn spawn(self, interval: Duration) -> PollerHandle {
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            while running_clone.load(Ordering::SeqCst) {
                ticker.tick().await;
                if !running_clone.load(Ordering::SeqCst) {
                    break;
                }
                // errors are already logged; the next tick retries
                let _ = self.poll_cycle().await;
            }
            tracing::debug!("poller stopped");
        });

        PollerHandle { running, task }
    }

    async fn refresh_sources(&self) {
        if let Some(path) = &self.refresh.leases {
            let mut view = self.view.lock().await;
            if let Err(e) = view.hosts_mut().load_leases(path) {
                tracing::debug!(path = %path.display(), error = %e, "host leases unavailable");
            }
        }

        if let Some(command) = &self.refresh.dataset {
            match command.load().await {
                Ok(dataset) => {
                    tracing::trace!(rows = dataset.len(), "traffic dataset refreshed");
                    self.view.lock().await.set_dataset(dataset);
                }
                Err(e) => tracing::warn!(error = %e, "failed to refresh traffic dataset"),
            }
        }
    }

    async fn resolve_names(&self) {
        let pending = {
            let view = self.view.lock().await;
            view.hosts().unnamed(view.seen_ips())
        };
        if pending.is_empty() {
            return;
        }

        let names = hosts::resolve_reverse(
            pending.clone(),
            self.refresh.resolve_timeout,
            self.refresh.resolve_limit,
        )
        .await;
        self.learn_names(pending, names).await;
    }

    /// Stores resolved names. Addresses left without one are not looked up
    /// again before `resolve_retry` has passed.
    async fn learn_names(&self, pending: Vec<IpAddr>, mut names: HashMap<IpAddr, String>) {
        let retry_at = Instant::now() + self.refresh.resolve_retry;
        let mut view = self.view.lock().await;
        let directory = view.hosts_mut();

        let learned = names.len();
        for addr in pending {
            match names.remove(&addr) {
                Some(name) => directory.insert_name(addr.to_string(), name),
                None => directory.mark_unresolved(addr.to_string(), retry_at),
            }
        }
        tracing::debug!(resolved = learned, "reverse DNS names learned");
    }
}

fn or_empty(value: Value) -> Value {
    if value.is_null() {
        serde_json::to_value(PollResponse::empty()).unwrap_or(value)
    } else {
        value
    }
}

/// Running poll task. Dropping it leaves the task running; call [`stop`](Self::stop).
pub struct PollerHandle {
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    /// Stops polling, cancelling a cycle that is still in flight.
    pub async fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        self.task.abort();
        // a cancelled task reports JoinError::Cancelled
        let _ = self.task.await;
    }
}
