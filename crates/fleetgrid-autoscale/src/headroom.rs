//! Headroom policy: derive a scaling signal from pool capacity.
//!
//! The policy is recomputed whenever the observed host count or container
//! count changes. Signals go out through a [`SignalSink`] callback; the
//! sink decides what HOT/COLD actually mean for the fleet.

use std::time::Duration;

use fleetgrid_core::HeadroomConfig;
use fleetgrid_core::config::DEFAULT_MAX_CONTAINERS;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub type HeadroomResult<T> = Result<T, HeadroomError>;

#[derive(Debug, Error, PartialEq)]
pub enum HeadroomError {
    #[error("headroom configuration error: {0}")]
    Configuration(String),
}

/// Callback type for publishing scale signals.
pub type SignalSink = Box<dyn Fn(HeadroomReport) -> BoxFuture + Send + Sync>;

type BoxFuture = std::pin::Pin<
    Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
>;

/// Target spare capacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Headroom {
    /// Absolute number of free containers.
    Count(u32),
    /// Fraction of possible containers, in (0, 1).
    Percent(f64),
}

impl Headroom {
    pub fn from_config(config: &HeadroomConfig) -> HeadroomResult<Self> {
        match (config.count, config.percent) {
            (Some(_), Some(_)) => Err(HeadroomError::Configuration(
                "set either headroom count or percent, not both".to_string(),
            )),
            (None, None) => Err(HeadroomError::Configuration(
                "headroom count or percent must be set".to_string(),
            )),
            (Some(0), None) => Err(HeadroomError::Configuration(
                "headroom count must be positive".to_string(),
            )),
            (Some(count), None) => Ok(Self::Count(count)),
            (None, Some(p)) if p > 0.0 && p < 1.0 => Ok(Self::Percent(p)),
            (None, Some(p)) => Err(HeadroomError::Configuration(format!(
                "headroom percent {p} must be within (0, 1)"
            ))),
        }
    }

    /// Containers to keep free for a pool of `possible` containers.
    pub fn containers(&self, possible: u64) -> i64 {
        match *self {
            Self::Count(n) => i64::from(n),
            Self::Percent(p) => (p * possible as f64).ceil() as i64,
        }
    }
}

/// Per-host cap: the placement strategy's setting, else the global one,
/// else the built-in default.
pub fn resolve_max_containers(strategy: Option<u32>, global: Option<u32>) -> u32 {
    strategy.or(global).unwrap_or(DEFAULT_MAX_CONTAINERS)
}

/// Inputs for one recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeadroomSnapshot {
    pub max_containers: u32,
    pub host_count: u32,
    pub container_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalKind {
    Hot,
    Ok,
    Cold,
}

/// The event handed to the external autoscaler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScaleSignal {
    pub kind: SignalKind,
    /// Current host count.
    pub pool_size: u32,
    /// Current container count.
    pub workrate: u32,
    /// Per-host container cap.
    pub low: u32,
    /// Possible containers across the pool.
    pub high: u64,
}

/// Derived figures published with every recompute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeadroomStatus {
    pub possible: u64,
    pub available: i64,
    pub headroom: i64,
    pub containers_needed: i64,
    /// `container_count / possible`.
    pub utilisation: f64,
    /// Utilisation below which the pool has more than a host to spare.
    pub low_threshold: f64,
    /// Utilisation above which headroom is exhausted.
    pub high_threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeadroomReport {
    pub signal: ScaleSignal,
    pub status: HeadroomStatus,
}

/// Compares available capacity against a headroom target.
pub struct HeadroomPolicy {
    headroom: Headroom,
    max_containers: u32,
    emit_cold: bool,
    sink: Option<SignalSink>,
}

impl HeadroomPolicy {
    pub fn new(headroom: Headroom, max_containers: u32) -> Self {
        Self {
            headroom,
            max_containers,
            emit_cold: false,
            sink: None,
        }
    }

    /// Build a policy from configuration. `strategy_cap` is the per-host cap
    /// configured on the placement strategy, if any.
    pub fn from_config(config: &HeadroomConfig, strategy_cap: Option<u32>) -> HeadroomResult<Self> {
        let headroom = Headroom::from_config(config)?;
        let max_containers = resolve_max_containers(strategy_cap, config.max_containers);
        if max_containers == 0 {
            return Err(HeadroomError::Configuration(
                "max containers per host must be positive".to_string(),
            ));
        }
        Ok(Self::new(headroom, max_containers).with_cold(config.emit_cold))
    }

    pub fn with_cold(mut self, emit_cold: bool) -> Self {
        self.emit_cold = emit_cold;
        self
    }

    /// Set the callback used to publish signals.
    pub fn with_sink(mut self, sink: SignalSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn max_containers(&self) -> u32 {
        self.max_containers
    }

    pub fn headroom(&self) -> Headroom {
        self.headroom
    }

    pub fn snapshot(&self, host_count: u32, container_count: u32) -> HeadroomSnapshot {
        HeadroomSnapshot {
            max_containers: self.max_containers,
            host_count,
            container_count,
        }
    }

    /// Evaluate one snapshot.
    pub fn evaluate(&self, snapshot: &HeadroomSnapshot) -> HeadroomReport {
        let max = i64::from(snapshot.max_containers);
        let possible = u64::from(snapshot.max_containers) * u64::from(snapshot.host_count);
        let available = possible as i64 - i64::from(snapshot.container_count);
        let headroom = self.headroom.containers(possible);
        let needed = headroom - available;

        let (utilisation, low_threshold, high_threshold) = if possible == 0 {
            let busy = if snapshot.container_count > 0 { 1.0 } else { 0.0 };
            (busy, 0.0, 0.0)
        } else {
            let p = possible as f64;
            (
                f64::from(snapshot.container_count) / p,
                ((p - (headroom + max) as f64) / p).max(0.0),
                (p - headroom as f64) / p,
            )
        };

        let kind = if needed > 0 {
            SignalKind::Hot
        } else if self.emit_cold && available > headroom + max {
            SignalKind::Cold
        } else {
            SignalKind::Ok
        };

        HeadroomReport {
            signal: ScaleSignal {
                kind,
                pool_size: snapshot.host_count,
                workrate: snapshot.container_count,
                low: snapshot.max_containers,
                high: possible,
            },
            status: HeadroomStatus {
                possible,
                available,
                headroom,
                containers_needed: needed,
                utilisation,
                low_threshold,
                high_threshold,
            },
        }
    }

    /// Recompute from the observed counts. Returns `None` while either count
    /// is still unknown.
    pub async fn recompute(
        &self,
        host_count: Option<u32>,
        container_count: Option<u32>,
    ) -> Option<HeadroomReport> {
        let (Some(hosts), Some(containers)) = (host_count, container_count) else {
            debug!(?host_count, ?container_count, "headroom inputs unknown, skipping");
            return None;
        };

        let report = self.evaluate(&self.snapshot(hosts, containers));
        debug!(
            hosts,
            containers,
            possible = report.status.possible,
            needed = report.status.containers_needed,
            utilisation = report.status.utilisation,
            "headroom recomputed"
        );
        match report.signal.kind {
            SignalKind::Hot | SignalKind::Cold => info!(
                kind = ?report.signal.kind,
                pool_size = report.signal.pool_size,
                workrate = report.signal.workrate,
                needed = report.status.containers_needed,
                "scale signal"
            ),
            SignalKind::Ok => debug!(pool_size = hosts, workrate = containers, "pool steady"),
        }

        if let Some(ref sink) = self.sink
            && let Err(e) = sink(report).await
        {
            warn!(error = %e, "publishing scale signal failed");
        }
        Some(report)
    }

    /// Run the reactive loop until shutdown or until either count channel
    /// closes.
    pub async fn run(
        &self,
        mut hosts: watch::Receiver<Option<u32>>,
        mut containers: watch::Receiver<Option<u32>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            max_containers = self.max_containers,
            headroom = ?self.headroom,
            "headroom policy started"
        );

        loop {
            let host_count = *hosts.borrow_and_update();
            let container_count = *containers.borrow_and_update();
            self.recompute(host_count, container_count).await;

            tokio::select! {
                changed = hosts.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = containers.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = shutdown.changed() => {
                    info!("headroom policy shutting down");
                    break;
                }
            }
        }
    }

    /// Poll `read_counts` on a fixed interval and feed the results through
    /// [`recompute`](Self::recompute) until shutdown.
    pub async fn run_polling<F>(
        &self,
        interval: Duration,
        mut read_counts: F,
        mut shutdown: watch::Receiver<bool>,
    ) where
        F: FnMut() -> anyhow::Result<(Option<u32>, Option<u32>)>,
    {
        info!(interval_secs = interval.as_secs(), "headroom polling started");

        loop {
            match read_counts() {
                Ok((hosts, containers)) => {
                    self.recompute(hosts, containers).await;
                }
                Err(e) => tracing::error!(error = %e, "reading pool counts failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    info!("headroom polling shutting down");
                    break;
                }
            }
        }
    }
}
