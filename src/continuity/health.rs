//! Health checks - per-service probes with rolling snapshots
//!
//! Each monitored service is probed on its configured interval. A probe
//! records status, latency and error; `degraded` is produced by the
//! latency threshold. Rolling 1h/24h snapshots aggregate counts and
//! average latency.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ContinuityConfig;
use crate::types::{HealthSnapshot, ProbeResult, ServiceStatus};

/// A probe implementation for one service class.
#[async_trait]
pub trait ServiceProbe: Send + Sync {
    /// Measure the service; returns latency on success, error text on
    /// failure. The health service grades the result.
    async fn probe(&self) -> Result<f64, String>;
}

/// Probe that always succeeds with a fixed latency; tests and local runs.
pub struct StaticProbe {
    pub latency_ms: f64,
}

#[async_trait]
impl ServiceProbe for StaticProbe {
    async fn probe(&self) -> Result<f64, String> {
        Ok(self.latency_ms)
    }
}

/// Tracked state of one monitored service.
#[derive(Debug, Clone)]
pub struct ServiceHealth {
    pub service_id: String,
    pub service_name: String,
    pub status: ServiceStatus,
    pub latency_ms: f64,
    pub last_check: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub error_message: Option<String>,
}

/// Health-check service: probe registration, grading and snapshots.
pub struct HealthCheckService {
    config: ContinuityConfig,
    probes: HashMap<String, Arc<dyn ServiceProbe>>,
    services: HashMap<String, ServiceHealth>,
    probe_log: VecDeque<ProbeResult>,
    snapshots_1h: VecDeque<HealthSnapshot>,
    snapshots_24h: VecDeque<HealthSnapshot>,
}

const PROBE_LOG_SIZE: usize = 10_000;
const SNAPSHOT_WINDOW: usize = 288;

impl HealthCheckService {
    pub fn new(config: ContinuityConfig) -> Self {
        Self {
            config,
            probes: HashMap::new(),
            services: HashMap::new(),
            probe_log: VecDeque::with_capacity(PROBE_LOG_SIZE),
            snapshots_1h: VecDeque::with_capacity(SNAPSHOT_WINDOW),
            snapshots_24h: VecDeque::with_capacity(SNAPSHOT_WINDOW),
        }
    }

    /// Register a service with its probe.
    pub fn register(&mut self, service_id: &str, service_name: &str, probe: Arc<dyn ServiceProbe>) {
        self.probes.insert(service_id.to_string(), probe);
        self.services.insert(
            service_id.to_string(),
            ServiceHealth {
                service_id: service_id.to_string(),
                service_name: service_name.to_string(),
                status: ServiceStatus::Offline,
                latency_ms: 0.0,
                last_check: None,
                last_success: None,
                consecutive_failures: 0,
                consecutive_successes: 0,
                error_message: None,
            },
        );
    }

    pub fn probe_interval(&self, service_id: &str) -> u64 {
        self.config
            .probe_interval_overrides
            .get(service_id)
            .copied()
            .unwrap_or(self.config.probe_interval_secs)
    }

    /// Probe one service and record the result.
    pub async fn check(&mut self, service_id: &str) -> Option<ProbeResult> {
        let probe = self.probes.get(service_id)?.clone();
        let outcome = probe.probe().await;
        Some(self.record(service_id, outcome))
    }

    /// Record an externally-observed probe outcome. Grading:
    /// success below the latency threshold is healthy, above is degraded;
    /// failure is unhealthy.
    pub fn record(&mut self, service_id: &str, outcome: Result<f64, String>) -> ProbeResult {
        let now = Utc::now();
        let (status, latency_ms, error) = match outcome {
            Ok(latency) if latency <= self.config.degraded_latency_ms => {
                (ServiceStatus::Healthy, latency, None)
            }
            Ok(latency) => (ServiceStatus::Degraded, latency, None),
            Err(e) => (ServiceStatus::Unhealthy, 0.0, Some(e)),
        };

        if let Some(service) = self.services.get_mut(service_id) {
            service.status = status;
            service.latency_ms = latency_ms;
            service.last_check = Some(now);
            service.error_message = error.clone();
            if status.is_failing() {
                service.consecutive_failures += 1;
                service.consecutive_successes = 0;
                warn!(
                    service_id,
                    failures = service.consecutive_failures,
                    error = error.as_deref().unwrap_or("-"),
                    "Service probe failing"
                );
            } else {
                service.consecutive_failures = 0;
                service.consecutive_successes += 1;
                service.last_success = Some(now);
                debug!(service_id, latency_ms, status = %status, "Probe ok");
            }
        }

        let result = ProbeResult {
            service_id: service_id.to_string(),
            status,
            latency_ms,
            timestamp: now,
            error,
        };
        if self.probe_log.len() >= PROBE_LOG_SIZE {
            self.probe_log.pop_front();
        }
        self.probe_log.push_back(result.clone());
        result
    }

    pub fn service(&self, service_id: &str) -> Option<&ServiceHealth> {
        self.services.get(service_id)
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceHealth> {
        self.services.values()
    }

    /// Current aggregate snapshot over all services.
    pub fn snapshot(&self) -> HealthSnapshot {
        let mut healthy = 0;
        let mut degraded = 0;
        let mut unhealthy = 0;
        let mut offline = 0;
        let mut latency_sum = 0.0;
        for s in self.services.values() {
            match s.status {
                ServiceStatus::Healthy => healthy += 1,
                ServiceStatus::Degraded => degraded += 1,
                ServiceStatus::Unhealthy => unhealthy += 1,
                ServiceStatus::Offline => offline += 1,
            }
            latency_sum += s.latency_ms;
        }
        let n = self.services.len();
        let overall = if unhealthy + offline > 0 {
            ServiceStatus::Unhealthy
        } else if degraded > 0 {
            ServiceStatus::Degraded
        } else {
            ServiceStatus::Healthy
        };
        HealthSnapshot {
            snapshot_id: format!("snap-{}", Uuid::new_v4().simple()),
            timestamp: Utc::now(),
            overall_status: overall,
            healthy_count: healthy,
            degraded_count: degraded,
            unhealthy_count: unhealthy,
            offline_count: offline,
            avg_latency_ms: if n == 0 { 0.0 } else { latency_sum / n as f64 },
        }
    }

    /// Roll the current snapshot into the 1h/24h windows.
    pub fn roll_snapshot(&mut self) {
        let snap = self.snapshot();
        if self.snapshots_1h.len() >= SNAPSHOT_WINDOW {
            self.snapshots_1h.pop_front();
        }
        self.snapshots_1h.push_back(snap.clone());

        let day_old = Utc::now() - Duration::hours(24);
        self.snapshots_24h.retain(|s| s.timestamp >= day_old);
        self.snapshots_24h.push_back(snap);
    }

    pub fn snapshots_1h(&self) -> Vec<&HealthSnapshot> {
        let hour_old = Utc::now() - Duration::hours(1);
        self.snapshots_1h
            .iter()
            .filter(|s| s.timestamp >= hour_old)
            .collect()
    }

    pub fn snapshots_24h(&self) -> Vec<&HealthSnapshot> {
        self.snapshots_24h.iter().collect()
    }

    /// Uptime percentage per service over the probe log.
    pub fn uptime_report(&self) -> HashMap<String, f64> {
        let mut totals: HashMap<String, (u32, u32)> = HashMap::new();
        for probe in &self.probe_log {
            let entry = totals.entry(probe.service_id.clone()).or_insert((0, 0));
            entry.1 += 1;
            if !probe.status.is_failing() {
                entry.0 += 1;
            }
        }
        totals
            .into_iter()
            .map(|(id, (up, total))| {
                (id, if total == 0 { 0.0 } else { f64::from(up) / f64::from(total) * 100.0 })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> HealthCheckService {
        HealthCheckService::new(ContinuityConfig::default())
    }

    #[tokio::test]
    async fn healthy_probe_records_latency() {
        let mut svc = service();
        svc.register("es", "elasticsearch", Arc::new(StaticProbe { latency_ms: 20.0 }));
        let result = svc.check("es").await.unwrap();
        assert_eq!(result.status, ServiceStatus::Healthy);
        assert!((result.latency_ms - 20.0).abs() < f64::EPSILON);
        assert_eq!(svc.service("es").unwrap().consecutive_successes, 1);
    }

    #[test]
    fn slow_probe_grades_degraded() {
        let mut svc = service();
        svc.register("db", "postgres", Arc::new(StaticProbe { latency_ms: 0.0 }));
        let result = svc.record("db", Ok(5000.0));
        assert_eq!(result.status, ServiceStatus::Degraded);
    }

    #[test]
    fn failures_count_consecutively_and_reset() {
        let mut svc = service();
        svc.register("db", "postgres", Arc::new(StaticProbe { latency_ms: 0.0 }));
        svc.record("db", Err("conn refused".into()));
        svc.record("db", Err("conn refused".into()));
        assert_eq!(svc.service("db").unwrap().consecutive_failures, 2);
        svc.record("db", Ok(10.0));
        let s = svc.service("db").unwrap();
        assert_eq!(s.consecutive_failures, 0);
        assert_eq!(s.consecutive_successes, 1);
    }

    #[test]
    fn snapshot_aggregates_counts() {
        let mut svc = service();
        svc.register("a", "a", Arc::new(StaticProbe { latency_ms: 0.0 }));
        svc.register("b", "b", Arc::new(StaticProbe { latency_ms: 0.0 }));
        svc.record("a", Ok(10.0));
        svc.record("b", Err("down".into()));

        let snap = svc.snapshot();
        assert_eq!(snap.healthy_count, 1);
        assert_eq!(snap.unhealthy_count, 1);
        assert_eq!(snap.overall_status, ServiceStatus::Unhealthy);
    }

    #[test]
    fn uptime_report_reflects_probe_log() {
        let mut svc = service();
        svc.register("a", "a", Arc::new(StaticProbe { latency_ms: 0.0 }));
        svc.record("a", Ok(10.0));
        svc.record("a", Ok(10.0));
        svc.record("a", Err("down".into()));
        let report = svc.uptime_report();
        let uptime = report["a"];
        assert!((uptime - 66.666).abs() < 0.1, "got {uptime}");
    }
}
