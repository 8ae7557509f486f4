//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the rally-point matchmaking
//! service using Prometheus metrics.

use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::Duration;

/// Main metrics collector for the matchmaking service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Queue-related metrics
    queue_metrics: QueueMetrics,

    /// Matchmaking pass metrics
    match_metrics: MatchMetrics,

    /// Instance-related metrics
    instance_metrics: InstanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Queue-related metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Total join operations accepted
    pub joins_total: IntCounter,

    /// Total explicit leaves
    pub leaves_total: IntCounter,

    /// Entries evicted by expiry sweeps
    pub entries_expired_total: IntCounter,

    /// Current queue depth
    pub queue_depth: IntGauge,
}

/// Matchmaking pass metrics
#[derive(Clone)]
pub struct MatchMetrics {
    /// Total passes run
    pub passes_total: IntCounter,

    /// Groups formed, labelled by tier
    pub groups_formed_total: IntCounterVec,

    /// Commits that aborted before launching
    pub commit_aborts_total: IntCounter,

    /// Pass duration distribution
    pub pass_duration_seconds: Histogram,
}

/// Instance-related metrics
#[derive(Clone)]
pub struct InstanceMetrics {
    /// Total instances launched
    pub instances_launched_total: IntCounter,

    /// Total players consumed into instances
    pub players_matched_total: IntCounter,

    /// Group size distribution, labelled by tier
    pub group_size: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let match_metrics = MatchMetrics::new(&registry)?;
        let instance_metrics = InstanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            match_metrics,
            instance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get queue metrics
    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    /// Get matchmaking metrics
    pub fn matchmaking(&self) -> &MatchMetrics {
        &self.match_metrics
    }

    /// Get instance metrics
    pub fn instance(&self) -> &InstanceMetrics {
        &self.instance_metrics
    }

    /// Record an accepted join
    pub fn record_join(&self) {
        self.queue_metrics.joins_total.inc();
    }

    /// Record an explicit leave
    pub fn record_leave(&self) {
        self.queue_metrics.leaves_total.inc();
    }

    /// Record evicted expired entries
    pub fn record_expired(&self, count: u64) {
        self.queue_metrics.entries_expired_total.inc_by(count);
    }

    /// Record a completed pass
    pub fn record_pass(&self, duration: Duration, _groups_formed: usize) {
        self.match_metrics.passes_total.inc();
        self.match_metrics
            .pass_duration_seconds
            .observe(duration.as_secs_f64());
    }

    /// Record a committed group
    pub fn record_group_formed(&self, tier: &str, size: usize) {
        self.match_metrics
            .groups_formed_total
            .with_label_values(&[tier])
            .inc();
        self.instance_metrics.instances_launched_total.inc();
        self.instance_metrics
            .players_matched_total
            .inc_by(size as u64);
        self.instance_metrics
            .group_size
            .with_label_values(&[tier])
            .observe(size as f64);
    }

    /// Record an aborted commit
    pub fn record_commit_abort(&self) {
        self.match_metrics.commit_aborts_total.inc();
    }

    /// Update the queue depth gauge
    pub fn set_queue_depth(&self, depth: i64) {
        self.queue_metrics.queue_depth.set(depth);
    }

    /// Update overall health status (0=unhealthy, 1=degraded, 2=healthy)
    pub fn update_health_status(&self, status: i64) {
        self.service_metrics.health_status.set(status);
    }

    /// Update per-component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(if healthy { 1 } else { 0 });
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds = IntGauge::with_opts(Opts::new(
            "rally_point_uptime_seconds",
            "Service uptime in seconds",
        ))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::with_opts(Opts::new(
            "rally_point_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        ))?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new(
                "rally_point_component_health",
                "Per-component health (0=unhealthy, 1=healthy)",
            ),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let joins_total = IntCounter::with_opts(Opts::new(
            "rally_point_joins_total",
            "Total queue join operations accepted",
        ))?;
        registry.register(Box::new(joins_total.clone()))?;

        let leaves_total = IntCounter::with_opts(Opts::new(
            "rally_point_leaves_total",
            "Total explicit queue leaves",
        ))?;
        registry.register(Box::new(leaves_total.clone()))?;

        let entries_expired_total = IntCounter::with_opts(Opts::new(
            "rally_point_entries_expired_total",
            "Queue entries evicted by expiry sweeps",
        ))?;
        registry.register(Box::new(entries_expired_total.clone()))?;

        let queue_depth = IntGauge::with_opts(Opts::new(
            "rally_point_queue_depth",
            "Current number of live queue entries",
        ))?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            joins_total,
            leaves_total,
            entries_expired_total,
            queue_depth,
        })
    }
}

impl MatchMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let passes_total = IntCounter::with_opts(Opts::new(
            "rally_point_passes_total",
            "Total matchmaking passes run",
        ))?;
        registry.register(Box::new(passes_total.clone()))?;

        let groups_formed_total = IntCounterVec::new(
            Opts::new(
                "rally_point_groups_formed_total",
                "Groups committed, labelled by tier",
            ),
            &["tier"],
        )?;
        registry.register(Box::new(groups_formed_total.clone()))?;

        let commit_aborts_total = IntCounter::with_opts(Opts::new(
            "rally_point_commit_aborts_total",
            "Group commits aborted before launch",
        ))?;
        registry.register(Box::new(commit_aborts_total.clone()))?;

        let pass_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "rally_point_pass_duration_seconds",
            "Matchmaking pass duration in seconds",
        ))?;
        registry.register(Box::new(pass_duration_seconds.clone()))?;

        Ok(Self {
            passes_total,
            groups_formed_total,
            commit_aborts_total,
            pass_duration_seconds,
        })
    }
}

impl InstanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let instances_launched_total = IntCounter::with_opts(Opts::new(
            "rally_point_instances_launched_total",
            "Total instances launched",
        ))?;
        registry.register(Box::new(instances_launched_total.clone()))?;

        let players_matched_total = IntCounter::with_opts(Opts::new(
            "rally_point_players_matched_total",
            "Total players consumed into instances",
        ))?;
        registry.register(Box::new(players_matched_total.clone()))?;

        let group_size = HistogramVec::new(
            HistogramOpts::new(
                "rally_point_group_size",
                "Committed group size distribution",
            )
            .buckets(vec![2.0, 3.0, 4.0, 5.0, 7.0, 10.0]),
            &["tier"],
        )?;
        registry.register(Box::new(group_size.clone()))?;

        Ok(Self {
            instances_launched_total,
            players_matched_total,
            group_size,
        })
    }
}
