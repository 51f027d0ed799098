//! rtcc-core server - Real-Time Crime Center operational backend
//!
//! Wires the six engines behind the coordinator, exposes the thin HTTP
//! surface (webhook ingest, health, status), and runs the periodic
//! sweeps (check-ins, falls, warning expiry, retention, diagnostics).
//!
//! # Usage
//!
//! ```bash
//! # Run with built-in defaults
//! cargo run --release
//!
//! # Run against a deployment config
//! RTCC_CONFIG=/etc/rtcc/rtcc_config.toml cargo run --release
//! ```
//!
//! # Environment Variables
//!
//! - `RTCC_CONFIG`: Path to the deployment TOML
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rtcc_core::api::{create_app, ApiState};
use rtcc_core::bus::EventBus;
use rtcc_core::config::{self, RtccConfig};
use rtcc_core::continuity::{AuditLog, AuditSegmentStore};
use rtcc_core::dispatch::{CommandEngine, HttpActuatorTransport, SimulatedTransport};
use rtcc_core::fusion::{AnomalyDetector, EventIngestor};
use rtcc_core::pipeline::{AggregateJob, AggregateRouter, RtccCoordinator};
use rtcc_core::storage::{BaselineStore, EventStore};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "rtcc-core")]
#[command(about = "Real-Time Crime Center operational core")]
#[command(version)]
struct CliArgs {
    /// Override the server address (default from config: "0.0.0.0:8080")
    #[arg(short, long)]
    addr: Option<String>,

    /// Override the data directory for stores and audit segments
    #[arg(long, value_name = "DIR")]
    data_dir: Option<String>,

    /// Base URL of the actuator control plane; omitted runs the
    /// simulated transport (no external fleet)
    #[arg(long, value_name = "URL", env = "RTCC_ACTUATOR_URL")]
    actuator_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();
    let mut loaded = RtccConfig::load();
    if let Some(dir) = &args.data_dir {
        loaded.server.data_dir.clone_from(dir);
    }
    config::init(loaded);
    let cfg = config::get();

    info!(
        deployment = %cfg.deployment.name,
        data_dir = %cfg.server.data_dir,
        "Starting rtcc-core"
    );

    // ------------------------------------------------------------------
    // Stores
    // ------------------------------------------------------------------
    let data_dir = std::path::Path::new(&cfg.server.data_dir);
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;

    let event_store =
        EventStore::open(data_dir.join("events")).context("opening event store")?;
    let baseline_store =
        BaselineStore::open(data_dir.join("baselines")).context("opening baseline store")?;
    let audit_store = AuditSegmentStore::open(
        data_dir.join("audit"),
        cfg.continuity.audit_segment_max_entries,
    )
    .context("opening audit segment store")?;

    // ------------------------------------------------------------------
    // Engines
    // ------------------------------------------------------------------
    let ingestor = EventIngestor::new(cfg.fusion.clone(), event_store);
    let anomaly = AnomalyDetector::load(cfg.fusion.anomaly_sigma, &baseline_store);
    let transport: Arc<dyn rtcc_core::dispatch::ActuatorTransport> = match &args.actuator_url {
        Some(url) => Arc::new(HttpActuatorTransport::new(
            url.clone(),
            Duration::from_secs(cfg.dispatch.command_default_timeout_secs),
        )),
        None => {
            warn!("no actuator URL configured - using simulated transport");
            Arc::new(SimulatedTransport)
        }
    };
    let commands = CommandEngine::new(cfg.dispatch.clone(), transport);
    let audit = AuditLog::new(cfg.continuity.clone()).with_store(audit_store);
    let bus = EventBus::default();

    let coordinator = Arc::new(RwLock::new(RtccCoordinator::new(
        config::get().clone(),
        ingestor,
        anomaly,
        commands,
        audit,
        bus,
    )));

    {
        let mut coord = coordinator.write().await;
        coord
            .audit
            .log(
                rtcc_core::types::AuditAction::SystemStartup,
                rtcc_core::types::AuditSeverity::Info,
                "main",
                "rtcc-core started",
            )
            .context("audit startup entry")?;
    }

    let cancel = CancellationToken::new();

    // ------------------------------------------------------------------
    // Per-actuator command workers
    // ------------------------------------------------------------------
    let command_router = {
        let coordinator = coordinator.clone();
        AggregateRouter::spawn(8, 128, cancel.clone(), move |job: AggregateJob<()>| {
            let coordinator = coordinator.clone();
            async move {
                let mut coord = coordinator.write().await;
                coord.commands.pump(&job.aggregate_id).await;
            }
        })
    };

    // Command pump scheduler: route busy actuators onto their lanes.
    let pump_task = {
        let coordinator = coordinator.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(250));
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        let busy = {
                            let coord = coordinator.read().await;
                            coord.commands.busy_actuators()
                        };
                        for actuator_id in busy {
                            let _ = command_router.submit(AggregateJob {
                                aggregate_id: actuator_id,
                                payload: (),
                            });
                        }
                    }
                }
            }
            command_router.join().await;
        })
    };

    // ------------------------------------------------------------------
    // Periodic sweeps + baseline persistence
    // ------------------------------------------------------------------
    let sweep_task = {
        let coordinator = coordinator.clone();
        let cancel = cancel.clone();
        let baseline_store = baseline_store.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(30));
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        let mut coord = coordinator.write().await;
                        coord.run_sweeps(chrono::Utc::now()).await;
                        coord.health.roll_snapshot();
                        if let Err(e) = coord.anomaly.persist(&baseline_store) {
                            warn!(error = %e, "baseline persistence failed");
                        }
                    }
                }
            }
        })
    };

    // ------------------------------------------------------------------
    // HTTP surface
    // ------------------------------------------------------------------
    let app = create_app(ApiState {
        coordinator: coordinator.clone(),
    });
    let addr = args
        .addr
        .unwrap_or_else(|| format!("{}:{}", cfg.server.listen_addr, cfg.server.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr = %addr, "HTTP surface listening");

    let server_cancel = cancel.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        server_cancel.cancelled().await;
    });

    tokio::select! {
        result = server => {
            result.context("server error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    cancel.cancel();
    let _ = sweep_task.await;
    let _ = pump_task.await;

    let mut coord = coordinator.write().await;
    if let Err(e) = coord.anomaly.persist(&baseline_store) {
        warn!(error = %e, "final baseline persistence failed");
    }
    let _ = coord.audit.log(
        rtcc_core::types::AuditAction::SystemShutdown,
        rtcc_core::types::AuditSeverity::Info,
        "main",
        "rtcc-core stopped",
    );
    info!("shutdown complete");
    Ok(())
}
