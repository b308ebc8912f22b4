/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use clap::Parser;
use tracing::{error, info, warn};

use avb_sensor_node::avtp::{PduAssembler, SensorSet, STREAM_ID};
use avb_sensor_node::clock::{MonotonicClock, NetworkClock};
use avb_sensor_node::config::{StreamConfig, StreamConfigManager};
use avb_sensor_node::diag::{run_diag, DIAG_PERIOD};
use avb_sensor_node::record::SensorRecord;
use avb_sensor_node::sender::SenderTask;
use avb_sensor_node::sensors::{run_gyro_producer, run_imu_producer, SimulatedGyro, SimulatedImu};
use avb_sensor_node::shaper::{run_refill, CreditAccount, ShaperParams};
use avb_sensor_node::transport::{ChannelTransport, FrameTransport};

// ── CLI argument definition ───────────────────────────────────────────────────

/// AVB sensor telemetry node.
///
/// Example:
///   avb-sensor-node -i eth0 --config stream_config.yaml
#[derive(Debug, Parser)]
#[command(
    name = "avb-sensor-node",
    about = "Credit-shaped AVTP sensor telemetry node",
    long_about = None,
)]
struct Cli {
    /// Network interface for the AVTP packet socket (overrides the config file).
    #[arg(short = 'i', long = "interface")]
    interface: Option<String>,

    /// Path to the YAML stream configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Run with simulated sensors and an in-memory loopback transport
    /// (no packet socket, no hardware required).
    #[arg(long = "demo", default_value_t = false)]
    demo: bool,
}

/// Per-attempt timeout for the sensor-record lock, matching the reference
/// deployment (250 µs).
const RECORD_LOCK_TIMEOUT: Duration = Duration::from_micros(250);

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Initialise structured logging.
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("AVB sensor node starting up...");

    // ── Parse CLI arguments ───────────────────────────────────────────────────
    let cli = Cli::parse();

    // ── Load stream configuration ─────────────────────────────────────────────
    let mut manager = StreamConfigManager::new();
    match &cli.config {
        Some(path) => {
            if let Err(e) = manager.load_from_file(path) {
                error!("Failed to load stream configuration: {:#}", e);
                process::exit(1);
            }
        }
        None => {
            warn!("No configuration file provided, using default stream settings");
        }
    }

    let mut config = manager.effective();
    if let Some(interface) = &cli.interface {
        config.interface = interface.clone();
    }

    info!(
        interface = %config.interface,
        tx_interval_ns = config.tx_interval_ns,
        class = config
            .stream_class
            .map(|c| c.to_string())
            .unwrap_or_else(|| "best-effort".into()),
        port_rate_bps = config.port_rate_bps,
        demo = cli.demo,
        "Configuration"
    );

    // ── Initialise subsystems, aggregating failures ───────────────────────────
    // If anything fails here the node must not enter steady state at all.
    let mut init_failures: Vec<anyhow::Error> = Vec::new();

    let clock: Arc<dyn NetworkClock> = Arc::new(MonotonicClock::new());
    let record = Arc::new(SensorRecord::new(RECORD_LOCK_TIMEOUT));

    let params = match ShaperParams::configure(
        config.tx_interval_ns,
        SensorSet::LEN,
        config.stream_class,
        config.port_rate_bps,
        config.max_mtu,
    ) {
        Ok(params) => Some(params),
        Err(e) => {
            init_failures.push(anyhow!(e).context("shaper configuration"));
            None
        }
    };

    let transport = match open_transport(&config, cli.demo) {
        Ok(transport) => Some(transport),
        Err(e) => {
            init_failures.push(e.context("transport"));
            None
        }
    };

    if !init_failures.is_empty() {
        for failure in &init_failures {
            error!("Initialisation failure: {:#}", failure);
        }
        error!(
            count = init_failures.len(),
            "initialisation failed, refusing to start"
        );
        process::exit(1);
    }
    let params = params.expect("checked above");
    let transport = transport.expect("checked above");

    let account = Arc::new(CreditAccount::new(params, clock.now_ns()));

    // ── Spawn the task set ────────────────────────────────────────────────────
    tokio::spawn(run_imu_producer(
        record.clone(),
        clock.clone(),
        SimulatedImu::new(),
        config.imu_period(),
    ));
    tokio::spawn(run_gyro_producer(
        record.clone(),
        clock.clone(),
        SimulatedGyro::new(),
        config.gyro_period(),
    ));
    tokio::spawn(run_refill(account.clone(), clock.clone()));
    tokio::spawn(run_diag(record.clone(), DIAG_PERIOD));

    let sender = SenderTask::new(
        record.clone(),
        account,
        clock,
        transport,
        PduAssembler::new(STREAM_ID),
    );

    // The sender owns the main task; when it exits the node is done
    // transmitting (cooperative shutdown has already propagated).
    match sender.run().await {
        Ok(()) => info!("sender exited, node stopped"),
        Err(e) => {
            error!("sender failed before steady state: {e}");
            record.shutdown().await;
            process::exit(1);
        }
    }
}

/// Open the frame transport: a packet socket on the configured interface, or
/// the in-memory loopback transport in demo mode.
fn open_transport(config: &StreamConfig, demo: bool) -> anyhow::Result<Arc<dyn FrameTransport>> {
    if demo {
        info!("demo mode: in-memory loopback transport");
        return Ok(Arc::new(ChannelTransport::with_loopback()));
    }
    open_packet_socket(config)
}

#[cfg(target_os = "linux")]
fn open_packet_socket(config: &StreamConfig) -> anyhow::Result<Arc<dyn FrameTransport>> {
    let socket = avb_sensor_node::transport::PacketSocket::open(&config.interface)?;
    Ok(Arc::new(socket))
}

#[cfg(not(target_os = "linux"))]
fn open_packet_socket(_config: &StreamConfig) -> anyhow::Result<Arc<dyn FrameTransport>> {
    anyhow::bail!("packet-socket transport requires Linux; use --demo elsewhere")
}
