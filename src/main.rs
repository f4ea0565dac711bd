//! Waymesh tracker daemon
//!
//! Wires the full pipeline: a (simulated) fix source feeding the tracking
//! supervisor, the point buffer, the upload coordinator, and the BLE peer
//! mesh. Without a Bluetooth adapter the daemon runs tracking-only.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use waymesh_tracker::buffer::PointBuffer;
use waymesh_tracker::config::TrackerConfig;
use waymesh_tracker::mesh::{BleRadio, MeshIdentity, PeerMeshRelay};
use waymesh_tracker::sensors::{LocationCommands, SimulatedLocationSource};
use waymesh_tracker::tracker::TrackingSupervisor;
use waymesh_tracker::upload::{ApiConfig, HttpApi, LocationApi, UploadCoordinator};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = TrackerConfig {
        device_id: env_u64("WAYMESH_DEVICE_ID", 1),
        user_id: env_u64("WAYMESH_USER_ID", 1),
        display_name: std::env::var("WAYMESH_DEVICE_NAME")
            .unwrap_or_else(|_| "waymesh-dev".into()),
        ..Default::default()
    };
    let api_config = ApiConfig {
        base_url: std::env::var("WAYMESH_SERVER")
            .unwrap_or_else(|_| "http://127.0.0.1:8000/api".into()),
        token: std::env::var("WAYMESH_TOKEN").unwrap_or_default(),
        ..Default::default()
    };

    info!("Tracker starting: device {}", config.device_id);
    info!("  Server: {}", api_config.base_url);

    let buffer = Arc::new(PointBuffer::new(config.buffer_path.clone()));
    match buffer.restore().await {
        Ok(0) => {}
        Ok(n) => info!("Recovered {n} pending samples from previous run"),
        Err(e) => warn!("Buffer restore failed, starting empty: {e}"),
    }

    let api: Arc<dyn LocationApi> = Arc::new(HttpApi::new(api_config)?);

    let (coordinator, upload_notices, _upload_status) =
        UploadCoordinator::new(buffer.clone(), api.clone(), config.device_id);
    let (flush_tx, flush_rx) = mpsc::channel(8);
    let _upload_task = coordinator.spawn(flush_rx, config.upload.max_buffer_age);

    // Own live position: published by the supervisor, read by the mesh
    let (position_tx, position_rx) = watch::channel(None);

    // The mesh is optional; without an adapter we track and upload only
    let _mesh_task = match BleRadio::new(&config.display_name).await {
        Ok(radio) => {
            let relay = PeerMeshRelay::new(
                config.mesh.clone(),
                MeshIdentity {
                    device_id: config.device_id,
                    user_id: config.user_id,
                    display_name: config.display_name.clone(),
                },
                Arc::new(radio),
                api.clone(),
                position_rx,
            );
            info!("Peer mesh active");
            Some(relay.spawn(upload_notices))
        }
        Err(e) => {
            warn!("Bluetooth unavailable, running without peer mesh: {e}");
            None
        }
    };

    // Simulated receiver walking from central Oslo
    let (event_tx, event_rx) = mpsc::channel(256);
    let source = SimulatedLocationSource::new(event_tx, 59.9139, 10.7522);
    let _sim_task = source.spawn();
    let commands: Arc<dyn LocationCommands> = source.clone();

    let supervisor = TrackingSupervisor::start(
        &config,
        commands,
        buffer.clone(),
        coordinator.clone(),
        flush_tx,
        position_tx,
        event_rx,
    )?;

    let mut snapshots = supervisor.snapshots();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow().clone();
                debug!(
                    "mode={} buffered={} charging={}",
                    snapshot.mode, snapshot.buffered, snapshot.charging
                );
            }
        }
    }

    // Retracts sensor commands and flushes pending samples once
    supervisor.stop().await?;
    info!("Tracker stopped");
    Ok(())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
