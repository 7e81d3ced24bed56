//! Hikari Agent: camera agent on a message server
//!
//! Logs in to the message server, answers every photo request with one
//! still (subject to the per-requester cooldown and bans), and serves the
//! admin endpoint for bans and status.
//!
//! ## Usage
//!
//! ```bash
//! # Real camera on /dev/video2, server on prosody:5222
//! hikari-agent
//!
//! # Synthetic camera, custom server
//! HIKARI_SERVER=chat.example hikari-agent --test-source
//!
//! # Ban from the admin endpoint
//! curl -X POST localhost:3001/ban -H 'content-type: application/json' -d '{"agent":"alice@chat.example"}'
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use hikari::{AgentConfig, Camera, CameraAgent, CommandCamera, SystemClock, TcpChannel};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = AgentConfig::from_env();
    let identity = config
        .identity()
        .context("HIKARI_USERNAME and HIKARI_SERVER must not be empty")?;

    info!("Hikari Agent starting");
    info!("  Identity: {}", identity);
    info!("  Server: {}", config.server_addr);
    info!("  Admin port: {}", config.http_port);
    info!(
        "  Cooldown: {}ms, ban: {}ms",
        config.settings.throttle.request_cooldown_ms, config.settings.throttle.ban_duration_ms
    );

    let camera = select_camera(&config)?;

    let channel = TcpChannel::connect(&config.server_addr, identity, config.password.clone())
        .await
        .context("Failed to connect to the message server")?;

    let agent = CameraAgent::new(
        Arc::new(channel),
        camera,
        Arc::new(SystemClock::new()),
        config.settings.clone(),
    );
    agent.start();

    let cancel = CancellationToken::new();
    let tracker = TaskTracker::new();

    // Spawn admin endpoint
    let web_agent = agent.clone();
    let web_bind = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let web_cancel = cancel.clone();
    tracker.spawn(async move {
        tokio::select! {
            result = hikari::web::start(web_agent, web_bind) => {
                if let Err(e) = result {
                    error!("Admin server error: {:#}", e);
                }
            }
            _ = web_cancel.cancelled() => {
                info!("Admin server: shutting down");
            }
        }
    });

    tracker.close();

    run(agent, cancel, tracker).await
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hikari=info".parse().unwrap()),
        )
        .init();
}

#[cfg(feature = "test-source")]
fn select_camera(config: &AgentConfig) -> Result<Arc<dyn Camera>> {
    if config.test_source {
        info!("  Camera: synthetic (--test-source)");
        return Ok(Arc::new(hikari::TestCamera::new(config.camera.warmup)));
    }
    Ok(device_camera(config))
}

#[cfg(not(feature = "test-source"))]
fn select_camera(config: &AgentConfig) -> Result<Arc<dyn Camera>> {
    if config.test_source {
        anyhow::bail!("--test-source requires the `test-source` feature");
    }
    Ok(device_camera(config))
}

fn device_camera(config: &AgentConfig) -> Arc<dyn Camera> {
    info!("  Camera: {} via {}", config.camera.device.display(), config.camera.program);
    Arc::new(CommandCamera::new(config.camera.clone()))
}

/// Log stats periodically; stop on SIGINT or when the listener dies.
async fn run(agent: CameraAgent, cancel: CancellationToken, tracker: TaskTracker) -> Result<()> {
    let mut stats_interval = interval(Duration::from_secs(60));
    stats_interval.tick().await;
    let mut liveness = interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
            _ = liveness.tick() => {
                if !agent.is_alive() {
                    warn!("Request listener stopped, shutting down");
                    break;
                }
            }
            _ = stats_interval.tick() => {
                let stats = agent.stats();
                info!(
                    "Stats: {} requests, {} photos, {} throttled, {} cancelled mid-capture, {} bans, {} tracked",
                    stats.requests_received, stats.photos_sent, stats.requests_throttled,
                    stats.cancelled_mid_capture, stats.bans_applied, agent.store().len()
                );
            }
        }
    }

    agent.stop().await;
    cancel.cancel();
    if tokio::time::timeout(Duration::from_secs(5), tracker.wait())
        .await
        .is_err()
    {
        warn!("Admin server did not stop in time");
    }
    info!("Agent stopped");
    Ok(())
}
