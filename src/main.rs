//! MMO Relay Server
//!
//! Run with:
//! ```not_rust
//! cargo run --bin mmo-relay
//! PORT=8080 cargo run --bin mmo-relay -- --aoi circle --sound nearby
//! ```

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mmo_relay::game::MAX_CELL_RADIUS;
use mmo_relay::{
    AoiShape, LivenessConfig, RelayServer, ServerConfig, SessionConfig, SoundPolicy,
    SpatialConfig, VERSION,
};

#[derive(Parser, Debug)]
#[command(name = "mmo-relay")]
#[command(about = "Real-time session relay for browser multiplayer games", long_about = None)]
struct Args {
    /// Address to bind both listeners to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// WebSocket port
    #[arg(short = 'p', long, env = "PORT", default_value_t = 5500)]
    port: u16,

    /// Health/metrics port (0 disables the endpoint)
    #[arg(long, env = "HEALTH_PORT", default_value_t = 5501)]
    health_port: u16,

    /// Maximum concurrent connections
    #[arg(long, env = "MAX_CONNECTIONS", default_value_t = 1000)]
    max_connections: usize,

    /// Seconds without any inbound frame before a connection is dropped
    #[arg(long, env = "READ_TIMEOUT_SECS", default_value_t = 60)]
    read_timeout_secs: u64,

    /// Seconds between server pings
    #[arg(long, env = "PING_INTERVAL_SECS", default_value_t = 30)]
    ping_interval_secs: u64,

    /// Seconds between empty-session sweeps
    #[arg(long, env = "CLEANUP_INTERVAL_SECS", default_value_t = 300)]
    cleanup_interval_secs: u64,

    /// Spatial grid cell size
    #[arg(long, env = "CELL_SIZE", default_value_t = 50.0)]
    cell_size: f64,

    /// Area-of-interest radius
    #[arg(long, env = "VIEW_DISTANCE", default_value_t = 100.0)]
    view_distance: f64,

    /// Area-of-interest shape
    #[arg(long, env = "AOI_SHAPE", value_enum, default_value_t = Aoi::Square)]
    aoi: Aoi,

    /// Who hears sounds
    #[arg(long, env = "SOUND_POLICY", value_enum, default_value_t = Sound::Session)]
    sound: Sound,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Aoi {
    Square,
    Circle,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Sound {
    Session,
    Nearby,
}

impl Args {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        anyhow::ensure!(self.cell_size > 0.0, "cell size must be positive");
        anyhow::ensure!(self.view_distance >= 0.0, "view distance must not be negative");
        anyhow::ensure!(
            (self.view_distance / self.cell_size).ceil() <= MAX_CELL_RADIUS as f64,
            "view distance {} spans more than {} cells of size {}; raise the cell size",
            self.view_distance,
            MAX_CELL_RADIUS,
            self.cell_size
        );
        anyhow::ensure!(self.read_timeout_secs > 0, "read timeout must be positive");
        anyhow::ensure!(self.ping_interval_secs > 0, "ping interval must be positive");
        anyhow::ensure!(self.cleanup_interval_secs > 0, "cleanup interval must be positive");
        if self.ping_interval_secs >= self.read_timeout_secs {
            warn!(
                "Ping interval ({}s) is not shorter than the read timeout ({}s); idle clients will be dropped",
                self.ping_interval_secs, self.read_timeout_secs
            );
        }

        Ok(ServerConfig {
            bind_addr: SocketAddr::new(self.host, self.port),
            health_addr: (self.health_port != 0).then(|| SocketAddr::new(self.host, self.health_port)),
            max_connections: self.max_connections,
            liveness: LivenessConfig {
                read_timeout: Duration::from_secs(self.read_timeout_secs),
                ping_interval: Duration::from_secs(self.ping_interval_secs),
            },
            cleanup_interval: Duration::from_secs(self.cleanup_interval_secs),
            session: SessionConfig {
                spatial: SpatialConfig {
                    cell_size: self.cell_size,
                    view_distance: self.view_distance,
                    shape: match self.aoi {
                        Aoi::Square => AoiShape::Square,
                        Aoi::Circle => AoiShape::Circle,
                    },
                },
                sound_policy: match self.sound {
                    Sound::Session => SoundPolicy::SessionWide,
                    Sound::Nearby => SoundPolicy::Nearby,
                },
            },
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mmo_relay=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Args::parse().into_config()?;

    info!("MMO Relay v{}", VERSION);
    info!(
        "Grid: cell {} / view {} ({:?}), sound: {:?}",
        config.session.spatial.cell_size,
        config.session.spatial.view_distance,
        config.session.spatial.shape,
        config.session.sound_policy
    );

    let server = RelayServer::bind(config)
        .await
        .context("failed to start relay")?;
    let shutdown = server.shutdown_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            shutdown.shutdown();
        }
    });

    server.run().await?;
    info!("Relay stopped");
    Ok(())
}
