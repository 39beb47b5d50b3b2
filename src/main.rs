//! tracker-io - Tracker server daemon
//!
//! Runs the configured report source and serves its reports to one TCP client
//! at a time. Clients speak the length-prefixed envelope protocol of
//! [`tracker_io::connection::TcpConnection`]. Tracker state and the source
//! survive reconnects; only the connection is replaced.

use clap::Parser;
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracker_io::config::Config;
use tracker_io::connection::TcpConnection;
use tracker_io::core::{ReportSource, current_timestamp_us};
use tracker_io::error::{Error, Result};
use tracker_io::server::TrackerServer;
use tracker_io::sources::create_source;

type Server = TrackerServer<Box<dyn ReportSource>, TcpConnection>;

/// Delay before restarting a failed source
const RESTART_DELAY: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "tracker-io")]
#[command(about = "Serve spatial tracker reports over TCP")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, default_value = "/etc/tracker-io.toml")]
    config: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_file(&args.config)?;

    // RUST_LOG overrides the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("tracker-io v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!("Using config: {}", args.config);
    log::info!(
        "Device: {} ({}, {} sensors)",
        config.device.name,
        config.device.device_type,
        config.device.sensors
    );

    let mut source = Some(create_source(&config)?);
    let mut server: Option<Server> = None;

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let bind_addr = &config.network.bind_address;
    let listener = TcpListener::bind(bind_addr)
        .map_err(|e| Error::Other(format!("Failed to bind to {}: {}", bind_addr, e)))?;
    if let Err(e) = listener.set_nonblocking(true) {
        log::warn!("Failed to set nonblocking mode: {}", e);
    }
    log::info!(
        "Listening on {} ({:?} envelopes)",
        bind_addr,
        config.network.wire_format
    );
    log::info!("tracker-io running. Press Ctrl-C to stop.");

    // Only one client at a time
    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                log::info!("Client connected: {}", addr);
                let connection = match TcpConnection::from_stream(stream, config.network.wire_format)
                {
                    Ok(connection) => connection,
                    Err(e) => {
                        log::error!("Failed to set up connection to {}: {}", addr, e);
                        continue;
                    }
                };

                if let Some(active) = server.as_mut() {
                    active.replace_connection(connection)?;
                } else {
                    let Some(source) = source.take() else {
                        return Err(Error::Other("report source unavailable".to_string()));
                    };
                    server = Some(build_server(&config, source, connection)?);
                }

                if let Some(active) = server.as_mut() {
                    serve_client(active, &running);
                }
                log::info!("Client disconnected: {}", addr);
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                // No connection pending
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                log::error!("Accept error: {}", e);
            }
        }
    }

    log::info!("tracker-io stopped");
    Ok(())
}

fn build_server(
    config: &Config,
    source: Box<dyn ReportSource>,
    connection: TcpConnection,
) -> Result<Server> {
    let mut server = TrackerServer::new(
        &config.device.name,
        config.device.sensors,
        source,
        connection,
    )?;
    config.transforms.apply_to(server.state_mut())?;
    Ok(server)
}

/// Run the tracker mainloop until the client disconnects or we stop
fn serve_client(server: &mut Server, running: &AtomicBool) {
    while running.load(Ordering::Relaxed) {
        match server.mainloop(current_timestamp_us()) {
            Ok(_) => {}
            Err(Error::ConnectionClosed) => break,
            Err(Error::HardwareFail(reason)) => {
                log::error!("Tracker failed ({}), restarting", reason);
                std::thread::sleep(RESTART_DELAY);
                if let Err(e) = server.restart() {
                    log::error!("Restart failed: {}", e);
                }
            }
            Err(e) => {
                log::warn!("Client connection error: {}", e);
                break;
            }
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}
