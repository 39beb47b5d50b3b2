//! tracker-watch - Print reports from a tracker server
//!
//! # Usage
//!
//! ```bash
//! tracker-watch --address 127.0.0.1:3883 --sensor 2
//! ```
//!
//! Requests the transforms and workspace on connect, then prints every report
//! for the selected sensor (or all sensors) as it arrives.

use clap::Parser;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracker_io::client::TrackerRemote;
use tracker_io::connection::{TcpConnection, WireFormat};
use tracker_io::core::{
    AccelerationReport, PoseReport, Report, SensorSlot, Tracker2RoomReport, Unit2SensorReport,
    VelocityReport, WorkspaceReport,
};
use tracker_io::error::{Error, Result};
use tracker_io::registry::Handler;

#[derive(Parser)]
#[command(name = "tracker-watch")]
#[command(about = "Print reports streamed by a tracker-io server")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:3883")]
    address: String,

    /// Tracker name
    #[arg(short, long, default_value = "Tracker0")]
    name: String,

    /// Only print this sensor (all sensors when omitted)
    #[arg(short, long)]
    sensor: Option<i64>,

    /// Envelope encoding: json or postcard
    #[arg(short, long, default_value = "json")]
    wire_format: String,

    /// Requested report rate in Hz
    #[arg(long)]
    rate: Option<f64>,
}

/// Handler context: the label printed in front of each report
type Label = String;

fn print_report(label: &Label, report: Report) {
    println!("{} {}", label, report);
}

fn on_pose(label: &Label, r: &PoseReport) {
    print_report(label, Report::Pose(*r));
}

fn on_velocity(label: &Label, r: &VelocityReport) {
    print_report(label, Report::Velocity(*r));
}

fn on_acceleration(label: &Label, r: &AccelerationReport) {
    print_report(label, Report::Acceleration(*r));
}

fn on_tracker2room(label: &Label, r: &Tracker2RoomReport) {
    print_report(label, Report::Tracker2Room(*r));
}

fn on_unit2sensor(label: &Label, r: &Unit2SensorReport) {
    print_report(label, Report::Unit2Sensor(*r));
}

fn on_workspace(label: &Label, r: &WorkspaceReport) {
    print_report(label, Report::Workspace(*r));
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let format: WireFormat = args.wire_format.parse()?;
    let slot = match args.sensor {
        Some(sensor) => SensorSlot::from_raw(sensor)?,
        None => SensorSlot::All,
    };

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || r.store(false, Ordering::Relaxed))
        .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let connection = TcpConnection::connect(args.address.as_str(), format)?;
    let mut remote: TrackerRemote<Label, TcpConnection> =
        TrackerRemote::new(&args.name, connection)?;

    let label = format!("{}@{}", args.name, args.address);
    remote.register_handler(slot, label.clone(), Handler::Pose(on_pose));
    remote.register_handler(slot, label.clone(), Handler::Velocity(on_velocity));
    remote.register_handler(slot, label.clone(), Handler::Acceleration(on_acceleration));
    remote.register_handler(slot, label.clone(), Handler::Tracker2Room(on_tracker2room));
    remote.register_handler(slot, label.clone(), Handler::Unit2Sensor(on_unit2sensor));
    remote.register_handler(slot, label, Handler::Workspace(on_workspace));

    remote.request_t2r_xform()?;
    remote.request_u2s_xform()?;
    remote.request_workspace()?;
    if let Some(hz) = args.rate {
        remote.set_update_rate(hz)?;
    }

    while running.load(Ordering::Relaxed) {
        match remote.poll() {
            Ok(0) => std::thread::sleep(Duration::from_millis(1)),
            Ok(_) => {}
            Err(Error::ConnectionClosed) => {
                log::info!("Server closed the connection");
                break;
            }
            Err(e) => return Err(e),
        }
    }

    if remote.dropped() > 0 {
        log::warn!("{} malformed messages dropped", remote.dropped());
    }
    Ok(())
}
