//! `tkmctl`: a thin control-socket client. Sends one request, prints the
//! reply, exits — matching `shared/Options.cpp`'s command-style CLI
//! shape, expressed with `clap` derive the way `services/receiver`
//! declares the dependency (builder-style `clap` elsewhere in the
//! teacher's other binaries suits a handful of flat flags; this CLI's
//! branching subcommands read better as an enum).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio_util::codec::Framed;

use tkm_protocol::{ControlRequest, Envelope, FrameCodec, FrameKind, Message, Recipient, StatusWhat};

#[derive(Parser)]
#[command(name = "tkmctl", about = "Control client for tkmcollector")]
struct Cli {
    #[arg(long, default_value = "/var/run/tkmcollector/tkmcollector.sock")]
    socket: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database's fixed tables if they don't already exist.
    InitDatabase {
        #[arg(long)]
        forced: bool,
    },
    /// Ask the collector process to shut down.
    Quit,
    /// List every known device.
    GetDevices,
    /// List sessions, optionally filtered to one device.
    GetSessions {
        #[arg(long)]
        device_hash: Option<String>,
    },
    /// Register a new device to monitor.
    AddDevice {
        name: String,
        address: String,
        port: u16,
        /// Overwrite an existing device at this address/port.
        #[arg(long)]
        forced: bool,
    },
    RemoveDevice { hash: String },
    ConnectDevice { hash: String },
    DisconnectDevice { hash: String },
    StartCollecting { hash: String },
    StopCollecting { hash: String },
}

fn build_request(command: Command) -> ControlRequest {
    let request_id = uuid_like_id();
    match command {
        Command::InitDatabase { forced } => ControlRequest::InitDatabase { request_id, forced },
        Command::Quit => ControlRequest::QuitCollector { request_id },
        Command::GetDevices => ControlRequest::GetDevices { request_id },
        Command::GetSessions { device_hash } => ControlRequest::GetSessions { request_id, device_hash },
        Command::AddDevice { name, address, port, forced } => {
            ControlRequest::AddDevice { request_id, name, address, port, forced }
        }
        Command::RemoveDevice { hash } => ControlRequest::RemoveDevice { request_id, hash },
        Command::ConnectDevice { hash } => ControlRequest::ConnectDevice { request_id, hash },
        Command::DisconnectDevice { hash } => ControlRequest::DisconnectDevice { request_id, hash },
        Command::StartCollecting { hash } => ControlRequest::StartCollecting { request_id, hash },
        Command::StopCollecting { hash } => ControlRequest::StopCollecting { request_id, hash },
    }
}

/// A request id unique enough to correlate one reply with one request over
/// a single short-lived connection; no `uuid` dependency exists anywhere in
/// this workspace (see `DESIGN.md`'s dropped-dependency list), so this pins
/// the process id and a monotonic counter instead of fabricating one.
fn uuid_like_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    format!("tkmctl.{}.{}", std::process::id(), COUNTER.fetch_add(1, Ordering::Relaxed))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("tkmctl: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> std::io::Result<()> {
    let stream = UnixStream::connect(&cli.socket).await?;
    let mut framed = Framed::new(stream, FrameCodec::new(FrameKind::DescriptorPadded));

    let descriptor = Envelope::new(Recipient::Control, Recipient::Collector, Message::Descriptor { id: "tkmctl".to_owned() });
    framed.send(descriptor).await.map_err(std::io::Error::other)?;
    let mut framed = framed.map_codec(|_| FrameCodec::new(FrameKind::Varint));

    let request = build_request(cli.command);
    let envelope = Envelope::new(Recipient::Control, Recipient::Collector, Message::Request(request));
    framed.send(envelope).await.map_err(std::io::Error::other)?;

    match framed.next().await {
        Some(Ok(Envelope { message, .. })) => print_reply(&message),
        Some(Err(err)) => eprintln!("tkmctl: protocol error: {err}"),
        None => eprintln!("tkmctl: connection closed before a reply arrived"),
    }
    Ok(())
}

fn print_reply(message: &Message) {
    match message {
        Message::Status { what, reason, .. } => {
            let prefix = match what {
                StatusWhat::Ok => "OK",
                StatusWhat::Busy => "BUSY",
                StatusWhat::Error => "ERROR",
            };
            println!("{prefix}: {reason}");
        }
        Message::GetDevicesResult { devices, .. } => {
            for device in devices {
                println!("{}\t{}\t{}:{}\t{:?}", device.hash, device.name, device.address, device.port, device.state);
            }
        }
        Message::GetSessionsResult { sessions, .. } => {
            for session in sessions {
                println!(
                    "{}\t{}\t{}\t{}\t{:?}",
                    session.hash, session.name, session.device_hash, session.started_at, session.ended_at
                );
            }
        }
        other => println!("{other:?}"),
    }
}
