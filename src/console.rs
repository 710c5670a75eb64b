//! Line console
//! Translates typed commands into bridge actions and renders bridge status.

use std::fmt::Write as _;

use anyhow::Result;
use log::{info, warn};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::core::bridge::{BridgeAction, BridgeState};
use crate::core::central::adapter::{AdapterState, CentralAction};
use crate::core::central::characteristic::{CharacteristicAction, Usage};
use crate::core::central::connection::ConnectionAction;
use crate::core::central::discover::DiscoverAction;
use crate::core::central::peripheral::PeripheralAction;
use crate::core::central::scan::ScanAction;
use crate::core::central::service::ServiceAction;
use crate::core::central::types::PeripheralId;
use crate::core::publish::server::{ServerAction, Transport};
use crate::core::publish::traffic::format_bytes;
use crate::core::publish::PublishAction;
use crate::core::store::BridgeHandle;

pub const HELP: &str = "\
Commands:
  scan | stop-scan                       start or stop scanning
  select <id> | connect <id>             select (and connect) a peripheral
  disconnect                             disconnect the selected peripheral
  service <uuid>                         select a service of the selected peripheral
  use <service> <characteristic> <role>  role is none, notify or write
  transport tcp|udp                      network transport
  port <number>                          network port
  start | stop                           start or stop the network server
  status | dump                          summary, or the full state as JSON
  help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Bridge(BridgeAction),
    Status,
    Dump,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command `{0}`, type `help`")]
    Unknown(String),
    #[error("`{command}` expects {expected}")]
    Arguments { command: &'static str, expected: &'static str },
    #[error("`{0}` is not a UUID")]
    Uuid(String),
    #[error("unknown role `{0}`, expected none, notify or write")]
    Role(String),
    #[error("unknown transport `{0}`, expected tcp or udp")]
    Transport(String),
}

fn central(action: DiscoverAction) -> Command {
    Command::Bridge(BridgeAction::Central(CentralAction::Discover(action)))
}

fn selected(action: PeripheralAction) -> Command {
    central(DiscoverAction::SelectedPeripheral(action))
}

fn server(action: ServerAction) -> Command {
    Command::Bridge(BridgeAction::Publish(PublishAction::Server(action)))
}

fn parse_uuid(text: &str) -> Result<Uuid, CommandError> {
    Uuid::parse_str(text).map_err(|_| CommandError::Uuid(text.to_string()))
}

fn parse_role(text: &str) -> Result<Option<Usage>, CommandError> {
    match text.to_ascii_lowercase().as_str() {
        "none" => Ok(None),
        "notify" | "rx" => Ok(Some(Usage::Notify)),
        "write" | "tx" => Ok(Some(Usage::WriteWithoutResponse)),
        _ => Err(CommandError::Role(text.to_string())),
    }
}

/// Parses one console line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (name, args.as_slice()) {
        ("scan", []) => central(DiscoverAction::Scan(ScanAction::Start)),
        ("stop-scan", []) => central(DiscoverAction::Scan(ScanAction::Stop)),
        ("select", [id]) => central(DiscoverAction::Select(Some(PeripheralId::new(*id)))),
        ("select", _) => return Err(CommandError::Arguments { command: "select", expected: "a peripheral id" }),
        ("connect", [id]) => central(DiscoverAction::Peripheral {
            id: PeripheralId::new(*id),
            action: PeripheralAction::Connection(ConnectionAction::Connect),
        }),
        ("connect", _) => return Err(CommandError::Arguments { command: "connect", expected: "a peripheral id" }),
        ("disconnect", []) => selected(PeripheralAction::Connection(ConnectionAction::Disconnect)),
        ("service", [uuid]) => selected(PeripheralAction::SelectService(Some(parse_uuid(uuid)?))),
        ("service", _) => return Err(CommandError::Arguments { command: "service", expected: "a service UUID" }),
        ("use", [service, characteristic, role]) => selected(PeripheralAction::Service {
            id: parse_uuid(service)?,
            action: ServiceAction::Characteristic {
                id: parse_uuid(characteristic)?,
                action: CharacteristicAction::Use(parse_role(role)?),
            },
        }),
        ("use", _) => {
            return Err(CommandError::Arguments {
                command: "use",
                expected: "a service UUID, a characteristic UUID and a role",
            })
        }
        ("transport", [transport]) => match transport.to_ascii_lowercase().as_str() {
            "tcp" => server(ServerAction::SetTransport(Transport::Tcp)),
            "udp" => server(ServerAction::SetTransport(Transport::Udp)),
            _ => return Err(CommandError::Transport(transport.to_string())),
        },
        ("transport", _) => return Err(CommandError::Arguments { command: "transport", expected: "tcp or udp" }),
        // Validation happens in the bridge so that errors show up in its state.
        ("port", [text]) => server(ServerAction::UpdatePort(text.to_string())),
        ("port", []) => server(ServerAction::UpdatePort(String::new())),
        ("port", _) => return Err(CommandError::Arguments { command: "port", expected: "one value" }),
        ("start", []) => server(ServerAction::Start),
        ("stop", []) => server(ServerAction::Stop),
        ("status", []) => Command::Status,
        ("dump", []) => Command::Dump,
        ("help", _) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,
        _ => return Err(CommandError::Unknown(line.trim().to_string())),
    };
    Ok(Some(command))
}

fn adapter_label(state: &AdapterState) -> String {
    match state {
        AdapterState::Authorization(authorization) => format!("Authorization ({:?})", authorization),
        AdapterState::Discover(_) => "Discover".to_string(),
        other => format!("{:?}", other),
    }
}

/// Human readable summary of the bridge.
pub fn render_status(state: &BridgeState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Adapter: {}", adapter_label(&state.central));

    if let Some(discover) = state.central.discover() {
        let _ = writeln!(out, "Scan: {:?}", discover.scan);
        for peripheral in discover.peripherals() {
            let marker = if discover.selected_id() == Some(&peripheral.id) { '*' } else { ' ' };
            let _ = writeln!(
                out,
                "{} {} {:<24} {:>4} dBm  {:?}",
                marker,
                peripheral.id,
                peripheral.name.as_deref().unwrap_or("(unnamed)"),
                peripheral.rssi,
                peripheral.connection
            );
        }
        if let Some(peripheral) = discover.selected_peripheral() {
            let selected_service = peripheral.selected_service().map(|service| service.id);
            for service in peripheral.services() {
                let marker = if selected_service == Some(service.id) { '*' } else { ' ' };
                let _ = writeln!(out, "  {} service {} {}", marker, service.id, service.name);
                for characteristic in service.characteristics() {
                    let _ = writeln!(
                        out,
                        "      {} {} usage={:?} can={:?}",
                        characteristic.id,
                        characteristic.name,
                        characteristic.usage(),
                        characteristic.can_be_used_for()
                    );
                }
            }
        }
    }

    let settings = match &state.publish {
        Some(publish) => publish.server.settings(),
        None => state.settings.clone(),
    };
    let _ = write!(out, "Server: {:?} port {}", settings.transport, settings.port_input);
    match &state.publish {
        Some(publish) => {
            let port = match publish.server.port() {
                Ok(_) => String::new(),
                Err(error) => format!(" ({})", error),
            };
            let _ = writeln!(
                out,
                "{} {:?}, ble->bridge {}, bridge->ble {}",
                port,
                publish.server.phase(),
                format_bytes(publish.traffic.ble_to_bridge),
                format_bytes(publish.traffic.bridge_to_ble)
            );
        }
        None => {
            let _ = writeln!(out, ", no publishable peripheral");
        }
    }
    out
}

/// Reads commands from stdin until `quit` or end of input.
pub async fn run(bridge: &BridgeHandle) -> Result<()> {
    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse(&line) {
            Ok(None) => {}
            Ok(Some(Command::Bridge(action))) => {
                info!("Console: {:?}", action);
                if !bridge.send(action) {
                    warn!("Bridge has stopped");
                    break;
                }
            }
            Ok(Some(Command::Status)) => print!("{}", render_status(&bridge.snapshot())),
            Ok(Some(Command::Dump)) => println!("{}", serde_json::to_string_pretty(&bridge.snapshot())?),
            Ok(Some(Command::Help)) => println!("{}", HELP),
            Ok(Some(Command::Quit)) => break,
            Err(e) => println!("{}", e),
        }
    }
    Ok(())
}
