// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Line-oriented console front-end.

use anyhow::{anyhow, bail, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::engine::{EngineEvent, ReadResult, WriteStep};
use crate::events::{Input, UiEvent, UserAction, WriteOrder};
use crate::tag::{self, TagColor};
use crate::update::UpdateCheck;

pub const HELP: &str = "\
Commands:
  connect                                  scan for and connect to the programmer
  disconnect                               drop the connection
  read                                     read a tag
  write <material-id> <grams> <RRGGBB> [serial]
                                           write both tags of a spool
  wipe                                     erase a tag
  wifi <ssid> <password>                   send WiFi settings to the programmer
  check                                    look for newer firmware
  install                                  install the firmware found by 'check'
  cancel                                   abort the running operation
  status                                   show connection and operation state
  brands                                   list brands
  materials                                list materials
  add-brand <name>                         create a custom brand
  add-material <brand-id> <type> <name>    create a material
  history                                  show recently written spools
  help                                     show this text
  quit                                     exit";

/// Parse one console line. Blank lines and `help` yield `None`.
pub fn parse_command(line: &str) -> Result<Option<UserAction>> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let action = match (command.to_lowercase().as_str(), args.as_slice()) {
        ("help" | "?", _) => return Ok(None),
        ("connect", []) => UserAction::Connect,
        ("disconnect", []) => UserAction::Disconnect,
        ("read", []) => UserAction::Read,
        ("write", [material_id, grams, color, rest @ ..]) if rest.len() <= 1 => {
            UserAction::Write(WriteOrder {
                material_id: material_id.to_string(),
                grams: parse_grams(grams)?,
                color: TagColor::from_hex(color).map_err(|e| anyhow!("{}", e))?,
                custom_serial: rest.first().map(|s| s.to_string()),
            })
        }
        ("wipe", []) => UserAction::Wipe,
        ("wifi", [ssid, password]) => UserAction::WifiConfig {
            ssid: ssid.to_string(),
            password: password.to_string(),
        },
        ("check", []) => UserAction::CheckForUpdate,
        ("install", []) => UserAction::InstallUpdate,
        ("cancel", []) => UserAction::Cancel,
        ("status", []) => UserAction::Status,
        ("brands", []) => UserAction::ListBrands,
        ("materials", []) => UserAction::ListMaterials,
        ("add-brand", name) if !name.is_empty() => UserAction::AddBrand {
            name: name.join(" "),
        },
        ("add-material", [brand_id, material_type, name @ ..]) if !name.is_empty() => {
            UserAction::AddMaterial {
                brand_id: brand_id.to_string(),
                material_type: material_type.to_string(),
                name: name.join(" "),
            }
        }
        ("history", []) => UserAction::ShowHistory,
        ("quit" | "exit", []) => UserAction::Quit,
        (other, _) => bail!("Unknown command or wrong arguments: '{}' (try 'help')", other),
    };
    Ok(Some(action))
}

/// Accepts `750`, `750g` or `1kg`.
fn parse_grams(raw: &str) -> Result<u32> {
    let lower = raw.to_lowercase();
    let grams = if let Some(kg) = lower.strip_suffix("kg") {
        kg.parse::<f64>().map(|kg| (kg * 1000.0).round() as u32)
    } else {
        lower
            .strip_suffix('g')
            .unwrap_or(&lower)
            .parse::<f64>()
            .map(|g| g.round() as u32)
    };
    grams.map_err(|_| anyhow!("Invalid weight '{}'", raw))
}

/// Human-readable rendering of a processor event.
pub fn render(event: &UiEvent) -> String {
    match event {
        UiEvent::Info(message) => message.clone(),
        UiEvent::Error(message) => format!("Error: {}", message),
        UiEvent::Brands(brands) => brands
            .iter()
            .map(|b| format!("{}  {}", b.id, b.display_name()))
            .collect::<Vec<_>>()
            .join("\n"),
        UiEvent::Materials(materials) if materials.is_empty() => {
            "No materials yet (use add-material)".to_string()
        }
        UiEvent::Materials(materials) => materials
            .iter()
            .map(|m| {
                format!(
                    "{}  {} {} ({}, {}m per kg)",
                    m.id,
                    m.brand_name,
                    m.name,
                    m.material_type,
                    m.length_for(1000)
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        UiEvent::History(spools) if spools.is_empty() => "No spools written yet".to_string(),
        UiEvent::History(spools) => spools
            .iter()
            .map(|s| {
                format!(
                    "{}  S/N {}  {} {}  #{}  {}m",
                    s.written_at.format("%Y-%m-%d %H:%M"),
                    s.serial,
                    tag::format_weight(s.weight_grams),
                    s.material_name,
                    s.color,
                    s.length_m
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        UiEvent::Engine(event) => render_engine_event(event),
    }
}

fn render_engine_event(event: &EngineEvent) -> String {
    match event {
        EngineEvent::ConnectionChanged(state) => format!("Connection: {}", state),
        EngineEvent::FirmwareVersion(version) => format!("Firmware version {}", version),
        EngineEvent::ReadCompleted(ReadResult::Blank) => "Tag is blank".to_string(),
        EngineEvent::ReadCompleted(ReadResult::Valid(info)) => format!(
            "Tag: {} | {} | #{} | S/N {}",
            info.material, info.length, info.color, info.serial
        ),
        EngineEvent::ReadCompleted(ReadResult::NotRecognized(reason)) => {
            format!("Tag not recognized: {}", reason)
        }
        EngineEvent::WriteProgress(WriteStep::AwaitingTag1) => {
            "Step 1/3: place tag 1 on the reader".to_string()
        }
        EngineEvent::WriteProgress(WriteStep::AwaitingTag2) => {
            "Step 2/3: tag 1 written, place tag 2".to_string()
        }
        EngineEvent::WriteProgress(step) => format!("Write step {}", step.number()),
        EngineEvent::WriteCompleted { serial, record } => format!(
            "Step 3/3: both tags written (S/N {}, {}m, #{})",
            serial,
            record.length_m,
            record.color.hex()
        ),
        EngineEvent::WriteFailed(reason) => format!("Write failed: {}", reason),
        EngineEvent::WipeCompleted => "Tag wiped".to_string(),
        EngineEvent::WipeTimedOut => "Wipe timed out".to_string(),
        EngineEvent::WifiConfigured => "WiFi configured".to_string(),
        EngineEvent::WifiConfigFailed(reason) => format!("WiFi failed: {}", reason),
        EngineEvent::UpdateInstalled => "Update successful! Device rebooting...".to_string(),
        EngineEvent::UpdateFailed(reason) => format!("Update failed: {}", reason),
        EngineEvent::UpdateRebooting => "Device rebooting, waiting to reconnect".to_string(),
        EngineEvent::Aborted { operation, reason } => {
            format!("{} aborted: {}", operation, reason)
        }
        EngineEvent::Cancelled(operation) => format!("{} cancelled", operation),
        EngineEvent::DeviceUpdateAvailable { version, .. } => {
            format!("Version {} available ('install' to update)", version)
        }
        EngineEvent::DeviceUpToDate => "Firmware is up to date".to_string(),
        EngineEvent::UpdateCheck(UpdateCheck::UpToDate { current }) => {
            format!("Firmware is up to date ({})", current)
        }
        EngineEvent::UpdateCheck(UpdateCheck::UpdateAvailable { version, .. }) => {
            format!("Update available: {} ('install' to update)", version)
        }
        EngineEvent::UpdateCheck(UpdateCheck::UpdateAvailableNoAsset { version }) => format!(
            "Update exists ({}) but no firmware asset found on the release",
            version
        ),
        EngineEvent::UpdateCheck(UpdateCheck::CheckFailed(e)) => {
            format!("Update check failed: {}", e)
        }
        EngineEvent::Diagnostic(text) => format!("Device: {}", text),
    }
}

/// Read stdin lines and post them as actions.
pub async fn read_stdin(inputs: mpsc::Sender<Input>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Ok(Some(action)) => {
                let quit = action == UserAction::Quit;
                if inputs.send(Input::Action(action)).await.is_err() || quit {
                    break;
                }
            }
            Ok(None) if !line.trim().is_empty() => println!("{}", HELP),
            Ok(None) => {}
            Err(e) => println!("{}", e),
        }
    }

    debug!("Console input closed");
    // End of input behaves like `quit`.
    let _ = inputs.send(Input::Action(UserAction::Quit)).await;
    Ok(())
}

/// Print processor output until the channel closes.
pub async fn print_events(mut events: mpsc::UnboundedReceiver<UiEvent>) {
    while let Some(event) = events.recv().await {
        println!("{}", render(&event));
    }
    info!("Console output closed");
}
