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

//! Connection lifecycle for the programmer link.
//!
//! The session never touches BlueZ directly. It reacts to [`LinkEvent`]s
//! reported by the driver and asks the driver for work by posting
//! [`LinkCommand`]s on an unbounded channel, so sending never blocks.

use std::fmt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use super::protocol::{Command, DeviceMessage};
use crate::error::TransportError;

/// State of the link to the programmer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Scanning,
    Connecting,
    DiscoveringServices,
    Ready,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Connecting => "connecting",
            Self::DiscoveringServices => "discovering services",
            Self::Ready => "ready",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events reported by the link driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// An advertiser was seen while scanning.
    Discovered {
        address: String,
        name: Option<String>,
    },
    Connected,
    ConnectFailed(String),
    /// Command and notify characteristics found and subscribed.
    EndpointsResolved,
    Disconnected(String),
    /// One notification from the response characteristic.
    Notification(Vec<u8>),
}

/// Work requested from the link driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    StartScan,
    StopScan,
    Connect(String),
    DiscoverServices,
    Write(Vec<u8>),
    Disconnect,
}

/// What the session tells its owner after handling a link event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    Message(DeviceMessage),
    /// An established or in-progress link went away.
    LinkLost(String),
}

/// Connection state machine over an injected link driver.
pub struct TransportSession {
    link: UnboundedSender<LinkCommand>,
    device_name: String,
    state: ConnectionState,
    peer: Option<String>,
    generation: u64,
}

impl TransportSession {
    pub fn new(link: UnboundedSender<LinkCommand>, device_name: impl Into<String>) -> Self {
        Self {
            link,
            device_name: device_name.into(),
            state: ConnectionState::Idle,
            peer: None,
            generation: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// Address of the connected (or connecting) programmer.
    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    /// Incremented every time the link becomes ready.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Begin scanning. No-op unless idle.
    pub fn start(&mut self) -> Vec<SessionEvent> {
        if self.state != ConnectionState::Idle {
            debug!("start() ignored in state {}", self.state);
            return Vec::new();
        }
        info!("Scanning for {}", self.device_name);
        self.post(LinkCommand::StartScan);
        vec![self.transition(ConnectionState::Scanning)]
    }

    /// Apply one driver event.
    pub fn handle(&mut self, event: LinkEvent) -> Vec<SessionEvent> {
        match (self.state, event) {
            (ConnectionState::Scanning, LinkEvent::Discovered { address, name }) => {
                if name.as_deref() != Some(self.device_name.as_str()) {
                    return Vec::new();
                }
                info!("Found {} at {}", self.device_name, address);
                self.post(LinkCommand::StopScan);
                self.post(LinkCommand::Connect(address.clone()));
                self.peer = Some(address);
                vec![self.transition(ConnectionState::Connecting)]
            }
            (ConnectionState::Connecting, LinkEvent::Connected) => {
                self.post(LinkCommand::DiscoverServices);
                vec![self.transition(ConnectionState::DiscoveringServices)]
            }
            (ConnectionState::DiscoveringServices, LinkEvent::EndpointsResolved) => {
                self.generation += 1;
                let events = vec![self.transition(ConnectionState::Ready)];
                info!(
                    "Programmer ready (connection #{})",
                    self.generation
                );
                if let Err(e) = self.send(&Command::GetVersion) {
                    warn!("Failed to request firmware version: {}", e);
                }
                events
            }
            (ConnectionState::Ready, LinkEvent::Notification(payload)) => {
                let message = DeviceMessage::from_payload(&payload);
                debug!("Received: {:?}", message);
                vec![SessionEvent::Message(message)]
            }
            (
                ConnectionState::Idle,
                LinkEvent::Disconnected(_) | LinkEvent::ConnectFailed(_),
            ) => Vec::new(),
            (_, LinkEvent::Disconnected(reason)) | (_, LinkEvent::ConnectFailed(reason)) => {
                self.recover(reason)
            }
            (state, event) => {
                debug!("Ignoring {:?} in state {}", event, state);
                Vec::new()
            }
        }
    }

    /// Hand a command to the driver. Only valid while ready.
    pub fn send(&self, command: &Command) -> Result<(), TransportError> {
        if !self.is_ready() {
            warn!("Cannot send {}: not connected", command);
            return Err(TransportError::NotConnected);
        }

        debug!("Sending {}", command);
        self.link
            .send(LinkCommand::Write(command.to_wire().into_bytes()))
            .map_err(|_| TransportError::SendFailed("link driver stopped".to_string()))
    }

    /// Ask the driver to drop the link.
    ///
    /// A scan ends locally since the driver reports nothing for it. For a
    /// live link the state follows the resulting `Disconnected` event.
    pub fn disconnect(&mut self) -> Vec<SessionEvent> {
        match self.state {
            ConnectionState::Idle => Vec::new(),
            ConnectionState::Scanning => {
                info!("Scan stopped");
                self.post(LinkCommand::StopScan);
                vec![self.transition(ConnectionState::Idle)]
            }
            _ => {
                self.post(LinkCommand::Disconnect);
                Vec::new()
            }
        }
    }

    /// Back to idle, then straight into a new scan.
    fn recover(&mut self, reason: String) -> Vec<SessionEvent> {
        warn!("Link lost in state {}: {}", self.state, reason);
        self.peer = None;

        let mut events = vec![
            self.transition(ConnectionState::Idle),
            SessionEvent::LinkLost(reason),
        ];
        events.extend(self.start());
        events
    }

    fn transition(&mut self, next: ConnectionState) -> SessionEvent {
        debug!("Connection state {} -> {}", self.state, next);
        self.state = next;
        SessionEvent::StateChanged(next)
    }

    fn post(&self, command: LinkCommand) {
        if self.link.send(command).is_err() {
            warn!("Link driver is not running");
        }
    }
}
