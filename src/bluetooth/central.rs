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

//! BLE central driver built on BlueZ.
//!
//! Executes [`LinkCommand`]s and reports what happened as [`LinkEvent`]s.
//! All protocol decisions live in the session; this side only moves bytes.

use anyhow::{anyhow, Context, Result};
use bluer::gatt::remote::Characteristic;
use bluer::{Adapter, AdapterEvent, Address, Device, DeviceEvent, DeviceProperty};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::str::FromStr;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::ble_constants::{timing, COMMAND_RX_UUID, RESPONSE_TX_UUID, SERVICE_UUID};
use super::session::{LinkCommand, LinkEvent};

/// Live streams the driver is waiting on.
#[derive(Default)]
struct Streams {
    discovery: Option<BoxStream<'static, AdapterEvent>>,
    notifications: Option<BoxStream<'static, Vec<u8>>>,
    device_events: Option<BoxStream<'static, DeviceEvent>>,
}

/// BlueZ-backed link driver.
pub struct BleCentral {
    adapter: Adapter,
    events: mpsc::Sender<LinkEvent>,
    device: Option<Device>,
    command_char: Option<Characteristic>,
}

impl BleCentral {
    /// Open a BlueZ session and power on the default adapter.
    pub async fn new(events: mpsc::Sender<LinkEvent>) -> Result<Self> {
        info!("Initializing BLE central...");

        let session = bluer::Session::new().await?;
        info!("BlueZ session created");

        let adapter = session.default_adapter().await?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        if !adapter.is_powered().await? {
            info!("Powering on Bluetooth adapter...");
            adapter.set_powered(true).await?;
        }

        Ok(Self {
            adapter,
            events,
            device: None,
            command_char: None,
        })
    }

    /// Serve commands until the command channel closes.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<LinkCommand>) -> Result<()> {
        let mut streams = Streams::default();

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        info!("Link command channel closed, stopping BLE central");
                        break;
                    };
                    self.execute(command, &mut streams).await;
                }
                Some(event) = next_or_pending(&mut streams.discovery) => {
                    self.on_adapter_event(event).await;
                }
                payload = next_or_pending(&mut streams.notifications) => {
                    match payload {
                        Some(payload) => self.emit(LinkEvent::Notification(payload)).await,
                        None => {
                            self.lost(&mut streams, "notification stream ended").await;
                        }
                    }
                }
                Some(event) = next_or_pending(&mut streams.device_events) => {
                    if let DeviceEvent::PropertyChanged(DeviceProperty::Connected(false)) = event {
                        self.lost(&mut streams, "device disconnected").await;
                    }
                }
            }

            if self.events.is_closed() {
                info!("Link event receiver dropped, stopping BLE central");
                break;
            }
        }

        self.teardown(&mut streams).await;
        Ok(())
    }

    async fn execute(&mut self, command: LinkCommand, streams: &mut Streams) {
        match command {
            LinkCommand::StartScan => match self.adapter.discover_devices().await {
                Ok(stream) => {
                    debug!("Discovery started");
                    streams.discovery = Some(stream.boxed());
                }
                Err(e) => error!("Failed to start discovery: {}", e),
            },
            LinkCommand::StopScan => {
                // Dropping the stream ends the discovery session.
                streams.discovery = None;
                debug!("Discovery stopped");
            }
            LinkCommand::Connect(address) => match self.connect(&address, streams).await {
                Ok(()) => self.emit(LinkEvent::Connected).await,
                Err(e) => {
                    warn!("Connection to {} failed: {:#}", address, e);
                    self.teardown(streams).await;
                    self.emit(LinkEvent::ConnectFailed(e.to_string())).await;
                }
            },
            LinkCommand::DiscoverServices => match self.resolve_endpoints(streams).await {
                Ok(()) => self.emit(LinkEvent::EndpointsResolved).await,
                Err(e) => {
                    warn!("Service discovery failed: {:#}", e);
                    self.teardown(streams).await;
                    self.emit(LinkEvent::ConnectFailed(e.to_string())).await;
                }
            },
            LinkCommand::Write(payload) => {
                let Some(characteristic) = &self.command_char else {
                    warn!("Write requested without a command characteristic");
                    return;
                };
                if let Err(e) = characteristic.write(&payload).await {
                    error!("Write failed: {}", e);
                }
            }
            LinkCommand::Disconnect => {
                if self.device.is_some() {
                    self.lost(streams, "disconnect requested").await;
                }
            }
        }
    }

    async fn on_adapter_event(&self, event: AdapterEvent) {
        let AdapterEvent::DeviceAdded(address) = event else {
            return;
        };
        let name = match self.adapter.device(address) {
            Ok(device) => device.name().await.ok().flatten(),
            Err(_) => None,
        };
        self.emit(LinkEvent::Discovered {
            address: address.to_string(),
            name,
        })
        .await;
    }

    async fn connect(&mut self, address: &str, streams: &mut Streams) -> Result<()> {
        let address = Address::from_str(address).map_err(|e| anyhow!("{}", e))?;
        let device = self.adapter.device(address)?;

        info!("Connecting to {}...", address);
        if !device.is_connected().await? {
            device.connect().await.context("connect")?;
        }

        streams.device_events = Some(device.events().await?.boxed());
        self.device = Some(device);
        Ok(())
    }

    async fn resolve_endpoints(&mut self, streams: &mut Streams) -> Result<()> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| anyhow!("No device connected"))?;

        tokio::time::timeout(timing::SERVICE_RESOLVE_TIMEOUT, async {
            while !device.is_services_resolved().await? {
                tokio::time::sleep(timing::SERVICE_RESOLVE_POLL).await;
            }
            Ok::<_, bluer::Error>(())
        })
        .await
        .map_err(|_| anyhow!("Timed out waiting for services"))??;

        let mut command_char = None;
        let mut response_char = None;

        for service in device.services().await? {
            if service.uuid().await? != SERVICE_UUID {
                continue;
            }
            for characteristic in service.characteristics().await? {
                let uuid = characteristic.uuid().await?;
                if uuid == COMMAND_RX_UUID {
                    command_char = Some(characteristic);
                } else if uuid == RESPONSE_TX_UUID {
                    response_char = Some(characteristic);
                }
            }
        }

        let command_char =
            command_char.ok_or_else(|| anyhow!("Command characteristic not found"))?;
        let response_char =
            response_char.ok_or_else(|| anyhow!("Response characteristic not found"))?;

        streams.notifications = Some(response_char.notify().await?.boxed());
        self.command_char = Some(command_char);
        info!("Subscribed to programmer notifications");
        Ok(())
    }

    /// Drop the link and report it exactly once.
    async fn lost(&mut self, streams: &mut Streams, reason: &str) {
        if self.device.is_none() {
            return;
        }
        info!("Link lost: {}", reason);
        self.teardown(streams).await;
        self.emit(LinkEvent::Disconnected(reason.to_string())).await;
    }

    async fn teardown(&mut self, streams: &mut Streams) {
        streams.notifications = None;
        streams.device_events = None;
        self.command_char = None;

        if let Some(device) = self.device.take() {
            if let Err(e) = device.disconnect().await {
                debug!("Disconnect: {}", e);
            }
        }
    }

    async fn emit(&self, event: LinkEvent) {
        if self.events.send(event).await.is_err() {
            debug!("Link event receiver dropped");
        }
    }
}

async fn next_or_pending<S>(stream: &mut Option<S>) -> Option<S::Item>
where
    S: Stream + Unpin,
{
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
