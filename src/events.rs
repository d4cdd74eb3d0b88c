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

//! Event processing and dispatch.
//!
//! Link events, user actions, update results and timer ticks all arrive on
//! one channel and are handled strictly one at a time here. Nothing else
//! mutates the engine.

use chrono::Local;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::bluetooth::{ConnectionState, LinkEvent};
use crate::engine::{EngineEvent, OperationKind, ProtocolEngine, WriteRequest, WriteStep};
use crate::error::{EngineError, TransportError, UpdateCheckError};
use crate::state::AppState;
use crate::storage::{Brand, Material, MaterialStore, SpoolHistory, SpoolRecord};
use crate::tag::{self, TagColor};
use crate::update::{ReleaseSource, UpdateCheck, UpdateChecker};

/// Everything the processor reacts to.
#[derive(Debug)]
pub enum Input {
    Link(LinkEvent),
    Action(UserAction),
    /// Result of an update check started for connection `generation`.
    UpdateChecked {
        generation: u64,
        outcome: UpdateCheck,
    },
    Tick,
}

/// A spool the user wants written.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOrder {
    pub material_id: String,
    pub grams: u32,
    pub color: TagColor,
    pub custom_serial: Option<String>,
}

/// Requests coming from a front-end.
#[derive(Debug, Clone, PartialEq)]
pub enum UserAction {
    Connect,
    Disconnect,
    Read,
    Write(WriteOrder),
    Wipe,
    WifiConfig { ssid: String, password: String },
    CheckForUpdate,
    InstallUpdate,
    Cancel,
    Status,
    ListBrands,
    ListMaterials,
    AddBrand { name: String },
    AddMaterial {
        brand_id: String,
        material_type: String,
        name: String,
    },
    ShowHistory,
    Quit,
}

/// What the processor reports back to the front-end.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Engine(EngineEvent),
    Info(String),
    Error(String),
    Brands(Vec<Brand>),
    Materials(Vec<Material>),
    History(Vec<SpoolRecord>),
}

/// Whether the processor should keep running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Material and weight of the write in flight, for the history entry.
struct WriteContext {
    material: Material,
    grams: u32,
}

/// Single owner of the engine and the stores.
pub struct EventProcessor<S> {
    engine: ProtocolEngine,
    materials: MaterialStore,
    history: Option<SpoolHistory>,
    state: Arc<AppState>,
    checker: Arc<UpdateChecker<S>>,
    inputs: mpsc::Sender<Input>,
    ui: mpsc::UnboundedSender<UiEvent>,
    batch: String,
    pending_write: Option<WriteContext>,
}

impl<S: ReleaseSource + 'static> EventProcessor<S> {
    /// `inputs` is the sending side of the channel this processor reads.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: ProtocolEngine,
        materials: MaterialStore,
        history: Option<SpoolHistory>,
        state: Arc<AppState>,
        checker: UpdateChecker<S>,
        inputs: mpsc::Sender<Input>,
        ui: mpsc::UnboundedSender<UiEvent>,
        batch: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            materials,
            history,
            state,
            checker: Arc::new(checker),
            inputs,
            ui,
            batch: batch.into(),
            pending_write: None,
        }
    }

    pub fn engine(&self) -> &ProtocolEngine {
        &self.engine
    }

    /// Process inputs until the channel closes or the user quits.
    pub async fn run(mut self, mut inputs: mpsc::Receiver<Input>) {
        info!("Event processor started");
        while let Some(input) = inputs.recv().await {
            if self.process(input) == Flow::Quit {
                break;
            }
        }
        info!("Event processor stopped");
    }

    /// Handle one input.
    pub fn process(&mut self, input: Input) -> Flow {
        let flow = match input {
            Input::Link(event) => {
                let events = self.engine.handle_link_event(event);
                self.publish(events);
                Flow::Continue
            }
            Input::Action(action) => self.handle_action(action),
            Input::UpdateChecked {
                generation,
                outcome,
            } => {
                if let Some(event) = self.engine.apply_update_check(generation, outcome) {
                    self.publish(vec![event]);
                }
                Flow::Continue
            }
            Input::Tick => {
                let events = self.engine.check_timeouts(Instant::now());
                self.publish(events);
                Flow::Continue
            }
        };

        self.state.sync(&self.engine);
        flow
    }

    fn handle_action(&mut self, action: UserAction) -> Flow {
        debug!("User action: {:?}", action);

        let result = match action {
            UserAction::Connect => {
                if self.engine.connection_state() == ConnectionState::Idle {
                    let events = self.engine.start();
                    self.publish(events);
                } else {
                    self.info(format!("Already {}", self.engine.connection_state()));
                }
                Ok(())
            }
            UserAction::Disconnect => {
                let events = self.engine.disconnect();
                self.publish(events);
                Ok(())
            }
            UserAction::Read => self.engine.read().map(|()| self.info("Place a tag on the reader")),
            UserAction::Write(order) => self.start_write(order),
            UserAction::Wipe => self.engine.wipe().map(|()| self.info("Wiping tag...")),
            UserAction::WifiConfig { ssid, password } => self
                .engine
                .wifi_config(&ssid, &password)
                .map(|()| self.info(format!("Sending WiFi settings for {}", ssid))),
            UserAction::CheckForUpdate => {
                self.start_update_check();
                Ok(())
            }
            UserAction::InstallUpdate => self
                .engine
                .install_update()
                .map(|()| self.info("Updating firmware...")),
            UserAction::Cancel => self.engine.cancel().map(|kind| {
                if kind == OperationKind::Write {
                    self.pending_write = None;
                }
                self.publish(vec![EngineEvent::Cancelled(kind)]);
            }),
            UserAction::Status => {
                self.info(self.state.summary());
                Ok(())
            }
            UserAction::ListBrands => {
                self.send(UiEvent::Brands(self.materials.brands()));
                Ok(())
            }
            UserAction::ListMaterials => {
                self.send(UiEvent::Materials(self.materials.materials()));
                Ok(())
            }
            UserAction::AddBrand { name } => {
                match self.materials.create_brand(&name, "") {
                    Ok(brand) => self.info(format!("Brand {} is {}", brand.name, brand.id)),
                    Err(e) => self.error(format!("Could not create brand: {:#}", e)),
                }
                Ok(())
            }
            UserAction::AddMaterial {
                brand_id,
                material_type,
                name,
            } => {
                match self
                    .materials
                    .create_material(&brand_id, &name, &material_type)
                {
                    Ok(material) => self.info(format!(
                        "Created {} ({}, {} g/cm³)",
                        material.id, material.name, material.density
                    )),
                    Err(e) => self.error(format!("Could not create material: {:#}", e)),
                }
                Ok(())
            }
            UserAction::ShowHistory => {
                match &self.history {
                    Some(history) => match history.recent(20) {
                        Ok(spools) => self.send(UiEvent::History(spools)),
                        Err(e) => self.error(format!("Could not read history: {:#}", e)),
                    },
                    None => self.info("Spool history is disabled"),
                }
                Ok(())
            }
            UserAction::Quit => return Flow::Quit,
        };

        if let Err(e) = result {
            warn!("Request rejected: {}", e);
            self.error(e.to_string());
        }
        Flow::Continue
    }

    fn start_write(&mut self, order: WriteOrder) -> Result<(), EngineError> {
        let material = self.materials.material(&order.material_id).ok_or_else(|| {
            EngineError::InvalidArgument(format!("unknown material {}", order.material_id))
        })?;
        if order.grams == 0 {
            return Err(EngineError::InvalidArgument(
                "spool weight must be positive".to_string(),
            ));
        }

        let request = WriteRequest {
            vendor_id: material.brand_id.clone(),
            batch: self.batch.clone(),
            film_id: material.film_id,
            color: order.color,
            length_m: material.length_for(order.grams),
            custom_serial: order.custom_serial,
            date: Local::now().date_naive(),
        };

        let serial = self
            .engine
            .write_dual_tag(request, self.materials.allocator())?;
        info!(
            "Writing {} {} as serial {}",
            tag::format_weight(order.grams),
            material.name,
            serial
        );

        self.pending_write = Some(WriteContext {
            material,
            grams: order.grams,
        });
        self.publish(vec![EngineEvent::WriteProgress(WriteStep::AwaitingTag1)]);
        Ok(())
    }

    fn start_update_check(&mut self) {
        if self.engine.connection_state() != ConnectionState::Ready {
            self.error(TransportError::NotConnected.to_string());
            return;
        }
        let Some(current) = self.engine.firmware_version().map(str::to_string) else {
            self.error(UpdateCheckError::UnknownDeviceVersion.to_string());
            return;
        };

        let checker = self.checker.clone();
        let inputs = self.inputs.clone();
        let generation = self.engine.generation();
        self.info(format!("Checking {} for updates...", checker.repo()));

        tokio::spawn(async move {
            let outcome = checker.check_for_update(&current).await;
            if inputs
                .send(Input::UpdateChecked {
                    generation,
                    outcome,
                })
                .await
                .is_err()
            {
                debug!("Event processor gone before update check finished");
            }
        });
    }

    fn publish(&mut self, events: Vec<EngineEvent>) {
        for event in events {
            match &event {
                EngineEvent::WriteCompleted { serial, record } => {
                    if let Some(context) = self.pending_write.take() {
                        self.record_spool(&context, &serial.to_string(), record);
                    }
                }
                EngineEvent::WriteFailed(_)
                | EngineEvent::Aborted {
                    operation: OperationKind::Write,
                    ..
                } => {
                    self.pending_write = None;
                }
                _ => {}
            }
            self.send(UiEvent::Engine(event));
        }
    }

    fn record_spool(&self, context: &WriteContext, serial: &str, record: &tag::TagRecord) {
        let Some(history) = &self.history else {
            return;
        };

        let spool = SpoolRecord::new(
            serial,
            context.material.id.clone(),
            context.material.name.clone(),
            record.length_m,
            context.grams,
            record.color.hex(),
            tag::encode(record).unwrap_or_default(),
        );
        if let Err(e) = history.add_spool(&spool) {
            error!("Failed to record spool {}: {:#}", serial, e);
        }
    }

    fn info(&self, message: impl Into<String>) {
        let message = message.into();
        self.state.set_last_message(message.clone());
        self.send(UiEvent::Info(message));
    }

    fn error(&self, message: impl Into<String>) {
        let message = message.into();
        self.state.set_last_message(message.clone());
        self.send(UiEvent::Error(message));
    }

    fn send(&self, event: UiEvent) {
        if self.ui.send(event).is_err() {
            debug!("Front-end channel closed");
        }
    }
}
