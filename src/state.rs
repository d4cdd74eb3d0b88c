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

//! Application state management.
//!
//! A read-only snapshot of the engine for front-ends. Only the event
//! processor writes to it.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::bluetooth::ConnectionState;
use crate::engine::{OperationKind, PendingUpdate, ProtocolEngine, WriteStep};

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    pub connection_state: RwLock<ConnectionState>,
    pub firmware_version: RwLock<Option<String>>,
    pub pending_update: RwLock<Option<PendingUpdate>>,
    pub active_operation: RwLock<Option<OperationKind>>,
    pub write_step: RwLock<WriteStep>,
    /// Last user-facing status message.
    pub last_message: RwLock<Option<String>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            connection_state: RwLock::new(ConnectionState::Idle),
            firmware_version: RwLock::new(None),
            pending_update: RwLock::new(None),
            active_operation: RwLock::new(None),
            write_step: RwLock::new(WriteStep::Idle),
            last_message: RwLock::new(None),
        }
    }
}

impl AppState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Copy the engine's observable state.
    pub fn sync(&self, engine: &ProtocolEngine) {
        *self.connection_state.write() = engine.connection_state();
        *self.firmware_version.write() = engine.firmware_version().map(str::to_string);
        *self.pending_update.write() = engine.pending_update().cloned();
        *self.active_operation.write() = engine.active_operation();
        *self.write_step.write() = engine.write_step();
    }

    pub fn set_last_message(&self, message: impl Into<String>) {
        *self.last_message.write() = Some(message.into());
    }

    pub fn get_connection_state(&self) -> ConnectionState {
        *self.connection_state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.get_connection_state() == ConnectionState::Ready
    }

    pub fn get_firmware_version(&self) -> Option<String> {
        self.firmware_version.read().clone()
    }

    pub fn get_pending_update(&self) -> Option<PendingUpdate> {
        self.pending_update.read().clone()
    }

    pub fn get_write_step(&self) -> WriteStep {
        *self.write_step.read()
    }

    pub fn get_last_message(&self) -> Option<String> {
        self.last_message.read().clone()
    }

    /// One-line summary for the `status` command.
    pub fn summary(&self) -> String {
        let mut line = format!("Connection: {}", self.get_connection_state());
        if let Some(version) = self.get_firmware_version() {
            line.push_str(&format!(" | Firmware: {}", version));
        }
        if let Some(operation) = *self.active_operation.read() {
            line.push_str(&format!(" | Busy: {}", operation));
        }
        let step = self.get_write_step();
        if step != WriteStep::Idle {
            line.push_str(&format!(" | Write step: {}/3", step.number()));
        }
        if let Some(update) = self.get_pending_update() {
            line.push_str(&format!(" | Update available: {}", update.version));
        }
        line
    }
}
