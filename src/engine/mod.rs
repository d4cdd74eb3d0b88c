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

//! Protocol engine.
//!
//! Turns user requests into device commands and the device's replies into
//! typed results, one operation at a time.

mod operation;
mod protocol_engine;

pub use operation::{Operation, OperationKind, Outcome, ReadResult, Transition, WriteStep};
pub use protocol_engine::{
    EngineEvent, PendingUpdate, ProtocolEngine, WriteRequest, DEFAULT_WIPE_TIMEOUT,
};
