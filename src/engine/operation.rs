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

//! In-flight device operations.
//!
//! The device never says which command a message answers. Each operation
//! therefore owns the table of messages it accepts, and everything else is
//! ignored while it is active.

use std::fmt;
use std::time::Instant;

use crate::bluetooth::{DeviceMessage, TagInfo};
use crate::tag::{Serial, TagRecord};

/// Which operation is (or was) active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Read,
    Write,
    Wipe,
    WifiConfig,
    OtaUpdate,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Wipe => "wipe",
            Self::WifiConfig => "wifi config",
            Self::OtaUpdate => "firmware update",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress through a dual-tag write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WriteStep {
    Idle = 0,
    AwaitingTag1 = 1,
    AwaitingTag2 = 2,
    Complete = 3,
}

impl WriteStep {
    pub fn number(&self) -> u8 {
        *self as u8
    }
}

/// Result of reading a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResult {
    Blank,
    Valid(TagInfo),
    NotRecognized(String),
}

/// Terminal result of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    ReadCompleted(ReadResult),
    WriteCompleted { serial: Serial, record: TagRecord },
    WriteFailed(String),
    WipeCompleted,
    WifiConfigured,
    WifiConfigFailed(String),
    UpdateInstalled,
    UpdateFailed(String),
}

/// What an inbound message does to the active operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Ignore,
    Advance(Operation),
    Finish(Outcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Read,
    WriteDualTag {
        step: WriteStep,
        serial: Serial,
        record: TagRecord,
    },
    Wipe {
        deadline: Instant,
    },
    WifiConfig,
    OtaUpdate {
        url: String,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Read => OperationKind::Read,
            Self::WriteDualTag { .. } => OperationKind::Write,
            Self::Wipe { .. } => OperationKind::Wipe,
            Self::WifiConfig => OperationKind::WifiConfig,
            Self::OtaUpdate { .. } => OperationKind::OtaUpdate,
        }
    }

    pub fn write_step(&self) -> Option<WriteStep> {
        match self {
            Self::WriteDualTag { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Positional correlation table.
    pub fn on_message(&self, message: &DeviceMessage) -> Transition {
        use DeviceMessage as M;

        match (self, message) {
            (Self::Read, M::BlankTag) => Transition::Finish(Outcome::ReadCompleted(ReadResult::Blank)),
            (Self::Read, M::TagData(info)) => {
                Transition::Finish(Outcome::ReadCompleted(ReadResult::Valid(info.clone())))
            }
            (Self::Read, M::MalformedTagData(payload)) => Transition::Finish(
                Outcome::ReadCompleted(ReadResult::NotRecognized(format!(
                    "malformed tag data: {}",
                    payload
                ))),
            ),
            (Self::Read, M::Error(reason)) => Transition::Finish(Outcome::ReadCompleted(
                ReadResult::NotRecognized(reason.clone()),
            )),

            (
                Self::WriteDualTag {
                    step: WriteStep::AwaitingTag1,
                    serial,
                    record,
                },
                M::Tag1Written,
            ) => Transition::Advance(Self::WriteDualTag {
                step: WriteStep::AwaitingTag2,
                serial: *serial,
                record: record.clone(),
            }),
            // A completion ack while still waiting for tag 1 also ends the write.
            (
                Self::WriteDualTag {
                    step: WriteStep::AwaitingTag1 | WriteStep::AwaitingTag2,
                    serial,
                    record,
                },
                M::Tag2Written,
            ) => Transition::Finish(Outcome::WriteCompleted {
                serial: *serial,
                record: record.clone(),
            }),
            (Self::WriteDualTag { .. }, M::Error(reason)) => {
                Transition::Finish(Outcome::WriteFailed(reason.clone()))
            }

            (Self::Wipe { .. }, M::WipeOk) => Transition::Finish(Outcome::WipeCompleted),

            (Self::WifiConfig, M::WifiOk) => Transition::Finish(Outcome::WifiConfigured),
            (Self::WifiConfig, M::Error(reason)) => {
                Transition::Finish(Outcome::WifiConfigFailed(reason.clone()))
            }

            (Self::OtaUpdate { .. }, M::UpdateSuccess) => {
                Transition::Finish(Outcome::UpdateInstalled)
            }
            (Self::OtaUpdate { .. }, M::Error(reason)) => {
                Transition::Finish(Outcome::UpdateFailed(reason.clone()))
            }

            _ => Transition::Ignore,
        }
    }
}
