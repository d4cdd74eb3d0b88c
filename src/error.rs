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

//! Error types shared across the programmer core.

use thiserror::Error;

use crate::engine::OperationKind;

/// Errors raised while handing a frame to the BLE link.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The session is not in the `Ready` state.
    #[error("Not connected to the programmer")]
    NotConnected,

    /// The link driver is gone or rejected the frame.
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Errors raised while encoding a tag record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// A field value does not fit its fixed width.
    #[error("Field '{field}' is too wide: {actual} chars (max: {max})")]
    FieldTooWide {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    /// A text field contains characters the tag layout cannot hold.
    #[error("Field '{field}' contains invalid characters: {value:?}")]
    InvalidCharacter { field: &'static str, value: String },
}

/// Errors raised while decoding a tag record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload is shorter than the fixed record length.
    #[error("Tag data too short: expected {expected} chars, got {actual}")]
    TooShort { expected: usize, actual: usize },

    /// Payload contains non-ASCII characters.
    #[error("Tag data is not ASCII")]
    NonAscii,

    /// A fixed-width field could not be parsed.
    #[error("Invalid {field} field: {value:?}")]
    InvalidField { field: &'static str, value: String },
}

/// Errors raised by the identifier/serial allocator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// No unused serial was found within the retry bound.
    #[error("No unused serial found after {attempts} attempts")]
    SerialSpaceExhausted { attempts: u32 },

    /// The custom brand id space (F001-F999) is used up.
    #[error("Brand id space exhausted")]
    BrandSpaceExhausted,

    /// The per-brand material id space (0001-9999) is used up.
    #[error("Material id space exhausted for brand {brand_id}")]
    MaterialSpaceExhausted { brand_id: String },

    /// The registry could not persist the allocation.
    #[error("Failed to persist allocation: {0}")]
    Persist(String),
}

/// Errors raised while checking for a firmware update.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateCheckError {
    #[error("Invalid repo format '{0}'. Use: owner/repo")]
    InvalidRepo(String),

    #[error("No internet connection.")]
    NoInternet,

    #[error("Cannot reach the release server (DNS/VPN/adblock/captive portal).")]
    HostUnreachable,

    #[error("Request timed out.")]
    TimedOut,

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Unexpected release data: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Device firmware version not reported yet")]
    UnknownDeviceVersion,
}

/// Errors returned when the engine rejects a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Another operation is still in flight.
    #[error("{0} operation already in progress")]
    Busy(OperationKind),

    #[error("No operation to cancel")]
    NothingToCancel,

    /// User supplied serial is not exactly six digits.
    #[error("Invalid serial {0:?}: expected 6 digits")]
    InvalidSerial(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No firmware update pending")]
    NoPendingUpdate,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

/// Reasons a brand cannot be removed from the material database.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrandDeletionError {
    #[error("Brand {0} not found")]
    NotFound(String),

    #[error("Brand still has {count} materials")]
    HasMaterials { count: usize },

    #[error("Official brands cannot be deleted")]
    IsOfficial,

    #[error("Failed to save material database: {0}")]
    Persist(String),
}
