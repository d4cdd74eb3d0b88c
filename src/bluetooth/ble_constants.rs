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

//! BLE service and characteristic UUIDs exposed by the programmer.

use std::time::Duration;
use uuid::Uuid;

/// Programmer GATT service UUID.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b);

/// Command characteristic (we write commands here).
/// Properties: Write
pub const COMMAND_RX_UUID: Uuid = Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a8);

/// Response characteristic (device notifies here).
/// Properties: Notify
pub const RESPONSE_TX_UUID: Uuid = Uuid::from_u128(0x1c95d5e3_d8f7_413a_bf3d_7a2e5d7be87e);

/// Advertised name of the programmer.
pub const DEFAULT_DEVICE_NAME: &str = "CFS-Programmer";

/// Driver timing constants.
pub mod timing {
    use super::Duration;

    /// How long to wait for BlueZ to resolve services after connecting.
    pub const SERVICE_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);
    /// Poll interval while waiting for service resolution.
    pub const SERVICE_RESOLVE_POLL: Duration = Duration::from_millis(100);
}
