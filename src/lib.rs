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

//! Linux companion for the CFS RFID tag programmer.
//!
//! Talks to the programmer over BLE, encodes spool records into the 48
//! character tag layout and keeps the local material database and spool
//! history.

pub mod allocator;
pub mod bluetooth;
pub mod config;
pub mod console;
pub mod engine;
pub mod error;
pub mod events;
pub mod state;
pub mod storage;
pub mod tag;
pub mod update;
