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

//! Filament tag data.
//!
//! The fixed-width record stored on each tag, plus the spool length maths
//! used to fill in its length field.

pub mod length;
pub mod record;

pub use length::{
    default_density, format_weight, length_for_weight, weight_for_length, SpoolWeight,
    DEFAULT_DIAMETER_MM,
};
pub use record::{
    classify, decode, encode, is_known_vendor, DateCode, Serial, TagColor, TagContent,
    TagRecord, RECORD_LEN,
};
