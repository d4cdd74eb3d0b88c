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

//! Persistent storage: material database and spool history.

mod history;
mod materials;

pub use history::{SpoolHistory, SpoolRecord, DEFAULT_MAX_ENTRIES};
pub use materials::{
    Brand, Material, MaterialDatabase, MaterialStore, DEFAULT_FILM_ID, OFFICIAL_BRAND_ID,
};
