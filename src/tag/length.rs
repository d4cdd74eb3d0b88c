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

//! Filament length and weight conversions.

use std::f64::consts::PI;

/// Standard filament diameter.
pub const DEFAULT_DIAMETER_MM: f64 = 1.75;

/// Density used when the material type is unknown (PLA).
pub const FALLBACK_DENSITY: f64 = 1.24;

const DENSITIES: &[(&str, f64)] = &[
    ("PLA", 1.24),
    ("PLA+", 1.23),
    ("PETG", 1.27),
    ("ABS", 1.04),
    ("TPU", 1.21),
    ("NYLON", 1.14),
    ("ASA", 1.07),
    ("PC", 1.20),
    ("HIPS", 1.04),
    ("PVA", 1.23),
];

/// Typical density in g/cm³ for a material type (case-insensitive).
pub fn default_density(material_type: &str) -> f64 {
    let wanted = material_type.trim().to_uppercase();
    DENSITIES
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, density)| *density)
        .unwrap_or(FALLBACK_DENSITY)
}

/// Cross-section in cm².
fn cross_section_cm2(diameter_mm: f64) -> f64 {
    let radius = diameter_mm / 2.0;
    PI * radius * radius / 100.0
}

/// Filament length in metres for a spool weight, rounded to the nearest metre.
///
/// Saturates at the largest value the tag length field can hold.
pub fn length_for_weight(grams: u32, density: f64, diameter_mm: f64) -> u16 {
    let volume_cm3 = f64::from(grams) / density;
    let length_m = volume_cm3 / cross_section_cm2(diameter_mm) / 100.0;
    length_m.round().clamp(0.0, f64::from(u16::MAX)) as u16
}

/// Spool weight in grams for a filament length, rounded to the nearest gram.
pub fn weight_for_length(metres: u16, density: f64, diameter_mm: f64) -> u32 {
    let volume_cm3 = f64::from(metres) * 100.0 * cross_section_cm2(diameter_mm);
    (volume_cm3 * density).round().max(0.0) as u32
}

/// Densities outside this range are almost certainly typos.
pub fn is_valid_density(density: f64) -> bool {
    (0.5..=2.5).contains(&density)
}

/// Standard spool sizes offered when writing a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpoolWeight {
    Kg1,
    G750,
    G600,
    G500,
    G250,
}

impl SpoolWeight {
    pub const ALL: [SpoolWeight; 5] = [
        SpoolWeight::Kg1,
        SpoolWeight::G750,
        SpoolWeight::G600,
        SpoolWeight::G500,
        SpoolWeight::G250,
    ];

    pub fn grams(&self) -> u32 {
        match self {
            SpoolWeight::Kg1 => 1000,
            SpoolWeight::G750 => 750,
            SpoolWeight::G600 => 600,
            SpoolWeight::G500 => 500,
            SpoolWeight::G250 => 250,
        }
    }

    pub fn from_grams(grams: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|w| w.grams() == grams)
    }

    /// Length of this spool size for the given material.
    pub fn length(&self, density: f64, diameter_mm: f64) -> u16 {
        length_for_weight(self.grams(), density, diameter_mm)
    }
}

/// Human readable weight: `1kg`, `1.5kg`, `750g`.
pub fn format_weight(grams: u32) -> String {
    if grams >= 1000 && grams % 1000 == 0 {
        format!("{}kg", grams / 1000)
    } else if grams >= 1000 {
        format!("{:.1}kg", f64::from(grams) / 1000.0)
    } else {
        format!("{}g", grams)
    }
}
