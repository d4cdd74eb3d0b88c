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

//! Brand and material database.
//!
//! A single JSON file holding brands, materials, id counters and the set of
//! serials already written. It doubles as the allocator's registry.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::allocator::{Allocator, Registry};
use crate::error::BrandDeletionError;
use crate::tag::{self, Serial, DEFAULT_DIAMETER_MM};

/// Vendor id of the official Creality brand.
pub const OFFICIAL_BRAND_ID: &str = "0276";

/// Film id written when a material does not specify one.
pub const DEFAULT_FILM_ID: u32 = 101001;

const FILE_NAME: &str = "materials.json";

fn default_film_id() -> u32 {
    DEFAULT_FILM_ID
}

fn default_diameter() -> f64 {
    DEFAULT_DIAMETER_MM
}

/// A filament brand. Its id is the tag vendor id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brand {
    /// `0276` for Creality, `F001`.. for custom brands.
    pub id: String,
    pub name: String,
    pub is_custom: bool,
    pub is_official: bool,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl Brand {
    pub fn display_name(&self) -> String {
        if self.is_official {
            format!("{} (Official)", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// A filament product of one brand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// `<brand id>-<4 digits>`.
    pub id: String,
    pub brand_id: String,
    pub brand_name: String,
    pub name: String,
    pub material_type: String,
    #[serde(default = "default_film_id")]
    pub film_id: u32,
    /// g/cm³
    pub density: f64,
    #[serde(default = "default_diameter")]
    pub diameter_mm: f64,
    pub created_at: DateTime<Utc>,
}

impl Material {
    /// Filament length in metres for a spool of `grams`.
    pub fn length_for(&self, grams: u32) -> u16 {
        tag::length_for_weight(grams, self.density, self.diameter_mm)
    }
}

/// On-disk database format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialDatabase {
    pub version: u32,
    pub brands: Vec<Brand>,
    pub materials: Vec<Material>,
    #[serde(default)]
    pub brand_id_counter: u32,
    #[serde(default)]
    pub material_id_counters: BTreeMap<String, u32>,
    #[serde(default)]
    pub used_serials: BTreeSet<u32>,

    /// Where `persist` writes to. Empty for in-memory databases.
    #[serde(skip)]
    path: PathBuf,
}

impl Default for MaterialDatabase {
    fn default() -> Self {
        Self {
            version: 1,
            brands: vec![Brand {
                id: OFFICIAL_BRAND_ID.to_string(),
                name: "Creality".to_string(),
                is_custom: false,
                is_official: true,
                notes: String::new(),
                created_at: Utc::now(),
            }],
            materials: Vec::new(),
            brand_id_counter: 0,
            material_id_counters: BTreeMap::new(),
            used_serials: BTreeSet::new(),
            path: PathBuf::new(),
        }
    }
}

impl MaterialDatabase {
    /// Load from `path`, or create and save the default database.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("Creating material database at {:?}", path);
            let mut db = Self {
                path: path.to_path_buf(),
                ..Self::default()
            };
            db.save()?;
            return Ok(db);
        }

        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let mut db: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", path))?;
        db.path = path.to_path_buf();

        info!(
            "Loaded {} brands, {} materials, {} used serials",
            db.brands.len(),
            db.materials.len(),
            db.used_serials.len()
        );
        Ok(db)
    }

    /// Write the database next to its final path, then rename over it.
    pub fn save(&mut self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).with_context(|| format!("Failed to write {:?}", tmp))?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("Material database saved");
        Ok(())
    }
}

impl Registry for MaterialDatabase {
    fn brand_counter(&self) -> u32 {
        self.brand_id_counter
    }

    fn set_brand_counter(&mut self, value: u32) {
        self.brand_id_counter = value;
    }

    fn material_counter(&self, brand_id: &str) -> u32 {
        self.material_id_counters.get(brand_id).copied().unwrap_or(0)
    }

    fn set_material_counter(&mut self, brand_id: &str, value: u32) {
        self.material_id_counters.insert(brand_id.to_string(), value);
    }

    fn brand_exists(&self, id: &str) -> bool {
        self.brands.iter().any(|b| b.id == id)
    }

    fn material_exists(&self, id: &str) -> bool {
        self.materials.iter().any(|m| m.id == id)
    }

    fn serial_is_used(&self, serial: Serial) -> bool {
        self.used_serials.contains(&serial.value())
    }

    fn mark_serial_used(&mut self, serial: Serial) {
        self.used_serials.insert(serial.value());
    }

    fn persist(&mut self) -> Result<()> {
        self.save()
    }
}

/// Shared handle to the material database.
#[derive(Clone)]
pub struct MaterialStore {
    db: Arc<Mutex<MaterialDatabase>>,
    allocator: Allocator<MaterialDatabase>,
}

impl MaterialStore {
    /// Open `materials.json` in the data directory.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db = MaterialDatabase::load(&data_dir.join(FILE_NAME))?;
        Ok(Self::from_database(db))
    }

    pub fn from_database(db: MaterialDatabase) -> Self {
        let db = Arc::new(Mutex::new(db));
        Self {
            allocator: Allocator::new(db.clone()),
            db,
        }
    }

    pub fn allocator(&self) -> &Allocator<MaterialDatabase> {
        &self.allocator
    }

    /// All brands sorted by name.
    pub fn brands(&self) -> Vec<Brand> {
        let mut brands = self.db.lock().brands.clone();
        brands.sort_by(|a, b| a.name.cmp(&b.name));
        brands
    }

    pub fn brand(&self, id: &str) -> Option<Brand> {
        self.db.lock().brands.iter().find(|b| b.id == id).cloned()
    }

    /// All materials sorted by name.
    pub fn materials(&self) -> Vec<Material> {
        let mut materials = self.db.lock().materials.clone();
        materials.sort_by(|a, b| a.name.cmp(&b.name));
        materials
    }

    pub fn material(&self, id: &str) -> Option<Material> {
        self.db.lock().materials.iter().find(|m| m.id == id).cloned()
    }

    pub fn materials_for_brand(&self, brand_id: &str) -> Vec<Material> {
        let mut materials: Vec<_> = self
            .db
            .lock()
            .materials
            .iter()
            .filter(|m| m.brand_id == brand_id)
            .cloned()
            .collect();
        materials.sort_by(|a, b| a.name.cmp(&b.name));
        materials
    }

    /// Case-insensitive match on name, brand or material type.
    pub fn search(&self, query: &str) -> Vec<Material> {
        let query = query.to_lowercase();
        let mut materials: Vec<_> = self
            .db
            .lock()
            .materials
            .iter()
            .filter(|m| {
                m.name.to_lowercase().contains(&query)
                    || m.brand_name.to_lowercase().contains(&query)
                    || m.material_type.to_lowercase().contains(&query)
            })
            .cloned()
            .collect();
        materials.sort_by(|a, b| a.name.cmp(&b.name));
        materials
    }

    /// Create a custom brand. A brand with the same name is returned as-is.
    pub fn create_brand(&self, name: &str, notes: &str) -> Result<Brand> {
        let name = name.trim();
        if name.is_empty() {
            bail!("Brand name is required");
        }

        // Name check, id allocation and insert happen under one guard.
        let mut db = self.db.lock();
        if let Some(existing) = db.brands.iter().find(|b| b.name == name) {
            return Ok(existing.clone());
        }

        let id = Allocator::next_brand_id(&mut *db)?;
        let brand = Brand {
            id,
            name: name.to_string(),
            is_custom: true,
            is_official: false,
            notes: notes.to_string(),
            created_at: Utc::now(),
        };

        db.brands.push(brand.clone());
        db.save()?;
        info!("Created brand {} ({})", brand.name, brand.id);
        Ok(brand)
    }

    /// Create a material with the standard density for its type.
    pub fn create_material(
        &self,
        brand_id: &str,
        name: &str,
        material_type: &str,
    ) -> Result<Material> {
        let brand = self
            .brand(brand_id)
            .with_context(|| format!("Brand not found: {}", brand_id))?;

        let id = self.allocator.allocate_material_id(brand_id)?;
        let material = Material {
            id,
            brand_id: brand.id,
            brand_name: brand.name,
            name: name.trim().to_string(),
            material_type: material_type.trim().to_string(),
            film_id: DEFAULT_FILM_ID,
            density: tag::default_density(material_type),
            diameter_mm: DEFAULT_DIAMETER_MM,
            created_at: Utc::now(),
        };

        let mut db = self.db.lock();
        db.materials.push(material.clone());
        db.save()?;
        info!("Created material {} ({})", material.name, material.id);
        Ok(material)
    }

    /// Returns whether a material was removed.
    pub fn delete_material(&self, id: &str) -> Result<bool> {
        let mut db = self.db.lock();
        let before = db.materials.len();
        db.materials.retain(|m| m.id != id);
        if db.materials.len() == before {
            return Ok(false);
        }
        db.save()?;
        info!("Deleted material {}", id);
        Ok(true)
    }

    /// Remove a custom brand that has no materials left.
    pub fn delete_brand(&self, id: &str) -> Result<(), BrandDeletionError> {
        let mut db = self.db.lock();
        let brand = db
            .brands
            .iter()
            .find(|b| b.id == id)
            .ok_or_else(|| BrandDeletionError::NotFound(id.to_string()))?;
        if brand.is_official {
            return Err(BrandDeletionError::IsOfficial);
        }

        let count = db.materials.iter().filter(|m| m.brand_id == id).count();
        if count > 0 {
            return Err(BrandDeletionError::HasMaterials { count });
        }

        db.brands.retain(|b| b.id != id);
        db.save()
            .map_err(|e| BrandDeletionError::Persist(e.to_string()))?;
        info!("Deleted brand {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_database_has_official_brand() -> Result<()> {
        let dir = TempDir::new()?;
        let store = MaterialStore::open(dir.path())?;

        let brands = store.brands();
        assert_eq!(brands.len(), 1);
        assert_eq!(brands[0].id, OFFICIAL_BRAND_ID);
        assert_eq!(brands[0].display_name(), "Creality (Official)");
        assert!(dir.path().join("materials.json").exists());
        Ok(())
    }

    #[test]
    fn test_create_brand_and_material() -> Result<()> {
        let dir = TempDir::new()?;
        let store = MaterialStore::open(dir.path())?;

        let sunlu = store.create_brand("SUNLU", "")?;
        assert_eq!(sunlu.id, "F001");
        assert!(sunlu.is_custom);
        assert_eq!(store.create_brand("SUNLU", "again")?.id, "F001");

        let petg = store.create_material(&sunlu.id, "PETG Black", "PETG")?;
        assert_eq!(petg.id, "F001-0001");
        assert_eq!(petg.density, 1.27);
        assert_eq!(petg.brand_name, "SUNLU");
        assert_eq!(petg.film_id, DEFAULT_FILM_ID);

        let pla = store.create_material(&sunlu.id, "PLA White", "pla")?;
        assert_eq!(pla.id, "F001-0002");
        assert_eq!(store.materials_for_brand("F001").len(), 2);
        assert_eq!(store.search("petg").len(), 1);
        assert_eq!(store.search("sunlu").len(), 2);
        assert!(store.create_material("F999", "Ghost", "PLA").is_err());
        Ok(())
    }

    #[test]
    fn test_concurrent_create_brand_same_name() -> Result<()> {
        let dir = TempDir::new()?;
        let store = MaterialStore::open(dir.path())?;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.create_brand("Elegoo", "").unwrap().id)
            })
            .collect();
        let ids: BTreeSet<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(ids.len(), 1);
        assert_eq!(
            store.brands().iter().filter(|b| b.name == "Elegoo").count(),
            1
        );
        assert_eq!(store.create_brand("Bambu", "")?.id, "F002");
        Ok(())
    }

    #[test]
    fn test_database_persists_across_opens() -> Result<()> {
        let dir = TempDir::new()?;
        {
            let store = MaterialStore::open(dir.path())?;
            let brand = store.create_brand("Polymaker", "")?;
            store.create_material(&brand.id, "PolyLite PLA", "PLA")?;
            store.allocator().reserve_serial(Serial::new(424242).unwrap())?;
        }

        let store = MaterialStore::open(dir.path())?;
        assert_eq!(store.materials().len(), 1);
        assert!(store.material("F001-0001").is_some());

        let db = store.allocator().registry().lock();
        assert_eq!(db.brand_counter(), 1);
        assert_eq!(db.material_counter("F001"), 1);
        assert!(db.serial_is_used(Serial::new(424242).unwrap()));
        Ok(())
    }

    #[test]
    fn test_deleted_material_id_is_not_reused() -> Result<()> {
        let dir = TempDir::new()?;
        let store = MaterialStore::open(dir.path())?;
        let brand = store.create_brand("Elegoo", "")?;

        let first = store.create_material(&brand.id, "PLA", "PLA")?;
        assert!(store.delete_material(&first.id)?);
        assert!(!store.delete_material(&first.id)?);

        let second = store.create_material(&brand.id, "PLA+", "PLA+")?;
        assert_eq!(second.id, "F001-0002");
        Ok(())
    }

    #[test]
    fn test_delete_brand_rules() -> Result<()> {
        let dir = TempDir::new()?;
        let store = MaterialStore::open(dir.path())?;

        assert_eq!(
            store.delete_brand(OFFICIAL_BRAND_ID),
            Err(BrandDeletionError::IsOfficial)
        );

        let brand = store.create_brand("Eryone", "")?;
        let material = store.create_material(&brand.id, "Silk", "PLA")?;
        assert_eq!(
            store.delete_brand(&brand.id),
            Err(BrandDeletionError::HasMaterials { count: 1 })
        );

        store.delete_material(&material.id)?;
        store.delete_brand(&brand.id).unwrap();
        assert!(store.brand(&brand.id).is_none());
        assert_eq!(
            store.delete_brand(&brand.id),
            Err(BrandDeletionError::NotFound(brand.id.clone()))
        );
        Ok(())
    }

    #[test]
    fn test_material_length() {
        let store = MaterialStore::from_database(MaterialDatabase::default());
        let brand = store.brand(OFFICIAL_BRAND_ID).unwrap();
        let material = store.create_material(&brand.id, "Hyper PLA", "PLA").unwrap();
        assert_eq!(material.id, "0276-0001");
        assert_eq!(material.length_for(1000), 335);
    }
}
