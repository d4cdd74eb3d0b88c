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

//! Collision-free identifier and serial allocation.
//!
//! Every allocation runs read, increment and persist under one lock on the
//! registry, so two writers can never be handed the same value.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::AllocationError;
use crate::tag::Serial;

/// Lowest serial handed out automatically.
pub const SERIAL_MIN: u32 = 100_000;
/// Highest serial handed out automatically.
pub const SERIAL_MAX: u32 = 999_999;
/// Random draws before giving up on finding a free serial.
pub const MAX_SERIAL_ATTEMPTS: u32 = 100;

const MAX_BRAND_NUMBER: u32 = 999;
const MAX_MATERIAL_NUMBER: u32 = 9999;

/// Persistent counters and used-serial set behind the allocator.
pub trait Registry: Send {
    fn brand_counter(&self) -> u32;
    fn set_brand_counter(&mut self, value: u32);
    fn material_counter(&self, brand_id: &str) -> u32;
    fn set_material_counter(&mut self, brand_id: &str, value: u32);
    fn brand_exists(&self, id: &str) -> bool;
    fn material_exists(&self, id: &str) -> bool;
    fn serial_is_used(&self, serial: Serial) -> bool;
    fn mark_serial_used(&mut self, serial: Serial);

    /// Flush the current state to durable storage.
    fn persist(&mut self) -> anyhow::Result<()>;
}

/// Hands out serials, brand ids and material ids.
pub struct Allocator<R> {
    registry: Arc<Mutex<R>>,
    rng: Arc<Mutex<StdRng>>,
}

impl<R> Clone for Allocator<R> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            rng: self.rng.clone(),
        }
    }
}

impl<R: Registry> Allocator<R> {
    pub fn new(registry: Arc<Mutex<R>>) -> Self {
        Self::with_rng(registry, StdRng::from_entropy())
    }

    /// Deterministic allocator for tests and reproducible runs.
    pub fn with_seed(registry: Arc<Mutex<R>>, seed: u64) -> Self {
        Self::with_rng(registry, StdRng::seed_from_u64(seed))
    }

    fn with_rng(registry: Arc<Mutex<R>>, rng: StdRng) -> Self {
        Self {
            registry,
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    pub fn registry(&self) -> &Arc<Mutex<R>> {
        &self.registry
    }

    /// Pick an unused random serial and record it as used.
    pub fn allocate_serial(&self) -> Result<Serial, AllocationError> {
        let mut registry = self.registry.lock();
        let mut rng = self.rng.lock();

        for _ in 0..MAX_SERIAL_ATTEMPTS {
            let Some(candidate) = Serial::new(rng.gen_range(SERIAL_MIN..=SERIAL_MAX)) else {
                continue;
            };
            if registry.serial_is_used(candidate) {
                debug!("Serial {} already used, retrying", candidate);
                continue;
            }

            registry.mark_serial_used(candidate);
            persist(&mut *registry)?;
            info!("Allocated serial {}", candidate);
            return Ok(candidate);
        }

        warn!(
            "No free serial found after {} attempts",
            MAX_SERIAL_ATTEMPTS
        );
        Err(AllocationError::SerialSpaceExhausted {
            attempts: MAX_SERIAL_ATTEMPTS,
        })
    }

    /// Record a user-supplied serial as used.
    ///
    /// Returns `false` when the serial had already been issued. The caller
    /// decides whether to go ahead anyway.
    pub fn reserve_serial(&self, serial: Serial) -> Result<bool, AllocationError> {
        let mut registry = self.registry.lock();
        if registry.serial_is_used(serial) {
            warn!("Custom serial {} was already used", serial);
            return Ok(false);
        }
        registry.mark_serial_used(serial);
        persist(&mut *registry)?;
        debug!("Reserved custom serial {}", serial);
        Ok(true)
    }

    /// Next free material id for a brand, e.g. `F001-0003`.
    pub fn allocate_material_id(&self, brand_id: &str) -> Result<String, AllocationError> {
        let mut registry = self.registry.lock();
        let mut counter = registry.material_counter(brand_id);

        loop {
            counter += 1;
            if counter > MAX_MATERIAL_NUMBER {
                return Err(AllocationError::MaterialSpaceExhausted {
                    brand_id: brand_id.to_string(),
                });
            }

            let id = format!("{}-{:04}", brand_id, counter);
            if registry.material_exists(&id) {
                debug!("Material id {} taken, skipping", id);
                continue;
            }

            registry.set_material_counter(brand_id, counter);
            persist(&mut *registry)?;
            info!("Allocated material id {}", id);
            return Ok(id);
        }
    }

    /// Next free custom brand id, e.g. `F004`.
    pub fn allocate_brand_id(&self) -> Result<String, AllocationError> {
        Self::next_brand_id(&mut *self.registry.lock())
    }

    /// Brand id allocation on a registry the caller has already locked.
    pub fn next_brand_id(registry: &mut R) -> Result<String, AllocationError> {
        let mut counter = registry.brand_counter();

        loop {
            counter += 1;
            if counter > MAX_BRAND_NUMBER {
                return Err(AllocationError::BrandSpaceExhausted);
            }

            let id = format!("F{:03}", counter);
            if registry.brand_exists(&id) {
                debug!("Brand id {} taken, skipping", id);
                continue;
            }

            registry.set_brand_counter(counter);
            persist(registry)?;
            info!("Allocated brand id {}", id);
            return Ok(id);
        }
    }
}

fn persist<R: Registry + ?Sized>(registry: &mut R) -> Result<(), AllocationError> {
    registry
        .persist()
        .map_err(|e| AllocationError::Persist(e.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::thread;

    /// In-memory registry used by tests across the crate.
    #[derive(Default)]
    pub(crate) struct MemoryRegistry {
        pub brand_counter: u32,
        pub material_counters: HashMap<String, u32>,
        pub brands: HashSet<String>,
        pub materials: HashSet<String>,
        pub used_serials: HashSet<u32>,
        pub all_serials_used: bool,
        pub fail_persist: bool,
        pub persist_calls: u32,
    }

    impl Registry for MemoryRegistry {
        fn brand_counter(&self) -> u32 {
            self.brand_counter
        }
        fn set_brand_counter(&mut self, value: u32) {
            self.brand_counter = value;
        }
        fn material_counter(&self, brand_id: &str) -> u32 {
            self.material_counters.get(brand_id).copied().unwrap_or(0)
        }
        fn set_material_counter(&mut self, brand_id: &str, value: u32) {
            self.material_counters.insert(brand_id.to_string(), value);
        }
        fn brand_exists(&self, id: &str) -> bool {
            self.brands.contains(id)
        }
        fn material_exists(&self, id: &str) -> bool {
            self.materials.contains(id)
        }
        fn serial_is_used(&self, serial: Serial) -> bool {
            self.all_serials_used || self.used_serials.contains(&serial.value())
        }
        fn mark_serial_used(&mut self, serial: Serial) {
            self.used_serials.insert(serial.value());
        }
        fn persist(&mut self) -> anyhow::Result<()> {
            self.persist_calls += 1;
            if self.fail_persist {
                anyhow::bail!("disk full");
            }
            Ok(())
        }
    }

    fn allocator(registry: MemoryRegistry) -> Allocator<MemoryRegistry> {
        Allocator::with_seed(Arc::new(Mutex::new(registry)), 7)
    }

    #[test]
    fn test_serials_are_unique_and_in_range() {
        let alloc = allocator(MemoryRegistry::default());
        let mut seen = HashSet::new();

        for _ in 0..1000 {
            let serial = alloc.allocate_serial().unwrap();
            assert!((SERIAL_MIN..=SERIAL_MAX).contains(&serial.value()));
            assert!(seen.insert(serial), "duplicate serial {}", serial);
        }
        assert_eq!(alloc.registry().lock().used_serials.len(), 1000);
        assert_eq!(alloc.registry().lock().persist_calls, 1000);
    }

    #[test]
    fn test_serial_space_exhausted() {
        let alloc = allocator(MemoryRegistry {
            all_serials_used: true,
            ..Default::default()
        });
        assert_eq!(
            alloc.allocate_serial(),
            Err(AllocationError::SerialSpaceExhausted { attempts: 100 })
        );
        assert_eq!(alloc.registry().lock().persist_calls, 0);
    }

    #[test]
    fn test_persist_failure_is_reported() {
        let alloc = allocator(MemoryRegistry {
            fail_persist: true,
            ..Default::default()
        });
        assert_eq!(
            alloc.allocate_brand_id(),
            Err(AllocationError::Persist("disk full".to_string()))
        );
    }

    #[test]
    fn test_reserve_serial() {
        let alloc = allocator(MemoryRegistry::default());
        let serial = Serial::new(123).unwrap();

        assert!(alloc.reserve_serial(serial).unwrap());
        assert!(!alloc.reserve_serial(serial).unwrap());
        assert!(alloc.registry().lock().used_serials.contains(&123));
    }

    #[test]
    fn test_material_ids_skip_existing() {
        let mut registry = MemoryRegistry::default();
        registry.material_counters.insert("F001".to_string(), 2);
        registry.materials.insert("F001-0003".to_string());
        let alloc = allocator(registry);

        assert_eq!(alloc.allocate_material_id("F001").unwrap(), "F001-0004");
        assert_eq!(alloc.allocate_material_id("F001").unwrap(), "F001-0005");
        assert_eq!(alloc.allocate_material_id("0276").unwrap(), "0276-0001");
        assert_eq!(alloc.registry().lock().material_counter("F001"), 5);
    }

    #[test]
    fn test_material_space_exhausted() {
        let mut registry = MemoryRegistry::default();
        registry.material_counters.insert("F001".to_string(), 9999);
        let alloc = allocator(registry);

        assert_eq!(
            alloc.allocate_material_id("F001"),
            Err(AllocationError::MaterialSpaceExhausted {
                brand_id: "F001".to_string()
            })
        );
    }

    #[test]
    fn test_brand_ids() {
        let mut registry = MemoryRegistry::default();
        registry.brands.insert("F001".to_string());
        let alloc = allocator(registry);

        assert_eq!(alloc.allocate_brand_id().unwrap(), "F002");
        assert_eq!(alloc.allocate_brand_id().unwrap(), "F003");
        assert_eq!(alloc.registry().lock().brand_counter, 3);
    }

    #[test]
    fn test_brand_space_exhausted() {
        let alloc = allocator(MemoryRegistry {
            brand_counter: 999,
            ..Default::default()
        });
        assert_eq!(
            alloc.allocate_brand_id(),
            Err(AllocationError::BrandSpaceExhausted)
        );
    }

    #[test]
    fn test_concurrent_allocations_never_collide() {
        let alloc = Allocator::new(Arc::new(Mutex::new(MemoryRegistry::default())));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let alloc = alloc.clone();
                thread::spawn(move || {
                    (0..50)
                        .map(|_| alloc.allocate_material_id("F001").unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(ids.insert(id));
            }
        }
        assert_eq!(ids.len(), 400);
        assert!(ids.contains("F001-0400"));
    }
}
