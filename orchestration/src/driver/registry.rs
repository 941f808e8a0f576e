//! Driver registry
//!
//! Instances are kept sorted by name so every run visits them in the same order.

use std::collections::BTreeMap;

use super::Driver;
use crate::error::{ForgeError, ForgeResult};

/// Configured driver instances, keyed by instance name.
#[derive(Debug, Default)]
pub struct DriverRegistry {
    drivers: BTreeMap<String, Driver>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver. Instance names must be unique.
    pub fn register(&mut self, driver: Driver) -> ForgeResult<()> {
        if self.drivers.contains_key(&driver.name) {
            return Err(ForgeError::config(format!(
                "driver instance '{}' is defined twice",
                driver.name
            )));
        }
        self.drivers.insert(driver.name.clone(), driver);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Driver> {
        self.drivers.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Driver> {
        self.drivers.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    /// Instance names in iteration order
    pub fn names(&self) -> Vec<String> {
        self.drivers.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Driver> {
        self.drivers.values()
    }

    /// Drivers of the upstream category
    pub fn upstreams(&self) -> Vec<&Driver> {
        self.drivers.values().filter(|d| d.is_upstream()).collect()
    }

    /// The driver owning the infra repository remote, if any
    pub fn infra_owner(&self) -> Option<&Driver> {
        self.drivers.values().find(|d| d.infra_owner)
    }

    pub fn infra_owner_name(&self) -> Option<String> {
        self.infra_owner().map(|d| d.name.clone())
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}
