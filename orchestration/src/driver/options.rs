//! Options returned by drivers, kept for their maintain phase.

use std::collections::BTreeMap;

use super::DriverCategory;

/// Options stored for one driver instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverOptionSet {
    pub category: DriverCategory,
    pub options: BTreeMap<String, String>,
}

/// Options keyed by (driver name, option name).
#[derive(Debug, Clone, Default)]
pub struct DriverOptions {
    drivers: BTreeMap<String, DriverOptionSet>,
}

impl DriverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record options returned by `driver`. A later value for the same option wins.
    pub fn add(
        &mut self,
        driver: &str,
        category: &DriverCategory,
        options: &BTreeMap<String, String>,
    ) {
        let set = self
            .drivers
            .entry(driver.to_string())
            .or_insert_with(|| DriverOptionSet {
                category: category.clone(),
                options: BTreeMap::new(),
            });
        set.options
            .extend(options.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    pub fn get(&self, driver: &str, option: &str) -> Option<&str> {
        self.drivers
            .get(driver)
            .and_then(|set| set.options.get(option))
            .map(String::as_str)
    }

    pub fn driver(&self, driver: &str) -> Option<&DriverOptionSet> {
        self.drivers.get(driver)
    }

    /// Copy the options stored for `driver` into `params`.
    pub fn maintain_parameters(&self, driver: &str, params: &mut BTreeMap<String, String>) {
        if let Some(set) = self.drivers.get(driver) {
            params.extend(set.options.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }
}
