//! Drivers: configured instances of an application type backed by a plugin.

pub mod options;
pub mod registry;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use crate::error::{ForgeError, ForgeResult};
use crate::plugin::{PluginResult, PluginService};

pub use options::DriverOptions;
pub use registry::DriverRegistry;

/// Instance name reserved to disable the infra upstream.
pub const NO_UPSTREAM: &str = "none";

/// Application category a driver serves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DriverCategory {
    /// Git hosting service; may own the infra repository remote
    Upstream,
    /// Continuous integration system
    Ci,
    Other(String),
}

impl DriverCategory {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Upstream => "upstream",
            Self::Ci => "ci",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for DriverCategory {
    fn from(value: String) -> Self {
        match value.as_str() {
            "upstream" => Self::Upstream,
            "ci" => Self::Ci,
            _ => Self::Other(value),
        }
    }
}

impl From<DriverCategory> for String {
    fn from(value: DriverCategory) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for DriverCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("valid name pattern"))
}

/// Application declared as `<type>:<driver>[:<instance>]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSpec {
    #[serde(rename = "type")]
    pub category: DriverCategory,
    pub driver: String,
    /// Defaults to the driver name
    #[serde(default)]
    pub instance: Option<String>,
}

impl AppSpec {
    /// Parse a `--app` value.
    pub fn parse(spec: &str) -> ForgeResult<Self> {
        let invalid = |message: &str| ForgeError::InvalidAppSpec {
            spec: spec.to_string(),
            message: message.to_string(),
        };

        let parts: Vec<&str> = spec.split(':').collect();
        let (category, driver, instance) = match parts.as_slice() {
            [category, driver] => (*category, *driver, None),
            [category, driver, instance] => (*category, *driver, Some(instance.to_string())),
            _ => return Err(invalid("expected <type>:<driver>[:<instance>]")),
        };
        if category.is_empty() || driver.is_empty() {
            return Err(invalid("type and driver cannot be empty"));
        }

        let app = Self {
            category: DriverCategory::from(category.to_string()),
            driver: driver.to_string(),
            instance,
        };
        app.validate()?;
        Ok(app)
    }

    /// Instance name used as registry key
    pub fn instance_name(&self) -> &str {
        self.instance.as_deref().unwrap_or(&self.driver)
    }

    pub fn validate(&self) -> ForgeResult<()> {
        let spec = format!("{}:{}:{}", self.category, self.driver, self.instance_name());
        for name in [self.driver.as_str(), self.instance_name()] {
            if !name_pattern().is_match(name) {
                return Err(ForgeError::InvalidAppSpec {
                    spec,
                    message: format!(
                        "'{name}' must use lowercase letters, digits, '-' or '_'"
                    ),
                });
            }
        }
        if self.instance_name() == NO_UPSTREAM {
            return Err(ForgeError::InvalidAppSpec {
                spec,
                message: format!("'{NO_UPSTREAM}' is a reserved instance name"),
            });
        }
        Ok(())
    }
}

/// Parameters handed to a driver, per action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionParams {
    /// Sent with every action
    #[serde(default)]
    pub common: BTreeMap<String, String>,
    /// Sent with the named action only
    #[serde(default, flatten)]
    pub actions: BTreeMap<String, BTreeMap<String, String>>,
}

impl ActionParams {
    pub fn for_action(&self, action: &str) -> Option<&BTreeMap<String, String>> {
        self.actions.get(action)
    }
}

/// A configured driver instance.
pub struct Driver {
    /// Instance name (registry key)
    pub name: String,
    /// Driver implementation name, e.g. `github`
    pub driver: String,
    pub category: DriverCategory,
    pub plugin: Box<dyn PluginService>,
    /// Set on the one driver owning the infra repository remote
    pub infra_owner: bool,
    /// Result of the last action run against this driver
    pub result: Option<PluginResult>,
    pub params: ActionParams,
}

impl Driver {
    pub fn new(app: &AppSpec, plugin: Box<dyn PluginService>) -> Self {
        Self {
            name: app.instance_name().to_string(),
            driver: app.driver.clone(),
            category: app.category.clone(),
            plugin,
            infra_owner: false,
            result: None,
            params: ActionParams::default(),
        }
    }

    pub fn with_params(mut self, params: ActionParams) -> Self {
        self.params = params;
        self
    }

    pub fn is_upstream(&self) -> bool {
        self.category == DriverCategory::Upstream
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("name", &self.name)
            .field("driver", &self.driver)
            .field("category", &self.category)
            .field("infra_owner", &self.infra_owner)
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_app_without_instance() {
        let app = AppSpec::parse("ci:jenkins").unwrap();
        assert_eq!(app.category, DriverCategory::Ci);
        assert_eq!(app.driver, "jenkins");
        assert_eq!(app.instance_name(), "jenkins");
    }

    #[test]
    fn test_parse_app_with_instance() {
        let app = AppSpec::parse("upstream:github:gh-public").unwrap();
        assert_eq!(app.category, DriverCategory::Upstream);
        assert_eq!(app.instance_name(), "gh-public");
    }

    #[test]
    fn test_parse_app_other_category() {
        let app = AppSpec::parse("registry:nexus").unwrap();
        assert_eq!(app.category, DriverCategory::Other("registry".into()));
        assert_eq!(app.category.to_string(), "registry");
    }

    #[test]
    fn test_parse_app_rejects_malformed() {
        for spec in ["jenkins", "ci:", ":jenkins", "ci:jenkins:a:b", "ci:Jenkins"] {
            let err = AppSpec::parse(spec).unwrap_err();
            assert!(
                matches!(err, ForgeError::InvalidAppSpec { .. }),
                "{spec} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_app_rejects_reserved_instance() {
        let err = AppSpec::parse("upstream:github:none").unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn test_category_serde_as_string() {
        let json = serde_json::to_string(&DriverCategory::Upstream).unwrap();
        assert_eq!(json, "\"upstream\"");
        let back: DriverCategory = serde_json::from_str("\"ci\"").unwrap();
        assert_eq!(back, DriverCategory::Ci);
    }
}
