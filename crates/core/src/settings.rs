use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::organizer::DEFAULT_REGION_PRIORITY;
use crate::store::Store;

/// User-tunable defaults, persisted as key/value pairs in the store's
/// `config` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Most preferred first; used by the `1g1r` strategy.
    pub region_priority: Vec<String>,
    /// Look inside zip containers while scanning.
    pub scan_archives: bool,
    /// Hashing threads; `None` lets the pool pick.
    pub workers: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            region_priority: DEFAULT_REGION_PRIORITY.iter().map(|r| r.to_string()).collect(),
            scan_archives: true,
            workers: None,
        }
    }
}

impl Settings {
    pub const KEYS: [&'static str; 3] = ["region_priority", "scan_archives", "workers"];

    /// Stored values override the defaults. A stored value that no longer
    /// parses is an error rather than silently ignored.
    pub fn load(store: &Store) -> Result<Self> {
        let mut settings = Self::default();
        for key in Self::KEYS {
            if let Some(value) = store.get_config(key)? {
                settings.set(key, &value)?;
            }
        }
        Ok(settings)
    }

    pub fn save(&self, store: &Store) -> Result<()> {
        for key in Self::KEYS {
            store.set_config(key, &self.get(key)?)?;
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<String> {
        match key {
            "region_priority" => Ok(self.region_priority.join(",")),
            "scan_archives" => Ok(self.scan_archives.to_string()),
            "workers" => Ok(self.workers.map(|w| w.to_string()).unwrap_or_default()),
            _ => Err(unknown_key(key)),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = |message: &str| Error::InvalidSetting {
            key: key.to_string(),
            message: message.to_string(),
        };
        match key {
            "region_priority" => {
                let regions: Vec<String> = value
                    .split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .collect();
                if regions.is_empty() {
                    return Err(invalid("expected a comma-separated list of regions"));
                }
                self.region_priority = regions;
            }
            "scan_archives" => {
                self.scan_archives = match value.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" | "1" | "on" => true,
                    "false" | "no" | "0" | "off" => false,
                    _ => return Err(invalid("expected true or false")),
                };
            }
            "workers" => {
                let value = value.trim();
                self.workers = if value.is_empty() || value == "auto" {
                    None
                } else {
                    match value.parse::<usize>() {
                        Ok(n) if n > 0 => Some(n),
                        _ => return Err(invalid("expected a positive thread count or `auto`")),
                    }
                };
            }
            _ => return Err(unknown_key(key)),
        }
        Ok(())
    }
}

fn unknown_key(key: &str) -> Error {
    Error::InvalidSetting {
        key: key.to_string(),
        message: format!("unknown setting; expected one of {}", Settings::KEYS.join(", ")),
    }
}
