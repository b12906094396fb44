use crate::bus::spi::{SpiConfig, SpiMode, DEFAULT_BITS_PER_WORD, DEFAULT_SPEED_HZ};
use crate::bus::BusType;
use crate::errors::{ConfigError, ConfigResult};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::time::Duration;

/// Root structure for loading `[[bus]]` style TOML config
#[derive(Debug, Deserialize)]
pub struct BusConfig {
    #[serde(rename = "bus")]
    pub buses: Vec<BusEntry>,
}

/// One bus entry (CCI over I2C or VoSPI over SPI)
#[derive(Debug, Clone, Deserialize)]
pub struct BusEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub r#type: BusType, // 'type' is a reserved word in Rust, use raw identifier
    /// Controller index, e.g. 1 for /dev/i2c-1 or /dev/spidev1.x
    pub bus: u8,
    /// SPI only, defaults to 0
    pub chip_select: Option<u8>,
    /// SPI only, 0..=3, defaults to 3
    pub mode: Option<u8>,
    /// SPI only, defaults to 11 MHz
    pub speed_hz: Option<u32>,
    /// SPI only, defaults to 8
    pub bits_per_word: Option<u8>,
    /// Upper bound for one shared bus operation
    pub timeout_ms: Option<u64>,
}

impl BusEntry {
    pub fn chip_select(&self) -> u8 {
        self.chip_select.unwrap_or(0)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Electrical profile for an SPI entry, with defaults filled in
    pub fn spi_config(&self) -> ConfigResult<SpiConfig> {
        let mode_index = self.mode.unwrap_or(SpiMode::Mode3.index());
        let mode = SpiMode::from_index(mode_index).ok_or_else(|| ConfigError::InvalidValue {
            field: format!("{}.mode", self.id),
            reason: format!("SPI mode {} is not one of 0, 1, 2, 3", mode_index),
        })?;

        let config = SpiConfig {
            mode,
            speed_hz: self.speed_hz.unwrap_or(DEFAULT_SPEED_HZ),
            bits_per_word: self.bits_per_word.unwrap_or(DEFAULT_BITS_PER_WORD),
        };
        config.validate().map_err(|e| match e {
            ConfigError::InvalidValue { field, reason } => ConfigError::InvalidValue {
                field: format!("{}.{}", self.id, field),
                reason,
            },
            other => other,
        })?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "bus id must not be empty".to_string(),
            ));
        }

        match self.r#type {
            BusType::Spi => self.spi_config().map(|_| ()),
            BusType::I2C => {
                let spi_only = self.chip_select.is_some()
                    || self.mode.is_some()
                    || self.speed_hz.is_some()
                    || self.bits_per_word.is_some();
                if spi_only {
                    Err(ConfigError::ValidationError(format!(
                        "bus '{}' is i2c but sets SPI-only fields",
                        self.id
                    )))
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl BusConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let parsed: BusConfig = toml::from_str(content)?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = HashSet::new();
        for entry in &self.buses {
            entry.validate()?;
            if !seen.insert(entry.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate bus id '{}'",
                    entry.id
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&BusEntry> {
        self.buses.iter().find(|b| b.id == id)
    }
}

/// Load bus config file
pub fn load_bus_config(path: &str) -> ConfigResult<BusConfig> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::LoadError {
        path: path.to_string(),
        source: e,
    })?;
    BusConfig::from_toml_str(&content)
}
