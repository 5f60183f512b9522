use std::fs::File;
use std::num::{NonZeroU32, NonZeroUsize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::Error;
use serde::{Deserialize, Deserializer};

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusTrackConfig {
    #[serde(default = "http_address_default")]
    pub http_address: String,

    // sqlite database url
    #[serde(default = "database_default")]
    pub database: String,

    // key required by the mutating bus endpoints, falls back to $OPERATOR_API_KEY
    #[serde(default)]
    pub operator_api_key: Option<String>,

    // directory with the map frontend, served at the root if set
    #[serde(default)]
    pub static_dir: Option<PathBuf>,

    #[serde(default)]
    pub geocode: GeocodeConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,

    #[serde(default)]
    pub seed: SeedConfig,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeocodeConfig {
    /// Json file with the list of cities to resolve coordinates to.
    pub cities: PathBuf,

    /// Place name returned if no city list could be loaded.
    pub fallback: String,

    pub cache_capacity: NonZeroUsize,
    pub cache_ttl_in_seconds: u64,
}

impl GeocodeConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_in_seconds)
    }
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            cities: PathBuf::from("data/sriLankaCities.json"),
            fallback: "Sri Lanka".to_owned(),
            cache_capacity: NonZeroUsize::new(5000).unwrap_or(NonZeroUsize::MIN),
            cache_ttl_in_seconds: 12 * 60 * 60,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulationConfig {
    /// Ticks of the simulator. No simulation runs if set to null.
    pub interval_in_seconds: Option<NonZeroU32>,

    #[serde(deserialize_with = "deserialize_probability")]
    pub flip_probability: f64,

    /// Maximum movement per tick in degrees.
    pub drift: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            interval_in_seconds: NonZeroU32::new(5),
            flip_probability: 0.1,
            drift: 0.005,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SeedMode {
    Never,
    #[default]
    IfEmpty,
    Always,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeedConfig {
    pub mode: SeedMode,

    // dataset to load, a generated dataset is used if not set
    pub file: Option<PathBuf>,

    // days of daily locations to generate
    pub days: u32,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self { mode: SeedMode::IfEmpty, file: None, days: 7 }
    }
}

impl BusTrackConfig {
    /// The configured operator key, ignoring blank values.
    pub fn operator_api_key(&self) -> Option<String> {
        self.operator_api_key
            .clone()
            .or_else(|| std::env::var("OPERATOR_API_KEY").ok())
            .map(|key| key.trim().to_owned())
            .filter(|key| !key.is_empty())
    }
}

pub fn load(path: impl AsRef<Path>) -> Result<BusTrackConfig> {
    let path = path.as_ref();
    let fp = File::open(path).with_context(|| format!("open config {:?}", path))?;
    let config = serde_yaml::from_reader(fp).with_context(|| format!("parse config {:?}", path))?;
    Ok(config)
}

fn http_address_default() -> String {
    "0.0.0.0:5000".to_owned()
}

fn database_default() -> String {
    "sqlite://bustrack.db".to_owned()
}

fn deserialize_probability<'de, D: Deserializer<'de>>(deserialize: D) -> Result<f64, D::Error> {
    let value = f64::deserialize(deserialize)?;
    if !(0.0..=1.0).contains(&value) {
        let text = format!("probability must be within 0 and 1, got {}", value);
        return Err(Error::custom(text));
    }

    Ok(value)
}
