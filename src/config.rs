//! Runtime settings.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration.

use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    chain::{DEFAULT_RPC_URL, blocks::DEFAULT_SEARCH_BUDGET, logs::DEFAULT_MAX_BLOCKS_PER_CHUNK},
    error::{Error, Result},
};

/// Connection and tuning settings.
///
/// # Example
///
/// ```
/// use gammasdk::config::Settings;
///
/// let settings = Settings::from_json(r#"{ "max_blocks_per_chunk": 2000 }"#).unwrap();
/// assert_eq!(settings.max_blocks_per_chunk, 2000);
/// assert_eq!(settings.search_budget().as_secs(), 15);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// JSON-RPC endpoint.
    pub rpc_url: Url,
    /// Largest block span of one `eth_getLogs` query.
    pub max_blocks_per_chunk: u64,
    /// Wall-clock budget of a block-by-timestamp search, in seconds.
    pub search_budget_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rpc_url: Url::parse(DEFAULT_RPC_URL).expect("default rpc url"),
            max_blocks_per_chunk: DEFAULT_MAX_BLOCKS_PER_CHUNK,
            search_budget_secs: DEFAULT_SEARCH_BUDGET.as_secs(),
        }
    }
}

impl Settings {
    /// Parses settings from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|err| Error::invalid(format!("settings: {err}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads settings from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|err| Error::invalid(format!("{}: {err}", path.display())))?;
        Self::from_json(&json)
    }

    /// The block search budget.
    #[must_use]
    pub fn search_budget(&self) -> Duration {
        Duration::from_secs(self.search_budget_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.max_blocks_per_chunk == 0 {
            return Err(Error::invalid("max_blocks_per_chunk must be positive"));
        }
        Ok(())
    }
}
