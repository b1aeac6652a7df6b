//! Relayer configuration
//!
//! Two layers:
//!
//! - [`Config`] is the process configuration, loaded from an optional
//!   `config/relayer.toml` and `RELAYER__*` environment variables.
//! - [`ChainConfig`] is the per-chain record the listener runs against. It is
//!   built once from [`RawChainConfig`] by [`parse_chain_config`] and never
//!   mutated afterwards.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bounded_cache::{DEFAULT_SEEN_DEPOSIT_CAPACITY, DEFAULT_SEEN_DEPOSIT_TTL_SECS};
use crate::error::ConfigError;
use crate::listener::{PollMode, PollPolicy};
use crate::source::{DEFAULT_FEED_TIMEOUT, DEFAULT_FEED_URL};
use crate::types::ChainId;

pub const DEFAULT_GAS_LIMIT: u64 = 6_721_975;
pub const DEFAULT_GAS_PRICE: u128 = 20_000_000_000;
pub const DEFAULT_GAS_MULTIPLIER: f64 = 1.0;

/// Chain option carrying the test mode; required and must be non-empty
pub const TEST_OPT: &str = "test";

const DEFAULT_CONFIG_FILE: &str = "config/relayer.toml";
const ENV_PREFIX: &str = "RELAYER";

// ============================================================================
// Chain configuration
// ============================================================================

/// Chain record as supplied by the operator, before validation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawChainConfig {
    pub name: String,
    pub id: u8,
    pub endpoint: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub keystore_path: String,
    #[serde(default)]
    pub blockstore_path: String,
    #[serde(default)]
    pub fresh_start: bool,
    #[serde(default)]
    pub opts: HashMap<String, String>,
}

/// Validated, immutable chain configuration
#[derive(Debug, Clone)]
pub struct ChainConfig {
    name: String,
    id: ChainId,
    endpoint: String,
    from: String,
    keystore_path: PathBuf,
    blockstore_path: PathBuf,
    fresh_start: bool,
    bridge_contract: [u8; 20],
    erc20_handler_contract: [u8; 20],
    erc721_handler_contract: [u8; 20],
    generic_handler_contract: [u8; 20],
    gas_limit: u64,
    max_gas_price: u128,
    gas_multiplier: f64,
    http: bool,
    start_block: u64,
    block_confirmations: u64,
    test_mode: String,
}

/// Build a [`ChainConfig`] from the operator-supplied record.
///
/// Fails fast: the `test` option must be present and non-empty, and any other
/// option key is rejected. No defaults are attempted for unknown keys.
pub fn parse_chain_config(raw: RawChainConfig) -> Result<ChainConfig, ConfigError> {
    let mut opts = raw.opts;

    let test_mode = match opts.remove(TEST_OPT) {
        Some(value) if !value.is_empty() => value,
        _ => return Err(ConfigError::MissingOption(TEST_OPT)),
    };

    if !opts.is_empty() {
        let mut unknown: Vec<String> = opts.into_keys().collect();
        unknown.sort();
        return Err(ConfigError::UnknownOptions(unknown));
    }

    Ok(ChainConfig {
        name: raw.name,
        id: ChainId(raw.id),
        endpoint: raw.endpoint,
        from: raw.from,
        keystore_path: PathBuf::from(raw.keystore_path),
        blockstore_path: PathBuf::from(raw.blockstore_path),
        fresh_start: raw.fresh_start,
        bridge_contract: [0u8; 20],
        erc20_handler_contract: [0u8; 20],
        erc721_handler_contract: [0u8; 20],
        generic_handler_contract: [0u8; 20],
        gas_limit: DEFAULT_GAS_LIMIT,
        max_gas_price: DEFAULT_GAS_PRICE,
        gas_multiplier: DEFAULT_GAS_MULTIPLIER,
        http: false,
        start_block: 0,
        block_confirmations: 0,
        test_mode,
    })
}

impl ChainConfig {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> ChainId {
        self.id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn keystore_path(&self) -> &Path {
        &self.keystore_path
    }

    pub fn blockstore_path(&self) -> &Path {
        &self.blockstore_path
    }

    pub fn fresh_start(&self) -> bool {
        self.fresh_start
    }

    /// Bridge contract address (unset in feed mode)
    pub fn bridge_contract(&self) -> &[u8; 20] {
        &self.bridge_contract
    }

    pub fn erc20_handler_contract(&self) -> &[u8; 20] {
        &self.erc20_handler_contract
    }

    pub fn erc721_handler_contract(&self) -> &[u8; 20] {
        &self.erc721_handler_contract
    }

    pub fn generic_handler_contract(&self) -> &[u8; 20] {
        &self.generic_handler_contract
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    pub fn max_gas_price(&self) -> u128 {
        self.max_gas_price
    }

    pub fn gas_multiplier(&self) -> f64 {
        self.gas_multiplier
    }

    pub fn http(&self) -> bool {
        self.http
    }

    pub fn start_block(&self) -> u64 {
        self.start_block
    }

    pub fn block_confirmations(&self) -> u64 {
        self.block_confirmations
    }

    pub fn test_mode(&self) -> &str {
        &self.test_mode
    }
}

// ============================================================================
// Process configuration
// ============================================================================

/// Main configuration for the relayer process
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub chain: RawChainConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default = "default_health_port")]
    pub health_port: u16,
}

/// Upstream deposit feed
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_feed_url")]
    pub url: String,
    #[serde(default = "default_feed_timeout")]
    pub timeout_ms: u64,
}

/// Poll loop policy
#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    #[serde(default = "default_interval")]
    pub retry_interval_ms: u64,
    #[serde(default = "default_interval")]
    pub idle_interval_ms: u64,
    #[serde(default)]
    pub mode: PollMode,
    #[serde(default = "default_dedupe_capacity")]
    pub dedupe_capacity: usize,
    #[serde(default = "default_dedupe_ttl")]
    pub dedupe_ttl_secs: u64,
}

/// Destination writers registered on the router
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub destinations: Vec<u8>,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Default functions
fn default_feed_url() -> String {
    DEFAULT_FEED_URL.to_string()
}

fn default_feed_timeout() -> u64 {
    u64::try_from(DEFAULT_FEED_TIMEOUT.as_millis()).unwrap_or(u64::MAX)
}

fn default_retry_limit() -> u32 {
    5
}

fn default_interval() -> u64 {
    5_000
}

fn default_dedupe_capacity() -> usize {
    DEFAULT_SEEN_DEPOSIT_CAPACITY
}

fn default_dedupe_ttl() -> u64 {
    DEFAULT_SEEN_DEPOSIT_TTL_SECS
}

fn default_queue_capacity() -> usize {
    256
}

fn default_health_port() -> u16 {
    9099
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: default_feed_url(),
            timeout_ms: default_feed_timeout(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            retry_limit: default_retry_limit(),
            retry_interval_ms: default_interval(),
            idle_interval_ms: default_interval(),
            mode: PollMode::default(),
            dedupe_capacity: default_dedupe_capacity(),
            dedupe_ttl_secs: default_dedupe_ttl(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            destinations: Vec::new(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Config {
    /// Load configuration from `.env`, `config/relayer.toml` and the environment
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded .env from {:?}", path);
        }
        Self::load_from_file(DEFAULT_CONFIG_FILE)
    }

    /// Load from a specific config file (optional) plus environment overrides
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("router.destinations"),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text (no environment overlay)
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.feed.url.is_empty() {
            return Err(ConfigError::Invalid("feed.url cannot be empty".into()));
        }
        if self.poll.retry_limit == 0 {
            return Err(ConfigError::Invalid(
                "poll.retry_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Validate the chain section into an immutable [`ChainConfig`]
    pub fn chain_config(&self) -> Result<ChainConfig, ConfigError> {
        parse_chain_config(self.chain.clone())
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            retry_limit: self.poll.retry_limit,
            retry_interval: Duration::from_millis(self.poll.retry_interval_ms),
            idle_interval: Duration::from_millis(self.poll.idle_interval_ms),
            mode: self.poll.mode,
        }
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_millis(self.feed.timeout_ms)
    }
}
