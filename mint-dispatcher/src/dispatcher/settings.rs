use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use ethers_core::types::Address;
use eyre::{ensure, Context, Result};

use crate::trace::TracingConfig;

const ENV_PREFIX: &str = "MINTER";

/// Settings for `MintDispatcher`, fixed at construction
// keys stay snake_case: the config crate lowercases every key it reads
#[derive(Debug, Clone, serde::Deserialize)]
pub struct DispatcherSettings {
    /// label used for metrics and logs, usually the chain name
    #[serde(default = "default_domain")]
    pub domain: String,
    /// contract the `mint` calls are sent to
    #[serde(default)]
    pub contract: Address,
    /// maximum number of requests drained into one batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// pause between two batches of the same drain
    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,
    /// number of times a dropped transaction is re-queued before its request is rejected
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_multiplier_numerator")]
    pub fee_boost_numerator: u32,
    #[serde(default = "default_multiplier_denominator")]
    pub fee_boost_denominator: u32,
    #[serde(default = "default_multiplier_numerator")]
    pub gas_margin_numerator: u32,
    #[serde(default = "default_multiplier_denominator")]
    pub gas_margin_denominator: u32,
    #[serde(default)]
    pub tracing: TracingConfig,
}

fn default_domain() -> String {
    "default".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_inter_batch_delay_ms() -> u64 {
    2_000
}

fn default_max_retries() -> u32 {
    3
}

// 20% on top of the fee when retrying, and on top of the raw gas estimate
fn default_multiplier_numerator() -> u32 {
    120
}

fn default_multiplier_denominator() -> u32 {
    100
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            contract: Address::zero(),
            batch_size: default_batch_size(),
            inter_batch_delay_ms: default_inter_batch_delay_ms(),
            max_retries: default_max_retries(),
            fee_boost_numerator: default_multiplier_numerator(),
            fee_boost_denominator: default_multiplier_denominator(),
            gas_margin_numerator: default_multiplier_numerator(),
            gas_margin_denominator: default_multiplier_denominator(),
            tracing: TracingConfig::default(),
        }
    }
}

impl DispatcherSettings {
    /// Load settings from the given json files, later files overriding earlier ones,
    /// and finally from `MINTER_*` environment variables.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut builder = Config::builder();
        for path in paths {
            let path = path.as_ref();
            ensure!(path.is_file(), "Config file {path:?} does not exist");
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings: Self = builder
            .build()
            .context("Failed to build dispatcher config")?
            .try_deserialize()
            .context("Failed to deserialize dispatcher settings")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size > 0, "batch_size must be greater than zero");
        ensure!(
            self.fee_boost_denominator > 0 && self.gas_margin_denominator > 0,
            "multiplier denominators must be greater than zero"
        );
        ensure!(
            self.fee_boost_numerator >= self.fee_boost_denominator,
            "fee_boost must not lower the fee of a resubmitted transaction"
        );
        Ok(())
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }
}
