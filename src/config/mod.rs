//! Configuration loading and validation.
//!
//! Loads the deployment from `./supply-kernel.toml` (or `$SUPPLY_KERNEL_CONFIG`).
//! Environment variables override file values; file values override defaults.
//!
//! Precedence: env vars > config file > defaults.
//!
//! Token amounts are written in whole tokens and scaled by 10^18 on use.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::modules::bond::{BondSettings, MAX_DISCOUNT_BP};
use crate::modules::index::IndexSettings;
use crate::types::{whole_tokens, Address, BASIS_POINTS};

/// Env var naming the config file.
pub const CONFIG_PATH_ENV: &str = "SUPPLY_KERNEL_CONFIG";

/// Config file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_FILE: &str = "supply-kernel.toml";

// ── Top-level config ────────────────────────────────────────────

/// Top-level deployment configuration loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Kernel settings.
    pub kernel: KernelConfig,
    /// Mint limiter settings.
    pub mint: MintConfig,
    /// Supply index settings.
    pub index: IndexConfig,
    /// Bond terms.
    pub bond: BondConfig,
    /// Initial balances.
    pub genesis: GenesisConfig,
    /// Filesystem paths.
    pub paths: PathsConfig,
}

impl ProtocolConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Config file path: `$SUPPLY_KERNEL_CONFIG` or `./supply-kernel.toml`.
    /// A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path_with(|key| std::env::var(key).ok());
        Self::load_with(&path, |key| std::env::var(key).ok())
    }

    /// Load from an explicit path, then apply env overrides through `env`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_with(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::load_from_file(path)?;
        config.apply_overrides(env);
        Ok(config)
    }

    /// Load from TOML file only, no env overrides.
    fn load_from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("invalid config file {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config file {}: {e}",
                path.display()
            )),
        }
    }

    /// Resolve the config path using a custom env resolver (for testing).
    pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function for testability (avoids `set_var` in tests).
    /// Unparseable numeric values are logged and ignored.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        // Kernel.
        if let Some(v) = env("SUPPLY_KERNEL_EXECUTOR") {
            self.kernel.executor = v;
        }
        if let Some(v) = env("SUPPLY_KERNEL_LOG_LEVEL") {
            self.kernel.log_level = v;
        }

        // Mint.
        override_number(&env, "SUPPLY_KERNEL_DAILY_MINT_CAP", &mut self.mint.daily_mint_cap);
        override_number(&env, "SUPPLY_KERNEL_POLICY_LIMIT", &mut self.mint.policy_limit);

        // Index.
        override_number(&env, "SUPPLY_KERNEL_DEBASE_RATE_BP", &mut self.index.debase_rate_bp);
        override_number(
            &env,
            "SUPPLY_KERNEL_DEBASE_INTERVAL_SECS",
            &mut self.index.debase_interval_secs,
        );
        override_number(
            &env,
            "SUPPLY_KERNEL_MIN_DEBASE_THRESHOLD",
            &mut self.index.min_debase_threshold,
        );

        // Paths.
        if let Some(v) = env("SUPPLY_KERNEL_AUDIT_LOG") {
            self.paths.audit_log = Some(v);
        }
        if let Some(v) = env("SUPPLY_KERNEL_LOGS_DIR") {
            self.paths.logs_dir = v;
        }
    }

    /// Parse a TOML string into config.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed TOML or unknown value types.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: ProtocolConfig =
            toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }

    /// Reject values the modules would refuse at bootstrap.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if Address::new(self.kernel.executor.as_str()).is_empty() {
            bail!("kernel.executor must not be empty");
        }
        if self.index.max_debase_rate_bp >= BASIS_POINTS {
            bail!(
                "index.max_debase_rate_bp must be below {BASIS_POINTS}, got {}",
                self.index.max_debase_rate_bp
            );
        }
        if self.index.debase_rate_bp > self.index.max_debase_rate_bp {
            bail!(
                "index.debase_rate_bp {} exceeds index.max_debase_rate_bp {}",
                self.index.debase_rate_bp,
                self.index.max_debase_rate_bp
            );
        }
        for (name, value) in [
            ("bond.standard_discount_bp", self.bond.standard_discount_bp),
            ("bond.partner_discount_bp", self.bond.partner_discount_bp),
        ] {
            if value > MAX_DISCOUNT_BP {
                bail!("{name} {value} exceeds {MAX_DISCOUNT_BP}");
            }
        }
        if self.bond.vesting_secs == 0 {
            bail!("bond.vesting_secs must be positive");
        }
        Ok(())
    }

    /// Executor address.
    pub fn executor(&self) -> Address {
        Address::new(self.kernel.executor.as_str())
    }

    /// Index settings in base units.
    ///
    /// # Errors
    ///
    /// Returns an error if the threshold overflows when scaled.
    pub fn index_settings(&self) -> Result<IndexSettings> {
        Ok(IndexSettings {
            debase_rate_bp: self.index.debase_rate_bp,
            debase_interval_secs: self.index.debase_interval_secs,
            min_debase_threshold: units(
                self.index.min_debase_threshold,
                "index.min_debase_threshold",
            )?,
            max_debase_rate_bp: self.index.max_debase_rate_bp,
        })
    }

    /// Bond settings.
    pub fn bond_settings(&self) -> BondSettings {
        BondSettings {
            standard_discount_bp: self.bond.standard_discount_bp,
            partner_discount_bp: self.bond.partner_discount_bp,
            vesting_secs: self.bond.vesting_secs,
        }
    }
}

/// Scale a whole-token amount to base units.
///
/// # Errors
///
/// Returns an error naming `field` on overflow.
pub fn units(whole: u64, field: &str) -> Result<u128> {
    whole_tokens(whole).with_context(|| format!("{field} overflows when scaled to base units"))
}

fn override_number<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    slot: &mut T,
) {
    if let Some(v) = env(var) {
        match v.parse() {
            Ok(n) => *slot = n,
            Err(_) => tracing::warn!(var, value = %v, "ignoring invalid env override"),
        }
    }
}

// ── Kernel config ───────────────────────────────────────────────

/// Kernel settings (`[kernel]`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Initial executor identity.
    pub executor: String,
    /// Tracing filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            executor: "executor".to_string(),
            log_level: "info".to_string(),
        }
    }
}

// ── Mint config ─────────────────────────────────────────────────

/// Mint limiter settings (`[mint]`), whole tokens.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MintConfig {
    /// Rolling daily cap.
    pub daily_mint_cap: u64,
    /// Lifetime limit of the token policy.
    pub policy_limit: u64,
    /// Lifetime limit of the bond module's payouts.
    pub bond_limit: u64,
}

impl Default for MintConfig {
    fn default() -> Self {
        Self {
            daily_mint_cap: 1_000_000,
            policy_limit: 10_000_000,
            bond_limit: 1_000_000,
        }
    }
}

// ── Index config ────────────────────────────────────────────────

/// Supply index settings (`[index]`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Per-step rate in basis points.
    pub debase_rate_bp: u32,
    /// Minimum seconds between steps.
    pub debase_interval_secs: u64,
    /// Effective-supply floor in whole tokens.
    pub min_debase_threshold: u64,
    /// Rate ceiling in basis points.
    pub max_debase_rate_bp: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        let defaults = IndexSettings::default();
        Self {
            debase_rate_bp: defaults.debase_rate_bp,
            debase_interval_secs: defaults.debase_interval_secs,
            min_debase_threshold: 500_000,
            max_debase_rate_bp: defaults.max_debase_rate_bp,
        }
    }
}

// ── Bond config ─────────────────────────────────────────────────

/// Bond terms (`[bond]`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BondConfig {
    /// Discount for ordinary bonds.
    pub standard_discount_bp: u32,
    /// Discount for partner-token bonds.
    pub partner_discount_bp: u32,
    /// Vesting period in seconds.
    pub vesting_secs: u64,
}

impl Default for BondConfig {
    fn default() -> Self {
        let defaults = BondSettings::default();
        Self {
            standard_discount_bp: defaults.standard_discount_bp,
            partner_discount_bp: defaults.partner_discount_bp,
            vesting_secs: defaults.vesting_secs,
        }
    }
}

// ── Genesis config ──────────────────────────────────────────────

/// Initial balances (`[genesis]`), whole tokens.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GenesisConfig {
    /// Recipient of the initial supply.
    pub holder: String,
    /// Initial supply.
    pub supply: u64,
    /// Reserves seeded into the treasury.
    pub treasury_reserves: u64,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            holder: "genesis".to_string(),
            supply: 1_000_000,
            treasury_reserves: 0,
        }
    }
}

// ── Paths config ────────────────────────────────────────────────

/// Filesystem paths (`[paths]`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Audit JSONL path; in-memory only when unset.
    pub audit_log: Option<String>,
    /// Directory for rolling JSON logs.
    pub logs_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            audit_log: None,
            logs_dir: "logs".to_string(),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────
