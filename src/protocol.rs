//! Deployment wiring: builds a kernel, a ledger and every module from a
//! [`ProtocolConfig`], then installs, activates and grants in order.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::audit::AuditLogger;
use crate::config::{units, ProtocolConfig};
use crate::kernel::{Action, Kernel};
use crate::ledger::{BalanceLedger, ElasticLedger};
use crate::modules::mint::ops as mint_ops;
use crate::modules::{BondDepository, ElasticSupplyIndex, MintAccounting, Treasury};
use crate::policy::TokenPolicy;
use crate::types::{Address, CallContext, Operation};

/// Fixed component addresses of a bootstrapped deployment.
pub mod addresses {
    /// `MINTR` implementation.
    pub const MINTR: &str = "mintr";
    /// `INDEX` implementation.
    pub const INDEX: &str = "index";
    /// `TRSRY` implementation and reserve account.
    pub const TREASURY: &str = "treasury";
    /// `BONDS` implementation.
    pub const BONDS: &str = "bonds";
    /// Token policy.
    pub const TOKEN_POLICY: &str = "token-policy";
}

/// A complete deployment.
#[derive(Debug)]
pub struct Protocol {
    /// Capability kernel.
    pub kernel: Kernel,
    /// Balance ledger.
    pub ledger: ElasticLedger,
    /// `MINTR`.
    pub mintr: MintAccounting,
    /// `INDEX`.
    pub index: ElasticSupplyIndex,
    /// `TRSRY`.
    pub treasury: Treasury,
    /// `BONDS`.
    pub bonds: BondDepository,
    /// Token policy, active with its standard permissions granted.
    pub token_policy: TokenPolicy,
}

impl Protocol {
    /// Build and wire a deployment at `now`.
    ///
    /// Genesis balances are credited straight to the ledger before any
    /// module exists, so they never count against mint limits.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or any wiring step is rejected.
    pub fn bootstrap(
        config: &ProtocolConfig,
        audit: Arc<AuditLogger>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        config.validate()?;
        let executor = config.executor();
        let ctx = CallContext::new(executor.clone(), now);

        let mut ledger = ElasticLedger::new();
        let holder = Address::new(config.genesis.holder.as_str());
        ledger
            .mint(&holder, units(config.genesis.supply, "genesis.supply")?)
            .context("failed to credit genesis supply")?;
        let treasury_address = Address::new(addresses::TREASURY);
        ledger
            .mint(
                &treasury_address,
                units(config.genesis.treasury_reserves, "genesis.treasury_reserves")?,
            )
            .context("failed to seed treasury reserves")?;

        let mut kernel = Kernel::new(executor, audit);
        let mut mintr = MintAccounting::new(
            Address::new(addresses::MINTR),
            units(config.mint.daily_mint_cap, "mint.daily_mint_cap")?,
        );
        let mut index =
            ElasticSupplyIndex::new(Address::new(addresses::INDEX), config.index_settings()?)?;
        let mut treasury = Treasury::new(treasury_address);
        let mut bonds = BondDepository::new(Address::new(addresses::BONDS), config.bond_settings())?;
        let mut token_policy = TokenPolicy::new(Address::new(addresses::TOKEN_POLICY));

        kernel.execute_action(&ctx, Action::InstallModule(&mut mintr))?;
        kernel.execute_action(&ctx, Action::InstallModule(&mut index))?;
        kernel.execute_action(&ctx, Action::InstallModule(&mut treasury))?;
        kernel.execute_action(&ctx, Action::InstallModule(&mut bonds))?;

        let policy_address = Address::new(addresses::TOKEN_POLICY);
        kernel.execute_action(&ctx, Action::ActivatePolicy(&mut token_policy))?;
        kernel.grant_requested(&ctx, &policy_address)?;

        mintr.add_minter(
            &kernel,
            &ctx,
            &policy_address,
            units(config.mint.policy_limit, "mint.policy_limit")?,
        )?;
        let bonds_address = Address::new(addresses::BONDS);
        mintr.add_minter(
            &kernel,
            &ctx,
            &bonds_address,
            units(config.mint.bond_limit, "mint.bond_limit")?,
        )?;
        kernel.set_module_permission(
            &ctx,
            &Address::new(addresses::MINTR),
            &bonds_address,
            &Operation::new(mint_ops::MINT),
            true,
        )?;

        info!(
            modules = kernel.module_count(),
            permissions = kernel.permission_count(),
            total_supply = ledger.total_supply(),
            "protocol bootstrapped"
        );
        Ok(Self {
            kernel,
            ledger,
            mintr,
            index,
            treasury,
            bonds,
            token_policy,
        })
    }
}
