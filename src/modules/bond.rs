//! `BONDS`: discounted bonds that burn principal now and mint a larger
//! payout after vesting.
//!
//! Payouts are minted through `MINTR` with the bond module itself as the
//! caller, so they count against the daily cap and the bond module's own
//! policy limit like any other mint.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::arithmetic::increase_by_bps;
use crate::audit::ProtocolEvent;
use crate::error::ErrorKind;
use crate::kernel::{Kernel, KernelError};
use crate::ledger::{BalanceLedger, LedgerError};
use crate::module::{Module, ModuleGuard};
use crate::modules::mint::{MintAccounting, MintError};
use crate::types::{Address, CallContext, Keycode, SECONDS_PER_DAY};

/// Role name of the bond module.
pub const KEYCODE: Keycode = Keycode::literal(b"BONDS");

/// Guarded operation names.
pub mod ops {
    /// Change the standard or partner discount.
    pub const SET_BONDING_DISCOUNT: &str = "setBondingDiscount";
    /// Open a bond.
    pub const CREATE_BOND: &str = "createBond";
    /// Pay out a vested bond.
    pub const REDEEM_BOND: &str = "redeemBond";
}

/// Discount ceiling (50%).
pub const MAX_DISCOUNT_BP: u32 = 5_000;

/// Default vesting period in seconds.
pub const DEFAULT_VESTING_SECS: u64 = 3 * 86_400;

/// Bond module failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BondError {
    /// Kernel rejected the call.
    #[error(transparent)]
    Kernel(#[from] KernelError),
    /// Ledger rejected the principal burn.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// Payout mint was rejected.
    #[error("bond payout mint failed: {0}")]
    Mint(#[from] MintError),
    /// Discount above the ceiling.
    #[error("bond discount {requested_bp}bp exceeds maximum {max_bp}bp")]
    DiscountTooHigh {
        /// Requested discount.
        requested_bp: u32,
        /// Ceiling.
        max_bp: u32,
    },
    /// Holder already has an open bond.
    #[error("{holder} already has an open bond")]
    BondExists {
        /// Holder.
        holder: Address,
    },
    /// Redeem before maturity.
    #[error("bond of {holder} matures at {maturity}")]
    BondNotMature {
        /// Holder.
        holder: Address,
        /// Vesting end.
        maturity: DateTime<Utc>,
    },
    /// No open bond for the holder.
    #[error("no open bond for {holder}")]
    NoBond {
        /// Holder.
        holder: Address,
    },
    /// Zero principal.
    #[error("bond principal must be positive")]
    ZeroPrincipal,
    /// Invalid vesting period.
    #[error("invalid vesting period {secs}s")]
    InvalidVesting {
        /// Rejected period.
        secs: u64,
    },
    /// Payout or maturity overflow.
    #[error("bond arithmetic overflow")]
    ArithmeticOverflow,
}

impl BondError {
    /// Caller-visible failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Kernel(e) => e.kind(),
            Self::Ledger(e) => e.kind(),
            Self::Mint(e) => e.kind(),
            Self::DiscountTooHigh { .. } => ErrorKind::DiscountTooHigh,
            Self::BondExists { .. } | Self::ZeroPrincipal | Self::InvalidVesting { .. } => {
                ErrorKind::InvalidInput
            }
            Self::BondNotMature { .. } => ErrorKind::NotMature,
            Self::NoBond { .. } => ErrorKind::NotFound,
            Self::ArithmeticOverflow => ErrorKind::ArithmeticOverflow,
        }
    }
}

/// One open bond.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bond {
    /// Principal burned at creation.
    pub principal: u128,
    /// Amount minted on redeem.
    pub payout: u128,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Vesting end.
    pub maturity: DateTime<Utc>,
}

/// Initial bond terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BondSettings {
    /// Discount for ordinary bonds.
    pub standard_discount_bp: u32,
    /// Discount for partner-token bonds.
    pub partner_discount_bp: u32,
    /// Vesting period in seconds.
    pub vesting_secs: u64,
}

impl Default for BondSettings {
    fn default() -> Self {
        Self {
            standard_discount_bp: 1_000,
            partner_discount_bp: 1_500,
            vesting_secs: DEFAULT_VESTING_SECS,
        }
    }
}

/// The `BONDS` module.
#[derive(Debug, Clone)]
pub struct BondDepository {
    guard: ModuleGuard,
    standard_discount_bp: u32,
    partner_discount_bp: u32,
    vesting: TimeDelta,
    bonds: BTreeMap<Address, Bond>,
}

impl BondDepository {
    /// Bond module at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`BondError::DiscountTooHigh`] or [`BondError::InvalidVesting`].
    pub fn new(address: Address, settings: BondSettings) -> Result<Self, BondError> {
        validate_discount(settings.standard_discount_bp)?;
        validate_discount(settings.partner_discount_bp)?;
        let vesting = i64::try_from(settings.vesting_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .filter(|delta| *delta > TimeDelta::zero())
            .ok_or(BondError::InvalidVesting {
                secs: settings.vesting_secs,
            })?;
        Ok(Self {
            guard: ModuleGuard::new(KEYCODE, address),
            standard_discount_bp: settings.standard_discount_bp,
            partner_discount_bp: settings.partner_discount_bp,
            vesting,
            bonds: BTreeMap::new(),
        })
    }

    /// Set the standard or partner discount.
    ///
    /// # Errors
    ///
    /// Returns [`BondError::Kernel`] without `setBondingDiscount` or
    /// [`BondError::DiscountTooHigh`] above 5000bp.
    pub fn set_discount(
        &mut self,
        kernel: &Kernel,
        ctx: &CallContext,
        partner: bool,
        discount_bp: u32,
    ) -> Result<(), BondError> {
        self.guard
            .require(kernel, &ctx.caller, ops::SET_BONDING_DISCOUNT)?;
        validate_discount(discount_bp)?;

        if partner {
            self.partner_discount_bp = discount_bp;
        } else {
            self.standard_discount_bp = discount_bp;
        }
        info!(partner, discount_bp, "bond discount changed");
        kernel.audit().emit(
            ctx.now,
            ProtocolEvent::BondDiscountChanged {
                partner,
                discount_bp,
            },
        );
        Ok(())
    }

    /// Burn `principal` from `holder` (through its allowance to this module)
    /// and open a bond paying the discounted amount at maturity.
    ///
    /// # Errors
    ///
    /// Returns [`BondError::Kernel`] without `createBond`,
    /// [`BondError::BondExists`], [`BondError::ZeroPrincipal`], or the
    /// ledger's allowance/balance error.
    pub fn create_bond(
        &mut self,
        kernel: &Kernel,
        ledger: &mut dyn BalanceLedger,
        ctx: &CallContext,
        holder: &Address,
        principal: u128,
        partner: bool,
    ) -> Result<Bond, BondError> {
        self.guard.require(kernel, &ctx.caller, ops::CREATE_BOND)?;
        if principal == 0 {
            return Err(BondError::ZeroPrincipal);
        }
        if self.bonds.contains_key(holder) {
            return Err(BondError::BondExists {
                holder: holder.clone(),
            });
        }
        let payout = increase_by_bps(principal, self.discount(partner))
            .ok_or(BondError::ArithmeticOverflow)?;
        let maturity = ctx
            .now
            .checked_add_signed(self.vesting)
            .ok_or(BondError::ArithmeticOverflow)?;

        ledger.burn_from(self.guard.address(), holder, principal)?;

        let bond = Bond {
            principal,
            payout,
            created_at: ctx.now,
            maturity,
        };
        self.bonds.insert(holder.clone(), bond.clone());

        info!(holder = %holder, principal, payout, maturity = %maturity, "bond created");
        kernel.audit().emit(
            ctx.now,
            ProtocolEvent::BondCreated {
                holder: holder.clone(),
                principal,
                payout,
                maturity,
            },
        );
        Ok(bond)
    }

    /// Mint the payout of `holder`'s vested bond and close it.
    ///
    /// A rejected payout mint leaves the bond open.
    ///
    /// # Errors
    ///
    /// Returns [`BondError::Kernel`] without `redeemBond`, [`BondError::NoBond`],
    /// [`BondError::BondNotMature`], or [`BondError::Mint`].
    pub fn redeem(
        &mut self,
        kernel: &Kernel,
        minter: &mut MintAccounting,
        ledger: &mut dyn BalanceLedger,
        ctx: &CallContext,
        holder: &Address,
    ) -> Result<u128, BondError> {
        self.guard.require(kernel, &ctx.caller, ops::REDEEM_BOND)?;
        let bond = self
            .bonds
            .get(holder)
            .cloned()
            .ok_or_else(|| BondError::NoBond {
                holder: holder.clone(),
            })?;
        if ctx.now < bond.maturity {
            return Err(BondError::BondNotMature {
                holder: holder.clone(),
                maturity: bond.maturity,
            });
        }

        let as_module = ctx.forwarded_by(self.guard.address());
        if let Err(e) = minter.mint(kernel, ledger, &as_module, holder, bond.payout) {
            warn!(holder = %holder, payout = bond.payout, error = %e, "bond payout rejected");
            return Err(e.into());
        }
        self.bonds.remove(holder);

        info!(holder = %holder, payout = bond.payout, "bond redeemed");
        kernel.audit().emit(
            ctx.now,
            ProtocolEvent::BondRedeemed {
                holder: holder.clone(),
                payout: bond.payout,
            },
        );
        Ok(bond.payout)
    }

    // -- queries ------------------------------------------------------------

    /// Discount applied to new bonds of the given kind.
    pub fn discount(&self, partner: bool) -> u32 {
        if partner {
            self.partner_discount_bp
        } else {
            self.standard_discount_bp
        }
    }

    /// Vesting period.
    pub fn vesting(&self) -> TimeDelta {
        self.vesting
    }

    /// Open bond of `holder`.
    pub fn bond_of(&self, holder: &Address) -> Option<&Bond> {
        self.bonds.get(holder)
    }

    /// Seconds until `holder`'s bond vests, zero once mature.
    pub fn seconds_to_maturity(&self, holder: &Address, now: DateTime<Utc>) -> Option<i64> {
        let bond = self.bonds.get(holder)?;
        let left = bond.maturity.signed_duration_since(now).num_seconds();
        Some(left.max(0))
    }

    /// Days until `holder`'s bond vests, rounded down.
    pub fn days_to_maturity(&self, holder: &Address, now: DateTime<Utc>) -> Option<i64> {
        self.seconds_to_maturity(holder, now)
            .map(|secs| secs.div_euclid(SECONDS_PER_DAY))
    }
}

impl Module for BondDepository {
    fn keycode(&self) -> Keycode {
        KEYCODE
    }

    fn address(&self) -> &Address {
        self.guard.address()
    }
}

fn validate_discount(discount_bp: u32) -> Result<(), BondError> {
    if discount_bp > MAX_DISCOUNT_BP {
        return Err(BondError::DiscountTooHigh {
            requested_bp: discount_bp,
            max_bp: MAX_DISCOUNT_BP,
        });
    }
    Ok(())
}
