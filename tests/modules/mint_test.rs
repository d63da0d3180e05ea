//! Mint limiter tests.

use supply_kernel::error::ErrorKind;
use supply_kernel::kernel::{Action, Kernel};
use supply_kernel::ledger::{BalanceLedger, ElasticLedger};
use supply_kernel::modules::mint::{self, MintAccounting, MintError};
use supply_kernel::types::{Address, SECONDS_PER_DAY};

use crate::support::{addr, at, ctx, exec, kernel, tokens, DAY0};

const DAY: i64 = SECONDS_PER_DAY;

struct Fixture {
    kernel: Kernel,
    ledger: ElasticLedger,
    mintr: MintAccounting,
}

/// MINTR with a 1000-token cap; `policy` holds mint and burn with `limit`.
fn setup(limit: u64) -> Fixture {
    let mut kernel = kernel();
    let mut mintr = MintAccounting::new(addr("mintr"), tokens(1_000));
    kernel
        .execute_action(&exec(DAY0), Action::InstallModule(&mut mintr))
        .expect("install");
    for op in [mint::ops::MINT, mint::ops::BURN] {
        kernel
            .set_module_permission(&exec(DAY0), &addr("mintr"), &addr("policy"), &op.into(), true)
            .expect("grant");
    }
    mintr
        .add_minter(&kernel, &exec(DAY0), &addr("policy"), tokens(limit))
        .expect("add minter");
    Fixture {
        kernel,
        ledger: ElasticLedger::new(),
        mintr,
    }
}

impl Fixture {
    fn mint(&mut self, secs: i64, amount: u64) -> Result<(), MintError> {
        self.mintr.mint(
            &self.kernel,
            &mut self.ledger,
            &ctx("policy", secs),
            &addr("alice"),
            tokens(amount),
        )
    }

    fn balance(&self, holder: &Address) -> u128 {
        self.ledger.balance_of(holder)
    }
}

#[test]
fn mint_within_cap_updates_both_counters() {
    let mut f = setup(10_000);
    f.mint(DAY0 + 60, 250).expect("mint");

    assert_eq!(f.balance(&addr("alice")), tokens(250));
    assert_eq!(f.mintr.minted_today(), tokens(250));
    let info = f.mintr.minter_info(&addr("policy")).expect("registered");
    assert_eq!(info.minted_so_far, tokens(250));
    assert_eq!(info.remaining(), tokens(9_750));
    assert_eq!(f.mintr.remaining_today(at(DAY0 + 120)), tokens(750));
}

#[test]
fn cap_exceeded_within_one_day_changes_nothing() {
    let mut f = setup(10_000);
    f.mint(DAY0 + 10, 600).expect("first mint");

    let err = f.mint(DAY0 + 20, 500).expect_err("over cap");
    assert_eq!(err.kind(), ErrorKind::DailyCapExceeded);
    assert!(matches!(
        err,
        MintError::DailyCapExceeded { minted_today, .. } if minted_today == tokens(600)
    ));
    assert_eq!(f.mintr.minted_today(), tokens(600));
    assert_eq!(f.balance(&addr("alice")), tokens(600));
}

#[test]
fn cap_is_reachable_exactly() {
    let mut f = setup(10_000);
    f.mint(DAY0, 400).expect("mint");
    f.mint(DAY0 + 1, 600).expect("mint up to the cap");
    assert_eq!(f.mintr.remaining_today(at(DAY0 + 2)), 0);
}

#[test]
fn window_resets_on_the_next_day() {
    let mut f = setup(10_000);
    f.mint(DAY0 + 10, 900).expect("day 0");
    assert!(f.mint(DAY0 + DAY - 1, 200).is_err());

    f.mint(DAY0 + DAY, 900).expect("day 1");
    assert_eq!(f.mintr.minted_today(), tokens(900));
    assert_eq!(f.mintr.last_mint_day(), DAY0 / DAY + 1);
}

#[test]
fn skipped_days_reset_once() {
    let mut f = setup(10_000);
    f.mint(DAY0, 900).expect("day 0");
    f.mint(DAY0 + 5 * DAY + 3_600, 1_000).expect("day 5");
    assert_eq!(f.mintr.minted_today(), tokens(1_000));
    assert_eq!(f.mintr.last_mint_day(), DAY0 / DAY + 5);
}

#[test]
fn earlier_clock_does_not_reopen_the_window() {
    let mut f = setup(10_000);
    f.mint(DAY0 + DAY, 900).expect("day 1");

    let err = f.mint(DAY0 + 30, 200).expect_err("skewed back to day 0");
    assert_eq!(err.kind(), ErrorKind::DailyCapExceeded);
    assert_eq!(f.mintr.last_mint_day(), DAY0 / DAY + 1);

    f.mint(DAY0 + 30, 100).expect("still within the day-1 window");
    assert_eq!(f.mintr.minted_today(), tokens(1_000));
}

#[test]
fn policy_limit_is_checked_independently_of_the_cap() {
    let mut f = setup(300);
    let err = f.mint(DAY0, 400).expect_err("above policy limit");
    assert_eq!(err.kind(), ErrorKind::PolicyLimitExceeded);
    assert_eq!(f.mintr.minted_today(), 0);

    f.mint(DAY0, 300).expect("exactly at limit");
    let err = f.mint(DAY0 + 2 * DAY, 1).expect_err("lifetime limit spent");
    assert_eq!(err.kind(), ErrorKind::PolicyLimitExceeded);
}

#[test]
fn unconfigured_caller_has_zero_limit() {
    let mut f = setup(10_000);
    f.kernel
        .set_module_permission(&exec(DAY0), &addr("mintr"), &addr("rogue"), &"mint".into(), true)
        .expect("grant");

    let err = f
        .mintr
        .mint(&f.kernel, &mut f.ledger, &ctx("rogue", DAY0), &addr("rogue"), 1)
        .expect_err("no limit configured");
    assert_eq!(err.kind(), ErrorKind::PolicyLimitExceeded);
    assert!(!f.mintr.is_minter(&addr("rogue")));
}

#[test]
fn ungranted_caller_is_denied() {
    let mut f = setup(10_000);
    let err = f
        .mintr
        .mint(&f.kernel, &mut f.ledger, &ctx("mallory", DAY0), &addr("mallory"), 1)
        .expect_err("no permission");
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

#[test]
fn burn_uses_allowance_and_keeps_counters() {
    let mut f = setup(10_000);
    f.mint(DAY0, 500).expect("mint");
    f.ledger.approve(&addr("alice"), &addr("mintr"), tokens(200));

    f.mintr
        .burn(&f.kernel, &mut f.ledger, &ctx("policy", DAY0), &addr("alice"), tokens(200))
        .expect("burn");
    assert_eq!(f.balance(&addr("alice")), tokens(300));
    assert_eq!(f.mintr.minted_today(), tokens(500));

    let err = f
        .mintr
        .burn(&f.kernel, &mut f.ledger, &ctx("policy", DAY0), &addr("alice"), 1)
        .expect_err("allowance spent");
    assert_eq!(err.kind(), ErrorKind::InsufficientAllowance);
}

#[test]
fn configuration_is_executor_only() {
    let mut f = setup(10_000);
    let err = f
        .mintr
        .set_daily_mint_cap(&f.kernel, &ctx("policy", DAY0), tokens(1))
        .expect_err("not executor");
    assert_eq!(err.kind(), ErrorKind::NotExecutor);

    f.mintr
        .set_daily_mint_cap(&f.kernel, &exec(DAY0), tokens(50))
        .expect("executor");
    assert_eq!(f.mintr.daily_mint_cap(), tokens(50));

    let err = f
        .mintr
        .set_policy_limit(&f.kernel, &exec(DAY0), &addr("nobody"), 1)
        .expect_err("unknown minter");
    assert_eq!(err.kind(), ErrorKind::NotFound);

    f.mintr
        .remove_minter(&f.kernel, &exec(DAY0), &addr("policy"))
        .expect("remove");
    assert!(!f.mintr.is_minter(&addr("policy")));
    let err = f.mint(DAY0, 1).expect_err("removed minter");
    assert_eq!(err.kind(), ErrorKind::PolicyLimitExceeded);
}

#[test]
fn upgraded_away_instance_stays_powerless() {
    let mut f = setup(10_000);
    let mut v2 = MintAccounting::new(addr("mintr-v2"), tokens(1_000));
    f.kernel
        .execute_action(&exec(DAY0), Action::UpgradeModule(&mut v2))
        .expect("upgrade");

    let mut reused = MintAccounting::new(addr("mintr"), 0);
    let err = f
        .kernel
        .execute_action(&exec(DAY0), Action::UpgradeModule(&mut reused))
        .expect_err("old address");
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    let regrant = f.kernel.set_module_permission(
        &exec(DAY0),
        &addr("mintr"),
        &addr("policy"),
        &mint::ops::MINT.into(),
        true,
    );
    assert!(regrant.is_err());

    let err = f.mint(DAY0 + 60, 100).expect_err("stale instance");
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(f.balance(&addr("alice")), 0);
}
