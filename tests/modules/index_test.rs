//! Elastic supply index tests.

use supply_kernel::error::ErrorKind;
use supply_kernel::kernel::{Action, Kernel};
use supply_kernel::ledger::{BalanceLedger, ElasticLedger};
use supply_kernel::modules::index::{self, DebaseOutcome, ElasticSupplyIndex, IndexError, IndexSettings};
use supply_kernel::types::{SCALE, SECONDS_PER_DAY};

use crate::support::{addr, at, ctx, exec, kernel, tokens, DAY0};

const DAY: i64 = SECONDS_PER_DAY;

struct Fixture {
    kernel: Kernel,
    ledger: ElasticLedger,
    index: ElasticSupplyIndex,
}

/// One million tokens outstanding, 3% per day, 500k floor; `policy` holds both ops.
fn setup_with(settings: IndexSettings) -> Fixture {
    let mut kernel = kernel();
    let mut ledger = ElasticLedger::new();
    ledger
        .mint(&addr("genesis"), tokens(1_000_000))
        .expect("genesis");
    let mut index = ElasticSupplyIndex::new(addr("index"), settings).expect("settings");
    kernel
        .execute_action(&exec(DAY0), Action::InstallModule(&mut index))
        .expect("install");
    for op in [index::ops::DEBASE, index::ops::CHANGE_DEBASE_RATE] {
        kernel
            .set_module_permission(&exec(DAY0), &addr("index"), &addr("policy"), &op.into(), true)
            .expect("grant");
    }
    Fixture {
        kernel,
        ledger,
        index,
    }
}

fn setup() -> Fixture {
    setup_with(IndexSettings {
        min_debase_threshold: tokens(500_000),
        ..IndexSettings::default()
    })
}

impl Fixture {
    fn debase(&mut self, secs: i64) -> Result<DebaseOutcome, IndexError> {
        self.index
            .debase(&self.kernel, &mut self.ledger, &ctx("policy", secs))
    }
}

#[test]
fn install_starts_the_cooldown() {
    let f = setup();
    assert_eq!(f.index.last_debase_time(), at(DAY0));
    assert_eq!(f.index.next_debase_at().expect("in range"), at(DAY0 + DAY));
}

#[test]
fn debase_before_interval_is_too_soon() {
    let mut f = setup();
    let err = f.debase(DAY0 + DAY - 1).expect_err("one second early");
    assert_eq!(err.kind(), ErrorKind::RateTooSoon);
    assert!(err.kind().is_retryable());
    assert_eq!(f.ledger.index(), SCALE);
}

#[test]
fn three_debases_compound() {
    let mut f = setup();
    let expected = [
        970_000_000_000_000_000_u128,
        940_900_000_000_000_000,
        912_673_000_000_000_000,
    ];
    for (step, want) in (1_i64..).zip(expected) {
        let outcome = f.debase(DAY0 + step * DAY).expect("debase");
        assert!(matches!(outcome, DebaseOutcome::Applied { index, .. } if index == want));
        assert_eq!(f.ledger.index(), want);
    }
    assert_eq!(f.ledger.total_supply(), tokens(912_673));
    assert_eq!(f.ledger.raw_total_supply(), tokens(1_000_000));
}

#[test]
fn back_to_back_debase_is_rejected() {
    let mut f = setup();
    f.debase(DAY0 + DAY).expect("first");
    let err = f.debase(DAY0 + DAY + 3_600).expect_err("cooldown");
    assert!(matches!(err, IndexError::RateTooSoon { next_allowed } if next_allowed == at(DAY0 + 2 * DAY)));
    assert_eq!(f.ledger.index(), 970_000_000_000_000_000);
}

#[test]
fn clock_earlier_than_last_debase_is_too_soon() {
    let mut f = setup();
    f.debase(DAY0 + 3 * DAY).expect("debase");
    let err = f.debase(DAY0 + DAY).expect_err("clock went backwards");
    assert_eq!(err.kind(), ErrorKind::RateTooSoon);
}

#[test]
fn below_threshold_is_skipped_without_state_change() {
    let mut f = setup_with(IndexSettings {
        min_debase_threshold: tokens(2_000_000),
        ..IndexSettings::default()
    });

    let outcome = f.debase(DAY0 + DAY).expect("skip is not an error");
    assert_eq!(
        outcome,
        DebaseOutcome::Skipped {
            effective_supply: tokens(1_000_000),
            min_threshold: tokens(2_000_000),
        }
    );
    assert_eq!(f.ledger.index(), SCALE);
    assert_eq!(f.index.last_debase_time(), at(DAY0));
}

#[test]
fn rate_change_applies_to_the_next_debase() {
    let mut f = setup();
    f.index
        .change_debase_rate(&f.kernel, &ctx("policy", DAY0), 500)
        .expect("change rate");
    assert_eq!(f.index.debase_rate(), 500);

    f.debase(DAY0 + DAY).expect("debase");
    assert_eq!(f.ledger.index(), 950_000_000_000_000_000);
}

#[test]
fn rate_bounds_are_enforced() {
    let mut f = setup();
    for rate in [10_000, 5_001, u32::MAX] {
        let err = f
            .index
            .change_debase_rate(&f.kernel, &ctx("policy", DAY0), rate)
            .expect_err("rate too high");
        assert_eq!(err.kind(), ErrorKind::RateTooHigh);
    }
    f.index
        .change_debase_rate(&f.kernel, &ctx("policy", DAY0), 5_000)
        .expect("ceiling is inclusive");
    f.index
        .change_debase_rate(&f.kernel, &ctx("policy", DAY0), 0)
        .expect("zero rate pauses decay");

    f.debase(DAY0 + DAY).expect("debase at zero rate");
    assert_eq!(f.ledger.index(), SCALE);
}

#[test]
fn index_never_reaches_zero() {
    let mut f = setup_with(IndexSettings::default());
    f.ledger.set_index(1).expect("lower index directly");

    let err = f.debase(DAY0 + DAY).expect_err("would reach zero");
    assert_eq!(err.kind(), ErrorKind::IndexExhausted);
    assert_eq!(f.ledger.index(), 1);
}

#[test]
fn unguarded_callers_cannot_debase() {
    let mut f = setup();
    let err = f
        .index
        .debase(&f.kernel, &mut f.ledger, &ctx("anyone", DAY0 + DAY))
        .expect_err("no permission");
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

#[test]
fn schedule_setters_are_executor_only() {
    let mut f = setup();
    let err = f
        .index
        .set_debase_interval(&f.kernel, &ctx("policy", DAY0), 60)
        .expect_err("not executor");
    assert_eq!(err.kind(), ErrorKind::NotExecutor);

    f.index
        .set_debase_interval(&f.kernel, &exec(DAY0), 3_600)
        .expect("executor");
    f.index
        .set_min_debase_threshold(&f.kernel, &exec(DAY0), 0)
        .expect("executor");
    assert_eq!(f.index.next_debase_at().expect("in range"), at(DAY0 + 3_600));
    f.debase(DAY0 + 3_600).expect("shorter interval");
}
