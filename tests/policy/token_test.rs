//! Token policy tests against a bootstrapped deployment.

use std::sync::Arc;

use supply_kernel::audit::AuditLogger;
use supply_kernel::config::ProtocolConfig;
use supply_kernel::error::ErrorKind;
use supply_kernel::kernel::Action;
use supply_kernel::ledger::BalanceLedger;
use supply_kernel::modules::DebaseOutcome;
use supply_kernel::policy::TokenPolicyError;
use supply_kernel::protocol::{addresses, Protocol};
use supply_kernel::types::SECONDS_PER_DAY;

use crate::support::{addr, at, ctx, exec, tokens, DAY0};

fn deploy() -> Protocol {
    let mut p = Protocol::bootstrap(
        &ProtocolConfig::default(),
        Arc::new(AuditLogger::in_memory()),
        at(DAY0),
    )
    .expect("bootstrap");
    p.token_policy
        .authorize_minter(&p.kernel, &exec(DAY0), &addr("app"))
        .expect("authorize app");
    p
}

fn mint(p: &mut Protocol, caller: &str, amount: u64) -> Result<(), TokenPolicyError> {
    p.token_policy.mint(
        &p.kernel,
        &mut p.mintr,
        &mut p.ledger,
        &ctx(caller, DAY0),
        &addr("alice"),
        tokens(amount),
    )
}

#[test]
fn activation_resolves_dependencies() {
    let p = deploy();
    assert!(p.token_policy.is_active());
    let deps = p.token_policy.dependencies().expect("resolved");
    assert_eq!(deps.mintr, addr(addresses::MINTR));
    assert_eq!(deps.index, addr(addresses::INDEX));
}

#[test]
fn authorized_caller_mints_as_the_policy() {
    let mut p = deploy();
    mint(&mut p, "app", 100).expect("mint");

    assert_eq!(p.ledger.balance_of(&addr("alice")), tokens(100));
    let info = p
        .mintr
        .minter_info(&addr(addresses::TOKEN_POLICY))
        .expect("policy is a minter");
    assert_eq!(info.minted_so_far, tokens(100));
}

#[test]
fn unauthorized_caller_is_rejected_before_the_module() {
    let mut p = deploy();
    let err = mint(&mut p, "stranger", 100).expect_err("not authorized");
    assert_eq!(err.kind(), ErrorKind::NotAuthorized);
    assert_eq!(p.mintr.minted_today(), 0);

    p.token_policy
        .deauthorize_minter(&p.kernel, &exec(DAY0), &addr("app"))
        .expect("deauthorize");
    let err = mint(&mut p, "app", 1).expect_err("deauthorized");
    assert!(matches!(err, TokenPolicyError::NotAuthorized { .. }));
}

#[test]
fn minter_set_is_executor_managed() {
    let mut p = deploy();
    let err = p
        .token_policy
        .authorize_minter(&p.kernel, &ctx("app", DAY0), &addr("friend"))
        .expect_err("not executor");
    assert_eq!(err.kind(), ErrorKind::NotExecutor);
    assert!(!p.token_policy.is_authorized_minter(&addr("friend")));
}

#[test]
fn module_limits_surface_through_the_policy() {
    let mut p = deploy();
    p.mintr
        .set_policy_limit(&p.kernel, &exec(DAY0), &addr(addresses::TOKEN_POLICY), tokens(50))
        .expect("lower limit");
    let err = mint(&mut p, "app", 100).expect_err("above policy limit");
    assert_eq!(err.kind(), ErrorKind::PolicyLimitExceeded);
    assert!(matches!(err, TokenPolicyError::Mint(_)));
}

#[test]
fn burn_goes_through_the_mint_module_allowance() {
    let mut p = deploy();
    mint(&mut p, "app", 100).expect("mint");
    p.ledger
        .approve(&addr("alice"), &addr(addresses::MINTR), tokens(40));

    p.token_policy
        .burn(&p.kernel, &mut p.mintr, &mut p.ledger, &ctx("app", DAY0), &addr("alice"), tokens(40))
        .expect("burn");
    assert_eq!(p.ledger.balance_of(&addr("alice")), tokens(60));
}

#[test]
fn anyone_may_trigger_a_debase() {
    let mut p = deploy();
    let outcome = p
        .token_policy
        .debase(&p.kernel, &mut p.index, &mut p.ledger, &ctx("keeper", DAY0 + SECONDS_PER_DAY))
        .expect("debase");
    assert!(matches!(
        outcome,
        DebaseOutcome::Applied { index, .. } if index == 970_000_000_000_000_000
    ));
    assert_eq!(p.ledger.total_supply(), tokens(970_000));
}

#[test]
fn rate_change_is_executor_only() {
    let mut p = deploy();
    let err = p
        .token_policy
        .change_debase_rate(&p.kernel, &mut p.index, &ctx("app", DAY0), 100)
        .expect_err("not executor");
    assert_eq!(err.kind(), ErrorKind::NotExecutor);

    p.token_policy
        .change_debase_rate(&p.kernel, &mut p.index, &exec(DAY0), 100)
        .expect("executor");
    assert_eq!(p.index.debase_rate(), 100);
}

#[test]
fn deactivated_policy_refuses_everything() {
    let mut p = deploy();
    p.kernel
        .execute_action(&exec(DAY0), Action::DeactivatePolicy(&mut p.token_policy))
        .expect("deactivate");

    let err = mint(&mut p, "app", 1).expect_err("inactive");
    assert_eq!(err.kind(), ErrorKind::PolicyInactive);
    let err = p
        .token_policy
        .debase(&p.kernel, &mut p.index, &mut p.ledger, &ctx("keeper", DAY0 + SECONDS_PER_DAY))
        .expect_err("inactive");
    assert_eq!(err.kind(), ErrorKind::PolicyInactive);
    assert!(!p.kernel.require_permission(
        &addr(addresses::MINTR),
        &addr(addresses::TOKEN_POLICY),
        &"mint".into()
    ));
}
