//! Permission table tests: grants, revocation, generations.

use supply_kernel::error::ErrorKind;
use supply_kernel::kernel::{Action, KernelError};
use supply_kernel::module::ModuleGuard;
use supply_kernel::types::{Keycode, Operation};

use crate::support::{addr, ctx, exec, kernel, StubModule, StubPolicy, DAY0};

fn mint_op() -> Operation {
    Operation::new("mint")
}

fn mintr_keycode() -> Keycode {
    Keycode::new("MINTR").expect("valid keycode")
}

#[test]
fn permissions_default_to_denied() {
    let mut kernel = kernel();
    let mut module = StubModule::new("MINTR", "mintr");
    kernel
        .execute_action(&exec(DAY0), Action::InstallModule(&mut module))
        .expect("install");

    assert!(!kernel.require_permission(&addr("mintr"), &addr("anyone"), &mint_op()));
    assert!(!kernel.require_permission(&addr("unknown"), &addr("anyone"), &mint_op()));
}

#[test]
fn grant_then_revoke_round_trips() {
    let mut kernel = kernel();
    let mut module = StubModule::new("MINTR", "mintr");
    kernel
        .execute_action(&exec(DAY0), Action::InstallModule(&mut module))
        .expect("install");

    kernel
        .set_module_permission(&exec(DAY0), &addr("mintr"), &addr("p"), &mint_op(), true)
        .expect("grant");
    assert!(kernel.require_permission(&addr("mintr"), &addr("p"), &mint_op()));
    assert!(!kernel.require_permission(&addr("mintr"), &addr("q"), &mint_op()));
    assert!(!kernel.require_permission(&addr("mintr"), &addr("p"), &"burn".into()));

    kernel
        .set_module_permission(&exec(DAY0), &addr("mintr"), &addr("p"), &mint_op(), false)
        .expect("revoke");
    assert!(!kernel.require_permission(&addr("mintr"), &addr("p"), &mint_op()));
}

#[test]
fn set_permission_is_executor_only_and_needs_a_current_module() {
    let mut kernel = kernel();
    let err = kernel
        .set_module_permission(&exec(DAY0), &addr("mintr"), &addr("p"), &mint_op(), true)
        .expect_err("module not installed");
    assert_eq!(err.kind(), ErrorKind::ModuleNotFound);

    let mut module = StubModule::new("MINTR", "mintr");
    kernel
        .execute_action(&exec(DAY0), Action::InstallModule(&mut module))
        .expect("install");
    let err = kernel
        .set_module_permission(
            &ctx("p", DAY0),
            &addr("mintr"),
            &addr("p"),
            &mint_op(),
            true,
        )
        .expect_err("self-grant");
    assert_eq!(err.kind(), ErrorKind::NotExecutor);
    assert_eq!(kernel.permission_count(), 0);
}

#[test]
fn upgrade_purges_old_generation_and_denies_stale_instance() {
    let mut kernel = kernel();
    let mut v1 = StubModule::new("MINTR", "mintr-v1");
    kernel
        .execute_action(&exec(DAY0), Action::InstallModule(&mut v1))
        .expect("install");
    kernel
        .set_module_permission(&exec(DAY0), &addr("mintr-v1"), &addr("p"), &mint_op(), true)
        .expect("grant");

    let mut v2 = StubModule::new("MINTR", "mintr-v2");
    kernel
        .execute_action(&exec(DAY0), Action::UpgradeModule(&mut v2))
        .expect("upgrade");

    assert_eq!(kernel.permission_count(), 0);
    assert!(!kernel.require_permission(&addr("mintr-v2"), &addr("p"), &mint_op()));

    kernel
        .set_module_permission(&exec(DAY0), &addr("mintr-v2"), &addr("p"), &mint_op(), true)
        .expect("re-grant on new generation");
    assert!(kernel.require_permission(&addr("mintr-v2"), &addr("p"), &mint_op()));

    // The superseded instance never regains authority.
    let stale = ModuleGuard::new(mintr_keycode(), addr("mintr-v1"));
    let err = stale
        .require(&kernel, &addr("p"), "mint")
        .expect_err("stale module");
    assert!(matches!(err, KernelError::PermissionDenied { .. }));
}

#[test]
fn grant_requested_needs_executor_and_active_policy() {
    let mut kernel = kernel();
    let mut module = StubModule::new("MINTR", "mintr");
    let mut policy = StubPolicy::new("policy", &[("MINTR", "mint"), ("MINTR", "burn")]);
    kernel
        .execute_action(&exec(DAY0), Action::InstallModule(&mut module))
        .expect("install");

    let err = kernel
        .grant_requested(&exec(DAY0), &addr("policy"))
        .expect_err("policy not active");
    assert_eq!(err.kind(), ErrorKind::PolicyInactive);

    kernel
        .execute_action(&exec(DAY0), Action::ActivatePolicy(&mut policy))
        .expect("activate");
    let err = kernel
        .grant_requested(&ctx("policy", DAY0), &addr("policy"))
        .expect_err("not executor");
    assert_eq!(err.kind(), ErrorKind::NotExecutor);

    let granted = kernel
        .grant_requested(&exec(DAY0), &addr("policy"))
        .expect("grant");
    assert_eq!(granted, 2);
    assert!(kernel.require_permission(&addr("mintr"), &addr("policy"), &mint_op()));
    assert!(kernel.require_permission(&addr("mintr"), &addr("policy"), &"burn".into()));
}

#[test]
fn grant_requested_after_upgrade_targets_new_generation() {
    let mut kernel = kernel();
    let mut v1 = StubModule::new("MINTR", "mintr-v1");
    let mut policy = StubPolicy::new("policy", &[("MINTR", "mint")]);
    kernel
        .execute_action(&exec(DAY0), Action::InstallModule(&mut v1))
        .expect("install");
    kernel
        .execute_action(&exec(DAY0), Action::ActivatePolicy(&mut policy))
        .expect("activate");
    kernel
        .grant_requested(&exec(DAY0), &addr("policy"))
        .expect("grant");

    let mut v2 = StubModule::new("MINTR", "mintr-v2");
    kernel
        .execute_action(&exec(DAY0), Action::UpgradeModule(&mut v2))
        .expect("upgrade");
    assert!(!kernel.require_permission(&addr("mintr-v2"), &addr("policy"), &mint_op()));

    kernel
        .grant_requested(&exec(DAY0), &addr("policy"))
        .expect("re-authorize");
    assert!(kernel.require_permission(&addr("mintr-v2"), &addr("policy"), &mint_op()));
    assert!(kernel.module_permission(mintr_keycode(), &addr("policy"), &mint_op()));
}

#[test]
fn deactivation_revokes_every_permission_of_the_policy() {
    let mut kernel = kernel();
    let mut module = StubModule::new("MINTR", "mintr");
    let mut policy = StubPolicy::new("policy", &[("MINTR", "mint")]);
    kernel
        .execute_action(&exec(DAY0), Action::InstallModule(&mut module))
        .expect("install");
    kernel
        .execute_action(&exec(DAY0), Action::ActivatePolicy(&mut policy))
        .expect("activate");
    kernel
        .grant_requested(&exec(DAY0), &addr("policy"))
        .expect("grant");
    kernel
        .set_module_permission(&exec(DAY0), &addr("mintr"), &addr("other"), &mint_op(), true)
        .expect("grant other");

    kernel
        .execute_action(&exec(DAY0), Action::DeactivatePolicy(&mut policy))
        .expect("deactivate");

    assert_eq!(policy.activations, vec![true, false]);
    assert!(!kernel.is_policy_active(&addr("policy")));
    assert!(!kernel.require_permission(&addr("mintr"), &addr("policy"), &mint_op()));
    assert!(kernel.require_permission(&addr("mintr"), &addr("other"), &mint_op()));
    assert!(kernel.pending_requests(&addr("policy")).is_empty());

    let err = kernel
        .execute_action(&exec(DAY0), Action::DeactivatePolicy(&mut policy))
        .expect_err("already inactive");
    assert_eq!(err.kind(), ErrorKind::PolicyInactive);
}

#[test]
fn superseded_address_cannot_be_reinstated() {
    let mut kernel = kernel();
    let mut v1 = StubModule::new("MINTR", "mintr-v1");
    kernel
        .execute_action(&exec(DAY0), Action::InstallModule(&mut v1))
        .expect("install");
    let mut v2 = StubModule::new("MINTR", "mintr-v2");
    kernel
        .execute_action(&exec(DAY0), Action::UpgradeModule(&mut v2))
        .expect("upgrade");

    let mut back = StubModule::new("MINTR", "mintr-v1");
    let err = kernel
        .execute_action(&exec(DAY0), Action::UpgradeModule(&mut back))
        .expect_err("superseded address");
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(back.init_calls, 0);
    assert_eq!(kernel.generation(mintr_keycode()), Some(1));
    assert_eq!(kernel.module_for_keycode(mintr_keycode()), Some(&addr("mintr-v2")));

    let mut other_role = StubModule::new("INDEX", "mintr-v1");
    let err = kernel
        .execute_action(&exec(DAY0), Action::InstallModule(&mut other_role))
        .expect_err("superseded address under another keycode");
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(kernel.module_count(), 1);

    let err = kernel
        .set_module_permission(&exec(DAY0), &addr("mintr-v1"), &addr("p"), &mint_op(), true)
        .expect_err("stale address resolves to nothing");
    assert_eq!(err.kind(), ErrorKind::ModuleNotFound);
    let stale = ModuleGuard::new(mintr_keycode(), addr("mintr-v1"));
    assert!(stale.require(&kernel, &addr("p"), "mint").is_err());
}

#[test]
fn held_permissions_follow_grants_and_revocations() {
    let mut kernel = kernel();
    let mut module = StubModule::new("MINTR", "mintr");
    kernel
        .execute_action(&exec(DAY0), Action::InstallModule(&mut module))
        .expect("install");
    for op in ["mint", "burn"] {
        kernel
            .set_module_permission(&exec(DAY0), &addr("mintr"), &addr("p"), &op.into(), true)
            .expect("grant");
    }
    kernel
        .set_module_permission(&exec(DAY0), &addr("mintr"), &addr("q"), &mint_op(), true)
        .expect("grant q");

    let held: Vec<_> = kernel
        .permissions_held_by(&addr("p"))
        .map(|key| key.operation.clone())
        .collect();
    assert_eq!(held, vec![Operation::new("burn"), mint_op()]);
    assert!(kernel
        .permissions_held_by(&addr("p"))
        .all(|key| key.keycode == mintr_keycode() && key.generation == 0));

    kernel
        .set_module_permission(&exec(DAY0), &addr("mintr"), &addr("p"), &"burn".into(), false)
        .expect("revoke");
    assert_eq!(kernel.permissions_held_by(&addr("p")).count(), 1);
    assert_eq!(kernel.permissions_held_by(&addr("nobody")).count(), 0);
}
