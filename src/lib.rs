//! supply-kernel: capability kernel for a supply-managed token protocol.
//!
//! A [`kernel::Kernel`] owns the module registry and a deny-by-default
//! permission table. Modules ([`modules`]) hold protocol state and consult
//! the kernel before every guarded mutation; policies ([`policy`]) are the
//! caller-facing layer that the executor grants module permissions to.
//!
//! Everything is synchronous. Time comes from the caller through
//! [`types::CallContext`].

#![forbid(unsafe_code)]

pub mod arithmetic;
pub mod audit;
pub mod config;
pub mod error;
pub mod kernel;
pub mod ledger;
pub mod logging;
pub mod module;
pub mod modules;
pub mod policy;
pub mod protocol;
pub mod types;
