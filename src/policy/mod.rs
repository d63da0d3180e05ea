//! Policies: caller-facing components built on module permissions.

pub mod token;

pub use token::{TokenDependencies, TokenPolicy, TokenPolicyError};
