//! Protocol modules. Each one owns a slice of state and checks the kernel
//! before every guarded mutation.

pub mod bond;
pub mod index;
pub mod mint;
pub mod treasury;

pub use bond::{BondDepository, BondError, BondSettings};
pub use index::{DebaseOutcome, ElasticSupplyIndex, IndexError, IndexSettings};
pub use mint::{MintAccounting, MintError, MinterInfo};
pub use treasury::{Approval, Treasury, TreasuryError};
