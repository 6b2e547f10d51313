//! Signing accounts and their selection.
//!
//! # Data Flow
//! ```text
//! Key source (environment or memory)
//!     → source.rs (per-session access request)
//!     → account.rs (parsed signers)
//!     → selector.rs (active account + balance subscription)
//! ```
//!
//! # Security Constraints
//! - Private keys ONLY from environment variables or caller memory
//! - Never log private keys or sensitive data

pub mod account;
pub mod selector;
pub mod source;
pub mod types;

pub use account::Account;
pub use selector::AccountSelector;
pub use source::{EnvKeySource, KeySource, StaticKeySource};
pub use types::{WalletError, WalletResult};
