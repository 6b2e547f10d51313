//! Chrono-Capsule client library.
//!
//! Lock a message and an optional token amount on-chain until a future block,
//! addressed to one recipient, and open it once that block is reached.

pub mod capsule;
pub mod chain;
pub mod config;
pub mod context;
pub mod lifecycle;
pub mod observability;
pub mod wallet;

pub use capsule::{CapsuleQueryService, CreateCapsuleForm, CapsuleOpener, DashboardView};
pub use config::CapsuleConfig;
pub use context::AppContext;
pub use lifecycle::Shutdown;
