//! Time capsule subsystem.
//!
//! # Data Flow
//! ```text
//! ChainConnection + AccountSelector (AppContext)
//!     → query.rs (scan all ids, filter by account, publish snapshot)
//!     → view.rs (cards, badges, dashboard texts)
//!
//! CapsuleDraft → create.rs (validate, submit, follow) → refresh
//! Capsule      → open.rs (check, submit, reveal)      → delayed refresh
//! ```
//!
//! # Constraints
//! - A capsule is visible only to its creator and its recipient
//! - Only the recipient may open, and only once the unlock block is reached
//! - A fetch result is published only if it is still the latest request

pub mod create;
pub mod open;
pub mod query;
pub mod types;
pub mod view;

pub use create::{validate_draft, CapsuleDraft, CreateCapsuleForm, CreateState, ValidatedDraft};
pub use open::{check_open, CapsuleOpener, OpenState};
pub use query::{scan_capsules, CapsuleQueryService, FetchOutcome, Scan, SkipReason};
pub use types::{
    decode_message, projected_unlock_block, Capsule, CapsuleError, CapsuleResult, FieldError,
    OpenRejection,
};
pub use view::{CapsuleView, DashboardView, Readiness};
