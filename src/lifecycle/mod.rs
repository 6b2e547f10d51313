//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     AppContext teardown → trigger → block follower and watch loops exit
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM → end the `watch` command
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
