//! Chain integration subsystem.
//!
//! # Data Flow
//! ```text
//! ChainConfig (RPC URL, contract address)
//!     → client.rs (RPC connection with timeouts and failover)
//!     → contract.rs (sol! interface, query decoding, call encoding)
//!     → transaction.rs (build, sign, broadcast, follow to finality)
//!     → connection.rs (one shared handle + block height feed)
//! ```
//!
//! # Constraints
//! - All RPC calls have configurable timeouts
//! - "Not connected yet" is a state, not an error
//! - Callers depend on the `backend.rs` traits, never on alloy types directly

pub mod backend;
pub mod client;
pub mod connection;
pub mod contract;
pub mod transaction;
pub mod types;

pub use backend::{CapsuleContract, ChainHandle, ChainReader, RawCapsule, TxProgress};
pub use client::ChainClient;
pub use connection::ChainConnection;
pub use contract::AlloyCapsuleContract;
pub use types::{CapsuleId, ChainConfig, ChainError, ChainId, ChainResult, TxStatus};
