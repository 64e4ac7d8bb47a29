//! Read-only access to EVM contracts over JSON-RPC: typed `view`/`pure`
//! calls and event log scans with token-amount aggregation.

pub mod config;
pub mod error;
pub mod ethereum;

pub use error::{NodeError, QueryError};
