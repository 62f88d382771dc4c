//! Request brokering across a pool of third-party inference providers:
//! per-identity daily quotas, session-to-provider affinity with weighted
//! random assignment, and append-only usage accounting with a derived
//! point ledger.

pub mod config;
pub mod logging;
pub mod routing;
