//! Request-level middleware shared by every `/v1` route.

pub mod metrics;
