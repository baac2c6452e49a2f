//! Crate includes reusable utils for the bridge services that handle common behavior,
//! such as initializing the tracing framework and retrying fallible async operations.

pub mod logging;
pub mod retry;
