//! Feature-gated logging macros.
//!
//! When the `tracing` feature is enabled, these re-export the corresponding
//! macros from the `tracing` crate. When disabled, they compile to no-ops so
//! the rest of the crate can log unconditionally without extra `cfg` noise.

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, trace, warn};

#[cfg(not(feature = "tracing"))]
macro_rules! trace {
    ($($t:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug {
    ($($t:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! warn {
    ($($t:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use {debug, trace, warn};
