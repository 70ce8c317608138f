//! Device backends
//!
//! Hardware access goes through the traits in [`crate::hal`]; this module
//! holds the available backends. The simulated rig is feature-gated so a
//! target build carries no simulation code.

#[cfg(feature = "mock")]
pub mod mock;
