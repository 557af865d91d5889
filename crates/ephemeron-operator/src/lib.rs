//! Ephemeron operator library
//!
//! Controller wiring for the operator binary. The reconciliation logic
//! lives in `ephemeron-cluster`; this crate only assembles the runtime.

pub mod controller_runner;
