//! Energy bookkeeping for a modular electromagnetic calorimeter simulation.
//!
//! The transport toolkit owns geometry navigation and physics; this crate supplies the
//! primary energy spectra, the per-module energy table and the per-event records that
//! end up in the output dataset.

pub mod config;
pub mod core;
pub mod error;
pub mod output;

#[cfg(feature = "python")]
mod python;

pub use crate::core::{PrimarySource, Run, RunSettings, RunSummary};
pub use crate::error::{Error, Result};
