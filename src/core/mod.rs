//! Calorimeter bookkeeping core.
//!
//! The transport toolkit drives a [`Run`]: it starts each event, reports every energy
//! deposit through [`Run::on_step`], and closes the event. The run owns the module table
//! and the output destination for its whole lifetime.

pub mod accumulator;
pub mod event;
pub mod geometry;
pub mod run;
pub mod source;
pub mod spectrum;

pub use accumulator::{ModuleAccumulator, ModuleRecord, Region};
pub use event::{EventAggregator, EventPhase, EventRecord, EventTotals};
pub use geometry::{Geometry, ModuleGrid, ModuleHandle, VolumeHandle, WORLD_VOLUME};
pub use run::{Run, RunSettings, RunSummary};
pub use source::{EmissionCone, PrimarySource, PrimaryVertex, ShapeSelection};
pub use spectrum::{SpectrumModel, DEFAULT_POINT_ENERGY};
