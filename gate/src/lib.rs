//! Start-gate resolution: decides on every launch, within a hard deadline,
//! whether to show the local experience or a remotely specified destination.
//!
//! A [`Gate`] is built once per process. [`Gate::launch`] consults the result
//! cache first; on a miss it races the resolution [`pipeline`] against the
//! overall deadline and hands exactly one [`Destination`] to the
//! [`Presenter`].

pub mod backend;
pub mod cache;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod gate;
pub mod identity;
pub mod metrics_defs;
pub mod params;
pub mod payload;
pub mod pipeline;
pub mod redirects;
pub mod remote_config;
pub mod store;
pub mod supervisor;
pub mod transport;

#[cfg(test)]
mod testutils;

pub use config::GateConfig;
pub use errors::{GateError, SetupError};
pub use gate::{Destination, Gate, GateOutcome, Presenter};
