//! Hotspot detection and traffic prediction over heterogeneous
//! location/event extracts.
//!
//! The pipeline runs strictly forward: [`data::loader`] → [`data::enrich`]
//! → [`data::filter`] → {[`cluster`], [`ml`]} → [`data::export`]. Each stage
//! is a plain function of its inputs; [`pipeline`] wires them together and
//! [`state::Session`] holds one caller's selections.

pub mod cluster;
pub mod config;
pub mod data;
pub mod error;
pub mod ml;
pub mod pipeline;
pub mod state;

pub use error::{PipelineError, Result};
