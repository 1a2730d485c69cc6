//! Radial layout of a codebase tree with a live overlay of agent activity.
//!
//! Pipeline: [`tree`] builds an arena tree from scanned entries,
//! [`radial_layout`] places every node on concentric rings, [`collision`]
//! removes residual overlap, and [`overlay`] records activity events on the
//! nodes without touching positions. [`snapshot`] ties these together per
//! base directory and answers sub-view queries.

pub mod activity;
pub mod collision;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod overlay;
pub mod radial_layout;
pub mod scanner;
pub mod snapshot;
pub mod tree;

pub use error::{Error, Result};
