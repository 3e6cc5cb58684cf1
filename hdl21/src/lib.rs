//!
//! # Hdl21 Elaboration Engine
//!
//! Hardware designs are authored as a [Design] of [Module]s, which may instantiate
//! other modules directly, or via parametric [Generator] calls.
//! Modules may include [Bundle]s, structured multi-signal interfaces,
//! and may connect instances to one another's ports through port-references.
//!
//! [elaborate] transforms such a design into an [Elaborated] one:
//! generator-free, bundle-free, and connectivity-checked,
//! ready for a netlister or other [Exporter].
//!

pub mod bundle;
pub mod config;
pub mod data;
pub mod elab;
pub mod error;
pub mod export;
pub mod flatten;
pub mod generator;
pub mod primitives;

mod hierarchy;
mod portrefs;
mod validate;

pub use config::*;
pub use data::*;
pub use elab::*;
pub use error::*;
pub use export::*;
pub use flatten::{flatten, is_flat};
pub use generator::*;
pub use primitives::*;

// Re-export the utilities crate
pub use hdl21utils as utils;

#[cfg(test)]
mod tests;
