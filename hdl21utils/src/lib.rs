//!
//! # Hdl21 Internal Utilities Crate
//!

pub mod shared;
pub use shared::*;

pub mod ser;
pub use ser::*;

pub mod context;
pub use context::*;

pub mod dep_order;
pub use dep_order::*;

pub mod enumstr;
pub use enumstr::*;
