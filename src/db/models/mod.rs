//! Database models.

pub mod deployment_order;

pub use deployment_order::*;
