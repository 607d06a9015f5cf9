//! Command implementations

pub mod import;
pub mod purge;
