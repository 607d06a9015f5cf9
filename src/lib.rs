//! partsync: CSV part-inventory synchronizer
//!
//! Ingests tabular part-inventory CSV files and synchronizes them into an
//! InvenTree-style inventory backend via its REST API, using an idempotent
//! resolve-or-create pattern so repeated runs never duplicate records.

pub mod cli;
pub mod core;
pub mod ingest;
pub mod store;
