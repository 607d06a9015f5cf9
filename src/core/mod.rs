//! Core module - entity resolution engine

pub mod cache;
pub mod config;
pub mod error;
pub mod kind;
pub mod relations;
pub mod resolver;

pub use cache::EntityCache;
pub use config::Config;
pub use error::SyncError;
pub use kind::{CompositeKey, EntityKind};
pub use relations::{PendingRelations, RelationStats};
pub use resolver::{EntityResolver, WriteMode};
