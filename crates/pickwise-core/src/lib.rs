// Library root: the picklist engine, its persistence, and configuration.

pub mod config;
pub mod crossout;
pub mod db;
pub mod persist;
pub mod picklist;
pub mod query;
pub mod session;
pub mod store;
pub mod team;

pub use crossout::CrossOutSet;
pub use persist::{BlobStore, MemoryBlobStore, PicklistPersistence};
pub use picklist::{Picklist, PicklistSet, Pruned};
pub use query::PicklistQuery;
pub use session::{EventSession, MarkMode, Marked, PicklistChange, SessionError};
pub use store::{PicklistError, PicklistStore, Removal, RemovalPolicy};
pub use team::TeamId;
