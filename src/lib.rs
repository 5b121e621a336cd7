//!
//! Stratum is a relational entity database that can flatten hierarchies into fixed tables,
//! so queries for values inherited from ancestors become plain column reads
//!

pub mod id;
pub mod error;
pub mod components;
pub mod type_info;
pub mod borrowed;
pub mod column;
pub mod sparse;
pub mod table;
pub mod transfer;
pub mod entity;
pub mod relationship;
pub(crate) mod sources;
pub mod depth;
pub mod names;
pub(crate) mod guard;
pub mod world;
pub mod flatten;
pub mod query;

pub use id::EntityId;
pub use error::DbError;
pub use components::{Component, ComponentType, Id, IdSet, Name, Storage};
pub use table::{FixedLayout, TableId, TableState};
pub use world::{World, CHILD_OF};
pub use flatten::{flatten, FlattenDesc};
pub use query::{Populate, Query, QueryBuilder, QueryIter, Source, Stage, Term};
pub use guard::Operation;
