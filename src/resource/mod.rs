//! Content resources: the model, where they come from, and the store
//! that indexes them.

mod model;
mod source;
mod store;

pub use model::{Resource, ResourceId, ResourceRef, ResourceState, ResourceType};
pub(crate) use model::relation_slug;
pub use source::{EventHandler, MemorySource, ResourceEvent, ResourceSource, SourceError};
pub use store::{
    Ownership, ResourceConfig, ResourceObserver, ResourceSnapshot, ResourceStore,
};
