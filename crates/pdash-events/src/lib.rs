//! Routing of "data added" / "data removed" events by name prefix.

pub mod hierarchy;
pub mod listener;

pub use hierarchy::{HierarchySnapshot, PrefixHierarchy};
pub use listener::{same_listener, ListenerRef, RepositoryListener};
