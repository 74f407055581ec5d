//! The consumer-facing cache flavors built on the resolution core.
//!
//! Both share the same map, queue, and traversal; they differ only in what
//! a resolution call hands back and how fetch failures are surfaced.

mod entity;
mod entity_list;

pub use entity::EntityCache;
pub use entity_list::EntityListCache;
