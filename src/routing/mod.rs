//! Compile-time side: flatten the resource forest, index relationships, build the router.

pub mod compile;
pub mod flatten;
pub mod index;

pub use compile::NestedApi;
pub use flatten::{flatten, parse_view_name, Ancestor, FlattenedRoute, PathVars, RouteTable, Segment, ViewKind};
pub use index::RelationshipIndex;
