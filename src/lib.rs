//! Nested REST resources over axum: declare a tree of resources, get ancestor-prefixed routes,
//! queries scoped to the ancestors in the URL, a permission cascade through every ancestor,
//! and hyperlinks between any two resources.

pub mod case;
pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod migration;
pub mod resource;
pub mod response;
pub mod routes;
pub mod routing;
pub mod schema;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{load_from_dir, resolve, FullConfig, ResolvedConfig, Settings};
pub use error::{AppError, ConfigError};
pub use extractors::AuthContext;
pub use migration::apply_migrations;
pub use resource::{Action, Operation, ParentLookup, ParentResolver, RequestKeyLookup, ResourceNode, ResourceView};
pub use routes::{common_routes, common_routes_with_ready};
pub use routing::{FlattenedRoute, NestedApi, PathVars, RelationshipIndex, RouteTable, ViewKind};
pub use schema::{FieldDef, FieldKind, ModelDef, ModelSchema, PkType};
pub use service::{Dispatcher, Permission, PolicyRegistry, RequestContext};
pub use state::ApiState;
pub use store::{MemoryStore, PgStore, Record, Store};
