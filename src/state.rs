//! Shared state of a compiled API. Built once, read-only afterwards.

use crate::config::Settings;
use crate::routing::{RelationshipIndex, RouteTable};
use crate::store::Store;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct ApiState {
    pub routes: Arc<RouteTable>,
    pub index: Arc<RelationshipIndex>,
    pub store: Arc<dyn Store>,
    pub settings: Arc<Settings>,
}
