//! Tree flattening: one route per declared resource, with its ancestor chain and URL segments.

use crate::case::{self, DETAIL_SUFFIX, LIST_SUFFIX};
use crate::error::ConfigError;
use crate::resource::{ParentLookup, ResourceNode, ResourceView};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// One entry of an ancestor chain: the ancestor resource and how its child reaches it.
#[derive(Clone, Debug)]
pub struct Ancestor {
    pub name: String,
    pub model: String,
    pub lookup: ParentLookup,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    pub collection: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewKind {
    List,
    Detail,
}

impl ViewKind {
    pub fn suffix(self) -> &'static str {
        match self {
            ViewKind::List => LIST_SUFFIX,
            ViewKind::Detail => DETAIL_SUFFIX,
        }
    }
}

/// Split "website_visit-detail" into ("website_visit", Detail).
pub fn parse_view_name(view_name: &str) -> Result<(&str, ViewKind), ConfigError> {
    let invalid = || ConfigError::InvalidViewName(view_name.to_string());
    let (resource, kind) = view_name.split_once('-').ok_or_else(invalid)?;
    match kind {
        "list" => Ok((resource, ViewKind::List)),
        "detail" => Ok((resource, ViewKind::Detail)),
        _ => Err(invalid()),
    }
}

/// A resource after flattening. Immutable once the route table is built.
#[derive(Clone, Debug)]
pub struct FlattenedRoute {
    pub name: String,
    pub collection: String,
    pub view: Arc<ResourceView>,
    /// Nested ancestors, outermost first. Empty for top-level resources.
    pub ancestry: Vec<Ancestor>,
    /// URL segments of every enclosing resource and then this one, outermost first.
    pub segments: Vec<Segment>,
    pub cross_links: BTreeMap<String, String>,
}

impl FlattenedRoute {
    pub fn model(&self) -> &str {
        &self.view.model
    }

    pub fn view_name(&self, kind: ViewKind) -> String {
        case::view_name(&self.name, kind.suffix())
    }

    /// Immediate nested parent; target of the permission cascade.
    pub fn parent(&self) -> Option<&Ancestor> {
        self.ancestry.last()
    }

    /// URL variables a view of this route needs. The list omits the route's own id.
    pub fn required_vars(&self, kind: ViewKind) -> Vec<&str> {
        let n = match kind {
            ViewKind::List => self.segments.len().saturating_sub(1),
            ViewKind::Detail => self.segments.len(),
        };
        self.segments[..n].iter().map(|s| s.name.as_str()).collect()
    }

    /// Path pattern in the router's syntax, e.g. "/developers/:developer/languages/".
    pub fn router_path(&self, kind: ViewKind) -> String {
        self.render(kind, |name| format!(":{}", name))
    }

    /// Human-readable pattern, e.g. "developers/{developer}/languages/".
    pub fn pattern(&self, kind: ViewKind) -> String {
        self.render(kind, |name| format!("{{{}}}", name))
            .trim_start_matches('/')
            .to_string()
    }

    fn render(&self, kind: ViewKind, mut capture: impl FnMut(&str) -> String) -> String {
        let mut path = String::from("/");
        let last = self.segments.len().saturating_sub(1);
        for (i, seg) in self.segments.iter().enumerate() {
            path.push_str(&seg.collection);
            path.push('/');
            if i < last || kind == ViewKind::Detail {
                path.push_str(&capture(&seg.name));
                path.push('/');
            }
        }
        path
    }

    fn path_parts(&self, kind: ViewKind) -> usize {
        match kind {
            ViewKind::List => self.segments.len() * 2 - 1,
            ViewKind::Detail => self.segments.len() * 2,
        }
    }
}

/// Pre-order walk of the forest. Names are normalized and must be unique.
pub fn flatten(forest: &[ResourceNode]) -> Result<Vec<FlattenedRoute>, ConfigError> {
    let mut routes = Vec::new();
    let mut seen = HashSet::new();
    for node in forest {
        if node.is_nested() {
            return Err(ConfigError::OrphanNestedResource(node.name.clone()));
        }
        walk(node, None, &mut routes, &mut seen)?;
    }
    Ok(routes)
}

fn walk(
    node: &ResourceNode,
    parent: Option<&FlattenedRoute>,
    out: &mut Vec<FlattenedRoute>,
    seen: &mut HashSet<String>,
) -> Result<(), ConfigError> {
    let name = case::normalize_resource_name(&node.name)?;
    if !seen.insert(name.clone()) {
        return Err(ConfigError::DuplicateResourceName(name));
    }
    case::check_collection(&name, &node.collection)?;

    let mut ancestry = parent.map(|p| p.ancestry.clone()).unwrap_or_default();
    let mut segments = parent.map(|p| p.segments.clone()).unwrap_or_default();
    if let (Some(p), Some(lookup)) = (parent, &node.parent_lookup) {
        ancestry.push(Ancestor {
            name: p.name.clone(),
            model: p.model().to_string(),
            lookup: lookup.clone(),
        });
    }
    segments.push(Segment {
        name: name.clone(),
        collection: node.collection.clone(),
    });

    let cross_links = node
        .cross_links
        .iter()
        .map(|(field, target)| Ok((field.clone(), case::normalize_resource_name(target)?)))
        .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;

    let route = FlattenedRoute {
        name,
        collection: node.collection.clone(),
        view: Arc::clone(&node.view),
        ancestry,
        segments,
        cross_links,
    };
    out.push(route.clone());
    for child in &node.children {
        walk(child, Some(&route), out, seen)?;
    }
    Ok(())
}

/// URL variables bound for one request, in URL order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathVars(Vec<(String, String)>);

impl PathVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Keep only the named variables.
    pub fn restrict(&self, names: &[&str]) -> PathVars {
        PathVars(self.0.iter().filter(|(k, _)| names.contains(&k.as_str())).cloned().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for PathVars {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut vars = PathVars::new();
        for (k, v) in iter {
            vars.insert(k, v);
        }
        vars
    }
}

/// Every flattened route by name. Reverses view names to paths and resolves paths back.
#[derive(Debug)]
pub struct RouteTable {
    routes: Vec<FlattenedRoute>,
    by_name: HashMap<String, usize>,
}

impl RouteTable {
    pub fn new(routes: Vec<FlattenedRoute>) -> Result<Self, ConfigError> {
        let mut by_name = HashMap::new();
        let mut paths = HashSet::new();
        for (i, route) in routes.iter().enumerate() {
            if by_name.insert(route.name.clone(), i).is_some() {
                return Err(ConfigError::DuplicateResourceName(route.name.clone()));
            }
            let collections: Vec<&str> = route.segments.iter().map(|s| s.collection.as_str()).collect();
            if !paths.insert(collections) {
                return Err(ConfigError::Validation(format!(
                    "route '{}' duplicates the path {}",
                    route.name,
                    route.pattern(ViewKind::List)
                )));
            }
        }
        Ok(RouteTable { routes, by_name })
    }

    pub fn routes(&self) -> &[FlattenedRoute] {
        &self.routes
    }

    pub fn get(&self, name: &str) -> Option<&FlattenedRoute> {
        self.by_name.get(name).map(|&i| &self.routes[i])
    }

    pub fn require(&self, name: &str) -> Result<&FlattenedRoute, ConfigError> {
        self.get(name).ok_or_else(|| ConfigError::UnknownResource(name.to_string()))
    }

    /// Root-relative path of a view, e.g. "/developers/1/languages/".
    pub fn reverse(&self, view_name: &str, vars: &PathVars) -> Result<String, ConfigError> {
        let (name, kind) = parse_view_name(view_name)?;
        let route = self.require(name)?;
        let mut missing = None;
        let path = route.render(kind, |var| match vars.get(var) {
            Some(v) => v.to_string(),
            None => {
                missing.get_or_insert_with(|| var.to_string());
                String::new()
            }
        });
        match missing {
            Some(variable) => Err(ConfigError::MissingPathVariable {
                route: view_name.to_string(),
                variable,
            }),
            None => Ok(path),
        }
    }

    /// Inverse of `reverse`: the view name and URL variables a path addresses.
    pub fn resolve_path(&self, path: &str) -> Option<(String, PathVars)> {
        let parts: Vec<&str> = path.trim_matches('/').split('/').filter(|p| !p.is_empty()).collect();
        if parts.is_empty() {
            return None;
        }
        let kind = if parts.len() % 2 == 0 { ViewKind::Detail } else { ViewKind::List };
        self.routes.iter().find_map(|route| {
            if route.path_parts(kind) != parts.len() {
                return None;
            }
            let mut vars = PathVars::new();
            for (i, seg) in route.segments.iter().enumerate() {
                if parts[i * 2] != seg.collection {
                    return None;
                }
                if let Some(value) = parts.get(i * 2 + 1) {
                    vars.insert(seg.name.clone(), *value);
                }
            }
            Some((route.view_name(kind), vars))
        })
    }
}
