//! Link generation: bind every URL variable of a view by walking from an object up its ancestor chain.

use crate::error::{AppError, ConfigError};
use crate::resource::ParentLookup;
use crate::routing::{parse_view_name, FlattenedRoute, PathVars, RouteTable, ViewKind};
use crate::service::RequestContext;
use crate::case::split_lookup;
use crate::config::Settings;
use crate::store::{key_to_string, related, Record, Related, Store};

/// What a link points at: one object (detail views) or the collection an object owns (list views).
#[derive(Clone, Copy, Debug)]
pub enum LinkTarget<'a> {
    Object(&'a Record),
    Collection { owner: &'a Record },
}

impl<'a> LinkTarget<'a> {
    fn record(&self) -> &'a Record {
        match self {
            LinkTarget::Object(r) => r,
            LinkTarget::Collection { owner } => owner,
        }
    }
}

pub struct UrlGenerator<'a> {
    routes: &'a RouteTable,
    store: &'a dyn Store,
    settings: &'a Settings,
}

impl<'a> UrlGenerator<'a> {
    pub fn new(routes: &'a RouteTable, store: &'a dyn Store, settings: &'a Settings) -> Self {
        UrlGenerator { routes, store, settings }
    }

    /// URL of `view_name` for `target`. None when the object is unsaved or an ancestor is missing.
    pub async fn generate(
        &self,
        view_name: &str,
        target: LinkTarget<'_>,
        ctx: &RequestContext,
    ) -> Result<Option<String>, AppError> {
        let (name, kind) = parse_view_name(view_name)?;
        let route = self.routes.require(name)?;
        let leaf = target.record();
        if leaf.id.is_none() {
            return Ok(None);
        }

        // List URLs are addressed by the parent, so binding starts there.
        let anchor = match (kind, &target) {
            (ViewKind::Detail, LinkTarget::Object(_)) => Some(route),
            (ViewKind::List, LinkTarget::Collection { .. }) => match route.parent() {
                Some(parent) => Some(self.routes.require(&parent.name)?),
                None => None,
            },
            _ => {
                return Err(ConfigError::Validation(format!(
                    "'{}' cannot link to {:?}",
                    view_name, target
                ))
                .into())
            }
        };

        let mut vars = PathVars::new();
        if let Some(anchor) = anchor {
            if anchor.model() != leaf.model {
                return Err(ConfigError::Validation(format!(
                    "'{}' is anchored on {} but got a {} object",
                    view_name,
                    anchor.model(),
                    leaf.model
                ))
                .into());
            }
            if !self.bind_ancestry(anchor, leaf, ctx, &mut vars).await? {
                return Ok(None);
            }
        }

        for var in route.required_vars(kind) {
            if vars.get(var).is_none() {
                let value = ctx.path_vars.get(var).ok_or_else(|| ConfigError::MissingPathVariable {
                    route: view_name.to_string(),
                    variable: var.to_string(),
                })?;
                vars.insert(var, value);
            }
        }

        let path = self.routes.reverse(view_name, &vars)?;
        Ok(Some(self.absolute(&path, ctx)))
    }

    /// Bind the anchor's own id, then each ancestor's, innermost first. False when the chain is broken.
    async fn bind_ancestry(
        &self,
        anchor: &FlattenedRoute,
        leaf: &Record,
        ctx: &RequestContext,
        vars: &mut PathVars,
    ) -> Result<bool, AppError> {
        let Some(id) = &leaf.id else { return Ok(false) };
        vars.insert(anchor.name.clone(), key_to_string(id));

        let mut current = leaf.clone();
        for ancestor in anchor.ancestry.iter().rev() {
            let parent = match &ancestor.lookup {
                ParentLookup::Path(path) => self.follow(&current, path).await?,
                ParentLookup::Resolver(resolver) => Some(resolver.resolve(&current, ctx, self.store).await?),
            };
            let Some(parent) = parent else {
                tracing::warn!(route = %anchor.name, ancestor = %ancestor.name, "cannot link: ancestor relation is empty");
                return Ok(false);
            };
            let Some(parent_id) = &parent.id else { return Ok(false) };
            vars.insert(ancestor.name.clone(), key_to_string(parent_id));
            current = parent;
        }
        Ok(true)
    }

    async fn follow(&self, from: &Record, path: &str) -> Result<Option<Record>, AppError> {
        let mut current = from.clone();
        for hop in split_lookup(path) {
            match related(self.store, &current, hop).await? {
                Related::One(Some(next)) => current = next,
                Related::One(None) => return Ok(None),
                Related::Many(_) => {
                    return Err(ConfigError::ToManyLookup {
                        model: current.model.clone(),
                        field: hop.to_string(),
                    }
                    .into())
                }
            }
        }
        Ok(Some(current))
    }

    /// `path` under the mount prefix; absolute when the request names a host.
    pub fn absolute(&self, path: &str, ctx: &RequestContext) -> String {
        let mut url = match &ctx.host {
            Some(host) => format!("{}://{}{}{}", self.settings.scheme, host, self.settings.mount_path, path),
            None => format!("{}{}", self.settings.mount_path, path),
        };
        if let Some(format) = &ctx.format {
            url.push_str("?format=");
            url.push_str(format);
        }
        url
    }
}

/// Router path of a link produced by `UrlGenerator`: scheme, host, mount and query are removed.
pub fn path_of<'u>(url: &'u str, mount: &str) -> Option<&'u str> {
    let without_host = match url.split_once("://") {
        Some((_, rest)) => &rest[rest.find('/')?..],
        None => url,
    };
    let path = without_host.split(['?', '#']).next().unwrap_or(without_host);
    let path = path.strip_prefix(mount)?;
    path.starts_with('/').then_some(path)
}
