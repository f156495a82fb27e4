//! Relationship index: for each resource, which resource every relational field links to.

use super::flatten::FlattenedRoute;
use crate::case;
use crate::error::ConfigError;
use crate::resource::ParentLookup;
use crate::schema::ModelSchema;
use std::collections::{BTreeMap, HashMap};

#[derive(Clone, Debug, Default)]
pub struct RelationshipIndex {
    by_resource: HashMap<String, BTreeMap<String, String>>,
}

impl RelationshipIndex {
    /// Register parent/child edges in both directions, then cross-links in both directions.
    /// Later declarations overwrite earlier ones for the same field.
    pub fn build(routes: &[FlattenedRoute], schema: &ModelSchema) -> Result<Self, ConfigError> {
        let mut index = RelationshipIndex::default();
        for route in routes {
            if schema.model(route.model()).is_none() {
                return Err(ConfigError::UnknownModel {
                    resource: route.name.clone(),
                    model: route.model().to_string(),
                });
            }

            if let Some(parent) = route.parent() {
                let lookup = parent.lookup.filter_path();
                let forward = match &parent.lookup {
                    ParentLookup::Path(path) => case::split_lookup(path).last().map(|h| h.to_string()),
                    ParentLookup::Resolver(r) => Some(r.field().to_string()),
                }
                .ok_or_else(|| ConfigError::UnresolvableRelationship {
                    model: route.model().to_string(),
                    path: lookup.to_string(),
                })?;
                index.insert(&route.name, forward, &parent.name);
                let reverse = schema.reverse_name_of(route.model(), lookup)?;
                index.insert(&parent.name, reverse, &route.name);
            }

            for (field, target) in &route.cross_links {
                if !routes.iter().any(|r| &r.name == target) {
                    return Err(ConfigError::UnknownCrossLinkTarget {
                        resource: route.name.clone(),
                        target: target.clone(),
                    });
                }
                index.insert(&route.name, field.clone(), target);
                let reverse = schema.reverse_name_of(route.model(), field)?;
                index.insert(target, reverse, &route.name);
            }
        }
        Ok(index)
    }

    fn insert(&mut self, resource: &str, field: String, target: &str) {
        self.by_resource
            .entry(resource.to_string())
            .or_default()
            .insert(field, target.to_string());
    }

    /// Resource that `field` of `resource` links to.
    pub fn target(&self, resource: &str, field: &str) -> Option<&str> {
        self.by_resource.get(resource)?.get(field).map(String::as_str)
    }

    pub fn relations(&self, resource: &str) -> Option<&BTreeMap<String, String>> {
        self.by_resource.get(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ResourceNode, ResourceView};
    use crate::routing::flatten::{flatten, tests::languages_forest};
    use crate::schema::tests::languages_schema;

    fn entries(index: &RelationshipIndex, resource: &str) -> Vec<(String, String)> {
        index
            .relations(resource)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
    }

    #[test]
    fn nested_edges_point_both_ways() {
        let routes = flatten(&languages_forest()).unwrap();
        let index = RelationshipIndex::build(&routes, &languages_schema()).unwrap();
        assert_eq!(entries(&index, "developer"), pairs(&[("programming_languages", "language")]));
        assert_eq!(
            entries(&index, "language"),
            pairs(&[
                ("author", "developer"),
                ("implementations", "implementation"),
                ("versions", "version"),
                ("website", "website"),
            ])
        );
        assert_eq!(index.target("version", "language"), Some("language"));
    }

    #[test]
    fn cross_links_are_symmetric() {
        let routes = flatten(&languages_forest()).unwrap();
        let index = RelationshipIndex::build(&routes, &languages_schema()).unwrap();
        assert_eq!(
            entries(&index, "website"),
            pairs(&[("language", "language"), ("visits", "website_visit")])
        );
        assert_eq!(entries(&index, "website_visit"), pairs(&[("website", "website")]));
    }

    #[test]
    fn multi_hop_lookups_use_the_last_hop() {
        let forest = vec![ResourceNode::new("developer", "developers", ResourceView::new("Developer")).child(
            ResourceNode::nested(
                "version",
                "versions",
                ResourceView::new("ProgrammingLanguageVersion"),
                ParentLookup::path("language__author"),
            ),
        )];
        let routes = flatten(&forest).unwrap();
        let index = RelationshipIndex::build(&routes, &languages_schema()).unwrap();
        assert_eq!(index.target("version", "author"), Some("developer"));
        assert_eq!(index.target("developer", "programming_languages"), Some("version"));
    }

    #[test]
    fn unknown_cross_link_target_is_rejected() {
        let forest = vec![ResourceNode::new("website", "websites", ResourceView::new("Website"))
            .cross_link("language", "language")];
        let routes = flatten(&forest).unwrap();
        assert_eq!(
            RelationshipIndex::build(&routes, &languages_schema()).unwrap_err(),
            ConfigError::UnknownCrossLinkTarget {
                resource: "website".into(),
                target: "language".into(),
            }
        );
    }

    #[test]
    fn unknown_model_is_rejected() {
        let forest = vec![ResourceNode::new("robot", "robots", ResourceView::new("Robot"))];
        let routes = flatten(&forest).unwrap();
        assert!(matches!(
            RelationshipIndex::build(&routes, &languages_schema()),
            Err(ConfigError::UnknownModel { .. })
        ));
    }
}
