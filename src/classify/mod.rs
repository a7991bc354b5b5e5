//! Classification table.
//!
//! Decides which entities are relevant (any tag key among the configured
//! keys), which are filter-matched (relevant and passing the thematic
//! filter) and which category an emitted record falls into. An empty table
//! keeps everything.

mod rules;

pub use rules::Category;

use crate::config::ClassificationConfig;
use crate::dsl::{FilterTree, evaluate_filter, parse_filter};
use crate::model::TagMap;
use anyhow::{Result, anyhow};
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct Classification {
    filter: Option<FilterTree>,
    /// `None` means every entity is relevant.
    keys: Option<BTreeSet<String>>,
    categories: Vec<Category>,
    keep_unnamed: bool,
}

impl Classification {
    /// A table that treats every entity as wanted.
    pub fn keep_everything() -> Self {
        Self {
            filter: None,
            keys: None,
            categories: Vec::new(),
            keep_unnamed: true,
        }
    }

    /// Compile every expression of the table. Fails on the first bad one.
    pub fn compile(config: &ClassificationConfig) -> Result<Self> {
        let filter = match config.filter.as_deref() {
            Some(source) => Some(parse_filter(source).map_err(|e| {
                anyhow!("Classification: Error parsing filter '{}': {}", source, e)
            })?),
            None => None,
        };

        let categories = config
            .categories
            .iter()
            .enumerate()
            .map(|(i, category)| Category::compile(i, category))
            .collect::<Result<Vec<_>>>()?;

        let mut keys: BTreeSet<String> = config.keys.iter().cloned().collect();
        for category in &categories {
            keys.extend(category.filter.identifiers());
        }

        Ok(Self {
            filter,
            keys: if keys.is_empty() { None } else { Some(keys) },
            categories,
            keep_unnamed: config.keep_unnamed,
        })
    }

    /// Replace the thematic filter.
    pub fn with_filter(mut self, filter: FilterTree) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Relevant tag keys, or `None` in keep-everything mode.
    pub fn keys(&self) -> Option<&BTreeSet<String>> {
        self.keys.as_ref()
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    pub fn is_relevant(&self, tags: &TagMap) -> bool {
        match &self.keys {
            None => true,
            Some(keys) => tags.keys().any(|key| keys.contains(key)),
        }
    }

    /// Relevant and accepted by the thematic filter.
    pub fn matches(&self, tags: &TagMap) -> bool {
        self.is_relevant(tags)
            && self
                .filter
                .as_ref()
                .is_none_or(|filter| evaluate_filter(filter, tags))
    }

    pub fn categorize(&self, tags: &TagMap) -> Option<&str> {
        rules::first_match(&self.categories, tags)
    }

    pub fn admits_name(&self, tags: &TagMap) -> bool {
        self.keep_unnamed || tags.contains_key("name")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CategoryConfig;

    fn tags(pairs: &[(&str, &str)]) -> TagMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn table() -> Classification {
        let config = ClassificationConfig {
            filter: Some("access <> 'private'".into()),
            keep_unnamed: false,
            keys: vec!["tourism".into()],
            categories: vec![CategoryConfig {
                name: "FOOD".into(),
                match_expr: "amenity = 'restaurant' OR cuisine LIKE '%'".into(),
            }],
        };
        Classification::compile(&config).unwrap()
    }

    #[test]
    fn keys_include_category_identifiers() {
        let table = table();
        let keys: Vec<&str> = table.keys().unwrap().iter().map(String::as_str).collect();
        assert_eq!(keys, vec!["amenity", "cuisine", "tourism"]);
        assert_eq!(table.category_count(), 1);
    }

    #[test]
    fn relevance_requires_a_known_key() {
        let table = table();
        assert!(table.is_relevant(&tags(&[("tourism", "hotel")])));
        assert!(!table.is_relevant(&tags(&[("highway", "primary")])));
        assert!(!table.is_relevant(&TagMap::new()));
    }

    #[test]
    fn thematic_filter_narrows_matches() {
        let table = table();
        assert!(table.matches(&tags(&[("amenity", "restaurant")])));
        assert!(!table.matches(&tags(&[("amenity", "restaurant"), ("access", "private")])));
        assert!(!table.matches(&tags(&[("highway", "primary")])));
    }

    #[test]
    fn categorize_and_naming() {
        let table = table();
        let named = tags(&[("amenity", "restaurant"), ("name", "Chez Nous")]);
        assert_eq!(table.categorize(&named), Some("FOOD"));
        assert_eq!(table.categorize(&tags(&[("tourism", "hotel")])), None);
        assert!(table.admits_name(&named));
        assert!(!table.admits_name(&tags(&[("amenity", "restaurant")])));
    }

    #[test]
    fn empty_table_keeps_everything() {
        let table = Classification::compile(&ClassificationConfig::default()).unwrap();
        assert!(table.keys().is_none());
        assert!(table.matches(&TagMap::new()));
        assert!(table.admits_name(&TagMap::new()));

        let table = Classification::keep_everything();
        assert!(table.matches(&tags(&[("anything", "at all")])));
    }

    #[test]
    fn bad_filter_fails_compilation() {
        let config = ClassificationConfig {
            filter: Some("name = 'x' AND".into()),
            ..ClassificationConfig::default()
        };
        let err = Classification::compile(&config).unwrap_err();
        assert!(err.to_string().starts_with("Classification: Error parsing filter"));
    }

    #[test]
    fn override_filter() {
        let filter = parse_filter("name LIKE 'A%'").unwrap();
        let table = Classification::keep_everything().with_filter(filter);
        assert!(table.matches(&tags(&[("name", "Alpha")])));
        assert!(!table.matches(&tags(&[("name", "Beta")])));
    }
}
