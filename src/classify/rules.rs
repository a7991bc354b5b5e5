//! Category rules: first-match-wins assignment of a category name.

use crate::config::CategoryConfig;
use crate::dsl::{FilterTree, evaluate_filter, parse_filter};
use crate::model::TagMap;
use anyhow::{Result, anyhow};

/// A compiled category rule.
#[derive(Debug, Clone)]
pub struct Category {
    pub name: String,
    pub filter: FilterTree,
}

impl Category {
    pub fn compile(index: usize, config: &CategoryConfig) -> Result<Self> {
        let filter = parse_filter(&config.match_expr).map_err(|e| {
            anyhow!(
                "Classification: Error parsing rule {} (category '{}'): {}",
                index + 1,
                config.name,
                e
            )
        })?;
        Ok(Self {
            name: config.name.clone(),
            filter,
        })
    }
}

/// Name of the first category whose filter matches the tags.
pub fn first_match<'a>(categories: &'a [Category], tags: &TagMap) -> Option<&'a str> {
    categories
        .iter()
        .find(|category| evaluate_filter(&category.filter, tags))
        .map(|category| category.name.as_str())
}
