//! Resource identifier lists parsed from kubectl output.

use crate::error::CollectError;

/// Quote character wrapped around jsonpath output.
const QUOTE: char = '"';

/// Ordered resource identifiers (names, or `name namespace` rows).
///
/// Built by splitting a query's stdout on a separator after trimming the
/// wrapping quote. Elements are kept as-is, empty ones included, so that
/// joining with the same separator gives back the trimmed input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceList {
    items: Vec<String>,
}

impl ResourceList {
    /// Parses kubectl stdout into a list.
    ///
    /// # Arguments
    /// * `output` - Raw stdout of the listing query
    /// * `separator` - Separator between identifiers (`" "` for jsonpath, `"\n"` for columns)
    /// * `resource` - Resource description used in the `NotFound` error
    ///
    /// # Returns
    /// `CollectError::NotFound` when nothing is left after trimming.
    pub fn parse(output: &str, separator: &str, resource: &str) -> Result<Self, CollectError> {
        let trimmed = output.trim_matches(QUOTE);
        if trimmed.is_empty() {
            return Err(CollectError::NotFound {
                resource: resource.to_string(),
            });
        }

        Ok(Self {
            items: trimmed.split(separator).map(str::to_string).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }

    /// Identifiers with surrounding whitespace removed, blanks dropped.
    ///
    /// Useful for newline-separated output that ends with a trailing newline.
    pub fn non_blank(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|s| s.trim()).filter(|s| !s.is_empty())
    }

    pub fn into_vec(self) -> Vec<String> {
        self.items
    }
}

impl IntoIterator for ResourceList {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
