//! Store Knowledge
//!
//! Static facts about the store, grouped by category, that go into the
//! system prompt. Built-in defaults can be replaced by a JSON file mapping
//! category names to text:
//!
//! ```json
//! { "general": "We are a small outdoor gear shop...", "shipping": "..." }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StorefrontError};

/// Section included for every category
pub const GENERAL: &str = "general";

/// Categorised store context
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreKnowledge {
    sections: BTreeMap<String, String>,
}

impl StoreKnowledge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in knowledge for the demo store
    pub fn defaults() -> Self {
        Self::new()
            .with_section(
                GENERAL,
                "Trailhead Outfitters sells running, hiking and rain gear online. Customer support is available by email at support@example-store.com, Monday to Friday, 9am-5pm ET.",
            )
            .with_section(
                "orders",
                "Customers can find their order number in the confirmation email. Orders can be changed or cancelled until they ship.",
            )
            .with_section(
                "products",
                "Shoe sizes are EU sizes. Most items come in several colors; availability is shown per product.",
            )
            .with_section(
                "sizing",
                "If a customer is between sizes, recommend the larger size for hiking boots and the true size for running shoes.",
            )
    }

    /// Load sections from a JSON file
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let knowledge = Self::from_json(&raw)?;

        tracing::info!(
            path = %path.display(),
            sections = knowledge.sections.len(),
            tokens = knowledge.estimated_tokens(),
            "Loaded store knowledge"
        );
        Ok(knowledge)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let sections: BTreeMap<String, String> = serde_json::from_str(raw)?;

        if let Some(name) = sections.keys().find(|k| k.trim().is_empty()) {
            return Err(StorefrontError::Knowledge(format!("invalid section name '{name}'")));
        }

        let sections = sections
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
            .filter(|(_, v)| !v.is_empty())
            .collect();

        Ok(Self { sections })
    }

    pub fn with_section(mut self, category: impl Into<String>, text: impl Into<String>) -> Self {
        self.sections.insert(category.into().to_lowercase(), text.into());
        self
    }

    /// Whether any knowledge is available
    pub fn is_loaded(&self) -> bool {
        !self.sections.is_empty()
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Context text for a question category.
    ///
    /// A known category yields the general section plus that category's
    /// section. No category, or one without a section, yields everything.
    pub fn context_for(&self, category: Option<&str>) -> String {
        let wanted = category.map(|c| c.trim().to_lowercase());

        let selected: Vec<(&String, &String)> = match wanted.as_deref() {
            Some(c) if c != GENERAL && self.sections.contains_key(c) => self
                .sections
                .iter()
                .filter(|(k, _)| k.as_str() == GENERAL || k.as_str() == c)
                .collect(),
            other => {
                if let Some(c) = other {
                    tracing::debug!(category = %c, "No dedicated knowledge section; using all");
                }
                self.sections.iter().collect()
            }
        };

        selected
            .into_iter()
            .map(|(k, v)| format!("### {}\n{v}", title_case(k)))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Rough size of the full context in tokens (~4 chars per token)
    pub fn estimated_tokens(&self) -> u32 {
        let chars: usize = self.sections.iter().map(|(k, v)| k.len() + v.len()).sum();
        u32::try_from(chars / 4).unwrap_or(u32::MAX)
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_loaded() {
        let knowledge = StoreKnowledge::defaults();
        assert!(knowledge.is_loaded());
        assert!(knowledge.estimated_tokens() > 0);
        assert!(!StoreKnowledge::new().is_loaded());
    }

    #[test]
    fn test_context_for_known_category() {
        let knowledge = StoreKnowledge::defaults();

        let context = knowledge.context_for(Some("Sizing"));

        assert!(context.contains("### General"));
        assert!(context.contains("### Sizing"));
        assert!(!context.contains("### Orders"));
    }

    #[test]
    fn test_context_for_unknown_or_missing_category() {
        let knowledge = StoreKnowledge::defaults();
        let all = knowledge.context_for(None);

        assert_eq!(knowledge.context_for(Some("gift-cards")), all);
        assert!(all.contains("### Orders"));
        assert!(all.contains("### Products"));
    }

    #[test]
    fn test_from_json() {
        let knowledge =
            StoreKnowledge::from_json(r#"{"General": " Small shop. ", "returns": "30 days.", "empty": ""}"#).unwrap();

        let categories: Vec<_> = knowledge.categories().collect();
        assert_eq!(categories, vec!["general", "returns"]);
        assert!(knowledge.context_for(Some("returns")).contains("Small shop."));

        assert!(StoreKnowledge::from_json("[1, 2]").is_err());
        assert!(StoreKnowledge::from_json(r#"{" ": "x"}"#).is_err());
    }
}
