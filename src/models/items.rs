//! Items, labels, and the fixed item catalog.
//!
//! K_i: The item sequence is externally supplied and its order is stable;
//! both the judging cursor and selection tie-breaks depend on that order.

use crate::models::{ArbitriumError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::info;

/// The two answer strings, indexed by label.
pub const NO_OR_YES: [&str; 2] = ["No", "Yes"];

/// A binary human verdict. Serialized as 0 (No) or 1 (Yes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    No,
    Yes,
}

impl Label {
    /// The index into [`NO_OR_YES`].
    pub fn index(self) -> usize {
        match self {
            Label::No => 0,
            Label::Yes => 1,
        }
    }

    /// A human label reinterpreted as a definitive verdict probability.
    pub fn as_probability(self) -> f64 {
        self.index() as f64
    }

    /// The answer token for this label.
    pub fn answer(self) -> &'static str {
        NO_OR_YES[self.index()]
    }
}

impl TryFrom<u8> for Label {
    type Error = ArbitriumError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Label::No),
            1 => Ok(Label::Yes),
            other => Err(ArbitriumError::ParseError(format!(
                "label must be 0 or 1, got {other}"
            ))),
        }
    }
}

impl Serialize for Label {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.index() as u8)
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        Label::try_from(value).map_err(serde::de::Error::custom)
    }
}

/// One item to classify.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    /// Opaque stable identifier
    pub id: String,

    /// The text put before the arbiter (and the human)
    pub text: String,
}

/// Fixed, ordered sequence of all items with id lookup.
#[derive(Debug, Clone)]
pub struct ItemCatalog {
    items: Vec<Item>,
    by_id: HashMap<String, usize>,
}

impl ItemCatalog {
    /// Build a catalog from an ordered item sequence.
    ///
    /// K_i: ids are unique; a duplicate is a data error, not a bug.
    pub fn new(items: Vec<Item>) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            if by_id.insert(item.id.clone(), index).is_some() {
                return Err(ArbitriumError::ParseError(format!(
                    "duplicate item id: {}",
                    item.id
                )));
            }
        }
        Ok(Self { items, by_id })
    }

    /// Load items from a JSONL file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| ArbitriumError::io("opening items file", e))?;
        let reader = BufReader::new(file);
        let mut items = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| ArbitriumError::io("reading items file", e))?;
            if line.trim().is_empty() {
                continue;
            }
            let item: Item = serde_json::from_str(&line)
                .map_err(|e| ArbitriumError::ParseError(format!("Line {}: {}", line_num + 1, e)))?;
            items.push(item);
        }

        info!(count = items.len(), "Loaded items");
        Self::new(items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item id at a cursor position.
    pub fn id_at(&self, index: usize) -> &str {
        &self.items[index].id
    }

    /// All ids in catalog order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.id.as_str())
    }

    /// The classifiee text for an id.
    pub fn text(&self, id: &str) -> Result<&str> {
        self.by_id
            .get(id)
            .map(|&index| self.items[index].text.as_str())
            .ok_or_else(|| ArbitriumError::ItemNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> Item {
        Item {
            id: id.to_string(),
            text: format!("text of {id}"),
        }
    }

    #[test]
    fn catalog_preserves_order_and_lookup() {
        let catalog = ItemCatalog::new(vec![item("a"), item("b"), item("c")]).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.id_at(1), "b");
        assert_eq!(catalog.text("c").unwrap(), "text of c");
        assert!(catalog.text("d").is_err());
    }

    #[test]
    fn catalog_rejects_duplicate_ids() {
        assert!(ItemCatalog::new(vec![item("a"), item("a")]).is_err());
    }

    #[test]
    fn label_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Label::Yes).unwrap(), "1");
        let label: Label = serde_json::from_str("0").unwrap();
        assert_eq!(label, Label::No);
        assert!(serde_json::from_str::<Label>("2").is_err());
    }
}
