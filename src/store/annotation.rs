//! Per-item status and annotation records.
//!
//! Epistemic foundation:
//! - K_i: Status is a closed sum type; no open-ended subclassing
//! - K_i: A human label is definitive and never goes stale
//! - B_i: Verdicts age - staleness counts labels applied since judging

use crate::models::Label;
use serde::de::Error as _;
use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize};

/// How fresh an item's judge verdict is relative to the example pool.
///
/// Serialized as a `[tag, fields]` pair, e.g. `["Outdated", {"value": 3}]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    /// Never scored; no verdict exists
    Unvisited,
    /// Verdict is consistent with the latest example pool
    Classified,
    /// Verdict predates the last `k` human labels
    Outdated(u32),
}

impl ItemStatus {
    /// Number of human labels applied since this verdict was computed.
    ///
    /// `None` for `Unvisited`: an item without a verdict has no staleness.
    pub fn staleness(self) -> Option<u32> {
        match self {
            ItemStatus::Unvisited => None,
            ItemStatus::Classified => Some(0),
            ItemStatus::Outdated(k) => Some(k),
        }
    }

    /// One-character progress symbol.
    pub fn symbol(self) -> char {
        match self {
            ItemStatus::Unvisited => '-',
            ItemStatus::Classified => '0',
            ItemStatus::Outdated(k) if k < 10 => {
                char::from_digit(k, 10).unwrap_or('+')
            }
            ItemStatus::Outdated(_) => '+',
        }
    }
}

#[derive(Serialize, Deserialize)]
struct OutdatedFields {
    value: u32,
}

#[derive(Serialize, Deserialize, Default)]
struct NoFields {}

impl Serialize for ItemStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(2)?;
        match self {
            ItemStatus::Unvisited => {
                tup.serialize_element("Unvisited")?;
                tup.serialize_element(&NoFields {})?;
            }
            ItemStatus::Classified => {
                tup.serialize_element("Classified")?;
                tup.serialize_element(&NoFields {})?;
            }
            ItemStatus::Outdated(k) => {
                tup.serialize_element("Outdated")?;
                tup.serialize_element(&OutdatedFields { value: *k })?;
            }
        }
        tup.end()
    }
}

impl<'de> Deserialize<'de> for ItemStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (tag, fields): (String, serde_json::Value) = Deserialize::deserialize(deserializer)?;
        match tag.as_str() {
            "Unvisited" => Ok(ItemStatus::Unvisited),
            "Classified" => Ok(ItemStatus::Classified),
            "Outdated" => {
                let fields: OutdatedFields =
                    serde_json::from_value(fields).map_err(D::Error::custom)?;
                Ok(ItemStatus::Outdated(fields.value))
            }
            other => Err(D::Error::custom(format!("unknown ItemStatus tag: {other}"))),
        }
    }
}

/// Per-item annotation record.
///
/// Invariants (violations are programming errors, asserted on write):
/// - `Unvisited` ⇒ `gpt_verdict` absent
/// - `human_label_no_or_yes` present ⇒ `Classified` with the verdict
///   reinterpreted as 0.0/1.0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAnnotation {
    /// Probability of "Yes" from the arbiter, in [0, 1]
    pub gpt_verdict: Option<f64>,

    /// Freshness of the verdict
    pub status: ItemStatus,

    /// Definitive human decision, if any
    pub human_label_no_or_yes: Option<Label>,
}

impl ItemAnnotation {
    /// The default record for an item never seen before.
    pub fn unvisited() -> Self {
        Self {
            gpt_verdict: None,
            status: ItemStatus::Unvisited,
            human_label_no_or_yes: None,
        }
    }

    /// A record freshly judged by the arbiter.
    pub fn judged(verdict: f64) -> Self {
        Self {
            gpt_verdict: Some(verdict),
            status: ItemStatus::Classified,
            human_label_no_or_yes: None,
        }
    }

    /// A record decided by a human. Always `Classified`, staleness zero.
    pub fn human(label: Label) -> Self {
        Self {
            gpt_verdict: Some(label.as_probability()),
            status: ItemStatus::Classified,
            human_label_no_or_yes: Some(label),
        }
    }

    /// Assert the structural invariants. Fails fast on violation.
    pub fn assert_valid(&self) {
        if self.status == ItemStatus::Unvisited {
            assert!(
                self.gpt_verdict.is_none(),
                "Unvisited item carries a verdict"
            );
            assert!(
                self.human_label_no_or_yes.is_none(),
                "Unvisited item carries a human label"
            );
        }
        if let Some(p) = self.gpt_verdict {
            assert!((0.0..=1.0).contains(&p), "verdict {p} outside [0, 1]");
        }
    }

    /// A human-labeled record rewritten into its canonical form: the label
    /// becomes the verdict and the status snaps back to `Classified`.
    /// Identity for records without a human label.
    pub fn normalized(&self) -> Self {
        match self.human_label_no_or_yes {
            Some(label) => Self::human(label),
            None => self.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_format_is_tag_plus_fields() {
        assert_eq!(
            serde_json::to_string(&ItemStatus::Unvisited).unwrap(),
            r#"["Unvisited",{}]"#
        );
        assert_eq!(
            serde_json::to_string(&ItemStatus::Outdated(3)).unwrap(),
            r#"["Outdated",{"value":3}]"#
        );

        let status: ItemStatus = serde_json::from_str(r#"["Classified",{}]"#).unwrap();
        assert_eq!(status, ItemStatus::Classified);
        let status: ItemStatus = serde_json::from_str(r#"["Outdated",{"value":7}]"#).unwrap();
        assert_eq!(status, ItemStatus::Outdated(7));
        assert!(serde_json::from_str::<ItemStatus>(r#"["Bogus",{}]"#).is_err());
    }

    #[test]
    fn staleness_by_status() {
        assert_eq!(ItemStatus::Unvisited.staleness(), None);
        assert_eq!(ItemStatus::Classified.staleness(), Some(0));
        assert_eq!(ItemStatus::Outdated(4).staleness(), Some(4));
    }

    #[test]
    fn symbols() {
        assert_eq!(ItemStatus::Unvisited.symbol(), '-');
        assert_eq!(ItemStatus::Classified.symbol(), '0');
        assert_eq!(ItemStatus::Outdated(9).symbol(), '9');
        assert_eq!(ItemStatus::Outdated(10).symbol(), '+');
    }

    #[test]
    fn normalization_rewrites_human_labels() {
        let stale_human = ItemAnnotation {
            gpt_verdict: Some(0.3),
            status: ItemStatus::Outdated(2),
            human_label_no_or_yes: Some(Label::Yes),
        };
        let normalized = stale_human.normalized();
        assert_eq!(normalized, ItemAnnotation::human(Label::Yes));
        assert_eq!(normalized.gpt_verdict, Some(1.0));

        let judged = ItemAnnotation::judged(0.42);
        assert_eq!(judged.normalized(), judged);
    }

    #[test]
    #[should_panic(expected = "Unvisited item carries a verdict")]
    fn unvisited_with_verdict_fails_fast() {
        let bad = ItemAnnotation {
            gpt_verdict: Some(0.5),
            status: ItemStatus::Unvisited,
            human_label_no_or_yes: None,
        };
        bad.assert_valid();
    }
}
