//! Active selection of the item most worth a human look.
//!
//! Epistemic foundation:
//! - K_i: Binary entropy peaks where the arbiter is least sure
//! - K_i: A verdict loses utility geometrically with staleness
//! - B_i: There may be nothing worth reviewing → NothingReady

use crate::models::ItemCatalog;
use crate::store::{ItemAnnotation, ItemStatus, StoreSession};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Binary entropy in bits, defined as 0 at p ∈ {0, 1}.
pub fn binary_entropy(p: f64) -> f64 {
    if p <= 0.0 || p >= 1.0 {
        return 0.0;
    }
    -p * p.log2() - (1.0 - p) * (1.0 - p).log2()
}

/// Outcome of one selection scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// Best candidate for human review
    Picked(String),
    /// No item has positive utility; nothing to review right now
    NothingReady,
    /// Another scan is already in progress
    Busy,
}

/// Scores every item and picks the best candidate for human review.
pub struct ActiveSelector {
    /// Data diversity hyperparameter, > 1. Its inverse is the probability
    /// that two independently drawn items are significantly related; larger
    /// Lambda discounts stale verdicts more aggressively.
    lambda: f64,
    /// Test-and-set gate: at most one scan at a time
    scan_in_progress: AtomicBool,
}

impl ActiveSelector {
    pub fn new(lambda: f64) -> Self {
        assert!(lambda > 1.0, "Lambda must be > 1, got {lambda}");
        Self {
            lambda,
            scan_in_progress: AtomicBool::new(false),
        }
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Utility of presenting this item to the human.
    ///
    /// Human-labeled items need no more review and unvisited items have no
    /// judge opinion to second-guess; both score -1. Everything else scores
    /// `H2(p) · (1 − 1/Lambda)^k` where k is the staleness.
    pub fn utility(&self, annotation: &ItemAnnotation) -> f64 {
        if annotation.human_label_no_or_yes.is_some() {
            return -1.0;
        }
        let Some(k) = annotation.status.staleness() else {
            return -1.0; // Unvisited
        };
        let p = annotation
            .gpt_verdict
            .expect("classified item carries no verdict");
        binary_entropy(p) * (1.0 - 1.0 / self.lambda).powi(k as i32)
    }

    /// Scan all items and pick the argmax-utility candidate.
    ///
    /// A stable max scan: ties resolve to the earliest item in catalog
    /// order. A winner with utility ≤ 0 means nothing is worth presenting.
    pub fn select_next(&self, catalog: &ItemCatalog, store: &StoreSession) -> SelectOutcome {
        if self.scan_in_progress.swap(true, Ordering::Acquire) {
            return SelectOutcome::Busy;
        }

        let mut best: Option<(&str, f64)> = None;
        for id in catalog.ids() {
            let utility = self.utility(&store.get(id));
            if best.map_or(true, |(_, best_utility)| utility > best_utility) {
                best = Some((id, utility));
            }
        }

        let outcome = match best {
            Some((id, utility)) if utility > 0.0 => {
                debug!(id = id, utility = utility, "Selected item for review");
                SelectOutcome::Picked(id.to_string())
            }
            _ => SelectOutcome::NothingReady,
        };

        self.scan_in_progress.store(false, Ordering::Release);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Item, Label};
    use crate::store::AnnotationFile;
    use tempfile::TempDir;

    fn catalog(ids: &[&str]) -> ItemCatalog {
        ItemCatalog::new(
            ids.iter()
                .map(|id| Item {
                    id: id.to_string(),
                    text: id.to_string(),
                })
                .collect(),
        )
        .unwrap()
    }

    fn open_store(dir: &TempDir) -> StoreSession {
        AnnotationFile::new(dir.path().join("annotations.json"))
            .open()
            .unwrap()
    }

    #[test]
    fn entropy_is_zero_at_extremes_and_one_at_half() {
        assert_eq!(binary_entropy(0.0), 0.0);
        assert_eq!(binary_entropy(1.0), 0.0);
        assert!((binary_entropy(0.5) - 1.0).abs() < 1e-12);
    }

    // Entropy symmetry about 0.5.
    #[test]
    fn utility_is_symmetric_in_the_verdict() {
        let selector = ActiveSelector::new(2.0);
        for p in [0.1, 0.25, 0.37, 0.49] {
            let a = selector.utility(&ItemAnnotation::judged(p));
            let b = selector.utility(&ItemAnnotation::judged(1.0 - p));
            assert!((a - b).abs() < 1e-12, "asymmetric at p={p}");
        }
    }

    // Strictly decreasing in staleness for 0 < p < 1.
    #[test]
    fn utility_decays_strictly_with_staleness() {
        let selector = ActiveSelector::new(3.0);
        let mut previous = f64::INFINITY;
        for k in 0..6 {
            let mut annotation = ItemAnnotation::judged(0.7);
            annotation.status = if k == 0 {
                ItemStatus::Classified
            } else {
                ItemStatus::Outdated(k)
            };
            let utility = selector.utility(&annotation);
            assert!(utility < previous, "not decreasing at k={k}");
            previous = utility;
        }
    }

    // Human-labeled and unvisited items are never candidates.
    #[test]
    fn human_labeled_and_unvisited_score_negative() {
        let selector = ActiveSelector::new(2.0);
        assert_eq!(selector.utility(&ItemAnnotation::unvisited()), -1.0);
        assert_eq!(selector.utility(&ItemAnnotation::human(Label::Yes)), -1.0);

        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let catalog = catalog(&["labeled", "judged"]);
        store.label_one("labeled", Label::No);
        store.set("judged", ItemAnnotation::judged(0.8));
        assert_eq!(
            selector.select_next(&catalog, &store),
            SelectOutcome::Picked("judged".to_string())
        );
    }

    #[test]
    fn ties_resolve_to_earliest_item() {
        let selector = ActiveSelector::new(2.0);
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let catalog = catalog(&["a", "b", "c"]);
        store.set("a", ItemAnnotation::judged(0.5));
        store.set("b", ItemAnnotation::judged(0.5));
        store.set("c", ItemAnnotation::judged(0.9));
        assert_eq!(
            selector.select_next(&catalog, &store),
            SelectOutcome::Picked("a".to_string())
        );
    }

    #[test]
    fn reports_nothing_ready_when_no_positive_utility() {
        let selector = ActiveSelector::new(2.0);
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let catalog = catalog(&["a", "b"]);
        // "a" unvisited; "b" judged with a fully confident verdict.
        store.set("b", ItemAnnotation::judged(1.0));
        assert_eq!(
            selector.select_next(&catalog, &store),
            SelectOutcome::NothingReady
        );
    }
}
