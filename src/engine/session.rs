//! Review session: the single actor mutating annotations and the pool.
//!
//! Epistemic foundation:
//! - K_i: One session owns the store; no concurrent mutation exists
//! - K_i: A label submitted against a stale pick mutates nothing
//! - B_i: The pool file may be edited externally between appends

use crate::client::{Arbiter, RationaleSink};
use crate::engine::{ActiveSelector, JudgingLoop, SelectOutcome, StepOutcome, Throttle};
use crate::models::{ArbiterConfig, ArbitriumError, Config, ItemCatalog, Label, Result};
use crate::store::{AnnotationFile, ItemStatus, PromptAndExamples, QAPair, StoreSession};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cached interrogation transcript for the current pick.
#[derive(Debug, Clone)]
struct Rationale {
    no: String,
    yes: String,
}

/// Aggregate view of the store for display.
#[derive(Debug, Clone)]
pub struct StatusSummary {
    pub unvisited: usize,
    pub classified: usize,
    pub outdated: usize,
    pub human_labeled: usize,
    /// One symbol per item in catalog order: '-' unvisited, '0'..'9'/'+'
    /// staleness, where human-labeled items read as fresh
    pub symbols: String,
}

impl StatusSummary {
    pub fn total(&self) -> usize {
        self.unvisited + self.classified + self.outdated + self.human_labeled
    }
}

/// Everything one review sitting needs: catalog, annotations, example pool,
/// selector, judging loop, and an arbiter.
pub struct ReviewSession {
    catalog: ItemCatalog,
    store: StoreSession,
    pool: PromptAndExamples,
    arbiter: Box<dyn Arbiter>,
    arbiter_cfg: ArbiterConfig,
    selector: ActiveSelector,
    judging: JudgingLoop,
    current_pick: Option<String>,
    rationale: Option<Rationale>,
}

impl ReviewSession {
    pub fn new(
        catalog: ItemCatalog,
        store: StoreSession,
        pool: PromptAndExamples,
        arbiter: Box<dyn Arbiter>,
        arbiter_cfg: ArbiterConfig,
        lambda: f64,
        throttle: Throttle,
    ) -> Self {
        Self {
            catalog,
            store,
            pool,
            arbiter,
            arbiter_cfg,
            selector: ActiveSelector::new(lambda),
            judging: JudgingLoop::new(throttle),
            current_pick: None,
            rationale: None,
        }
    }

    /// Open a session from configured paths.
    pub fn open(config: &Config, arbiter: Box<dyn Arbiter>) -> Result<Self> {
        let catalog = ItemCatalog::load(&config.paths.items)?;
        let store = AnnotationFile::new(config.paths.annotations.clone()).open()?;
        let pool = PromptAndExamples::from_file(&config.paths.pool)?;
        info!(
            items = catalog.len(),
            examples = pool.examples.len(),
            "Session opened"
        );
        Ok(Self::new(
            catalog,
            store,
            pool,
            arbiter,
            config.arbiter.clone(),
            config.selection.lambda,
            Throttle::new(config.throttle.active, config.throttle.qps),
        ))
    }

    pub fn catalog(&self) -> &ItemCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &StoreSession {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut StoreSession {
        &mut self.store
    }

    pub fn pool(&self) -> &PromptAndExamples {
        &self.pool
    }

    pub fn judging_mut(&mut self) -> &mut JudgingLoop {
        &mut self.judging
    }

    pub fn current_pick(&self) -> Option<&str> {
        self.current_pick.as_deref()
    }

    pub fn running_cost(&self) -> f64 {
        self.arbiter.running_cost()
    }

    pub fn cost_per_item(&self) -> f64 {
        self.arbiter.cost_per_item()
    }

    /// Utility the selector would assign to this item right now.
    pub fn utility_of(&self, id: &str) -> Result<f64> {
        if !self.catalog.contains(id) {
            return Err(ArbitriumError::ItemNotFound(id.to_string()));
        }
        Ok(self.selector.utility(&self.store.get(id)))
    }

    /// Return the active pick, selecting one if none is held.
    ///
    /// An existing pick stays in place until it is labeled; re-running the
    /// selector would let background judging swap the item under the
    /// reviewer's nose.
    pub fn refresh_pick(&mut self) -> SelectOutcome {
        if let Some(id) = &self.current_pick {
            return SelectOutcome::Picked(id.clone());
        }
        let outcome = self.selector.select_next(&self.catalog, &self.store);
        if let SelectOutcome::Picked(id) = &outcome {
            self.current_pick = Some(id.clone());
            self.rationale = None;
        }
        outcome
    }

    /// The labeling pipeline: record the human verdict, age every other
    /// machine verdict, grow the example pool, and move to the next pick.
    ///
    /// Nothing is mutated unless `id` is the active pick.
    pub fn submit(&mut self, id: &str, label: Label, explanation: Option<String>) -> Result<()> {
        match self.current_pick.as_deref() {
            Some(current) if current == id => {}
            current => {
                return Err(ArbitriumError::StaleSelection {
                    submitted: id.to_string(),
                    current: current.map(str::to_string),
                });
            }
        }
        let question = self.catalog.text(id)?.to_string();

        self.store.label_one(id, label);
        self.pool = self.pool.add_example_syncing_file(QAPair {
            question,
            no_or_yes: label,
            explanation,
        })?;
        info!(id = id, label = ?label, "Verdict recorded");

        self.current_pick = None;
        self.rationale = None;
        self.refresh_pick();
        Ok(())
    }

    /// Run one judging transition. When it produces a fresh verdict and no
    /// pick is held, the selector is consulted so the reviewer always has a
    /// candidate waiting.
    pub async fn step_judging(&mut self, cancel: &CancellationToken) -> Result<StepOutcome> {
        let catalog = &self.catalog;
        let pool = &self.pool;
        let render = |id: &str| -> Result<String> {
            let text = catalog.text(id)?;
            Ok(pool.render(text, false))
        };
        let outcome = self
            .judging
            .advance(
                catalog,
                &mut self.store,
                self.arbiter.as_ref(),
                &self.arbiter_cfg.model,
                self.arbiter_cfg.judge_max_tokens,
                cancel,
                render,
            )
            .await?;
        if matches!(outcome, StepOutcome::Judged { .. }) && self.current_pick.is_none() {
            self.refresh_pick();
        }
        Ok(outcome)
    }

    /// Run the judging loop until it reaches a terminal outcome, reporting
    /// each verdict through `on_judged`.
    pub async fn run_judging(
        &mut self,
        cancel: &CancellationToken,
        mut on_judged: impl FnMut(&str, f64),
    ) -> Result<StepOutcome> {
        loop {
            let outcome = self.step_judging(cancel).await?;
            match &outcome {
                StepOutcome::Judged { id, verdict } => on_judged(id, *verdict),
                _ => return Ok(outcome),
            }
        }
    }

    /// Stream the arbiter's rationale for both hypotheses on the active
    /// pick. Repeat calls replay the cached transcript without spending an
    /// API call.
    pub async fn interrogate_current(&mut self, sink: RationaleSink<'_>) -> Result<()> {
        let Some(id) = self.current_pick.clone() else {
            return Err(ArbitriumError::Internal(
                "no active pick to interrogate".to_string(),
            ));
        };
        if let Some(cached) = self.rationale.clone() {
            sink(Label::No, &cached.no);
            sink(Label::Yes, &cached.yes);
            return Ok(());
        }

        let prompt = self.pool.render(self.catalog.text(&id)?, false);
        let mut no = String::new();
        let mut yes = String::new();
        {
            let mut tee = |label: Label, chunk: &str| {
                match label {
                    Label::No => no.push_str(chunk),
                    Label::Yes => yes.push_str(chunk),
                }
                sink(label, chunk);
            };
            self.arbiter
                .interrogate(
                    &self.arbiter_cfg.model,
                    &prompt,
                    &self.arbiter_cfg.interrogate_question,
                    self.arbiter_cfg.interrogate_max_tokens,
                    &mut tee,
                )
                .await?;
        }
        self.rationale = Some(Rationale { no, yes });
        Ok(())
    }

    /// Summarize every item's annotation in catalog order.
    pub fn status(&self) -> StatusSummary {
        let mut summary = StatusSummary {
            unvisited: 0,
            classified: 0,
            outdated: 0,
            human_labeled: 0,
            symbols: String::with_capacity(self.catalog.len()),
        };
        for id in self.catalog.ids() {
            let annotation = self.store.get(id);
            summary.symbols.push(annotation.status.symbol());
            if annotation.human_label_no_or_yes.is_some() {
                summary.human_labeled += 1;
            } else {
                match annotation.status {
                    ItemStatus::Unvisited => summary.unvisited += 1,
                    ItemStatus::Classified => summary.classified += 1,
                    ItemStatus::Outdated(_) => summary.outdated += 1,
                }
            }
        }
        summary
    }

    /// Flush and close the underlying store.
    pub fn close(self) -> Result<()> {
        self.store.close()
    }
}
