//! Background judging loop: a throttled, cancellable cursor walker.
//!
//! Epistemic foundation:
//! - K_i: One cursor, one in-flight call; Idle → Judging(id) → Idle
//! - K_i: A cancelled call never writes a partial annotation
//! - B_i: The walk terminates when every item is Classified
//! - I^R: Throttle QPS is mutable at any time, effective on the next call

use crate::client::Arbiter;
use crate::models::{ItemCatalog, Result};
use crate::store::{ItemAnnotation, ItemStatus, StoreSession};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Multiplicative throttle step: one nudge scales QPS by e^±0.5.
const THROTTLE_STEP: f64 = 0.5;

/// Rate floor for arbiter calls.
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    active: bool,
    qps: f64,
}

impl Throttle {
    pub fn new(active: bool, qps: f64) -> Self {
        assert!(qps > 0.0, "throttle QPS must be positive");
        Self { active, qps }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn qps(&self) -> f64 {
        self.qps
    }

    /// Minimum spacing between call starts, if throttling is active.
    pub fn interval(&self) -> Option<Duration> {
        self.active.then(|| Duration::from_secs_f64(1.0 / self.qps))
    }

    pub fn toggle(&mut self) {
        self.active = !self.active;
    }

    /// Scale QPS by e^(delta/2). Takes effect on the next scheduled call.
    pub fn nudge(&mut self, delta: f64) {
        self.qps *= (delta * THROTTLE_STEP).exp();
    }

    pub fn speed_up(&mut self) {
        self.nudge(1.0);
    }

    pub fn slow_down(&mut self) {
        self.nudge(-1.0);
    }
}

/// Outcome of one forward scan from the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ScanOutcome {
    /// First non-Classified item at or after the cursor
    Found(String),
    /// The scan wrapped without a candidate; first time this happened
    AllFinished,
    /// Still nothing to judge; completion was already notified
    AlreadyFinished,
}

/// Outcome of one judging step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// One item was judged and persisted
    Judged { id: String, verdict: f64 },
    /// Every item is Classified; notified exactly once
    AllFinished,
    /// Nothing to judge and completion was already notified
    AlreadyFinished,
    /// The pause flag is set; loop is halted in Idle
    Paused,
    /// Cancelled mid-call; cursor and store are unchanged
    Cancelled,
}

impl StepOutcome {
    /// True when the loop should not attempt another transition.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepOutcome::Judged { .. })
    }
}

/// Walks all items in round-robin order, judging each unclassified one.
pub struct JudgingLoop {
    cursor: usize,
    last_call: Option<Instant>,
    throttle: Throttle,
    paused: bool,
    finished_notified: bool,
}

impl JudgingLoop {
    pub fn new(throttle: Throttle) -> Self {
        Self {
            cursor: 0,
            last_call: None,
            throttle,
            paused: false,
            finished_notified: false,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    pub fn throttle_mut(&mut self) -> &mut Throttle {
        &mut self.throttle
    }

    /// Scan forward from the cursor (wrapping) for the first item that is
    /// not `Classified`. Human-labeled items met along the way are
    /// normalized in place, consuming no judge call.
    fn scan_next(&mut self, catalog: &ItemCatalog, store: &mut StoreSession) -> ScanOutcome {
        if catalog.is_empty() {
            return self.wrapped_without_candidate();
        }

        let initial_cursor = self.cursor;
        loop {
            let id = catalog.id_at(self.cursor).to_string();
            let annotation = store.get(&id);
            if annotation.human_label_no_or_yes.is_some() {
                store.set(&id, annotation.normalized());
            }
            if store.get(&id).status != ItemStatus::Classified {
                self.finished_notified = false;
                return ScanOutcome::Found(id);
            }
            self.cursor = (self.cursor + 1) % catalog.len();
            if self.cursor == initial_cursor {
                return self.wrapped_without_candidate();
            }
        }
    }

    fn wrapped_without_candidate(&mut self) -> ScanOutcome {
        if self.finished_notified {
            ScanOutcome::AlreadyFinished
        } else {
            self.finished_notified = true;
            info!("All items have been classified");
            ScanOutcome::AllFinished
        }
    }

    /// Attempt one Idle → Judging(id) → Idle transition.
    ///
    /// Suspends for the throttle birthline, then awaits the arbiter. A
    /// judge failure propagates and halts the walk; skipping would break
    /// the cursor's completeness guarantee.
    pub async fn step(
        &mut self,
        catalog: &ItemCatalog,
        store: &mut StoreSession,
        arbiter: &dyn Arbiter,
        model: &str,
        prompt: &str,
        max_tokens: u32,
        cancel: &CancellationToken,
        id: &str,
    ) -> Result<StepOutcome> {
        // Earliest permissible start for this call.
        let birthline = match (self.throttle.interval(), self.last_call) {
            (Some(interval), Some(last)) => Some(last + interval),
            _ => None,
        };
        if let Some(birthline) = birthline {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(StepOutcome::Cancelled),
                _ = tokio::time::sleep_until(birthline) => {}
            }
        }

        self.last_call = Some(Instant::now());
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(id = id, "Judge call cancelled, nothing written");
                Ok(StepOutcome::Cancelled)
            }
            verdict = arbiter.judge(model, prompt, max_tokens) => {
                let verdict = verdict?;
                store.set(id, ItemAnnotation::judged(verdict));
                self.cursor = (self.cursor + 1) % catalog.len();
                debug!(id = id, verdict = verdict, "Item judged");
                Ok(StepOutcome::Judged { id: id.to_string(), verdict })
            }
        }
    }

    /// One full transition attempt: scan, then judge if a candidate exists.
    ///
    /// `render` maps an item id to the prompt put before the arbiter.
    pub async fn advance(
        &mut self,
        catalog: &ItemCatalog,
        store: &mut StoreSession,
        arbiter: &dyn Arbiter,
        model: &str,
        max_tokens: u32,
        cancel: &CancellationToken,
        render: impl FnOnce(&str) -> Result<String>,
    ) -> Result<StepOutcome> {
        if self.paused {
            return Ok(StepOutcome::Paused);
        }
        if cancel.is_cancelled() {
            return Ok(StepOutcome::Cancelled);
        }
        match self.scan_next(catalog, store) {
            ScanOutcome::AllFinished => Ok(StepOutcome::AllFinished),
            ScanOutcome::AlreadyFinished => Ok(StepOutcome::AlreadyFinished),
            ScanOutcome::Found(id) => {
                let prompt = render(&id)?;
                self.step(
                    catalog, store, arbiter, model, &prompt, max_tokens, cancel, &id,
                )
                .await
            }
        }
    }
}
