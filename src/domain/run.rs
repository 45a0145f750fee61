//! Run-level state: the mutable batch state, per-line reports, the summary and the
//! terminal decision derived from it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::basket::BasketId;
use super::line_item::Sku;
use super::outcome::ItemFailure;

/// Unique identifier for one submission run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Display only first 8 characters for readability in logs
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl From<Uuid> for RunId {
    fn from(uuid: Uuid) -> Self {
        RunId(uuid)
    }
}

impl std::ops::Deref for RunId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Mutable state of one run. Owned by the run, never shared.
#[derive(Debug, Default)]
pub struct BatchState {
    active_basket_id: Option<BasketId>,
    pub items_added: usize,
    pub discount_attempted: usize,
    pub discount_successes: usize,
    pub discount_conflicts: usize,
}

impl BatchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_basket_id(&self) -> Option<&BasketId> {
        self.active_basket_id.as_ref()
    }

    /// Adopt a basket id reported by the service. There is no way to unset it.
    ///
    /// Returns true if the id differs from the one previously held.
    pub fn adopt_basket(&mut self, basket_id: BasketId) -> bool {
        if self.active_basket_id.as_ref() == Some(&basket_id) {
            return false;
        }
        if let Some(previous) = &self.active_basket_id {
            tracing::warn!(
                previous = %previous,
                current = %basket_id,
                "Basket id changed mid-run"
            );
        }
        self.active_basket_id = Some(basket_id);
        true
    }
}

/// How the add-item step of a line ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AddResult {
    /// Added, after `conflicts_recovered` conflict retries (0 or 1).
    Added { conflicts_recovered: u32 },
    Rejected { failure: ItemFailure },
}

/// How the discount step of a line ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DiscountResult {
    /// Not attempted: the item was not added or carries no discount.
    Skipped,
    Applied,
    /// Rejected with 409. Counted, reported as a warning.
    Conflict,
    Failed { failure: ItemFailure },
}

/// What happened to one line of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineReport {
    /// 0-based index in the submitted list
    pub line: usize,
    pub sku: Sku,
    /// 1-based sequence number sent to the discount endpoint
    pub sequence: u32,
    pub add: AddResult,
    pub discount: DiscountResult,
}

impl LineReport {
    pub fn is_added(&self) -> bool {
        matches!(self.add, AddResult::Added { .. })
    }
}

/// Terminal, aggregate result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub total_items: usize,
    pub items_added: usize,
    pub discount_attempts: usize,
    pub discount_successes: usize,
    pub discount_conflicts: usize,
    pub final_basket_id: Option<BasketId>,
    pub lines: Vec<LineReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub(crate) fn from_state(
        run_id: RunId,
        state: BatchState,
        lines: Vec<LineReport>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id,
            total_items: lines.len(),
            items_added: state.items_added,
            discount_attempts: state.discount_attempted,
            discount_successes: state.discount_successes,
            discount_conflicts: state.discount_conflicts,
            final_basket_id: state.active_basket_id,
            lines,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Number of lines whose add-item step failed.
    pub fn items_rejected(&self) -> usize {
        self.total_items - self.items_added
    }

    /// Every attempted discount ended in conflict, and at least one was attempted.
    pub fn all_discounts_conflicted(&self) -> bool {
        self.discount_attempts > 0 && self.discount_attempts == self.discount_conflicts
    }

    /// Classify the run.
    pub fn decision(&self) -> TerminalDecision {
        if self.all_discounts_conflicted() {
            TerminalDecision::Blocking {
                stale_basket_id: self.final_basket_id.clone(),
            }
        } else if let Some(basket_id) = &self.final_basket_id {
            TerminalDecision::Redirect {
                basket_id: basket_id.clone(),
            }
        } else {
            TerminalDecision::NoOp
        }
    }
}

/// What the caller should do once a run is over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum TerminalDecision {
    /// Open the basket.
    Redirect { basket_id: BasketId },
    /// Every discount conflicted: the remote basket is stale or duplicated and must be
    /// cleared by hand before retrying. No redirect.
    Blocking { stale_basket_id: Option<BasketId> },
    /// No basket was ever established.
    NoOp,
}

impl TerminalDecision {
    /// Basket to open, only for [`TerminalDecision::Redirect`].
    pub fn redirect_target(&self) -> Option<&BasketId> {
        match self {
            TerminalDecision::Redirect { basket_id } => Some(basket_id),
            _ => None,
        }
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, TerminalDecision::Blocking { .. })
    }
}
