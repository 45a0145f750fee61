//! Sequential batch submission into one remote basket.
//!
//! Lines are processed strictly in input order with one call in flight at a time:
//! the basket service enforces a single writer per basket and answers concurrent or
//! duplicate session writes with 409.
//!
//! ```text
//! for each line (sequence = index + 1):
//!     add item ──Success──────────────────────────> discount? ──> next line
//!        │                                             ▲
//!        └──Conflict(id)──> adopt id, retry once ──────┘
//!        └──Conflict(∅) / 2nd Conflict / Failure ──> line rejected, next line
//! ```
//!
//! A run never stops early. Per-line failures are recorded in the [`RunSummary`],
//! and the only run-level abort is a missing identity, detected before any call.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::identity::{ClientProfile, IdentityDefaults, RequestIdentity};
use crate::domain::line_item::LineItem;
use crate::domain::run::{BatchState, RunId, RunSummary, TerminalDecision};
use crate::error::Result;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, ProgressReporter, Severity};

mod steps;

/// How many times an add-item call is resent after a conflict that named the live basket.
pub const CONFLICT_RETRY_LIMIT: u32 = 1;

/// Configuration for a submitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitConfig {
    /// Base URL of the basket service
    pub base_url: String,

    /// Timeout for each individual call in milliseconds
    pub timeout_ms: u64,

    /// Reason code sent with every discount
    pub discount_reason: String,

    /// Manager authorizing the discounts
    pub manager_id: String,

    /// Fallbacks for store, tenant and operating company
    pub identity_defaults: IdentityDefaults,

    /// Fixed client identification headers
    pub client_profile: ClientProfile,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            base_url: "https://dc.dps.kd.kfplc.com".to_string(),
            timeout_ms: 30_000,
            discount_reason: "333".to_string(),
            manager_id: String::new(),
            identity_defaults: IdentityDefaults::default(),
            client_profile: ClientProfile::default(),
        }
    }
}

impl SubmitConfig {
    /// Load a config from a JSON file. Missing keys take their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Submits batches of line items, one run at a time.
///
/// The submitter itself holds no run state: each call to
/// [`submit_batch`](BatchSubmitter::submit_batch) owns a fresh [`BatchState`].
/// Callers must not overlap runs against the same session.
pub struct BatchSubmitter<H, P>
where
    H: HttpClient,
    P: ProgressReporter,
{
    http_client: H,
    progress: P,
    config: SubmitConfig,
}

impl<H, P> BatchSubmitter<H, P>
where
    H: HttpClient,
    P: ProgressReporter,
{
    pub fn new(http_client: H, progress: P, config: SubmitConfig) -> Self {
        Self {
            http_client,
            progress,
            config,
        }
    }

    pub fn config(&self) -> &SubmitConfig {
        &self.config
    }

    /// Submit every line item into one basket and classify the run.
    ///
    /// # Errors
    /// Returns [`crate::CaddieError::IdentityMissing`] before any call is made if the
    /// device or workstation id is absent. Nothing else fails the run: per-line
    /// failures are reported and recorded in the summary.
    #[tracing::instrument(skip_all, fields(run_id = tracing::field::Empty, items = items.len()))]
    pub async fn submit_batch(
        &self,
        items: &[LineItem],
        identity: &RequestIdentity,
    ) -> Result<RunSummary> {
        let identity = identity
            .resolve(&self.config.identity_defaults)
            .inspect_err(|e| {
                self.progress.report(ProgressEvent::new(
                    Severity::Error,
                    format!("{}. Run not started.", e),
                ));
            })?;

        let run_id = RunId::from(uuid::Uuid::new_v4());
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let started_at = Utc::now();

        tracing::info!(items = items.len(), "Starting batch submission");

        if items.is_empty() {
            self.progress
                .report(ProgressEvent::new(Severity::Info, "No line items to submit"));
        }

        if self.config.manager_id.trim().is_empty() && items.iter().any(LineItem::has_discount) {
            tracing::warn!("No manager id configured, discounts will be sent without one");
            self.progress.report(ProgressEvent::new(
                Severity::Warn,
                "No manager id configured: discounts will be sent with an empty managerId.",
            ));
        }

        let mut state = BatchState::new();
        let mut lines = Vec::with_capacity(items.len());

        for (line, item) in items.iter().enumerate() {
            let sequence = sequence_for(line);
            let report = self
                .submit_line(&mut state, &identity, line, sequence, item)
                .await;
            lines.push(report);
        }

        let summary = RunSummary::from_state(run_id, state, lines, started_at);
        self.report_decision(&summary);

        tracing::info!(
            items_added = summary.items_added,
            discount_attempts = summary.discount_attempts,
            discount_conflicts = summary.discount_conflicts,
            basket_id = ?summary.final_basket_id.as_ref().map(|b| b.as_str()),
            "Batch submission finished"
        );

        Ok(summary)
    }

    fn report_decision(&self, summary: &RunSummary) {
        let event = match summary.decision() {
            TerminalDecision::Blocking { stale_basket_id } => {
                let basket = stale_basket_id
                    .map(|id| format!("Basket ...{}", id.short()))
                    .unwrap_or_else(|| "The basket".to_string());
                ProgressEvent::new(
                    Severity::Error,
                    format!(
                        "All {} discount(s) were rejected with 409. {} is in an inconsistent \
                         state: clear it manually before running the batch again.",
                        summary.discount_attempts, basket
                    ),
                )
            }
            TerminalDecision::Redirect { basket_id } => ProgressEvent::new(
                Severity::Success,
                format!(
                    "Done: {}/{} item(s) added, {}/{} discount(s) applied. Basket {}",
                    summary.items_added,
                    summary.total_items,
                    summary.discount_successes,
                    summary.discount_attempts,
                    basket_id
                ),
            ),
            TerminalDecision::NoOp => ProgressEvent::new(
                Severity::Info,
                format!(
                    "Done: no basket was established ({}/{} item(s) added)",
                    summary.items_added, summary.total_items
                ),
            ),
        };
        self.progress.report(event);
    }
}

/// 1-based sequence number of the line at `index`.
///
/// Sequence numbers are never reused within a run, so a batch is capped at
/// `u32::MAX` lines. Past that the number saturates.
fn sequence_for(index: usize) -> u32 {
    debug_assert!(
        index < u32::MAX as usize,
        "batch exceeds u32::MAX lines, sequence numbers would repeat"
    );
    u32::try_from(index + 1).unwrap_or(u32::MAX)
}

/// Run one batch with a throwaway submitter.
///
/// # Errors
/// See [`BatchSubmitter::submit_batch`].
pub async fn submit_batch<H, P>(
    items: &[LineItem],
    identity: &RequestIdentity,
    http_client: H,
    progress: P,
    config: SubmitConfig,
) -> Result<RunSummary>
where
    H: HttpClient,
    P: ProgressReporter,
{
    BatchSubmitter::new(http_client, progress, config)
        .submit_batch(items, identity)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CaddieError;
    use crate::domain::line_item::DiscountKind;
    use crate::http::MockHttpClient;
    use crate::progress::CollectingReporter;

    fn identity() -> RequestIdentity {
        RequestIdentity {
            device_id: Some("DEV-1".to_string()),
            workstation_id: Some("WS-9".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_sequence_is_one_based() {
        assert_eq!(sequence_for(0), 1);
        assert_eq!(sequence_for(41), 42);
        assert_eq!(sequence_for(u32::MAX as usize - 1), u32::MAX);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "sequence numbers would repeat")]
    fn test_sequence_overflow_is_caught() {
        sequence_for(u32::MAX as usize);
    }

    #[test]
    fn test_config_defaults_fill_missing_keys() {
        let config: SubmitConfig =
            serde_json::from_str(r#"{"manager_id":"MGR","identity_defaults":{"store_code":"9"}}"#)
                .unwrap();
        assert_eq!(config.manager_id, "MGR");
        assert_eq!(config.discount_reason, "333");
        assert_eq!(config.identity_defaults.store_code, "9");
        assert_eq!(config.identity_defaults.tenant_id, "CAFR");
        assert_eq!(config.client_profile.app_version, "2.0.0");
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_identity_blocks_before_any_call() {
        let http_client = MockHttpClient::new();
        let progress = CollectingReporter::new();
        let submitter =
            BatchSubmitter::new(http_client.clone(), progress.clone(), SubmitConfig::default());
        let items =
            vec![LineItem::new("3281346610000", 1.0, 5.0, DiscountKind::Amount).unwrap()];
        let identity = RequestIdentity {
            workstation_id: Some("WS-9".to_string()),
            ..Default::default()
        };

        let err = submitter.submit_batch(&items, &identity).await.unwrap_err();

        assert!(matches!(err, CaddieError::IdentityMissing(m) if m == vec!["kits-device-id"]));
        assert_eq!(http_client.call_count(), 0);
        assert_eq!(progress.with_severity(Severity::Error).len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_empty_batch_makes_no_calls() {
        let http_client = MockHttpClient::new();
        let progress = CollectingReporter::new();

        let summary = submit_batch(
            &[],
            &identity(),
            http_client.clone(),
            progress.clone(),
            SubmitConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(summary.total_items, 0);
        assert_eq!(summary.items_added, 0);
        assert_eq!(summary.discount_attempts, 0);
        assert_eq!(summary.discount_conflicts, 0);
        assert_eq!(summary.final_basket_id, None);
        assert_eq!(summary.decision(), TerminalDecision::NoOp);
        assert_eq!(http_client.call_count(), 0);
    }
}
