//! The two per-line steps: add the item, then apply its discount.

use metrics::counter;
use serde::Serialize;

use super::{BatchSubmitter, CONFLICT_RETRY_LIMIT};
use crate::domain::basket::{
    ADD_ITEM_PATH, AddItemRequest, DiscountRequest, basket_id_from_add_response, discount_path,
};
use crate::domain::identity::ResolvedIdentity;
use crate::domain::line_item::LineItem;
use crate::domain::outcome::{ItemFailure, Outcome};
use crate::domain::run::{AddResult, BatchState, DiscountResult, LineReport};
use crate::http::{ApiRequest, HttpClient};
use crate::progress::{ProgressEvent, ProgressReporter, Severity};

impl<H, P> BatchSubmitter<H, P>
where
    H: HttpClient,
    P: ProgressReporter,
{
    pub(super) async fn submit_line(
        &self,
        state: &mut BatchState,
        identity: &ResolvedIdentity,
        line: usize,
        sequence: u32,
        item: &LineItem,
    ) -> LineReport {
        self.progress.report(ProgressEvent::for_line(
            Severity::Info,
            line,
            format!("Processing item {} ({})...", sequence, item.sku),
        ));

        let add = self.add_item(state, identity, line, sequence, item).await;

        let discount = match add {
            AddResult::Added { .. } if item.has_discount() => {
                self.apply_discount(state, identity, line, sequence, item)
                    .await
            }
            _ => DiscountResult::Skipped,
        };

        LineReport {
            line,
            sku: item.sku.clone(),
            sequence,
            add,
            discount,
        }
    }

    /// Add one item, recovering the live basket id from a conflict at most
    /// [`CONFLICT_RETRY_LIMIT`] times.
    async fn add_item(
        &self,
        state: &mut BatchState,
        identity: &ResolvedIdentity,
        line: usize,
        sequence: u32,
        item: &LineItem,
    ) -> AddResult {
        let mut payload = AddItemRequest::new(item, state.active_basket_id().cloned());
        let mut conflicts_recovered = 0;

        loop {
            match self.send(ADD_ITEM_PATH, &payload, identity).await {
                Outcome::Success(body) => {
                    if let Some(basket_id) = basket_id_from_add_response(&body) {
                        state.adopt_basket(basket_id);
                    }
                    state.items_added += 1;
                    counter!("caddie_items_added_total").increment(1);
                    tracing::debug!(line, sku = %item.sku, sequence, conflicts_recovered, "Item added");
                    self.progress.report(ProgressEvent::for_line(
                        Severity::Success,
                        line,
                        "Added to basket.",
                    ));
                    return AddResult::Added {
                        conflicts_recovered,
                    };
                }
                Outcome::Conflict(Some(basket_id)) if conflicts_recovered < CONFLICT_RETRY_LIMIT => {
                    conflicts_recovered += 1;
                    counter!("caddie_conflicts_recovered_total").increment(1);
                    tracing::debug!(line, sku = %item.sku, basket_id = %basket_id, "Recovered basket id from conflict, retrying");
                    self.progress.report(ProgressEvent::for_line(
                        Severity::Warn,
                        line,
                        format!("Found active basket: ...{}", basket_id.short()),
                    ));
                    state.adopt_basket(basket_id.clone());
                    payload.basket_id = Some(basket_id);
                }
                Outcome::Conflict(recovered_basket_id) => {
                    let failure = ItemFailure::Conflict {
                        recovered_basket_id,
                        retried: conflicts_recovered > 0,
                    };
                    return self.reject(line, sequence, item, failure);
                }
                Outcome::Failure { status, message } => {
                    let failure = ItemFailure::from_failure(status, message);
                    return self.reject(line, sequence, item, failure);
                }
            }
        }
    }

    fn reject(
        &self,
        line: usize,
        sequence: u32,
        item: &LineItem,
        failure: ItemFailure,
    ) -> AddResult {
        counter!("caddie_items_rejected_total").increment(1);
        tracing::debug!(line, sku = %item.sku, status = failure.status(), "Item rejected");
        self.progress.report(ProgressEvent::for_line(
            Severity::Error,
            line,
            format!(
                "Item {} ({}) not added: {}",
                sequence,
                item.sku,
                failure.to_error_message()
            ),
        ));
        AddResult::Rejected { failure }
    }

    async fn apply_discount(
        &self,
        state: &mut BatchState,
        identity: &ResolvedIdentity,
        line: usize,
        sequence: u32,
        item: &LineItem,
    ) -> DiscountResult {
        state.discount_attempted += 1;

        let Some(basket_id) = state.active_basket_id().cloned() else {
            return self.discount_failed(line, sequence, item, ItemFailure::NoBasket);
        };

        let body = DiscountRequest::new(
            item,
            sequence,
            &self.config.discount_reason,
            &self.config.manager_id,
        );
        let path = discount_path(&basket_id, &item.sku);

        match self.send(&path, &body, identity).await {
            Outcome::Success(_) => {
                state.discount_successes += 1;
                counter!("caddie_discounts_total", "outcome" => "applied").increment(1);
                self.progress.report(ProgressEvent::for_line(
                    Severity::Success,
                    line,
                    format!("Discount applied (seq {}).", sequence),
                ));
                DiscountResult::Applied
            }
            Outcome::Conflict(_) => {
                state.discount_conflicts += 1;
                counter!("caddie_discounts_total", "outcome" => "conflict").increment(1);
                self.progress.report(ProgressEvent::for_line(
                    Severity::Warn,
                    line,
                    format!(
                        "Discount for item {} ({}) rejected with 409 (seq {}).",
                        sequence, item.sku, sequence
                    ),
                ));
                DiscountResult::Conflict
            }
            Outcome::Failure { status, message } => self.discount_failed(
                line,
                sequence,
                item,
                ItemFailure::from_failure(status, message),
            ),
        }
    }

    fn discount_failed(
        &self,
        line: usize,
        sequence: u32,
        item: &LineItem,
        failure: ItemFailure,
    ) -> DiscountResult {
        counter!("caddie_discounts_total", "outcome" => "failed").increment(1);
        self.progress.report(ProgressEvent::for_line(
            Severity::Error,
            line,
            format!(
                "Discount for item {} ({}) failed: {}",
                sequence,
                item.sku,
                failure.to_error_message()
            ),
        ));
        DiscountResult::Failed { failure }
    }

    async fn send<T: Serialize>(
        &self,
        path: &str,
        body: &T,
        identity: &ResolvedIdentity,
    ) -> Outcome {
        let result = match ApiRequest::post_json(path, body) {
            Ok(request) => self.http_client.execute(&request, identity).await,
            Err(e) => Err(e),
        };
        Outcome::from_response(result)
    }
}
