use caddie::domain::run::{AddResult, DiscountResult, TerminalDecision};
use caddie::domain::{BasketId, ItemFailure};
use caddie::http::MockHttpClient;
use caddie::progress::{CollectingReporter, Severity};
use caddie::submit::{BatchSubmitter, SubmitConfig};
use caddie::{DiscountKind, LineItem, RequestIdentity};

const ADD: &str = "POST /basket/items";
const SKUS: [&str; 4] = [
    "3281346610000",
    "3281346610130",
    "3138522095055",
    "3138522095062",
];

fn discount_key(basket_id: &str, sku: &str) -> String {
    format!("POST /basket/{}/items/{}/discount", basket_id, sku)
}

fn discount_path(basket_id: &str, sku: &str) -> String {
    format!("/basket/{}/items/{}/discount", basket_id, sku)
}

fn identity() -> RequestIdentity {
    RequestIdentity {
        device_id: Some("DEV-1".to_string()),
        workstation_id: Some("WS-9".to_string()),
        session: Some("SESSION=abc".to_string()),
        ..Default::default()
    }
}

fn config() -> SubmitConfig {
    SubmitConfig {
        manager_id: "MANAGER@EXAMPLE".to_string(),
        ..Default::default()
    }
}

fn item(sku: &str, qty: f64, discount: f64) -> LineItem {
    LineItem::new(sku, qty, discount, DiscountKind::Amount).unwrap()
}

fn setup() -> (
    MockHttpClient,
    CollectingReporter,
    BatchSubmitter<MockHttpClient, CollectingReporter>,
) {
    let http_client = MockHttpClient::new();
    let progress = CollectingReporter::new();
    let submitter = BatchSubmitter::new(http_client.clone(), progress.clone(), config());
    (http_client, progress, submitter)
}

#[test_log::test(tokio::test)]
async fn test_single_item_added_and_discounted_redirects() {
    let (http_client, _progress, submitter) = setup();
    http_client.add_status(ADD, 200, r#"{"basket":{"id":"B0"}}"#);
    http_client.add_status(&discount_key("B0", SKUS[0]), 200, "{}");

    let summary = submitter
        .submit_batch(&[item(SKUS[0], 4.0, 150.0)], &identity())
        .await
        .unwrap();

    assert_eq!(summary.items_added, 1);
    assert_eq!(summary.discount_attempts, 1);
    assert_eq!(summary.discount_conflicts, 0);
    assert_eq!(
        summary.decision(),
        TerminalDecision::Redirect {
            basket_id: BasketId::from("B0")
        }
    );

    let discounts = http_client.calls_to(&discount_path("B0", SKUS[0]));
    assert_eq!(discounts.len(), 1);
    let body = discounts[0].json();
    assert_eq!(body["qty"], 4);
    assert_eq!(body["type"], "Amount");
    assert_eq!(body["reason"], "333");
    assert_eq!(body["amount"], 150);
    assert_eq!(body["sequenceNumber"], 1);
    assert_eq!(body["managerId"], "MANAGER@EXAMPLE");
}

#[test_log::test(tokio::test)]
async fn test_conflict_recovers_basket_id_and_retries_once() {
    let (http_client, progress, submitter) = setup();
    http_client.add_status(ADD, 409, r#"{"data":{"basketId":"B1"}}"#);
    http_client.add_status(ADD, 200, "{}");
    http_client.add_status(&discount_key("B1", SKUS[0]), 204, "");

    let summary = submitter
        .submit_batch(&[item(SKUS[0], 4.0, 150.0)], &identity())
        .await
        .unwrap();

    assert_eq!(summary.final_basket_id, Some(BasketId::from("B1")));
    assert_eq!(summary.decision().redirect_target(), Some(&BasketId::from("B1")));
    assert_eq!(
        summary.lines[0].add,
        AddResult::Added {
            conflicts_recovered: 1
        }
    );
    assert_eq!(summary.lines[0].discount, DiscountResult::Applied);

    let adds = http_client.calls_to("/basket/items");
    assert_eq!(adds.len(), 2);
    assert!(adds[0].json().get("basketId").is_none());
    assert_eq!(adds[1].json()["basketId"], "B1");
    assert_eq!(adds[0].json()["item"], adds[1].json()["item"]);

    assert_eq!(progress.with_severity(Severity::Warn).len(), 1);
}

#[test_log::test(tokio::test)]
async fn test_all_discounts_conflicting_blocks_redirect() {
    let (http_client, progress, submitter) = setup();
    http_client.add_status(ADD, 200, r#"{"basket":{"id":"B1"}}"#);
    http_client.add_status(ADD, 200, r#"{"basket":{"id":"B1"}}"#);
    http_client.add_status(&discount_key("B1", SKUS[0]), 409, r#"{"data":{}}"#);
    http_client.add_status(&discount_key("B1", SKUS[1]), 409, r#"{"data":{}}"#);

    let summary = submitter
        .submit_batch(
            &[item(SKUS[0], 1.0, 10.0), item(SKUS[1], 2.0, 20.0)],
            &identity(),
        )
        .await
        .unwrap();

    assert_eq!(summary.items_added, 2);
    assert_eq!(summary.discount_attempts, 2);
    assert_eq!(summary.discount_conflicts, 2);
    assert_eq!(summary.final_basket_id, Some(BasketId::from("B1")));

    let decision = summary.decision();
    assert!(decision.is_blocking());
    assert_eq!(decision.redirect_target(), None);

    let last = progress.events().pop().unwrap();
    assert_eq!(last.severity, Severity::Error);
    assert!(last.message.contains("clear it manually"));
}

#[test_log::test(tokio::test)]
async fn test_empty_batch_is_noop_without_calls() {
    let (http_client, progress, submitter) = setup();

    let summary = submitter.submit_batch(&[], &identity()).await.unwrap();

    assert_eq!(summary.total_items, 0);
    assert_eq!(summary.items_added, 0);
    assert_eq!(summary.discount_attempts, 0);
    assert_eq!(summary.decision(), TerminalDecision::NoOp);
    assert_eq!(http_client.call_count(), 0);
    assert!(!progress.events().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_second_conflict_rejects_item_and_run_continues() {
    let (http_client, progress, submitter) = setup();
    http_client.add_status(ADD, 409, r#"{"data":{"basketId":"B1"}}"#);
    http_client.add_status(ADD, 409, r#"{"data":{"basketId":"B1"}}"#);
    http_client.add_status(ADD, 200, r#"{"basket":{"id":"B1"}}"#);
    http_client.add_status(&discount_key("B1", SKUS[1]), 200, "{}");

    let summary = submitter
        .submit_batch(
            &[item(SKUS[0], 1.0, 10.0), item(SKUS[1], 1.0, 10.0)],
            &identity(),
        )
        .await
        .unwrap();

    assert_eq!(
        summary.lines[0].add,
        AddResult::Rejected {
            failure: ItemFailure::Conflict {
                recovered_basket_id: Some(BasketId::from("B1")),
                retried: true,
            }
        }
    );
    assert_eq!(summary.lines[0].discount, DiscountResult::Skipped);
    assert!(summary.lines[1].is_added());
    assert_eq!(summary.items_added, 1);
    assert_eq!(summary.discount_attempts, 1);

    // Two attempts for the first line, one for the second
    assert_eq!(http_client.calls_to("/basket/items").len(), 3);
    assert!(http_client.calls_to(&discount_path("B1", SKUS[0])).is_empty());

    let errors = progress.with_severity(Severity::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].line, Some(0));
    assert!(errors[0].message.contains(SKUS[0]));
}

#[test_log::test(tokio::test)]
async fn test_conflict_without_basket_id_is_not_retried() {
    let (http_client, _progress, submitter) = setup();
    http_client.add_status(ADD, 409, "Basket already exists");

    let summary = submitter
        .submit_batch(&[item(SKUS[0], 1.0, 10.0)], &identity())
        .await
        .unwrap();

    assert_eq!(http_client.call_count(), 1);
    assert_eq!(
        summary.lines[0].add,
        AddResult::Rejected {
            failure: ItemFailure::Conflict {
                recovered_basket_id: None,
                retried: false,
            }
        }
    );
    assert_eq!(summary.decision(), TerminalDecision::NoOp);
}

#[test_log::test(tokio::test)]
async fn test_sequence_numbers_follow_input_order_under_mixed_outcomes() {
    let (http_client, _progress, submitter) = setup();
    // line 1: added, discounted
    http_client.add_status(ADD, 200, r#"{"basket":{"id":"B1"}}"#);
    http_client.add_status(&discount_key("B1", SKUS[0]), 200, "{}");
    // line 2: rejected by the service
    http_client.add_status(ADD, 500, "internal error");
    // line 3: conflict recovered, discount conflicts
    http_client.add_status(ADD, 409, r#"{"data":{"basketId":"B1"}}"#);
    http_client.add_status(ADD, 200, r#"{"basket":{"id":"B1"}}"#);
    http_client.add_status(&discount_key("B1", SKUS[2]), 409, "{}");
    // line 4: added, no discount
    http_client.add_status(ADD, 200, r#"{"basket":{"id":"B1"}}"#);

    let items = [
        item(SKUS[0], 1.0, 10.0),
        item(SKUS[1], 1.0, 10.0),
        item(SKUS[2], 3.0, 30.0),
        item(SKUS[3], 1.0, 0.0),
    ];
    let summary = submitter.submit_batch(&items, &identity()).await.unwrap();

    let sequences: Vec<u32> = summary.lines.iter().map(|l| l.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);

    let discount_sequences: Vec<serde_json::Value> = http_client
        .get_calls()
        .iter()
        .filter(|c| c.path.ends_with("/discount"))
        .map(|c| c.json()["sequenceNumber"].clone())
        .collect();
    assert_eq!(discount_sequences, vec![serde_json::json!(1), serde_json::json!(3)]);

    assert_eq!(
        summary.lines[1].add,
        AddResult::Rejected {
            failure: ItemFailure::RemoteFailure {
                status: 500,
                body: "internal error".to_string(),
            }
        }
    );
    assert_eq!(summary.lines[2].discount, DiscountResult::Conflict);
    assert_eq!(summary.lines[3].discount, DiscountResult::Skipped);

    assert_eq!(summary.items_added, 3);
    assert_eq!(summary.discount_attempts, 2);
    assert_eq!(summary.discount_successes, 1);
    assert_eq!(summary.discount_conflicts, 1);
    assert_eq!(summary.decision().redirect_target(), Some(&BasketId::from("B1")));

    // One call per line plus the single retry for line 3
    assert_eq!(http_client.calls_to("/basket/items").len(), 5);
}

#[test_log::test(tokio::test)]
async fn test_known_basket_id_is_sent_with_every_later_add() {
    let (http_client, _progress, submitter) = setup();
    http_client.add_status(ADD, 200, r#"{"basket":{"id":"B9"}}"#);
    http_client.add_status(ADD, 500, "");
    http_client.add_status(ADD, 200, "{}");

    submitter
        .submit_batch(
            &[
                item(SKUS[0], 1.0, 0.0),
                item(SKUS[1], 1.0, 0.0),
                item(SKUS[2], 1.0, 0.0),
            ],
            &identity(),
        )
        .await
        .unwrap();

    let adds = http_client.calls_to("/basket/items");
    assert_eq!(adds.len(), 3);
    assert!(adds[0].json().get("basketId").is_none());
    assert_eq!(adds[1].json()["basketId"], "B9");
    assert_eq!(adds[2].json()["basketId"], "B9");
}

#[test_log::test(tokio::test)]
async fn test_discount_failures_do_not_block() {
    let (http_client, progress, submitter) = setup();
    http_client.add_status(ADD, 200, r#"{"basket":{"id":"B1"}}"#);
    http_client.add_status(&discount_key("B1", SKUS[0]), 400, "bad reason");
    http_client.add_status(ADD, 200, r#"{"basket":{"id":"B1"}}"#);
    // No discount response configured for the second line: transport failure

    let summary = submitter
        .submit_batch(
            &[item(SKUS[0], 1.0, 10.0), item(SKUS[1], 1.0, 10.0)],
            &identity(),
        )
        .await
        .unwrap();

    assert_eq!(summary.discount_attempts, 2);
    assert_eq!(summary.discount_conflicts, 0);
    assert_eq!(summary.discount_successes, 0);
    assert!(matches!(
        &summary.lines[0].discount,
        DiscountResult::Failed {
            failure: ItemFailure::RemoteFailure { status: 400, .. }
        }
    ));
    assert!(matches!(
        &summary.lines[1].discount,
        DiscountResult::Failed {
            failure: ItemFailure::TransportFailure { .. }
        }
    ));
    assert_eq!(summary.decision().redirect_target(), Some(&BasketId::from("B1")));
    assert_eq!(progress.with_severity(Severity::Error).len(), 2);
}

#[test_log::test(tokio::test)]
async fn test_discount_without_known_basket_fails_without_call() {
    let (http_client, _progress, submitter) = setup();
    http_client.add_status(ADD, 204, "");

    let summary = submitter
        .submit_batch(&[item(SKUS[0], 1.0, 10.0)], &identity())
        .await
        .unwrap();

    assert_eq!(summary.items_added, 1);
    assert_eq!(summary.discount_attempts, 1);
    assert_eq!(
        summary.lines[0].discount,
        DiscountResult::Failed {
            failure: ItemFailure::NoBasket
        }
    );
    assert_eq!(http_client.call_count(), 1);
    assert_eq!(summary.decision(), TerminalDecision::NoOp);
}

#[test_log::test(tokio::test)]
async fn test_calls_are_sequential_and_carry_identity_headers() {
    let (http_client, _progress, submitter) = setup();
    for _ in 0..3 {
        http_client.add_status(ADD, 200, r#"{"basket":{"id":"B1"}}"#);
    }
    for sku in &SKUS[..3] {
        http_client.add_status(&discount_key("B1", sku), 200, "{}");
    }

    let items: Vec<LineItem> = SKUS[..3].iter().map(|s| item(s, 1.0, 5.0)).collect();
    submitter.submit_batch(&items, &identity()).await.unwrap();

    assert_eq!(http_client.call_count(), 6);
    assert_eq!(http_client.max_in_flight(), 1);

    for call in http_client.get_calls() {
        assert_eq!(call.header("kits-device-id"), Some("DEV-1"));
        assert_eq!(call.header("kits-workstation-id"), Some("WS-9"));
        assert_eq!(call.header("kits-store-code"), Some("1502"));
        assert_eq!(call.header("kits-tenant-id"), Some("CAFR"));
        assert_eq!(call.header("kits-operating-company"), Some("CF01"));
        assert_eq!(call.header("Cookie"), Some("SESSION=abc"));
    }
}

#[test_log::test(tokio::test)]
async fn test_missing_workstation_id_blocks_run() {
    let (http_client, _progress, submitter) = setup();
    let identity = RequestIdentity {
        workstation_id: None,
        ..identity()
    };

    let result = submitter
        .submit_batch(&[item(SKUS[0], 1.0, 10.0)], &identity)
        .await;

    assert!(matches!(result, Err(caddie::CaddieError::IdentityMissing(_))));
    assert_eq!(http_client.call_count(), 0);
}

#[test_log::test(tokio::test)]
async fn test_blank_manager_id_warns_when_discounts_are_sent() {
    let http_client = MockHttpClient::new();
    let progress = CollectingReporter::new();
    let submitter =
        BatchSubmitter::new(http_client.clone(), progress.clone(), SubmitConfig::default());
    http_client.add_status(ADD, 200, r#"{"basket":{"id":"B1"}}"#);
    http_client.add_status(&discount_key("B1", SKUS[0]), 200, "{}");

    let summary = submitter
        .submit_batch(&[item(SKUS[0], 1.0, 10.0)], &identity())
        .await
        .unwrap();

    let warnings = progress.with_severity(Severity::Warn);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("manager id"));
    assert_eq!(warnings[0].line, None);

    // The run still goes through
    assert_eq!(summary.discount_successes, 1);
    let discounts = http_client.calls_to(&discount_path("B1", SKUS[0]));
    assert_eq!(discounts[0].json()["managerId"], "");
}

#[test_log::test(tokio::test)]
async fn test_blank_manager_id_is_fine_without_discounts() {
    let http_client = MockHttpClient::new();
    let progress = CollectingReporter::new();
    let submitter =
        BatchSubmitter::new(http_client.clone(), progress.clone(), SubmitConfig::default());
    http_client.add_status(ADD, 200, r#"{"basket":{"id":"B1"}}"#);

    submitter
        .submit_batch(&[item(SKUS[0], 1.0, 0.0)], &identity())
        .await
        .unwrap();

    assert!(progress.with_severity(Severity::Warn).is_empty());
}
