//! Wire contracts of the basket service.
//!
//! These shapes must match what the service expects byte for byte in field naming,
//! so they are kept apart from the domain types they are built from.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::line_item::{DiscountKind, LineItem, Sku, serialize_number};

/// Path for adding an item to the session's basket.
pub const ADD_ITEM_PATH: &str = "/basket/items";

/// Opaque identifier of a server-side basket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BasketId(pub String);

impl BasketId {
    /// Last few characters, enough to tell baskets apart in logs.
    pub fn short(&self) -> &str {
        let start = self
            .0
            .char_indices()
            .rev()
            .nth(4)
            .map(|(i, _)| i)
            .unwrap_or(0);
        &self.0[start..]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BasketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BasketId {
    fn from(s: &str) -> Self {
        BasketId(s.to_string())
    }
}

/// Path addressing the discount of one SKU inside a basket.
pub fn discount_path(basket_id: &BasketId, sku: &Sku) -> String {
    format!("/basket/{}/items/{}/discount", basket_id, sku)
}

/// Prompts the till would normally raise when an item is scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conditions {
    pub age_prompted: bool,
    pub price_prompted: bool,
    pub qty_prompted: bool,
    pub measurement_prompted: bool,
    pub sale_prompted: bool,
}

impl Default for Conditions {
    fn default() -> Self {
        Self {
            age_prompted: false,
            price_prompted: false,
            qty_prompted: true,
            measurement_prompted: false,
            sale_prompted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemEntry {
    pub entry_method: &'static str,
    #[serde(rename = "ean")]
    pub sku: Sku,
    #[serde(serialize_with = "serialize_number")]
    pub qty: f64,
    pub fulfilment_route: &'static str,
    #[serde(serialize_with = "serialize_number")]
    pub total_qty_after_change: f64,
}

/// Body of `POST /basket/items`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub conditions: Conditions,
    pub item: ItemEntry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basket_id: Option<BasketId>,
}

impl AddItemRequest {
    pub fn new(item: &LineItem, basket_id: Option<BasketId>) -> Self {
        Self {
            conditions: Conditions::default(),
            item: ItemEntry {
                entry_method: "selected",
                sku: item.sku.clone(),
                qty: item.quantity,
                fulfilment_route: "takeaway",
                total_qty_after_change: item.quantity,
            },
            basket_id,
        }
    }
}

/// Body of `POST /basket/{basketId}/items/{sku}/discount`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountRequest {
    #[serde(serialize_with = "serialize_number")]
    pub qty: f64,
    #[serde(rename = "type")]
    pub kind: DiscountKind,
    pub reason: String,
    #[serde(serialize_with = "serialize_number")]
    pub amount: f64,
    /// 1-based position of the line in the batch
    pub sequence_number: u32,
    pub manager_id: String,
}

impl DiscountRequest {
    pub fn new(item: &LineItem, sequence_number: u32, reason: &str, manager_id: &str) -> Self {
        Self {
            qty: item.quantity,
            kind: item.discount_kind,
            reason: reason.to_string(),
            amount: item.discount_value,
            sequence_number,
            manager_id: manager_id.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AddItemResponse {
    basket: Option<BasketRef>,
}

#[derive(Debug, Deserialize)]
struct BasketRef {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConflictBody {
    data: Option<ConflictData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConflictData {
    basket_id: Option<String>,
}

fn non_empty(id: Option<String>) -> Option<BasketId> {
    id.filter(|id| !id.trim().is_empty()).map(BasketId)
}

/// Basket id from a successful add-item payload (`basket.id`), if any.
pub fn basket_id_from_add_response(payload: &serde_json::Value) -> Option<BasketId> {
    let response = AddItemResponse::deserialize(payload).ok()?;
    non_empty(response.basket?.id)
}

/// Basket id from a 409 body (`data.basketId`), if the body carries one.
pub fn basket_id_from_conflict(body: &str) -> Option<BasketId> {
    let conflict: ConflictBody = serde_json::from_str(body).ok()?;
    non_empty(conflict.data?.basket_id)
}
