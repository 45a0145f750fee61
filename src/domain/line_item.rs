//! Line items: the unit of work submitted into a basket.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{CaddieError, Result};

/// Shortest accepted catalog code (EAN-8).
pub const SKU_MIN_DIGITS: usize = 8;
/// Longest accepted catalog code (GTIN-14).
pub const SKU_MAX_DIGITS: usize = 14;

/// A catalog code: 8 to 14 ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Sku(String);

impl Sku {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Sku {
    type Err = CaddieError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let len_ok = (SKU_MIN_DIGITS..=SKU_MAX_DIGITS).contains(&s.len());
        if len_ok && s.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Sku(s.to_string()))
        } else {
            Err(CaddieError::Validation(format!(
                "SKU '{}' must be {}-{} digits",
                s, SKU_MIN_DIGITS, SKU_MAX_DIGITS
            )))
        }
    }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the discount endpoint interprets a discount value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
pub enum DiscountKind {
    /// Absolute amount off the line
    Amount,
    /// Percentage off the line
    #[default]
    Percent,
}

impl fmt::Display for DiscountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscountKind::Amount => write!(f, "Amount"),
            DiscountKind::Percent => write!(f, "Percent"),
        }
    }
}

impl FromStr for DiscountKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "amount" => Ok(DiscountKind::Amount),
            "percent" | "percentage" => Ok(DiscountKind::Percent),
            _ => Err(format!("Invalid discount kind: {}", s)),
        }
    }
}

/// One line of a batch: which item, how many, and what discount to apply after insertion.
///
/// Constructed once through [`LineItem::new`] and never modified. The engine takes
/// quantity and discount as given.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineItem {
    pub sku: Sku,
    #[serde(serialize_with = "serialize_number")]
    pub quantity: f64,
    #[serde(serialize_with = "serialize_number")]
    pub discount_value: f64,
    pub discount_kind: DiscountKind,
}

impl LineItem {
    /// Build a validated line item.
    ///
    /// # Errors
    /// Returns [`CaddieError::Validation`] if the SKU is malformed, the quantity is not a
    /// positive finite number, or the discount is negative or not finite.
    pub fn new(
        sku: &str,
        quantity: f64,
        discount_value: f64,
        discount_kind: DiscountKind,
    ) -> Result<Self> {
        let sku = sku.parse::<Sku>()?;
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(CaddieError::Validation(format!(
                "quantity {} for SKU {} must be positive",
                quantity, sku
            )));
        }
        if !discount_value.is_finite() || discount_value < 0.0 {
            return Err(CaddieError::Validation(format!(
                "discount {} for SKU {} must be non-negative",
                discount_value, sku
            )));
        }
        Ok(Self {
            sku,
            quantity,
            discount_value,
            discount_kind,
        })
    }

    /// Whether the discount step applies to this line at all.
    pub fn has_discount(&self) -> bool {
        self.discount_value > 0.0
    }
}

/// The fixed demonstration batch, amounts in the store's minor unit.
pub fn demo_items() -> Vec<LineItem> {
    [
        ("3281346610000", 4.0, 150.0),
        ("3281346610130", 2.0, 50.0),
        ("3138522095055", 1.0, 20.0),
    ]
    .into_iter()
    .filter_map(|(sku, qty, amount)| LineItem::new(sku, qty, amount, DiscountKind::Amount).ok())
    .collect()
}

/// Serialize whole numbers as JSON integers so `4.0` goes over the wire as `4`.
pub(crate) fn serialize_number<S: Serializer>(
    value: &f64,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}
