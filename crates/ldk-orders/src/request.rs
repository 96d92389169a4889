//! Inbound create request and its validation.

use ldk_schemas::{StateList, Thresholds};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

use crate::OrderError;

pub const MSG_MISSING_FIELDS: &str = "Missing required fields or invalid quantity";
pub const MSG_INVALID_STATES: &str = "Invalid states format";

/// Create request as it arrives over the wire. Every field is optional here so
/// that a missing field becomes a validation error rather than a decode error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub order_number: Option<String>,
    #[serde(default)]
    pub states: Option<String>,
    #[serde(default, deserialize_with = "lenient_quantity")]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub thresholds: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub actual_order_number: Option<String>,
}

/// A create request that passed validation. Nothing here touches storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedOrder {
    pub order_number: String,
    pub states: StateList,
    pub quantity: i64,
    pub thresholds: Thresholds,
    pub product_name: Option<String>,
    pub external_ref: Option<String>,
}

impl ValidatedOrder {
    /// True when the product name carries the one-time marker and there is an
    /// external reference to check against the guard ledger.
    pub fn is_one_time(&self, marker: &str) -> bool {
        !marker.is_empty()
            && self.external_ref.is_some()
            && self
                .product_name
                .as_deref()
                .is_some_and(|p| p.contains(marker))
    }
}

impl CreateOrderRequest {
    pub fn validate(&self) -> Result<ValidatedOrder, OrderError> {
        let order_number = non_blank(self.order_number.as_deref());
        let states_raw = non_blank(self.states.as_deref());

        let (order_number, states_raw, quantity) = match (order_number, states_raw, self.quantity) {
            (Some(o), Some(s), Some(q)) if q > 0 => (o, s, q),
            _ => return Err(OrderError::Validation(MSG_MISSING_FIELDS.to_string())),
        };

        let states = StateList::parse(&states_raw)
            .ok_or_else(|| OrderError::Validation(MSG_INVALID_STATES.to_string()))?;

        Ok(ValidatedOrder {
            order_number,
            states,
            quantity,
            thresholds: Thresholds::parse(self.thresholds.as_deref()),
            product_name: non_blank(self.product_name.as_deref()),
            external_ref: non_blank(self.actual_order_number.as_deref()),
        })
    }
}

fn non_blank(v: Option<&str>) -> Option<String> {
    v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Storefront integrations post the quantity as a number or as a numeric
/// string. Anything else decodes to `None` and fails validation.
fn lenient_quantity<'de, D>(de: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
        Other(IgnoredAny),
    }

    Ok(match Option::<Raw>::deserialize(de)? {
        Some(Raw::Int(n)) => Some(n),
        Some(Raw::Float(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(f as i64),
        Some(Raw::Text(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldk_schemas::StateCode;

    fn req(order: &str, states: &str, qty: Option<i64>) -> CreateOrderRequest {
        CreateOrderRequest {
            order_number: Some(order.to_string()),
            states: Some(states.to_string()),
            quantity: qty,
            ..Default::default()
        }
    }

    #[test]
    fn zero_or_missing_quantity_is_rejected() {
        for q in [None, Some(0), Some(-3)] {
            let err = req("ORD-1", "FL", q).validate().unwrap_err();
            assert_eq!(err.to_string(), MSG_MISSING_FIELDS);
        }
    }

    #[test]
    fn blank_order_number_is_rejected() {
        let err = req("   ", "FL", Some(5)).validate().unwrap_err();
        assert_eq!(err.to_string(), MSG_MISSING_FIELDS);
    }

    #[test]
    fn states_without_a_two_letter_token_are_rejected() {
        let err = req("ORD-1", "Florida, X", Some(5)).validate().unwrap_err();
        assert_eq!(err.to_string(), MSG_INVALID_STATES);
    }

    #[test]
    fn valid_request_normalizes_fields() {
        let mut r = req("ORD-1", "fl, tx ,FL", Some(10));
        r.thresholds = Some("fl=3, TX=abc".to_string());
        r.product_name = Some("  ".to_string());
        r.actual_order_number = Some("WC-77".to_string());

        let v = r.validate().unwrap();
        assert_eq!(v.states.to_storage(), "FL,TX");
        assert_eq!(v.thresholds.get(&StateCode::parse("FL").unwrap()), Some(3));
        assert_eq!(v.thresholds.get(&StateCode::parse("TX").unwrap()), None);
        assert_eq!(v.product_name, None);
        assert_eq!(v.external_ref.as_deref(), Some("WC-77"));
    }

    #[test]
    fn one_time_needs_marker_and_external_ref() {
        let mut r = req("ORD-1", "FL", Some(1));
        r.product_name = Some("Leads - One Time Pack".to_string());
        assert!(!r.validate().unwrap().is_one_time("One Time"));

        r.actual_order_number = Some("WC-1".to_string());
        assert!(r.validate().unwrap().is_one_time("One Time"));
        assert!(!r.validate().unwrap().is_one_time("Subscription"));
    }

    #[test]
    fn quantity_accepts_numeric_strings() {
        let r: CreateOrderRequest = serde_json::from_str(
            r#"{"order_number":"A","states":"FL","quantity":"12"}"#,
        )
        .unwrap();
        assert_eq!(r.quantity, Some(12));

        let r: CreateOrderRequest =
            serde_json::from_str(r#"{"order_number":"A","states":"FL","quantity":"ten"}"#)
                .unwrap();
        assert_eq!(r.quantity, None);

        let r: CreateOrderRequest =
            serde_json::from_str(r#"{"order_number":"A","states":"FL","quantity":[1]}"#).unwrap();
        assert_eq!(r.quantity, None);
    }
}
