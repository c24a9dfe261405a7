//! Older storefront clients send payments with different field names.
//!
//! [`normalize_payment_fields`] is the one place those names are mapped; the
//! handlers only ever deserialize the current names.

use serde_json::Value;

/// `(legacy, current)` field names for payment bodies.
const PAYMENT_ALIASES: &[(&str, &str)] = &[
    ("paid_amount", "amount"),
    ("sell_id", "order_id"),
    ("payment_type", "method"),
    ("payment_method", "method"),
    ("transaction_number", "transaction_id"),
];

/// Renames legacy payment fields in place.
///
/// A field already present under its current name wins over its legacy
/// alias. Non-object values are returned unchanged.
pub fn normalize_payment_fields(mut body: Value) -> Value {
    if let Value::Object(fields) = &mut body {
        for (legacy, current) in PAYMENT_ALIASES {
            if let Some(value) = fields.remove(*legacy) {
                if !fields.contains_key(*current) {
                    fields.insert((*current).to_string(), value);
                } else {
                    tracing::debug!(legacy, current, "ignoring legacy field shadowed by current name");
                }
            }
        }
    }
    body
}
