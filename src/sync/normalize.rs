//! Rule-driven mapping from raw upstream records to [`NormalizedEntity`].
//!
//! Every column is filled by walking its [`FieldRule::sources`] in order and
//! coercing the first non-null hit. Anything that fails to coerce falls back to
//! the kind's default; a malformed sub-field never fails the record.

use crate::shopify::ids::canonicalize;
use crate::sync::entity::{
    EntityDescriptor, FieldKind, FieldRule, FieldValue, NormalizedEntity, NormalizedField,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::trace;

/// Map one raw record into the column layout of `descriptor`.
pub fn normalize(descriptor: &EntityDescriptor, raw: &Value) -> NormalizedEntity {
    let external_id = first_present(raw, descriptor.id_sources).and_then(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });

    let fields = descriptor
        .fields
        .iter()
        .map(|rule| normalize_field(rule, raw))
        .collect();

    NormalizedEntity {
        entity_type: descriptor.entity_type,
        external_id,
        fields,
    }
}

fn normalize_field(rule: &FieldRule, raw: &Value) -> NormalizedField {
    let coerced = first_present(raw, rule.sources).and_then(|value| {
        let result = coerce(rule.kind, value);
        if result.is_none() {
            trace!(column = rule.column, value = %value, "unusable upstream value, using default");
        }
        result
    });

    match coerced {
        Some(value) => NormalizedField {
            column: rule.column,
            value,
            from_upstream: true,
        },
        None => NormalizedField {
            column: rule.column,
            value: default_value(rule.kind),
            from_upstream: false,
        },
    }
}

/// The first source pointer that resolves to a non-null value.
fn first_present<'a>(raw: &'a Value, sources: &[&str]) -> Option<&'a Value> {
    sources
        .iter()
        .filter_map(|pointer| raw.pointer(pointer))
        .find(|value| !value.is_null())
}

pub fn default_value(kind: FieldKind) -> FieldValue {
    match kind {
        FieldKind::Text { default } => FieldValue::Text(default.to_owned()),
        FieldKind::Decimal => FieldValue::Decimal("0".to_owned()),
        FieldKind::Integer => FieldValue::Integer(0),
        FieldKind::Boolean { default } => FieldValue::Boolean(default),
        FieldKind::Timestamp => FieldValue::Timestamp(None),
        FieldKind::Json => FieldValue::Json(Value::Array(Vec::new())),
        FieldKind::Reference => FieldValue::Text(String::new()),
    }
}

fn coerce(kind: FieldKind, value: &Value) -> Option<FieldValue> {
    match kind {
        FieldKind::Text { .. } => match value {
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            Value::Number(n) => Some(FieldValue::Text(n.to_string())),
            Value::Bool(b) => Some(FieldValue::Text(b.to_string())),
            _ => None,
        },
        FieldKind::Decimal => parse_decimal(value).map(FieldValue::Decimal),
        FieldKind::Integer => parse_integer(value).map(FieldValue::Integer),
        FieldKind::Boolean { .. } => match value {
            Value::Bool(b) => Some(FieldValue::Boolean(*b)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(FieldValue::Boolean(true)),
                "false" | "no" | "0" => Some(FieldValue::Boolean(false)),
                _ => None,
            },
            _ => None,
        },
        FieldKind::Timestamp => value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
            .map(|dt| FieldValue::Timestamp(Some(dt.with_timezone(&Utc)))),
        FieldKind::Json => Some(FieldValue::Json(match value {
            // Legacy REST payloads send tags as one comma-separated string
            Value::String(s) => Value::Array(
                s.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(|t| Value::String(t.to_owned()))
                    .collect(),
            ),
            other => other.clone(),
        })),
        FieldKind::Reference => match value {
            Value::String(s) if !s.trim().is_empty() => Some(FieldValue::Text(canonicalize(s))),
            Value::Number(n) => Some(FieldValue::Text(n.to_string())),
            _ => None,
        },
    }
}

/// Decimal strings are kept verbatim (after trimming) so money is never routed
/// through a float; JSON numbers are stringified.
fn parse_decimal(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => {
            let s = s.trim();
            let valid = !s.is_empty()
                && s.parse::<f64>().is_ok_and(f64::is_finite)
                && s.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'));
            valid.then(|| s.to_owned())
        }
        _ => None,
    }
}

fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::entity::EntityType;
    use serde_json::json;

    fn value<'a>(entity: &'a NormalizedEntity, column: &str) -> &'a FieldValue {
        &entity.field(column).unwrap().value
    }

    #[test]
    fn prefers_structured_money_over_flat_price() {
        let raw = json!({
            "id": "gid://shopify/Product/1",
            "title": "Mug",
            "priceRangeV2": { "minVariantPrice": { "amount": "12.50", "currencyCode": "CAD" } },
            "price": "99.00"
        });
        let entity = normalize(EntityType::Product.descriptor(), &raw);
        assert_eq!(value(&entity, "price"), &FieldValue::Decimal("12.50".into()));
        assert_eq!(value(&entity, "currency"), &FieldValue::Text("CAD".into()));
    }

    #[test]
    fn falls_back_to_legacy_fields() {
        let raw = json!({
            "id": 42,
            "title": "Mug",
            "price": "7.25",
            "published_status": "draft",
            "product_type": "Kitchen",
            "inventory_quantity": "17",
            "tags": "red, ceramic, ,gift"
        });
        let entity = normalize(EntityType::Product.descriptor(), &raw);
        assert_eq!(entity.external_id.as_deref(), Some("42"));
        assert_eq!(value(&entity, "price"), &FieldValue::Decimal("7.25".into()));
        assert_eq!(value(&entity, "status"), &FieldValue::Text("draft".into()));
        assert_eq!(value(&entity, "product_type"), &FieldValue::Text("Kitchen".into()));
        assert_eq!(value(&entity, "inventory"), &FieldValue::Integer(17));
        assert_eq!(value(&entity, "tags"), &FieldValue::Json(json!(["red", "ceramic", "gift"])));
    }

    #[test]
    fn null_sources_are_skipped() {
        let raw = json!({
            "id": "gid://shopify/Product/1",
            "title": "Mug",
            "priceRangeV2": null,
            "variants": { "edges": [{ "node": { "price": "3.00", "sku": null } }] }
        });
        let entity = normalize(EntityType::Product.descriptor(), &raw);
        assert_eq!(value(&entity, "price"), &FieldValue::Decimal("3.00".into()));
        assert_eq!(value(&entity, "sku"), &FieldValue::Text(String::new()));
        assert!(!entity.field("sku").unwrap().from_upstream);
    }

    #[test]
    fn unparsable_numbers_default_to_zero() {
        let raw = json!({
            "id": "gid://shopify/Product/1",
            "title": "Mug",
            "price": "twelve",
            "totalInventory": { "unexpected": "object" }
        });
        let entity = normalize(EntityType::Product.descriptor(), &raw);
        assert_eq!(value(&entity, "price"), &FieldValue::Decimal("0".into()));
        assert_eq!(value(&entity, "inventory"), &FieldValue::Integer(0));
        assert!(!entity.field("price").unwrap().from_upstream);
    }

    #[test]
    fn missing_fields_get_defaults_not_nulls() {
        let raw = json!({ "id": "gid://shopify/Order/9" });
        let entity = normalize(EntityType::Order.descriptor(), &raw);
        assert_eq!(value(&entity, "name"), &FieldValue::Text(String::new()));
        assert_eq!(value(&entity, "total"), &FieldValue::Decimal("0".into()));
        assert_eq!(
            value(&entity, "financial_status"),
            &FieldValue::Text("PENDING".into())
        );
        assert_eq!(value(&entity, "processed_at"), &FieldValue::Timestamp(None));
        assert!(entity.fields.iter().all(|f| !f.from_upstream));
    }

    #[test]
    fn order_fields_and_customer_reference() {
        let raw = json!({
            "id": "gid://shopify/Order/9",
            "name": "#1009",
            "customer": { "id": "gid://shopify/Customer/77", "email": "a@example.com" },
            "totalPriceSet": { "shopMoney": { "amount": "40.00", "currencyCode": "EUR" } },
            "displayFinancialStatus": "PAID",
            "processedAt": "2026-03-01T12:00:00Z",
            "subtotalLineItemsQuantity": 3
        });
        let entity = normalize(EntityType::Order.descriptor(), &raw);
        assert_eq!(value(&entity, "email"), &FieldValue::Text("a@example.com".into()));
        assert_eq!(value(&entity, "customer_external_id"), &FieldValue::Text("77".into()));
        assert_eq!(value(&entity, "total"), &FieldValue::Decimal("40.00".into()));
        assert_eq!(value(&entity, "currency"), &FieldValue::Text("EUR".into()));
        assert_eq!(value(&entity, "financial_status"), &FieldValue::Text("PAID".into()));
        assert_eq!(value(&entity, "item_count"), &FieldValue::Integer(3));
        let FieldValue::Timestamp(Some(ts)) = value(&entity, "processed_at") else {
            panic!("processed_at not parsed");
        };
        assert_eq!(ts.to_rfc3339(), "2026-03-01T12:00:00+00:00");
    }

    #[test]
    fn promotion_reads_nested_discount() {
        let raw = json!({
            "id": "gid://shopify/DiscountCodeNode/5",
            "discount": {
                "__typename": "DiscountCodeBasic",
                "title": "Spring",
                "status": "ACTIVE",
                "codes": { "nodes": [{ "code": "SPRING10" }] },
                "customerGets": { "value": { "__typename": "DiscountPercentage", "percentage": 0.1 } },
                "asyncUsageCount": 12
            }
        });
        let entity = normalize(EntityType::Promotion.descriptor(), &raw);
        assert_eq!(value(&entity, "title"), &FieldValue::Text("Spring".into()));
        assert_eq!(value(&entity, "code"), &FieldValue::Text("SPRING10".into()));
        assert_eq!(value(&entity, "value"), &FieldValue::Decimal("0.1".into()));
        assert_eq!(value(&entity, "usage_count"), &FieldValue::Integer(12));
        assert_eq!(
            value(&entity, "discount_type"),
            &FieldValue::Text("DiscountCodeBasic".into())
        );
    }

    #[test]
    fn blank_id_is_absent() {
        let raw = json!({ "id": "   ", "title": "Mug" });
        let entity = normalize(EntityType::Product.descriptor(), &raw);
        assert_eq!(entity.external_id, None);
    }

    #[test]
    fn decimal_rejects_non_numeric_strings() {
        assert_eq!(parse_decimal(&json!("1e400")), None);
        assert_eq!(parse_decimal(&json!("NaN")), None);
        assert_eq!(parse_decimal(&json!(" 19.99 ")), Some("19.99".into()));
        assert_eq!(parse_decimal(&json!(5)), Some("5".into()));
    }

    #[test]
    fn integer_accepts_float_strings() {
        assert_eq!(parse_integer(&json!("4.0")), Some(4));
        assert_eq!(parse_integer(&json!(2.9)), Some(2));
        assert_eq!(parse_integer(&json!("-3")), Some(-3));
        assert_eq!(parse_integer(&json!(true)), None);
    }
}
