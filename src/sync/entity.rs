//! Entity-type descriptors and the normalized record shape.
//!
//! The five mirrored entity types share one sync pipeline. Everything that
//! differs between them (local table, GraphQL connection, node selection,
//! required fields and the per-column extraction rules) lives in a static
//! [`EntityDescriptor`], so adding a fallback source for a field is a change to
//! the tables below rather than to any control flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The upstream resource kinds mirrored into local tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Product,
    Collection,
    Customer,
    Order,
    Promotion,
}

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        EntityType::Product,
        EntityType::Collection,
        EntityType::Customer,
        EntityType::Order,
        EntityType::Promotion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Product => "product",
            EntityType::Collection => "collection",
            EntityType::Customer => "customer",
            EntityType::Order => "order",
            EntityType::Promotion => "promotion",
        }
    }

    pub fn descriptor(self) -> &'static EntityDescriptor {
        match self {
            EntityType::Product => &PRODUCT,
            EntityType::Collection => &COLLECTION,
            EntityType::Customer => &CUSTOMER,
            EntityType::Order => &ORDER,
            EntityType::Promotion => &PROMOTION,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity type `{0}`")]
pub struct UnknownEntityType(pub String);

impl FromStr for EntityType {
    type Err = UnknownEntityType;

    /// Accepts singular or plural names in any case (`product`, `Products`).
    /// Promotions are also reachable as `discounts`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "product" | "products" => Ok(EntityType::Product),
            "collection" | "collections" => Ok(EntityType::Collection),
            "customer" | "customers" => Ok(EntityType::Customer),
            "order" | "orders" => Ok(EntityType::Order),
            "promotion" | "promotions" | "discount" | "discounts" => Ok(EntityType::Promotion),
            _ => Err(UnknownEntityType(s.to_owned())),
        }
    }
}

/// How a raw upstream value is coerced into a column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free text; strings pass through, numbers and booleans are stringified.
    Text { default: &'static str },
    /// Money and other exact decimals, stored as `NUMERIC`. Default `0`.
    Decimal,
    /// Whole numbers. Numeric strings are parsed; default `0`.
    Integer,
    Boolean { default: bool },
    /// RFC 3339 timestamps. Absent values stay absent (`NULL` column).
    Timestamp,
    /// Arbitrary JSON (tag lists and the like). Default `[]`.
    Json,
    /// An upstream id pointing at another entity, canonicalized on the way in.
    /// Default empty string.
    Reference,
}

/// One local column and the ordered upstream locations it may be read from.
///
/// `sources` are JSON pointers into the raw record, tried first to last; the
/// first one holding a non-null value wins.
#[derive(Debug)]
pub struct FieldRule {
    pub column: &'static str,
    pub kind: FieldKind,
    pub sources: &'static [&'static str],
}

/// Everything the generic pipeline needs to know about one entity type.
#[derive(Debug)]
pub struct EntityDescriptor {
    pub entity_type: EntityType,
    /// Local table holding mirrored rows.
    pub table: &'static str,
    /// Root connection field of the GraphQL query (`products`, `discountNodes`, ...).
    pub connection: &'static str,
    /// Selection set requested for every node.
    pub selection: &'static str,
    /// Pointers tried for the upstream id.
    pub id_sources: &'static [&'static str],
    /// Columns that must come from the upstream payload and be non-blank.
    pub required: &'static [&'static str],
    pub fields: &'static [FieldRule],
}

impl EntityDescriptor {
    pub fn rule(&self, column: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|rule| rule.column == column)
    }
}

/// A coerced column value. Never carries a raw JSON null.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    /// Canonical decimal string, bound as `NUMERIC`.
    Decimal(String),
    Integer(i64),
    Boolean(bool),
    Timestamp(Option<DateTime<Utc>>),
    Json(serde_json::Value),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) | FieldValue::Decimal(s) => Some(s),
            _ => None,
        }
    }
}

/// A normalized field plus whether it was actually read from the payload
/// (as opposed to filled in with the kind's default).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedField {
    pub column: &'static str,
    pub value: FieldValue,
    #[serde(skip)]
    pub from_upstream: bool,
}

/// An upstream record mapped into the column layout of its local table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEntity {
    pub entity_type: EntityType,
    /// Upstream id exactly as received; canonicalized by the reconciler.
    pub external_id: Option<String>,
    pub fields: Vec<NormalizedField>,
}

impl NormalizedEntity {
    pub fn field(&self, column: &str) -> Option<&NormalizedField> {
        self.fields.iter().find(|f| f.column == column)
    }

    /// A short label for logs: the first required column's text, if any.
    pub fn label(&self) -> Option<&str> {
        let column = self.entity_type.descriptor().required.first()?;
        self.field(column)?.value.as_text()
    }
}

const UPDATED_AT: FieldRule = FieldRule {
    column: "upstream_updated_at",
    kind: FieldKind::Timestamp,
    sources: &["/updatedAt", "/updated_at"],
};

static PRODUCT: EntityDescriptor = EntityDescriptor {
    entity_type: EntityType::Product,
    table: "products",
    connection: "products",
    selection: "id legacyResourceId title handle descriptionHtml vendor productType status tags totalInventory updatedAt \
        featuredImage { url } \
        priceRangeV2 { minVariantPrice { amount currencyCode } } \
        variants(first: 1) { edges { node { price sku } } }",
    id_sources: &["/id", "/admin_graphql_api_id", "/legacyResourceId"],
    required: &["title"],
    fields: &[
        FieldRule {
            column: "title",
            kind: FieldKind::Text { default: "" },
            sources: &["/title"],
        },
        FieldRule {
            column: "handle",
            kind: FieldKind::Text { default: "" },
            sources: &["/handle"],
        },
        FieldRule {
            column: "description",
            kind: FieldKind::Text { default: "" },
            sources: &["/descriptionHtml", "/description", "/body_html"],
        },
        FieldRule {
            column: "vendor",
            kind: FieldKind::Text { default: "" },
            sources: &["/vendor"],
        },
        FieldRule {
            column: "product_type",
            kind: FieldKind::Text { default: "" },
            sources: &["/productType", "/product_type"],
        },
        FieldRule {
            column: "status",
            kind: FieldKind::Text { default: "ACTIVE" },
            sources: &["/status", "/published_status"],
        },
        FieldRule {
            column: "price",
            kind: FieldKind::Decimal,
            sources: &[
                "/priceRangeV2/minVariantPrice/amount",
                "/priceRange/minVariantPrice/amount",
                "/variants/edges/0/node/price",
                "/variants/0/price",
                "/price",
            ],
        },
        FieldRule {
            column: "currency",
            kind: FieldKind::Text { default: "USD" },
            sources: &[
                "/priceRangeV2/minVariantPrice/currencyCode",
                "/priceRange/minVariantPrice/currencyCode",
                "/currency",
            ],
        },
        FieldRule {
            column: "sku",
            kind: FieldKind::Text { default: "" },
            sources: &["/variants/edges/0/node/sku", "/variants/0/sku", "/sku"],
        },
        FieldRule {
            column: "inventory",
            kind: FieldKind::Integer,
            sources: &["/totalInventory", "/inventory_quantity", "/inventory"],
        },
        FieldRule {
            column: "image_url",
            kind: FieldKind::Text { default: "" },
            sources: &["/featuredImage/url", "/featuredImage/originalSrc", "/image/src"],
        },
        FieldRule {
            column: "tags",
            kind: FieldKind::Json,
            sources: &["/tags"],
        },
        UPDATED_AT,
    ],
};

static COLLECTION: EntityDescriptor = EntityDescriptor {
    entity_type: EntityType::Collection,
    table: "collections",
    connection: "collections",
    selection: "id title handle descriptionHtml sortOrder updatedAt \
        productsCount { count } \
        image { url }",
    id_sources: &["/id", "/admin_graphql_api_id"],
    required: &["title"],
    fields: &[
        FieldRule {
            column: "title",
            kind: FieldKind::Text { default: "" },
            sources: &["/title"],
        },
        FieldRule {
            column: "handle",
            kind: FieldKind::Text { default: "" },
            sources: &["/handle"],
        },
        FieldRule {
            column: "description",
            kind: FieldKind::Text { default: "" },
            sources: &["/descriptionHtml", "/description", "/body_html"],
        },
        FieldRule {
            column: "sort_order",
            kind: FieldKind::Text { default: "MANUAL" },
            sources: &["/sortOrder", "/sort_order"],
        },
        FieldRule {
            column: "products_count",
            kind: FieldKind::Integer,
            sources: &["/productsCount/count", "/productsCount", "/products_count"],
        },
        FieldRule {
            column: "image_url",
            kind: FieldKind::Text { default: "" },
            sources: &["/image/url", "/image/src"],
        },
        UPDATED_AT,
    ],
};

static CUSTOMER: EntityDescriptor = EntityDescriptor {
    entity_type: EntityType::Customer,
    table: "customers",
    connection: "customers",
    selection: "id displayName firstName lastName email phone state verifiedEmail tags numberOfOrders updatedAt \
        amountSpent { amount currencyCode } \
        defaultEmailAddress { emailAddress } \
        defaultPhoneNumber { phoneNumber }",
    id_sources: &["/id", "/admin_graphql_api_id"],
    required: &["display_name"],
    fields: &[
        FieldRule {
            column: "display_name",
            kind: FieldKind::Text { default: "" },
            sources: &["/displayName", "/display_name", "/email", "/defaultEmailAddress/emailAddress"],
        },
        FieldRule {
            column: "first_name",
            kind: FieldKind::Text { default: "" },
            sources: &["/firstName", "/first_name"],
        },
        FieldRule {
            column: "last_name",
            kind: FieldKind::Text { default: "" },
            sources: &["/lastName", "/last_name"],
        },
        FieldRule {
            column: "email",
            kind: FieldKind::Text { default: "" },
            sources: &["/defaultEmailAddress/emailAddress", "/email"],
        },
        FieldRule {
            column: "phone",
            kind: FieldKind::Text { default: "" },
            sources: &["/defaultPhoneNumber/phoneNumber", "/phone"],
        },
        FieldRule {
            column: "state",
            kind: FieldKind::Text { default: "ENABLED" },
            sources: &["/state"],
        },
        FieldRule {
            column: "verified_email",
            kind: FieldKind::Boolean { default: false },
            sources: &["/verifiedEmail", "/verified_email"],
        },
        FieldRule {
            column: "orders_count",
            kind: FieldKind::Integer,
            sources: &["/numberOfOrders", "/ordersCount", "/orders_count"],
        },
        FieldRule {
            column: "total_spent",
            kind: FieldKind::Decimal,
            sources: &["/amountSpent/amount", "/totalSpentV2/amount", "/totalSpent", "/total_spent"],
        },
        FieldRule {
            column: "currency",
            kind: FieldKind::Text { default: "USD" },
            sources: &["/amountSpent/currencyCode", "/totalSpentV2/currencyCode", "/currency"],
        },
        FieldRule {
            column: "tags",
            kind: FieldKind::Json,
            sources: &["/tags"],
        },
        UPDATED_AT,
    ],
};

static ORDER: EntityDescriptor = EntityDescriptor {
    entity_type: EntityType::Order,
    table: "orders",
    connection: "orders",
    selection: "id name email processedAt createdAt updatedAt \
        displayFinancialStatus displayFulfillmentStatus subtotalLineItemsQuantity \
        customer { id email } \
        totalPriceSet { shopMoney { amount currencyCode } } \
        subtotalPriceSet { shopMoney { amount } }",
    id_sources: &["/id", "/admin_graphql_api_id"],
    required: &["name"],
    fields: &[
        FieldRule {
            column: "name",
            kind: FieldKind::Text { default: "" },
            sources: &["/name", "/order_number"],
        },
        FieldRule {
            column: "email",
            kind: FieldKind::Text { default: "" },
            sources: &["/email", "/customer/email", "/contact_email"],
        },
        FieldRule {
            column: "customer_external_id",
            kind: FieldKind::Reference,
            sources: &["/customer/id", "/customer_id"],
        },
        FieldRule {
            column: "total",
            kind: FieldKind::Decimal,
            sources: &["/totalPriceSet/shopMoney/amount", "/totalPriceV2/amount", "/totalPrice", "/total_price"],
        },
        FieldRule {
            column: "subtotal",
            kind: FieldKind::Decimal,
            sources: &[
                "/subtotalPriceSet/shopMoney/amount",
                "/subtotalPriceV2/amount",
                "/subtotalPrice",
                "/subtotal_price",
            ],
        },
        FieldRule {
            column: "currency",
            kind: FieldKind::Text { default: "USD" },
            sources: &["/totalPriceSet/shopMoney/currencyCode", "/currencyCode", "/currency"],
        },
        FieldRule {
            column: "financial_status",
            kind: FieldKind::Text { default: "PENDING" },
            sources: &["/displayFinancialStatus", "/financialStatus", "/financial_status"],
        },
        FieldRule {
            column: "fulfillment_status",
            kind: FieldKind::Text { default: "UNFULFILLED" },
            sources: &["/displayFulfillmentStatus", "/fulfillmentStatus", "/fulfillment_status"],
        },
        FieldRule {
            column: "item_count",
            kind: FieldKind::Integer,
            sources: &["/subtotalLineItemsQuantity", "/item_count"],
        },
        FieldRule {
            column: "processed_at",
            kind: FieldKind::Timestamp,
            sources: &["/processedAt", "/processed_at", "/createdAt", "/created_at"],
        },
        UPDATED_AT,
    ],
};

static PROMOTION: EntityDescriptor = EntityDescriptor {
    entity_type: EntityType::Promotion,
    table: "promotions",
    connection: "discountNodes",
    selection: "id discount { __typename \
        ... on DiscountCodeBasic { title status startsAt endsAt asyncUsageCount \
            codes(first: 1) { nodes { code } } \
            customerGets { value { __typename \
                ... on DiscountPercentage { percentage } \
                ... on DiscountAmount { amount { amount } } } } } \
        ... on DiscountAutomaticBasic { title status startsAt endsAt asyncUsageCount \
            customerGets { value { __typename \
                ... on DiscountPercentage { percentage } \
                ... on DiscountAmount { amount { amount } } } } } \
        ... on DiscountCodeFreeShipping { title status startsAt endsAt asyncUsageCount \
            codes(first: 1) { nodes { code } } } }",
    id_sources: &["/id", "/admin_graphql_api_id"],
    required: &["title"],
    fields: &[
        FieldRule {
            column: "title",
            kind: FieldKind::Text { default: "" },
            sources: &["/discount/title", "/title"],
        },
        FieldRule {
            column: "code",
            kind: FieldKind::Text { default: "" },
            sources: &["/discount/codes/nodes/0/code", "/code", "/codes/0/code"],
        },
        FieldRule {
            column: "status",
            kind: FieldKind::Text { default: "ACTIVE" },
            sources: &["/discount/status", "/status"],
        },
        FieldRule {
            column: "discount_type",
            kind: FieldKind::Text { default: "" },
            sources: &["/discount/__typename", "/value_type", "/type"],
        },
        FieldRule {
            column: "value",
            kind: FieldKind::Decimal,
            sources: &[
                "/discount/customerGets/value/percentage",
                "/discount/customerGets/value/amount/amount",
                "/value",
            ],
        },
        FieldRule {
            column: "usage_count",
            kind: FieldKind::Integer,
            sources: &["/discount/asyncUsageCount", "/usageCount", "/usage_count"],
        },
        FieldRule {
            column: "starts_at",
            kind: FieldKind::Timestamp,
            sources: &["/discount/startsAt", "/startsAt", "/starts_at"],
        },
        FieldRule {
            column: "ends_at",
            kind: FieldKind::Timestamp,
            sources: &["/discount/endsAt", "/endsAt", "/ends_at"],
        },
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entity_type_names() {
        assert_eq!("products".parse::<EntityType>(), Ok(EntityType::Product));
        assert_eq!("Product".parse::<EntityType>(), Ok(EntityType::Product));
        assert_eq!(" ORDERS ".parse::<EntityType>(), Ok(EntityType::Order));
        assert_eq!("discounts".parse::<EntityType>(), Ok(EntityType::Promotion));
        assert_eq!(
            "widgets".parse::<EntityType>(),
            Err(UnknownEntityType("widgets".into()))
        );
    }

    #[test]
    fn descriptors_are_consistent() {
        for ty in EntityType::ALL {
            let desc = ty.descriptor();
            assert_eq!(desc.entity_type, ty);
            assert!(!desc.required.is_empty(), "{ty} has no required fields");
            for column in desc.required {
                assert!(desc.rule(column).is_some(), "{ty}: required `{column}` has no rule");
            }
            for rule in desc.fields {
                assert!(!rule.sources.is_empty(), "{ty}.{} has no sources", rule.column);
                assert!(rule.sources.iter().all(|s| s.starts_with('/')));
            }
        }
    }

    #[test]
    fn tables_are_distinct() {
        let mut tables: Vec<_> = EntityType::ALL.iter().map(|t| t.descriptor().table).collect();
        tables.sort();
        tables.dedup();
        assert_eq!(tables.len(), EntityType::ALL.len());
    }
}
