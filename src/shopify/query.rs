//! GraphQL request construction and response unwrapping for list queries.

use serde::Serialize;
use serde_json::Value;

use crate::shopify::errors::UpstreamError;
use crate::sync::entity::EntityDescriptor;

/// The Admin API refuses `first` values above this.
pub const MAX_PAGE_SIZE: u32 = 250;

#[derive(Debug, Clone, Serialize)]
pub struct GraphqlRequest {
    pub query: String,
    pub variables: Value,
}

/// Build the first-page query for one entity type.
pub fn build_request(desc: &EntityDescriptor, limit: u32) -> GraphqlRequest {
    let query = format!(
        "query MirrorPage($first: Int!) {{ {connection}(first: $first) {{ \
         edges {{ cursor node {{ {selection} }} }} \
         pageInfo {{ hasNextPage endCursor }} }} }}",
        connection = desc.connection,
        selection = desc.selection,
    );
    GraphqlRequest {
        query,
        variables: serde_json::json!({ "first": limit.clamp(1, MAX_PAGE_SIZE) }),
    }
}

/// Pull the record list out of a GraphQL response body.
///
/// Partial responses (some `errors` alongside `data`) are accepted; only a
/// response with errors and no usable data fails the batch.
pub fn extract_records(desc: &EntityDescriptor, body: Value) -> Result<Vec<Value>, UpstreamError> {
    let Value::Object(mut body) = body else {
        return Err(UpstreamError::MissingCollection {
            path: "data".to_owned(),
        });
    };

    let data = body.remove("data").filter(|d| !d.is_null());
    let errors = graphql_errors(body.get("errors"));

    let Some(mut data) = data else {
        return Err(match errors {
            Some(message) => UpstreamError::Graphql(message),
            None => UpstreamError::MissingCollection {
                path: "data".to_owned(),
            },
        });
    };
    if let Some(message) = errors {
        tracing::warn!(
            connection = desc.connection,
            errors = message,
            "upstream returned partial data with errors"
        );
    }

    let path = format!("data.{}", desc.connection);
    let connection = match data.get_mut(desc.connection).map(Value::take) {
        Some(Value::Object(connection)) => connection,
        Some(Value::Array(nodes)) => return Ok(objects(nodes)),
        _ => return Err(UpstreamError::MissingCollection { path }),
    };

    if let Some(Value::Array(edges)) = connection.get("edges") {
        return Ok(edges
            .iter()
            .filter_map(|edge| edge.get("node"))
            .filter(|node| node.is_object())
            .cloned()
            .collect());
    }
    if let Some(Value::Array(nodes)) = connection.get("nodes") {
        return Ok(objects(nodes.clone()));
    }

    Err(UpstreamError::MissingCollection {
        path: format!("{path}.edges"),
    })
}

fn objects(values: Vec<Value>) -> Vec<Value> {
    values.into_iter().filter(Value::is_object).collect()
}

/// Join the `message` of every entry in a GraphQL `errors` array.
fn graphql_errors(errors: Option<&Value>) -> Option<String> {
    let errors = errors?.as_array()?;
    if errors.is_empty() {
        return None;
    }
    let messages: Vec<&str> = errors
        .iter()
        .map(|e| e.get("message").and_then(Value::as_str).unwrap_or("unknown error"))
        .collect();
    Some(messages.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::entity::EntityType;
    use serde_json::json;

    fn products() -> &'static EntityDescriptor {
        EntityType::Product.descriptor()
    }

    #[test]
    fn request_uses_connection_and_clamped_limit() {
        let req = build_request(EntityType::Promotion.descriptor(), 1000);
        assert!(req.query.starts_with("query MirrorPage($first: Int!) { discountNodes(first: $first)"));
        assert!(req.query.contains("pageInfo { hasNextPage endCursor }"));
        assert_eq!(req.variables, json!({ "first": 250 }));

        let req = build_request(products(), 0);
        assert_eq!(req.variables, json!({ "first": 1 }));
    }

    #[test]
    fn extracts_edge_nodes() {
        let body = json!({
            "data": { "products": { "edges": [
                { "cursor": "a", "node": { "id": "gid://shopify/Product/1" } },
                { "cursor": "b", "node": { "id": "gid://shopify/Product/2" } },
                { "cursor": "c", "node": null }
            ] } }
        });
        let records = extract_records(products(), body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["id"], "gid://shopify/Product/2");
    }

    #[test]
    fn extracts_nodes_list() {
        let body = json!({ "data": { "products": { "nodes": [ { "id": "1" }, 5 ] } } });
        assert_eq!(extract_records(products(), body).unwrap().len(), 1);
    }

    #[test]
    fn empty_page_is_not_an_error() {
        let body = json!({ "data": { "products": { "edges": [] } } });
        assert!(extract_records(products(), body).unwrap().is_empty());
    }

    #[test]
    fn missing_collection_fails_the_batch() {
        let body = json!({ "data": { "collections": { "edges": [] } } });
        match extract_records(products(), body) {
            Err(UpstreamError::MissingCollection { path }) => assert_eq!(path, "data.products"),
            other => panic!("unexpected: {other:?}"),
        }

        let body = json!({ "data": { "products": { "items": [] } } });
        match extract_records(products(), body) {
            Err(UpstreamError::MissingCollection { path }) => assert_eq!(path, "data.products.edges"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn errors_without_data_are_reported() {
        let body = json!({
            "data": null,
            "errors": [ { "message": "Throttled" }, { "message": "Access denied" } ]
        });
        match extract_records(products(), body) {
            Err(UpstreamError::Graphql(message)) => assert_eq!(message, "Throttled; Access denied"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn partial_data_with_errors_is_kept() {
        let body = json!({
            "data": { "products": { "edges": [ { "node": { "id": "1" } } ] } },
            "errors": [ { "message": "field deprecated" } ]
        });
        assert_eq!(extract_records(products(), body).unwrap().len(), 1);
    }
}
