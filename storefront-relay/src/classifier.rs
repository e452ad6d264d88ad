use serde::Serialize;
use std::fmt;

use crate::query::ResolvedQuery;

/// Coarse label for what a query asks for, used only for analytics
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryCategory {
    ListProducts,
    Search,
    GetProduct,
    Custom,
}

impl QueryCategory {
    pub const fn as_str(&self) -> &'static str {
        match self {
            QueryCategory::ListProducts => "list_products",
            QueryCategory::Search => "search",
            QueryCategory::GetProduct => "get_product",
            QueryCategory::Custom => "custom",
        }
    }
}

impl fmt::Display for QueryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Labels a query by substring match, checked in priority order.
///
/// This is not a parse: a `product(` inside a string argument counts too.
pub fn classify(query: &ResolvedQuery) -> QueryCategory {
    if query.is_default() {
        return QueryCategory::ListProducts;
    }

    let text = query.text();
    if text.contains("query:") {
        QueryCategory::Search
    } else if text.contains("product(") {
        QueryCategory::GetProduct
    } else if text.contains("products(") {
        QueryCategory::ListProducts
    } else {
        QueryCategory::Custom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryOrigin, extract_query};
    use crate::request::{IncomingRequest, RequestBody};
    use http::{HeaderMap, Method};
    use serde_json::json;
    use std::collections::HashMap;

    fn supplied(text: &str) -> ResolvedQuery {
        let request = IncomingRequest::new(
            Method::POST,
            RequestBody::Json(json!({ "query": text })),
            HashMap::new(),
            HeaderMap::new(),
        );
        let query = extract_query(&request).unwrap();
        assert_eq!(query.origin(), QueryOrigin::Body);
        query
    }

    #[test]
    fn test_default_query_lists_products() {
        assert_eq!(
            classify(&ResolvedQuery::default_query()),
            QueryCategory::ListProducts
        );
    }

    #[test]
    fn test_categories_in_priority_order() {
        let cases = [
            (
                r#"{ products(first: 5, query: "hat") { edges { node { id } } } }"#,
                QueryCategory::Search,
            ),
            (
                r#"{ product(handle: "hat") { id } }"#,
                QueryCategory::GetProduct,
            ),
            (
                "{ products(first: 10) { edges { node { id } } } }",
                QueryCategory::ListProducts,
            ),
            ("{ shop { name } }", QueryCategory::Custom),
            // Heuristic: the literal inside an argument still matches
            (
                r#"{ collection(handle: "product(") { id } }"#,
                QueryCategory::GetProduct,
            ),
        ];

        for (text, expected) in cases {
            assert_eq!(classify(&supplied(text)), expected, "query: {text}");
        }
    }

    #[test]
    fn test_category_serializes_as_label() {
        assert_eq!(
            serde_json::to_value(QueryCategory::GetProduct).unwrap(),
            json!("get_product")
        );
        assert_eq!(QueryCategory::Search.to_string(), "search");
    }
}
