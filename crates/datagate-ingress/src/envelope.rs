//! Response envelopes and tenant identity headers

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Value, json};

use datagate_core::{Record, TenantContext, query::Paging};

pub const X_CLIENT_SOURCE: &str = "x-client-source";
pub const X_CLIENT_NAME: &str = "x-client-name";
pub const X_CLIENT_TOKEN: &str = "x-client-token";
/// Older clients read these two
pub const X_SOURCE: &str = "x-source";
pub const X_CLIENT_ID: &str = "x-clientid";

pub fn records_value(records: Vec<Record>) -> Value {
    Value::Array(records.into_iter().map(Value::Object).collect())
}

/// `{data, total, paging: {page, limit, totalPages}}`
pub fn paged(records: Vec<Record>, total: u64, paging: Paging) -> Value {
    json!({
        "data": records_value(records),
        "total": total,
        "paging": {
            "page": paging.page,
            "limit": paging.limit,
            "totalPages": paging.total_pages(total),
        }
    })
}

/// Stamp the tenant identity on a response. Values that are not valid
/// header text are skipped.
pub fn stamp_identity(headers: &mut HeaderMap, tenant: &TenantContext) {
    let source = tenant.backend().as_str();
    let pairs = [
        (X_CLIENT_SOURCE, source),
        (X_CLIENT_NAME, tenant.display_id()),
        (X_CLIENT_TOKEN, tenant.token().as_str()),
        (X_SOURCE, source),
        (X_CLIENT_ID, tenant.display_id()),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datagate_core::{BackendKind, TenantDescriptor, TenantToken};
    use std::sync::Arc;

    #[test]
    fn test_paged_envelope() {
        let records = (0..10)
            .map(|n| json!({ "n": n }).as_object().unwrap().clone())
            .collect();
        let body = paged(records, 25, Paging { page: 2, limit: 10 });
        assert_eq!(body["total"], 25);
        assert_eq!(body["data"].as_array().unwrap().len(), 10);
        assert_eq!(body["paging"], json!({"page": 2, "limit": 10, "totalPages": 3}));
    }

    #[test]
    fn test_stamp_identity() {
        let tenant = TenantContext::new(Arc::new(TenantDescriptor {
            token: TenantToken::new("tok-1").unwrap(),
            backend: BackendKind::Relational,
            display_id: "shop".to_string(),
            connection: json!({}),
        }));
        let mut headers = HeaderMap::new();
        stamp_identity(&mut headers, &tenant);

        assert_eq!(headers[X_CLIENT_SOURCE], "relational");
        assert_eq!(headers[X_CLIENT_NAME], "shop");
        assert_eq!(headers[X_CLIENT_TOKEN], "tok-1");
        assert_eq!(headers[X_SOURCE], "relational");
        assert_eq!(headers[X_CLIENT_ID], "shop");
    }
}
