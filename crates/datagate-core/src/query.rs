//! Generic query protocol types
//!
//! A query request is `{method, args, hidden?, paging?}`. `find` goes
//! through [`FindQuery`]; every other method is parsed into a tagged
//! [`Operation`] and checked against the backend's capabilities before it
//! is dispatched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::{Error, Record, Result};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;

/// Named low-level operations a backend may allow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Find,
    FindOne,
    Count,
    Distinct,
    Aggregate,
    EstimatedCount,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Find => "find",
            Method::FindOne => "findOne",
            Method::Count => "countDocuments",
            Method::Distinct => "distinct",
            Method::Aggregate => "aggregate",
            Method::EstimatedCount => "estimatedDocumentCount",
        }
    }

    /// Resolve a caller-supplied method name
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "find" => Some(Method::Find),
            "findOne" => Some(Method::FindOne),
            "countDocuments" | "count" => Some(Method::Count),
            "distinct" => Some(Method::Distinct),
            "aggregate" => Some(Method::Aggregate),
            "estimatedDocumentCount" => Some(Method::EstimatedCount),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Page selection; both values are 1-based and at least 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    DEFAULT_PAGE
}

fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Paging {
    /// Reject zero values and limits above `max_limit`
    pub fn validate(&self, max_limit: u64) -> Result<()> {
        if self.page == 0 {
            return Err(Error::malformed("paging.page must be at least 1"));
        }
        if self.limit == 0 {
            return Err(Error::malformed("paging.limit must be at least 1"));
        }
        if self.limit > max_limit {
            return Err(Error::malformed(format!(
                "paging.limit must not exceed {}",
                max_limit
            )));
        }
        Ok(())
    }

    pub fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        if self.limit == 0 {
            return 0;
        }
        total.div_ceil(self.limit)
    }
}

/// A parsed `{method, args, hidden?, paging?}` request
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub method: String,
    pub args: Vec<Value>,
    pub hidden: Vec<String>,
    pub paging: Option<Paging>,
}

#[derive(Deserialize)]
struct RawQueryRequest {
    method: Option<String>,
    args: Option<Value>,
    #[serde(default)]
    hidden: Option<Vec<String>>,
    #[serde(default)]
    paging: Option<Paging>,
}

impl QueryRequest {
    /// Parse a request body
    ///
    /// # Errors
    /// - `ValidationError::MalformedBody` if `method` is missing or empty,
    ///   `args` is not an array, or `hidden`/`paging` have the wrong shape
    pub fn from_value(body: Value) -> Result<Self> {
        let raw: RawQueryRequest =
            serde_json::from_value(body).map_err(|e| Error::malformed(e.to_string()))?;

        let method = match raw.method {
            Some(m) if !m.is_empty() => m,
            _ => return Err(Error::malformed("method is required")),
        };
        let args = match raw.args {
            Some(Value::Array(args)) => args,
            _ => return Err(Error::malformed("args must be an array")),
        };

        Ok(Self {
            method,
            args,
            hidden: raw.hidden.unwrap_or_default(),
            paging: raw.paging,
        })
    }

    pub fn is_find(&self) -> bool {
        self.method == "find"
    }

    /// The opaque filter in `args[0]`, `{}` when absent
    pub fn filter(&self) -> Result<Value> {
        filter_arg(self.args.first())
    }

    /// Build the `find` query; without paging the first default page is used
    pub fn find_query(&self) -> Result<FindQuery> {
        let paging = self.paging.unwrap_or_default();
        Ok(FindQuery {
            filter: self.filter()?,
            hidden: self.hidden.clone(),
            skip: paging.skip(),
            limit: Some(paging.limit),
        })
    }

    /// Parse a non-`find` method into an operation
    pub fn operation(&self) -> Result<Operation> {
        Operation::parse(&self.method, &self.args)
    }
}

fn filter_arg(arg: Option<&Value>) -> Result<Value> {
    match arg {
        None | Some(Value::Null) => Ok(Value::Object(Map::new())),
        Some(v @ Value::Object(_)) => Ok(v.clone()),
        Some(_) => Err(Error::malformed("filter must be an object")),
    }
}

/// Backend-native filtered fetch with projection and window
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FindQuery {
    /// Opaque backend-native filter, forwarded without interpretation
    pub filter: Value,
    pub hidden: Vec<String>,
    pub skip: u64,
    /// `None` returns every matching record
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FindResult {
    pub records: Vec<Record>,
    /// Count of all records matching the filter, ignoring the window
    pub total: u64,
}

/// Low-level operation invoked through the escape hatch
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Find { filter: Value },
    FindOne { filter: Value },
    Count { filter: Value },
    Distinct { field: String, filter: Value },
    Aggregate { pipeline: Vec<Value> },
    EstimatedCount,
}

impl Operation {
    /// Parse positional `args` for a named method
    ///
    /// # Errors
    /// - `ValidationError::UnsupportedMethod` for unknown names
    /// - `ValidationError::MalformedBody` for arguments of the wrong shape
    pub fn parse(method: &str, args: &[Value]) -> Result<Self> {
        let Some(parsed) = Method::parse(method) else {
            return Err(Error::unsupported(method));
        };

        let op = match parsed {
            Method::Find => Operation::Find {
                filter: filter_arg(args.first())?,
            },
            Method::FindOne => Operation::FindOne {
                filter: filter_arg(args.first())?,
            },
            Method::Count => Operation::Count {
                filter: filter_arg(args.first())?,
            },
            Method::Distinct => {
                let field = args
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::malformed("distinct requires a field name"))?;
                Operation::Distinct {
                    field: field.to_string(),
                    filter: filter_arg(args.get(1))?,
                }
            }
            Method::Aggregate => match args.first() {
                Some(Value::Array(stages)) => Operation::Aggregate {
                    pipeline: stages.clone(),
                },
                _ => return Err(Error::malformed("aggregate requires a pipeline array")),
            },
            Method::EstimatedCount => Operation::EstimatedCount,
        };
        Ok(op)
    }

    pub fn method(&self) -> Method {
        match self {
            Operation::Find { .. } => Method::Find,
            Operation::FindOne { .. } => Method::FindOne,
            Operation::Count { .. } => Method::Count,
            Operation::Distinct { .. } => Method::Distinct,
            Operation::Aggregate { .. } => Method::Aggregate,
            Operation::EstimatedCount => Method::EstimatedCount,
        }
    }
}

/// Relational passthrough statement pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlQuery {
    pub main_query: String,
    #[serde(default)]
    pub count_query: Option<String>,
}

/// Body of `POST /{token}/query`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqlRequest {
    pub query: SqlQuery,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlResult {
    pub rows: Vec<Record>,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ValidationError;
    use serde_json::json;

    #[test]
    fn test_paging_arithmetic() {
        let paging = Paging { page: 2, limit: 10 };
        assert_eq!(paging.skip(), 10);
        assert_eq!(paging.total_pages(25), 3);
        assert_eq!(paging.total_pages(20), 2);
        assert_eq!(paging.total_pages(0), 0);
    }

    #[test]
    fn test_paging_defaults() {
        let paging: Paging = serde_json::from_value(json!({})).unwrap();
        assert_eq!(paging, Paging::default());
        assert_eq!(paging.skip(), 0);
    }

    #[test]
    fn test_paging_validation() {
        assert!(Paging { page: 0, limit: 10 }.validate(100).is_err());
        assert!(Paging { page: 1, limit: 0 }.validate(100).is_err());
        assert!(Paging { page: 1, limit: 101 }.validate(100).is_err());
        assert!(Paging { page: 3, limit: 100 }.validate(100).is_ok());
    }

    #[test]
    fn test_request_requires_method_and_args_array() {
        assert!(QueryRequest::from_value(json!({"args": []})).is_err());
        assert!(QueryRequest::from_value(json!({"method": "find", "args": {}})).is_err());
        assert!(QueryRequest::from_value(json!({"method": "find"})).is_err());

        let req = QueryRequest::from_value(json!({
            "method": "find",
            "args": [{"age": {"$gt": 3}}],
            "hidden": ["password"],
            "paging": {"page": 2}
        }))
        .unwrap();
        assert!(req.is_find());
        assert_eq!(req.hidden, vec!["password"]);
        assert_eq!(req.paging, Some(Paging { page: 2, limit: 10 }));

        let find = req.find_query().unwrap();
        assert_eq!(find.skip, 10);
        assert_eq!(find.limit, Some(10));
        assert_eq!(find.filter, json!({"age": {"$gt": 3}}));
    }

    #[test]
    fn test_find_without_paging_uses_default_window() {
        let req = QueryRequest::from_value(json!({"method": "find", "args": [{}]})).unwrap();
        let find = req.find_query().unwrap();
        assert_eq!(find.filter, json!({}));
        assert_eq!(find.skip, 0);
        assert_eq!(find.limit, Some(DEFAULT_LIMIT));
    }

    #[test]
    fn test_operation_parse() {
        assert_eq!(
            Operation::parse("distinct", &[json!("city"), json!({"active": true})]).unwrap(),
            Operation::Distinct {
                field: "city".into(),
                filter: json!({"active": true})
            }
        );
        assert_eq!(
            Operation::parse("count", &[]).unwrap().method(),
            Method::Count
        );
        assert!(Operation::parse("aggregate", &[json!({})]).is_err());
    }

    #[test]
    fn test_unknown_method_is_unsupported() {
        match Operation::parse("dropDatabase", &[]) {
            Err(Error::Validation(ValidationError::UnsupportedMethod(m))) => {
                assert_eq!(m, "dropDatabase")
            }
            other => panic!("Expected unsupported method, got {:?}", other),
        }
    }

    #[test]
    fn test_sql_request_shape() {
        let req: SqlRequest = serde_json::from_value(json!({
            "query": {"mainQuery": "SELECT 1", "countQuery": "SELECT COUNT(*) FROM t"}
        }))
        .unwrap();
        assert_eq!(req.query.main_query, "SELECT 1");
        assert!(req.query.count_query.is_some());
    }
}
