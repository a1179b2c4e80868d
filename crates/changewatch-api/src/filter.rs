//! Record predicates used by count/find queries.
//!
//! Filters render to the JSON query form used in diagnostics, e.g.
//! `Filter::All` is `{}` and `Filter::In("tag", ..)` is `{"tag":{"$in":[..]}}`.

use crate::{Record, Value};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Filter {
    /// Matches every record (`{}`)
    #[default]
    All,
    Eq(String, Value),
    Ne(String, Value),
    In(String, Vec<Value>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    IsNull(String),
    IsNotNull(String),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Filter::Eq(crate::ID_FIELD.to_string(), Value::String(id.into()))
    }

    /// Check whether a record satisfies this filter.
    ///
    /// A missing field behaves like `Value::Null`.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(name, value) => field_value(record, name) == value,
            Filter::Ne(name, value) => field_value(record, name) != value,
            Filter::In(name, values) => values.contains(field_value(record, name)),
            Filter::And(filters) => filters.iter().all(|f| f.matches(record)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(record)),
            Filter::IsNull(name) => field_value(record, name).is_null(),
            Filter::IsNotNull(name) => !field_value(record, name).is_null(),
        }
    }

    /// Render the filter as a JSON query document.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{json, Map, Value as Json};

        let single = |name: &str, value: Json| {
            let mut map = Map::new();
            map.insert(name.to_string(), value);
            Json::Object(map)
        };

        match self {
            Filter::All => Json::Object(Map::new()),
            Filter::Eq(name, value) => single(name, value.to_json_value()),
            Filter::Ne(name, value) => single(name, json!({ "$ne": value.to_json_value() })),
            Filter::In(name, values) => {
                let values: Vec<Json> = values.iter().map(Value::to_json_value).collect();
                single(name, json!({ "$in": values }))
            }
            Filter::And(filters) => {
                json!({ "$and": filters.iter().map(Filter::to_json).collect::<Vec<_>>() })
            }
            Filter::Or(filters) => {
                json!({ "$or": filters.iter().map(Filter::to_json).collect::<Vec<_>>() })
            }
            Filter::IsNull(name) => single(name, Json::Null),
            Filter::IsNotNull(name) => single(name, json!({ "$ne": null })),
        }
    }
}

static NULL: Value = Value::Null;

fn field_value<'a>(record: &'a Record, name: &str) -> &'a Value {
    record.get(name).unwrap_or(&NULL)
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
