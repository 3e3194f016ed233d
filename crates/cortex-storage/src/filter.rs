//! The `{field: value | {$in|$gt|$lt|...}}` filter grammar (spec §6.1).

use std::collections::HashMap;

use serde_json::Value;

/// A single field's matching rule.
#[derive(Debug, Clone)]
pub enum FilterValue {
    Eq(Value),
    Ne(Value),
    In(Vec<Value>),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
}

/// A conjunction of per-field rules. All rules must match (AND semantics);
/// the empty filter matches every document.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    fields: HashMap<String, FilterValue>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), FilterValue::Eq(value.into()));
        self
    }

    pub fn ne(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), FilterValue::Ne(value.into()));
        self
    }

    pub fn in_(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.fields.insert(field.into(), FilterValue::In(values));
        self
    }

    pub fn gt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), FilterValue::Gt(value.into()));
        self
    }

    pub fn gte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), FilterValue::Gte(value.into()));
        self
    }

    pub fn lt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), FilterValue::Lt(value.into()));
        self
    }

    pub fn lte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), FilterValue::Lte(value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.fields.iter()
    }

    /// In-process evaluation, shared by the in-memory backend and by tests
    /// that don't want to stand up SurrealDB.
    pub fn matches(&self, doc: &Value) -> bool {
        self.fields.iter().all(|(field, rule)| {
            let actual = doc.get(field);
            match rule {
                FilterValue::Eq(v) => actual == Some(v),
                FilterValue::Ne(v) => actual != Some(v),
                FilterValue::In(values) => actual.is_some_and(|a| values.contains(a)),
                FilterValue::Gt(v) => compare(actual, v).is_some_and(|o| o.is_gt()),
                FilterValue::Gte(v) => compare(actual, v).is_some_and(|o| o.is_ge()),
                FilterValue::Lt(v) => compare(actual, v).is_some_and(|o| o.is_lt()),
                FilterValue::Lte(v) => compare(actual, v).is_some_and(|o| o.is_le()),
            }
        })
    }
}

fn compare(actual: Option<&Value>, expected: &Value) -> Option<std::cmp::Ordering> {
    let actual = actual?;
    if let (Some(a), Some(b)) = (actual.as_f64(), expected.as_f64()) {
        return a.partial_cmp(&b);
    }
    if let (Some(a), Some(b)) = (actual.as_str(), expected.as_str()) {
        return Some(a.cmp(b));
    }
    None
}

/// An ordering over one field, optionally chained with a tie-breaker.
/// Pagination (spec §4.1) needs `createdAt DESC, id DESC` so that rows
/// sharing a `createdAt` still get a total order — without a tie-breaker,
/// concatenated pages over ties can drop or duplicate rows.
#[derive(Debug, Clone)]
pub struct Sort {
    pub field: String,
    pub descending: bool,
    pub then_by: Option<Box<Sort>>,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), descending: false, then_by: None }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), descending: true, then_by: None }
    }

    /// Appends a secondary ordering applied when `self.field` ties.
    pub fn then(mut self, next: Sort) -> Self {
        self.then_by = Some(Box::new(next));
        self
    }
}

#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub field: String,
    pub unique: bool,
}

impl IndexSpec {
    pub fn new(field: impl Into<String>, unique: bool) -> Self {
        Self { field: field.into(), unique }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eq_and_in_match_as_expected() {
        let doc = json!({"status": "pending", "priority": 3});
        let f = Filter::new().eq("status", "pending");
        assert!(f.matches(&doc));

        let f = Filter::new().in_("priority", vec![json!(1), json!(3)]);
        assert!(f.matches(&doc));

        let f = Filter::new().eq("status", "completed");
        assert!(!f.matches(&doc));
    }

    #[test]
    fn comparisons_use_numeric_ordering() {
        let doc = json!({"age_days": 5});
        assert!(Filter::new().gt("age_days", 3).matches(&doc));
        assert!(!Filter::new().gt("age_days", 10).matches(&doc));
        assert!(Filter::new().lte("age_days", 5).matches(&doc));
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::new().matches(&json!({"a": 1})));
    }
}
