//! Per-resource list filters and orderable fields.
//!
//! Each resource declares which query parameters filter its listings and
//! how. Persistence adapters compile these declarations; `matches` and
//! `compare` are the reference semantics used by the in-memory adapter.

use std::cmp::Ordering;

use serde_json::Value;

use crate::application::repos::{ListQuery, OrderField};
use crate::domain::types::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Case-insensitive substring match against any of the listed string fields.
    Contains(&'static [&'static str]),
    /// Comma-separated list; every value must appear as `key` of some object
    /// in the `array` field.
    AllNames {
        array: &'static str,
        key: &'static str,
    },
    /// Like `AllNames`, but values are integer ids. A value that is not an
    /// integer matches nothing.
    AllIds {
        array: &'static str,
        key: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterParam {
    pub name: &'static str,
    pub kind: FilterKind,
}

const NAME_KEYWORD: &[FilterParam] = &[FilterParam {
    name: "kw",
    kind: FilterKind::Contains(&["name"]),
}];

const BLOG_FILTERS: &[FilterParam] = &[
    FilterParam {
        name: "kw",
        kind: FilterKind::Contains(&["title", "content", "description"]),
    },
    FilterParam {
        name: "skills",
        kind: FilterKind::AllNames {
            array: "skills",
            key: "name",
        },
    },
    FilterParam {
        name: "skill_ids",
        kind: FilterKind::AllIds {
            array: "skills",
            key: "id",
        },
    },
];

const EXPERIENCE_FILTERS: &[FilterParam] = &[FilterParam {
    name: "kw",
    kind: FilterKind::Contains(&["company_name", "job_title", "description"]),
}];

const PROJECT_FILTERS: &[FilterParam] = &[FilterParam {
    name: "search",
    kind: FilterKind::Contains(&["name", "descriptions"]),
}];

const FILE_FILTERS: &[FilterParam] = &[FilterParam {
    name: "kw",
    kind: FilterKind::Contains(&["public_id"]),
}];

pub fn filter_params(resource: Resource) -> &'static [FilterParam] {
    match resource {
        Resource::Skills | Resource::Links => NAME_KEYWORD,
        Resource::Blogs => BLOG_FILTERS,
        Resource::Experiences => EXPERIENCE_FILTERS,
        Resource::Projects => PROJECT_FILTERS,
        Resource::Files => FILE_FILTERS,
        Resource::Contacts | Resource::Settings => &[],
    }
}

pub fn filter_param(resource: Resource, name: &str) -> Option<&'static FilterParam> {
    filter_params(resource)
        .iter()
        .find(|param| param.name == name)
}

/// Fields accepted by the `ordering` parameter. `id` is always first.
pub fn orderable_fields(resource: Resource) -> &'static [&'static str] {
    match resource {
        Resource::Blogs => &["id", "title"],
        Resource::Skills | Resource::Links | Resource::Projects => &["id", "name"],
        Resource::Experiences => &["id", "company_name", "join_date", "leave_date"],
        Resource::Files => &["id", "public_id", "uploaded_at"],
        Resource::Contacts => &["id", "created_at", "status"],
        Resource::Settings => &["id"],
    }
}

/// Splits a comma-separated filter value, dropping empty segments.
pub fn split_list(value: &str) -> Vec<&str> {
    value
        .split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Parses every segment of an id list; `None` if any segment is not an integer.
pub fn parse_ids(value: &str) -> Option<Vec<i64>> {
    split_list(value)
        .into_iter()
        .map(|segment| segment.parse::<i64>().ok())
        .collect()
}

/// Whether `document` satisfies every filter of `query`. Unknown filter
/// names are ignored.
pub fn matches(resource: Resource, document: &Value, query: &ListQuery) -> bool {
    query.filters.iter().all(|(name, value)| {
        match filter_param(resource, name) {
            Some(param) => matches_param(param, document, value),
            None => true,
        }
    })
}

fn matches_param(param: &FilterParam, document: &Value, value: &str) -> bool {
    match param.kind {
        FilterKind::Contains(fields) => {
            let needle = value.to_lowercase();
            fields.iter().any(|field| {
                document
                    .get(*field)
                    .and_then(Value::as_str)
                    .is_some_and(|text| text.to_lowercase().contains(&needle))
            })
        }
        FilterKind::AllNames { array, key } => {
            let wanted = split_list(value);
            let entries = array_entries(document, array);
            wanted.iter().all(|name| {
                entries
                    .iter()
                    .any(|entry| entry.get(key).and_then(Value::as_str) == Some(*name))
            })
        }
        FilterKind::AllIds { array, key } => {
            let Some(wanted) = parse_ids(value) else {
                return false;
            };
            let entries = array_entries(document, array);
            wanted.iter().all(|id| {
                entries
                    .iter()
                    .any(|entry| entry.get(key).and_then(Value::as_i64) == Some(*id))
            })
        }
    }
}

fn array_entries<'a>(document: &'a Value, array: &str) -> &'a [Value] {
    document
        .get(array)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Compares two documents by `ordering`, falling back to `id` for ties.
pub fn compare(left: &Value, right: &Value, ordering: &[OrderField]) -> Ordering {
    for order in ordering {
        let ord = compare_values(left.get(&order.field), right.get(&order.field));
        let ord = if order.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    compare_values(left.get("id"), right.get("id"))
}

fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => a
                .as_f64()
                .unwrap_or_default()
                .total_cmp(&b.as_f64().unwrap_or_default()),
        },
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), Some(_)) => Ordering::Less,
        (Some(_), None | Some(Value::Null)) => Ordering::Greater,
        (Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
    }
}
