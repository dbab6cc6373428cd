//! Page-number pagination and list request parsing.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::application::filters::{filter_params, orderable_fields};
use crate::application::repos::{ListQuery, OrderField};
use crate::domain::types::Resource;

pub const PAGE_PARAM: &str = "page";
pub const PAGE_SIZE_PARAM: &str = "pageSize";
pub const NO_PAGINATION_PARAM: &str = "noPagination";
pub const ORDERING_PARAM: &str = "ordering";

const FALLBACK_PAGE_SIZE: u64 = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaginationError {
    #[error("invalid page `{0}`: expected a positive integer")]
    InvalidPage(String),
    #[error("cannot order {resource} by `{field}`")]
    InvalidOrdering {
        resource: &'static str,
        field: String,
    },
}

/// Rows per page when the request does not say otherwise.
pub fn default_page_size(resource: Resource) -> u64 {
    match resource {
        Resource::Blogs | Resource::Experiences | Resource::Skills => 10,
        Resource::Projects => 5,
        Resource::Links => 1,
        Resource::Files | Resource::Contacts | Resource::Settings => FALLBACK_PAGE_SIZE,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paging {
    Unpaginated,
    Page { page: u64, page_size: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub query: ListQuery,
    pub paging: Paging,
}

impl ListRequest {
    /// Parses list query parameters for `resource`.
    ///
    /// `pageSize` values that are not positive integers fall back to the
    /// resource default; values above `max_page_size` are clamped.
    pub fn from_params(
        resource: Resource,
        params: &HashMap<String, String>,
        max_page_size: u64,
    ) -> Result<Self, PaginationError> {
        let query = ListQuery {
            filters: parse_filters(resource, params),
            ordering: parse_ordering(resource, params.get(ORDERING_PARAM).map(String::as_str))?,
        };

        let unpaginated = params
            .get(NO_PAGINATION_PARAM)
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"));
        if unpaginated {
            return Ok(Self {
                query,
                paging: Paging::Unpaginated,
            });
        }

        let page = match params.get(PAGE_PARAM).map(|value| value.trim()) {
            None | Some("") => 1,
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|page| *page > 0)
                .ok_or_else(|| PaginationError::InvalidPage(raw.to_string()))?,
        };

        let page_size = params
            .get(PAGE_SIZE_PARAM)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|size| *size > 0)
            .map(|size| size.min(max_page_size.max(1)))
            .unwrap_or_else(|| default_page_size(resource));

        Ok(Self {
            query,
            paging: Paging::Page { page, page_size },
        })
    }
}

fn parse_filters(resource: Resource, params: &HashMap<String, String>) -> BTreeMap<String, String> {
    filter_params(resource)
        .iter()
        .filter_map(|param| {
            let value = params.get(param.name)?.trim();
            (!value.is_empty()).then(|| (param.name.to_string(), value.to_string()))
        })
        .collect()
}

fn parse_ordering(
    resource: Resource,
    raw: Option<&str>,
) -> Result<Vec<OrderField>, PaginationError> {
    let allowed = orderable_fields(resource);
    let mut ordering = Vec::new();

    for term in raw.unwrap_or_default().split(',').map(str::trim) {
        if term.is_empty() {
            continue;
        }
        let (field, descending) = match term.strip_prefix('-') {
            Some(field) => (field, true),
            None => (term, false),
        };
        if !allowed.contains(&field) {
            return Err(PaginationError::InvalidOrdering {
                resource: resource.as_str(),
                field: field.to_string(),
            });
        }
        ordering.push(OrderField {
            field: field.to_string(),
            descending,
        });
    }

    if ordering.is_empty() {
        ordering.push(OrderField::ascending("id"));
    }
    Ok(ordering)
}
