//! Client-side filtering and pagination.
//!
//! Filters the server applies itself are skipped here; everything else
//! (text search over the resource's search fields, categorical filters
//! such as department or category) is applied to the fetched rows.

use fieldops_interchange::{Record, ResourceSpec};

use crate::query::Filters;

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Whether `record` passes every filter the server did not apply.
pub fn matches(spec: &ResourceSpec, filters: &Filters, record: &Record) -> bool {
    filters.iter().all(|(name, value)| {
        if spec.is_server_filter(name) {
            return true;
        }
        let needle = value.to_lowercase();
        if name == "search" {
            return spec.search_fields.iter().any(|field| {
                record
                    .display_field(field)
                    .is_some_and(|v| contains_ci(&v, &needle))
            });
        }
        record
            .display_field(name)
            .is_some_and(|v| v.to_lowercase() == needle)
    })
}

/// Apply the client-side part of `filters`, preserving order.
pub fn apply_local(spec: &ResourceSpec, filters: &Filters, records: Vec<Record>) -> Vec<Record> {
    if filters.iter().all(|(name, _)| spec.is_server_filter(name)) {
        return records;
    }
    records
        .into_iter()
        .filter(|r| matches(spec, filters, r))
        .collect()
}

/// Number of pages needed for `len` rows. Zero rows is zero pages.
pub fn page_count(len: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return usize::from(len > 0);
    }
    len.div_ceil(page_size)
}

/// Rows of page `index` (zero-based). A page size of zero means one page.
pub fn page(records: &[Record], page_size: usize, index: usize) -> &[Record] {
    if page_size == 0 {
        return if index == 0 { records } else { &[] };
    }
    let start = index.saturating_mul(page_size).min(records.len());
    let end = start.saturating_add(page_size).min(records.len());
    &records[start..end]
}
