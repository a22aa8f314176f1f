//! Traits item types implement to be filtered and sorted by collections.

use std::cmp::Ordering;

use crate::error::{CacheError, Result};
use crate::page::{SortOrder, SortSpec};

/// Free-text filtering as typed into a view's search box
pub trait Filterable {
    /// True when the item matches `filter`. An empty filter matches everything.
    fn matches_filter(&self, filter: &str) -> bool;
}

/// Sorting a slice of items given a [`SortSpec`]
pub trait Sortable: Sized {
    /// Field names accepted in a sort specification
    const SORT_FIELDS: &'static [&'static str];

    /// Compare two items on one named field
    fn compare_field(&self, other: &Self, field: &str) -> Ordering;

    fn sort_items(items: &mut [Self], spec: &SortSpec) -> Result<()> {
        sort_by_spec(items, spec, Self::SORT_FIELDS, |a, b, field| {
            a.compare_field(b, field)
        })
    }
}

/// Stable multi-key sort. Unknown fields are rejected before anything moves.
pub fn sort_by_spec<T>(
    items: &mut [T],
    spec: &SortSpec,
    known: &[&str],
    compare: impl Fn(&T, &T, &str) -> Ordering,
) -> Result<()> {
    if let Some(field) = spec.fields.iter().find(|f| !known.contains(&f.as_str())) {
        return Err(CacheError::sort_field(
            field.as_str(),
            format!("expected one of: {}", known.join(", ")),
        ));
    }
    if spec.is_empty() {
        return Ok(());
    }
    items.sort_by(|a, b| {
        for (field, order) in spec.keys() {
            let ordering = match order {
                SortOrder::Asc => compare(a, b, field),
                SortOrder::Desc => compare(a, b, field).reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

/// Case-insensitive substring match used by the `Filterable` impls
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    needle.is_empty() || haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        name: &'static str,
        size: u32,
    }

    impl Sortable for Row {
        const SORT_FIELDS: &'static [&'static str] = &["name", "size"];

        fn compare_field(&self, other: &Self, field: &str) -> Ordering {
            match field {
                "name" => self.name.cmp(other.name),
                "size" => self.size.cmp(&other.size),
                _ => Ordering::Equal,
            }
        }
    }

    fn rows() -> Vec<Row> {
        vec![
            Row { name: "b", size: 2 },
            Row { name: "a", size: 2 },
            Row { name: "c", size: 1 },
        ]
    }

    #[test]
    fn test_multi_key_sort() {
        let mut items = rows();
        let spec = SortSpec::by("size", SortOrder::Desc).then("name", SortOrder::Asc);
        Row::sort_items(&mut items, &spec).unwrap();
        let names: Vec<_> = items.iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_spec_keeps_order() {
        let mut items = rows();
        Row::sort_items(&mut items, &SortSpec::default()).unwrap();
        assert_eq!(items, rows());
    }

    #[test]
    fn test_unknown_field_rejected_without_reordering() {
        let mut items = rows();
        let err = Row::sort_items(&mut items, &SortSpec::by("color", SortOrder::Asc)).unwrap_err();
        assert!(matches!(err, CacheError::Sort { ref field, .. } if field == "color"));
        assert_eq!(items, rows());
    }

    #[test]
    fn test_contains_ignore_case() {
        assert!(contains_ignore_case("UniswapV2Router", "router"));
        assert!(contains_ignore_case("anything", ""));
        assert!(!contains_ignore_case("Tornado", "uniswap"));
    }
}
