use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Floor of the absolute price-filter domain. A lower bound at the floor is
/// treated as "unbounded below" and emits no predicate.
pub const PRICE_DOMAIN_MIN: Decimal = Decimal::ZERO;

/// Ceiling of the absolute price-filter domain. An upper bound at the ceiling
/// is treated as "unbounded above" and emits no predicate.
pub const PRICE_DOMAIN_MAX: Decimal = Decimal::from_parts(500, 0, 0, false, 0);

/// Default listing page size when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: i64 = 24;

/// Supported listing sort orders.
///
/// Tie-breaks are part of the contract: equal keys always fall back to
/// newest-id-first so pagination is stable across requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Minimum price ascending, then id descending.
    PriceAsc,
    /// Minimum price descending with null prices last, then id descending.
    PriceDesc,
    /// Maximum discount percentage descending with nulls last, then newest
    /// first by creation timestamp, then id descending.
    #[default]
    DiscountDesc,
}

impl SortOrder {
    /// Parse a caller-supplied sort token. Missing or unrecognized values
    /// fall back to [`SortOrder::DiscountDesc`].
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("price_asc") => Self::PriceAsc,
            Some("price_desc") => Self::PriceDesc,
            _ => Self::DiscountDesc,
        }
    }
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortOrder::PriceAsc => write!(f, "price_asc"),
            SortOrder::PriceDesc => write!(f, "price_desc"),
            SortOrder::DiscountDesc => write!(f, "discount_desc"),
        }
    }
}

/// Filter, sort, and pagination input for one listing query.
///
/// Every collection field means "no restriction" when empty; `query` means
/// "no restriction" when `None` or blank. Price bounds are interpreted
/// against the `[PRICE_DOMAIN_MIN, PRICE_DOMAIN_MAX]` domain: a bound sitting
/// on its domain edge is unbounded on that side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCriteria {
    pub shop_ids: Vec<i64>,
    pub size_groups: Vec<String>,
    pub product_types: Vec<String>,
    pub categories: Vec<String>,
    pub genders: Vec<String>,
    pub on_sale_only: bool,
    pub query: Option<String>,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub sort: SortOrder,
    pub offset: i64,
    pub limit: i64,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            shop_ids: Vec::new(),
            size_groups: Vec::new(),
            product_types: Vec::new(),
            categories: Vec::new(),
            genders: Vec::new(),
            on_sale_only: false,
            query: None,
            min_price: PRICE_DOMAIN_MIN,
            max_price: PRICE_DOMAIN_MAX,
            sort: SortOrder::DiscountDesc,
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl FilterCriteria {
    /// Price bounds clamped into the absolute domain, in `(min, max)` order.
    #[must_use]
    pub fn clamped_price_range(&self) -> (Decimal, Decimal) {
        (
            self.min_price.clamp(PRICE_DOMAIN_MIN, PRICE_DOMAIN_MAX),
            self.max_price.clamp(PRICE_DOMAIN_MIN, PRICE_DOMAIN_MAX),
        )
    }
}

/// Parse caller-supplied shop identifier strings into a shop-id filter set.
///
/// Entries that do not parse as a strictly positive integer are silently
/// dropped; duplicates are collapsed, first occurrence wins.
#[must_use]
pub fn parse_shop_ids<S: AsRef<str>>(raw: &[S]) -> Vec<i64> {
    let mut seen = HashSet::new();
    raw.iter()
        .filter_map(|s| s.as_ref().trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Trim label values, dropping blanks and duplicates (first occurrence wins).
#[must_use]
pub fn normalize_labels<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .map(|s| s.as_ref().trim().to_owned())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_shop_ids_drops_non_numeric_and_non_positive() {
        let raw = ["3", "abc", "-1", "7"];
        assert_eq!(parse_shop_ids(&raw), vec![3, 7]);
    }

    #[test]
    fn parse_shop_ids_drops_zero_and_dedupes() {
        let raw = ["0", "5", "5", " 5 ", "12"];
        assert_eq!(parse_shop_ids(&raw), vec![5, 12]);
    }

    #[test]
    fn parse_shop_ids_empty_input_yields_empty_set() {
        let raw: [&str; 0] = [];
        assert!(parse_shop_ids(&raw).is_empty());
    }

    #[test]
    fn normalize_labels_trims_and_drops_blanks() {
        let raw = [" S ", "", "   ", "M", "S"];
        assert_eq!(normalize_labels(&raw), vec!["S".to_string(), "M".to_string()]);
    }

    #[test]
    fn sort_order_parse_recognizes_all_tokens() {
        assert_eq!(SortOrder::parse(Some("price_asc")), SortOrder::PriceAsc);
        assert_eq!(SortOrder::parse(Some("price_desc")), SortOrder::PriceDesc);
        assert_eq!(
            SortOrder::parse(Some("discount_desc")),
            SortOrder::DiscountDesc
        );
    }

    #[test]
    fn sort_order_parse_defaults_on_unknown_or_missing() {
        assert_eq!(SortOrder::parse(Some("cheapest")), SortOrder::DiscountDesc);
        assert_eq!(SortOrder::parse(None), SortOrder::DiscountDesc);
    }

    #[test]
    fn default_criteria_is_fully_unrestricted() {
        let criteria = FilterCriteria::default();
        assert!(criteria.shop_ids.is_empty());
        assert!(criteria.size_groups.is_empty());
        assert!(criteria.product_types.is_empty());
        assert!(criteria.categories.is_empty());
        assert!(criteria.genders.is_empty());
        assert!(!criteria.on_sale_only);
        assert!(criteria.query.is_none());
        assert_eq!(criteria.min_price, PRICE_DOMAIN_MIN);
        assert_eq!(criteria.max_price, PRICE_DOMAIN_MAX);
        assert_eq!(criteria.sort, SortOrder::DiscountDesc);
    }

    #[test]
    fn clamped_price_range_clips_out_of_domain_bounds() {
        let criteria = FilterCriteria {
            min_price: Decimal::from_parts(25, 0, 0, true, 0),
            max_price: Decimal::from_parts(9000, 0, 0, false, 0),
            ..FilterCriteria::default()
        };
        let (min, max) = criteria.clamped_price_range();
        assert_eq!(min, PRICE_DOMAIN_MIN);
        assert_eq!(max, PRICE_DOMAIN_MAX);
    }
}
