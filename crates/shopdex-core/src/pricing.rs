use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One variant price observation for a product.
///
/// `product_id` is the canonical string form of the product identifier; the
/// storage layer converts to and from its native key type at the boundary so
/// nothing downstream re-parses identifiers or price text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantPrice {
    pub product_id: String,
    pub price: Decimal,
    /// Pre-sale comparison price paired with `price`, if the shop sets one.
    pub compare_at_price: Option<Decimal>,
}

/// One currently-valid promotional offer price for a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferPrice {
    pub product_id: String,
    pub price: Decimal,
}

/// Resolved pricing for one product.
///
/// `variant_price` is the lowest variant price found with its paired
/// `compare_at_price`; `offer_price` is the lowest currently-valid offer
/// price, selected independently. The all-`None` value is the degraded
/// "no pricing available" result.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductPricing {
    pub variant_price: Option<Decimal>,
    pub compare_at_price: Option<Decimal>,
    pub offer_price: Option<Decimal>,
}

impl ProductPricing {
    /// The degraded all-`None` result used when a product has no price rows
    /// or the bulk lookup failed.
    #[must_use]
    pub const fn unavailable() -> Self {
        Self {
            variant_price: None,
            compare_at_price: None,
            offer_price: None,
        }
    }

    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        self.variant_price.is_none()
            && self.compare_at_price.is_none()
            && self.offer_price.is_none()
    }
}

/// Fold bulk price rows into per-product [`ProductPricing`] results.
///
/// For each product the minimum variant price wins and carries its own
/// `compare_at_price` along; ties keep the first row seen. The minimum offer
/// price is selected independently of the variant price. Products absent from
/// both row sets are absent from the returned map.
#[must_use]
pub fn resolve_pricing_rows(
    variants: &[VariantPrice],
    offers: &[OfferPrice],
) -> HashMap<String, ProductPricing> {
    let mut resolved: HashMap<String, ProductPricing> = HashMap::new();

    for row in variants {
        let entry = resolved.entry(row.product_id.clone()).or_default();
        let lower = entry
            .variant_price
            .is_none_or(|current| row.price < current);
        if lower {
            entry.variant_price = Some(row.price);
            entry.compare_at_price = row.compare_at_price;
        }
    }

    for row in offers {
        let entry = resolved.entry(row.product_id.clone()).or_default();
        let lower = entry.offer_price.is_none_or(|current| row.price < current);
        if lower {
            entry.offer_price = Some(row.price);
        }
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(value: i64) -> Decimal {
        Decimal::new(value, 2)
    }

    #[test]
    fn lowest_variant_price_wins_and_carries_its_compare_at() {
        let variants = vec![
            VariantPrice {
                product_id: "7".into(),
                price: dec(12_99),
                compare_at_price: Some(dec(15_00)),
            },
            VariantPrice {
                product_id: "7".into(),
                price: dec(9_99),
                compare_at_price: None,
            },
        ];
        let resolved = resolve_pricing_rows(&variants, &[]);
        let pricing = &resolved["7"];
        assert_eq!(pricing.variant_price, Some(dec(9_99)));
        assert_eq!(pricing.compare_at_price, None);
        assert_eq!(pricing.offer_price, None);
    }

    #[test]
    fn offer_price_is_selected_independently_of_variant_price() {
        let variants = vec![VariantPrice {
            product_id: "7".into(),
            price: dec(9_99),
            compare_at_price: None,
        }];
        let offers = vec![
            OfferPrice {
                product_id: "7".into(),
                price: dec(8_49),
            },
            OfferPrice {
                product_id: "7".into(),
                price: dec(11_00),
            },
        ];
        let resolved = resolve_pricing_rows(&variants, &offers);
        let pricing = &resolved["7"];
        assert_eq!(pricing.variant_price, Some(dec(9_99)));
        assert_eq!(pricing.offer_price, Some(dec(8_49)));
    }

    #[test]
    fn offer_only_product_has_null_variant_pricing() {
        let offers = vec![OfferPrice {
            product_id: "3".into(),
            price: dec(4_00),
        }];
        let resolved = resolve_pricing_rows(&[], &offers);
        let pricing = &resolved["3"];
        assert_eq!(pricing.variant_price, None);
        assert_eq!(pricing.compare_at_price, None);
        assert_eq!(pricing.offer_price, Some(dec(4_00)));
    }

    #[test]
    fn products_without_rows_are_absent() {
        let resolved = resolve_pricing_rows(&[], &[]);
        assert!(resolved.is_empty());
    }

    #[test]
    fn unavailable_is_all_none() {
        let pricing = ProductPricing::unavailable();
        assert!(pricing.is_unavailable());
        let json = serde_json::to_value(&pricing).expect("serialize");
        assert!(json["variant_price"].is_null());
        assert!(json["compare_at_price"].is_null());
        assert!(json["offer_price"].is_null());
    }

    #[test]
    fn prices_serialize_as_strings() {
        let pricing = ProductPricing {
            variant_price: Some(dec(12_99)),
            compare_at_price: Some(dec(15_00)),
            offer_price: None,
        };
        let json = serde_json::to_value(&pricing).expect("serialize");
        assert_eq!(json["variant_price"], "12.99");
        assert_eq!(json["compare_at_price"], "15.00");
    }
}
