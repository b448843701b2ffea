//! Batched pricing lookups.
//!
//! Product cards request pricing independently, so a page render can issue
//! dozens of near-simultaneous lookups. The aggregator coalesces every
//! request arriving within one short window into a single bulk store query,
//! fans the per-product results back to all waiters, and caches each result
//! for the lifetime of the process. Catalog prices are low-churn within a
//! browsing session, so there is no TTL and no eviction.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use tokio::sync::{oneshot, Mutex};

use shopdex_core::pricing::{resolve_pricing_rows, OfferPrice, ProductPricing, VariantPrice};
use shopdex_db::DbError;

/// Bulk price lookups consumed by the aggregator.
///
/// Injected rather than reached for globally so tests run against a mock and
/// independent aggregators (with independent caches) can coexist.
#[async_trait]
pub trait PricingStore: Send + Sync {
    async fn variant_prices(&self, product_ids: &[String])
        -> Result<Vec<VariantPrice>, DbError>;

    async fn active_offers(
        &self,
        product_ids: &[String],
        as_of: NaiveDate,
    ) -> Result<Vec<OfferPrice>, DbError>;
}

/// Postgres-backed [`PricingStore`].
///
/// Product identifiers travel as canonical strings; this boundary converts
/// to the store's numeric keys. Identifiers that do not parse never reach
/// the store and therefore resolve to unavailable pricing.
pub struct PgPricingStore {
    pool: PgPool,
}

impl PgPricingStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PricingStore for PgPricingStore {
    async fn variant_prices(
        &self,
        product_ids: &[String],
    ) -> Result<Vec<VariantPrice>, DbError> {
        let numeric_ids = numeric_ids(product_ids);
        let rows = shopdex_db::variant_prices_for_products(&self.pool, &numeric_ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| VariantPrice {
                product_id: row.product_id.to_string(),
                price: row.price,
                compare_at_price: row.compare_at_price,
            })
            .collect())
    }

    async fn active_offers(
        &self,
        product_ids: &[String],
        as_of: NaiveDate,
    ) -> Result<Vec<OfferPrice>, DbError> {
        let numeric_ids = numeric_ids(product_ids);
        let rows =
            shopdex_db::active_offers_for_products(&self.pool, &numeric_ids, as_of).await?;
        Ok(rows
            .into_iter()
            .map(|row| OfferPrice {
                product_id: row.product_id.to_string(),
                price: row.price,
            })
            .collect())
    }
}

fn numeric_ids(product_ids: &[String]) -> Vec<i64> {
    product_ids
        .iter()
        .filter_map(|id| id.parse::<i64>().ok())
        .collect()
}

#[derive(Default)]
struct AggregatorState {
    /// Product ids awaiting the next flush.
    pending: HashSet<String>,
    /// Waiters per product id, notified exactly once at resolution.
    waiters: HashMap<String, Vec<oneshot::Sender<ProductPricing>>>,
    /// Process-lifetime result cache. No TTL, no eviction.
    cache: HashMap<String, ProductPricing>,
    /// At most one coalescing timer is outstanding at any time.
    flush_scheduled: bool,
}

/// Coalesces concurrent per-product pricing requests into bulk store lookups.
///
/// All state sits behind one async mutex: the runtime is multi-threaded, so
/// the "schedule a flush only if none is scheduled" check-then-act and every
/// pending/waiter/cache mutation must not interleave.
#[derive(Clone)]
pub struct PriceAggregator {
    inner: Arc<AggregatorInner>,
}

struct AggregatorInner {
    store: Arc<dyn PricingStore>,
    coalesce_window: Duration,
    state: Mutex<AggregatorState>,
}

impl PriceAggregator {
    #[must_use]
    pub fn new(store: Arc<dyn PricingStore>, coalesce_window: Duration) -> Self {
        Self {
            inner: Arc::new(AggregatorInner {
                store,
                coalesce_window,
                state: Mutex::new(AggregatorState::default()),
            }),
        }
    }

    /// Resolve pricing for one product.
    ///
    /// Cached products resolve immediately without store access. Otherwise
    /// the caller joins the current coalescing window and is woken when the
    /// batched lookup completes. Store failures never surface here: the
    /// whole affected batch degrades to [`ProductPricing::unavailable`].
    ///
    /// Dropping the returned future abandons the wait; the product stays in
    /// the pending batch and its result is still fetched and cached.
    pub async fn pricing_for(&self, product_id: &str) -> ProductPricing {
        let id = product_id.trim().to_string();

        let rx = {
            let mut state = self.inner.state.lock().await;

            if let Some(cached) = state.cache.get(&id) {
                return cached.clone();
            }

            let (tx, rx) = oneshot::channel();
            state.waiters.entry(id.clone()).or_default().push(tx);
            // Insert before the schedule check: an already-scheduled flush
            // drains the whole pending set, so this id is covered either way.
            state.pending.insert(id);

            if !state.flush_scheduled {
                state.flush_scheduled = true;
                let aggregator = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(aggregator.inner.coalesce_window).await;
                    aggregator.flush().await;
                });
            }

            rx
        };

        // A closed channel means the aggregator dropped mid-resolution
        // (process shutdown); degrade the same way a store failure would.
        rx.await.unwrap_or_else(|_| ProductPricing::unavailable())
    }

    async fn flush(&self) {
        let snapshot: Vec<String> = {
            let mut state = self.inner.state.lock().await;
            state.flush_scheduled = false;
            state.pending.drain().collect()
        };

        if snapshot.is_empty() {
            return;
        }

        let resolved = self.query_batch(&snapshot).await;

        let mut state = self.inner.state.lock().await;
        for id in &snapshot {
            let pricing = resolved
                .get(id)
                .cloned()
                .unwrap_or_else(ProductPricing::unavailable);
            state.cache.insert(id.clone(), pricing.clone());

            if let Some(waiters) = state.waiters.remove(id) {
                for tx in waiters {
                    // A dropped receiver is a caller that stopped waiting.
                    let _ = tx.send(pricing.clone());
                }
            }
        }
    }

    /// One logical bulk lookup for the whole snapshot. If either underlying
    /// query fails the entire snapshot resolves to unavailable pricing; the
    /// error is logged, never propagated to pricing callers.
    async fn query_batch(&self, snapshot: &[String]) -> HashMap<String, ProductPricing> {
        let as_of = Utc::now().date_naive();

        let variants = match self.inner.store.variant_prices(snapshot).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    batch_size = snapshot.len(),
                    "bulk variant price lookup failed; degrading batch to unavailable pricing"
                );
                return HashMap::new();
            }
        };

        let offers = match self.inner.store.active_offers(snapshot, as_of).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    batch_size = snapshot.len(),
                    "bulk offer lookup failed; degrading batch to unavailable pricing"
                );
                return HashMap::new();
            }
        };

        resolve_pricing_rows(&variants, &offers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::sync::Mutex as StdMutex;

    fn dec(value: i64) -> Decimal {
        Decimal::new(value, 2)
    }

    #[derive(Default)]
    struct MockStore {
        variants: Vec<VariantPrice>,
        offers: Vec<OfferPrice>,
        fail: bool,
        variant_calls: StdMutex<Vec<Vec<String>>>,
        offer_calls: StdMutex<Vec<Vec<String>>>,
    }

    impl MockStore {
        fn with_variant(mut self, product_id: &str, price: Decimal, compare_at: Option<Decimal>) -> Self {
            self.variants.push(VariantPrice {
                product_id: product_id.to_string(),
                price,
                compare_at_price: compare_at,
            });
            self
        }

        fn with_offer(mut self, product_id: &str, price: Decimal) -> Self {
            self.offers.push(OfferPrice {
                product_id: product_id.to_string(),
                price,
            });
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn variant_calls(&self) -> Vec<Vec<String>> {
            self.variant_calls.lock().unwrap().clone()
        }

        fn offer_calls(&self) -> Vec<Vec<String>> {
            self.offer_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PricingStore for MockStore {
        async fn variant_prices(
            &self,
            product_ids: &[String],
        ) -> Result<Vec<VariantPrice>, DbError> {
            let mut ids = product_ids.to_vec();
            ids.sort();
            self.variant_calls.lock().unwrap().push(ids);
            if self.fail {
                return Err(DbError::QueryFailed(sqlx::Error::PoolClosed));
            }
            Ok(self
                .variants
                .iter()
                .filter(|v| product_ids.contains(&v.product_id))
                .cloned()
                .collect())
        }

        async fn active_offers(
            &self,
            product_ids: &[String],
            _as_of: NaiveDate,
        ) -> Result<Vec<OfferPrice>, DbError> {
            let mut ids = product_ids.to_vec();
            ids.sort();
            self.offer_calls.lock().unwrap().push(ids);
            Ok(self
                .offers
                .iter()
                .filter(|o| product_ids.contains(&o.product_id))
                .cloned()
                .collect())
        }
    }

    fn aggregator(store: Arc<MockStore>) -> PriceAggregator {
        PriceAggregator::new(store, Duration::from_millis(50))
    }

    #[tokio::test(start_paused = true)]
    async fn coalesces_duplicate_requests_into_one_bulk_call() {
        let store = Arc::new(MockStore::default().with_variant("42", dec(19_99), None));
        let agg = aggregator(Arc::clone(&store));

        let (a, b) = tokio::join!(agg.pricing_for("42"), agg.pricing_for("42"));

        assert_eq!(a, b);
        assert_eq!(a.variant_price, Some(dec(19_99)));
        assert_eq!(store.variant_calls(), vec![vec!["42".to_string()]]);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_products_share_one_flush() {
        let store = Arc::new(
            MockStore::default()
                .with_variant("1", dec(5_00), None)
                .with_variant("2", dec(7_00), None),
        );
        let agg = aggregator(Arc::clone(&store));

        let (a, b) = tokio::join!(agg.pricing_for("1"), agg.pricing_for("2"));

        assert_eq!(a.variant_price, Some(dec(5_00)));
        assert_eq!(b.variant_price, Some(dec(7_00)));
        assert_eq!(
            store.variant_calls(),
            vec![vec!["1".to_string(), "2".to_string()]]
        );
        assert_eq!(
            store.offer_calls(),
            vec![vec!["1".to_string(), "2".to_string()]]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_product_resolves_to_unavailable_and_is_cached() {
        let store = Arc::new(MockStore::default());
        let agg = aggregator(Arc::clone(&store));

        let first = agg.pricing_for("99").await;
        assert!(first.is_unavailable());

        let second = agg.pricing_for("99").await;
        assert!(second.is_unavailable());
        // The unavailable result was cached: no second bulk call.
        assert_eq!(store.variant_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_product_never_touches_the_store_again() {
        let store = Arc::new(MockStore::default().with_variant("7", dec(9_99), Some(dec(12_00))));
        let agg = aggregator(Arc::clone(&store));

        let first = agg.pricing_for("7").await;
        let second = agg.pricing_for("7").await;

        assert_eq!(first, second);
        assert_eq!(store.variant_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn store_failure_degrades_whole_batch_and_caches_it() {
        let store = Arc::new(MockStore::default().failing());
        let agg = aggregator(Arc::clone(&store));

        let (a, b) = tokio::join!(agg.pricing_for("1"), agg.pricing_for("2"));
        assert!(a.is_unavailable());
        assert!(b.is_unavailable());

        // Degraded results are cached like any other resolution.
        let again = agg.pricing_for("1").await;
        assert!(again.is_unavailable());
        assert_eq!(store.variant_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lowest_variant_and_offer_prices_win() {
        let store = Arc::new(
            MockStore::default()
                .with_variant("7", dec(12_99), Some(dec(15_00)))
                .with_variant("7", dec(9_99), None)
                .with_offer("7", dec(11_00))
                .with_offer("7", dec(8_49)),
        );
        let agg = aggregator(Arc::clone(&store));

        let pricing = agg.pricing_for("7").await;

        assert_eq!(pricing.variant_price, Some(dec(9_99)));
        assert_eq!(pricing.compare_at_price, None);
        assert_eq!(pricing.offer_price, Some(dec(8_49)));
    }

    #[tokio::test(start_paused = true)]
    async fn product_id_is_normalized_before_batching() {
        let store = Arc::new(MockStore::default().with_variant("42", dec(19_99), None));
        let agg = aggregator(Arc::clone(&store));

        let (a, b) = tokio::join!(agg.pricing_for(" 42 "), agg.pricing_for("42"));

        assert_eq!(a, b);
        assert_eq!(store.variant_calls(), vec![vec!["42".to_string()]]);
    }

    #[tokio::test(start_paused = true)]
    async fn independent_aggregators_have_independent_caches() {
        let store = Arc::new(MockStore::default().with_variant("7", dec(9_99), None));
        let first = aggregator(Arc::clone(&store));
        let second = aggregator(Arc::clone(&store));

        first.pricing_for("7").await;
        second.pricing_for("7").await;

        assert_eq!(store.variant_calls().len(), 2);
    }
}
