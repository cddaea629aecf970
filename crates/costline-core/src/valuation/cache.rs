use dashmap::DashMap;

use crate::tree::Category;
use crate::valuation::fingerprint::fingerprint;
use crate::valuation::percentage::{resolve_base, ResolvedBase};
use crate::valuation::ValuationContext;

/// Identity of a cached resolution.
///
/// The fingerprint covers the selection, the shape of what it selects and
/// the selections of any percentage lines reached through it; `revision` is
/// supplied by the caller and must change whenever amounts, rates or charge
/// rates of the snapshot change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub revision: u64,
    pub fingerprint: String,
    pub currency: String,
    pub use_alternate_rate: bool,
    pub include_social_charges: bool,
}

impl CacheKey {
    pub fn new(
        revision: u64,
        selected_ids: &[String],
        categories: &[Category],
        ctx: &ValuationContext<'_>,
        include_social_charges: bool,
    ) -> Self {
        Self {
            revision,
            fingerprint: fingerprint(selected_ids, categories),
            currency: ctx.target_currency.to_string(),
            use_alternate_rate: ctx.use_alternate_rate,
            include_social_charges,
        }
    }
}

/// Shared memo of percentage-base resolutions.
///
/// Safe to share between threads. A miss computes while holding the entry's
/// shard, so concurrent callers asking for the same key wait for one result
/// instead of resolving twice.
#[derive(Debug, Default)]
pub struct BaseCache {
    entries: DashMap<CacheKey, ResolvedBase>,
}

impl BaseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_resolve(
        &self,
        revision: u64,
        selected_ids: &[String],
        categories: &[Category],
        ctx: &ValuationContext<'_>,
        include_social_charges: bool,
    ) -> ResolvedBase {
        let key = CacheKey::new(revision, selected_ids, categories, ctx, include_social_charges);
        if let Some(hit) = self.entries.get(&key) {
            tracing::debug!(revision, "percentage base cache hit");
            return hit.value().clone();
        }
        tracing::debug!(revision, "percentage base cache miss");
        self.entries
            .entry(key)
            .or_insert_with(|| resolve_base(selected_ids, categories, ctx, include_social_charges))
            .value()
            .clone()
    }

    /// Drop every entry older than `revision`.
    pub fn retain_revision(&self, revision: u64) {
        self.entries.retain(|key, _| key.revision >= revision);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::RateTable;
    use crate::tree::CostLine;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::thread;

    fn tree() -> Vec<Category> {
        vec![Category::new(
            "prod",
            "Production",
            vec![
                CostLine::post("dop", "DoP").priced(dec!(5), dec!(1), dec!(800)),
                CostLine::post("gaffer", "Gaffer").priced(dec!(5), dec!(1), dec!(450)),
            ],
        )]
    }

    fn sel() -> Vec<String> {
        vec!["prod".to_string()]
    }

    #[test]
    fn test_hit_reuses_entry() {
        let cache = BaseCache::new();
        let rates = RateTable::new();
        let ctx = ValuationContext {
            target_currency: "EUR",
            rates: &rates,
            charge_rates: &[],
            use_alternate_rate: false,
        };
        let categories = tree();
        let first = cache.get_or_resolve(1, &sel(), &categories, &ctx, false);
        let second = cache.get_or_resolve(1, &sel(), &categories, &ctx, false);
        assert_eq!(first, second);
        assert_eq!(first.total, dec!(6250));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_structure_change_misses() {
        let cache = BaseCache::new();
        let rates = RateTable::new();
        let ctx = ValuationContext {
            target_currency: "EUR",
            rates: &rates,
            charge_rates: &[],
            use_alternate_rate: false,
        };
        let before = tree();
        let mut after = tree();
        after[0].children.pop();

        let a = cache.get_or_resolve(1, &sel(), &before, &ctx, false);
        let b = cache.get_or_resolve(1, &sel(), &after, &ctx, false);
        assert_eq!(a.total, dec!(6250));
        assert_eq!(b.total, dec!(4000));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_revision_change_misses_and_prunes() {
        let cache = BaseCache::new();
        let rates = RateTable::new();
        let ctx = ValuationContext {
            target_currency: "EUR",
            rates: &rates,
            charge_rates: &[],
            use_alternate_rate: false,
        };
        let mut categories = tree();
        cache.get_or_resolve(1, &sel(), &categories, &ctx, false);
        categories[0].children[0].unit_rate = dec!(1000);
        let fresh = cache.get_or_resolve(2, &sel(), &categories, &ctx, false);
        assert_eq!(fresh.total, dec!(7250));
        assert_eq!(cache.len(), 2);
        cache.retain_revision(2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_callers_agree() {
        let cache = Arc::new(BaseCache::new());
        let categories = Arc::new(tree());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let categories = Arc::clone(&categories);
                thread::spawn(move || {
                    let rates = RateTable::new();
                    let ctx = ValuationContext {
                        target_currency: "EUR",
                        rates: &rates,
                        charge_rates: &[],
                        use_alternate_rate: false,
                    };
                    cache.get_or_resolve(7, &sel(), &categories, &ctx, false).total
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), dec!(6250));
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_repointed_nested_line_misses() {
        let cache = BaseCache::new();
        let rates = RateTable::new();
        let ctx = ValuationContext {
            target_currency: "EUR",
            rates: &rates,
            charge_rates: &[],
            use_alternate_rate: false,
        };
        let tree = |target: &str| {
            vec![
                Category::new(
                    "a",
                    "A",
                    vec![
                        CostLine::post("x", "X").priced(dec!(1), dec!(1), dec!(1000)),
                        CostLine::post("fee", "Fee").percentage_of(dec!(10), &[target]),
                    ],
                ),
                Category::new(
                    "b",
                    "B",
                    vec![CostLine::post("y", "Y").priced(dec!(1), dec!(1), dec!(5000))],
                ),
            ]
        };
        let sel = vec!["a".to_string()];
        let before = tree("x");
        let after = tree("y");

        assert_eq!(cache.get_or_resolve(1, &sel, &before, &ctx, false).total, dec!(1100));
        let cached = cache.get_or_resolve(1, &sel, &after, &ctx, false);
        assert_eq!(cached.total, resolve_base(&sel, &after, &ctx, false).total);
        assert_eq!(cached.total, dec!(1500));
    }
}
