//! Recommendation engine implementation

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use super::datasets::{AffinityTable, PopularityTable};
use super::types::*;
use super::MAX_PER_CATEGORY;

/// Deterministic ranking over the affinity and popularity tables.
#[derive(Debug, Clone, Default)]
pub struct RecommendationEngine {
    affinity: AffinityTable,
    popularity: PopularityTable,
}

impl RecommendationEngine {
    pub fn new(affinity: AffinityTable, popularity: PopularityTable) -> Self {
        Self { affinity, popularity }
    }

    /// Basket-affinity recommendations for `products`.
    ///
    /// Candidates from every input product are pooled and ranked by rule
    /// confidence (stable, so ties keep input order). The walk skips names
    /// already chosen and categories that already hold [`MAX_PER_CATEGORY`]
    /// picks, and stops after `k` picks.
    pub fn apriori<S: AsRef<str>>(&self, products: &[S], k: usize) -> Vec<String> {
        let mut candidates = products
            .iter()
            .flat_map(|product| self.affinity.rules_for(product.as_ref()))
            .collect::<Vec<_>>();

        candidates.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal));

        let mut selected: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        let mut per_category: HashMap<&str, usize> = HashMap::new();

        for candidate in candidates {
            if selected.len() >= k {
                break;
            }
            if seen.contains(candidate.product.as_str()) {
                continue;
            }

            let count = per_category.entry(candidate.product_category.as_str()).or_insert(0);
            if *count >= MAX_PER_CATEGORY {
                continue;
            }

            *count += 1;
            seen.insert(candidate.product.as_str());
            selected.push(candidate.product.clone());
        }

        selected
    }

    /// Best sellers, optionally restricted to a set of categories.
    pub fn popular(&self, filter: impl Into<CategoryFilter>, k: usize) -> Vec<String> {
        self.popularity
            .ranked(&filter.into())
            .into_iter()
            .take(k)
            .map(|row| row.product.clone())
            .collect()
    }

    /// Run the query a classified plan asks for.
    pub fn execute(&self, plan: &RecommendationPlan, k: usize) -> Vec<String> {
        match plan.kind {
            RecommendationKind::Apriori => self.apriori(&plan.parameters, k),
            RecommendationKind::Popular => self.popular(CategoryFilter::Any, k),
            RecommendationKind::PopularByCategory => {
                self.popular(CategoryFilter::from(plan.parameters.clone()), k)
            }
        }
    }

    /// Product vocabulary used in classification prompts.
    pub fn products(&self) -> Vec<String> {
        self.popularity.products()
    }

    /// Category vocabulary used in classification prompts.
    pub fn categories(&self) -> Vec<String> {
        self.popularity.categories()
    }

    pub fn affinity(&self) -> &AffinityTable {
        &self.affinity
    }

    pub fn popularity(&self) -> &PopularityTable {
        &self.popularity
    }
}
