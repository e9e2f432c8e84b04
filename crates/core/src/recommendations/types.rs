//! Types for the recommendation engine

use serde::{Deserialize, Serialize};

/// One co-purchase rule: buying the keyed product suggests `product`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffinityRecord {
    pub product: String,
    pub product_category: String,
    /// Rule confidence (0.0 - 1.0)
    pub confidence: f64,
}

/// One row of the popularity dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularityRow {
    pub product: String,
    pub product_category: String,
    pub number_of_transactions: u64,
}

/// Category restriction for popularity queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    #[default]
    Any,
    Only(Vec<String>),
}

impl CategoryFilter {
    pub fn matches(&self, category: &str) -> bool {
        match self {
            CategoryFilter::Any => true,
            CategoryFilter::Only(categories) => categories.iter().any(|c| c == category),
        }
    }
}

impl From<&str> for CategoryFilter {
    fn from(category: &str) -> Self {
        CategoryFilter::Only(vec![category.to_owned()])
    }
}

impl From<String> for CategoryFilter {
    fn from(category: String) -> Self {
        CategoryFilter::Only(vec![category])
    }
}

/// An empty list means no restriction.
impl From<Vec<String>> for CategoryFilter {
    fn from(categories: Vec<String>) -> Self {
        if categories.is_empty() {
            CategoryFilter::Any
        } else {
            CategoryFilter::Only(categories)
        }
    }
}

impl<T> From<Option<T>> for CategoryFilter
where
    T: Into<CategoryFilter>,
{
    fn from(categories: Option<T>) -> Self {
        categories.map(Into::into).unwrap_or_default()
    }
}

/// Which deterministic query answers a recommendation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecommendationKind {
    /// Basket affinity for the products the customer mentioned
    #[serde(rename = "apriori")]
    Apriori,
    /// Overall best sellers
    #[serde(rename = "popular")]
    Popular,
    /// Best sellers within the named categories
    #[serde(rename = "popular_by_category", alias = "popular by category")]
    PopularByCategory,
}

impl RecommendationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationKind::Apriori => "apriori",
            RecommendationKind::Popular => "popular",
            RecommendationKind::PopularByCategory => "popular_by_category",
        }
    }
}

/// Recommendation kind plus its parameters (product names for apriori,
/// category names for popular-by-category, ignored for popular).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationPlan {
    #[serde(rename = "recommendation_type")]
    pub kind: RecommendationKind,
    #[serde(default)]
    pub parameters: Vec<String>,
}
