//! Static recommendation datasets, loaded once at startup.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde_json::{Map, Value};

use super::types::{AffinityRecord, CategoryFilter, PopularityRow};
use crate::errors::DatasetError;

/// Co-purchase lookup keyed by lower-cased product name.
#[derive(Debug, Clone, Default)]
pub struct AffinityTable {
    rules: HashMap<String, Vec<AffinityRecord>>,
}

impl AffinityTable {
    /// Build from name → records pairs. Keys colliding after lower-casing
    /// resolve to the last pair yielded.
    pub fn from_map(
        raw: impl IntoIterator<Item = (String, Vec<AffinityRecord>)>,
    ) -> Result<Self, DatasetError> {
        let mut rules = HashMap::new();
        for (key, records) in raw {
            for record in &records {
                if !record.confidence.is_finite() || !(0.0..=1.0).contains(&record.confidence) {
                    return Err(DatasetError::InvalidConfidence {
                        key,
                        product: record.product.clone(),
                        confidence: record.confidence,
                    });
                }
            }
            rules.insert(key.to_lowercase(), records);
        }
        Ok(Self { rules })
    }

    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        // File order is kept so a later spelling of the same product wins.
        let raw: Map<String, Value> = serde_json::from_reader(reader)?;
        let pairs = raw
            .into_iter()
            .map(|(key, records)| {
                let records: Vec<AffinityRecord> = serde_json::from_value(records)?;
                Ok((key, records))
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()?;
        Self::from_map(pairs)
    }

    pub fn from_path(path: &Path) -> Result<Self, DatasetError> {
        let file = File::open(path)
            .map_err(|source| DatasetError::Read { path: path.to_path_buf(), source })?;
        Self::from_json_reader(file)
    }

    /// Case-insensitive lookup.
    pub fn rules_for(&self, product: &str) -> &[AffinityRecord] {
        self.rules.get(&product.to_lowercase()).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Transaction counts per product/category pair, in file order.
#[derive(Debug, Clone, Default)]
pub struct PopularityTable {
    rows: Vec<PopularityRow>,
}

impl PopularityTable {
    pub fn from_rows(rows: Vec<PopularityRow>) -> Self {
        Self { rows }
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let rows = csv_reader.deserialize::<PopularityRow>().collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rows })
    }

    pub fn from_path(path: &Path) -> Result<Self, DatasetError> {
        let file = File::open(path)
            .map_err(|source| DatasetError::Read { path: path.to_path_buf(), source })?;
        Self::from_csv_reader(file)
    }

    /// Rows passing `filter`, most transactions first. Ties keep file order.
    pub fn ranked(&self, filter: &CategoryFilter) -> Vec<&PopularityRow> {
        let mut rows = self
            .rows
            .iter()
            .filter(|row| filter.matches(&row.product_category))
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| b.number_of_transactions.cmp(&a.number_of_transactions));
        rows
    }

    /// Product names in file order, duplicates included.
    pub fn products(&self) -> Vec<String> {
        self.rows.iter().map(|row| row.product.clone()).collect()
    }

    /// Distinct category names, sorted.
    pub fn categories(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| row.product_category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{AffinityTable, PopularityTable};
    use crate::errors::DatasetError;
    use crate::recommendations::CategoryFilter;

    const AFFINITY_JSON: &str = r#"{
        "Latte": [
            {"product": "Croissant", "product_category": "Pastry", "confidence": 0.9}
        ],
        "Cappuccino": [
            {"product": "Biscotti", "product_category": "Pastry", "confidence": 0.4}
        ]
    }"#;

    const POPULARITY_CSV: &str = "product,product_category,number_of_transactions\n\
        Latte,Coffee,1200\n\
        Croissant,Bakery,900\n\
        Cappuccino,Coffee,1500\n\
        Hazelnut Syrup,Flavours,300\n";

    #[test]
    fn affinity_lookup_is_case_insensitive() {
        let table = AffinityTable::from_json_reader(AFFINITY_JSON.as_bytes()).expect("load");
        assert_eq!(table.len(), 2);
        assert_eq!(table.rules_for("LATTE").len(), 1);
        assert_eq!(table.rules_for("latte")[0].product, "Croissant");
        assert!(table.rules_for("mocha").is_empty());
    }

    #[test]
    fn colliding_keys_resolve_to_the_last_in_file_order() {
        let raw = r#"{
            "latte": [{"product": "Croissant", "product_category": "Pastry", "confidence": 0.9}],
            "Latte": [{"product": "Scone", "product_category": "Bakery", "confidence": 0.5}]
        }"#;
        let table = AffinityTable::from_json_reader(raw.as_bytes()).expect("load");
        assert_eq!(table.len(), 1);
        assert_eq!(table.rules_for("LATTE")[0].product, "Scone");

        let reversed = r#"{
            "Latte": [{"product": "Scone", "product_category": "Bakery", "confidence": 0.5}],
            "latte": [{"product": "Croissant", "product_category": "Pastry", "confidence": 0.9}]
        }"#;
        let table = AffinityTable::from_json_reader(reversed.as_bytes()).expect("load");
        assert_eq!(table.rules_for("latte")[0].product, "Croissant");
    }

    #[test]
    fn affinity_rejects_out_of_range_confidence() {
        let raw = r#"{"Latte": [{"product": "X", "product_category": "Y", "confidence": 1.4}]}"#;
        let error = AffinityTable::from_json_reader(raw.as_bytes()).expect_err("should fail");
        assert!(matches!(error, DatasetError::InvalidConfidence { .. }));
    }

    #[test]
    fn popularity_loads_csv_and_exposes_vocabulary() {
        let table = PopularityTable::from_csv_reader(POPULARITY_CSV.as_bytes()).expect("load");
        assert_eq!(table.len(), 4);
        assert_eq!(table.products()[0], "Latte");
        assert_eq!(
            table.categories(),
            vec!["Bakery".to_string(), "Coffee".to_string(), "Flavours".to_string()]
        );

        let coffee = table.ranked(&CategoryFilter::from("Coffee"));
        let names = coffee.iter().map(|row| row.product.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Cappuccino", "Latte"]);
    }

    #[test]
    fn loading_from_missing_path_reports_read_error() {
        let dir = TempDir::new().expect("tempdir");
        let missing = dir.path().join("missing.json");
        let error = AffinityTable::from_path(&missing).expect_err("should fail");
        assert!(matches!(error, DatasetError::Read { .. }));
    }

    #[test]
    fn loading_from_files_on_disk() {
        let dir = TempDir::new().expect("tempdir");
        let affinity_path = dir.path().join("apriori_recommendations.json");
        let popularity_path = dir.path().join("popularity_recommendation.csv");
        fs::write(&affinity_path, AFFINITY_JSON).expect("write affinity");
        fs::write(&popularity_path, POPULARITY_CSV).expect("write popularity");

        assert_eq!(AffinityTable::from_path(&affinity_path).expect("affinity").len(), 2);
        assert_eq!(PopularityTable::from_path(&popularity_path).expect("popularity").len(), 4);
    }
}
