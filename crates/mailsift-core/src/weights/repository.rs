//! Weight store repositories.
//!
//! All model mutation flows through the [`WeightRepository`] contract; the
//! classification engine and triage pipeline never touch storage directly.
//! [`FileWeightStore`] is the production implementation: one JSON table per
//! category, write-through, each save going to a temporary file that is then
//! atomically renamed over the table. [`MemoryWeightStore`] backs tests.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::model::{
    median, NEUTRAL_WEIGHT, RankRecord, UpsertMeta, WeightCategory, WeightEntry,
};
use crate::Result;

/// File name of the persisted rank history.
const RANK_TABLE: &str = "rank_history.json";

/// Capability contract for the weight store.
///
/// Implementations must serialize concurrent mutation internally: two
/// accounts' pipelines may upsert the same key at once, and a lost update is
/// a correctness bug.
#[async_trait]
pub trait WeightRepository: Send + Sync {
    /// Weight for a key; unseen keys resolve to the neutral weight 1.
    async fn weight(&self, category: WeightCategory, key: &str) -> Result<f64>;

    /// Mean weight over the given keys, counting only known entries.
    /// Resolves to the neutral weight 1 when none are known.
    async fn mean_weight(&self, category: WeightCategory, keys: &[String]) -> Result<f64>;

    /// Inserts or updates one key according to the category's formula.
    async fn upsert(&self, category: WeightCategory, key: &str, meta: &UpsertMeta) -> Result<()>;

    /// Appends one decision to the rank history.
    ///
    /// Must happen after the decision that consumed the previous threshold,
    /// never before.
    async fn record_rank(&self, record: RankRecord) -> Result<()>;

    /// Current decision threshold: the median of recorded ranks, 0 when the
    /// history is empty.
    async fn threshold(&self) -> Result<f64>;
}

/// In-memory tables shared by both implementations.
#[derive(Debug, Default)]
struct Tables {
    weights: HashMap<WeightCategory, HashMap<String, WeightEntry>>,
    ranks: Vec<RankRecord>,
}

impl Tables {
    fn weight(&self, category: WeightCategory, key: &str) -> f64 {
        self.weights
            .get(&category)
            .and_then(|table| table.get(key))
            .map_or(NEUTRAL_WEIGHT, |entry| entry.weight)
    }

    fn mean_weight(&self, category: WeightCategory, keys: &[String]) -> f64 {
        let Some(table) = self.weights.get(&category) else {
            return NEUTRAL_WEIGHT;
        };
        let known: Vec<f64> = keys
            .iter()
            .filter_map(|key| table.get(key))
            .map(|entry| entry.weight)
            .collect();
        if known.is_empty() {
            NEUTRAL_WEIGHT
        } else {
            #[allow(clippy::cast_precision_loss)]
            let mean = known.iter().sum::<f64>() / known.len() as f64;
            mean
        }
    }

    fn upsert(&mut self, category: WeightCategory, key: &str, meta: &UpsertMeta) {
        let table = self.weights.entry(category).or_default();
        if let Some(entry) = table.get_mut(key) {
            entry.update(category, meta);
        } else {
            table.insert(key.to_string(), WeightEntry::first(category, key, meta));
        }
    }
}

/// Weight store persisted as JSON tables under one directory.
pub struct FileWeightStore {
    dir: PathBuf,
    inner: Mutex<Tables>,
}

impl FileWeightStore {
    /// Opens the store, creating the directory and loading existing tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or a table fails
    /// to parse.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let mut tables = Tables::default();
        for category in WeightCategory::ALL {
            let path = dir.join(category.table_name());
            if let Some(entries) = read_table::<WeightEntry>(&path).await? {
                tables.weights.insert(
                    category,
                    entries
                        .into_iter()
                        .map(|entry| (entry.key.clone(), entry))
                        .collect(),
                );
            }
        }
        if let Some(ranks) = read_table::<RankRecord>(&dir.join(RANK_TABLE)).await? {
            tables.ranks = ranks;
        }

        Ok(Self {
            dir,
            inner: Mutex::new(tables),
        })
    }

    /// Serializes one category table and atomically replaces the file.
    async fn save_category(&self, tables: &Tables, category: WeightCategory) -> Result<()> {
        let mut entries: Vec<&WeightEntry> = tables
            .weights
            .get(&category)
            .map_or_else(Vec::new, |table| table.values().collect());
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        write_table(&self.dir.join(category.table_name()), &entries).await
    }

    /// Serializes the rank history and atomically replaces the file.
    async fn save_ranks(&self, tables: &Tables) -> Result<()> {
        write_table(&self.dir.join(RANK_TABLE), &tables.ranks).await
    }
}

/// Reads a JSON table; `None` when the file does not exist yet.
async fn read_table<T: serde::de::DeserializeOwned>(
    path: &std::path::Path,
) -> Result<Option<Vec<T>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Writes a JSON table through a temporary file and an atomic rename.
async fn write_table<T: serde::Serialize>(path: &std::path::Path, rows: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(rows)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl WeightRepository for FileWeightStore {
    async fn weight(&self, category: WeightCategory, key: &str) -> Result<f64> {
        Ok(self.inner.lock().await.weight(category, key))
    }

    async fn mean_weight(&self, category: WeightCategory, keys: &[String]) -> Result<f64> {
        Ok(self.inner.lock().await.mean_weight(category, keys))
    }

    async fn upsert(&self, category: WeightCategory, key: &str, meta: &UpsertMeta) -> Result<()> {
        let mut tables = self.inner.lock().await;
        tables.upsert(category, key, meta);
        self.save_category(&tables, category).await
    }

    async fn record_rank(&self, record: RankRecord) -> Result<()> {
        let mut tables = self.inner.lock().await;
        tables.ranks.push(record);
        self.save_ranks(&tables).await
    }

    async fn threshold(&self) -> Result<f64> {
        let tables = self.inner.lock().await;
        let ranks: Vec<f64> = tables.ranks.iter().map(|r| r.rank).collect();
        Ok(median(&ranks))
    }
}

/// Volatile weight store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryWeightStore {
    inner: Mutex<Tables>,
}

impl MemoryWeightStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WeightRepository for MemoryWeightStore {
    async fn weight(&self, category: WeightCategory, key: &str) -> Result<f64> {
        Ok(self.inner.lock().await.weight(category, key))
    }

    async fn mean_weight(&self, category: WeightCategory, keys: &[String]) -> Result<f64> {
        Ok(self.inner.lock().await.mean_weight(category, keys))
    }

    async fn upsert(&self, category: WeightCategory, key: &str, meta: &UpsertMeta) -> Result<()> {
        self.inner.lock().await.upsert(category, key, meta);
        Ok(())
    }

    async fn record_rank(&self, record: RankRecord) -> Result<()> {
        self.inner.lock().await.ranks.push(record);
        Ok(())
    }

    async fn threshold(&self) -> Result<f64> {
        let tables = self.inner.lock().await;
        let ranks: Vec<f64> = tables.ranks.iter().map(|r| r.rank).collect();
        Ok(median(&ranks))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rank_record(rank: f64) -> RankRecord {
        RankRecord {
            date: Utc::now(),
            sender: "a@example.com".into(),
            subject: "subject".into(),
            rank,
            important: false,
            urgent: false,
        }
    }

    #[tokio::test]
    async fn unseen_keys_resolve_to_neutral_weight() {
        let store = MemoryWeightStore::new();
        for category in WeightCategory::ALL {
            assert_eq!(store.weight(category, "nobody").await.unwrap(), 1.0);
        }
        assert_eq!(
            store
                .mean_weight(WeightCategory::MessageTerm, &["ghost".into()])
                .await
                .unwrap(),
            1.0
        );
    }

    #[tokio::test]
    async fn upsert_then_get_applies_category_formula() {
        let store = MemoryWeightStore::new();
        let meta = UpsertMeta::occurrence(None);

        store
            .upsert(WeightCategory::Sender, "a@example.com", &meta)
            .await
            .unwrap();
        assert_eq!(
            store.weight(WeightCategory::Sender, "a@example.com").await.unwrap(),
            2.0_f64.ln()
        );

        store
            .upsert(WeightCategory::Sender, "a@example.com", &meta)
            .await
            .unwrap();
        assert_eq!(
            store.weight(WeightCategory::Sender, "a@example.com").await.unwrap(),
            (2.0_f64.ln().exp() + 1.0).ln()
        );
    }

    #[tokio::test]
    async fn mean_weight_counts_only_known_keys() {
        let store = MemoryWeightStore::new();
        store
            .upsert(WeightCategory::MessageTerm, "budget", &UpsertMeta::term(1))
            .await
            .unwrap();

        let mean = store
            .mean_weight(
                WeightCategory::MessageTerm,
                &["budget".into(), "unknown".into()],
            )
            .await
            .unwrap();
        assert_eq!(mean, 2.0_f64.ln());
    }

    #[tokio::test]
    async fn threshold_is_median_of_history() {
        let store = MemoryWeightStore::new();
        assert_eq!(store.threshold().await.unwrap(), 0.0);

        store.record_rank(rank_record(1.0)).await.unwrap();
        store.record_rank(rank_record(3.0)).await.unwrap();
        store.record_rank(rank_record(2.0)).await.unwrap();
        assert_eq!(store.threshold().await.unwrap(), 2.0);
    }

    #[tokio::test]
    async fn file_store_persists_across_reopen() {
        let dir = std::env::temp_dir().join(format!(
            "mailsift-weights-{}-reopen",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);

        {
            let store = FileWeightStore::open(&dir).await.unwrap();
            store
                .upsert(
                    WeightCategory::Sender,
                    "a@example.com",
                    &UpsertMeta::occurrence(None),
                )
                .await
                .unwrap();
            store.record_rank(rank_record(1.5)).await.unwrap();
        }

        let reopened = FileWeightStore::open(&dir).await.unwrap();
        assert_eq!(
            reopened
                .weight(WeightCategory::Sender, "a@example.com")
                .await
                .unwrap(),
            2.0_f64.ln()
        );
        assert_eq!(reopened.threshold().await.unwrap(), 1.5);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn file_store_leaves_no_temporary_files() {
        let dir = std::env::temp_dir().join(format!("mailsift-weights-{}-tmp", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let store = FileWeightStore::open(&dir).await.unwrap();
        store
            .upsert(
                WeightCategory::MessageTerm,
                "budget",
                &UpsertMeta::term(2),
            )
            .await
            .unwrap();

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert!(names.contains(&WeightCategory::MessageTerm.table_name().to_string()));
        assert!(names.iter().all(|n| !n.ends_with(".tmp")));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
