use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::error::Result;
use crate::models::{Feature, RepoId};

/// Persisted feature values, one row per (repository, feature name).
pub struct FeatureStore {
    conn: Connection,
}

impl FeatureStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_db()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_db()?;
        Ok(store)
    }

    fn init_db(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS features (
                id INTEGER PRIMARY KEY,
                repository TEXT NOT NULL,
                name TEXT NOT NULL,
                value REAL,
                position INTEGER NOT NULL,
                extracted_at TEXT NOT NULL,
                UNIQUE(repository, name)
            );

            CREATE INDEX IF NOT EXISTS idx_features_repository ON features(repository);
            CREATE INDEX IF NOT EXISTS idx_features_name ON features(name);
            "#,
        )?;

        Ok(())
    }

    /// Replaces everything stored for `repo` with `features`.
    pub fn save_features(&self, repo: &RepoId, features: &[Feature]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let repository = repo.to_string();
        let extracted_at = Utc::now().to_rfc3339();

        tx.execute(
            "DELETE FROM features WHERE repository = ?1",
            params![repository],
        )?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO features (repository, name, value, position, extracted_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )?;
            for (position, feature) in features.iter().enumerate() {
                stmt.execute(params![
                    repository,
                    feature.name,
                    feature.value,
                    position as i64,
                    extracted_at,
                ])?;
            }
        }

        tx.commit()?;
        tracing::debug!("Stored {} features for {}", features.len(), repo);
        Ok(())
    }

    pub fn load_features(&self, repo: &RepoId) -> Result<Option<Vec<Feature>>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, value FROM features WHERE repository = ?1 ORDER BY position",
        )?;

        let features = stmt
            .query_map(params![repo.to_string()], |row| {
                Ok(Feature {
                    name: row.get(0)?,
                    value: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(if features.is_empty() { None } else { Some(features) })
    }

    /// Stored features of `repo`, provided they carry exactly `names` in that
    /// order and every value is set. Anything else counts as not stored.
    pub fn load_matching(&self, repo: &RepoId, names: &[String]) -> Result<Option<Vec<Feature>>> {
        let Some(features) = self.load_features(repo)? else {
            return Ok(None);
        };

        let matches = features.len() == names.len()
            && features.iter().zip(names).all(|(f, name)| &f.name == name)
            && features.iter().all(Feature::is_set);
        if !matches {
            tracing::debug!("Stored features of {} do not match the expected layout", repo);
            return Ok(None);
        }
        Ok(Some(features))
    }

    pub fn delete_by_name(&self, name: &str) -> Result<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM features WHERE name = ?1", params![name])?;
        Ok(deleted)
    }

    pub fn delete_all(&self) -> Result<usize> {
        let deleted = self.conn.execute("DELETE FROM features", [])?;
        Ok(deleted)
    }

    pub fn distinct_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT name FROM features ORDER BY name")?;
        let names = stmt.query_map([], |row| row.get(0))?;
        names.collect::<std::result::Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn repositories(&self) -> Result<Vec<RepoId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT repository FROM features ORDER BY repository")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        names.iter().map(|name| name.parse()).collect()
    }

    pub fn last_extracted(&self, repo: &RepoId) -> Result<Option<String>> {
        let at = self
            .conn
            .query_row(
                "SELECT MAX(extracted_at) FROM features WHERE repository = ?1",
                params![repo.to_string()],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(at.flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> Vec<String> {
        vec![
            "Number of stars".to_string(),
            "Has wiki".to_string(),
            "Number of files".to_string(),
        ]
    }

    fn features(stars: f64) -> Vec<Feature> {
        vec![
            Feature::with_value("Number of stars", stars),
            Feature::with_value("Has wiki", 1.0),
            Feature::with_value("Number of files", 12.0),
        ]
    }

    #[test]
    fn test_save_and_load_preserves_order() {
        let store = FeatureStore::in_memory().unwrap();
        let repo = RepoId::new("octo", "hello");
        store.save_features(&repo, &features(5.0)).unwrap();

        let loaded = store.load_features(&repo).unwrap().unwrap();
        assert_eq!(loaded, features(5.0));
        assert_eq!(store.load_matching(&repo, &layout()).unwrap(), Some(features(5.0)));
        assert!(store.last_extracted(&repo).unwrap().is_some());
    }

    #[test]
    fn test_save_replaces_previous_rows() {
        let store = FeatureStore::in_memory().unwrap();
        let repo = RepoId::new("octo", "hello");
        store.save_features(&repo, &features(5.0)).unwrap();
        store.save_features(&repo, &features(9.0)).unwrap();

        assert_eq!(store.load_matching(&repo, &layout()).unwrap(), Some(features(9.0)));
    }

    #[test]
    fn test_missing_repository() {
        let store = FeatureStore::in_memory().unwrap();
        let repo = RepoId::new("octo", "nothing");
        assert!(store.load_features(&repo).unwrap().is_none());
        assert!(store.load_matching(&repo, &layout()).unwrap().is_none());
        assert!(store.last_extracted(&repo).unwrap().is_none());
    }

    #[test]
    fn test_unset_value_is_not_a_match() {
        let store = FeatureStore::in_memory().unwrap();
        let repo = RepoId::new("octo", "hello");
        store
            .save_features(&repo, &[Feature::with_value("a", 1.0), Feature::new("b")])
            .unwrap();
        let names = vec!["a".to_string(), "b".to_string()];
        assert!(store.load_matching(&repo, &names).unwrap().is_none());
    }

    #[test]
    fn test_partially_deleted_rows_are_not_a_match() {
        let store = FeatureStore::in_memory().unwrap();
        let repo = RepoId::new("octo", "hello");
        store.save_features(&repo, &features(5.0)).unwrap();
        store.delete_by_name("Has wiki").unwrap();

        let remaining = store.load_features(&repo).unwrap().unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(store.load_matching(&repo, &layout()).unwrap().is_none());
    }

    #[test]
    fn test_reordered_layout_is_not_a_match() {
        let store = FeatureStore::in_memory().unwrap();
        let repo = RepoId::new("octo", "hello");
        store.save_features(&repo, &features(5.0)).unwrap();

        let mut reordered = layout();
        reordered.swap(0, 2);
        assert!(store.load_matching(&repo, &reordered).unwrap().is_none());

        let mut extended = layout();
        extended.push("Number of forks".to_string());
        assert!(store.load_matching(&repo, &extended).unwrap().is_none());
    }

    #[test]
    fn test_delete_by_name_and_distinct_names() {
        let store = FeatureStore::in_memory().unwrap();
        store.save_features(&RepoId::new("octo", "one"), &features(1.0)).unwrap();
        store.save_features(&RepoId::new("octo", "two"), &features(2.0)).unwrap();

        assert_eq!(
            store.distinct_names().unwrap(),
            vec!["Has wiki", "Number of files", "Number of stars"]
        );
        assert_eq!(store.delete_by_name("Has wiki").unwrap(), 2);
        assert_eq!(
            store.distinct_names().unwrap(),
            vec!["Number of files", "Number of stars"]
        );
        assert_eq!(
            store.repositories().unwrap(),
            vec![RepoId::new("octo", "one"), RepoId::new("octo", "two")]
        );

        assert_eq!(store.delete_all().unwrap(), 4);
        assert!(store.distinct_names().unwrap().is_empty());
    }
}
