//! Record store backed by a single pretty-printed JSON array.
//!
//! Every write takes an exclusive lock on a sidecar `<file>.lock`, re-reads
//! the table from disk, adds the absent rows and replaces the file via a
//! temp file and rename. Readers never lock: a rename is atomic, so they
//! see either the old table or the new one. Handles in other threads or
//! processes therefore never overwrite each other's records.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs4::fs_std::FileExt;

use crate::attendance::domain::record_store::{NewRecord, PersistedRecord, RecordKey, RecordStore};
use crate::error::AttendanceError;
use crate::shared::BoxError;

type Table = BTreeMap<RecordKey, PersistedRecord>;

pub struct JsonRecordStore {
    path: PathBuf,
}

impl JsonRecordStore {
    /// Opens `path`. A missing file is an empty store; an unreadable or
    /// malformed one is rejected here rather than on first write.
    pub fn open(path: &Path) -> Result<Self, AttendanceError> {
        let table = load_table(path)
            .map_err(|e| AttendanceError::Store(format!("{}: {e}", path.display())))?;
        log::debug!("Opened record store {} ({} records)", path.display(), table.len());
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("json.lock")
    }

    /// Blocks until this handle holds the writer lock. The lock is released
    /// when the returned file is dropped.
    fn lock_exclusive(&self) -> Result<File, BoxError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())?;
        FileExt::lock_exclusive(&file)?;
        Ok(file)
    }

    fn persist(&self, table: &Table) -> Result<(), BoxError> {
        let rows: Vec<&PersistedRecord> = table.values().collect();
        let json = serde_json::to_string_pretty(&rows)?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, json)?;
        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }

    /// Inserts the records whose keys are absent from the current file and
    /// flushes once, all under the writer lock. Nothing is committed if the
    /// flush fails.
    fn insert_absent(&self, records: Vec<NewRecord>) -> Result<Vec<PersistedRecord>, BoxError> {
        let _guard = self.lock_exclusive()?;
        let mut table = load_table(&self.path)?;
        let now = Utc::now();
        let mut inserted = Vec::new();
        for record in records {
            if table.contains_key(&record.key) {
                continue;
            }
            let key = record.key.clone();
            let stored = PersistedRecord::from_new(record, now);
            table.insert(key, stored.clone());
            inserted.push(stored);
        }
        if !inserted.is_empty() {
            self.persist(&table)?;
        }
        Ok(inserted)
    }
}

fn load_table(path: &Path) -> Result<Table, BoxError> {
    if !path.exists() {
        return Ok(Table::new());
    }
    let json = fs::read_to_string(path)?;
    Ok(parse_table(&json)?)
}

fn parse_table(json: &str) -> Result<Table, serde_json::Error> {
    if json.trim().is_empty() {
        return Ok(Table::new());
    }
    let rows: Vec<PersistedRecord> = serde_json::from_str(json)?;
    let mut table = Table::new();
    for row in rows {
        table.entry(row.key()).or_insert(row);
    }
    Ok(table)
}

impl RecordStore for JsonRecordStore {
    fn exists(&self, key: &RecordKey) -> Result<bool, BoxError> {
        Ok(load_table(&self.path)?.contains_key(key))
    }

    fn create(&self, record: NewRecord) -> Result<Option<PersistedRecord>, BoxError> {
        Ok(self.insert_absent(vec![record])?.pop())
    }

    fn create_all(&self, records: Vec<NewRecord>) -> Result<usize, BoxError> {
        Ok(self.insert_absent(records)?.len())
    }

    fn records(&self) -> Result<Vec<PersistedRecord>, BoxError> {
        Ok(load_table(&self.path)?.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::emotion::{EmotionDistribution, EmotionLabel};
    use tempfile::TempDir;

    fn new_record(identity: &str, class_id: i64, frame_id: u64) -> NewRecord {
        NewRecord {
            key: RecordKey {
                identity: identity.into(),
                class_id,
                frame_id,
            },
            emotion: EmotionDistribution::from_scores([(EmotionLabel::Sad, 42.0)]),
        }
    }

    #[test]
    fn test_missing_file_opens_empty() {
        let tmp = TempDir::new().unwrap();
        let store = JsonRecordStore::open(&tmp.path().join("records.json")).unwrap();
        assert!(store.records().unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_records_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("records.json");
        {
            let store = JsonRecordStore::open(&path).unwrap();
            assert_eq!(
                store
                    .create_all(vec![new_record("alice", 101, 0), new_record("alice", 101, 5)])
                    .unwrap(),
                2
            );
        }

        let reopened = JsonRecordStore::open(&path).unwrap();
        let records = reopened.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].frame_id, 0);
        assert_eq!(records[1].emotion.get(EmotionLabel::Sad), 42.0);
        assert!(reopened.exists(&new_record("alice", 101, 5).key).unwrap());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_duplicates_across_runs_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("records.json");
        JsonRecordStore::open(&path)
            .unwrap()
            .create(new_record("alice", 101, 0))
            .unwrap();

        let store = JsonRecordStore::open(&path).unwrap();
        assert!(store.create(new_record("alice", 101, 0)).unwrap().is_none());
        assert_eq!(store.create_all(vec![new_record("alice", 101, 0)]).unwrap(), 0);
        assert_eq!(store.records().unwrap().len(), 1);
    }

    #[test]
    fn test_file_uses_reporting_schema() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("records.json");
        let store = JsonRecordStore::open(&path).unwrap();
        store.create(new_record("carol", 7, 3)).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let row = &json.as_array().unwrap()[0];
        assert_eq!(row["studentID"], "carol");
        assert_eq!(row["ClassID"], 7);
        assert_eq!(row["FramID"], 3);
        assert!(row["created_at"].is_string());
    }

    #[test]
    fn test_corrupt_file_is_a_store_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("records.json");
        fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(
            JsonRecordStore::open(&path),
            Err(AttendanceError::Store(_))
        ));
    }

    #[test]
    fn test_failed_flush_commits_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("records.json");
        let store = JsonRecordStore::open(&path).unwrap();
        store.create(new_record("carol", 1, 0)).unwrap();

        // Leaving the temp path occupied by a directory makes the flush fail.
        fs::create_dir(path.with_extension("json.tmp")).unwrap();
        assert!(store.create(new_record("dave", 1, 0)).is_err());
        fs::remove_dir(path.with_extension("json.tmp")).unwrap();

        assert!(!store.exists(&new_record("dave", 1, 0).key).unwrap());
        assert_eq!(store.records().unwrap().len(), 1);
        assert!(store.create(new_record("dave", 1, 0)).unwrap().is_some());
    }

    #[test]
    fn test_handles_on_one_file_keep_each_others_records() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("records.json");
        let first = JsonRecordStore::open(&path).unwrap();
        let second = JsonRecordStore::open(&path).unwrap();

        assert_eq!(first.create_all(vec![new_record("alice", 101, 0)]).unwrap(), 1);
        assert_eq!(second.create_all(vec![new_record("bob", 101, 0)]).unwrap(), 1);
        assert_eq!(second.create_all(vec![new_record("alice", 101, 0)]).unwrap(), 0);
        assert!(second.exists(&new_record("alice", 101, 0).key).unwrap());

        let ids: Vec<String> = JsonRecordStore::open(&path)
            .unwrap()
            .records()
            .unwrap()
            .into_iter()
            .map(|r| r.identity)
            .collect();
        assert_eq!(ids, vec!["alice", "bob"]);
    }

    #[test]
    fn test_concurrent_handles_create_each_key_once() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("records.json");

        let created: usize = std::thread::scope(|s| {
            let workers: Vec<_> = (0..4)
                .map(|_| {
                    let path = path.clone();
                    s.spawn(move || {
                        let store = JsonRecordStore::open(&path).unwrap();
                        (0..10)
                            .map(|frame| {
                                store.create_all(vec![new_record("erin", 3, frame)]).unwrap()
                            })
                            .sum::<usize>()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).sum()
        });

        assert_eq!(created, 10);
        let store = JsonRecordStore::open(&path).unwrap();
        assert_eq!(store.records().unwrap().len(), 10);
    }
}
