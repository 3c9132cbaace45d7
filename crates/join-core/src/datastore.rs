use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use join_shared::{Profile, TaskRecord};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::dashboard::TaskSource;
use crate::error::DataError;

/// Read-only view over a data directory holding `tasks.json` and
/// `users.json` exports of the hosted database.
///
/// Both files may be a JSON array or a keyed object as the database REST
/// API returns it (`{"-Nx1": {...}, ...}`); object keys fill in missing ids.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub users_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.json");
        let users_path = data_dir.join("users.json");

        info!(
            data_dir = %data_dir.display(),
            tasks = tasks_path.exists(),
            users = users_path.exists(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            users_path,
        })
    }

    pub fn load_tasks(&self) -> Result<Vec<TaskRecord>, DataError> {
        load_records(&self.tasks_path, parse_tasks)
    }

    pub fn load_users(&self) -> Result<Vec<Profile>, DataError> {
        load_records(&self.users_path, parse_users)
    }
}

impl TaskSource for DataStore {
    async fn tasks_for_user(&self, uid: &str) -> Result<Vec<TaskRecord>, DataError> {
        let tasks: Vec<TaskRecord> = self
            .load_tasks()?
            .into_iter()
            .filter(|task| task.owner_id.as_deref() == Some(uid))
            .collect();
        debug!(uid, count = tasks.len(), "loaded tasks for user");
        Ok(tasks)
    }

    async fn user_profile(&self, uid: &str) -> Result<Option<Profile>, DataError> {
        Ok(self.load_users()?.into_iter().find(|user| user.id == uid))
    }
}

fn load_records<T>(path: &Path, parse: fn(&str) -> Result<Vec<T>, DataError>) -> Result<Vec<T>, DataError> {
    if !path.exists() {
        debug!(path = %path.display(), "export missing; treating as empty");
        return Ok(vec![]);
    }

    let raw = fs::read_to_string(path).map_err(|e| DataError::Request(format!("{}: {e}", path.display())))?;
    parse(&raw).map_err(|e| match e {
        DataError::Decode(msg) => DataError::Decode(format!("{}: {msg}", path.display())),
        other => other,
    })
}

pub fn parse_tasks(raw: &str) -> Result<Vec<TaskRecord>, DataError> {
    parse_records(raw, |task: &mut TaskRecord, key| {
        if task.id.is_empty() {
            task.id = key.to_string();
        }
    })
}

pub fn parse_users(raw: &str) -> Result<Vec<Profile>, DataError> {
    parse_records(raw, |user: &mut Profile, key| {
        if user.id.is_empty() {
            user.id = key.to_string();
        }
    })
}

/// Accepts an array, a keyed object, or `null` (an empty database node).
///
/// `null` slots (the database leaves them in arrays with numeric keys) are
/// skipped, and records that fail to decode are logged and dropped without
/// failing the rest of the batch.
pub fn parse_records<T, F>(raw: &str, fill_id: F) -> Result<Vec<T>, DataError>
where
    T: DeserializeOwned,
    F: Fn(&mut T, &str),
{
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| DataError::Decode(e.to_string()))?;
    let entries: Vec<(Option<String>, serde_json::Value)> = match value {
        serde_json::Value::Null => return Ok(vec![]),
        serde_json::Value::Array(items) => items.into_iter().map(|item| (None, item)).collect(),
        serde_json::Value::Object(map) => map.into_iter().map(|(key, item)| (Some(key), item)).collect(),
        other => return Err(DataError::Decode(format!("expected array or object, got {other}"))),
    };

    let mut records = Vec::with_capacity(entries.len());
    for (index, (key, item)) in entries.into_iter().enumerate() {
        if item.is_null() {
            continue;
        }
        match serde_json::from_value::<T>(item) {
            Ok(mut record) => {
                if let Some(key) = &key {
                    fill_id(&mut record, key);
                }
                records.push(record);
            }
            Err(error) => warn!(%error, index, key = key.as_deref(), "skipping malformed record"),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;

    #[test]
    fn keyed_export_fills_ids_and_filters_owner() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("tasks.json"),
            r#"{
                "-a": {"title": "Mine", "status": "todo", "ownerId": "u1"},
                "-b": {"title": "Theirs", "status": "done", "ownerId": "u2"}
            }"#,
        )
        .expect("write tasks");

        let store = DataStore::open(dir.path()).expect("open");
        let tasks = block_on(store.tasks_for_user("u1")).expect("tasks");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "-a");
        assert_eq!(tasks[0].title, "Mine");
    }

    #[test]
    fn array_users_and_missing_profile() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("users.json"),
            r#"[{"id": "u1", "name": "Anja Schulz"}]"#,
        )
        .expect("write users");

        let store = DataStore::open(dir.path()).expect("open");
        let found = block_on(store.user_profile("u1")).expect("profile");
        assert_eq!(found.map(|p| p.name), Some("Anja Schulz".to_string()));
        assert_eq!(block_on(store.user_profile("nobody")).expect("profile"), None);
    }

    #[test]
    fn missing_files_are_empty_and_junk_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DataStore::open(dir.path()).expect("open");
        assert!(store.load_tasks().expect("empty").is_empty());

        fs::write(&store.tasks_path, "42").expect("write junk");
        assert!(matches!(store.load_tasks(), Err(DataError::Decode(_))));
    }

    #[test]
    fn null_slots_and_bad_records_are_skipped() {
        let tasks = parse_tasks(r#"[null, {"status": "todo", "ownerId": "u1"}, {"status": 7}]"#).expect("parse");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, "todo");

        let keyed = parse_tasks(
            r#"{
                "-a": {"title": "Cleared", "status": null, "ownerId": "u1"},
                "-b": {"title": "Open", "status": "to-do", "ownerId": "u1"},
                "-c": null
            }"#,
        )
        .expect("parse keyed");
        assert_eq!(keyed.len(), 2);
        assert_eq!(keyed[0].id, "-a");
        assert_eq!(keyed[0].status, "");

        let summary = crate::stats::summarize(Some(&keyed));
        assert_eq!(summary.total, 2);
        assert_eq!(summary.todo, 1);
    }

    #[test]
    fn null_node_parses_as_empty() {
        let records: Vec<TaskRecord> = parse_records("null", |_, _| {}).expect("parse");
        assert!(records.is_empty());
    }
}
