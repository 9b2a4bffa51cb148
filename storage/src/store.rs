use crate::state::HarvestState;
use chrono::Utc;
use moltscrape_core::{AuthorEntry, CoreError, StateSnapshot};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const STATE_FILE: &str = "state.json";
const USERS_FILE: &str = "users.json";

/// Durable home of the harvest state. The snapshot files are owned
/// exclusively by this store and replaced wholesale on every flush; seen-set
/// and author registry are persisted independently and loaded independently.
#[derive(Debug)]
pub struct StateStore {
    data_dir: PathBuf,
}

impl StateStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    /// Load the last flushed snapshot, or an empty state when no snapshot
    /// has been written yet.
    pub fn load(&self) -> Result<HarvestState, CoreError> {
        let state_path = self.data_dir.join(STATE_FILE);
        let seen = if state_path.exists() {
            let snapshot: StateSnapshot = serde_json::from_str(&fs::read_to_string(&state_path)?)?;
            info!(count = snapshot.seen_posts.len(), "Loaded previously seen posts");
            snapshot.seen_posts.into_iter().collect()
        } else {
            Default::default()
        };

        let users_path = self.data_dir.join(USERS_FILE);
        let authors: BTreeMap<String, AuthorEntry> = if users_path.exists() {
            let map: BTreeMap<String, AuthorEntry> =
                serde_json::from_str(&fs::read_to_string(&users_path)?)?;
            info!(count = map.len(), "Loaded known authors");
            map
        } else {
            BTreeMap::new()
        };

        Ok(HarvestState::new(seen, authors))
    }

    /// Replace both snapshot files with the current state. Each file is
    /// written to a temporary sibling first and then renamed over the target.
    pub fn flush(&self, state: &HarvestState) -> Result<(), CoreError> {
        let mut seen_posts: Vec<String> = state.seen_ids().iter().cloned().collect();
        seen_posts.sort();

        let snapshot = StateSnapshot {
            seen_posts,
            last_updated: Utc::now().to_rfc3339(),
        };
        write_replace(
            &self.data_dir.join(STATE_FILE),
            &serde_json::to_vec_pretty(&snapshot)?,
        )?;
        write_replace(
            &self.data_dir.join(USERS_FILE),
            &serde_json::to_vec_pretty(state.authors())?,
        )?;

        debug!(
            seen = state.seen_count(),
            authors = state.author_count(),
            "Flushed state snapshot"
        );
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

fn write_replace(path: &Path, bytes: &[u8]) -> Result<(), CoreError> {
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
