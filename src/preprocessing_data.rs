use crate::grouper::Group;
use crate::identifier::IdentifierSet;
use crate::RegroupError;
use rustc_hash::FxHashMap;
use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct State {
    archives: BTreeSet<PathBuf>,
    unindexed: VecDeque<PathBuf>,
    ids: Option<FxHashMap<PathBuf, IdentifierSet>>,
    groups_stored: bool,
    unmerged: VecDeque<Group>,
    num_groups: usize,
    uncleaned: VecDeque<PathBuf>,
    num_merged: usize,
    cleaned: Vec<PathBuf>,
}

/// Shared work state of one preprocessing run.
///
/// Each `try_take_*` call hands out every item exactly once, no matter how
/// many workers call it concurrently. All state sits behind one lock.
pub struct PreprocessingData {
    state: Mutex<State>,
}

impl PreprocessingData {
    pub fn new(archives: BTreeSet<PathBuf>) -> Self {
        let unindexed = archives.iter().cloned().collect();
        Self {
            state: Mutex::new(State {
                archives,
                unindexed,
                ids: Some(FxHashMap::default()),
                ..State::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // items are processed outside the lock, so a poisoned guard still holds consistent state
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn num_archives(&self) -> usize {
        self.lock().archives.len()
    }

    pub fn archives(&self) -> BTreeSet<PathBuf> {
        self.lock().archives.clone()
    }

    pub fn try_take_next_unindexed_archive(&self) -> Option<PathBuf> {
        self.lock().unindexed.pop_front()
    }

    pub fn store_ids(&self, archive: &Path, ids: IdentifierSet) -> Result<(), RegroupError> {
        let mut state = self.lock();
        if !state.archives.contains(archive) {
            return Err(RegroupError::Coordinator(format!(
                "unknown archive {}",
                archive.display()
            )));
        }
        let stored = state.ids.as_mut().ok_or_else(|| {
            RegroupError::Coordinator("identifiers were already handed to grouping".to_string())
        })?;
        if stored.contains_key(archive) {
            return Err(RegroupError::Coordinator(format!(
                "identifiers for {} stored twice",
                archive.display()
            )));
        }
        stored.insert(archive.to_path_buf(), ids);
        Ok(())
    }

    /// Hands out the collected identifier sets. Can only be called once.
    pub fn take_ids(&self) -> Result<FxHashMap<PathBuf, IdentifierSet>, RegroupError> {
        self.lock().ids.take().ok_or_else(|| {
            RegroupError::Coordinator("identifiers were already handed to grouping".to_string())
        })
    }

    pub fn store_groups(&self, groups: Vec<Group>) -> Result<(), RegroupError> {
        let mut state = self.lock();
        if state.groups_stored {
            return Err(RegroupError::Coordinator("groups stored twice".to_string()));
        }
        state.groups_stored = true;
        state.num_groups = groups.len();
        state.unmerged = groups.into();
        Ok(())
    }

    pub fn num_groups(&self) -> usize {
        self.lock().num_groups
    }

    pub fn try_take_next_unmerged_group(&self) -> Option<Group> {
        self.lock().unmerged.pop_front()
    }

    pub fn store_merged_archive(&self, archive: PathBuf) {
        let mut state = self.lock();
        state.num_merged += 1;
        state.uncleaned.push_back(archive);
    }

    pub fn num_merged(&self) -> usize {
        self.lock().num_merged
    }

    pub fn try_take_next_uncleaned_archive(&self) -> Option<PathBuf> {
        self.lock().uncleaned.pop_front()
    }

    pub fn store_cleaned_archive(&self, archive: PathBuf) {
        self.lock().cleaned.push(archive);
    }

    pub fn cleaned_archives(&self) -> Vec<PathBuf> {
        let mut cleaned = self.lock().cleaned.clone();
        cleaned.sort();
        cleaned
    }
}
