use crate::archive::{ReadingArchive, RecordSink, WritingArchive};
use crate::file_handler::{ensure_directory_exists, PreprocessingIo};
use crate::grouper::Group;
use crate::record::Record;
use crate::RegroupError;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Phase 2 component: concatenates the archives of one group.
pub trait MergeGroup: Send {
    /// Returns the relative path of the merged archive, or `None` when there
    /// was nothing to merge.
    fn merge(&mut self, group: &Group) -> Result<Option<PathBuf>, RegroupError>;
}

/// Streams every record of every member (member order, then record order)
/// into one archive in the merged root. The merged archive is named after the
/// first member of the group, so repeated runs produce the same name.
pub struct GroupMerger<R> {
    io: Arc<dyn PreprocessingIo>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> GroupMerger<R> {
    pub fn new(io: Arc<dyn PreprocessingIo>) -> Self {
        Self {
            io,
            _record: PhantomData,
        }
    }

    pub fn merge_group(&self, group: &Group) -> Result<Option<PathBuf>, RegroupError> {
        let Some(representative) = group.first() else {
            return Ok(None);
        };

        let target = self.io.full_path_merged(representative);
        if let Some(parent) = target.parent() {
            ensure_directory_exists(parent)?;
        }

        let mut merged = WritingArchive::<R>::create(&target)?;
        for member in group {
            let source = self.io.full_path_in(member);
            for record in ReadingArchive::<R>::open(&source)? {
                merged.add(&record?)?;
            }
        }
        let written = merged.finish()?;

        debug!(
            "[merger] {} archives, {} records -> {}",
            group.len(),
            written,
            target.display()
        );

        if written == 0 {
            return Ok(None);
        }
        Ok(Some(representative.clone()))
    }
}

impl<R: Record> MergeGroup for GroupMerger<R> {
    fn merge(&mut self, group: &Group) -> Result<Option<PathBuf>, RegroupError> {
        self.merge_group(group)
    }
}
