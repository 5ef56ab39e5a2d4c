use crate::archive::{write_all, ReadingArchive, RecordSource};
use crate::file_handler::PreprocessingIo;
use crate::filter::Filter;
use crate::logging::{CleanerLogger, NoopLogger};
use crate::record::Record;
use crate::RegroupError;
use itertools::Itertools;
use std::path::Path;
use std::sync::Arc;

pub const BEFORE_FILTERS: &str = "before applying any filter";
pub const AFTER_DEDUPLICATION: &str = "after removing duplicates";
pub const AFTER_ORDERING: &str = "after ordering";

pub fn after_filter(name: &str) -> String {
    format!("after applying '{}'", name)
}

/// Record counts taken after each cleaning stage, in stage order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageCounts {
    stages: Vec<(String, usize)>,
}

impl StageCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: impl Into<String>, count: usize) {
        self.stages.push((stage.into(), count));
    }

    pub fn get(&self, stage: &str) -> Option<usize> {
        self.stages
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, count)| *count)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.stages.iter().map(|(name, count)| (name.as_str(), *count))
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Phase 3 component: turns one merged archive into a final archive.
pub trait CleanArchive: Send {
    fn clean(&mut self, archive: &Path) -> Result<StageCounts, RegroupError>;
}

/// Filters, deduplicates and orders the records of a merged archive and writes
/// the result under the same relative path in the final root.
///
/// Stages run strictly in this order: read, each filter in registration
/// order, duplicate removal, stable sort by timestamp, write.
pub struct Cleaner<R> {
    io: Arc<dyn PreprocessingIo>,
    logger: Arc<dyn CleanerLogger>,
    filters: Vec<Box<dyn Filter<R>>>,
    filters_reported: bool,
}

impl<R: Record> Cleaner<R> {
    pub fn new(io: Arc<dyn PreprocessingIo>, logger: Arc<dyn CleanerLogger>) -> Self {
        logger.working_in(&io.full_path_merged(Path::new("")), &io.full_path_out(Path::new("")));
        Self {
            io,
            logger,
            filters: Vec::new(),
            filters_reported: false,
        }
    }

    pub fn without_logging(io: Arc<dyn PreprocessingIo>) -> Self {
        Self::new(io, Arc::new(NoopLogger))
    }

    pub fn add_filter(&mut self, filter: impl Filter<R> + 'static) -> &mut Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn filter_names(&self) -> Vec<String> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn clean_archive(&mut self, rel: &Path) -> Result<StageCounts, RegroupError> {
        if !self.filters_reported {
            self.logger.registered_filters(&self.filter_names());
            self.filters_reported = true;
        }

        let source = self.io.full_path_merged(rel);
        self.logger.reading_archive(rel);
        let mut records: Vec<R> = ReadingArchive::open(&source)?.get_all()?;

        let mut counts = StageCounts::new();
        counts.record(BEFORE_FILTERS, records.len());

        for filter in &self.filters {
            records.retain(|record| filter.keep(record));
            counts.record(after_filter(&filter.name()), records.len());
        }

        let mut records: Vec<R> = records.into_iter().unique().collect();
        counts.record(AFTER_DEDUPLICATION, records.len());

        records.sort_by_key(|record| record.timestamp());
        counts.record(AFTER_ORDERING, records.len());

        self.logger.writing_events();
        write_all(self.io.full_path_out(rel), &records)?;
        self.logger.finished_writing(&counts);

        Ok(counts)
    }
}

impl<R: Record> CleanArchive for Cleaner<R> {
    fn clean(&mut self, archive: &Path) -> Result<StageCounts, RegroupError> {
        self.clean_archive(archive)
    }
}
