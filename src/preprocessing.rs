use crate::cleaner::{CleanArchive, Cleaner};
use crate::file_handler::{ensure_directory_exists, PreprocessingIo};
use crate::group_merger::{GroupMerger, MergeGroup};
use crate::grouper::{Group, GroupArchives, Grouper};
use crate::identifier_reader::{IdentifierReader, ReadIdentifiers};
use crate::logging::{CleanerLogger, GrouperLogger, PreprocessingLogger};
use crate::preprocessing_data::PreprocessingData;
use crate::record::Record;
use crate::RegroupError;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

pub type ReaderFactory = Box<dyn Fn(usize) -> Box<dyn ReadIdentifiers> + Send + Sync>;
pub type MergerFactory = Box<dyn Fn(usize) -> Box<dyn MergeGroup> + Send + Sync>;
pub type CleanerFactory = Box<dyn Fn(usize) -> Box<dyn CleanArchive> + Send + Sync>;

/// One item that could not be processed. The run carries on without it.
#[derive(Debug)]
pub struct ItemFailure {
    pub worker_id: usize,
    pub item: String,
    pub error: RegroupError,
}

#[derive(Debug, Default)]
pub struct PhaseReport {
    pub processed: usize,
    pub failures: Vec<ItemFailure>,
}

impl PhaseReport {
    pub fn attempted(&self) -> usize {
        self.processed + self.failures.len()
    }

    fn absorb(&mut self, other: PhaseReport) {
        self.processed += other.processed;
        self.failures.extend(other.failures);
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub archives: usize,
    pub read_ids: PhaseReport,
    pub groups: usize,
    pub merge: PhaseReport,
    pub clean: PhaseReport,
    /// Relative paths of the final archives, sorted
    pub cleaned_archives: Vec<PathBuf>,
}

impl RunSummary {
    pub fn failures(&self) -> impl Iterator<Item = &ItemFailure> {
        self.read_ids
            .failures
            .iter()
            .chain(&self.merge.failures)
            .chain(&self.clean.failures)
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}

/// Runs the three preprocessing phases with a fixed number of worker threads.
///
/// Each phase spawns `num_workers` fresh threads that pull items from a shared
/// [`PreprocessingData`] until it runs dry, and joins them all before the next
/// step starts. Grouping runs once, on the calling thread, between phase 1 and
/// phase 2.
///
/// Every worker builds its own component through the matching factory when
/// its phase starts and drops it when the phase ends. A failing item (error
/// or panic) is logged, recorded in the phase report and skipped; only
/// infrastructure failures abort [`run`](Self::run).
pub struct MultiThreadedPreprocessing {
    io: Arc<dyn PreprocessingIo>,
    logger: Arc<dyn PreprocessingLogger>,
    num_workers: usize,
    reader_factory: ReaderFactory,
    grouper: Box<dyn GroupArchives>,
    merger_factory: MergerFactory,
    cleaner_factory: CleanerFactory,
}

impl MultiThreadedPreprocessing {
    pub fn new(
        io: Arc<dyn PreprocessingIo>,
        logger: Arc<dyn PreprocessingLogger>,
        num_workers: usize,
        reader_factory: impl Fn(usize) -> Box<dyn ReadIdentifiers> + Send + Sync + 'static,
        grouper: impl GroupArchives + 'static,
        merger_factory: impl Fn(usize) -> Box<dyn MergeGroup> + Send + Sync + 'static,
        cleaner_factory: impl Fn(usize) -> Box<dyn CleanArchive> + Send + Sync + 'static,
    ) -> Result<Self, RegroupError> {
        if num_workers == 0 {
            return Err(RegroupError::Worker(
                "at least one worker is required".to_string(),
            ));
        }

        let root = Path::new("");
        logger.init(
            num_workers,
            &io.full_path_in(root),
            &io.full_path_merged(root),
            &io.full_path_out(root),
        );

        Ok(Self {
            io,
            logger,
            num_workers,
            reader_factory: Box::new(reader_factory),
            grouper: Box::new(grouper),
            merger_factory: Box::new(merger_factory),
            cleaner_factory: Box::new(cleaner_factory),
        })
    }

    /// Wires the archive-backed components for record type `R`.
    /// `configure_cleaner` runs once for every per-worker cleaner, typically
    /// to register filters.
    pub fn for_records<R, L>(
        io: Arc<dyn PreprocessingIo>,
        logger: Arc<L>,
        num_workers: usize,
        configure_cleaner: impl Fn(&mut Cleaner<R>) + Send + Sync + 'static,
    ) -> Result<Self, RegroupError>
    where
        R: Record,
        L: PreprocessingLogger + GrouperLogger + CleanerLogger + 'static,
    {
        let grouper_logger: Arc<dyn GrouperLogger> = logger.clone();
        let cleaner_logger: Arc<dyn CleanerLogger> = logger.clone();
        let merger_io = io.clone();
        let cleaner_io = io.clone();

        Self::new(
            io,
            logger,
            num_workers,
            |_| Box::new(IdentifierReader::<R>::new()),
            Grouper::new(grouper_logger),
            move |_| Box::new(GroupMerger::<R>::new(merger_io.clone())),
            move |_| {
                let mut cleaner = Cleaner::<R>::new(cleaner_io.clone(), cleaner_logger.clone());
                configure_cleaner(&mut cleaner);
                Box::new(cleaner)
            },
        )
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn run(&self) -> Result<RunSummary, RegroupError> {
        let archives = self.io.find_relative_archive_paths()?;
        let root = Path::new("");
        ensure_directory_exists(&self.io.full_path_merged(root))?;
        ensure_directory_exists(&self.io.full_path_out(root))?;

        let data = PreprocessingData::new(archives);
        let mut summary = RunSummary {
            archives: data.num_archives(),
            ..RunSummary::default()
        };

        summary.read_ids = self.read_all_ids(&data)?;

        self.logger.group_archives_by_ids();
        let ids = data.take_ids()?;
        let groups = self.grouper.group_related_archives(&ids);
        data.store_groups(groups)?;
        summary.groups = data.num_groups();

        summary.merge = self.merge_all_groups(&data)?;
        summary.clean = self.clean_all_archives(&data)?;
        summary.cleaned_archives = data.cleaned_archives();

        Ok(summary)
    }

    fn read_all_ids(&self, data: &PreprocessingData) -> Result<PhaseReport, RegroupError> {
        self.logger.reading_ids(data.num_archives());
        self.run_workers("read-ids", |worker_id| {
            self.logger.start_worker_read_ids(worker_id);
            let mut reader = (self.reader_factory)(worker_id);
            let mut report = PhaseReport::default();

            while let Some(archive) = data.try_take_next_unindexed_archive() {
                self.logger.read_ids(worker_id, &archive);
                let outcome = attempt(|| {
                    let ids = reader.read(&self.io.full_path_in(&archive))?;
                    data.store_ids(&archive, ids)
                });
                self.settle(&mut report, worker_id, archive.display().to_string(), outcome);
            }

            drop(reader);
            self.logger.stop_worker_read_ids(worker_id);
            report
        })
    }

    fn merge_all_groups(&self, data: &PreprocessingData) -> Result<PhaseReport, RegroupError> {
        self.logger.merge_groups(data.num_groups());
        self.run_workers("merge", |worker_id| {
            self.logger.start_worker_merge_group(worker_id);
            let mut merger = (self.merger_factory)(worker_id);
            let mut report = PhaseReport::default();

            while let Some(group) = data.try_take_next_unmerged_group() {
                self.logger.merge_group(worker_id, group.len());
                let outcome = attempt(|| {
                    if let Some(merged) = merger.merge(&group)? {
                        data.store_merged_archive(merged);
                    }
                    Ok(())
                });
                self.settle(&mut report, worker_id, describe_group(&group), outcome);
            }

            drop(merger);
            self.logger.stop_worker_merge_group(worker_id);
            report
        })
    }

    fn clean_all_archives(&self, data: &PreprocessingData) -> Result<PhaseReport, RegroupError> {
        self.logger.cleaning(data.num_merged());
        self.run_workers("clean", |worker_id| {
            self.logger.start_worker_clean_archive(worker_id);
            let mut cleaner = (self.cleaner_factory)(worker_id);
            let mut report = PhaseReport::default();

            while let Some(archive) = data.try_take_next_uncleaned_archive() {
                self.logger.clean_archive(worker_id, &archive);
                let outcome = attempt(|| {
                    cleaner.clean(&archive)?;
                    data.store_cleaned_archive(archive.clone());
                    Ok(())
                });
                self.settle(&mut report, worker_id, archive.display().to_string(), outcome);
            }

            drop(cleaner);
            self.logger.stop_worker_clean_archive(worker_id);
            report
        })
    }

    /// Spawns one scoped thread per worker and joins them all.
    fn run_workers<F>(&self, phase: &str, work: F) -> Result<PhaseReport, RegroupError>
    where
        F: Fn(usize) -> PhaseReport + Sync,
    {
        thread::scope(|scope| {
            let work = &work;
            let mut handles = Vec::with_capacity(self.num_workers);
            for worker_id in 0..self.num_workers {
                let handle = thread::Builder::new()
                    .name(format!("{}-{}", phase, worker_id))
                    .spawn_scoped(scope, move || work(worker_id))
                    .map_err(|e| {
                        RegroupError::Worker(format!(
                            "cannot spawn {} worker {}: {}",
                            phase, worker_id, e
                        ))
                    })?;
                handles.push(handle);
            }

            let mut report = PhaseReport::default();
            for (worker_id, handle) in handles.into_iter().enumerate() {
                let worker_report = handle.join().map_err(|payload| {
                    RegroupError::Worker(format!(
                        "{} worker {} died: {}",
                        phase,
                        worker_id,
                        RegroupError::from_panic(payload)
                    ))
                })?;
                report.absorb(worker_report);
            }
            Ok(report)
        })
    }

    fn settle(
        &self,
        report: &mut PhaseReport,
        worker_id: usize,
        item: String,
        outcome: Result<(), RegroupError>,
    ) {
        match outcome {
            Ok(()) => report.processed += 1,
            Err(error) => {
                self.logger.error(worker_id, &item, &error);
                report.failures.push(ItemFailure {
                    worker_id,
                    item,
                    error,
                });
            }
        }
    }
}

/// Runs one item, turning a panic into an error.
fn attempt(work: impl FnOnce() -> Result<(), RegroupError>) -> Result<(), RegroupError> {
    match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(outcome) => outcome,
        Err(payload) => Err(RegroupError::from_panic(payload)),
    }
}

fn describe_group(group: &Group) -> String {
    match group.first() {
        Some(first) if group.len() > 1 => {
            format!("{} (+{} archives)", first.display(), group.len() - 1)
        }
        Some(first) => first.display().to_string(),
        None => "empty group".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaner::StageCounts;
    use crate::identifier::{identifier_set, IdentifierSet};
    use crate::logging::NoopLogger;
    use rustc_hash::FxHashMap;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    /// Directory layout that never touches the filesystem except for the
    /// output roots, which live in a temp dir.
    struct FakeIo {
        archives: BTreeSet<PathBuf>,
        root: tempfile::TempDir,
    }

    impl FakeIo {
        fn with(archives: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                archives: archives.iter().map(PathBuf::from).collect(),
                root: tempfile::tempdir().unwrap(),
            })
        }
    }

    impl PreprocessingIo for FakeIo {
        fn find_relative_archive_paths(&self) -> Result<BTreeSet<PathBuf>, RegroupError> {
            Ok(self.archives.clone())
        }

        fn full_path_in(&self, rel: &Path) -> PathBuf {
            Path::new("in").join(rel)
        }

        fn full_path_merged(&self, rel: &Path) -> PathBuf {
            self.root.path().join("merged").join(rel)
        }

        fn full_path_out(&self, rel: &Path) -> PathBuf {
            self.root.path().join("out").join(rel)
        }
    }

    /// Every archive `x` has the ids `x` and its first character.
    struct PrefixReader;

    impl ReadIdentifiers for PrefixReader {
        fn read(&mut self, archive: &Path) -> Result<IdentifierSet, RegroupError> {
            let name = archive
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or("no file name")?;
            if name.starts_with("bad") {
                return Err("test exception".into());
            }
            if name.starts_with("panic") {
                panic!("reader exploded");
            }
            Ok(identifier_set([name, &name[..1]]))
        }
    }

    struct FirstMember;

    impl MergeGroup for FirstMember {
        fn merge(&mut self, group: &Group) -> Result<Option<PathBuf>, RegroupError> {
            Ok(group.first().cloned())
        }
    }

    #[derive(Default)]
    struct CleanLog(Mutex<Vec<PathBuf>>);

    struct LoggingCleaner(Arc<CleanLog>);

    impl CleanArchive for LoggingCleaner {
        fn clean(&mut self, archive: &Path) -> Result<StageCounts, RegroupError> {
            self.0.0.lock().unwrap().push(archive.to_path_buf());
            Ok(StageCounts::new())
        }
    }

    fn pipeline(
        io: Arc<FakeIo>,
        workers: usize,
        cleaned: Arc<CleanLog>,
    ) -> MultiThreadedPreprocessing {
        MultiThreadedPreprocessing::new(
            io,
            Arc::new(NoopLogger),
            workers,
            |_| Box::new(PrefixReader),
            Grouper::default(),
            |_| Box::new(FirstMember),
            move |_| Box::new(LoggingCleaner(cleaned.clone())),
        )
        .unwrap()
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let result = MultiThreadedPreprocessing::new(
            FakeIo::with(&[]),
            Arc::new(NoopLogger),
            0,
            |_| Box::new(PrefixReader),
            Grouper::default(),
            |_| Box::new(FirstMember),
            |_| Box::new(LoggingCleaner(Arc::default())),
        );
        assert!(matches!(result, Err(RegroupError::Worker(_))));
    }

    #[test]
    fn test_archives_with_shared_prefix_end_up_in_one_group() {
        let cleaned = Arc::new(CleanLog::default());
        let io = FakeIo::with(&["a1", "a2", "b1", "c1", "c2", "c3"]);

        let summary = pipeline(io, 3, cleaned.clone()).run().unwrap();

        assert_eq!(summary.archives, 6);
        assert_eq!(summary.read_ids.processed, 6);
        assert_eq!(summary.groups, 3);
        assert_eq!(summary.merge.processed, 3);
        assert_eq!(
            summary.cleaned_archives,
            vec![PathBuf::from("a1"), PathBuf::from("b1"), PathBuf::from("c1")]
        );
        let mut seen = cleaned.0.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, summary.cleaned_archives);
        assert!(!summary.has_failures());
    }

    #[test]
    fn test_failing_and_panicking_items_are_skipped() {
        let cleaned = Arc::new(CleanLog::default());
        let io = FakeIo::with(&["a1", "bad1", "panic1", "z1"]);

        let summary = pipeline(io, 2, cleaned).run().unwrap();

        assert_eq!(summary.read_ids.processed, 2);
        assert_eq!(summary.read_ids.failures.len(), 2);
        assert_eq!(summary.read_ids.attempted(), 4);
        assert_eq!(summary.groups, 2);

        let mut errors: Vec<String> = summary.failures().map(|f| f.error.to_string()).collect();
        errors.sort();
        assert_eq!(errors, vec!["Error: test exception", "Panic: reader exploded"]);
    }

    #[test]
    fn test_output_roots_are_created() {
        let io = FakeIo::with(&[]);
        let summary = pipeline(io.clone(), 1, Arc::default()).run().unwrap();

        assert_eq!(summary.groups, 0);
        assert!(io.full_path_merged(Path::new("")).is_dir());
        assert!(io.full_path_out(Path::new("")).is_dir());
    }

    #[test]
    fn test_grouper_sees_only_successfully_read_archives() {
        struct CapturingGrouper(Arc<Mutex<Vec<PathBuf>>>);

        impl GroupArchives for CapturingGrouper {
            fn group_related_archives(
                &self,
                archives: &FxHashMap<PathBuf, IdentifierSet>,
            ) -> Vec<Group> {
                let mut seen = self.0.lock().unwrap();
                seen.extend(archives.keys().cloned());
                seen.sort();
                Vec::new()
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sut = MultiThreadedPreprocessing::new(
            FakeIo::with(&["a", "bad"]),
            Arc::new(NoopLogger),
            2,
            |_| Box::new(PrefixReader),
            CapturingGrouper(seen.clone()),
            |_| Box::new(FirstMember),
            |_| Box::new(LoggingCleaner(Arc::default())),
        )
        .unwrap();

        sut.run().unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![PathBuf::from("a")]);
    }

    #[test]
    fn test_describe_group() {
        let group: Group = [PathBuf::from("b"), PathBuf::from("a")].into_iter().collect();
        assert_eq!(describe_group(&group), "a (+1 archives)");
        assert_eq!(describe_group(&Group::new()), "empty group");
    }
}
