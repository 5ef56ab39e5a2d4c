use regroup::archive::write_all;
use regroup::cleaner::{CleanArchive, Cleaner, StageCounts};
use regroup::event::Event;
use regroup::file_handler::{IoConfig, PreprocessingIo};
use regroup::group_merger::{GroupMerger, MergeGroup};
use regroup::grouper::{Group, Grouper};
use regroup::identifier_reader::{IdentifierReader, ReadIdentifiers};
use regroup::logging::PreprocessingLogger;
use regroup::preprocessing::{MultiThreadedPreprocessing, RunSummary};
use regroup::{IdentifierSet, RegroupError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Archives 0..6, where archives 2k and 2k+1 share a profile.
fn setup() -> (tempfile::TempDir, Arc<IoConfig>) {
    let dir = tempfile::tempdir().unwrap();
    let io = Arc::new(IoConfig::under(dir.path()));
    for i in 0..6 {
        let events = [
            Event::profile(i, &format!("user-{}", i / 2)),
            Event::command(i, "x"),
        ];
        write_all(io.full_path_in(&rel(i as usize)), &events).unwrap();
    }
    (dir, io)
}

fn rel(i: usize) -> PathBuf {
    PathBuf::from(format!("{}.arc", i))
}

#[derive(Default)]
struct ErrorLog(Mutex<Vec<(String, String)>>);

impl PreprocessingLogger for ErrorLog {
    fn error(&self, _worker_id: usize, item: &str, error: &RegroupError) {
        self.0.lock().unwrap().push((item.to_string(), error.to_string()));
    }
}

impl ErrorLog {
    fn entries(&self) -> Vec<(String, String)> {
        let mut entries = self.0.lock().unwrap().clone();
        entries.sort();
        entries
    }
}

enum Crash {
    Error,
    Panic,
}

fn crash(kind: &Crash) -> RegroupError {
    match kind {
        Crash::Error => "test exception".into(),
        Crash::Panic => panic!("test panic"),
    }
}

struct CrashingReader {
    inner: IdentifierReader<Event>,
    victim: PathBuf,
    kind: Arc<Crash>,
}

impl ReadIdentifiers for CrashingReader {
    fn read(&mut self, archive: &Path) -> Result<IdentifierSet, RegroupError> {
        if archive.ends_with(&self.victim) {
            return Err(crash(&self.kind));
        }
        self.inner.read(archive)
    }
}

struct CrashingMerger {
    inner: GroupMerger<Event>,
    victim: PathBuf,
}

impl MergeGroup for CrashingMerger {
    fn merge(&mut self, group: &Group) -> Result<Option<PathBuf>, RegroupError> {
        if group.contains(&self.victim) {
            return Err(crash(&Crash::Error));
        }
        self.inner.merge(group)
    }
}

struct CrashingCleaner {
    inner: Cleaner<Event>,
    victim: PathBuf,
}

impl CleanArchive for CrashingCleaner {
    fn clean(&mut self, archive: &Path) -> Result<StageCounts, RegroupError> {
        if archive == self.victim {
            return Err(crash(&Crash::Panic));
        }
        self.inner.clean(archive)
    }
}

struct Victims {
    reader: Option<(PathBuf, Crash)>,
    merger: Option<PathBuf>,
    cleaner: Option<PathBuf>,
}

fn run(io: Arc<IoConfig>, log: Arc<ErrorLog>, victims: Victims) -> RunSummary {
    let reader_victim = victims.reader.map(|(p, k)| (p, Arc::new(k)));
    let merger_io = io.clone();
    let merger_victim = victims.merger.unwrap_or_default();
    let cleaner_io = io.clone();
    let cleaner_victim = victims.cleaner.unwrap_or_default();

    MultiThreadedPreprocessing::new(
        io.clone(),
        log,
        3,
        move |_| match &reader_victim {
            Some((victim, kind)) => Box::new(CrashingReader {
                inner: IdentifierReader::new(),
                victim: victim.clone(),
                kind: kind.clone(),
            }),
            None => Box::new(IdentifierReader::<Event>::new()),
        },
        Grouper::default(),
        move |_| {
            Box::new(CrashingMerger {
                inner: GroupMerger::new(merger_io.clone()),
                victim: merger_victim.clone(),
            })
        },
        move |_| {
            Box::new(CrashingCleaner {
                inner: Cleaner::without_logging(cleaner_io.clone()),
                victim: cleaner_victim.clone(),
            })
        },
    )
    .unwrap()
    .run()
    .unwrap()
}

fn out_exists(io: &IoConfig, i: usize) -> bool {
    io.full_path_out(&rel(i)).is_file()
}

#[test]
fn test_crashing_reader_excludes_only_its_archive() {
    let (_dir, io) = setup();
    let log = Arc::new(ErrorLog::default());

    let summary = run(
        io.clone(),
        log.clone(),
        Victims {
            reader: Some((rel(0), Crash::Error)),
            merger: None,
            cleaner: None,
        },
    );

    assert_eq!(
        log.entries(),
        vec![("0.arc".to_string(), "Error: test exception".to_string())]
    );
    assert_eq!(summary.read_ids.processed, 5);
    assert_eq!(summary.read_ids.failures[0].item, "0.arc");
    // archive 1 no longer has a partner
    assert_eq!(summary.groups, 3);
    assert!(!out_exists(&io, 0));
    assert!(out_exists(&io, 1));
    assert!(out_exists(&io, 2));
    assert!(out_exists(&io, 4));
}

#[test]
fn test_panicking_reader_is_contained() {
    let (_dir, io) = setup();
    let log = Arc::new(ErrorLog::default());

    let summary = run(
        io.clone(),
        log.clone(),
        Victims {
            reader: Some((rel(3), Crash::Panic)),
            merger: None,
            cleaner: None,
        },
    );

    assert_eq!(
        log.entries(),
        vec![("3.arc".to_string(), "Panic: test panic".to_string())]
    );
    assert_eq!(summary.cleaned_archives, vec![rel(0), rel(2), rel(4)]);
}

#[test]
fn test_crashing_merger_drops_only_its_group() {
    let (_dir, io) = setup();
    let log = Arc::new(ErrorLog::default());

    let summary = run(
        io.clone(),
        log.clone(),
        Victims {
            reader: None,
            merger: Some(rel(3)),
            cleaner: None,
        },
    );

    assert_eq!(
        log.entries(),
        vec![("2.arc (+1 archives)".to_string(), "Error: test exception".to_string())]
    );
    assert_eq!(summary.merge.processed, 2);
    assert_eq!(summary.cleaned_archives, vec![rel(0), rel(4)]);
    assert!(!io.full_path_merged(&rel(2)).exists());
}

#[test]
fn test_crashing_cleaner_leaves_other_archives_alone() {
    let (_dir, io) = setup();
    let log = Arc::new(ErrorLog::default());

    let summary = run(
        io.clone(),
        log.clone(),
        Victims {
            reader: None,
            merger: None,
            cleaner: Some(rel(4)),
        },
    );

    assert_eq!(
        log.entries(),
        vec![("4.arc".to_string(), "Panic: test panic".to_string())]
    );
    assert_eq!(summary.clean.failures.len(), 1);
    assert_eq!(summary.cleaned_archives, vec![rel(0), rel(2)]);
    assert!(!out_exists(&io, 4));
}
