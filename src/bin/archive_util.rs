use clap::{Parser, Subcommand};
use regroup::archive::{ReadingArchive, RecordSource};
use regroup::event::Event;
use regroup::{IdentifierSet, Record, RegroupError};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "archive_util")]
#[command(about = "Inspect event archives", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the number of events in an archive
    Count { archive: PathBuf },
    /// Print the identifiers found in an archive, one per line
    Ids { archive: PathBuf },
    /// Print every event as one JSON object per line
    Dump { archive: PathBuf },
}

fn main() -> Result<(), RegroupError> {
    let cli = Cli::parse();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Count { archive } => {
            let reader = ReadingArchive::<Event>::open(&archive)?;
            writeln!(out, "{}", reader.len())?;
        }
        Commands::Ids { archive } => {
            let mut ids = IdentifierSet::default();
            for event in ReadingArchive::<Event>::open(&archive)? {
                ids.extend(event?.identifiers());
            }
            let mut ids: Vec<_> = ids.into_iter().collect();
            ids.sort();
            for id in ids {
                writeln!(out, "{}", id)?;
            }
        }
        Commands::Dump { archive } => dump(&archive, &mut out)?,
    }

    Ok(())
}

/// Writes every event as one JSON line. Output failures are reported as I/O errors.
fn dump(archive: &Path, out: &mut impl Write) -> Result<(), RegroupError> {
    for event in ReadingArchive::<Event>::open(archive)? {
        serde_json::to_writer(&mut *out, &event?).map_err(io::Error::from)?;
        writeln!(out)?;
    }
    Ok(())
}
