use clap::Parser;
use regroup::event::{CommandFilter, Event};
use regroup::file_handler::IoConfig;
use regroup::logging::{init_tracing, TracingLogger};
use regroup::preprocessing::MultiThreadedPreprocessing;
use regroup::RegroupError;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "regroup")]
#[command(about = "Regroups interaction archives by user, then merges and cleans them", long_about = None)]
struct Cli {
    /// State directory holding input/, merged/ and final/
    #[arg(long, env = "REGROUP_STATE_DIR", default_value = "./regroup_state")]
    state_dir: PathBuf,

    /// Worker threads per phase (defaults to the available parallelism)
    #[arg(long)]
    workers: Option<usize>,

    /// Drop every command event with this id while cleaning (repeatable)
    #[arg(long = "drop-command", value_name = "ID")]
    drop_commands: Vec<String>,
}

fn main() -> Result<(), RegroupError> {
    init_tracing();
    let cli = Cli::parse();

    let workers = cli.workers.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    let config = IoConfig::under(&cli.state_dir);
    info!("[regroup] State directory: {}", cli.state_dir.display());

    let drop_commands = cli.drop_commands;
    let preprocessing = MultiThreadedPreprocessing::for_records::<Event, _>(
        Arc::new(config),
        Arc::new(TracingLogger::new()),
        workers,
        move |cleaner| {
            for command_id in &drop_commands {
                cleaner.add_filter(CommandFilter::new(command_id.as_str()));
            }
        },
    )?;

    let summary = preprocessing.run()?;

    info!(
        "[regroup] {} archives, {} read, {} groups, {} merged, {} cleaned",
        summary.archives,
        summary.read_ids.processed,
        summary.groups,
        summary.merge.processed,
        summary.clean.processed
    );
    for failure in summary.failures() {
        warn!(
            "[regroup] worker {} failed on {}: {}",
            failure.worker_id, failure.item, failure.error
        );
    }
    if summary.has_failures() {
        error!("[regroup] Finished with {} failed items", summary.failures().count());
    } else {
        info!("[regroup] Finished, results in {}", cli.state_dir.join("final").display());
    }

    Ok(())
}
