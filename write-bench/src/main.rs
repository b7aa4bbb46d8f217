//! In-process driver for the bookie write path.
//!
//! Producer threads put entries into a write cache; whenever it fills up the
//! cache is drained in `(ledger, entry)` order into a buffered channel over
//! the entry log, which is then forced to disk.

mod config;
mod journal;
mod logging;
mod worker;

use crate::config::Config;
use crate::journal::Journal;
use crate::worker::WorkerStats;

use buffered_channel::{BufferedChannel, HeapAllocator};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{error, info};
use write_cache::WriteCache;

#[derive(Parser)]
#[command(name = "write-bench")]
#[command(about = "In-process bookie write path benchmark")]
struct Args {
    /// Path to configuration file
    config: PathBuf,
}

fn main() {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    logging::init(&config.logging);

    if let Err(e) = run(config) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        threads = config.general.threads,
        cache_size = config.cache.size,
        segment_size = config.cache.segment_size,
        write_buffer = config.channel.write_buffer,
        read_buffer = config.channel.read_buffer,
        unpersisted_bytes_bound = config.channel.unpersisted_bytes_bound,
        entry_size = config.workload.entry_size,
        log_format = %config.logging.format,
        path = %config.channel.path.display(),
        "starting write-bench"
    );

    if let Some(parent) = config.channel.path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(config.channel.truncate)
        .open(&config.channel.path)?;

    let channel = BufferedChannel::new(
        HeapAllocator,
        file,
        config.channel.write_buffer,
        config.channel.read_buffer,
        i64::try_from(config.channel.unpersisted_bytes_bound)?,
    )?;
    let cache = WriteCache::new(config.cache.size as u64, config.cache.segment_size as u64)?;
    let journal = Arc::new(Journal::new(cache, channel, config.channel.force_metadata));

    let config = Arc::new(config);
    let deadline = config.general.duration.map(|d| Instant::now() + d);
    let start = Instant::now();

    let handles: Vec<_> = (0..config.general.threads)
        .map(|id| {
            let config = Arc::clone(&config);
            let journal = Arc::clone(&journal);
            thread::Builder::new()
                .name(format!("producer-{id}"))
                .spawn(move || worker::run_worker(id, &config.workload, &journal, deadline))
        })
        .collect::<Result<_, _>>()?;

    let mut total = WorkerStats::default();
    for handle in handles {
        let stats = handle.join().map_err(|_| "producer thread panicked")??;
        total += stats;
    }

    journal.drain()?;
    let elapsed = start.elapsed();

    let written = journal.drained_bytes();
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    info!(
        entries = total.entries,
        payload_bytes = total.bytes,
        log_bytes = written,
        drains = journal.drains(),
        elapsed = %humantime::format_duration(elapsed),
        entries_per_sec = (total.entries as f64 / secs) as u64,
        mb_per_sec = %format!("{:.1}", written as f64 / secs / (1024.0 * 1024.0)),
        "run complete"
    );

    if config.general.verify {
        let frames = journal.verify(worker::payload_matches)?;
        if frames != total.entries {
            return Err(format!(
                "entry log holds {frames} frames but {} entries were appended",
                total.entries
            )
            .into());
        }
    }

    journal.close()?;
    Ok(())
}
