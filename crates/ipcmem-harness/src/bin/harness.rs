//! CLI entrypoint for the ipcmem stress harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use ipcmem_core::SizeClassTable;
use ipcmem_harness::config::{default_threads, parse_seed};
use ipcmem_harness::{StressRunner, TableReport, logging};

/// Stress and inspection tooling for the ipcmem allocation engine.
#[derive(Debug, Parser)]
#[command(name = "ipcmem-harness")]
#[command(about = "Stress harness for the ipcmem allocation engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Markdown,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Drive one dispatcher from many threads and report pool behavior.
    Run {
        /// Worker threads per wave (default: IPCMEM_HARNESS_THREADS or 4).
        #[arg(long)]
        threads: Option<usize>,
        /// Waves of workers; later waves adopt instances left by earlier ones.
        #[arg(long, default_value_t = 2)]
        waves: usize,
        /// Alloc-or-free steps per worker.
        #[arg(long, default_value_t = 10_000)]
        iterations: usize,
        /// Root seed (decimal or 0x...).
        #[arg(long, default_value = "0xC0FF_EE00")]
        seed: String,
        /// Largest request size in bytes.
        #[arg(long, default_value_t = 512)]
        max_size: usize,
        /// Live blocks each worker keeps at most.
        #[arg(long, default_value_t = 64)]
        live_slots: usize,
        #[arg(long, value_enum, default_value = "markdown")]
        format: Format,
        /// Write the report here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the default size-class routing table.
    Table {
        #[arg(long, value_enum, default_value = "markdown")]
        format: Format,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            threads,
            waves,
            iterations,
            seed,
            max_size,
            live_slots,
            format,
            output,
        } => {
            let runner = StressRunner {
                threads: threads.unwrap_or_else(default_threads),
                waves,
                iterations,
                seed: parse_seed(&seed)?,
                max_size,
                live_slots,
            };
            eprintln!(
                "Running {} x {} workers, {} steps each",
                runner.waves, runner.threads, runner.iterations
            );
            let report = runner.run()?;
            let body = match format {
                Format::Markdown => report.to_markdown(),
                Format::Json => report.to_json(),
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, body)?;
                    eprintln!("Wrote report to {}", path.display());
                }
                None => println!("{body}"),
            }
        }
        Command::Table { format } => {
            let table = TableReport::new(&SizeClassTable::DEFAULT);
            match format {
                Format::Markdown => println!("{}", table.to_markdown()),
                Format::Json => println!("{}", table.to_json()),
            }
        }
    }

    Ok(())
}
