//! CLI entrypoint for the segalloc trace harness.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use segalloc_core::SearchPolicy;
use segalloc_core::arena::DEFAULT_VEC_ARENA_LIMIT;
use segalloc_harness::structured_log::{LogEmitter, LogEntry, LogLevel, validate_log_file};
use segalloc_harness::trace::parse_u64_loose;
use segalloc_harness::{DriverOptions, HarnessError, Trace, generate_storm, parse_trace, replay};

/// Trace tooling for the segalloc allocator.
#[derive(Debug, Parser)]
#[command(name = "segalloc-harness")]
#[command(about = "Replay allocation traces against the segalloc engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Args)]
struct RunArgs {
    /// Class search policy (`skip-sparse` or `sequential`).
    #[arg(long, default_value = "skip-sparse")]
    policy: String,
    /// Arena size limit in bytes.
    #[arg(long, default_value_t = DEFAULT_VEC_ARENA_LIMIT)]
    arena_limit: usize,
    /// Skip the heap check after each operation.
    #[arg(long)]
    no_check: bool,
    /// Write lifecycle records as JSONL to this path.
    #[arg(long)]
    log: Option<PathBuf>,
    /// Output report path (if omitted, prints to stdout).
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay a trace file.
    Replay {
        /// Trace script path.
        #[arg(long)]
        trace: PathBuf,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Generate and replay a seeded random workload.
    Storm {
        /// Root seed (decimal or 0x...).
        #[arg(long, default_value = "0xC0FF_EE00")]
        seed: String,
        /// Number of operations before the final frees.
        #[arg(long, default_value_t = 10_000)]
        ops: usize,
        /// Number of distinct allocation ids.
        #[arg(long, default_value_t = 256)]
        slots: u32,
        /// Largest single request in bytes.
        #[arg(long, default_value_t = 16_384)]
        max_size: usize,
        /// Also write the generated trace to this path.
        #[arg(long)]
        emit_trace: Option<PathBuf>,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Validate a structured JSONL log.
    ValidateLog {
        #[arg(long)]
        log: PathBuf,
    },
}

fn run_trace(trace: &Trace, args: &RunArgs) -> Result<(), HarnessError> {
    let policy = SearchPolicy::from_str_loose(&args.policy);
    let options = DriverOptions {
        policy,
        arena_limit: args.arena_limit,
        check_each_op: !args.no_check,
        lifecycle_logging: args.log.is_some(),
    };
    let run_id = &trace.sha256[..12];
    let mut emitter = match &args.log {
        Some(path) => Some(LogEmitter::to_file(path, run_id)?),
        None => None,
    };
    if let Some(emitter) = emitter.as_mut() {
        let start = LogEntry::new("", LogLevel::Info, "replay_start")
            .with_policy(policy.as_str())
            .with_details(serde_json::json!({
                "trace_sha256": trace.sha256,
                "ops": trace.ops.len(),
            }));
        emitter.emit_entry(start)?;
    }

    let result = replay(trace, &options);

    if let Some(emitter) = emitter.as_mut() {
        let end = match &result {
            Ok(outcome) => {
                for (line, record) in &outcome.records {
                    let entry = LogEntry::from_record(record)
                        .with_policy(policy.as_str())
                        .with_trace_line(*line);
                    emitter.emit_entry(entry)?;
                }
                LogEntry::new("", LogLevel::Info, "replay_end")
                    .with_outcome("pass")
                    .with_details(serde_json::to_value(&outcome.report)?)
            }
            Err(err) => LogEntry::new("", LogLevel::Error, "replay_end")
                .with_outcome("fail")
                .with_details(serde_json::json!({ "error": err.to_string() })),
        };
        emitter.emit_entry(end.with_policy(policy.as_str()))?;
        emitter.flush()?;
    }

    let outcome = result?;
    let json = serde_json::to_string_pretty(&outcome.report)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))?;
            eprintln!("Wrote replay report to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn validate(path: &Path) -> Result<bool, HarnessError> {
    let (lines, errors) = validate_log_file(path)?;
    for err in &errors {
        eprintln!("{err}");
    }
    eprintln!(
        "{}: {lines} line(s), {} error(s)",
        path.display(),
        errors.len()
    );
    Ok(errors.is_empty())
}

fn run(cli: Cli) -> Result<i32, HarnessError> {
    match cli.command {
        Command::Replay { trace, run } => {
            let text = std::fs::read_to_string(&trace)?;
            let parsed = parse_trace(&text)?;
            eprintln!(
                "Replaying {} ({} ops, policy {})",
                trace.display(),
                parsed.ops.len(),
                run.policy
            );
            run_trace(&parsed, &run)?;
        }
        Command::Storm {
            seed,
            ops,
            slots,
            max_size,
            emit_trace,
            run,
        } => {
            let Some(seed) = parse_u64_loose(&seed) else {
                eprintln!("invalid seed '{seed}'");
                return Ok(2);
            };
            let storm = generate_storm(seed, ops, slots, max_size);
            if let Some(path) = &emit_trace {
                std::fs::write(path, storm.to_text())?;
                eprintln!("Wrote storm trace to {}", path.display());
            }
            run_trace(&storm, &run)?;
        }
        Command::ValidateLog { log } => {
            if !validate(&log)? {
                return Ok(1);
            }
        }
    }
    Ok(0)
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.exit_code());
        }
    }
}
