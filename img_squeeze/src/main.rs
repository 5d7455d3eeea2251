use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use console::style;
use img_squeeze::{probe_file, run_batch, SqueezeConfig};
use shared_utils::errors::report_error;
use shared_utils::logging::{init_logging, LogConfig};
use shared_utils::report::{print_summary_report, BatchSummary};
use shared_utils::search::{CancelToken, SearchPolicy};
use shared_utils::types::FileSize;
use std::io::IsTerminal;
use std::path::PathBuf;

const PROGRAM: &str = "img-squeeze";

#[derive(Parser)]
#[command(name = "img-squeeze")]
#[command(version, about = "Squeeze JPEG files under a size ceiling while mirroring a directory tree", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror INPUT into OUTPUT, re-encoding oversized JPEGs
    Run {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[arg(short, long, value_name = "OUTPUT")]
        output: PathBuf,

        #[command(flatten)]
        search: SearchArgs,

        /// Worker threads (default: balanced for this machine)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Cancel the remaining work after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout_secs: Option<u64>,

        /// JSON config file; command-line flags override it
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Also process hidden files and directories
        #[arg(long)]
        include_hidden: bool,

        /// Do not copy the original when a file fails
        #[arg(long)]
        no_copy_on_error: bool,

        #[arg(short, long)]
        verbose: bool,

        /// Directory for rolling log files (default: system temp dir)
        #[arg(long, value_name = "DIR")]
        log_dir: Option<PathBuf>,

        /// Print the batch summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the search on one JPEG in memory and report every probe
    Probe {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[command(flatten)]
        search: SearchArgs,

        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        #[arg(short, long)]
        verbose: bool,

        #[arg(long)]
        json: bool,
    },
}

/// 两个子命令共用的搜索参数；未给出的沿用配置文件 / 默认值
#[derive(Args, Debug, Default)]
struct SearchArgs {
    /// Size ceiling per file, e.g. 500000, 800K, 2M
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    max_size: Option<u64>,

    /// Fraction the ceiling may be exceeded by (0.05 = 5%)
    #[arg(long)]
    tolerance: Option<f64>,

    #[arg(long)]
    min_quality: Option<u8>,

    #[arg(long)]
    max_quality: Option<u8>,

    /// Minimum SSIM against the original; enables similarity gating
    #[arg(long, value_name = "SSIM")]
    min_ssim: Option<f64>,

    /// binary | linear
    #[arg(long)]
    policy: Option<SearchPolicy>,

    /// Quality step for linear descent and the fallback sweep
    #[arg(long)]
    step: Option<u8>,

    /// Maximum encodes per file
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Longest side used for SSIM scoring (0 = full resolution)
    #[arg(long, value_name = "PIXELS")]
    ssim_max_side: Option<u32>,
}

impl SearchArgs {
    fn apply(&self, config: &mut SqueezeConfig) {
        if let Some(v) = self.max_size {
            config.max_bytes = v;
        }
        if let Some(v) = self.tolerance {
            config.tolerance = v;
        }
        if let Some(v) = self.min_quality {
            config.min_quality = v;
        }
        if let Some(v) = self.max_quality {
            config.max_quality = v;
        }
        if self.min_ssim.is_some() {
            config.min_similarity = self.min_ssim;
        }
        if let Some(v) = self.policy {
            config.policy = v;
        }
        if let Some(v) = self.step {
            config.step = v;
        }
        if let Some(v) = self.max_attempts {
            config.max_attempts = v;
        }
        if let Some(v) = self.ssim_max_side {
            config.ssim_max_side = v;
        }
    }
}

fn parse_size(text: &str) -> std::result::Result<u64, String> {
    FileSize::parse(text)
        .map(|size| size.bytes())
        .ok_or_else(|| format!("invalid size '{}' (expected e.g. 500000, 800K, 2M)", text))
}

fn main() {
    let cli = Cli::parse();
    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            let err: &(dyn std::error::Error + 'static) = e.as_ref();
            report_error(PROGRAM, err);
            2
        }
    };
    std::process::exit(code);
}

fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run {
            input,
            output,
            search,
            jobs,
            timeout_secs,
            config,
            include_hidden,
            no_copy_on_error,
            verbose,
            log_dir,
            json,
        } => {
            let show_progress = !json && std::io::stderr().is_terminal();
            let mut log_config = LogConfig::default()
                .with_verbose(verbose)
                .with_quiet_stderr(show_progress || json);
            if let Some(dir) = log_dir {
                log_config = log_config.with_log_dir(dir);
            }
            init_logging(PROGRAM, log_config)?;

            let mut config = SqueezeConfig::load(config.as_deref())?;
            search.apply(&mut config);
            if jobs.is_some() {
                config.jobs = jobs;
            }
            if timeout_secs.is_some() {
                config.timeout_secs = timeout_secs;
            }
            config.include_hidden |= include_hidden;
            if no_copy_on_error {
                config.copy_on_error = false;
            }
            let settings = config.validate()?;

            let cancel = match settings.timeout {
                Some(timeout) => CancelToken::with_timeout(timeout),
                None => CancelToken::new(),
            };
            let handler_token = cancel.clone();
            ctrlc::set_handler(move || {
                tracing::warn!("interrupt received, finishing in-flight files");
                handler_token.cancel();
            })
            .context("Failed to install Ctrl-C handler")?;

            if !json {
                eprintln!(
                    "{} {} → {}  (ceiling {}, quality {}, {})",
                    style("🗜️  img-squeeze").cyan().bold(),
                    input.display(),
                    output.display(),
                    settings.ceiling,
                    settings.bounds,
                    settings.options.policy
                );
            }

            let run = run_batch(&input, &output, &settings, &cancel, show_progress)?;

            if json {
                let summary = BatchSummary::new(&run.result, run.duration);
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary_report(&run.result, run.duration, "Squeeze");
                if run.cancelled {
                    eprintln!(
                        "{}",
                        style("⚠️  Cancelled: remaining files were skipped").yellow()
                    );
                }
            }
            Ok(run.exit_code())
        }

        Commands::Probe {
            file,
            search,
            config,
            verbose,
            json,
        } => {
            let log_config = LogConfig::default()
                .with_verbose(verbose)
                .with_quiet_stderr(json);
            init_logging(PROGRAM, log_config)?;

            let mut config = SqueezeConfig::load(config.as_deref())?;
            search.apply(&mut config);
            let settings = config.validate()?;

            let report = probe_file(&file, &settings, &CancelToken::new())
                .with_context(|| format!("Probe failed: {}", file.display()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("📷 {}", style(report.path.display()).bold());
                println!(
                    "   input {}  ceiling {} (accepts ≤ {})",
                    FileSize::new(report.input_size),
                    FileSize::new(report.ceiling),
                    FileSize::new(report.accepted_limit)
                );
                for attempt in &report.attempts {
                    let ssim = attempt
                        .similarity
                        .map(|s| format!("  ssim {}", s))
                        .unwrap_or_default();
                    println!(
                        "   q{:<3} {:>12}{}",
                        attempt.quality,
                        FileSize::new(attempt.size),
                        ssim
                    );
                }
                match report.quality {
                    Some(q) => {
                        println!(
                            "   {} q{} → {} ({} encodes)",
                            style("✅ accepted").green(),
                            q,
                            FileSize::new(report.output_size.unwrap_or(0)),
                            report.encodes
                        );
                        if let Some(ssim) = report.similarity {
                            println!("   ssim {} {}", ssim, ssim.quality_description());
                        }
                    }
                    None => println!(
                        "   {} {} ({} encodes)",
                        style("↩️ ").yellow(),
                        report.outcome,
                        report.encodes
                    ),
                }
                if let Some((low, high)) = report.non_monotonic {
                    println!(
                        "   {} q{} produced a smaller file than q{}",
                        style("⚠️  non-monotonic:").yellow(),
                        high,
                        low
                    );
                }
            }
            Ok(0)
        }
    }
}
