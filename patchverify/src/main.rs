// patchverify/src/main.rs
use std::fs;
use std::process;

use clap::Parser;
use colored::Colorize;
use patchverify_common::config::Config;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

mod cli;
use cli::CliArgs;

/// Some trial was unequal or errored.
const EXIT_TRIALS_FAILED: i32 = 1;
/// The run could not start or aborted before reporting.
const EXIT_SETUP_FAILED: i32 = 2;

fn init_logging(verbose: u8, config: Option<&Config>) {
    let level_filter = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let max_log_level = level_filter.into_level().unwrap_or(tracing::Level::INFO);

    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .with_env_var("PATCHVERIFY_LOG")
        .from_env_lossy();

    // stdout carries service messages, so logs go to stderr.
    let log_dir = config.filter(|_| verbose > 0).map(Config::logs_dir);
    match log_dir {
        Some(dir) => {
            if let Err(e) = fs::create_dir_all(&dir) {
                eprintln!(
                    "{} Failed to create log directory {}: {}",
                    "Error:".red().bold(),
                    dir.display(),
                    e
                );
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(env_filter)
                    .with_writer(std::io::stderr)
                    .without_time()
                    .try_init();
                return;
            }
            let file_appender = tracing_appender::rolling::daily(&dir, "patchverify.log");
            let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);

            let stderr_writer = std::io::stderr.with_max_level(max_log_level);
            let file_writer = non_blocking_appender.with_max_level(max_log_level);

            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(stderr_writer.and(file_writer))
                .with_ansi(true)
                .without_time()
                .try_init();

            Box::leak(Box::new(guard)); // Keep guard alive

            debug!(
                "Verbose logging enabled. Writing logs to: {}/patchverify.log",
                dir.display()
            );
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .without_time()
                .try_init();
        }
    }
}

#[tokio::main]
async fn main() {
    let cli_args = CliArgs::parse();

    let config = match cli_args.command.config_args().load() {
        Ok(config) => config,
        Err(e) => {
            init_logging(cli_args.verbose, None);
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            process::exit(EXIT_SETUP_FAILED);
        }
    };
    init_logging(cli_args.verbose, Some(&config));

    match cli_args.command.run(&config).await {
        Ok(true) => {}
        Ok(false) => process::exit(EXIT_TRIALS_FAILED),
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            process::exit(EXIT_SETUP_FAILED);
        }
    }
}
