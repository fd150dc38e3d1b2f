// patchverify/src/cli/run.rs
use std::io;
use std::time::Instant;

use clap::Args;
use colored::Colorize;
use patchverify_common::config::Config;
use patchverify_common::error::Result;
use patchverify_common::model::RunSummary;
use patchverify_core::{PipelineOrchestrator, ServiceMessageReporter};
use tracing::debug;

use super::ConfigArgs;

#[derive(Args, Debug)]
pub struct Run {
    #[command(flatten)]
    pub config: ConfigArgs,
}

impl Run {
    pub async fn run(&self, config: &Config) -> Result<bool> {
        let started = Instant::now();
        let orchestrator = PipelineOrchestrator::new(config)?;
        let mut reporter = ServiceMessageReporter::new(io::stdout());
        let report = orchestrator.run(&mut reporter).await?;
        let elapsed = humantime::format_duration(round_to_seconds(started.elapsed()));
        debug!("Run took {}", elapsed);

        eprintln!("{} (in {})", render_summary(&report.summary), elapsed);
        Ok(report.summary.is_success())
    }
}

fn round_to_seconds(duration: std::time::Duration) -> std::time::Duration {
    std::time::Duration::from_secs(duration.as_secs())
}

fn render_summary(summary: &RunSummary) -> String {
    let line = format!(
        "{} trials: {} equal, {} unequal, {} ignored, {} errored",
        summary.total, summary.equal, summary.unequal, summary.ignored, summary.errored
    );
    if summary.is_success() {
        line.green().bold().to_string()
    } else {
        line.red().bold().to_string()
    }
}
