// patchverify/src/cli/plan.rs
use clap::Args;
use colored::Colorize;
use patchverify_common::config::Config;
use patchverify_common::error::Result;
use patchverify_core::pipeline::{collect_patches, plan_trials, PlannedTrial};
use prettytable::{format, Cell, Row, Table};

use super::ConfigArgs;

#[derive(Args, Debug)]
pub struct Plan {
    #[command(flatten)]
    pub config: ConfigArgs,
}

impl Plan {
    pub async fn run(&self, config: &Config) -> Result<bool> {
        let patches = collect_patches(config).await?;
        let plan = plan_trials(&patches, config);
        if plan.is_empty() {
            println!(
                "{}",
                format!("No patch artifacts matching '{}'", config.patch_marker).yellow()
            );
            return Ok(true);
        }

        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
        table.add_row(Row::new(vec![
            Cell::new("Trial").style_spec("b"),
            Cell::new("Previous installer").style_spec("b"),
            Cell::new("Current installer").style_spec("b"),
        ]));
        let mut invalid = 0;
        for planned in &plan {
            match planned {
                PlannedTrial::Ready(trial) => {
                    table.add_row(Row::new(vec![
                        Cell::new(&trial.name).style_spec("Fb"),
                        Cell::new(
                            &trial
                                .patch
                                .previous_installer(&config.product, trial.kind)
                                .file_name(),
                        ),
                        Cell::new(
                            &trial
                                .patch
                                .current_installer(&config.product, trial.kind)
                                .file_name(),
                        ),
                    ]));
                }
                PlannedTrial::Invalid { name, error } => {
                    invalid += 1;
                    table.add_row(Row::new(vec![
                        Cell::new(name).style_spec("Fr"),
                        Cell::new(&error.to_string()),
                        Cell::new("-"),
                    ]));
                }
            }
        }
        table.printstd();
        println!("{}", format!("{} trial(s) planned", plan.len()).bold());
        Ok(invalid == 0)
    }
}
