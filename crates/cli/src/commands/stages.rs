//! The `stages` command

use anyhow::Result;
use loadtest_lib::{build_stages, ramp::total_duration};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_table, print_warning, OutputFormat};

/// Row for the stages table
#[derive(Tabled, Serialize)]
struct StageRow {
    #[tabled(rename = "Stage")]
    stage: usize,
    #[tabled(rename = "Duration (min)")]
    duration_minutes: u64,
    #[tabled(rename = "Target VUs")]
    target: u32,
}

/// Print the ramp profile a run would follow
pub fn show_stages(duration_minutes: u64, max_vus: u32, format: OutputFormat) -> Result<()> {
    let stages = build_stages(duration_minutes, max_vus);

    let rows: Vec<StageRow> = stages
        .iter()
        .enumerate()
        .map(|(i, s)| StageRow {
            stage: i + 1,
            duration_minutes: s.duration_minutes(),
            target: s.target,
        })
        .collect();

    print_table(&rows, format);

    if matches!(format, OutputFormat::Table) {
        let total = total_duration(&stages).as_secs() / 60;
        println!("\nTotal: {} minutes", total);
        if total != duration_minutes {
            print_warning(&format!(
                "Rounded stage durations add up to {} instead of {} minutes",
                total, duration_minutes
            ));
        }
    }

    Ok(())
}
