// Entry point and CLI flow.
//
// One invocation processes one time window: daily case reports and flight
// lists are loaded, cleaned, mapped and aggregated to daily and monthly
// country-level tables under `<data-path>/<save-folder>`. The dashboard reads
// those files directly.
mod aggregator;
mod cleaner;
mod config;
mod error;
mod loader;
mod logging;
mod mapper;
mod output;
mod pipeline;
mod rollup;
mod types;
mod util;

use clap::Parser;
use config::{DataPaths, FlightDirection, RunParams, TimeWindow};
use pipeline::RunOutputs;
use std::process::ExitCode;
use tracing::error;

#[derive(Parser)]
#[command(name = "covid_flight_etl")]
#[command(about = "Aggregate COVID-19 case reports and flight lists to country-month tables")]
#[command(version)]
struct Cli {
    /// Window to process: YYYY, YYYYMM, or * for everything
    #[arg(long, default_value = "202101")]
    year_month: TimeWindow,

    /// Country display names to keep in the filtered outputs
    #[arg(long, num_args = 0..)]
    country: Vec<String>,

    /// Flight endpoint the country filter applies to
    #[arg(long, value_enum, default_value_t = FlightDirection::Destination)]
    direction: FlightDirection,

    #[arg(long, default_value = "./data")]
    data_path: String,

    #[arg(long, default_value = "processed_data")]
    save_folder: String,

    #[arg(long, default_value = "csse_covid_19_daily_reports")]
    covid_folder: String,

    #[arg(long, default_value = "flight_volume_raw")]
    flight_folder: String,

    #[arg(long, default_value = "airports.csv")]
    airports_file: String,

    #[arg(long, default_value = "countries.csv")]
    countries_file: String,

    #[arg(long, default_value = "info", value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: String,

    /// Rows of each table to print after the run
    #[arg(long, default_value_t = 5)]
    preview_rows: usize,
}

impl Cli {
    fn data_paths(&self) -> DataPaths {
        DataPaths {
            covid_folder: self.covid_folder.clone(),
            flight_folder: self.flight_folder.clone(),
            save_folder: self.save_folder.clone(),
            airports_file: self.airports_file.clone(),
            countries_file: self.countries_file.clone(),
            ..DataPaths::new(&self.data_path)
        }
    }

    fn run_params(&self) -> RunParams {
        RunParams::new(self.year_month, self.country.clone(), self.direction)
    }
}

/// Print the audit counts and a preview of each table.
fn print_report(outputs: &RunOutputs, preview_rows: usize) {
    let summary = &outputs.summary;
    println!("\nRun summary for window {}", summary.window);

    match &outputs.cases {
        Some(cases) => {
            let s = &cases.summary;
            println!(
                "Case reports: {} files read, {} skipped (header mismatch or unreadable), {} rows loaded, {} malformed rows dropped",
                util::format_int(s.load.files_read),
                util::format_int(s.load.skipped_files.len()),
                util::format_int(s.load.loaded_rows()),
                util::format_int(s.load.malformed_rows)
            );
            println!(
                "Cleaning: {} dropped ({:.3}%): {} missing date, {} date out of range, {} non-text country",
                util::format_int(s.clean.dropped()),
                s.clean.dropped_pct(),
                util::format_int(s.clean.missing_date),
                util::format_int(s.clean.date_out_of_range),
                util::format_int(s.clean.non_text_country)
            );
            println!();
            output::preview_table_rows("Daily cases", &cases.daily, preview_rows);
            output::preview_table_rows("Monthly cases", &cases.monthly, preview_rows);
        }
        None => println!("Case reports: no files for this window\n"),
    }

    match &outputs.flights {
        Some(flights) => {
            let s = &flights.summary;
            println!(
                "Flight lists: {} files read, {} skipped, {} rows loaded",
                util::format_int(s.load.files_read),
                util::format_int(s.load.skipped_files.len()),
                util::format_int(s.load.loaded_rows())
            );
            println!(
                "Mapping: {} unresolved dropped, {} domestic excluded, {} kept",
                util::format_int(s.map.dropped_unresolved),
                util::format_int(s.map.dropped_domestic),
                util::format_int(s.map.kept)
            );
            println!();
            output::preview_table_rows("Daily flights", &flights.daily, preview_rows);
            output::preview_table_rows("Monthly flights", &flights.monthly, preview_rows);
        }
        None => println!("Flight lists: no files for this window\n"),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level);

    match pipeline::run(&cli.data_paths(), &cli.run_params()) {
        Ok(outputs) => {
            print_report(&outputs, cli.preview_rows);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Run failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
