// Stage orchestration.
//
// Each entity runs Loader -> Cleaner/Mapper -> Aggregator -> Roll-up and
// persists its tables. A time window with no raw files for an entity skips
// that entity; anything that breaks an aggregate invariant aborts the run.
use crate::aggregator::{aggregate_case_daily, aggregate_flights_daily};
use crate::cleaner::{clean_case_reports, CleanReport};
use crate::config::{discover_files, DataPaths, RunParams};
use crate::error::Result;
use crate::loader::{load_airports, load_case_reports, load_countries, load_flight_lists, LoadReport};
use crate::mapper::{map_flights, AirportReference, CountryReference, MapReport};
use crate::output::{write_json, write_rows};
use crate::rollup::{rollup_case_monthly, rollup_flight_monthly};
use crate::types::{
    CaseReportRecord, DailyCaseAggregate, DailyCaseRow, DailyFlightAggregate, DailyFlightRow,
    FlightRecord, MonthlyCaseAggregate, MonthlyCaseRow, MonthlyFlightAggregate, MonthlyFlightRow,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, info_span, warn};

#[derive(Debug, Clone, Serialize)]
pub struct CaseSummary {
    pub load: LoadReport,
    pub clean: CleanReport,
    pub daily_rows: usize,
    pub monthly_rows: usize,
    pub filtered_monthly_rows: Option<usize>,
    pub outputs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlightSummary {
    pub load: LoadReport,
    pub map: MapReport,
    pub daily_rows: usize,
    pub monthly_rows: usize,
    pub outputs: Vec<PathBuf>,
}

/// Audit counts for one run, persisted as `summary_<window>_<countries>.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub window: String,
    pub countries: Vec<String>,
    pub cases: Option<CaseSummary>,
    pub flights: Option<FlightSummary>,
}

pub struct CaseOutputs {
    pub daily: Vec<DailyCaseRow>,
    pub monthly: Vec<MonthlyCaseRow>,
    pub summary: CaseSummary,
}

pub struct FlightOutputs {
    pub daily: Vec<DailyFlightRow>,
    pub monthly: Vec<MonthlyFlightRow>,
    pub summary: FlightSummary,
}

pub struct RunOutputs {
    pub cases: Option<CaseOutputs>,
    pub flights: Option<FlightOutputs>,
    pub summary: RunSummary,
}

/// Clean, aggregate and roll up loaded case reports.
pub fn process_case_reports(
    records: &[CaseReportRecord],
) -> Result<(Vec<DailyCaseAggregate>, Vec<MonthlyCaseAggregate>, CleanReport)> {
    let (clean, report) = clean_case_reports(records);
    let daily = aggregate_case_daily(&clean)?;
    let monthly = rollup_case_monthly(&daily)?;
    Ok((daily, monthly, report))
}

/// Map, filter, aggregate and roll up loaded flights.
pub fn process_flights(
    flights: &[FlightRecord],
    airports: &AirportReference,
    countries: &CountryReference,
    params: &RunParams,
) -> Result<(Vec<DailyFlightAggregate>, Vec<MonthlyFlightAggregate>, MapReport)> {
    let (mapped, report) = map_flights(flights, airports, countries);
    let daily = aggregate_flights_daily(mapped, params)?;
    let monthly = rollup_flight_monthly(&daily, params.direction)?;
    Ok((daily, monthly, report))
}

pub fn run_cases(paths: &DataPaths, params: &RunParams) -> Result<Option<CaseOutputs>> {
    let _span = info_span!("cases", window = %params.window).entered();
    let files = discover_files(&paths.covid_dir(), &params.window.case_file_pattern())?;
    if files.is_empty() {
        warn!(dir = %paths.covid_dir().display(), "No case report files for this window; skipping");
        return Ok(None);
    }

    let (records, load) = load_case_reports(&files)?;
    let (daily, monthly, clean) = process_case_reports(&records)?;

    let window = params.window;
    let daily_path = paths.output_path(&format!("covid_daily_{}_all", window));
    let monthly_path = paths.output_path(&format!("covid_monthly_{}_all", window));
    let daily_rows: Vec<DailyCaseRow> = write_rows(&daily_path, &daily)?;
    let monthly_rows: Vec<MonthlyCaseRow> = write_rows(&monthly_path, &monthly)?;
    let mut outputs = vec![daily_path, monthly_path];

    let mut filtered_monthly_rows = None;
    if params.has_country_filter() {
        let path = paths.output_path(&format!("covid_monthly_{}_{}", window, params.country_tag()));
        let selected = monthly.iter().filter(|m| params.countries.contains(&m.country));
        let rows: Vec<MonthlyCaseRow> = write_rows(&path, selected)?;
        if rows.is_empty() {
            warn!(countries = ?params.countries, "Country filter matched no case data");
        }
        filtered_monthly_rows = Some(rows.len());
        outputs.push(path);
    }

    let summary = CaseSummary {
        load,
        clean,
        daily_rows: daily_rows.len(),
        monthly_rows: monthly_rows.len(),
        filtered_monthly_rows,
        outputs,
    };
    Ok(Some(CaseOutputs { daily: daily_rows, monthly: monthly_rows, summary }))
}

pub fn run_flights(paths: &DataPaths, params: &RunParams) -> Result<Option<FlightOutputs>> {
    let _span = info_span!("flights", window = %params.window).entered();
    let files = discover_files(&paths.flight_dir(), &params.window.flight_file_pattern())?;
    if files.is_empty() {
        warn!(dir = %paths.flight_dir().display(), "No flight lists for this window; skipping");
        return Ok(None);
    }

    let airports = load_airports(&paths.airports_path())?;
    let countries = load_countries(&paths.countries_path())?;
    for name in params.flight_countries() {
        if countries.code(&name).is_none() {
            warn!(country = %name, "Country filter name is not in the country reference table");
        }
    }

    let (flights, load) = load_flight_lists(&files)?;
    let (daily, monthly, map) = process_flights(&flights, &airports, &countries, params)?;

    let tag = params.country_tag();
    let daily_path = paths.output_path(&format!("flight_daily_{}_{}", params.window, tag));
    let monthly_path = paths.output_path(&format!("flight_monthly_{}_{}", params.window, tag));
    let daily_rows: Vec<DailyFlightRow> = write_rows(&daily_path, &daily)?;
    let monthly_rows: Vec<MonthlyFlightRow> = write_rows(&monthly_path, &monthly)?;

    let summary = FlightSummary {
        load,
        map,
        daily_rows: daily_rows.len(),
        monthly_rows: monthly_rows.len(),
        outputs: vec![daily_path, monthly_path],
    };
    Ok(Some(FlightOutputs { daily: daily_rows, monthly: monthly_rows, summary }))
}

/// Run both entities for the selected window and persist the run summary.
pub fn run(paths: &DataPaths, params: &RunParams) -> Result<RunOutputs> {
    info!(window = %params.window, countries = ?params.countries, "Starting run");
    let cases = run_cases(paths, params)?;
    let flights = run_flights(paths, params)?;

    let summary = RunSummary {
        window: params.window.to_string(),
        countries: params.countries.clone(),
        cases: cases.as_ref().map(|c| c.summary.clone()),
        flights: flights.as_ref().map(|f| f.summary.clone()),
    };
    let summary_path = paths
        .save_dir()
        .join(format!("summary_{}_{}.json", params.window, params.country_tag()));
    write_json(&summary_path, &summary)?;
    info!(file = %summary_path.display(), "Run complete");

    Ok(RunOutputs { cases, flights, summary })
}
