use crate::error::{PipelineError, Result};
use crate::mapper::{AirportReference, CountryReference};
use crate::types::{CaseReportRecord, FlightRecord, StatValues};
use crate::util::{non_empty, parse_day_prefix, parse_f64_safe, parse_i64_safe, parse_timestamp_safe};
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord};
use flate2::read::GzDecoder;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Timestamp,
    Integer,
    Float,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldType,
}

/// An ordered list of named, typed columns a raw file must carry exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: &[(&'static str, FieldType)]) -> Self {
        Schema {
            fields: fields.iter().map(|&(name, kind)| Field { name, kind }).collect(),
        }
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.fields.len()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Same names in the same order. A UTF-8 BOM on the first cell is ignored.
    pub fn matches_header(&self, header: &StringRecord) -> bool {
        header.len() == self.fields.len()
            && header.iter().zip(&self.fields).enumerate().all(|(i, (cell, field))| {
                let cell = if i == 0 { cell.trim_start_matches('\u{feff}') } else { cell };
                cell.trim() == field.name
            })
    }
}

/// Layout of the daily case reports from mid-2020 on.
pub static CASE_REPORT_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    use FieldType::*;
    Schema::new(&[
        ("FIPS", Text),
        ("Admin2", Text),
        ("Province_State", Text),
        ("Country_Region", Text),
        ("Last_Update", Timestamp),
        ("Lat", Float),
        ("Long_", Float),
        ("Confirmed", Integer),
        ("Deaths", Integer),
        ("Recovered", Integer),
        ("Active", Integer),
        ("Combined_Key", Text),
        ("Incident_Rate", Float),
        ("Case_Fatality_Ratio", Float),
    ])
});

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Timestamp(NaiveDateTime),
    Integer(i64),
    Float(f64),
}

/// One parsed row; `None` is an empty cell.
pub type TypedRow = Vec<Option<Value>>;

#[derive(Debug, Clone, PartialEq)]
pub enum FileLoad {
    /// The header did not conform; the file contributes nothing.
    HeaderMismatch(Vec<String>),
    /// Reading failed part way (truncated or corrupt stream); rows already
    /// read are discarded.
    Unreadable(String),
    Rows { rows: Vec<TypedRow>, malformed: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub files_read: usize,
    pub skipped_files: Vec<PathBuf>,
    pub total_rows: usize,
    pub malformed_rows: usize,
}

impl LoadReport {
    pub fn loaded_rows(&self) -> usize {
        self.total_rows - self.malformed_rows
    }
}

fn parse_cell(raw: &str, kind: FieldType) -> std::result::Result<Option<Value>, ()> {
    let Some(cell) = non_empty(raw) else {
        return Ok(None);
    };
    let value = match kind {
        FieldType::Text => Value::Text(cell.to_string()),
        FieldType::Timestamp => Value::Timestamp(parse_timestamp_safe(cell).ok_or(())?),
        FieldType::Integer => Value::Integer(parse_i64_safe(cell).ok_or(())?),
        FieldType::Float => Value::Float(parse_f64_safe(cell).ok_or(())?),
    };
    Ok(Some(value))
}

/// Parse one record against `schema`; `None` marks the row malformed.
pub fn parse_row(record: &StringRecord, schema: &Schema) -> Option<TypedRow> {
    if record.len() != schema.width() {
        return None;
    }
    record
        .iter()
        .zip(&schema.fields)
        .map(|(raw, field)| parse_cell(raw, field.kind).ok())
        .collect()
}

/// Header row with bytes that are not UTF-8 replaced. Only a failure of the
/// underlying stream is an error.
fn read_header<R: Read>(rdr: &mut csv::Reader<R>) -> csv::Result<StringRecord> {
    let raw = rdr.byte_headers()?;
    Ok(raw.iter().map(String::from_utf8_lossy).collect())
}

/// Read a whole CSV stream against a fixed schema. Header mismatches and
/// broken streams reject the file; bad rows are counted and dropped.
pub fn read_typed<R: Read>(reader: R, schema: &Schema) -> FileLoad {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let header = match read_header(&mut rdr) {
        Ok(header) => header,
        Err(e) => return FileLoad::Unreadable(e.to_string()),
    };
    if !schema.matches_header(&header) {
        return FileLoad::HeaderMismatch(header.iter().map(str::to_string).collect());
    }

    let mut rows = Vec::new();
    let mut malformed = 0usize;
    for result in rdr.records() {
        match result {
            Ok(record) => match parse_row(&record, schema) {
                Some(row) => rows.push(row),
                None => malformed += 1,
            },
            Err(e) if e.is_io_error() => return FileLoad::Unreadable(e.to_string()),
            Err(_) => malformed += 1,
        }
    }
    FileLoad::Rows { rows, malformed }
}

/// Open a raw file, transparently decompressing `.gz`.
pub fn open_raw(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path)?;
    let is_gz = path.extension().map_or(false, |ext| ext == "gz");
    if is_gz {
        Ok(Box::new(GzDecoder::new(BufReader::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

fn text_at(row: &TypedRow, idx: Option<usize>) -> Option<String> {
    match idx.and_then(|i| row.get(i)) {
        Some(Some(Value::Text(s))) => Some(s.clone()),
        _ => None,
    }
}

fn int_at(row: &TypedRow, idx: Option<usize>) -> Option<i64> {
    match idx.and_then(|i| row.get(i)) {
        Some(Some(Value::Integer(v))) => Some(*v),
        _ => None,
    }
}

fn timestamp_at(row: &TypedRow, idx: Option<usize>) -> Option<NaiveDateTime> {
    match idx.and_then(|i| row.get(i)) {
        Some(Some(Value::Timestamp(ts))) => Some(*ts),
        _ => None,
    }
}

impl CaseReportRecord {
    pub fn from_typed(row: &TypedRow, schema: &Schema) -> Self {
        CaseReportRecord {
            country: text_at(row, schema.index_of("Country_Region")),
            province: text_at(row, schema.index_of("Province_State")),
            admin2: text_at(row, schema.index_of("Admin2")),
            last_update: timestamp_at(row, schema.index_of("Last_Update")),
            stats: StatValues::new(
                int_at(row, schema.index_of("Confirmed")),
                int_at(row, schema.index_of("Deaths")),
                int_at(row, schema.index_of("Recovered")),
                int_at(row, schema.index_of("Active")),
            ),
        }
    }
}

/// Load every daily case report in `paths`, skipping non-conforming files.
pub fn load_case_reports(paths: &[PathBuf]) -> Result<(Vec<CaseReportRecord>, LoadReport)> {
    let schema: &Schema = &CASE_REPORT_SCHEMA;
    let mut report = LoadReport::default();
    let mut records = Vec::new();

    for path in paths {
        match read_typed(open_raw(path)?, schema) {
            FileLoad::HeaderMismatch(header) => {
                warn!(file = %path.display(), ?header, "Skipping case report with non-conforming header");
                report.skipped_files.push(path.clone());
            }
            FileLoad::Unreadable(reason) => {
                warn!(file = %path.display(), %reason, "Skipping unreadable case report");
                report.skipped_files.push(path.clone());
            }
            FileLoad::Rows { rows, malformed } => {
                debug!(file = %path.display(), rows = rows.len(), malformed, "Loaded case report");
                report.files_read += 1;
                report.total_rows += rows.len() + malformed;
                report.malformed_rows += malformed;
                records.extend(rows.iter().map(|row| CaseReportRecord::from_typed(row, schema)));
            }
        }
    }

    info!(
        files = report.files_read,
        skipped_files = report.skipped_files.len(),
        rows = report.loaded_rows(),
        malformed = report.malformed_rows,
        "Case reports loaded"
    );
    Ok((records, report))
}

/// Column positions of the three flight-list fields we keep.
struct FlightColumns {
    day: usize,
    origin: usize,
    destination: usize,
}

impl FlightColumns {
    fn locate(header: &StringRecord) -> Option<Self> {
        let find = |name: &str| {
            header
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
        };
        Some(FlightColumns {
            day: find("day")?,
            origin: find("origin")?,
            destination: find("destination")?,
        })
    }
}

enum FlightFile {
    MissingColumns,
    Unreadable(String),
    Rows { records: Vec<FlightRecord>, rows: usize, malformed: usize },
}

fn read_flights<R: Read>(reader: R) -> FlightFile {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let header = match read_header(&mut rdr) {
        Ok(header) => header,
        Err(e) => return FlightFile::Unreadable(e.to_string()),
    };
    let Some(cols) = FlightColumns::locate(&header) else {
        return FlightFile::MissingColumns;
    };

    let mut records = Vec::new();
    let (mut rows, mut malformed) = (0usize, 0usize);
    for result in rdr.records() {
        rows += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) if e.is_io_error() => return FlightFile::Unreadable(e.to_string()),
            Err(_) => { malformed += 1; continue; }
        };
        let (Some(day), Some(origin), Some(destination)) =
            (record.get(cols.day), record.get(cols.origin), record.get(cols.destination))
        else {
            malformed += 1;
            continue;
        };
        records.push(FlightRecord {
            date: parse_day_prefix(day),
            origin: non_empty(origin).map(str::to_string),
            destination: non_empty(destination).map(str::to_string),
        });
    }
    FlightFile::Rows { records, rows, malformed }
}

/// Load flight lists (`.csv` or `.csv.gz`). Files lacking `day`, `origin` or
/// `destination` columns, or that cannot be read to the end, are skipped.
pub fn load_flight_lists(paths: &[PathBuf]) -> Result<(Vec<FlightRecord>, LoadReport)> {
    let mut report = LoadReport::default();
    let mut records = Vec::new();

    for path in paths {
        info!(file = %path.display(), "Loading flight list");
        match read_flights(open_raw(path)?) {
            FlightFile::MissingColumns => {
                warn!(file = %path.display(), "Skipping flight list without day/origin/destination columns");
                report.skipped_files.push(path.clone());
            }
            FlightFile::Unreadable(reason) => {
                warn!(file = %path.display(), %reason, "Skipping unreadable flight list");
                report.skipped_files.push(path.clone());
            }
            FlightFile::Rows { records: file_records, rows, malformed } => {
                report.files_read += 1;
                report.total_rows += rows;
                report.malformed_rows += malformed;
                records.extend(file_records);
            }
        }
    }

    info!(
        files = report.files_read,
        skipped_files = report.skipped_files.len(),
        rows = report.loaded_rows(),
        malformed = report.malformed_rows,
        "Flight lists loaded"
    );
    Ok((records, report))
}

fn require_column(header: &StringRecord, table: &Path, column: &str) -> Result<usize> {
    header
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').trim() == column)
        .ok_or_else(|| PipelineError::MissingColumn {
            table: table.display().to_string(),
            column: column.to_string(),
        })
}

/// Airport table with `icao`, `country` and optionally `iata` columns.
pub fn load_airports(path: &Path) -> Result<AirportReference> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(open_raw(path)?);
    let header = read_header(&mut rdr)?;
    let icao_idx = require_column(&header, path, "icao")?;
    let country_idx = require_column(&header, path, "country")?;
    let iata_idx = require_column(&header, path, "iata").ok();

    let mut airports = AirportReference::default();
    for result in rdr.records() {
        let Ok(record) = result else { continue };
        let Some(country) = record.get(country_idx).and_then(non_empty) else { continue };
        let icao = record.get(icao_idx).and_then(non_empty);
        let iata = iata_idx.and_then(|i| record.get(i)).and_then(non_empty);
        airports.insert(icao, iata, country);
    }
    if airports.is_empty() {
        warn!(file = %path.display(), "Airport reference has no usable rows; every flight will be unresolved");
    }
    info!(airports = airports.len(), file = %path.display(), "Airport reference loaded");
    Ok(airports)
}

/// Country table keyed by ISO alpha-2 code.
pub fn load_countries(path: &Path) -> Result<CountryReference> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(open_raw(path)?);
    let header = read_header(&mut rdr)?;
    let name_idx = require_column(&header, path, "English short name lower case")?;
    let code_idx = require_column(&header, path, "Alpha-2 code")?;

    let mut countries = CountryReference::default();
    for result in rdr.records() {
        let Ok(record) = result else { continue };
        if let (Some(code), Some(name)) = (
            record.get(code_idx).and_then(non_empty),
            record.get(name_idx).and_then(non_empty),
        ) {
            countries.insert(code, name);
        }
    }
    if countries.is_empty() {
        warn!(file = %path.display(), "Country reference has no usable rows; every flight will be unresolved");
    }
    info!(countries = countries.len(), file = %path.display(), "Country reference loaded");
    Ok(countries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const CASE_HEADER: &str = "FIPS,Admin2,Province_State,Country_Region,Last_Update,Lat,Long_,Confirmed,Deaths,Recovered,Active,Combined_Key,Incident_Rate,Case_Fatality_Ratio";

    #[test]
    fn conforming_file_parses_typed_rows() {
        let data = format!(
            "{CASE_HEADER}\n,,,Afghanistan,2020-03-01 10:00:00,33.9,67.7,166,4,2,160,Afghanistan,0.4,2.4\n"
        );
        let load = read_typed(data.as_bytes(), &CASE_REPORT_SCHEMA);
        let FileLoad::Rows { rows, malformed } = load else { panic!("expected rows") };
        assert_eq!(malformed, 0);
        let rec = CaseReportRecord::from_typed(&rows[0], &CASE_REPORT_SCHEMA);
        assert_eq!(rec.country.as_deref(), Some("Afghanistan"));
        assert_eq!(rec.province, None);
        assert_eq!(rec.last_update.unwrap().date(), NaiveDate::from_ymd_opt(2020, 3, 1).unwrap());
        assert_eq!(rec.stats, StatValues::new(Some(166), Some(4), Some(2), Some(160)));
    }

    #[test]
    fn legacy_header_is_rejected_outright() {
        let data = "Country/Region,Last Update,Confirmed,Deaths\nChina,2020-01-22,1,0\n";
        let load = read_typed(data.as_bytes(), &CASE_REPORT_SCHEMA);
        assert!(matches!(load, FileLoad::HeaderMismatch(ref h) if h[0] == "Country/Region"));
    }

    #[test]
    fn reordered_header_is_rejected() {
        let header = CASE_HEADER.replace("Confirmed,Deaths", "Deaths,Confirmed");
        let load = read_typed(format!("{header}\n").as_bytes(), &CASE_REPORT_SCHEMA);
        assert!(matches!(load, FileLoad::HeaderMismatch(_)));
    }

    #[test]
    fn bom_on_first_header_cell_is_tolerated() {
        let data = format!("\u{feff}{CASE_HEADER}\n");
        let load = read_typed(data.as_bytes(), &CASE_REPORT_SCHEMA);
        assert!(matches!(load, FileLoad::Rows { .. }));
    }

    #[test]
    fn malformed_rows_are_dropped_and_empty_cells_are_null() {
        let data = format!(
            "{CASE_HEADER}\n\
             ,,,France,2020-04-01 00:00:00,,,abc,0,0,0,France,,\n\
             ,,,France,2020-04-01 00:00:00,,,10,0\n\
             ,,,France,not-a-date,,,10,0,0,0,France,,\n\
             ,,,France,,,,10,,,,France,,\n"
        );
        let FileLoad::Rows { rows, malformed } = read_typed(data.as_bytes(), &CASE_REPORT_SCHEMA) else {
            panic!("expected rows")
        };
        assert_eq!(malformed, 3);
        assert_eq!(rows.len(), 1);
        let rec = CaseReportRecord::from_typed(&rows[0], &CASE_REPORT_SCHEMA);
        assert_eq!(rec.last_update, None);
        assert_eq!(rec.stats, StatValues::new(Some(10), None, None, None));
    }

    #[test]
    fn load_case_reports_counts_skipped_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("03-01-2020.csv");
        let bad = dir.path().join("03-02-2020.csv");
        std::fs::write(&good, format!("{CASE_HEADER}\n,,,Chad,2020-03-01 00:00:00,,,1,0,0,1,Chad,,\n")).unwrap();
        std::fs::write(&bad, "Country/Region,Last Update,Confirmed,Deaths\nChad,2020-03-02,5,0\n").unwrap();

        let (records, report) = load_case_reports(&[good, bad.clone()]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(report.files_read, 1);
        assert_eq!(report.skipped_files, vec![bad]);
        assert_eq!(report.loaded_rows(), 1);
    }

    #[test]
    fn exponent_and_out_of_range_counts_are_malformed() {
        let data = format!(
            "{CASE_HEADER}\n\
             ,,N'Djamena,Chad,2020-04-01 00:00:00,,,1e19,0,0,0,Chad,,\n\
             ,,Logone,Chad,2020-04-01 00:00:00,,,1e300,0,0,0,Chad,,\n\
             ,,Ouaddai,Chad,2020-04-01 00:00:00,,,99999999999999999999,0,0,0,Chad,,\n\
             ,,Kanem,Chad,2020-04-01 00:00:00,,,12.0,0,0,0,Chad,,\n"
        );
        let FileLoad::Rows { rows, malformed } = read_typed(data.as_bytes(), &CASE_REPORT_SCHEMA) else {
            panic!("expected rows")
        };
        assert_eq!(malformed, 3);
        let rec = CaseReportRecord::from_typed(&rows[0], &CASE_REPORT_SCHEMA);
        assert_eq!(rec.stats.get(crate::types::Stat::Confirmed), Some(12));
    }

    #[test]
    fn undecodable_header_skips_only_that_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("03-01-2020.csv");
        let bad = dir.path().join("03-02-2020.csv");
        std::fs::write(&good, format!("{CASE_HEADER}\n,,,Chad,2020-03-01 00:00:00,,,1,0,0,1,Chad,,\n")).unwrap();
        let mut bytes = b"FIPS,Admin\xe92".to_vec();
        bytes.extend_from_slice(CASE_HEADER.trim_start_matches("FIPS,Admin2").as_bytes());
        bytes.extend_from_slice(b"\n,,,Chad,2020-03-02 00:00:00,,,5,0,0,5,Chad,,\n");
        std::fs::write(&bad, bytes).unwrap();

        let (records, report) = load_case_reports(&[good, bad.clone()]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(report.files_read, 1);
        assert_eq!(report.skipped_files, vec![bad]);
    }

    #[test]
    fn truncated_gzip_flight_list_is_skipped_whole() {
        let dir = tempfile::tempdir().unwrap();
        let mut body = String::from("callsign,origin,destination,day\n");
        for i in 0..5000 {
            body.push_str(&format!("F{i},YMML,LFPG,2018-12-{:02} 00:00:00+00:00\n", i % 28 + 1));
        }
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(body.as_bytes()).unwrap();
        let compressed = enc.finish().unwrap();

        let path = dir.path().join("flightlist_20181201_20181231.csv.gz");
        std::fs::write(&path, &compressed[..compressed.len() / 2]).unwrap();
        let (flights, report) = load_flight_lists(&[path.clone()]).unwrap();
        assert!(flights.is_empty());
        assert_eq!(report.files_read, 0);
        assert_eq!(report.total_rows, 0);
        assert_eq!(report.skipped_files, vec![path]);
    }

    #[test]
    fn flight_columns_are_found_past_undecodable_header_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flightlist_20181201_20181231.csv");
        std::fs::write(&path, b"call\xffsign,origin,destination,day\nQFA1,YMML,LFPG,2018-12-31 00:00:00+00:00\n").unwrap();
        let (flights, report) = load_flight_lists(&[path]).unwrap();
        assert_eq!(report.files_read, 1);
        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].destination.as_deref(), Some("LFPG"));
    }

    #[test]
    fn gzip_flight_list_is_read_by_column_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flightlist_20181201_20181231.csv.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        enc.write_all(
            b"callsign,origin,destination,day\n\
              QFA1,YMML,LFPG,2018-12-31 00:00:00+00:00\n\
              QFA2,,LFPG,2018-12-31 00:00:00+00:00\n\
              QFA3,YMML\n",
        )
        .unwrap();
        enc.finish().unwrap();

        let (flights, report) = load_flight_lists(&[path]).unwrap();
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.malformed_rows, 1);
        assert_eq!(
            flights[0],
            FlightRecord {
                date: NaiveDate::from_ymd_opt(2018, 12, 31),
                origin: Some("YMML".to_string()),
                destination: Some("LFPG".to_string()),
            }
        );
        assert_eq!(flights[1].origin, None);
    }

    #[test]
    fn flight_list_without_required_columns_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flightlist_20181201_20181231.csv");
        std::fs::write(&path, "callsign,from,to\nQFA1,YMML,LFPG\n").unwrap();
        let (flights, report) = load_flight_lists(&[path.clone()]).unwrap();
        assert!(flights.is_empty());
        assert_eq!(report.skipped_files, vec![path]);
    }

    #[test]
    fn reference_tables_load_and_report_missing_columns() {
        let dir = tempfile::tempdir().unwrap();
        let airports = dir.path().join("airports.csv");
        std::fs::write(&airports, "icao,iata,name,country\nYMML,MEL,Melbourne,AU\nLFPG,CDG,Paris,FR\n").unwrap();
        let countries = dir.path().join("countries.csv");
        std::fs::write(
            &countries,
            "English short name lower case,Alpha-2 code,Alpha-3 code\nAustralia,AU,AUS\nFrance,FR,FRA\n",
        )
        .unwrap();

        let a = load_airports(&airports).unwrap();
        assert_eq!(a.country_code("YMML"), Some("AU"));
        assert_eq!(a.country_code("CDG"), Some("FR"));
        let c = load_countries(&countries).unwrap();
        assert_eq!(c.name("FR"), Some("France"));

        let broken = dir.path().join("broken.csv");
        std::fs::write(&broken, "code,name\nAU,Australia\n").unwrap();
        assert!(matches!(
            load_countries(&broken),
            Err(PipelineError::MissingColumn { ref column, .. }) if column == "English short name lower case"
        ));
    }
}
