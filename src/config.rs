// Run selection and on-disk layout.
//
// `RunParams` is what the driver hands to the pipeline: which period to
// process and which countries the filtered outputs should keep. `DataPaths`
// says where the raw feeds, reference tables and outputs live.
use crate::error::{PipelineError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The period a run covers, as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    All,
    Year(i32),
    YearMonth(i32, u32),
}

impl FromStr for TimeWindow {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || PipelineError::InvalidSelector(s.to_string());
        if s == "*" {
            return Ok(TimeWindow::All);
        }
        if !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        match s.len() {
            4 => Ok(TimeWindow::Year(s.parse().map_err(|_| invalid())?)),
            6 => {
                let year: i32 = s[..4].parse().map_err(|_| invalid())?;
                let month: u32 = s[4..].parse().map_err(|_| invalid())?;
                if !(1..=12).contains(&month) {
                    return Err(invalid());
                }
                Ok(TimeWindow::YearMonth(year, month))
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeWindow::All => write!(f, "all"),
            TimeWindow::Year(y) => write!(f, "{:04}", y),
            TimeWindow::YearMonth(y, m) => write!(f, "{:04}{:02}", y, m),
        }
    }
}

impl TimeWindow {
    /// Case reports are named `MM-DD-YYYY.csv`.
    pub fn case_file_pattern(&self) -> String {
        match self {
            TimeWindow::All => "*-*-*.csv".to_string(),
            TimeWindow::Year(y) => format!("*-*-{:04}.csv", y),
            TimeWindow::YearMonth(y, m) => format!("{:02}-*-{:04}.csv", m, y),
        }
    }

    /// Flight lists are named `flightlist_YYYYMMDD_YYYYMMDD.csv.gz`.
    pub fn flight_file_pattern(&self) -> String {
        match self {
            TimeWindow::All => "flightlist_*.csv.gz".to_string(),
            TimeWindow::Year(y) => format!("flightlist_{:04}*_{:04}*.csv.gz", y, y),
            TimeWindow::YearMonth(y, m) => {
                format!("flightlist_{:04}{:02}*_{:04}{:02}*.csv.gz", y, m, y, m)
            }
        }
    }
}

/// Which flight endpoint the country filter applies to, and which endpoint
/// leads the output ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FlightDirection {
    Origin,
    #[default]
    Destination,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunParams {
    pub window: TimeWindow,
    /// Display names; empty means no filter.
    pub countries: Vec<String>,
    pub direction: FlightDirection,
}

impl RunParams {
    pub fn new(window: TimeWindow, countries: Vec<String>, direction: FlightDirection) -> Self {
        RunParams { window, countries, direction }
    }

    pub fn has_country_filter(&self) -> bool {
        !self.countries.is_empty()
    }

    /// Country names as the flight reference table spells them. The case feed
    /// calls the United States "US".
    pub fn flight_countries(&self) -> Vec<String> {
        self.countries
            .iter()
            .map(|c| if c == "US" { "United States".to_string() } else { c.clone() })
            .collect()
    }

    /// Suffix used in output file names for the country filter.
    pub fn country_tag(&self) -> String {
        if self.countries.is_empty() {
            return "all".to_string();
        }
        self.countries.join("__").replace(' ', "_").replace('*', "all")
    }
}

#[derive(Debug, Clone)]
pub struct DataPaths {
    pub data_path: PathBuf,
    pub covid_folder: String,
    pub flight_folder: String,
    pub save_folder: String,
    pub airports_file: String,
    pub countries_file: String,
}

impl DataPaths {
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        DataPaths {
            data_path: data_path.into(),
            covid_folder: "csse_covid_19_daily_reports".to_string(),
            flight_folder: "flight_volume_raw".to_string(),
            save_folder: "processed_data".to_string(),
            airports_file: "airports.csv".to_string(),
            countries_file: "countries.csv".to_string(),
        }
    }

    pub fn covid_dir(&self) -> PathBuf {
        self.data_path.join(&self.covid_folder)
    }

    pub fn flight_dir(&self) -> PathBuf {
        self.data_path.join(&self.flight_folder)
    }

    pub fn save_dir(&self) -> PathBuf {
        self.data_path.join(&self.save_folder)
    }

    pub fn airports_path(&self) -> PathBuf {
        self.data_path.join(&self.airports_file)
    }

    pub fn countries_path(&self) -> PathBuf {
        self.data_path.join(&self.countries_file)
    }

    pub fn output_path(&self, name: &str) -> PathBuf {
        self.save_dir().join(format!("{}.csv", name))
    }
}

/// Expand `pattern` inside `dir`, returning files in sorted order.
pub fn discover_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = dir.join(pattern);
    let pattern_str = full.to_string_lossy();
    let mut files = Vec::new();
    for entry in glob::glob(&pattern_str)? {
        let path = entry?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_selectors() {
        assert_eq!("2021".parse::<TimeWindow>().unwrap(), TimeWindow::Year(2021));
        assert_eq!("202103".parse::<TimeWindow>().unwrap(), TimeWindow::YearMonth(2021, 3));
        assert_eq!("*".parse::<TimeWindow>().unwrap(), TimeWindow::All);
        assert!("202113".parse::<TimeWindow>().is_err());
        assert!("21".parse::<TimeWindow>().is_err());
        assert!("2021-03".parse::<TimeWindow>().is_err());
    }

    #[test]
    fn patterns_follow_feed_naming() {
        let w = TimeWindow::YearMonth(2021, 1);
        assert_eq!(w.case_file_pattern(), "01-*-2021.csv");
        assert_eq!(w.flight_file_pattern(), "flightlist_202101*_202101*.csv.gz");
        assert_eq!(TimeWindow::Year(2020).case_file_pattern(), "*-*-2020.csv");
        assert_eq!(w.to_string(), "202101");
    }

    #[test]
    fn flight_countries_translate_us_alias() {
        let params = RunParams::new(
            TimeWindow::Year(2020),
            vec!["US".to_string(), "New Zealand".to_string()],
            FlightDirection::Destination,
        );
        assert_eq!(params.flight_countries(), vec!["United States", "New Zealand"]);
        assert_eq!(params.country_tag(), "US__New_Zealand");
    }

    #[test]
    fn discover_files_is_sorted_and_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("01-02-2021.csv"), "x").unwrap();
        std::fs::write(dir.path().join("01-01-2021.csv"), "x").unwrap();
        std::fs::write(dir.path().join("02-01-2021.csv"), "x").unwrap();
        std::fs::create_dir(dir.path().join("01-03-2021.csv")).unwrap();
        let files = discover_files(dir.path(), "01-*-2021.csv").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["01-01-2021.csv", "01-02-2021.csv"]);
    }
}
