use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};
use std::fmt;
use tabled::Tabled;

/// The four cumulative counters carried by a case report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stat {
    Confirmed,
    Deaths,
    Recovered,
    Active,
}

impl Stat {
    pub const ALL: [Stat; 4] = [Stat::Confirmed, Stat::Deaths, Stat::Recovered, Stat::Active];

    pub fn column(self) -> &'static str {
        match self {
            Stat::Confirmed => "Confirmed",
            Stat::Deaths => "Deaths",
            Stat::Recovered => "Recovered",
            Stat::Active => "Active",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// One nullable value per [`Stat`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatValues([Option<i64>; 4]);

impl StatValues {
    pub fn new(confirmed: Option<i64>, deaths: Option<i64>, recovered: Option<i64>, active: Option<i64>) -> Self {
        StatValues([confirmed, deaths, recovered, active])
    }

    pub fn get(&self, stat: Stat) -> Option<i64> {
        self.0[stat.index()]
    }

    pub fn set(&mut self, stat: Stat, value: Option<i64>) {
        self.0[stat.index()] = value;
    }

    /// Null-aware sum: a null cell contributes nothing, and a sum over
    /// nothing but nulls stays null. Fails with the stat that overflowed.
    pub fn accumulate(&mut self, other: &StatValues) -> Result<(), Stat> {
        for stat in Stat::ALL {
            let merged = match (self.get(stat), other.get(stat)) {
                (Some(a), Some(b)) => Some(a.checked_add(b).ok_or(stat)?),
                (a, b) => a.or(b),
            };
            self.set(stat, merged);
        }
        Ok(())
    }

    /// Per-stat `self - previous`, null when either side is null.
    pub fn minus(&self, previous: &StatValues) -> Result<StatValues, Stat> {
        let mut out = StatValues::default();
        for stat in Stat::ALL {
            let delta = match (self.get(stat), previous.get(stat)) {
                (Some(cur), Some(prev)) => Some(cur.checked_sub(prev).ok_or(stat)?),
                _ => None,
            };
            out.set(stat, delta);
        }
        Ok(out)
    }
}

/// Calendar month key, rendered `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl From<NaiveDate> for YearMonth {
    fn from(date: NaiveDate) -> Self {
        YearMonth { year: date.year(), month: date.month() }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One reporting unit's cumulative counts as of `last_update`, as loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseReportRecord {
    pub country: Option<String>,
    pub province: Option<String>,
    pub admin2: Option<String>,
    pub last_update: Option<NaiveDateTime>,
    pub stats: StatValues,
}

/// A case report that passed the cleaner, keyed by calendar date.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanCaseRecord {
    pub date: NaiveDate,
    pub country: String,
    pub stats: StatValues,
}

/// One flight movement as loaded; empty or unparsable cells are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightRecord {
    pub date: Option<NaiveDate>,
    pub origin: Option<String>,
    pub destination: Option<String>,
}

/// A flight after the lossy reference lookups; any field may be unresolved.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedFlight {
    pub date: Option<NaiveDate>,
    pub origin_code: Option<String>,
    pub destination_code: Option<String>,
    pub origin_country: Option<String>,
    pub destination_country: Option<String>,
}

/// A flight with every endpoint resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedFlight {
    pub date: NaiveDate,
    pub origin_code: String,
    pub destination_code: String,
    pub origin_country: String,
    pub destination_country: String,
}

impl MappedFlight {
    pub fn is_domestic(&self) -> bool {
        self.origin_code == self.destination_code
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyCaseAggregate {
    pub date: NaiveDate,
    pub country: String,
    pub cumulative: StatValues,
    /// Null for the first date of a country's series.
    pub daily_new: StatValues,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyCaseAggregate {
    pub month: YearMonth,
    pub country: String,
    pub cumulative: StatValues,
    pub monthly_new: StatValues,
}

/// Both endpoints of a cross-border route: codes and display names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Route {
    pub origin_code: String,
    pub origin_country: String,
    pub destination_code: String,
    pub destination_country: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyFlightAggregate {
    pub date: NaiveDate,
    pub route: Route,
    pub flight_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyFlightAggregate {
    pub month: YearMonth,
    pub route: Route,
    pub flight_count: u64,
}

fn display_opt(v: &Option<i64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_default()
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct DailyCaseRow {
    pub date: NaiveDate,
    #[serde(rename = "Country_Region")]
    #[tabled(rename = "Country_Region")]
    pub country: String,
    #[serde(rename = "Confirmed_cumulative")]
    #[tabled(rename = "Confirmed_cumulative", display_with = "display_opt")]
    pub confirmed_cumulative: Option<i64>,
    #[serde(rename = "Confirmed_daily_new")]
    #[tabled(rename = "Confirmed_daily_new", display_with = "display_opt")]
    pub confirmed_daily_new: Option<i64>,
    #[serde(rename = "Deaths_cumulative")]
    #[tabled(rename = "Deaths_cumulative", display_with = "display_opt")]
    pub deaths_cumulative: Option<i64>,
    #[serde(rename = "Deaths_daily_new")]
    #[tabled(rename = "Deaths_daily_new", display_with = "display_opt")]
    pub deaths_daily_new: Option<i64>,
    #[serde(rename = "Recovered_cumulative")]
    #[tabled(rename = "Recovered_cumulative", display_with = "display_opt")]
    pub recovered_cumulative: Option<i64>,
    #[serde(rename = "Recovered_daily_new")]
    #[tabled(rename = "Recovered_daily_new", display_with = "display_opt")]
    pub recovered_daily_new: Option<i64>,
    #[serde(rename = "Active_cumulative")]
    #[tabled(rename = "Active_cumulative", display_with = "display_opt")]
    pub active_cumulative: Option<i64>,
    #[serde(rename = "Active_daily_new")]
    #[tabled(rename = "Active_daily_new", display_with = "display_opt")]
    pub active_daily_new: Option<i64>,
}

impl From<&DailyCaseAggregate> for DailyCaseRow {
    fn from(a: &DailyCaseAggregate) -> Self {
        DailyCaseRow {
            date: a.date,
            country: a.country.clone(),
            confirmed_cumulative: a.cumulative.get(Stat::Confirmed),
            confirmed_daily_new: a.daily_new.get(Stat::Confirmed),
            deaths_cumulative: a.cumulative.get(Stat::Deaths),
            deaths_daily_new: a.daily_new.get(Stat::Deaths),
            recovered_cumulative: a.cumulative.get(Stat::Recovered),
            recovered_daily_new: a.daily_new.get(Stat::Recovered),
            active_cumulative: a.cumulative.get(Stat::Active),
            active_daily_new: a.daily_new.get(Stat::Active),
        }
    }
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct MonthlyCaseRow {
    pub year_month: YearMonth,
    #[serde(rename = "Country_Region")]
    #[tabled(rename = "Country_Region")]
    pub country: String,
    #[serde(rename = "Confirmed_cumulative")]
    #[tabled(rename = "Confirmed_cumulative", display_with = "display_opt")]
    pub confirmed_cumulative: Option<i64>,
    #[serde(rename = "Deaths_cumulative")]
    #[tabled(rename = "Deaths_cumulative", display_with = "display_opt")]
    pub deaths_cumulative: Option<i64>,
    #[serde(rename = "Recovered_cumulative")]
    #[tabled(rename = "Recovered_cumulative", display_with = "display_opt")]
    pub recovered_cumulative: Option<i64>,
    #[serde(rename = "Active_cumulative")]
    #[tabled(rename = "Active_cumulative", display_with = "display_opt")]
    pub active_cumulative: Option<i64>,
    #[serde(rename = "Confirmed_monthly_new")]
    #[tabled(rename = "Confirmed_monthly_new", display_with = "display_opt")]
    pub confirmed_monthly_new: Option<i64>,
    #[serde(rename = "Deaths_monthly_new")]
    #[tabled(rename = "Deaths_monthly_new", display_with = "display_opt")]
    pub deaths_monthly_new: Option<i64>,
    #[serde(rename = "Recovered_monthly_new")]
    #[tabled(rename = "Recovered_monthly_new", display_with = "display_opt")]
    pub recovered_monthly_new: Option<i64>,
    #[serde(rename = "Active_monthly_new")]
    #[tabled(rename = "Active_monthly_new", display_with = "display_opt")]
    pub active_monthly_new: Option<i64>,
}

impl From<&MonthlyCaseAggregate> for MonthlyCaseRow {
    fn from(a: &MonthlyCaseAggregate) -> Self {
        MonthlyCaseRow {
            year_month: a.month,
            country: a.country.clone(),
            confirmed_cumulative: a.cumulative.get(Stat::Confirmed),
            deaths_cumulative: a.cumulative.get(Stat::Deaths),
            recovered_cumulative: a.cumulative.get(Stat::Recovered),
            active_cumulative: a.cumulative.get(Stat::Active),
            confirmed_monthly_new: a.monthly_new.get(Stat::Confirmed),
            deaths_monthly_new: a.monthly_new.get(Stat::Deaths),
            recovered_monthly_new: a.monthly_new.get(Stat::Recovered),
            active_monthly_new: a.monthly_new.get(Stat::Active),
        }
    }
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct DailyFlightRow {
    pub day: NaiveDate,
    pub origin_country: String,
    pub origin_country_code: String,
    pub destination_country: String,
    pub destination_country_code: String,
    pub flight_count: u64,
}

impl From<&DailyFlightAggregate> for DailyFlightRow {
    fn from(a: &DailyFlightAggregate) -> Self {
        DailyFlightRow {
            day: a.date,
            origin_country: a.route.origin_country.clone(),
            origin_country_code: a.route.origin_code.clone(),
            destination_country: a.route.destination_country.clone(),
            destination_country_code: a.route.destination_code.clone(),
            flight_count: a.flight_count,
        }
    }
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct MonthlyFlightRow {
    pub year_month: YearMonth,
    pub origin_country: String,
    pub origin_country_code: String,
    pub destination_country: String,
    pub destination_country_code: String,
    pub flight_count: u64,
}

impl From<&MonthlyFlightAggregate> for MonthlyFlightRow {
    fn from(a: &MonthlyFlightAggregate) -> Self {
        MonthlyFlightRow {
            year_month: a.month,
            origin_country: a.route.origin_country.clone(),
            origin_country_code: a.route.origin_code.clone(),
            destination_country: a.route.destination_country.clone(),
            destination_country_code: a.route.destination_code.clone(),
            flight_count: a.flight_count,
        }
    }
}
