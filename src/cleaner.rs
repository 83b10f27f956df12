use crate::types::{CaseReportRecord, CleanCaseRecord};
use crate::util::{looks_numeric, percentage};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::ops::Range;
use tracing::{info, warn};

/// Years a genuine report can fall in.
pub const VALID_YEARS: Range<i32> = 2020..2024;

/// Why a record was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingDate,
    DateOutOfRange,
    /// Empty country, or a number where the name belongs (shifted columns).
    NonTextCountry,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanReport {
    pub total: usize,
    pub missing_date: usize,
    pub date_out_of_range: usize,
    pub non_text_country: usize,
}

impl CleanReport {
    pub fn dropped(&self) -> usize {
        self.missing_date + self.date_out_of_range + self.non_text_country
    }

    pub fn dropped_pct(&self) -> f64 {
        percentage(self.dropped(), self.total)
    }

    fn record(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::MissingDate => self.missing_date += 1,
            Rejection::DateOutOfRange => self.date_out_of_range += 1,
            Rejection::NonTextCountry => self.non_text_country += 1,
        }
    }
}

pub fn check_date(date: Option<NaiveDate>) -> Result<NaiveDate, Rejection> {
    let date = date.ok_or(Rejection::MissingDate)?;
    if VALID_YEARS.contains(&date.year()) {
        Ok(date)
    } else {
        Err(Rejection::DateOutOfRange)
    }
}

pub fn check_country(country: Option<&str>) -> Result<&str, Rejection> {
    match country.map(str::trim) {
        Some(c) if !c.is_empty() && !looks_numeric(c) => Ok(c),
        _ => Err(Rejection::NonTextCountry),
    }
}

/// Normalize one record to its calendar date and validate it.
pub fn clean_record(record: &CaseReportRecord) -> Result<CleanCaseRecord, Rejection> {
    let date = check_date(record.last_update.map(|ts| ts.date()))?;
    let country = check_country(record.country.as_deref())?;
    Ok(CleanCaseRecord {
        date,
        country: country.to_string(),
        stats: record.stats,
    })
}

/// Partition case reports into valid records and drop counts.
pub fn clean_case_reports(records: &[CaseReportRecord]) -> (Vec<CleanCaseRecord>, CleanReport) {
    let mut report = CleanReport { total: records.len(), ..Default::default() };
    let mut valid = Vec::with_capacity(records.len());

    for record in records {
        match clean_record(record) {
            Ok(clean) => valid.push(clean),
            Err(rejection) => report.record(rejection),
        }
    }

    if report.dropped() > 0 {
        warn!(
            missing_date = report.missing_date,
            date_out_of_range = report.date_out_of_range,
            non_text_country = report.non_text_country,
            pct = %format!("{:.3}", report.dropped_pct()),
            "Dropping case reports with missing or abnormal date or country"
        );
    }
    info!(kept = valid.len(), total = report.total, "Case reports cleaned");
    (valid, report)
}
