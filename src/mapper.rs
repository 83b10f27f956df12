// Flight endpoint resolution.
//
// Resolution happens in two separate passes: a lossy lookup that may leave
// any field unresolved, then a strict filter that keeps only fully resolved
// flights. Domestic flights are removed last.
use crate::types::{FlightRecord, MappedFlight, ResolvedFlight};
use crate::util::percentage;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Airport code -> ISO alpha-2 country code. ICAO first, IATA as fallback.
#[derive(Debug, Clone, Default)]
pub struct AirportReference {
    by_icao: HashMap<String, String>,
    by_iata: HashMap<String, String>,
}

impl AirportReference {
    pub fn insert(&mut self, icao: Option<&str>, iata: Option<&str>, country_code: &str) {
        if let Some(icao) = icao {
            self.by_icao.insert(icao.to_string(), country_code.to_string());
        }
        if let Some(iata) = iata {
            self.by_iata.entry(iata.to_string()).or_insert_with(|| country_code.to_string());
        }
    }

    pub fn country_code(&self, code: &str) -> Option<&str> {
        self.by_icao
            .get(code)
            .or_else(|| self.by_iata.get(code))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_icao.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_icao.is_empty() && self.by_iata.is_empty()
    }
}

/// Country code <-> display name.
#[derive(Debug, Clone, Default)]
pub struct CountryReference {
    names: HashMap<String, String>,
    codes: HashMap<String, String>,
}

impl CountryReference {
    pub fn insert(&mut self, code: &str, name: &str) {
        self.names.insert(code.to_string(), name.to_string());
        self.codes.insert(name.to_string(), code.to_string());
    }

    pub fn name(&self, code: &str) -> Option<&str> {
        self.names.get(code).map(String::as_str)
    }

    pub fn code(&self, name: &str) -> Option<&str> {
        self.codes.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MapReport {
    pub total: usize,
    pub missing_date: usize,
    pub unresolved_origin_code: usize,
    pub unresolved_destination_code: usize,
    pub unresolved_origin_country: usize,
    pub unresolved_destination_country: usize,
    /// Flights dropped by the strict filter.
    pub dropped_unresolved: usize,
    pub dropped_domestic: usize,
    pub kept: usize,
}

/// Left-style lookup of both endpoints: airport -> country code, then
/// country code -> display name. Nothing is dropped here.
pub fn resolve_flights(
    flights: &[FlightRecord],
    airports: &AirportReference,
    countries: &CountryReference,
) -> Vec<ResolvedFlight> {
    let code_of = |airport: &Option<String>| {
        airport
            .as_deref()
            .and_then(|a| airports.country_code(a))
            .map(str::to_string)
    };
    let name_of = |code: &Option<String>| {
        code.as_deref()
            .and_then(|c| countries.name(c))
            .map(str::to_string)
    };

    flights
        .iter()
        .map(|f| {
            let origin_code = code_of(&f.origin);
            let destination_code = code_of(&f.destination);
            ResolvedFlight {
                date: f.date,
                origin_country: name_of(&origin_code),
                destination_country: name_of(&destination_code),
                origin_code,
                destination_code,
            }
        })
        .collect()
}

/// Count the nulls each resolved column carries.
pub fn tally_unresolved(resolved: &[ResolvedFlight], report: &mut MapReport) {
    for r in resolved {
        report.missing_date += r.date.is_none() as usize;
        report.unresolved_origin_code += r.origin_code.is_none() as usize;
        report.unresolved_destination_code += r.destination_code.is_none() as usize;
        report.unresolved_origin_country += r.origin_country.is_none() as usize;
        report.unresolved_destination_country += r.destination_country.is_none() as usize;
    }
}

/// Keep only flights with a date and both countries resolved.
pub fn require_resolved(resolved: Vec<ResolvedFlight>) -> Vec<MappedFlight> {
    resolved
        .into_iter()
        .filter_map(|r| {
            Some(MappedFlight {
                date: r.date?,
                origin_code: r.origin_code?,
                destination_code: r.destination_code?,
                origin_country: r.origin_country?,
                destination_country: r.destination_country?,
            })
        })
        .collect()
}

/// Drop flights whose origin and destination share a country code.
pub fn exclude_domestic(flights: Vec<MappedFlight>) -> (Vec<MappedFlight>, usize) {
    let before = flights.len();
    let international: Vec<MappedFlight> = flights.into_iter().filter(|f| !f.is_domestic()).collect();
    let dropped = before - international.len();
    (international, dropped)
}

/// Full mapping stage: resolve, require, exclude domestic.
pub fn map_flights(
    flights: &[FlightRecord],
    airports: &AirportReference,
    countries: &CountryReference,
) -> (Vec<MappedFlight>, MapReport) {
    let mut report = MapReport { total: flights.len(), ..Default::default() };

    let resolved = resolve_flights(flights, airports, countries);
    tally_unresolved(&resolved, &mut report);
    debug!(?report, "Unresolved flight columns");

    let mapped = require_resolved(resolved);
    report.dropped_unresolved = report.total - mapped.len();
    if report.dropped_unresolved > 0 {
        warn!(
            dropped = report.dropped_unresolved,
            pct = %format!("{:.3}", percentage(report.dropped_unresolved, report.total)),
            "Dropping flights with missing country or date"
        );
    }

    let (international, domestic) = exclude_domestic(mapped);
    report.dropped_domestic = domestic;
    report.kept = international.len();
    info!(
        total = report.total,
        kept = report.kept,
        domestic = report.dropped_domestic,
        "Flights mapped to countries"
    );
    (international, report)
}
