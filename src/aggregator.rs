use crate::config::{FlightDirection, RunParams};
use crate::error::{PipelineError, Result};
use crate::types::{
    CleanCaseRecord, DailyCaseAggregate, DailyFlightAggregate, MappedFlight, Route, Stat,
    StatValues,
};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{Debug, Display};
use tracing::{debug, info};

pub fn counter_overflow(stat: Stat, country: &str, period: impl Display) -> PipelineError {
    PipelineError::CounterOverflow(format!("{} at ({}, {})", stat.column(), period, country))
}

/// Sum every statistic per (country, date). The map's ordering is the
/// output ordering: country, then date, ascending.
pub fn group_case_daily(records: &[CleanCaseRecord]) -> Result<Vec<(String, NaiveDate, StatValues)>> {
    let mut groups: BTreeMap<(String, NaiveDate), StatValues> = BTreeMap::new();
    for r in records {
        groups
            .entry((r.country.clone(), r.date))
            .or_default()
            .accumulate(&r.stats)
            .map_err(|stat| counter_overflow(stat, &r.country, r.date))?;
    }
    Ok(groups
        .into_iter()
        .map(|((country, date), stats)| (country, date, stats))
        .collect())
}

/// Day-over-day difference within each country, scanning rows in
/// (country, date) order and carrying the previous row forward. The first
/// date of every country gets null deltas.
///
/// Rows must arrive strictly ordered; a repeated key means grouping is
/// broken and is reported as an error rather than merged.
pub fn apply_daily_deltas(grouped: Vec<(String, NaiveDate, StatValues)>) -> Result<Vec<DailyCaseAggregate>> {
    let mut out: Vec<DailyCaseAggregate> = Vec::with_capacity(grouped.len());

    for (country, date, cumulative) in grouped {
        let daily_new = match out.last() {
            Some(prev) => {
                let order = (prev.country.as_str(), prev.date).cmp(&(country.as_str(), date));
                match order {
                    Ordering::Equal => {
                        return Err(PipelineError::DuplicateKey(format!("({}, {})", date, country)))
                    }
                    Ordering::Greater => {
                        return Err(PipelineError::OutOfOrder(format!("({}, {})", date, country)))
                    }
                    Ordering::Less if prev.country == country => cumulative
                        .minus(&prev.cumulative)
                        .map_err(|stat| counter_overflow(stat, &country, date))?,
                    Ordering::Less => StatValues::default(),
                }
            }
            None => StatValues::default(),
        };
        out.push(DailyCaseAggregate { date, country, cumulative, daily_new });
    }
    Ok(out)
}

/// Per-column null counts of a daily case table.
pub fn count_nulls(daily: &[DailyCaseAggregate]) -> HashMap<String, usize> {
    let mut nulls = HashMap::new();
    for stat in Stat::ALL {
        let cumulative = daily.iter().filter(|d| d.cumulative.get(stat).is_none()).count();
        let new = daily.iter().filter(|d| d.daily_new.get(stat).is_none()).count();
        nulls.insert(format!("{}_cumulative", stat.column()), cumulative);
        nulls.insert(format!("{}_daily_new", stat.column()), new);
    }
    nulls
}

/// Group cleaned case reports to one row per (date, country) with daily deltas.
pub fn aggregate_case_daily(records: &[CleanCaseRecord]) -> Result<Vec<DailyCaseAggregate>> {
    let daily = apply_daily_deltas(group_case_daily(records)?)?;
    let countries: HashSet<&str> = daily.iter().map(|d| d.country.as_str()).collect();
    info!(rows = daily.len(), countries = countries.len(), "Aggregated case reports by date and country");
    debug!(nulls = ?count_nulls(&daily), "Null counts in daily case table");
    Ok(daily)
}

/// Keep flights whose `direction` endpoint is one of `countries`.
pub fn filter_flights_by_country(
    flights: Vec<MappedFlight>,
    countries: &[String],
    direction: FlightDirection,
) -> Vec<MappedFlight> {
    if countries.is_empty() {
        return flights;
    }
    flights
        .into_iter()
        .filter(|f| {
            let country = match direction {
                FlightDirection::Origin => &f.origin_country,
                FlightDirection::Destination => &f.destination_country,
            };
            countries.contains(country)
        })
        .collect()
}

/// Sort key: the `direction` country code, the opposite code, then the period.
pub fn route_order_key<'a, P: Ord>(route: &'a Route, period: P, direction: FlightDirection) -> (&'a str, &'a str, P) {
    match direction {
        FlightDirection::Origin => (route.origin_code.as_str(), route.destination_code.as_str(), period),
        FlightDirection::Destination => (route.destination_code.as_str(), route.origin_code.as_str(), period),
    }
}

/// Fail on the first pair of adjacent equal keys in an already sorted slice.
pub fn ensure_unique_keys<K: PartialEq + Debug>(keys: impl IntoIterator<Item = K>) -> Result<()> {
    let mut previous: Option<K> = None;
    for key in keys {
        if previous.as_ref() == Some(&key) {
            return Err(PipelineError::DuplicateKey(format!("{:?}", key)));
        }
        previous = Some(key);
    }
    Ok(())
}

/// Count flights per (date, origin country, destination country), after the
/// run's country filter.
pub fn aggregate_flights_daily(flights: Vec<MappedFlight>, params: &RunParams) -> Result<Vec<DailyFlightAggregate>> {
    let flights = filter_flights_by_country(flights, &params.flight_countries(), params.direction);

    let mut groups: HashMap<(Route, NaiveDate), u64> = HashMap::new();
    for f in flights {
        let route = Route {
            origin_code: f.origin_code,
            origin_country: f.origin_country,
            destination_code: f.destination_code,
            destination_country: f.destination_country,
        };
        *groups.entry((route, f.date)).or_insert(0) += 1;
    }

    let mut daily: Vec<DailyFlightAggregate> = groups
        .into_iter()
        .map(|((route, date), flight_count)| DailyFlightAggregate { date, route, flight_count })
        .collect();
    daily.sort_by(|a, b| {
        route_order_key(&a.route, a.date, params.direction)
            .cmp(&route_order_key(&b.route, b.date, params.direction))
            .then_with(|| a.route.cmp(&b.route))
    });
    ensure_unique_keys(daily.iter().map(|d| (&d.route, d.date)))?;

    info!(rows = daily.len(), direction = ?params.direction, "Aggregated flights by date and route");
    Ok(daily)
}
