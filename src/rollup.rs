use crate::aggregator::{counter_overflow, ensure_unique_keys, route_order_key};
use crate::config::FlightDirection;
use crate::error::Result;
use crate::types::{
    DailyCaseAggregate, DailyFlightAggregate, MonthlyCaseAggregate, MonthlyFlightAggregate, Route,
    Stat, StatValues, YearMonth,
};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

#[derive(Default)]
struct MonthAcc {
    cumulative: StatValues,
    monthly_new: [i64; 4],
}

impl MonthAcc {
    fn add(&mut self, day: &DailyCaseAggregate) -> std::result::Result<(), Stat> {
        for (i, stat) in Stat::ALL.into_iter().enumerate() {
            let max = match (self.cumulative.get(stat), day.cumulative.get(stat)) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
            self.cumulative.set(stat, max);
            // A first-of-series day has no baseline; it adds nothing.
            let delta = day.daily_new.get(stat).unwrap_or(0);
            self.monthly_new[i] = self.monthly_new[i].checked_add(delta).ok_or(stat)?;
        }
        Ok(())
    }

    fn finish(self) -> (StatValues, StatValues) {
        let [c, d, r, a] = self.monthly_new;
        (self.cumulative, StatValues::new(Some(c), Some(d), Some(r), Some(a)))
    }
}

/// Monthly case table: highest cumulative value seen in the month and the
/// sum of the month's daily deltas, ordered by country then month.
pub fn rollup_case_monthly(daily: &[DailyCaseAggregate]) -> Result<Vec<MonthlyCaseAggregate>> {
    let mut groups: BTreeMap<(String, YearMonth), MonthAcc> = BTreeMap::new();
    for day in daily {
        let month = YearMonth::from(day.date);
        groups
            .entry((day.country.clone(), month))
            .or_default()
            .add(day)
            .map_err(|stat| counter_overflow(stat, &day.country, month))?;
    }

    let monthly: Vec<MonthlyCaseAggregate> = groups
        .into_iter()
        .map(|((country, month), acc)| {
            let (cumulative, monthly_new) = acc.finish();
            MonthlyCaseAggregate { month, country, cumulative, monthly_new }
        })
        .collect();
    ensure_unique_keys(monthly.iter().map(|m| (&m.country, m.month)))?;

    info!(rows = monthly.len(), "Rolled case aggregates up to months");
    Ok(monthly)
}

/// Monthly flight table: daily counts summed per route and month.
pub fn rollup_flight_monthly(
    daily: &[DailyFlightAggregate],
    direction: FlightDirection,
) -> Result<Vec<MonthlyFlightAggregate>> {
    let mut groups: HashMap<(Route, YearMonth), u64> = HashMap::new();
    for day in daily {
        *groups
            .entry((day.route.clone(), YearMonth::from(day.date)))
            .or_insert(0) += day.flight_count;
    }

    let mut monthly: Vec<MonthlyFlightAggregate> = groups
        .into_iter()
        .map(|((route, month), flight_count)| MonthlyFlightAggregate { month, route, flight_count })
        .collect();
    monthly.sort_by(|a, b| {
        route_order_key(&a.route, a.month, direction)
            .cmp(&route_order_key(&b.route, b.month, direction))
            .then_with(|| a.route.cmp(&b.route))
    });
    ensure_unique_keys(monthly.iter().map(|m| (&m.route, m.month)))?;

    info!(rows = monthly.len(), "Rolled flight aggregates up to months");
    Ok(monthly)
}
