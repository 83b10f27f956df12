use crate::error::Result;
use serde::Serialize;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};
use tracing::info;

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    info!(file = %path.display(), rows = rows.len(), "Wrote table");
    Ok(())
}

/// Convert aggregates to their output rows and persist them.
pub fn write_rows<'a, A: 'a, R>(path: &Path, aggregates: impl IntoIterator<Item = &'a A>) -> Result<Vec<R>>
where
    R: Serialize + From<&'a A>,
{
    let rows: Vec<R> = aggregates.into_iter().map(R::from).collect();
    write_csv(path, &rows)?;
    Ok(rows)
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

pub fn render_preview<T>(rows: &[T], max_rows: usize) -> String
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        return "(no rows)".to_string();
    }
    Table::new(slice).with(Style::markdown()).to_string()
}

pub fn preview_table_rows<T>(title: &str, rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    println!("{} ({} rows)\n", title, rows.len());
    println!("{}\n", render_preview(rows, max_rows));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DailyCaseAggregate, DailyCaseRow, StatValues};
    use chrono::NaiveDate;

    fn aggregate(first: bool) -> DailyCaseAggregate {
        DailyCaseAggregate {
            date: NaiveDate::from_ymd_opt(2020, 3, 2).unwrap(),
            country: "Korea, South".to_string(),
            cumulative: StatValues::new(Some(10), Some(1), None, Some(9)),
            daily_new: if first { StatValues::default() } else { StatValues::new(Some(2), Some(0), None, Some(2)) },
        }
    }

    #[test]
    fn missing_deltas_are_written_as_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("daily.csv");
        let aggregates = vec![aggregate(true), aggregate(false)];
        let rows: Vec<DailyCaseRow> = write_rows(&path, &aggregates).unwrap();
        assert_eq!(rows.len(), 2);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "date,Country_Region,Confirmed_cumulative,Confirmed_daily_new,Deaths_cumulative,Deaths_daily_new,Recovered_cumulative,Recovered_daily_new,Active_cumulative,Active_daily_new"
        );
        assert_eq!(lines[1], "2020-03-02,\"Korea, South\",10,,1,,,,9,");
        assert_eq!(lines[2], "2020-03-02,\"Korea, South\",10,2,1,0,,,9,2");
    }

    #[test]
    fn preview_renders_markdown_and_handles_empty() {
        let rows: Vec<DailyCaseRow> = vec![DailyCaseRow::from(&aggregate(true))];
        let rendered = render_preview(&rows, 5);
        assert!(rendered.contains("| Country_Region"));
        assert!(rendered.contains("Korea, South"));
        assert_eq!(render_preview::<DailyCaseRow>(&[], 5), "(no rows)");
    }
}
