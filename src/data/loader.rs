//! CSV loader for aligned macro and price data.
//!
//! Reads one wide file: a `date` column (`%Y-%m-%d`) and one column per
//! series id. An empty cell (or FRED's `.`) marks a missing value; nothing is
//! filled or interpolated here. Columns are assigned to the leading,
//! coincident, auxiliary and price groups named by the configuration.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use tracing::info;

use crate::backtest::PriceColumns;
use crate::config::{RotatorConfig, SeriesConfig};
use crate::error::{RotatorError, RotatorResult};

use super::types::{MacroDataset, PriceBar, PriceSeries, Series, SeriesMap, TimeIndex};

pub const DATE_COLUMN: &str = "date";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Raw columns keyed by header, aligned to the parsed dates.
struct Columns {
    dates: Vec<NaiveDate>,
    values: HashMap<String, Vec<Option<f64>>>,
}

impl Columns {
    fn take(&self, id: &str) -> RotatorResult<Vec<Option<f64>>> {
        self.values
            .get(id)
            .cloned()
            .ok_or_else(|| RotatorError::config(format!("column {} not found in data file", id)))
    }

    fn series(&self, id: &str) -> RotatorResult<Series> {
        Ok(Series::new(id, self.take(id)?))
    }

    fn group(&self, configs: &[SeriesConfig]) -> RotatorResult<SeriesMap> {
        configs
            .iter()
            .map(|c| Ok((c.id.clone(), self.series(&c.id)?)))
            .collect()
    }

    fn prices(&self, columns: &PriceColumns) -> RotatorResult<PriceSeries> {
        let closes = self.take(&columns.close)?;
        let opens = match &columns.open {
            Some(id) => self.take(id)?,
            None => vec![None; closes.len()],
        };
        let bars = closes
            .into_iter()
            .zip(opens)
            .map(|(close, open)| close.map(|close| PriceBar { open, close }))
            .collect();
        Ok(PriceSeries::new(&columns.close, bars))
    }
}

fn parse_cell(raw: &str, column: &str, date: NaiveDate) -> RotatorResult<Option<f64>> {
    let cell = raw.trim();
    if cell.is_empty() || cell == "." {
        return Ok(None);
    }
    cell.parse::<f64>().map(Some).map_err(|_| {
        RotatorError::Data(format!("unparseable value '{}' in {} at {}", cell, column, date))
    })
}

fn read_columns<R: Read>(reader: R) -> RotatorResult<Columns> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = reader.headers()?.clone();
    let date_col = headers
        .iter()
        .position(|h| h == DATE_COLUMN)
        .ok_or_else(|| RotatorError::Data(format!("data file has no '{}' column", DATE_COLUMN)))?;

    let mut dates = Vec::new();
    let mut values: HashMap<String, Vec<Option<f64>>> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != date_col)
        .map(|(_, h)| (h.to_string(), Vec::new()))
        .collect();

    for record in reader.records() {
        let record = record?;
        let raw_date = record.get(date_col).unwrap_or_default();
        let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT)
            .map_err(|e| RotatorError::Data(format!("bad date '{}': {}", raw_date, e)))?;
        for (i, header) in headers.iter().enumerate() {
            if i == date_col {
                continue;
            }
            let cell = parse_cell(record.get(i).unwrap_or_default(), header, date)?;
            if let Some(column) = values.get_mut(header) {
                column.push(cell);
            }
        }
        dates.push(date);
    }

    Ok(Columns { dates, values })
}

/// Build a [`MacroDataset`] from CSV text.
pub fn parse_csv<R: Read>(reader: R, config: &RotatorConfig) -> RotatorResult<MacroDataset> {
    let columns = read_columns(reader)?;
    let index = TimeIndex::new(columns.dates.clone())?;

    let mut auxiliary = SeriesMap::new();
    for filter in &config.filters {
        if let Some(id) = filter.spec.aux_series() {
            auxiliary.insert(id.to_string(), columns.series(id)?);
        }
    }

    let dataset = MacroDataset {
        leading: columns.group(&config.leading)?,
        coincident: columns.group(&config.coincident)?,
        auxiliary,
        price_risk: columns.prices(&config.backtest.price_risk)?,
        price_safe: columns.prices(&config.backtest.price_safe)?,
        index,
    };

    info!(
        "Loaded {} bars ({} to {}): {} leading, {} coincident, {} auxiliary series",
        dataset.index.len(),
        dataset.index.first().map(|d| d.to_string()).unwrap_or_default(),
        dataset.index.last().map(|d| d.to_string()).unwrap_or_default(),
        dataset.leading.len(),
        dataset.coincident.len(),
        dataset.auxiliary.len()
    );
    Ok(dataset)
}

/// Load a [`MacroDataset`] from a CSV file.
pub fn load_csv(path: impl AsRef<Path>, config: &RotatorConfig) -> RotatorResult<MacroDataset> {
    let file = File::open(path.as_ref())?;
    parse_csv(file, config)
}
