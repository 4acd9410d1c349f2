use chrono::NaiveDate;
use log::info;
use std::path::{Path, PathBuf};

/// Number of non-feature columns that follow the `Date` column. Everything
/// after them is a model feature.
pub const METADATA_COLUMNS: usize = 6;

const DATE_COLUMN: &str = "Date";
const TICKER_COLUMN: &str = "Ticker";
const STOCK_CHANGE_COLUMN: &str = "stock_p_change";
const CHANGE_SUFFIX: &str = "_p_change";

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{0}")]
    Schema(String),

    #[error("{0}")]
    Empty(String),
}

/// One historical fundamentals row with its realized outcome.
#[derive(Debug, Clone)]
pub struct TrainingRow {
    pub date: NaiveDate,
    pub ticker: String,
    pub stock_change: f64,
    pub index_change: f64,
    pub features: Vec<f64>,
}

/// The historical fundamentals dataset ("keystats"), filtered of incomplete
/// rows.
#[derive(Debug, Clone)]
pub struct TrainingData {
    pub index_column: String,
    pub feature_names: Vec<String>,
    pub rows: Vec<TrainingRow>,
}

impl TrainingData {
    pub fn n_samples(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn feature_matrix(&self) -> Vec<Vec<f64>> {
        self.rows.iter().map(|row| row.features.clone()).collect()
    }

    pub fn stock_changes(&self) -> Vec<f64> {
        self.rows.iter().map(|row| row.stock_change).collect()
    }

    pub fn index_changes(&self) -> Vec<f64> {
        self.rows.iter().map(|row| row.index_change).collect()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let start = self.rows.iter().map(|row| row.date).min()?;
        let end = self.rows.iter().map(|row| row.date).max()?;
        Some((start, end))
    }
}

/// One current-snapshot row without a realized outcome.
#[derive(Debug, Clone)]
pub struct ForwardRow {
    pub date: NaiveDate,
    pub ticker: String,
    pub features: Vec<f64>,
}

/// The forward sample used for live prediction.
#[derive(Debug, Clone)]
pub struct ForwardData {
    pub feature_names: Vec<String>,
    pub rows: Vec<ForwardRow>,
}

impl ForwardData {
    pub fn n_samples(&self) -> usize {
        self.rows.len()
    }
}

/// Resolved column layout of a fundamentals CSV.
struct CsvSchema {
    ticker_idx: usize,
    stock_change_idx: usize,
    index_change_idx: usize,
    index_column: String,
    feature_names: Vec<String>,
}

impl CsvSchema {
    /// Validate the header: `Date` first, then exactly [`METADATA_COLUMNS`]
    /// metadata columns, then at least one feature column. The index column
    /// is the metadata column whose `<name>_p_change` sibling is also present
    /// and is not the stock change.
    fn resolve(header: &csv::StringRecord, index_override: Option<&str>) -> Result<Self, DatasetError> {
        let columns: Vec<&str> = header.iter().collect();
        if columns.first() != Some(&DATE_COLUMN) {
            return Err(DatasetError::Schema(format!(
                "first column must be {}, found {:?}",
                DATE_COLUMN,
                columns.first().unwrap_or(&"<none>")
            )));
        }
        if columns.len() < 1 + METADATA_COLUMNS + 1 {
            return Err(DatasetError::Schema(format!(
                "expected {} followed by {} metadata columns and at least one feature column, found {} columns",
                DATE_COLUMN,
                METADATA_COLUMNS,
                columns.len()
            )));
        }

        let metadata = &columns[1..=METADATA_COLUMNS];
        let position = |name: &str| -> Result<usize, DatasetError> {
            metadata
                .iter()
                .position(|column| *column == name)
                .map(|offset| offset + 1)
                .ok_or_else(|| {
                    DatasetError::Schema(format!("metadata column {} is missing", name))
                })
        };

        let ticker_idx = position(TICKER_COLUMN)?;
        let stock_change_idx = position(STOCK_CHANGE_COLUMN)?;

        let index_column = match index_override {
            Some(name) => name.to_string(),
            None => metadata
                .iter()
                .find(|column| {
                    !column.ends_with(CHANGE_SUFFIX)
                        && metadata
                            .iter()
                            .any(|other| **other == format!("{}{}", column, CHANGE_SUFFIX))
                })
                .map(|column| column.to_string())
                .ok_or_else(|| {
                    DatasetError::Schema(
                        "could not detect the market index column; expected a metadata pair \
                         like SP500 / SP500_p_change"
                            .to_string(),
                    )
                })?,
        };
        let index_change_idx = position(&format!("{}{}", index_column, CHANGE_SUFFIX))?;

        let feature_names = columns[1 + METADATA_COLUMNS..]
            .iter()
            .map(|name| name.to_string())
            .collect();

        Ok(Self {
            ticker_idx,
            stock_change_idx,
            index_change_idx,
            index_column,
            feature_names,
        })
    }
}

/// Load the historical training dataset. Rows missing any feature value or
/// either realized change are dropped.
pub fn load_keystats(
    path: &Path,
    index_override: Option<&str>,
) -> Result<TrainingData, DatasetError> {
    let mut reader = open_csv(path)?;
    let schema = CsvSchema::resolve(read_header(&mut reader, path)?, index_override)?;

    let mut rows = Vec::new();
    let mut dropped = 0usize;
    for record in reader.records() {
        let record = record.map_err(|source| DatasetError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

        let Some(parsed) = parse_training_row(&record, &schema) else {
            dropped += 1;
            continue;
        };
        rows.push(parsed);
    }

    if rows.is_empty() {
        return Err(DatasetError::Empty(format!(
            "{} contains no usable training rows ({} dropped by the missing-value filter)",
            path.display(),
            dropped
        )));
    }

    info!(
        "Loaded {} training rows from {} ({} dropped, {} features, index column {})",
        rows.len(),
        path.display(),
        dropped,
        schema.feature_names.len(),
        schema.index_column
    );

    Ok(TrainingData {
        index_column: schema.index_column,
        feature_names: schema.feature_names,
        rows,
    })
}

/// Load the forward sample. Realized-change columns are ignored (the fetch
/// pipeline writes them empty); rows missing a feature value are dropped.
pub fn load_forward_sample(
    path: &Path,
    index_override: Option<&str>,
) -> Result<ForwardData, DatasetError> {
    let mut reader = open_csv(path)?;
    let schema = CsvSchema::resolve(read_header(&mut reader, path)?, index_override)?;

    let mut rows = Vec::new();
    let mut dropped = 0usize;
    for record in reader.records() {
        let record = record.map_err(|source| DatasetError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

        let Some(parsed) = parse_forward_row(&record, &schema) else {
            dropped += 1;
            continue;
        };
        rows.push(parsed);
    }

    if rows.is_empty() {
        return Err(DatasetError::Empty(format!(
            "{} contains no usable forward rows ({} dropped by the missing-value filter)",
            path.display(),
            dropped
        )));
    }

    info!(
        "Loaded {} forward rows from {} ({} dropped)",
        rows.len(),
        path.display(),
        dropped
    );

    Ok(ForwardData {
        feature_names: schema.feature_names,
        rows,
    })
}

fn open_csv(path: &Path) -> Result<csv::Reader<std::fs::File>, DatasetError> {
    let file = std::fs::File::open(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(csv::Reader::from_reader(file))
}

fn read_header<'r>(
    reader: &'r mut csv::Reader<std::fs::File>,
    path: &Path,
) -> Result<&'r csv::StringRecord, DatasetError> {
    reader.headers().map_err(|source| DatasetError::Csv {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_training_row(record: &csv::StringRecord, schema: &CsvSchema) -> Option<TrainingRow> {
    let date = parse_date(record.get(0)?)?;
    let ticker = non_empty(record.get(schema.ticker_idx)?)?.to_string();
    let stock_change = parse_number(record.get(schema.stock_change_idx)?)?;
    let index_change = parse_number(record.get(schema.index_change_idx)?)?;
    let features = parse_features(record, schema)?;

    Some(TrainingRow {
        date,
        ticker,
        stock_change,
        index_change,
        features,
    })
}

fn parse_forward_row(record: &csv::StringRecord, schema: &CsvSchema) -> Option<ForwardRow> {
    let date = parse_date(record.get(0)?)?;
    let ticker = non_empty(record.get(schema.ticker_idx)?)?.to_string();
    let features = parse_features(record, schema)?;

    Some(ForwardRow {
        date,
        ticker,
        features,
    })
}

fn parse_features(record: &csv::StringRecord, schema: &CsvSchema) -> Option<Vec<f64>> {
    let mut features = Vec::with_capacity(schema.feature_names.len());
    for idx in 0..schema.feature_names.len() {
        let raw = record.get(1 + METADATA_COLUMNS + idx)?;
        features.push(parse_number(raw)?);
    }
    Some(features)
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

fn parse_number(raw: &str) -> Option<f64> {
    let value = raw.trim().parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}

fn non_empty(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
