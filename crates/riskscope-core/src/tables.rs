//! Feature table access.
//!
//! Three read-only tables back every query:
//! 1. **Company** -- one row per entity, keyed by a stock code, with a sector label.
//! 2. **Industry** -- one row of feature averages per sector label.
//! 3. **Population** -- feature averages per default/non-default segment.
//!
//! Tables are fetched fresh for each query. Cells are kept as text and only
//! turned into numbers when a feature vector is materialised: a missing
//! column or a non-numeric cell becomes zero there and nowhere else.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::TableSchema;
use crate::features::{self, FEATURES};
use crate::types::Warnings;
use crate::{RiskScopeError, RiskScopeResult};

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Company,
    Industry,
    Population,
}

impl std::fmt::Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Company => write!(f, "company"),
            Self::Industry => write!(f, "industry"),
            Self::Population => write!(f, "population"),
        }
    }
}

/// A rectangular table of text cells with a header row.
///
/// Deserialisation goes through [`FeatureTable::new`], so a table handed
/// over as JSON is held to the same shape check as one read from CSV.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFeatureTable")]
pub struct FeatureTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

#[derive(Deserialize)]
struct RawFeatureTable {
    headers: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<String>>,
}

impl TryFrom<RawFeatureTable> for FeatureTable {
    type Error = RiskScopeError;

    fn try_from(raw: RawFeatureTable) -> RiskScopeResult<Self> {
        Self::new(raw.headers, raw.rows)
    }
}

impl FeatureTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> RiskScopeResult<Self> {
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != headers.len())
        {
            return Err(RiskScopeError::DataSource(format!(
                "row {} has {} cells, header has {}",
                i,
                row.len(),
                headers.len()
            )));
        }
        Ok(Self { headers, rows })
    }

    /// Build a table from string slices. Convenient for fixtures.
    pub fn from_records(headers: &[&str], rows: &[&[&str]]) -> RiskScopeResult<Self> {
        Self::new(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> RiskScopeResult<Self> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers: Vec<String> = rdr
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                // Spreadsheet exports often lead with a byte-order mark.
                if i == 0 {
                    h.trim_start_matches('\u{feff}').to_string()
                } else {
                    h.to_string()
                }
            })
            .collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            rows.push(record?.iter().map(|c| c.to_string()).collect());
        }
        Self::new(headers, rows)
    }

    pub fn from_csv_path(path: &Path) -> RiskScopeResult<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            RiskScopeError::DataSource(format!("Failed to open '{}': {}", path.display(), e))
        })?;
        Self::from_csv_reader(file)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn rows(&self) -> impl Iterator<Item = TableRow<'_>> {
        self.rows.iter().map(move |cells| TableRow { table: self, cells })
    }

    pub fn first_row(&self) -> Option<TableRow<'_>> {
        self.rows().next()
    }

    /// Numeric values of one column. Non-numeric cells are skipped; a
    /// missing column yields an empty vector.
    pub fn numeric_column(&self, name: &str) -> Vec<Decimal> {
        match self.column_index(name) {
            Some(idx) => self
                .rows
                .iter()
                .filter_map(|r| r.get(idx).and_then(|c| parse_numeric(c)))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Canonical features with no column in this table.
    pub fn missing_features(&self) -> Vec<&'static str> {
        FEATURES
            .iter()
            .map(|f| f.name)
            .filter(|n| !self.has_column(n))
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TableRow<'a> {
    table: &'a FeatureTable,
    cells: &'a [String],
}

impl<'a> TableRow<'a> {
    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.table
            .column_index(column)
            .and_then(|i| self.cells.get(i))
            .map(String::as_str)
    }
}

/// Parse a cell as a decimal number. Blank, `N/A`, `NaN` and any other
/// non-numeric text yields `None`.
pub fn parse_numeric(cell: &str) -> Option<Decimal> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

/// Trim, drop a float artefact such as `5930.0`, and left-pad purely
/// numeric codes with zeros to `width`.
pub fn normalize_identifier(raw: &str, width: usize) -> String {
    let trimmed = raw.trim();
    let code = match trimmed.strip_suffix(".0") {
        Some(stem) if !stem.is_empty() && stem.chars().all(|c| c.is_ascii_digit()) => stem,
        _ => trimmed,
    };
    if !code.is_empty() && code.chars().all(|c| c.is_ascii_digit()) && code.len() < width {
        format!("{:0>width$}", code, width = width)
    } else {
        code.to_string()
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Read-only access to the three feature tables.
pub trait FeatureSource {
    fn fetch(&self, kind: TableKind) -> RiskScopeResult<FeatureTable>;
}

/// Reads the tables as CSV files from one directory, re-reading on every fetch.
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    dir: PathBuf,
    schema: TableSchema,
}

impl CsvDirectorySource {
    pub fn new(dir: impl Into<PathBuf>, schema: TableSchema) -> Self {
        Self {
            dir: dir.into(),
            schema,
        }
    }

    pub fn path_for(&self, kind: TableKind) -> PathBuf {
        let file = match kind {
            TableKind::Company => &self.schema.company_file,
            TableKind::Industry => &self.schema.industry_file,
            TableKind::Population => &self.schema.population_file,
        };
        self.dir.join(file)
    }
}

impl FeatureSource for CsvDirectorySource {
    fn fetch(&self, kind: TableKind) -> RiskScopeResult<FeatureTable> {
        let path = self.path_for(kind);
        tracing::debug!(table = %kind, path = %path.display(), "reading feature table");
        FeatureTable::from_csv_path(&path)
    }
}

/// Tables already held in memory, e.g. handed over by a front end.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemorySource {
    pub company: FeatureTable,
    pub industry: FeatureTable,
    pub population: FeatureTable,
}

impl FeatureSource for InMemorySource {
    fn fetch(&self, kind: TableKind) -> RiskScopeResult<FeatureTable> {
        Ok(match kind {
            TableKind::Company => self.company.clone(),
            TableKind::Industry => self.industry.clone(),
            TableKind::Population => self.population.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Feature vectors
// ---------------------------------------------------------------------------

/// Values for every canonical feature, in canonical order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: Vec<Decimal>,
}

/// One company's raw values.
pub type EntityFeatureVector = FeatureVector;

/// An industry or population average used for comparison only.
pub type BaselineVector = FeatureVector;

impl FeatureVector {
    pub fn zeros() -> Self {
        Self {
            values: vec![Decimal::ZERO; FEATURES.len()],
        }
    }

    /// Materialise a row. Missing columns and non-numeric cells become zero.
    pub fn from_row(row: &TableRow<'_>) -> Self {
        let values = FEATURES
            .iter()
            .map(|f| match row.get(f.name) {
                Some(cell) => parse_numeric(cell).unwrap_or_else(|| {
                    if !cell.trim().is_empty() {
                        tracing::debug!(feature = f.name, cell, "non-numeric cell coerced to 0");
                    }
                    Decimal::ZERO
                }),
                None => Decimal::ZERO,
            })
            .collect();
        Self { values }
    }

    /// Build from loosely typed JSON values keyed by feature name. Strings
    /// are parsed; anything non-numeric or absent becomes zero.
    pub fn from_json_map(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        let values = FEATURES
            .iter()
            .map(|f| match map.get(f.name) {
                Some(serde_json::Value::Number(n)) => parse_numeric(&n.to_string()),
                Some(serde_json::Value::String(s)) => parse_numeric(s),
                _ => None,
            })
            .map(|v| v.unwrap_or(Decimal::ZERO))
            .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<Decimal> {
        features::position(name).map(|i| self.values[i])
    }

    /// Canonical-order slice, ready to hand to a classifier.
    pub fn as_slice(&self) -> &[Decimal] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Decimal)> + '_ {
        FEATURES.iter().map(|f| f.name).zip(self.values.iter().copied())
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// How a baseline row was chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "basis", content = "detail", rename_all = "snake_case")]
pub enum BaselineBasis {
    /// Industry row whose sector label matched the company's.
    MatchedSector(String),
    /// First population row labelled non-default.
    NonDefaultSegment,
    /// No non-default row existed; first row of the population table.
    FirstPopulationRow,
    /// Population table was empty; all-zero vector.
    Empty,
}

#[derive(Debug, Clone)]
pub struct ResolvedEntity {
    pub entity_id: String,
    pub company_name: String,
    pub sector: Option<String>,
    pub entity: EntityFeatureVector,
    pub industry: BaselineVector,
    pub industry_basis: BaselineBasis,
    pub population: BaselineVector,
    pub population_basis: BaselineBasis,
    /// The full company table, the reference population for percentile scores.
    pub company_table: FeatureTable,
}

pub struct FeatureTableAccess<'a> {
    source: &'a dyn FeatureSource,
    schema: &'a TableSchema,
}

impl<'a> FeatureTableAccess<'a> {
    pub fn new(source: &'a dyn FeatureSource, schema: &'a TableSchema) -> Self {
        Self { source, schema }
    }

    fn fetch_or_not_found(&self, kind: TableKind, entity_id: &str) -> RiskScopeResult<FeatureTable> {
        self.source.fetch(kind).map_err(|e| {
            tracing::warn!(table = %kind, error = %e, "feature table unavailable");
            RiskScopeError::not_found(entity_id)
        })
    }

    /// Resolve the company row and its two baselines.
    ///
    /// Only a missing company (or an unreadable table) is an error; every
    /// other gap falls back and is recorded in `warnings`.
    pub fn resolve(&self, entity_id: &str, warnings: &mut Warnings) -> RiskScopeResult<ResolvedEntity> {
        let width = self.schema.identifier_width;
        let code = normalize_identifier(entity_id, width);
        if code.is_empty() {
            return Err(RiskScopeError::not_found(entity_id));
        }

        let company_table = self.fetch_or_not_found(TableKind::Company, &code)?;
        if !company_table.has_column(&self.schema.key_column) {
            tracing::warn!(column = %self.schema.key_column, "company table has no key column");
            return Err(RiskScopeError::not_found(&code));
        }
        let row = company_table
            .rows()
            .find(|r| {
                r.get(&self.schema.key_column)
                    .map(|k| normalize_identifier(k, width) == code)
                    .unwrap_or(false)
            })
            .ok_or_else(|| RiskScopeError::not_found(&code))?;

        report_missing_columns(&company_table, TableKind::Company, warnings);

        let company_name = row
            .get(&self.schema.name_column)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&code)
            .to_string();
        let sector = row
            .get(&self.schema.sector_column)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let entity = FeatureVector::from_row(&row);

        let population_table = self.fetch_or_not_found(TableKind::Population, &code)?;
        report_missing_columns(&population_table, TableKind::Population, warnings);
        let (population, population_basis) = self.population_baseline(&population_table, warnings);

        let industry_table = self.fetch_or_not_found(TableKind::Industry, &code)?;
        report_missing_columns(&industry_table, TableKind::Industry, warnings);
        let matched = sector.as_deref().and_then(|s| {
            industry_table
                .rows()
                .find(|r| r.get(&self.schema.sector_column) == Some(s))
        });
        let (industry, industry_basis) = match (matched, sector.as_deref()) {
            (Some(r), Some(s)) => (FeatureVector::from_row(&r), BaselineBasis::MatchedSector(s.to_string())),
            _ => {
                warnings.push(format!(
                    "No industry row for sector {:?}; using the population baseline as the industry comparison",
                    sector.as_deref().unwrap_or("<none>")
                ));
                (population.clone(), population_basis.clone())
            }
        };

        Ok(ResolvedEntity {
            entity_id: code,
            company_name,
            sector,
            entity,
            industry,
            industry_basis,
            population,
            population_basis,
            company_table,
        })
    }

    fn population_baseline(
        &self,
        table: &FeatureTable,
        warnings: &mut Warnings,
    ) -> (BaselineVector, BaselineBasis) {
        let non_default = table.rows().find(|r| {
            r.get(&self.schema.label_column)
                .and_then(parse_numeric)
                .map(|v| v.is_zero())
                .unwrap_or(false)
        });
        if let Some(r) = non_default {
            return (FeatureVector::from_row(&r), BaselineBasis::NonDefaultSegment);
        }
        match table.first_row() {
            Some(r) => {
                warnings.push("Population table has no non-default row; using its first row");
                (FeatureVector::from_row(&r), BaselineBasis::FirstPopulationRow)
            }
            None => {
                warnings.push("Population table is empty; population baseline is all zeros");
                (FeatureVector::zeros(), BaselineBasis::Empty)
            }
        }
    }
}

fn report_missing_columns(table: &FeatureTable, kind: TableKind, warnings: &mut Warnings) {
    let missing = table.missing_features();
    if !missing.is_empty() {
        warnings.push(format!(
            "{} table lacks feature columns treated as 0: {}",
            kind,
            missing.join(", ")
        ));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
