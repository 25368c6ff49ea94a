//! Latest-price lookup.
//!
//! Price is decoration on the report, never a reason to fail it: an absent
//! quote or a broken source both read as a price of zero.

use std::path::PathBuf;

use chrono::{Duration, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::tables::{normalize_identifier, parse_numeric};
use crate::types::Warnings;
use crate::{RiskScopeError, RiskScopeResult};

/// Inclusive date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// The year ending on `end`.
    pub fn trailing_year(end: NaiveDate) -> Self {
        let start = end
            .checked_sub_months(Months::new(12))
            .unwrap_or(end - Duration::days(365));
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

pub trait PriceSource {
    fn latest_close(&self, entity_id: &str, range: DateRange) -> RiskScopeResult<Option<Decimal>>;
}

/// A source that never has a quote.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPriceSource;

impl PriceSource for NoPriceSource {
    fn latest_close(&self, _entity_id: &str, _range: DateRange) -> RiskScopeResult<Option<Decimal>> {
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
struct PriceRecord {
    date: String,
    #[serde(alias = "stock_code", alias = "entity_id")]
    code: String,
    close: String,
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y%m%d"))
        .ok()
}

/// Daily closes in a CSV file with `date`, `code` (or `stock_code`) and
/// `close` columns. The file is re-read on every lookup.
#[derive(Debug, Clone)]
pub struct CsvPriceHistory {
    path: PathBuf,
    identifier_width: usize,
}

impl CsvPriceHistory {
    pub fn new(path: impl Into<PathBuf>, identifier_width: usize) -> Self {
        Self {
            path: path.into(),
            identifier_width,
        }
    }
}

impl PriceSource for CsvPriceHistory {
    fn latest_close(&self, entity_id: &str, range: DateRange) -> RiskScopeResult<Option<Decimal>> {
        let file = std::fs::File::open(&self.path).map_err(|e| RiskScopeError::ExternalService {
            service: "price history".into(),
            reason: format!("{}: {}", self.path.display(), e),
        })?;
        let code = normalize_identifier(entity_id, self.identifier_width);
        let mut rdr = csv::Reader::from_reader(file);

        let mut latest: Option<(NaiveDate, Decimal)> = None;
        for record in rdr.deserialize::<PriceRecord>() {
            let record = record?;
            if normalize_identifier(&record.code, self.identifier_width) != code {
                continue;
            }
            let (Some(date), Some(close)) = (parse_date(&record.date), parse_numeric(&record.close)) else {
                continue;
            };
            if range.contains(date) && latest.map_or(true, |(d, _)| date > d) {
                latest = Some((date, close));
            }
        }
        Ok(latest.map(|(_, close)| close))
    }
}

/// Best-effort price: any failure or missing quote becomes zero.
pub fn latest_price_or_zero(
    source: &dyn PriceSource,
    entity_id: &str,
    range: DateRange,
    warnings: &mut Warnings,
) -> Decimal {
    match source.latest_close(entity_id, range) {
        Ok(Some(price)) => price,
        Ok(None) => {
            tracing::debug!(entity_id, "no price in window");
            Decimal::ZERO
        }
        Err(e) => {
            warnings.push(format!("Price lookup failed ({}); reporting a price of 0", e));
            Decimal::ZERO
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn history() -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "date,stock_code,close").unwrap();
        writeln!(f, "2024-12-30,005930,53000").unwrap();
        writeln!(f, "2025-06-02,5930,58100").unwrap();
        writeln!(f, "20250603,005930,58900").unwrap();
        writeln!(f, "2025-06-04,005930,N/A").unwrap();
        writeln!(f, "2025-06-05,000660,201000").unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_trailing_year() {
        let r = DateRange::trailing_year(date(2025, 6, 10));
        assert_eq!(r.start, date(2024, 6, 10));
        assert!(r.contains(date(2025, 6, 10)));
        assert!(!r.contains(date(2024, 6, 9)));
    }

    #[test]
    fn test_latest_close_in_window() {
        let f = history();
        let src = CsvPriceHistory::new(f.path(), 6);
        let range = DateRange::trailing_year(date(2025, 6, 10));
        assert_eq!(src.latest_close("5930", range).unwrap(), Some(dec!(58900)));
    }

    #[test]
    fn test_window_excludes_later_quotes() {
        let f = history();
        let src = CsvPriceHistory::new(f.path(), 6);
        let range = DateRange::trailing_year(date(2025, 1, 15));
        assert_eq!(src.latest_close("005930", range).unwrap(), Some(dec!(53000)));
    }

    #[test]
    fn test_unknown_entity_has_no_price() {
        let f = history();
        let src = CsvPriceHistory::new(f.path(), 6);
        let range = DateRange::trailing_year(date(2025, 6, 10));
        assert_eq!(src.latest_close("035720", range).unwrap(), None);
    }

    #[test]
    fn test_missing_file_degrades_to_zero() {
        let src = CsvPriceHistory::new("/nonexistent/prices.csv", 6);
        let mut warnings = Warnings::new();
        let price = latest_price_or_zero(
            &src,
            "005930",
            DateRange::trailing_year(date(2025, 6, 10)),
            &mut warnings,
        );
        assert_eq!(price, Decimal::ZERO);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_no_price_source_is_zero_without_warning() {
        let mut warnings = Warnings::new();
        let price = latest_price_or_zero(
            &NoPriceSource,
            "005930",
            DateRange::trailing_year(date(2025, 6, 10)),
            &mut warnings,
        );
        assert_eq!(price, Decimal::ZERO);
        assert!(warnings.is_empty());
    }
}
