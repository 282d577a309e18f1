//! Range addressing for the remote sheet store.
//!
//! A range is either a whole table (`"Requests"`) or an inclusive, 1-indexed
//! row span within it (`"Requests!2:7"`). Row 1 is always the header.

use std::fmt;
use std::str::FromStr;

/// First data row of every table. Row 1 holds the header.
pub const FIRST_DATA_ROW: u32 = 2;

/// A range-addressed slice of one table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SheetRange {
    table: String,
    rows: Option<(u32, u32)>,
}

impl SheetRange {
    /// The whole table, header included
    pub fn table(table: impl Into<String>) -> Self {
        SheetRange {
            table: table.into(),
            rows: None,
        }
    }

    /// Rows `start..=end` of `table`
    pub fn rows(table: impl Into<String>, start: u32, end: u32) -> Self {
        debug_assert!(start >= 1, "rows are 1-indexed");
        debug_assert!(start <= end, "range must not be inverted");
        SheetRange {
            table: table.into(),
            rows: Some((start, end)),
        }
    }

    /// A single row
    pub fn row(table: impl Into<String>, row: u32) -> Self {
        Self::rows(table, row, row)
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Inclusive row bounds, or `None` for the whole table
    pub fn row_bounds(&self) -> Option<(u32, u32)> {
        self.rows
    }

    /// Number of rows the range spans, or `None` for the whole table
    pub fn height(&self) -> Option<usize> {
        self.rows.map(|(start, end)| (end - start + 1) as usize)
    }
}

impl fmt::Display for SheetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rows {
            Some((start, end)) => write!(f, "{}!{}:{}", self.table, start, end),
            None => write!(f, "{}", self.table),
        }
    }
}

/// Error returned when a range string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeParseError(pub String);

impl fmt::Display for RangeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid sheet range: {}", self.0)
    }
}

impl std::error::Error for RangeParseError {}

impl FromStr for SheetRange {
    type Err = RangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((table, span)) = s.rsplit_once('!') else {
            if s.is_empty() {
                return Err(RangeParseError(s.to_string()));
            }
            return Ok(SheetRange::table(s));
        };

        let (start, end) = span
            .split_once(':')
            .ok_or_else(|| RangeParseError(s.to_string()))?;
        let start: u32 = start.parse().map_err(|_| RangeParseError(s.to_string()))?;
        let end: u32 = end.parse().map_err(|_| RangeParseError(s.to_string()))?;
        if table.is_empty() || start == 0 || start > end {
            return Err(RangeParseError(s.to_string()));
        }
        Ok(SheetRange::rows(table, start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(SheetRange::table("New Callers").to_string(), "New Callers");
        assert_eq!(SheetRange::rows("Requests", 2, 7).to_string(), "Requests!2:7");
        assert_eq!(SheetRange::row("Requests", 4).to_string(), "Requests!4:4");
    }

    #[test]
    fn test_parse() {
        let range: SheetRange = "Caller History!2:10".parse().unwrap();
        assert_eq!(range.table_name(), "Caller History");
        assert_eq!(range.row_bounds(), Some((2, 10)));
        assert_eq!(range.height(), Some(9));

        let whole: SheetRange = "Requests".parse().unwrap();
        assert_eq!(whole.row_bounds(), None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<SheetRange>().is_err());
        assert!("Requests!a:b".parse::<SheetRange>().is_err());
        assert!("Requests!5:2".parse::<SheetRange>().is_err());
        assert!("Requests!0:2".parse::<SheetRange>().is_err());
        assert!("!2:3".parse::<SheetRange>().is_err());
    }
}
