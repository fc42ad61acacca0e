//! Cell coordinates: 1-indexed columns rendered as letters, 1-indexed rows.

use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Render a cell reference such as `C3` from a 1-indexed column and row.
pub fn format(column: u16, row: u32) -> String {
    format!("{}{}", column_letters(column), row)
}

/// Convert a 1-indexed column number to letters (1→A, 26→Z, 27→AA).
pub fn column_letters(column: u16) -> String {
    let mut result = String::new();
    let mut num = column as u32;

    while num > 0 {
        let remainder = (num - 1) % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        num = (num - 1) / 26;
    }

    result
}

/// A spreadsheet column, 1-indexed (A = 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Column(u16);

impl Column {
    pub fn new(index: u16) -> BridgeResult<Self> {
        if index == 0 {
            return Err(BridgeError::Mapping(
                "column index is 1-based, got 0".to_string(),
            ));
        }
        Ok(Self(index))
    }

    /// Column for a literal index; panics at compile time when zero.
    pub(crate) const fn known(index: u16) -> Self {
        assert!(index > 0, "column index is 1-based");
        Self(index)
    }

    pub fn index(self) -> u16 {
        self.0
    }

    /// Zero-based index as used by the spreadsheet codecs.
    pub fn zero_based(self) -> u16 {
        self.0 - 1
    }

    pub fn letters(self) -> String {
        column_letters(self.0)
    }
}

impl FromStr for Column {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(BridgeError::Mapping("empty column reference".to_string()));
        }

        let mut index: u32 = 0;
        for ch in trimmed.chars() {
            if !ch.is_ascii_alphabetic() {
                return Err(BridgeError::Mapping(format!(
                    "invalid column reference '{}'",
                    s
                )));
            }
            index = index * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
            if index > u16::MAX as u32 {
                return Err(BridgeError::Mapping(format!(
                    "column reference '{}' out of range",
                    s
                )));
            }
        }

        Ok(Self(index as u16))
    }
}

impl TryFrom<String> for Column {
    type Error = BridgeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Column> for String {
    fn from(column: Column) -> Self {
        column.letters()
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.letters())
    }
}

/// A (column, row) coordinate within one tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellAddress {
    pub column: Column,
    pub row: u32,
}

impl CellAddress {
    pub fn new(column: Column, row: u32) -> BridgeResult<Self> {
        if row == 0 {
            return Err(BridgeError::Mapping("row number is 1-based, got 0".to_string()));
        }
        Ok(Self { column, row })
    }

    /// Build from the `cell_column` letters and `row_number` stored with a question.
    pub fn from_parts(column: &str, row: u32) -> BridgeResult<Self> {
        Self::new(column.parse()?, row)
    }

    /// Parse an A1-style reference such as `J8`.
    pub fn parse(reference: &str) -> BridgeResult<Self> {
        let split = reference
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| BridgeError::Mapping(format!("missing row in '{}'", reference)))?;
        let (letters, digits) = reference.split_at(split);
        let row: u32 = digits
            .parse()
            .map_err(|_| BridgeError::Mapping(format!("invalid row in '{}'", reference)))?;
        Self::from_parts(letters, row)
    }

    /// Zero-based (row, column) pair for the codecs.
    pub fn zero_based(self) -> (u32, u16) {
        (self.row - 1, self.column.zero_based())
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format(self.column.index(), self.row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_single_letter() {
        assert_eq!(format(3, 3), "C3");
        assert_eq!(format(1, 14), "A14");
        assert_eq!(format(10, 8), "J8");
    }

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letters(1), "A");
        assert_eq!(column_letters(26), "Z");
        assert_eq!(column_letters(27), "AA");
        assert_eq!(column_letters(52), "AZ");
        assert_eq!(column_letters(53), "BA");
        assert_eq!(column_letters(703), "AAA");
    }

    #[test]
    fn test_column_parse() {
        assert_eq!("A".parse::<Column>().unwrap().index(), 1);
        assert_eq!("i".parse::<Column>().unwrap().index(), 9);
        assert_eq!("AA".parse::<Column>().unwrap().index(), 27);
        assert!("".parse::<Column>().is_err());
        assert!("C3".parse::<Column>().is_err());
    }

    #[test]
    fn test_column_zero_rejected() {
        assert!(Column::new(0).is_err());
        assert_eq!(Column::new(4).unwrap().letters(), "D");
    }

    #[test]
    fn test_address_parse_and_display() {
        let addr = CellAddress::parse("J8").unwrap();
        assert_eq!(addr.column.index(), 10);
        assert_eq!(addr.row, 8);
        assert_eq!(addr.to_string(), "J8");
        assert_eq!(addr.zero_based(), (7, 9));
    }

    #[test]
    fn test_address_parse_rejects_garbage() {
        assert!(CellAddress::parse("C").is_err());
        assert!(CellAddress::parse("C0").is_err());
        assert!(CellAddress::parse("3C").is_err());
    }

    #[test]
    fn test_address_from_stored_parts() {
        let addr = CellAddress::from_parts("I", 42).unwrap();
        assert_eq!(addr.to_string(), "I42");
    }
}
