//! A1 range notation.
//!
//! Sheet names are always quoted (`'My Tab'!A1`), with embedded quotes
//! doubled. Names containing characters Google forbids in tab titles are
//! rejected locally instead of producing an opaque API error.

use super::SheetsError;

/// Characters that cannot appear in a tab title.
const FORBIDDEN: &[char] = &['[', ']', '*', '?', ':', '/', '\\'];

/// Quote a sheet name for use in a range.
///
/// # Errors
///
/// Returns `SheetsError::RangeParse` for an empty name or one containing a
/// forbidden character.
pub fn quote_sheet_name(name: &str) -> Result<String, SheetsError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SheetsError::RangeParse {
            range: name.to_string(),
            message: "sheet name is empty".to_string(),
        });
    }
    if let Some(c) = trimmed.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(SheetsError::RangeParse {
            range: name.to_string(),
            message: format!("sheet name contains '{c}', which is not allowed in a tab name"),
        });
    }
    Ok(format!("'{}'", trimmed.replace('\'', "''")))
}

/// Range covering every populated cell of a tab.
///
/// # Errors
///
/// See [`quote_sheet_name`].
pub fn whole_sheet(name: &str) -> Result<String, SheetsError> {
    quote_sheet_name(name)
}

/// Range of the header row.
///
/// # Errors
///
/// See [`quote_sheet_name`].
pub fn header_row(name: &str) -> Result<String, SheetsError> {
    Ok(format!("{}!1:1", quote_sheet_name(name)?))
}

/// Range of one cell, `column` being a zero-based index and `row` 1-based.
///
/// # Errors
///
/// See [`quote_sheet_name`].
pub fn cell(name: &str, column: usize, row: u32) -> Result<String, SheetsError> {
    Ok(format!(
        "{}!{}{row}",
        quote_sheet_name(name)?,
        column_letter(column)
    ))
}

/// Zero-based column index to letters: 0 → `A`, 25 → `Z`, 26 → `AA`.
#[must_use]
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        #[allow(clippy::cast_possible_truncation)] // rem < 26
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}
