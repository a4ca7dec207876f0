//! CSV structural validation.
//!
//! A guard over raw upload bytes: it checks that every data row has as many
//! fields as the header before anything is handed to the engine. The field
//! splitter is deliberately minimal; a `"` toggles quoting and is dropped, so
//! a doubled quote inside a quoted field is not an escape.

use crate::error::ValidationError;

/// Shape of a structurally valid upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvShape {
    pub columns: usize,
    pub data_rows: usize,
}

/// Split one CSV line on commas outside double quotes.
///
/// Fields are trimmed and lose their quote characters:
/// `a,"b,c",d` gives `["a", "b,c", "d"]`.
pub fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    fields.push(current.trim().to_string());

    fields
}

/// Lines that count as CSV records: everything but blank or
/// whitespace-only lines. Line endings (`\n` or `\r\n`) are stripped.
pub fn record_lines(content: &str) -> impl Iterator<Item = &str> {
    content.lines().filter(|l| !l.trim().is_empty())
}

/// Validate row/column consistency of raw CSV bytes.
///
/// Bytes are decoded lossily as UTF-8 and blank lines are ignored. Row
/// numbers in errors are 1-based over the non-blank lines, header included.
pub fn validate_csv(bytes: &[u8]) -> Result<CsvShape, ValidationError> {
    let content = String::from_utf8_lossy(bytes);
    let lines: Vec<&str> = record_lines(&content).collect();

    if lines.len() < 2 {
        return Err(ValidationError::EmptyOrHeaderOnly);
    }

    let header = split_csv_line(lines[0]);
    if header.is_empty() || header.iter().all(|name| name.is_empty()) {
        return Err(ValidationError::NoColumns);
    }
    let expected = header.len();

    for (idx, line) in lines.iter().enumerate().skip(1) {
        let actual = split_csv_line(line).len();
        if actual != expected {
            return Err(ValidationError::RowWidthMismatch {
                row: idx + 1,
                actual,
                expected,
            });
        }
    }

    Ok(CsvShape {
        columns: expected,
        data_rows: lines.len() - 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_respects_quotes() {
        assert_eq!(split_csv_line(r#"a,"b,c",d"#), vec!["a", "b,c", "d"]);
    }

    #[test]
    fn test_split_trims_and_keeps_empty_fields() {
        assert_eq!(split_csv_line(" x , ,z"), vec!["x", "", "z"]);
        assert_eq!(split_csv_line("solo"), vec!["solo"]);
    }

    #[test]
    fn test_doubled_quote_only_toggles() {
        // "say ""hi""" -> quotes vanish, the text stays in one field
        assert_eq!(split_csv_line(r#""say ""hi""",2"#), vec!["say hi", "2"]);
    }

    #[test]
    fn test_valid_csv_shape() {
        let shape = validate_csv(b"name,age\nAlice,30\nBob,25\n").unwrap();
        assert_eq!(shape, CsvShape { columns: 2, data_rows: 2 });
    }

    #[test]
    fn test_crlf_and_blank_lines_are_ignored() {
        let shape = validate_csv(b"a,b\r\n\r\n1,2\r\n   \r\n3,4").unwrap();
        assert_eq!(shape.data_rows, 2);
    }

    #[test]
    fn test_header_only_is_rejected() {
        assert_eq!(validate_csv(b"a,b,c\n"), Err(ValidationError::EmptyOrHeaderOnly));
        assert_eq!(validate_csv(b""), Err(ValidationError::EmptyOrHeaderOnly));
        assert_eq!(validate_csv(b"\n\n  \n"), Err(ValidationError::EmptyOrHeaderOnly));
    }

    #[test]
    fn test_header_without_names_is_rejected() {
        assert_eq!(validate_csv(b"\"\"\nx\n"), Err(ValidationError::NoColumns));
    }

    #[test]
    fn test_first_bad_row_is_reported() {
        let err = validate_csv(b"a,b\n1,2\n1,2,3\n1\n").unwrap_err();
        assert_eq!(
            err,
            ValidationError::RowWidthMismatch {
                row: 3,
                actual: 3,
                expected: 2
            }
        );
    }

    #[test]
    fn test_quoted_commas_do_not_widen_rows() {
        assert!(validate_csv(b"city,note\nParis,\"big, old\"\n").is_ok());
    }
}
