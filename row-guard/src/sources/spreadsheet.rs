//! Workbook reader backed by calamine.

use super::Records;
use crate::core::{value::integral, Headers, Row, Value};
use crate::error::Result;
use calamine::{open_workbook_auto_from_rs, Data, ExcelDateTime, Range, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use std::io::Cursor;
use std::sync::Arc;

pub(super) fn open(bytes: Vec<u8>) -> Result<Records> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range?,
        None => Range::empty(),
    };

    let width = range.width();
    let headers = if range.height() == 0 {
        Headers::from_raw(Vec::<String>::new())
    } else {
        Headers::from_raw((0..width).map(|col| match range.get((0, col)) {
            Some(cell) => cell_value(cell).map(|v| v.to_string()).unwrap_or_default(),
            None => String::new(),
        }))
    };
    let headers = Arc::new(headers);

    let rows = SheetRows {
        headers: Arc::clone(&headers),
        range,
        next: 1,
    };
    Ok(Records::new(headers, Box::new(rows)))
}

/// Lazily materializes one row of the worksheet range at a time.
struct SheetRows {
    headers: Arc<Headers>,
    range: Range<Data>,
    next: usize,
}

impl Iterator for SheetRows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.range.height() {
            return None;
        }
        let row_idx = self.next;
        self.next += 1;
        let cells = (0..self.range.width())
            .map(|col| self.range.get((row_idx, col)).and_then(cell_value))
            .collect();
        Some(Ok(Row::from_cells(&self.headers, cells)))
    }
}

fn cell_value(cell: &Data) -> Option<Value> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(Value::Text(s.clone())),
        Data::Int(i) => Some(Value::Int(*i)),
        Data::Float(f) => Some(integral(*f).map_or(Value::Float(*f), Value::Int)),
        Data::Bool(b) => Some(Value::Bool(*b)),
        Data::DateTime(dt) => Some(date_value(dt)),
        Data::DateTimeIso(s) => Some(parse_iso(s)),
        Data::DurationIso(s) => Some(Value::Text(s.clone())),
        Data::Error(e) => Some(Value::Text(e.to_string())),
    }
}

/// Largest serial Excel renders as a date (9999-12-31).
const MAX_DATE_SERIAL: f64 = 2_958_465.0;

/// Date-formatted numbers become date-times; durations and serials outside
/// Excel's date range keep their numeric value.
fn date_value(dt: &ExcelDateTime) -> Value {
    let serial = dt.as_f64();
    if dt.is_duration() || !(0.0..=MAX_DATE_SERIAL).contains(&serial) {
        return Value::Float(serial);
    }
    dt.as_datetime().map_or(Value::Float(serial), Value::DateTime)
}

fn parse_iso(s: &str) -> Value {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        Value::DateTime(dt)
    } else if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        Value::Date(d)
    } else {
        Value::Text(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::ExcelDateTimeType;
    use rust_xlsxwriter::{Format, Workbook};

    fn workbook_bytes(build: impl FnOnce(&mut rust_xlsxwriter::Worksheet)) -> Vec<u8> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        build(sheet);
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn test_reads_typed_cells() {
        let bytes = workbook_bytes(|sheet| {
            sheet.write_string(0, 0, " Name ").unwrap();
            sheet.write_string(0, 1, "Age").unwrap();
            sheet.write_string(0, 2, "Score").unwrap();
            sheet.write_string(1, 0, "Ann").unwrap();
            sheet.write_number(1, 1, 30.0).unwrap();
            sheet.write_number(1, 2, 9.5).unwrap();
            sheet.write_string(2, 0, "Bob").unwrap();
        });

        let records = open(bytes).unwrap();
        assert_eq!(records.headers().names(), &["name", "age", "score"]);
        let rows = records.collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name"), Some(&Value::text("Ann")));
        assert_eq!(rows[0].get("age"), Some(&Value::Int(30)));
        assert_eq!(rows[0].get("score"), Some(&Value::Float(9.5)));
        assert_eq!(rows[1].get("age"), None);
    }

    #[test]
    fn test_corrupt_workbook_is_a_source_error() {
        let err = open(b"definitely not a zip".to_vec()).unwrap_err();
        assert!(matches!(err, crate::error::GuardError::Source { .. }));
    }

    fn dated_cell(serial: f64) -> Option<Value> {
        let bytes = workbook_bytes(|sheet| {
            let date = Format::new().set_num_format("yyyy-mm-dd");
            sheet.write_string(0, 0, "When").unwrap();
            sheet.write_number_with_format(1, 0, serial, &date).unwrap();
        });
        let rows = open(bytes).unwrap().collect::<Result<Vec<_>>>().unwrap();
        rows[0].get("when").cloned()
    }

    #[test]
    fn test_excel_serial_dates() {
        let rendered = |serial| dated_cell(serial).map(|v| v.to_string());
        assert_eq!(rendered(1.0).as_deref(), Some("1900-01-01 00:00:00"));
        assert_eq!(rendered(61.0).as_deref(), Some("1900-03-01 00:00:00"));
        assert_eq!(rendered(45_292.5).as_deref(), Some("2024-01-01 12:00:00"));
    }

    #[test]
    fn test_out_of_range_serials_stay_numeric() {
        assert_eq!(dated_cell(1.0e20), Some(Value::Float(1.0e20)));
        assert_eq!(dated_cell(-1.0e20), Some(Value::Float(-1.0e20)));
    }

    #[test]
    fn test_1904_date_system() {
        let cell = Data::DateTime(ExcelDateTime::new(0.0, ExcelDateTimeType::DateTime, true));
        let value = cell_value(&cell).unwrap();
        assert_eq!(value.to_string(), "1904-01-01 00:00:00");
    }

    #[test]
    fn test_parse_iso_cells() {
        assert!(matches!(parse_iso("2024-05-01"), Value::Date(_)));
        assert!(matches!(parse_iso("2024-05-01T10:00:00"), Value::DateTime(_)));
        assert!(matches!(parse_iso("later"), Value::Text(_)));
    }
}
