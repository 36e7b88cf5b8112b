//! `.xlsx` rendering: a `Legend` sheet and a `ValidatedData` sheet.

use super::RowClass;
use crate::core::{ValidatedRow, Value, REMARKS_FIELD, VALID_FIELD};
use crate::error::{GuardError, Result};
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, Worksheet};
use std::collections::HashMap;

pub(super) const LEGEND_SHEET: &str = "Legend";
pub(super) const DATA_SHEET: &str = "ValidatedData";
const HEADER_FILL: u32 = 0xD9E1F2;
const MAX_COLUMN_WIDTH: usize = 50;

fn class_format(class: RowClass) -> Format {
    let (fill, font) = class.colors();
    Format::new()
        .set_background_color(Color::RGB(fill))
        .set_font_color(Color::RGB(font))
}

fn column_index(col: usize) -> Result<u16> {
    u16::try_from(col).map_err(|_| GuardError::Artifact(format!("column {col} exceeds the worksheet limit")))
}

fn row_index(row: usize) -> Result<u32> {
    u32::try_from(row).map_err(|_| GuardError::Artifact(format!("row {row} exceeds the worksheet limit")))
}

fn header_format() -> Format {
    Format::new()
        .set_bold()
        .set_background_color(Color::RGB(HEADER_FILL))
}

pub(super) fn render(headers: &[String], rows: &[ValidatedRow]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    write_legend(workbook.add_worksheet())?;
    write_data(workbook.add_worksheet(), headers, rows)?;
    Ok(workbook.save_to_buffer()?)
}

fn write_legend(sheet: &mut Worksheet) -> Result<()> {
    sheet.set_name(LEGEND_SHEET)?;

    let title = Format::new().set_bold().set_font_size(14).set_align(FormatAlign::Left);
    let text = Format::new()
        .set_align(FormatAlign::VerticalCenter)
        .set_text_wrap();
    let header = header_format();

    sheet.write_string_with_format(0, 0, "Validation Color Legend", &title)?;
    for (col, name) in ["Status", "Color", "Meaning"].iter().enumerate() {
        sheet.write_string_with_format(2, column_index(col)?, *name, &header)?;
    }
    for (offset, class) in RowClass::ALL.iter().enumerate() {
        let row = row_index(3 + offset)?;
        sheet.write_string_with_format(row, 0, class.label(), &text)?;
        sheet.write_string_with_format(row, 1, class.color_name(), &class_format(*class))?;
        sheet.write_string_with_format(row, 2, class.meaning(), &text)?;
    }

    sheet.set_column_width(0, 20)?;
    sheet.set_column_width(1, 15)?;
    sheet.set_column_width(2, 60)?;
    Ok(())
}

fn write_data(sheet: &mut Worksheet, headers: &[String], rows: &[ValidatedRow]) -> Result<()> {
    sheet.set_name(DATA_SHEET)?;
    sheet.set_freeze_panes(1, 0)?;

    let header = header_format();
    for (col, name) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, column_index(col)?, name, &header)?;
    }

    let formats: HashMap<RowClass, Format> = RowClass::ALL
        .iter()
        .map(|class| (*class, class_format(*class)))
        .collect();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();

    for (idx, validated) in rows.iter().enumerate() {
        let row = row_index(idx + 1)?;
        let format = &formats[&RowClass::classify(validated)];
        for (col, name) in headers.iter().enumerate() {
            let col_idx = column_index(col)?;
            let rendered = match name.as_str() {
                VALID_FIELD => {
                    let verdict = validated.valid().as_str();
                    sheet.write_string_with_format(row, col_idx, verdict, format)?;
                    verdict.len()
                }
                REMARKS_FIELD => {
                    sheet.write_string_with_format(row, col_idx, validated.remarks(), format)?;
                    validated.remarks().chars().count()
                }
                field => write_value(sheet, row, col_idx, validated.row().get(field), format)?,
            };
            widths[col] = widths[col].max(rendered);
        }
    }

    for (col, width) in widths.iter().enumerate() {
        let width = (width + 2).min(MAX_COLUMN_WIDTH);
        sheet.set_column_width(column_index(col)?, width as f64)?;
    }
    Ok(())
}

/// Writes one cell and returns its rendered width.
fn write_value(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: Option<&Value>,
    format: &Format,
) -> Result<usize> {
    match value {
        None => {
            sheet.write_blank(row, col, format)?;
            Ok(0)
        }
        Some(Value::Int(i)) => {
            sheet.write_number_with_format(row, col, *i as f64, format)?;
            Ok(i.to_string().len())
        }
        Some(Value::Float(f)) if f.is_finite() => {
            sheet.write_number_with_format(row, col, *f, format)?;
            Ok(f.to_string().len())
        }
        Some(Value::Bool(b)) => {
            sheet.write_boolean_with_format(row, col, *b, format)?;
            Ok(if *b { 4 } else { 5 })
        }
        Some(other) => {
            let text = other.to_string();
            sheet.write_string_with_format(row, col, &text, format)?;
            Ok(text.chars().count())
        }
    }
}
