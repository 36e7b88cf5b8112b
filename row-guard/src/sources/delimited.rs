//! Delimited-text reader with delimiter sniffing.

use super::Records;
use crate::core::{Headers, Row, Value};
use crate::error::GuardError;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

/// Delimiters considered by [`sniff_delimiter`], in tie-break order.
pub const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b'\t', b';', b'|'];

/// Number of leading characters inspected when sniffing.
pub const SNIFF_SAMPLE_CHARS: usize = 5000;

/// Picks the delimiter whose per-line occurrence count is most consistent.
///
/// Each sampled line contributes its quote-aware count of the candidate. The
/// modal non-zero count is found per candidate, and the candidate whose mode
/// covers the largest fraction of lines wins. Ties go to the earlier entry of
/// [`CANDIDATE_DELIMITERS`]. Falls back to comma when no candidate occurs.
pub fn sniff_delimiter(text: &str) -> u8 {
    let (sample, truncated) = match text.char_indices().nth(SNIFF_SAMPLE_CHARS) {
        Some((cut, _)) => (&text[..cut], true),
        None => (text, false),
    };

    let mut lines: Vec<&str> = sample.lines().collect();
    // The last line of a truncated sample is partial.
    if truncated && lines.len() > 1 {
        lines.pop();
    }
    lines.retain(|line| !line.trim().is_empty());
    if lines.is_empty() {
        return b',';
    }

    let mut best: Option<(u8, f64)> = None;
    for &candidate in &CANDIDATE_DELIMITERS {
        let mut frequencies: HashMap<usize, usize> = HashMap::new();
        for line in &lines {
            let count = count_unquoted(line, candidate);
            if count > 0 {
                *frequencies.entry(count).or_default() += 1;
            }
        }
        let Some(mode_lines) = frequencies.values().copied().max() else {
            continue;
        };
        let consistency = mode_lines as f64 / lines.len() as f64;
        if best.map_or(true, |(_, score)| consistency > score) {
            best = Some((candidate, consistency));
        }
    }

    best.map_or(b',', |(delimiter, _)| delimiter)
}

fn count_unquoted(line: &str, delimiter: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for byte in line.bytes() {
        if byte == b'"' {
            in_quotes = !in_quotes;
        } else if byte == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

pub(super) fn open(bytes: Vec<u8>) -> Records {
    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    if text.starts_with('\u{feff}') {
        text.drain(..'\u{feff}'.len_utf8());
    }
    let delimiter = sniff_delimiter(&text);
    debug!(delimiter = %(delimiter as char).escape_default(), "Detected delimiter");

    let mut records = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(Cursor::new(text.into_bytes()))
        .into_records();

    let headers = match records.next() {
        Some(Ok(record)) => Headers::from_raw(record.iter()),
        Some(Err(e)) => {
            let headers = Arc::new(Headers::from_raw(Vec::<String>::new()));
            let err = GuardError::from(e);
            return Records::new(headers, Box::new(std::iter::once(Err(err))));
        }
        None => Headers::from_raw(Vec::<String>::new()),
    };
    let headers = Arc::new(headers);

    let row_headers = Arc::clone(&headers);
    let rows = records.map(move |record| {
        let record = record?;
        let cells = record
            .iter()
            .map(|cell| Some(Value::text(cell)))
            .collect::<Vec<_>>();
        Ok(Row::from_cells(&row_headers, cells))
    });

    Records::new(headers, Box::new(rows))
}
