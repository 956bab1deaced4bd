//! Delimiter and header detection.
//!
//! The header test treats the first row as a candidate header and infers a
//! type for every column from the rows below it. Columns whose type stays
//! consistent then vote: a header cell that does not fit its column's type is
//! evidence for a header, one that fits is evidence against.

use std::collections::{BTreeMap, HashMap};

use csv::{ReaderBuilder, StringRecord};

use crate::error::TabularError;

/// Rows inspected below the candidate header.
pub const HEADER_SNIFF_ROWS: usize = 20;

/// Characters of input sampled before sniffing.
pub const SNIFF_SAMPLE_CHARS: usize = 2048;

/// Candidate delimiters, most preferred first.
const DELIMITERS: [u8; 6] = [b',', b'\t', b';', b'|', b' ', b':'];

/// Inferred scalar type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellType {
  Integer,
  Float,
  /// Unparseable cells are typed by their length.
  Length(usize),
}

impl CellType {
  fn infer(cell: &str) -> Self {
    if is_integer(cell) {
      CellType::Integer
    } else if is_float(cell) {
      CellType::Float
    } else {
      CellType::Length(cell.chars().count())
    }
  }

  /// Whether a header cell fits this column type.
  fn matches(self, cell: &str) -> bool {
    match self {
      CellType::Integer => is_integer(cell),
      CellType::Float => is_float(cell),
      CellType::Length(len) => cell.chars().count() == len,
    }
  }
}

fn is_integer(cell: &str) -> bool {
  cell.trim().parse::<i128>().is_ok()
}

fn is_float(cell: &str) -> bool {
  cell.trim().parse::<f64>().is_ok()
}

/// Share of lines, in percent, that must agree on a delimiter's count.
const DELIMITER_CONSISTENCY: usize = 90;

/// Pick the field delimiter that splits the sample's lines most consistently.
///
/// For every candidate the most common non-zero per-line count is found. A
/// candidate only qualifies when the first line has that count and at least
/// [`DELIMITER_CONSISTENCY`] percent of the lines agree with it. The
/// qualifying candidate agreeing with the most lines wins, earlier candidates
/// winning ties. Falls back to `,`.
pub fn sniff_delimiter(sample: &str) -> u8 {
  let lines: Vec<&str> = sample.lines().filter(|l| !l.trim().is_empty()).collect();
  if lines.is_empty() {
    return b',';
  }

  let mut best: Option<(u8, usize)> = None;

  for delimiter in DELIMITERS {
    let counts: Vec<usize> = lines
      .iter()
      .map(|line| count_unquoted(line, delimiter))
      .collect();

    let mut frequency: HashMap<usize, usize> = HashMap::new();
    for &count in counts.iter().filter(|&&c| c > 0) {
      *frequency.entry(count).or_default() += 1;
    }

    // Modal count, smallest count winning ties.
    let Some((modal, agreeing)) = frequency
      .into_iter()
      .max_by(|(a_count, a_lines), (b_count, b_lines)| a_lines.cmp(b_lines).then(b_count.cmp(a_count)))
    else {
      continue;
    };

    if counts[0] != modal || agreeing * 100 < lines.len() * DELIMITER_CONSISTENCY {
      continue;
    }

    if best.is_none_or(|(_, score)| agreeing > score) {
      best = Some((delimiter, agreeing));
    }
  }

  best.map(|(delimiter, _)| delimiter).unwrap_or(b',')
}

/// Count occurrences of `delimiter` outside double-quoted sections.
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

/// Read every record of `text`, tolerating rows of differing width.
pub(crate) fn read_records(text: &str, delimiter: u8) -> Result<Vec<StringRecord>, TabularError> {
  let mut reader = ReaderBuilder::new()
    .has_headers(false)
    .flexible(true)
    .delimiter(delimiter)
    .from_reader(text.as_bytes());

  let mut records = Vec::new();
  for record in reader.records() {
    records.push(record?);
  }
  Ok(records)
}

/// Decide whether the first row of `sample` is a header.
///
/// Empty cells never contribute to type inference. Rows whose width differs
/// from the candidate header are skipped but still count toward the
/// [`HEADER_SNIFF_ROWS`] bound. A column removed for an inconsistent type is
/// never reconsidered. A column that never received a type (no non-empty
/// cells) cannot be matched by its header cell and so votes for a header.
pub fn has_header(sample: &str) -> Result<bool, TabularError> {
  let delimiter = sniff_delimiter(sample);
  let mut records = read_records(sample, delimiter)?.into_iter();

  let Some(header) = records.next() else {
    return Ok(false);
  };
  let columns = header.len();

  let mut column_types: BTreeMap<usize, Option<CellType>> =
    (0..columns).map(|col| (col, None)).collect();

  for row in records.take(HEADER_SNIFF_ROWS) {
    if row.len() != columns {
      continue;
    }

    column_types.retain(|&col, inferred| {
      let cell = &row[col];
      if cell.is_empty() {
        return true;
      }
      let this_type = CellType::infer(cell);
      match inferred {
        None => {
          *inferred = Some(this_type);
          true
        }
        Some(previous) => *previous == this_type,
      }
    });
  }

  let mut votes: i64 = 0;
  for (col, inferred) in &column_types {
    match inferred {
      Some(column_type) if column_type.matches(&header[*col]) => votes -= 1,
      _ => votes += 1,
    }
  }

  Ok(votes > 0)
}
