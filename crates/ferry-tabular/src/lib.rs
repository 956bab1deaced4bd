//! Ferry Tabular
//!
//! Heuristics for CSV input whose shape is not declared up front:
//!
//! - [`sniff_delimiter`] picks the field delimiter from a sample.
//! - [`has_header`] votes on whether the first row is a header.
//! - [`csv_to_rows`] turns CSV text into a [`Table`] of named, coerced cells.
//! - [`rows_to_csv`] writes a [`Table`] back out as CSV text.
//!
//! The header vote and the sample bounds (20 inspected rows, 2048 sampled
//! characters, strictly positive vote) are behavioral contracts relied on by
//! table converters.

mod error;
mod rows;
mod sniff;

pub use error::TabularError;
pub use rows::{Table, csv_to_rows, rows_to_csv};
pub use sniff::{HEADER_SNIFF_ROWS, SNIFF_SAMPLE_CHARS, has_header, sniff_delimiter};
