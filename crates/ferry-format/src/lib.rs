//! Ferry Format
//!
//! Discovery of converter and validator plugins, and planning of format
//! conversions between them.
//!
//! A plugin is a JSON task descriptor. Files named `validate_*.json` are
//! validators: one input of the checked (type, format), one output of type and
//! format `boolean`. Every other `*.json` file is a converter: one input and
//! one output of the same type in different formats.
//!
//! Loaded converters form a directed graph per data type. [`FormatRegistry::close`]
//! adds composed edges so that multi-step conversions are found by a single
//! lookup in [`FormatRegistry::plan`].

mod descriptor;
mod error;
mod plan;
mod registry;

pub use descriptor::{Descriptor, DescriptorKind, VALIDATOR_PREFIX};
pub use error::FormatError;
pub use plan::{ConversionPlan, ConverterEdge};
pub use registry::{FormatRegistry, MAX_CONVERSION_HOPS};
