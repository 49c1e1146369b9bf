//! Format parsers: raw source payload in, normalized control records out.
//!
//! Each [`SourceFormat`] has exactly one [`ControlParser`]; the pipeline picks
//! it once through [`parser_for`] and never looks at the format again.
//!
//! Shared contract:
//! - a payload that cannot be opened as the declared format is a
//!   `StructuralParse` error and nothing is written;
//! - once opened, records failing the required-field check (`id`, `name`)
//!   are skipped, and the parse always returns a possibly empty list.

mod api;
mod markup;
mod spreadsheet;

use std::sync::Arc;

pub use api::StructuredApiParser;
pub use markup::{MarkupParser, MarkupSchema};
pub use spreadsheet::SpreadsheetParser;

use crate::error::Result;
use crate::sources::SourceFormat;
use crate::types::ControlRecord;

pub trait ControlParser: Send + Sync {
    fn format(&self) -> SourceFormat;

    /// Parse one payload. Records carry `framework_id` as their framework.
    fn parse(&self, framework_id: &str, payload: &[u8]) -> Result<Vec<ControlRecord>>;
}

/// Parser for a source format, with the default extraction schema.
pub fn parser_for(format: SourceFormat) -> Arc<dyn ControlParser> {
    match format {
        SourceFormat::Spreadsheet => Arc::new(SpreadsheetParser),
        SourceFormat::Markup => Arc::new(MarkupParser::default()),
        SourceFormat::StructuredApi => Arc::new(StructuredApiParser),
    }
}

/// Trimmed text, or `None` when nothing is left.
pub(crate) fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
