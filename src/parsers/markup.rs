//! HTML catalog parser.
//!
//! One record per element matching [`MarkupSchema::item`]; identifier, name,
//! description and family each come from the text of a named child element.

use scraper::{ElementRef, Html, Selector};

use super::{non_empty, ControlParser};
use crate::error::{Result, SyncError};
use crate::sources::SourceFormat;
use crate::types::ControlRecord;

/// CSS selectors describing where control fields live in a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupSchema {
    pub item: String,
    pub id: String,
    pub name: String,
    pub description: String,
    pub family: String,
}

impl Default for MarkupSchema {
    fn default() -> Self {
        Self {
            item: ".control-item".into(),
            id: ".control-id".into(),
            name: ".control-name".into(),
            description: ".control-description".into(),
            family: ".control-family".into(),
        }
    }
}

struct CompiledSchema {
    item: Selector,
    id: Selector,
    name: Selector,
    description: Selector,
    family: Selector,
}

impl CompiledSchema {
    fn compile(schema: &MarkupSchema) -> Result<Self> {
        let parse = |css: &str| {
            Selector::parse(css)
                .map_err(|e| SyncError::Config(format!("invalid selector '{css}': {e}")))
        };
        Ok(Self {
            item: parse(&schema.item)?,
            id: parse(&schema.id)?,
            name: parse(&schema.name)?,
            description: parse(&schema.description)?,
            family: parse(&schema.family)?,
        })
    }
}

pub struct MarkupParser {
    schema: CompiledSchema,
}

impl MarkupParser {
    pub fn new(schema: &MarkupSchema) -> Result<Self> {
        Ok(Self {
            schema: CompiledSchema::compile(schema)?,
        })
    }

    fn record(&self, framework_id: &str, item: ElementRef<'_>) -> Option<ControlRecord> {
        let id = non_empty(&child_text(item, &self.schema.id))?;
        let name = non_empty(&child_text(item, &self.schema.name))?;

        Some(
            ControlRecord::new(framework_id, id, name)
                .with_description(child_text(item, &self.schema.description))
                .with_family(child_text(item, &self.schema.family)),
        )
    }
}

impl Default for MarkupParser {
    fn default() -> Self {
        Self::new(&MarkupSchema::default()).expect("default markup schema compiles")
    }
}

impl ControlParser for MarkupParser {
    fn format(&self) -> SourceFormat {
        SourceFormat::Markup
    }

    fn parse(&self, framework_id: &str, payload: &[u8]) -> Result<Vec<ControlRecord>> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| SyncError::structural(self.format(), format!("payload is not UTF-8: {e}")))?;
        let document = Html::parse_document(text);

        let mut skipped = 0usize;
        let controls: Vec<ControlRecord> = document
            .select(&self.schema.item)
            .filter_map(|item| {
                let record = self.record(framework_id, item);
                if record.is_none() {
                    skipped += 1;
                }
                record
            })
            .collect();

        tracing::debug!(framework_id, parsed = controls.len(), skipped, "Parsed markup catalog");
        Ok(controls)
    }
}

/// Whitespace-collapsed text of the first descendant matching `selector`.
fn child_text(item: ElementRef<'_>, selector: &Selector) -> String {
    item.select(selector)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}
