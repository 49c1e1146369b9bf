//! Workbook parser (xlsx, xls, xlsb, ods).
//!
//! Every sheet is read. The first row of a sheet is its header row; each
//! later row with both a `ControlID` and a `Title` becomes one record.

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};

use super::{non_empty, ControlParser};
use crate::error::{Result, SyncError};
use crate::sources::SourceFormat;
use crate::types::ControlRecord;

const COL_ID: &str = "ControlID";
const COL_TITLE: &str = "Title";
const COL_DESCRIPTION: &str = "Description";
const COL_FAMILY: &str = "Family";
const COL_REQUIREMENTS: &str = "Requirements";
const COL_GUIDANCE: &str = "Guidance";

#[derive(Debug, Default, Clone, Copy)]
pub struct SpreadsheetParser;

impl ControlParser for SpreadsheetParser {
    fn format(&self) -> SourceFormat {
        SourceFormat::Spreadsheet
    }

    fn parse(&self, framework_id: &str, payload: &[u8]) -> Result<Vec<ControlRecord>> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(payload.to_vec()))
            .map_err(|e| SyncError::structural(self.format(), e))?;

        let sheets = workbook.sheet_names().into_iter().map(|sheet| {
            let range = workbook.worksheet_range(&sheet);
            (sheet, range)
        });
        Ok(records_from_sheets(framework_id, sheets))
    }
}

/// Records from every readable sheet. A sheet that cannot be read is logged
/// and skipped; the rest of the workbook still counts.
fn records_from_sheets<E: std::fmt::Display>(
    framework_id: &str,
    sheets: impl IntoIterator<Item = (String, std::result::Result<Range<Data>, E>)>,
) -> Vec<ControlRecord> {
    let mut controls = Vec::new();
    for (sheet, range) in sheets {
        let range = match range {
            Ok(range) => range,
            Err(e) => {
                tracing::warn!(framework_id, sheet = %sheet, error = %e, "Skipping unreadable sheet");
                continue;
            }
        };

        let mut rows = range.rows();
        let Some(header) = rows.next() else {
            continue;
        };
        let columns = HeaderIndex::new(header);

        let before = controls.len();
        let mut skipped = 0usize;
        for row in rows {
            match columns.record(framework_id, row) {
                Some(record) => controls.push(record),
                None => skipped += 1,
            }
        }

        tracing::debug!(
            framework_id,
            sheet = %sheet,
            parsed = controls.len() - before,
            skipped,
            "Parsed workbook sheet"
        );
    }
    controls
}

/// Column positions from a sheet's header row.
struct HeaderIndex {
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    fn new(header: &[Data]) -> Self {
        let positions = header
            .iter()
            .enumerate()
            .filter_map(|(i, cell)| non_empty(&cell_text(cell)).map(|name| (name, i)))
            .collect();
        Self { positions }
    }

    fn field(&self, row: &[Data], column: &str) -> String {
        self.positions
            .get(column)
            .and_then(|&i| row.get(i))
            .map(cell_text)
            .unwrap_or_default()
    }

    fn record(&self, framework_id: &str, row: &[Data]) -> Option<ControlRecord> {
        let id = non_empty(&self.field(row, COL_ID))?;
        let name = non_empty(&self.field(row, COL_TITLE))?;

        let mut record = ControlRecord::new(framework_id, id, name);
        record.description = self.field(row, COL_DESCRIPTION);
        record.family = self.field(row, COL_FAMILY);
        record.requirements = self.field(row, COL_REQUIREMENTS);
        record.guidance = self.field(row, COL_GUIDANCE);
        Some(record)
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        // Whole numbers come back from most writers as floats.
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string().trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn workbook(sheets: &[&[&[&str]]]) -> Vec<u8> {
        let mut workbook = Workbook::new();
        for rows in sheets {
            let sheet = workbook.add_worksheet();
            for (r, row) in rows.iter().enumerate() {
                for (c, value) in row.iter().enumerate() {
                    if !value.is_empty() {
                        sheet.write_string(r as u32, c as u16, *value).unwrap();
                    }
                }
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn row_without_id_is_skipped() {
        let payload = workbook(&[&[
            &["ControlID", "Title"],
            &["AC-1", "Access"],
            &["", "Bad"],
        ]]);

        let controls = SpreadsheetParser.parse("fedramp-moderate", &payload).unwrap();
        assert_eq!(controls.len(), 1);
        assert_eq!(controls[0].id, "AC-1");
        assert_eq!(controls[0].name, "Access");
        assert_eq!(controls[0].description, "");
        assert_eq!(controls[0].framework, "fedramp-moderate");
    }

    #[test]
    fn reads_optional_columns_and_all_sheets() {
        let payload = workbook(&[
            &[
                &["Family", "ControlID", "Title", "Description", "Guidance"],
                &["Access Control", "AC-2", "Account Management", "Manage accounts", "Review"],
                &["Access Control", "AC-3", "", "no title", ""],
            ],
            &[
                &["ControlID", "Title", "Requirements"],
                &["AU-2", "Event Logging", "Log events"],
            ],
        ]);

        let controls = SpreadsheetParser.parse("fedramp-moderate", &payload).unwrap();
        let ids: Vec<&str> = controls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["AC-2", "AU-2"]);
        assert_eq!(controls[0].family, "Access Control");
        assert_eq!(controls[0].guidance, "Review");
        assert_eq!(controls[1].requirements, "Log events");
    }

    #[test]
    fn numeric_ids_render_without_fraction() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "ControlID").unwrap();
        sheet.write_string(0, 1, "Title").unwrap();
        sheet.write_number(1, 0, 12).unwrap();
        sheet.write_string(1, 1, "Numbered").unwrap();
        let payload = workbook.save_to_buffer().unwrap();

        let controls = SpreadsheetParser.parse("x", &payload).unwrap();
        assert_eq!(controls[0].id, "12");
    }

    #[test]
    fn unreadable_sheet_is_skipped_not_fatal() {
        let mut range = Range::new((0, 0), (1, 1));
        range.set_value((0, 0), Data::String("ControlID".into()));
        range.set_value((0, 1), Data::String("Title".into()));
        range.set_value((1, 0), Data::String("SC-7".into()));
        range.set_value((1, 1), Data::String("Boundary Protection".into()));

        let sheets = vec![
            ("Cover".to_string(), Err("missing worksheet part".to_string())),
            ("Controls".to_string(), Ok(range)),
        ];
        let controls = records_from_sheets("fedramp-moderate", sheets);
        assert_eq!(controls.len(), 1);
        assert_eq!(controls[0].id, "SC-7");
        assert_eq!(controls[0].name, "Boundary Protection");
    }

    #[test]
    fn header_only_workbook_is_empty_not_error() {
        let payload = workbook(&[&[&["ControlID", "Title"]]]);
        assert!(SpreadsheetParser.parse("x", &payload).unwrap().is_empty());
    }

    #[test]
    fn garbage_payload_is_structural_error() {
        let err = SpreadsheetParser
            .parse("x", b"this is not a workbook")
            .unwrap_err();
        assert!(matches!(err, SyncError::StructuralParse { .. }));
    }
}
