//! Positional table extraction for portal pages.
//!
//! The portal renders every record kind as a server-side data grid with a fixed column
//! layout. Extraction runs over a normalized body in three passes: isolate the grid by
//! its marker, split it into `<tr>` rows, split each row into `<td>` cells. Cells are
//! mapped to fields by index, so a layout change upstream changes the schema here.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::PortalError;
use crate::types::{ExamRecord, FailedCourseRecord, TranscriptRecord};

static ROW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<tr>(.*?)</tr>").expect("row regex"));
static CELL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<td>(.*?)</td>").expect("cell regex"));

const TABLE_CLOSE: &str = "</table>";

/// Where a record kind lives on the page and which cells feed its fields.
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub marker: &'static str,
    pub columns: &'static [usize],
}

impl TableSpec {
    fn required_cells(&self) -> usize {
        self.columns.iter().copied().max().map_or(0, |m| m + 1)
    }
}

/// A record kind with a fixed positional schema.
pub trait TableRecord: Sized {
    const TABLE: TableSpec;

    /// Builds a record from the selected cells, in `TABLE.columns` order.
    fn from_columns(values: Vec<String>) -> Self;
}

pub const TRANSCRIPT_TABLE: TableSpec = TableSpec {
    marker: r#"id="DataGrid1""#,
    columns: &[1, 3, 4, 6, 7, 8],
};

// The failed-course grid really is spelled with a lowercase "g".
pub const FAILED_COURSE_TABLE: TableSpec = TableSpec {
    marker: r#"id="Datagrid3""#,
    columns: &[1, 3],
};

pub const EXAM_TABLE: TableSpec = TableSpec {
    marker: r#"id="DataGrid1""#,
    columns: &[1, 3, 4, 6],
};

impl TableRecord for TranscriptRecord {
    const TABLE: TableSpec = TRANSCRIPT_TABLE;

    fn from_columns(values: Vec<String>) -> Self {
        let mut it = values.into_iter();
        TranscriptRecord {
            name: it.next().unwrap_or_default(),
            paper_score: it.next().unwrap_or_default(),
            mark: it.next().unwrap_or_default(),
            retake: it.next().unwrap_or_default(),
            rebuild: it.next().unwrap_or_default(),
            credit: it.next().unwrap_or_default(),
        }
    }
}

impl TableRecord for FailedCourseRecord {
    const TABLE: TableSpec = FAILED_COURSE_TABLE;

    fn from_columns(values: Vec<String>) -> Self {
        let mut it = values.into_iter();
        FailedCourseRecord {
            name: it.next().unwrap_or_default(),
            mark: it.next().unwrap_or_default(),
        }
    }
}

impl TableRecord for ExamRecord {
    const TABLE: TableSpec = EXAM_TABLE;

    fn from_columns(values: Vec<String>) -> Self {
        let mut it = values.into_iter();
        ExamRecord {
            name: it.next().unwrap_or_default(),
            time: it.next().unwrap_or_default(),
            location: it.next().unwrap_or_default(),
            seat_number: it.next().unwrap_or_default(),
        }
    }
}

/// Strips newlines, the alternating-row class and `&nbsp;` entities.
///
/// Alternating rows are rendered as `<tr class="alt">`; once the class is gone they match
/// the plain `<tr>` pattern like every other data row. Header rows keep their own class
/// and never match.
pub fn normalize(body: &str) -> String {
    body.replace('\n', "")
        .replace(" class=\"alt\"", "")
        .replace("&nbsp;", "")
}

/// The grid body between `marker` and the next `</table>`, or `None` when the page has no
/// such grid (the user simply has no rows for the period).
pub fn table_section<'a>(body: &'a str, marker: &str) -> Option<&'a str> {
    let start = body.find(marker)? + marker.len();
    let len = body[start..].find(TABLE_CLOSE)?;
    Some(&body[start..start + len])
}

/// Every data row of a grid as raw cell contents. Rows without `<td>` cells are skipped.
///
/// Cell content is the text between `<td>` and `</td>` verbatim; nested markup is kept.
pub fn rows(section: &str) -> Vec<Vec<String>> {
    ROW_RE
        .find_iter(section)
        .map(|row| {
            CELL_RE
                .captures_iter(row.as_str())
                .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect()
}

/// Extracts the configured cells of every data row in the grid described by `spec`.
///
/// `body` must already be [`normalize`]d. A missing grid yields an empty result.
pub fn extract_columns(body: &str, spec: TableSpec) -> Result<Vec<Vec<String>>, PortalError> {
    let Some(section) = table_section(body, spec.marker) else {
        return Ok(Vec::new());
    };
    let required = spec.required_cells();

    rows(section)
        .into_iter()
        .enumerate()
        .map(|(row, cells)| {
            if cells.len() < required {
                return Err(PortalError::Layout {
                    table: spec.marker,
                    row,
                    cells: cells.len(),
                    expected: required.saturating_sub(1),
                });
            }
            Ok(spec.columns.iter().map(|&c| cells[c].clone()).collect())
        })
        .collect()
}

/// Extracts every record of kind `T` from a normalized body.
pub fn extract<T: TableRecord>(body: &str) -> Result<Vec<T>, PortalError> {
    Ok(extract_columns(body, T::TABLE)?
        .into_iter()
        .map(T::from_columns)
        .collect())
}

/// Both transcript grids of a transcript page. Each grid is independent: a missing
/// transcript grid does not stop the failed-course grid from being read.
pub fn extract_transcript(raw_body: &str) -> Result<crate::types::Transcript, PortalError> {
    let body = normalize(raw_body);
    let current = extract::<TranscriptRecord>(&body)?;
    if current.is_empty() {
        tracing::info!("no transcript rows for the requested period");
    }
    let failed = extract::<FailedCourseRecord>(&body)?;
    if failed.is_empty() {
        tracing::debug!("no failed courses");
    }
    Ok(crate::types::Transcript { current, failed })
}

/// The exam grid of an exam schedule page.
pub fn extract_exams(raw_body: &str) -> Result<Vec<ExamRecord>, PortalError> {
    extract::<ExamRecord>(&normalize(raw_body))
}
