//! Record types produced by the portal scrapers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Year sentinel meaning "every year on record".
pub const ALL_YEARS: &str = "all";

/// Reporting window for a transcript query.
///
/// `year` is a school year such as `"2020-2021"` or [`ALL_YEARS`]; `semester` 0 means the
/// whole year.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AcademicPeriod {
    pub year: String,
    pub semester: i32,
}

/// How the upstream form is asked to scope the query. Each mode maps to one fixed
/// button caption on the postback form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Everything on record ("all" years).
    AllRecords,
    /// One whole school year (`semester == 0`).
    WholeYear,
    /// A single semester.
    Semester,
}

impl QueryMode {
    pub fn button_caption(self) -> &'static str {
        match self {
            QueryMode::AllRecords => "在校学习成绩查询",
            QueryMode::WholeYear => "按学年查询",
            QueryMode::Semester => "按学期查询",
        }
    }
}

impl AcademicPeriod {
    pub fn new(year: impl Into<String>, semester: i32) -> Self {
        Self {
            year: year.into(),
            semester,
        }
    }

    /// The whole record history.
    pub fn all() -> Self {
        Self::new(ALL_YEARS, 0)
    }

    pub fn is_all(&self) -> bool {
        self.year == ALL_YEARS
    }

    pub fn query_mode(&self) -> QueryMode {
        if self.is_all() {
            QueryMode::AllRecords
        } else if self.semester == 0 {
            QueryMode::WholeYear
        } else {
            QueryMode::Semester
        }
    }
}

impl fmt::Display for AcademicPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.year, self.semester)
    }
}

/// One completed course on a transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub name: String,
    pub paper_score: String,
    pub mark: String,
    pub retake: String,
    pub rebuild: String,
    pub credit: String,
}

/// A course the student has failed, served by the portal as its own table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedCourseRecord {
    pub name: String,
    pub mark: String,
}

/// One scheduled exam.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamRecord {
    pub name: String,
    pub time: String,
    pub location: String,
    #[serde(rename = "set_num")]
    pub seat_number: String,
}

/// Both tables of a transcript page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub current: Vec<TranscriptRecord>,
    pub failed: Vec<FailedCourseRecord>,
}

/// Output of one scrape. `source_name` is the name the upstream systems hold for the
/// user and is compared against the caller's display name downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeResult<T> {
    pub records: T,
    pub source_name: String,
}
