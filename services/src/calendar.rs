//! Term calendar: which school year and semester is current, and how far into it we are.

use chrono::NaiveDate;
use portal::AcademicPeriod;
use serde::Serialize;
use util::config::AppConfig;

use crate::error::{ServiceError, ServiceResult};

const TERM_START_FORMAT: &str = "%Y-%m-%d";
const DISPLAY_FORMAT: &str = "%Y/%m/%d";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermConfig {
    pub school_year: String,
    pub semester: i32,
    pub term_start: NaiveDate,
}

impl TermConfig {
    pub fn from_app(config: &AppConfig) -> ServiceResult<Self> {
        let term_start = NaiveDate::parse_from_str(config.term_start.trim(), TERM_START_FORMAT)
            .map_err(|e| {
                ServiceError::Validation(format!("invalid TERM_START {:?}: {e}", config.term_start))
            })?;
        Ok(Self {
            school_year: config.school_year.clone(),
            semester: config.semester,
            term_start,
        })
    }

    /// The period queried when a caller names none.
    pub fn current_period(&self) -> AcademicPeriod {
        AcademicPeriod::new(self.school_year.clone(), self.semester)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermInfo {
    /// Whole days since the term started; negative before it starts.
    pub day_count: i64,
    pub date: String,
    pub semester: i32,
    pub school_year: String,
}

impl TermInfo {
    pub fn at(config: &TermConfig, today: NaiveDate) -> Self {
        Self {
            day_count: (today - config.term_start).num_days(),
            date: config.term_start.format(DISPLAY_FORMAT).to_string(),
            semester: config.semester,
            school_year: config.school_year.clone(),
        }
    }
}
