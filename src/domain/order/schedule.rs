use chrono::NaiveDate;
use serde::Serialize;

use super::errors::ScheduleError;

// ============================================================================
// Service Days - Date Range Expansion
// ============================================================================

const ISO_FORMAT: &str = "%Y-%m-%d";
const DISPLAY_FORMAT: &str = "%d/%m/%Y";

/// Inclusive range of service days. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ScheduleError> {
        if end < start {
            return Err(ScheduleError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of service days covered
    pub fn day_count(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }
}

/// Every calendar day from `start` to `end` inclusive, ascending.
///
/// Fails with [`ScheduleError::InvalidRange`] when `end < start`.
pub fn expand(start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>, ScheduleError> {
    Ok(DateRange::new(start, end)?.days().collect())
}

pub fn parse_iso(raw: &str) -> Result<NaiveDate, ScheduleError> {
    NaiveDate::parse_from_str(raw.trim(), ISO_FORMAT)
        .map_err(|_| ScheduleError::InvalidDate(raw.to_string()))
}

pub fn format_iso(date: NaiveDate) -> String {
    date.format(ISO_FORMAT).to_string()
}

/// `dd/mm/yyyy` for display; "N/A" when empty, "Fecha inválida" when unparseable
pub fn format_display(raw: &str) -> String {
    if raw.trim().is_empty() {
        return "N/A".to_string();
    }
    match parse_iso(raw) {
        Ok(date) => date.format(DISPLAY_FORMAT).to_string(),
        Err(_) => "Fecha inválida".to_string(),
    }
}
