//! Input gate for report submission. Runs before any I/O.

use std::str::FromStr;

use chrono::NaiveDate;
use thiserror::Error;

use super::enums::Disease;
use super::report::{BulkReport, ReportForm};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Case count must be at least 1, got {0}")]
    InvalidCaseCount(i64),

    #[error("Unknown disease: {0}")]
    UnknownDisease(String),

    #[error("Report date {date} is after today ({today})")]
    FutureDate { date: NaiveDate, today: NaiveDate },

    #[error("Hospital identifier is required")]
    MissingHospital,

    #[error("Location identifier is required")]
    MissingLocation,
}

impl ReportForm {
    /// Check the form against `today` and produce a typed report.
    pub fn validate(&self, today: NaiveDate) -> Result<BulkReport, ValidationError> {
        let hospital_id = self.hospital_id.trim();
        if hospital_id.is_empty() {
            return Err(ValidationError::MissingHospital);
        }
        let location_id = self.location_id.trim();
        if location_id.is_empty() {
            return Err(ValidationError::MissingLocation);
        }

        let case_count = u32::try_from(self.case_count)
            .ok()
            .filter(|n| *n >= 1)
            .ok_or(ValidationError::InvalidCaseCount(self.case_count))?;

        let disease = Disease::from_str(self.disease.trim())
            .map_err(|_| ValidationError::UnknownDisease(self.disease.clone()))?;

        if self.report_date > today {
            return Err(ValidationError::FutureDate {
                date: self.report_date,
                today,
            });
        }

        Ok(BulkReport {
            hospital_id: hospital_id.to_string(),
            location_id: location_id.to_string(),
            disease,
            case_count,
            report_date: self.report_date,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    }

    fn form() -> ReportForm {
        ReportForm {
            hospital_id: "H1".into(),
            location_id: "sikkim-gangtok-gangtok".into(),
            disease: "Cholera".into(),
            case_count: 5,
            report_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        }
    }

    #[test]
    fn valid_form_passes() {
        let report = form().validate(today()).unwrap();
        assert_eq!(report.disease, Disease::Cholera);
        assert_eq!(report.case_count, 5);
    }

    #[test]
    fn report_dated_today_is_allowed() {
        let mut f = form();
        f.report_date = today();
        assert!(f.validate(today()).is_ok());
    }

    #[test]
    fn zero_and_negative_counts_rejected() {
        for count in [0, -1, -50] {
            let mut f = form();
            f.case_count = count;
            assert_eq!(
                f.validate(today()).unwrap_err(),
                ValidationError::InvalidCaseCount(count)
            );
        }
    }

    #[test]
    fn count_beyond_u32_rejected() {
        let mut f = form();
        f.case_count = i64::from(u32::MAX) + 1;
        assert!(matches!(
            f.validate(today()),
            Err(ValidationError::InvalidCaseCount(_))
        ));
    }

    #[test]
    fn unknown_disease_rejected() {
        let mut f = form();
        f.disease = "Malaria".into();
        assert_eq!(
            f.validate(today()).unwrap_err(),
            ValidationError::UnknownDisease("Malaria".into())
        );
    }

    #[test]
    fn tomorrow_rejected() {
        let mut f = form();
        f.report_date = today().succ_opt().unwrap();
        assert!(matches!(
            f.validate(today()),
            Err(ValidationError::FutureDate { .. })
        ));
    }

    #[test]
    fn blank_identifiers_rejected() {
        let mut f = form();
        f.hospital_id = "  ".into();
        assert_eq!(f.validate(today()).unwrap_err(), ValidationError::MissingHospital);

        let mut f = form();
        f.location_id = String::new();
        assert_eq!(f.validate(today()).unwrap_err(), ValidationError::MissingLocation);
    }
}
