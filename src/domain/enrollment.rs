//! Enrollment validation: one active enrollment per (student, course).

use crate::domain::{Enrollment, EnrollmentDraft, ValidationError};

/// Checks `draft` against the existing rows for the same pair.
///
/// `editing` is the id of the row being updated; it is excluded from the conflict check.
pub fn validate_enrollment(
    draft: &EnrollmentDraft,
    editing: Option<i64>,
    existing: &[Enrollment],
) -> Result<(), ValidationError> {
    if let Some(end) = draft.end_date {
        if end < draft.start_date {
            return Err(ValidationError::EndBeforeStart);
        }
    }
    if !draft.is_active {
        return Ok(());
    }
    let conflict = existing.iter().any(|e| {
        e.student_id == draft.student_id
            && e.course_id == draft.course_id
            && e.is_active
            && Some(e.id) != editing
    });
    if conflict {
        return Err(ValidationError::DuplicateActiveEnrollment);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn row(id: i64, active: bool) -> Enrollment {
        Enrollment {
            id,
            student_id: 1,
            course_id: 2,
            start_date: d(1, 1),
            end_date: None,
            is_active: active,
        }
    }

    fn draft(active: bool) -> EnrollmentDraft {
        EnrollmentDraft {
            student_id: 1,
            course_id: 2,
            start_date: d(3, 1),
            end_date: None,
            is_active: active,
        }
    }

    #[test]
    fn second_active_enrollment_is_rejected() {
        assert_eq!(
            validate_enrollment(&draft(true), None, &[row(10, true)]),
            Err(ValidationError::DuplicateActiveEnrollment)
        );
    }

    #[test]
    fn inactive_rows_do_not_conflict() {
        assert!(validate_enrollment(&draft(true), None, &[row(10, false)]).is_ok());
        assert!(validate_enrollment(&draft(false), None, &[row(10, true)]).is_ok());
    }

    #[test]
    fn edited_row_does_not_conflict_with_itself() {
        assert!(validate_enrollment(&draft(true), Some(10), &[row(10, true)]).is_ok());
        assert_eq!(
            validate_enrollment(&draft(true), Some(10), &[row(10, true), row(11, true)]),
            Err(ValidationError::DuplicateActiveEnrollment)
        );
    }

    #[test]
    fn other_pairs_are_ignored() {
        let mut other = row(10, true);
        other.course_id = 99;
        assert!(validate_enrollment(&draft(true), None, &[other]).is_ok());
    }

    #[test]
    fn end_before_start_is_rejected() {
        let mut bad = draft(true);
        bad.end_date = Some(d(2, 1));
        assert_eq!(
            validate_enrollment(&bad, None, &[]),
            Err(ValidationError::EndBeforeStart)
        );
    }
}
