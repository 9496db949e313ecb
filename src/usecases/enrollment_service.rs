//! Enrollment management. Validates against existing rows, then relies on the storage index for races.

use crate::domain::access::require_admin;
use crate::domain::enrollment::validate_enrollment;
use crate::domain::{Account, DomainError, Enrollment, EnrollmentDraft, ValidationError};
use crate::ports::RosterPort;
use std::sync::Arc;
use tracing::{info, warn};

pub struct EnrollmentService {
    roster: Arc<dyn RosterPort>,
}

/// A concurrent insert that slipped past validation surfaces as the same user error.
fn duplicate_on_integrity(e: DomainError) -> DomainError {
    match e {
        DomainError::Integrity(msg) => {
            warn!(error = %msg, "active enrollment rejected by unique index");
            ValidationError::DuplicateActiveEnrollment.into()
        }
        other => other,
    }
}

impl EnrollmentService {
    pub fn new(roster: Arc<dyn RosterPort>) -> Self {
        Self { roster }
    }

    async fn check_refs(&self, draft: &EnrollmentDraft) -> Result<(), DomainError> {
        if self.roster.get_student(draft.student_id).await?.is_none() {
            return Err(DomainError::not_found("student", draft.student_id));
        }
        if self.roster.get_course(draft.course_id).await?.is_none() {
            return Err(DomainError::not_found("course", draft.course_id));
        }
        Ok(())
    }

    pub async fn enroll(
        &self,
        actor: &Account,
        draft: &EnrollmentDraft,
    ) -> Result<Enrollment, DomainError> {
        require_admin(actor)?;
        self.check_refs(draft).await?;
        let existing = self
            .roster
            .enrollments_for_pair(draft.student_id, draft.course_id)
            .await?;
        validate_enrollment(draft, None, &existing)?;
        let enrollment = self
            .roster
            .insert_enrollment(draft)
            .await
            .map_err(duplicate_on_integrity)?;
        info!(
            enrollment_id = enrollment.id,
            student_id = enrollment.student_id,
            course_id = enrollment.course_id,
            "student enrolled"
        );
        Ok(enrollment)
    }

    /// Edits an enrollment. The row itself is excluded from the conflict check.
    pub async fn update(
        &self,
        actor: &Account,
        id: i64,
        draft: &EnrollmentDraft,
    ) -> Result<Enrollment, DomainError> {
        require_admin(actor)?;
        if self.roster.get_enrollment(id).await?.is_none() {
            return Err(DomainError::not_found("enrollment", id));
        }
        self.check_refs(draft).await?;
        let existing = self
            .roster
            .enrollments_for_pair(draft.student_id, draft.course_id)
            .await?;
        validate_enrollment(draft, Some(id), &existing)?;
        self.roster
            .update_enrollment(id, draft)
            .await
            .map_err(duplicate_on_integrity)
    }

    pub async fn deactivate(&self, actor: &Account, id: i64) -> Result<Enrollment, DomainError> {
        require_admin(actor)?;
        let current = self
            .roster
            .get_enrollment(id)
            .await?
            .ok_or_else(|| DomainError::not_found("enrollment", id))?;
        let draft = EnrollmentDraft {
            student_id: current.student_id,
            course_id: current.course_id,
            start_date: current.start_date,
            end_date: current.end_date,
            is_active: false,
        };
        self.roster.update_enrollment(id, &draft).await
    }

    pub async fn enrollments_for_student(
        &self,
        student_id: i64,
    ) -> Result<Vec<Enrollment>, DomainError> {
        self.roster.enrollments_for_student(student_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Fixture, date};

    fn draft(student_id: i64, course_id: i64, active: bool) -> EnrollmentDraft {
        EnrollmentDraft {
            student_id,
            course_id,
            start_date: date(2024, 3, 1),
            end_date: None,
            is_active: active,
        }
    }

    #[tokio::test]
    async fn second_active_enrollment_is_rejected() {
        let fx = Fixture::new().await;
        let service = EnrollmentService::new(fx.repo.clone());
        let student = fx.student("Анна", "Петрова").await;
        let course = fx.course("Алгебра", None).await;

        let first = service
            .enroll(&fx.admin, &draft(student.id, course.id, true))
            .await
            .unwrap();
        let err = service
            .enroll(&fx.admin, &draft(student.id, course.id, true))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation(ValidationError::DuplicateActiveEnrollment)
        ));
        assert!(
            err.user_message()
                .contains("уже есть активная запись на выбранный курс")
        );

        // inactive history rows are allowed alongside the active one
        service
            .enroll(&fx.admin, &draft(student.id, course.id, false))
            .await
            .unwrap();

        // editing the active row itself is not a conflict
        let mut edit = draft(student.id, course.id, true);
        edit.end_date = Some(date(2024, 6, 1));
        let updated = service.update(&fx.admin, first.id, &edit).await.unwrap();
        assert_eq!(updated.end_date, Some(date(2024, 6, 1)));
    }

    #[tokio::test]
    async fn reactivating_history_row_conflicts_with_active_one() {
        let fx = Fixture::new().await;
        let service = EnrollmentService::new(fx.repo.clone());
        let student = fx.student("Анна", "Петрова").await;
        let course = fx.course("Алгебра", None).await;
        service
            .enroll(&fx.admin, &draft(student.id, course.id, true))
            .await
            .unwrap();
        let old = service
            .enroll(&fx.admin, &draft(student.id, course.id, false))
            .await
            .unwrap();

        let err = service
            .update(&fx.admin, old.id, &draft(student.id, course.id, true))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation(ValidationError::DuplicateActiveEnrollment)
        ));
    }

    #[tokio::test]
    async fn deactivate_frees_the_pair() {
        let fx = Fixture::new().await;
        let service = EnrollmentService::new(fx.repo.clone());
        let student = fx.student("Анна", "Петрова").await;
        let course = fx.course("Алгебра", None).await;
        let first = service
            .enroll(&fx.admin, &draft(student.id, course.id, true))
            .await
            .unwrap();
        let closed = service.deactivate(&fx.admin, first.id).await.unwrap();
        assert!(!closed.is_active);
        service
            .enroll(&fx.admin, &draft(student.id, course.id, true))
            .await
            .unwrap();
        assert_eq!(
            service
                .enrollments_for_student(student.id)
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn only_admin_enrolls_and_refs_must_exist() {
        let fx = Fixture::new().await;
        let service = EnrollmentService::new(fx.repo.clone());
        let course = fx.course("Алгебра", None).await;
        let err = service
            .enroll(&fx.teacher, &draft(1, course.id, true))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
        let err = service
            .enroll(&fx.admin, &draft(404, course.id, true))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::NotFound {
                entity: "student",
                ..
            }
        ));
    }
}
