//! Lesson generation from weekly schedules.

use crate::domain::access::{can_manage_course, require};
use crate::domain::schedule::{expand_dates, parse_weekday_codes};
use crate::domain::{Account, Course, DomainError, Weekday};
use crate::ports::{Clock, LessonPort, RosterPort};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::info;

pub struct ScheduleService {
    roster: Arc<dyn RosterPort>,
    lessons: Arc<dyn LessonPort>,
    clock: Arc<dyn Clock>,
    default_weeks: u32,
}

impl ScheduleService {
    pub fn new(
        roster: Arc<dyn RosterPort>,
        lessons: Arc<dyn LessonPort>,
        clock: Arc<dyn Clock>,
        default_weeks: u32,
    ) -> Self {
        Self {
            roster,
            lessons,
            clock,
            default_weeks,
        }
    }

    async fn managed_course(&self, actor: &Account, course_id: i64) -> Result<Course, DomainError> {
        let course = self
            .roster
            .get_course(course_id)
            .await?
            .ok_or_else(|| DomainError::not_found("course", course_id))?;
        require(can_manage_course(actor, &course))?;
        Ok(course)
    }

    async fn insert(
        &self,
        course_id: i64,
        weekdays: &[Weekday],
        start: Option<NaiveDate>,
        weeks: Option<u32>,
    ) -> Result<usize, DomainError> {
        if weekdays.is_empty() {
            return Ok(0);
        }
        let start = start.unwrap_or_else(|| self.clock.today());
        let weeks = weeks.unwrap_or(self.default_weeks);
        let dates = expand_dates(weekdays, start, weeks);
        let created = self.lessons.insert_missing_lessons(course_id, &dates).await?;
        info!(course_id, %start, weeks, created, "lessons generated");
        Ok(created)
    }

    /// Creates missing lessons for `codes` ("mon", "wed", ...) from `start` (default today)
    /// over `weeks` (default from config). Unknown codes are ignored. Returns the number created.
    pub async fn generate_lessons(
        &self,
        actor: &Account,
        course_id: i64,
        codes: &[&str],
        start: Option<NaiveDate>,
        weeks: Option<u32>,
    ) -> Result<usize, DomainError> {
        self.managed_course(actor, course_id).await?;
        let weekdays = parse_weekday_codes(codes.iter().copied());
        self.insert(course_id, &weekdays, start, weeks).await
    }

    /// Same as [`Self::generate_lessons`] using the course's stored schedule.
    pub async fn generate_from_course_schedule(
        &self,
        actor: &Account,
        course_id: i64,
        start: Option<NaiveDate>,
        weeks: Option<u32>,
    ) -> Result<usize, DomainError> {
        let course = self.managed_course(actor, course_id).await?;
        self.insert(course_id, &course.schedule, start, weeks).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewCourse;
    use crate::test_support::{Fixture, date};

    fn service(fx: &Fixture) -> ScheduleService {
        ScheduleService::new(fx.repo.clone(), fx.repo.clone(), fx.clock.clone(), 4)
    }

    #[tokio::test]
    async fn generation_is_idempotent() {
        let fx = Fixture::new().await;
        let course = fx.course("Алгебра", Some(fx.teacher.id)).await;
        let service = service(&fx);

        let created = service
            .generate_lessons(&fx.teacher, course.id, &["mon", "wed"], Some(date(2024, 1, 1)), Some(1))
            .await
            .unwrap();
        assert_eq!(created, 3);
        let again = service
            .generate_lessons(&fx.teacher, course.id, &["mon", "wed"], Some(date(2024, 1, 1)), Some(1))
            .await
            .unwrap();
        assert_eq!(again, 0);

        let dates: Vec<_> = fx
            .repo
            .lessons_for_course(course.id)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.date)
            .collect();
        assert_eq!(
            dates,
            vec![date(2024, 1, 8), date(2024, 1, 3), date(2024, 1, 1)]
        );
    }

    #[tokio::test]
    async fn invalid_codes_create_nothing() {
        let fx = Fixture::new().await;
        let course = fx.course("Алгебра", None).await;
        let created = service(&fx)
            .generate_lessons(&fx.admin, course.id, &["xyz", ""], None, None)
            .await
            .unwrap();
        assert_eq!(created, 0);
        let created = service(&fx)
            .generate_lessons(&fx.admin, course.id, &[], None, None)
            .await
            .unwrap();
        assert_eq!(created, 0);
    }

    #[tokio::test]
    async fn defaults_use_today_and_configured_weeks() {
        let fx = Fixture::new().await;
        let course = fx
            .repo
            .create_course(
                &NewCourse {
                    title: "Геометрия".into(),
                    ..Default::default()
                },
                &[Weekday::Fri],
            )
            .await
            .unwrap();
        // 2024-03-15 is a Friday: 15, 22, 29, Apr 5, Apr 12
        let created = service(&fx)
            .generate_from_course_schedule(&fx.admin, course.id, None, None)
            .await
            .unwrap();
        assert_eq!(created, 5);
    }

    #[tokio::test]
    async fn foreign_teacher_is_forbidden() {
        let fx = Fixture::new().await;
        let course = fx.course("Алгебра", None).await;
        let err = service(&fx)
            .generate_lessons(&fx.teacher, course.id, &["mon"], None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
    }
}
