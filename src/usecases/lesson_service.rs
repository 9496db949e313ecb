//! Lessons and the per-lesson sheet (attendance + exercise results) for teachers.
//!
//! The sheet lists students whose active enrollment covers the lesson date. Opening it creates
//! any missing attendance and result rows; saving writes all edits in one transaction.

use crate::domain::access::{can_manage_course, require};
use crate::domain::{
    Account, Attendance, AttendanceStatus, Course, DomainError, Exercise, ExerciseProgress,
    ExerciseResult, ExerciseStatus, Lesson, NewExercise, NewLesson, Student, ValidationError,
};
use crate::ports::{LessonPort, RosterPort};
use crate::usecases::BillingService;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// One student's row on the sheet.
#[derive(Debug, Clone)]
pub struct SheetRow {
    pub student: Student,
    pub attendance: Attendance,
    /// In exercise order.
    pub results: Vec<ExerciseResult>,
    pub progress: ExerciseProgress,
}

#[derive(Debug, Clone)]
pub struct LessonSheet {
    pub lesson: Lesson,
    pub course: Course,
    pub exercises: Vec<Exercise>,
    /// Ordered by student name.
    pub rows: Vec<SheetRow>,
}

/// Raw statuses come straight from the form; unrecognized values keep the stored status.
#[derive(Debug, Clone, Default)]
pub struct AttendanceUpdate {
    pub student_id: i64,
    pub status: String,
    /// `None` keeps the stored comment.
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ResultUpdate {
    pub exercise_id: i64,
    pub student_id: i64,
    pub status: String,
    pub comment: Option<String>,
}

/// Edits for one lesson sheet. Rows not mentioned are left as they are.
#[derive(Debug, Clone, Default)]
pub struct LessonSheetUpdate {
    pub attendance: Vec<AttendanceUpdate>,
    pub results: Vec<ResultUpdate>,
}

pub struct LessonService {
    roster: Arc<dyn RosterPort>,
    lessons: Arc<dyn LessonPort>,
    billing: Arc<BillingService>,
}

impl LessonService {
    pub fn new(
        roster: Arc<dyn RosterPort>,
        lessons: Arc<dyn LessonPort>,
        billing: Arc<BillingService>,
    ) -> Self {
        Self {
            roster,
            lessons,
            billing,
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

    async fn managed_lesson(
        &self,
        actor: &Account,
        lesson_id: i64,
    ) -> Result<(Lesson, Course), DomainError> {
        let lesson = self
            .lessons
            .get_lesson(lesson_id)
            .await?
            .ok_or_else(|| DomainError::not_found("lesson", lesson_id))?;
        let course = self.managed_course(actor, lesson.course_id).await?;
        Ok((lesson, course))
    }

    pub async fn create_lesson(
        &self,
        actor: &Account,
        lesson: &NewLesson,
    ) -> Result<Lesson, DomainError> {
        self.managed_course(actor, lesson.course_id).await?;
        let created = self.lessons.create_lesson(lesson).await.map_err(|e| match e {
            DomainError::Integrity(_) => ValidationError::LessonAlreadyExists(lesson.date).into(),
            other => other,
        })?;
        info!(lesson_id = created.id, course_id = created.course_id, date = %created.date, "lesson created");
        Ok(created)
    }

    pub async fn lessons_for_course(
        &self,
        actor: &Account,
        course_id: i64,
    ) -> Result<Vec<Lesson>, DomainError> {
        self.managed_course(actor, course_id).await?;
        self.lessons.lessons_for_course(course_id).await
    }

    /// Appends when `exercise.order` is 0.
    pub async fn add_exercise(
        &self,
        actor: &Account,
        lesson_id: i64,
        exercise: &NewExercise,
    ) -> Result<Exercise, DomainError> {
        if exercise.title.trim().is_empty() {
            return Err(ValidationError::EmptyField("title").into());
        }
        self.managed_lesson(actor, lesson_id).await?;
        self.lessons.add_exercise(lesson_id, exercise).await
    }

    /// Loads the sheet, creating missing attendance (present) and result (pending) rows.
    pub async fn open_sheet(
        &self,
        actor: &Account,
        lesson_id: i64,
    ) -> Result<LessonSheet, DomainError> {
        let (lesson, course) = self.managed_lesson(actor, lesson_id).await?;

        let mut student_ids: Vec<i64> = self
            .roster
            .enrollments_for_course(course.id)
            .await?
            .into_iter()
            .filter(|e| e.covers(lesson.date))
            .map(|e| e.student_id)
            .collect();
        student_ids.sort_unstable();
        student_ids.dedup();

        let mut students = Vec::with_capacity(student_ids.len());
        for id in &student_ids {
            if let Some(student) = self.roster.get_student(*id).await? {
                students.push(student);
            }
        }
        students.sort_by(|a, b| {
            (&a.last_name, &a.first_name, a.id).cmp(&(&b.last_name, &b.first_name, b.id))
        });

        let attendances = self.lessons.ensure_attendance(lesson.id, &student_ids).await?;
        let results = self.lessons.ensure_results(lesson.id, &student_ids).await?;
        let exercises = self.lessons.exercises_for_lesson(lesson.id).await?;
        // New present rows may be billable already.
        self.billing.invalidate(&student_ids).await;

        let mut attendance_by_student: HashMap<i64, Attendance> = attendances
            .into_iter()
            .map(|a| (a.student_id, a))
            .collect();
        let exercise_pos: HashMap<i64, usize> = exercises
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id, i))
            .collect();
        let mut results_by_student: HashMap<i64, Vec<ExerciseResult>> = HashMap::new();
        for r in results {
            results_by_student.entry(r.student_id).or_default().push(r);
        }

        let mut rows = Vec::with_capacity(students.len());
        for student in students {
            let Some(attendance) = attendance_by_student.remove(&student.id) else {
                continue;
            };
            let mut results = results_by_student.remove(&student.id).unwrap_or_default();
            results.sort_by_key(|r| exercise_pos.get(&r.exercise_id).copied());
            let progress = ExerciseProgress::from_results(&results);
            rows.push(SheetRow {
                student,
                attendance,
                results,
                progress,
            });
        }
        debug!(lesson_id, students = rows.len(), exercises = exercises.len(), "lesson sheet opened");

        Ok(LessonSheet {
            lesson,
            course,
            exercises,
            rows,
        })
    }

    /// Applies the edits atomically and returns the refreshed sheet.
    pub async fn save_sheet(
        &self,
        actor: &Account,
        lesson_id: i64,
        update: &LessonSheetUpdate,
    ) -> Result<LessonSheet, DomainError> {
        let sheet = self.open_sheet(actor, lesson_id).await?;

        let attendance_edits: HashMap<i64, &AttendanceUpdate> = update
            .attendance
            .iter()
            .map(|u| (u.student_id, u))
            .collect();
        let result_edits: HashMap<(i64, i64), &ResultUpdate> = update
            .results
            .iter()
            .map(|u| ((u.exercise_id, u.student_id), u))
            .collect();

        let mut attendances = Vec::new();
        let mut results = Vec::new();
        for row in &sheet.rows {
            if let Some(edit) = attendance_edits.get(&row.student.id) {
                let mut a = row.attendance.clone();
                a.status = AttendanceStatus::parse(edit.status.trim()).unwrap_or(a.status);
                if let Some(comment) = &edit.comment {
                    a.comment = comment.clone();
                }
                attendances.push(a);
            }
            for r in &row.results {
                if let Some(edit) = result_edits.get(&(r.exercise_id, r.student_id)) {
                    let mut r = r.clone();
                    r.status = ExerciseStatus::parse(edit.status.trim()).unwrap_or(r.status);
                    if let Some(comment) = &edit.comment {
                        r.comment = comment.clone();
                    }
                    results.push(r);
                }
            }
        }

        self.lessons.save_lesson_sheet(&attendances, &results).await?;
        let touched: Vec<i64> = attendances.iter().map(|a| a.student_id).collect();
        self.billing.invalidate(&touched).await;
        info!(
            actor = actor.id,
            lesson_id,
            attendances = attendances.len(),
            results = results.len(),
            "lesson sheet updated"
        );

        self.open_sheet(actor, lesson_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EnrollmentDraft, Role};
    use crate::ports::AccountPort;
    use crate::test_support::{Fixture, date};

    struct Setup {
        fx: Fixture,
        service: LessonService,
        course: Course,
        lesson: Lesson,
        anna: Student,
        boris: Student,
    }

    async fn setup() -> Setup {
        let fx = Fixture::new().await;
        let service = LessonService::new(fx.repo.clone(), fx.repo.clone(), fx.billing.clone());
        let course = fx.course("Алгебра", Some(fx.teacher.id)).await;
        let anna = fx.student("Анна", "Петрова").await;
        let boris = fx.student("Борис", "Андреев").await;
        fx.enroll(anna.id, course.id, date(2024, 3, 1)).await;
        fx.enroll(boris.id, course.id, date(2024, 3, 1)).await;
        let lesson = service
            .create_lesson(
                &fx.teacher,
                &NewLesson {
                    course_id: course.id,
                    date: date(2024, 3, 11),
                    topic: "Уравнения".into(),
                },
            )
            .await
            .unwrap();
        Setup {
            fx,
            service,
            course,
            lesson,
            anna,
            boris,
        }
    }

    #[tokio::test]
    async fn open_sheet_lists_covered_students_with_defaults() {
        let s = setup().await;
        // enrollment that starts after the lesson is not on the sheet
        let late = s.fx.student("Вера", "Белова").await;
        s.fx.enroll(late.id, s.course.id, date(2024, 3, 12)).await;
        // inactive enrollment is not on the sheet either
        let gone = s.fx.student("Глеб", "Гусев").await;
        s.fx.repo
            .insert_enrollment(&EnrollmentDraft {
                student_id: gone.id,
                course_id: s.course.id,
                start_date: date(2024, 1, 1),
                end_date: None,
                is_active: false,
            })
            .await
            .unwrap();
        s.service
            .add_exercise(
                &s.fx.teacher,
                s.lesson.id,
                &NewExercise {
                    title: "№ 1".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let sheet = s.service.open_sheet(&s.fx.teacher, s.lesson.id).await.unwrap();
        let names: Vec<_> = sheet.rows.iter().map(|r| r.student.id).collect();
        assert_eq!(names, vec![s.boris.id, s.anna.id]);
        assert!(sheet.rows.iter().all(|r| r.attendance.status == AttendanceStatus::Present));
        assert_eq!(sheet.rows[0].results.len(), 1);
        assert_eq!(sheet.rows[0].progress.pending, 1);
    }

    #[tokio::test]
    async fn save_sheet_updates_rows_and_balance() {
        let s = setup().await;
        let exercise = s
            .service
            .add_exercise(
                &s.fx.teacher,
                s.lesson.id,
                &NewExercise {
                    title: "№ 1".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        s.service.open_sheet(&s.fx.teacher, s.lesson.id).await.unwrap();
        assert_eq!(s.fx.billing.balance(s.anna.id).await.unwrap().billable, 1);

        let update = LessonSheetUpdate {
            attendance: vec![
                AttendanceUpdate {
                    student_id: s.anna.id,
                    status: "excused".into(),
                    comment: Some("Справка".into()),
                },
                AttendanceUpdate {
                    student_id: s.boris.id,
                    status: "late".into(),
                    comment: None,
                },
            ],
            results: vec![ResultUpdate {
                exercise_id: exercise.id,
                student_id: s.boris.id,
                status: "solved".into(),
                comment: Some("Молодец".into()),
            }],
        };
        let sheet = s
            .service
            .save_sheet(&s.fx.teacher, s.lesson.id, &update)
            .await
            .unwrap();

        let anna = sheet.rows.iter().find(|r| r.student.id == s.anna.id).unwrap();
        let boris = sheet.rows.iter().find(|r| r.student.id == s.boris.id).unwrap();
        assert_eq!(anna.attendance.status, AttendanceStatus::Excused);
        assert_eq!(anna.attendance.comment, "Справка");
        assert_eq!(boris.attendance.status, AttendanceStatus::Present);
        assert_eq!(boris.results[0].status, ExerciseStatus::Solved);
        assert_eq!(boris.progress.solved, 1);

        assert_eq!(s.fx.billing.balance(s.anna.id).await.unwrap().billable, 0);
    }

    #[tokio::test]
    async fn foreign_teacher_cannot_open_sheet() {
        let s = setup().await;
        let other = s
            .fx
            .repo
            .create_account("+70000000009", "Другой учитель", &[Role::Teacher])
            .await
            .unwrap();
        let err = s.service.open_sheet(&other, s.lesson.id).await.unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
        let err = s.service.open_sheet(&s.fx.parent, s.lesson.id).await.unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
        // admins manage every course
        s.service.open_sheet(&s.fx.admin, s.lesson.id).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_lesson_date_is_validation_error() {
        let s = setup().await;
        let err = s
            .service
            .create_lesson(
                &s.fx.teacher,
                &NewLesson {
                    course_id: s.course.id,
                    date: date(2024, 3, 11),
                    topic: String::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation(ValidationError::LessonAlreadyExists(_))
        ));
    }
}
