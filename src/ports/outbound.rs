//! Outbound ports. Application calls into infrastructure.
//!
//! Implemented by adapters.

use crate::domain::{
    Account, Attendance, AttendanceRecord, BalanceInputs, CodePurpose, Course, DomainError,
    Enrollment, EnrollmentDraft, Exercise, ExerciseResult, Lesson, NewCourse, NewExercise,
    NewLesson, NewStudent, NewSubscription, PhoneCode, Role, Student, Subscription, Weekday,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;

/// Students, guardian links, courses and enrollments.
#[async_trait::async_trait]
pub trait RosterPort: Send + Sync {
    async fn create_student(&self, student: &NewStudent) -> Result<Student, DomainError>;

    async fn get_student(&self, id: i64) -> Result<Option<Student>, DomainError>;

    /// Ordered by last name, then first name.
    async fn list_students(&self) -> Result<Vec<Student>, DomainError>;

    /// Returns false when the link already existed.
    async fn link_guardian(&self, student_id: i64, guardian_id: i64) -> Result<bool, DomainError>;

    async fn guardian_ids(&self, student_id: i64) -> Result<Vec<i64>, DomainError>;

    async fn students_of_guardian(&self, guardian_id: i64) -> Result<Vec<Student>, DomainError>;

    /// `schedule` is already validated; the raw string in `course` is ignored.
    async fn create_course(
        &self,
        course: &NewCourse,
        schedule: &[Weekday],
    ) -> Result<Course, DomainError>;

    async fn get_course(&self, id: i64) -> Result<Option<Course>, DomainError>;

    async fn list_courses(&self) -> Result<Vec<Course>, DomainError>;

    async fn courses_of_teacher(&self, teacher_id: i64) -> Result<Vec<Course>, DomainError>;

    /// Cascades to lessons, enrollments, subscriptions and everything below them.
    async fn delete_course(&self, id: i64) -> Result<bool, DomainError>;

    async fn get_enrollment(&self, id: i64) -> Result<Option<Enrollment>, DomainError>;

    async fn enrollments_for_pair(
        &self,
        student_id: i64,
        course_id: i64,
    ) -> Result<Vec<Enrollment>, DomainError>;

    async fn enrollments_for_course(&self, course_id: i64) -> Result<Vec<Enrollment>, DomainError>;

    async fn enrollments_for_student(
        &self,
        student_id: i64,
    ) -> Result<Vec<Enrollment>, DomainError>;

    /// Fails with `DomainError::Integrity` when a second active row would exist for the pair.
    async fn insert_enrollment(&self, draft: &EnrollmentDraft) -> Result<Enrollment, DomainError>;

    async fn update_enrollment(
        &self,
        id: i64,
        draft: &EnrollmentDraft,
    ) -> Result<Enrollment, DomainError>;
}

/// Lessons, attendance, exercises and exercise results.
#[async_trait::async_trait]
pub trait LessonPort: Send + Sync {
    /// Fails with `DomainError::Integrity` when the course already has a lesson on that date.
    async fn create_lesson(&self, lesson: &NewLesson) -> Result<Lesson, DomainError>;

    /// Inserts a lesson for each date the course lacks. Returns how many were inserted.
    async fn insert_missing_lessons(
        &self,
        course_id: i64,
        dates: &[NaiveDate],
    ) -> Result<usize, DomainError>;

    async fn get_lesson(&self, id: i64) -> Result<Option<Lesson>, DomainError>;

    /// Newest first.
    async fn lessons_for_course(&self, course_id: i64) -> Result<Vec<Lesson>, DomainError>;

    /// Creates missing rows (status present) and returns the lesson's rows for these students.
    async fn ensure_attendance(
        &self,
        lesson_id: i64,
        student_ids: &[i64],
    ) -> Result<Vec<Attendance>, DomainError>;

    /// Newest lesson first.
    async fn attendance_records_for_student(
        &self,
        student_id: i64,
    ) -> Result<Vec<AttendanceRecord>, DomainError>;

    /// `exercise.order == 0` appends after the lesson's current maximum.
    async fn add_exercise(
        &self,
        lesson_id: i64,
        exercise: &NewExercise,
    ) -> Result<Exercise, DomainError>;

    /// Ordered by position, then creation.
    async fn exercises_for_lesson(&self, lesson_id: i64) -> Result<Vec<Exercise>, DomainError>;

    /// Creates missing rows (status pending) for every exercise x student and returns them.
    async fn ensure_results(
        &self,
        lesson_id: i64,
        student_ids: &[i64],
    ) -> Result<Vec<ExerciseResult>, DomainError>;

    async fn results_for_student(&self, student_id: i64)
    -> Result<Vec<ExerciseResult>, DomainError>;

    /// Writes every row or none.
    async fn save_lesson_sheet(
        &self,
        attendances: &[Attendance],
        results: &[ExerciseResult],
    ) -> Result<(), DomainError>;
}

/// Subscriptions and the aggregates behind lesson balances.
#[async_trait::async_trait]
pub trait BillingPort: Send + Sync {
    async fn create_subscription(
        &self,
        subscription: &NewSubscription,
    ) -> Result<Subscription, DomainError>;

    /// Newest purchase first.
    async fn subscriptions_for_student(
        &self,
        student_id: i64,
    ) -> Result<Vec<Subscription>, DomainError>;

    async fn recent_subscriptions(&self, limit: u32) -> Result<Vec<Subscription>, DomainError>;

    /// Aggregates for one student.
    async fn balance_inputs(
        &self,
        student_id: i64,
        today: NaiveDate,
    ) -> Result<BalanceInputs, DomainError>;

    /// Aggregates for every student in a single query.
    async fn all_balance_inputs(
        &self,
        today: NaiveDate,
    ) -> Result<HashMap<i64, BalanceInputs>, DomainError>;
}

/// Accounts, roles and stored verification codes.
#[async_trait::async_trait]
pub trait AccountPort: Send + Sync {
    async fn create_account(
        &self,
        phone: &str,
        display_name: &str,
        roles: &[Role],
    ) -> Result<Account, DomainError>;

    async fn get_account(&self, id: i64) -> Result<Option<Account>, DomainError>;

    async fn find_account_by_phone(&self, phone: &str) -> Result<Option<Account>, DomainError>;

    async fn grant_role(&self, account_id: i64, role: Role) -> Result<(), DomainError>;

    async fn accounts_with_role(&self, role: Role) -> Result<Vec<Account>, DomainError>;

    async fn store_phone_code(
        &self,
        phone: &str,
        purpose: CodePurpose,
        code: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<PhoneCode, DomainError>;

    /// Most recent unconsumed code for the phone and purpose.
    async fn latest_phone_code(
        &self,
        phone: &str,
        purpose: CodePurpose,
    ) -> Result<Option<PhoneCode>, DomainError>;

    async fn consume_phone_code(&self, id: i64) -> Result<(), DomainError>;
}

/// Append-only side channel where generated codes are delivered.
#[async_trait::async_trait]
pub trait PhoneCodeLogPort: Send + Sync {
    async fn append(&self, code: &PhoneCode) -> Result<(), DomainError>;
}

/// Source of "now" and of the local calendar date.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate;
}
