//! Students, guardians and courses, plus the detail views built on them.

use crate::domain::access::{can_manage_course, can_view_course, can_view_student, require, require_admin};
use crate::domain::phone::normalize_phone;
use crate::domain::schedule::parse_schedule;
use crate::domain::{
    Account, AttendanceRecord, Course, DomainError, Enrollment, EnrollmentDraft,
    ExerciseProgress, ExerciseResult, Lesson, LessonBalance, NewCourse, NewStudent, Role,
    Student, Subscription, ValidationError,
};
use crate::ports::{AccountPort, Clock, LessonPort, RosterPort};
use crate::usecases::BillingService;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct GuardianLink {
    pub student: Student,
    pub guardian: Account,
    pub already_linked: bool,
}

#[derive(Debug, Clone)]
pub struct EnrolledStudent {
    pub enrollment: Enrollment,
    pub student: Student,
}

#[derive(Debug, Clone)]
pub struct CourseDetail {
    pub course: Course,
    pub teacher: Option<Account>,
    /// Ordered by student last name.
    pub enrollments: Vec<EnrolledStudent>,
    /// Newest first.
    pub lessons: Vec<Lesson>,
    pub can_edit: bool,
    pub can_manage_enrollments: bool,
}

#[derive(Debug, Clone)]
pub struct AttendanceView {
    pub record: AttendanceRecord,
    pub progress: ExerciseProgress,
}

#[derive(Debug, Clone)]
pub struct StudentDetail {
    pub student: Student,
    pub enrollments: Vec<Enrollment>,
    /// Newest lesson first.
    pub attendance: Vec<AttendanceView>,
    /// Newest purchase first.
    pub subscriptions: Vec<Subscription>,
    pub balance: LessonBalance,
}

pub struct RosterService {
    roster: Arc<dyn RosterPort>,
    accounts: Arc<dyn AccountPort>,
    lessons: Arc<dyn LessonPort>,
    billing: Arc<BillingService>,
    clock: Arc<dyn Clock>,
}

impl RosterService {
    pub fn new(
        roster: Arc<dyn RosterPort>,
        accounts: Arc<dyn AccountPort>,
        lessons: Arc<dyn LessonPort>,
        billing: Arc<BillingService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            roster,
            accounts,
            lessons,
            billing,
            clock,
        }
    }

    async fn student(&self, id: i64) -> Result<Student, DomainError> {
        self.roster
            .get_student(id)
            .await?
            .ok_or_else(|| DomainError::not_found("student", id))
    }

    async fn course(&self, id: i64) -> Result<Course, DomainError> {
        self.roster
            .get_course(id)
            .await?
            .ok_or_else(|| DomainError::not_found("course", id))
    }

    /// Creates the student and enrolls them (active, from today) in each course
    /// that has no enrollment row for the pair yet.
    pub async fn create_student(
        &self,
        actor: &Account,
        student: &NewStudent,
        course_ids: &[i64],
    ) -> Result<Student, DomainError> {
        require_admin(actor)?;
        if student.first_name.trim().is_empty() {
            return Err(ValidationError::EmptyField("first_name").into());
        }
        if student.last_name.trim().is_empty() {
            return Err(ValidationError::EmptyField("last_name").into());
        }
        for id in course_ids {
            self.course(*id).await?;
        }

        let created = self.roster.create_student(student).await?;
        let today = self.clock.today();
        for course_id in course_ids {
            let existing = self.roster.enrollments_for_pair(created.id, *course_id).await?;
            if !existing.is_empty() {
                continue;
            }
            self.roster
                .insert_enrollment(&EnrollmentDraft {
                    student_id: created.id,
                    course_id: *course_id,
                    start_date: today,
                    end_date: None,
                    is_active: true,
                })
                .await?;
        }
        info!(
            actor = actor.id,
            student_id = created.id,
            courses = course_ids.len(),
            "student created"
        );
        Ok(created)
    }

    /// Links a parent account, found by phone, to the student.
    pub async fn link_guardian(
        &self,
        actor: &Account,
        student_id: i64,
        guardian_phone: &str,
    ) -> Result<GuardianLink, DomainError> {
        require_admin(actor)?;
        let phone = normalize_phone(guardian_phone)?;
        let guardian = self
            .accounts
            .find_account_by_phone(&phone)
            .await?
            .ok_or(ValidationError::UnknownAccount)?;
        if !guardian.is_parent() {
            return Err(ValidationError::NotAParent.into());
        }
        let student = self.student(student_id).await?;
        let newly_linked = self.roster.link_guardian(student.id, guardian.id).await?;
        if newly_linked {
            info!(student_id, guardian_id = guardian.id, "guardian linked");
        }
        Ok(GuardianLink {
            student,
            guardian,
            already_linked: !newly_linked,
        })
    }

    /// The schedule string is parsed strictly here; unknown weekday codes are rejected.
    pub async fn create_course(
        &self,
        actor: &Account,
        course: &NewCourse,
    ) -> Result<Course, DomainError> {
        require_admin(actor)?;
        if course.title.trim().is_empty() {
            return Err(ValidationError::EmptyField("title").into());
        }
        let schedule = parse_schedule(&course.schedule)?;
        if let Some(teacher_id) = course.teacher_id {
            let teacher = self.accounts.get_account(teacher_id).await?;
            if !teacher.is_some_and(|t| t.is_teacher()) {
                return Err(ValidationError::NotATeacher.into());
            }
        }
        let created = self.roster.create_course(course, &schedule).await?;
        info!(actor = actor.id, course_id = created.id, "course created");
        Ok(created)
    }

    /// Cascades to everything under the course. Every cached balance is dropped.
    pub async fn delete_course(&self, actor: &Account, course_id: i64) -> Result<(), DomainError> {
        require_admin(actor)?;
        if !self.roster.delete_course(course_id).await? {
            return Err(DomainError::not_found("course", course_id));
        }
        self.billing.invalidate_all().await;
        warn!(actor = actor.id, course_id, "course deleted");
        Ok(())
    }

    /// Admin: every student. Teacher: students enrolled in their courses. Parent: their children.
    pub async fn visible_students(&self, actor: &Account) -> Result<Vec<Student>, DomainError> {
        if actor.is_admin() {
            return self.roster.list_students().await;
        }
        let mut by_id: BTreeMap<i64, Student> = BTreeMap::new();
        if actor.is_parent() {
            for s in self.roster.students_of_guardian(actor.id).await? {
                by_id.insert(s.id, s);
            }
        }
        if actor.is_teacher() {
            for course in self.roster.courses_of_teacher(actor.id).await? {
                for e in self.roster.enrollments_for_course(course.id).await? {
                    if !by_id.contains_key(&e.student_id) {
                        if let Some(s) = self.roster.get_student(e.student_id).await? {
                            by_id.insert(s.id, s);
                        }
                    }
                }
            }
        }
        let mut students: Vec<Student> = by_id.into_values().collect();
        students.sort_by(|a, b| (&a.last_name, &a.first_name).cmp(&(&b.last_name, &b.first_name)));
        Ok(students)
    }

    /// Admin: every course. Teacher: own courses. Parent: courses a child is actively enrolled in.
    pub async fn visible_courses(&self, actor: &Account) -> Result<Vec<Course>, DomainError> {
        if actor.is_admin() {
            return self.roster.list_courses().await;
        }
        let mut ids = HashSet::new();
        let mut courses = Vec::new();
        if actor.is_teacher() {
            for c in self.roster.courses_of_teacher(actor.id).await? {
                if ids.insert(c.id) {
                    courses.push(c);
                }
            }
        }
        if actor.is_parent() {
            for child in self.roster.students_of_guardian(actor.id).await? {
                for e in self.roster.enrollments_for_student(child.id).await? {
                    if e.is_active && ids.insert(e.course_id) {
                        if let Some(c) = self.roster.get_course(e.course_id).await? {
                            courses.push(c);
                        }
                    }
                }
            }
        }
        courses.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(courses)
    }

    pub async fn accounts_with_role(
        &self,
        actor: &Account,
        role: Role,
    ) -> Result<Vec<Account>, DomainError> {
        require_admin(actor)?;
        self.accounts.accounts_with_role(role).await
    }

    async fn child_enrolled(&self, actor: &Account, course_id: i64) -> Result<bool, DomainError> {
        if !actor.is_parent() {
            return Ok(false);
        }
        let children: HashSet<i64> = self
            .roster
            .students_of_guardian(actor.id)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        Ok(self
            .roster
            .enrollments_for_course(course_id)
            .await?
            .iter()
            .any(|e| e.is_active && children.contains(&e.student_id)))
    }

    pub async fn course_detail(
        &self,
        actor: &Account,
        course_id: i64,
    ) -> Result<CourseDetail, DomainError> {
        let course = self.course(course_id).await?;
        let child_enrolled = self.child_enrolled(actor, course_id).await?;
        require(can_view_course(actor, &course, child_enrolled))?;

        let mut enrollments = Vec::new();
        for enrollment in self.roster.enrollments_for_course(course_id).await? {
            if let Some(student) = self.roster.get_student(enrollment.student_id).await? {
                enrollments.push(EnrolledStudent {
                    enrollment,
                    student,
                });
            }
        }
        enrollments.sort_by(|a, b| {
            (&a.student.last_name, &a.student.first_name)
                .cmp(&(&b.student.last_name, &b.student.first_name))
        });

        let teacher = match course.teacher_id {
            Some(id) => self.accounts.get_account(id).await?,
            None => None,
        };
        let lessons = self.lessons.lessons_for_course(course_id).await?;
        Ok(CourseDetail {
            can_edit: can_manage_course(actor, &course),
            can_manage_enrollments: actor.is_admin(),
            course,
            teacher,
            enrollments,
            lessons,
        })
    }

    pub async fn student_detail(
        &self,
        actor: &Account,
        student_id: i64,
    ) -> Result<StudentDetail, DomainError> {
        let student = self.student(student_id).await?;
        let enrollments = self.roster.enrollments_for_student(student_id).await?;

        let is_guardian = actor.is_parent()
            && self
                .roster
                .guardian_ids(student_id)
                .await?
                .contains(&actor.id);
        let teaches_student = if actor.is_teacher() {
            let own: HashSet<i64> = self
                .roster
                .courses_of_teacher(actor.id)
                .await?
                .into_iter()
                .map(|c| c.id)
                .collect();
            enrollments.iter().any(|e| own.contains(&e.course_id))
        } else {
            false
        };
        require(can_view_student(actor, is_guardian, teaches_student))?;

        let records = self.lessons.attendance_records_for_student(student_id).await?;
        let results = self.lessons.results_for_student(student_id).await?;
        let subscriptions = self.billing.subscriptions_for_student(student_id).await?;
        let balance = self
            .billing
            .balance_from_records(student_id, &subscriptions, &records)
            .await;

        let attendance = records
            .into_iter()
            .map(|record| {
                let lesson_results: Vec<ExerciseResult> = results
                    .iter()
                    .filter(|r| r.lesson_id == record.attendance.lesson_id)
                    .cloned()
                    .collect();
                AttendanceView {
                    progress: ExerciseProgress::from_results(&lesson_results),
                    record,
                }
            })
            .collect();

        Ok(StudentDetail {
            student,
            enrollments,
            attendance,
            subscriptions,
            balance,
        })
    }
}
