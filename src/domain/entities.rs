//! Domain entities. Pure data structures for the core business.
//!
//! No storage or UI types here; adapters map rows into these.

use crate::domain::schedule::Weekday;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: String,
    pub birth_date: Option<NaiveDate>,
    /// Free-text contact, independent of linked guardian accounts.
    pub guardian_name: String,
    pub guardian_phone: String,
    pub notes: String,
}

impl Student {
    /// "Last First Middle", skipping empty parts.
    pub fn full_name(&self) -> String {
        [&self.last_name, &self.first_name, &self.middle_name]
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
    pub middle_name: String,
    pub birth_date: Option<NaiveDate>,
    pub guardian_name: String,
    pub guardian_phone: String,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub schedule: Vec<Weekday>,
    pub capacity: Option<u32>,
    pub teacher_id: Option<i64>,
}

impl Course {
    pub fn schedule_display(&self) -> String {
        self.schedule
            .iter()
            .map(|d| d.label())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Course input. `schedule` holds raw comma-separated weekday codes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCourse {
    pub title: String,
    pub description: String,
    pub schedule: String,
    pub capacity: Option<u32>,
    pub teacher_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub is_active: bool,
}

impl Enrollment {
    /// True when the enrollment is active and the date falls within [start, end].
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.is_active && self.start_date <= date && self.end_date.is_none_or(|end| end >= date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentDraft {
    pub student_id: i64,
    pub course_id: i64,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: i64,
    pub course_id: i64,
    pub date: NaiveDate,
    pub topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLesson {
    pub course_id: i64,
    pub date: NaiveDate,
    pub topic: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    #[default]
    Present,
    Absent,
    Excused,
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 3] = [Self::Present, Self::Absent, Self::Excused];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Excused => "excused",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Present => "Присутствовал",
            Self::Absent => "Отсутствовал",
            Self::Excused => "Уважительная причина",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendance {
    pub id: i64,
    pub lesson_id: i64,
    pub student_id: i64,
    pub status: AttendanceStatus,
    pub comment: String,
}

/// Attendance joined with its lesson. Prefetched input for balance and progress views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub attendance: Attendance,
    pub lesson_date: NaiveDate,
    pub course_id: i64,
    pub course_title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseStatus {
    #[default]
    Pending,
    Solved,
    Partial,
}

impl ExerciseStatus {
    pub const ALL: [ExerciseStatus; 3] = [Self::Pending, Self::Solved, Self::Partial];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Solved => "solved",
            Self::Partial => "partial",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Не решено",
            Self::Solved => "Решено",
            Self::Partial => "Частично",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: i64,
    pub lesson_id: i64,
    pub title: String,
    pub description: String,
    pub order: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewExercise {
    pub title: String,
    pub description: String,
    /// 0 = append after the current last exercise.
    pub order: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseResult {
    pub id: i64,
    pub exercise_id: i64,
    /// Denormalized from the exercise for grouping results per lesson.
    pub lesson_id: i64,
    pub student_id: i64,
    pub status: ExerciseStatus,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub lessons_included: u32,
    /// Price in minor currency units (kopecks).
    pub price_minor: i64,
    pub purchase_date: NaiveDate,
    pub is_active: bool,
}

impl Subscription {
    pub fn price_display(&self) -> String {
        format!("{}.{:02}", self.price_minor / 100, self.price_minor % 100)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubscription {
    pub student_id: i64,
    pub course_id: i64,
    pub lessons_included: u32,
    pub price_minor: i64,
    pub purchase_date: NaiveDate,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Parent,
}

impl Role {
    pub const ALL: [Role; 3] = [Self::Admin, Self::Teacher, Self::Parent];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Teacher => "teacher",
            Self::Parent => "parent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == s)
    }

    /// Group name shown to staff.
    pub fn group_name(self) -> &'static str {
        match self {
            Self::Admin => "Администраторы",
            Self::Teacher => "Учителя",
            Self::Parent => "Родители",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    /// Normalized, see [`crate::domain::phone::normalize_phone`].
    pub phone: String,
    pub display_name: String,
    pub roles: Vec<Role>,
}

impl Account {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn is_teacher(&self) -> bool {
        self.has_role(Role::Teacher)
    }

    pub fn is_parent(&self) -> bool {
        self.has_role(Role::Parent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodePurpose {
    Registration,
    Login,
}

impl CodePurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Login => "login",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "registration" => Some(Self::Registration),
            "login" => Some(Self::Login),
            _ => None,
        }
    }
}

/// One-time verification code sent over the phone side channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneCode {
    pub id: i64,
    pub phone: String,
    pub purpose: CodePurpose,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(first: &str, last: &str, middle: &str) -> Student {
        Student {
            id: 1,
            first_name: first.into(),
            last_name: last.into(),
            middle_name: middle.into(),
            birth_date: None,
            guardian_name: String::new(),
            guardian_phone: String::new(),
            notes: String::new(),
        }
    }

    #[test]
    fn full_name_orders_last_first_middle() {
        assert_eq!(
            student("Иван", "Иванов", "Иванович").full_name(),
            "Иванов Иван Иванович"
        );
        assert_eq!(student("Иван", "Иванов", "").full_name(), "Иванов Иван");
    }

    #[test]
    fn enrollment_covers_respects_bounds() {
        let d = |m, day| NaiveDate::from_ymd_opt(2024, m, day).unwrap();
        let mut e = Enrollment {
            id: 1,
            student_id: 1,
            course_id: 1,
            start_date: d(1, 10),
            end_date: Some(d(2, 10)),
            is_active: true,
        };
        assert!(!e.covers(d(1, 9)));
        assert!(e.covers(d(1, 10)));
        assert!(e.covers(d(2, 10)));
        assert!(!e.covers(d(2, 11)));
        e.end_date = None;
        assert!(e.covers(d(12, 31)));
        e.is_active = false;
        assert!(!e.covers(d(1, 20)));
    }

    #[test]
    fn status_codes_parse() {
        assert_eq!(AttendanceStatus::parse("absent"), Some(AttendanceStatus::Absent));
        assert_eq!(AttendanceStatus::parse("late"), None);
        assert_eq!(ExerciseStatus::parse("partial"), Some(ExerciseStatus::Partial));
        assert_eq!(Role::parse("teacher"), Some(Role::Teacher));
    }

    #[test]
    fn price_display_uses_minor_units() {
        let sub = Subscription {
            id: 1,
            student_id: 1,
            course_id: 1,
            lessons_included: 4,
            price_minor: 450_005,
            purchase_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            is_active: true,
        };
        assert_eq!(sub.price_display(), "4500.05");
    }
}
