//! Domain errors. Used by ports and use cases.
//!
//! Adapters map infrastructure errors into these.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Repository error: {0}")]
    Repo(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Storage-level constraint violation (unique index, foreign key).
    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Phone code log error: {0}")]
    CodeLog(String),

    #[error("UI error: {0}")]
    Ui(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn forbidden() -> Self {
        Self::Forbidden("insufficient permissions for this action".into())
    }

    /// Message suitable for showing back to the person who submitted the input.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(v) => v.user_message(),
            Self::NotFound { .. } => "Запись не найдена".to_string(),
            Self::Forbidden(_) => "Недостаточно прав для выполнения действия".to_string(),
            other => other.to_string(),
        }
    }
}

/// Rejected user input. Never fatal: the caller re-prompts with the message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid phone number: {0:?}")]
    InvalidPhone(String),

    #[error("student already has an active enrollment in this course")]
    DuplicateActiveEnrollment,

    #[error("unknown weekday code: {0:?}")]
    UnknownWeekday(String),

    #[error("student is not enrolled in the selected course")]
    StudentNotEnrolled,

    #[error("end date is before start date")]
    EndBeforeStart,

    #[error("field {0} must not be empty")]
    EmptyField(&'static str),

    #[error("a lesson on {0} already exists for this course")]
    LessonAlreadyExists(NaiveDate),

    #[error("phone number is already registered")]
    PhoneAlreadyRegistered,

    #[error("no account is registered for this phone number")]
    UnknownAccount,

    #[error("verification code is invalid")]
    InvalidCode,

    #[error("verification code has expired")]
    CodeExpired,

    #[error("selected account is not a teacher")]
    NotATeacher,

    #[error("selected account is not a parent")]
    NotAParent,

    #[error("lessons included must be at least 1")]
    NonPositiveLessonCount,

    #[error("lessons included must be at most {0}")]
    TooManyLessons(u32),

    #[error("price must not be negative")]
    NegativePrice,
}

impl ValidationError {
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidPhone(_) => "Введите номер телефона в формате +7 999 000-00-00".into(),
            Self::DuplicateActiveEnrollment => {
                "У этого ученика уже есть активная запись на выбранный курс".into()
            }
            Self::UnknownWeekday(code) => format!("Неизвестный день недели: {code}"),
            Self::StudentNotEnrolled => "Ученик не записан на выбранный курс".into(),
            Self::EndBeforeStart => "Дата окончания раньше даты начала".into(),
            Self::EmptyField(field) => format!("Поле «{field}» обязательно"),
            Self::LessonAlreadyExists(date) => {
                format!("Занятие на {} уже существует", date.format("%d.%m.%Y"))
            }
            Self::PhoneAlreadyRegistered => "Этот номер уже зарегистрирован".into(),
            Self::UnknownAccount => "Аккаунт с таким номером не найден".into(),
            Self::InvalidCode => "Неверный код подтверждения".into(),
            Self::CodeExpired => "Срок действия кода истёк".into(),
            Self::NotATeacher => "Выбранный пользователь не является учителем".into(),
            Self::NotAParent => "Выбранный пользователь не является родителем".into(),
            Self::NonPositiveLessonCount => "Количество занятий должно быть больше нуля".into(),
            Self::TooManyLessons(max) => {
                format!("Количество занятий в абонементе не может превышать {max}")
            }
            Self::NegativePrice => "Стоимость не может быть отрицательной".into(),
        }
    }
}
