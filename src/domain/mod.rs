//! Core domain layer. No external I/O dependencies.
//!
//! Entities and business rules live here. Dependencies flow inward.

pub mod access;
pub mod billing;
pub mod enrollment;
pub mod entities;
pub mod errors;
pub mod phone;
pub mod progress;
pub mod schedule;

pub use billing::{BalanceInputs, LessonBalance};
pub use entities::{
    Account, Attendance, AttendanceRecord, AttendanceStatus, CodePurpose, Course, Enrollment,
    EnrollmentDraft, Exercise, ExerciseResult, ExerciseStatus, Lesson, NewCourse, NewExercise,
    NewLesson, NewStudent, NewSubscription, PhoneCode, Role, Student, Subscription,
};
pub use errors::{DomainError, ValidationError};
pub use progress::ExerciseProgress;
pub use schedule::Weekday;
