//! Exercise progress for one student in one lesson.

use crate::domain::{ExerciseResult, ExerciseStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseProgress {
    pub total: u32,
    pub solved: u32,
    pub partial: u32,
    pub pending: u32,
}

impl ExerciseProgress {
    pub fn from_results(results: &[ExerciseResult]) -> Self {
        let mut progress = Self::default();
        for r in results {
            progress.total += 1;
            match r.status {
                ExerciseStatus::Solved => progress.solved += 1,
                ExerciseStatus::Partial => progress.partial += 1,
                ExerciseStatus::Pending => progress.pending += 1,
            }
        }
        progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: ExerciseStatus) -> ExerciseResult {
        ExerciseResult {
            id: 0,
            exercise_id: 0,
            lesson_id: 0,
            student_id: 0,
            status,
            comment: String::new(),
        }
    }

    #[test]
    fn counts_by_status() {
        let p = ExerciseProgress::from_results(&[
            result(ExerciseStatus::Solved),
            result(ExerciseStatus::Partial),
        ]);
        assert_eq!(
            p,
            ExerciseProgress {
                total: 2,
                solved: 1,
                partial: 1,
                pending: 0
            }
        );
        assert_eq!(ExerciseProgress::from_results(&[]).total, 0);
    }
}
