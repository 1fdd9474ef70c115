// src/scheduler/stats.rs
use serde::Serialize;

use super::Assignment;

/// Batch summary. Fields hold raw values; call [`AssignmentStats::rounded`]
/// for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AssignmentStats {
    pub total: usize,
    pub assigned: usize,
    pub unassigned: usize,
    pub success_rate: f64,
    pub avg_score: f64,
    pub total_travel_time: f64,
}

impl AssignmentStats {
    pub fn from_batch(assignments: &[Assignment], unassigned: usize) -> Self {
        let assigned = assignments.len();
        let total = assigned + unassigned;

        let success_rate = if total > 0 {
            assigned as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        let avg_score = if assigned > 0 {
            assignments.iter().map(|a| a.score).sum::<f64>() / assigned as f64
        } else {
            0.0
        };
        let total_travel_time = assignments.iter().map(|a| a.travel_time_min).sum();

        Self {
            total,
            assigned,
            unassigned,
            success_rate,
            avg_score,
            total_travel_time,
        }
    }

    /// Same figures with the rates and sums rounded to one decimal place.
    pub fn rounded(&self) -> Self {
        Self {
            success_rate: round1(self.success_rate),
            avg_score: round1(self.avg_score),
            total_travel_time: round1(self.total_travel_time),
            ..*self
        }
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Priority;

    fn assignment(score: f64, travel: f64) -> Assignment {
        Assignment {
            dispatch_id: "D".into(),
            technician_id: "T".into(),
            technician_name: "Tess".into(),
            distance_km: 1.0,
            travel_time_min: travel,
            score,
            priority: Priority::Medium,
            expanded: false,
        }
    }

    #[test]
    fn two_of_three_is_66_7_percent() {
        let batch = [assignment(80.0, 20.0), assignment(70.05, 31.26)];
        let stats = AssignmentStats::from_batch(&batch, 1).rounded();
        assert_eq!((stats.total, stats.assigned, stats.unassigned), (3, 2, 1));
        assert_eq!(stats.success_rate, 66.7);
        assert_eq!(stats.avg_score, 75.0);
        assert_eq!(stats.total_travel_time, 51.3);
    }

    #[test]
    fn empty_batch_reports_zeroes() {
        let stats = AssignmentStats::from_batch(&[], 0);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.avg_score, 0.0);
    }
}
