//! Elo-style priority refinement and actionable ranking.

use crate::config::Tunables;
use crate::types::{BasePriority, Task, DEFAULT_ELO_RATING};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Result of comparing two tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOutcome {
    FirstWins,
    SecondWins,
    Draw,
}

impl ComparisonOutcome {
    /// Score for the first task.
    fn first_score(&self) -> f64 {
        match self {
            ComparisonOutcome::FirstWins => 1.0,
            ComparisonOutcome::SecondWins => 0.0,
            ComparisonOutcome::Draw => 0.5,
        }
    }
}

/// K-factor settings for rating updates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EloParams {
    pub k_factor_base: f64,
    pub k_factor_new: f64,
    /// Tasks with fewer comparisons than this use `k_factor_new`.
    pub new_task_threshold: i64,
}

impl From<&Tunables> for EloParams {
    fn from(t: &Tunables) -> Self {
        Self {
            k_factor_base: t.k_factor_base,
            k_factor_new: t.k_factor_new,
            new_task_threshold: t.new_task_threshold,
        }
    }
}

impl EloParams {
    pub fn k_factor(&self, comparison_count: i64) -> f64 {
        if comparison_count < self.new_task_threshold {
            self.k_factor_new
        } else {
            self.k_factor_base
        }
    }
}

/// Probability that a task rated `rating` beats one rated `opponent`.
pub fn expected_score(rating: f64, opponent: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - rating) / 400.0))
}

/// Apply one pairwise comparison to both tasks.
pub fn compare(first: &mut Task, second: &mut Task, outcome: ComparisonOutcome, params: &EloParams) {
    let expected_first = expected_score(first.elo_rating, second.elo_rating);
    let expected_second = 1.0 - expected_first;
    let score_first = outcome.first_score();
    let score_second = 1.0 - score_first;

    let k_first = params.k_factor(first.comparison_count);
    let k_second = params.k_factor(second.comparison_count);

    first.elo_rating += k_first * (score_first - expected_first);
    second.elo_rating += k_second * (score_second - expected_second);
    first.comparison_count += 1;
    second.comparison_count += 1;

    sync_series_pool(first);
    sync_series_pool(second);
}

/// One-sided loss: the task was passed over without a specific opponent.
pub fn demote(task: &mut Task, decrement: f64) {
    task.elo_rating -= decrement;
    task.comparison_count += 1;
    sync_series_pool(task);
}

/// Move a task to a tier. Always resets the rating, even for the same tier.
pub fn reset_for_tier(task: &mut Task, priority: BasePriority) {
    task.base_priority = priority;
    task.elo_rating = DEFAULT_ELO_RATING;
    task.comparison_count = 0;
    sync_series_pool(task);
}

fn sync_series_pool(task: &mut Task) {
    if task.share_elo_rating {
        task.shared_elo_rating = Some(task.elo_rating);
        task.shared_comparison_count = Some(task.comparison_count);
    }
}

/// Ordering for actionable work: tier, then rating, then earliest due date (undated last).
pub fn rank_order(a: &Task, b: &Task) -> Ordering {
    b.base_priority
        .cmp(&a.base_priority)
        .then_with(|| b.elo_rating.total_cmp(&a.elo_rating))
        .then_with(|| match (a.due_date, b.due_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort tasks into ranking order.
pub fn rank(tasks: &mut [Task]) {
    tasks.sort_by(rank_order);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewTask;
    use chrono::NaiveDate;

    fn params() -> EloParams {
        EloParams {
            k_factor_base: 32.0,
            k_factor_new: 64.0,
            new_task_threshold: 10,
        }
    }

    fn task(id: i64) -> Task {
        let mut t = Task::from_new(&NewTask::titled(format!("task {}", id)));
        t.id = Some(id);
        t
    }

    #[test]
    fn equal_ratings_move_by_half_k() {
        let (mut a, mut b) = (task(1), task(2));
        compare(&mut a, &mut b, ComparisonOutcome::FirstWins, &params());
        assert!((a.elo_rating - 1532.0).abs() < 1e-9);
        assert!((b.elo_rating - 1468.0).abs() < 1e-9);
        assert_eq!(a.comparison_count, 1);
        assert_eq!(b.comparison_count, 1);
    }

    #[test]
    fn established_tasks_use_base_k() {
        let (mut a, mut b) = (task(1), task(2));
        a.comparison_count = 10;
        b.comparison_count = 10;
        compare(&mut a, &mut b, ComparisonOutcome::SecondWins, &params());
        assert!((a.elo_rating - 1484.0).abs() < 1e-9);
        assert!((b.elo_rating - 1516.0).abs() < 1e-9);
    }

    #[test]
    fn draw_between_equals_changes_nothing() {
        let (mut a, mut b) = (task(1), task(2));
        compare(&mut a, &mut b, ComparisonOutcome::Draw, &params());
        assert_eq!(a.elo_rating, DEFAULT_ELO_RATING);
        assert_eq!(b.elo_rating, DEFAULT_ELO_RATING);
    }

    #[test]
    fn upset_win_gains_more() {
        let (mut a, mut b) = (task(1), task(2));
        a.elo_rating = 1400.0;
        b.elo_rating = 1600.0;
        compare(&mut a, &mut b, ComparisonOutcome::FirstWins, &params());
        assert!(a.elo_rating - 1400.0 > 32.0);
    }

    #[test]
    fn tier_change_resets_even_for_same_tier() {
        let mut t = task(1);
        t.elo_rating = 1612.5;
        t.comparison_count = 7;
        reset_for_tier(&mut t, BasePriority::Medium);
        assert_eq!(t.elo_rating, DEFAULT_ELO_RATING);
        assert_eq!(t.comparison_count, 0);
    }

    #[test]
    fn shared_pool_follows_rating() {
        let mut t = task(1);
        t.share_elo_rating = true;
        demote(&mut t, 16.0);
        assert_eq!(t.shared_elo_rating, Some(1484.0));
        assert_eq!(t.shared_comparison_count, Some(1));
    }

    #[test]
    fn rank_orders_by_tier_rating_then_due() {
        let mut high = task(1);
        high.base_priority = BasePriority::High;
        let mut strong = task(2);
        strong.elo_rating = 1600.0;
        let mut dated = task(3);
        dated.due_date = NaiveDate::from_ymd_opt(2024, 1, 1);
        let plain = task(4);

        let mut tasks = vec![plain, dated, strong, high];
        rank(&mut tasks);
        let ids: Vec<_> = tasks.iter().filter_map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }
}
