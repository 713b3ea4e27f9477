//! Integration tests for the persistence gateway.
//!
//! These tests run against an in-memory SQLite database.

use chrono::NaiveDate;
use taskrank::db::Database;
use taskrank::recurrence::RecurrencePattern;
use taskrank::types::{BasePriority, NewTask, RecurrenceSpec, Task, TaskState};
use taskrank::ErrorCode;

/// Helper to create a fresh in-memory database for testing.
fn setup_db() -> Database {
    Database::open_in_memory().expect("Failed to create in-memory database")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn add_task(db: &Database, title: &str) -> i64 {
    db.create_task(&Task::from_new(&NewTask::titled(title)))
        .expect("Failed to create task")
        .id
        .unwrap()
}

mod task_tests {
    use super::*;

    #[test]
    fn create_task_assigns_id_and_defaults() {
        let db = setup_db();

        let task = db
            .create_task(&Task::from_new(&NewTask::titled("Write report")))
            .unwrap();

        assert!(task.id.is_some());
        assert_eq!(task.state, TaskState::Active);
        assert_eq!(task.elo_rating, 1500.0);
        assert_eq!(task.comparison_count, 0);
        assert!(task.created_at > 0);
    }

    #[test]
    fn create_task_rejects_existing_id() {
        let db = setup_db();
        let mut task = Task::from_new(&NewTask::titled("x"));
        task.id = Some(99);

        let err = db.create_task(&task).unwrap_err();

        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert!(db.get_task(99).unwrap().is_none());
    }

    #[test]
    fn create_task_rejects_blank_title() {
        let db = setup_db();

        let err = db.create_task(&Task::from_new(&NewTask::titled("   "))).unwrap_err();

        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn update_task_requires_id() {
        let db = setup_db();

        let err = db.update_task(&Task::from_new(&NewTask::titled("x"))).unwrap_err();

        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn update_unknown_task_is_not_found() {
        let db = setup_db();
        let mut task = Task::from_new(&NewTask::titled("x"));
        task.id = Some(12);

        let err = db.update_task(&task).unwrap_err();

        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn all_fields_survive_a_round_trip_through_the_store() {
        let db = setup_db();
        let new = NewTask {
            title: "Pay rent".into(),
            description: Some("transfer".into()),
            base_priority: BasePriority::High,
            due_date: Some(date(2024, 2, 1)),
            context_id: Some(3),
            tags: [4, 9].into_iter().collect(),
            recurrence: Some(RecurrenceSpec {
                pattern: RecurrencePattern::monthly_on_day(1, 1),
                share_elo_rating: true,
                end_date: Some(date(2025, 1, 1)),
                max_occurrences: Some(12),
            }),
        };

        let created = db.create_task(&Task::from_new(&new)).unwrap();
        let loaded = db.get_task(created.id.unwrap()).unwrap().unwrap();

        assert_eq!(loaded, created);
        assert_eq!(loaded.tags.len(), 2);
        assert_eq!(
            loaded.recurrence_pattern,
            Some(RecurrencePattern::monthly_on_day(1, 1))
        );
        assert!(loaded.share_elo_rating);
        assert_eq!(loaded.max_occurrences, Some(12));
    }

    #[test]
    fn restore_task_keeps_updated_at() {
        let db = setup_db();
        let id = add_task(&db, "a");
        let original = db.get_task(id).unwrap().unwrap();

        let mut changed = original.clone();
        changed.title = "b".into();
        db.update_task(&changed).unwrap();
        db.restore_task(&original).unwrap();

        assert_eq!(db.get_task(id).unwrap().unwrap(), original);
    }

    #[test]
    fn deleted_task_can_be_reinserted_with_same_id() {
        let db = setup_db();
        let id = add_task(&db, "a");
        let snapshot = db.get_task(id).unwrap().unwrap();

        assert!(db.delete_task(id).unwrap());
        assert!(!db.delete_task(id).unwrap());
        db.insert_task_with_id(&snapshot).unwrap();

        assert_eq!(db.get_task(id).unwrap().unwrap(), snapshot);
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let db = setup_db();
        let first = add_task(&db, "a");
        db.delete_task(first).unwrap();

        let second = add_task(&db, "b");

        assert_ne!(first, second);
    }

    #[test]
    fn list_tasks_hides_tombstoned() {
        let db = setup_db();
        let id = add_task(&db, "a");
        add_task(&db, "b");
        let mut task = db.get_task(id).unwrap().unwrap();
        task.state = TaskState::Tombstoned;
        db.update_task(&task).unwrap();

        assert_eq!(db.list_tasks(None).unwrap().len(), 1);
        assert!(db.list_tasks(Some(TaskState::Tombstoned)).unwrap().is_empty());
        assert_eq!(db.count_task_rows().unwrap(), 2);
    }

    #[test]
    fn scheduler_queries_find_due_tasks() {
        let db = setup_db();
        let deferred = add_task(&db, "deferred");
        let later = add_task(&db, "later");
        let delegated = add_task(&db, "delegated");

        for (id, start) in [(deferred, date(2024, 1, 10)), (later, date(2024, 2, 1))] {
            let mut t = db.get_task(id).unwrap().unwrap();
            t.state = TaskState::Deferred;
            t.start_date = Some(start);
            db.update_task(&t).unwrap();
        }
        let mut t = db.get_task(delegated).unwrap().unwrap();
        t.state = TaskState::Delegated;
        t.delegated_to = Some("Ana".into());
        t.follow_up_date = Some(date(2024, 1, 15));
        db.update_task(&t).unwrap();

        let due: Vec<_> = db
            .deferred_due(date(2024, 1, 15))
            .unwrap()
            .into_iter()
            .filter_map(|t| t.id)
            .collect();
        assert_eq!(due, vec![deferred]);

        let follow_ups = db.follow_ups_due(date(2024, 1, 15)).unwrap();
        assert_eq!(follow_ups.len(), 1);
        assert!(db.follow_ups_due(date(2024, 1, 14)).unwrap().is_empty());
    }
}

mod dependency_tests {
    use super::*;

    #[test]
    fn self_edge_is_rejected() {
        let db = setup_db();
        let a = add_task(&db, "a");

        let err = db.create_dependency(a, a).unwrap_err();

        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn edge_to_unknown_task_is_not_found() {
        let db = setup_db();
        let a = add_task(&db, "a");

        let err = db.create_dependency(a, 404).unwrap_err();

        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn closing_a_cycle_fails_without_mutating() {
        let db = setup_db();
        let a = add_task(&db, "a");
        let b = add_task(&db, "b");
        let c = add_task(&db, "c");
        db.create_dependency(a, b).unwrap();
        db.create_dependency(b, c).unwrap();
        let before = db.all_dependencies().unwrap();

        let err = db.create_dependency(c, a).unwrap_err();

        assert_eq!(err.code(), ErrorCode::CycleDetected);
        assert_eq!(db.all_dependencies().unwrap(), before);
    }

    #[test]
    fn direct_back_edge_is_a_cycle() {
        let db = setup_db();
        let a = add_task(&db, "a");
        let b = add_task(&db, "b");
        db.create_dependency(a, b).unwrap();

        assert!(db.create_dependency(b, a).unwrap_err().is_cycle());
    }

    #[test]
    fn diamond_graphs_accept_shared_blockers() {
        let db = setup_db();
        let top = add_task(&db, "top");
        let left = add_task(&db, "left");
        let right = add_task(&db, "right");
        let bottom = add_task(&db, "bottom");

        db.create_dependency(top, left).unwrap();
        db.create_dependency(top, right).unwrap();
        db.create_dependency(left, bottom).unwrap();
        db.create_dependency(right, bottom).unwrap();
        // Redundant shortcut across the diamond is still acyclic.
        db.create_dependency(top, bottom).unwrap();

        assert!(db.depends_transitively_on(top, bottom).unwrap());
        assert!(db.create_dependency(bottom, top).unwrap_err().is_cycle());
        assert!(db.create_dependency(bottom, left).unwrap_err().is_cycle());
        assert_eq!(db.all_dependencies().unwrap().len(), 5);
    }

    #[test]
    fn duplicate_edge_returns_existing_record() {
        let db = setup_db();
        let a = add_task(&db, "a");
        let b = add_task(&db, "b");

        let first = db.create_dependency(a, b).unwrap();
        let second = db.create_dependency(a, b).unwrap();

        assert_eq!(first, second);
        assert_eq!(db.all_dependencies().unwrap().len(), 1);
    }

    #[test]
    fn queries_distinguish_direction() {
        let db = setup_db();
        let a = add_task(&db, "a");
        let b = add_task(&db, "b");
        let c = add_task(&db, "c");
        db.create_dependency(a, b).unwrap();
        db.create_dependency(c, b).unwrap();

        assert_eq!(db.dependencies_for(a).unwrap().len(), 1);
        assert_eq!(db.blockers_of(b).unwrap().len(), 2);
        assert!(db.blockers_of(a).unwrap().is_empty());
    }

    #[test]
    fn delete_by_id_and_pair() {
        let db = setup_db();
        let a = add_task(&db, "a");
        let b = add_task(&db, "b");
        let c = add_task(&db, "c");
        let ab = db.create_dependency(a, b).unwrap();
        db.create_dependency(a, c).unwrap();

        assert!(db.delete_dependency(ab.id).unwrap());
        assert!(db.delete_dependency_by_pair(a, c).unwrap());
        assert!(!db.delete_dependency_by_pair(a, c).unwrap());
        assert!(db.all_dependencies().unwrap().is_empty());
    }

    #[test]
    fn blocking_ids_exclude_completed_blockers() {
        let db = setup_db();
        let a = add_task(&db, "a");
        let b = add_task(&db, "b");
        let c = add_task(&db, "c");
        db.create_dependency(a, b).unwrap();
        db.create_dependency(a, c).unwrap();

        let mut blocker = db.get_task(c).unwrap().unwrap();
        blocker.state = TaskState::Completed;
        db.update_task(&blocker).unwrap();

        let task = db.get_task(a).unwrap().unwrap();
        assert_eq!(task.blocking_task_ids.into_iter().collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn release_dependents_returns_removed_edges() {
        let db = setup_db();
        let a = add_task(&db, "a");
        let b = add_task(&db, "b");
        let c = add_task(&db, "c");
        let ac = db.create_dependency(a, c).unwrap();
        let bc = db.create_dependency(b, c).unwrap();
        let ab = db.create_dependency(a, b).unwrap();

        let released = db.release_dependents(c).unwrap();

        assert_eq!(released, vec![ac, bc]);
        assert_eq!(db.all_dependencies().unwrap(), vec![ab]);
    }

    #[test]
    fn deleting_a_task_removes_its_edges() {
        let db = setup_db();
        let a = add_task(&db, "a");
        let b = add_task(&db, "b");
        db.create_dependency(a, b).unwrap();

        db.delete_task(b).unwrap();

        assert!(db.all_dependencies().unwrap().is_empty());
    }

    #[test]
    fn restore_dependency_rejects_edge_that_closes_cycle() {
        let db = setup_db();
        let a = add_task(&db, "a");
        let b = add_task(&db, "b");
        let ab = db.create_dependency(a, b).unwrap();
        db.delete_dependency(ab.id).unwrap();
        let ba = db.create_dependency(b, a).unwrap();

        let err = db.restore_dependency(&ab).unwrap_err();

        assert_eq!(err.code(), ErrorCode::CycleDetected);
        assert_eq!(db.all_dependencies().unwrap(), vec![ba]);
    }

    #[test]
    fn tombstoned_tasks_cannot_gain_edges() {
        let db = setup_db();
        let a = add_task(&db, "a");
        let b = add_task(&db, "b");
        let mut task = db.get_task(b).unwrap().unwrap();
        task.state = TaskState::Tombstoned;
        db.update_task(&task).unwrap();

        let err = db.create_dependency(a, b).unwrap_err();

        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(db.all_dependencies().unwrap().is_empty());
        assert_eq!(db.require_task(b).unwrap_err().code(), ErrorCode::NotFound);
    }
}

mod ranking_tests {
    use super::*;

    #[test]
    fn ranked_actionable_skips_blocked_and_inactive() {
        let db = setup_db();
        let high = db
            .create_task(&Task::from_new(
                &NewTask::titled("urgent").with_priority(BasePriority::High),
            ))
            .unwrap()
            .id
            .unwrap();
        let blocked = add_task(&db, "blocked");
        let blocker = add_task(&db, "blocker");
        let someday = add_task(&db, "someday");
        db.create_dependency(blocked, blocker).unwrap();
        let mut t = db.get_task(someday).unwrap().unwrap();
        t.state = TaskState::Someday;
        db.update_task(&t).unwrap();

        let ranked: Vec<_> = db
            .ranked_actionable()
            .unwrap()
            .into_iter()
            .filter_map(|t| t.id)
            .collect();

        assert_eq!(ranked, vec![high, blocker]);
    }
}

mod transaction_tests {
    use super::*;
    use taskrank::Error;

    #[test]
    fn error_rolls_back_every_write_in_scope() {
        let db = setup_db();

        let result: Result<(), Error> = db.transaction(|| {
            add_task(&db, "a");
            add_task(&db, "b");
            Err(Error::validation("test", "abort"))
        });

        assert!(result.is_err());
        assert_eq!(db.count_task_rows().unwrap(), 0);
    }

    #[test]
    fn nested_scope_rolls_back_only_itself() {
        let db = setup_db();

        db.transaction(|| {
            add_task(&db, "outer");
            let inner: Result<(), Error> = db.transaction(|| {
                add_task(&db, "inner");
                Err(Error::validation("test", "abort"))
            });
            assert!(inner.is_err());
            Ok(())
        })
        .unwrap();

        let titles: Vec<_> = db.list_tasks(None).unwrap().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["outer"]);
    }

    #[test]
    fn on_disk_database_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.db");
        {
            let db = Database::open(&path).unwrap();
            add_task(&db, "persisted");
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.list_tasks(None).unwrap().len(), 1);
    }
}
