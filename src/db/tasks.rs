//! Task CRUD and scheduler-facing queries.

use super::{now_ms, Database};
use crate::error::{Error, Result};
use crate::priority;
use crate::recurrence::RecurrencePattern;
use crate::types::{BasePriority, TagId, Task, TaskId, TaskState};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::collections::BTreeSet;
use tracing::debug;

const TASK_COLUMNS: &str = "id, title, description, base_priority, elo_rating, comparison_count,
     due_date, state, context_id, start_date, delegated_to, follow_up_date, completed_at,
     is_recurring, recurrence_pattern, recurrence_parent_id, share_elo_rating,
     shared_elo_rating, shared_comparison_count, recurrence_end_date, max_occurrences,
     occurrence_count, created_at, updated_at";

fn conversion_error(column: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

#[derive(Debug)]
struct UnknownValue(String);

impl std::fmt::Display for UnknownValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown value: {}", self.0)
    }
}

impl std::error::Error for UnknownValue {}

/// Parse a task row. Tags and blockers are filled in separately.
pub fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    let base_priority: String = row.get("base_priority")?;
    let base_priority = BasePriority::from_str(&base_priority)
        .ok_or_else(|| conversion_error(3, UnknownValue(base_priority)))?;

    let state: String = row.get("state")?;
    let state =
        TaskState::from_str(&state).ok_or_else(|| conversion_error(7, UnknownValue(state)))?;

    let pattern_json: Option<String> = row.get("recurrence_pattern")?;
    let recurrence_pattern = pattern_json
        .map(|s| serde_json::from_str::<RecurrencePattern>(&s))
        .transpose()
        .map_err(|e| conversion_error(14, e))?;

    Ok(Task {
        id: Some(row.get("id")?),
        title: row.get("title")?,
        description: row.get("description")?,
        base_priority,
        elo_rating: row.get("elo_rating")?,
        comparison_count: row.get("comparison_count")?,
        due_date: row.get("due_date")?,
        state,
        context_id: row.get("context_id")?,
        start_date: row.get("start_date")?,
        delegated_to: row.get("delegated_to")?,
        follow_up_date: row.get("follow_up_date")?,
        completed_at: row.get("completed_at")?,
        is_recurring: row.get("is_recurring")?,
        recurrence_pattern,
        recurrence_parent_id: row.get("recurrence_parent_id")?,
        share_elo_rating: row.get("share_elo_rating")?,
        shared_elo_rating: row.get("shared_elo_rating")?,
        shared_comparison_count: row.get("shared_comparison_count")?,
        recurrence_end_date: row.get("recurrence_end_date")?,
        max_occurrences: row.get("max_occurrences")?,
        occurrence_count: row.get("occurrence_count")?,
        tags: BTreeSet::new(),
        blocking_task_ids: BTreeSet::new(),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn validate_task(task: &Task) -> Result<()> {
    if task.title.trim().is_empty() {
        return Err(Error::validation("title", "must not be empty"));
    }
    if let Some(pattern) = &task.recurrence_pattern {
        pattern.validate()?;
    }
    if task.is_recurring && task.recurrence_pattern.is_none() {
        return Err(Error::validation(
            "recurrence_pattern",
            "recurring tasks need a pattern",
        ));
    }
    Ok(())
}

fn pattern_json(task: &Task) -> Result<Option<String>> {
    task.recurrence_pattern
        .as_ref()
        .map(RecurrencePattern::to_json)
        .transpose()
}

/// Replace the tag associations of a task.
fn sync_task_tags(conn: &Connection, task_id: TaskId, tags: &BTreeSet<TagId>) -> Result<()> {
    conn.execute("DELETE FROM task_tags WHERE task_id = ?1", params![task_id])?;
    for tag in tags {
        conn.execute(
            "INSERT INTO task_tags (task_id, tag_id) VALUES (?1, ?2)",
            params![task_id, tag],
        )?;
    }
    Ok(())
}

fn load_tags(conn: &Connection, task_id: TaskId) -> Result<BTreeSet<TagId>> {
    let mut stmt = conn.prepare("SELECT tag_id FROM task_tags WHERE task_id = ?1")?;
    let tags = stmt
        .query_map(params![task_id], |row| row.get(0))?
        .collect::<rusqlite::Result<BTreeSet<TagId>>>()?;
    Ok(tags)
}

/// Blockers of a task that are neither completed nor tombstoned.
pub(crate) fn open_blocker_ids(conn: &Connection, task_id: TaskId) -> Result<BTreeSet<TaskId>> {
    let mut stmt = conn.prepare(
        "SELECT d.blocking_task_id FROM dependencies d
         INNER JOIN tasks blocker ON blocker.id = d.blocking_task_id
         WHERE d.blocked_task_id = ?1
           AND blocker.state NOT IN ('completed', 'tombstoned')",
    )?;
    let ids = stmt
        .query_map(params![task_id], |row| row.get(0))?
        .collect::<rusqlite::Result<BTreeSet<TaskId>>>()?;
    Ok(ids)
}

fn fill_relations(conn: &Connection, task: &mut Task) -> Result<()> {
    if let Some(id) = task.id {
        task.tags = load_tags(conn, id)?;
        task.blocking_task_ids = open_blocker_ids(conn, id)?;
    }
    Ok(())
}

/// Internal helper to get a task using an existing connection.
fn get_task_internal(conn: &Connection, task_id: TaskId) -> Result<Option<Task>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS))?;

    let result = stmt.query_row(params![task_id], parse_task_row);

    match result {
        Ok(mut task) => {
            fill_relations(conn, &mut task)?;
            Ok(Some(task))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn query_tasks(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(sql)?;
    let mut tasks = stmt
        .query_map(args, parse_task_row)?
        .collect::<rusqlite::Result<Vec<Task>>>()?;
    for task in &mut tasks {
        fill_relations(conn, task)?;
    }
    Ok(tasks)
}

/// Insert a row. A `None` id lets SQLite assign one.
fn insert_internal(conn: &Connection, task: &Task, created_at: i64, updated_at: i64) -> Result<TaskId> {
    conn.execute(
        &format!(
            "INSERT INTO tasks ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
             ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)",
            TASK_COLUMNS
        ),
        params![
            task.id,
            task.title,
            task.description,
            task.base_priority.as_str(),
            task.elo_rating,
            task.comparison_count,
            task.due_date,
            task.state.as_str(),
            task.context_id,
            task.start_date,
            task.delegated_to,
            task.follow_up_date,
            task.completed_at,
            task.is_recurring,
            pattern_json(task)?,
            task.recurrence_parent_id,
            task.share_elo_rating,
            task.shared_elo_rating,
            task.shared_comparison_count,
            task.recurrence_end_date,
            task.max_occurrences,
            task.occurrence_count,
            created_at,
            updated_at,
        ],
    )?;
    let id = conn.last_insert_rowid();
    sync_task_tags(conn, id, &task.tags)?;
    Ok(id)
}

/// Overwrite every stored column of an existing row.
fn update_internal(conn: &Connection, task_id: TaskId, task: &Task, updated_at: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE tasks SET title = ?2, description = ?3, base_priority = ?4, elo_rating = ?5,
             comparison_count = ?6, due_date = ?7, state = ?8, context_id = ?9,
             start_date = ?10, delegated_to = ?11, follow_up_date = ?12, completed_at = ?13,
             is_recurring = ?14, recurrence_pattern = ?15, recurrence_parent_id = ?16,
             share_elo_rating = ?17, shared_elo_rating = ?18, shared_comparison_count = ?19,
             recurrence_end_date = ?20, max_occurrences = ?21, occurrence_count = ?22,
             updated_at = ?23
         WHERE id = ?1",
        params![
            task_id,
            task.title,
            task.description,
            task.base_priority.as_str(),
            task.elo_rating,
            task.comparison_count,
            task.due_date,
            task.state.as_str(),
            task.context_id,
            task.start_date,
            task.delegated_to,
            task.follow_up_date,
            task.completed_at,
            task.is_recurring,
            pattern_json(task)?,
            task.recurrence_parent_id,
            task.share_elo_rating,
            task.shared_elo_rating,
            task.shared_comparison_count,
            task.recurrence_end_date,
            task.max_occurrences,
            task.occurrence_count,
            updated_at,
        ],
    )?;
    if changed == 0 {
        return Ok(false);
    }
    sync_task_tags(conn, task_id, &task.tags)?;
    Ok(true)
}

impl Database {
    /// Persist a new task and return it with its assigned id.
    pub fn create_task(&self, task: &Task) -> Result<Task> {
        if task.id.is_some() {
            return Err(Error::validation("id", "new task already has an id"));
        }
        validate_task(task)?;

        self.with_conn(|conn| {
            let now = now_ms();
            let id = insert_internal(conn, task, now, now)?;
            debug!(task_id = id, title = %task.title, "created task");
            get_task_internal(conn, id)?.ok_or_else(|| Error::task_not_found(id))
        })
    }

    /// Re-insert a task under its original id and timestamps.
    pub fn insert_task_with_id(&self, task: &Task) -> Result<Task> {
        let id = task.require_id()?;
        validate_task(task)?;

        self.with_conn(|conn| {
            insert_internal(conn, task, task.created_at, task.updated_at)?;
            debug!(task_id = id, "re-inserted task");
            get_task_internal(conn, id)?.ok_or_else(|| Error::task_not_found(id))
        })
    }

    /// Get a task by id.
    pub fn get_task(&self, task_id: TaskId) -> Result<Option<Task>> {
        self.with_conn(|conn| get_task_internal(conn, task_id))
    }

    /// Get a task that must exist and is not tombstoned.
    pub fn require_task(&self, task_id: TaskId) -> Result<Task> {
        self.get_task(task_id)?
            .filter(|task| task.state.is_visible())
            .ok_or_else(|| Error::task_not_found(task_id))
    }

    /// Save changes to an existing task, stamping `updated_at`.
    pub fn update_task(&self, task: &Task) -> Result<Task> {
        let id = task
            .id
            .ok_or_else(|| Error::validation("id", "cannot update a task without an id"))?;
        validate_task(task)?;

        self.with_conn(|conn| {
            if !update_internal(conn, id, task, now_ms())? {
                return Err(Error::task_not_found(id));
            }
            debug!(task_id = id, state = %task.state, "updated task");
            get_task_internal(conn, id)?.ok_or_else(|| Error::task_not_found(id))
        })
    }

    /// Write a captured snapshot back verbatim, including `updated_at`.
    pub fn restore_task(&self, snapshot: &Task) -> Result<()> {
        let id = snapshot.require_id()?;

        self.with_conn(|conn| {
            if !update_internal(conn, id, snapshot, snapshot.updated_at)? {
                return Err(Error::task_not_found(id));
            }
            debug!(task_id = id, "restored task snapshot");
            Ok(())
        })
    }

    /// Physically delete a task. Its tag links and edges go with it.
    pub fn delete_task(&self, task_id: TaskId) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
            debug!(task_id, deleted = deleted > 0, "deleted task");
            Ok(deleted > 0)
        })
    }

    /// List tasks, optionally filtered by state. Tombstoned tasks are never listed.
    pub fn list_tasks(&self, state: Option<TaskState>) -> Result<Vec<Task>> {
        self.with_conn(|conn| match state {
            Some(TaskState::Tombstoned) => Ok(Vec::new()),
            Some(state) => query_tasks(
                conn,
                &format!("SELECT {} FROM tasks WHERE state = ?1 ORDER BY id", TASK_COLUMNS),
                params![state.as_str()],
            ),
            None => query_tasks(
                conn,
                &format!(
                    "SELECT {} FROM tasks WHERE state != 'tombstoned' ORDER BY id",
                    TASK_COLUMNS
                ),
                [],
            ),
        })
    }

    /// Active, unblocked tasks in ranking order.
    pub fn ranked_actionable(&self) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .list_tasks(Some(TaskState::Active))?
            .into_iter()
            .filter(Task::is_actionable)
            .collect();
        priority::rank(&mut tasks);
        Ok(tasks)
    }

    /// Deferred tasks whose start date has arrived.
    pub fn deferred_due(&self, today: NaiveDate) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            query_tasks(
                conn,
                &format!(
                    "SELECT {} FROM tasks WHERE state = 'deferred'
                     AND start_date IS NOT NULL AND start_date <= ?1 ORDER BY start_date, id",
                    TASK_COLUMNS
                ),
                params![today],
            )
        })
    }

    /// Delegated tasks whose follow-up date has arrived.
    pub fn follow_ups_due(&self, today: NaiveDate) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            query_tasks(
                conn,
                &format!(
                    "SELECT {} FROM tasks WHERE state = 'delegated'
                     AND follow_up_date IS NOT NULL AND follow_up_date <= ?1
                     ORDER BY follow_up_date, id",
                    TASK_COLUMNS
                ),
                params![today],
            )
        })
    }

    /// Count stored rows, tombstoned included.
    pub fn count_task_rows(&self) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?)
        })
    }
}
