//! Dependency operations and cycle detection.

use super::Database;
use crate::error::{Error, Result};
use crate::types::{Dependency, TaskId};
use rusqlite::{params, Connection, Row};
use std::collections::{HashMap, HashSet};
use tracing::debug;

fn parse_dependency_row(row: &Row) -> rusqlite::Result<Dependency> {
    Ok(Dependency {
        id: row.get(0)?,
        blocked_task_id: row.get(1)?,
        blocking_task_id: row.get(2)?,
    })
}

fn query_dependencies(conn: &Connection, sql: &str, task_id: TaskId) -> Result<Vec<Dependency>> {
    let mut stmt = conn.prepare(sql)?;
    let deps = stmt
        .query_map(params![task_id], parse_dependency_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(deps)
}

/// Tombstoned rows count as absent.
fn task_exists(conn: &Connection, task_id: TaskId) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tasks WHERE id = ?1 AND state != 'tombstoned'",
        params![task_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn get_by_pair(conn: &Connection, blocked: TaskId, blocking: TaskId) -> Result<Option<Dependency>> {
    let result = conn.query_row(
        "SELECT id, blocked_task_id, blocking_task_id FROM dependencies
         WHERE blocked_task_id = ?1 AND blocking_task_id = ?2",
        params![blocked, blocking],
        parse_dependency_row,
    );
    match result {
        Ok(dep) => Ok(Some(dep)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// "Depends on" adjacency: blocked task -> its blocking tasks.
fn depends_on_map(conn: &Connection) -> Result<HashMap<TaskId, Vec<TaskId>>> {
    let mut stmt = conn.prepare("SELECT blocked_task_id, blocking_task_id FROM dependencies")?;
    let mut map: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
    let rows = stmt.query_map([], |row| Ok((row.get::<_, TaskId>(0)?, row.get::<_, TaskId>(1)?)))?;
    for row in rows {
        let (blocked, blocking) = row?;
        map.entry(blocked).or_default().push(blocking);
    }
    Ok(map)
}

/// Whether `target` is reachable from `start` along "depends on" edges.
///
/// Iterative depth-first search with one visited set for the whole walk:
/// a node reached through a second branch of a diamond is not expanded again.
pub fn reaches(graph: &HashMap<TaskId, Vec<TaskId>>, start: TaskId, target: TaskId) -> bool {
    let mut visited: HashSet<TaskId> = HashSet::new();
    let mut stack = vec![start];

    while let Some(current) = stack.pop() {
        if current == target {
            return true;
        }
        if !visited.insert(current) {
            continue;
        }
        if let Some(next) = graph.get(&current) {
            stack.extend(next.iter().copied().filter(|n| !visited.contains(n)));
        }
    }

    false
}

/// Checks run before an edge is inserted or restored.
fn check_insertable(conn: &Connection, blocked: TaskId, blocking: TaskId) -> Result<()> {
    if blocked == blocking {
        return Err(Error::validation("blocking_task_id", "a task cannot block itself"));
    }
    for id in [blocked, blocking] {
        if !task_exists(conn, id)? {
            return Err(Error::task_not_found(id));
        }
    }
    let graph = depends_on_map(conn)?;
    if reaches(&graph, blocking, blocked) {
        return Err(Error::CycleDetected { blocked, blocking });
    }
    Ok(())
}

impl Database {
    /// Add "`blocked` is blocked by `blocking`".
    ///
    /// Fails with `CycleDetected` when `blocking` already depends, directly or
    /// transitively, on `blocked`; the graph is left untouched. Adding an
    /// existing edge returns the stored record.
    pub fn create_dependency(&self, blocked: TaskId, blocking: TaskId) -> Result<Dependency> {
        self.with_conn(|conn| {
            if let Some(existing) = get_by_pair(conn, blocked, blocking)? {
                return Ok(existing);
            }
            check_insertable(conn, blocked, blocking)?;

            conn.execute(
                "INSERT INTO dependencies (blocked_task_id, blocking_task_id) VALUES (?1, ?2)",
                params![blocked, blocking],
            )?;
            let dep = Dependency {
                id: conn.last_insert_rowid(),
                blocked_task_id: blocked,
                blocking_task_id: blocking,
            };
            debug!(dependency_id = dep.id, blocked, blocking, "created dependency");
            Ok(dep)
        })
    }

    /// Re-insert a removed edge under its original id.
    ///
    /// Runs the same checks as [`Database::create_dependency`], so an edge
    /// that would now close a cycle fails with `CycleDetected`.
    pub fn restore_dependency(&self, dep: &Dependency) -> Result<()> {
        self.with_conn(|conn| {
            check_insertable(conn, dep.blocked_task_id, dep.blocking_task_id)?;
            conn.execute(
                "INSERT INTO dependencies (id, blocked_task_id, blocking_task_id) VALUES (?1, ?2, ?3)",
                params![dep.id, dep.blocked_task_id, dep.blocking_task_id],
            )?;
            debug!(dependency_id = dep.id, "restored dependency");
            Ok(())
        })
    }

    /// Whether `task` depends, directly or transitively, on `other`.
    pub fn depends_transitively_on(&self, task: TaskId, other: TaskId) -> Result<bool> {
        self.with_conn(|conn| {
            let graph = depends_on_map(conn)?;
            Ok(task != other && reaches(&graph, task, other))
        })
    }

    /// Remove a dependency by id.
    pub fn delete_dependency(&self, dependency_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM dependencies WHERE id = ?1",
                params![dependency_id],
            )?;
            Ok(deleted > 0)
        })
    }

    /// Remove the edge between two tasks.
    pub fn delete_dependency_by_pair(&self, blocked: TaskId, blocking: TaskId) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM dependencies WHERE blocked_task_id = ?1 AND blocking_task_id = ?2",
                params![blocked, blocking],
            )?;
            Ok(deleted > 0)
        })
    }

    /// Get the edge between two tasks.
    pub fn get_dependency_by_pair(&self, blocked: TaskId, blocking: TaskId) -> Result<Option<Dependency>> {
        self.with_conn(|conn| get_by_pair(conn, blocked, blocking))
    }

    /// Edges naming the tasks that block `task_id`.
    pub fn dependencies_for(&self, task_id: TaskId) -> Result<Vec<Dependency>> {
        self.with_conn(|conn| {
            query_dependencies(
                conn,
                "SELECT id, blocked_task_id, blocking_task_id FROM dependencies
                 WHERE blocked_task_id = ?1 ORDER BY id",
                task_id,
            )
        })
    }

    /// Edges naming the tasks that `task_id` blocks.
    pub fn blockers_of(&self, task_id: TaskId) -> Result<Vec<Dependency>> {
        self.with_conn(|conn| {
            query_dependencies(
                conn,
                "SELECT id, blocked_task_id, blocking_task_id FROM dependencies
                 WHERE blocking_task_id = ?1 ORDER BY id",
                task_id,
            )
        })
    }

    /// Every edge touching `task_id` on either side.
    pub fn dependencies_touching(&self, task_id: TaskId) -> Result<Vec<Dependency>> {
        self.with_conn(|conn| {
            query_dependencies(
                conn,
                "SELECT id, blocked_task_id, blocking_task_id FROM dependencies
                 WHERE blocked_task_id = ?1 OR blocking_task_id = ?1 ORDER BY id",
                task_id,
            )
        })
    }

    /// Get all dependencies.
    pub fn all_dependencies(&self) -> Result<Vec<Dependency>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, blocked_task_id, blocking_task_id FROM dependencies ORDER BY id",
            )?;
            let deps = stmt
                .query_map([], parse_dependency_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(deps)
        })
    }

    /// Remove every edge where `blocking` is the blocker and return the removed records.
    pub fn release_dependents(&self, blocking: TaskId) -> Result<Vec<Dependency>> {
        let removed = self.blockers_of(blocking)?;
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM dependencies WHERE blocking_task_id = ?1",
                params![blocking],
            )?;
            Ok(())
        })?;
        debug!(blocking, released = removed.len(), "released dependents");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(TaskId, TaskId)]) -> HashMap<TaskId, Vec<TaskId>> {
        let mut map: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for (blocked, blocking) in edges {
            map.entry(*blocked).or_default().push(*blocking);
        }
        map
    }

    #[test]
    fn reaches_follows_transitive_edges() {
        let g = graph(&[(1, 2), (2, 3)]);
        assert!(reaches(&g, 1, 3));
        assert!(!reaches(&g, 3, 1));
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        // 1 depends on 2 and 3, both depend on 4.
        let g = graph(&[(1, 2), (1, 3), (2, 4), (3, 4)]);
        assert!(reaches(&g, 1, 4));
        assert!(!reaches(&g, 4, 1));
        assert!(!reaches(&g, 2, 3));
    }

    #[test]
    fn terminates_on_existing_cycles() {
        let g = graph(&[(1, 2), (2, 1)]);
        assert!(!reaches(&g, 1, 5));
    }
}
