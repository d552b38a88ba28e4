//! Owner-scoped task queries: filters ANDed together, then a stable
//! multi-key sort.
//!
//! Filter and sort values come straight off the query string, so parsing
//! here is forgiving — malformed sort tokens and out-of-range priority
//! values drop out silently instead of failing the request.

use crate::store::{StoreError, TaskStore};
use crate::tasks::{Task, TaskStatus, MAX_PRIORITY, MIN_PRIORITY};
use std::cmp::Ordering;
use uuid::Uuid;

/// Restrictions on a task listing. Every present field must match; absent
/// fields impose nothing. Substring matches on title and description are
/// case-insensitive on both sides.
#[derive(Debug, Clone, Default)]
pub struct TaskFilters {
    pub status: Option<TaskStatus>,
    /// Raw query value. Anything that isn't an integer in [1,5] is
    /// dropped from the filter set, not treated as an error.
    pub priority: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    CompletedAt,
    Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortCriterion {
    pub field: SortField,
    pub direction: SortDirection,
}

/// Parse a `sort_by` query value: comma-separated `field` or
/// `field:direction` entries. Unknown fields and directions drop out
/// silently. A missing direction means ascending; direction matching is
/// case-insensitive, field matching is not. Anything after a second
/// colon is ignored.
pub fn parse_sort_by(raw: &str) -> Vec<SortCriterion> {
    let mut criteria = Vec::new();
    for entry in raw.split(',') {
        let mut parts = entry.split(':');
        let field = parts.next().unwrap_or_default();
        let direction = parts.next().unwrap_or("asc").to_lowercase();

        let field = match field {
            "created_at" => SortField::CreatedAt,
            "completed_at" => SortField::CompletedAt,
            "priority" => SortField::Priority,
            _ => continue,
        };
        let direction = match direction.as_str() {
            "asc" => SortDirection::Asc,
            "desc" => SortDirection::Desc,
            _ => continue,
        };

        criteria.push(SortCriterion { field, direction });
    }
    criteria
}

/// All of `owner`'s tasks passing every filter, ordered by `criteria`.
/// Owner scoping is a hard boundary, not a filter — no input widens it.
/// An empty criteria list (none supplied, or all dropped) means newest
/// first, by id descending.
pub fn run(
    store: &TaskStore,
    owner: Uuid,
    filters: &TaskFilters,
    criteria: &[SortCriterion],
) -> Result<Vec<Task>, StoreError> {
    let mut tasks = store.tasks_for_user(owner)?;

    if let Some(status) = filters.status {
        tasks.retain(|t| t.status == status);
    }
    if let Some(priority) = filters.priority.as_deref().and_then(parse_priority) {
        tasks.retain(|t| t.priority == priority);
    }
    if let Some(title) = &filters.title {
        let needle = title.to_lowercase();
        tasks.retain(|t| t.title.to_lowercase().contains(&needle));
    }
    if let Some(description) = &filters.description {
        let needle = description.to_lowercase();
        // A task with no description never matches a description filter
        tasks.retain(|t| match &t.description {
            Some(d) => d.to_lowercase().contains(&needle),
            None => false,
        });
    }

    sort_tasks(&mut tasks, criteria);
    Ok(tasks)
}

fn parse_priority(raw: &str) -> Option<u8> {
    raw.parse::<u8>()
        .ok()
        .filter(|p| (MIN_PRIORITY..=MAX_PRIORITY).contains(p))
}

/// Stable multi-key sort: the first criterion decides, later ones break
/// ties. Rows arrive in id order and the sort is stable, so full ties
/// keep creation order.
fn sort_tasks(tasks: &mut [Task], criteria: &[SortCriterion]) {
    if criteria.is_empty() {
        tasks.sort_by(|a, b| b.id.cmp(&a.id));
        return;
    }

    tasks.sort_by(|a, b| {
        for criterion in criteria {
            let ord = compare(a, b, criterion);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn compare(a: &Task, b: &Task, criterion: &SortCriterion) -> Ordering {
    // Option ordering puts tasks without completed_at first ascending,
    // last descending. Open tasks cluster together either way.
    let ord = match criterion.field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::CompletedAt => a.completed_at.cmp(&b.completed_at),
        SortField::Priority => a.priority.cmp(&b.priority),
    };
    match criterion.direction {
        SortDirection::Asc => ord,
        SortDirection::Desc => ord.reverse(),
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::fs;

    fn temp_store(name: &str) -> (TaskStore, String) {
        let path = format!("/tmp/tasktree_test_query_{name}_{}.redb", std::process::id());
        let _ = fs::remove_file(&path);
        let store = TaskStore::open(&path).unwrap();
        (store, path)
    }

    fn cleanup(path: &str) {
        let _ = fs::remove_file(path);
    }

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn seed(
        store: &TaskStore,
        owner: Uuid,
        id: u64,
        title: &str,
        priority: u8,
        created: i64,
    ) -> Task {
        let task = Task {
            id,
            user_id: owner,
            parent_id: None,
            title: title.to_string(),
            description: None,
            status: TaskStatus::Todo,
            priority,
            created_at: at(created),
            completed_at: None,
        };
        store.put_task(&task).unwrap();
        task
    }

    fn mark_done(store: &TaskStore, mut task: Task, completed: i64) {
        task.status = TaskStatus::Done;
        task.completed_at = Some(at(completed));
        store.put_task(&task).unwrap();
    }

    fn ids(tasks: &[Task]) -> Vec<u64> {
        tasks.iter().map(|t| t.id).collect()
    }

    #[test]
    fn sort_tokens_parse() {
        let criteria = parse_sort_by("priority:desc,created_at");
        assert_eq!(
            criteria,
            vec![
                SortCriterion { field: SortField::Priority, direction: SortDirection::Desc },
                SortCriterion { field: SortField::CreatedAt, direction: SortDirection::Asc },
            ]
        );
    }

    #[test]
    fn sort_direction_case_folds_but_fields_dont() {
        let criteria = parse_sort_by("priority:DESC,Priority:asc");
        assert_eq!(
            criteria,
            vec![SortCriterion { field: SortField::Priority, direction: SortDirection::Desc }]
        );
    }

    #[test]
    fn unknown_sort_tokens_dropped() {
        let criteria = parse_sort_by("foo:asc,priority:sideways,completed_at:desc,");
        assert_eq!(
            criteria,
            vec![SortCriterion { field: SortField::CompletedAt, direction: SortDirection::Desc }]
        );
    }

    #[test]
    fn extra_colon_segments_ignored() {
        let criteria = parse_sort_by("created_at:asc:junk");
        assert_eq!(
            criteria,
            vec![SortCriterion { field: SortField::CreatedAt, direction: SortDirection::Asc }]
        );
    }

    #[test]
    fn default_order_is_newest_first() {
        let (store, path) = temp_store("default_order");
        let owner = Uuid::new_v4();

        seed(&store, owner, 1, "oldest", 5, 0);
        seed(&store, owner, 2, "middle", 5, 10);
        seed(&store, owner, 3, "newest", 5, 20);

        let tasks = run(&store, owner, &TaskFilters::default(), &[]).unwrap();
        assert_eq!(ids(&tasks), vec![3, 2, 1]);

        // All tokens dropped ends up the same place
        let tasks = run(
            &store,
            owner,
            &TaskFilters::default(),
            &parse_sort_by("foo:asc,bar:desc"),
        )
        .unwrap();
        assert_eq!(ids(&tasks), vec![3, 2, 1]);

        cleanup(&path);
    }

    #[test]
    fn priority_desc_then_created_at_asc() {
        let (store, path) = temp_store("multi_key");
        let owner = Uuid::new_v4();

        seed(&store, owner, 1, "p3 late", 3, 30);
        seed(&store, owner, 2, "p5 early", 5, 0);
        seed(&store, owner, 3, "p3 early", 3, 10);
        seed(&store, owner, 4, "p5 late", 5, 20);

        let tasks = run(
            &store,
            owner,
            &TaskFilters::default(),
            &parse_sort_by("priority:desc,created_at:asc"),
        )
        .unwrap();

        // Priority bands first, creation time inside each band
        assert_eq!(ids(&tasks), vec![2, 4, 3, 1]);

        cleanup(&path);
    }

    #[test]
    fn full_ties_keep_creation_order() {
        let (store, path) = temp_store("stable");
        let owner = Uuid::new_v4();

        // Same priority, same timestamp — only id order can separate them
        seed(&store, owner, 1, "a", 2, 5);
        seed(&store, owner, 2, "b", 2, 5);
        seed(&store, owner, 3, "c", 2, 5);

        let tasks = run(
            &store,
            owner,
            &TaskFilters::default(),
            &parse_sort_by("priority:asc,created_at:asc"),
        )
        .unwrap();
        assert_eq!(ids(&tasks), vec![1, 2, 3]);

        cleanup(&path);
    }

    #[test]
    fn completed_at_sort_places_missing_first() {
        let (store, path) = temp_store("completed_sort");
        let owner = Uuid::new_v4();

        let done_late = seed(&store, owner, 1, "done late", 5, 0);
        mark_done(&store, done_late, 50);
        seed(&store, owner, 2, "open", 5, 0);
        let done_early = seed(&store, owner, 3, "done early", 5, 0);
        mark_done(&store, done_early, 40);

        let tasks = run(
            &store,
            owner,
            &TaskFilters::default(),
            &parse_sort_by("completed_at:asc"),
        )
        .unwrap();
        assert_eq!(ids(&tasks), vec![2, 3, 1]);

        let tasks = run(
            &store,
            owner,
            &TaskFilters::default(),
            &parse_sort_by("completed_at:desc"),
        )
        .unwrap();
        assert_eq!(ids(&tasks), vec![1, 3, 2]);

        cleanup(&path);
    }

    #[test]
    fn priority_filter_matches_exactly() {
        let (store, path) = temp_store("priority_filter");
        let owner = Uuid::new_v4();

        seed(&store, owner, 1, "wash up", 3, 0);
        seed(&store, owner, 2, "taxes", 5, 10);

        let filters = TaskFilters { priority: Some("3".to_string()), ..Default::default() };
        let tasks = run(&store, owner, &filters, &[]).unwrap();
        assert_eq!(ids(&tasks), vec![1]);

        cleanup(&path);
    }

    #[test]
    fn malformed_priority_filter_dropped() {
        let (store, path) = temp_store("priority_junk");
        let owner = Uuid::new_v4();

        seed(&store, owner, 1, "one", 1, 0);
        seed(&store, owner, 2, "two", 5, 10);

        for junk in ["7", "0", "abc", "-1", ""] {
            let filters = TaskFilters { priority: Some(junk.to_string()), ..Default::default() };
            let tasks = run(&store, owner, &filters, &[]).unwrap();
            assert_eq!(ids(&tasks), vec![2, 1], "priority filter {junk:?} should be dropped");
        }

        cleanup(&path);
    }

    #[test]
    fn status_filter() {
        let (store, path) = temp_store("status_filter");
        let owner = Uuid::new_v4();

        seed(&store, owner, 1, "open", 5, 0);
        let done = seed(&store, owner, 2, "closed", 5, 10);
        mark_done(&store, done, 20);

        let filters = TaskFilters { status: Some(TaskStatus::Done), ..Default::default() };
        assert_eq!(ids(&run(&store, owner, &filters, &[]).unwrap()), vec![2]);

        let filters = TaskFilters { status: Some(TaskStatus::Todo), ..Default::default() };
        assert_eq!(ids(&run(&store, owner, &filters, &[]).unwrap()), vec![1]);

        cleanup(&path);
    }

    #[test]
    fn substring_filters_ignore_case() {
        let (store, path) = temp_store("substring");
        let owner = Uuid::new_v4();

        seed(&store, owner, 1, "Buy groceries", 5, 0);
        let mut with_desc = seed(&store, owner, 2, "Chores", 5, 10);
        with_desc.description = Some("Vacuum the Living Room".to_string());
        store.put_task(&with_desc).unwrap();

        let filters = TaskFilters { title: Some("GROC".to_string()), ..Default::default() };
        assert_eq!(ids(&run(&store, owner, &filters, &[]).unwrap()), vec![1]);

        let filters = TaskFilters { description: Some("living".to_string()), ..Default::default() };
        assert_eq!(ids(&run(&store, owner, &filters, &[]).unwrap()), vec![2]);

        // No description means no match, not a wildcard
        let filters = TaskFilters { description: Some("".to_string()), ..Default::default() };
        assert_eq!(ids(&run(&store, owner, &filters, &[]).unwrap()), vec![2]);

        cleanup(&path);
    }

    #[test]
    fn filters_combine_with_and() {
        let (store, path) = temp_store("and");
        let owner = Uuid::new_v4();

        seed(&store, owner, 1, "errand one", 2, 0);
        seed(&store, owner, 2, "errand two", 4, 10);
        let done = seed(&store, owner, 3, "errand three", 2, 20);
        mark_done(&store, done, 30);

        let filters = TaskFilters {
            status: Some(TaskStatus::Todo),
            priority: Some("2".to_string()),
            title: Some("errand".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&run(&store, owner, &filters, &[]).unwrap()), vec![1]);

        cleanup(&path);
    }

    #[test]
    fn owner_scope_cannot_be_widened() {
        let (store, path) = temp_store("scope");
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        seed(&store, alice, 1, "hers", 5, 0);
        seed(&store, bob, 2, "his", 5, 10);

        let tasks = run(&store, alice, &TaskFilters::default(), &[]).unwrap();
        assert_eq!(ids(&tasks), vec![1]);

        // A filter that matches the other user's task changes nothing
        let filters = TaskFilters { title: Some("his".to_string()), ..Default::default() };
        assert!(run(&store, alice, &filters, &[]).unwrap().is_empty());

        cleanup(&path);
    }
}
