use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::{Department, DepartmentId};

/// How far below the root departments the resolver walks.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyMode {
    /// Direct children of the roots only.
    #[default]
    Children,
    /// Every department reachable below the roots.
    Descendants,
}

pub fn resolve(departments: &[Department], root_title: &str, mode: HierarchyMode) -> Vec<DepartmentId> {
    match mode {
        HierarchyMode::Children => resolve_children(departments, root_title),
        HierarchyMode::Descendants => resolve_descendants(departments, root_title),
    }
}

/// Ids of the departments whose parent is one of the departments titled `root_title`.
///
/// Titles are not unique, so every matching department counts as a root. Grandchildren are
/// not included. The result keeps the input order, which makes it stable for identical input.
pub fn resolve_children(departments: &[Department], root_title: &str) -> Vec<DepartmentId> {
    let roots = root_ids(departments, root_title);
    let mut seen = HashSet::new();
    departments
        .iter()
        .filter(|d| d.parent_id.as_ref().is_some_and(|p| roots.contains(p)))
        .filter(|d| seen.insert(d.id.clone()))
        .map(|d| d.id.clone())
        .collect()
}

/// Breadth-first walk of the whole subtree under every root titled `root_title`.
///
/// Roots themselves are excluded. Parent links that form a cycle are visited once.
pub fn resolve_descendants(departments: &[Department], root_title: &str) -> Vec<DepartmentId> {
    let mut children: HashMap<&DepartmentId, Vec<&DepartmentId>> = HashMap::new();
    for d in departments {
        if let Some(parent) = &d.parent_id {
            children.entry(parent).or_default().push(&d.id);
        }
    }

    let roots = root_ids(departments, root_title);
    let mut visited: HashSet<&DepartmentId> = roots.iter().collect();
    let mut pending: VecDeque<&DepartmentId> = departments
        .iter()
        .filter(|d| d.title == root_title)
        .map(|d| &d.id)
        .collect();
    let mut out = vec![];

    while let Some(id) = pending.pop_front() {
        for &child in children.get(id).into_iter().flatten() {
            if visited.insert(child) {
                out.push(child.clone());
                pending.push_back(child);
            }
        }
    }
    out
}

fn root_ids(departments: &[Department], root_title: &str) -> HashSet<DepartmentId> {
    departments
        .iter()
        .filter(|d| d.title == root_title)
        .map(|d| d.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(id: &str, title: &str, parent: Option<&str>) -> Department {
        Department {
            id: DepartmentId::from_str(id),
            title: title.to_string(),
            parent_id: parent.map(DepartmentId::from_str),
        }
    }

    fn ids(v: &[DepartmentId]) -> Vec<&str> {
        v.iter().map(|d| d.as_str()).collect()
    }

    fn tree() -> Vec<Department> {
        vec![
            dep("1", "Project Name", None),
            dep("2", "Customer 2", Some("1")),
            dep("3", "Customer 3", Some("1")),
            dep("5", "Team 5", Some("3")),
            dep("4", "Customer 4", Some("1")),
            dep("6", "Other", None),
            dep("7", "Other child", Some("6")),
        ]
    }

    #[test]
    fn children_of_single_root() {
        let out = resolve_children(&tree(), "Project Name");
        assert_eq!(ids(&out), vec!["2", "3", "4"]);
    }

    #[test]
    fn grandchildren_are_excluded() {
        let out = resolve_children(&tree(), "Project Name");
        assert!(!out.contains(&DepartmentId::from_str("5")));
    }

    #[test]
    fn duplicate_root_titles_are_all_roots() {
        let mut deps = tree();
        deps.push(dep("8", "Project Name", None));
        deps.push(dep("9", "Customer 9", Some("8")));
        let out = resolve_children(&deps, "Project Name");
        assert_eq!(ids(&out), vec!["2", "3", "4", "9"]);
    }

    #[test]
    fn unknown_root_yields_empty() {
        assert!(resolve_children(&tree(), "Nope").is_empty());
        assert!(resolve_descendants(&tree(), "Nope").is_empty());
    }

    #[test]
    fn children_are_stable_across_calls() {
        let deps = tree();
        assert_eq!(resolve_children(&deps, "Project Name"), resolve_children(&deps, "Project Name"));
    }

    #[test]
    fn descendants_walk_full_depth() {
        let out = resolve_descendants(&tree(), "Project Name");
        assert_eq!(ids(&out), vec!["2", "3", "4", "5"]);
    }

    #[test]
    fn descendants_survive_cycles() {
        let deps = vec![
            dep("1", "Root", None),
            dep("2", "A", Some("1")),
            dep("3", "B", Some("2")),
            dep("2", "A again", Some("3")),
        ];
        let out = resolve_descendants(&deps, "Root");
        assert_eq!(ids(&out), vec!["2", "3"]);
    }

    #[test]
    fn mode_dispatches() {
        assert_eq!(resolve(&tree(), "Project Name", HierarchyMode::Children).len(), 3);
        assert_eq!(resolve(&tree(), "Project Name", HierarchyMode::Descendants).len(), 4);
    }
}
