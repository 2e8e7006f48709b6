// file: src/models/toc.rs
// description: table-of-contents assembly over a flat page list
// reference: arena + index tree construction

use crate::models::page::{Importance, Page, PageType};
use crate::models::repository::Repository;
use crate::models::timestamp;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TocEntry {
    pub page_id: String,
    pub title: String,
    pub page_type: PageType,
    pub importance: Importance,
    pub children: Vec<TocEntry>,
}

impl TocEntry {
    fn from_page(page: &Page, children: Vec<TocEntry>) -> Self {
        Self {
            page_id: page.page_id.clone(),
            title: page.title.clone(),
            page_type: page.page_type,
            importance: page.importance,
            children,
        }
    }

    /// Entries in this subtree, this one included.
    pub fn count(&self) -> usize {
        let mut total = 0;
        let mut pending = vec![self];
        while let Some(entry) = pending.pop() {
            total += 1;
            pending.extend(entry.children.iter());
        }
        total
    }
}

// Nested children are released from a worklist so deep chains do not recurse.
impl Drop for TocEntry {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut entry) = pending.pop() {
            pending.append(&mut entry.children);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableOfContents {
    pub repository_id: String,
    pub repository_name: String,
    pub roots: Vec<TocEntry>,
    /// Non-archived pages in the tree.
    pub total_pages: usize,
    /// Newest `updated_at` among those pages.
    #[serde(with = "timestamp::option")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Pages whose parent chain loops back on itself. They are listed as roots.
    pub cycles: Vec<String>,
}

impl TableOfContents {
    /// Build the forest from `parent_page` links. Archived pages are left out;
    /// a page whose parent is missing or archived becomes a root.
    pub fn build(pages: &[Page]) -> Self {
        let nodes: Vec<&Page> = pages.iter().filter(|page| page.is_visible()).collect();
        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, page)| (page.page_id.as_str(), i))
            .collect();

        let mut parent: Vec<Option<usize>> = nodes
            .iter()
            .map(|page| {
                page.parent_page
                    .as_deref()
                    .and_then(|id| index.get(id).copied())
            })
            .collect();

        let in_cycle = find_cycles(&parent);
        for (i, looped) in in_cycle.iter().enumerate() {
            if *looped {
                parent[i] = None;
            }
        }

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        let mut roots = Vec::new();
        for (i, link) in parent.iter().enumerate() {
            match link {
                Some(p) => children[*p].push(i),
                None => roots.push(i),
            }
        }

        let order = |list: &mut Vec<usize>| {
            list.sort_by(|a, b| {
                let (a, b) = (nodes[*a], nodes[*b]);
                a.importance
                    .cmp(&b.importance)
                    .then_with(|| a.title.cmp(&b.title))
                    .then_with(|| a.page_id.cmp(&b.page_id))
            })
        };
        order(&mut roots);
        for list in children.iter_mut() {
            order(list);
        }

        let mut cycles: Vec<String> = in_cycle
            .iter()
            .enumerate()
            .filter(|(_, looped)| **looped)
            .map(|(i, _)| nodes[i].page_id.clone())
            .collect();
        cycles.sort();

        let mut built: Vec<Option<TocEntry>> = vec![None; nodes.len()];
        Self {
            repository_id: String::new(),
            repository_name: String::new(),
            roots: roots
                .iter()
                .filter_map(|&i| assemble(i, &nodes, &children, &mut built))
                .collect(),
            total_pages: nodes.len(),
            last_updated: nodes.iter().map(|page| page.updated_at).max(),
            cycles,
        }
    }

    /// Label the tree with the repository it was built for.
    pub fn with_repository(mut self, repository: &Repository) -> Self {
        self.repository_id = repository.id.clone();
        self.repository_name = repository.display_name.clone();
        self
    }

    pub fn page_count(&self) -> usize {
        self.roots.iter().map(TocEntry::count).sum()
    }
}

/// Mark every node that sits on a parent cycle. Each node is walked at most
/// once; a walk stops at the first node already resolved.
fn find_cycles(parent: &[Option<usize>]) -> Vec<bool> {
    const UNSEEN: u8 = 0;
    const ON_PATH: u8 = 1;
    const DONE: u8 = 2;

    let mut state = vec![UNSEEN; parent.len()];
    let mut in_cycle = vec![false; parent.len()];

    for start in 0..parent.len() {
        let mut path = Vec::new();
        let mut current = Some(start);

        while let Some(node) = current {
            match state[node] {
                DONE => break,
                ON_PATH => {
                    if let Some(pos) = path.iter().position(|&n| n == node) {
                        for &member in &path[pos..] {
                            in_cycle[member] = true;
                        }
                    }
                    break;
                }
                _ => {
                    state[node] = ON_PATH;
                    path.push(node);
                    current = parent[node];
                }
            }
        }

        for node in path {
            state[node] = DONE;
        }
    }

    in_cycle
}

/// Build the subtree under `root` in post-order with an explicit stack.
/// `children` must be acyclic, which the cycle pass guarantees.
fn assemble(
    root: usize,
    nodes: &[&Page],
    children: &[Vec<usize>],
    built: &mut [Option<TocEntry>],
) -> Option<TocEntry> {
    let mut stack = vec![(root, false)];
    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            let kids = children[node]
                .iter()
                .filter_map(|&child| built[child].take())
                .collect();
            built[node] = Some(TocEntry::from_page(nodes[node], kids));
        } else {
            stack.push((node, true));
            stack.extend(children[node].iter().rev().map(|&child| (child, false)));
        }
    }
    built[root].take()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::page::{NewPage, PageStatus};
    use chrono::Duration;

    fn page(path: &str, title: &str, parent: Option<&Page>) -> Page {
        let mut draft = NewPage::new("repo-1", path, title, "");
        draft.parent_page = parent.map(|p| p.page_id.clone());
        draft.into_page().unwrap()
    }

    #[test]
    fn test_builds_nested_tree_in_importance_order() {
        let readme = page("README.md", "Overview", None);
        let util = page("lib/util.rs", "Utilities", Some(&readme));
        let server = page("src/server.rs", "Server", Some(&readme));
        let helper = page("lib/helper.rs", "Helper", Some(&util));

        let toc = TableOfContents::build(&[helper, util, server, readme]);

        assert_eq!(toc.roots.len(), 1);
        let root = &toc.roots[0];
        assert_eq!(root.title, "Overview");
        let titles: Vec<&str> = root.children.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Server", "Utilities"]);
        assert_eq!(root.children[1].children[0].title, "Helper");
        assert_eq!(toc.page_count(), 4);
        assert!(toc.cycles.is_empty());
    }

    #[test]
    fn test_missing_parent_becomes_root() {
        let mut orphan = page("lib/a.rs", "A", None);
        orphan.parent_page = Some("page-repo-1-deadbeef".to_string());
        let toc = TableOfContents::build(&[orphan]);
        assert_eq!(toc.roots.len(), 1);
    }

    #[test]
    fn test_cycle_terminates_and_is_reported() {
        let mut a = page("lib/a.rs", "A", None);
        let mut b = page("lib/b.rs", "B", None);
        let c = page("lib/c.rs", "C", Some(&b));
        a.parent_page = Some(b.page_id.clone());
        b.parent_page = Some(a.page_id.clone());

        let mut expected = vec![a.page_id.clone(), b.page_id.clone()];
        expected.sort();

        let toc = TableOfContents::build(&[a, b, c]);
        assert_eq!(toc.cycles, expected);
        assert_eq!(toc.roots.len(), 2);
        assert_eq!(toc.page_count(), 3);
    }

    #[test]
    fn test_self_parent_is_a_cycle() {
        let mut a = page("lib/a.rs", "A", None);
        a.parent_page = Some(a.page_id.clone());
        let toc = TableOfContents::build(&[a]);
        assert_eq!(toc.cycles.len(), 1);
        assert_eq!(toc.roots.len(), 1);
    }

    #[test]
    fn test_archived_pages_are_hidden() {
        let readme = page("README.md", "Overview", None);
        let mut old = page("lib/old.rs", "Old", Some(&readme));
        old.status = PageStatus::Archived;
        old.updated_at = readme.updated_at + Duration::hours(1);
        let newest = readme.updated_at;
        let toc = TableOfContents::build(&[readme, old]);
        assert_eq!(toc.page_count(), 1);
        assert_eq!(toc.total_pages, 1);
        assert_eq!(toc.last_updated, Some(newest));
    }

    #[test]
    fn test_summary_fields() {
        let mut readme = page("README.md", "Overview", None);
        let mut guide = page("docs/guide.md", "Guide", Some(&readme));
        readme.updated_at = guide.updated_at - Duration::minutes(5);
        guide.updated_at = readme.updated_at + Duration::minutes(10);
        let newest = guide.updated_at;

        let toc = TableOfContents::build(&[readme, guide]);
        assert_eq!(toc.total_pages, 2);
        assert_eq!(toc.last_updated, Some(newest));

        let empty = TableOfContents::build(&[]);
        assert_eq!(empty.total_pages, 0);
        assert_eq!(empty.last_updated, None);
        assert!(empty.roots.is_empty());
    }

    #[test]
    fn test_deep_parent_chain_builds_without_recursion() {
        let depth = 20_000;
        let mut pages: Vec<Page> = Vec::with_capacity(depth);
        for i in 0..depth {
            let mut next = page(&format!("docs/level-{}.md", i), &format!("Level {}", i), None);
            next.page_id = format!("page-{}", i);
            next.parent_page = i.checked_sub(1).map(|parent| format!("page-{}", parent));
            pages.push(next);
        }

        let toc = TableOfContents::build(&pages);
        assert_eq!(toc.roots.len(), 1);
        assert_eq!(toc.page_count(), depth);
        assert_eq!(toc.total_pages, depth);
        assert!(toc.cycles.is_empty());
    }
}
