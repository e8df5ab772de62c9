//! Parent-category edges.
//!
//! Items carrying the reserved category tag act as categories for every
//! task below them in the parent/child task tree. An edge `P → C` in the
//! tree means "C is a subtask of P".

use std::collections::HashMap;

use chrono::NaiveDate;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;

use crate::error::EngineError;
use crate::model::item::ItemId;
use crate::model::snapshot::Snapshot;
use crate::model::tag::TagId;
use crate::store::{CategoryEdge, EventStore};

// ---------------------------------------------------------------------------
// TaskTree
// ---------------------------------------------------------------------------

/// Parent/child task links as a directed graph.
#[derive(Debug, Default)]
pub struct TaskTree {
    graph: DiGraph<ItemId, ()>,
    node_map: HashMap<ItemId, NodeIndex>,
}

impl TaskTree {
    /// Build the tree from `(parent, child)` links.
    #[must_use]
    pub fn from_links(links: &[(ItemId, ItemId)]) -> Self {
        let mut tree = Self::default();
        for &(parent, child) in links {
            let parent_idx = tree.node(parent);
            let child_idx = tree.node(child);
            if !tree.graph.contains_edge(parent_idx, child_idx) {
                tree.graph.add_edge(parent_idx, child_idx, ());
            }
        }
        tree
    }

    /// Load every stored task link.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the links cannot be read.
    pub fn load<S: EventStore>(store: &S) -> Result<Self, EngineError> {
        Ok(Self::from_links(&store.parent_links()?))
    }

    fn node(&mut self, item: ItemId) -> NodeIndex {
        *self
            .node_map
            .entry(item)
            .or_insert_with(|| self.graph.add_node(item))
    }

    /// Every task transitively below `root`, excluding `root`, in id order.
    ///
    /// Cycles in the source data are tolerated; each item is visited once.
    #[must_use]
    pub fn descendants(&self, root: ItemId) -> Vec<ItemId> {
        let Some(&start) = self.node_map.get(&root) else {
            return Vec::new();
        };
        let mut dfs = Dfs::new(&self.graph, start);
        let mut found = Vec::new();
        while let Some(idx) = dfs.next(&self.graph) {
            let item = self.graph[idx];
            if item != root {
                found.push(item);
            }
        }
        found.sort_unstable();
        found
    }
}

// ---------------------------------------------------------------------------
// Per-day edges
// ---------------------------------------------------------------------------

/// Compute and store one day's `(item, category)` edges.
///
/// Category roots are the items with a snapshot on `day` whose denormalized
/// tags include `category_tag`. Returns the number of edges written.
///
/// # Errors
///
/// Returns [`EngineError::Store`] if reading day edges or writing category
/// edges fails.
pub fn materialize_day<S: EventStore>(
    store: &mut S,
    scope: &str,
    day: NaiveDate,
    category_tag: TagId,
    tree: &TaskTree,
    snapshots: &[Snapshot],
) -> Result<usize, EngineError> {
    let roots: Vec<ItemId> = store
        .day_edges(scope, day)?
        .into_iter()
        .filter(|(item, tag)| {
            *tag == category_tag && snapshots.iter().any(|snap| snap.item_id == *item)
        })
        .map(|(item, _)| item)
        .collect();

    let mut edges = Vec::new();
    for root in roots {
        edges.extend(tree.descendants(root).into_iter().map(|child| (child, root)));
    }
    store.replace_category_edges(scope, day, &edges)?;
    Ok(edges.len())
}

/// Finish a run's category edges: refresh titles from the category items and
/// file each category item under itself on every day it had a snapshot.
///
/// # Errors
///
/// Returns [`EngineError::Store`] on storage failures.
pub fn finalize<S: EventStore>(
    store: &mut S,
    scope: &str,
    from: NaiveDate,
    category_tag: TagId,
) -> Result<usize, EngineError> {
    let refreshed = store.refresh_category_titles(scope, from)?;

    let mut self_edges = Vec::new();
    let mut titles: HashMap<ItemId, String> = HashMap::new();
    let mut tagged_on: HashMap<NaiveDate, Vec<ItemId>> = HashMap::new();
    for snapshot in store.snapshots(scope)? {
        if snapshot.day < from {
            continue;
        }
        if !tagged_on.contains_key(&snapshot.day) {
            let tagged = store
                .day_edges(scope, snapshot.day)?
                .into_iter()
                .filter(|(_, tag)| *tag == category_tag)
                .map(|(item, _)| item)
                .collect();
            tagged_on.insert(snapshot.day, tagged);
        }
        let is_category = tagged_on
            .get(&snapshot.day)
            .is_some_and(|items| items.contains(&snapshot.item_id));
        if !is_category {
            continue;
        }

        if !titles.contains_key(&snapshot.item_id) {
            let title = store
                .item(snapshot.item_id)?
                .map(|item| item.title)
                .unwrap_or_default();
            titles.insert(snapshot.item_id, title);
        }
        self_edges.push(CategoryEdge {
            day: snapshot.day,
            item_id: snapshot.item_id,
            category_id: snapshot.item_id,
            category_title: titles.get(&snapshot.item_id).cloned().unwrap_or_default(),
        });
    }
    store.add_category_edges(scope, &self_edges)?;
    Ok(refreshed + self_edges.len())
}
