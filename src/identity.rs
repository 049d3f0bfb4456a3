// 🔗 Identity Union-Merger
// Union-find over interned link keys. Base rows seed groups with their own
// row ids; non-base rows only connect keys. Merging two groups repoints every
// alias at once because lookups always go through the root.

use crate::error::Result;
use crate::progress::ProgressTracker;
use crate::record::PlatformRecords;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Default delimiter between atomic ids in a rendered CanonicalID
pub const DEFAULT_ID_DELIMITER: &str = " + ";

// ============================================================================
// CANONICAL ID
// ============================================================================

/// Deduplicated, order-stable union of base-platform row ids
///
/// Components are ordered by the position of the first base row that
/// contributed them, independent of the order merges happened in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CanonicalId {
    components: Vec<String>,
}

impl CanonicalId {
    pub fn from_components<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut canonical = CanonicalId::default();
        for component in components {
            let component = component.into();
            if !component.is_empty() && !canonical.components.contains(&component) {
                canonical.components.push(component);
            }
        }
        canonical
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn contains(&self, row_id: &str) -> bool {
        self.components.iter().any(|c| c == row_id)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn render(&self, delimiter: &str) -> String {
        self.components.join(delimiter)
    }
}

// ============================================================================
// KEY IDENTITY MAP (frozen result)
// ============================================================================

/// One connected group of identity keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityGroup {
    /// Base row ids seeded into this group; empty when only non-base rows
    /// ever touched it
    pub canonical: CanonicalId,

    /// Representative key: the smallest primary key, else the smallest key
    pub anchor_key: String,

    /// Anchor was seen as a primary key (an email, not an order number)
    pub anchor_is_primary: bool,
}

impl IdentityGroup {
    pub fn is_seeded(&self) -> bool {
        !self.canonical.is_empty()
    }
}

/// IdentityKey → group, read-only after the merger completes
#[derive(Debug, Clone, Default)]
pub struct KeyIdentityMap {
    key_groups: HashMap<String, usize>,
    groups: Vec<IdentityGroup>,
}

impl KeyIdentityMap {
    /// Group a key belongs to, seeded or not
    pub fn group(&self, key: &str) -> Option<&IdentityGroup> {
        self.key_groups.get(key).map(|&g| &self.groups[g])
    }

    /// CanonicalID for a key; None when the key is unknown or its group
    /// holds no base row id
    pub fn resolve(&self, key: &str) -> Option<&CanonicalId> {
        self.group(key)
            .filter(|group| group.is_seeded())
            .map(|group| &group.canonical)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.key_groups.contains_key(key)
    }

    pub fn groups(&self) -> &[IdentityGroup] {
        &self.groups
    }

    pub fn key_count(&self) -> usize {
        self.key_groups.len()
    }

    /// Groups whose CanonicalID joins more than one base row id
    pub fn merged_count(&self) -> usize {
        self.groups.iter().filter(|g| g.canonical.len() > 1).count()
    }
}

// ============================================================================
// IDENTITY GRAPH (mutable union-find)
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct IdentityGraph {
    nodes: HashMap<String, usize>,
    key_names: Vec<String>,
    seen_as_primary: Vec<bool>,
    parent: Vec<usize>,
    rank: Vec<u8>,
    /// At roots: sorted seed positions of the group
    members: Vec<Vec<usize>>,
    /// Seed position (base row order) → row id
    seed_ids: Vec<String>,
}

impl IdentityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node for a key, creating a singleton group on first sight
    pub fn intern(&mut self, key: &str, is_primary: bool) -> usize {
        if let Some(&node) = self.nodes.get(key) {
            if is_primary {
                self.seen_as_primary[node] = true;
            }
            return node;
        }

        let node = self.key_names.len();
        self.nodes.insert(key.to_string(), node);
        self.key_names.push(key.to_string());
        self.seen_as_primary.push(is_primary);
        self.parent.push(node);
        self.rank.push(0);
        self.members.push(Vec::new());
        node
    }

    /// Root of a node's group (path halving)
    pub fn find(&mut self, mut node: usize) -> usize {
        while self.parent[node] != node {
            let grandparent = self.parent[self.parent[node]];
            self.parent[node] = grandparent;
            node = grandparent;
        }
        node
    }

    /// Merge two groups; the survivor holds the union of both seed sets
    pub fn union(&mut self, a: usize, b: usize) -> usize {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return root_a;
        }

        let (winner, loser) = match self.rank[root_a].cmp(&self.rank[root_b]) {
            std::cmp::Ordering::Less => (root_b, root_a),
            std::cmp::Ordering::Greater => (root_a, root_b),
            std::cmp::Ordering::Equal => {
                self.rank[root_a] += 1;
                (root_a, root_b)
            }
        };

        self.parent[loser] = winner;
        let absorbed = std::mem::take(&mut self.members[loser]);
        let kept = std::mem::take(&mut self.members[winner]);
        self.members[winner] = merge_sorted(kept, absorbed);
        winner
    }

    /// Add a base row's id to the group containing `node`
    pub fn seed(&mut self, node: usize, row_id: &str) {
        let position = self.seed_ids.len();
        self.seed_ids.push(row_id.to_string());
        let root = self.find(node);
        // Seed positions only grow, so push keeps the set sorted
        self.members[root].push(position);
    }

    /// Sub-pass A: every base row joins its keys and seeds its own row id
    pub fn seed_from_base(
        &mut self,
        base: &PlatformRecords,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<()> {
        for record in &base.records {
            tracker.step()?;

            let Some(node) = self.link_keys(&record.primary_key, &record.secondary_key) else {
                continue;
            };
            if !record.row_id.is_empty() {
                self.seed(node, &record.row_id);
            }
        }

        debug!(
            platform = %base.platform.name,
            keys = self.key_names.len(),
            "seeded identities from base platform"
        );
        Ok(())
    }

    /// Sub-pass B: non-base rows connect their keys but never seed ids
    pub fn propagate_from(
        &mut self,
        platform: &PlatformRecords,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<()> {
        for record in &platform.records {
            tracker.step()?;
            self.link_keys(&record.primary_key, &record.secondary_key);
        }

        debug!(
            platform = %platform.platform.name,
            keys = self.key_names.len(),
            "propagated identities from non-base platform"
        );
        Ok(())
    }

    fn link_keys(&mut self, primary: &str, secondary: &str) -> Option<usize> {
        let primary_node = (!primary.is_empty()).then(|| self.intern(primary, true));
        let secondary_node = (!secondary.is_empty()).then(|| self.intern(secondary, false));

        match (primary_node, secondary_node) {
            (Some(p), Some(s)) => Some(self.union(p, s)),
            (Some(node), None) | (None, Some(node)) => Some(node),
            (None, None) => None,
        }
    }

    /// Freeze into a read-only KeyIdentityMap
    pub fn into_identity_map(mut self) -> KeyIdentityMap {
        let mut group_of_root: HashMap<usize, usize> = HashMap::new();
        let mut groups: Vec<IdentityGroup> = Vec::new();
        let mut key_groups = HashMap::with_capacity(self.key_names.len());

        for node in 0..self.key_names.len() {
            let root = self.find(node);

            let group = match group_of_root.get(&root) {
                Some(&group) => group,
                None => {
                    let canonical = CanonicalId::from_components(
                        self.members[root].iter().map(|&p| self.seed_ids[p].as_str()),
                    );
                    groups.push(IdentityGroup {
                        canonical,
                        anchor_key: self.key_names[node].clone(),
                        anchor_is_primary: self.seen_as_primary[node],
                    });
                    group_of_root.insert(root, groups.len() - 1);
                    groups.len() - 1
                }
            };

            // Prefer primary keys, then the lexicographically smallest key
            let candidate = (!self.seen_as_primary[node], &self.key_names[node]);
            let current_anchor = &groups[group].anchor_key;
            let current_node = self.nodes[current_anchor.as_str()];
            let current = (!self.seen_as_primary[current_node], current_anchor);
            if candidate < current {
                groups[group].anchor_key = self.key_names[node].clone();
                groups[group].anchor_is_primary = self.seen_as_primary[node];
            }

            key_groups.insert(self.key_names[node].clone(), group);
        }

        KeyIdentityMap { key_groups, groups }
    }
}

/// Merge two ascending position lists, dropping repeats
fn merge_sorted(left: Vec<usize>, right: Vec<usize>) -> Vec<usize> {
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() || j < right.len() {
        let next = match (left.get(i), right.get(j)) {
            (Some(&l), Some(&r)) if l <= r => {
                i += 1;
                l
            }
            (Some(_), Some(&r)) => {
                j += 1;
                r
            }
            (Some(&l), None) => {
                i += 1;
                l
            }
            (None, Some(&r)) => {
                j += 1;
                r
            }
            (None, None) => break,
        };
        if merged.last() != Some(&next) {
            merged.push(next);
        }
    }
    merged
}

/// Run both merge sub-passes in order and freeze the result
pub fn merge_identities(
    base: &PlatformRecords,
    non_base: &[PlatformRecords],
    tracker: &mut ProgressTracker<'_>,
) -> Result<KeyIdentityMap> {
    let mut graph = IdentityGraph::new();

    graph.seed_from_base(base, tracker)?;
    for platform in non_base {
        graph.propagate_from(platform, tracker)?;
    }

    let map = graph.into_identity_map();
    info!(
        keys = map.key_count(),
        groups = map.groups().len(),
        merged = map.merged_count(),
        "identity merge complete"
    );
    Ok(map)
}

// ============================================================================
// TESTS
// ============================================================================
