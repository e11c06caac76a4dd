//! Disjoint-set forest over item indices.
//!
//! Clusters are represented as parent/rank arrays indexed by the caller's
//! item positions. [`Linker`] layers edge bookkeeping on top so each
//! connected component reports the smallest and largest distance among the
//! edges that joined it.

use std::collections::HashMap;

/// Union-find with path halving and union by rank.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    /// Create `n` singleton sets.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    /// Number of items tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// Whether no items are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Representative of `x`'s set.
    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Merge the sets of `a` and `b`. Returns `false` if already merged.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] = self.rank[ra].saturating_add(1);
            }
        }
        true
    }

    /// Whether `a` and `b` are in the same set.
    pub fn connected(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }
}

/// A connected component with two or more members.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Member indices, ascending
    pub members: Vec<usize>,
    /// Smallest distance among joining edges
    pub min_distance: f64,
    /// Largest distance among joining edges
    pub max_distance: f64,
}

/// Collects distance-weighted edges and yields connected components.
#[derive(Debug, Clone)]
pub struct Linker {
    sets: UnionFind,
    edges: Vec<(usize, usize, f64)>,
}

impl Linker {
    /// Create a linker over `n` items.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            sets: UnionFind::new(n),
            edges: Vec::new(),
        }
    }

    /// Record an edge of the given distance between `a` and `b`.
    pub fn link(&mut self, a: usize, b: usize, distance: f64) {
        self.sets.union(a, b);
        self.edges.push((a, b, distance));
    }

    /// Whether `a` and `b` are already in one component.
    pub fn connected(&mut self, a: usize, b: usize) -> bool {
        self.sets.connected(a, b)
    }

    /// Components with at least two members, ordered by their lowest index.
    #[must_use]
    pub fn components(mut self) -> Vec<Component> {
        let mut members: HashMap<usize, Vec<usize>> = HashMap::new();
        for i in 0..self.sets.len() {
            let root = self.sets.find(i);
            members.entry(root).or_default().push(i);
        }

        let mut ranges: HashMap<usize, (f64, f64)> = HashMap::new();
        for &(a, _, d) in &self.edges {
            let root = self.sets.find(a);
            let range = ranges.entry(root).or_insert((d, d));
            range.0 = range.0.min(d);
            range.1 = range.1.max(d);
        }

        let mut components: Vec<Component> = members
            .into_iter()
            .filter(|(_, m)| m.len() > 1)
            .map(|(root, members)| {
                let (min_distance, max_distance) = ranges.get(&root).copied().unwrap_or((0.0, 0.0));
                Component {
                    members,
                    min_distance,
                    max_distance,
                }
            })
            .collect();
        components.sort_by_key(|c| c.members[0]);
        components
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_find_basic() {
        let mut uf = UnionFind::new(5);
        assert!(uf.union(0, 1));
        assert!(uf.union(3, 4));
        assert!(!uf.union(1, 0));
        assert!(uf.connected(0, 1));
        assert!(!uf.connected(1, 3));
        assert!(uf.union(1, 4));
        assert!(uf.connected(0, 3));
        assert_eq!(uf.len(), 5);
    }

    #[test]
    fn test_linker_chain_is_transitive() {
        let mut linker = Linker::new(4);
        linker.link(0, 1, 3.0);
        linker.link(1, 2, 5.0);

        let components = linker.components();
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].members, vec![0, 1, 2]);
        assert_eq!(components[0].min_distance, 3.0);
        assert_eq!(components[0].max_distance, 5.0);
    }

    #[test]
    fn test_linker_drops_singletons() {
        let mut linker = Linker::new(6);
        linker.link(4, 5, 1.0);
        linker.link(0, 2, 0.0);

        let components = linker.components();
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].members, vec![0, 2]);
        assert_eq!(components[1].members, vec![4, 5]);
    }
}
