//! Union-find over sparse u32 keys, used to canonicalize tiles that are
//! mutually reachable with no requirement.

use hashbrown::HashMap;

#[derive(Default)]
pub struct UnionFind {
    index: HashMap<u32, usize>,
    keys: Vec<u32>,
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new() -> UnionFind {
        UnionFind::default()
    }

    fn index_of(&mut self, key: u32) -> usize {
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        let i = self.keys.len();
        self.index.insert(key, i);
        self.keys.push(key);
        self.parent.push(i);
        self.rank.push(0);
        i
    }

    fn root(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            // Path halving: point i at its grandparent as we walk up.
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    /// The canonical key of `key`'s set. A key never seen before is its own
    /// canonical element.
    pub fn find(&mut self, key: u32) -> u32 {
        let i = self.index_of(key);
        let r = self.root(i);
        self.keys[r]
    }

    /// Merges the sets containing `a` and `b`.
    pub fn union(&mut self, a: u32, b: u32) {
        let ia = self.index_of(a);
        let ib = self.index_of(b);
        let ra = self.root(ia);
        let rb = self.root(ib);
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }

    /// All sets (singletons included), each sorted, in deterministic order.
    pub fn sets(&mut self) -> Vec<Vec<u32>> {
        let mut by_root: HashMap<usize, Vec<u32>> = HashMap::new();
        for i in 0..self.keys.len() {
            let r = self.root(i);
            by_root.entry(r).or_default().push(self.keys[i]);
        }
        let mut out: Vec<Vec<u32>> = by_root.into_values().collect();
        for set in &mut out {
            set.sort_unstable();
        }
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unseen_key_is_its_own_root() {
        let mut uf = UnionFind::new();
        assert_eq!(uf.find(7), 7);
    }

    #[test]
    fn test_union_is_transitive() {
        let mut uf = UnionFind::new();
        uf.union(1, 2);
        uf.union(3, 4);
        uf.union(2, 3);
        let root = uf.find(1);
        for k in [2, 3, 4] {
            assert_eq!(uf.find(k), root);
        }
        assert_ne!(uf.find(5), root);
    }

    #[test]
    fn test_sets() {
        let mut uf = UnionFind::new();
        uf.union(10, 11);
        uf.union(11, 12);
        uf.union(20, 21);
        uf.find(30);
        assert_eq!(uf.sets(), vec![vec![10, 11, 12], vec![20, 21], vec![30]]);
    }
}
