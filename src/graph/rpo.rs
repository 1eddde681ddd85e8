//! Generic reverse postorder with a cached predecessor map, built during the
//! same DFS. Grounded in `backend/rpo.h`.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use super::Successors;

pub struct ReversePostorder<N: Copy + Eq + Hash> {
    order: Vec<N>,
    rpo_num: HashMap<N, usize>,
    preds: HashMap<N, Vec<N>>,
}

impl<N: Copy + Eq + Hash> ReversePostorder<N> {
    /// Computes RPO from the given roots, processed in reverse order of the
    /// input so that earlier roots appear first in the resulting order
    /// (matching the original's root-processing convention).
    pub fn compute<G: Successors<N>>(graph: &G, roots: &[N]) -> Self {
        let mut visited: HashSet<N> = HashSet::new();
        let mut postorder: Vec<N> = Vec::new();
        let mut preds: HashMap<N, Vec<N>> = HashMap::new();

        for &root in roots.iter().rev() {
            if !visited.contains(&root) {
                Self::dfs(graph, root, &mut visited, &mut postorder, &mut preds);
            }
        }

        postorder.reverse();
        let mut rpo_num = HashMap::new();
        for (i, &n) in postorder.iter().enumerate() {
            rpo_num.insert(n, i);
        }

        ReversePostorder {
            order: postorder,
            rpo_num,
            preds,
        }
    }

    fn dfs<G: Successors<N>>(
        graph: &G,
        node: N,
        visited: &mut HashSet<N>,
        postorder: &mut Vec<N>,
        preds: &mut HashMap<N, Vec<N>>,
    ) {
        visited.insert(node);
        preds.entry(node).or_default();
        for succ in graph.successors(node) {
            preds.entry(succ).or_default().push(node);
            if !visited.contains(&succ) {
                Self::dfs(graph, succ, visited, postorder, preds);
            }
        }
        postorder.push(node);
    }

    pub fn order(&self) -> &[N] {
        &self.order
    }

    pub fn rpo_num(&self, node: N) -> Option<usize> {
        self.rpo_num.get(&node).copied()
    }

    pub fn preds(&self, node: N) -> &[N] {
        self.preds.get(&node).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Nodes never referenced as anyone's successor, among the given
    /// universe of nodes. Grounded in `FindRoots`.
    pub fn find_roots<G: Successors<N>>(graph: &G, universe: &[N]) -> Vec<N> {
        let mut is_succ: HashSet<N> = HashSet::new();
        for &n in universe {
            for s in graph.successors(n) {
                is_succ.insert(s);
            }
        }
        universe.iter().copied().filter(|n| !is_succ.contains(n)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    struct SimpleGraph(Map<u32, Vec<u32>>);
    impl Successors<u32> for SimpleGraph {
        fn successors(&self, node: u32) -> Vec<u32> {
            self.0.get(&node).cloned().unwrap_or_default()
        }
    }

    #[test]
    fn rpo_orders_root_before_successors() {
        // 0 -> 1 -> 2, 0 -> 2
        let g = SimpleGraph(Map::from([(0, vec![1, 2]), (1, vec![2]), (2, vec![])]));
        let rpo = ReversePostorder::compute(&g, &[0]);
        let pos0 = rpo.rpo_num(0).unwrap();
        let pos1 = rpo.rpo_num(1).unwrap();
        let pos2 = rpo.rpo_num(2).unwrap();
        assert!(pos0 < pos1);
        assert!(pos1 < pos2);
    }

    #[test]
    fn preds_are_materialized() {
        let g = SimpleGraph(Map::from([(0, vec![1, 2]), (1, vec![2]), (2, vec![])]));
        let rpo = ReversePostorder::compute(&g, &[0]);
        let mut preds2 = rpo.preds(2).to_vec();
        preds2.sort();
        assert_eq!(preds2, vec![0, 1]);
    }

    #[test]
    fn find_roots_excludes_successors() {
        let g = SimpleGraph(Map::from([(0, vec![1]), (1, vec![2]), (2, vec![])]));
        let mut roots = ReversePostorder::find_roots(&g, &[0, 1, 2]);
        roots.sort();
        assert_eq!(roots, vec![0]);
    }
}
