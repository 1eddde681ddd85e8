//! Cooper-Harvey-Kennedy iterative dominance, generic over the same
//! `Successors` trait as `rpo`. Grounded in `backend/domtree.h`.

use std::collections::HashMap;
use std::hash::Hash;

use super::rpo::ReversePostorder;
use super::Successors;

pub struct DomTree<N: Copy + Eq + Hash> {
    parent: HashMap<N, Option<N>>,
}

impl<N: Copy + Eq + Hash> DomTree<N> {
    pub fn compute<G: Successors<N>>(graph: &G, roots: &[N]) -> Self {
        let rpo = ReversePostorder::compute(graph, roots);
        let mut parent: HashMap<N, Option<N>> = HashMap::new();
        for &n in rpo.order() {
            parent.insert(n, None);
        }

        let mut changed = true;
        while changed {
            changed = false;
            for &node in rpo.order() {
                let preds = rpo.preds(node);
                let rponum = rpo.rpo_num(node).unwrap();

                let mut new_parent: Option<N> = None;
                if !preds.is_empty() {
                    for &pred in preds {
                        if let Some(pred_rpo) = rpo.rpo_num(pred) {
                            if pred_rpo < rponum {
                                new_parent = Some(pred);
                                break;
                            }
                        }
                    }
                    if let Some(mut acc) = new_parent {
                        for &pred in preds {
                            if pred == acc {
                                continue;
                            }
                            match Self::merge(acc, pred, &parent, &rpo) {
                                Some(m) => acc = m,
                                None => {
                                    new_parent = None;
                                    break;
                                }
                            }
                        }
                        new_parent = Some(acc);
                    }
                }

                let current = parent.get(&node).copied().flatten();
                if current != new_parent {
                    changed = true;
                }
                parent.insert(node, new_parent);
            }
        }

        DomTree { parent }
    }

    fn merge<G: Successors<N>>(
        mut n1: N,
        mut n2: N,
        parent: &HashMap<N, Option<N>>,
        rpo: &ReversePostorder<N>,
    ) -> Option<N> {
        loop {
            if n1 == n2 {
                return Some(n1);
            }
            let rpo1 = rpo.rpo_num(n1)?;
            let rpo2 = rpo.rpo_num(n2)?;
            if rpo1 > rpo2 {
                n1 = (*parent.get(&n1)?)?;
            } else {
                n2 = (*parent.get(&n2)?)?;
            }
        }
    }

    pub fn idom_parent(&self, node: N) -> Option<N> {
        self.parent.get(&node).copied().flatten()
    }

    pub fn idom(&self, parent: N, child: N) -> bool {
        self.idom_parent(child) == Some(parent)
    }

    /// Does `parent` dominate `child` (reflexively: every node dominates
    /// itself)?
    pub fn dom(&self, parent: N, child: N) -> bool {
        let mut cur = Some(child);
        while let Some(n) = cur {
            if n == parent {
                return true;
            }
            cur = self.idom_parent(n);
        }
        false
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
    fn diamond_dominance() {
        // 0 -> 1, 0 -> 2, 1 -> 3, 2 -> 3
        let g = SimpleGraph(Map::from([
            (0, vec![1, 2]),
            (1, vec![3]),
            (2, vec![3]),
            (3, vec![]),
        ]));
        let dt = DomTree::compute(&g, &[0]);
        assert!(dt.dom(0, 3));
        assert!(!dt.dom(1, 3));
        assert!(!dt.dom(2, 3));
        assert_eq!(dt.idom_parent(3), Some(0));
    }

    #[test]
    fn linear_chain_dominance() {
        let g = SimpleGraph(Map::from([(0, vec![1]), (1, vec![2]), (2, vec![])]));
        let dt = DomTree::compute(&g, &[0]);
        assert!(dt.dom(0, 2));
        assert!(dt.dom(1, 2));
        assert!(dt.idom(1, 2));
        assert!(dt.idom(0, 1));
    }

    #[test]
    fn self_loop_root_has_no_parent() {
        let g = SimpleGraph(Map::from([(0, vec![0])]));
        let dt = DomTree::compute(&g, &[0]);
        assert_eq!(dt.idom_parent(0), None);
    }
}
