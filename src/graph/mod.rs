//! Generic graph utilities shared by BB-level and statement-level passes:
//! reverse postorder, dominators, and the DNF predicate algebra.

pub mod domtree;
pub mod predicate;
pub mod rpo;

/// Supplies the successor set for a node of type `N`, so `rpo`/`domtree`
/// can be generic over both `BBId` (CFG-level passes) and `StmtId`
/// (the stall/kill spine's backedge search). Grounded in `backend/rpo.h`'s
/// `ReversePostorder<T, SuccFunc>` template parameter.
pub trait Successors<N> {
    fn successors(&self, node: N) -> Vec<N>;
}
