//! Basic blocks. Grounded in `backend/ir.h`'s `IRBB`.

use crate::diag::Location;
use crate::graph::predicate::Predicate;
use crate::ir::ids::{BBId, PipeId, StmtId};

#[derive(Debug, Clone, Default)]
pub struct BB {
    pub label: String,
    pub stmts: Vec<StmtId>,

    pub is_entry: bool,
    pub is_restart: bool,

    pub pipe: Option<PipeId>,
    pub location: Location,

    /// Cached successors and, parallel to them, whether each successor edge
    /// is a (pre-conversion) backedge.
    pub succs: Vec<BBId>,
    pub backedge: Vec<bool>,

    pub in_pred: Predicate<StmtId>,
    pub in_valid: Option<StmtId>,
    pub out_preds: Vec<Predicate<StmtId>>,
    pub out_valids: Vec<StmtId>,

    /// Restart-condition statement (only set on `is_restart` BBs).
    pub restart_cond: Option<StmtId>,
    /// Restart-value-source statement pointer (only set on backedge BBs).
    pub restart_pred_src: Option<StmtId>,
}

impl BB {
    pub fn new(label: impl Into<String>) -> Self {
        BB {
            label: label.into(),
            location: Location::nowhere(),
            ..Default::default()
        }
    }

    pub fn which_succ(&self, succ: BBId) -> Option<usize> {
        self.succs.iter().position(|s| *s == succ)
    }
}
