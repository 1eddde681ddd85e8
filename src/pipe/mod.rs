//! Per-pipe lowering: extraction, backedge conversion, if-conversion,
//! side-effect DAG construction, timing scheduling, kill-if propagation,
//! multi-writer arbitration, and stall/kill spine generation.
//!
//! Grounded in `backend/ir-pipe.cc` / `backend/timing.cc` and SPEC_FULL.md
//! §4.4-§4.11. Orchestration mirrors `IRProgram::Lower()`'s pass order.

pub mod arbiter;
pub mod backedge;
pub mod extract;
pub mod ifconvert;
pub mod killif;
pub mod sidedag;
pub mod spine;
pub mod timing;

use crate::diag::Diagnostics;
use crate::ir::{BBId, IRProgram, PipeId, StmtId};

/// One scheduled stage of a pipe. Stage 0 is reserved empty for the
/// stall/kill OR-trees synthesized by `spine`.
#[derive(Debug, Clone, Default)]
pub struct PipeStage {
    pub index: i64,
    pub stmts: Vec<StmtId>,
    /// Kill contributions gathered during kill-if propagation (§4.9), ORed
    /// together with stall/killyounger signals by the spine generator.
    pub kills: Vec<StmtId>,
}

impl PipeStage {
    pub fn new(index: i64) -> Self {
        PipeStage {
            index,
            stmts: Vec::new(),
            kills: Vec::new(),
        }
    }
}

/// One pipeline: a tree-connected set of BBs rooted at a top-level entry or
/// a `spawn` target, with its own flattened statement list and stage table.
#[derive(Debug, Clone, Default)]
pub struct Pipe {
    pub id: PipeId,
    pub root: Option<BBId>,
    pub bbs: Vec<BBId>,
    pub parent: Option<PipeId>,
    pub children: Vec<PipeId>,

    /// Set by the backedge converter: restart headers first, then the
    /// original entry (order matters for pipe-DAG edge ordering).
    pub roots: Vec<BBId>,

    /// Populated by `sidedag::flatten_pipe`: the pipe's statements in
    /// RPO-over-BBs, statement-list order within each BB.
    pub flat_stmts: Vec<StmtId>,

    pub stages: Vec<PipeStage>,
}

impl Pipe {
    pub fn stage_mut(&mut self, index: i64) -> &mut PipeStage {
        while (self.stages.len() as i64) <= index {
            let next = self.stages.len() as i64;
            self.stages.push(PipeStage::new(next));
        }
        &mut self.stages[index as usize]
    }
}

/// A spawn tree: one root pipe plus every pipe transitively spawned from it.
/// `pipes[0]` is always the root.
#[derive(Debug, Clone, Default)]
pub struct PipeSys {
    pub pipes: Vec<Pipe>,
}

impl PipeSys {
    pub fn pipe(&self, id: PipeId) -> &Pipe {
        &self.pipes[id.index()]
    }
    pub fn pipe_mut(&mut self, id: PipeId) -> &mut Pipe {
        &mut self.pipes[id.index()]
    }

    /// All pipes transitively spawned from (and including) `root`.
    pub fn subtree(&self, root: PipeId) -> Vec<PipeId> {
        let mut out = vec![root];
        let mut i = 0;
        while i < out.len() {
            let children = self.pipe(out[i]).children.clone();
            out.extend(children);
            i += 1;
        }
        out
    }
}

pub fn lower(program: &mut IRProgram, diags: &mut Diagnostics) -> Option<Vec<PipeSys>> {
    let mut systems = extract::extract_pipes(program, diags)?;
    if diags.has_errors() {
        return None;
    }

    for sys in &mut systems {
        backedge::convert(program, sys, diags);
    }
    if diags.has_errors() {
        return None;
    }

    for sys in &mut systems {
        ifconvert::convert(program, sys, diags);
    }
    if diags.has_errors() {
        return None;
    }

    for sys in &mut systems {
        sidedag::build(program, sys, diags);
    }
    if diags.has_errors() {
        return None;
    }

    for sys in &mut systems {
        timing::schedule(program, sys, diags);
    }
    if diags.has_errors() {
        return None;
    }

    for sys in &mut systems {
        killif::propagate(program, sys, diags);
    }
    if diags.has_errors() {
        return None;
    }

    for sys in &mut systems {
        arbiter::arbitrate(program, sys, diags);
    }
    if diags.has_errors() {
        return None;
    }

    for sys in &mut systems {
        spine::generate(program, sys, diags);
    }
    if diags.has_errors() {
        return None;
    }

    Some(systems)
}

/// Finds the pipe owning a BB, searching every system. Used by passes that
/// walk statements without already knowing which (system, pipe) they live
/// in.
pub fn find_owning_pipe(systems: &[PipeSys], bb: BBId) -> Option<(usize, PipeId)> {
    for (si, sys) in systems.iter().enumerate() {
        for pipe in &sys.pipes {
            if pipe.bbs.contains(&bb) {
                return Some((si, pipe.id));
            }
        }
    }
    None
}

