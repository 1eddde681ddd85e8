//! Side-effect DAG builder: produces ordering edges independent of SSA
//! dataflow, then flattens each pipe's BBs into one RPO-ordered statement
//! list. Grounded in SPEC_FULL.md §4.7 / `backend/ir-sidedag.cc`.

use crate::diag::Diagnostics;
use crate::graph::rpo::ReversePostorder;
use crate::graph::Successors;
use crate::ir::{has_side_effects, is_bypass_stmt, reads_port, BBId, IRProgram, StmtId, StmtKind};
use crate::pipe::PipeSys;

struct PipeCfg<'a> {
    program: &'a IRProgram,
    bbs: &'a [BBId],
}

impl<'a> Successors<BBId> for PipeCfg<'a> {
    fn successors(&self, node: BBId) -> Vec<BBId> {
        self.program
            .bb(node)
            .succs
            .iter()
            .copied()
            .filter(|s| self.bbs.contains(s))
            .collect()
    }
}

pub fn build(program: &mut IRProgram, sys: &mut PipeSys, _diags: &mut Diagnostics) {
    for pipe_idx in 0..sys.pipes.len() {
        build_pipe(program, sys, pipe_idx);
    }
}

fn is_side_effecting(program: &IRProgram, sid: StmtId) -> bool {
    let kind = program.stmt(sid).kind;
    has_side_effects(kind) && kind != StmtKind::TimingBarrier
}

fn build_pipe(program: &mut IRProgram, sys: &mut PipeSys, pipe_idx: usize) {
    let bbs = sys.pipes[pipe_idx].bbs.clone();
    let roots = if sys.pipes[pipe_idx].roots.is_empty() {
        sys.pipes[pipe_idx].root.into_iter().collect::<Vec<_>>()
    } else {
        sys.pipes[pipe_idx].roots.clone()
    };
    if roots.is_empty() {
        return;
    }

    let cfg = PipeCfg { program, bbs: &bbs };
    let rpo = ReversePostorder::compute(&cfg, &roots);
    let spawn_point: Option<StmtId> = find_spawn_point(program, &bbs);

    let mut out_side_barriers: std::collections::HashMap<BBId, Vec<StmtId>> = std::collections::HashMap::new();
    let mut out_timing_barriers: std::collections::HashMap<BBId, Vec<StmtId>> = std::collections::HashMap::new();
    let mut out_pure_pending: std::collections::HashMap<BBId, Vec<StmtId>> = std::collections::HashMap::new();

    for &bb in rpo.order() {
        let preds: Vec<BBId> = rpo.preds(bb).iter().copied().filter(|p| bbs.contains(p)).collect();

        let mut side_barriers: Vec<StmtId> = Vec::new();
        let mut timing_barriers: Vec<StmtId> = Vec::new();
        let mut pure_pending: Vec<StmtId> = Vec::new();
        for &pred in &preds {
            side_barriers.extend(out_side_barriers.get(&pred).cloned().unwrap_or_default());
            timing_barriers.extend(out_timing_barriers.get(&pred).cloned().unwrap_or_default());
            pure_pending.extend(out_pure_pending.get(&pred).cloned().unwrap_or_default());
        }

        let mut last_side: Option<StmtId> = None;
        let stmts = program.bb(bb).stmts.clone();
        for sid in stmts {
            let kind = program.stmt(sid).kind;
            if kind == StmtKind::TimingBarrier {
                for &pending in &pure_pending {
                    program.stmt_mut(pending).pipedag_deps.push(sid);
                }
                timing_barriers = vec![sid];
                pure_pending.clear();
                continue;
            }

            if is_side_effecting(program, sid) || is_bypass_stmt(kind) {
                let deps: Vec<StmtId> = match last_side {
                    Some(ls) => vec![ls],
                    None => side_barriers.clone(),
                };
                program.stmt_mut(sid).pipedag_deps.extend(deps);
                if reads_port(kind) && kind == StmtKind::ChanRead {
                    if let Some(port) = program.stmt(sid).port {
                        let writers = program.port(port).defs.clone();
                        program.stmt_mut(sid).pipedag_deps.extend(writers);
                    }
                }
                last_side = Some(sid);
            } else {
                if let Some(sp) = spawn_point {
                    program.stmt_mut(sid).pipedag_deps.push(sp);
                }
                if let Some(&tb) = timing_barriers.last() {
                    program.stmt_mut(sid).pipedag_deps.push(tb);
                } else {
                    program.stmt_mut(sid).pipedag_deps.extend(timing_barriers.clone());
                }
                pure_pending.push(sid);
            }
        }

        if let Some(ls) = last_side {
            side_barriers = vec![ls];
        }
        out_side_barriers.insert(bb, side_barriers);
        out_timing_barriers.insert(bb, timing_barriers);
        out_pure_pending.insert(bb, pure_pending);
    }

    flatten_pipe(program, sys, pipe_idx, &rpo);
}

fn find_spawn_point(program: &IRProgram, bbs: &[BBId]) -> Option<StmtId> {
    for &bb in bbs {
        for &sid in &program.bb(bb).stmts {
            if program.stmt(sid).kind == StmtKind::Spawn {
                return Some(sid);
            }
        }
    }
    None
}

fn flatten_pipe(
    program: &IRProgram,
    sys: &mut PipeSys,
    pipe_idx: usize,
    rpo: &ReversePostorder<BBId>,
) {
    let mut flat = Vec::new();
    for &bb in rpo.order() {
        flat.extend(program.bb(bb).stmts.iter().copied());
    }
    sys.pipes[pipe_idx].flat_stmts = flat;
}
