//! Kill-if propagator: replicates the backward slice feeding each `kill_if`
//! condition into every downstream stage so the condition is monitored
//! continuously. Grounded in SPEC_FULL.md §4.9 / `backend/ir-killif.cc`.

use std::collections::HashSet;

use crate::diag::Diagnostics;
use crate::ir::{IRProgram, Op, Stmt, StmtId, StmtKind};
use crate::pipe::PipeSys;

pub fn propagate(program: &mut IRProgram, sys: &mut PipeSys, diags: &mut Diagnostics) {
    let mut slice_counter = 0u32;

    for pipe_idx in 0..sys.pipes.len() {
        let flat = sys.pipes[pipe_idx].flat_stmts.clone();
        for &sid in &flat {
            if program.stmt(sid).kind != StmtKind::KillIf {
                continue;
            }
            let Some(&cond) = program.stmt(sid).args.first() else {
                continue;
            };
            let Some(own_stage) = program.stmt(sid).stage.map(|s| s.0 as i64) else {
                continue;
            };

            let mut slice = Vec::new();
            let mut seen = HashSet::new();
            if !collect_backward_slice(program, cond, &mut seen, &mut slice, diags) {
                continue;
            }

            let pipe_id = crate::ir::PipeId(pipe_idx as u32);
            let downstream: Vec<(usize, i64)> =
                downstream_stages(sys, pipe_id, own_stage);

            for (target_pipe_idx, target_stage) in downstream {
                slice_counter += 1;
                let (cloned_cond, cloned_stmts) =
                    clone_slice_into(program, &slice, cond, slice_counter);
                for &c in &cloned_stmts {
                    program.stmt_mut(c).stage = Some(crate::ir::PipeStageId(target_stage as u32));
                }
                sys.pipes[target_pipe_idx]
                    .stage_mut(target_stage)
                    .stmts
                    .extend(cloned_stmts);

                let valid_in = program.stmt(sid).valid_in;
                let anded = if let Some(vin) = valid_in {
                    let mut and_stmt = Stmt::expr(Op::And, vec![cloned_cond, vin], 1);
                    and_stmt.valnum = program.alloc_valnum();
                    and_stmt.stage = Some(crate::ir::PipeStageId(target_stage as u32));
                    let id = program.add_stmt(and_stmt);
                    sys.pipes[target_pipe_idx].stage_mut(target_stage).stmts.push(id);
                    id
                } else {
                    cloned_cond
                };

                sys.pipes[target_pipe_idx]
                    .stage_mut(target_stage)
                    .kills
                    .push(anded);
            }
        }
    }
}

/// DFS over arguments collecting a postorder slice; only port reads and
/// expression ops are permitted.
fn collect_backward_slice(
    program: &IRProgram,
    root: StmtId,
    seen: &mut HashSet<StmtId>,
    out: &mut Vec<StmtId>,
    diags: &mut Diagnostics,
) -> bool {
    if !seen.insert(root) {
        return true;
    }
    let stmt = program.stmt(root);
    if !matches!(stmt.kind, StmtKind::Expr | StmtKind::PortRead) {
        diags.error(
            stmt.location.clone(),
            format!(
                "kill_if backward slice contains a side-effecting op (value number {})",
                stmt.valnum
            ),
        );
        return false;
    }
    for &arg in &stmt.args.clone() {
        if !collect_backward_slice(program, arg, seen, out, diags) {
            return false;
        }
    }
    out.push(root);
    true
}

fn downstream_stages(sys: &PipeSys, pipe_id: crate::ir::PipeId, own_stage: i64) -> Vec<(usize, i64)> {
    let mut out = Vec::new();
    let subtree = sys.subtree(pipe_id);
    for pid in subtree {
        let pipe = sys.pipe(pid);
        let pipe_idx = pid.index();
        for stage in &pipe.stages {
            if stage.index > own_stage {
                out.push((pipe_idx, stage.index));
            }
        }
    }
    out
}

fn clone_slice_into(
    program: &mut IRProgram,
    slice: &[StmtId],
    root: StmtId,
    slice_id: u32,
) -> (StmtId, Vec<StmtId>) {
    let mut clone_map: std::collections::HashMap<StmtId, StmtId> = std::collections::HashMap::new();
    let mut bb = crate::ir::BB::new(format!("__cloned_kill_if_slice_{}", slice_id));
    bb.location = crate::diag::Location::nowhere();
    let bb_id = program.add_bb(bb);

    let mut cloned_ids = Vec::with_capacity(slice.len());
    for &sid in slice {
        let mut cloned = program.stmt(sid).clone();
        cloned.valnum = program.alloc_valnum();
        cloned.bb = Some(bb_id);
        cloned.args = cloned
            .args
            .iter()
            .map(|a| clone_map.get(a).copied().unwrap_or(*a))
            .collect();
        let cloned_id = program.add_stmt(cloned);
        clone_map.insert(sid, cloned_id);
        program.bb_mut(bb_id).stmts.push(cloned_id);
        cloned_ids.push(cloned_id);
    }

    let cloned_root = clone_map.get(&root).copied().unwrap_or(root);
    (cloned_root, cloned_ids)
}
