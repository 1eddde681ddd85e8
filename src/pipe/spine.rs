//! Stall/kill spine generator: synthesizes, per stage, the OR-tree of stall
//! and kill conditions and gates the valid cut entering each stage. Grounded
//! in SPEC_FULL.md §4.11 / `backend/ir-spine.cc`.

use crate::diag::Diagnostics;
use crate::ir::{IRProgram, Op, Stmt, StmtId, StmtKind};
use crate::pipe::PipeSys;

pub fn generate(program: &mut IRProgram, sys: &mut PipeSys, diags: &mut Diagnostics) {
    for pipe_idx in 0..sys.pipes.len() {
        if let Some(stage0) = sys.pipes[pipe_idx].stages.first() {
            debug_assert!(stage0.stmts.is_empty(), "stage 0 must be empty");
        }
    }

    let max_stage = sys
        .pipes
        .iter()
        .flat_map(|p| p.stages.iter().map(|s| s.index))
        .max()
        .unwrap_or(0);

    for stage_i in 1..=max_stage {
        let stall = build_stall_signal(program, sys, stage_i);
        let stall_bb = stall.map(|s| {
            let bb = new_synthetic_bb(program, &format!("__stallgen_stage_{}", stage_i), stage_i - 1);
            program.bb_mut(bb).stmts.push(s);
            s
        });

        let kill = build_kill_signal(program, sys, stage_i, stall_bb);
        gate_valid_cut(program, sys, stage_i, kill, diags);
    }
}

fn new_synthetic_bb(program: &mut IRProgram, name: &str, _stage: i64) -> crate::ir::BBId {
    let bb = crate::ir::BB::new(name);
    program.add_bb(bb)
}

// Stall/kill signals are properties of the whole system (they span every
// pipe's backedges and kill-youngers), not of any one pipe, but
// `verilog::emit` only walks statements reachable from a pipe's stages.
// These synthesized combinators are attributed to the root pipe of the
// system at the stage they logically belong to.
fn register_in_root(program: &mut IRProgram, sys: &mut PipeSys, stage: i64, sid: StmtId) {
    program.stmt_mut(sid).stage = Some(crate::ir::PipeStageId(stage as u32));
    sys.pipes[0].stage_mut(stage).stmts.push(sid);
}

fn or_all(
    program: &mut IRProgram,
    sys: &mut PipeSys,
    stage: i64,
    ids: &[StmtId],
) -> Option<StmtId> {
    if ids.is_empty() {
        return None;
    }
    let mut acc = ids[0];
    for &next in &ids[1..] {
        let mut s = Stmt::expr(Op::Or, vec![acc, next], 1);
        s.valnum = program.alloc_valnum();
        acc = program.add_stmt(s);
        register_in_root(program, sys, stage, acc);
    }
    Some(acc)
}

fn build_stall_signal(program: &mut IRProgram, sys: &mut PipeSys, stage_i: i64) -> Option<StmtId> {
    let mut valids = Vec::new();
    for pipe in &sys.pipes {
        for &sid in &pipe.flat_stmts {
            if program.stmt(sid).kind != StmtKind::Backedge {
                continue;
            }
            let Some(restart_target) = program.stmt(sid).restart_target else {
                continue;
            };
            let Some(cond) = program.bb(restart_target).restart_cond else {
                continue;
            };
            let Some(cond_stage) = program.stmt(cond).stage.map(|s| s.0 as i64) else {
                continue;
            };
            if cond_stage > stage_i {
                if let Some(vin) = program.stmt(sid).valid_in {
                    valids.push(vin);
                }
            }
        }
    }
    or_all(program, sys, stage_i - 1, &valids)
}

fn build_kill_signal(
    program: &mut IRProgram,
    sys: &mut PipeSys,
    stage_i: i64,
    stall: Option<StmtId>,
) -> Option<StmtId> {
    let mut valids = Vec::new();
    for pipe in &sys.pipes {
        for &sid in &pipe.flat_stmts {
            if program.stmt(sid).kind != StmtKind::KillYounger {
                continue;
            }
            let Some(ky_stage) = program.stmt(sid).stage.map(|s| s.0 as i64) else {
                continue;
            };
            if ky_stage > stage_i {
                if let Some(vin) = program.stmt(sid).valid_in {
                    valids.push(vin);
                }
            }
        }
    }

    for pipe in &sys.pipes {
        for stage in &pipe.stages {
            if stage.index == stage_i {
                valids.extend(stage.kills.iter().copied());
            }
        }
    }

    let mut kill = or_all(program, sys, stage_i, &valids);
    if let Some(s) = stall {
        kill = Some(match kill {
            Some(k) => {
                let mut or_stmt = Stmt::expr(Op::Or, vec![k, s], 1);
                or_stmt.valnum = program.alloc_valnum();
                let id = program.add_stmt(or_stmt);
                register_in_root(program, sys, stage_i, id);
                id
            }
            None => s,
        });
    }
    kill
}

fn gate_valid_cut(
    program: &mut IRProgram,
    sys: &mut PipeSys,
    stage_i: i64,
    kill: Option<StmtId>,
    _diags: &mut Diagnostics,
) {
    let Some(kill) = kill else { return };

    let mut not_kill = Stmt::expr(Op::Not, vec![kill], 1);
    not_kill.valnum = program.alloc_valnum();
    let not_kill_id = program.add_stmt(not_kill);
    register_in_root(program, sys, stage_i, not_kill_id);

    let gating_bb = new_synthetic_bb(
        program,
        &format!("__valid_cut_gating_stage_{}", stage_i),
        stage_i,
    );

    let mut rewrites: Vec<(StmtId, StmtId)> = Vec::new();

    let all_flat: Vec<StmtId> = sys
        .pipes
        .iter()
        .flat_map(|p| p.flat_stmts.iter().copied())
        .collect();
    for sid in all_flat {
        {
            let Some(this_stage) = program.stmt(sid).stage.map(|s| s.0 as i64) else {
                continue;
            };
            if this_stage != stage_i {
                continue;
            }

            let arrives_from_earlier = match program.stmt(sid).valid_in {
                Some(vin) => program
                    .stmt(vin)
                    .stage
                    .map(|s| (s.0 as i64) < stage_i)
                    .unwrap_or(false),
                None => false,
            };

            if arrives_from_earlier || program.stmt(sid).is_valid_start {
                if let Some(vin) = program.stmt(sid).valid_in {
                    let mut gated = Stmt::expr(Op::And, vec![vin, not_kill_id], 1);
                    gated.valnum = program.alloc_valnum();
                    gated.bb = Some(gating_bb);
                    let gated_id = program.add_stmt(gated);
                    program.bb_mut(gating_bb).stmts.push(gated_id);
                    register_in_root(program, sys, stage_i, gated_id);
                    rewrites.push((vin, gated_id));
                }
            }
        }
    }

    for (from, to) in rewrites {
        for stmt in program.stmts.iter_mut() {
            if stmt.valid_in == Some(from) {
                stmt.valid_in = Some(to);
            }
            if stmt.valid_spine {
                for arg in stmt.args.iter_mut() {
                    if *arg == from {
                        *arg = to;
                    }
                }
            }
        }
    }
}
