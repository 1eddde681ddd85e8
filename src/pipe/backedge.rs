//! Backedge conversion: turns every back edge in a pipe's CFG into an
//! explicit `backedge`/restart-header pair, so every later pass sees a DAG.
//! Grounded in SPEC_FULL.md §4.5 / `backend/ir-backedge.cc`.

use std::collections::HashMap;

use crate::diag::Diagnostics;
use crate::graph::rpo::ReversePostorder;
use crate::graph::Successors;
use crate::ir::{BBId, IRProgram, Stmt, StmtId, StmtKind};
use crate::pipe::{Pipe, PipeSys};

/// Accumulates new statements for a BB without mutating its statement
/// vector while a pass iterates over it. Mirrors `IRBBBuilder`.
pub struct BBBuilder {
    new_stmts: Vec<StmtId>,
}

impl BBBuilder {
    pub fn new() -> Self {
        BBBuilder {
            new_stmts: Vec::new(),
        }
    }

    pub fn push(&mut self, stmt_id: StmtId) {
        self.new_stmts.push(stmt_id);
    }

    /// Splices the accumulated statements before the BB's existing ones,
    /// optionally dropping existing statements matching `drop_if`.
    pub fn prepend_to_bb(
        self,
        program: &mut IRProgram,
        bb: BBId,
        drop_if: impl Fn(&Stmt) -> bool,
    ) {
        let existing: Vec<StmtId> = program
            .bb(bb)
            .stmts
            .iter()
            .copied()
            .filter(|&sid| !drop_if(program.stmt(sid)))
            .collect();
        let mut combined = self.new_stmts;
        combined.extend(existing);
        program.bb_mut(bb).stmts = combined;
    }

    pub fn replace_bb(self, program: &mut IRProgram, bb: BBId) {
        program.bb_mut(bb).stmts = self.new_stmts;
    }
}

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

pub fn convert(program: &mut IRProgram, sys: &mut PipeSys, diags: &mut Diagnostics) {
    for pipe_idx in 0..sys.pipes.len() {
        convert_pipe(program, sys, pipe_idx, diags);
    }
}

fn convert_pipe(program: &mut IRProgram, sys: &mut PipeSys, pipe_idx: usize, _diags: &mut Diagnostics) {
    let (bbs, root) = {
        let pipe: &Pipe = &sys.pipes[pipe_idx];
        (pipe.bbs.clone(), pipe.root)
    };
    let Some(root) = root else { return };

    let cfg = PipeCfg { program, bbs: &bbs };
    let rpo = ReversePostorder::compute(&cfg, &[root]);

    let killyounger_in = compute_killyounger_in(program, &bbs, &rpo);

    let mut backedges: Vec<(BBId, usize, BBId)> = Vec::new();
    for &bb in &bbs {
        let succs = program.bb(bb).succs.clone();
        for (idx, &succ) in succs.iter().enumerate() {
            if !bbs.contains(&succ) {
                continue;
            }
            let (Some(bn), Some(sn)) = (rpo.rpo_num(bb), rpo.rpo_num(succ)) else {
                continue;
            };
            if sn <= bn {
                backedges.push((bb, idx, succ));
            }
        }
    }

    let mut restart_headers = Vec::new();
    for (src_bb, succ_idx, target_bb) in backedges {
        let restart_header = convert_one_backedge(
            program,
            pipe_idx,
            src_bb,
            succ_idx,
            target_bb,
            &killyounger_in,
        );
        restart_headers.push(restart_header);
        let pipe = &mut sys.pipes[pipe_idx];
        pipe.bbs.push(restart_header);
    }

    let pipe = &mut sys.pipes[pipe_idx];
    let mut roots = restart_headers;
    roots.push(root);
    pipe.roots = roots;
}

/// Forward dataflow: for each BB, the "killyounger in effect" at entry --
/// `Some(stmt)` if every predecessor agrees on the same last `killyounger`,
/// `None` otherwise (including "no killyounger seen yet").
fn compute_killyounger_in(
    program: &IRProgram,
    bbs: &[BBId],
    rpo: &ReversePostorder<BBId>,
) -> HashMap<BBId, Option<StmtId>> {
    let mut out_ky: HashMap<BBId, Option<StmtId>> = HashMap::new();
    for &bb in bbs {
        out_ky.insert(bb, None);
    }

    let mut changed = true;
    while changed {
        changed = false;
        for &bb in rpo.order() {
            let preds: Vec<BBId> = rpo
                .preds(bb)
                .iter()
                .copied()
                .filter(|p| bbs.contains(p))
                .collect();
            let in_val = join_killyounger(&preds, &out_ky);

            let mut cur = in_val;
            for &sid in &program.bb(bb).stmts {
                if program.stmt(sid).kind == StmtKind::KillYounger {
                    cur = Some(sid);
                }
            }
            if out_ky.get(&bb).copied().flatten() != cur.flatten() {
                changed = true;
            }
            out_ky.insert(bb, cur);
        }
    }
    out_ky
}

fn join_killyounger(
    preds: &[BBId],
    out_ky: &HashMap<BBId, Option<StmtId>>,
) -> Option<StmtId> {
    if preds.is_empty() {
        return None;
    }
    let mut iter = preds.iter().map(|p| out_ky.get(p).copied().flatten());
    let first = iter.next().flatten();
    if iter.all(|v| v == first) {
        first
    } else {
        None
    }
}

fn convert_one_backedge(
    program: &mut IRProgram,
    pipe_id: usize,
    src_bb: BBId,
    succ_idx: usize,
    target_bb: BBId,
    killyounger_in: &HashMap<BBId, Option<StmtId>>,
) -> BBId {
    let pipe_id = crate::ir::PipeId(pipe_id as u32);

    let mut backedge_bb = crate::ir::BB::new(format!(
        "__backedge_{}_{}",
        program.bb(src_bb).label,
        program.bb(target_bb).label
    ));
    backedge_bb.pipe = Some(pipe_id);
    let backedge_bb_id = program.add_bb(backedge_bb);

    let mut restart_header = crate::ir::BB::new(format!(
        "__restart_{}_{}",
        program.bb(src_bb).label,
        program.bb(target_bb).label
    ));
    restart_header.is_restart = true;
    restart_header.pipe = Some(pipe_id);
    let restart_header_id = program.add_bb(restart_header);

    let anon_tv = program.new_anon_timevar();

    let mut backedge_stmt = Stmt::new(StmtKind::Backedge);
    backedge_stmt.valnum = program.alloc_valnum();
    backedge_stmt.bb = Some(backedge_bb_id);
    backedge_stmt.restart_target = Some(restart_header_id);
    backedge_stmt.timevar = Some(anon_tv);
    backedge_stmt.time_offset = 0;
    let backedge_stmt_id = program.add_stmt(backedge_stmt);
    program.bb_mut(backedge_bb_id).stmts.push(backedge_stmt_id);

    let dominating_killyounger = killyounger_in.get(&target_bb).copied().flatten();
    let mut barrier = Stmt::new(StmtKind::TimingBarrier);
    barrier.valnum = program.alloc_valnum();
    barrier.timevar = Some(anon_tv);
    barrier.time_offset = 0;
    let barrier_id = program.add_stmt(barrier);

    if let Some(ky) = dominating_killyounger {
        let owner_bb = program.stmt(ky).bb.unwrap();
        program.stmt_mut(barrier_id).bb = Some(owner_bb);
        let pos = program
            .bb(owner_bb)
            .stmts
            .iter()
            .position(|&s| s == ky)
            .unwrap_or(0);
        program.bb_mut(owner_bb).stmts.insert(pos, barrier_id);
    } else {
        program.stmt_mut(barrier_id).bb = Some(target_bb);
        program.bb_mut(target_bb).stmts.insert(0, barrier_id);
    }

    // Phi rewriting: every phi in `target_bb` whose input position
    // corresponds to the edge from `src_bb` gets a restart-value /
    // restart-value-source pair.
    let which_src = program.bb(target_bb).which_succ(src_bb);
    let _ = which_src; // predecessor index bookkeeping is positional below
    let target_stmts = program.bb(target_bb).stmts.clone();
    let preds_of_target: Vec<BBId> = (0..program.bbs.len())
        .map(|i| BBId(i as u32))
        .filter(|&bb| program.bb(bb).succs.contains(&target_bb))
        .collect();
    let src_pred_idx = preds_of_target.iter().position(|&b| b == src_bb);

    for sid in target_stmts {
        if program.stmt(sid).kind != StmtKind::Phi {
            continue;
        }
        let Some(idx) = src_pred_idx else { continue };
        let Some(&orig_input) = program.stmt(sid).args.get(idx) else {
            continue;
        };

        let mut restart_value = Stmt::new(StmtKind::RestartValue);
        restart_value.valnum = program.alloc_valnum();
        restart_value.bb = Some(restart_header_id);
        restart_value.width = program.stmt(orig_input).width;
        let restart_value_id = program.add_stmt(restart_value);
        program
            .bb_mut(restart_header_id)
            .stmts
            .push(restart_value_id);

        let mut restart_src = Stmt::new(StmtKind::RestartValueSrc);
        restart_src.valnum = program.alloc_valnum();
        restart_src.bb = Some(backedge_bb_id);
        restart_src.restart_arg = Some(orig_input);
        restart_src.args = vec![orig_input];
        restart_src.width = program.stmt(orig_input).width;
        let restart_src_id = program.add_stmt(restart_src);
        program.bb_mut(backedge_bb_id).stmts.push(restart_src_id);

        program.stmt_mut(restart_value_id).restart_arg = Some(restart_src_id);
        program.stmt_mut(sid).args[idx] = restart_value_id;
    }

    let mut jmp = Stmt::new(StmtKind::Jmp);
    jmp.valnum = program.alloc_valnum();
    jmp.bb = Some(restart_header_id);
    jmp.targets = vec![target_bb];
    let jmp_id = program.add_stmt(jmp);
    program.bb_mut(restart_header_id).stmts.push(jmp_id);
    program.bb_mut(restart_header_id).succs = vec![target_bb];
    program.bb_mut(restart_header_id).backedge = vec![false];

    program.bb_mut(backedge_bb_id).restart_pred_src = Some(backedge_stmt_id);

    program.bb_mut(src_bb).succs[succ_idx] = backedge_bb_id;
    if let Some(flags) = program.bb_mut(src_bb).backedge.get_mut(succ_idx) {
        *flags = true;
    }
    program.bb_mut(backedge_bb_id).succs = Vec::new();

    restart_header_id
}
