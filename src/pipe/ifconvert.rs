//! If-conversion / predication: replaces control flow with per-statement
//! valid predicates, materializes those predicates as boolean expressions,
//! and eliminates phis via priority mux trees. Grounded in SPEC_FULL.md §4.6
//! / `backend/ir-ifconvert.cc`.

use std::collections::HashMap;

use num_bigint::BigInt;

use crate::diag::Diagnostics;
use crate::graph::predicate::Predicate;
use crate::graph::rpo::ReversePostorder;
use crate::graph::Successors;
use crate::ir::{BBId, IRProgram, Op, Stmt, StmtId, StmtKind};
use crate::pipe::{Pipe, PipeSys};

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

fn convert_pipe(program: &mut IRProgram, sys: &mut PipeSys, pipe_idx: usize, diags: &mut Diagnostics) {
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

    // Seed out-predicates for every valid-start BB (restart headers, and
    // non-restart roots).
    let mut bb_in_pred: HashMap<BBId, Predicate<StmtId>> = HashMap::new();
    let mut bb_out_preds: HashMap<BBId, Vec<Predicate<StmtId>>> = HashMap::new();

    for &root in &roots {
        seed_valid_start(program, root);
    }

    for &bb in rpo.order() {
        let preds: Vec<BBId> = rpo.preds(bb).iter().copied().filter(|p| bbs.contains(p)).collect();
        let in_pred = if roots.contains(&bb) {
            Predicate::new_true()
        } else {
            join_predecessor_outs(&preds, &bb_out_preds, program, bb)
        };
        bb_in_pred.insert(bb, in_pred.clone());
        program.bb_mut(bb).in_pred = in_pred.clone();

        let mut cur = in_pred;
        let stmts = program.bb(bb).stmts.clone();
        for &sid in &stmts {
            let kind = program.stmt(sid).kind;
            program.stmt_mut(sid).valid_in_pred = cur.clone();
            cur = match kind {
                StmtKind::Kill => Predicate::new_false(),
                StmtKind::KillIf => {
                    if let Some(&cond) = program.stmt(sid).args.first() {
                        cur.and_with(cond, false)
                    } else {
                        cur
                    }
                }
                _ if is_valid_start(program, sid) => program.stmt(sid).valid_out_pred.clone(),
                _ => cur,
            };
            program.stmt_mut(sid).valid_out_pred = cur.clone();
        }

        let succs = program.bb(bb).succs.clone();
        let last = stmts.last().copied();
        let out_preds: Vec<Predicate<StmtId>> = match last.map(|s| program.stmt(s).kind) {
            Some(StmtKind::If) => {
                let cond = program.stmt(last.unwrap()).args.first().copied();
                if let Some(cond) = cond {
                    vec![
                        cur.clone().and_with(cond, true),
                        cur.clone().and_with(cond, false),
                    ]
                } else {
                    succs.iter().map(|_| cur.clone()).collect()
                }
            }
            _ => succs.iter().map(|_| cur.clone()).collect(),
        };
        bb_out_preds.insert(bb, out_preds.clone());
        program.bb_mut(bb).out_preds = out_preds;
    }

    propagate_valid_spine(program, &bbs);
    materialize_predicates(program, &bbs);
    eliminate_phis(program, &bbs, diags);

    sys.pipes[pipe_idx].roots = roots;
}

fn seed_valid_start(program: &mut IRProgram, root: BBId) {
    let is_restart = program.bb(root).is_restart;
    let stmts = program.bb(root).stmts.clone();
    for sid in stmts {
        if matches!(
            program.stmt(sid).kind,
            StmtKind::RestartValue | StmtKind::RestartValueSrc
        ) {
            program.stmt_mut(sid).is_valid_start = true;
            let mut p = Predicate::new_true().and_with(sid, true);
            if is_restart {
                p = p.set_backedge();
            }
            program.stmt_mut(sid).valid_out_pred = p;
        }
    }
    if !is_restart {
        // Entry-point valid: synthesize a dedicated valid-start statement at
        // the head of a non-restart root if one does not already exist.
        if let Some(&first) = program.bb(root).stmts.first() {
            if !program.stmt(first).is_valid_start {
                program.stmt_mut(first).is_valid_start = true;
                program.stmt_mut(first).valid_out_pred =
                    Predicate::new_true().and_with(first, true);
            }
        }
    }
}

fn is_valid_start(program: &IRProgram, sid: StmtId) -> bool {
    program.stmt(sid).is_valid_start
}

fn join_predecessor_outs(
    preds: &[BBId],
    bb_out_preds: &HashMap<BBId, Vec<Predicate<StmtId>>>,
    program: &IRProgram,
    bb: BBId,
) -> Predicate<StmtId> {
    let mut acc = Predicate::new_false();
    for &pred in preds {
        let Some(idx) = program.bb(pred).which_succ(bb) else {
            continue;
        };
        if let Some(outs) = bb_out_preds.get(&pred) {
            if let Some(p) = outs.get(idx) {
                acc = acc.or_with(p);
            }
        }
    }
    acc
}

/// Sticky `valid_spine` bit: propagate through argument edges to a fixpoint.
fn propagate_valid_spine(program: &mut IRProgram, bbs: &[BBId]) {
    let mut changed = true;
    while changed {
        changed = false;
        for &bb in bbs {
            let stmts = program.bb(bb).stmts.clone();
            for sid in stmts {
                if program.stmt(sid).is_valid_start && !program.stmt(sid).valid_spine {
                    program.stmt_mut(sid).valid_spine = true;
                    changed = true;
                }
                if program.stmt(sid).valid_spine {
                    let args = program.stmt(sid).args.clone();
                    for arg in args {
                        if !program.stmt(arg).valid_spine {
                            program.stmt_mut(arg).valid_spine = true;
                            changed = true;
                        }
                    }
                }
            }
        }
    }
}

/// Builds concrete boolean-expression statements realizing each predicate,
/// memoized by DNF form so equal predicates share one expression.
fn materialize_predicates(program: &mut IRProgram, bbs: &[BBId]) {
    let mut memo: HashMap<Predicate<StmtId>, StmtId> = HashMap::new();

    for &bb in bbs {
        let stmts = program.bb(bb).stmts.clone();
        for sid in stmts {
            let in_pred = program.stmt(sid).valid_in_pred.clone();
            let vin = materialize(program, &mut memo, &in_pred);
            program.stmt_mut(sid).valid_in = Some(vin);

            let out_pred = program.stmt(sid).valid_out_pred.clone();
            let vout = materialize(program, &mut memo, &out_pred);
            program.stmt_mut(sid).valid_out = Some(vout);

            if program.stmt(sid).kind == StmtKind::RestartValueSrc {
                let backedge_bb = program.stmt(sid).bb.unwrap();
                program.bb_mut(backedge_bb).in_valid = Some(vin);
            }
        }

        let out_preds = program.bb(bb).out_preds.clone();
        let mut out_valids = Vec::new();
        for p in &out_preds {
            out_valids.push(materialize(program, &mut memo, p));
        }
        program.bb_mut(bb).out_valids = out_valids;
    }
}

fn materialize(
    program: &mut IRProgram,
    memo: &mut HashMap<Predicate<StmtId>, StmtId>,
    pred: &Predicate<StmtId>,
) -> StmtId {
    let mut canon = pred.clone();
    canon.simplify();
    if let Some(&existing) = memo.get(&canon) {
        return existing;
    }

    let result = if canon.is_true() {
        let mut s = Stmt::expr(Op::Const, vec![], 1);
        s.constant = Some(BigInt::from(1));
        s.valnum = program.alloc_valnum();
        program.add_stmt(s)
    } else if canon.is_false() {
        let mut s = Stmt::expr(Op::Const, vec![], 1);
        s.constant = Some(BigInt::from(0));
        s.valnum = program.alloc_valnum();
        program.add_stmt(s)
    } else {
        let mut term_ids = Vec::new();
        for term in &canon.terms {
            let mut factor_ids: Vec<StmtId> = Vec::new();
            for (&factor, &polarity) in &term.factors {
                if polarity {
                    factor_ids.push(factor);
                } else {
                    let mut not_stmt = Stmt::expr(Op::Not, vec![factor], 1);
                    not_stmt.valnum = program.alloc_valnum();
                    factor_ids.push(program.add_stmt(not_stmt));
                }
            }
            let term_id = if factor_ids.is_empty() {
                let mut s = Stmt::expr(Op::Const, vec![], 1);
                s.constant = Some(BigInt::from(1));
                s.valnum = program.alloc_valnum();
                program.add_stmt(s)
            } else {
                fold_binary(program, Op::And, &factor_ids)
            };
            term_ids.push(term_id);
        }
        fold_binary(program, Op::Or, &term_ids)
    };

    memo.insert(canon, result);
    result
}

fn fold_binary(program: &mut IRProgram, op: Op, ids: &[StmtId]) -> StmtId {
    let mut acc = ids[0];
    for &next in &ids[1..] {
        let mut s = Stmt::expr(op, vec![acc, next], 1);
        s.valnum = program.alloc_valnum();
        acc = program.add_stmt(s);
    }
    acc
}

/// Eliminates phis via priority-ordered mux trees; consumers are rewritten
/// through a path-compressing replacement map.
fn eliminate_phis(program: &mut IRProgram, bbs: &[BBId], _diags: &mut Diagnostics) {
    let mut replacement: HashMap<StmtId, StmtId> = HashMap::new();
    let mut phi_stmts = Vec::new();
    let mut memo: HashMap<Predicate<StmtId>, StmtId> = HashMap::new();

    for &bb in bbs {
        for &sid in &program.bb(bb).stmts {
            if program.stmt(sid).kind == StmtKind::Phi {
                phi_stmts.push(sid);
            }
        }
    }

    for phi in phi_stmts.clone() {
        let args = program.stmt(phi).args.clone();
        let mut live: Vec<(StmtId, Predicate<StmtId>)> = Vec::new();
        for &arg in &args {
            let mut pred = program.stmt(arg).valid_out_pred.clone();
            pred.simplify();
            if !pred.is_false() {
                live.push((arg, pred));
            }
        }

        if live.is_empty() {
            continue;
        }

        while live.len() > 1 {
            let mut next_layer = Vec::new();
            let mut i = 0;
            while i + 1 < live.len() {
                let (a_val, a_pred) = live[i].clone();
                let (b_val, b_pred) = live[i + 1].clone();
                let chosen_pred = choose_selector(&a_pred, &b_pred);
                let selector = materialize(program, &mut memo, &chosen_pred);
                let mut sel = Stmt::expr(Op::Select, vec![selector, b_val, a_val], program.stmt(a_val).width);
                sel.valnum = program.alloc_valnum();
                let sel_id = program.add_stmt(sel);
                let joined = a_pred.or_with(&b_pred);
                next_layer.push((sel_id, joined));
                i += 2;
            }
            if i < live.len() {
                next_layer.push(live[i].clone());
            }
            live = next_layer;
        }

        let (root_val, _) = live[0].clone();
        replacement.insert(phi, root_val);
    }

    // Path-compress the replacement map.
    for &phi in &phi_stmts {
        let mut target = phi;
        let mut seen = std::collections::HashSet::new();
        while let Some(&next) = replacement.get(&target) {
            if !seen.insert(target) {
                break;
            }
            target = next;
        }
        replacement.insert(phi, target);
    }

    for stmt in program.stmts.iter_mut() {
        for arg in stmt.args.iter_mut() {
            if let Some(&r) = replacement.get(arg) {
                *arg = r;
            }
        }
    }

    for &phi in &phi_stmts {
        program.stmt_mut(phi).deleted = true;
    }

    // Phis are gone and every successor edge has been folded into a valid
    // predicate, so the control-flow statements that drove those edges
    // (`if`/`jmp`) carry no further meaning for the scheduled form; strip
    // them alongside the phis rather than let them reach the emitter.
    for &bb in bbs {
        let stmts = program.bb(bb).stmts.clone();
        for &sid in &stmts {
            if matches!(program.stmt(sid).kind, StmtKind::If | StmtKind::Jmp) {
                program.stmt_mut(sid).deleted = true;
            }
        }
        let kept: Vec<StmtId> = stmts
            .into_iter()
            .filter(|&s| {
                !matches!(
                    program.stmt(s).kind,
                    StmtKind::Phi | StmtKind::If | StmtKind::Jmp
                )
            })
            .collect();
        program.bb_mut(bb).stmts = kept;
    }
}

/// Selector priority: prefer a backedge-flagged predicate, then any
/// non-tautological predicate, else either. The caller materializes the
/// chosen predicate's full boolean expression to use as the select's
/// condition.
fn choose_selector(a: &Predicate<StmtId>, b: &Predicate<StmtId>) -> Predicate<StmtId> {
    if a.backedge {
        a.clone()
    } else if b.backedge {
        b.clone()
    } else if !a.is_true() {
        a.clone()
    } else {
        b.clone()
    }
}
