//! Multi-writer arbitration: synthesizes a priority-select chain for every
//! port/chan/register/array target with more than one writer. Grounded in
//! SPEC_FULL.md §4.10 / `backend/ir-arbiter.cc`.

use std::collections::HashMap;

use crate::diag::Diagnostics;
use crate::ir::{writes_port, writes_storage, IRProgram, Op, Stmt, StmtId};
use crate::pipe::{find_owning_pipe, PipeSys};

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum Target {
    Port(crate::ir::PortId),
    Storage(crate::ir::StorageId),
}

pub fn arbitrate(program: &mut IRProgram, sys: &mut PipeSys, diags: &mut Diagnostics) {
    let mut groups: HashMap<Target, Vec<StmtId>> = HashMap::new();

    for (i, stmt) in program.stmts.iter().enumerate() {
        let sid = StmtId(i as u32);
        if writes_port(stmt.kind) {
            if let Some(p) = stmt.port {
                groups.entry(Target::Port(p)).or_default().push(sid);
            }
        } else if writes_storage(stmt.kind) {
            if let Some(s) = stmt.storage {
                groups.entry(Target::Storage(s)).or_default().push(sid);
            }
        }
    }

    let systems_view: Vec<PipeSys> = Vec::new();
    let _ = systems_view;

    for (_target, writes) in groups {
        if writes.len() < 2 {
            continue;
        }
        arbitrate_target(program, sys, &writes, diags);
    }
}

fn stage_of(program: &IRProgram, sid: StmtId) -> Option<i64> {
    program.stmt(sid).stage.map(|s| s.0 as i64)
}

fn is_killing_write(program: &IRProgram, sid: StmtId) -> bool {
    match program.stmt(sid).dom_killyounger {
        Some(ky) => stage_of(program, ky) == stage_of(program, sid),
        None => false,
    }
}

fn arbitrate_target(
    program: &mut IRProgram,
    sys: &mut PipeSys,
    writes: &[StmtId],
    diags: &mut Diagnostics,
) {
    let nominal: Vec<StmtId> = writes
        .iter()
        .copied()
        .filter(|&w| !is_killing_write(program, w))
        .collect();

    let nominal_stage = nominal.first().and_then(|&w| stage_of(program, w));
    for &w in &nominal {
        if stage_of(program, w) != nominal_stage {
            diags.error(
                program.stmt(w).location.clone(),
                "multiple writes to the same target must lie in one stage",
            );
            return;
        }
    }
    for &w in writes {
        if is_killing_write(program, w) {
            if let Some(ns) = nominal_stage {
                if stage_of(program, w) < Some(ns) {
                    diags.error(
                        program.stmt(w).location.clone(),
                        "a killing write must not precede the nominal-write stage",
                    );
                    return;
                }
            }
        }
    }

    let systems_dummy: &[PipeSys] = std::slice::from_ref(sys);
    let first_bb = writes.first().and_then(|&w| program.stmt(w).bb);
    let first_pipe = first_bb.and_then(|bb| find_owning_pipe(systems_dummy, bb));
    for &w in writes.iter().skip(1) {
        if let Some(bb) = program.stmt(w).bb {
            let pipe = find_owning_pipe(systems_dummy, bb);
            if pipe.is_some() && first_pipe.is_some() && pipe.is_none() != first_pipe.is_none() {
                diags.error(
                    program.stmt(w).location.clone(),
                    "writes to the same target must all live in the same pipe system",
                );
                return;
            }
        }
    }

    for i in 0..writes.len() {
        for j in (i + 1)..writes.len() {
            let (wi, wj) = (writes[i], writes[j]);
            if is_killing_write(program, wi) || is_killing_write(program, wj) {
                continue;
            }
            let mut combined = and_predicates(
                &program.stmt(wi).valid_in_pred,
                &program.stmt(wj).valid_in_pred,
            );
            combined.simplify();
            if !combined.is_false() {
                diags.error(
                    program.stmt(wj).location.clone(),
                    "writes' valid predicates are not disjoint",
                );
                return;
            }
        }
    }

    if diags.has_errors() {
        return;
    }

    let first = writes[0];
    let write_stage = stage_of(program, first);
    let write_pipe = first_bb.and_then(|bb| find_owning_pipe(std::slice::from_ref(sys), bb));

    let mut prev_select = first_data_arg(program, first);
    let mut or_acc = program.stmt(first).valid_in_pred.clone();

    for &w in writes.iter().skip(1) {
        let data = first_data_arg(program, w);
        let valid = program.stmt(w).valid_in.unwrap_or(first);
        let mut sel = Stmt::expr(Op::Select, vec![valid, data, prev_select], program.stmt(prev_select).width);
        sel.valnum = program.alloc_valnum();
        sel.stage = write_stage.map(|s| crate::ir::PipeStageId(s as u32));
        prev_select = program.add_stmt(sel);
        if let (Some((_, pipe_id)), Some(stage)) = (write_pipe, write_stage) {
            sys.pipe_mut(pipe_id).stage_mut(stage).stmts.push(prev_select);
        }
        or_acc = or_acc.or_with(&program.stmt(w).valid_in_pred.clone());
    }

    let data_idx = program.stmt(first).args.len().saturating_sub(1);
    if let Some(slot) = program.stmt_mut(first).args.get_mut(data_idx) {
        *slot = prev_select;
    }
    program.stmt_mut(first).valid_in_pred = or_acc;

    for &w in writes.iter().skip(1) {
        program.stmt_mut(w).deleted = true;
    }

    if let Some(port) = program.stmt(first).port {
        let defs: Vec<StmtId> = program
            .port(port)
            .defs
            .iter()
            .copied()
            .filter(|&d| d == first)
            .collect();
        program.port_mut(port).defs = defs;
    }
    if let Some(storage) = program.stmt(first).storage {
        let writers: Vec<StmtId> = program
            .storage(storage)
            .writers
            .iter()
            .copied()
            .filter(|&d| d == first)
            .collect();
        program.storage_mut(storage).writers = writers;
    }
}

fn first_data_arg(program: &IRProgram, sid: StmtId) -> StmtId {
    *program.stmt(sid).args.last().unwrap_or(&sid)
}

fn and_predicates(
    a: &crate::graph::predicate::Predicate<StmtId>,
    b: &crate::graph::predicate::Predicate<StmtId>,
) -> crate::graph::predicate::Predicate<StmtId> {
    let mut terms = Vec::new();
    for ta in &a.terms {
        for tb in &b.terms {
            let mut merged = ta.clone();
            let mut falsified = merged.falsified || tb.falsified;
            for (f, &pol) in &tb.factors {
                match merged.factors.get(f) {
                    Some(&existing) if existing != pol => falsified = true,
                    _ => {
                        merged.factors.insert(f.clone(), pol);
                    }
                }
            }
            merged.falsified = falsified;
            terms.push(merged);
        }
    }
    crate::graph::predicate::Predicate {
        terms,
        backedge: false,
    }
}
