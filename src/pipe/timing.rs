//! Timing DAG and two-phase (ASAP/ALAP) scheduler. Grounded in SPEC_FULL.md
//! §4.8 / `backend/timing.cc`.

use std::collections::{HashMap, HashSet};

use crate::diag::Diagnostics;
use crate::ir::{IRProgram, Op, PipeStageId, Stmt, StmtId, StmtKind, TimingModelKind};
use crate::pipe::{Pipe, PipeSys};

pub const GATES_PER_STAGE_STANDARD: u32 = 32;
const MAX_VAR_UPDATES: u32 = 100;

pub trait TimingModel {
    fn delay(&self, program: &IRProgram, stmt: &Stmt) -> u32;
    fn gates_per_stage(&self) -> u32;
}

pub struct StandardModel;
pub struct NullModel;

fn log2_ceil(w: i32) -> u32 {
    if w <= 1 {
        0
    } else {
        (32 - ((w - 1) as u32).leading_zeros()).max(1)
    }
}

fn add_stages(w: i32) -> u32 {
    4 * log2_ceil(w) + 2
}

impl TimingModel for StandardModel {
    fn delay(&self, program: &IRProgram, stmt: &Stmt) -> u32 {
        if stmt.kind != StmtKind::Expr {
            return 0;
        }
        let w = stmt.width.max(1);
        let arg_width = |i: usize| {
            stmt.args
                .get(i)
                .map(|&a| program.stmt(a).width)
                .unwrap_or(w)
        };
        match stmt.op {
            Op::None | Op::Const => 0,
            Op::Add | Op::Sub => add_stages(w),
            Op::Mul => 3 * log2_ceil(w) + 1 + add_stages(w),
            Op::Div | Op::Rem => {
                let dividend_w = arg_width(0);
                (w as u32) * 2 * add_stages(dividend_w)
            }
            Op::And | Op::Or | Op::Not => 1,
            Op::Xor => 2,
            Op::Lsh | Op::Rsh => {
                // Constant-amount shifts cost 0; variable-amount shifts cost
                // a barrel shifter proportional to the shift-amount width.
                let shift_w = arg_width(1);
                if stmt.args.len() > 1 && program.stmt(stmt.args[1]).constant.is_none() {
                    2 * shift_w as u32
                } else {
                    0
                }
            }
            Op::Bitslice | Op::Concat => 0,
            Op::Select => 2,
            Op::CmpLT | Op::CmpLE | Op::CmpGT | Op::CmpGE => add_stages(w),
            Op::CmpEQ | Op::CmpNE => 2 + log2_ceil(w),
        }
    }

    fn gates_per_stage(&self) -> u32 {
        GATES_PER_STAGE_STANDARD
    }
}

impl TimingModel for NullModel {
    fn delay(&self, _program: &IRProgram, _stmt: &Stmt) -> u32 {
        0
    }
    fn gates_per_stage(&self) -> u32 {
        1
    }
}

pub fn model_for(kind: TimingModelKind) -> Box<dyn TimingModel> {
    match kind {
        TimingModelKind::Standard => Box::new(StandardModel),
        TimingModelKind::Null => Box::new(NullModel),
    }
}

pub fn schedule(program: &mut IRProgram, sys: &mut PipeSys, diags: &mut Diagnostics) {
    let model = model_for(program.timing_model);

    // Build one combined node set across all pipes in the system, since
    // timing-variable constraints (backedge pairs) can span pipes.
    let mut all_stmts: Vec<StmtId> = Vec::new();
    for pipe in &sys.pipes {
        all_stmts.extend(pipe.flat_stmts.iter().copied());
    }

    if has_cycle(program, &all_stmts) {
        diags.error(
            crate::diag::Location::nowhere(),
            "timing dependency graph contains a cycle",
        );
        return;
    }

    let budget = model.gates_per_stage();
    for &sid in &all_stmts {
        let d = model.delay(program, program.stmt(sid));
        if d > budget {
            diags.error(
                program.stmt(sid).location.clone(),
                "node delay exceeds per-stage budget",
            );
        }
    }
    if diags.has_errors() {
        return;
    }

    let mut stage: HashMap<StmtId, i64> = HashMap::new();
    let mut offset: HashMap<StmtId, u32> = HashMap::new();
    let mut var_stage: HashMap<u32, i64> = HashMap::new();
    let mut var_updates: HashMap<u32, u32> = HashMap::new();

    let order = topo_order(program, &all_stmts);

    // Forward (ASAP) pass, run to fixpoint.
    loop {
        let mut changed = false;
        for &sid in &order {
            let stmt = program.stmt(sid);
            let d = model.delay(program, stmt);
            let mut natural_stage = 1i64;
            let mut natural_offset = 0u32;
            for &dep in &dep_list(stmt) {
                let (ps, po) = (
                    stage.get(&dep).copied().unwrap_or(1),
                    offset.get(&dep).copied().unwrap_or(0),
                );
                let dep_delay = model.delay(program, program.stmt(dep));
                let mut cand_stage = ps;
                let mut cand_offset = po + dep_delay;
                if cand_offset + d > budget {
                    cand_stage += 1;
                    cand_offset = 0;
                }
                if cand_stage > natural_stage
                    || (cand_stage == natural_stage && cand_offset > natural_offset)
                {
                    natural_stage = cand_stage;
                    natural_offset = cand_offset;
                }
            }

            if let Some(tv) = stmt.timevar {
                if let Some(&vstage) = var_stage.get(&tv.0) {
                    let implied = vstage + stmt.time_offset as i64;
                    if implied > natural_stage {
                        natural_stage = implied;
                        natural_offset = 0;
                    }
                }
                // Every statement pinned to this variable re-derives its
                // basis from wherever it lands. Two statements with
                // incompatible offsets never settle on a shared basis: each
                // pass nudges the variable a little further out, so the
                // update count is the signal that the constraint graph
                // (which spans timevars and isn't caught by `has_cycle`,
                // since that only walks args/pipedag_deps/valid_in) has no
                // fixpoint.
                let new_basis = natural_stage - stmt.time_offset as i64;
                if var_stage.get(&tv.0) != Some(&new_basis) {
                    var_stage.insert(tv.0, new_basis);
                    let updates = var_updates.entry(tv.0).or_insert(0);
                    *updates += 1;
                    if *updates > MAX_VAR_UPDATES {
                        diags.error(
                            stmt.location.clone(),
                            "unsatisfiable timing-variable constraints",
                        );
                        return;
                    }
                }
            }

            if stage.get(&sid).copied() != Some(natural_stage)
                || offset.get(&sid).copied() != Some(natural_offset)
            {
                changed = true;
            }
            stage.insert(sid, natural_stage);
            offset.insert(sid, natural_offset);
        }
        if !changed {
            break;
        }
    }

    // Anchors: nodes pinned to a timing variable are already fully
    // constrained by the forward pass, and sink nodes (nothing in the
    // combined node set depends on them) gain nothing from sliding later.
    // Every other node is free to sink as late as its latest dependent
    // allows.
    let mut successors: HashMap<StmtId, Vec<StmtId>> = HashMap::new();
    for &sid in &all_stmts {
        for dep in dep_list(program.stmt(sid)) {
            if stage.contains_key(&dep) {
                successors.entry(dep).or_default().push(sid);
            }
        }
    }
    let is_anchor = |sid: StmtId| -> bool {
        program.stmt(sid).timevar.is_some()
            || successors.get(&sid).map(|s| s.is_empty()).unwrap_or(true)
    };

    // Backward (ALAP) fixpoint over the reversed edges: a non-anchored node
    // sinks as late as the earliest (most restrictive) of its dependents'
    // stages allows, never past its own ASAP floor.
    let mut alap: HashMap<StmtId, i64> = stage.clone();
    loop {
        let mut changed = false;
        for &sid in order.iter().rev() {
            if is_anchor(sid) {
                continue;
            }
            let Some(succs) = successors.get(&sid) else {
                continue;
            };
            if succs.is_empty() {
                continue;
            }
            let latest = succs
                .iter()
                .map(|succ| alap.get(succ).copied().unwrap_or(1))
                .min()
                .unwrap_or(1);
            let asap = stage.get(&sid).copied().unwrap_or(1);
            let new_stage = latest.max(asap);
            if alap.get(&sid).copied() != Some(new_stage) {
                alap.insert(sid, new_stage);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    for &sid in &all_stmts {
        let s = alap.get(&sid).copied().unwrap_or(1).max(1);
        program.stmt_mut(sid).stage = Some(PipeStageId(s as u32));
    }

    assign_stages(sys, program, &alap);
}

fn dep_list(stmt: &Stmt) -> Vec<StmtId> {
    let mut deps = stmt.args.clone();
    deps.extend(stmt.pipedag_deps.iter().copied());
    if let Some(vin) = stmt.valid_in {
        deps.push(vin);
    }
    deps
}

fn has_cycle(program: &IRProgram, stmts: &[StmtId]) -> bool {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }
    let mut color: HashMap<StmtId, Color> = stmts.iter().map(|&s| (s, Color::White)).collect();
    let universe: HashSet<StmtId> = stmts.iter().copied().collect();

    fn visit(
        program: &IRProgram,
        node: StmtId,
        color: &mut HashMap<StmtId, Color>,
        universe: &HashSet<StmtId>,
    ) -> bool {
        color.insert(node, Color::Gray);
        for dep in dep_list(program.stmt(node)) {
            if !universe.contains(&dep) {
                continue;
            }
            match color.get(&dep).copied().unwrap_or(Color::White) {
                Color::Gray => return true,
                Color::White => {
                    if visit(program, dep, color, universe) {
                        return true;
                    }
                }
                Color::Black => {}
            }
        }
        color.insert(node, Color::Black);
        false
    }

    for &sid in stmts {
        if color.get(&sid).copied() == Some(Color::White) {
            if visit(program, sid, &mut color, &universe) {
                return true;
            }
        }
    }
    false
}

fn topo_order(program: &IRProgram, stmts: &[StmtId]) -> Vec<StmtId> {
    let universe: HashSet<StmtId> = stmts.iter().copied().collect();
    let mut visited: HashSet<StmtId> = HashSet::new();
    let mut order = Vec::new();

    fn visit(
        program: &IRProgram,
        node: StmtId,
        visited: &mut HashSet<StmtId>,
        universe: &HashSet<StmtId>,
        order: &mut Vec<StmtId>,
    ) {
        if !visited.insert(node) {
            return;
        }
        for dep in dep_list(program.stmt(node)) {
            if universe.contains(&dep) {
                visit(program, dep, visited, universe, order);
            }
        }
        order.push(node);
    }

    for &sid in stmts {
        visit(program, sid, &mut visited, &universe, &mut order);
    }
    order
}

fn assign_stages(sys: &mut PipeSys, program: &IRProgram, stage: &HashMap<StmtId, i64>) {
    for pipe in &mut sys.pipes {
        assign_pipe_stages(pipe, program, stage);
    }
}

fn assign_pipe_stages(pipe: &mut Pipe, _program: &IRProgram, stage: &HashMap<StmtId, i64>) {
    let mut max_stage = 0i64;
    for &sid in &pipe.flat_stmts {
        if let Some(&s) = stage.get(&sid) {
            max_stage = max_stage.max(s);
        }
    }
    for i in 0..=max_stage {
        pipe.stage_mut(i);
    }
    for &sid in &pipe.flat_stmts {
        if let Some(&s) = stage.get(&sid) {
            pipe.stage_mut(s).stmts.push(sid);
        }
    }
}
