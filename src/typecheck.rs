//! Port/storage/bypass width derivation, per-opcode width rules, control
//! well-formedness, and phi/dominance checks. Runs after crosslinking.
//! Grounded in SPEC_FULL.md §4.3 and `backend/ir-typecheck.cc`.

use crate::diag::Diagnostics;
use crate::graph::domtree::DomTree;
use crate::graph::Successors;
use crate::ir::{BBId, IRProgram, Op, PortKind, StmtId, StmtKind, TXN_ID_WIDTH};

struct CfgView<'a>(&'a IRProgram);

impl<'a> Successors<BBId> for CfgView<'a> {
    fn successors(&self, node: BBId) -> Vec<BBId> {
        self.0.bb(node).succs.clone()
    }
}

pub fn typecheck(program: &mut IRProgram, diags: &mut Diagnostics) -> bool {
    let mut ok = true;

    if program.entries.is_empty() {
        diags.error(crate::diag::Location::nowhere(), "no entry points");
        return false;
    }

    ok &= derive_port_widths(program, diags);
    ok &= derive_storage_widths(program, diags);
    ok &= derive_bypass_widths(program, diags);
    ok &= check_opcode_widths(program, diags);
    ok &= check_control_wellformedness(program, diags);
    ok &= check_phi_dominance(program, diags);

    ok
}

fn derive_port_widths(program: &mut IRProgram, diags: &mut Diagnostics) -> bool {
    let mut ok = true;
    for i in 0..program.ports.len() {
        let port_id = crate::ir::PortId(i as u32);
        let (defs, uses) = {
            let p = program.port(port_id);
            (p.defs.clone(), p.uses.clone())
        };

        let mut width = None;
        for &sid in defs.iter().chain(uses.iter()) {
            let stmt = program.stmt(sid);
            let w = if let Some(&arg) = stmt.args.first() {
                program.stmt(arg).width
            } else {
                stmt.width
            };
            width = Some(w);
            break;
        }

        let Some(width) = width else {
            continue;
        };

        for &sid in &defs {
            let arg_width = program.stmt(sid).args.first().map(|&a| program.stmt(a).width);
            if arg_width.is_some() && arg_width != Some(width) {
                diags.error(
                    program.stmt(sid).location.clone(),
                    format!(
                        "Port '{}' writer width mismatch",
                        program.port(port_id).name
                    ),
                );
                ok = false;
            }
        }
        for &sid in &uses {
            let use_width = program.stmt(sid).width;
            if use_width != 0 && use_width != width {
                diags.error(
                    program.stmt(sid).location.clone(),
                    format!(
                        "Port '{}' reader width mismatch",
                        program.port(port_id).name
                    ),
                );
                ok = false;
            }
        }

        let port = program.port_mut(port_id);
        port.width = width;

        if port.exported && port.kind != PortKind::Port {
            diags.error(
                crate::diag::Location::nowhere(),
                format!("Only PORT ports may be exported: '{}'", port.name),
            );
            ok = false;
        }
    }
    ok
}

fn derive_storage_widths(program: &mut IRProgram, diags: &mut Diagnostics) -> bool {
    let mut ok = true;
    for i in 0..program.storage.len() {
        let storage_id = crate::ir::StorageId(i as u32);
        let (writers, readers) = {
            let s = program.storage(storage_id);
            (s.writers.clone(), s.readers.clone())
        };

        if writers.is_empty() {
            diags.error(
                crate::diag::Location::nowhere(),
                format!(
                    "Storage '{}' has no writer",
                    program.storage(storage_id).name
                ),
            );
            ok = false;
            continue;
        }

        if writers.len() > 1 && program.storage(storage_id).is_register() {
            diags.error(
                program.stmt(writers[1]).location.clone(),
                format!(
                    "Register '{}' has more than one writer",
                    program.storage(storage_id).name
                ),
            );
            ok = false;
        }

        let mut data_width = None;
        let mut index_width = None;
        for &sid in &writers {
            let stmt = program.stmt(sid);
            let dw = stmt.args.last().map(|&a| program.stmt(a).width).unwrap_or(stmt.width);
            let iw = if stmt.kind == StmtKind::ArrayWrite {
                stmt.args.first().map(|&a| program.stmt(a).width).unwrap_or(0)
            } else {
                0
            };
            match data_width {
                None => data_width = Some(dw),
                Some(w) if w != dw => {
                    diags.error(
                        stmt.location.clone(),
                        format!(
                            "Storage '{}' writers disagree on data width",
                            program.storage(storage_id).name
                        ),
                    );
                    ok = false;
                }
                _ => {}
            }
            match index_width {
                None => index_width = Some(iw),
                Some(w) if w != iw => {
                    diags.error(
                        stmt.location.clone(),
                        format!(
                            "Storage '{}' writers disagree on index width",
                            program.storage(storage_id).name
                        ),
                    );
                    ok = false;
                }
                _ => {}
            }
        }

        for &sid in &readers {
            let stmt = program.stmt(sid);
            if stmt.width != 0 && Some(stmt.width) != data_width {
                diags.error(
                    stmt.location.clone(),
                    format!(
                        "Storage '{}' reader data width mismatch",
                        program.storage(storage_id).name
                    ),
                );
                ok = false;
            }
        }

        let storage = program.storage_mut(storage_id);
        storage.data_width = data_width.unwrap_or(0);
        storage.index_width = index_width.unwrap_or(0);

        if storage.index_width >= 64 {
            diags.error(
                crate::diag::Location::nowhere(),
                format!(
                    "Storage '{}' index width too large ({})",
                    storage.name, storage.index_width
                ),
            );
            ok = false;
        }
    }
    ok
}

fn derive_bypass_widths(program: &mut IRProgram, diags: &mut Diagnostics) -> bool {
    let mut ok = true;
    for i in 0..program.bypasses.len() {
        let bypass_id = crate::ir::BypassId(i as u32);
        let writes = program.bypass(bypass_id).writes.clone();

        let mut width = None;
        for &sid in &writes {
            let stmt = program.stmt(sid);
            let w = stmt.args.first().map(|&a| program.stmt(a).width).unwrap_or(stmt.width);
            match width {
                None => width = Some(w),
                Some(prev) if prev != w => {
                    diags.error(
                        stmt.location.clone(),
                        format!(
                            "Bypass network '{}' writes disagree on width",
                            program.bypass(bypass_id).name
                        ),
                    );
                    ok = false;
                }
                _ => {}
            }
        }
        program.bypass_mut(bypass_id).width = width.unwrap_or(0);
    }
    ok
}

fn check_opcode_widths(program: &IRProgram, diags: &mut Diagnostics) -> bool {
    let mut ok = true;
    for stmt in &program.stmts {
        if stmt.kind != StmtKind::Expr {
            continue;
        }
        let loc = stmt.location.clone();
        let arg_widths: Vec<i32> = stmt.args.iter().map(|&a| program.stmt(a).width).collect();

        if arg_widths.iter().any(|&w| w == TXN_ID_WIDTH) && stmt.op != Op::None {
            diags.error(
                loc.clone(),
                "Transaction-ID-typed values cannot be computed by expression ops",
            );
            ok = false;
            continue;
        }

        let expected = match stmt.op {
            Op::None | Op::Const => continue,
            Op::Add | Op::Sub | Op::And | Op::Or | Op::Xor => {
                if arg_widths.len() < 2 || arg_widths[0] != arg_widths[1] {
                    diags.error(loc.clone(), "Binary op argument widths disagree");
                    ok = false;
                    continue;
                }
                arg_widths[0]
            }
            Op::Not => arg_widths.first().copied().unwrap_or(0),
            Op::Mul => arg_widths.iter().sum(),
            Op::Lsh | Op::Rsh => arg_widths.first().copied().unwrap_or(0),
            Op::Bitslice => {
                let (Some(&hi), Some(&lo)) = (arg_widths.get(0), arg_widths.get(1)) else {
                    diags.error(loc.clone(), "Bitslice requires constant bounds");
                    ok = false;
                    continue;
                };
                let _ = (hi, lo);
                let width = stmt.width;
                if width == 0 {
                    diags.error(loc.clone(), "Zero-width bitslice is a type error");
                    ok = false;
                    continue;
                }
                width
            }
            Op::Concat => arg_widths.iter().sum(),
            Op::Select => {
                if arg_widths.len() < 3 {
                    diags.error(loc.clone(), "Select requires two data args and a selector");
                    ok = false;
                    continue;
                }
                if arg_widths[0] != arg_widths[1] {
                    diags.error(loc.clone(), "Select data arguments must have equal widths");
                    ok = false;
                    continue;
                }
                if arg_widths[2] != 1 {
                    diags.error(loc.clone(), "Select condition must be 1 bit");
                    ok = false;
                    continue;
                }
                arg_widths[0]
            }
            Op::CmpLT | Op::CmpLE | Op::CmpEQ | Op::CmpNE | Op::CmpGT | Op::CmpGE => {
                if arg_widths.len() < 2 || arg_widths[0] != arg_widths[1] {
                    diags.error(loc.clone(), "Comparison argument widths disagree");
                    ok = false;
                    continue;
                }
                1
            }
            Op::Div => arg_widths.first().copied().unwrap_or(0),
            Op::Rem => arg_widths.get(1).copied().unwrap_or(0),
        };

        if stmt.width != expected && !matches!(stmt.op, Op::Bitslice) {
            diags.error(
                loc,
                format!(
                    "Expression width mismatch: expected {}, found {}",
                    expected, stmt.width
                ),
            );
            ok = false;
        }
    }
    ok
}

fn check_control_wellformedness(program: &IRProgram, diags: &mut Diagnostics) -> bool {
    let mut ok = true;
    for (i, bb) in program.bbs.iter().enumerate() {
        let Some(&last) = bb.stmts.last() else {
            diags.error(bb.location.clone(), format!("Empty BB '{}'", bb.label));
            ok = false;
            continue;
        };
        let last_kind = program.stmt(last).kind;
        if !matches!(
            last_kind,
            StmtKind::If | StmtKind::Jmp | StmtKind::Kill | StmtKind::KillYounger | StmtKind::Done
        ) {
            diags.error(
                program.stmt(last).location.clone(),
                format!("BB '{}' does not end in a terminator", bb.label),
            );
            ok = false;
        }
        if last_kind == StmtKind::If {
            let targets = &program.stmt(last).targets;
            if targets.len() != 2 || targets[0] == targets[1] {
                diags.error(
                    program.stmt(last).location.clone(),
                    "if statement must have two distinct successors",
                );
                ok = false;
            }
        }
        let _ = i;
    }
    ok
}

fn check_phi_dominance(program: &IRProgram, diags: &mut Diagnostics) -> bool {
    let mut ok = true;
    let view = CfgView(program);
    let dt = DomTree::compute(&view, &program.roots());

    for stmt in &program.stmts {
        if stmt.kind != StmtKind::Phi {
            continue;
        }
        let Some(owner_bb) = stmt.bb else { continue };
        let preds: Vec<BBId> = program
            .bbs
            .iter()
            .enumerate()
            .filter(|(_, b)| b.succs.contains(&owner_bb))
            .map(|(idx, _)| BBId(idx as u32))
            .collect();

        if stmt.args.len() != preds.len() {
            diags.error(
                stmt.location.clone(),
                "Phi argument count does not match predecessor count",
            );
            ok = false;
        }

        for &arg in &stmt.args {
            let def_bb = program.stmt(arg).bb;
            if let Some(def_bb) = def_bb {
                if !dt.dom(def_bb, owner_bb) && def_bb != owner_bb {
                    diags.error(
                        stmt.location.clone(),
                        "Phi argument does not dominate its use",
                    );
                    ok = false;
                }
            }
        }
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Location;
    use crate::ir::Stmt;

    fn simple_program() -> IRProgram {
        let mut program = IRProgram::new();
        let mut bb = crate::ir::BB::new("entry");
        bb.is_entry = true;
        bb.location = Location::nowhere();
        let bb_id = program.add_bb(bb);

        let mut done = Stmt::new(StmtKind::Done);
        done.valnum = program.alloc_valnum();
        done.bb = Some(bb_id);
        let done_id = program.add_stmt(done);
        program.bb_mut(bb_id).stmts.push(done_id);
        program.entries.push(bb_id);
        program.crosslinked_args_bbs = true;
        program
    }

    #[test]
    fn empty_entries_is_error() {
        let mut program = IRProgram::new();
        let mut diags = Diagnostics::new();
        assert!(!typecheck(&mut program, &mut diags));
        assert!(diags.has_errors());
    }

    #[test]
    fn minimal_valid_program_typechecks() {
        let mut program = simple_program();
        let mut diags = Diagnostics::new();
        assert!(typecheck(&mut program, &mut diags));
        assert!(!diags.has_errors());
    }

    #[test]
    fn binary_op_width_mismatch_is_error() {
        let mut program = simple_program();
        let mut a = Stmt::expr(Op::Const, vec![], 8);
        a.valnum = program.alloc_valnum();
        let a_id = program.add_stmt(a);
        let mut b = Stmt::expr(Op::Const, vec![], 16);
        b.valnum = program.alloc_valnum();
        let b_id = program.add_stmt(b);
        let mut add = Stmt::expr(Op::Add, vec![a_id, b_id], 8);
        add.valnum = program.alloc_valnum();
        program.add_stmt(add);

        let mut diags = Diagnostics::new();
        assert!(!typecheck(&mut program, &mut diags));
        assert!(diags.has_errors());
    }
}
