//! Resolves textual references (value numbers, BB labels, port/storage/
//! bypass names) into arena IDs and groups statements into named
//! aggregates. Grounded in `backend/ir-crosslinker.cc`.

use std::collections::HashMap;

use crate::diag::{Diagnostics, Location};
use crate::ir::{
    self, is_bypass_stmt, reads_port, reads_storage, writes_port, writes_storage, Bypass,
    IRProgram, Port, PortKind, Storage, StmtId, StmtKind,
};

pub fn crosslink(program: &mut IRProgram, diags: &mut Diagnostics) -> bool {
    set_bb_backpointers(program);

    if !program.crosslinked_args_bbs {
        let Some(bb_map) = build_bb_map(program, diags) else {
            return false;
        };
        let Some(valnum_map) = build_valnum_map(program, diags) else {
            return false;
        };
        if !link_stmts(program, &bb_map, &valnum_map, diags) {
            return false;
        }
        program.crosslinked_args_bbs = true;
    }

    if !create_ports(program, diags) {
        return false;
    }
    if !create_storage(program, diags) {
        return false;
    }
    if !create_bypasses(program, diags) {
        return false;
    }

    true
}

fn set_bb_backpointers(program: &mut IRProgram) {
    for bb_idx in 0..program.bbs.len() {
        let bb_id = ir::BBId(bb_idx as u32);
        let stmt_ids: Vec<StmtId> = program.bb(bb_id).stmts.clone();
        for sid in stmt_ids {
            program.stmt_mut(sid).bb = Some(bb_id);
        }
    }
}

fn build_bb_map(
    program: &IRProgram,
    diags: &mut Diagnostics,
) -> Option<HashMap<String, ir::BBId>> {
    let mut map = HashMap::new();
    for (i, bb) in program.bbs.iter().enumerate() {
        let id = ir::BBId(i as u32);
        if let Some(prev) = map.insert(bb.label.clone(), id) {
            let prev_loc: Location = program.bb(prev).location.clone();
            diags.error(
                bb.location.clone(),
                format!(
                    "Duplicate basic-block label '{}': previous was at {}",
                    bb.label, prev_loc
                ),
            );
            return None;
        }
    }
    Some(map)
}

fn build_valnum_map(
    program: &IRProgram,
    diags: &mut Diagnostics,
) -> Option<HashMap<i64, StmtId>> {
    let mut map = HashMap::new();
    for (i, stmt) in program.stmts.iter().enumerate() {
        let id = StmtId(i as u32);
        if let Some(prev) = map.insert(stmt.valnum, id) {
            let prev_loc = program.stmt(prev).location.clone();
            diags.error(
                stmt.location.clone(),
                format!(
                    "Value number duplicated: original use at {}",
                    prev_loc
                ),
            );
            return None;
        }
    }
    Some(map)
}

fn link_stmts(
    program: &mut IRProgram,
    bb_map: &HashMap<String, ir::BBId>,
    valnum_map: &HashMap<i64, StmtId>,
    diags: &mut Diagnostics,
) -> bool {
    let mut ok = true;
    for i in 0..program.stmts.len() {
        let sid = StmtId(i as u32);
        let target_names = program.stmt(sid).target_names.clone();
        let arg_nums = program.stmt(sid).arg_nums.clone();
        let loc = program.stmt(sid).location.clone();

        let mut targets = Vec::new();
        for name in &target_names {
            match bb_map.get(name) {
                Some(bbid) => targets.push(*bbid),
                None => {
                    diags.error(loc.clone(), format!("Unknown target label '{}'", name));
                    ok = false;
                }
            }
        }

        let mut args = Vec::new();
        for valnum in &arg_nums {
            match valnum_map.get(valnum) {
                Some(argid) => args.push(*argid),
                None => {
                    diags.error(loc.clone(), "Unknown argument value number");
                    ok = false;
                }
            }
        }

        let stmt = program.stmt_mut(sid);
        stmt.targets = targets;
        stmt.args = args;
    }
    ok
}

fn create_ports(program: &mut IRProgram, diags: &mut Diagnostics) -> bool {
    let mut by_name: HashMap<String, Vec<StmtId>> = HashMap::new();
    for (i, stmt) in program.stmts.iter().enumerate() {
        let sid = StmtId(i as u32);
        if !reads_port(stmt.kind) && !writes_port(stmt.kind) && stmt.kind != StmtKind::PortExport {
            continue;
        }
        if stmt.port_name.is_empty() {
            diags.error(stmt.location.clone(), "Empty port name");
            return false;
        }
        by_name.entry(stmt.port_name.clone()).or_default().push(sid);
    }

    let mut names: Vec<String> = by_name.keys().cloned().collect();
    names.sort();
    for name in names {
        let stmts = &by_name[&name];
        let mut port = Port::new(name.clone(), PortKind::Port);
        for &sid in stmts {
            let kind = program.stmt(sid).kind;
            if writes_port(kind) {
                port.defs.push(sid);
                port.kind = if kind == StmtKind::PortWrite {
                    PortKind::Port
                } else {
                    PortKind::Chan
                };
            } else if reads_port(kind) {
                port.uses.push(sid);
                port.kind = if kind == StmtKind::PortRead {
                    PortKind::Port
                } else {
                    PortKind::Chan
                };
            } else if kind == StmtKind::PortExport {
                port.exported = true;
                port.exports.push(sid);
            }
        }
        let port_id = ir::PortId(program.ports.len() as u32);
        program.ports.push(port);
        for &sid in stmts {
            program.stmt_mut(sid).port = Some(port_id);
        }
    }
    true
}

fn create_storage(program: &mut IRProgram, diags: &mut Diagnostics) -> bool {
    let mut by_name: HashMap<String, Vec<StmtId>> = HashMap::new();
    for (i, stmt) in program.stmts.iter().enumerate() {
        let sid = StmtId(i as u32);
        if !reads_storage(stmt.kind) && !writes_storage(stmt.kind) && stmt.kind != StmtKind::ArraySize {
            continue;
        }
        if stmt.port_name.is_empty() {
            diags.error(stmt.location.clone(), "Empty storage name");
            return false;
        }
        by_name.entry(stmt.port_name.clone()).or_default().push(sid);
    }

    let mut names: Vec<String> = by_name.keys().cloned().collect();
    names.sort();
    for name in names {
        let stmts = &by_name[&name];
        let mut storage = Storage::new(name.clone());
        for &sid in stmts {
            let kind = program.stmt(sid).kind;
            if writes_storage(kind) {
                storage.writers.push(sid);
            }
            if reads_storage(kind) {
                storage.readers.push(sid);
            }
            if kind == StmtKind::ArraySize {
                if let Some(c) = &program.stmt(sid).constant {
                    storage.elements = c.to_string().parse().unwrap_or(0);
                }
            }
        }
        let storage_id = ir::StorageId(program.storage.len() as u32);
        program.storage.push(storage);
        for &sid in stmts {
            program.stmt_mut(sid).storage = Some(storage_id);
        }
    }
    true
}

fn create_bypasses(program: &mut IRProgram, diags: &mut Diagnostics) -> bool {
    let mut by_name: HashMap<String, Vec<StmtId>> = HashMap::new();
    for (i, stmt) in program.stmts.iter().enumerate() {
        let sid = StmtId(i as u32);
        if !is_bypass_stmt(stmt.kind) {
            continue;
        }
        if stmt.port_name.is_empty() {
            diags.error(stmt.location.clone(), "Empty bypass-network name");
            return false;
        }
        by_name.entry(stmt.port_name.clone()).or_default().push(sid);
    }

    let mut names: Vec<String> = by_name.keys().cloned().collect();
    names.sort();
    for name in names {
        let stmts = &by_name[&name];
        let mut bypass = Bypass::new(name.clone());
        for &sid in stmts {
            let kind = program.stmt(sid).kind;
            match kind {
                StmtKind::BypassStart => {
                    if bypass.start.is_some() {
                        diags.error(
                            program.stmt(sid).location.clone(),
                            format!(
                                "More than one 'start' statement on bypass network '{}'",
                                name
                            ),
                        );
                        return false;
                    }
                    bypass.start = Some(sid);
                }
                StmtKind::BypassEnd => {
                    if bypass.end.is_some() {
                        diags.error(
                            program.stmt(sid).location.clone(),
                            format!(
                                "More than one 'end' statement on bypass network '{}'",
                                name
                            ),
                        );
                        return false;
                    }
                    bypass.end = Some(sid);
                }
                StmtKind::BypassWrite => bypass.writes.push(sid),
                StmtKind::BypassPresent | StmtKind::BypassReady | StmtKind::BypassRead => {
                    bypass.reads.push(sid)
                }
                _ => {}
            }
        }
        let bypass_id = ir::BypassId(program.bypasses.len() as u32);
        program.bypasses.push(bypass);
        for &sid in stmts {
            program.stmt_mut(sid).bypass = Some(bypass_id);
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_bb_label_is_error() {
        let mut program = IRProgram::new();
        let mut bb1 = crate::ir::BB::new("l1");
        bb1.is_entry = true;
        program.add_bb(bb1);
        program.add_bb(crate::ir::BB::new("l1"));
        let mut diags = Diagnostics::new();
        assert!(!crosslink(&mut program, &mut diags));
        assert!(diags.has_errors());
    }

    #[test]
    fn idempotent_when_already_crosslinked() {
        let mut program = IRProgram::new();
        let mut bb = crate::ir::BB::new("entry");
        bb.is_entry = true;
        let bb_id = program.add_bb(bb);
        let mut stmt = crate::ir::Stmt::new(StmtKind::Done);
        stmt.valnum = 1;
        stmt.bb = Some(bb_id);
        let sid = program.add_stmt(stmt);
        program.bb_mut(bb_id).stmts.push(sid);
        program.entries.push(bb_id);
        program.crosslinked_args_bbs = true;

        let mut diags = Diagnostics::new();
        assert!(crosslink(&mut program, &mut diags));
        assert!(!diags.has_errors());
    }
}
