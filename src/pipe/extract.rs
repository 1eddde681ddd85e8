//! Pipe extraction: partitions the whole-program CFG into pipe trees rooted
//! at top-level entries, following `spawn` to start new pipes. Grounded in
//! SPEC_FULL.md §4.4 / `backend/ir-pipe.cc`'s `FindPipes`.

use std::collections::{HashSet, VecDeque};

use crate::diag::Diagnostics;
use crate::ir::{reads_port, writes_port, BBId, IRProgram, PipeId, PortKind, StmtKind};
use crate::pipe::{Pipe, PipeSys};

pub fn extract_pipes(program: &mut IRProgram, diags: &mut Diagnostics) -> Option<Vec<PipeSys>> {
    let mut systems = Vec::new();
    let mut owner: std::collections::HashMap<BBId, (usize, PipeId)> = std::collections::HashMap::new();

    for &entry in program.entries.clone().iter() {
        let mut sys = PipeSys::default();
        let root_id = PipeId(0);
        let sys_idx = systems.len();

        let mut queue: VecDeque<(PipeId, Option<PipeId>, BBId)> = VecDeque::new();
        queue.push_back((root_id, None, entry));

        while let Some((pipe_id, parent, root_bb)) = queue.pop_front() {
            while sys.pipes.len() <= pipe_id.index() {
                sys.pipes.push(Pipe::default());
            }
            {
                let p = sys.pipe_mut(pipe_id);
                p.id = pipe_id;
                p.root = Some(root_bb);
                p.parent = parent;
            }
            if let Some(parent_id) = parent {
                sys.pipe_mut(parent_id).children.push(pipe_id);
            }

            let mut visited: HashSet<BBId> = HashSet::new();
            let mut bfs: VecDeque<BBId> = VecDeque::new();
            bfs.push_back(root_bb);
            visited.insert(root_bb);

            while let Some(bb_id) = bfs.pop_front() {
                if let Some(&(other_sys, other_pipe)) = owner.get(&bb_id) {
                    if (other_sys, other_pipe) != (sys_idx, pipe_id) {
                        diags.error(
                            program.bb(bb_id).location.clone(),
                            format!(
                                "BB '{}' is reachable from two pipes",
                                program.bb(bb_id).label
                            ),
                        );
                        continue;
                    }
                }
                owner.insert(bb_id, (sys_idx, pipe_id));
                program.bb_mut(bb_id).pipe = Some(pipe_id);
                sys.pipe_mut(pipe_id).bbs.push(bb_id);

                let stmts = program.bb(bb_id).stmts.clone();
                for sid in stmts {
                    let stmt = program.stmt(sid);
                    if stmt.kind == StmtKind::Spawn {
                        if let Some(&target) = stmt.targets.first() {
                            let child_id = PipeId(sys.pipes.len() as u32);
                            sys.pipes.push(Pipe::default());
                            queue.push_back((child_id, Some(pipe_id), target));
                        }
                        continue;
                    }
                    if stmt.kind == StmtKind::If || stmt.kind == StmtKind::Jmp {
                        for &target in &stmt.targets {
                            if visited.insert(target) {
                                bfs.push_back(target);
                            }
                        }
                    }
                }
            }
        }

        systems.push(sys);
    }

    if diags.has_errors() {
        return None;
    }

    check_chan_uses(program, &systems, diags);
    if diags.has_errors() {
        return None;
    }

    Some(systems)
}

/// Error if a `chan`'s writer/reader set spans more than one pipe system, or
/// if it has no writer at all (SPEC_FULL.md §4.4, Scenario F).
fn check_chan_uses(program: &IRProgram, systems: &[PipeSys], diags: &mut Diagnostics) {
    for port in &program.ports {
        if port.kind != PortKind::Chan {
            continue;
        }
        if port.defs.is_empty() {
            let loc = port
                .uses
                .first()
                .map(|&s| program.stmt(s).location.clone())
                .unwrap_or_else(crate::diag::Location::nowhere);
            diags.error(loc, format!("Channel '{}' has no writer", port.name));
            continue;
        }

        let mut owning_sys: Option<usize> = None;
        for &sid in port.defs.iter().chain(port.uses.iter()) {
            let stmt = program.stmt(sid);
            let kind = stmt.kind;
            debug_assert!(reads_port(kind) || writes_port(kind));
            let Some(bb) = stmt.bb else { continue };
            let Some((si, _)) = crate::pipe::find_owning_pipe(systems, bb) else {
                continue;
            };
            match owning_sys {
                None => owning_sys = Some(si),
                Some(prev) if prev != si => {
                    diags.error(
                        stmt.location.clone(),
                        format!(
                            "Channel '{}' used outside its spawn tree",
                            port.name
                        ),
                    );
                }
                _ => {}
            }
        }
    }
}
