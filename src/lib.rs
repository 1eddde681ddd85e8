//! A compiler that lowers a transactional SSA dataflow IR into cycle-
//! accurate synchronous Verilog. See `SPEC_FULL.md` for the full
//! specification; the module layout below follows its component list.

pub mod backend;
pub mod cli;
pub mod crosslink;
pub mod diag;
pub mod graph;
pub mod ir;
pub mod parse;
pub mod pipe;
pub mod typecheck;

use diag::Diagnostics;
use ir::IRProgram;

/// Runs the full lowering pipeline (crosslink -> typecheck -> pipe
/// extraction -> per-pipe lowering passes -> timing -> kill-if -> arbiter ->
/// spine) and returns the resulting `PipeSys`es, one per top-level entry
/// point, ready for Verilog emission.
pub fn compile(
    program: &mut IRProgram,
    diags: &mut Diagnostics,
) -> Option<Vec<pipe::PipeSys>> {
    if !crosslink::crosslink(program, diags) {
        return None;
    }
    if !typecheck::typecheck(program, diags) {
        return None;
    }
    pipe::lower(program, diags)
}
