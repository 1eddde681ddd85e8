//! End-to-end tests against the textual IR format (SPEC_FULL.md §6), one per
//! boundary-behavior scenario in SPEC_FULL.md §8.

use hlslow::backend::verilog::{self, EmitOptions};
use hlslow::diag::Diagnostics;
use hlslow::ir::StmtKind;
use hlslow::parse;

fn compile_ok(src: &str) -> (hlslow::ir::IRProgram, Vec<hlslow::pipe::PipeSys>) {
    let mut diags = Diagnostics::new();
    let mut program = parse::parse("test.ir", src, &mut diags).expect("parse failed");
    let systems = hlslow::compile(&mut program, &mut diags);
    assert!(
        !diags.has_errors(),
        "unexpected errors: {:?}",
        diags.entries()
    );
    (program, systems.expect("compile returned None without errors"))
}

fn compile_err(src: &str) -> Diagnostics {
    let mut diags = Diagnostics::new();
    let Some(mut program) = parse::parse("test.ir", src, &mut diags) else {
        return diags;
    };
    hlslow::compile(&mut program, &mut diags);
    diags
}

/// Scenario A: a straight-line const/or/done program typechecks, schedules
/// every statement into stage 1, and emits three `assign`s plus a
/// `done`-less module.
#[test]
fn scenario_a_straight_line_consts_schedule_into_one_stage() {
    let src = "entry L1:\n\
               %1[1] = const 0\n\
               %2[1] = const 1\n\
               %3[1] = or %1, %2\n\
               %4 = done\n";
    let (program, systems) = compile_ok(src);

    assert_eq!(systems.len(), 1);
    let pipe = &systems[0].pipes[0];
    assert_eq!(pipe.stages.len(), 2, "expect stage 0 (empty) + stage 1");
    assert!(pipe.stages[0].stmts.is_empty());
    assert_eq!(pipe.stages[1].stmts.len(), 4);

    let out = verilog::emit(&program, &systems, &EmitOptions::default());
    assert_eq!(out.matches("assign ").count(), 3);
    assert!(!out.contains("done"));
    assert!(out.contains("endmodule"));
}

/// Scenario B: a self-loop (`phi` fed by a backedge `add`) is detected and
/// rewritten into a backedge BB + restart header, with the phi replaced by a
/// restart-value pair.
#[test]
fn scenario_b_self_loop_becomes_backedge_and_restart_header() {
    let src = "entry L1:\n\
               %1[8] = const 0\n\
               jmp L2\n\
               \n\
               L2:\n\
               %2[8] = phi L1,%1, L2,%3\n\
               %3[8] = add %2, %1\n\
               jmp L2 @[t+0]\n";
    let bb_count_before = {
        let mut diags = Diagnostics::new();
        parse::parse("test.ir", src, &mut diags).unwrap().bbs.len()
    };
    let (program, systems) = compile_ok(src);

    assert!(
        program.bbs.len() > bb_count_before,
        "backedge conversion must synthesize a backedge BB and a restart header"
    );
    assert!(program
        .stmts
        .iter()
        .any(|s| s.kind == StmtKind::Backedge));
    assert!(program
        .bbs
        .iter()
        .any(|bb| bb.is_restart));
    // The original phi is tombstoned; its value now flows through a
    // restart-value pair instead.
    assert!(!program
        .stmts
        .iter()
        .any(|s| s.kind == StmtKind::Phi && !s.deleted));
    assert!(program
        .stmts
        .iter()
        .any(|s| s.kind == StmtKind::RestartValue));

    let out = verilog::emit(&program, &systems, &EmitOptions::default());
    assert!(out.contains("endmodule"));
}

/// Scenario C: two `portwrite`s to the same port with disjoint `valid_in`
/// predicates (opposite arms of an `if`) arbitrate down to a single write
/// whose data is a priority-select chain.
#[test]
fn scenario_c_disjoint_writes_arbitrate_to_one() {
    let src = "entry L1:\n\
               %1[1] = portread \"c\"\n\
               %2[8] = const 10\n\
               %3[8] = const 20\n\
               if %1, L2, L3\n\
               \n\
               L2:\n\
               %5 = portwrite \"p\", %2\n\
               jmp L4\n\
               \n\
               L3:\n\
               %6 = portwrite \"p\", %3\n\
               jmp L4\n\
               \n\
               L4:\n\
               %4 = done\n";
    let (program, systems) = compile_ok(src);

    let port = program
        .ports
        .iter()
        .find(|p| p.name == "p")
        .expect("port 'p' must exist");
    assert_eq!(port.defs.len(), 1, "arbitration must leave exactly one writer");

    let surviving = program.stmt(port.defs[0]);
    let data_arg = *surviving.args.last().unwrap();
    assert_eq!(
        program.stmt(data_arg).op,
        hlslow::ir::Op::Select,
        "the surviving write's data must be a priority-select of the two arms"
    );

    let out = verilog::emit(&program, &systems, &EmitOptions::default());
    assert_eq!(out.matches("assign p = ").count(), 1);
    assert!(out.contains('?'), "select should lower to a ternary");
}

/// Scenario D: `kill_if %c` where `%c` is a `portread` result is propagated
/// as a cloned condition into every later stage's kill set.
#[test]
fn scenario_d_kill_if_propagates_to_downstream_stage() {
    let src = "entry L1:\n\
               %1[1] = portread \"x\"\n\
               killif %1\n\
               %2[1] = const 0\n\
               %3[8] = add %2, %2 @[barrier+1]\n\
               %4 = portwrite \"q\", %3\n";
    let (program, systems) = compile_ok(src);

    let pipe = &systems[0].pipes[0];
    let any_kills = pipe.stages.iter().any(|s| !s.kills.is_empty());
    assert!(
        any_kills,
        "kill_if must leave a non-empty kill set in at least one stage"
    );

    let out = verilog::emit(&program, &systems, &EmitOptions::default());
    assert!(out.contains("endmodule"));
}

/// Scenario E: two statements pinned to the same timing variable with
/// offsets that can never agree on a shared basis (each pass nudges the
/// variable further out) fails scheduling once the update budget is spent.
#[test]
fn scenario_e_unsatisfiable_timing_variable_fails_scheduling() {
    let src = "entry L1:\n\
               %1[1] = const 0 @[t+1]\n\
               %2[1] = or %1, %1 @[t+0]\n";
    let diags = compile_err(src);
    assert!(diags.has_errors());
    assert!(diags
        .entries()
        .iter()
        .any(|d| d.message.contains("unsatisfiable timing-variable constraints")));
}

/// Scenario F: a `chanread` with no writer fails lowering with a
/// "has no writer" diagnostic.
#[test]
fn scenario_f_unwritten_channel_is_error() {
    let src = "entry L1:\n\
               %1[1] = chanread \"x\"\n\
               %2 = done\n";
    let diags = compile_err(src);
    assert!(diags.has_errors());
    assert!(diags
        .entries()
        .iter()
        .any(|d| d.message.contains("has no writer")));
}
