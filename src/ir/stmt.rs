//! Statement kinds, operators, and the `Stmt` struct itself.
//!
//! Grounded in `backend/ir.h`'s `IRStmtType`/`IRStmtOp`/`IRStmt`, with
//! pointer fields replaced by `Option<Id>` / `Vec<Id>`.

use num_bigint::BigInt;

use crate::diag::Location;
use crate::graph::predicate::Predicate;
use crate::ir::ids::{BBId, BypassId, PipeId, PipeStageId, PortId, StmtId, StorageId, TimeVarId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StmtKind {
    Expr,
    Phi,
    If,
    Jmp,

    PortRead,
    PortWrite,
    ChanRead,
    ChanWrite,
    PortExport,

    RegRead,
    RegWrite,
    ArrayRead,
    ArrayWrite,
    ArraySize,

    Spawn,
    Kill,
    KillYounger,
    Done,
    KillIf,

    BypassStart,
    BypassEnd,
    BypassWrite,
    BypassPresent,
    BypassReady,
    BypassRead,

    TimingBarrier,

    // Generated only during lowering; never parsed.
    Backedge,
    RestartValue,
    RestartValueSrc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    None,
    Const,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Not,
    Lsh,
    Rsh,
    Bitslice,
    Concat,
    Select,
    CmpLT,
    CmpLE,
    CmpEQ,
    CmpNE,
    CmpGT,
    CmpGE,
}

/// A single SSA value. Mirrors `IRStmt` field for field; arguments/targets
/// are arena IDs rather than pointers.
#[derive(Debug, Clone)]
pub struct Stmt {
    pub valnum: i64,
    pub kind: StmtKind,
    pub op: Op,
    pub bb: Option<BBId>,

    pub args: Vec<StmtId>,
    pub constant: Option<BigInt>,
    pub targets: Vec<BBId>,

    pub port: Option<PortId>,
    pub storage: Option<StorageId>,
    pub bypass: Option<BypassId>,
    pub timevar: Option<TimeVarId>,
    pub time_offset: i32,
    pub width: i32,

    // Populated before crosslinking, consumed during crosslinking.
    pub arg_nums: Vec<i64>,
    pub target_names: Vec<String>,
    pub port_name: String,
    pub port_default: Option<BigInt>,

    // Populated during lowering.
    pub dom_killyounger: Option<StmtId>,
    pub restart_arg: Option<StmtId>,
    pub restart_target: Option<BBId>,
    pub pipe: Option<PipeId>,
    pub is_valid_start: bool,
    pub valid_in_pred: Predicate<StmtId>,
    pub valid_out_pred: Predicate<StmtId>,
    pub valid_in: Option<StmtId>,
    pub valid_out: Option<StmtId>,
    pub valid_spine: bool,
    pub pipedag_deps: Vec<StmtId>,
    pub stage: Option<PipeStageId>,

    pub deleted: bool,

    pub location: Location,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Stmt {
            valnum: -1,
            kind,
            op: Op::None,
            bb: None,
            args: Vec::new(),
            constant: None,
            targets: Vec::new(),
            port: None,
            storage: None,
            bypass: None,
            timevar: None,
            time_offset: 0,
            width: 0,
            arg_nums: Vec::new(),
            target_names: Vec::new(),
            port_name: String::new(),
            port_default: None,
            dom_killyounger: None,
            restart_arg: None,
            restart_target: None,
            pipe: None,
            is_valid_start: false,
            valid_in_pred: Predicate::new_false(),
            valid_out_pred: Predicate::new_false(),
            valid_in: None,
            valid_out: None,
            valid_spine: false,
            pipedag_deps: Vec::new(),
            stage: None,
            deleted: false,
            location: Location::nowhere(),
        }
    }

    pub fn expr(op: Op, args: Vec<StmtId>, width: i32) -> Self {
        let mut s = Stmt::new(StmtKind::Expr);
        s.op = op;
        s.args = args;
        s.width = width;
        s
    }
}
