//! The IR data model: a program is an arena of basic blocks and statements,
//! cross-referenced by ID rather than by pointer (see SPEC_FULL.md §4.0).
//!
//! This mirrors `autopiper`'s `backend/ir.h`, with every raw pointer
//! (`IRStmt*`, `IRBB*`, ...) replaced by a newtype index into the owning
//! `IRProgram` arena.

pub mod bb;
pub mod ids;
pub mod port;
pub mod stmt;

pub use bb::BB;
pub use ids::{BBId, BypassId, PortId, StmtId, StorageId, TimeVarId};
pub use port::{Bypass, Port, PortKind, Storage, TimeVar};
pub use stmt::{Op, Stmt, StmtKind};

use crate::diag::Location;

/// Sentinel statement width meaning "transaction ID", distinct from any real
/// bit width.
pub const TXN_ID_WIDTH: i32 = -2;

/// Selects which `TimingModel` the scheduler (pipe::timing) uses. See
/// SPEC_FULL.md §4.8 and §9 (default changed from the original's `"null"`
/// to `"standard"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingModelKind {
    Standard,
    Null,
}

impl Default for TimingModelKind {
    fn default() -> Self {
        TimingModelKind::Standard
    }
}

impl TimingModelKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(TimingModelKind::Standard),
            "null" => Some(TimingModelKind::Null),
            _ => None,
        }
    }
}

/// Owns every IR entity for one compilation unit.
#[derive(Debug, Default)]
pub struct IRProgram {
    pub bbs: Vec<BB>,
    pub stmts: Vec<Stmt>,
    pub ports: Vec<Port>,
    pub storage: Vec<Storage>,
    pub bypasses: Vec<Bypass>,
    pub timevars: Vec<TimeVar>,
    pub timevar_map: std::collections::HashMap<String, TimeVarId>,

    pub timing_model: TimingModelKind,

    /// Top-level entry points, set during parsing.
    pub entries: Vec<BBId>,

    /// Set when an IR is built directly (e.g. by tests) with args/targets
    /// already resolved, so the crosslinker skips that step.
    pub crosslinked_args_bbs: bool,

    next_valnum: i64,
    next_anon_timevar: u32,
}

impl IRProgram {
    pub fn new() -> Self {
        IRProgram {
            timing_model: TimingModelKind::default(),
            crosslinked_args_bbs: false,
            next_valnum: 1,
            next_anon_timevar: 1,
            ..Default::default()
        }
    }

    pub fn alloc_valnum(&mut self) -> i64 {
        let v = self.next_valnum;
        self.next_valnum += 1;
        v
    }

    pub fn note_valnum(&mut self, valnum: i64) {
        if valnum >= self.next_valnum {
            self.next_valnum = valnum + 1;
        }
    }

    pub fn add_bb(&mut self, bb: BB) -> BBId {
        let id = BBId(self.bbs.len() as u32);
        self.bbs.push(bb);
        id
    }

    pub fn add_stmt(&mut self, stmt: Stmt) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(stmt);
        id
    }

    pub fn bb(&self, id: BBId) -> &BB {
        &self.bbs[id.0 as usize]
    }
    pub fn bb_mut(&mut self, id: BBId) -> &mut BB {
        &mut self.bbs[id.0 as usize]
    }
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.0 as usize]
    }
    pub fn stmt_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.stmts[id.0 as usize]
    }
    pub fn port(&self, id: PortId) -> &Port {
        &self.ports[id.0 as usize]
    }
    pub fn port_mut(&mut self, id: PortId) -> &mut Port {
        &mut self.ports[id.0 as usize]
    }
    pub fn storage(&self, id: StorageId) -> &Storage {
        &self.storage[id.0 as usize]
    }
    pub fn storage_mut(&mut self, id: StorageId) -> &mut Storage {
        &mut self.storage[id.0 as usize]
    }
    pub fn bypass(&self, id: BypassId) -> &Bypass {
        &self.bypasses[id.0 as usize]
    }
    pub fn bypass_mut(&mut self, id: BypassId) -> &mut Bypass {
        &mut self.bypasses[id.0 as usize]
    }

    /// Allocates (or returns the existing) timing variable for a given
    /// anchor name used in the textual IR (`@[name+offset]`).
    pub fn get_or_create_timevar(&mut self, name: &str) -> TimeVarId {
        if let Some(id) = self.timevar_map.get(name) {
            return *id;
        }
        let id = TimeVarId(self.timevars.len() as u32);
        self.timevars.push(TimeVar {
            name: name.to_string(),
            basis: None,
            uses: Vec::new(),
        });
        self.timevar_map.insert(name.to_string(), id);
        id
    }

    /// Allocates a fresh, anonymous timing variable (used by the backedge
    /// converter to pin a backedge op and its timing barrier together).
    pub fn new_anon_timevar(&mut self) -> TimeVarId {
        let name = format!("__anon_timevar_{}", self.next_anon_timevar);
        self.next_anon_timevar += 1;
        self.get_or_create_timevar(&name)
    }

    /// Top-level entry BBs plus any spawn targets reachable from them, found
    /// by a simple scan (before pipe extraction has partitioned the CFG).
    pub fn roots(&self) -> Vec<BBId> {
        let mut roots = self.entries.clone();
        for stmt in &self.stmts {
            if stmt.kind == StmtKind::Spawn {
                if let Some(target) = stmt.targets.first() {
                    roots.push(*target);
                }
            }
        }
        roots
    }

    pub fn location_of(&self, stmt: StmtId) -> Location {
        self.stmt(stmt).location.clone()
    }
}

pub fn writes_port(kind: StmtKind) -> bool {
    matches!(kind, StmtKind::PortWrite | StmtKind::ChanWrite)
}
pub fn reads_port(kind: StmtKind) -> bool {
    matches!(kind, StmtKind::PortRead | StmtKind::ChanRead)
}
pub fn reads_storage(kind: StmtKind) -> bool {
    matches!(kind, StmtKind::RegRead | StmtKind::ArrayRead)
}
pub fn writes_storage(kind: StmtKind) -> bool {
    matches!(kind, StmtKind::RegWrite | StmtKind::ArrayWrite)
}

/// Only `Expr` and `Phi` are pure; everything else has an observable
/// side effect and must be ordered by the side-effect DAG (SPEC_FULL.md §4.7).
pub fn has_side_effects(kind: StmtKind) -> bool {
    !matches!(kind, StmtKind::Expr | StmtKind::Phi)
}

pub fn is_bypass_stmt(kind: StmtKind) -> bool {
    matches!(
        kind,
        StmtKind::BypassStart
            | StmtKind::BypassEnd
            | StmtKind::BypassWrite
            | StmtKind::BypassPresent
            | StmtKind::BypassReady
            | StmtKind::BypassRead
    )
}
