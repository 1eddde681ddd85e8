//! Port/chan, storage, bypass-network, and timing-variable aggregates.
//! Grounded in `backend/ir.h`'s `IRPort`/`IRStorage`/`IRBypass`/`IRTimeVar`.

use std::collections::BTreeMap;

use crate::ir::ids::StmtId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Port,
    Chan,
}

#[derive(Debug, Clone)]
pub struct Port {
    pub name: String,
    pub width: i32,
    pub kind: PortKind,
    pub exported: bool,

    pub defs: Vec<StmtId>,
    pub uses: Vec<StmtId>,
    pub exports: Vec<StmtId>,
}

impl Port {
    pub fn new(name: impl Into<String>, kind: PortKind) -> Self {
        Port {
            name: name.into(),
            width: 0,
            kind,
            exported: false,
            defs: Vec::new(),
            uses: Vec::new(),
            exports: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Storage {
    pub name: String,
    pub data_width: i32,
    pub index_width: i32,
    pub elements: i64,

    pub writers: Vec<StmtId>,
    pub readers: Vec<StmtId>,
}

impl Storage {
    pub fn new(name: impl Into<String>) -> Self {
        Storage {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_register(&self) -> bool {
        self.index_width == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct Bypass {
    pub name: String,
    pub start: Option<StmtId>,
    pub end: Option<StmtId>,
    pub reads: Vec<StmtId>,
    pub writes: Vec<StmtId>,
    pub writes_by_stage: BTreeMap<i64, StmtId>,
    pub width: i32,
}

impl Bypass {
    pub fn new(name: impl Into<String>) -> Self {
        Bypass {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimeVar {
    pub name: String,
    /// Stage this variable has been pinned to by the scheduler, once known.
    pub basis: Option<i64>,
    pub uses: Vec<StmtId>,
}
