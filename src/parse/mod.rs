//! Recursive-descent parser for the textual IR format. Grounded in
//! `backend/ir-parser.cc`, adapted to the statement-kind set of
//! `backend/ir.h` (the original's `ir-parser.cc` in this corpus parses an
//! earlier `provide`/`unprovide`/`ask` vocabulary that predates the
//! bypass-network statement kinds actually declared in `ir.h`; this parser
//! follows `ir.h`, the authoritative data model).

mod lexer;

use std::collections::HashMap;

use lexer::{Lexer, Token, TokenKind};
use num_bigint::BigInt;
use thiserror::Error;

use crate::diag::{Diagnostics, Location};
use crate::ir::{Op, Stmt, StmtKind, IRProgram, TXN_ID_WIDTH};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{0}: unexpected token")]
    UnexpectedToken(Location),
    #[error("{0}: unknown IR statement type '{1}'")]
    UnknownOpcode(Location, String),
    #[error("{0}: value number must be positive")]
    NonPositiveValnum(Location),
    #[error("{0}: width must be an integer number of bits or 'txn'")]
    BadWidth(Location),
}

#[derive(Clone, Copy)]
enum StmtArg {
    Const,
    Valnum,
    Valnums,
    Portname,
    BBname,
    BBnameValnumPairs,
    None,
}

fn opcode_table(ident: &str) -> Option<(StmtKind, Op, Vec<StmtArg>)> {
    use StmtArg::*;
    use StmtKind as K;
    Some(match ident {
        "const" => (K::Expr, Op::Const, vec![Const]),
        "add" => (K::Expr, Op::Add, vec![Valnum, Valnum]),
        "sub" => (K::Expr, Op::Sub, vec![Valnum, Valnum]),
        "mul" => (K::Expr, Op::Mul, vec![Valnum, Valnum]),
        "div" => (K::Expr, Op::Div, vec![Valnum, Valnum]),
        "rem" => (K::Expr, Op::Rem, vec![Valnum, Valnum]),
        "and" => (K::Expr, Op::And, vec![Valnum, Valnum]),
        "or" => (K::Expr, Op::Or, vec![Valnum, Valnum]),
        "xor" => (K::Expr, Op::Xor, vec![Valnum, Valnum]),
        "not" => (K::Expr, Op::Not, vec![Valnum]),
        "lsh" => (K::Expr, Op::Lsh, vec![Valnum, Valnum]),
        "rsh" => (K::Expr, Op::Rsh, vec![Valnum, Valnum]),
        "bsl" | "bitslice" => (K::Expr, Op::Bitslice, vec![Valnum, Valnum, Valnum]),
        "cat" | "concat" => (K::Expr, Op::Concat, vec![Valnums]),
        "select" => (K::Expr, Op::Select, vec![Valnum, Valnum, Valnum]),
        "cmplt" => (K::Expr, Op::CmpLT, vec![Valnum, Valnum]),
        "cmple" => (K::Expr, Op::CmpLE, vec![Valnum, Valnum]),
        "cmpeq" => (K::Expr, Op::CmpEQ, vec![Valnum, Valnum]),
        "cmpne" => (K::Expr, Op::CmpNE, vec![Valnum, Valnum]),
        "cmpgt" => (K::Expr, Op::CmpGT, vec![Valnum, Valnum]),
        "cmpge" => (K::Expr, Op::CmpGE, vec![Valnum, Valnum]),

        "phi" => (K::Phi, Op::None, vec![BBnameValnumPairs]),
        "if" => (K::If, Op::None, vec![Valnum, BBname, BBname]),
        "jmp" => (K::Jmp, Op::None, vec![BBname]),

        "portread" => (K::PortRead, Op::None, vec![Portname]),
        "portwrite" => (K::PortWrite, Op::None, vec![Portname, Valnum]),
        "chanread" => (K::ChanRead, Op::None, vec![Portname]),
        "chanwrite" => (K::ChanWrite, Op::None, vec![Portname, Valnum]),
        "portexport" => (K::PortExport, Op::None, vec![Portname]),

        "regread" => (K::RegRead, Op::None, vec![Portname]),
        "regwrite" => (K::RegWrite, Op::None, vec![Portname, Valnum]),
        "arrayread" => (K::ArrayRead, Op::None, vec![Portname, Valnum]),
        "arraywrite" => (K::ArrayWrite, Op::None, vec![Portname, Valnum, Valnum]),
        "arraysize" => (K::ArraySize, Op::None, vec![Portname, Const]),

        "spawn" => (K::Spawn, Op::None, vec![BBname]),
        "kill" => (K::Kill, Op::None, vec![None]),
        "killyounger" => (K::KillYounger, Op::None, vec![None]),
        "done" => (K::Done, Op::None, vec![None]),
        "killif" => (K::KillIf, Op::None, vec![Valnum]),

        "bypassstart" => (K::BypassStart, Op::None, vec![Portname, Valnum]),
        "bypassend" => (K::BypassEnd, Op::None, vec![Portname]),
        "bypasswrite" => (K::BypassWrite, Op::None, vec![Portname, Valnum]),
        "bypasspresent" => (K::BypassPresent, Op::None, vec![Portname, Valnum]),
        "bypassready" => (K::BypassReady, Op::None, vec![Portname, Valnum]),
        "bypassread" => (K::BypassRead, Op::None, vec![Portname, Valnum]),

        "timing_barrier" => (K::TimingBarrier, Op::None, vec![None]),

        _ => return Option::None,
    })
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    cur: Token,
    filename: String,
}

impl<'a> Parser<'a> {
    pub fn new(filename: impl Into<String>, input: &'a str) -> Self {
        let filename = filename.into();
        let mut lexer = Lexer::new(filename.clone(), input);
        let cur = lexer.next_token();
        Parser {
            lexer,
            cur,
            filename,
        }
    }

    fn advance(&mut self) -> Token {
        let next = self.lexer.next_token();
        std::mem::replace(&mut self.cur, next)
    }

    fn loc(&self) -> Location {
        self.cur.location.clone()
    }

    fn skip_newlines(&mut self) {
        while matches!(self.cur.kind, TokenKind::Newline) {
            self.advance();
        }
    }

    pub fn parse_program(
        mut self,
        diags: &mut Diagnostics,
    ) -> Result<IRProgram, ParseError> {
        let mut program = IRProgram::new();
        let mut bb_map: HashMap<String, crate::ir::BBId> = HashMap::new();

        loop {
            self.skip_newlines();
            if matches!(self.cur.kind, TokenKind::Eof) {
                break;
            }
            self.parse_bb(&mut program, &mut bb_map, diags)?;
        }

        Ok(program)
    }

    fn parse_bb(
        &mut self,
        program: &mut IRProgram,
        bb_map: &mut HashMap<String, crate::ir::BBId>,
        diags: &mut Diagnostics,
    ) -> Result<(), ParseError> {
        let loc = self.loc();
        let mut is_entry = false;
        if let TokenKind::Ident(name) = &self.cur.kind {
            if name == "entry" {
                is_entry = true;
                self.advance();
            }
        }
        let label = match &self.cur.kind {
            TokenKind::Ident(s) => s.clone(),
            _ => return Err(ParseError::UnexpectedToken(self.loc())),
        };
        self.advance();
        if !matches!(self.cur.kind, TokenKind::Colon) {
            return Err(ParseError::UnexpectedToken(self.loc()));
        }
        self.advance();
        if !matches!(self.cur.kind, TokenKind::Newline | TokenKind::Eof) {
            return Err(ParseError::UnexpectedToken(self.loc()));
        }
        self.skip_newlines();

        let mut bb = crate::ir::BB::new(label.clone());
        bb.is_entry = is_entry;
        bb.location = loc;
        let bb_id = program.add_bb(bb);
        bb_map.insert(label.clone(), bb_id);
        if is_entry {
            program.entries.push(bb_id);
        }

        loop {
            if !matches!(self.cur.kind, TokenKind::Percent) {
                break;
            }
            self.parse_stmt(program, bb_id, diags)?;
            self.skip_newlines();
        }

        Ok(())
    }

    fn parse_stmt(
        &mut self,
        program: &mut IRProgram,
        bb_id: crate::ir::BBId,
        _diags: &mut Diagnostics,
    ) -> Result<(), ParseError> {
        self.advance(); // consume '%'
        let valnum = match self.cur.kind {
            TokenKind::IntLiteral(n) => n,
            _ => return Err(ParseError::UnexpectedToken(self.loc())),
        };
        if valnum <= 0 {
            return Err(ParseError::NonPositiveValnum(self.loc()));
        }
        self.advance();

        let mut width = 0i32;
        if matches!(self.cur.kind, TokenKind::LBracket) {
            self.advance();
            match &self.cur.kind {
                TokenKind::IntLiteral(n) => {
                    width = *n as i32;
                    self.advance();
                }
                TokenKind::Ident(s) if s == "txn" => {
                    width = TXN_ID_WIDTH;
                    self.advance();
                }
                _ => return Err(ParseError::BadWidth(self.loc())),
            }
            if !matches!(self.cur.kind, TokenKind::RBracket) {
                return Err(ParseError::UnexpectedToken(self.loc()));
            }
            self.advance();
        }

        if !matches!(self.cur.kind, TokenKind::Equals) {
            return Err(ParseError::UnexpectedToken(self.loc()));
        }
        self.advance();

        let opcode_loc = self.loc();
        let ident = match &self.cur.kind {
            TokenKind::Ident(s) => s.clone(),
            _ => return Err(ParseError::UnexpectedToken(self.loc())),
        };
        let Some((kind, op, args)) = opcode_table(&ident) else {
            return Err(ParseError::UnknownOpcode(opcode_loc, ident));
        };
        self.advance();

        let mut stmt = Stmt::new(kind);
        stmt.valnum = valnum;
        stmt.op = op;
        stmt.bb = Some(bb_id);
        stmt.width = width;
        stmt.location = opcode_loc;
        program.note_valnum(valnum);

        let mut first = true;
        for arg in args {
            if !first {
                if !matches!(self.cur.kind, TokenKind::Comma) {
                    return Err(ParseError::UnexpectedToken(self.loc()));
                }
                self.advance();
            }
            first = false;
            self.parse_stmt_arg(arg, &mut stmt)?;
        }

        if matches!(self.cur.kind, TokenKind::At) {
            self.advance();
            if !matches!(self.cur.kind, TokenKind::LBracket) {
                return Err(ParseError::UnexpectedToken(self.loc()));
            }
            self.advance();
            let name = match &self.cur.kind {
                TokenKind::Ident(s) => s.clone(),
                _ => return Err(ParseError::UnexpectedToken(self.loc())),
            };
            self.advance();
            let mut offset = 0i32;
            if matches!(self.cur.kind, TokenKind::Plus) {
                self.advance();
                match self.cur.kind {
                    TokenKind::IntLiteral(n) => {
                        offset = n as i32;
                        self.advance();
                    }
                    _ => return Err(ParseError::UnexpectedToken(self.loc())),
                }
            }
            if !matches!(self.cur.kind, TokenKind::RBracket) {
                return Err(ParseError::UnexpectedToken(self.loc()));
            }
            self.advance();

            let timevar = program.get_or_create_timevar(&name);
            stmt.timevar = Some(timevar);
            stmt.time_offset = offset;
            program.timevars[timevar.0 as usize].uses.push(
                crate::ir::StmtId(program.stmts.len() as u32),
            );
        }

        if !matches!(self.cur.kind, TokenKind::Newline | TokenKind::Eof) {
            return Err(ParseError::UnexpectedToken(self.loc()));
        }

        let stmt_id = program.add_stmt(stmt);
        program.bb_mut(bb_id).stmts.push(stmt_id);
        Ok(())
    }

    fn parse_stmt_arg(&mut self, arg: StmtArg, stmt: &mut Stmt) -> Result<(), ParseError> {
        match arg {
            StmtArg::Const => match self.cur.kind {
                TokenKind::IntLiteral(n) => {
                    stmt.constant = Some(BigInt::from(n));
                    self.advance();
                }
                _ => return Err(ParseError::UnexpectedToken(self.loc())),
            },
            StmtArg::Valnum => {
                if !matches!(self.cur.kind, TokenKind::Percent) {
                    return Err(ParseError::UnexpectedToken(self.loc()));
                }
                self.advance();
                match self.cur.kind {
                    TokenKind::IntLiteral(n) => {
                        stmt.arg_nums.push(n);
                        self.advance();
                    }
                    _ => return Err(ParseError::UnexpectedToken(self.loc())),
                }
            }
            StmtArg::Valnums => loop {
                if !matches!(self.cur.kind, TokenKind::Percent) {
                    break;
                }
                self.advance();
                match self.cur.kind {
                    TokenKind::IntLiteral(n) => {
                        stmt.arg_nums.push(n);
                        self.advance();
                    }
                    _ => return Err(ParseError::UnexpectedToken(self.loc())),
                }
                if matches!(self.cur.kind, TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            },
            StmtArg::Portname => match &self.cur.kind {
                TokenKind::QuotedString(s) => {
                    stmt.port_name = s.clone();
                    self.advance();
                }
                _ => return Err(ParseError::UnexpectedToken(self.loc())),
            },
            StmtArg::BBname => match &self.cur.kind {
                TokenKind::Ident(s) => {
                    stmt.target_names.push(s.clone());
                    self.advance();
                }
                _ => return Err(ParseError::UnexpectedToken(self.loc())),
            },
            StmtArg::BBnameValnumPairs => loop {
                let TokenKind::Ident(name) = &self.cur.kind else {
                    break;
                };
                let name = name.clone();
                self.advance();
                if !matches!(self.cur.kind, TokenKind::Comma) {
                    return Err(ParseError::UnexpectedToken(self.loc()));
                }
                self.advance();
                if !matches!(self.cur.kind, TokenKind::Percent) {
                    return Err(ParseError::UnexpectedToken(self.loc()));
                }
                self.advance();
                let TokenKind::IntLiteral(valnum) = self.cur.kind else {
                    return Err(ParseError::UnexpectedToken(self.loc()));
                };
                self.advance();
                stmt.target_names.push(name);
                stmt.arg_nums.push(valnum);
                if matches!(self.cur.kind, TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            },
            StmtArg::None => {}
        }
        Ok(())
    }
}

pub fn parse(
    filename: &str,
    input: &str,
    diags: &mut Diagnostics,
) -> Option<IRProgram> {
    let parser = Parser::new(filename, input);
    match parser.parse_program(diags) {
        Ok(program) => Some(program),
        Err(e) => {
            let loc = match &e {
                ParseError::UnexpectedToken(l)
                | ParseError::UnknownOpcode(l, _)
                | ParseError::NonPositiveValnum(l)
                | ParseError::BadWidth(l) => l.clone(),
            };
            diags.error(loc, e.to_string());
            None
        }
    }
}
