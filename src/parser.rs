//! Recursive-descent parser and bytecode emitter.
//!
//! Grounded on streval.c's `expr(vp, precedence)`: one recursive function
//! carrying an explicit precedence argument, with right-associative operators
//! recursing at `precedence - 1` so a same-precedence operator can be picked
//! up again inside the recursive call, and left-associative operators
//! recursing at the unchanged `precedence` so the *outer* loop (not the
//! recursive call) picks up the next same-precedence operator. The original
//! header (`streval.h`) carrying the concrete `MAXPREC`/`strval_precedence`
//! numbers was not available to ground against; the table below is this
//! crate's own reconstruction from the textual constraints the algorithm
//! comments describe, recorded in DESIGN.md.

use crate::error::ArithError;
use crate::opcode::{Encoded, OpCode, BINARY, NOFLOAT};
use crate::oracle::{FuncId, FuncKind, LValue, LookupResult, Oracle};
use crate::program::Program;
use crate::token::{Lexer, OpSym, Token};

const PREC_TOP: i32 = 0;
const PREC_TERNARY_MID: i32 = 1;
const PREC_ASSIGN: i32 = 2;
const PREC_TERNARY_ELSE: i32 = 3;
const PREC_TERNARY: i32 = 4;
const PREC_OROR: i32 = 5;
const PREC_ANDAND: i32 = 6;
const PREC_BITOR: i32 = 7;
const PREC_BITXOR: i32 = 8;
const PREC_BITAND: i32 = 9;
const PREC_EQ: i32 = 10;
const PREC_REL: i32 = 11;
const PREC_SHIFT: i32 = 12;
const PREC_ADD: i32 = 13;
const PREC_MUL: i32 = 14;
const PREC_POW: i32 = 15;

/// Whether the value an expression fragment produced is already sitting on
/// the VM's value stack, or is an as-yet-unloaded assignable name.
enum Operand {
    Value,
    Pending(LValue),
}

pub struct Parser<'a, O: Oracle> {
    lexer: Lexer<'a>,
    oracle: &'a mut O,
    prog: Program,
    cur_depth: i32,
    max_depth: i32,
}

impl<'a, O: Oracle> Parser<'a, O> {
    pub fn new(text: &'a str, oracle: &'a mut O) -> Self {
        let decomma = oracle.decomma();
        Parser { lexer: Lexer::new(text, decomma), oracle, prog: Program::new(), cur_depth: 0, max_depth: 0 }
    }

    /// Compile the full expression, including any top-level comma sequence.
    pub fn parse(mut self) -> Result<Program, ArithError> {
        let mut operand = self.expr(PREC_TOP)?;
        loop {
            match self.lexer.peek_token() {
                Token::Comma => {
                    self.load(operand);
                    self.emit0(OpCode::Pop, 0);
                    self.grow(-1);
                    self.lexer.next_token();
                    operand = self.expr(PREC_TOP)?;
                }
                Token::End => break,
                Token::RParen => return Err(ArithError::Paren),
                _ => return Err(ArithError::MoreTokens),
            }
        }
        self.load(operand);
        self.prog.max_stack_depth = self.max_depth.max(0) as usize + 1;
        Ok(self.prog)
    }

    fn grow(&mut self, delta: i32) {
        self.cur_depth += delta;
        debug_assert!(self.cur_depth >= 0, "operand stack underflow during compilation");
        if self.cur_depth > self.max_depth {
            self.max_depth = self.cur_depth;
        }
    }

    fn load(&mut self, operand: Operand) {
        if let Operand::Pending(lv) = operand {
            self.emit_pushv(&lv);
        }
    }

    fn require_lvalue(&self, operand: Operand) -> Result<LValue, ArithError> {
        match operand {
            Operand::Pending(lv) => Ok(lv),
            Operand::Value => Err(ArithError::NotLvalue),
        }
    }

    fn emit0(&mut self, op: OpCode, flags: u8) {
        self.prog.push_u8(Encoded::new(op, flags).0);
    }

    fn push_lvalue(&mut self, lv: &LValue) {
        self.prog.push_u32(lv.cell.0);
        self.prog.push_i32(lv.flag);
        self.prog.push_u8(u8::from(lv.is_float));
    }

    fn emit_pushn(&mut self, value: f64, domain: crate::value::Domain) {
        self.emit0(OpCode::PushN, 0);
        self.prog.push_f64(value);
        self.prog.push_u8(domain.to_tag());
        self.grow(1);
    }

    fn emit_pushv(&mut self, lv: &LValue) {
        self.emit0(OpCode::PushV, 0);
        self.push_lvalue(lv);
        self.grow(1);
    }

    fn emit_pushf(&mut self, func: FuncId, kind: FuncKind) {
        self.emit0(OpCode::PushF, 0);
        self.prog.push_u32(func.0);
        let (tag, aux) = kind.to_tag();
        self.prog.push_u8(tag);
        self.prog.push_u8(aux);
        self.grow(1);
    }

    fn emit_store(&mut self, lv: &LValue) {
        self.emit0(OpCode::Store, 0);
        self.push_lvalue(lv);
    }

    fn emit_assignop1(&mut self, lv: &LValue) {
        self.emit0(OpCode::AssignOp1, 0);
        self.push_lvalue(lv);
        self.grow(1);
    }

    fn emit_assignop(&mut self, lv: &LValue) {
        self.emit0(OpCode::AssignOp, 0);
        self.push_lvalue(lv);
    }

    fn emit_incr(&mut self, lv: &LValue) {
        self.emit0(OpCode::Incr, NOFLOAT);
        self.push_lvalue(lv);
        self.grow(1);
    }

    fn emit_decr(&mut self, lv: &LValue) {
        self.emit0(OpCode::Decr, NOFLOAT);
        self.push_lvalue(lv);
        self.grow(1);
    }

    fn emit_plusplus(&mut self, lv: &LValue) {
        self.emit0(OpCode::PlusPlus, 0);
        self.push_lvalue(lv);
        self.grow(1);
    }

    fn emit_minusminus(&mut self, lv: &LValue) {
        self.emit0(OpCode::MinusMinus, 0);
        self.push_lvalue(lv);
        self.grow(1);
    }

    fn emit_jump_placeholder(&mut self, op: OpCode) -> usize {
        self.emit0(op, 0);
        self.prog.push_i16(0)
    }

    fn patch_here(&mut self, at: usize) {
        let here = self.prog.len();
        self.prog.patch_i16(at, here as i16);
    }

    fn parse_unary(&mut self) -> Result<Operand, ArithError> {
        let save = self.lexer.pos();
        match self.lexer.next_token() {
            Token::Op(OpSym::Plus) => self.parse_unary(),
            Token::Op(OpSym::Minus) => {
                let operand = self.parse_unary()?;
                self.load(operand);
                self.emit0(OpCode::UMinus, 0);
                Ok(Operand::Value)
            }
            Token::Op(OpSym::Not) => {
                let operand = self.parse_unary()?;
                self.load(operand);
                self.emit0(OpCode::Not, 0);
                Ok(Operand::Value)
            }
            Token::Op(OpSym::Tilde) => {
                let operand = self.parse_unary()?;
                self.load(operand);
                self.emit0(OpCode::Tilde, NOFLOAT);
                Ok(Operand::Value)
            }
            Token::Op(OpSym::PlusPlus) => {
                let operand = self.parse_unary()?;
                let lv = self.require_lvalue(operand)?;
                self.emit_incr(&lv);
                Ok(Operand::Value)
            }
            Token::Op(OpSym::MinusMinus) => {
                let operand = self.parse_unary()?;
                let lv = self.require_lvalue(operand)?;
                self.emit_decr(&lv);
                Ok(Operand::Value)
            }
            _ => {
                self.lexer.advance_to(save);
                self.parse_postfix()
            }
        }
    }

    fn parse_postfix(&mut self) -> Result<Operand, ArithError> {
        let mut operand = self.primary()?;
        loop {
            match self.lexer.peek_token() {
                Token::Op(OpSym::PlusPlus) => {
                    let lv = self.require_lvalue(operand)?;
                    self.lexer.next_token();
                    self.emit_plusplus(&lv);
                    operand = Operand::Value;
                }
                Token::Op(OpSym::MinusMinus) => {
                    let lv = self.require_lvalue(operand)?;
                    self.lexer.next_token();
                    self.emit_minusminus(&lv);
                    operand = Operand::Value;
                }
                _ => break,
            }
        }
        Ok(operand)
    }

    fn primary(&mut self) -> Result<Operand, ArithError> {
        match self.lexer.next_token() {
            Token::LParen => {
                let inner = self.expr(PREC_TOP)?;
                match self.lexer.next_token() {
                    Token::RParen => Ok(inner),
                    _ => Err(ArithError::Paren),
                }
            }
            Token::Colon => Err(ArithError::BadColon),
            Token::NeedsOracle => {
                let start = self.lexer.pos();
                match self.oracle.lookup(self.lexer.text(), start) {
                    LookupResult::Number { value, domain, consumed } => {
                        self.lexer.advance_to(start + consumed);
                        self.emit_pushn(value, domain);
                        Ok(Operand::Value)
                    }
                    LookupResult::Name { lvalue, consumed } => {
                        self.lexer.advance_to(start + consumed);
                        if lvalue.func.is_some() && self.lexer.peek_token() == Token::LParen {
                            self.parse_call(lvalue)
                        } else {
                            Ok(Operand::Pending(lvalue))
                        }
                    }
                    LookupResult::NotFound => {
                        let byte = self.lexer.text().as_bytes().get(start).copied();
                        Err(classify_lookup_failure(byte, self.lexer.text(), start))
                    }
                }
            }
            _ => Err(ArithError::SynBad),
        }
    }

    fn parse_call(&mut self, lvalue: LValue) -> Result<Operand, ArithError> {
        let (func, kind) = lvalue.func.expect("checked by caller");
        self.lexer.next_token(); // consume '('
        self.emit_pushf(func, kind);
        let mut argc = 0usize;
        if self.lexer.peek_token() != Token::RParen {
            loop {
                let arg = self.expr(PREC_TOP)?;
                self.load(arg);
                argc += 1;
                match self.lexer.peek_token() {
                    Token::Comma => {
                        self.lexer.next_token();
                        continue;
                    }
                    _ => break,
                }
            }
        }
        match self.lexer.next_token() {
            Token::RParen => {}
            _ => return Err(ArithError::Paren),
        }
        if argc != kind.arity() {
            return Err(ArithError::ArgCount(error_token_text(self.lexer.text(), 0)));
        }
        let (op, flags) = kind.call_opcode();
        self.emit0(op, flags);
        self.grow(-(argc as i32));
        Ok(Operand::Value)
    }

    /// `expr(precedence)`: parse a unary-led operand, then extend it with
    /// binary/ternary/assignment operators whose precedence exceeds
    /// `min_prec`, returning control once none remain.
    fn expr(&mut self, min_prec: i32) -> Result<Operand, ArithError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let save = self.lexer.pos();
            let tok = self.lexer.next_token();
            let prec = precedence_of(&tok);
            let prec = match prec {
                Some(p) if p > min_prec => p,
                _ => {
                    self.lexer.advance_to(save);
                    break;
                }
            };
            lhs = self.continue_expr(lhs, tok, prec)?;
        }
        Ok(lhs)
    }

    fn continue_expr(&mut self, lhs: Operand, tok: Token, prec: i32) -> Result<Operand, ArithError> {
        match tok {
            Token::Op(OpSym::Assign) => {
                let lv = self.require_lvalue(lhs)?;
                let rhs = self.expr(prec - 1)?;
                self.load(rhs);
                self.emit_store(&lv);
                Ok(Operand::Value)
            }
            Token::Op(sym) if compound_assign_base(sym).is_some() => {
                let (op, nofloat) = compound_assign_base(sym).unwrap();
                let lv = self.require_lvalue(lhs)?;
                self.emit_assignop1(&lv);
                let rhs = self.expr(prec - 1)?;
                self.load(rhs);
                self.emit0(op, BINARY | if nofloat { NOFLOAT } else { 0 });
                self.grow(-1);
                self.emit_assignop(&lv);
                Ok(Operand::Value)
            }
            Token::Op(OpSym::OrOr) | Token::Op(OpSym::AndAnd) => {
                self.load(lhs);
                let jump_op = if matches!(tok, Token::Op(OpSym::OrOr)) { OpCode::Jmpnz } else { OpCode::Jmpz };
                let at = self.emit_jump_placeholder(jump_op);
                self.emit0(OpCode::Pop, 0);
                self.grow(-1);
                let rhs = self.expr(prec)?;
                self.load(rhs);
                self.patch_here(at);
                self.emit0(OpCode::NotNot, 0);
                Ok(Operand::Value)
            }
            Token::Question => {
                self.load(lhs);
                if self.lexer.peek_token() == Token::Colon {
                    self.lexer.next_token();
                    let at = self.emit_jump_placeholder(OpCode::Jmpnz);
                    self.emit0(OpCode::Pop, 0);
                    self.grow(-1);
                    let rhs = self.expr(PREC_TERNARY_ELSE)?;
                    self.load(rhs);
                    self.patch_here(at);
                } else {
                    let at1 = self.emit_jump_placeholder(OpCode::Jmpz);
                    self.emit0(OpCode::Pop, 0);
                    self.grow(-1);
                    let mid = self.expr(PREC_TERNARY_MID)?;
                    self.load(mid);
                    match self.lexer.next_token() {
                        Token::Colon => {}
                        _ => return Err(ArithError::QuestColon),
                    }
                    let at2 = self.emit_jump_placeholder(OpCode::Jmp);
                    self.patch_here(at1);
                    self.emit0(OpCode::Pop, 0);
                    self.grow(-1);
                    let els = self.expr(PREC_TERNARY_ELSE)?;
                    self.load(els);
                    self.patch_here(at2);
                }
                Ok(Operand::Value)
            }
            Token::Op(sym) => {
                let (op, nofloat, right_assoc) = binary_value_op(sym).ok_or(ArithError::SynBad)?;
                self.load(lhs);
                let next_min = if right_assoc { prec - 1 } else { prec };
                let rhs = self.expr(next_min)?;
                self.load(rhs);
                self.emit0(op, BINARY | if nofloat { NOFLOAT } else { 0 });
                self.grow(-1);
                Ok(Operand::Value)
            }
            _ => Err(ArithError::SynBad),
        }
    }
}

fn precedence_of(tok: &Token) -> Option<i32> {
    match tok {
        Token::Question => Some(PREC_TERNARY),
        Token::Op(sym) => match sym {
            OpSym::Assign
            | OpSym::PlusEq
            | OpSym::MinusEq
            | OpSym::TimesEq
            | OpSym::DivEq
            | OpSym::ModEq
            | OpSym::PowEq
            | OpSym::AndEq
            | OpSym::OrEq
            | OpSym::XorEq
            | OpSym::LshEq
            | OpSym::RshEq => Some(PREC_ASSIGN),
            OpSym::OrOr => Some(PREC_OROR),
            OpSym::AndAnd => Some(PREC_ANDAND),
            OpSym::Or => Some(PREC_BITOR),
            OpSym::Xor => Some(PREC_BITXOR),
            OpSym::And => Some(PREC_BITAND),
            OpSym::EqEq | OpSym::NotEq => Some(PREC_EQ),
            OpSym::Lt | OpSym::Le | OpSym::Gt | OpSym::Ge => Some(PREC_REL),
            OpSym::Lsh | OpSym::Rsh => Some(PREC_SHIFT),
            OpSym::Plus | OpSym::Minus => Some(PREC_ADD),
            OpSym::Star | OpSym::Slash | OpSym::Percent => Some(PREC_MUL),
            OpSym::StarStar => Some(PREC_POW),
            OpSym::Not | OpSym::Tilde | OpSym::PlusPlus | OpSym::MinusMinus => None,
        },
        _ => None,
    }
}

fn compound_assign_base(sym: OpSym) -> Option<(OpCode, bool)> {
    match sym {
        OpSym::PlusEq => Some((OpCode::Plus, false)),
        OpSym::MinusEq => Some((OpCode::Minus, false)),
        OpSym::TimesEq => Some((OpCode::Times, false)),
        OpSym::DivEq => Some((OpCode::Div, false)),
        OpSym::ModEq => Some((OpCode::Mod, true)),
        OpSym::PowEq => Some((OpCode::Pow, false)),
        OpSym::AndEq => Some((OpCode::And, true)),
        OpSym::OrEq => Some((OpCode::Or, true)),
        OpSym::XorEq => Some((OpCode::Xor, true)),
        OpSym::LshEq => Some((OpCode::LShift, true)),
        OpSym::RshEq => Some((OpCode::RShift, true)),
        _ => None,
    }
}

/// `(opcode, nofloat, right_associative)` for plain binary operators.
fn binary_value_op(sym: OpSym) -> Option<(OpCode, bool, bool)> {
    match sym {
        OpSym::Plus => Some((OpCode::Plus, false, false)),
        OpSym::Minus => Some((OpCode::Minus, false, false)),
        OpSym::Star => Some((OpCode::Times, false, false)),
        OpSym::Slash => Some((OpCode::Div, false, false)),
        OpSym::Percent => Some((OpCode::Mod, true, false)),
        OpSym::StarStar => Some((OpCode::Pow, false, true)),
        OpSym::And => Some((OpCode::And, true, false)),
        OpSym::Or => Some((OpCode::Or, true, false)),
        OpSym::Xor => Some((OpCode::Xor, true, false)),
        OpSym::Lsh => Some((OpCode::LShift, true, false)),
        OpSym::Rsh => Some((OpCode::RShift, true, false)),
        OpSym::Lt => Some((OpCode::Lt, false, false)),
        OpSym::Le => Some((OpCode::Le, false, false)),
        OpSym::Gt => Some((OpCode::Gt, false, false)),
        OpSym::Ge => Some((OpCode::Ge, false, false)),
        OpSym::EqEq => Some((OpCode::Eq, false, false)),
        OpSym::NotEq => Some((OpCode::Neq, false, false)),
        _ => None,
    }
}

fn error_token_text(text: &str, start: usize) -> String {
    let bytes = text.as_bytes();
    let mut end = start;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }
    if end == start {
        end = (start + 1).min(bytes.len());
    }
    text[start.min(text.len())..end].to_string()
}

fn classify_lookup_failure(byte: Option<u8>, text: &str, start: usize) -> ArithError {
    match byte {
        Some(b) if b.is_ascii_digit() || b == b'.' => ArithError::BadNum(error_token_text(text, start)),
        Some(b) if b == b'\'' || b == b'"' => ArithError::CharConst,
        Some(b'L') if text.as_bytes().get(start + 1) == Some(&b'\'') => ArithError::CharConst,
        Some(b) if b.is_ascii_alphabetic() || b == b'_' || b == b'$' => {
            ArithError::UnknownName(error_token_text(text, start))
        }
        _ => ArithError::SynBad,
    }
}
