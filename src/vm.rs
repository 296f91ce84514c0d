//! The bytecode executor.
//!
//! Grounded on streval.c's `arith_exec`: a `switch` over the opcode stream
//! driving a typed value stack. Two parallel stacks stand in for the
//! original's single stack of tagged cells (see DESIGN.md for why the split
//! was kept over the single-tagged-variant-stack alternative streval.c's
//! design notes offer); every push/pop touches both in lockstep, which is
//! invariant 3 in spec.md §3.

use smallvec::SmallVec;
use std::cell::Cell;

use crate::error::ArithError;
use crate::opcode::{Encoded, OpCode};
use crate::oracle::{FuncId, FuncKind, LValue, Oracle, OracleCtx};
use crate::program::Program;
use crate::value::{as_i64, as_u64, retag_loaded_value, u2f, Domain};

/// Matches streval.c's hardcoded recursion ceiling on nested `arith_exec`
/// calls (reachable when a user-defined function's body itself evaluates an
/// arithmetic expression through the oracle).
const MAX_RECURSION_DEPTH: u32 = 1024;

thread_local! {
    static RECURSION_DEPTH: Cell<u32> = Cell::new(0);
}

/// RAII guard standing in for streval.c's process-wide static counter
/// (design note: kept scoped to the calling thread and released on drop
/// rather than a bare global, see DESIGN.md).
pub struct RecursionGuard {
    _private: (),
}

impl RecursionGuard {
    pub fn enter() -> Result<RecursionGuard, ArithError> {
        RECURSION_DEPTH.with(|d| {
            let cur = d.get();
            if cur >= MAX_RECURSION_DEPTH {
                return Err(ArithError::Recursive);
            }
            d.set(cur + 1);
            Ok(RecursionGuard { _private: () })
        })
    }
}

impl Drop for RecursionGuard {
    fn drop(&mut self) {
        RECURSION_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

fn add_one(v: f64, domain: Domain) -> f64 {
    match domain {
        Domain::Float => v + 1.0,
        Domain::Unsigned => u2f(as_u64(v).wrapping_add(1)),
        Domain::Signed => as_i64(v).wrapping_add(1) as f64,
    }
}

fn sub_one(v: f64, domain: Domain) -> f64 {
    match domain {
        Domain::Float => v - 1.0,
        Domain::Unsigned => u2f(as_u64(v).wrapping_sub(1)),
        Domain::Signed => as_i64(v).wrapping_sub(1) as f64,
    }
}

fn floor_div_i64(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    let r = a.wrapping_rem(b);
    if r != 0 && (r < 0) != (b < 0) {
        q - 1
    } else {
        q
    }
}

fn floor_mod_i64(a: i64, b: i64) -> i64 {
    let r = a.wrapping_rem(b);
    if r != 0 && (r < 0) != (b < 0) {
        r + b
    } else {
        r
    }
}

fn shift_amount(v: f64) -> u32 {
    let amt = as_u64(v);
    if amt >= 64 {
        64
    } else {
        amt as u32
    }
}

/// The executor's operand stack: two parallel `SmallVec`s, one per value and
/// one per domain tag, kept in lockstep.
struct Stack {
    values: SmallVec<[f64; 12]>,
    domains: SmallVec<[Domain; 12]>,
    pending_funcs: SmallVec<[(FuncId, FuncKind); 4]>,
    hwm: usize,
}

impl Stack {
    fn with_capacity(cap: usize) -> Self {
        Stack {
            values: SmallVec::with_capacity(cap),
            domains: SmallVec::with_capacity(cap),
            pending_funcs: SmallVec::new(),
            hwm: 0,
        }
    }

    fn push(&mut self, value: f64, domain: Domain) {
        self.values.push(value);
        self.domains.push(domain);
        self.hwm = self.hwm.max(self.values.len());
    }

    fn pop(&mut self) -> (f64, Domain) {
        let value = self.values.pop().expect("operand stack underflow");
        let domain = self.domains.pop().expect("operand stack underflow");
        (value, domain)
    }

    fn peek(&self) -> (f64, Domain) {
        (*self.values.last().expect("operand stack underflow"), *self.domains.last().expect("operand stack underflow"))
    }
}

/// Run a compiled program to completion, returning its final value and
/// domain. Mirrors streval.c's `arith_exec` top-level loop.
pub fn execute<O: Oracle>(prog: &Program, oracle: &mut O) -> Result<(f64, Domain), ArithError> {
    let _guard = RecursionGuard::enter()?;
    let mut stack = Stack::with_capacity(prog.max_stack_depth);
    let mut pc = 0usize;
    let code = prog.code();

    while pc < code.len() {
        let encoded = Encoded(prog.read_u8(pc));
        pc += 1;
        let op = encoded.op().expect("invalid opcode byte in compiled program");

        match op {
            OpCode::Jmp => {
                let (target, _) = prog.read_i16(pc);
                pc = target as usize;
            }
            OpCode::Jmpz => {
                let (target, next) = prog.read_i16(pc);
                let (top, _) = stack.peek();
                pc = if top == 0.0 { target as usize } else { next };
            }
            OpCode::Jmpnz => {
                let (target, next) = prog.read_i16(pc);
                let (top, _) = stack.peek();
                pc = if top != 0.0 { target as usize } else { next };
            }
            OpCode::Pop => {
                stack.pop();
            }
            OpCode::Swap => {
                let b = stack.pop();
                let a = stack.pop();
                stack.push(b.0, b.1);
                stack.push(a.0, a.1);
            }
            OpCode::NotNot => {
                let (v, _) = stack.pop();
                stack.push(if v != 0.0 { 1.0 } else { 0.0 }, Domain::Signed);
            }
            OpCode::Enum => {
                // No emitter path produces this opcode; carried for parity
                // with the opcode set the bytecode format was modeled on.
                let (rhs, _) = stack.pop();
                let (lhs, _) = stack.pop();
                stack.push(if lhs == rhs { 1.0 } else { 0.0 }, Domain::Signed);
            }
            OpCode::PushN => {
                let (value, after) = prog.read_f64(pc);
                let tag = prog.read_u8(after);
                pc = after + 1;
                stack.push(value, Domain::from_tag(tag));
            }
            OpCode::PushV => {
                let (lv, next) = read_lvalue(prog, pc);
                pc = next;
                let mut ctx = OracleCtx::default();
                let (raw, domain) = oracle.value(&lv, &mut ctx)?;
                stack.push(raw, retag_loaded_value(raw, domain));
            }
            OpCode::PushF => {
                let (func, next) = prog.read_u32(pc);
                let tag = prog.read_u8(next);
                let aux = prog.read_u8(next + 1);
                pc = next + 2;
                let kind = FuncKind::from_tag(tag, aux).expect("invalid function kind tag");
                stack.pending_funcs.push((FuncId(func), kind));
                stack.push(0.0, Domain::Signed);
            }
            OpCode::Store => {
                let (lv, next) = read_lvalue(prog, pc);
                pc = next;
                let (value, domain) = stack.pop();
                let stored = assign_with_recheck(oracle, &lv, value, false)?;
                stack.push(stored, domain);
            }
            OpCode::AssignOp1 => {
                let (lv, next) = read_lvalue(prog, pc);
                pc = next;
                let mut ctx = OracleCtx { compound_assign: true, ..Default::default() };
                let (raw, domain) = oracle.value(&lv, &mut ctx)?;
                stack.push(raw, retag_loaded_value(raw, domain));
            }
            OpCode::AssignOp => {
                let (lv, next) = read_lvalue(prog, pc);
                pc = next;
                let (value, domain) = stack.pop();
                let stored = assign_with_recheck(oracle, &lv, value, true)?;
                stack.push(stored, domain);
            }
            OpCode::UMinus => {
                let (v, domain) = stack.pop();
                let result = match domain {
                    Domain::Float => -v,
                    Domain::Unsigned => u2f(0u64.wrapping_sub(as_u64(v))),
                    Domain::Signed => as_i64(v).wrapping_neg() as f64,
                };
                stack.push(result, domain);
            }
            OpCode::Not => {
                let (v, _) = stack.pop();
                stack.push(if v == 0.0 { 1.0 } else { 0.0 }, Domain::Signed);
            }
            OpCode::Tilde => {
                let (v, domain) = stack.pop();
                if domain.is_float() {
                    return Err(ArithError::Incompatible);
                }
                let bits = !as_u64(v);
                let result = if domain.is_unsigned() { u2f(bits) } else { (bits as i64) as f64 };
                stack.push(result, domain);
            }
            OpCode::Incr | OpCode::Decr => {
                let (lv, next) = read_lvalue(prog, pc);
                pc = next;
                let mut ctx = OracleCtx::default();
                let (raw, reported) = oracle.value(&lv, &mut ctx)?;
                let domain = retag_loaded_value(raw, reported);
                if domain.is_float() {
                    return Err(ArithError::Incompatible);
                }
                let stepped = if op == OpCode::Incr { add_one(raw, domain) } else { sub_one(raw, domain) };
                let stored = oracle.assign(&lv, &mut ctx, stepped)?;
                stack.push(stored, domain);
            }
            OpCode::PlusPlus | OpCode::MinusMinus => {
                let (lv, next) = read_lvalue(prog, pc);
                pc = next;
                let mut ctx = OracleCtx::default();
                let (raw, reported) = oracle.value(&lv, &mut ctx)?;
                let domain = retag_loaded_value(raw, reported);
                let stepped = if op == OpCode::PlusPlus { add_one(raw, domain) } else { sub_one(raw, domain) };
                oracle.assign(&lv, &mut ctx, stepped)?;
                stack.push(raw, domain);
            }
            OpCode::Plus | OpCode::Minus | OpCode::Times => {
                let (rhs, rd) = stack.pop();
                let (lhs, ld) = stack.pop();
                let domain = ld.join(rd);
                let result = match domain {
                    Domain::Float => match op {
                        OpCode::Plus => lhs + rhs,
                        OpCode::Minus => lhs - rhs,
                        _ => lhs * rhs,
                    },
                    Domain::Unsigned => {
                        let (a, b) = (as_u64(lhs), as_u64(rhs));
                        u2f(match op {
                            OpCode::Plus => a.wrapping_add(b),
                            OpCode::Minus => a.wrapping_sub(b),
                            _ => a.wrapping_mul(b),
                        })
                    }
                    Domain::Signed => {
                        let (a, b) = (as_i64(lhs), as_i64(rhs));
                        (match op {
                            OpCode::Plus => a.wrapping_add(b),
                            OpCode::Minus => a.wrapping_sub(b),
                            _ => a.wrapping_mul(b),
                        }) as f64
                    }
                };
                stack.push(result, domain);
            }
            OpCode::Div => {
                let (rhs, rd) = stack.pop();
                let (lhs, ld) = stack.pop();
                let domain = ld.join(rd);
                if rhs == 0.0 {
                    return Err(ArithError::DivZero);
                }
                let result = match domain {
                    Domain::Float => lhs / rhs,
                    Domain::Unsigned => u2f(as_u64(lhs) / as_u64(rhs)),
                    Domain::Signed => floor_div_i64(as_i64(lhs), as_i64(rhs)) as f64,
                };
                stack.push(result, domain);
            }
            OpCode::Mod => {
                let (rhs, rd) = stack.pop();
                let (lhs, ld) = stack.pop();
                let domain = ld.join(rd);
                if domain.is_float() {
                    return Err(ArithError::Incompatible);
                }
                if rhs == 0.0 {
                    return Err(ArithError::DivZero);
                }
                let result = if domain.is_unsigned() {
                    u2f(as_u64(lhs) % as_u64(rhs))
                } else {
                    floor_mod_i64(as_i64(lhs), as_i64(rhs)) as f64
                };
                stack.push(result, domain);
            }
            OpCode::Pow => {
                let (rhs, rd) = stack.pop();
                let (lhs, ld) = stack.pop();
                let joined = ld.join(rd);
                let result = lhs.powf(rhs);
                let domain = retag_loaded_value(result, joined);
                stack.push(result, domain);
            }
            OpCode::And | OpCode::Or | OpCode::Xor => {
                let (rhs, rd) = stack.pop();
                let (lhs, ld) = stack.pop();
                let domain = ld.join(rd);
                if domain.is_float() {
                    return Err(ArithError::Incompatible);
                }
                let (a, b) = (as_u64(lhs), as_u64(rhs));
                let bits = match op {
                    OpCode::And => a & b,
                    OpCode::Or => a | b,
                    _ => a ^ b,
                };
                let result = if domain.is_unsigned() { u2f(bits) } else { (bits as i64) as f64 };
                stack.push(result, domain);
            }
            OpCode::LShift | OpCode::RShift => {
                let (rhs, _) = stack.pop();
                let (lhs, domain) = stack.pop();
                if domain.is_float() {
                    return Err(ArithError::Incompatible);
                }
                let amt = shift_amount(rhs);
                let result = if domain.is_unsigned() {
                    let v = as_u64(lhs);
                    let shifted = if amt >= 64 { 0 } else if op == OpCode::LShift { v << amt } else { v >> amt };
                    u2f(shifted)
                } else {
                    let v = as_i64(lhs);
                    let shifted = if amt >= 64 {
                        0
                    } else if op == OpCode::LShift {
                        ((v as i128) << amt) as i64
                    } else {
                        v >> amt
                    };
                    shifted as f64
                };
                stack.push(result, domain);
            }
            OpCode::Eq | OpCode::Neq | OpCode::Lt | OpCode::Le | OpCode::Gt | OpCode::Ge => {
                let (rhs, rd) = stack.pop();
                let (lhs, ld) = stack.pop();
                let working = ld.join(rd);
                let ordering = match working {
                    Domain::Float => lhs.partial_cmp(&rhs),
                    Domain::Unsigned => as_u64(lhs).partial_cmp(&as_u64(rhs)),
                    Domain::Signed => as_i64(lhs).partial_cmp(&as_i64(rhs)),
                };
                let truth = match ordering {
                    None => op == OpCode::Neq,
                    Some(ord) => match op {
                        OpCode::Eq => ord == std::cmp::Ordering::Equal,
                        OpCode::Neq => ord != std::cmp::Ordering::Equal,
                        OpCode::Lt => ord == std::cmp::Ordering::Less,
                        OpCode::Le => ord != std::cmp::Ordering::Greater,
                        OpCode::Gt => ord == std::cmp::Ordering::Greater,
                        _ => ord != std::cmp::Ordering::Less,
                    },
                };
                stack.push(if truth { 1.0 } else { 0.0 }, Domain::Signed);
            }
            OpCode::Call1F | OpCode::Call1I | OpCode::Call1V | OpCode::Call2F | OpCode::Call2V | OpCode::Call2I | OpCode::Call3F => {
                let arity = op.call_arity();
                let mut args = SmallVec::<[f64; 4]>::new();
                for _ in 0..arity {
                    args.push(stack.pop().0);
                }
                args.reverse();
                stack.pop(); // discard PUSHF's placeholder slot
                let (func, kind) = stack.pending_funcs.pop().expect("call with no pending function");
                let (result, domain) = oracle.call_function(func, kind, &args)?;
                stack.push(result, domain);
            }
        }
    }

    debug_assert!(
        stack.hwm <= prog.max_stack_depth,
        "operand stack reached depth {} but the program only declared {}",
        stack.hwm,
        prog.max_stack_depth
    );
    Ok(stack.peek())
}

fn read_lvalue(prog: &Program, pos: usize) -> (LValue, usize) {
    let (cell, next) = prog.read_u32(pos);
    let (flag, next) = prog.read_i32(next);
    let is_float = prog.read_u8(next) != 0;
    (
        LValue { cell: crate::oracle::CellId(cell), flag, func: None, is_float },
        next + 1,
    )
}

/// Shared assignment path for `STORE` and `ASSIGNOP`: both write `value` to
/// `lv` and leave the stored (host-coerced) value as the expression's
/// result. `compound_assign` marks the oracle-visible RMW context; when the
/// oracle signals `ctx.recheck` the target is re-read and, if it no longer
/// matches what was just written, reassigned with the fresher value
/// (spec.md's compound-assignment re-read-and-reassign rule).
fn assign_with_recheck<O: Oracle>(oracle: &mut O, lv: &LValue, value: f64, compound_assign: bool) -> Result<f64, ArithError> {
    let mut ctx = OracleCtx { compound_assign, ..Default::default() };
    let mut stored = oracle.assign(lv, &mut ctx, value)?;
    if ctx.recheck {
        let mut reread_ctx = OracleCtx { compound_assign, ..Default::default() };
        let (current, _) = oracle.value(lv, &mut reread_ctx)?;
        if current != stored {
            stored = oracle.assign(lv, &mut reread_ctx, current)?;
        }
    }
    Ok(stored)
}
