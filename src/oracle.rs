//! The oracle interface: the host collaborator that resolves names, reads and
//! writes values, resolves functions, and formats diagnostics.
//!
//! Grounded on streval.c's `(*ep->fun)(&ptr, &node, mode, value)` callback and
//! on spec.md §9's suggested redesign: a tagged-variant `LookupResult`/`trait
//! Oracle` in place of the C out-parameter `struct lval`.

use crate::error::ArithError;
use crate::opcode::OpCode;
use crate::value::Domain;

/// Opaque handle to a named cell in the host's variable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(pub u32);

/// Opaque handle to an entry in the host's math-function registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub u32);

/// Which native call shape a resolved function uses, matching the
/// `Math_1f_f`/`Math_1i_f`/`Math_2f_f`/`Math_2v_f`/`Math_2f_i`/`Math_2i_f`/
/// `Math_3f_f` typedefs in streval.c, plus the user-defined (marshalled,
/// array-argument) path taken for shell functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncKind {
    /// `f64 -> f64`, e.g. `sqrt`.
    Float1,
    /// `f64 -> f64` truncated through an `int`-returning native fn.
    Int1,
    /// `(f64, f64) -> f64`, e.g. `pow`, `atan2`.
    Float2,
    /// `(f64, i32) -> f64`, e.g. `ldexp`-shaped functions (`T_NOFLOAT` arg).
    FloatIntArg2,
    /// `(kind, f64, f64) -> f64`: a function family selected by its own id.
    Variadic2,
    /// `(f64, f64) -> i32`.
    Int2,
    /// `(f64, f64, f64) -> f64`.
    Float3,
    /// A shell-defined function taking `arity` (1..=3) positional arguments,
    /// marshalled into an array and invoked through the host's generic
    /// math-function helper instead of a native pointer.
    UserFn(u8),
}

impl FuncKind {
    pub fn arity(self) -> usize {
        match self {
            FuncKind::Float1 | FuncKind::Int1 => 1,
            FuncKind::Float2 | FuncKind::FloatIntArg2 | FuncKind::Variadic2 | FuncKind::Int2 => 2,
            FuncKind::Float3 => 3,
            FuncKind::UserFn(n) => n as usize,
        }
    }

    /// `(CALLn* opcode, extra encoded flags)` this function kind compiles to.
    pub fn call_opcode(self) -> (OpCode, u8) {
        use crate::opcode::{BINARY, NOFLOAT};
        match self {
            FuncKind::Float1 => (OpCode::Call1F, 0),
            FuncKind::Int1 => (OpCode::Call1I, 0),
            FuncKind::Float2 => (OpCode::Call2F, 0),
            FuncKind::FloatIntArg2 => (OpCode::Call2F, NOFLOAT),
            FuncKind::Variadic2 => (OpCode::Call2V, 0),
            FuncKind::Int2 => (OpCode::Call2I, 0),
            FuncKind::Float3 => (OpCode::Call3F, 0),
            FuncKind::UserFn(1) => (OpCode::Call1F, BINARY),
            FuncKind::UserFn(2) => (OpCode::Call2F, BINARY),
            FuncKind::UserFn(_) => (OpCode::Call3F, BINARY),
        }
    }

    pub fn is_user(self) -> bool {
        matches!(self, FuncKind::UserFn(_))
    }

    /// `(tag, aux)` pair stored inline after `PUSHF`'s function id. `aux`
    /// only carries meaning for `UserFn`, where it is the argument count.
    pub fn to_tag(self) -> (u8, u8) {
        match self {
            FuncKind::Float1 => (0, 0),
            FuncKind::Int1 => (1, 0),
            FuncKind::Float2 => (2, 0),
            FuncKind::FloatIntArg2 => (3, 0),
            FuncKind::Variadic2 => (4, 0),
            FuncKind::Int2 => (5, 0),
            FuncKind::Float3 => (6, 0),
            FuncKind::UserFn(n) => (7, n),
        }
    }

    pub fn from_tag(tag: u8, aux: u8) -> Option<FuncKind> {
        let kind = match tag {
            0 => FuncKind::Float1,
            1 => FuncKind::Int1,
            2 => FuncKind::Float2,
            3 => FuncKind::FloatIntArg2,
            4 => FuncKind::Variadic2,
            5 => FuncKind::Int2,
            6 => FuncKind::Float3,
            7 => FuncKind::UserFn(aux),
            _ => return None,
        };
        Some(kind)
    }
}

/// An assignable target, produced by [`Oracle::lookup`].
///
/// Mirrors streval.c's `struct lval`: `cell` stands in for the opaque pointer
/// to the named storage slot, `flag` for the subscript-like hint, `nargs`/
/// `func` for function-symbol resolution, `is_float` for the domain the host
/// reports the cell as holding.
#[derive(Debug, Clone, PartialEq)]
pub struct LValue {
    pub cell: CellId,
    pub flag: i32,
    pub func: Option<(FuncId, FuncKind)>,
    pub is_float: bool,
}

impl LValue {
    pub fn cell(cell: CellId) -> Self {
        LValue { cell, flag: 0, func: None, is_float: false }
    }
}

/// What [`Oracle::lookup`] found starting at a given position.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupResult {
    /// A numeric literal was parsed; `consumed` bytes should be skipped.
    Number { value: f64, domain: Domain, consumed: usize },
    /// An assignable name was resolved.
    Name { lvalue: LValue, consumed: usize },
    /// Neither: a synbad/badnum error at the current position.
    NotFound,
}

/// Mutable scratch state threaded through one oracle call.
///
/// Mirrors streval.c's `struct lval` fields that exist purely to carry
/// call-scoped state between the parser/VM and the oracle: `nosub`,
/// `emode`'s `ARITH_ASSIGNOP` bit, `eflag` (enum-compare context), and the
/// next-opcode preview used so the oracle can special-case an immediately
/// following auto-increment.
#[derive(Debug, Clone, Default)]
pub struct OracleCtx {
    pub sub: i32,
    pub compound_assign: bool,
    pub enum_compare: bool,
    pub next_op: Option<OpCode>,
    /// Set by [`Oracle::assign`] to request that the VM re-read the
    /// compound-assignment target and, if it changed underneath the RHS
    /// evaluation, assign again with the re-read value.
    pub recheck: bool,
}

/// The host collaborator: variable/name storage, function registry, and
/// diagnostic sink, addressed only through this contract (spec.md §1).
pub trait Oracle {
    /// Parse a numeric literal or resolve an identifier starting at byte
    /// offset `pos` in `text`.
    fn lookup(&mut self, text: &str, pos: usize) -> LookupResult;

    /// Read the current value of an l-value.
    fn value(&mut self, lv: &LValue, ctx: &mut OracleCtx) -> Result<(f64, Domain), ArithError>;

    /// Assign a new value to an l-value, returning the value actually stored
    /// (the host may coerce it).
    fn assign(&mut self, lv: &LValue, ctx: &mut OracleCtx, value: f64) -> Result<f64, ArithError>;

    /// Invoke a resolved function with its (already-evaluated) arguments.
    fn call_function(&mut self, func: FuncId, kind: FuncKind, args: &[f64]) -> Result<(f64, Domain), ArithError>;

    /// Format/emit a compile-time diagnostic. Returning `false` tells the
    /// caller the host declined and the compiled program should be dropped
    /// (mirrors `MESSAGE` mode returning negative in streval.c).
    fn message(&mut self, _text: &str) -> bool {
        true
    }

    /// Whether an l-value was never written (used for the strict-unset
    /// zero-assignment check).
    fn is_unset(&self, _lv: &LValue) -> bool {
        false
    }

    fn decomma(&self) -> bool {
        false
    }

    fn strict_unset(&self) -> bool {
        false
    }

    fn set_strict_unset(&mut self, _on: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_fn_arity_one_uses_call1f_with_binary_flag() {
        let (op, flags) = FuncKind::UserFn(1).call_opcode();
        assert_eq!(op, OpCode::Call1F);
        assert_eq!(flags, crate::opcode::BINARY);
    }

    #[test]
    fn float_int_arg2_sets_nofloat() {
        let (op, flags) = FuncKind::FloatIntArg2.call_opcode();
        assert_eq!(op, OpCode::Call2F);
        assert_eq!(flags, crate::opcode::NOFLOAT);
    }
}
