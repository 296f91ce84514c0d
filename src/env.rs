//! A reference [`Oracle`] implementation: a flat variable table plus a small
//! built-in math-function registry. Exists for the demo binary and the
//! integration tests; a real host (a shell) would implement `Oracle` against
//! its own scoped variable/function tables instead.

use std::collections::HashMap;

use tracing::warn;

use crate::error::ArithError;
use crate::oracle::{CellId, FuncId, FuncKind, LValue, LookupResult, Oracle, OracleCtx};
use crate::value::Domain;

#[derive(Debug, Clone)]
struct Cell {
    value: f64,
    domain: Domain,
    set: bool,
}

impl Default for Cell {
    fn default() -> Self {
        Cell { value: 0.0, domain: Domain::Signed, set: false }
    }
}

/// A demo/test-oriented `Oracle`: variables are created on first reference
/// (like an unset shell parameter reads as zero unless `strict_unset` is on)
/// and a handful of built-in functions (`sqrt`, `pow`, `atan2`, `abs`) are
/// preregistered.
pub struct Environment {
    cells: Vec<Cell>,
    names: HashMap<String, u32>,
    funcs: HashMap<String, (FuncId, FuncKind)>,
    strict_unset: bool,
    decomma: bool,
    last_message: Option<String>,
}

impl Environment {
    pub fn new() -> Self {
        let mut env = Environment {
            cells: Vec::new(),
            names: HashMap::new(),
            funcs: HashMap::new(),
            strict_unset: false,
            decomma: false,
            last_message: None,
        };
        env.register_builtin_functions();
        env
    }

    fn register_builtin_functions(&mut self) {
        self.funcs.insert("sqrt".to_string(), (FuncId(0), FuncKind::Float1));
        self.funcs.insert("abs".to_string(), (FuncId(1), FuncKind::Float1));
        self.funcs.insert("pow".to_string(), (FuncId(2), FuncKind::Float2));
        self.funcs.insert("atan2".to_string(), (FuncId(3), FuncKind::Float2));
        self.funcs.insert("int".to_string(), (FuncId(4), FuncKind::Int1));
    }

    /// Register a host function under `name`, returning the `FuncId` a
    /// caller can use to later recognize it in `call_function`.
    pub fn define_function(&mut self, name: &str, kind: FuncKind) -> FuncId {
        let id = FuncId(100 + self.funcs.len() as u32);
        self.funcs.insert(name.to_string(), (id, kind));
        id
    }

    pub fn set_decomma(&mut self, on: bool) {
        self.decomma = on;
    }

    /// Directly seed a variable, bypassing arithmetic-expression assignment.
    pub fn set_var(&mut self, name: &str, value: f64, domain: Domain) {
        let id = self.cell_id_for(name);
        self.cells[id as usize] = Cell { value, domain, set: true };
    }

    pub fn get_var(&self, name: &str) -> Option<f64> {
        self.names.get(name).map(|&id| self.cells[id as usize].value)
    }

    /// The text of the most recent compile-failure diagnostic, for tests.
    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    fn cell_id_for(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.names.get(name) {
            return id;
        }
        let id = self.cells.len() as u32;
        self.cells.push(Cell::default());
        self.names.insert(name.to_string(), id);
        id
    }

    fn ident_len(text: &str, start: usize) -> usize {
        text[start..].bytes().take_while(|b| b.is_ascii_alphanumeric() || *b == b'_').count()
    }

    /// Scan a numeric literal starting at `start`, honoring `decomma` (a
    /// comma immediately followed by a digit is read as a decimal point,
    /// matching locales where `,` is the radix character).
    fn scan_number(&self, text: &str, start: usize) -> (f64, Domain, usize) {
        let bytes = text.as_bytes();
        if bytes[start..].starts_with(b"0x") || bytes[start..].starts_with(b"0X") {
            let hex_start = start + 2;
            let len = text[hex_start..].bytes().take_while(|b| b.is_ascii_hexdigit()).count();
            let value = i64::from_str_radix(&text[hex_start..hex_start + len], 16).unwrap_or(0);
            return (value as f64, Domain::Signed, len + 2);
        }
        let mut end = start;
        let mut saw_point = false;
        while end < bytes.len() {
            let b = bytes[end];
            if b.is_ascii_digit() {
                end += 1;
            } else if b == b'.' && !saw_point {
                saw_point = true;
                end += 1;
            } else if self.decomma && b == b',' && !saw_point && bytes.get(end + 1).is_some_and(u8::is_ascii_digit) {
                saw_point = true;
                end += 1;
            } else {
                break;
            }
        }
        let consumed = end - start;
        if saw_point {
            let mut normalized = text[start..end].to_string();
            if self.decomma {
                normalized = normalized.replace(',', ".");
            }
            (normalized.parse().unwrap_or(0.0), Domain::Float, consumed)
        } else {
            match text[start..end].parse::<i64>() {
                Ok(v) => (v as f64, Domain::Signed, consumed),
                Err(_) => (text[start..end].parse::<u64>().unwrap_or(0) as f64, Domain::Unsigned, consumed),
            }
        }
    }

    /// Decode a `'x'`/`L'x'` character literal starting at `start` (the `L`
    /// or the opening quote). Returns `None` for anything malformed
    /// (unterminated, empty, or a dangling escape), leaving the caller to
    /// report `e_charconst`.
    fn scan_char_literal(text: &str, start: usize) -> Option<(f64, usize)> {
        let bytes = text.as_bytes();
        let content_start = if bytes[start] == b'L' { start + 2 } else { start + 1 };
        let (value, len) = decode_char_escape(bytes, content_start)?;
        if bytes.get(content_start + len) != Some(&b'\'') {
            return None;
        }
        Some((value as f64, content_start + len + 1 - start))
    }
}

/// Decode one escaped or literal byte for a character literal's content,
/// following the teacher tokenizer's escape table (`\n`, `\t`, `\r`, `\0`,
/// `\\`, `\'`, `\"`, else the escaped byte verbatim). Returns `None` for an
/// empty literal or a backslash with nothing after it.
fn decode_char_escape(bytes: &[u8], pos: usize) -> Option<(i64, usize)> {
    let b = *bytes.get(pos)?;
    if b == b'\'' {
        return None;
    }
    if b == b'\\' {
        let esc = *bytes.get(pos + 1)?;
        let value = match esc {
            b'n' => b'\n',
            b't' => b'\t',
            b'r' => b'\r',
            b'0' => 0,
            other => other,
        };
        Some((value as i64, 2))
    } else {
        Some((b as i64, 1))
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

impl Oracle for Environment {
    fn lookup(&mut self, text: &str, pos: usize) -> LookupResult {
        let bytes = text.as_bytes();
        if pos >= bytes.len() {
            return LookupResult::NotFound;
        }
        let start = if bytes[pos] == b'$' { pos + 1 } else { pos };
        let decomma_leads_digit =
            self.decomma && start < bytes.len() && bytes[start] == b',' && bytes.get(start + 1).is_some_and(u8::is_ascii_digit);
        if start < bytes.len() && (bytes[start].is_ascii_digit() || bytes[start] == b'.' || decomma_leads_digit) {
            let (value, domain, consumed) = self.scan_number(text, start);
            return LookupResult::Number { value, domain, consumed: consumed + (start - pos) };
        }
        let at_quote = start < bytes.len() && bytes[start] == b'\'';
        let at_wide_quote = start + 1 < bytes.len() && bytes[start] == b'L' && bytes[start + 1] == b'\'';
        if at_quote || at_wide_quote {
            return match Self::scan_char_literal(text, start) {
                Some((value, consumed)) => LookupResult::Number { value, domain: Domain::Signed, consumed: consumed + (start - pos) },
                None => LookupResult::NotFound,
            };
        }
        if start < bytes.len() && (bytes[start].is_ascii_alphabetic() || bytes[start] == b'_') {
            let len = Self::ident_len(text, start);
            let name = &text[start..start + len];
            let consumed = len + (start - pos);
            if let Some(&(func, kind)) = self.funcs.get(name) {
                return LookupResult::Name {
                    lvalue: LValue { cell: CellId(0), flag: 0, func: Some((func, kind)), is_float: false },
                    consumed,
                };
            }
            let id = self.cell_id_for(name);
            return LookupResult::Name { lvalue: LValue::cell(CellId(id)), consumed };
        }
        LookupResult::NotFound
    }

    fn value(&mut self, lv: &LValue, ctx: &mut OracleCtx) -> Result<(f64, Domain), ArithError> {
        let cell = &self.cells[lv.cell.0 as usize];
        if !cell.set && self.strict_unset && !ctx.compound_assign {
            let name = self.names.iter().find(|(_, &id)| id == lv.cell.0).map(|(n, _)| n.clone()).unwrap_or_default();
            return Err(ArithError::NotSet(name));
        }
        Ok((cell.value, cell.domain))
    }

    fn assign(&mut self, lv: &LValue, _ctx: &mut OracleCtx, value: f64) -> Result<f64, ArithError> {
        let cell = &mut self.cells[lv.cell.0 as usize];
        cell.value = value;
        cell.set = true;
        Ok(value)
    }

    fn call_function(&mut self, func: FuncId, kind: FuncKind, args: &[f64]) -> Result<(f64, Domain), ArithError> {
        let result = match (func.0, kind) {
            (0, FuncKind::Float1) => args[0].sqrt(),
            (1, FuncKind::Float1) => args[0].abs(),
            (2, FuncKind::Float2) => args[0].powf(args[1]),
            (3, FuncKind::Float2) => args[0].atan2(args[1]),
            (4, FuncKind::Int1) => args[0].trunc(),
            _ => return Err(ArithError::ArgCount(format!("func#{}", func.0))),
        };
        Ok((result, Domain::Float))
    }

    fn message(&mut self, text: &str) -> bool {
        warn!(message = text, "arithmetic expression diagnostic");
        self.last_message = Some(text.to_string());
        true
    }

    fn is_unset(&self, lv: &LValue) -> bool {
        self.cells.get(lv.cell.0 as usize).map(|c| !c.set).unwrap_or(true)
    }

    fn decomma(&self) -> bool {
        self.decomma
    }

    fn strict_unset(&self) -> bool {
        self.strict_unset
    }

    fn set_strict_unset(&mut self, on: bool) {
        self.strict_unset = on;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::eval;

    #[test]
    fn unset_variable_reads_as_zero_by_default() {
        let mut env = Environment::new();
        let (v, _) = eval("unset_var", &mut env).unwrap();
        assert_eq!(v, 0.0);
    }

    #[test]
    fn strict_unset_rejects_unread_variables() {
        let mut env = Environment::new();
        env.set_strict_unset(true);
        assert_eq!(eval("never_assigned", &mut env), Err(ArithError::NotSet("never_assigned".to_string())));
    }

    #[test]
    fn pow_function_call_dispatches_to_the_registered_builtin() {
        let mut env = Environment::new();
        let (v, d) = eval("pow(2,10)", &mut env).unwrap();
        assert_eq!(v, 1024.0);
        assert_eq!(d, Domain::Float);
    }

    #[test]
    fn decomma_rewrites_comma_as_decimal_point() {
        let mut env = Environment::new();
        env.set_decomma(true);
        let (v, d) = eval("1,5+1", &mut env).unwrap();
        assert_eq!(v, 2.5);
        assert_eq!(d, Domain::Float);
    }

    #[test]
    fn hex_literal_parses_as_signed() {
        let mut env = Environment::new();
        let (v, d) = eval("0xFF", &mut env).unwrap();
        assert_eq!(v, 255.0);
        assert_eq!(d, Domain::Signed);
    }

    #[test]
    fn leading_comma_is_a_decimal_point_under_decomma() {
        let mut env = Environment::new();
        env.set_decomma(true);
        let (v, d) = eval(",5", &mut env).unwrap();
        assert_eq!(v, 0.5);
        assert_eq!(d, Domain::Float);
    }

    #[test]
    fn leading_comma_without_decomma_is_a_syntax_error() {
        let mut env = Environment::new();
        assert_eq!(eval(",5", &mut env), Err(ArithError::SynBad));
    }

    #[test]
    fn bare_char_literal_pushes_its_byte_value() {
        let mut env = Environment::new();
        let (v, d) = eval("'a'", &mut env).unwrap();
        assert_eq!(v, 97.0);
        assert_eq!(d, Domain::Signed);
    }

    #[test]
    fn wide_char_literal_decodes_the_same_as_bare() {
        let mut env = Environment::new();
        let (v, _) = eval("L'a'", &mut env).unwrap();
        assert_eq!(v, 97.0);
    }

    #[test]
    fn char_literal_escape_decodes_one_escape() {
        let mut env = Environment::new();
        let (v, _) = eval("'\\n'", &mut env).unwrap();
        assert_eq!(v, 10.0);
    }

    #[test]
    fn unterminated_char_literal_is_a_charconst_error() {
        let mut env = Environment::new();
        assert_eq!(eval("'a", &mut env), Err(ArithError::CharConst));
    }

    #[test]
    fn empty_char_literal_is_a_charconst_error() {
        let mut env = Environment::new();
        assert_eq!(eval("''", &mut env), Err(ArithError::CharConst));
    }
}
