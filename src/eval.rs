//! Top-level compile/execute/eval façade, corresponding to streval.c's
//! `arith_compile`/`arith_exec`/`strval` entry points (spec.md §4.4-§4.5).

use tracing::{instrument, warn};

use crate::error::ArithError;
use crate::oracle::Oracle;
use crate::parser::Parser;
use crate::program::Program;
use crate::value::Domain;
use crate::vm;

/// Compile `text` against `oracle`, producing a reusable bytecode [`Program`].
///
/// Strict-unset checking is suspended for the duration of parsing: names are
/// resolved and l-values are minted here, but nothing is *read* yet, so an
/// unset-parameter error would be premature (mirrors streval.c clearing
/// `ARITH_UNSET` while it walks the expression the first time). On a parse
/// failure the oracle's `message` sink is given the formatted error before it
/// is returned, mirroring streval.c's `errormsg` call just before `longjmp`.
#[instrument(skip(oracle))]
pub fn compile<O: Oracle>(text: &str, oracle: &mut O) -> Result<Program, ArithError> {
    let was_strict = oracle.strict_unset();
    oracle.set_strict_unset(false);
    let result = Parser::new(text, oracle).parse();
    oracle.set_strict_unset(was_strict);
    if let Err(ref e) = result {
        warn!(error = %e, "arithmetic expression failed to compile");
        oracle.message(&e.to_string());
    }
    result
}

/// Run an already-compiled program.
#[instrument(skip(prog, oracle))]
pub fn execute<O: Oracle>(prog: &Program, oracle: &mut O) -> Result<(f64, Domain), ArithError> {
    let result = vm::execute(prog, oracle);
    if let Err(ref e) = result {
        warn!(error = %e, "arithmetic expression failed to execute");
    }
    result
}

/// Compile and immediately execute `text`, the one-shot path most callers
/// want (streval.c's `strval`).
#[instrument(skip(oracle))]
pub fn eval<O: Oracle>(text: &str, oracle: &mut O) -> Result<(f64, Domain), ArithError> {
    let prog = compile(text, oracle)?;
    execute(&prog, oracle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;

    #[test]
    fn eval_compiles_and_runs_in_one_call() {
        let mut env = Environment::new();
        let (v, d) = eval("1+2*3", &mut env).unwrap();
        assert_eq!(v, 7.0);
        assert_eq!(d, Domain::Signed);
    }

    #[test]
    fn compiled_program_can_be_reused() {
        let mut env = Environment::new();
        let prog = compile("x=x+1", &mut env).unwrap();
        let (first, _) = execute(&prog, &mut env).unwrap();
        let (second, _) = execute(&prog, &mut env).unwrap();
        assert_eq!(first, 1.0);
        assert_eq!(second, 2.0);
    }

    #[test]
    fn parse_failure_reaches_the_oracle_message_sink() {
        let mut env = Environment::new();
        assert!(eval("1)", &mut env).is_err());
        assert!(env.last_message().unwrap().contains("`)`"));
    }
}
