pub mod env;
pub mod error;
pub mod eval;
pub mod opcode;
pub mod oracle;
pub mod parser;
pub mod program;
pub mod token;
pub mod value;
pub mod vm;

pub use env::Environment;
pub use error::{ArithError, ErrorMode};
pub use eval::{compile, eval, execute};
pub use oracle::{CellId, FuncId, FuncKind, LValue, LookupResult, Oracle, OracleCtx};
pub use program::Program;
pub use value::Domain;

mod tests;
