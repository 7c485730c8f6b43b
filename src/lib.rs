//! The TADS 3 language toolchain core: compiler front end and regular
//! expression engine.
//!
//! The front end covers tokenizing, recursive-descent parsing into an
//! arena-allocated AST, symbol tables with forward-reference resolution,
//! constant folding, and object-file serialization with link-time
//! merging. The regex engine compiles pattern strings to an NFA and
//! simulates it with a backtracking matcher; it is self-contained and
//! usable independently of the compiler.
//!
//! The virtual machine, code generator, and image-file writer are
//! downstream consumers and live elsewhere; this crate produces the AST
//! and object files they consume.

pub mod arena;
pub mod arena_ctx;
pub mod ast;
pub mod cli;
pub mod compile;
pub mod diag;
pub mod intern;
pub mod lexer;
pub mod objfile;
pub mod parser;
pub mod regex;
pub mod scope;
pub mod style;
pub mod symbol;
pub mod token;

pub use compile::{compile_source, CompileOutput, CompilerContext, CompilerOptions};
pub use diag::{Diagnostic, ErrorLog, Severity};
pub use intern::{Interner, Symbol};
pub use regex::{compile_pattern, RegexSearcher, ReplaceMode};
