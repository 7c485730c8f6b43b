//! The compilation pipeline: source text -> tokens -> AST -> folded AST
//! -> object file.
//!
//! All state with per-compile lifetime (id allocators, the `+` location
//! stack, the active dictionary, the interner) lives in
//! `CompilerContext`, created at begin-compile and dropped at
//! end-compile; nothing is process-global.

use crate::arena_ctx::AstArenas;
use crate::ast::fold::{fold_expr, fold_stmt, FoldEnv};
use crate::ast::{ParsedModule, PropVal, TopItem};
use crate::diag::{ErrorLog, FileTable};
use crate::intern::{Interner, Symbol};
use crate::lexer::Lexer;
use crate::objfile::writer::{write_object_file, write_symbol_file};
use crate::parser::Parser;
use crate::scope::SymbolTable;
use crate::symbol::{ObjTemplate, SymId};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct CompilerOptions {
    /// Parse and diagnose only; write nothing.
    pub syntax_only: bool,
    /// Emit debug records.
    pub debug: bool,
    /// Enable pedantic diagnostics.
    pub pedantic: bool,
    /// `-D name=value` predefines.
    pub defines: Vec<(String, String)>,
}

/// Owner of everything with per-compile lifetime except the AST arenas.
pub struct CompilerContext {
    pub interner: Interner,
    pub files: FileTable,
    pub log: ErrorLog,
    pub syms: SymbolTable,
    pub options: CompilerOptions,
    pub next_obj_id: u32,
    pub next_enum_id: u32,
    /// Stack of the last object seen at each `+` nesting depth.
    pub loc_stack: Vec<Symbol>,
    /// Dictionary that newly-defined vocabulary goes into.
    pub cur_dict: Option<SymId>,
    /// Properties declared with `dictionary property`.
    pub dict_props: HashSet<Symbol>,
    /// Templates declared with `object template`, applying to all classes.
    pub global_templates: Vec<ObjTemplate>,
    next_meta_idx: u16,
    anon_counter: u32,
}

impl CompilerContext {
    pub fn new(options: CompilerOptions) -> Self {
        let mut log = ErrorLog::new();
        log.set_pedantic(options.pedantic);
        CompilerContext {
            interner: Interner::new(),
            files: FileTable::new(),
            log,
            syms: SymbolTable::new(),
            options,
            next_obj_id: 1,
            next_enum_id: 1,
            loc_stack: Vec::new(),
            cur_dict: None,
            dict_props: HashSet::new(),
            global_templates: Vec::new(),
            next_meta_idx: 0,
            anon_counter: 0,
        }
    }

    pub fn alloc_obj_id(&mut self) -> u32 {
        let id = self.next_obj_id;
        self.next_obj_id += 1;
        id
    }

    pub fn alloc_enum_id(&mut self) -> u32 {
        let id = self.next_enum_id;
        self.next_enum_id += 1;
        id
    }

    pub fn alloc_meta_idx(&mut self) -> u16 {
        let idx = self.next_meta_idx;
        self.next_meta_idx += 1;
        idx
    }

    /// Fresh name for a synthesized symbol (modify placeholders, grammar
    /// match objects, anonymous objects).
    pub fn anon_name(&mut self, prefix: &str) -> Symbol {
        self.anon_counter += 1;
        let name = format!("{}#{}", prefix, self.anon_counter);
        self.interner.intern(&name)
    }
}

/// Everything a driver wants back from one compilation.
pub struct CompileOutput {
    pub object_file: Option<Vec<u8>>,
    pub symbol_file: Option<Vec<u8>>,
    pub diagnostics: String,
    pub exit_code: i32,
    pub symbol_dump: Option<String>,
}

/// Run the fold pass over every expression in the module. Folding is
/// idempotent, so running it once after the parse is complete resolves
/// forward references that the in-parse folds could not see.
fn fold_module<'a>(arenas: &'a AstArenas<'a>, cc: &mut CompilerContext, module: &mut ParsedModule<'a>) {
    let ctx = arenas.ctx();
    let mut env = FoldEnv {
        ctx,
        syms: &mut cc.syms,
        interner: &mut cc.interner,
        log: &mut cc.log,
    };
    for item in &mut module.items {
        if let TopItem::Object(def) = item {
            for prop in &mut def.props {
                if let PropVal::Expr(e) = prop.val {
                    prop.val = PropVal::Expr(fold_expr(&mut env, e));
                }
            }
        }
    }
    for body in &mut module.bodies {
        if let Some(stm) = body.stm {
            body.stm = Some(fold_stmt(&mut env, stm));
        }
    }
}

#[derive(Serialize)]
struct SymbolDumpEntry<'s> {
    name: &'s str,
    kind: &'static str,
    referenced: bool,
    exported: bool,
}

fn dump_symbols(cc: &CompilerContext) -> String {
    let entries: Vec<SymbolDumpEntry> = cc
        .syms
        .globals()
        .map(|id| {
            let e = cc.syms.entry(id);
            SymbolDumpEntry {
                name: cc.interner.resolve(e.name),
                kind: e.kind.kind_name(),
                referenced: e.referenced,
                exported: e.is_exported(),
            }
        })
        .collect();
    serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
}

/// Compile one translation unit held in memory.
pub fn compile_source(
    name: &str,
    source: &str,
    options: CompilerOptions,
    want_symbol_dump: bool,
) -> CompileOutput {
    let mut cc = CompilerContext::new(options);
    let file_id = cc.files.add(name, source.to_string());

    let tokens = {
        let CompilerContext {
            ref mut interner,
            ref mut log,
            ref options,
            ..
        } = cc;
        let mut lexer = Lexer::new(source, file_id, interner, log);
        for (name, value) in &options.defines {
            lexer.add_predefine(name, value);
        }
        lexer.tokenize()
    };

    let arenas = AstArenas::new();
    let mut module = {
        let parser = Parser::new(tokens, arenas.ctx(), &mut cc);
        parser.parse_module()
    };

    fold_module(&arenas, &mut cc, &mut module);

    let symbol_dump = want_symbol_dump.then(|| dump_symbols(&cc));

    let (object_file, symbol_file) = if cc.options.syntax_only || cc.log.has_errors() {
        (None, None)
    } else {
        (Some(write_object_file(&cc)), Some(write_symbol_file(&cc)))
    };

    CompileOutput {
        object_file,
        symbol_file,
        diagnostics: cc.log.render(&cc.files),
        exit_code: cc.log.exit_code(),
        symbol_dump,
    }
}

/// Compile a source file from disk.
pub fn compile_file(
    path: &Path,
    options: CompilerOptions,
    want_symbol_dump: bool,
) -> std::io::Result<CompileOutput> {
    let source = fs::read_to_string(path)?;
    Ok(compile_source(
        &path.display().to_string(),
        &source,
        options,
        want_symbol_dump,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_compile_produces_object_file() {
        let source = "startRoom: object\n    north = nil\n;\n";
        let out = compile_source("t.t", source, CompilerOptions::default(), false);
        assert_eq!(out.exit_code, 0, "diagnostics: {}", out.diagnostics);
        assert!(out.object_file.is_some());
        assert!(out.symbol_file.is_some());
    }

    #[test]
    fn syntax_only_skips_output() {
        let source = "f(x) { return x + 1; }\n";
        let options = CompilerOptions {
            syntax_only: true,
            ..CompilerOptions::default()
        };
        let out = compile_source("t.t", source, options, false);
        assert_eq!(out.exit_code, 0, "diagnostics: {}", out.diagnostics);
        assert!(out.object_file.is_none());
    }

    #[test]
    fn errors_set_exit_code_and_suppress_output() {
        let out = compile_source("t.t", "f(x) { return }\n", CompilerOptions::default(), false);
        assert_eq!(out.exit_code, 1);
        assert!(out.object_file.is_none());
    }

    #[test]
    fn symbol_dump_lists_globals() {
        let out = compile_source(
            "t.t",
            "lamp: object;\n",
            CompilerOptions::default(),
            true,
        );
        let dump = out.symbol_dump.expect("dump requested");
        assert!(dump.contains("lamp"), "{}", dump);
        assert!(dump.contains("object"), "{}", dump);
    }
}
