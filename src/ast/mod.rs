//! The abstract syntax tree.
//!
//! Nodes are tagged variants allocated from the parse arenas; see
//! `arena_ctx` for the allocation context. Code bodies are held in a pool
//! on the parsed module and referenced by `BodyId`, because the parser
//! keeps amending a body's metadata (captured locals, context flags) while
//! nested bodies are still being parsed.

pub mod expr;
pub mod fold;
pub mod stmt;

pub use expr::{Arg, BinOp, ConstVal, Expr, ExprKind, InheritedTarget, PropSpec, UnOp};
pub use stmt::{
    CatchClause, ForInit, LocalInit, ObjectDef, PropDef, PropVal, Stmt, StmtKind, TopItem,
};

use crate::symbol::SymId;
use crate::token::SourceLoc;

/// Index into a module's code-body pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub u32);

impl BodyId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Captured-locals metadata for a code body whose locals are referenced by
/// nested bodies.
#[derive(Debug, Clone, Default)]
pub struct LocalCtx {
    /// Stack slot holding the shared context object.
    pub var_slot: u32,
    /// Captured locals and their stable indices within the context object.
    /// Nested bodies at any depth use the same index for a given original.
    pub locals: Vec<(SymId, u16)>,
    /// A nested body references `self`.
    pub needs_self: bool,
    /// A nested body references `targetprop`/`targetobj`/`definingobj`.
    pub needs_full_ctx: bool,
}

impl LocalCtx {
    /// Index for a captured local, assigning the next slot on first use.
    pub fn index_for(&mut self, sym: SymId) -> u16 {
        if let Some(&(_, idx)) = self.locals.iter().find(|(s, _)| *s == sym) {
            return idx;
        }
        let idx = self.locals.len() as u16;
        self.locals.push((sym, idx));
        idx
    }
}

/// The top of a function or method: its statement list plus everything the
/// code generator needs to lay the frame out.
#[derive(Debug, Clone)]
pub struct CodeBody<'a> {
    /// `None` for an extern declaration.
    pub stm: Option<&'a Stmt<'a>>,
    pub formals: Vec<SymId>,
    pub varargs: bool,
    /// High-water local slot count, formals included.
    pub local_cnt: u32,
    /// Methods have a `self`; floating functions do not.
    pub is_method: bool,
    pub self_referenced: bool,
    pub full_method_ctx_referenced: bool,
    pub local_ctx: Option<LocalCtx>,
    /// Lexically enclosing body, for nested (anonymous) functions.
    pub enclosing: Option<BodyId>,
    /// Every local defined anywhere in the body, for the unreferenced scan
    /// and the debug records.
    pub locals: Vec<SymId>,
    pub labels: Vec<SymId>,
    /// Offsets within the module's code stream that need this body's
    /// anchor patched in.
    pub fixups: Vec<u32>,
    /// Byte-code offset range, for debug records.
    pub code_range: (u32, u32),
    pub has_retval: bool,
    pub loc: SourceLoc,
}

impl<'a> CodeBody<'a> {
    pub fn new(is_method: bool, loc: SourceLoc) -> Self {
        CodeBody {
            stm: None,
            formals: Vec::new(),
            varargs: false,
            local_cnt: 0,
            is_method,
            self_referenced: false,
            full_method_ctx_referenced: false,
            local_ctx: None,
            enclosing: None,
            locals: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            code_range: (0, 0),
            has_retval: true,
            loc,
        }
    }

    /// Promote an outer local into this body's shared context object,
    /// returning its stable index.
    pub fn capture_local(&mut self, sym: SymId) -> u16 {
        self.local_ctx
            .get_or_insert_with(LocalCtx::default)
            .index_for(sym)
    }
}

/// Everything the parser produced for one translation unit.
#[derive(Debug, Default)]
pub struct ParsedModule<'a> {
    pub items: Vec<TopItem<'a>>,
    pub bodies: Vec<CodeBody<'a>>,
}

impl<'a> ParsedModule<'a> {
    pub fn body(&self, id: BodyId) -> &CodeBody<'a> {
        &self.bodies[id.index()]
    }

    pub fn body_mut(&mut self, id: BodyId) -> &mut CodeBody<'a> {
        &mut self.bodies[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_local_assigns_stable_indices() {
        let mut body: CodeBody<'_> = CodeBody::new(false, SourceLoc::default());
        let a = SymId(3);
        let b = SymId(9);
        assert_eq!(body.capture_local(a), 0);
        assert_eq!(body.capture_local(b), 1);
        // Re-capturing yields the same slot.
        assert_eq!(body.capture_local(a), 0);
        assert_eq!(body.local_ctx.as_ref().unwrap().locals.len(), 2);
    }
}
