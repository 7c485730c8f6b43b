//! Allocation context for AST construction.
//!
//! One typed arena per node family, bundled behind a `Copy` context so the
//! parser and the fold pass can hand it around freely. The owning
//! `AstArenas` value must outlive every node reference, which the borrow
//! checker enforces through the `'a` threading.

use crate::arena::{Arena, ArenaCheckpoint};
use crate::ast::expr::{Arg, ConstVal, Expr, ExprKind};
use crate::ast::stmt::{CatchClause, ForInit, LocalInit, Stmt, StmtKind};
use crate::intern::Symbol;
use crate::token::{SourceLoc, Span};

/// Saved state of every node-family arena, captured together so a failed
/// speculative parse can drop its whole allocation tail at once.
#[derive(Debug, Clone, Copy)]
pub struct AstCheckpoint {
    exprs: ArenaCheckpoint,
    stmts: ArenaCheckpoint,
    expr_refs: ArenaCheckpoint,
    stmt_refs: ArenaCheckpoint,
    args: ArenaCheckpoint,
    consts: ArenaCheckpoint,
    catches: ArenaCheckpoint,
    inits: ArenaCheckpoint,
    for_inits: ArenaCheckpoint,
    syms: ArenaCheckpoint,
}

/// Owner of all per-compile AST storage. Declare one, then borrow an
/// `AstContext` from it for the duration of the parse.
#[derive(Default)]
pub struct AstArenas<'a> {
    pub exprs: Arena<Expr<'a>>,
    pub stmts: Arena<Stmt<'a>>,
    pub expr_refs: Arena<&'a Expr<'a>>,
    pub stmt_refs: Arena<&'a Stmt<'a>>,
    pub args: Arena<Arg<'a>>,
    pub consts: Arena<ConstVal<'a>>,
    pub catches: Arena<CatchClause<'a>>,
    pub inits: Arena<LocalInit<'a>>,
    pub for_inits: Arena<ForInit<'a>>,
    pub syms: Arena<Symbol>,
}

impl<'a> AstArenas<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ctx(&'a self) -> AstContext<'a> {
        AstContext {
            exprs: &self.exprs,
            stmts: &self.stmts,
            expr_refs: &self.expr_refs,
            stmt_refs: &self.stmt_refs,
            args: &self.args,
            consts: &self.consts,
            catches: &self.catches,
            inits: &self.inits,
            for_inits: &self.for_inits,
            syms: &self.syms,
        }
    }
}

#[derive(Clone, Copy)]
pub struct AstContext<'a> {
    pub exprs: &'a Arena<Expr<'a>>,
    pub stmts: &'a Arena<Stmt<'a>>,
    pub expr_refs: &'a Arena<&'a Expr<'a>>,
    pub stmt_refs: &'a Arena<&'a Stmt<'a>>,
    pub args: &'a Arena<Arg<'a>>,
    pub consts: &'a Arena<ConstVal<'a>>,
    pub catches: &'a Arena<CatchClause<'a>>,
    pub inits: &'a Arena<LocalInit<'a>>,
    pub for_inits: &'a Arena<ForInit<'a>>,
    pub syms: &'a Arena<Symbol>,
}

impl<'a> AstContext<'a> {
    /// Capture the state of all ten arenas for a speculative parse.
    pub fn checkpoint(&self) -> AstCheckpoint {
        AstCheckpoint {
            exprs: self.exprs.checkpoint(),
            stmts: self.stmts.checkpoint(),
            expr_refs: self.expr_refs.checkpoint(),
            stmt_refs: self.stmt_refs.checkpoint(),
            args: self.args.checkpoint(),
            consts: self.consts.checkpoint(),
            catches: self.catches.checkpoint(),
            inits: self.inits.checkpoint(),
            for_inits: self.for_inits.checkpoint(),
            syms: self.syms.checkpoint(),
        }
    }

    /// Reclaim every node allocated since `state` was captured.
    ///
    /// # Safety
    ///
    /// No reference to a node allocated after the checkpoint may survive
    /// this call; the abandoned speculation must have discarded its whole
    /// subtree. Nodes from before the checkpoint stay valid.
    pub unsafe fn rollback(&self, state: AstCheckpoint) {
        self.exprs.rollback_unchecked(state.exprs);
        self.stmts.rollback_unchecked(state.stmts);
        self.expr_refs.rollback_unchecked(state.expr_refs);
        self.stmt_refs.rollback_unchecked(state.stmt_refs);
        self.args.rollback_unchecked(state.args);
        self.consts.rollback_unchecked(state.consts);
        self.catches.rollback_unchecked(state.catches);
        self.inits.rollback_unchecked(state.inits);
        self.for_inits.rollback_unchecked(state.for_inits);
        self.syms.rollback_unchecked(state.syms);
    }

    pub fn expr(&self, kind: ExprKind<'a>, loc: SourceLoc, span: Span) -> &'a Expr<'a> {
        self.exprs.alloc(Expr { kind, loc, span })
    }

    /// Replacement node carrying the original's source position; used by
    /// the fold pass.
    pub fn rewrap(&self, orig: &Expr<'a>, kind: ExprKind<'a>) -> &'a Expr<'a> {
        self.exprs.alloc(Expr {
            kind,
            loc: orig.loc,
            span: orig.span,
        })
    }

    pub fn konst(&self, orig: &Expr<'a>, val: ConstVal<'a>) -> &'a Expr<'a> {
        self.rewrap(orig, ExprKind::Const(val))
    }

    pub fn stmt(&self, kind: StmtKind<'a>, loc: SourceLoc, span: Span) -> &'a Stmt<'a> {
        self.stmts.alloc(Stmt { kind, loc, span })
    }

    pub fn expr_list<I>(&self, items: I) -> &'a [&'a Expr<'a>]
    where
        I: IntoIterator<Item = &'a Expr<'a>>,
        I::IntoIter: ExactSizeIterator,
    {
        self.expr_refs.alloc_slice(items)
    }

    pub fn stmt_list<I>(&self, items: I) -> &'a [&'a Stmt<'a>]
    where
        I: IntoIterator<Item = &'a Stmt<'a>>,
        I::IntoIter: ExactSizeIterator,
    {
        self.stmt_refs.alloc_slice(items)
    }

    pub fn arg_list<I>(&self, items: I) -> &'a [Arg<'a>]
    where
        I: IntoIterator<Item = Arg<'a>>,
        I::IntoIter: ExactSizeIterator,
    {
        self.args.alloc_slice(items)
    }

    pub fn const_list<I>(&self, items: I) -> &'a [ConstVal<'a>]
    where
        I: IntoIterator<Item = ConstVal<'a>>,
        I::IntoIter: ExactSizeIterator,
    {
        self.consts.alloc_slice(items)
    }

    pub fn sym_list<I>(&self, items: I) -> &'a [Symbol]
    where
        I: IntoIterator<Item = Symbol>,
        I::IntoIter: ExactSizeIterator,
    {
        self.syms.alloc_slice(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expr_builder_carries_position() {
        let arenas = AstArenas::new();
        let ctx = arenas.ctx();
        let loc = SourceLoc::new(2, 14);
        let span = Span::new(100, 103);
        let e = ctx.expr(ExprKind::Const(ConstVal::Int(40)), loc, span);
        assert_eq!(e.loc, loc);
        assert_eq!(e.span, span);
        assert!(matches!(e.kind, ExprKind::Const(ConstVal::Int(40))));
    }

    #[test]
    fn rewrap_preserves_position() {
        let arenas = AstArenas::new();
        let ctx = arenas.ctx();
        let orig = ctx.expr(
            ExprKind::Const(ConstVal::Int(1)),
            SourceLoc::new(1, 7),
            Span::new(10, 11),
        );
        let folded = ctx.konst(orig, ConstVal::Int(2));
        assert_eq!(folded.loc, orig.loc);
        assert_eq!(folded.span, orig.span);
    }

    #[test]
    fn rollback_reclaims_a_failed_speculation() {
        let arenas = AstArenas::new();
        let ctx = arenas.ctx();
        let committed = ctx.expr(
            ExprKind::Const(ConstVal::Int(1)),
            SourceLoc::default(),
            Span::default(),
        );
        let before = arenas.exprs.allocated_bytes();
        let state = ctx.checkpoint();
        for i in 0..64 {
            ctx.expr(
                ExprKind::Const(ConstVal::Int(i)),
                SourceLoc::default(),
                Span::default(),
            );
        }
        assert!(arenas.exprs.allocated_bytes() > before);
        // the speculation failed and discarded every node it built
        unsafe { ctx.rollback(state) };
        assert_eq!(arenas.exprs.allocated_bytes(), before);
        assert!(matches!(
            committed.kind,
            ExprKind::Const(ConstVal::Int(1))
        ));
    }

    #[test]
    fn list_builders_accept_vecs() {
        let arenas = AstArenas::new();
        let ctx = arenas.ctx();
        let a = ctx.expr(
            ExprKind::Const(ConstVal::Nil),
            SourceLoc::default(),
            Span::default(),
        );
        let b = ctx.expr(
            ExprKind::Const(ConstVal::True),
            SourceLoc::default(),
            Span::default(),
        );
        let list = ctx.expr_list(vec![a, b]);
        assert_eq!(list.len(), 2);
        let consts = ctx.const_list(vec![ConstVal::Int(1), ConstVal::Int(2)]);
        assert_eq!(consts, &[ConstVal::Int(1), ConstVal::Int(2)]);
    }
}
