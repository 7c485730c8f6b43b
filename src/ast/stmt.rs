//! Statement and top-level definition nodes.

use crate::ast::expr::{Arg, Expr};
use crate::ast::BodyId;
use crate::intern::Symbol;
use crate::symbol::SymId;
use crate::token::{SourceLoc, Span};

/// One initializer in a `local` declaration.
#[derive(Debug, Clone, Copy)]
pub struct LocalInit<'a> {
    pub sym: SymId,
    pub init: Option<&'a Expr<'a>>,
    pub loc: SourceLoc,
}

/// One clause of a `for (...)` initializer list.
#[derive(Debug, Clone, Copy)]
pub enum ForInit<'a> {
    Expr(&'a Expr<'a>),
    /// `local x = expr` appearing in the init list.
    Local {
        sym: SymId,
        init: Option<&'a Expr<'a>>,
    },
    /// `local x in expr` / `lval in expr` collection iteration clause.
    In {
        target: &'a Expr<'a>,
        expr: &'a Expr<'a>,
        /// Set when the clause declared the loop variable itself.
        decl: Option<SymId>,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct CatchClause<'a> {
    /// Exception class name (unresolved until link).
    pub cls: Symbol,
    pub var: SymId,
    pub body: &'a Stmt<'a>,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, Copy)]
pub enum StmtKind<'a> {
    Compound(&'a [&'a Stmt<'a>]),
    Expr(&'a Expr<'a>),
    If {
        cond: &'a Expr<'a>,
        then_s: &'a Stmt<'a>,
        else_s: Option<&'a Stmt<'a>>,
    },
    Return(Option<&'a Expr<'a>>),
    For {
        init: &'a [ForInit<'a>],
        cond: Option<&'a Expr<'a>>,
        update: Option<&'a Expr<'a>>,
        body: &'a Stmt<'a>,
    },
    Foreach {
        target: &'a Expr<'a>,
        expr: &'a Expr<'a>,
        body: &'a Stmt<'a>,
        /// Set when `foreach (local x in ...)` declared the variable.
        decl: Option<SymId>,
    },
    While {
        cond: &'a Expr<'a>,
        body: &'a Stmt<'a>,
    },
    DoWhile {
        body: &'a Stmt<'a>,
        cond: &'a Expr<'a>,
    },
    Switch {
        expr: &'a Expr<'a>,
        body: &'a Stmt<'a>,
    },
    Case {
        expr: &'a Expr<'a>,
    },
    DefaultCase,
    Break(Option<Symbol>),
    Continue(Option<Symbol>),
    Goto(Symbol),
    /// `name: stmt` label target.
    Label {
        name: Symbol,
        sym: SymId,
        stmt: &'a Stmt<'a>,
    },
    Try {
        body: &'a Stmt<'a>,
        catches: &'a [CatchClause<'a>],
        finally: Option<&'a Stmt<'a>>,
    },
    Throw(&'a Expr<'a>),
    LocalDecl(&'a [LocalInit<'a>]),
    Empty,
}

#[derive(Debug, Clone, Copy)]
pub struct Stmt<'a> {
    pub kind: StmtKind<'a>,
    pub loc: SourceLoc,
    pub span: Span,
}

/// Value side of one property definition in an object body.
#[derive(Debug, Clone, Copy)]
pub enum PropVal<'a> {
    /// `prop = expr` (including dstring self-printing values).
    Expr(&'a Expr<'a>),
    /// `prop(args) { body }` method.
    Method(BodyId),
    /// An inline nested object definition; links back via
    /// `lexical_parent` on its symbol.
    Inline(SymId),
}

#[derive(Debug, Clone, Copy)]
pub struct PropDef<'a> {
    pub prop: Symbol,
    pub val: PropVal<'a>,
    pub is_static: bool,
    pub loc: SourceLoc,
}

/// A parsed object body: `Name: Super1, Super2 { props }` and every
/// variant of it (class, modify, replace, anonymous, nested).
#[derive(Debug, Clone)]
pub struct ObjectDef<'a> {
    pub sym: SymId,
    pub props: Vec<PropDef<'a>>,
    pub loc: SourceLoc,
}

/// Top-level items in source order; the object-file writer walks this list
/// so module layout is deterministic.
#[derive(Debug, Clone)]
pub enum TopItem<'a> {
    Object(ObjectDef<'a>),
    Func {
        sym: SymId,
        body: BodyId,
        loc: SourceLoc,
    },
    Grammar {
        sym: SymId,
        loc: SourceLoc,
    },
    Dictionary {
        sym: SymId,
        loc: SourceLoc,
    },
    Enum {
        syms: Vec<SymId>,
        loc: SourceLoc,
    },
    /// `export sym 'extName';`
    Export {
        sym: Symbol,
        ext_name: Option<Symbol>,
        loc: SourceLoc,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expr::{ConstVal, ExprKind};

    #[test]
    fn stmt_nodes_are_copy() {
        let e = Expr {
            kind: ExprKind::Const(ConstVal::Nil),
            loc: SourceLoc::default(),
            span: Span::default(),
        };
        let s = Stmt {
            kind: StmtKind::Expr(&e),
            loc: SourceLoc::default(),
            span: Span::default(),
        };
        let s2 = s;
        assert!(matches!(s2.kind, StmtKind::Expr(_)));
        assert!(matches!(s.kind, StmtKind::Expr(_)));
    }
}
