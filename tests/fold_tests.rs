//! Constant-folding laws exercised through the public fold API.

use tadsc::arena_ctx::{AstArenas, AstContext};
use tadsc::ast::fold::{fold_expr, FoldEnv};
use tadsc::ast::{BinOp, ConstVal, Expr, ExprKind};
use tadsc::diag::ErrorLog;
use tadsc::intern::Interner;
use tadsc::scope::SymbolTable;
use tadsc::token::{SourceLoc, Span};

struct Fixture {
    syms: SymbolTable,
    interner: Interner,
    log: ErrorLog,
}

impl Fixture {
    fn new() -> Self {
        Fixture {
            syms: SymbolTable::new(),
            interner: Interner::new(),
            log: ErrorLog::new(),
        }
    }

    fn env<'a, 'e>(&'e mut self, ctx: AstContext<'a>) -> FoldEnv<'a, 'e> {
        FoldEnv {
            ctx,
            syms: &mut self.syms,
            interner: &mut self.interner,
            log: &mut self.log,
        }
    }
}

fn int<'a>(ctx: AstContext<'a>, v: i32) -> &'a Expr<'a> {
    ctx.expr(
        ExprKind::Const(ConstVal::Int(v)),
        SourceLoc::default(),
        Span::default(),
    )
}

fn bin<'a>(ctx: AstContext<'a>, op: BinOp, l: &'a Expr<'a>, r: &'a Expr<'a>) -> &'a Expr<'a> {
    ctx.expr(
        ExprKind::Binary(op, l, r),
        SourceLoc::default(),
        Span::default(),
    )
}

#[test]
fn integer_arithmetic_is_exact_without_overflow() {
    let arenas = AstArenas::new();
    let ctx = arenas.ctx();
    let mut fx = Fixture::new();
    let mut env = fx.env(ctx);
    let cases = [
        (BinOp::Add, 40, 2, 42),
        (BinOp::Sub, 10, 15, -5),
        (BinOp::Mul, -6, 7, -42),
        (BinOp::Div, 42, 5, 8),
        (BinOp::Mod, 42, 5, 2),
    ];
    for (op, a, b, want) in cases {
        let folded = fold_expr(&mut env, bin(ctx, op, int(ctx, a), int(ctx, b)));
        match folded.kind {
            ExprKind::Const(ConstVal::Int(got)) => assert_eq!(got, want, "{:?}", op),
            other => panic!("{:?}: {:?}", op, other),
        }
    }
}

#[test]
fn overflow_promotion_scenario() {
    // 2000000000 + 2000000000 -> float "4000000000" with the promotion
    // flag set
    let arenas = AstArenas::new();
    let ctx = arenas.ctx();
    let mut fx = Fixture::new();
    let mut env = fx.env(ctx);
    let folded = fold_expr(
        &mut env,
        bin(ctx, BinOp::Add, int(ctx, 2_000_000_000), int(ctx, 2_000_000_000)),
    );
    match folded.kind {
        ExprKind::Const(ConstVal::Float { text, promoted }) => {
            assert!(promoted);
            assert_eq!(env.interner.resolve(text), "4000000000");
        }
        other => panic!("{:?}", other),
    }
}

#[test]
fn demotion_restores_int_after_returning_to_range() {
    let arenas = AstArenas::new();
    let ctx = arenas.ctx();
    let mut fx = Fixture::new();
    let mut env = fx.env(ctx);
    let promoted = bin(
        ctx,
        BinOp::Mul,
        int(ctx, 2_000_000_000),
        int(ctx, 4),
    );
    let back = bin(ctx, BinOp::Div, promoted, int(ctx, 1_000_000_000));
    let folded = fold_expr(&mut env, back);
    assert!(
        matches!(folded.kind, ExprKind::Const(ConstVal::Int(8))),
        "{:?}",
        folded.kind
    );
}

#[test]
fn list_arithmetic_laws() {
    let arenas = AstArenas::new();
    let ctx = arenas.ctx();
    let mut fx = Fixture::new();
    let mut env = fx.env(ctx);

    // [a,b,c] + d == [a,b,c,d]
    let abc = env.ctx.const_list(vec![
        ConstVal::Int(1),
        ConstVal::Int(2),
        ConstVal::Int(3),
    ]);
    let lhs = ctx.expr(
        ExprKind::Const(ConstVal::List(abc)),
        SourceLoc::default(),
        Span::default(),
    );
    let folded = fold_expr(&mut env, bin(ctx, BinOp::Add, lhs, int(ctx, 4)));
    match folded.kind {
        ExprKind::Const(ConstVal::List(items)) => assert_eq!(items.len(), 4),
        other => panic!("{:?}", other),
    }

    // [a,b,c] - b == [a,c]
    let folded = fold_expr(&mut env, bin(ctx, BinOp::Sub, lhs, int(ctx, 2)));
    match folded.kind {
        ExprKind::Const(ConstVal::List(items)) => {
            assert_eq!(items, &[ConstVal::Int(1), ConstVal::Int(3)]);
        }
        other => panic!("{:?}", other),
    }

    // [a,b,c,b] - b == [a,c]: all occurrences go
    let abcb = env.ctx.const_list(vec![
        ConstVal::Int(1),
        ConstVal::Int(2),
        ConstVal::Int(3),
        ConstVal::Int(2),
    ]);
    let lhs2 = ctx.expr(
        ExprKind::Const(ConstVal::List(abcb)),
        SourceLoc::default(),
        Span::default(),
    );
    let folded = fold_expr(&mut env, bin(ctx, BinOp::Sub, lhs2, int(ctx, 2)));
    match folded.kind {
        ExprKind::Const(ConstVal::List(items)) => {
            assert_eq!(items, &[ConstVal::Int(1), ConstVal::Int(3)]);
        }
        other => panic!("{:?}", other),
    }

    // list - list removes each element of the right list
    let drops = env
        .ctx
        .const_list(vec![ConstVal::Int(1), ConstVal::Int(3)]);
    let rhs = ctx.expr(
        ExprKind::Const(ConstVal::List(drops)),
        SourceLoc::default(),
        Span::default(),
    );
    let folded = fold_expr(&mut env, bin(ctx, BinOp::Sub, lhs, rhs));
    match folded.kind {
        ExprKind::Const(ConstVal::List(items)) => {
            assert_eq!(items, &[ConstVal::Int(2)]);
        }
        other => panic!("{:?}", other),
    }
}

#[test]
fn fold_is_idempotent_over_mixed_trees() {
    let arenas = AstArenas::new();
    let ctx = arenas.ctx();
    let mut fx = Fixture::new();
    let mut env = fx.env(ctx);

    let tree = bin(
        ctx,
        BinOp::Add,
        bin(ctx, BinOp::Mul, int(ctx, 6), int(ctx, 7)),
        bin(ctx, BinOp::Sub, int(ctx, 0), int(ctx, 2)),
    );
    let once = fold_expr(&mut env, tree);
    let twice = fold_expr(&mut env, once);
    assert!(std::ptr::eq(once, twice));
    assert!(matches!(once.kind, ExprKind::Const(ConstVal::Int(40))));
}

#[test]
fn comparisons_fold_to_true_or_nil() {
    let arenas = AstArenas::new();
    let ctx = arenas.ctx();
    let mut fx = Fixture::new();
    let mut env = fx.env(ctx);
    let t = fold_expr(&mut env, bin(ctx, BinOp::Lt, int(ctx, 1), int(ctx, 2)));
    assert!(matches!(t.kind, ExprKind::Const(ConstVal::True)));
    let f = fold_expr(&mut env, bin(ctx, BinOp::Ge, int(ctx, 1), int(ctx, 2)));
    assert!(matches!(f.kind, ExprKind::Const(ConstVal::Nil)));
}

#[test]
fn string_concat_law() {
    let arenas = AstArenas::new();
    let ctx = arenas.ctx();
    let mut fx = Fixture::new();
    let gold = fx.interner.intern("gold: ");
    let mut env = fx.env(ctx);
    let lhs = ctx.expr(
        ExprKind::Const(ConstVal::Str(gold)),
        SourceLoc::default(),
        Span::default(),
    );
    let nil = ctx.expr(
        ExprKind::Const(ConstVal::Nil),
        SourceLoc::default(),
        Span::default(),
    );
    let folded = fold_expr(&mut env, bin(ctx, BinOp::Add, lhs, nil));
    match folded.kind {
        ExprKind::Const(ConstVal::Str(s)) => {
            assert_eq!(env.interner.resolve(s), "gold: nil");
        }
        other => panic!("{:?}", other),
    }
}
