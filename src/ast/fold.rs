//! Constant folding.
//!
//! Folding happens during and after parsing: every fold returns a
//! replacement node (possibly the input itself) and never mutates shared
//! nodes, so a subtree can be folded any number of times with the same
//! result. Fold-time errors (division by zero, bad subscript) are reported
//! at the operator and the subtree is left unfolded so later passes still
//! see a structurally valid tree.

use crate::arena_ctx::AstContext;
use crate::ast::expr::{Arg, BinOp, ConstVal, Expr, ExprKind, PropSpec, UnOp};
use crate::ast::stmt::{CatchClause, ForInit, LocalInit, Stmt, StmtKind};
use crate::diag::ErrorLog;
use crate::intern::{Interner, Symbol};
use crate::scope::{DefPolicy, SymbolTable};
use crate::symbol::{SymId, SymKind};
use std::collections::HashMap;

/// Everything the fold pass needs to thread through the walk.
pub struct FoldEnv<'a, 'e> {
    pub ctx: AstContext<'a>,
    pub syms: &'e mut SymbolTable,
    pub interner: &'e mut Interner,
    pub log: &'e mut ErrorLog,
}

impl<'a, 'e> FoldEnv<'a, 'e> {
    fn int_text(&mut self, v: i64) -> Symbol {
        self.interner.intern(&v.to_string())
    }

    fn float_of(&self, text: Symbol) -> f64 {
        self.interner.resolve(text).parse::<f64>().unwrap_or(0.0)
    }

    fn int_of_float_text(&self, text: Symbol) -> Option<i64> {
        self.interner.resolve(text).parse::<i64>().ok()
    }
}

/// Truthiness of a constant under TADS rules: nil and numeric zero are
/// false, every other value is true.
fn truthy(env: &FoldEnv, v: &ConstVal) -> bool {
    match v {
        ConstVal::Nil => false,
        ConstVal::Int(0) => false,
        ConstVal::Float { text, .. } => env.float_of(*text) != 0.0,
        _ => true,
    }
}

fn bool_const(b: bool) -> ConstVal<'static> {
    if b {
        ConstVal::True
    } else {
        ConstVal::Nil
    }
}

/// Constant equality with numeric int/float mixing; everything else is
/// structural.
fn const_eq(env: &FoldEnv, a: &ConstVal, b: &ConstVal) -> bool {
    match (a, b) {
        (ConstVal::Float { text: ta, .. }, ConstVal::Float { text: tb, .. }) => {
            env.float_of(*ta) == env.float_of(*tb)
        }
        (ConstVal::Float { text, .. }, ConstVal::Int(i))
        | (ConstVal::Int(i), ConstVal::Float { text, .. }) => env.float_of(*text) == *i as f64,
        (ConstVal::List(xs), ConstVal::List(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys.iter()).all(|(x, y)| const_eq(env, x, y))
        }
        _ => a == b,
    }
}

/// Reverse an overflow promotion: a promoted float whose value fits a
/// 32-bit int becomes an int constant again.
pub fn demote_float<'a>(env: &FoldEnv<'a, '_>, v: ConstVal<'a>) -> ConstVal<'a> {
    if let ConstVal::Float {
        text,
        promoted: true,
    } = v
    {
        if let Some(i) = env.int_of_float_text(text) {
            if i32::try_from(i).is_ok() {
                return ConstVal::Int(i as i32);
            }
        }
    }
    v
}

/// Fold an integer binary operation, promoting overflow on `+ - *` to a
/// float constant. `None` means "report at the operator and leave
/// unfolded".
fn fold_int_bin<'a>(env: &mut FoldEnv<'a, '_>, op: BinOp, a: i32, b: i32) -> Option<ConstVal<'a>> {
    let wide = |v: i64, env: &mut FoldEnv<'a, '_>| -> ConstVal<'a> {
        match i32::try_from(v) {
            Ok(n) => ConstVal::Int(n),
            Err(_) => ConstVal::Float {
                text: env.int_text(v),
                promoted: true,
            },
        }
    };
    let v = match op {
        BinOp::Add => wide(a as i64 + b as i64, env),
        BinOp::Sub => wide(a as i64 - b as i64, env),
        BinOp::Mul => wide(a as i64 * b as i64, env),
        BinOp::Div => {
            if b == 0 {
                return None;
            }
            wide(a as i64 / b as i64, env)
        }
        BinOp::Mod => {
            if b == 0 {
                return None;
            }
            wide(a as i64 % b as i64, env)
        }
        BinOp::BitAnd => ConstVal::Int(a & b),
        BinOp::BitOr => ConstVal::Int(a | b),
        BinOp::BitXor => ConstVal::Int(a ^ b),
        BinOp::Shl => ConstVal::Int(a.wrapping_shl(b as u32 & 31)),
        BinOp::Ashr => ConstVal::Int(a.wrapping_shr(b as u32 & 31)),
        BinOp::Lshr => ConstVal::Int(((a as u32).wrapping_shr(b as u32 & 31)) as i32),
        BinOp::Eq => bool_const(a == b),
        BinOp::Ne => bool_const(a != b),
        BinOp::Lt => bool_const(a < b),
        BinOp::Le => bool_const(a <= b),
        BinOp::Gt => bool_const(a > b),
        BinOp::Ge => bool_const(a >= b),
        _ => return None,
    };
    Some(v)
}

/// Fold arithmetic where at least one side is a float constant. Exact
/// integer arithmetic is used while both sides have integral text, so a
/// promoted value can be demoted precisely once it re-enters range.
fn fold_float_bin<'a>(
    env: &mut FoldEnv<'a, '_>,
    op: BinOp,
    a: &ConstVal<'a>,
    b: &ConstVal<'a>,
) -> Option<ConstVal<'a>> {
    let promoted = |v: &ConstVal| matches!(v, ConstVal::Float { promoted: true, .. });
    let any_promoted = promoted(a) || promoted(b);

    let int_side = |v: &ConstVal| -> Option<i64> {
        match v {
            ConstVal::Int(i) => Some(*i as i64),
            ConstVal::Float { text, .. } => env.int_of_float_text(*text),
            _ => None,
        }
    };

    if let (Some(x), Some(y)) = (int_side(a), int_side(b)) {
        let exact = match op {
            BinOp::Add => Some(x as i128 + y as i128),
            BinOp::Sub => Some(x as i128 - y as i128),
            BinOp::Mul => Some(x as i128 * y as i128),
            BinOp::Div => {
                if y == 0 {
                    return None;
                }
                Some(x as i128 / y as i128)
            }
            BinOp::Mod => {
                if y == 0 {
                    return None;
                }
                Some(x as i128 % y as i128)
            }
            _ => None,
        };
        if let Some(v) = exact {
            let result = ConstVal::Float {
                text: env.int_text(v as i64),
                promoted: any_promoted,
            };
            return Some(demote_float(env, result));
        }
    }

    let f = |v: &ConstVal| -> Option<f64> {
        match v {
            ConstVal::Int(i) => Some(*i as f64),
            ConstVal::Float { text, .. } => Some(env.float_of(*text)),
            _ => None,
        }
    };
    let (x, y) = (f(a)?, f(b)?);
    let val = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return None;
            }
            x / y
        }
        BinOp::Mod => {
            if y == 0.0 {
                return None;
            }
            x % y
        }
        BinOp::Eq => return Some(bool_const(x == y)),
        BinOp::Ne => return Some(bool_const(x != y)),
        BinOp::Lt => return Some(bool_const(x < y)),
        BinOp::Le => return Some(bool_const(x <= y)),
        BinOp::Gt => return Some(bool_const(x > y)),
        BinOp::Ge => return Some(bool_const(x >= y)),
        _ => return None,
    };
    let text = env.interner.intern(&format!("{}", val));
    Some(ConstVal::Float {
        text,
        promoted: any_promoted,
    })
}

/// `cvt_to_str`: render a constant for string concatenation.
fn cvt_to_str(env: &mut FoldEnv, v: &ConstVal) -> Option<String> {
    match v {
        ConstVal::Str(s) => Some(env.interner.resolve(*s).to_string()),
        ConstVal::Int(i) => Some(i.to_string()),
        ConstVal::Float { text, .. } => Some(env.interner.resolve(*text).to_string()),
        ConstVal::Nil => Some("nil".to_string()),
        ConstVal::True => Some("true".to_string()),
        _ => None,
    }
}

fn fold_string_concat<'a>(
    env: &mut FoldEnv<'a, '_>,
    a: &ConstVal<'a>,
    b: &ConstVal<'a>,
) -> Option<ConstVal<'a>> {
    let left = cvt_to_str(env, a)?;
    let right = cvt_to_str(env, b)?;
    let joined = format!("{}{}", left, right);
    Some(ConstVal::Str(env.interner.intern(&joined)))
}

fn fold_list_bin<'a>(
    env: &mut FoldEnv<'a, '_>,
    op: BinOp,
    items: &'a [ConstVal<'a>],
    rhs: &ConstVal<'a>,
) -> Option<ConstVal<'a>> {
    match op {
        BinOp::Add => {
            let mut out: Vec<ConstVal<'a>> = items.to_vec();
            match rhs {
                ConstVal::List(more) => out.extend(more.iter().copied()),
                other => out.push(*other),
            }
            Some(ConstVal::List(env.ctx.const_list(out)))
        }
        BinOp::Sub => {
            let keep = |v: &ConstVal<'a>, env: &FoldEnv<'a, '_>| -> bool {
                match rhs {
                    ConstVal::List(drops) => !drops.iter().any(|d| const_eq(env, v, d)),
                    other => !const_eq(env, v, other),
                }
            };
            let out: Vec<ConstVal<'a>> = items.iter().copied().filter(|v| keep(v, env)).collect();
            Some(ConstVal::List(env.ctx.const_list(out)))
        }
        BinOp::Eq => Some(bool_const(const_eq(env, &ConstVal::List(items), rhs))),
        BinOp::Ne => Some(bool_const(!const_eq(env, &ConstVal::List(items), rhs))),
        _ => None,
    }
}

fn fold_const_bin<'a>(
    env: &mut FoldEnv<'a, '_>,
    e: &'a Expr<'a>,
    op: BinOp,
    a: &ConstVal<'a>,
    b: &ConstVal<'a>,
) -> Option<ConstVal<'a>> {
    let result = match (a, b) {
        (ConstVal::Int(x), ConstVal::Int(y)) => fold_int_bin(env, op, *x, *y),
        (ConstVal::Str(_), _) if op == BinOp::Add => fold_string_concat(env, a, b),
        (ConstVal::List(items), _) => fold_list_bin(env, op, items, b),
        (ConstVal::Float { .. }, _) | (_, ConstVal::Float { .. })
            if matches!(
                op,
                BinOp::Add
                    | BinOp::Sub
                    | BinOp::Mul
                    | BinOp::Div
                    | BinOp::Mod
                    | BinOp::Eq
                    | BinOp::Ne
                    | BinOp::Lt
                    | BinOp::Le
                    | BinOp::Gt
                    | BinOp::Ge
            ) =>
        {
            fold_float_bin(env, op, a, b)
        }
        _ if matches!(op, BinOp::Eq | BinOp::Ne) => {
            let eq = const_eq(env, a, b);
            Some(bool_const(if op == BinOp::Eq { eq } else { !eq }))
        }
        _ => None,
    };
    if result.is_none() && matches!(op, BinOp::Div | BinOp::Mod) {
        let zero = match b {
            ConstVal::Int(0) => true,
            ConstVal::Float { text, .. } => env.float_of(*text) == 0.0,
            _ => false,
        };
        if zero {
            env.log
                .error(e.loc, e.span, "division by zero in constant expression".into());
        }
    }
    result
}

fn fold_const_unary<'a>(
    env: &mut FoldEnv<'a, '_>,
    op: UnOp,
    v: &ConstVal<'a>,
) -> Option<ConstVal<'a>> {
    match op {
        UnOp::Not => Some(bool_const(!truthy(env, v))),
        UnOp::Boolize => Some(bool_const(truthy(env, v))),
        UnOp::BitNot => match v {
            ConstVal::Int(i) => Some(ConstVal::Int(!i)),
            _ => None,
        },
        UnOp::Neg => match v {
            ConstVal::Int(i) => {
                let wide = -(*i as i64);
                match i32::try_from(wide) {
                    Ok(n) => Some(ConstVal::Int(n)),
                    Err(_) => Some(ConstVal::Float {
                        text: env.int_text(wide),
                        promoted: true,
                    }),
                }
            }
            ConstVal::Float { text, promoted } => {
                let negated = if let Some(i) = env.int_of_float_text(*text) {
                    (-i).to_string()
                } else {
                    format!("{}", -env.float_of(*text))
                };
                let result = ConstVal::Float {
                    text: env.interner.intern(&negated),
                    promoted: *promoted,
                };
                Some(demote_float(env, result))
            }
            _ => None,
        },
        UnOp::Pos => match v {
            ConstVal::Int(_) | ConstVal::Float { .. } => Some(*v),
            _ => None,
        },
        _ => None,
    }
}

/// Fold one expression tree bottom-up, returning the replacement node.
pub fn fold_expr<'a>(env: &mut FoldEnv<'a, '_>, e: &'a Expr<'a>) -> &'a Expr<'a> {
    match &e.kind {
        ExprKind::Const(_)
        | ExprKind::LocalRef(_)
        | ExprKind::CtxLocalRef { .. }
        | ExprKind::SelfRef
        | ExprKind::Replaced
        | ExprKind::TargetProp
        | ExprKind::TargetObj
        | ExprKind::DefiningObj
        | ExprKind::ArgCount
        | ExprKind::DStr(_)
        | ExprKind::AnonFn(_) => e,

        ExprKind::Unresolved(name) => {
            // Forward references resolve here once the whole module has
            // been seen; what stays unresolved is codegen's (or the
            // linker's) problem.
            if let Some(id) = env.syms.find(*name) {
                let val = match &env.syms.entry(id).kind {
                    SymKind::Object(_) => Some(ConstVal::ObjRef(id)),
                    SymKind::Func(_) => Some(ConstVal::FuncRef(id)),
                    SymKind::Enum(_) => Some(ConstVal::EnumRef(id)),
                    SymKind::Builtin(_) => Some(ConstVal::BifRef(id)),
                    _ => None,
                };
                if let Some(val) = val {
                    return env.ctx.konst(e, val);
                }
            }
            e
        }

        ExprKind::Unary(op, operand) => {
            let folded = fold_expr(env, operand);
            if let Some(v) = folded.as_const() {
                if let Some(result) = fold_const_unary(env, *op, v) {
                    return env.ctx.konst(e, result);
                }
            }
            if std::ptr::eq(folded, *operand) {
                e
            } else {
                env.ctx.rewrap(e, ExprKind::Unary(*op, folded))
            }
        }

        ExprKind::Binary(op, lhs, rhs) => fold_binary(env, e, *op, lhs, rhs),

        ExprKind::Assign { lhs, rhs, op } => {
            let l = fold_expr(env, lhs);
            let r = fold_expr(env, rhs);
            if std::ptr::eq(l, *lhs) && std::ptr::eq(r, *rhs) {
                e
            } else {
                env.ctx.rewrap(
                    e,
                    ExprKind::Assign {
                        lhs: l,
                        rhs: r,
                        op: *op,
                    },
                )
            }
        }

        ExprKind::Cond {
            cond,
            then_e,
            else_e,
        } => {
            let c = fold_expr(env, cond);
            let t = fold_expr(env, then_e);
            let f = fold_expr(env, else_e);
            if let Some(v) = c.as_const() {
                return if truthy(env, v) { t } else { f };
            }
            if std::ptr::eq(c, *cond) && std::ptr::eq(t, *then_e) && std::ptr::eq(f, *else_e) {
                e
            } else {
                env.ctx.rewrap(
                    e,
                    ExprKind::Cond {
                        cond: c,
                        then_e: t,
                        else_e: f,
                    },
                )
            }
        }

        ExprKind::IfNil { lhs, rhs } => {
            let l = fold_expr(env, lhs);
            let r = fold_expr(env, rhs);
            if let Some(v) = l.as_const() {
                return if matches!(v, ConstVal::Nil) { r } else { l };
            }
            if std::ptr::eq(l, *lhs) && std::ptr::eq(r, *rhs) {
                e
            } else {
                env.ctx.rewrap(e, ExprKind::IfNil { lhs: l, rhs: r })
            }
        }

        ExprKind::Call { func, args } => {
            let f = fold_expr(env, func);
            let (new_args, changed) = fold_args(env, args);
            if std::ptr::eq(f, *func) && !changed {
                e
            } else {
                env.ctx.rewrap(
                    e,
                    ExprKind::Call {
                        func: f,
                        args: new_args,
                    },
                )
            }
        }

        ExprKind::Member { obj, prop, args } => {
            let o = fold_expr(env, obj);
            let p = match prop {
                PropSpec::Name(n) => {
                    // an undeclared name on the right of `.` is assumed to
                    // be a property
                    env.syms.find_or_def(
                        *n,
                        DefPolicy::AddProp,
                        e.loc,
                        e.span,
                        env.interner,
                        env.log,
                    );
                    PropSpec::Name(*n)
                }
                PropSpec::Expr(pe) => PropSpec::Expr(fold_expr(env, pe)),
            };
            let (new_args, args_changed) = match args {
                Some(list) => {
                    let (l, c) = fold_args(env, list);
                    (Some(l), c)
                }
                None => (None, false),
            };
            let prop_changed = match (prop, &p) {
                (PropSpec::Expr(old), PropSpec::Expr(new)) => !std::ptr::eq(*old, *new),
                _ => false,
            };
            if std::ptr::eq(o, *obj) && !args_changed && !prop_changed {
                e
            } else {
                env.ctx.rewrap(
                    e,
                    ExprKind::Member {
                        obj: o,
                        prop: p,
                        args: new_args,
                    },
                )
            }
        }

        ExprKind::Subscript { arr, idx } => {
            let a = fold_expr(env, arr);
            let i = fold_expr(env, idx);
            if let (Some(ConstVal::List(items)), Some(ConstVal::Int(n))) = (a.as_const(), i.as_const())
            {
                // TADS lists are 1-based.
                if *n >= 1 && (*n as usize) <= items.len() {
                    return env.ctx.konst(e, items[(*n - 1) as usize]);
                }
                env.log
                    .error(e.loc, e.span, format!("list index {} out of range", n));
                // fall through unfolded
            }
            if std::ptr::eq(a, *arr) && std::ptr::eq(i, *idx) {
                e
            } else {
                env.ctx.rewrap(e, ExprKind::Subscript { arr: a, idx: i })
            }
        }

        ExprKind::List(items) => {
            let folded: Vec<&'a Expr<'a>> = items.iter().map(|i| fold_expr(env, i)).collect();
            if folded.iter().all(|i| i.as_const().is_some()) && !folded.is_empty() {
                let consts: Vec<ConstVal<'a>> =
                    folded.iter().map(|i| *i.as_const().unwrap()).collect();
                return env
                    .ctx
                    .konst(e, ConstVal::List(env.ctx.const_list(consts)));
            }
            if folded
                .iter()
                .zip(items.iter())
                .all(|(n, o)| std::ptr::eq(*n, *o))
            {
                if items.is_empty() {
                    return env.ctx.konst(e, ConstVal::List(env.ctx.const_list(Vec::new())));
                }
                e
            } else {
                env.ctx.rewrap(e, ExprKind::List(env.ctx.expr_list(folded)))
            }
        }

        ExprKind::Inherited { target, args } => {
            let (new_args, changed) = match args {
                Some(list) => {
                    let (l, c) = fold_args(env, list);
                    (Some(l), c)
                }
                None => (None, false),
            };
            if changed {
                env.ctx.rewrap(
                    e,
                    ExprKind::Inherited {
                        target: *target,
                        args: new_args,
                    },
                )
            } else {
                e
            }
        }

        ExprKind::Delegated { target, args } => {
            let t = fold_expr(env, target);
            let (new_args, changed) = match args {
                Some(list) => {
                    let (l, c) = fold_args(env, list);
                    (Some(l), c)
                }
                None => (None, false),
            };
            if std::ptr::eq(t, *target) && !changed {
                e
            } else {
                env.ctx.rewrap(
                    e,
                    ExprKind::Delegated {
                        target: t,
                        args: new_args,
                    },
                )
            }
        }

        ExprKind::IsIn {
            lhs,
            args,
            negated,
            known,
        } => fold_is_in(env, e, lhs, args, *negated, *known),

        ExprKind::DStrEmbed(inner) => {
            let folded = fold_expr(env, inner);
            if std::ptr::eq(folded, *inner) {
                e
            } else {
                env.ctx.rewrap(e, ExprKind::DStrEmbed(folded))
            }
        }

        ExprKind::New {
            cls,
            args,
            transient,
        } => {
            let c = fold_expr(env, cls);
            let (new_args, changed) = fold_args(env, args);
            if std::ptr::eq(c, *cls) && !changed {
                e
            } else {
                env.ctx.rewrap(
                    e,
                    ExprKind::New {
                        cls: c,
                        args: new_args,
                        transient: *transient,
                    },
                )
            }
        }

        ExprKind::Delete(inner) => {
            let folded = fold_expr(env, inner);
            if std::ptr::eq(folded, *inner) {
                e
            } else {
                env.ctx.rewrap(e, ExprKind::Delete(folded))
            }
        }
    }
}

fn fold_args<'a>(env: &mut FoldEnv<'a, '_>, args: &'a [Arg<'a>]) -> (&'a [Arg<'a>], bool) {
    let folded: Vec<Arg<'a>> = args
        .iter()
        .map(|a| Arg {
            expr: fold_expr(env, a.expr),
            spread: a.spread,
        })
        .collect();
    let changed = folded
        .iter()
        .zip(args.iter())
        .any(|(n, o)| !std::ptr::eq(n.expr, o.expr));
    if changed {
        (env.ctx.arg_list(folded), true)
    } else {
        (args, false)
    }
}

fn fold_binary<'a>(
    env: &mut FoldEnv<'a, '_>,
    e: &'a Expr<'a>,
    op: BinOp,
    lhs: &'a Expr<'a>,
    rhs: &'a Expr<'a>,
) -> &'a Expr<'a> {
    let l = fold_expr(env, lhs);
    let r = fold_expr(env, rhs);

    // Short-circuit logicals: a constant left side either decides the
    // result (yielding the left) or passes it to the right side, which is
    // booleanized.
    if matches!(op, BinOp::LogAnd | BinOp::LogOr) {
        if let Some(lv) = l.as_const() {
            let decides = match op {
                BinOp::LogAnd => !truthy(env, lv),
                _ => truthy(env, lv),
            };
            if decides {
                return l;
            }
            return match r.as_const() {
                Some(rv) => {
                    let b = truthy(env, rv);
                    env.ctx.konst(e, bool_const(b))
                }
                None => env.ctx.rewrap(e, ExprKind::Unary(UnOp::Boolize, r)),
            };
        }
    } else if let (Some(a), Some(b)) = (l.as_const(), r.as_const()) {
        let (a, b) = (*a, *b);
        if let Some(v) = fold_const_bin(env, e, op, &a, &b) {
            return env.ctx.konst(e, v);
        }
    }

    if std::ptr::eq(l, lhs) && std::ptr::eq(r, rhs) {
        e
    } else {
        env.ctx.rewrap(e, ExprKind::Binary(op, l, r))
    }
}

fn fold_is_in<'a>(
    env: &mut FoldEnv<'a, '_>,
    e: &'a Expr<'a>,
    lhs: &'a Expr<'a>,
    args: &'a [&'a Expr<'a>],
    negated: bool,
    known: Option<bool>,
) -> &'a Expr<'a> {
    let l = fold_expr(env, lhs);
    let folded: Vec<&'a Expr<'a>> = args.iter().map(|a| fold_expr(env, a)).collect();

    if let Some(lv) = l.as_const() {
        let lv = *lv;
        // Drop constant elements that cannot match; a constant element
        // that does match decides the expression.
        let mut decided = known;
        let mut kept: Vec<&'a Expr<'a>> = Vec::new();
        for a in &folded {
            match a.as_const() {
                Some(av) => {
                    if const_eq(env, &lv, av) {
                        decided = Some(!negated);
                        break;
                    }
                    // mismatching constant element: dropped
                }
                None => kept.push(a),
            }
        }
        if decided.is_none() && kept.is_empty() {
            // every element was a mismatching constant
            return env.ctx.konst(e, bool_const(negated));
        }
        if let Some(d) = decided {
            if kept.is_empty() {
                return env.ctx.konst(e, bool_const(d));
            }
        }
        return env.ctx.rewrap(
            e,
            ExprKind::IsIn {
                lhs: l,
                args: env.ctx.expr_list(kept),
                negated,
                known: decided,
            },
        );
    }

    let changed = !std::ptr::eq(l, lhs)
        || folded
            .iter()
            .zip(args.iter())
            .any(|(n, o)| !std::ptr::eq(*n, *o));
    if changed {
        env.ctx.rewrap(
            e,
            ExprKind::IsIn {
                lhs: l,
                args: env.ctx.expr_list(folded),
                negated,
                known,
            },
        )
    } else {
        e
    }
}

/// Fold every expression inside a statement tree.
pub fn fold_stmt<'a>(env: &mut FoldEnv<'a, '_>, s: &'a Stmt<'a>) -> &'a Stmt<'a> {
    let rebuilt: StmtKind<'a> = match &s.kind {
        StmtKind::Compound(stmts) => {
            let folded: Vec<&'a Stmt<'a>> = stmts.iter().map(|st| fold_stmt(env, st)).collect();
            if folded
                .iter()
                .zip(stmts.iter())
                .all(|(n, o)| std::ptr::eq(*n, *o))
            {
                return s;
            }
            StmtKind::Compound(env.ctx.stmt_list(folded))
        }
        StmtKind::Expr(e) => {
            let f = fold_expr(env, e);
            if std::ptr::eq(f, *e) {
                return s;
            }
            StmtKind::Expr(f)
        }
        StmtKind::If {
            cond,
            then_s,
            else_s,
        } => {
            let c = fold_expr(env, cond);
            let t = fold_stmt(env, then_s);
            let f = else_s.map(|es| fold_stmt(env, es));
            if std::ptr::eq(c, *cond)
                && std::ptr::eq(t, *then_s)
                && match (f, else_s) {
                    (Some(n), Some(o)) => std::ptr::eq(n, *o),
                    (None, None) => true,
                    _ => false,
                }
            {
                return s;
            }
            StmtKind::If {
                cond: c,
                then_s: t,
                else_s: f,
            }
        }
        StmtKind::Return(val) => match val {
            Some(e) => {
                let f = fold_expr(env, e);
                if std::ptr::eq(f, *e) {
                    return s;
                }
                StmtKind::Return(Some(f))
            }
            None => return s,
        },
        StmtKind::For {
            init,
            cond,
            update,
            body,
        } => {
            let new_init: Vec<ForInit<'a>> = init
                .iter()
                .map(|fi| match fi {
                    ForInit::Expr(e) => ForInit::Expr(fold_expr(env, e)),
                    ForInit::Local { sym, init } => ForInit::Local {
                        sym: *sym,
                        init: init.map(|e| fold_expr(env, e)),
                    },
                    ForInit::In { target, expr, decl } => ForInit::In {
                        target: fold_expr(env, target),
                        expr: fold_expr(env, expr),
                        decl: *decl,
                    },
                })
                .collect();
            StmtKind::For {
                init: env.ctx.for_inits.alloc_slice(new_init),
                cond: cond.map(|e| fold_expr(env, e)),
                update: update.map(|e| fold_expr(env, e)),
                body: fold_stmt(env, body),
            }
        }
        StmtKind::Foreach {
            target,
            expr,
            body,
            decl,
        } => StmtKind::Foreach {
            target: fold_expr(env, target),
            expr: fold_expr(env, expr),
            body: fold_stmt(env, body),
            decl: *decl,
        },
        StmtKind::While { cond, body } => StmtKind::While {
            cond: fold_expr(env, cond),
            body: fold_stmt(env, body),
        },
        StmtKind::DoWhile { body, cond } => StmtKind::DoWhile {
            body: fold_stmt(env, body),
            cond: fold_expr(env, cond),
        },
        StmtKind::Switch { expr, body } => StmtKind::Switch {
            expr: fold_expr(env, expr),
            body: fold_stmt(env, body),
        },
        StmtKind::Case { expr } => StmtKind::Case {
            expr: fold_expr(env, expr),
        },
        StmtKind::Label { name, sym, stmt } => {
            let inner = fold_stmt(env, stmt);
            if std::ptr::eq(inner, *stmt) {
                return s;
            }
            StmtKind::Label {
                name: *name,
                sym: *sym,
                stmt: inner,
            }
        }
        StmtKind::Try {
            body,
            catches,
            finally,
        } => {
            let new_catches: Vec<CatchClause<'a>> = catches
                .iter()
                .map(|c| CatchClause {
                    cls: c.cls,
                    var: c.var,
                    body: fold_stmt(env, c.body),
                    loc: c.loc,
                })
                .collect();
            StmtKind::Try {
                body: fold_stmt(env, body),
                catches: env.ctx.catches.alloc_slice(new_catches),
                finally: finally.map(|f| fold_stmt(env, f)),
            }
        }
        StmtKind::Throw(e) => StmtKind::Throw(fold_expr(env, e)),
        StmtKind::LocalDecl(inits) => {
            let new_inits: Vec<LocalInit<'a>> = inits
                .iter()
                .map(|li| LocalInit {
                    sym: li.sym,
                    init: li.init.map(|e| fold_expr(env, e)),
                    loc: li.loc,
                })
                .collect();
            StmtKind::LocalDecl(env.ctx.inits.alloc_slice(new_inits))
        }
        StmtKind::DefaultCase
        | StmtKind::Break(_)
        | StmtKind::Continue(_)
        | StmtKind::Goto(_)
        | StmtKind::Empty => return s,
    };
    env.ctx.stmt(rebuilt, s.loc, s.span)
}

/// Debugger support: rewrite unresolved identifier references against a
/// stack frame's local map, so an expression typed at the debug prompt can
/// see the suspended function's locals.
pub struct DebugFrame {
    pub locals: HashMap<Symbol, SymId>,
}

pub fn adjust_for_debug<'a>(
    ctx: AstContext<'a>,
    frame: &DebugFrame,
    e: &'a Expr<'a>,
) -> &'a Expr<'a> {
    match &e.kind {
        ExprKind::Unresolved(name) => match frame.locals.get(name) {
            Some(&id) => ctx.rewrap(e, ExprKind::LocalRef(id)),
            None => e,
        },
        ExprKind::Unary(op, inner) => {
            let i = adjust_for_debug(ctx, frame, inner);
            if std::ptr::eq(i, *inner) {
                e
            } else {
                ctx.rewrap(e, ExprKind::Unary(*op, i))
            }
        }
        ExprKind::Binary(op, l, r) => {
            let nl = adjust_for_debug(ctx, frame, l);
            let nr = adjust_for_debug(ctx, frame, r);
            if std::ptr::eq(nl, *l) && std::ptr::eq(nr, *r) {
                e
            } else {
                ctx.rewrap(e, ExprKind::Binary(*op, nl, nr))
            }
        }
        ExprKind::Assign { lhs, rhs, op } => {
            let nl = adjust_for_debug(ctx, frame, lhs);
            let nr = adjust_for_debug(ctx, frame, rhs);
            if std::ptr::eq(nl, *lhs) && std::ptr::eq(nr, *rhs) {
                e
            } else {
                ctx.rewrap(
                    e,
                    ExprKind::Assign {
                        lhs: nl,
                        rhs: nr,
                        op: *op,
                    },
                )
            }
        }
        ExprKind::Member { obj, prop, args } => {
            let o = adjust_for_debug(ctx, frame, obj);
            if std::ptr::eq(o, *obj) {
                e
            } else {
                ctx.rewrap(
                    e,
                    ExprKind::Member {
                        obj: o,
                        prop: *prop,
                        args: *args,
                    },
                )
            }
        }
        ExprKind::Subscript { arr, idx } => {
            let a = adjust_for_debug(ctx, frame, arr);
            let i = adjust_for_debug(ctx, frame, idx);
            if std::ptr::eq(a, *arr) && std::ptr::eq(i, *idx) {
                e
            } else {
                ctx.rewrap(e, ExprKind::Subscript { arr: a, idx: i })
            }
        }
        _ => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena_ctx::AstArenas;
    use crate::token::{SourceLoc, Span};

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

    fn int_node<'a>(ctx: AstContext<'a>, v: i32) -> &'a Expr<'a> {
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
    fn int_addition_folds() {
        let arenas = AstArenas::new();
        let ctx = arenas.ctx();
        let mut fx = Fixture::new();
        let mut env = fx.env(ctx);
        let e = bin(ctx, BinOp::Add, int_node(ctx, 30), int_node(ctx, 12));
        let folded = fold_expr(&mut env, e);
        assert!(matches!(folded.kind, ExprKind::Const(ConstVal::Int(42))));
    }

    #[test]
    fn overflow_promotes_to_float_with_flag() {
        let arenas = AstArenas::new();
        let ctx = arenas.ctx();
        let mut fx = Fixture::new();
        let mut env = fx.env(ctx);
        let e = bin(
            ctx,
            BinOp::Add,
            int_node(ctx, 2_000_000_000),
            int_node(ctx, 2_000_000_000),
        );
        let folded = fold_expr(&mut env, e);
        match folded.kind {
            ExprKind::Const(ConstVal::Float { text, promoted }) => {
                assert!(promoted);
                assert_eq!(env.interner.resolve(text), "4000000000");
            }
            other => panic!("expected promoted float, got {:?}", other),
        }
    }

    #[test]
    fn later_fold_demotes_back_to_int() {
        let arenas = AstArenas::new();
        let ctx = arenas.ctx();
        let mut fx = Fixture::new();
        let mut env = fx.env(ctx);
        let big = bin(
            ctx,
            BinOp::Add,
            int_node(ctx, 2_000_000_000),
            int_node(ctx, 2_000_000_000),
        );
        let back = bin(ctx, BinOp::Sub, big, int_node(ctx, 2_000_000_000));
        let folded = fold_expr(&mut env, back);
        assert!(
            matches!(folded.kind, ExprKind::Const(ConstVal::Int(2_000_000_000))),
            "expected demoted int, got {:?}",
            folded.kind
        );
    }

    #[test]
    fn division_by_zero_reports_and_leaves_unfolded() {
        let arenas = AstArenas::new();
        let ctx = arenas.ctx();
        let mut fx = Fixture::new();
        let mut env = fx.env(ctx);
        let e = bin(ctx, BinOp::Div, int_node(ctx, 1), int_node(ctx, 0));
        let folded = fold_expr(&mut env, e);
        assert!(matches!(folded.kind, ExprKind::Binary(BinOp::Div, _, _)));
        assert_eq!(env.log.error_count(), 1);
    }

    #[test]
    fn folding_is_idempotent() {
        let arenas = AstArenas::new();
        let ctx = arenas.ctx();
        let mut fx = Fixture::new();
        let mut env = fx.env(ctx);
        let e = bin(
            ctx,
            BinOp::Mul,
            bin(ctx, BinOp::Add, int_node(ctx, 2), int_node(ctx, 3)),
            int_node(ctx, 4),
        );
        let once = fold_expr(&mut env, e);
        let twice = fold_expr(&mut env, once);
        assert!(std::ptr::eq(once, twice));
    }

    #[test]
    fn list_plus_appends_and_minus_removes_all_occurrences() {
        let arenas = AstArenas::new();
        let ctx = arenas.ctx();
        let mut fx = Fixture::new();
        let mut env = fx.env(ctx);

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
        let appended = fold_expr(&mut env, bin(ctx, BinOp::Add, lhs, int_node(ctx, 4)));
        match appended.kind {
            ExprKind::Const(ConstVal::List(items)) => {
                assert_eq!(
                    items,
                    &[
                        ConstVal::Int(1),
                        ConstVal::Int(2),
                        ConstVal::Int(3),
                        ConstVal::Int(4)
                    ]
                );
            }
            other => panic!("expected list, got {:?}", other),
        }

        let abab = env.ctx.const_list(vec![
            ConstVal::Int(1),
            ConstVal::Int(2),
            ConstVal::Int(3),
            ConstVal::Int(2),
        ]);
        let lhs2 = ctx.expr(
            ExprKind::Const(ConstVal::List(abab)),
            SourceLoc::default(),
            Span::default(),
        );
        let removed = fold_expr(&mut env, bin(ctx, BinOp::Sub, lhs2, int_node(ctx, 2)));
        match removed.kind {
            ExprKind::Const(ConstVal::List(items)) => {
                assert_eq!(items, &[ConstVal::Int(1), ConstVal::Int(3)]);
            }
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn string_concat_converts_right_side() {
        let arenas = AstArenas::new();
        let ctx = arenas.ctx();
        let mut fx = Fixture::new();
        let score = fx.interner.intern("score: ");
        let mut env = fx.env(ctx);
        let lhs = ctx.expr(
            ExprKind::Const(ConstVal::Str(score)),
            SourceLoc::default(),
            Span::default(),
        );
        let folded = fold_expr(&mut env, bin(ctx, BinOp::Add, lhs, int_node(ctx, 10)));
        match folded.kind {
            ExprKind::Const(ConstVal::Str(s)) => {
                assert_eq!(env.interner.resolve(s), "score: 10");
            }
            other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn logical_and_short_circuits() {
        let arenas = AstArenas::new();
        let ctx = arenas.ctx();
        let mut fx = Fixture::new();
        let mut env = fx.env(ctx);

        let nil = ctx.expr(
            ExprKind::Const(ConstVal::Nil),
            SourceLoc::default(),
            Span::default(),
        );
        let side_effect = ctx.expr(
            ExprKind::SelfRef,
            SourceLoc::default(),
            Span::default(),
        );
        // nil && x -> nil (the deciding left side)
        let dead = fold_expr(&mut env, bin(ctx, BinOp::LogAnd, nil, side_effect));
        assert!(matches!(dead.kind, ExprKind::Const(ConstVal::Nil)));

        // true && x -> boolize(x)
        let t = ctx.expr(
            ExprKind::Const(ConstVal::True),
            SourceLoc::default(),
            Span::default(),
        );
        let live = fold_expr(&mut env, bin(ctx, BinOp::LogAnd, t, side_effect));
        assert!(matches!(live.kind, ExprKind::Unary(UnOp::Boolize, _)));

        // 1 && 5 -> true
        let both = fold_expr(
            &mut env,
            bin(ctx, BinOp::LogAnd, int_node(ctx, 1), int_node(ctx, 5)),
        );
        assert!(matches!(both.kind, ExprKind::Const(ConstVal::True)));
    }

    #[test]
    fn ternary_with_constant_condition_collapses() {
        let arenas = AstArenas::new();
        let ctx = arenas.ctx();
        let mut fx = Fixture::new();
        let mut env = fx.env(ctx);
        let cond = int_node(ctx, 0);
        let e = ctx.expr(
            ExprKind::Cond {
                cond,
                then_e: int_node(ctx, 1),
                else_e: int_node(ctx, 2),
            },
            SourceLoc::default(),
            Span::default(),
        );
        let folded = fold_expr(&mut env, e);
        assert!(matches!(folded.kind, ExprKind::Const(ConstVal::Int(2))));
    }

    #[test]
    fn subscript_folds_and_range_checks() {
        let arenas = AstArenas::new();
        let ctx = arenas.ctx();
        let mut fx = Fixture::new();
        let mut env = fx.env(ctx);
        let items = env
            .ctx
            .const_list(vec![ConstVal::Int(10), ConstVal::Int(20)]);
        let arr = ctx.expr(
            ExprKind::Const(ConstVal::List(items)),
            SourceLoc::default(),
            Span::default(),
        );
        let good = ctx.expr(
            ExprKind::Subscript {
                arr,
                idx: int_node(ctx, 2),
            },
            SourceLoc::default(),
            Span::default(),
        );
        let folded = fold_expr(&mut env, good);
        assert!(matches!(folded.kind, ExprKind::Const(ConstVal::Int(20))));

        let bad = ctx.expr(
            ExprKind::Subscript {
                arr,
                idx: int_node(ctx, 3),
            },
            SourceLoc::default(),
            Span::default(),
        );
        let unfolded = fold_expr(&mut env, bad);
        assert!(matches!(unfolded.kind, ExprKind::Subscript { .. }));
        assert_eq!(env.log.error_count(), 1);
    }

    #[test]
    fn is_in_drops_mismatching_constants() {
        let arenas = AstArenas::new();
        let ctx = arenas.ctx();
        let mut fx = Fixture::new();
        let mut env = fx.env(ctx);
        let lhs = int_node(ctx, 5);
        let args = ctx.expr_list(vec![int_node(ctx, 1), int_node(ctx, 2)]);
        let e = ctx.expr(
            ExprKind::IsIn {
                lhs,
                args,
                negated: false,
                known: None,
            },
            SourceLoc::default(),
            Span::default(),
        );
        let folded = fold_expr(&mut env, e);
        // no element matches: is-in folds to nil
        assert!(matches!(folded.kind, ExprKind::Const(ConstVal::Nil)));

        let args2 = ctx.expr_list(vec![int_node(ctx, 1), int_node(ctx, 5)]);
        let e2 = ctx.expr(
            ExprKind::IsIn {
                lhs,
                args: args2,
                negated: false,
                known: None,
            },
            SourceLoc::default(),
            Span::default(),
        );
        let folded2 = fold_expr(&mut env, e2);
        assert!(matches!(folded2.kind, ExprKind::Const(ConstVal::True)));
    }

    #[test]
    fn adjust_for_debug_rewrites_frame_locals() {
        let arenas = AstArenas::new();
        let ctx = arenas.ctx();
        let mut interner = Interner::new();
        let name = interner.intern("score");
        let e = ctx.expr(
            ExprKind::Unresolved(name),
            SourceLoc::default(),
            Span::default(),
        );
        let mut locals = HashMap::new();
        locals.insert(name, SymId(7));
        let frame = DebugFrame { locals };
        let adjusted = adjust_for_debug(ctx, &frame, e);
        assert!(matches!(adjusted.kind, ExprKind::LocalRef(SymId(7))));
    }
}
