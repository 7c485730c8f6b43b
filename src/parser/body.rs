//! Code bodies: functions, methods, and anonymous functions, including
//! multi-method name decoration and the end-of-body scans.

use crate::ast::expr::{Expr, ExprKind, UnOp};
use crate::ast::stmt::{ForInit, Stmt, StmtKind};
use crate::ast::{BodyId, CodeBody, TopItem};
use crate::intern::Symbol;
use crate::parser::expr::ExprParsing;
use crate::parser::stmt::StmtParsing;
use crate::parser::{BodyFrame, ParseResult, Parser, Recover};
use crate::scope::ScopeKind;
use crate::symbol::{FuncSym, SymEntry, SymId, SymKind};
use crate::token::TokKind;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FnFlags {
    pub replace: bool,
    pub modify: bool,
}

/// Parsed formal list: per-parameter type names (multi-methods) and the
/// varargs flag.
pub(crate) struct FormalsInfo {
    pub types: Vec<Option<Symbol>>,
    pub varargs: bool,
}

impl FormalsInfo {
    pub fn is_multimethod(&self) -> bool {
        self.types.iter().any(|t| t.is_some())
    }
}

/// Open a new code body: allocate it, push its function scope, label
/// scope, and body frame.
pub(crate) fn begin_body<'a>(p: &mut Parser<'a, '_>, is_method: bool) -> BodyId {
    let enclosing = p.body_stack.last().map(|f| f.id);
    let mut body = CodeBody::new(is_method, p.loc());
    body.enclosing = enclosing;
    p.module.bodies.push(body);
    let id = BodyId((p.module.bodies.len() - 1) as u32);
    p.cc.syms.push_scope(ScopeKind::Function);
    p.cc.syms.push_label_scope();
    let base_depth = p.cc.syms.scope_depth() - 1;
    p.body_stack.push(BodyFrame {
        id,
        base_depth,
        next_slot: 0,
    });
    id
}

/// Close a code body: run the local-use walker and the unreferenced
/// scans, finalize the captured-locals context, pop the scopes.
pub(crate) fn finish_body<'a>(p: &mut Parser<'a, '_>, id: BodyId, stm: Option<&'a Stmt<'a>>) {
    p.module.body_mut(id).stm = stm;
    if let Some(stm) = stm {
        mark_uses_stmt(p, stm);
    }
    let frame = p.body_stack.pop().expect("unbalanced body stack");
    debug_assert_eq!(frame.id, id);
    p.cc.syms.pop_scope();
    let labels = p.cc.syms.pop_label_scope();

    {
        let body = p.module.body_mut(id);
        body.labels = labels;
        if let Some(ctx) = &mut body.local_ctx {
            // The shared context object gets its own stack slot.
            ctx.var_slot = body.local_cnt;
            body.local_cnt += 1;
        }
    }
    let body = p.module.body(id);
    let locals = body.locals.clone();
    let labels = body.labels.clone();
    let cc = &mut *p.cc;
    cc.syms
        .unreferenced_scan(&locals, &labels, &cc.interner, &mut cc.log);
}

/// Collected formal: optional multi-method type, name, position.
pub(crate) type CollectedFormal = (
    Option<Symbol>,
    Symbol,
    crate::token::SourceLoc,
    crate::token::Span,
);

/// Parse `( [Type] name, ..., [...] )` without defining anything; used
/// where the final formal list is assembled later (propertyset argument
/// patterns) or never defined at all (extern declarations).
pub(crate) fn parse_formals_collect(
    p: &mut Parser<'_, '_>,
) -> ParseResult<(Vec<CollectedFormal>, bool)> {
    p.expect(TokKind::LParen)?;
    let mut formals: Vec<CollectedFormal> = Vec::new();
    let mut varargs = false;
    if p.eat(TokKind::RParen) {
        return Ok((formals, varargs));
    }
    loop {
        if p.eat(TokKind::Ellipsis) {
            varargs = true;
            break;
        }
        let (first, first_tok) = p.expect_ident()?;
        // Two identifiers in a row: a typed (multi-method) parameter.
        let (ty, name, tok) = if let Some(second) = p.ident() {
            let t = p.advance();
            (Some(first), second, t)
        } else {
            (None, first, first_tok)
        };
        formals.push((ty, name, tok.loc, tok.span));
        if !p.eat(TokKind::Comma) {
            break;
        }
    }
    p.expect(TokKind::RParen)?;
    Ok((formals, varargs))
}

/// Parse a formal list and define each parameter in the current scope.
pub(crate) fn parse_formals(p: &mut Parser<'_, '_>) -> ParseResult<FormalsInfo> {
    let (formals, varargs) = parse_formals_collect(p)?;
    let types = formals.iter().map(|(t, _, _, _)| *t).collect();
    for (_, name, loc, span) in &formals {
        p.define_local(*name, *loc, *span, true);
    }
    Ok(FormalsInfo { types, varargs })
}

/// Decorated multi-method name: `base*T1;T2;...;` with `...;` appended
/// for a varargs variant and an empty type name for untyped slots.
pub(crate) fn decorate_mm_name(
    p: &mut Parser<'_, '_>,
    base: Symbol,
    info: &FormalsInfo,
) -> Symbol {
    let mut name = p.cc.interner.resolve(base).to_string();
    name.push('*');
    for ty in &info.types {
        if let Some(t) = ty {
            name.push_str(p.cc.interner.resolve(*t));
        }
        name.push(';');
    }
    if info.varargs {
        name.push_str("...;");
    }
    p.cc.interner.intern(&name)
}

/// Top-level `name(params) { body }` function definition.
pub(crate) fn parse_function_def(p: &mut Parser<'_, '_>, flags: FnFlags) -> ParseResult<()> {
    let (base_name, name_tok) = p.expect_ident()?;
    let body_id = begin_body(p, false);
    let result = parse_function_def_inner(p, base_name, name_tok.loc, name_tok.span, flags, body_id);
    if result.is_err() {
        // keep the body stack balanced on the recovery path
        finish_body(p, body_id, None);
    }
    result
}

fn parse_function_def_inner<'a>(
    p: &mut Parser<'a, '_>,
    base_name: Symbol,
    loc: crate::token::SourceLoc,
    span: crate::token::Span,
    flags: FnFlags,
    body_id: BodyId,
) -> ParseResult<()> {
    let info = parse_formals(p)?;
    p.module.body_mut(body_id).varargs = info.varargs;
    let argc = info.types.len() as u16;
    let is_mm = info.is_multimethod();
    let name = if is_mm {
        decorate_mm_name(p, base_name, &info)
    } else {
        base_name
    };

    let mut func = FuncSym {
        argc,
        varargs: info.varargs,
        has_retval: true,
        is_multimethod: is_mm,
        defined: true,
        ..FuncSym::default()
    };

    // A weak property auto-definition gives way to the real function.
    p.cc.syms.find_delete_weak(name);
    let sym = match p.cc.syms.define_global(name, loc, SymKind::Func(func.clone())) {
        Ok(id) => id,
        Err(existing) => {
            let old_kind = p.cc.syms.entry(existing).kind.clone();
            let old_loc = p.cc.syms.entry(existing).loc;
            match &old_kind {
                SymKind::Func(old) if old.is_extern || flags.replace || flags.modify => {
                    if flags.modify {
                        // keep the old body reachable through the
                        // modify-base chain
                        let placeholder_name = p.cc.anon_name("mod_base");
                        let placeholder =
                            SymEntry::new(placeholder_name, old_loc, old_kind.clone());
                        let base_id = p.cc.syms.add_detached(placeholder);
                        func.mod_base = Some(base_id);
                    }
                    func.ext_replace = flags.replace && old.is_extern;
                    p.cc.syms.entry_mut(existing).kind = SymKind::Func(func);
                    p.cc.syms.entry_mut(existing).loc = loc;
                    existing
                }
                SymKind::Func(old) if !old.defined => {
                    p.cc.syms.entry_mut(existing).kind = SymKind::Func(func);
                    existing
                }
                _ => {
                    let text = p.cc.interner.resolve(name).to_string();
                    p.cc.log.error(
                        loc,
                        span,
                        format!(
                            "\"{}\" is already defined as a {}",
                            text,
                            old_kind.kind_name()
                        ),
                    );
                    return Err(Recover);
                }
            }
        }
    };

    if is_mm {
        ensure_mm_base(p, base_name, loc);
    }

    p.expect(TokKind::LBrace)?;
    let stm = p.parse_stmt_list_to_rbrace()?;
    finish_body(p, body_id, Some(stm));
    p.module.items.push(TopItem::Func {
        sym,
        body: body_id,
        loc,
    });
    Ok(())
}

/// The undecorated base symbol of a multi-method is a shared placeholder,
/// exported from every module that contributes a variant.
pub(crate) fn ensure_mm_base(p: &mut Parser<'_, '_>, base: Symbol, loc: crate::token::SourceLoc) {
    match p.cc.syms.find_noref(base) {
        Some(id) => {
            if let Some(f) = p.cc.syms.entry_mut(id).as_func_mut() {
                f.is_mm_base = true;
            }
        }
        None => {
            let func = FuncSym {
                is_mm_base: true,
                has_retval: true,
                ..FuncSym::default()
            };
            let _ = p.cc.syms.define_global(base, loc, SymKind::Func(func));
        }
    }
    if let Some(id) = p.cc.syms.find_noref(base) {
        p.cc.syms.entry_mut(id).referenced = true;
    }
}

/// `function(params) { body }` in expression position; also used for
/// `new function ...`. The `function` keyword is current.
pub(crate) fn parse_anon_fn(p: &mut Parser<'_, '_>) -> ParseResult<BodyId> {
    p.expect(TokKind::Function)?;
    let id = begin_body(p, false);
    let result = (|| -> ParseResult<()> {
        if p.check(TokKind::LParen) {
            let info = parse_formals(p)?;
            p.module.body_mut(id).varargs = info.varargs;
        }
        p.expect(TokKind::LBrace)?;
        let stm = p.parse_stmt_list_to_rbrace()?;
        finish_body(p, id, Some(stm));
        Ok(())
    })();
    if result.is_err() {
        finish_body(p, id, None);
        return Err(Recover);
    }
    Ok(id)
}

/// Short-form anonymous function `{ a, b: expr }`; the brace is current.
pub(crate) fn parse_short_anon_fn<'a>(p: &mut Parser<'a, '_>) -> ParseResult<BodyId> {
    let open = p.expect(TokKind::LBrace)?;
    let id = begin_body(p, false);
    let result = (|| -> ParseResult<()> {
        if !p.eat(TokKind::Colon) {
            loop {
                let (name, tok) = p.expect_ident()?;
                p.define_local(name, tok.loc, tok.span, true);
                if !p.eat(TokKind::Comma) {
                    break;
                }
            }
            p.expect(TokKind::Colon)?;
        }
        let value = p.parse_comma_expr()?;
        p.expect(TokKind::RBrace)?;
        let ret = p
            .ctx
            .stmt(StmtKind::Return(Some(value)), open.loc, open.span);
        finish_body(p, id, Some(ret));
        Ok(())
    })();
    if result.is_err() {
        finish_body(p, id, None);
        return Err(Recover);
    }
    Ok(id)
}

// ---- local-use marking ----
//
// The parser resolves local references while scopes are still open, but
// whether a reference is a read, a write, or both depends on context the
// expression parser does not have. This walk runs once per finished body.

fn mark_local(p: &mut Parser<'_, '_>, id: SymId, read: bool, written: bool) {
    let entry = p.cc.syms.entry_mut(id);
    entry.referenced = true;
    if let Some(local) = entry.as_local_mut() {
        if read {
            local.val_used = true;
        }
        if written {
            local.val_assigned = true;
        }
    }
}

fn mark_uses_expr(p: &mut Parser<'_, '_>, e: &Expr<'_>, lvalue: bool) {
    match &e.kind {
        ExprKind::LocalRef(id) | ExprKind::CtxLocalRef { sym: id, .. } => {
            mark_local(p, *id, !lvalue, lvalue);
        }
        ExprKind::Unary(op, inner) => {
            let rmw = matches!(
                op,
                UnOp::PreInc | UnOp::PreDec | UnOp::PostInc | UnOp::PostDec
            );
            if rmw {
                mark_uses_expr(p, inner, true);
                mark_uses_expr(p, inner, false);
            } else {
                mark_uses_expr(p, inner, false);
            }
        }
        ExprKind::Binary(_, l, r) => {
            mark_uses_expr(p, l, false);
            mark_uses_expr(p, r, false);
        }
        ExprKind::Assign { lhs, rhs, op } => {
            mark_uses_expr(p, lhs, true);
            if op.is_some() {
                // compound assignment reads the target too
                mark_uses_expr(p, lhs, false);
            }
            mark_uses_expr(p, rhs, false);
        }
        ExprKind::Cond {
            cond,
            then_e,
            else_e,
        } => {
            mark_uses_expr(p, cond, false);
            mark_uses_expr(p, then_e, false);
            mark_uses_expr(p, else_e, false);
        }
        ExprKind::IfNil { lhs, rhs } => {
            mark_uses_expr(p, lhs, false);
            mark_uses_expr(p, rhs, false);
        }
        ExprKind::Call { func, args } => {
            mark_uses_expr(p, func, false);
            for a in args.iter() {
                mark_uses_expr(p, a.expr, false);
            }
        }
        ExprKind::Member { obj, prop, args } => {
            mark_uses_expr(p, obj, false);
            if let crate::ast::PropSpec::Expr(pe) = prop {
                mark_uses_expr(p, pe, false);
            }
            if let Some(args) = args {
                for a in args.iter() {
                    mark_uses_expr(p, a.expr, false);
                }
            }
        }
        ExprKind::Subscript { arr, idx } => {
            mark_uses_expr(p, arr, false);
            mark_uses_expr(p, idx, false);
        }
        ExprKind::List(items) => {
            for i in items.iter() {
                mark_uses_expr(p, i, false);
            }
        }
        ExprKind::Inherited { args, .. } => {
            if let Some(args) = args {
                for a in args.iter() {
                    mark_uses_expr(p, a.expr, false);
                }
            }
        }
        ExprKind::Delegated { target, args } => {
            mark_uses_expr(p, target, false);
            if let Some(args) = args {
                for a in args.iter() {
                    mark_uses_expr(p, a.expr, false);
                }
            }
        }
        ExprKind::IsIn { lhs, args, .. } => {
            mark_uses_expr(p, lhs, false);
            for a in args.iter() {
                mark_uses_expr(p, a, false);
            }
        }
        ExprKind::DStrEmbed(inner) => mark_uses_expr(p, inner, false),
        ExprKind::New { cls, args, .. } => {
            mark_uses_expr(p, cls, false);
            for a in args.iter() {
                mark_uses_expr(p, a.expr, false);
            }
        }
        ExprKind::Delete(inner) => mark_uses_expr(p, inner, false),
        ExprKind::Const(_)
        | ExprKind::Unresolved(_)
        | ExprKind::SelfRef
        | ExprKind::Replaced
        | ExprKind::TargetProp
        | ExprKind::TargetObj
        | ExprKind::DefiningObj
        | ExprKind::ArgCount
        | ExprKind::DStr(_)
        | ExprKind::AnonFn(_) => {}
    }
}

fn mark_uses_stmt(p: &mut Parser<'_, '_>, s: &Stmt<'_>) {
    match &s.kind {
        StmtKind::Compound(stmts) => {
            for st in stmts.iter() {
                mark_uses_stmt(p, st);
            }
        }
        StmtKind::Expr(e) => mark_uses_expr(p, e, false),
        StmtKind::If {
            cond,
            then_s,
            else_s,
        } => {
            mark_uses_expr(p, cond, false);
            mark_uses_stmt(p, then_s);
            if let Some(es) = else_s {
                mark_uses_stmt(p, es);
            }
        }
        StmtKind::Return(Some(e)) => mark_uses_expr(p, e, false),
        StmtKind::Return(None) => {}
        StmtKind::For {
            init,
            cond,
            update,
            body,
        } => {
            for fi in init.iter() {
                match fi {
                    ForInit::Expr(e) => mark_uses_expr(p, e, false),
                    ForInit::Local { init: Some(e), .. } => mark_uses_expr(p, e, false),
                    ForInit::Local { init: None, .. } => {}
                    ForInit::In { target, expr, decl } => {
                        if decl.is_none() {
                            mark_uses_expr(p, target, true);
                        }
                        mark_uses_expr(p, expr, false);
                    }
                }
            }
            if let Some(c) = cond {
                mark_uses_expr(p, c, false);
            }
            if let Some(u) = update {
                mark_uses_expr(p, u, false);
            }
            mark_uses_stmt(p, body);
        }
        StmtKind::Foreach {
            target,
            expr,
            body,
            decl,
        } => {
            if decl.is_none() {
                mark_uses_expr(p, target, true);
            }
            mark_uses_expr(p, expr, false);
            mark_uses_stmt(p, body);
        }
        StmtKind::While { cond, body } => {
            mark_uses_expr(p, cond, false);
            mark_uses_stmt(p, body);
        }
        StmtKind::DoWhile { body, cond } => {
            mark_uses_stmt(p, body);
            mark_uses_expr(p, cond, false);
        }
        StmtKind::Switch { expr, body } => {
            mark_uses_expr(p, expr, false);
            mark_uses_stmt(p, body);
        }
        StmtKind::Case { expr } => mark_uses_expr(p, expr, false),
        StmtKind::Label { stmt, .. } => mark_uses_stmt(p, stmt),
        StmtKind::Try {
            body,
            catches,
            finally,
        } => {
            mark_uses_stmt(p, body);
            for c in catches.iter() {
                mark_uses_stmt(p, c.body);
            }
            if let Some(f) = finally {
                mark_uses_stmt(p, f);
            }
        }
        StmtKind::Throw(e) => mark_uses_expr(p, e, false),
        StmtKind::LocalDecl(inits) => {
            for li in inits.iter() {
                if let Some(e) = li.init {
                    mark_uses_expr(p, e, false);
                }
            }
        }
        StmtKind::DefaultCase
        | StmtKind::Break(_)
        | StmtKind::Continue(_)
        | StmtKind::Goto(_)
        | StmtKind::Empty => {}
    }
}
