//! Expression parsing: the precedence ladder, primaries, and
//! double-quoted-string embedding chains.

use crate::ast::expr::{Arg, BinOp, ConstVal, Expr, ExprKind, InheritedTarget, PropSpec, UnOp};
use crate::intern::Symbol;
use crate::parser::{ParseResult, Parser, Recover};
use crate::scope::DefPolicy;
use crate::symbol::SymKind;
use crate::token::{SourceLoc, Span, TokKind};

/// Control words recognized at the start of a string embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmbedCtl {
    If,
    Unless,
    Else,
    End,
}

pub(crate) trait ExprParsing<'a> {
    /// Assignment-level expression: the usual entry point.
    fn parse_expr(&mut self) -> ParseResult<&'a Expr<'a>>;
    /// Full expression including the comma operator.
    fn parse_comma_expr(&mut self) -> ParseResult<&'a Expr<'a>>;
    fn parse_arg_list(&mut self) -> ParseResult<&'a [Arg<'a>]>;
}

impl<'a, 'e> ExprParsing<'a> for Parser<'a, 'e> {
    fn parse_expr(&mut self) -> ParseResult<&'a Expr<'a>> {
        self.parse_assign()
    }

    fn parse_comma_expr(&mut self) -> ParseResult<&'a Expr<'a>> {
        let mut lhs = self.parse_assign()?;
        while self.check(TokKind::Comma) {
            let loc = self.loc();
            let span = self.span();
            self.advance();
            let rhs = self.parse_assign()?;
            lhs = self.ctx.expr(ExprKind::Binary(BinOp::Comma, lhs, rhs), loc, span);
        }
        Ok(lhs)
    }

    fn parse_arg_list(&mut self) -> ParseResult<&'a [Arg<'a>]> {
        let mut args: Vec<Arg<'a>> = Vec::new();
        if !self.check(TokKind::RParen) {
            loop {
                let expr = self.parse_expr()?;
                let spread = self.eat(TokKind::Ellipsis);
                args.push(Arg { expr, spread });
                if !self.eat(TokKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokKind::RParen)?;
        Ok(self.ctx.arg_list(args))
    }
}

impl<'a, 'e> Parser<'a, 'e> {
    fn node(&self, kind: ExprKind<'a>, loc: SourceLoc, span: Span) -> &'a Expr<'a> {
        self.ctx.expr(kind, loc, span)
    }

    fn parse_assign(&mut self) -> ParseResult<&'a Expr<'a>> {
        let lhs = self.parse_cond()?;
        let op = match self.kind() {
            TokKind::Assign => None,
            TokKind::PlusAssign => Some(BinOp::Add),
            TokKind::MinusAssign => Some(BinOp::Sub),
            TokKind::StarAssign => Some(BinOp::Mul),
            TokKind::SlashAssign => Some(BinOp::Div),
            TokKind::PercentAssign => Some(BinOp::Mod),
            TokKind::AndAssign => Some(BinOp::BitAnd),
            TokKind::OrAssign => Some(BinOp::BitOr),
            TokKind::XorAssign => Some(BinOp::BitXor),
            TokKind::ShlAssign => Some(BinOp::Shl),
            TokKind::AshrAssign => Some(BinOp::Ashr),
            TokKind::LshrAssign => Some(BinOp::Lshr),
            _ => return Ok(lhs),
        };
        let loc = self.loc();
        let span = self.span();
        self.advance();
        if !lhs.check_lvalue() {
            self.cc
                .log
                .error(loc, span, "invalid assignment target".into());
        }
        // right-associative
        let rhs = self.parse_assign()?;
        Ok(self.node(ExprKind::Assign { lhs, rhs, op }, loc, span))
    }

    fn parse_cond(&mut self) -> ParseResult<&'a Expr<'a>> {
        let cond = self.parse_ifnil()?;
        if !self.check(TokKind::Question) {
            return Ok(cond);
        }
        let loc = self.loc();
        let span = self.span();
        self.advance();
        let then_e = self.parse_assign()?;
        self.expect(TokKind::Colon)?;
        let else_e = self.parse_assign()?;
        Ok(self.node(
            ExprKind::Cond {
                cond,
                then_e,
                else_e,
            },
            loc,
            span,
        ))
    }

    fn parse_ifnil(&mut self) -> ParseResult<&'a Expr<'a>> {
        let mut lhs = self.parse_or()?;
        while self.check(TokKind::QQ) {
            let loc = self.loc();
            let span = self.span();
            self.advance();
            let rhs = self.parse_or()?;
            lhs = self.node(ExprKind::IfNil { lhs, rhs }, loc, span);
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> ParseResult<&'a Expr<'a>> {
        let mut lhs = self.parse_and()?;
        while self.check(TokKind::OrOr) {
            let loc = self.loc();
            let span = self.span();
            self.advance();
            let rhs = self.parse_and()?;
            lhs = self.node(ExprKind::Binary(BinOp::LogOr, lhs, rhs), loc, span);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ParseResult<&'a Expr<'a>> {
        let mut lhs = self.parse_bitor()?;
        while self.check(TokKind::AndAnd) {
            let loc = self.loc();
            let span = self.span();
            self.advance();
            let rhs = self.parse_bitor()?;
            lhs = self.node(ExprKind::Binary(BinOp::LogAnd, lhs, rhs), loc, span);
        }
        Ok(lhs)
    }

    fn parse_bitor(&mut self) -> ParseResult<&'a Expr<'a>> {
        let mut lhs = self.parse_bitxor()?;
        while self.check(TokKind::Or) {
            let loc = self.loc();
            let span = self.span();
            self.advance();
            let rhs = self.parse_bitxor()?;
            lhs = self.node(ExprKind::Binary(BinOp::BitOr, lhs, rhs), loc, span);
        }
        Ok(lhs)
    }

    fn parse_bitxor(&mut self) -> ParseResult<&'a Expr<'a>> {
        let mut lhs = self.parse_bitand()?;
        while self.check(TokKind::Xor) {
            let loc = self.loc();
            let span = self.span();
            self.advance();
            let rhs = self.parse_bitand()?;
            lhs = self.node(ExprKind::Binary(BinOp::BitXor, lhs, rhs), loc, span);
        }
        Ok(lhs)
    }

    fn parse_bitand(&mut self) -> ParseResult<&'a Expr<'a>> {
        let mut lhs = self.parse_equality()?;
        while self.check(TokKind::And) {
            let loc = self.loc();
            let span = self.span();
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = self.node(ExprKind::Binary(BinOp::BitAnd, lhs, rhs), loc, span);
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> ParseResult<&'a Expr<'a>> {
        let mut lhs = self.parse_relational()?;
        loop {
            match self.kind() {
                TokKind::EqEq | TokKind::NotEq => {
                    let op = if self.check(TokKind::EqEq) {
                        BinOp::Eq
                    } else {
                        BinOp::Ne
                    };
                    let loc = self.loc();
                    let span = self.span();
                    self.advance();
                    let rhs = self.parse_relational()?;
                    lhs = self.node(ExprKind::Binary(op, lhs, rhs), loc, span);
                }
                // `is in ( ... )` and `not in ( ... )` sit at this level
                TokKind::Is if self.kind_at(1) == TokKind::In => {
                    lhs = self.parse_is_in(lhs, false)?;
                }
                TokKind::Not if self.kind_at(1) == TokKind::In => {
                    lhs = self.parse_is_in(lhs, true)?;
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn parse_is_in(&mut self, lhs: &'a Expr<'a>, negated: bool) -> ParseResult<&'a Expr<'a>> {
        let loc = self.loc();
        let span = self.span();
        self.advance(); // is / not
        self.advance(); // in
        self.expect(TokKind::LParen)?;
        let mut args: Vec<&'a Expr<'a>> = Vec::new();
        if !self.check(TokKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(TokKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokKind::RParen)?;
        Ok(self.node(
            ExprKind::IsIn {
                lhs,
                args: self.ctx.expr_list(args),
                negated,
                known: None,
            },
            loc,
            span,
        ))
    }

    fn parse_relational(&mut self) -> ParseResult<&'a Expr<'a>> {
        let mut lhs = self.parse_shift()?;
        loop {
            let op = match self.kind() {
                TokKind::Lt => BinOp::Lt,
                TokKind::LtEq => BinOp::Le,
                TokKind::Gt => BinOp::Gt,
                TokKind::GtEq => BinOp::Ge,
                _ => return Ok(lhs),
            };
            let loc = self.loc();
            let span = self.span();
            self.advance();
            let rhs = self.parse_shift()?;
            lhs = self.node(ExprKind::Binary(op, lhs, rhs), loc, span);
        }
    }

    fn parse_shift(&mut self) -> ParseResult<&'a Expr<'a>> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.kind() {
                TokKind::Shl => BinOp::Shl,
                TokKind::Ashr => BinOp::Ashr,
                TokKind::Lshr => BinOp::Lshr,
                _ => return Ok(lhs),
            };
            let loc = self.loc();
            let span = self.span();
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = self.node(ExprKind::Binary(op, lhs, rhs), loc, span);
        }
    }

    fn parse_additive(&mut self) -> ParseResult<&'a Expr<'a>> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.kind() {
                TokKind::Plus => BinOp::Add,
                TokKind::Minus => BinOp::Sub,
                _ => return Ok(lhs),
            };
            let loc = self.loc();
            let span = self.span();
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = self.node(ExprKind::Binary(op, lhs, rhs), loc, span);
        }
    }

    fn parse_multiplicative(&mut self) -> ParseResult<&'a Expr<'a>> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.kind() {
                TokKind::Star => BinOp::Mul,
                TokKind::Slash => BinOp::Div,
                TokKind::Percent => BinOp::Mod,
                _ => return Ok(lhs),
            };
            let loc = self.loc();
            let span = self.span();
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = self.node(ExprKind::Binary(op, lhs, rhs), loc, span);
        }
    }

    fn parse_unary(&mut self) -> ParseResult<&'a Expr<'a>> {
        let loc = self.loc();
        let span = self.span();
        let op = match self.kind() {
            TokKind::Bang | TokKind::Not => Some(UnOp::Not),
            TokKind::Tilde => Some(UnOp::BitNot),
            TokKind::Plus => Some(UnOp::Pos),
            TokKind::Minus => Some(UnOp::Neg),
            TokKind::Inc => Some(UnOp::PreInc),
            TokKind::Dec => Some(UnOp::PreDec),
            TokKind::And => {
                self.advance();
                return self.parse_addr_of(loc, span);
            }
            TokKind::New => {
                self.advance();
                return self.parse_new(loc, span);
            }
            TokKind::Delete => {
                self.advance();
                let operand = self.parse_unary()?;
                return Ok(self.node(ExprKind::Delete(operand), loc, span));
            }
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let operand = self.parse_unary()?;
                if matches!(op, UnOp::PreInc | UnOp::PreDec) && !operand.check_lvalue() {
                    self.cc
                        .log
                        .error(loc, span, "operand of ++/-- is not assignable".into());
                }
                Ok(self.node(ExprKind::Unary(op, operand), loc, span))
            }
            None => self.parse_postfix(),
        }
    }

    /// `&name`: a property (or function) address constant.
    fn parse_addr_of(&mut self, loc: SourceLoc, span: Span) -> ParseResult<&'a Expr<'a>> {
        let operand = self.parse_unary()?;
        if let ExprKind::Unresolved(name) = operand.kind {
            let id = {
                let cc = &mut *self.cc;
                cc.syms.find_or_def(
                    name,
                    DefPolicy::AddPropNoWarn,
                    loc,
                    span,
                    &cc.interner,
                    &mut cc.log,
                )
            };
            let val = match &self.cc.syms.entry(id).kind {
                SymKind::Property(_) => Some(ConstVal::PropRef(id)),
                SymKind::Func(_) => Some(ConstVal::FuncRef(id)),
                SymKind::Builtin(_) => Some(ConstVal::BifRef(id)),
                _ => None,
            };
            if let Some(val) = val {
                return Ok(self.node(ExprKind::Const(val), loc, span));
            }
        }
        Ok(self.node(ExprKind::Unary(UnOp::AddrOf, operand), loc, span))
    }

    fn parse_new(&mut self, loc: SourceLoc, span: Span) -> ParseResult<&'a Expr<'a>> {
        let transient = self.eat(TokKind::Transient);
        if self.check(TokKind::Function) {
            // `new function (params) { ... }`
            let body = crate::parser::body::parse_anon_fn(self)?;
            return Ok(self.node(ExprKind::AnonFn(body), loc, span));
        }
        let operand = self.parse_postfix()?;
        let (cls, args) = match operand.kind {
            ExprKind::Call { func, args } => (func, args),
            _ => (operand, self.ctx.arg_list(Vec::new())),
        };
        Ok(self.node(
            ExprKind::New {
                cls,
                args,
                transient,
            },
            loc,
            span,
        ))
    }

    fn parse_postfix(&mut self) -> ParseResult<&'a Expr<'a>> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.kind() {
                TokKind::LParen => {
                    let loc = self.loc();
                    let span = self.span();
                    self.advance();
                    let args = self.parse_arg_list()?;
                    expr = match expr.kind {
                        ExprKind::Member {
                            obj,
                            prop,
                            args: None,
                        } => self.node(
                            ExprKind::Member {
                                obj,
                                prop,
                                args: Some(args),
                            },
                            loc,
                            span,
                        ),
                        ExprKind::Inherited { target, args: None } => self.node(
                            ExprKind::Inherited {
                                target,
                                args: Some(args),
                            },
                            loc,
                            span,
                        ),
                        ExprKind::Delegated { target, args: None } => self.node(
                            ExprKind::Delegated {
                                target,
                                args: Some(args),
                            },
                            loc,
                            span,
                        ),
                        _ => self.node(ExprKind::Call { func: expr, args }, loc, span),
                    };
                }
                TokKind::LBracket => {
                    let loc = self.loc();
                    let span = self.span();
                    self.advance();
                    let idx = self.parse_expr()?;
                    self.expect(TokKind::RBracket)?;
                    expr = self.node(ExprKind::Subscript { arr: expr, idx }, loc, span);
                }
                TokKind::Dot => {
                    let loc = self.loc();
                    let span = self.span();
                    self.advance();
                    let prop = self.parse_prop_spec()?;
                    expr = self.node(
                        ExprKind::Member {
                            obj: expr,
                            prop,
                            args: None,
                        },
                        loc,
                        span,
                    );
                }
                TokKind::Inc => {
                    let loc = self.loc();
                    let span = self.span();
                    self.advance();
                    expr = self.node(ExprKind::Unary(UnOp::PostInc, expr), loc, span);
                }
                TokKind::Dec => {
                    let loc = self.loc();
                    let span = self.span();
                    self.advance();
                    expr = self.node(ExprKind::Unary(UnOp::PostDec, expr), loc, span);
                }
                _ => return Ok(expr),
            }
        }
    }

    /// After `.`: a property name, or a parenthesized property-valued
    /// expression.
    fn parse_prop_spec(&mut self) -> ParseResult<PropSpec<'a>> {
        if let Some(sym) = self.ident() {
            self.advance();
            return Ok(PropSpec::Name(sym));
        }
        if self.eat(TokKind::LParen) {
            let e = self.parse_comma_expr()?;
            self.expect(TokKind::RParen)?;
            return Ok(PropSpec::Expr(e));
        }
        if self.check(TokKind::TargetProp) {
            // `x.targetprop` invokes the current target property.
            let loc = self.loc();
            let span = self.span();
            self.advance();
            self.mark_method_ctx(true);
            return Ok(PropSpec::Expr(self.node(ExprKind::TargetProp, loc, span)));
        }
        let found = self.kind().describe(&self.cc.interner);
        self.error_here(format!("expected property name, found \"{}\"", found));
        Err(Recover)
    }

    pub(crate) fn parse_primary(&mut self) -> ParseResult<&'a Expr<'a>> {
        let loc = self.loc();
        let span = self.span();
        match self.kind() {
            TokKind::Int(v) => {
                self.advance();
                Ok(self.node(ExprKind::Const(ConstVal::Int(v)), loc, span))
            }
            TokKind::Float(text) => {
                self.advance();
                // A float literal that is really an out-of-range integer
                // carries the promoted flag so folding can demote it.
                let promoted = !self
                    .cc
                    .interner
                    .resolve(text)
                    .contains(['.', 'e', 'E']);
                Ok(self.node(
                    ExprKind::Const(ConstVal::Float { text, promoted }),
                    loc,
                    span,
                ))
            }
            TokKind::SStr(s) => {
                self.advance();
                Ok(self.node(ExprKind::Const(ConstVal::Str(s)), loc, span))
            }
            TokKind::DStr(s) => {
                self.advance();
                Ok(self.node(ExprKind::DStr(s), loc, span))
            }
            TokKind::DStrStart(s) => {
                self.advance();
                self.parse_dstr_chain(s, loc, span)
            }
            TokKind::Nil => {
                self.advance();
                Ok(self.node(ExprKind::Const(ConstVal::Nil), loc, span))
            }
            TokKind::True => {
                self.advance();
                Ok(self.node(ExprKind::Const(ConstVal::True), loc, span))
            }
            TokKind::SelfKw => {
                self.advance();
                self.mark_method_ctx(false);
                Ok(self.node(ExprKind::SelfRef, loc, span))
            }
            TokKind::Replaced => {
                self.advance();
                Ok(self.node(ExprKind::Replaced, loc, span))
            }
            TokKind::TargetProp => {
                self.advance();
                self.mark_method_ctx(true);
                Ok(self.node(ExprKind::TargetProp, loc, span))
            }
            TokKind::TargetObj => {
                self.advance();
                self.mark_method_ctx(true);
                Ok(self.node(ExprKind::TargetObj, loc, span))
            }
            TokKind::DefiningObj => {
                self.advance();
                self.mark_method_ctx(true);
                Ok(self.node(ExprKind::DefiningObj, loc, span))
            }
            TokKind::ArgCount => {
                self.advance();
                Ok(self.node(ExprKind::ArgCount, loc, span))
            }
            TokKind::Inherited => {
                self.advance();
                self.parse_inherited(loc, span)
            }
            TokKind::Delegated => {
                self.advance();
                let operand = self.parse_postfix()?;
                let e = match operand.kind {
                    ExprKind::Call { func, args } => self.node(
                        ExprKind::Delegated {
                            target: func,
                            args: Some(args),
                        },
                        loc,
                        span,
                    ),
                    _ => self.node(
                        ExprKind::Delegated {
                            target: operand,
                            args: None,
                        },
                        loc,
                        span,
                    ),
                };
                Ok(e)
            }
            TokKind::Function => {
                let body = crate::parser::body::parse_anon_fn(self)?;
                Ok(self.node(ExprKind::AnonFn(body), loc, span))
            }
            TokKind::LBrace => {
                let body = crate::parser::body::parse_short_anon_fn(self)?;
                Ok(self.node(ExprKind::AnonFn(body), loc, span))
            }
            TokKind::LParen => {
                self.advance();
                let e = self.parse_comma_expr()?;
                self.expect(TokKind::RParen)?;
                Ok(e)
            }
            TokKind::LBracket => {
                self.advance();
                let mut items: Vec<&'a Expr<'a>> = Vec::new();
                if !self.check(TokKind::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        if !self.eat(TokKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokKind::RBracket)?;
                Ok(self.node(ExprKind::List(self.ctx.expr_list(items)), loc, span))
            }
            TokKind::Ident(name) => {
                self.advance();
                Ok(self.resolve_ident(name, loc, span))
            }
            _ => {
                let found = self.kind().describe(&self.cc.interner);
                self.error_here(format!("expected expression, found \"{}\"", found));
                Err(Recover)
            }
        }
    }

    /// `inherited`, `inherited SuperClass`, or `inherited<T1, T2, ...>`.
    /// The `<` is ambiguous with a comparison, so the type list is a
    /// speculative parse: on failure the checkpoint rewinds and the `<`
    /// is left for the relational level.
    fn parse_inherited(&mut self, loc: SourceLoc, span: Span) -> ParseResult<&'a Expr<'a>> {
        if self.check(TokKind::Lt) {
            let checkpoint = self.checkpoint();
            if let Some(types) = self.try_parse_type_list() {
                let target = InheritedTarget::TypeList(self.ctx.sym_list(types));
                return Ok(self.node(ExprKind::Inherited { target, args: None }, loc, span));
            }
            self.restore(checkpoint);
        }
        if let Some(sc) = self.ident() {
            // `inherited SuperClass(...)` or `inherited SuperClass.prop`
            self.advance();
            let target = InheritedTarget::Superclass(sc);
            return Ok(self.node(ExprKind::Inherited { target, args: None }, loc, span));
        }
        Ok(self.node(
            ExprKind::Inherited {
                target: InheritedTarget::Default,
                args: None,
            },
            loc,
            span,
        ))
    }

    /// `<T1, T2, ..., [...]>` after `inherited`; consumes nothing useful
    /// and returns `None` when the tokens are not a type list.
    fn try_parse_type_list(&mut self) -> Option<Vec<Symbol>> {
        if !self.eat(TokKind::Lt) {
            return None;
        }
        let mut types: Vec<Symbol> = Vec::new();
        if !self.check(TokKind::Gt) {
            loop {
                if self.eat(TokKind::Ellipsis) {
                    // `...` stands for an untyped trailing slot
                    types.push(Symbol::EMPTY);
                } else if let Some(t) = self.ident() {
                    self.advance();
                    types.push(t);
                } else {
                    return None;
                }
                if !self.eat(TokKind::Comma) {
                    break;
                }
            }
        }
        if !self.eat(TokKind::Gt) {
            return None;
        }
        Some(types)
    }

    /// Resolve an identifier in expression position. Locals resolve now
    /// (including closure capture); everything else is deferred.
    pub(crate) fn resolve_ident(
        &mut self,
        name: Symbol,
        loc: SourceLoc,
        span: Span,
    ) -> &'a Expr<'a> {
        if let Some((id, frame)) = self.cc.syms.find_local_frame(name) {
            if !matches!(self.cc.syms.entry(id).kind, SymKind::Local(_)) {
                return self.node(ExprKind::Unresolved(name), loc, span);
            }
            self.cc.syms.entry_mut(id).referenced = true;
            let cur_base = match self.body_stack.last() {
                Some(f) => f.base_depth,
                None => 0,
            };
            if frame >= cur_base {
                return self.node(ExprKind::LocalRef(id), loc, span);
            }
            // Captured local: promote it in its defining body and reach it
            // through one context hop per intervening lexical level.
            let owner_idx = self
                .body_stack
                .iter()
                .rposition(|f| f.base_depth <= frame)
                .unwrap_or(0);
            let levels = (self.body_stack.len() - 1 - owner_idx).max(1) as u16;
            let owner_body = self.body_stack[owner_idx].id;
            let ctx_idx = self.module.body_mut(owner_body).capture_local(id);
            if let Some(local) = self.cc.syms.entry_mut(id).as_local_mut() {
                local.ctx_idx = Some(ctx_idx);
                local.val_used = true;
            }
            return self.node(
                ExprKind::CtxLocalRef {
                    sym: id,
                    levels,
                    ctx_idx,
                },
                loc,
                span,
            );
        }
        self.node(ExprKind::Unresolved(name), loc, span)
    }

    /// Record a `self` (or full method context) reference on the current
    /// body; a reference from inside a nested body also forces the
    /// outermost method body to capture the context for its closures.
    pub(crate) fn mark_method_ctx(&mut self, full: bool) {
        if let Some(frame) = self.body_stack.last() {
            let body = self.module.body_mut(frame.id);
            body.self_referenced = true;
            if full {
                body.full_method_ctx_referenced = true;
            }
        }
        if self.body_stack.len() > 1 {
            let root = self.body_stack[0].id;
            let body = self.module.body_mut(root);
            let ctx = body
                .local_ctx
                .get_or_insert_with(crate::ast::LocalCtx::default);
            ctx.needs_self = true;
            if full {
                ctx.needs_full_ctx = true;
            }
        }
    }

    // ---- double-quoted strings with embeddings ----

    /// Current token starts an embedding; classify a control word without
    /// consuming it.
    fn peek_embed_ctl(&self) -> Option<EmbedCtl> {
        match self.kind() {
            TokKind::If => Some(EmbedCtl::If),
            TokKind::Else => Some(EmbedCtl::Else),
            TokKind::Ident(s) => {
                let text = self.cc.interner.resolve(s);
                match text {
                    "unless" => Some(EmbedCtl::Unless),
                    "end" => Some(EmbedCtl::End),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Parse the whole `"seg0 << e1 >> seg1 ..."` chain; lowered to a
    /// comma chain of `DStr` segments and `DStrEmbed` expressions, with
    /// empty segments discarded.
    fn parse_dstr_chain(
        &mut self,
        first_seg: Symbol,
        loc: SourceLoc,
        span: Span,
    ) -> ParseResult<&'a Expr<'a>> {
        let mut items: Vec<&'a Expr<'a>> = Vec::new();
        self.push_seg(&mut items, first_seg, loc, span);
        let end = self.parse_dstr_items(&mut items)?;
        if let Some(ctl) = end {
            // A dangling <<else>> or <<end>> with no open <<if>>.
            self.error_here(format!("unexpected <<{:?}>> in string", ctl));
            self.finish_dstr_after_error(&mut items)?;
        }
        Ok(self.build_dstr(items, loc, span))
    }

    fn push_seg(&self, items: &mut Vec<&'a Expr<'a>>, seg: Symbol, loc: SourceLoc, span: Span) {
        if !self.cc.interner.resolve(seg).is_empty() {
            items.push(self.node(ExprKind::DStr(seg), loc, span));
        }
    }

    /// Parse alternating embeddings and segments until the string ends or
    /// a control word terminates the current group. Returns the control
    /// word, unconsumed decision but consumed tokens, when one ended the
    /// group; `None` when the closing quote did.
    fn parse_dstr_items(
        &mut self,
        items: &mut Vec<&'a Expr<'a>>,
    ) -> ParseResult<Option<EmbedCtl>> {
        loop {
            // cursor is at the first token of an embedding
            match self.peek_embed_ctl() {
                Some(EmbedCtl::If) | Some(EmbedCtl::Unless) => {
                    let (expr, ended) = self.parse_embed_if()?;
                    items.push(expr);
                    if ended {
                        return Ok(None);
                    }
                }
                Some(ctl @ EmbedCtl::Else) | Some(ctl @ EmbedCtl::End) => {
                    self.advance();
                    return Ok(Some(ctl));
                }
                None => {
                    let loc = self.loc();
                    let span = self.span();
                    let e = self.parse_comma_expr()?;
                    items.push(self.node(ExprKind::DStrEmbed(e), loc, span));
                }
            }
            // after the embedding: the next segment
            match self.kind() {
                TokKind::DStrMid(s) => {
                    let loc = self.loc();
                    let span = self.span();
                    self.advance();
                    self.push_seg(items, s, loc, span);
                }
                TokKind::DStrEnd(s) => {
                    let loc = self.loc();
                    let span = self.span();
                    self.advance();
                    self.push_seg(items, s, loc, span);
                    return Ok(None);
                }
                _ => {
                    let found = self.kind().describe(&self.cc.interner);
                    self.error_here(format!(
                        "expected \">>\" to end string embedding, found \"{}\"",
                        found
                    ));
                    return Err(Recover);
                }
            }
        }
    }

    /// `<<if cond>> ... [<<else>> ...] <<end>>` (and `unless`). The
    /// cursor sits on the `if`/`unless`. Returns the lowered conditional
    /// and whether the string's closing quote ended the construct. When
    /// the construct ends at `<<end>>`, the segment following it is left
    /// for the caller's segment step.
    fn parse_embed_if(&mut self) -> ParseResult<(&'a Expr<'a>, bool)> {
        let loc = self.loc();
        let span = self.span();
        let unless = matches!(self.peek_embed_ctl(), Some(EmbedCtl::Unless));
        self.advance(); // if / unless
        let mut cond = self.parse_comma_expr()?;
        if unless {
            cond = self.node(ExprKind::Unary(UnOp::Not, cond), loc, span);
        }

        // then-branch: segment, then items until a control word
        let mut then_items: Vec<&'a Expr<'a>> = Vec::new();
        let mut else_items: Vec<&'a Expr<'a>> = Vec::new();
        let mut string_ended = false;

        match self.expect_dstr_segment(&mut then_items)? {
            SegEnd::StringEnd => string_ended = true,
            SegEnd::More => match self.parse_dstr_items(&mut then_items)? {
                None => string_ended = true,
                Some(EmbedCtl::End) => self.check_dstr_resumes()?,
                Some(EmbedCtl::Else) => {
                    // `<<else if cond>>` chains; a plain `<<else>>` runs to
                    // the matching <<end>>.
                    if matches!(self.kind(), TokKind::If) {
                        let (nested, ended) = self.parse_embed_if()?;
                        else_items.push(nested);
                        string_ended = ended;
                    } else {
                        match self.expect_dstr_segment(&mut else_items)? {
                            SegEnd::StringEnd => string_ended = true,
                            SegEnd::More => match self.parse_dstr_items(&mut else_items)? {
                                None => string_ended = true,
                                Some(EmbedCtl::End) => self.check_dstr_resumes()?,
                                Some(other) => {
                                    self.error_here(format!(
                                        "unexpected <<{:?}>> in string conditional",
                                        other
                                    ));
                                    return Err(Recover);
                                }
                            },
                        }
                    }
                }
                Some(other) => {
                    self.error_here(format!("unexpected <<{:?}>> in string conditional", other));
                    return Err(Recover);
                }
            },
        }

        let empty = self.node(ExprKind::DStr(Symbol::EMPTY), loc, span);
        let then_e = if then_items.is_empty() {
            empty
        } else {
            self.build_dstr(then_items, loc, span)
        };
        let else_e = if else_items.is_empty() {
            empty
        } else {
            self.build_dstr(else_items, loc, span)
        };
        Ok((
            self.node(
                ExprKind::Cond {
                    cond,
                    then_e,
                    else_e,
                },
                loc,
                span,
            ),
            string_ended,
        ))
    }

    /// After a control embedding: consume the following segment into the
    /// given item list. Distinguishes "more string follows" from "that was
    /// the closing segment".
    fn expect_dstr_segment(&mut self, items: &mut Vec<&'a Expr<'a>>) -> ParseResult<SegEnd> {
        match self.kind() {
            TokKind::DStrMid(s) => {
                let loc = self.loc();
                let span = self.span();
                self.advance();
                self.push_seg(items, s, loc, span);
                Ok(SegEnd::More)
            }
            TokKind::DStrEnd(s) => {
                let loc = self.loc();
                let span = self.span();
                self.advance();
                self.push_seg(items, s, loc, span);
                Ok(SegEnd::StringEnd)
            }
            _ => {
                let found = self.kind().describe(&self.cc.interner);
                self.error_here(format!(
                    "expected \">>\" to end string embedding, found \"{}\"",
                    found
                ));
                Err(Recover)
            }
        }
    }

    /// After `<<end>>` the next token must be a string segment; it is left
    /// unconsumed for the enclosing group's segment step.
    fn check_dstr_resumes(&mut self) -> ParseResult<()> {
        match self.kind() {
            TokKind::DStrMid(_) | TokKind::DStrEnd(_) => Ok(()),
            _ => {
                let found = self.kind().describe(&self.cc.interner);
                self.error_here(format!(
                    "expected \">>\" to end string embedding, found \"{}\"",
                    found
                ));
                Err(Recover)
            }
        }
    }

    fn finish_dstr_after_error(&mut self, items: &mut Vec<&'a Expr<'a>>) -> ParseResult<()> {
        // Swallow the rest of the string so the parser can resume after it.
        loop {
            match self.kind() {
                TokKind::DStrEnd(s) => {
                    let loc = self.loc();
                    let span = self.span();
                    self.advance();
                    self.push_seg(items, s, loc, span);
                    return Ok(());
                }
                TokKind::Eof => return Ok(()),
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn build_dstr(
        &self,
        items: Vec<&'a Expr<'a>>,
        loc: SourceLoc,
        span: Span,
    ) -> &'a Expr<'a> {
        let mut iter = items.into_iter();
        let first = match iter.next() {
            Some(e) => e,
            None => return self.node(ExprKind::DStr(Symbol::EMPTY), loc, span),
        };
        iter.fold(first, |acc, e| {
            self.node(ExprKind::Binary(BinOp::Comma, acc, e), loc, span)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegEnd {
    More,
    StringEnd,
}
