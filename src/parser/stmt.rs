//! Statement parsing.

use crate::ast::stmt::{CatchClause, ForInit, LocalInit, Stmt, StmtKind};
use crate::ast::ExprKind;
use crate::intern::Symbol;
use crate::parser::expr::ExprParsing;
use crate::parser::{ParseResult, Parser, Recover};
use crate::scope::ScopeKind;
use crate::symbol::SymId;
use crate::token::{SourceLoc, Span, TokKind};

pub(crate) trait StmtParsing<'a> {
    fn parse_stmt(&mut self) -> ParseResult<&'a Stmt<'a>>;
    /// `{ ... }` with its own block scope.
    fn parse_compound(&mut self) -> ParseResult<&'a Stmt<'a>>;
    /// Statement list up to `}`, without pushing a scope; the code-body
    /// parser shares the formals' scope with the outermost braces.
    fn parse_stmt_list_to_rbrace(&mut self) -> ParseResult<&'a Stmt<'a>>;
}

impl<'a, 'e> StmtParsing<'a> for Parser<'a, 'e> {
    fn parse_stmt(&mut self) -> ParseResult<&'a Stmt<'a>> {
        let loc = self.loc();
        let span = self.span();
        match self.kind() {
            TokKind::Semi => {
                self.advance();
                Ok(self.ctx.stmt(StmtKind::Empty, loc, span))
            }
            TokKind::LBrace => self.parse_compound(),
            TokKind::If => self.parse_if(loc, span),
            TokKind::Return => {
                self.advance();
                let val = if self.check(TokKind::Semi) {
                    None
                } else {
                    Some(self.parse_comma_expr()?)
                };
                self.parse_req_sem();
                Ok(self.ctx.stmt(StmtKind::Return(val), loc, span))
            }
            TokKind::For => self.parse_for(loc, span),
            TokKind::Foreach => self.parse_foreach(loc, span),
            TokKind::While => {
                self.advance();
                self.expect(TokKind::LParen)?;
                let cond = self.parse_comma_expr()?;
                self.expect(TokKind::RParen)?;
                let body = self.parse_stmt()?;
                Ok(self.ctx.stmt(StmtKind::While { cond, body }, loc, span))
            }
            TokKind::Do => {
                self.advance();
                let body = self.parse_stmt()?;
                self.expect(TokKind::While)?;
                self.expect(TokKind::LParen)?;
                let cond = self.parse_comma_expr()?;
                self.expect(TokKind::RParen)?;
                self.parse_req_sem();
                Ok(self.ctx.stmt(StmtKind::DoWhile { body, cond }, loc, span))
            }
            TokKind::Switch => self.parse_switch(loc, span),
            TokKind::Case => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokKind::Colon)?;
                Ok(self.ctx.stmt(StmtKind::Case { expr }, loc, span))
            }
            TokKind::Default => {
                self.advance();
                self.expect(TokKind::Colon)?;
                Ok(self.ctx.stmt(StmtKind::DefaultCase, loc, span))
            }
            TokKind::Break => {
                self.advance();
                let label = self.opt_label_ref();
                self.parse_req_sem();
                Ok(self.ctx.stmt(StmtKind::Break(label), loc, span))
            }
            TokKind::Continue => {
                self.advance();
                let label = self.opt_label_ref();
                self.parse_req_sem();
                Ok(self.ctx.stmt(StmtKind::Continue(label), loc, span))
            }
            TokKind::Goto => {
                self.advance();
                let (name, tok) = self.expect_ident()?;
                self.cc.syms.ref_code_label(name, tok.loc);
                self.parse_req_sem();
                Ok(self.ctx.stmt(StmtKind::Goto(name), loc, span))
            }
            TokKind::Local => {
                self.advance();
                let stmt = self.parse_local_decl(loc, span)?;
                self.parse_req_sem();
                Ok(stmt)
            }
            TokKind::Try => self.parse_try(loc, span),
            TokKind::Throw => {
                self.advance();
                let e = self.parse_comma_expr()?;
                self.parse_req_sem();
                Ok(self.ctx.stmt(StmtKind::Throw(e), loc, span))
            }
            // `name: stmt` label definition
            TokKind::Ident(name) if self.kind_at(1) == TokKind::Colon => {
                let tok = self.advance();
                self.advance(); // colon
                let sym = {
                    let cc = &mut *self.cc;
                    cc.syms
                        .add_code_label(name, tok.loc, tok.span, &cc.interner, &mut cc.log)
                };
                let stmt = self.parse_stmt()?;
                Ok(self
                    .ctx
                    .stmt(StmtKind::Label { name, sym, stmt }, loc, span))
            }
            _ => {
                let e = self.parse_comma_expr()?;
                self.parse_req_sem();
                Ok(self.ctx.stmt(StmtKind::Expr(e), loc, span))
            }
        }
    }

    fn parse_compound(&mut self) -> ParseResult<&'a Stmt<'a>> {
        let loc = self.loc();
        let span = self.span();
        self.expect(TokKind::LBrace)?;
        self.cc.syms.push_scope(ScopeKind::Block);
        let result = self.parse_stmt_list_to_rbrace();
        self.cc.syms.pop_scope();
        let body = result?;
        Ok(self.ctx.stmt(body.kind, loc, span))
    }

    fn parse_stmt_list_to_rbrace(&mut self) -> ParseResult<&'a Stmt<'a>> {
        let loc = self.loc();
        let span = self.span();
        let mut stmts: Vec<&'a Stmt<'a>> = Vec::new();
        loop {
            match self.kind() {
                TokKind::RBrace => {
                    self.advance();
                    break;
                }
                TokKind::Eof => {
                    // Mismatched braces: report once and let the enclosing
                    // construct unwind against the synthetic end of file.
                    self.error_here("missing \"}\"".into());
                    break;
                }
                _ => match self.parse_stmt() {
                    Ok(s) => stmts.push(s),
                    Err(Recover) => self.skip_to_sem(),
                },
            }
        }
        Ok(self
            .ctx
            .stmt(StmtKind::Compound(self.ctx.stmt_list(stmts)), loc, span))
    }
}

impl<'a, 'e> Parser<'a, 'e> {
    fn opt_label_ref(&mut self) -> Option<Symbol> {
        if let Some(name) = self.ident() {
            let tok = self.advance();
            self.cc.syms.ref_code_label(name, tok.loc);
            Some(name)
        } else {
            None
        }
    }

    /// Define a local in the current scope and record it on the current
    /// code body.
    pub(crate) fn define_local(
        &mut self,
        name: Symbol,
        loc: SourceLoc,
        span: Span,
        is_param: bool,
    ) -> SymId {
        let slot = {
            let frame = self
                .body_stack
                .last_mut()
                .expect("local definition outside a code body");
            let slot = frame.next_slot;
            frame.next_slot += 1;
            slot
        };
        let id = {
            let cc = &mut *self.cc;
            if is_param {
                cc.syms
                    .add_formal(name, slot, loc, span, &cc.interner, &mut cc.log)
            } else {
                cc.syms
                    .add_local(name, slot, loc, span, &cc.interner, &mut cc.log)
            }
        };
        let frame = self.body_stack.last().unwrap();
        let body = self.module.body_mut(frame.id);
        body.locals.push(id);
        body.local_cnt = body.local_cnt.max(slot + 1);
        if is_param {
            body.formals.push(id);
        }
        id
    }

    fn parse_if(&mut self, loc: SourceLoc, span: Span) -> ParseResult<&'a Stmt<'a>> {
        self.advance();
        self.expect(TokKind::LParen)?;
        let cond = self.parse_comma_expr()?;
        self.expect(TokKind::RParen)?;
        let then_s = self.parse_stmt()?;
        let else_s = if self.eat(TokKind::Else) {
            Some(self.parse_stmt()?)
        } else {
            None
        };
        Ok(self.ctx.stmt(
            StmtKind::If {
                cond,
                then_s,
                else_s,
            },
            loc,
            span,
        ))
    }

    fn parse_local_decl(&mut self, loc: SourceLoc, span: Span) -> ParseResult<&'a Stmt<'a>> {
        let mut inits: Vec<LocalInit<'a>> = Vec::new();
        loop {
            let (name, tok) = self.expect_ident()?;
            let sym = self.define_local(name, tok.loc, tok.span, false);
            let init = if self.eat(TokKind::Assign) {
                let e = self.parse_expr()?;
                if let Some(local) = self.cc.syms.entry_mut(sym).as_local_mut() {
                    local.val_assigned = true;
                }
                Some(e)
            } else {
                None
            };
            inits.push(LocalInit {
                sym,
                init,
                loc: tok.loc,
            });
            if !self.eat(TokKind::Comma) {
                break;
            }
        }
        Ok(self.ctx.stmt(
            StmtKind::LocalDecl(self.ctx.inits.alloc_slice(inits)),
            loc,
            span,
        ))
    }

    fn parse_for(&mut self, loc: SourceLoc, span: Span) -> ParseResult<&'a Stmt<'a>> {
        self.advance();
        self.expect(TokKind::LParen)?;
        // the whole statement gets a block scope so init-declared locals
        // are visible in the condition, update, and body
        self.cc.syms.push_scope(ScopeKind::Block);
        let result = self.parse_for_inner(loc, span);
        self.cc.syms.pop_scope();
        result
    }

    fn parse_for_inner(&mut self, loc: SourceLoc, span: Span) -> ParseResult<&'a Stmt<'a>> {
        let mut init: Vec<ForInit<'a>> = Vec::new();
        if !self.check(TokKind::Semi) {
            loop {
                if self.check(TokKind::Local) {
                    self.advance();
                    let (name, tok) = self.expect_ident()?;
                    let sym = self.define_local(name, tok.loc, tok.span, false);
                    if self.eat(TokKind::In) {
                        let coll = self.parse_expr()?;
                        if let Some(local) = self.cc.syms.entry_mut(sym).as_local_mut() {
                            local.val_assigned = true;
                        }
                        let target = self.ctx.expr(ExprKind::LocalRef(sym), tok.loc, tok.span);
                        init.push(ForInit::In {
                            target,
                            expr: coll,
                            decl: Some(sym),
                        });
                    } else {
                        let e = if self.eat(TokKind::Assign) {
                            if let Some(local) = self.cc.syms.entry_mut(sym).as_local_mut() {
                                local.val_assigned = true;
                            }
                            Some(self.parse_expr()?)
                        } else {
                            None
                        };
                        init.push(ForInit::Local { sym, init: e });
                    }
                } else {
                    let e = self.parse_expr()?;
                    if self.eat(TokKind::In) {
                        let coll = self.parse_expr()?;
                        init.push(ForInit::In {
                            target: e,
                            expr: coll,
                            decl: None,
                        });
                    } else {
                        init.push(ForInit::Expr(e));
                    }
                }
                if !self.eat(TokKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokKind::Semi)?;
        let cond = if self.check(TokKind::Semi) {
            None
        } else {
            Some(self.parse_comma_expr()?)
        };
        self.expect(TokKind::Semi)?;
        let update = if self.check(TokKind::RParen) {
            None
        } else {
            Some(self.parse_comma_expr()?)
        };
        self.expect(TokKind::RParen)?;
        let body = self.parse_stmt()?;
        Ok(self.ctx.stmt(
            StmtKind::For {
                init: self.ctx.for_inits.alloc_slice(init),
                cond,
                update,
                body,
            },
            loc,
            span,
        ))
    }

    fn parse_foreach(&mut self, loc: SourceLoc, span: Span) -> ParseResult<&'a Stmt<'a>> {
        self.advance();
        self.expect(TokKind::LParen)?;
        self.cc.syms.push_scope(ScopeKind::Block);
        let result = (|| -> ParseResult<&'a Stmt<'a>> {
            let (target, decl) = if self.eat(TokKind::Local) {
                let (name, tok) = self.expect_ident()?;
                let sym = self.define_local(name, tok.loc, tok.span, false);
                if let Some(local) = self.cc.syms.entry_mut(sym).as_local_mut() {
                    local.val_assigned = true;
                }
                (
                    self.ctx.expr(ExprKind::LocalRef(sym), tok.loc, tok.span),
                    Some(sym),
                )
            } else {
                (self.parse_expr()?, None)
            };
            self.expect(TokKind::In)?;
            let expr = self.parse_comma_expr()?;
            self.expect(TokKind::RParen)?;
            let body = self.parse_stmt()?;
            Ok(self.ctx.stmt(
                StmtKind::Foreach {
                    target,
                    expr,
                    body,
                    decl,
                },
                loc,
                span,
            ))
        })();
        self.cc.syms.pop_scope();
        result
    }

    fn parse_switch(&mut self, loc: SourceLoc, span: Span) -> ParseResult<&'a Stmt<'a>> {
        self.advance();
        self.expect(TokKind::LParen)?;
        let expr = self.parse_comma_expr()?;
        self.expect(TokKind::RParen)?;
        let body = self.parse_compound()?;
        Ok(self.ctx.stmt(StmtKind::Switch { expr, body }, loc, span))
    }

    fn parse_try(&mut self, loc: SourceLoc, span: Span) -> ParseResult<&'a Stmt<'a>> {
        self.advance();
        let body = self.parse_compound()?;
        let mut catches: Vec<CatchClause<'a>> = Vec::new();
        while self.check(TokKind::Catch) {
            let ctok = self.advance();
            self.expect(TokKind::LParen)?;
            let (cls, _) = self.expect_ident()?;
            self.cc.syms.push_scope(ScopeKind::Block);
            let clause = (|| -> ParseResult<CatchClause<'a>> {
                let (var_name, vtok) = self.expect_ident()?;
                let var = self.define_local(var_name, vtok.loc, vtok.span, false);
                if let Some(local) = self.cc.syms.entry_mut(var).as_local_mut() {
                    local.val_assigned = true;
                }
                self.expect(TokKind::RParen)?;
                let cbody = self.parse_compound()?;
                Ok(CatchClause {
                    cls,
                    var,
                    body: cbody,
                    loc: ctok.loc,
                })
            })();
            self.cc.syms.pop_scope();
            catches.push(clause?);
        }
        let finally = if self.eat(TokKind::Finally) {
            Some(self.parse_compound()?)
        } else {
            None
        };
        if catches.is_empty() && finally.is_none() {
            self.error_here("\"try\" needs at least one \"catch\" or \"finally\"".into());
        }
        Ok(self.ctx.stmt(
            StmtKind::Try {
                body,
                catches: self.ctx.catches.alloc_slice(catches),
                finally,
            },
            loc,
            span,
        ))
    }
}
