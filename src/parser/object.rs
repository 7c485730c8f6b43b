//! Object definitions: headers, property lists, templates, propertyset
//! groups, `modify`/`replace`, and extern declarations.

use crate::ast::expr::{ConstVal, Expr, ExprKind};
use crate::ast::stmt::{ObjectDef, PropDef, PropVal};
use crate::ast::TopItem;
use crate::intern::Symbol;
use crate::parser::body::{begin_body, finish_body, parse_formals_collect, FnFlags};
use crate::parser::expr::ExprParsing;
use crate::parser::stmt::StmtParsing;
use crate::parser::{ParseResult, Parser, Recover};
use crate::scope::DefPolicy;
use crate::symbol::{
    FuncSym, ObjTemplate, ObjectSym, SymEntry, SymId, SymKind, TemplateItem, TemplateTok,
    VocabWord,
};
use crate::token::{SourceLoc, Span, TokKind};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ObjFlags {
    pub is_class: bool,
    pub transient: bool,
    /// Number of leading `+` signs; 0 means "not specified".
    pub plus_depth: usize,
}

impl ObjFlags {
    pub fn class() -> Self {
        ObjFlags {
            is_class: true,
            ..ObjFlags::default()
        }
    }

    pub fn at_location(depth: usize) -> Self {
        ObjFlags {
            plus_depth: depth,
            ..ObjFlags::default()
        }
    }

    pub fn transient() -> Self {
        ObjFlags {
            transient: true,
            ..ObjFlags::default()
        }
    }
}

/// One propertyset nesting level.
pub(crate) struct PropSetFrame {
    /// Property-name pattern containing a `*`.
    pub pattern: String,
    /// Argument-list pattern; `Star` marks where the declared formals go.
    pub args: Vec<PsArg>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum PsArg {
    Name(Symbol),
    Star,
}

/// A positional template argument from an object header.
struct TplArg<'a> {
    tok: TemplateTok,
    expr: &'a Expr<'a>,
    /// Raw string payload for vocabulary handling.
    text: Option<Symbol>,
}

/// `Name: Super1, Super2 ... ;` or `Name: Super { props }`.
pub(crate) fn parse_object_def(p: &mut Parser<'_, '_>, mut flags: ObjFlags) -> ParseResult<()> {
    if p.eat(TokKind::Transient) {
        flags.transient = true;
    }
    let (name, name_tok) = p.expect_ident()?;
    p.expect(TokKind::Colon)?;
    parse_object_rest(p, name, name_tok.loc, name_tok.span, flags, None)
}

/// Everything after `Name:`. `replace_existing` carries the symbol being
/// replaced when this is a `replace Name: ...` definition.
fn parse_object_rest(
    p: &mut Parser<'_, '_>,
    name: Symbol,
    loc: SourceLoc,
    span: Span,
    flags: ObjFlags,
    replace_existing: Option<SymId>,
) -> ParseResult<()> {
    // superclass list: `object` for a bare object, else names
    let mut supers: Vec<Symbol> = Vec::new();
    if !p.eat(TokKind::ObjectKw) {
        loop {
            let (sc, _) = p.expect_ident()?;
            supers.push(sc);
            if !p.eat(TokKind::Comma) {
                break;
            }
        }
    }

    let obj = ObjectSym {
        obj_id: p.cc.alloc_obj_id(),
        superclasses: supers.clone(),
        is_class: flags.is_class,
        transient: flags.transient,
        ..ObjectSym::default()
    };

    let sym = match replace_existing {
        Some(existing) => {
            let was_extern = p
                .cc
                .syms
                .entry(existing)
                .as_object()
                .map(|o| o.is_extern)
                .unwrap_or(false);
            let mut obj = obj;
            obj.ext_replace = was_extern;
            obj.dict = p.cc.cur_dict;
            p.cc.syms.entry_mut(existing).kind = SymKind::Object(obj);
            p.cc.syms.entry_mut(existing).loc = loc;
            existing
        }
        None => define_object_sym(p, name, loc, span, obj)?,
    };

    let mut props: Vec<PropDef<'_>> = Vec::new();

    // `+` location: the object's location is the last object one level up.
    if flags.plus_depth > 0 {
        let depth = flags.plus_depth;
        if depth > p.cc.loc_stack.len() {
            p.cc.log.warning(
                loc,
                span,
                "not enough objects on the \"+\" location stack".into(),
            );
        } else {
            let parent = p.cc.loc_stack[depth - 1];
            let prop = p.cc.interner.intern("location");
            {
                let cc = &mut *p.cc;
                cc.syms.find_or_def(
                    prop,
                    DefPolicy::AddPropNoWarn,
                    loc,
                    span,
                    &cc.interner,
                    &mut cc.log,
                );
            }
            let e = p.ctx.expr(ExprKind::Unresolved(parent), loc, span);
            props.push(PropDef {
                prop,
                val: PropVal::Expr(e),
                is_static: false,
                loc,
            });
        }
    }

    // positional template arguments
    let args = parse_template_args(p)?;
    if !args.is_empty() {
        apply_template(p, sym, &supers, &args, loc, span, &mut props);
    }

    // property list
    let braced = p.eat(TokKind::LBrace);
    parse_object_props(p, sym, braced, &mut props)?;

    // maintain the `+` stack
    if !flags.is_class {
        let depth = flags.plus_depth;
        p.cc.loc_stack.truncate(depth);
        p.cc.loc_stack.push(name);
    }

    let def = ObjectDef { sym, props, loc };
    p.module.items.push(TopItem::Object(def));
    Ok(())
}

pub(crate) fn define_object_sym(
    p: &mut Parser<'_, '_>,
    name: Symbol,
    loc: SourceLoc,
    span: Span,
    mut obj: ObjectSym,
) -> ParseResult<SymId> {
    obj.dict = p.cc.cur_dict;
    p.cc.syms.find_delete_weak(name);
    match p.cc.syms.define_global(name, loc, SymKind::Object(obj.clone())) {
        Ok(id) => Ok(id),
        Err(existing) => {
            let extern_obj_id = p
                .cc
                .syms
                .entry(existing)
                .as_object()
                .filter(|o| o.is_extern)
                .map(|o| o.obj_id);
            match extern_obj_id {
                Some(old_id) => {
                    // the extern declaration is now resolved by a real
                    // definition; keep the already-assigned object id
                    obj.obj_id = old_id;
                    p.cc.syms.entry_mut(existing).kind = SymKind::Object(obj);
                    p.cc.syms.entry_mut(existing).loc = loc;
                    Ok(existing)
                }
                None => {
                    let kind_name = p.cc.syms.entry(existing).kind.kind_name();
                    let text = p.cc.interner.resolve(name).to_string();
                    p.cc.log.error(
                        loc,
                        span,
                        format!("\"{}\" is already defined as a {}", text, kind_name),
                    );
                    Err(Recover)
                }
            }
        }
    }
}

// ---- property lists ----

pub(crate) fn parse_object_props<'a>(
    p: &mut Parser<'a, '_>,
    sym: SymId,
    braced: bool,
    props: &mut Vec<PropDef<'a>>,
) -> ParseResult<()> {
    loop {
        match p.kind() {
            TokKind::RBrace if braced => {
                p.advance();
                return Ok(());
            }
            TokKind::Semi if !braced => {
                p.advance();
                return Ok(());
            }
            TokKind::Semi => {
                // stray `;` inside a braced body: tolerate
                p.advance();
            }
            TokKind::Eof => {
                p.error_here(if braced {
                    "missing \"}\" in object definition".into()
                } else {
                    "missing \";\" at end of object definition".into()
                });
                return Ok(());
            }
            TokKind::Propertyset => {
                p.advance();
                parse_propertyset(p, sym, props)?;
            }
            TokKind::Ident(_) => {
                if let Err(Recover) = parse_prop_def(p, sym, props) {
                    p.skip_to_sem();
                }
            }
            _ => {
                let found = p.kind().describe(&p.cc.interner);
                p.error_here(format!(
                    "expected property definition, found \"{}\"",
                    found
                ));
                return Err(Recover);
            }
        }
    }
}

fn apply_propset_name(p: &mut Parser<'_, '_>, name: Symbol) -> Symbol {
    if p.propset_stack.is_empty() {
        return name;
    }
    let mut text = p.cc.interner.resolve(name).to_string();
    for frame in p.propset_stack.iter().rev() {
        text = frame.pattern.replace('*', &text);
    }
    p.cc.interner.intern(&text)
}

fn parse_prop_def<'a>(
    p: &mut Parser<'a, '_>,
    obj_sym: SymId,
    props: &mut Vec<PropDef<'a>>,
) -> ParseResult<()> {
    let (raw_name, tok) = p.expect_ident()?;
    let prop = apply_propset_name(p, raw_name);
    // a property definition implicitly declares the property symbol
    {
        let cc = &mut *p.cc;
        cc.syms.find_or_def(
            prop,
            DefPolicy::AddPropNoWarn,
            tok.loc,
            tok.span,
            &cc.interner,
            &mut cc.log,
        );
    }
    match p.kind() {
        TokKind::Assign => {
            p.advance();
            let is_static = p.eat(TokKind::Static);
            let value = p.parse_expr()?;
            handle_vocab_prop(p, obj_sym, prop, value);
            props.push(PropDef {
                prop,
                val: PropVal::Expr(value),
                is_static,
                loc: tok.loc,
            });
            Ok(())
        }
        TokKind::LParen => {
            let body = parse_method_body(p)?;
            props.push(PropDef {
                prop,
                val: PropVal::Method(body),
                is_static: false,
                loc: tok.loc,
            });
            Ok(())
        }
        TokKind::Colon => {
            // inline nested object: `prop: Class { ... }`
            p.advance();
            let nested = parse_inline_object(p, obj_sym, tok.loc, tok.span)?;
            props.push(PropDef {
                prop,
                val: PropVal::Inline(nested),
                is_static: false,
                loc: tok.loc,
            });
            Ok(())
        }
        // a bare dstring property: `"..."` printed by the property
        TokKind::DStr(_) | TokKind::DStrStart(_) => {
            let value = p.parse_primary()?;
            props.push(PropDef {
                prop,
                val: PropVal::Expr(value),
                is_static: false,
                loc: tok.loc,
            });
            Ok(())
        }
        _ => {
            let found = p.kind().describe(&p.cc.interner);
            p.error_here(format!(
                "expected \"=\", \"(\", or \":\" after property name, found \"{}\"",
                found
            ));
            Err(Recover)
        }
    }
}

/// Method definition inside an object body; applies any active
/// propertyset argument patterns around the declared formals.
fn parse_method_body(p: &mut Parser<'_, '_>) -> ParseResult<crate::ast::BodyId> {
    let id = begin_body(p, true);
    let result = (|| -> ParseResult<()> {
        let (declared, varargs) = parse_formals_collect(p)?;

        // compose the formal list through the propertyset argument
        // patterns, innermost pattern first
        let mut formals: Vec<(Option<Symbol>, Symbol, SourceLoc, Span)> = declared;
        for frame in p.propset_stack.iter().rev() {
            if frame.args.is_empty() {
                continue;
            }
            let mut combined: Vec<(Option<Symbol>, Symbol, SourceLoc, Span)> = Vec::new();
            let mut spliced = false;
            for a in &frame.args {
                match a {
                    PsArg::Star => {
                        combined.extend(formals.iter().copied());
                        spliced = true;
                    }
                    PsArg::Name(n) => {
                        combined.push((None, *n, SourceLoc::default(), Span::default()))
                    }
                }
            }
            if !spliced {
                combined.extend(formals.iter().copied());
            }
            formals = combined;
        }
        for (_, name, loc, span) in &formals {
            p.define_local(*name, *loc, *span, true);
        }
        let body = p.module.body_mut(id);
        body.varargs = varargs;

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

fn parse_inline_object(
    p: &mut Parser<'_, '_>,
    parent: SymId,
    loc: SourceLoc,
    span: Span,
) -> ParseResult<SymId> {
    let mut supers: Vec<Symbol> = Vec::new();
    loop {
        let (sc, _) = p.expect_ident()?;
        supers.push(sc);
        if !p.eat(TokKind::Comma) {
            break;
        }
    }
    let name = p.cc.anon_name("anonObj");
    let obj = ObjectSym {
        obj_id: p.cc.alloc_obj_id(),
        superclasses: supers.clone(),
        dict: p.cc.cur_dict,
        lexical_parent: Some(parent),
        ..ObjectSym::default()
    };
    let sym = p
        .cc
        .syms
        .add_detached(SymEntry::new(name, loc, SymKind::Object(obj)));
    p.cc.syms.entry_mut(sym).referenced = true;

    let mut props: Vec<PropDef<'_>> = Vec::new();
    let args = parse_template_args(p)?;
    if !args.is_empty() {
        apply_template(p, sym, &supers, &args, loc, span, &mut props);
    }
    p.expect(TokKind::LBrace)?;
    parse_object_props(p, sym, true, &mut props)?;
    let def = ObjectDef { sym, props, loc };
    p.module.items.push(TopItem::Object(def));
    Ok(sym)
}

fn parse_propertyset<'a>(
    p: &mut Parser<'a, '_>,
    obj_sym: SymId,
    props: &mut Vec<PropDef<'a>>,
) -> ParseResult<()> {
    let pattern = match p.kind() {
        TokKind::SStr(s) => {
            p.advance();
            p.cc.interner.resolve(s).to_string()
        }
        _ => {
            p.error_here("expected pattern string after \"propertyset\"".into());
            return Err(Recover);
        }
    };
    if !pattern.contains('*') {
        p.error_here("propertyset pattern must contain \"*\"".into());
    }

    let mut args: Vec<PsArg> = Vec::new();
    if p.eat(TokKind::LParen) {
        loop {
            match p.kind() {
                TokKind::Star => {
                    p.advance();
                    args.push(PsArg::Star);
                }
                TokKind::Ident(n) => {
                    p.advance();
                    args.push(PsArg::Name(n));
                }
                _ => break,
            }
            if !p.eat(TokKind::Comma) {
                break;
            }
        }
        p.expect(TokKind::RParen)?;
    }

    p.expect(TokKind::LBrace)?;
    p.propset_stack.push(PropSetFrame { pattern, args });
    let result = parse_object_props(p, obj_sym, true, props);
    p.propset_stack.pop();
    result
}

// ---- templates ----

/// Collect positional template arguments from an object header.
fn parse_template_args<'a>(p: &mut Parser<'a, '_>) -> ParseResult<Vec<TplArg<'a>>> {
    let mut args: Vec<TplArg<'a>> = Vec::new();
    loop {
        match p.kind() {
            TokKind::SStr(s) => {
                let e = p.parse_primary()?;
                args.push(TplArg {
                    tok: TemplateTok::SString,
                    expr: e,
                    text: Some(s),
                });
            }
            TokKind::DStr(_) | TokKind::DStrStart(_) => {
                let e = p.parse_primary()?;
                args.push(TplArg {
                    tok: TemplateTok::DString,
                    expr: e,
                    text: None,
                });
            }
            TokKind::Int(_) | TokKind::Float(_) => {
                let e = p.parse_primary()?;
                args.push(TplArg {
                    tok: TemplateTok::Int,
                    expr: e,
                    text: None,
                });
            }
            TokKind::LBracket => {
                let e = p.parse_primary()?;
                args.push(TplArg {
                    tok: TemplateTok::List,
                    expr: e,
                    text: None,
                });
            }
            TokKind::At => {
                let tok = p.advance();
                let (name, _) = p.expect_ident()?;
                let e = p.ctx.expr(ExprKind::Unresolved(name), tok.loc, tok.span);
                args.push(TplArg {
                    tok: TemplateTok::Object,
                    expr: e,
                    text: None,
                });
            }
            _ => return Ok(args),
        }
    }
}

/// Gather the templates visible to a class list: every template on each
/// named superclass and its ancestors, with `inherited` markers expanded,
/// plus the global templates.
fn gather_templates(p: &Parser<'_, '_>, supers: &[Symbol]) -> Vec<ObjTemplate> {
    fn gather_class(
        p: &Parser<'_, '_>,
        class: Symbol,
        visited: &mut HashSet<Symbol>,
        out: &mut Vec<ObjTemplate>,
    ) {
        if !visited.insert(class) {
            return;
        }
        let obj = match p
            .cc
            .syms
            .find_noref(class)
            .and_then(|id| p.cc.syms.entry(id).as_object().cloned())
        {
            Some(o) => o,
            None => return,
        };
        let mut parents: Vec<ObjTemplate> = Vec::new();
        for sc in &obj.superclasses {
            gather_class(p, *sc, visited, &mut parents);
        }
        for tpl in &obj.templates {
            if tpl.items.iter().any(|i| i.tok == TemplateTok::Inherited) {
                // expand `inherited` against each distinct parent template
                for parent in &parents {
                    let mut items: Vec<TemplateItem> = Vec::new();
                    for item in &tpl.items {
                        if item.tok == TemplateTok::Inherited {
                            items.extend(parent.items.iter().copied());
                        } else {
                            items.push(*item);
                        }
                    }
                    out.push(ObjTemplate { items });
                }
            } else {
                out.push(tpl.clone());
            }
        }
        out.extend(parents);
    }

    let mut out = Vec::new();
    let mut visited = HashSet::new();
    for sc in supers {
        gather_class(p, *sc, &mut visited, &mut out);
    }
    out.extend(p.cc.global_templates.iter().cloned());
    out
}

/// Greedy longest-match of a template against the argument token types.
/// Returns the property assignment for each consumed argument.
fn match_template(items: &[TemplateItem], args: &[TemplateTok]) -> Option<Vec<(Symbol, usize)>> {
    fn group_end(items: &[TemplateItem], start: usize) -> usize {
        let mut i = start;
        while i < items.len() && items[i].is_alt {
            i += 1;
        }
        i
    }

    fn walk(
        items: &[TemplateItem],
        i: usize,
        args: &[TemplateTok],
        j: usize,
        out: &mut Vec<(Symbol, usize)>,
    ) -> bool {
        if i >= items.len() {
            return j == args.len();
        }
        let end = group_end(items, i);
        let optional = items[i..=end].iter().any(|it| it.is_opt);
        // consume first: longest match wins
        if j < args.len() {
            for item in &items[i..=end] {
                if item.tok == args[j] {
                    out.push((item.prop, j));
                    if walk(items, end + 1, args, j + 1, out) {
                        return true;
                    }
                    out.pop();
                    break;
                }
            }
        }
        if optional {
            return walk(items, end + 1, args, j, out);
        }
        false
    }

    let mut out = Vec::new();
    if walk(items, 0, args, 0, &mut out) {
        Some(out)
    } else {
        None
    }
}

fn apply_template<'a>(
    p: &mut Parser<'a, '_>,
    obj_sym: SymId,
    supers: &[Symbol],
    args: &[TplArg<'a>],
    loc: SourceLoc,
    span: Span,
    props: &mut Vec<PropDef<'a>>,
) {
    let arg_toks: Vec<TemplateTok> = args.iter().map(|a| a.tok).collect();
    let candidates = gather_templates(p, supers);
    for tpl in &candidates {
        if let Some(assignments) = match_template(&tpl.items, &arg_toks) {
            for (prop, idx) in assignments {
                let arg = &args[idx];
                {
                    let cc = &mut *p.cc;
                    cc.syms.find_or_def(
                        prop,
                        DefPolicy::AddPropNoWarn,
                        loc,
                        span,
                        &cc.interner,
                        &mut cc.log,
                    );
                }
                handle_vocab_prop(p, obj_sym, prop, arg.expr);
                if let Some(text) = arg.text {
                    add_vocab_text(p, obj_sym, prop, text);
                }
                props.push(PropDef {
                    prop,
                    val: PropVal::Expr(arg.expr),
                    is_static: false,
                    loc,
                });
            }
            return;
        }
    }
    p.cc.log.error(
        loc,
        span,
        "object definition does not match any template".into(),
    );
}

/// `prop = 'word word'` on a dictionary property records vocabulary.
fn handle_vocab_prop(p: &mut Parser<'_, '_>, obj_sym: SymId, prop: Symbol, value: &Expr<'_>) {
    if !p.cc.dict_props.contains(&prop) {
        return;
    }
    if let ExprKind::Const(ConstVal::Str(s)) = value.kind {
        add_vocab_text(p, obj_sym, prop, s);
    }
}

/// Split a vocabulary string into words; record them on the object and in
/// the active dictionary.
fn add_vocab_text(p: &mut Parser<'_, '_>, obj_sym: SymId, prop: Symbol, text: Symbol) {
    if !p.cc.dict_props.contains(&prop) {
        return;
    }
    let words: Vec<String> = p
        .cc
        .interner
        .resolve(text)
        .split_whitespace()
        .map(|w| w.to_string())
        .collect();
    let obj_name = p.cc.syms.entry(obj_sym).name;
    for w in words {
        let word = p.cc.interner.intern_folded(&w);
        if let Some(obj) = p.cc.syms.entry_mut(obj_sym).as_object_mut() {
            if !obj.vocab.iter().any(|v| v.word == word && v.prop == prop) {
                obj.vocab.push(VocabWord { word, prop });
            }
        }
        if let Some(dict) = p.cc.cur_dict {
            if let Some(d) = p.cc.syms.entry_mut(dict).as_object_mut() {
                let pairs = d.dict_words.entry(word).or_default();
                if !pairs.contains(&(obj_name, prop)) {
                    pairs.push((obj_name, prop));
                }
            }
        }
    }
}

/// `Name template ...;` (class templates) and `object template ...;`
/// (global templates).
pub(crate) fn parse_template_def(
    p: &mut Parser<'_, '_>,
    class_name: Option<Symbol>,
) -> ParseResult<()> {
    let loc = p.loc();
    let span = p.span();
    let mut items: Vec<TemplateItem> = Vec::new();
    loop {
        let item = match p.kind() {
            TokKind::SStr(s) => {
                p.advance();
                Some(TemplateItem {
                    prop: s,
                    tok: TemplateTok::SString,
                    is_alt: false,
                    is_opt: false,
                })
            }
            TokKind::DStr(s) => {
                p.advance();
                Some(TemplateItem {
                    prop: s,
                    tok: TemplateTok::DString,
                    is_alt: false,
                    is_opt: false,
                })
            }
            TokKind::LBracket => {
                p.advance();
                let (prop, _) = p.expect_ident()?;
                p.expect(TokKind::RBracket)?;
                Some(TemplateItem {
                    prop,
                    tok: TemplateTok::List,
                    is_alt: false,
                    is_opt: false,
                })
            }
            TokKind::At => {
                p.advance();
                let (prop, _) = p.expect_ident()?;
                Some(TemplateItem {
                    prop,
                    tok: TemplateTok::Object,
                    is_alt: false,
                    is_opt: false,
                })
            }
            TokKind::Inherited => {
                p.advance();
                Some(TemplateItem {
                    prop: Symbol::EMPTY,
                    tok: TemplateTok::Inherited,
                    is_alt: false,
                    is_opt: false,
                })
            }
            TokKind::Ident(prop) => {
                p.advance();
                Some(TemplateItem {
                    prop,
                    tok: TemplateTok::Int,
                    is_alt: false,
                    is_opt: false,
                })
            }
            TokKind::Semi => {
                p.advance();
                break;
            }
            _ => {
                let found = p.kind().describe(&p.cc.interner);
                p.error_here(format!("unexpected \"{}\" in template definition", found));
                return Err(Recover);
            }
        };
        if let Some(item) = item {
            items.push(item);
            // `|` joins this item to the next as alternates for one slot
            if p.eat(TokKind::Or) {
                if let Some(last) = items.last_mut() {
                    last.is_alt = true;
                }
            }
            // `?` marks the item (or whole alternation group) optional
            if p.eat(TokKind::Question) {
                let mut i = items.len();
                loop {
                    i -= 1;
                    items[i].is_opt = true;
                    if i == 0 || !items[i - 1].is_alt {
                        break;
                    }
                }
            }
        }
    }

    if items.is_empty() {
        p.cc.log.warning(loc, span, "empty template definition".into());
    }
    let template = ObjTemplate { items };
    match class_name {
        None => p.cc.global_templates.push(template),
        Some(class) => match p.cc.syms.find_noref(class) {
            Some(id) if p.cc.syms.entry(id).as_object().is_some() => {
                p.cc.syms
                    .entry_mut(id)
                    .as_object_mut()
                    .unwrap()
                    .templates
                    .push(template);
            }
            _ => {
                let text = p.cc.interner.resolve(class).to_string();
                p.cc.log.error(
                    loc,
                    span,
                    format!("template for undefined class \"{}\"", text),
                );
            }
        },
    }
    Ok(())
}

// ---- modify / replace ----

/// `modify Name ...` / `replace Name ...` where the target is an object
/// or a function (grammar is handled by the caller).
pub(crate) fn parse_modify_replace(p: &mut Parser<'_, '_>, is_modify: bool) -> ParseResult<()> {
    // function form: `modify name(params) {...}` / `replace name(...) ...`
    if matches!(p.kind(), TokKind::Ident(_)) && p.kind_at(1) == TokKind::LParen {
        let flags = FnFlags {
            replace: !is_modify,
            modify: is_modify,
        };
        return crate::parser::body::parse_function_def(p, flags);
    }

    let (name, tok) = p.expect_ident()?;
    let existing = match p.cc.syms.find_noref(name) {
        Some(id) if p.cc.syms.entry(id).as_object().is_some() => id,
        _ => {
            let text = p.cc.interner.resolve(name).to_string();
            p.cc.log.error(
                tok.loc,
                tok.span,
                format!("\"{}\" is not a defined object", text),
            );
            return Err(Recover);
        }
    };

    if !is_modify {
        // `replace Name: Super...` is a full redefinition
        p.expect(TokKind::Colon)?;
        return parse_object_rest(
            p,
            name,
            tok.loc,
            tok.span,
            ObjFlags::default(),
            Some(existing),
        );
    }

    // `modify Name props... ;` - the old definition moves to a synthesized
    // placeholder reachable through the modify-base chain.
    let old = p.cc.syms.entry(existing).clone();
    let was_extern = old.as_object().map(|o| o.is_extern).unwrap_or(false);
    let placeholder_name = p.cc.anon_name("mod_base");
    let placeholder = p
        .cc
        .syms
        .add_detached(SymEntry::new(placeholder_name, old.loc, old.kind.clone()));

    {
        let entry = p.cc.syms.entry_mut(existing);
        entry.loc = tok.loc;
        if let Some(obj) = entry.as_object_mut() {
            obj.mod_base = Some(placeholder);
            obj.modified = false;
            obj.is_extern = false;
            obj.ext_modify = was_extern;
        }
    }
    if let Some(obj) = p.cc.syms.entry_mut(placeholder).as_object_mut() {
        obj.modified = true;
    }

    let mut props: Vec<PropDef<'_>> = Vec::new();
    let sc: Vec<Symbol> = p
        .cc
        .syms
        .entry(existing)
        .as_object()
        .map(|o| o.superclasses.clone())
        .unwrap_or_default();
    let args = parse_template_args(p)?;
    if !args.is_empty() {
        apply_template(p, existing, &sc, &args, tok.loc, tok.span, &mut props);
    }
    let braced = p.eat(TokKind::LBrace);
    parse_object_props(p, existing, braced, &mut props)?;
    p.module.items.push(TopItem::Object(ObjectDef {
        sym: existing,
        props,
        loc: tok.loc,
    }));
    Ok(())
}

// ---- extern ----

/// `extern function f(...);`, `extern object Name;`, `extern class C;`.
pub(crate) fn parse_extern(p: &mut Parser<'_, '_>) -> ParseResult<()> {
    match p.kind() {
        TokKind::Function => {
            p.advance();
            let (name, tok) = p.expect_ident()?;
            let (formals, varargs) = parse_formals_collect(p)?;
            let func = FuncSym {
                argc: formals.len() as u16,
                varargs,
                has_retval: true,
                is_extern: true,
                ..FuncSym::default()
            };
            if let Err(existing) = p.cc.syms.define_global(name, tok.loc, SymKind::Func(func)) {
                if p.cc.syms.entry(existing).as_func().is_none() {
                    let text = p.cc.interner.resolve(name).to_string();
                    p.cc.log.error(
                        tok.loc,
                        tok.span,
                        format!("\"{}\" is already defined with a different kind", text),
                    );
                }
            }
            p.parse_req_sem();
            Ok(())
        }
        TokKind::ObjectKw | TokKind::Class => {
            let is_class = p.check(TokKind::Class);
            p.advance();
            let (name, tok) = p.expect_ident()?;
            let obj = ObjectSym {
                obj_id: p.cc.alloc_obj_id(),
                is_class,
                is_extern: true,
                ..ObjectSym::default()
            };
            if let Err(existing) = p
                .cc
                .syms
                .define_global(name, tok.loc, SymKind::Object(obj))
            {
                if p.cc.syms.entry(existing).as_object().is_none() {
                    let text = p.cc.interner.resolve(name).to_string();
                    p.cc.log.error(
                        tok.loc,
                        tok.span,
                        format!("\"{}\" is already defined with a different kind", text),
                    );
                }
            }
            p.parse_req_sem();
            Ok(())
        }
        _ => {
            p.error_here("expected \"function\", \"object\", or \"class\" after \"extern\"".into());
            Err(Recover)
        }
    }
}
