//! Grammar productions, dictionaries, enums, exports, and intrinsic
//! declarations.

use crate::ast::stmt::{ObjectDef, PropDef};
use crate::ast::TopItem;
use crate::intern::Symbol;
use crate::parser::{ParseResult, Parser, Recover};
use crate::scope::DefPolicy;
use crate::symbol::{
    BifSym, EnumSym, GramAlt, GramTok, GramTokKind, MetaProp, Metaclass, MetaclassSym, ObjectSym,
    SymEntry, SymId, SymKind,
};
use crate::token::{SourceLoc, Span, TokKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GrammarMode {
    Define,
    /// `modify grammar`: relocate the existing tagged alternatives to a
    /// private owner, then append the new ones.
    Modify,
    /// `replace grammar`: drop the existing tagged alternatives.
    Replace,
}

/// `grammar name(tag): tok tok | tok ... : Class, Class props... ;`
pub(crate) fn parse_grammar(p: &mut Parser<'_, '_>, mode: GrammarMode) -> ParseResult<()> {
    let (base, tok) = p.expect_ident()?;
    let tag = if p.eat(TokKind::LParen) {
        let (t, _) = p.expect_ident()?;
        p.expect(TokKind::RParen)?;
        Some(t)
    } else {
        None
    };
    p.expect(TokKind::Colon)?;

    let prod = ensure_production(p, base, tok.loc);

    match mode {
        GrammarMode::Define => {}
        GrammarMode::Replace => {
            if let Some(obj) = p.cc.syms.entry_mut(prod).as_object_mut() {
                obj.gram_alts.retain(|a| a.tag != tag);
            }
        }
        GrammarMode::Modify => {
            // move the tagged alternatives to a synthesized private owner
            let moved: Vec<GramAlt> = match p.cc.syms.entry_mut(prod).as_object_mut() {
                Some(obj) => {
                    let moved = obj
                        .gram_alts
                        .iter()
                        .filter(|a| a.tag == tag)
                        .cloned()
                        .collect();
                    obj.gram_alts.retain(|a| a.tag != tag);
                    moved
                }
                None => Vec::new(),
            };
            if !moved.is_empty() {
                let name = p.cc.anon_name("gramBase");
                let owner = ObjectSym {
                    obj_id: p.cc.alloc_obj_id(),
                    metaclass: Metaclass::GrammarProd,
                    gram_alts: moved,
                    ..ObjectSym::default()
                };
                let id = p
                    .cc
                    .syms
                    .add_detached(SymEntry::new(name, tok.loc, SymKind::Object(owner)));
                p.cc.syms.entry_mut(id).referenced = true;
            }
        }
    }

    // alternative list, up to the `:` that introduces the match classes
    let mut alts: Vec<GramAlt> = Vec::new();
    let mut current = GramAlt {
        tag,
        ..GramAlt::default()
    };
    loop {
        match p.kind() {
            TokKind::Or => {
                p.advance();
                alts.push(std::mem::replace(
                    &mut current,
                    GramAlt {
                        tag,
                        ..GramAlt::default()
                    },
                ));
            }
            TokKind::Colon => {
                p.advance();
                break;
            }
            TokKind::Semi | TokKind::Eof => {
                p.error_here("grammar rule is missing its match-class list".into());
                return Err(Recover);
            }
            _ => match parse_gram_token(p)? {
                AltElem::Tok(gtok) => current.toks.push(gtok),
                AltElem::Badness(v) => current.badness = v,
                AltElem::Score(v) => current.score = v,
            },
        }
    }
    alts.push(current);

    let mut supers: Vec<Symbol> = Vec::new();
    loop {
        let (sc, _) = p.expect_ident()?;
        supers.push(sc);
        if !p.eat(TokKind::Comma) {
            break;
        }
    }

    // synthesized match object carrying the production's properties
    let match_name = p.cc.anon_name("gramMatch");
    let match_obj = ObjectSym {
        obj_id: p.cc.alloc_obj_id(),
        superclasses: supers,
        dict: p.cc.cur_dict,
        ..ObjectSym::default()
    };
    let match_sym = p
        .cc
        .syms
        .add_detached(SymEntry::new(match_name, tok.loc, SymKind::Object(match_obj)));
    p.cc.syms.entry_mut(match_sym).referenced = true;

    let mut props: Vec<PropDef<'_>> = Vec::new();
    crate::parser::object::parse_object_props(p, match_sym, false, &mut props)?;
    p.module.items.push(TopItem::Object(ObjectDef {
        sym: match_sym,
        props,
        loc: tok.loc,
    }));

    let cur_dict = p.cc.cur_dict;
    if let Some(obj) = p.cc.syms.entry_mut(prod).as_object_mut() {
        for mut alt in alts {
            alt.processor = Some(match_name);
            alt.dict = cur_dict;
            obj.gram_alts.push(alt);
        }
    }
    p.cc.syms.entry_mut(prod).referenced = true;
    p.module.items.push(TopItem::Grammar {
        sym: prod,
        loc: tok.loc,
    });
    Ok(())
}

/// One element of an alternative: a matchable token, or a `[badness n]` /
/// `[score n]` annotation that adjusts the whole alternative.
enum AltElem {
    Tok(GramTok),
    Badness(i32),
    Score(i32),
}

/// One token of an alternative: literal, part-of-speech, token-type enum,
/// sub-production, `*`, a `( p1 | p2 )` part-of-speech set, or a
/// `[badness n]` / `[score n]` annotation. `->prop` may follow.
fn parse_gram_token(p: &mut Parser<'_, '_>) -> ParseResult<AltElem> {
    let kind = match p.kind() {
        TokKind::SStr(s) => {
            p.advance();
            GramTokKind::Literal(s)
        }
        TokKind::Star => {
            p.advance();
            GramTokKind::Star
        }
        TokKind::LBracket => {
            p.advance();
            let (what, wtok) = p.expect_ident()?;
            let value = match p.kind() {
                TokKind::Int(v) => {
                    p.advance();
                    v
                }
                _ => {
                    p.error_here("expected a number in grammar annotation".into());
                    0
                }
            };
            p.expect(TokKind::RBracket)?;
            let text = p.cc.interner.resolve(what).to_string();
            match text.as_str() {
                "badness" => return Ok(AltElem::Badness(value)),
                "score" => return Ok(AltElem::Score(value)),
                _ => {
                    p.cc.log.error(
                        wtok.loc,
                        wtok.span,
                        format!("unknown grammar annotation \"{}\"", text),
                    );
                    return Err(Recover);
                }
            }
        }
        TokKind::LParen => {
            // `( p1 | p2 | ... )` set of parts of speech
            p.advance();
            let mut set: Vec<Symbol> = Vec::new();
            loop {
                let (name, ntok) = p.expect_ident()?;
                set.push(classify_pos(p, name, ntok.loc, ntok.span));
                if !p.eat(TokKind::Or) {
                    break;
                }
            }
            p.expect(TokKind::RParen)?;
            GramTokKind::PartOfSpeechList(set)
        }
        TokKind::Ident(name) => {
            let tok = p.advance();
            classify_gram_ident(p, name, tok.loc)
        }
        _ => {
            let found = p.kind().describe(&p.cc.interner);
            p.error_here(format!("unexpected \"{}\" in grammar rule", found));
            return Err(Recover);
        }
    };
    let target_prop = if p.eat(TokKind::Arrow) {
        let (prop, ptok) = p.expect_ident()?;
        let cc = &mut *p.cc;
        cc.syms.find_or_def(
            prop,
            DefPolicy::AddPropNoWarn,
            ptok.loc,
            ptok.span,
            &cc.interner,
            &mut cc.log,
        );
        Some(prop)
    } else {
        None
    };
    Ok(AltElem::Tok(GramTok { kind, target_prop }))
}

/// Classify an identifier inside an alternative: a grammar production, a
/// token-type enum, or a dictionary part-of-speech property. An unknown
/// name implicitly creates the production, matching the language's
/// forward-reference convention for rules.
fn classify_gram_ident(p: &mut Parser<'_, '_>, name: Symbol, loc: SourceLoc) -> GramTokKind {
    enum Class {
        Prod,
        TokType,
        Pos,
        Other,
    }
    match p.cc.syms.find_noref(name) {
        Some(id) => {
            let class = match &p.cc.syms.entry(id).kind {
                SymKind::Object(o) if o.metaclass == Metaclass::GrammarProd => Class::Prod,
                SymKind::Enum(e) if e.is_token => Class::TokType,
                SymKind::Property(_) => Class::Pos,
                _ => Class::Other,
            };
            match class {
                Class::Prod => {
                    p.cc.syms.entry_mut(id).referenced = true;
                    GramTokKind::SubProd(name)
                }
                Class::TokType => {
                    p.cc.syms.entry_mut(id).referenced = true;
                    GramTokKind::TokenType(name)
                }
                Class::Pos => {
                    p.cc.syms.entry_mut(id).referenced = true;
                    GramTokKind::PartOfSpeech(name)
                }
                Class::Other => {
                    let text = p.cc.interner.resolve(name).to_string();
                    let kind = p.cc.syms.entry(id).kind.kind_name();
                    p.cc.log.error(
                        loc,
                        Span::default(),
                        format!("\"{}\" ({}) cannot appear in a grammar rule", text, kind),
                    );
                    GramTokKind::PartOfSpeech(name)
                }
            }
        }
        None => {
            ensure_production(p, name, loc);
            GramTokKind::SubProd(name)
        }
    }
}

fn classify_pos(p: &mut Parser<'_, '_>, name: Symbol, loc: SourceLoc, span: Span) -> Symbol {
    let cc = &mut *p.cc;
    cc.syms.find_or_def(
        name,
        DefPolicy::AddPropWeak,
        loc,
        span,
        &cc.interner,
        &mut cc.log,
    );
    name
}

/// Look up or implicitly define a grammar-production symbol.
pub(crate) fn ensure_production(p: &mut Parser<'_, '_>, name: Symbol, loc: SourceLoc) -> SymId {
    if let Some(id) = p.cc.syms.find_noref(name) {
        if let Some(obj) = p.cc.syms.entry(id).as_object() {
            if obj.metaclass == Metaclass::GrammarProd {
                return id;
            }
        }
        let text = p.cc.interner.resolve(name).to_string();
        let kind = p.cc.syms.entry(id).kind.kind_name();
        p.cc.log.error(
            loc,
            Span::default(),
            format!("\"{}\" is already defined as a {}", text, kind),
        );
        return id;
    }
    let obj = ObjectSym {
        obj_id: p.cc.alloc_obj_id(),
        metaclass: Metaclass::GrammarProd,
        dict: p.cc.cur_dict,
        ..ObjectSym::default()
    };
    p.cc
        .syms
        .define_global(name, loc, SymKind::Object(obj))
        .unwrap_or_else(|id| id)
}

/// `dictionary name;` or `dictionary property p1, p2, ...;`
pub(crate) fn parse_dictionary(p: &mut Parser<'_, '_>) -> ParseResult<()> {
    if p.eat(TokKind::Property) {
        loop {
            let (name, tok) = p.expect_ident()?;
            {
                let cc = &mut *p.cc;
                cc.syms.find_or_def(
                    name,
                    DefPolicy::AddPropWeak,
                    tok.loc,
                    tok.span,
                    &cc.interner,
                    &mut cc.log,
                );
            }
            p.cc.dict_props.insert(name);
            if !p.eat(TokKind::Comma) {
                break;
            }
        }
        p.parse_req_sem();
        return Ok(());
    }

    let (name, tok) = p.expect_ident()?;
    let obj = ObjectSym {
        obj_id: p.cc.alloc_obj_id(),
        metaclass: Metaclass::Dictionary,
        ..ObjectSym::default()
    };
    let sym = match p.cc.syms.define_global(name, tok.loc, SymKind::Object(obj)) {
        Ok(id) => id,
        Err(existing) => {
            let is_dict = p
                .cc
                .syms
                .entry(existing)
                .as_object()
                .map(|o| o.metaclass == Metaclass::Dictionary)
                .unwrap_or(false);
            if !is_dict {
                let text = p.cc.interner.resolve(name).to_string();
                p.cc.log.error(
                    tok.loc,
                    tok.span,
                    format!("\"{}\" is already defined and is not a dictionary", text),
                );
            }
            existing
        }
    };
    p.cc.syms.entry_mut(sym).referenced = true;
    p.cc.cur_dict = Some(sym);
    p.module.items.push(TopItem::Dictionary {
        sym,
        loc: tok.loc,
    });
    p.parse_req_sem();
    Ok(())
}

/// `enum [token] name1, name2, ...;`
pub(crate) fn parse_enum(p: &mut Parser<'_, '_>) -> ParseResult<()> {
    let loc = p.loc();
    let is_token = p.eat(TokKind::TokenKw);
    let mut syms: Vec<SymId> = Vec::new();
    loop {
        let (name, tok) = p.expect_ident()?;
        let enum_sym = EnumSym {
            enum_id: p.cc.alloc_enum_id(),
            is_token,
        };
        match p
            .cc
            .syms
            .define_global(name, tok.loc, SymKind::Enum(enum_sym))
        {
            Ok(id) => syms.push(id),
            Err(existing) => {
                if matches!(p.cc.syms.entry(existing).kind, SymKind::Enum(_)) {
                    // redeclaring an enum is harmless; token-ness merges
                    if is_token {
                        if let SymKind::Enum(e) = &mut p.cc.syms.entry_mut(existing).kind {
                            e.is_token = true;
                        }
                    }
                    syms.push(existing);
                } else {
                    let text = p.cc.interner.resolve(name).to_string();
                    let kind = p.cc.syms.entry(existing).kind.kind_name();
                    p.cc.log.error(
                        tok.loc,
                        tok.span,
                        format!("\"{}\" is already defined as a {}", text, kind),
                    );
                }
            }
        }
        if !p.eat(TokKind::Comma) {
            break;
        }
    }
    p.parse_req_sem();
    p.module.items.push(TopItem::Enum { syms, loc });
    Ok(())
}

/// `export name ['externalName'];`
pub(crate) fn parse_export(p: &mut Parser<'_, '_>) -> ParseResult<()> {
    let (name, tok) = p.expect_ident()?;
    let ext_name = match p.kind() {
        TokKind::SStr(s) => {
            p.advance();
            Some(s)
        }
        _ => None,
    };
    if let Some(id) = p.cc.syms.find_noref(name) {
        p.cc.syms.entry_mut(id).referenced = true;
    }
    p.module.items.push(TopItem::Export {
        sym: name,
        ext_name,
        loc: tok.loc,
    });
    p.parse_req_sem();
    Ok(())
}

/// `property p1, p2, ...;` declares property symbols explicitly.
pub(crate) fn parse_property_decl(p: &mut Parser<'_, '_>) -> ParseResult<()> {
    loop {
        let (name, tok) = p.expect_ident()?;
        let cc = &mut *p.cc;
        cc.syms.find_or_def(
            name,
            DefPolicy::AddPropNoWarn,
            tok.loc,
            tok.span,
            &cc.interner,
            &mut cc.log,
        );
        if !p.eat(TokKind::Comma) {
            break;
        }
    }
    p.parse_req_sem();
    Ok(())
}

/// `intrinsic 'set-id' { fn1(a, b); ... }` and
/// `intrinsic class Name 'class-id' : Super { props }`.
pub(crate) fn parse_intrinsic(p: &mut Parser<'_, '_>) -> ParseResult<()> {
    if p.eat(TokKind::Class) {
        return parse_intrinsic_class(p);
    }
    let func_set = match p.kind() {
        TokKind::SStr(s) => {
            p.advance();
            s
        }
        _ => {
            p.error_here("expected function-set name string after \"intrinsic\"".into());
            return Err(Recover);
        }
    };
    p.expect(TokKind::LBrace)?;
    let mut index: u16 = 0;
    while !p.check(TokKind::RBrace) && !p.check(TokKind::Eof) {
        let (name, tok) = p.expect_ident()?;
        let mut min_argc: u16 = 0;
        let mut varargs = false;
        if p.check(TokKind::LParen) {
            let (formals, va) = crate::parser::body::parse_formals_collect(p)?;
            min_argc = formals.len() as u16;
            varargs = va;
        }
        let bif = BifSym {
            func_set,
            index,
            min_argc,
            opt_argc: 0,
            varargs,
            has_retval: true,
        };
        if let Err(existing) = p
            .cc
            .syms
            .define_global(name, tok.loc, SymKind::Builtin(bif))
        {
            let text = p.cc.interner.resolve(name).to_string();
            let kind = p.cc.syms.entry(existing).kind.kind_name();
            p.cc.log.error(
                tok.loc,
                tok.span,
                format!("\"{}\" is already defined as a {}", text, kind),
            );
        }
        index += 1;
        p.parse_req_sem();
    }
    p.expect(TokKind::RBrace)?;
    p.eat(TokKind::Semi);
    Ok(())
}

fn parse_intrinsic_class(p: &mut Parser<'_, '_>) -> ParseResult<()> {
    let (name, tok) = p.expect_ident()?;
    match p.kind() {
        TokKind::SStr(_) => {
            p.advance();
        }
        _ => {
            p.error_here("expected metaclass name string".into());
            return Err(Recover);
        }
    }
    if p.eat(TokKind::Colon) {
        // superclass name recorded only for documentation; the metaclass
        // dependency table drives the runtime relationship
        p.expect_ident()?;
    }

    let meta_idx = p.cc.alloc_meta_idx();
    let class_obj_id = p.cc.alloc_obj_id();
    let mut props: Vec<MetaProp> = Vec::new();
    p.expect(TokKind::LBrace)?;
    while !p.check(TokKind::RBrace) && !p.check(TokKind::Eof) {
        let is_static = p.eat(TokKind::Static);
        let (pname, ptok) = p.expect_ident()?;
        {
            let cc = &mut *p.cc;
            cc.syms.find_or_def(
                pname,
                DefPolicy::AddPropNoWarn,
                ptok.loc,
                ptok.span,
                &cc.interner,
                &mut cc.log,
            );
        }
        props.push(MetaProp {
            prop: pname,
            is_static,
        });
        if p.check(TokKind::LParen) {
            crate::parser::body::parse_formals_collect(p)?;
        }
        p.parse_req_sem();
    }
    p.expect(TokKind::RBrace)?;
    p.eat(TokKind::Semi);

    let meta = MetaclassSym {
        meta_idx,
        class_obj_id,
        props,
        mod_obj: None,
    };
    if let Err(existing) = p
        .cc
        .syms
        .define_global(name, tok.loc, SymKind::Metaclass(meta))
    {
        let text = p.cc.interner.resolve(name).to_string();
        let kind = p.cc.syms.entry(existing).kind.kind_name();
        p.cc.log.error(
            tok.loc,
            tok.span,
            format!("\"{}\" is already defined as a {}", text, kind),
        );
    }
    Ok(())
}
