//! Object-file and symbol-file serialization.
//!
//! Symbols are enumerated in pool order through one generic record header
//! (kind tag, name) followed by a kind-specific payload, mirroring the
//! section layout described in the format notes in `objfile`.

use crate::compile::CompilerContext;
use crate::intern::Symbol;
use crate::objfile::{ByteWriter, FLAG_DEBUG, FLAG_SYMBOL_FILE, OBJFILE_VERSION};
use crate::symbol::{
    GramTokKind, Metaclass, ObjectSym, SymEntry, SymId, SymKind,
};
use std::collections::HashMap;

/// Symbols that appear in an object file: everything global plus detached
/// synthesized objects that something references. Locals and labels never
/// leave their code body.
fn writable(cc: &CompilerContext, id: SymId) -> bool {
    let entry = cc.syms.entry(id);
    if matches!(entry.kind, SymKind::Local(_) | SymKind::Label(_)) {
        return false;
    }
    cc.syms.is_global(id) || entry.referenced
}

struct SymIndex {
    ids: Vec<SymId>,
    index_of: HashMap<SymId, u32>,
    /// Names referenced by records (superclasses, dictionary pairs) that
    /// have no symbol entry of their own; appended as `Undef` records.
    extra_names: Vec<Symbol>,
    extra_index: HashMap<Symbol, u32>,
}

impl SymIndex {
    fn build(cc: &CompilerContext) -> Self {
        let ids: Vec<SymId> = cc.syms.all_ids().filter(|&id| writable(cc, id)).collect();
        let index_of = ids
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i as u32))
            .collect();
        SymIndex {
            ids,
            index_of,
            extra_names: Vec::new(),
            extra_index: HashMap::new(),
        }
    }

    /// Index for a referenced name; allocates a trailing `Undef` record
    /// when the name has no entry in the table.
    fn index_for_name(&mut self, cc: &CompilerContext, name: Symbol) -> u32 {
        if let Some(id) = cc.syms.find_noref(name) {
            if let Some(&idx) = self.index_of.get(&id) {
                return idx;
            }
        }
        if let Some(&idx) = self.extra_index.get(&name) {
            return idx;
        }
        let idx = (self.ids.len() + self.extra_names.len()) as u32;
        self.extra_names.push(name);
        self.extra_index.insert(name, idx);
        idx
    }
}

fn object_flags(o: &ObjectSym, force_extern: bool) -> u8 {
    let mut f = 0u8;
    if o.is_class {
        f |= 1 << 0;
    }
    if o.transient {
        f |= 1 << 1;
    }
    if o.is_extern || force_extern {
        f |= 1 << 2;
    }
    if o.modified {
        f |= 1 << 3;
    }
    if o.ext_modify {
        f |= 1 << 4;
    }
    if o.ext_replace {
        f |= 1 << 5;
    }
    f
}

fn metaclass_tag(m: Metaclass) -> u8 {
    match m {
        Metaclass::TadsObject => 0,
        Metaclass::Dictionary => 1,
        Metaclass::GrammarProd => 2,
        Metaclass::IntrinsicClassMod => 3,
    }
}

/// One symbol record: kind tag, name, kind-specific payload. The
/// modify-base chain is written inline, bottom-up, so the loader can
/// rebuild the overlay stack without forward references.
fn write_symbol(w: &mut ByteWriter, cc: &CompilerContext, entry: &SymEntry, force_extern: bool) {
    w.u16(entry.kind.tag());
    w.str16(cc.interner.resolve(entry.name));
    match &entry.kind {
        SymKind::Object(o) => {
            w.u32(o.obj_id);
            w.u8(metaclass_tag(o.metaclass));
            w.u8(object_flags(o, force_extern));
            w.u16(o.superclasses.len() as u16);
            for sc in &o.superclasses {
                w.str16(cc.interner.resolve(*sc));
            }
            match o.dict {
                Some(d) => {
                    w.u8(1);
                    w.str16(cc.interner.resolve(cc.syms.entry(d).name));
                }
                None => w.u8(0),
            }
            match o.mod_base {
                Some(base) => {
                    w.u8(1);
                    write_symbol(w, cc, cc.syms.entry(base), force_extern);
                }
                None => w.u8(0),
            }
        }
        SymKind::Property(p) => {
            w.u32(p.prop_id);
            w.u8(p.weak as u8);
        }
        SymKind::Func(f) => {
            w.u16(f.argc);
            w.u16(f.opt_argc);
            let mut flags = 0u8;
            if f.varargs {
                flags |= 1 << 0;
            }
            if f.has_retval {
                flags |= 1 << 1;
            }
            if f.is_multimethod {
                flags |= 1 << 2;
            }
            if f.is_mm_base {
                flags |= 1 << 3;
            }
            if f.is_extern || force_extern {
                flags |= 1 << 4;
            }
            if f.ext_replace {
                flags |= 1 << 5;
            }
            if f.defined && !force_extern {
                flags |= 1 << 6;
            }
            w.u8(flags);
            w.u32(f.code_ofs);
            match f.mod_base {
                Some(base) => {
                    w.u8(1);
                    write_symbol(w, cc, cc.syms.entry(base), force_extern);
                }
                None => w.u8(0),
            }
        }
        SymKind::Enum(e) => {
            w.u32(e.enum_id);
            w.u8(e.is_token as u8);
        }
        SymKind::Metaclass(m) => {
            w.u16(m.meta_idx);
            w.u32(m.class_obj_id);
            w.u16(m.props.len() as u16);
            for p in &m.props {
                w.str16(cc.interner.resolve(p.prop));
                w.u8(p.is_static as u8);
            }
        }
        SymKind::Builtin(b) => {
            w.str16(cc.interner.resolve(b.func_set));
            w.u16(b.index);
            w.u16(b.min_argc);
            w.u16(b.opt_argc);
            let mut flags = 0u8;
            if b.varargs {
                flags |= 1 << 0;
            }
            if b.has_retval {
                flags |= 1 << 1;
            }
            w.u8(flags);
        }
        SymKind::Undef => {}
        SymKind::Local(_) | SymKind::Label(_) => unreachable!("locals are never serialized"),
    }
}

fn write_header(w: &mut ByteWriter, cc: &CompilerContext, flags: u16) {
    w.u32(cc.next_obj_id);
    w.u32(cc.syms.next_prop_id());
    w.u32(cc.next_enum_id);
    let mut flags = flags | (OBJFILE_VERSION << 8);
    if cc.options.debug {
        flags |= FLAG_DEBUG;
    }
    w.u16(flags);
}

/// Serialize the per-module object file. Everything the file records
/// lives in the symbol table by the time the parse finishes, so the
/// writer enumerates the pool in index order.
pub fn write_object_file(cc: &CompilerContext) -> Vec<u8> {
    let mut index = SymIndex::build(cc);
    let mut w = ByteWriter::new();
    write_header(&mut w, cc, 0);

    // ---- cross-reference and table sections are assembled first so the
    // Undef records they mint land in the symbol table ----

    // object cross-references: superclasses and vocabulary
    let mut xrefs = ByteWriter::new();
    let mut xref_count = 0u32;
    for (i, &id) in index.ids.clone().iter().enumerate() {
        let entry = cc.syms.entry(id);
        let obj = match entry.as_object() {
            Some(o) if !o.is_extern => o,
            _ => continue,
        };
        xref_count += 1;
        xrefs.u32(i as u32);
        xrefs.u16(obj.superclasses.len() as u16);
        for sc in &obj.superclasses {
            let idx = index.index_for_name(cc, *sc);
            xrefs.u32(idx);
        }
        xrefs.u16(obj.vocab.len() as u16);
        for v in &obj.vocab {
            xrefs.str16(cc.interner.resolve(v.word));
            let prop_id = cc
                .syms
                .find_noref(v.prop)
                .and_then(|pid| cc.syms.entry(pid).as_prop())
                .map(|p| p.prop_id)
                .unwrap_or(0);
            xrefs.u16(prop_id as u16);
        }
    }

    // dictionaries (emitted before the objects that reference them in the
    // load order implied by section order)
    let mut dicts = ByteWriter::new();
    let mut dict_count = 0u32;
    for (i, &id) in index.ids.clone().iter().enumerate() {
        let entry = cc.syms.entry(id);
        let obj = match entry.as_object() {
            Some(o) if o.metaclass == Metaclass::Dictionary => o,
            _ => continue,
        };
        dict_count += 1;
        dicts.u32(i as u32);
        let mut words: Vec<(&str, &Vec<(Symbol, Symbol)>)> = obj
            .dict_words
            .iter()
            .map(|(w, pairs)| (cc.interner.resolve(*w), pairs))
            .collect();
        words.sort_by_key(|(w, _)| *w);
        dicts.u32(words.len() as u32);
        for (word, pairs) in words {
            dicts.str16(word);
            dicts.u16(pairs.len() as u16);
            for (obj_name, prop_name) in pairs {
                let oi = index.index_for_name(cc, *obj_name);
                let pi = index.index_for_name(cc, *prop_name);
                dicts.u32(oi);
                dicts.u32(pi);
            }
        }
    }

    // grammar productions and their alternatives
    let mut grams = ByteWriter::new();
    let mut gram_count = 0u32;
    for (i, &id) in index.ids.clone().iter().enumerate() {
        let entry = cc.syms.entry(id);
        let obj = match entry.as_object() {
            Some(o) if o.metaclass == Metaclass::GrammarProd => o,
            _ => continue,
        };
        gram_count += 1;
        grams.u32(i as u32);
        grams.u32(obj.gram_alts.len() as u32);
        for alt in &obj.gram_alts {
            grams.i32(alt.score);
            grams.i32(alt.badness);
            match alt.tag {
                Some(t) => {
                    grams.u8(1);
                    grams.str16(cc.interner.resolve(t));
                }
                None => grams.u8(0),
            }
            match alt.processor {
                Some(pr) => {
                    grams.u8(1);
                    grams.str16(cc.interner.resolve(pr));
                }
                None => grams.u8(0),
            }
            grams.u16(alt.toks.len() as u16);
            for tok in &alt.toks {
                match &tok.kind {
                    GramTokKind::Literal(s) => {
                        grams.u8(0);
                        grams.str16(cc.interner.resolve(*s));
                    }
                    GramTokKind::PartOfSpeech(s) => {
                        grams.u8(1);
                        grams.str16(cc.interner.resolve(*s));
                    }
                    GramTokKind::PartOfSpeechList(list) => {
                        grams.u8(2);
                        grams.u16(list.len() as u16);
                        for s in list {
                            grams.str16(cc.interner.resolve(*s));
                        }
                    }
                    GramTokKind::TokenType(s) => {
                        grams.u8(3);
                        grams.str16(cc.interner.resolve(*s));
                    }
                    GramTokKind::SubProd(s) => {
                        grams.u8(4);
                        grams.str16(cc.interner.resolve(*s));
                    }
                    GramTokKind::Star => grams.u8(5),
                }
                match tok.target_prop {
                    Some(tp) => {
                        grams.u8(1);
                        grams.str16(cc.interner.resolve(tp));
                    }
                    None => grams.u8(0),
                }
            }
        }
    }

    // fixup lists
    let mut fixups = ByteWriter::new();
    let mut fixup_count = 0u32;
    for (i, &id) in index.ids.clone().iter().enumerate() {
        let entry = cc.syms.entry(id);
        let offsets: &[u32] = match &entry.kind {
            SymKind::Object(o) if !o.fixups.is_empty() => &o.fixups,
            SymKind::Func(f) if !f.fixups.is_empty() => &f.fixups,
            _ => continue,
        };
        fixup_count += 1;
        fixups.u32(i as u32);
        fixups.u32(offsets.len() as u32);
        for &ofs in offsets {
            fixups.u32(ofs);
        }
    }

    // ---- symbol table: the pool records plus the minted Undef names ----
    let total = index.ids.len() + index.extra_names.len();
    w.u32(total as u32);
    for &id in &index.ids {
        write_symbol(&mut w, cc, cc.syms.entry(id), false);
    }
    for &name in &index.extra_names {
        w.u16(SymKind::Undef.tag());
        w.str16(cc.interner.resolve(name));
    }

    // ---- sections, each length-prefixed ----
    for (count, section) in [
        (xref_count, xrefs),
        (dict_count, dicts),
        (gram_count, grams),
        (fixup_count, fixups),
    ] {
        let bytes = section.into_bytes();
        w.u32(count);
        w.u32(bytes.len() as u32);
        w.bytes(&bytes);
    }

    w.into_bytes()
}

/// Serialize the export (symbol) file: the same record stream with every
/// symbol marked external and no cross-reference sections.
pub fn write_symbol_file(cc: &CompilerContext) -> Vec<u8> {
    let mut w = ByteWriter::new();
    write_header(&mut w, cc, FLAG_SYMBOL_FILE);
    let ids: Vec<SymId> = cc
        .syms
        .all_ids()
        .filter(|&id| writable(cc, id) && cc.syms.entry(id).is_exported())
        .collect();
    w.u32(ids.len() as u32);
    for id in ids {
        write_symbol(&mut w, cc, cc.syms.entry(id), true);
    }
    w.into_bytes()
}
