//! Link-time object-file loading and merging.
//!
//! The linker keeps per-module translation from module-local object,
//! property, and enum ids to globally-assigned ids, merges extern
//! references onto their definitions, and chains `modify` overlays.
//! Unreadable input aborts the link; symbol conflicts are logged and the
//! link continues so every conflict gets reported.

use crate::diag::ErrorLog;
use crate::intern::{Interner, Symbol};
use crate::objfile::{ByteReader, LinkError, FLAG_SYMBOL_FILE, OBJFILE_VERSION};
use crate::scope::SymbolTable;
use crate::symbol::{
    BifSym, EnumSym, FuncSym, GramAlt, GramTok, GramTokKind, MetaProp, Metaclass, MetaclassSym,
    ObjectSym, PropSym, SymEntry, SymId, SymKind, VocabWord,
};
use crate::token::{SourceLoc, Span};
use std::collections::HashMap;

pub struct Linker {
    pub interner: Interner,
    pub log: ErrorLog,
    pub syms: SymbolTable,
    next_obj_id: u32,
    next_enum_id: u32,
    modules_loaded: usize,
}

impl Linker {
    pub fn new() -> Self {
        let mut syms = SymbolTable::new();
        syms.set_next_prop_id(1);
        Linker {
            interner: Interner::new(),
            log: ErrorLog::new(),
            syms,
            next_obj_id: 1,
            next_enum_id: 1,
            modules_loaded: 0,
        }
    }

    pub fn modules_loaded(&self) -> usize {
        self.modules_loaded
    }

    fn err(&mut self, message: String) {
        self.log
            .error(SourceLoc::default(), Span::default(), message);
    }

    fn alloc_obj_id(&mut self) -> u32 {
        let id = self.next_obj_id;
        self.next_obj_id += 1;
        id
    }

    fn alloc_enum_id(&mut self) -> u32 {
        let id = self.next_enum_id;
        self.next_enum_id += 1;
        id
    }

    /// Load one object or symbol file into the link state.
    pub fn load_module(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let mut r = ByteReader::new(bytes);
        let _next_obj = r.u32()?;
        let _next_prop = r.u32()?;
        let _next_enum = r.u32()?;
        let flags = r.u16()?;
        let version = flags >> 8;
        if version != OBJFILE_VERSION {
            return Err(LinkError::Version(version));
        }
        let is_symbol_file = flags & FLAG_SYMBOL_FILE != 0;

        let count = r.u32()? as usize;
        if count > bytes.len() {
            return Err(LinkError::BadRecord("symbol count exceeds file size".into()));
        }

        // pass 1: read the raw records
        let mut raw: Vec<SymEntry> = Vec::with_capacity(count);
        for _ in 0..count {
            let entry = self.read_symbol(&mut r)?;
            raw.push(entry);
        }

        // local property id -> name, for decoding vocabulary records
        let mut local_props: HashMap<u32, Symbol> = HashMap::new();
        for entry in &raw {
            if let SymKind::Property(p) = &entry.kind {
                local_props.insert(p.prop_id, entry.name);
            }
        }

        // pass 2: merge into the global table
        let mut file_map: Vec<SymId> = Vec::with_capacity(count);
        for entry in raw {
            let id = self.merge_symbol(entry);
            file_map.push(id);
        }

        if is_symbol_file {
            self.modules_loaded += 1;
            return Ok(());
        }

        self.read_xrefs(&mut r, &file_map, &local_props)?;
        self.read_dicts(&mut r, &file_map)?;
        self.read_grammar(&mut r, &file_map)?;
        self.read_fixups(&mut r, &file_map)?;

        self.modules_loaded += 1;
        Ok(())
    }

    /// End-of-link check: anything still external or undefined is an
    /// error, except multi-method base placeholders.
    pub fn finish(&mut self) {
        let ids: Vec<SymId> = self.syms.globals().collect();
        for id in ids {
            let entry = self.syms.entry(id);
            let name = self.interner.resolve(entry.name).to_string();
            match &entry.kind {
                SymKind::Undef => {
                    self.err(format!("undefined symbol \"{}\"", name));
                }
                SymKind::Object(o) if o.is_extern => {
                    self.err(format!("unresolved external object \"{}\"", name));
                }
                SymKind::Func(f) if f.is_extern && !f.is_mm_base => {
                    self.err(format!("unresolved external function \"{}\"", name));
                }
                _ => {}
            }
        }
    }

    // ---- record reading ----

    /// Intern a name from a record. Synthesized symbols (grammar match
    /// objects, anonymous objects; their names contain `#`, which cannot
    /// lex as an identifier) are module-local: they get a per-module
    /// suffix so same-named synthetics from different modules never
    /// collide.
    fn local_name(&mut self, text: &str) -> Symbol {
        if text.contains('#') {
            let unique = format!("{}@{}", text, self.modules_loaded);
            self.interner.intern(&unique)
        } else {
            self.interner.intern(text)
        }
    }

    fn read_symbol(&mut self, r: &mut ByteReader<'_>) -> Result<SymEntry, LinkError> {
        let tag = r.u16()?;
        let name_text = r.str16()?;
        let name = self.local_name(&name_text);
        let kind = match tag {
            1 => SymKind::Object(self.read_object(r)?),
            2 => {
                let prop_id = r.u32()?;
                let weak = r.u8()? != 0;
                SymKind::Property(PropSym { prop_id, weak })
            }
            3 => SymKind::Func(self.read_func(r)?),
            4 => {
                let enum_id = r.u32()?;
                let is_token = r.u8()? != 0;
                SymKind::Enum(EnumSym { enum_id, is_token })
            }
            7 => {
                let meta_idx = r.u16()?;
                let class_obj_id = r.u32()?;
                let prop_count = r.u16()? as usize;
                let mut props = Vec::with_capacity(prop_count);
                for _ in 0..prop_count {
                    let pname = r.str16()?;
                    let prop = self.interner.intern(&pname);
                    let is_static = r.u8()? != 0;
                    props.push(MetaProp { prop, is_static });
                }
                SymKind::Metaclass(MetaclassSym {
                    meta_idx,
                    class_obj_id,
                    props,
                    mod_obj: None,
                })
            }
            8 => {
                let set = r.str16()?;
                let func_set = self.interner.intern(&set);
                let index = r.u16()?;
                let min_argc = r.u16()?;
                let opt_argc = r.u16()?;
                let flags = r.u8()?;
                SymKind::Builtin(BifSym {
                    func_set,
                    index,
                    min_argc,
                    opt_argc,
                    varargs: flags & 1 != 0,
                    has_retval: flags & 2 != 0,
                })
            }
            9 => SymKind::Undef,
            other => {
                return Err(LinkError::BadRecord(format!(
                    "unknown symbol kind tag {}",
                    other
                )))
            }
        };
        Ok(SymEntry::new(name, SourceLoc::default(), kind))
    }

    fn read_object(&mut self, r: &mut ByteReader<'_>) -> Result<ObjectSym, LinkError> {
        let obj_id = r.u32()?;
        let metaclass = match r.u8()? {
            0 => Metaclass::TadsObject,
            1 => Metaclass::Dictionary,
            2 => Metaclass::GrammarProd,
            3 => Metaclass::IntrinsicClassMod,
            other => {
                return Err(LinkError::BadRecord(format!(
                    "unknown metaclass tag {}",
                    other
                )))
            }
        };
        let flags = r.u8()?;
        let sc_count = r.u16()? as usize;
        let mut superclasses = Vec::with_capacity(sc_count);
        for _ in 0..sc_count {
            let sc = r.str16()?;
            superclasses.push(self.interner.intern(&sc));
        }
        let mut obj = ObjectSym {
            obj_id,
            metaclass,
            superclasses,
            is_class: flags & (1 << 0) != 0,
            transient: flags & (1 << 1) != 0,
            is_extern: flags & (1 << 2) != 0,
            modified: flags & (1 << 3) != 0,
            ext_modify: flags & (1 << 4) != 0,
            ext_replace: flags & (1 << 5) != 0,
            ..ObjectSym::default()
        };
        if r.u8()? != 0 {
            let dict_name = r.str16()?;
            // the dictionary backlink is by name; it resolves to the
            // merged dictionary symbol lazily
            let _ = self.interner.intern(&dict_name);
        }
        if r.u8()? != 0 {
            // modify-base chain, written bottom-up: rebuild as detached
            // pool entries
            let base = self.read_symbol(r)?;
            let base_id = self.merge_detached(base);
            obj.mod_base = Some(base_id);
        }
        Ok(obj)
    }

    fn read_func(&mut self, r: &mut ByteReader<'_>) -> Result<FuncSym, LinkError> {
        let argc = r.u16()?;
        let opt_argc = r.u16()?;
        let flags = r.u8()?;
        let code_ofs = r.u32()?;
        let mut func = FuncSym {
            argc,
            opt_argc,
            varargs: flags & (1 << 0) != 0,
            has_retval: flags & (1 << 1) != 0,
            is_multimethod: flags & (1 << 2) != 0,
            is_mm_base: flags & (1 << 3) != 0,
            is_extern: flags & (1 << 4) != 0,
            ext_replace: flags & (1 << 5) != 0,
            defined: flags & (1 << 6) != 0,
            code_ofs,
            ..FuncSym::default()
        };
        if r.u8()? != 0 {
            let base = self.read_symbol(r)?;
            let base_id = self.merge_detached(base);
            func.mod_base = Some(base_id);
        }
        Ok(func)
    }

    // ---- merging ----

    fn merge_detached(&mut self, mut entry: SymEntry) -> SymId {
        self.translate_ids(&mut entry.kind);
        self.syms.add_detached(entry)
    }

    /// Assign fresh global ids to a newly-defined symbol's module-local
    /// ids.
    fn translate_ids(&mut self, kind: &mut SymKind) {
        match kind {
            SymKind::Object(o) => {
                if !o.is_extern {
                    o.obj_id = self.alloc_obj_id();
                }
            }
            SymKind::Property(p) => {
                p.prop_id = self.syms.alloc_prop_id();
            }
            SymKind::Enum(e) => {
                e.enum_id = self.alloc_enum_id();
            }
            _ => {}
        }
    }

    fn merge_symbol(&mut self, mut entry: SymEntry) -> SymId {
        let name = entry.name;
        let existing = match self.syms.find_noref(name) {
            None => {
                self.translate_ids(&mut entry.kind);
                let kind = entry.kind.clone();
                return self
                    .syms
                    .define_global(name, entry.loc, kind)
                    .unwrap_or_else(|id| id);
            }
            Some(id) => id,
        };

        let name_text = self.interner.resolve(name).to_string();
        let old_kind_name = self.syms.entry(existing).kind.kind_name();

        match (&self.syms.entry(existing).kind.clone(), &mut entry.kind) {
            // a forward reference resolves to whatever defines it
            (SymKind::Undef, incoming) => {
                self.translate_ids(incoming);
                let kind = incoming.clone();
                self.syms.entry_mut(existing).kind = kind;
            }
            (_, SymKind::Undef) => {
                // incoming import; the existing definition satisfies it
                self.syms.entry_mut(existing).referenced = true;
            }

            (SymKind::Object(old), SymKind::Object(incoming)) => {
                if incoming.is_extern {
                    // import satisfied by the existing entry (defined or
                    // itself still extern)
                    self.syms.entry_mut(existing).referenced = true;
                } else if old.is_extern {
                    let mut new_obj = incoming.clone();
                    new_obj.obj_id = self.alloc_obj_id();
                    self.syms.entry_mut(existing).kind = SymKind::Object(new_obj);
                } else if incoming.ext_replace {
                    let mut new_obj = incoming.clone();
                    new_obj.obj_id = self.alloc_obj_id();
                    self.syms.entry_mut(existing).kind = SymKind::Object(new_obj);
                } else if incoming.ext_modify {
                    // chain the overlay: the old definition moves to a
                    // detached base entry
                    let base = SymEntry::new(name, self.syms.entry(existing).loc, {
                        let mut o = old.clone();
                        o.modified = true;
                        SymKind::Object(o)
                    });
                    let base_id = self.syms.add_detached(base);
                    let mut new_obj = incoming.clone();
                    new_obj.obj_id = self.alloc_obj_id();
                    new_obj.mod_base = Some(base_id);
                    self.syms.entry_mut(existing).kind = SymKind::Object(new_obj);
                } else if old.metaclass != incoming.metaclass {
                    self.err(format!(
                        "\"{}\": metaclass mismatch between modules",
                        name_text
                    ));
                } else if old.metaclass == Metaclass::Dictionary
                    || old.metaclass == Metaclass::GrammarProd
                {
                    // dictionaries and productions merge across modules
                    self.syms.entry_mut(existing).referenced = true;
                } else {
                    self.err(format!("duplicate definition of object \"{}\"", name_text));
                }
            }

            (SymKind::Func(old), SymKind::Func(incoming)) => {
                if incoming.is_mm_base || old.is_mm_base {
                    // shared multi-method placeholder: merge silently
                    if let Some(f) = self.syms.entry_mut(existing).as_func_mut() {
                        f.is_mm_base = true;
                    }
                } else if incoming.is_extern {
                    self.syms.entry_mut(existing).referenced = true;
                } else if old.is_extern || incoming.ext_replace {
                    self.syms.entry_mut(existing).kind = SymKind::Func(incoming.clone());
                } else if old.defined && incoming.defined {
                    self.err(format!(
                        "duplicate definition of function \"{}\"",
                        name_text
                    ));
                } else {
                    self.syms.entry_mut(existing).kind = SymKind::Func(incoming.clone());
                }
            }

            (SymKind::Property(_), SymKind::Property(_)) => {
                // properties unify by name; the first module's global id
                // stands for everyone
                self.syms.entry_mut(existing).referenced = true;
            }

            (SymKind::Enum(old), SymKind::Enum(incoming)) => {
                if incoming.is_token && !old.is_token {
                    if let SymKind::Enum(e) = &mut self.syms.entry_mut(existing).kind {
                        e.is_token = true;
                    }
                }
            }

            (SymKind::Metaclass(_), SymKind::Metaclass(_))
            | (SymKind::Builtin(_), SymKind::Builtin(_)) => {
                self.syms.entry_mut(existing).referenced = true;
            }

            _ => {
                self.err(format!(
                    "\"{}\" is defined as a {} in one module and a {} in another",
                    name_text,
                    old_kind_name,
                    entry.kind.kind_name()
                ));
            }
        }
        existing
    }

    // ---- section reading ----

    fn map_idx(&self, file_map: &[SymId], idx: u32) -> Result<SymId, LinkError> {
        file_map
            .get(idx as usize)
            .copied()
            .ok_or_else(|| LinkError::BadRecord(format!("symbol index {} out of range", idx)))
    }

    fn read_xrefs(
        &mut self,
        r: &mut ByteReader<'_>,
        file_map: &[SymId],
        local_props: &HashMap<u32, Symbol>,
    ) -> Result<(), LinkError> {
        let count = r.u32()?;
        let _len = r.u32()?;
        for _ in 0..count {
            let idx = r.u32()?;
            let id = self.map_idx(file_map, idx)?;
            let sc_count = r.u16()? as usize;
            for _ in 0..sc_count {
                let sc_idx = r.u32()?;
                self.map_idx(file_map, sc_idx)?;
            }
            let vocab_count = r.u16()? as usize;
            for _ in 0..vocab_count {
                let word_text = r.str16()?;
                let word = self.interner.intern_folded(&word_text);
                let prop_id = r.u16()? as u32;
                let prop = local_props.get(&prop_id).copied().unwrap_or(Symbol::EMPTY);
                if let Some(obj) = self.syms.entry_mut(id).as_object_mut() {
                    if !obj.vocab.iter().any(|v| v.word == word && v.prop == prop) {
                        obj.vocab.push(VocabWord { word, prop });
                    }
                }
            }
        }
        Ok(())
    }

    fn read_dicts(&mut self, r: &mut ByteReader<'_>, file_map: &[SymId]) -> Result<(), LinkError> {
        let count = r.u32()?;
        let _len = r.u32()?;
        for _ in 0..count {
            let idx = r.u32()?;
            let dict_id = self.map_idx(file_map, idx)?;
            let word_count = r.u32()?;
            for _ in 0..word_count {
                let word_text = r.str16()?;
                let word = self.interner.intern_folded(&word_text);
                let pair_count = r.u16()? as usize;
                let mut pairs: Vec<(Symbol, Symbol)> = Vec::with_capacity(pair_count);
                for _ in 0..pair_count {
                    let oi = r.u32()?;
                    let pi = r.u32()?;
                    let obj = self.map_idx(file_map, oi)?;
                    let prop = self.map_idx(file_map, pi)?;
                    pairs.push((self.syms.entry(obj).name, self.syms.entry(prop).name));
                }
                if let Some(d) = self.syms.entry_mut(dict_id).as_object_mut() {
                    let slot = d.dict_words.entry(word).or_default();
                    for pair in pairs {
                        if !slot.contains(&pair) {
                            slot.push(pair);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn read_grammar(
        &mut self,
        r: &mut ByteReader<'_>,
        file_map: &[SymId],
    ) -> Result<(), LinkError> {
        let count = r.u32()?;
        let _len = r.u32()?;
        for _ in 0..count {
            let idx = r.u32()?;
            let prod_id = self.map_idx(file_map, idx)?;
            let alt_count = r.u32()?;
            for _ in 0..alt_count {
                let score = r.i32()?;
                let badness = r.i32()?;
                let tag = if r.u8()? != 0 {
                    let t = r.str16()?;
                    Some(self.interner.intern(&t))
                } else {
                    None
                };
                let processor = if r.u8()? != 0 {
                    let t = r.str16()?;
                    Some(self.local_name(&t))
                } else {
                    None
                };
                let tok_count = r.u16()? as usize;
                let mut toks = Vec::with_capacity(tok_count);
                for _ in 0..tok_count {
                    let kind = match r.u8()? {
                        0 => {
                            let s = r.str16()?;
                            GramTokKind::Literal(self.interner.intern(&s))
                        }
                        1 => {
                            let s = r.str16()?;
                            GramTokKind::PartOfSpeech(self.interner.intern(&s))
                        }
                        2 => {
                            let n = r.u16()? as usize;
                            let mut list = Vec::with_capacity(n);
                            for _ in 0..n {
                                let s = r.str16()?;
                                list.push(self.interner.intern(&s));
                            }
                            GramTokKind::PartOfSpeechList(list)
                        }
                        3 => {
                            let s = r.str16()?;
                            GramTokKind::TokenType(self.interner.intern(&s))
                        }
                        4 => {
                            let s = r.str16()?;
                            GramTokKind::SubProd(self.interner.intern(&s))
                        }
                        5 => GramTokKind::Star,
                        other => {
                            return Err(LinkError::BadRecord(format!(
                                "unknown grammar token tag {}",
                                other
                            )))
                        }
                    };
                    let target_prop = if r.u8()? != 0 {
                        let s = r.str16()?;
                        Some(self.interner.intern(&s))
                    } else {
                        None
                    };
                    toks.push(GramTok { kind, target_prop });
                }
                if let Some(obj) = self.syms.entry_mut(prod_id).as_object_mut() {
                    obj.gram_alts.push(GramAlt {
                        score,
                        badness,
                        toks,
                        processor,
                        dict: None,
                        tag,
                    });
                }
            }
        }
        Ok(())
    }

    fn read_fixups(&mut self, r: &mut ByteReader<'_>, file_map: &[SymId]) -> Result<(), LinkError> {
        let count = r.u32()?;
        let _len = r.u32()?;
        for _ in 0..count {
            let idx = r.u32()?;
            let id = self.map_idx(file_map, idx)?;
            let n = r.u32()?;
            let mut offsets = Vec::with_capacity(n as usize);
            for _ in 0..n {
                offsets.push(r.u32()?);
            }
            match &mut self.syms.entry_mut(id).kind {
                SymKind::Object(o) => o.fixups.extend(offsets),
                SymKind::Func(f) => f.fixups.extend(offsets),
                _ => {
                    return Err(LinkError::BadRecord(
                        "fixup list attached to a non-code symbol".into(),
                    ))
                }
            }
        }
        Ok(())
    }
}

impl Default for Linker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_file_aborts() {
        let mut linker = Linker::new();
        assert_eq!(linker.load_module(&[1, 2, 3]), Err(LinkError::Truncated));
    }

    #[test]
    fn version_mismatch_aborts() {
        let mut w = crate::objfile::ByteWriter::new();
        w.u32(1);
        w.u32(1);
        w.u32(1);
        w.u16(99 << 8);
        let mut linker = Linker::new();
        assert_eq!(
            linker.load_module(&w.into_bytes()),
            Err(LinkError::Version(99))
        );
    }

    #[test]
    fn absurd_symbol_count_is_rejected() {
        let mut w = crate::objfile::ByteWriter::new();
        w.u32(1);
        w.u32(1);
        w.u32(1);
        w.u16(crate::objfile::OBJFILE_VERSION << 8);
        w.u32(u32::MAX);
        let mut linker = Linker::new();
        assert!(matches!(
            linker.load_module(&w.into_bytes()),
            Err(LinkError::BadRecord(_))
        ));
    }
}
