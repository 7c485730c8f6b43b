//! Symbol-table entries: one variant per symbol kind.
//!
//! Symbols live in a pool owned by the `SymbolTable` and are referred to by
//! `SymId` index. Cross-symbol references (modify-base chains, dictionary
//! backlinks, superclass lists) are stored as names or pool indices, never
//! as direct references, so the graph can be cyclic without ceremony.

use crate::intern::Symbol;
use crate::token::SourceLoc;
use serde::Serialize;
use std::collections::HashMap;

/// Index into the symbol pool.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct SymId(pub u32);

impl SymId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Runtime metaclass of an object symbol.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub enum Metaclass {
    TadsObject,
    Dictionary,
    GrammarProd,
    IntrinsicClassMod,
}

impl Default for Metaclass {
    fn default() -> Self {
        Metaclass::TadsObject
    }
}

/// One vocabulary association: a word and the part-of-speech property it
/// was defined under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VocabWord {
    pub word: Symbol,
    pub prop: Symbol,
}

/// Token kind a template slot matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateTok {
    SString,
    DString,
    Int,
    List,
    Object,
    /// `inherited` marker; expanded against superclass templates at
    /// match time.
    Inherited,
}

/// One slot of an object template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateItem {
    pub prop: Symbol,
    pub tok: TemplateTok,
    /// Set on every member of a `|` alternation group except the last.
    pub is_alt: bool,
    /// `?` suffix: the slot may be skipped.
    pub is_opt: bool,
}

/// An ordered object template: positional sugar for object headers.
#[derive(Debug, Clone, Default)]
pub struct ObjTemplate {
    pub items: Vec<TemplateItem>,
}

/// One token of a grammar-rule alternative.
#[derive(Debug, Clone)]
pub enum GramTokKind {
    /// Literal word that must appear in the input.
    Literal(Symbol),
    /// Dictionary part-of-speech property.
    PartOfSpeech(Symbol),
    /// Set of part-of-speech properties (`< p1 p2 ... >` style).
    PartOfSpeechList(Vec<Symbol>),
    /// Token-type enum match.
    TokenType(Symbol),
    /// Reference to another production.
    SubProd(Symbol),
    /// `*` free-floating remainder.
    Star,
}

#[derive(Debug, Clone)]
pub struct GramTok {
    pub kind: GramTokKind,
    /// `->prop` arrow: the property on the match object that receives the
    /// matching sub-phrase.
    pub target_prop: Option<Symbol>,
}

/// One alternative of a grammar production.
#[derive(Debug, Clone, Default)]
pub struct GramAlt {
    pub score: i32,
    pub badness: i32,
    pub toks: Vec<GramTok>,
    /// Processor (match) object for this alternative.
    pub processor: Option<Symbol>,
    /// Dictionary that was active when the alternative was defined.
    pub dict: Option<SymId>,
    /// Rule-set tag from `grammar name(tag):`; `modify grammar` and
    /// `replace grammar` address alternatives through it.
    pub tag: Option<Symbol>,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectSym {
    /// Module-local object id.
    pub obj_id: u32,
    pub metaclass: Metaclass,
    /// Superclass names, unresolved until link.
    pub superclasses: Vec<Symbol>,
    pub is_class: bool,
    pub transient: bool,
    pub is_extern: bool,
    /// Set once a `modify` has overlaid this symbol.
    pub modified: bool,
    /// `modify` applied to an imported (extern) object.
    pub ext_modify: bool,
    /// `replace` applied to an imported (extern) object.
    pub ext_replace: bool,
    /// Synthesized placeholder holding the pre-modification object; the
    /// chain of these forms the modify stack, bottom-up.
    pub mod_base: Option<SymId>,
    /// Words defined for this object, in definition order.
    pub vocab: Vec<VocabWord>,
    /// Templates declared directly for this class.
    pub templates: Vec<ObjTemplate>,
    /// Dictionary active when the object was defined.
    pub dict: Option<SymId>,
    /// Word table, for Dictionary-metaclass symbols: case-folded word ->
    /// (object name, property name) associations.
    pub dict_words: HashMap<Symbol, Vec<(Symbol, Symbol)>>,
    /// Alternatives, for GrammarProd-metaclass symbols.
    pub gram_alts: Vec<GramAlt>,
    /// Stream offsets containing this object's own id.
    pub fixups: Vec<u32>,
    /// Lexical parent for nested object definitions.
    pub lexical_parent: Option<SymId>,
}

#[derive(Debug, Clone, Default)]
pub struct PropSym {
    /// Module-local property id.
    pub prop_id: u32,
    /// Weak entries come from implicit definitions (dictionary property
    /// declarations and the like) and may be superseded without complaint.
    pub weak: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FuncSym {
    pub argc: u16,
    pub opt_argc: u16,
    pub varargs: bool,
    pub has_retval: bool,
    pub is_multimethod: bool,
    pub is_mm_base: bool,
    pub is_extern: bool,
    pub ext_replace: bool,
    pub mod_base: Option<SymId>,
    /// Stream offsets referring to this function.
    pub fixups: Vec<u32>,
    /// Anchor offset of the code body in the module's code stream.
    pub code_ofs: u32,
    pub defined: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EnumSym {
    pub enum_id: u32,
    /// Declared with `enum token`: usable as a grammar token type.
    pub is_token: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LocalSym {
    /// Stack frame slot.
    pub slot: u32,
    pub is_param: bool,
    /// Value has been read somewhere.
    pub val_used: bool,
    /// Value has been assigned somewhere (params count as assigned).
    pub val_assigned: bool,
    /// Index in the shared context object, once the local has been
    /// promoted for closure capture.
    pub ctx_idx: Option<u16>,
    /// True for the inner-scope copy of a captured local; the original
    /// symbol owns the diagnostics.
    pub is_ctx_copy: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LabelSym {
    pub defined: bool,
    pub referenced: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct MetaProp {
    pub prop: Symbol,
    pub is_static: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MetaclassSym {
    /// Index in the image-file metaclass dependency table.
    pub meta_idx: u16,
    /// IntrinsicClass object id representing the metaclass.
    pub class_obj_id: u32,
    pub props: Vec<MetaProp>,
    /// Head of the modifier-object chain.
    pub mod_obj: Option<SymId>,
}

#[derive(Debug, Clone, Default)]
pub struct BifSym {
    pub func_set: Symbol,
    pub index: u16,
    pub min_argc: u16,
    pub opt_argc: u16,
    pub varargs: bool,
    pub has_retval: bool,
}

#[derive(Debug, Clone)]
pub enum SymKind {
    Object(ObjectSym),
    Property(PropSym),
    Func(FuncSym),
    Enum(EnumSym),
    Local(LocalSym),
    Label(LabelSym),
    Metaclass(MetaclassSym),
    Builtin(BifSym),
    /// Referenced but never defined; reported at end of compile.
    Undef,
}

impl SymKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            SymKind::Object(_) => "object",
            SymKind::Property(_) => "property",
            SymKind::Func(_) => "function",
            SymKind::Enum(_) => "enum",
            SymKind::Local(_) => "local",
            SymKind::Label(_) => "label",
            SymKind::Metaclass(_) => "intrinsic class",
            SymKind::Builtin(_) => "built-in function",
            SymKind::Undef => "undefined symbol",
        }
    }

    /// Object-file record tag.
    pub fn tag(&self) -> u16 {
        match self {
            SymKind::Object(_) => 1,
            SymKind::Property(_) => 2,
            SymKind::Func(_) => 3,
            SymKind::Enum(_) => 4,
            SymKind::Local(_) => 5,
            SymKind::Label(_) => 6,
            SymKind::Metaclass(_) => 7,
            SymKind::Builtin(_) => 8,
            SymKind::Undef => 9,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SymEntry {
    pub name: Symbol,
    pub loc: SourceLoc,
    /// Once set, the symbol must be written to the object file.
    pub referenced: bool,
    pub kind: SymKind,
}

impl SymEntry {
    pub fn new(name: Symbol, loc: SourceLoc, kind: SymKind) -> Self {
        SymEntry {
            name,
            loc,
            referenced: false,
            kind,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectSym> {
        match &self.kind {
            SymKind::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut ObjectSym> {
        match &mut self.kind {
            SymKind::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<&FuncSym> {
        match &self.kind {
            SymKind::Func(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_func_mut(&mut self) -> Option<&mut FuncSym> {
        match &mut self.kind {
            SymKind::Func(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_local(&self) -> Option<&LocalSym> {
        match &self.kind {
            SymKind::Local(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_local_mut(&mut self) -> Option<&mut LocalSym> {
        match &mut self.kind {
            SymKind::Local(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_prop(&self) -> Option<&PropSym> {
        match &self.kind {
            SymKind::Property(p) => Some(p),
            _ => None,
        }
    }

    /// Whether this entry may be silently superseded by an explicit
    /// definition.
    pub fn is_weak_prop(&self) -> bool {
        matches!(&self.kind, SymKind::Property(p) if p.weak)
    }

    /// External symbols are not exported to the object file's symbol index,
    /// with one exception: multi-method base symbols are shared
    /// placeholders and must be exported from every module that
    /// contributes a variant.
    pub fn is_exported(&self) -> bool {
        match &self.kind {
            SymKind::Object(o) => !o.is_extern,
            SymKind::Func(f) => !f.is_extern || f.is_mm_base,
            SymKind::Local(_) | SymKind::Label(_) => false,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;

    fn entry(kind: SymKind) -> SymEntry {
        let mut interner = Interner::new();
        let name = interner.intern("cave");
        SymEntry::new(name, SourceLoc::default(), kind)
    }

    #[test]
    fn extern_objects_are_not_exported() {
        let mut obj = ObjectSym::default();
        obj.is_extern = true;
        assert!(!entry(SymKind::Object(obj)).is_exported());
        assert!(entry(SymKind::Object(ObjectSym::default())).is_exported());
    }

    #[test]
    fn extern_multimethod_base_is_exported() {
        let mut f = FuncSym::default();
        f.is_extern = true;
        assert!(!entry(SymKind::Func(f.clone())).is_exported());
        f.is_mm_base = true;
        assert!(entry(SymKind::Func(f)).is_exported());
    }

    #[test]
    fn locals_and_labels_never_export() {
        assert!(!entry(SymKind::Local(LocalSym::default())).is_exported());
        assert!(!entry(SymKind::Label(LabelSym::default())).is_exported());
    }

    #[test]
    fn weak_prop_detection() {
        let strong = PropSym {
            prop_id: 1,
            weak: false,
        };
        let weak = PropSym {
            prop_id: 2,
            weak: true,
        };
        assert!(!entry(SymKind::Property(strong)).is_weak_prop());
        assert!(entry(SymKind::Property(weak)).is_weak_prop());
    }

    #[test]
    fn kind_tags_are_distinct() {
        let kinds = [
            SymKind::Object(ObjectSym::default()),
            SymKind::Property(PropSym::default()),
            SymKind::Func(FuncSym::default()),
            SymKind::Enum(EnumSym::default()),
            SymKind::Local(LocalSym::default()),
            SymKind::Label(LabelSym::default()),
            SymKind::Metaclass(MetaclassSym::default()),
            SymKind::Builtin(BifSym::default()),
            SymKind::Undef,
        ];
        let mut tags: Vec<u16> = kinds.iter().map(|k| k.tag()).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), kinds.len());
    }
}
