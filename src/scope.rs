//! The symbol table hierarchy: a global scope plus a stack of
//! function/block scopes built and torn down during parsing.
//!
//! Block scopes allocate their hash tables lazily; most blocks define no
//! locals of their own and cost nothing. Each code body keeps the list of
//! locals it defined so the end-of-body unreferenced scan can run after the
//! scopes have been popped.

use crate::diag::ErrorLog;
use crate::intern::{Interner, Symbol};
use crate::symbol::{LabelSym, LocalSym, PropSym, SymEntry, SymId, SymKind};
use crate::token::{SourceLoc, Span};
use std::collections::HashMap;

/// Policy for `find_or_def` when the name is not found in any scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefPolicy {
    /// Log an "undefined symbol" error and add an `Undef` entry.
    AddUndef,
    /// Log an "assumed to be a property" warning and add a property.
    AddProp,
    /// Add a property silently.
    AddPropNoWarn,
    /// Add a weak property that explicit definitions may supersede.
    AddPropWeak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Function,
    Block,
}

struct ScopeFrame {
    /// Lazily created: a block gets a table only when it defines a local.
    table: Option<HashMap<Symbol, SymId>>,
}

pub struct SymbolTable {
    pool: Vec<SymEntry>,
    global: HashMap<Symbol, SymId>,
    frames: Vec<ScopeFrame>,
    /// Goto labels have whole-code-body scope, one table per nested body.
    label_frames: Vec<HashMap<Symbol, SymId>>,
    /// Next property id to assign to auto-defined properties.
    next_prop_id: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            pool: Vec::new(),
            global: HashMap::new(),
            frames: Vec::new(),
            label_frames: Vec::new(),
            next_prop_id: 1,
        }
    }

    /// Starting id for auto-assigned property ids; the driver seeds this
    /// from the compiler context.
    pub fn set_next_prop_id(&mut self, id: u32) {
        self.next_prop_id = id;
    }

    pub fn next_prop_id(&self) -> u32 {
        self.next_prop_id
    }

    pub fn alloc_prop_id(&mut self) -> u32 {
        let id = self.next_prop_id;
        self.next_prop_id += 1;
        id
    }

    pub fn entry(&self, id: SymId) -> &SymEntry {
        &self.pool[id.index()]
    }

    pub fn entry_mut(&mut self, id: SymId) -> &mut SymEntry {
        &mut self.pool[id.index()]
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Iterate the global scope in insertion (pool) order.
    pub fn globals(&self) -> impl Iterator<Item = SymId> + '_ {
        let mut ids: Vec<SymId> = self.global.values().copied().collect();
        ids.sort_unstable();
        ids.into_iter()
    }

    /// Iterate every pool entry, including detached synthesized symbols.
    pub fn all_ids(&self) -> impl Iterator<Item = SymId> {
        (0..self.pool.len() as u32).map(SymId)
    }

    /// True when the id is the global scope's binding for its name (as
    /// opposed to a detached or shadowed entry).
    pub fn is_global(&self, id: SymId) -> bool {
        let name = self.pool[id.index()].name;
        self.global.get(&name) == Some(&id)
    }

    fn add_entry(&mut self, entry: SymEntry) -> SymId {
        let id = SymId(self.pool.len() as u32);
        self.pool.push(entry);
        id
    }

    /// Add a pool entry without binding it in any scope. Used for
    /// synthesized symbols: modify-base placeholders, grammar match
    /// objects, anonymous objects.
    pub fn add_detached(&mut self, entry: SymEntry) -> SymId {
        self.add_entry(entry)
    }

    /// Define a symbol in the global scope. Returns the existing entry's id
    /// as `Err` when the name is taken (the caller decides whether that is
    /// a conflict or a merge).
    pub fn define_global(&mut self, name: Symbol, loc: SourceLoc, kind: SymKind) -> Result<SymId, SymId> {
        if let Some(&existing) = self.global.get(&name) {
            return Err(existing);
        }
        let id = self.add_entry(SymEntry::new(name, loc, kind));
        self.global.insert(name, id);
        Ok(id)
    }

    /// Remove an existing weak property so a stronger definition can take
    /// the name. Returns true if an entry was removed.
    pub fn find_delete_weak(&mut self, name: Symbol) -> bool {
        if let Some(&id) = self.global.get(&name) {
            if self.pool[id.index()].is_weak_prop() {
                self.global.remove(&name);
                return true;
            }
        }
        false
    }

    /// Walk current scope outward; mark the symbol referenced on success.
    pub fn find(&mut self, name: Symbol) -> Option<SymId> {
        let id = self.find_noref(name)?;
        self.pool[id.index()].referenced = true;
        Some(id)
    }

    /// Find a local binding, returning the index of the scope frame that
    /// holds it. Frames below a code body's base depth belong to enclosing
    /// bodies; the parser uses the index to detect closure captures.
    pub fn find_local_frame(&self, name: Symbol) -> Option<(SymId, usize)> {
        for (idx, frame) in self.frames.iter().enumerate().rev() {
            if let Some(table) = &frame.table {
                if let Some(&id) = table.get(&name) {
                    return Some((id, idx));
                }
            }
        }
        None
    }

    /// Same walk, without marking.
    pub fn find_noref(&self, name: Symbol) -> Option<SymId> {
        for frame in self.frames.iter().rev() {
            if let Some(table) = &frame.table {
                if let Some(&id) = table.get(&name) {
                    return Some(id);
                }
            }
        }
        self.global.get(&name).copied()
    }

    /// Find in any scope, or define in the global scope per the policy.
    pub fn find_or_def(
        &mut self,
        name: Symbol,
        policy: DefPolicy,
        loc: SourceLoc,
        span: Span,
        interner: &Interner,
        log: &mut ErrorLog,
    ) -> SymId {
        if let Some(id) = self.find(name) {
            return id;
        }
        let kind = match policy {
            DefPolicy::AddUndef => {
                log.error(
                    loc,
                    span,
                    format!("undefined symbol \"{}\"", interner.resolve(name)),
                );
                SymKind::Undef
            }
            DefPolicy::AddProp => {
                log.warning(
                    loc,
                    span,
                    format!(
                        "\"{}\" is not defined; assumed to be a property",
                        interner.resolve(name)
                    ),
                );
                SymKind::Property(PropSym {
                    prop_id: self.alloc_prop_id(),
                    weak: false,
                })
            }
            DefPolicy::AddPropNoWarn => SymKind::Property(PropSym {
                prop_id: self.alloc_prop_id(),
                weak: false,
            }),
            DefPolicy::AddPropWeak => SymKind::Property(PropSym {
                prop_id: self.alloc_prop_id(),
                weak: true,
            }),
        };
        let id = self.add_entry(SymEntry::new(name, loc, kind));
        self.global.insert(name, id);
        self.pool[id.index()].referenced = true;
        id
    }

    // ---- parse-time scope stack ----

    pub fn push_scope(&mut self, kind: ScopeKind) {
        let table = match kind {
            ScopeKind::Function => Some(HashMap::new()),
            ScopeKind::Block => None,
        };
        self.frames.push(ScopeFrame { table });
    }

    pub fn pop_scope(&mut self) {
        self.frames.pop();
    }

    pub fn scope_depth(&self) -> usize {
        self.frames.len()
    }

    /// True if the innermost frame already binds the name; used to detect
    /// redefinition without treating shadowing as an error.
    fn defined_in_current(&self, name: Symbol) -> bool {
        self.frames
            .last()
            .and_then(|f| f.table.as_ref())
            .map(|t| t.contains_key(&name))
            .unwrap_or(false)
    }

    fn insert_in_current(&mut self, name: Symbol, id: SymId) {
        let frame = self
            .frames
            .last_mut()
            .expect("local definition outside any scope");
        frame.table.get_or_insert_with(HashMap::new).insert(name, id);
    }

    fn add_local_common(
        &mut self,
        name: Symbol,
        slot: u32,
        is_param: bool,
        loc: SourceLoc,
        span: Span,
        interner: &Interner,
        log: &mut ErrorLog,
    ) -> SymId {
        if self.defined_in_current(name) {
            log.error(
                loc,
                span,
                format!(
                    "\"{}\" is already defined in this scope",
                    interner.resolve(name)
                ),
            );
        }
        let local = LocalSym {
            slot,
            is_param,
            val_assigned: is_param,
            ..LocalSym::default()
        };
        let id = self.add_entry(SymEntry::new(name, loc, SymKind::Local(local)));
        self.insert_in_current(name, id);
        id
    }

    /// Define a formal parameter in the current (function) scope.
    pub fn add_formal(
        &mut self,
        name: Symbol,
        slot: u32,
        loc: SourceLoc,
        span: Span,
        interner: &Interner,
        log: &mut ErrorLog,
    ) -> SymId {
        self.add_local_common(name, slot, true, loc, span, interner, log)
    }

    /// Define a local variable in the current scope.
    pub fn add_local(
        &mut self,
        name: Symbol,
        slot: u32,
        loc: SourceLoc,
        span: Span,
        interner: &Interner,
        log: &mut ErrorLog,
    ) -> SymId {
        self.add_local_common(name, slot, false, loc, span, interner, log)
    }

    // ---- code labels ----

    pub fn push_label_scope(&mut self) {
        self.label_frames.push(HashMap::new());
    }

    /// Pop the label scope, returning the labels for the unreferenced /
    /// undefined scan.
    pub fn pop_label_scope(&mut self) -> Vec<SymId> {
        let frame = self.label_frames.pop().unwrap_or_default();
        let mut ids: Vec<SymId> = frame.values().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Define a `label:` target in the current code body.
    pub fn add_code_label(
        &mut self,
        name: Symbol,
        loc: SourceLoc,
        span: Span,
        interner: &Interner,
        log: &mut ErrorLog,
    ) -> SymId {
        if let Some(frame) = self.label_frames.last() {
            if let Some(&id) = frame.get(&name) {
                if matches!(&self.pool[id.index()].kind, SymKind::Label(l) if l.defined) {
                    log.error(
                        loc,
                        span,
                        format!("label \"{}\" is already defined", interner.resolve(name)),
                    );
                } else if let SymKind::Label(l) = &mut self.pool[id.index()].kind {
                    l.defined = true;
                }
                return id;
            }
        }
        let id = self.add_entry(SymEntry::new(
            name,
            loc,
            SymKind::Label(LabelSym {
                defined: true,
                referenced: false,
            }),
        ));
        if let Some(frame) = self.label_frames.last_mut() {
            frame.insert(name, id);
        }
        id
    }

    /// Reference a label from `goto`/`break`/`continue`; creates a
    /// forward-reference entry if the label has not been seen yet.
    pub fn ref_code_label(&mut self, name: Symbol, loc: SourceLoc) -> SymId {
        if let Some(frame) = self.label_frames.last() {
            if let Some(&id) = frame.get(&name) {
                if let SymKind::Label(l) = &mut self.pool[id.index()].kind {
                    l.referenced = true;
                }
                return id;
            }
        }
        let id = self.add_entry(SymEntry::new(
            name,
            loc,
            SymKind::Label(LabelSym {
                defined: false,
                referenced: true,
            }),
        ));
        if let Some(frame) = self.label_frames.last_mut() {
            frame.insert(name, id);
        }
        id
    }

    /// End-of-code-body scan over the body's locals and labels.
    ///
    /// Unreferenced or never-assigned locals warn; unreferenced parameters
    /// get a pedantic note; the inner-scope copy of a captured local is
    /// exempt (the original reports for both).
    pub fn unreferenced_scan(
        &self,
        locals: &[SymId],
        labels: &[SymId],
        interner: &Interner,
        log: &mut ErrorLog,
    ) {
        for &id in locals {
            let entry = &self.pool[id.index()];
            let local = match entry.as_local() {
                Some(l) => l,
                None => continue,
            };
            if local.is_ctx_copy {
                continue;
            }
            let name = interner.resolve(entry.name);
            if local.is_param {
                if !local.val_used {
                    log.pedantic(
                        entry.loc,
                        Span::default(),
                        format!("parameter \"{}\" is never used", name),
                    );
                }
            } else if !local.val_used {
                let msg = if local.val_assigned {
                    format!("local variable \"{}\" is assigned a value that is never used", name)
                } else {
                    format!("local variable \"{}\" is never used", name)
                };
                log.warning(entry.loc, Span::default(), msg);
            } else if !local.val_assigned {
                log.warning(
                    entry.loc,
                    Span::default(),
                    format!("local variable \"{}\" is never assigned a value", name),
                );
            }
        }
        for &id in labels {
            let entry = &self.pool[id.index()];
            if let SymKind::Label(l) = &entry.kind {
                let name = interner.resolve(entry.name);
                if l.referenced && !l.defined {
                    log.error(
                        entry.loc,
                        Span::default(),
                        format!("label \"{}\" is not defined", name),
                    );
                } else if l.defined && !l.referenced {
                    log.warning(
                        entry.loc,
                        Span::default(),
                        format!("label \"{}\" is never referenced", name),
                    );
                }
            }
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
