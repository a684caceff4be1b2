//! Scope snapshots: the variable state at one program point
//!
//! Snapshots are immutable. Every update returns a new snapshot; the map is
//! shared behind an `Arc` and only copied when a shared snapshot is
//! written to, so forking at a branch is a pointer copy.

use crate::core::{FlowType, TypeLimits, UnionType};
use indexmap::{IndexMap, IndexSet};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

pub type VarName = Arc<str>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    Var(VarName),
    /// Narrowed type of `$base->prop`
    Property(VarName, VarName),
}

impl ScopeKey {
    pub fn var(name: &str) -> Self {
        ScopeKey::Var(Arc::from(name))
    }

    pub fn property(base: &str, prop: &str) -> Self {
        ScopeKey::Property(Arc::from(base), Arc::from(prop))
    }

    pub fn base_name(&self) -> &str {
        match self {
            ScopeKey::Var(name) | ScopeKey::Property(name, _) => name,
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKey::Var(name) => write!(f, "${}", name),
            ScopeKey::Property(base, prop) => write!(f, "${}->{}", base, prop),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Local,
    Parameter,
    Global,
    Static,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarEntry {
    pub ty: FlowType,
    /// Declared type (parameter, global or property declaration)
    pub declared: Option<UnionType>,
    pub possibly_undefined: bool,
    pub kind: VarKind,
    /// Bound by reference to storage others may write
    pub is_reference: bool,
}

impl VarEntry {
    pub fn local(ty: FlowType) -> Self {
        Self { ty, declared: None, possibly_undefined: false, kind: VarKind::Local, is_reference: false }
    }

    pub fn with_kind(mut self, kind: VarKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_declared(mut self, declared: Option<UnionType>) -> Self {
        self.declared = declared;
        self
    }

    /// Entry as seen after code that may have written the storage
    fn reverted(&self) -> Self {
        let declared = self.declared.clone().unwrap_or_else(UnionType::mixed);
        Self { ty: FlowType::declared(declared), ..self.clone() }
    }
}

/// How control reaches a join point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Normal,
    Return,
    Throw,
    Break,
    Continue,
    Exit,
}

impl EdgeKind {
    /// Edges leaving the function; they never reach a join inside it
    pub fn leaves_unit(self) -> bool {
        matches!(self, EdgeKind::Return | EdgeKind::Throw | EdgeKind::Exit)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScopeSnapshot {
    vars: Arc<IndexMap<ScopeKey, VarEntry>>,
    unreachable: bool,
}

impl ScopeSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot no execution reaches
    pub fn unreachable() -> Self {
        Self { vars: Arc::default(), unreachable: true }
    }

    pub fn is_unreachable(&self) -> bool {
        self.unreachable
    }

    pub fn mark_unreachable(&self) -> Self {
        Self { vars: self.vars.clone(), unreachable: true }
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ScopeKey, &VarEntry)> {
        self.vars.iter()
    }

    /// Declared/inferred type of `$name`; `None` means undeclared
    pub fn get(&self, name: &str) -> Option<&UnionType> {
        self.entry(name).map(|e| &e.ty.ty)
    }

    pub fn entry(&self, name: &str) -> Option<&VarEntry> {
        self.vars.get(&ScopeKey::var(name))
    }

    pub fn entry_for(&self, key: &ScopeKey) -> Option<&VarEntry> {
        self.vars.get(key)
    }

    pub fn property(&self, base: &str, prop: &str) -> Option<&VarEntry> {
        self.vars.get(&ScopeKey::property(base, prop))
    }

    pub fn is_possibly_undefined(&self, name: &str) -> bool {
        self.entry(name).map_or(false, |e| e.possibly_undefined)
    }

    fn vars_mut(&mut self) -> &mut IndexMap<ScopeKey, VarEntry> {
        Arc::make_mut(&mut self.vars)
    }

    /// Assignment to `$name`. Keeps the variable's declaration and kind;
    /// narrowings of its properties are dropped.
    pub fn with_assigned(&self, name: &str, ty: FlowType, is_definite: bool) -> Self {
        let mut next = self.without_properties_of(name);
        let key = ScopeKey::var(name);
        let entry = match self.vars.get(&key) {
            Some(existing) => VarEntry {
                ty,
                possibly_undefined: !is_definite && existing.possibly_undefined,
                ..existing.clone()
            },
            None => VarEntry { possibly_undefined: !is_definite, ..VarEntry::local(ty) },
        };
        next.vars_mut().insert(key, entry);
        next
    }

    /// Insert or replace an entry as-is
    pub fn with_entry(&self, key: ScopeKey, entry: VarEntry) -> Self {
        let mut next = self.clone();
        next.vars_mut().insert(key, entry);
        next
    }

    /// Refine the type of an existing key without touching anything else.
    /// Narrowing never makes a variable defined; use [`Self::with_defined`].
    pub fn with_narrowed(&self, key: &ScopeKey, ty: FlowType) -> Self {
        let mut next = self.clone();
        match next.vars_mut().get_mut(key) {
            Some(entry) => entry.ty = ty,
            None => {
                if let ScopeKey::Property(..) = key {
                    next.vars_mut().insert(key.clone(), VarEntry::local(ty));
                }
            }
        }
        next
    }

    /// Clear the possibly-undefined mark (after `isset`, `??=`, ...)
    pub fn with_defined(&self, name: &str) -> Self {
        match self.entry(name) {
            Some(entry) if entry.possibly_undefined => {
                let mut next = self.clone();
                if let Some(e) = next.vars_mut().get_mut(&ScopeKey::var(name)) {
                    e.possibly_undefined = false;
                }
                next
            }
            _ => self.clone(),
        }
    }

    /// `unset($name)`
    pub fn without(&self, name: &str) -> Self {
        let mut next = self.without_properties_of(name);
        next.vars_mut().shift_remove(&ScopeKey::var(name));
        next
    }

    pub fn without_properties_of(&self, name: &str) -> Self {
        let has_props = self
            .vars
            .keys()
            .any(|k| matches!(k, ScopeKey::Property(base, _) if &**base == name));
        if !has_props {
            return self.clone();
        }
        let mut next = self.clone();
        next.vars_mut()
            .retain(|k, _| !matches!(k, ScopeKey::Property(base, _) if &**base == name));
        next
    }

    pub fn mark_reference(&self, name: &str) -> Self {
        let mut next = self.without_properties_of(name);
        if let Some(e) = next.vars_mut().get_mut(&ScopeKey::var(name)) {
            e.is_reference = true;
        }
        next
    }

    /// After a call into code that may write globals, statics or
    /// references: those variables fall back to their declared types
    pub fn invalidate_after_call(&self) -> Self {
        let affected: Vec<ScopeKey> = self
            .vars
            .iter()
            .filter(|(_, e)| matches!(e.kind, VarKind::Global | VarKind::Static) || e.is_reference)
            .map(|(k, _)| k.clone())
            .collect();
        if affected.is_empty() {
            return self.clone();
        }
        let mut next = self.clone();
        for key in affected {
            let vars = next.vars_mut();
            if let Some(entry) = vars.get(&key) {
                let reverted = entry.reverted();
                vars.insert(key.clone(), reverted);
            }
            let base = key.base_name().to_string();
            next = next.without_properties_of(&base);
        }
        next
    }

    /// Widen every entry still changing at a loop cap: declared type if
    /// there is one, otherwise the generalized type
    pub fn widened(&self, previous: &ScopeSnapshot, limits: TypeLimits) -> Self {
        let mut next = self.clone();
        let vars = next.vars_mut();
        for (key, entry) in vars.iter_mut() {
            if previous.vars.get(key) == Some(&*entry) {
                continue;
            }
            entry.ty = match &entry.declared {
                Some(declared) => FlowType::declared(declared.clone()),
                None => entry.ty.generalize(limits),
            };
        }
        next
    }

    /// Widening past `widened` when a loop head still does not absorb its
    /// back edge. An entry still changing goes to its declared type, or to
    /// `mixed` if it has none or already sat at the declared type.
    pub fn saturated(&self, previous: &ScopeSnapshot) -> Self {
        let mut next = self.clone();
        let vars = next.vars_mut();
        for (key, entry) in vars.iter_mut() {
            let before = previous.vars.get(key);
            if before == Some(&*entry) {
                continue;
            }
            entry.ty = match &entry.declared {
                Some(declared) if before.map_or(true, |b| b.ty != FlowType::declared(declared.clone())) => {
                    FlowType::declared(declared.clone())
                }
                _ => FlowType::mixed(),
            };
        }
        next
    }

    /// Every entry at its declared type (budget exhaustion)
    pub fn all_declared(&self) -> Self {
        let mut next = self.clone();
        for entry in next.vars_mut().values_mut() {
            let declared = entry.declared.clone().unwrap_or_else(|| entry.ty.ty.clone());
            entry.ty = FlowType::declared(declared);
        }
        next
    }

    /// Join snapshots arriving over `inputs`. Unreachable snapshots and
    /// edges that leave the unit are excluded. A variable missing from some
    /// live input becomes possibly undefined; a property narrowing missing
    /// from any live input is dropped.
    pub fn merge(inputs: &[(ScopeSnapshot, EdgeKind)], limits: TypeLimits) -> ScopeSnapshot {
        let live: Vec<&ScopeSnapshot> = inputs
            .iter()
            .filter(|(s, edge)| !s.unreachable && !edge.leaves_unit())
            .map(|(s, _)| s)
            .collect();

        match live.as_slice() {
            [] => return ScopeSnapshot::unreachable(),
            [single] => return (*single).clone(),
            [first, rest @ ..] if rest.iter().all(|s| Arc::ptr_eq(&s.vars, &first.vars)) => {
                return (*first).clone()
            }
            _ => {}
        }

        let keys: IndexSet<&ScopeKey> = live.iter().flat_map(|s| s.vars.keys()).collect();

        let mut merged = IndexMap::with_capacity(keys.len());
        for key in keys.iter() {
            let present: Vec<&VarEntry> = live.iter().filter_map(|s| s.vars.get(*key)).collect();
            let missing = present.len() < live.len();
            if missing && matches!(key, ScopeKey::Property(..)) {
                continue;
            }
            let mut entry = present[0].clone();
            for other in &present[1..] {
                entry.ty = entry.ty.union_with(&other.ty, limits);
                entry.possibly_undefined |= other.possibly_undefined;
                entry.is_reference |= other.is_reference;
                if entry.declared.is_none() {
                    entry.declared = other.declared.clone();
                }
            }
            entry.possibly_undefined |= missing;
            merged.insert((*key).clone(), entry);
        }

        ScopeSnapshot { vars: Arc::new(merged), unreachable: false }
    }

    /// Join over plain fallthrough edges
    pub fn merge_all(scopes: &[ScopeSnapshot], limits: TypeLimits) -> ScopeSnapshot {
        let inputs: Vec<(ScopeSnapshot, EdgeKind)> =
            scopes.iter().map(|s| (s.clone(), EdgeKind::Normal)).collect();
        Self::merge(&inputs, limits)
    }
}

impl PartialEq for ScopeSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.unreachable == other.unreachable && (Arc::ptr_eq(&self.vars, &other.vars) || self.vars == other.vars)
    }
}

impl Eq for ScopeSnapshot {}

impl Serialize for ScopeSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.vars.len()))?;
        for (key, entry) in self.vars.iter() {
            let mut ty = entry.ty.ty.to_string();
            if entry.possibly_undefined {
                ty.push_str("|undefined");
            }
            map.serialize_entry(&key.to_string(), &ty)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> TypeLimits {
        TypeLimits::default()
    }

    #[test]
    fn test_assignment_is_copy_on_write() {
        let a = ScopeSnapshot::new().with_assigned("x", FlowType::exact(UnionType::int()), true);
        let b = a.with_assigned("x", FlowType::exact(UnionType::string()), true);
        assert_eq!(a.get("x"), Some(&UnionType::int()));
        assert_eq!(b.get("x"), Some(&UnionType::string()));
        assert!(a.get("y").is_none());
    }

    #[test]
    fn test_merge_marks_partial_variables() {
        let base = ScopeSnapshot::new();
        let left = base.with_assigned("a", FlowType::exact(UnionType::literal_int(1)), true);
        let merged = ScopeSnapshot::merge_all(&[left.clone(), base.clone()], limits());
        assert!(merged.is_possibly_undefined("a"));
        assert_eq!(merged.get("a"), Some(&UnionType::literal_int(1)));

        // the missing edge returns, so it does not count
        let merged = ScopeSnapshot::merge(&[(left, EdgeKind::Normal), (base, EdgeKind::Return)], limits());
        assert!(!merged.is_possibly_undefined("a"));
    }

    #[test]
    fn test_merge_unions_types() {
        let base = ScopeSnapshot::new();
        let l = base.with_assigned("v", FlowType::exact(UnionType::int()), true);
        let r = base.with_assigned("v", FlowType::exact(UnionType::string()), true);
        let merged = ScopeSnapshot::merge_all(&[l, r], limits());
        assert_eq!(merged.get("v"), Some(&UnionType::int().union(&UnionType::string())));
        assert!(!merged.is_possibly_undefined("v"));
    }

    #[test]
    fn test_merge_of_nothing_is_unreachable() {
        let s = ScopeSnapshot::new().with_assigned("v", FlowType::mixed(), true);
        let merged = ScopeSnapshot::merge(&[(s.mark_unreachable(), EdgeKind::Normal), (s, EdgeKind::Throw)], limits());
        assert!(merged.is_unreachable());
    }

    #[test]
    fn test_property_keys_dropped_on_reassign_and_partial_merge() {
        let s = ScopeSnapshot::new()
            .with_assigned("o", FlowType::mixed(), true)
            .with_narrowed(&ScopeKey::property("o", "p"), FlowType::exact(UnionType::int()));
        assert!(s.property("o", "p").is_some());
        assert!(s.with_assigned("o", FlowType::mixed(), true).property("o", "p").is_none());

        let other = s.with_assigned("z", FlowType::mixed(), true).without_properties_of("o");
        let merged = ScopeSnapshot::merge_all(&[s, other], limits());
        assert!(merged.property("o", "p").is_none());
    }

    #[test]
    fn test_invalidate_after_call_resets_globals() {
        let entry = VarEntry::local(FlowType::exact(UnionType::literal_int(3)))
            .with_kind(VarKind::Global)
            .with_declared(Some(UnionType::int().with_null()));
        let s = ScopeSnapshot::new()
            .with_entry(ScopeKey::var("g"), entry)
            .with_assigned("l", FlowType::exact(UnionType::int()), true);
        let after = s.invalidate_after_call();
        assert_eq!(after.get("g"), Some(&UnionType::int().with_null()));
        assert!(!after.entry("g").unwrap().ty.is_real_known());
        assert_eq!(after.get("l"), Some(&UnionType::int()));
    }
}
