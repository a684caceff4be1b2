//! Memoized class ancestry and member lookup

use super::{ClassDescriptor, PropertyDescriptor, Signature, SymbolIndex};
use crate::core::template::substitute_templates;
use crate::core::{ClassGraph, Fqsen, TemplateBindings, TypeLimits, UnionType};
use dashmap::DashMap;
use std::sync::Arc;

/// Ancestry cache over a symbol index. Owned by the analysis driver and
/// shared by reference with every worker.
pub struct ClassHierarchy {
    index: Arc<dyn SymbolIndex>,
    ancestors: DashMap<Fqsen, Arc<Vec<Fqsen>>>,
}

impl ClassHierarchy {
    pub fn new(index: Arc<dyn SymbolIndex>) -> Self {
        Self { index, ancestors: DashMap::new() }
    }

    pub fn index(&self) -> &Arc<dyn SymbolIndex> {
        &self.index
    }

    pub fn class(&self, fqsen: &Fqsen) -> Option<Arc<ClassDescriptor>> {
        self.index.resolve_class(fqsen)
    }

    pub fn parent_of(&self, fqsen: &Fqsen) -> Option<Fqsen> {
        self.class(fqsen).and_then(|c| c.parent.clone())
    }

    /// The class itself, its parent chain, then every implemented
    /// interface. Cycles in a broken index are cut.
    pub fn ancestors(&self, fqsen: &Fqsen) -> Arc<Vec<Fqsen>> {
        if let Some(cached) = self.ancestors.get(fqsen) {
            return cached.value().clone();
        }
        let mut result = Vec::new();
        let mut interfaces = Vec::new();
        let mut current = Some(fqsen.clone());
        while let Some(class) = current.take() {
            if result.contains(&class) {
                break;
            }
            result.push(class.clone());
            if let Some(desc) = self.class(&class) {
                interfaces.extend(desc.interfaces.iter().cloned());
                current = desc.parent.clone();
            }
        }
        while let Some(interface) = interfaces.pop() {
            if result.contains(&interface) {
                continue;
            }
            result.push(interface.clone());
            if let Some(desc) = self.class(&interface) {
                interfaces.extend(desc.interfaces.iter().cloned());
                interfaces.extend(desc.parent.iter().cloned());
            }
        }
        let result = Arc::new(result);
        self.ancestors.insert(fqsen.clone(), result.clone());
        result
    }

    /// Method declared on the class or inherited, with its declaring class
    pub fn find_method(&self, class: &Fqsen, name: &str) -> Option<(Fqsen, Arc<Signature>)> {
        self.ancestors(class).iter().find_map(|ancestor| {
            let desc = self.class(ancestor)?;
            desc.method(name).map(|sig| (ancestor.clone(), sig.clone()))
        })
    }

    pub fn find_property(&self, class: &Fqsen, name: &str) -> Option<(Fqsen, PropertyDescriptor)> {
        self.ancestors(class).iter().find_map(|ancestor| {
            let desc = self.class(ancestor)?;
            desc.property(name).map(|p| (ancestor.clone(), p.clone()))
        })
    }

    /// Template bindings seen by a member of `owner` accessed through an
    /// instance of `class<args>`, following `@extends` arguments up the
    /// parent chain
    pub fn member_bindings(&self, class: &Fqsen, args: &[UnionType], owner: &Fqsen, limits: TypeLimits) -> TemplateBindings {
        let mut current = class.clone();
        let mut bindings = match self.class(class) {
            Some(desc) => TemplateBindings::from_instance(class, &desc.template_params, args),
            None => return TemplateBindings::new(),
        };
        let mut steps = 0;
        while current != *owner && steps < 32 {
            steps += 1;
            let desc = match self.class(&current) {
                Some(d) => d,
                None => break,
            };
            let parent = match &desc.parent {
                Some(p) => p.clone(),
                None => break,
            };
            let parent_args: Vec<UnionType> = desc
                .parent_template_args
                .iter()
                .map(|a| substitute_templates(a, &bindings, limits))
                .collect();
            bindings = match self.class(&parent) {
                Some(pdesc) => TemplateBindings::from_instance(&parent, &pdesc.template_params, &parent_args),
                None => break,
            };
            current = parent;
        }
        bindings
    }
}

impl ClassGraph for ClassHierarchy {
    fn is_subclass_of(&self, class: &Fqsen, ancestor: &Fqsen) -> bool {
        class == ancestor || self.ancestors(class).contains(ancestor)
    }

    fn is_interface(&self, class: &Fqsen) -> bool {
        self.class(class).map_or(false, |c| c.is_interface)
    }

    fn is_known(&self, class: &Fqsen) -> bool {
        self.class(class).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TypeAtom;
    use crate::symbols::MemorySymbolIndex;

    fn hierarchy() -> ClassHierarchy {
        let index = MemorySymbolIndex::new();
        index.register_class(ClassDescriptor::interface("Countable"));
        index.register_class(
            ClassDescriptor::new("Base")
                .with_templates(&["T"])
                .with_property(PropertyDescriptor::doc_typed(
                    "item",
                    UnionType::of(TypeAtom::Template(crate::core::TemplateRef::new("T", Fqsen::new("Base")))),
                ))
                .with_method("count", |s| s.returning(UnionType::int())),
        );
        let mut child = ClassDescriptor::new("Child").with_parent("Base").with_interfaces(&["Countable"]);
        child.parent_template_args = vec![UnionType::string()];
        index.register_class(child);
        ClassHierarchy::new(Arc::new(index))
    }

    #[test]
    fn test_ancestry() {
        let h = hierarchy();
        let child = Fqsen::new("Child");
        assert!(h.is_subclass_of(&child, &Fqsen::new("Base")));
        assert!(h.is_subclass_of(&child, &Fqsen::new("countable")));
        assert!(!h.is_subclass_of(&Fqsen::new("Base"), &child));
        assert!(h.is_interface(&Fqsen::new("Countable")));
        assert_eq!(h.ancestors(&child).len(), 3);
    }

    #[test]
    fn test_inherited_members() {
        let h = hierarchy();
        let child = Fqsen::new("Child");
        let (owner, sig) = h.find_method(&child, "COUNT").unwrap();
        assert_eq!(owner, Fqsen::new("Base"));
        assert_eq!(sig.return_type, Some(UnionType::int()));

        let (owner, prop) = h.find_property(&child, "item").unwrap();
        let bindings = h.member_bindings(&child, &[], &owner, TypeLimits::default());
        let ty = substitute_templates(prop.ty.as_ref().unwrap(), &bindings, TypeLimits::default());
        assert_eq!(ty, UnionType::string());
    }
}
