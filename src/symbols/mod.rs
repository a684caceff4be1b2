//! Symbol index collaborator
//!
//! Class and function declarations are resolved by an earlier pass and
//! handed to the analyzer through [`SymbolIndex`]. The analyzer only reads
//! from it; an index is shared between workers as `Arc<dyn SymbolIndex>`.

pub mod builtins;
pub mod hierarchy;

pub use hierarchy::ClassHierarchy;

use crate::ast::FunctionLike;
use crate::core::{Fqsen, TemplateRef, UnionType};
use dashmap::DashMap;
use indexmap::IndexMap;
use std::sync::Arc;

pub trait SymbolIndex: Send + Sync {
    fn resolve_class(&self, fqsen: &Fqsen) -> Option<Arc<ClassDescriptor>>;

    fn resolve_function_like(&self, fqsen: &Fqsen) -> Option<Arc<Signature>>;

    /// Declared type of a global variable, if known
    fn global_variable_type(&self, _name: &str) -> Option<UnionType> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSignature {
    pub name: String,
    pub ty: Option<UnionType>,
    pub real_ty: Option<UnionType>,
    pub optional: bool,
    pub by_ref: bool,
    pub variadic: bool,
}

impl ParamSignature {
    pub fn new(name: &str, ty: Option<UnionType>) -> Self {
        Self { name: name.to_string(), real_ty: ty.clone(), ty, optional: false, by_ref: false, variadic: false }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn by_ref(mut self) -> Self {
        self.by_ref = true;
        self
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self.optional = true;
        self
    }
}

/// Callable declaration: function or method
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub fqsen: Fqsen,
    pub params: Vec<ParamSignature>,
    pub return_type: Option<UnionType>,
    pub real_return_type: Option<UnionType>,
    pub template_params: Vec<TemplateRef>,
    pub is_static: bool,
    /// Calls cannot touch globals, statics or references
    pub is_pure: bool,
    /// Body used to infer the return type when none is declared
    pub body: Option<Arc<FunctionLike>>,
}

impl Signature {
    pub fn new(fqsen: Fqsen) -> Self {
        Self {
            fqsen,
            params: Vec::new(),
            return_type: None,
            real_return_type: None,
            template_params: Vec::new(),
            is_static: false,
            is_pure: false,
            body: None,
        }
    }

    pub fn with_params(mut self, params: Vec<ParamSignature>) -> Self {
        self.params = params;
        self
    }

    /// Return type enforced by the signature (also used as the declared type)
    pub fn returning(mut self, ty: UnionType) -> Self {
        self.return_type = Some(ty.clone());
        self.real_return_type = Some(ty);
        self
    }

    /// Return type known only from annotations
    pub fn doc_returning(mut self, ty: UnionType) -> Self {
        self.return_type = Some(ty);
        self
    }

    pub fn with_templates(mut self, names: &[&str]) -> Self {
        self.template_params = names.iter().map(|n| TemplateRef::new(n, self.fqsen.clone())).collect();
        self
    }

    pub fn with_body(mut self, body: FunctionLike) -> Self {
        self.body = Some(Arc::new(body));
        self
    }

    pub fn pure(mut self) -> Self {
        self.is_pure = true;
        self
    }

    pub fn static_method(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn template(&self, name: &str) -> TemplateRef {
        TemplateRef::new(name, self.fqsen.clone())
    }

    pub fn is_variadic(&self) -> bool {
        self.params.last().map_or(false, |p| p.variadic)
    }

    pub fn by_ref_params(&self) -> impl Iterator<Item = usize> + '_ {
        self.params.iter().enumerate().filter(|(_, p)| p.by_ref).map(|(i, _)| i)
    }

    /// Minimum number of arguments a call must pass
    pub fn required_params(&self) -> usize {
        self.params.iter().filter(|p| !p.optional).count()
    }

    /// Parameter receiving argument `index`, accounting for variadics
    pub fn param_for_arg(&self, index: usize) -> Option<&ParamSignature> {
        self.params.get(index).or_else(|| self.params.last().filter(|p| p.variadic))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub ty: Option<UnionType>,
    pub real_ty: Option<UnionType>,
    pub is_static: bool,
}

impl PropertyDescriptor {
    pub fn new(name: &str, ty: Option<UnionType>) -> Self {
        Self { name: name.to_string(), real_ty: ty.clone(), ty, is_static: false }
    }

    pub fn doc_typed(name: &str, ty: UnionType) -> Self {
        Self { name: name.to_string(), ty: Some(ty), real_ty: None, is_static: false }
    }

    pub fn static_property(mut self) -> Self {
        self.is_static = true;
        self
    }
}

/// Compact description of a class, interface or trait
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    pub fqsen: Fqsen,
    pub parent: Option<Fqsen>,
    pub interfaces: Vec<Fqsen>,
    pub is_interface: bool,
    pub template_params: Vec<String>,
    /// Type arguments passed to the parent's templates (`@extends Base<int>`)
    pub parent_template_args: Vec<UnionType>,
    /// Keyed by lowercased method name
    pub methods: IndexMap<String, Arc<Signature>>,
    pub properties: IndexMap<String, PropertyDescriptor>,
}

impl ClassDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            fqsen: Fqsen::new(name),
            parent: None,
            interfaces: Vec::new(),
            is_interface: false,
            template_params: Vec::new(),
            parent_template_args: Vec::new(),
            methods: IndexMap::new(),
            properties: IndexMap::new(),
        }
    }

    pub fn interface(name: &str) -> Self {
        Self { is_interface: true, ..Self::new(name) }
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(Fqsen::new(parent));
        self
    }

    pub fn with_interfaces(mut self, interfaces: &[&str]) -> Self {
        self.interfaces = interfaces.iter().map(|i| Fqsen::new(i)).collect();
        self
    }

    pub fn with_templates(mut self, names: &[&str]) -> Self {
        self.template_params = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn template(&self, name: &str) -> TemplateRef {
        TemplateRef::new(name, self.fqsen.clone())
    }

    /// Add a method; `build` receives a signature already named after it
    pub fn with_method(mut self, name: &str, build: impl FnOnce(Signature) -> Signature) -> Self {
        let sig = build(Signature::new(Fqsen::method(&self.fqsen, name)));
        self.methods.insert(name.to_ascii_lowercase(), Arc::new(sig));
        self
    }

    pub fn with_property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.insert(property.name.clone(), property);
        self
    }

    pub fn method(&self, name: &str) -> Option<&Arc<Signature>> {
        self.methods.get(&name.to_ascii_lowercase())
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.get(name)
    }
}

/// In-memory index, filled by the declaration pass or by tests
#[derive(Default)]
pub struct MemorySymbolIndex {
    classes: DashMap<Fqsen, Arc<ClassDescriptor>>,
    functions: DashMap<Fqsen, Arc<Signature>>,
    globals: DashMap<String, UnionType>,
}

impl MemorySymbolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_class(&self, class: ClassDescriptor) {
        self.classes.insert(class.fqsen.clone(), Arc::new(class));
    }

    pub fn register_function(&self, signature: Signature) {
        self.functions.insert(signature.fqsen.clone(), Arc::new(signature));
    }

    pub fn register_global(&self, name: &str, ty: UnionType) {
        self.globals.insert(name.to_string(), ty);
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }
}

impl SymbolIndex for MemorySymbolIndex {
    fn resolve_class(&self, fqsen: &Fqsen) -> Option<Arc<ClassDescriptor>> {
        self.classes.get(fqsen).map(|r| r.value().clone())
    }

    /// Functions by name, methods by `\Class::method`
    fn resolve_function_like(&self, fqsen: &Fqsen) -> Option<Arc<Signature>> {
        if let Some(sig) = self.functions.get(fqsen) {
            return Some(sig.value().clone());
        }
        let (class, member) = fqsen.split_member()?;
        let class = self.classes.get(&class)?;
        class.method(member).cloned()
    }

    fn global_variable_type(&self, name: &str) -> Option<UnionType> {
        self.globals.get(name).map(|r| r.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_methods_through_index() {
        let index = MemorySymbolIndex::new();
        index.register_class(
            ClassDescriptor::new("Repo").with_method("Find", |s| s.returning(UnionType::int())),
        );
        let sig = index.resolve_function_like(&Fqsen::new("repo::find")).unwrap();
        assert_eq!(sig.return_type, Some(UnionType::int()));
        assert!(index.resolve_class(&Fqsen::new("\\REPO")).is_some());
        assert!(index.resolve_function_like(&Fqsen::new("missing")).is_none());
    }

    #[test]
    fn test_param_for_variadic_arg() {
        let sig = Signature::new(Fqsen::new("f")).with_params(vec![
            ParamSignature::new("a", Some(UnionType::int())),
            ParamSignature::new("rest", Some(UnionType::string())).variadic(),
        ]);
        assert!(sig.is_variadic());
        assert_eq!(sig.required_params(), 1);
        assert_eq!(sig.param_for_arg(5).map(|p| p.name.as_str()), Some("rest"));
    }
}
