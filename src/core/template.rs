//! Template parameter binding and substitution

use crate::core::atom::{CallableType, GenericArray, TemplateRef, TypeAtom};
use crate::core::union::{TypeLimits, UnionType};
use crate::core::fqsen::Fqsen;
use indexmap::IndexMap;

/// Substitution map from template placeholders to concrete types
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateBindings {
    bindings: IndexMap<TemplateRef, UnionType>,
}

impl TemplateBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, template: TemplateRef, ty: UnionType) {
        self.bindings.insert(template, ty);
    }

    pub fn get(&self, template: &TemplateRef) -> Option<&UnionType> {
        self.bindings.get(template)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TemplateRef, &UnionType)> {
        self.bindings.iter()
    }

    /// Bind a class's template parameters from the type arguments of an
    /// instance, e.g. `Box<int>` binds `T` of `\Box` to `int`
    pub fn from_instance(owner: &Fqsen, names: &[String], args: &[UnionType]) -> Self {
        let mut bindings = Self::new();
        for (i, name) in names.iter().enumerate() {
            let ty = args.get(i).cloned().unwrap_or_else(UnionType::mixed);
            bindings.insert(TemplateRef::new(name, owner.clone()), ty);
        }
        bindings
    }

    /// Combine two binding sets; shared placeholders get the union
    pub fn extend(&mut self, other: TemplateBindings, limits: TypeLimits) {
        for (template, ty) in other.bindings {
            let merged = match self.bindings.get(&template) {
                Some(existing) => existing.union_with(&ty, limits),
                None => ty,
            };
            self.bindings.insert(template, merged);
        }
    }
}

/// Replace bound placeholders everywhere in `ty`, including nested type
/// arguments and container element types. Unbound placeholders stay.
pub fn substitute_templates(ty: &UnionType, bindings: &TemplateBindings, limits: TypeLimits) -> UnionType {
    if bindings.is_empty() {
        return ty.clone();
    }
    let mut parts = Vec::with_capacity(ty.atoms().len() + 1);
    if ty.is_nullable() {
        parts.push(UnionType::null());
    }
    for atom in ty.atoms() {
        parts.push(substitute_atom(atom, bindings, limits));
    }
    if parts.is_empty() {
        return ty.clone();
    }
    UnionType::union_all(parts, limits)
}

fn substitute_atom(atom: &TypeAtom, bindings: &TemplateBindings, limits: TypeLimits) -> UnionType {
    let sub = |u: &UnionType| substitute_templates(u, bindings, limits);
    match atom {
        TypeAtom::Template(t) => match bindings.get(t) {
            Some(bound) => bound.clone(),
            None => UnionType::of(atom.clone()),
        },
        TypeAtom::Instance { class, args } if !args.is_empty() => {
            UnionType::instance_with_args(class.clone(), args.iter().map(sub).collect())
        }
        TypeAtom::ArrayShape(shape) => UnionType::shape(shape.map_values(sub)),
        TypeAtom::GenericArray(g) => UnionType::of(TypeAtom::GenericArray(GenericArray {
            key: Box::new(sub(&g.key)),
            value: Box::new(sub(&g.value)),
            non_empty: g.non_empty,
            is_list: g.is_list,
        })),
        TypeAtom::Callable(c) => UnionType::of(TypeAtom::Callable(CallableType {
            params: c.params.as_ref().map(|ps| ps.iter().map(sub).collect()),
            ret: Box::new(sub(&c.ret)),
        })),
        other => UnionType::of(other.clone()),
    }
}

/// Bind `templates` by matching each declared parameter type against the
/// argument type at the same position. Extra arguments match the last
/// declared parameter (variadics). Placeholders nothing matched bind to
/// `mixed`.
pub fn bind_from_arguments(
    templates: &[TemplateRef],
    declared: &[UnionType],
    arguments: &[UnionType],
    limits: TypeLimits,
) -> TemplateBindings {
    let mut candidates: IndexMap<TemplateRef, Vec<UnionType>> =
        templates.iter().map(|t| (t.clone(), Vec::new())).collect();

    for (i, arg) in arguments.iter().enumerate() {
        let param = match declared.get(i).or_else(|| declared.last()) {
            Some(p) => p,
            None => break,
        };
        unify(param, arg, &mut candidates, limits);
    }

    let mut bindings = TemplateBindings::new();
    for (template, found) in candidates {
        let ty = if found.is_empty() {
            UnionType::mixed()
        } else {
            UnionType::union_all(found, limits)
        };
        bindings.insert(template, ty);
    }
    bindings
}

/// Same as [`substitute_templates`]; the name used at call sites
pub fn apply(bindings: &TemplateBindings, ty: &UnionType, limits: TypeLimits) -> UnionType {
    substitute_templates(ty, bindings, limits)
}

fn unify(
    declared: &UnionType,
    arg: &UnionType,
    candidates: &mut IndexMap<TemplateRef, Vec<UnionType>>,
    limits: TypeLimits,
) {
    // `?T` against `int|null` binds T to int
    let arg = if declared.is_nullable() { arg.without_null() } else { arg.clone() };
    if arg.is_empty() {
        return;
    }

    for atom in declared.atoms() {
        match atom {
            TypeAtom::Template(t) => {
                if let Some(found) = candidates.get_mut(t) {
                    found.push(arg.clone());
                }
            }
            TypeAtom::GenericArray(g) => {
                let arrays = arg.filter_atoms(TypeAtom::is_array_like);
                if arrays.atoms().is_empty() {
                    continue;
                }
                unify(&g.key, &arrays.iterable_key_type(limits), candidates, limits);
                unify(&g.value, &arrays.iterable_value_type(limits), candidates, limits);
            }
            TypeAtom::ArrayShape(shape) => {
                for arg_atom in arg.atoms() {
                    if let TypeAtom::ArrayShape(arg_shape) = arg_atom {
                        for (key, field) in shape.fields() {
                            if let Some(arg_field) = arg_shape.field(key) {
                                unify(&field.ty, &arg_field.ty, candidates, limits);
                            }
                        }
                    }
                }
            }
            TypeAtom::Instance { class, args } if !args.is_empty() => {
                for arg_atom in arg.atoms() {
                    if let TypeAtom::Instance { class: arg_class, args: arg_args } = arg_atom {
                        if arg_class == class {
                            for (d, a) in args.iter().zip(arg_args.iter()) {
                                unify(d, a, candidates, limits);
                            }
                        }
                    }
                }
            }
            TypeAtom::Callable(c) => {
                for arg_atom in arg.atoms() {
                    if let TypeAtom::Callable(arg_callable) = arg_atom {
                        unify(&c.ret, &arg_callable.ret, candidates, limits);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::atom::{ArrayKey, ArrayShape, ShapeField};

    fn t() -> TemplateRef {
        TemplateRef::new("T", Fqsen::new("first"))
    }

    fn t_type() -> UnionType {
        UnionType::of(TypeAtom::Template(t()))
    }

    #[test]
    fn test_bind_direct_and_list() {
        let limits = TypeLimits::default();
        let b = bind_from_arguments(&[t()], &[t_type()], &[UnionType::int()], limits);
        assert_eq!(b.get(&t()), Some(&UnionType::int()));

        let shape = ArrayShape::empty()
            .with_field(ArrayKey::Int(0), ShapeField::required(UnionType::literal_string("a")));
        let b = bind_from_arguments(
            &[t()],
            &[UnionType::list_of(t_type())],
            &[UnionType::shape(shape)],
            limits,
        );
        assert_eq!(b.get(&t()), Some(&UnionType::literal_string("a")));
    }

    #[test]
    fn test_unbound_is_mixed_and_substitution_idempotent() {
        let limits = TypeLimits::default();
        let b = bind_from_arguments(&[t()], &[UnionType::int()], &[UnionType::int()], limits);
        assert_eq!(b.get(&t()), Some(&UnionType::mixed()));

        let other = TemplateRef::new("U", Fqsen::new("first"));
        let mut bindings = TemplateBindings::new();
        bindings.insert(t(), UnionType::string());
        let ty = UnionType::list_of(t_type()).union(&UnionType::of(TypeAtom::Template(other)));
        let once = apply(&bindings, &ty, limits);
        let twice = apply(&bindings, &once, limits);
        assert_eq!(once, twice);
        assert_eq!(once.to_string(), "list<string>|U");
    }

    #[test]
    fn test_nullable_param_and_instance_args() {
        let limits = TypeLimits::default();
        let b = bind_from_arguments(&[t()], &[t_type().with_null()], &[UnionType::int().with_null()], limits);
        assert_eq!(b.get(&t()), Some(&UnionType::int()));

        let boxed = Fqsen::new("Box");
        let declared = UnionType::instance_with_args(boxed.clone(), vec![t_type()]);
        let arg = UnionType::instance_with_args(boxed, vec![UnionType::float()]);
        let b = bind_from_arguments(&[t()], &[declared], &[arg], limits);
        assert_eq!(b.get(&t()), Some(&UnionType::float()));
    }
}
