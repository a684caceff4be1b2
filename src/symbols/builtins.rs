//! Signatures of runtime library functions the analyzer understands
//!
//! Consulted after the symbol index. The table is immutable and built
//! once on first use.

use super::{ParamSignature, Signature};
use crate::core::{Fqsen, TypeAtom, UnionType};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;

/// `is_*` functions that narrow their first argument
pub const TYPE_PREDICATES: &[&str] = &[
    "is_int",
    "is_integer",
    "is_long",
    "is_float",
    "is_double",
    "is_string",
    "is_bool",
    "is_array",
    "is_object",
    "is_null",
    "is_numeric",
    "is_scalar",
    "is_callable",
    "is_iterable",
    "is_countable",
    "is_resource",
];

static BUILTINS: Lazy<HashMap<String, Arc<Signature>>> = Lazy::new(|| {
    let mut table = HashMap::new();
    let mut add = |sig: Signature| {
        table.insert(sig.fqsen.key()[1..].to_string(), Arc::new(sig));
    };

    for name in TYPE_PREDICATES {
        add(func(name, &[("value", UnionType::mixed())]).returning(UnionType::bool()));
    }

    let array = UnionType::array();
    let countable = UnionType::array().union(&UnionType::instance(Fqsen::new("Countable")));
    add(func("count", &[("value", countable.clone())]).returning(UnionType::int()));
    add(func("sizeof", &[("value", countable)]).returning(UnionType::int()));
    add(func("strlen", &[("string", UnionType::string())]).returning(UnionType::int()));
    add(func("intval", &[("value", UnionType::mixed())]).returning(UnionType::int()));
    add(func("floatval", &[("value", UnionType::mixed())]).returning(UnionType::float()));
    add(func("strval", &[("value", UnionType::mixed())]).returning(UnionType::string()));
    add(func("boolval", &[("value", UnionType::mixed())]).returning(UnionType::bool()));
    add(func("gettype", &[("value", UnionType::mixed())]).returning(UnionType::string()));
    add(func("spl_object_id", &[("object", UnionType::object())]).returning(UnionType::int()));
    add(func("json_encode", &[("value", UnionType::mixed())])
        .returning(UnionType::string().union(&UnionType::literal_bool(false))));
    add(func("implode", &[("separator", UnionType::string()), ("array", array.clone())])
        .returning(UnionType::string()));
    add(func("explode", &[("separator", UnionType::string()), ("string", UnionType::string())])
        .returning(UnionType::list_of(UnionType::string())));
    add(func("in_array", &[("needle", UnionType::mixed()), ("haystack", array.clone())])
        .returning(UnionType::bool()));
    add(func("array_key_exists", &[("key", UnionType::mixed()), ("array", array.clone())])
        .returning(UnionType::bool()));
    add(func("array_merge", &[("arrays", array.clone())]).with_variadic().returning(array.clone()));
    add(func("assert", &[("assertion", UnionType::mixed())]).returning(UnionType::bool()));

    // array_keys / array_values / array_filter keep element types
    let keys = Signature::new(Fqsen::new("array_keys")).with_templates(&["K", "V"]);
    let (k, v) = (template(&keys, "K"), template(&keys, "V"));
    add(keys
        .with_params(vec![ParamSignature::new("array", Some(UnionType::array_of(k.clone(), v)))])
        .returning(UnionType::list_of(k))
        .pure());

    let values = Signature::new(Fqsen::new("array_values")).with_templates(&["K", "V"]);
    let (k, v) = (template(&values, "K"), template(&values, "V"));
    add(values
        .with_params(vec![ParamSignature::new("array", Some(UnionType::array_of(k, v.clone())))])
        .returning(UnionType::list_of(v))
        .pure());

    let filter = Signature::new(Fqsen::new("array_filter")).with_templates(&["K", "V"]);
    let (k, v) = (template(&filter, "K"), template(&filter, "V"));
    add(filter
        .with_params(vec![
            ParamSignature::new("array", Some(UnionType::array_of(k.clone(), v.clone()))),
            ParamSignature::new("callback", Some(UnionType::callable().with_null())).optional(),
        ])
        .returning(UnionType::array_of(k, v)));

    table
});

fn func(name: &str, params: &[(&str, UnionType)]) -> Signature {
    Signature::new(Fqsen::new(name))
        .with_params(params.iter().map(|(n, ty)| ParamSignature::new(n, Some(ty.clone()))).collect())
        .pure()
}

fn template(sig: &Signature, name: &str) -> UnionType {
    UnionType::of(TypeAtom::Template(sig.template(name)))
}

impl Signature {
    fn with_variadic(mut self) -> Self {
        if let Some(last) = self.params.pop() {
            self.params.push(last.variadic());
        }
        self
    }
}

/// Builtin signature for a function name, case-insensitive
pub fn lookup(fqsen: &Fqsen) -> Option<Arc<Signature>> {
    BUILTINS.get(&fqsen.key()[1..]).cloned()
}

pub fn is_type_predicate(fqsen: &Fqsen) -> bool {
    TYPE_PREDICATES.iter().any(|p| fqsen.is(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::template::{apply, bind_from_arguments};
    use crate::core::TypeLimits;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert!(lookup(&Fqsen::new("COUNT")).is_some());
        assert!(lookup(&Fqsen::new("\\strlen")).is_some());
        assert!(lookup(&Fqsen::new("no_such_function")).is_none());
        assert!(is_type_predicate(&Fqsen::new("is_string")));
    }

    #[test]
    fn test_array_values_is_templated() {
        let sig = lookup(&Fqsen::new("array_values")).unwrap();
        let limits = TypeLimits::default();
        let declared: Vec<UnionType> = sig.params.iter().filter_map(|p| p.ty.clone()).collect();
        let arg = UnionType::array_of(UnionType::string(), UnionType::int());
        let bindings = bind_from_arguments(&sig.template_params, &declared, &[arg], limits);
        let ret = apply(&bindings, sig.return_type.as_ref().unwrap(), limits);
        assert_eq!(ret, UnionType::list_of(UnionType::int()));
    }
}
