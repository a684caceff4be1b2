//! Type atoms: one indivisible possible run-time shape of a value

use crate::core::fqsen::Fqsen;
use crate::core::union::{TypeLimits, UnionType};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    String,
    Resource,
}

impl ScalarKind {
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int => "int",
            ScalarKind::Float => "float",
            ScalarKind::String => "string",
            ScalarKind::Resource => "resource",
        }
    }

    /// Kinds that weak-mode coercion may convert between
    pub fn is_coercible(self) -> bool {
        !matches!(self, ScalarKind::Resource)
    }
}

/// A single literal value, narrower than its scalar kind
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LiteralValue {
    Int(i64),
    String(Arc<str>),
    Bool(bool),
}

impl LiteralValue {
    pub fn kind(&self) -> ScalarKind {
        match self {
            LiteralValue::Int(_) => ScalarKind::Int,
            LiteralValue::String(_) => ScalarKind::String,
            LiteralValue::Bool(_) => ScalarKind::Bool,
        }
    }

    /// PHP truthiness of the literal
    pub fn is_truthy(&self) -> bool {
        match self {
            LiteralValue::Int(n) => *n != 0,
            LiteralValue::String(s) => !(s.is_empty() || &**s == "0"),
            LiteralValue::Bool(b) => *b,
        }
    }

    pub fn is_numeric(&self) -> bool {
        match self {
            LiteralValue::Int(_) => true,
            LiteralValue::String(s) => {
                let t = s.trim();
                !t.is_empty() && t.parse::<f64>().is_ok()
            }
            LiteralValue::Bool(_) => false,
        }
    }

    pub fn as_array_key(&self) -> ArrayKey {
        match self {
            LiteralValue::Int(n) => ArrayKey::Int(*n),
            LiteralValue::String(s) => ArrayKey::from_str_key(s),
            LiteralValue::Bool(b) => ArrayKey::Int(i64::from(*b)),
        }
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Int(n) => write!(f, "{}", n),
            LiteralValue::String(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
            LiteralValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Array offset key. Decimal integer strings are stored as integers, the
/// way the runtime normalizes them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArrayKey {
    Int(i64),
    String(Arc<str>),
}

impl ArrayKey {
    pub fn from_str_key(s: &str) -> Self {
        let canonical = s == "0"
            || (!s.starts_with('0') && !s.starts_with("-0") && !s.starts_with('+'));
        match s.parse::<i64>() {
            Ok(n) if canonical => ArrayKey::Int(n),
            _ => ArrayKey::String(Arc::from(s)),
        }
    }

    pub fn literal_type(&self) -> UnionType {
        match self {
            ArrayKey::Int(n) => UnionType::literal_int(*n),
            ArrayKey::String(s) => UnionType::literal_string(s),
        }
    }
}

impl fmt::Display for ArrayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayKey::Int(n) => write!(f, "{}", n),
            ArrayKey::String(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeField {
    pub ty: UnionType,
    pub optional: bool,
}

impl ShapeField {
    pub fn required(ty: UnionType) -> Self {
        Self { ty, optional: false }
    }

    pub fn optional(ty: UnionType) -> Self {
        Self { ty, optional: true }
    }
}

/// `array{key: T, ...}` with a known set of offsets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayShape {
    fields: IndexMap<ArrayKey, ShapeField>,
    is_list: bool,
}

impl ArrayShape {
    /// The empty array literal `[]`
    pub fn empty() -> Self {
        Self { fields: IndexMap::new(), is_list: true }
    }

    pub fn from_fields(fields: IndexMap<ArrayKey, ShapeField>) -> Self {
        let is_list = fields
            .iter()
            .enumerate()
            .all(|(i, (k, f))| *k == ArrayKey::Int(i as i64) && !f.optional);
        Self { fields, is_list }
    }

    pub fn fields(&self) -> &IndexMap<ArrayKey, ShapeField> {
        &self.fields
    }

    pub fn field(&self, key: &ArrayKey) -> Option<&ShapeField> {
        self.fields.get(key)
    }

    pub fn is_list(&self) -> bool {
        self.is_list
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// A shape with at least one required field is never empty
    pub fn has_required_field(&self) -> bool {
        self.fields.values().any(|f| !f.optional)
    }

    pub fn with_field(&self, key: ArrayKey, field: ShapeField) -> Self {
        let mut fields = self.fields.clone();
        fields.insert(key, field);
        Self::from_fields(fields)
    }

    pub fn without_field(&self, key: &ArrayKey) -> Self {
        let mut fields = self.fields.clone();
        fields.shift_remove(key);
        Self::from_fields(fields)
    }

    /// Offset used by `$a[] = ...`
    pub fn next_index(&self) -> i64 {
        self.fields
            .keys()
            .filter_map(|k| match k {
                ArrayKey::Int(n) => Some(*n),
                ArrayKey::String(_) => None,
            })
            .max()
            .map_or(0, |n| n.saturating_add(1))
    }

    pub fn key_union(&self) -> UnionType {
        UnionType::union_all(self.fields.keys().map(|k| k.literal_type()), TypeLimits::default())
    }

    pub fn value_union(&self, limits: TypeLimits) -> UnionType {
        UnionType::union_all(self.fields.values().map(|f| f.ty.clone()), limits)
    }

    pub fn map_values(&self, mut f: impl FnMut(&UnionType) -> UnionType) -> Self {
        let fields = self
            .fields
            .iter()
            .map(|(k, field)| (k.clone(), ShapeField { ty: f(&field.ty), optional: field.optional }))
            .collect();
        Self { fields, is_list: self.is_list }
    }

    /// Collapse into `array<K, V>` / `list<V>`
    pub fn to_generic(&self, limits: TypeLimits) -> GenericArray {
        let key = if self.is_list {
            UnionType::int()
        } else {
            self.key_union().generalize(limits)
        };
        GenericArray {
            key: Box::new(key),
            value: Box::new(self.value_union(limits)),
            non_empty: self.has_required_field(),
            is_list: self.is_list,
        }
    }
}

impl fmt::Display for ArrayShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "array{{")?;
        for (i, (key, field)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            let opt = if field.optional { "?" } else { "" };
            write!(f, "{}{}:{}", key, opt, field.ty)?;
        }
        write!(f, "}}")
    }
}

/// `array<K, V>`, `list<V>` and their non-empty variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericArray {
    pub key: Box<UnionType>,
    pub value: Box<UnionType>,
    pub non_empty: bool,
    pub is_list: bool,
}

impl GenericArray {
    pub fn new(key: UnionType, value: UnionType) -> Self {
        Self { key: Box::new(key), value: Box::new(value), non_empty: false, is_list: false }
    }

    pub fn list(value: UnionType) -> Self {
        Self { key: Box::new(UnionType::int()), value: Box::new(value), non_empty: false, is_list: true }
    }

    /// `array` with no further information
    pub fn any() -> Self {
        Self::new(UnionType::array_key(), UnionType::mixed())
    }

    pub fn with_non_empty(&self, non_empty: bool) -> Self {
        Self { non_empty, ..self.clone() }
    }

    /// True if `other` describes every value this one does
    pub fn is_subsumed_by(&self, other: &GenericArray) -> bool {
        self.key == other.key
            && self.value == other.value
            && (!other.non_empty || self.non_empty)
            && (!other.is_list || self.is_list)
    }
}

impl fmt::Display for GenericArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.non_empty { "non-empty-" } else { "" };
        if self.is_list {
            return write!(f, "{}list<{}>", prefix, self.value);
        }
        if self.value.is_mixed() && *self.key == UnionType::array_key() {
            return write!(f, "{}array", prefix);
        }
        write!(f, "{}array<{},{}>", prefix, self.key, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallableType {
    /// `None` for a bare `callable`
    pub params: Option<Vec<UnionType>>,
    pub ret: Box<UnionType>,
}

impl CallableType {
    pub fn any() -> Self {
        Self { params: None, ret: Box::new(UnionType::mixed()) }
    }
}

impl fmt::Display for CallableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.params {
            None => write!(f, "callable"),
            Some(params) => {
                let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
                write!(f, "callable({}):{}", params.join(","), self.ret)
            }
        }
    }
}

/// A template parameter, identified by its name and the declaration owning it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateRef {
    pub name: Arc<str>,
    pub owner: Fqsen,
}

impl TemplateRef {
    pub fn new(name: &str, owner: Fqsen) -> Self {
        Self { name: Arc::from(name), owner }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeAtom {
    Scalar(ScalarKind),
    Literal(LiteralValue),
    Instance { class: Fqsen, args: Vec<UnionType> },
    /// Any object
    Object,
    ArrayShape(ArrayShape),
    GenericArray(GenericArray),
    Callable(CallableType),
    Template(TemplateRef),
    /// Late static binding placeholder (`static`)
    StaticSelf,
    Mixed,
    Never,
}

impl TypeAtom {
    pub fn instance(class: Fqsen) -> Self {
        TypeAtom::Instance { class, args: Vec::new() }
    }

    /// Scalar kind of a scalar or literal atom
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            TypeAtom::Scalar(k) => Some(*k),
            TypeAtom::Literal(v) => Some(v.kind()),
            _ => None,
        }
    }

    pub fn is_object_like(&self) -> bool {
        matches!(self, TypeAtom::Instance { .. } | TypeAtom::Object | TypeAtom::StaticSelf)
    }

    pub fn is_array_like(&self) -> bool {
        matches!(self, TypeAtom::ArrayShape(_) | TypeAtom::GenericArray(_))
    }

    /// Atoms the analysis cannot see through
    pub fn is_opaque(&self) -> bool {
        matches!(self, TypeAtom::Mixed | TypeAtom::Template(_))
    }

    pub fn is_instance_of_class(&self, name: &str) -> bool {
        matches!(self, TypeAtom::Instance { class, .. } if class.is(name))
    }

    /// Drop literal precision, turn shapes into generic arrays
    pub fn generalized(&self, limits: TypeLimits) -> TypeAtom {
        match self {
            TypeAtom::Literal(v) => TypeAtom::Scalar(v.kind()),
            TypeAtom::ArrayShape(shape) => {
                let g = shape.to_generic(limits);
                TypeAtom::GenericArray(GenericArray {
                    key: Box::new(g.key.generalize(limits)),
                    value: Box::new(g.value.generalize(limits)),
                    ..g
                })
            }
            TypeAtom::GenericArray(g) => TypeAtom::GenericArray(GenericArray {
                key: Box::new(g.key.generalize(limits)),
                value: Box::new(g.value.generalize(limits)),
                ..g.clone()
            }),
            other => other.clone(),
        }
    }

    /// True if the value always converts to `true`
    pub fn is_always_truthy(&self) -> bool {
        match self {
            TypeAtom::Literal(v) => v.is_truthy(),
            TypeAtom::Scalar(ScalarKind::Resource) => true,
            TypeAtom::Instance { .. } => !self.is_instance_of_class("SimpleXMLElement"),
            TypeAtom::Object | TypeAtom::StaticSelf | TypeAtom::Callable(_) => true,
            TypeAtom::ArrayShape(s) => s.has_required_field(),
            TypeAtom::GenericArray(g) => g.non_empty,
            _ => false,
        }
    }

    /// True if the value always converts to `false`
    pub fn is_always_falsey(&self) -> bool {
        match self {
            TypeAtom::Literal(v) => !v.is_truthy(),
            TypeAtom::ArrayShape(s) => s.is_empty(),
            TypeAtom::Never => true,
            _ => false,
        }
    }
}

impl fmt::Display for TypeAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeAtom::Scalar(k) => write!(f, "{}", k.name()),
            TypeAtom::Literal(v) => write!(f, "{}", v),
            TypeAtom::Instance { class, args } => {
                if args.is_empty() {
                    write!(f, "{}", class)
                } else {
                    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                    write!(f, "{}<{}>", class, args.join(","))
                }
            }
            TypeAtom::Object => write!(f, "object"),
            TypeAtom::ArrayShape(s) => write!(f, "{}", s),
            TypeAtom::GenericArray(g) => write!(f, "{}", g),
            TypeAtom::Callable(c) => write!(f, "{}", c),
            TypeAtom::Template(t) => write!(f, "{}", t.name),
            TypeAtom::StaticSelf => write!(f, "static"),
            TypeAtom::Mixed => write!(f, "mixed"),
            TypeAtom::Never => write!(f, "never"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_key_normalization() {
        assert_eq!(ArrayKey::from_str_key("12"), ArrayKey::Int(12));
        assert_eq!(ArrayKey::from_str_key("-3"), ArrayKey::Int(-3));
        assert_eq!(ArrayKey::from_str_key("012"), ArrayKey::String(Arc::from("012")));
        assert_eq!(ArrayKey::from_str_key("name"), ArrayKey::String(Arc::from("name")));
        assert_eq!(ArrayKey::from_str_key("0"), ArrayKey::Int(0));
    }

    #[test]
    fn test_shape_list_detection() {
        let shape = ArrayShape::empty()
            .with_field(ArrayKey::Int(0), ShapeField::required(UnionType::int()))
            .with_field(ArrayKey::Int(1), ShapeField::required(UnionType::string()));
        assert!(shape.is_list());
        assert_eq!(shape.next_index(), 2);

        let assoc = shape.with_field(ArrayKey::String(Arc::from("k")), ShapeField::required(UnionType::int()));
        assert!(!assoc.is_list());
        assert_eq!(assoc.to_string(), "array{0:int,1:string,k:int}");
    }

    #[test]
    fn test_literal_truthiness() {
        assert!(!LiteralValue::String(Arc::from("0")).is_truthy());
        assert!(!LiteralValue::String(Arc::from("")).is_truthy());
        assert!(LiteralValue::String(Arc::from("0.0")).is_truthy());
        assert!(!LiteralValue::Int(0).is_truthy());
        assert!(LiteralValue::Int(-1).is_truthy());
    }

    #[test]
    fn test_generalize_shape() {
        let shape = ArrayShape::empty()
            .with_field(ArrayKey::Int(0), ShapeField::required(UnionType::literal_int(1)));
        let g = TypeAtom::ArrayShape(shape).generalized(TypeLimits::default());
        assert_eq!(g.to_string(), "non-empty-list<int>");
    }
}
