//! The (declared, real) pair carried by every inferred value

use crate::core::union::{TypeLimits, UnionType};
use std::fmt;

/// `ty` is what annotations and inference claim, trusted optimistically.
/// `real` is what control flow proves; `mixed` in `real` means nothing is
/// proven. `real` is never narrower than what was established, only
/// tightened by narrowing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowType {
    pub ty: UnionType,
    pub real: UnionType,
}

impl FlowType {
    pub fn new(ty: UnionType, real: UnionType) -> Self {
        Self { ty, real }
    }

    /// Known only from a declaration
    pub fn declared(ty: UnionType) -> Self {
        Self { ty, real: UnionType::mixed() }
    }

    /// Proven by the value itself (literals, `new`, builtin guarantees)
    pub fn exact(ty: UnionType) -> Self {
        Self { real: ty.clone(), ty }
    }

    pub fn mixed() -> Self {
        Self::exact(UnionType::mixed())
    }

    pub fn empty() -> Self {
        Self::exact(UnionType::empty())
    }

    pub fn is_real_known(&self) -> bool {
        !self.real.is_mixed()
    }

    pub fn is_empty(&self) -> bool {
        self.ty.is_empty()
    }

    pub fn union_with(&self, other: &FlowType, limits: TypeLimits) -> FlowType {
        FlowType {
            ty: self.ty.union_with(&other.ty, limits),
            real: self.real.union_with(&other.real, limits),
        }
    }

    /// Apply the same projection to both channels
    pub fn map(&self, mut f: impl FnMut(&UnionType) -> UnionType) -> FlowType {
        let ty = f(&self.ty);
        let real = if self.real.is_mixed() { self.real.clone() } else { f(&self.real) };
        FlowType { ty, real }
    }

    pub fn without_null(&self) -> FlowType {
        self.map(UnionType::without_null)
    }

    pub fn generalize(&self, limits: TypeLimits) -> FlowType {
        FlowType { ty: self.ty.generalize(limits), real: self.real.generalize(limits) }
    }
}

impl From<UnionType> for FlowType {
    fn from(ty: UnionType) -> Self {
        FlowType::exact(ty)
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_keeps_unknown_real() {
        let t = FlowType::declared(UnionType::int().with_null());
        let narrowed = t.without_null();
        assert_eq!(narrowed.ty, UnionType::int());
        assert!(!narrowed.is_real_known());

        let exact = FlowType::exact(UnionType::int().with_null()).without_null();
        assert_eq!(exact.real, UnionType::int());
    }
}
