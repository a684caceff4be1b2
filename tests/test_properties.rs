use phpflow::ast::AstBuilder;
use phpflow::core::{FlowType, Fqsen, TypeLimits, UnionType};
use phpflow::scope::{EdgeKind, ScopeSnapshot};
use phpflow::symbols::{MemorySymbolIndex, SymbolIndex};
use phpflow::Analyzer;
use proptest::prelude::*;
use std::sync::Arc;

fn atom_type() -> impl Strategy<Value = UnionType> {
    prop_oneof![
        Just(UnionType::int()),
        Just(UnionType::float()),
        Just(UnionType::string()),
        Just(UnionType::bool()),
        Just(UnionType::null()),
        Just(UnionType::array()),
        Just(UnionType::instance(Fqsen::new("Widget"))),
        (-3i64..3).prop_map(UnionType::literal_int),
        "[a-c]".prop_map(|s| UnionType::literal_string(&s)),
    ]
}

fn union_type() -> impl Strategy<Value = UnionType> {
    prop::collection::vec(atom_type(), 1..4)
        .prop_map(|parts| UnionType::union_all(parts, TypeLimits::default()))
}

fn scope() -> impl Strategy<Value = ScopeSnapshot> {
    prop::collection::vec((union_type(), any::<bool>()), 1..4).prop_map(|vars| {
        vars.into_iter().enumerate().fold(ScopeSnapshot::new(), |scope, (i, (ty, definite))| {
            scope.with_assigned(&format!("v{}", i), FlowType::declared(ty), definite)
        })
    })
}

fn analyzer() -> Analyzer {
    let index: Arc<dyn SymbolIndex> = Arc::new(MemorySymbolIndex::new());
    Analyzer::with_default_config(index)
}

proptest! {
    #[test]
    fn union_is_commutative(a in union_type(), b in union_type()) {
        prop_assert_eq!(a.union(&b), b.union(&a));
    }

    #[test]
    fn union_is_idempotent(a in union_type()) {
        prop_assert_eq!(a.union(&a), a);
    }

    #[test]
    fn merge_with_itself_is_identity(s in scope()) {
        let limits = TypeLimits::default();
        prop_assert_eq!(ScopeSnapshot::merge_all(&[s.clone(), s.clone()], limits), s);
    }

    #[test]
    fn merge_ignores_unreachable_and_returning_inputs(s in scope(), other in scope()) {
        let merged = ScopeSnapshot::merge(
            &[
                (s.clone(), EdgeKind::Normal),
                (ScopeSnapshot::unreachable(), EdgeKind::Normal),
                (other, EdgeKind::Return),
            ],
            TypeLimits::default(),
        );
        prop_assert_eq!(merged, s);
    }

    #[test]
    fn predicate_narrowing_is_idempotent(
        ty in union_type(),
        predicate in prop::sample::select(vec!["is_int", "is_string", "is_array", "is_null", "is_numeric"]),
    ) {
        let b = AstBuilder::new();
        let analyzer = analyzer();
        let cond = b.call(predicate, vec![b.var("v")]);
        let scope = ScopeSnapshot::new().with_assigned("v", FlowType::declared(ty), true);

        let (once, _) = analyzer.narrow_condition(&cond, &scope, None);
        prop_assume!(!once.is_unreachable());
        let (twice, _) = analyzer.narrow_condition(&cond, &once, None);
        prop_assert_eq!(twice.get("v"), once.get("v"));
    }

    #[test]
    fn narrowed_branches_cover_the_input(ty in union_type()) {
        let b = AstBuilder::new();
        let analyzer = analyzer();
        let cond = b.call("is_string", vec![b.var("v")]);
        let scope = ScopeSnapshot::new().with_assigned("v", FlowType::declared(ty.clone()), true);

        let (t, f) = analyzer.narrow_condition(&cond, &scope, None);
        let t_ty = t.get("v").cloned().unwrap_or_else(UnionType::empty);
        let f_ty = f.get("v").cloned().unwrap_or_else(UnionType::empty);
        prop_assert_eq!(t_ty.union(&f_ty), ty);
    }
}
