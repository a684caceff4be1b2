use phpflow::ast::{AstBuilder, BinaryOp, ExprKind};
use phpflow::core::{Fqsen, TypeAtom, UnionType};
use phpflow::errors::DiagnosticKind;
use phpflow::symbols::{ClassDescriptor, MemorySymbolIndex, SymbolIndex};
use phpflow::{analyze_function_like, Analyzer};
use std::sync::Arc;

fn index_with(classes: &[&str]) -> Arc<dyn SymbolIndex> {
    let index = MemorySymbolIndex::new();
    for class in classes {
        index.register_class(ClassDescriptor::new(class));
    }
    Arc::new(index)
}

#[test]
fn test_null_check_narrows_nullable_parameter() {
    let b = AstBuilder::new();
    let sum = b.binary(BinaryOp::Add, b.var("x"), b.int(1));
    let x_read = match &sum.kind {
        ExprKind::Binary { left, .. } => left.id,
        _ => unreachable!(),
    };
    let decl = b.function(
        "f",
        vec![b.typed_param("x", UnionType::int().with_null())],
        vec![
            b.if_then(b.identical(b.var("x"), b.null()), vec![b.ret_value(b.int(0))]),
            b.ret_value(sum),
        ],
    );

    let analysis = analyze_function_like(&decl, index_with(&[])).unwrap();
    assert_eq!(analysis.type_of(x_read), Some(&UnionType::int()));
    assert_eq!(analysis.inferred_return_type, UnionType::int());
    assert!(!analysis.has_errors());
}

#[test]
fn test_is_array_branch_sees_only_array() {
    let b = AstBuilder::new();
    let counted = b.var("x");
    let counted_id = counted.id;
    let decl = b.function(
        "g",
        vec![b.doc_param("x", UnionType::array().union(&UnionType::string()))],
        vec![
            b.if_then(
                b.call("is_array", vec![b.var("x")]),
                vec![b.ret_value(b.call("count", vec![counted]))],
            ),
            b.ret_value(b.int(0)),
        ],
    );

    let analysis = analyze_function_like(&decl, index_with(&[])).unwrap();
    assert_eq!(analysis.type_of(counted_id), Some(&UnionType::array()));
    assert_eq!(analysis.inferred_return_type, UnionType::int());
    assert!(analysis.diagnostics.is_empty());
}

#[test]
fn test_catch_block_coalesce_is_not_redundant() {
    let b = AstBuilder::new();
    let decl = b.function(
        "h",
        vec![],
        vec![
            b.try_catch(
                vec![
                    b.expr_stmt(b.assign(b.var("a"), b.int(1))),
                    b.throw(b.new_object("E", vec![])),
                ],
                vec![b.catch(
                    &["E"],
                    Some("e"),
                    vec![b.expr_stmt(b.assign(b.var("a"), b.coalesce(b.var("a"), b.int(2))))],
                )],
                None,
            ),
            b.ret_value(b.var("a")),
        ],
    );

    let analysis = analyze_function_like(&decl, index_with(&["E"])).unwrap();
    assert!(analysis
        .diagnostics
        .iter()
        .all(|d| !matches!(d.kind, DiagnosticKind::RedundantCoalesce { .. })));
    assert_eq!(
        analysis.inferred_return_type,
        UnionType::literal_int(1).union(&UnionType::literal_int(2))
    );
}

#[test]
fn test_switch_fallthrough_collects_both_assignments() {
    let b = AstBuilder::new();
    let subject = UnionType::literal_string("a").union(&UnionType::literal_string("b"));
    let decl = b.function(
        "pick",
        vec![b.doc_param("s", subject)],
        vec![
            b.switch(
                b.var("s"),
                vec![
                    b.case(b.string("a"), vec![b.expr_stmt(b.assign(b.var("r"), b.int(1)))]),
                    b.case(b.string("b"), vec![b.expr_stmt(b.assign(b.var("r"), b.int(2))), b.break_loop(1)]),
                ],
            ),
            b.ret_value(b.var("r")),
        ],
    );

    let analysis = analyze_function_like(&decl, index_with(&[])).unwrap();
    assert_eq!(analysis.inferred_return_type, UnionType::literal_int(2));
}

#[test]
fn test_loop_append_builds_int_array() {
    let b = AstBuilder::new();
    let decl = b.function(
        "collect",
        vec![b.typed_param("n", UnionType::int())],
        vec![
            b.expr_stmt(b.assign(b.var("out"), b.array(vec![]))),
            b.for_loop(
                vec![b.assign(b.var("i"), b.int(0))],
                vec![b.binary(BinaryOp::Less, b.var("i"), b.var("n"))],
                vec![b.post_inc(b.var("i"))],
                vec![b.expr_stmt(b.assign(b.append(b.var("out")), b.var("i")))],
            ),
            b.ret_value(b.var("out")),
        ],
    );

    let analysis = analyze_function_like(&decl, index_with(&[])).unwrap();
    let returned = &analysis.inferred_return_type;
    assert!(returned.is_array_like());
    assert!(returned.atoms().iter().any(|atom| match atom {
        TypeAtom::GenericArray(g) => g.value.atoms().iter().all(|v| matches!(
            v,
            TypeAtom::Scalar(_) | TypeAtom::Literal(_)
        )),
        _ => false,
    }));
}

#[test]
fn test_impossible_predicate_is_reported() {
    let b = AstBuilder::new();
    let decl = b.function(
        "k",
        vec![b.typed_param("x", UnionType::int())],
        vec![
            b.if_then(b.call("is_string", vec![b.var("x")]), vec![b.ret_value(b.string("s"))]),
            b.ret_value(b.var("x")),
        ],
    );

    let analysis = analyze_function_like(&decl, index_with(&[])).unwrap();
    assert!(analysis
        .diagnostics
        .iter()
        .any(|d| matches!(d.kind, DiagnosticKind::ImpossibleCondition { .. })));
    assert_eq!(analysis.inferred_return_type, UnionType::int());
}

#[test]
fn test_instanceof_narrows_to_subclass() {
    let b = AstBuilder::new();
    let index = MemorySymbolIndex::new();
    index.register_class(ClassDescriptor::new("Base"));
    index.register_class(ClassDescriptor::new("Child").with_parent("Base"));
    let decl = b.function(
        "narrowed",
        vec![b.typed_param("o", UnionType::instance(Fqsen::new("Base")))],
        vec![
            b.if_then(b.instanceof(b.var("o"), "Child"), vec![b.ret_value(b.var("o"))]),
            b.ret_value(b.null()),
        ],
    );

    let analyzer = Analyzer::with_default_config(Arc::new(index));
    let analysis = analyzer.analyze_function_like(&decl).unwrap();
    assert_eq!(
        analysis.inferred_return_type,
        UnionType::instance(Fqsen::new("Child")).with_null()
    );
}
