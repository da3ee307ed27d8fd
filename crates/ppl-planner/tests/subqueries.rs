//! Scalar, exists and in sub-queries, correlated and not

mod support;

use ppl_ast::dsl::*;
use ppl_ast::UnresolvedPlan;
use ppl_ir::{DataType, LogicalPlan};
use ppl_planner::{ColumnInfo, MemorySchemaProvider, PlanErrorKind, Planner, PlannerConfig, TableSchema};
use support::{scott, Row, Tables};

fn provider() -> MemorySchemaProvider {
    MemorySchemaProvider::new()
        .with_table(TableSchema {
            name: "T".into(),
            columns: vec![
                ColumnInfo::new("a", DataType::Int64),
                ColumnInfo::new("b", DataType::String),
            ],
        })
        .with_table(TableSchema {
            name: "U".into(),
            columns: vec![ColumnInfo::new("a", DataType::Int64)],
        })
}

fn tables() -> Tables {
    Tables::default()
        .with(
            "T",
            vec![
                vec![support::int(1), support::string("x")],
                vec![support::int(2), support::string("x")],
                vec![support::int(1), support::string("y")],
            ],
        )
        .with(
            "U",
            vec![
                vec![support::int(1)],
                vec![support::int(2)],
                vec![support::int(5)],
            ],
        )
}

fn run(query: &UnresolvedPlan) -> (LogicalPlan, Vec<Row>) {
    let provider = provider();
    let plan = Planner::new(&provider).plan(query).unwrap();
    let rows = tables().execute(&plan);
    (plan, rows)
}

#[test]
fn test_uncorrelated_scalar_subquery() {
    let provider = scott();
    let average = relation("EMP").stats(vec![alias("a", aggregate("avg", vec![field("SAL")]))], vec![]);
    let query = relation("EMP").filter(gt(field("SAL"), scalar_subquery(average)));

    let plan = Planner::new(&provider).plan(&query).unwrap();
    assert_eq!(
        plan.explain(),
        "LogicalFilter(condition=[>($5, $SCALAR_QUERY({\n\
         LogicalAggregate(group=[{}], a=[AVG($0)])\n\
         \x20 LogicalProject(SAL=[$5])\n\
         \x20   LogicalTableScan(table=[[scott, EMP]])\n\
         }))])\n\
         \x20 LogicalTableScan(table=[[scott, EMP]])\n"
    );
}

#[test]
fn test_correlated_exists() {
    let provider = scott();
    let inner = relation("DEPT").filter(eq(field("DEPTNO"), field("EMP.DEPTNO")));
    let query = relation("EMP").filter(exists(inner));

    let plan = Planner::new(&provider).plan(&query).unwrap();
    assert_eq!(
        plan.explain(),
        "LogicalFilter(condition=[EXISTS({\n\
         LogicalFilter(condition=[=($0, $cor0.DEPTNO)])\n\
         \x20 LogicalTableScan(table=[[scott, DEPT]])\n\
         })], variablesSet=[[$cor0]])\n\
         \x20 LogicalTableScan(table=[[scott, EMP]])\n"
    );
}

#[test]
fn test_in_subquery_filters_rows() {
    let query = relation("U").filter(in_subquery(
        vec![field("a")],
        relation("T").fields(vec![field("a")]),
    ));

    let (plan, rows) = run(&query);
    assert!(matches!(plan, LogicalPlan::Filter { correlation: None, .. }));
    assert_eq!(rows, vec![vec![support::int(1)], vec![support::int(2)]]);
}

#[test]
fn test_in_subquery_width_mismatch() {
    let provider = provider();
    let query = relation("U").filter(in_subquery(vec![field("a")], relation("T")));

    let err = Planner::new(&provider).plan(&query).unwrap_err();
    assert_eq!(err.kind(), PlanErrorKind::Semantic);
}

#[test]
fn test_correlated_scalar_in_eval() {
    let matches = relation("T")
        .filter(eq(field("a"), field("U.a")))
        .stats(vec![alias("c", aggregate("count", vec![]))], vec![]);
    let query = relation("U").eval(vec![let_("n", scalar_subquery(matches))]);

    let (plan, rows) = run(&query);
    assert!(matches!(
        plan,
        LogicalPlan::Project {
            correlation: Some(_),
            ..
        }
    ));
    assert_eq!(plan.schema().names(), vec!["a", "n"]);
    assert_eq!(
        rows,
        vec![
            vec![support::int(1), support::int(2)],
            vec![support::int(2), support::int(1)],
            vec![support::int(5), support::int(0)],
        ]
    );
}

#[test]
fn test_nested_correlations_resolve_innermost_first() {
    // T.a and T.b in the innermost query are the middle query's row
    let innermost = relation("U").filter(and(eq(field("a"), field("T.a")), eq(field("T.b"), string("x"))));
    let middle = relation("T").filter(and(eq(field("a"), field("U.a")), exists(innermost)));
    let query = relation("U").filter(exists(middle));

    let (_, rows) = run(&query);
    assert_eq!(rows, vec![vec![support::int(1)], vec![support::int(2)]]);
}

#[test]
fn test_subquery_depth_counts_against_limit() {
    let provider = provider();
    let inner = relation("T").filter(eq(field("a"), field("U.a")));
    let query = relation("U").filter(exists(inner));

    let planner = Planner::new(&provider).with_config(PlannerConfig {
        max_depth: 3,
        ..PlannerConfig::default()
    });
    assert!(planner.plan(&relation("U").filter(eq(field("a"), int(1)))).is_ok());
    let err = planner.plan(&query).unwrap_err();
    assert_eq!(err.kind(), PlanErrorKind::DepthExceeded);
}
