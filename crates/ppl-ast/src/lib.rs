//! PPL AST - unresolved plan and expression types

pub mod ast;
pub mod dsl;

pub use ast::*;

#[cfg(test)]
mod tests {
    use super::dsl::*;
    use super::*;

    #[test]
    fn test_base_relation_follows_primary_input() {
        let plan = relation("scott.EMP")
            .filter(gt(field("SAL"), int(100)))
            .head(5, 0);

        match plan.base_relation() {
            Some(UnresolvedPlan::Relation(r)) => {
                assert_eq!(r.table.parts, vec!["scott", "EMP"]);
                assert_eq!(r.table.simple_name(), "EMP");
            }
            other => panic!("expected relation, got {:?}", other),
        }
    }

    #[test]
    fn test_attach_leaf_leaves_original_untouched() {
        let sub = sub_search_stats(vec![aggregate("count", vec![])], vec![field("DEPTNO")])
            .head(3, 0);
        let attached = sub.attach_leaf(relation("EMP"));

        assert!(sub.base_relation().is_none());
        assert!(attached.base_relation().is_some());
        assert_eq!(attached.command_name(), "head");
    }

    #[test]
    fn test_contains_subquery_through_let() {
        let expr = let_("x", function("abs", vec![scalar_subquery(relation("DEPT"))]));
        assert!(expr.contains_subquery());
        assert!(!let_("y", field("a")).contains_subquery());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(aggregate("count", vec![]).display_name(), "count()");
        assert_eq!(alias("c", aggregate("count", vec![])).display_name(), "c");
        assert_eq!(aggregate("avg", vec![field("SAL")]).display_name(), "avg(SAL)");
    }

    #[test]
    fn test_json_round_trip() {
        let plan = relation("EMP")
            .dedupe(vec![field("DEPTNO")], 2, false, false)
            .appendcol(sub_search_stats(vec![aggregate("count", vec![])], vec![]), true);

        let json = serde_json::to_string(&plan).unwrap();
        let parsed: UnresolvedPlan = serde_json::from_str(&json).unwrap();

        assert_eq!(plan, parsed);
    }
}
