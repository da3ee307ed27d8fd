//! Builder helpers for assembling AST trees by hand
//!
//! Mirrors the shape a parser produces: every command wraps the plan built
//! so far as its input.
//!
//! ```
//! use ppl_ast::dsl::*;
//!
//! let plan = relation("EMP")
//!     .filter(gt(field("SAL"), int(1000)))
//!     .fields(vec![field("ENAME"), field("SAL")]);
//! assert_eq!(plan.command_name(), "fields");
//! ```

use indexmap::IndexMap;

use crate::ast::*;

pub fn relation(table: &str) -> UnresolvedPlan {
    UnresolvedPlan::Relation(Relation {
        table: QualifiedName::parse(table),
    })
}

pub fn field(name: &str) -> UnresolvedExpr {
    UnresolvedExpr::Field(name.to_string())
}

pub fn all_fields() -> UnresolvedExpr {
    UnresolvedExpr::AllFields
}

pub fn int(value: i64) -> UnresolvedExpr {
    UnresolvedExpr::Literal(Literal::Int(value))
}

pub fn float(value: f64) -> UnresolvedExpr {
    UnresolvedExpr::Literal(Literal::Float(value))
}

pub fn string(value: &str) -> UnresolvedExpr {
    UnresolvedExpr::Literal(Literal::String(value.to_string()))
}

pub fn boolean(value: bool) -> UnresolvedExpr {
    UnresolvedExpr::Literal(Literal::Bool(value))
}

pub fn null() -> UnresolvedExpr {
    UnresolvedExpr::Literal(Literal::Null)
}

pub fn alias(name: &str, expr: UnresolvedExpr) -> UnresolvedExpr {
    UnresolvedExpr::Alias {
        name: name.to_string(),
        expr: Box::new(expr),
    }
}

pub fn function(name: &str, args: Vec<UnresolvedExpr>) -> UnresolvedExpr {
    UnresolvedExpr::Function {
        name: name.to_string(),
        args,
    }
}

pub fn aggregate(name: &str, args: Vec<UnresolvedExpr>) -> UnresolvedExpr {
    UnresolvedExpr::Aggregate {
        name: name.to_string(),
        args,
        distinct: false,
    }
}

pub fn binary(op: BinOp, left: UnresolvedExpr, right: UnresolvedExpr) -> UnresolvedExpr {
    UnresolvedExpr::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn eq(left: UnresolvedExpr, right: UnresolvedExpr) -> UnresolvedExpr {
    binary(BinOp::Eq, left, right)
}

pub fn gt(left: UnresolvedExpr, right: UnresolvedExpr) -> UnresolvedExpr {
    binary(BinOp::Gt, left, right)
}

pub fn lt(left: UnresolvedExpr, right: UnresolvedExpr) -> UnresolvedExpr {
    binary(BinOp::Lt, left, right)
}

pub fn and(left: UnresolvedExpr, right: UnresolvedExpr) -> UnresolvedExpr {
    binary(BinOp::And, left, right)
}

pub fn let_(name: &str, expr: UnresolvedExpr) -> UnresolvedExpr {
    UnresolvedExpr::Let {
        field: name.to_string(),
        expr: Box::new(expr),
    }
}

pub fn span(field_expr: UnresolvedExpr, value: i64, unit: Option<&str>) -> UnresolvedExpr {
    UnresolvedExpr::Span {
        field: Box::new(field_expr),
        value: Literal::Int(value),
        unit: unit.map(str::to_string),
    }
}

pub fn scalar_subquery(plan: UnresolvedPlan) -> UnresolvedExpr {
    UnresolvedExpr::ScalarSubquery(Box::new(plan))
}

pub fn exists(plan: UnresolvedPlan) -> UnresolvedExpr {
    UnresolvedExpr::ExistsSubquery(Box::new(plan))
}

pub fn in_subquery(values: Vec<UnresolvedExpr>, plan: UnresolvedPlan) -> UnresolvedExpr {
    UnresolvedExpr::InSubquery {
        values,
        query: Box::new(plan),
    }
}

pub fn argument(name: &str, value: Literal) -> Argument {
    Argument {
        name: name.to_string(),
        value,
    }
}

pub fn asc(expr: UnresolvedExpr) -> SortField {
    SortField {
        field: expr,
        asc: true,
        nulls_first: None,
    }
}

pub fn desc(expr: UnresolvedExpr) -> SortField {
    SortField {
        field: expr,
        asc: false,
        nulls_first: None,
    }
}

fn wrap(plan: UnresolvedPlan) -> Child {
    Some(Box::new(plan))
}

/// Fluent command builders; each consumes the current tree as its input
impl UnresolvedPlan {
    pub fn filter(self, condition: UnresolvedExpr) -> Self {
        UnresolvedPlan::Filter(Filter {
            child: wrap(self),
            condition,
        })
    }

    pub fn fields(self, project_list: Vec<UnresolvedExpr>) -> Self {
        UnresolvedPlan::Project(Project {
            child: wrap(self),
            project_list,
            excluded: false,
        })
    }

    pub fn fields_except(self, project_list: Vec<UnresolvedExpr>) -> Self {
        UnresolvedPlan::Project(Project {
            child: wrap(self),
            project_list,
            excluded: true,
        })
    }

    pub fn rename(self, pairs: Vec<(UnresolvedExpr, UnresolvedExpr)>) -> Self {
        UnresolvedPlan::Rename(Rename {
            child: wrap(self),
            renames: pairs
                .into_iter()
                .map(|(origin, target)| RenameMap { origin, target })
                .collect(),
        })
    }

    pub fn sort(self, sort_list: Vec<SortField>) -> Self {
        UnresolvedPlan::Sort(Sort {
            child: wrap(self),
            sort_list,
        })
    }

    pub fn head(self, size: usize, from: usize) -> Self {
        UnresolvedPlan::Head(Head {
            child: wrap(self),
            size,
            from,
        })
    }

    pub fn parse(self, method: ParseMethod, source_field: UnresolvedExpr, pattern: &str) -> Self {
        UnresolvedPlan::Parse(Parse {
            child: wrap(self),
            method,
            source_field,
            pattern: pattern.to_string(),
            arguments: IndexMap::new(),
        })
    }

    pub fn eval(self, expressions: Vec<UnresolvedExpr>) -> Self {
        UnresolvedPlan::Eval(Eval {
            child: wrap(self),
            expressions,
        })
    }

    pub fn stats(self, agg_exprs: Vec<UnresolvedExpr>, group_exprs: Vec<UnresolvedExpr>) -> Self {
        UnresolvedPlan::Aggregation(Aggregation {
            child: wrap(self),
            agg_exprs,
            group_exprs,
            span: None,
        })
    }

    pub fn stats_with_span(
        self,
        agg_exprs: Vec<UnresolvedExpr>,
        group_exprs: Vec<UnresolvedExpr>,
        span: UnresolvedExpr,
    ) -> Self {
        UnresolvedPlan::Aggregation(Aggregation {
            child: wrap(self),
            agg_exprs,
            group_exprs,
            span: Some(span),
        })
    }

    pub fn join(self, right: UnresolvedPlan, join_type: JoinType, condition: Option<UnresolvedExpr>) -> Self {
        UnresolvedPlan::Join(Join {
            left: wrap(self),
            right: Box::new(right),
            join_type,
            condition,
            left_alias: None,
            right_alias: None,
        })
    }

    pub fn alias(self, alias: &str) -> Self {
        UnresolvedPlan::SubqueryAlias(SubqueryAlias {
            child: wrap(self),
            alias: alias.to_string(),
        })
    }

    pub fn lookup(
        self,
        lookup_relation: UnresolvedPlan,
        mapping: &[(&str, &str)],
        output: &[(&str, &str)],
        strategy: OutputStrategy,
    ) -> Self {
        let to_map = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<IndexMap<_, _>>()
        };
        UnresolvedPlan::Lookup(Lookup {
            child: wrap(self),
            lookup_relation: Box::new(lookup_relation),
            mapping: to_map(mapping),
            output: to_map(output),
            strategy,
        })
    }

    pub fn dedupe(self, fields: Vec<UnresolvedExpr>, number: i64, keep_empty: bool, consecutive: bool) -> Self {
        UnresolvedPlan::Dedupe(Dedupe {
            child: wrap(self),
            fields,
            options: vec![
                argument("number", Literal::Int(number)),
                argument("keepempty", Literal::Bool(keep_empty)),
                argument("consecutive", Literal::Bool(consecutive)),
            ],
        })
    }

    pub fn window(self, window_functions: Vec<UnresolvedExpr>) -> Self {
        UnresolvedPlan::Window(Window {
            child: wrap(self),
            window_functions,
        })
    }

    pub fn fillnull(self, replacements: Vec<(&str, UnresolvedExpr)>, replacement_for_all: Option<UnresolvedExpr>) -> Self {
        UnresolvedPlan::FillNull(FillNull {
            child: wrap(self),
            replacements: replacements
                .into_iter()
                .map(|(name, replacement)| FillNullReplacement {
                    field: name.to_string(),
                    replacement,
                })
                .collect(),
            replacement_for_all,
        })
    }

    pub fn rare_top_n(
        self,
        command: RareTopNKind,
        arguments: Vec<Argument>,
        fields: Vec<UnresolvedExpr>,
        group_exprs: Vec<UnresolvedExpr>,
    ) -> Self {
        UnresolvedPlan::RareTopN(RareTopN {
            child: wrap(self),
            command,
            arguments,
            fields,
            group_exprs,
        })
    }

    pub fn appendcol(self, sub_search: UnresolvedPlan, override_columns: bool) -> Self {
        UnresolvedPlan::AppendCol(AppendCol {
            child: wrap(self),
            sub_search: Box::new(sub_search),
            override_columns,
        })
    }
}

/// Source-less command chain used for sub-searches (`appendcol [ ... ]`)
pub fn sub_search_stats(agg_exprs: Vec<UnresolvedExpr>, group_exprs: Vec<UnresolvedExpr>) -> UnresolvedPlan {
    UnresolvedPlan::Aggregation(Aggregation {
        child: None,
        agg_exprs,
        group_exprs,
        span: None,
    })
}
