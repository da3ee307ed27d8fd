//! Core PPL-to-plan compiler
//!
//! Visits the unresolved plan bottom-up. Every node consumes the plan(s) its
//! children left on the build stack and pushes exactly one plan back.

use ppl_ast::{self as ast, UnresolvedExpr, UnresolvedPlan};
use ppl_ir::{Expr, FieldType, JoinType, LogicalPlan, RowSchema};
use tracing::{debug, debug_span, trace};

use crate::catalog::SchemaProvider;
use crate::config::PlannerConfig;
use crate::context::PlanContext;
use crate::error::{PlanError, Result};
use crate::parse;
use crate::registry::FunctionRegistry;
use crate::rex::output_name;

/// Compiles PPL unresolved plans to logical plans
pub struct Planner<'a> {
    pub(crate) provider: &'a dyn SchemaProvider,
    pub(crate) registry: FunctionRegistry,
    pub(crate) config: PlannerConfig,
}

impl<'a> Planner<'a> {
    pub fn new(provider: &'a dyn SchemaProvider) -> Self {
        Self {
            provider,
            registry: FunctionRegistry::new(),
            config: PlannerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PlannerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.registry
    }

    /// Compile `plan` into a logical plan
    ///
    /// Each call runs with a fresh [`PlanContext`]; a failure anywhere aborts
    /// the whole compilation.
    pub fn plan(&self, plan: &UnresolvedPlan) -> Result<LogicalPlan> {
        let span = debug_span!("compile", root = plan.command_name());
        let _guard = span.enter();

        let mut ctx = PlanContext::new(self.config.max_depth);
        self.visit(plan, &mut ctx)?;
        let root = ctx.pop()?;
        debug_assert_eq!(ctx.stack_len(), 0, "build stack must hold exactly the root");

        debug!(fields = root.schema().len(), "compiled plan");
        Ok(root)
    }

    pub(crate) fn visit(&self, node: &UnresolvedPlan, ctx: &mut PlanContext) -> Result<()> {
        ctx.enter_node()?;
        trace!(command = node.command_name(), "visit");
        let result = self.visit_node(node, ctx);
        ctx.exit_node();
        result
    }

    fn visit_node(&self, node: &UnresolvedPlan, ctx: &mut PlanContext) -> Result<()> {
        match node {
            UnresolvedPlan::Relation(n) => self.visit_relation(n, ctx),
            UnresolvedPlan::Filter(n) => self.visit_filter(n, ctx),
            UnresolvedPlan::Project(n) => self.visit_project(n, ctx),
            UnresolvedPlan::Rename(n) => self.visit_rename(n, ctx),
            UnresolvedPlan::Sort(n) => self.visit_sort(n, ctx),
            UnresolvedPlan::Head(n) => self.visit_head(n, ctx),
            UnresolvedPlan::Parse(n) => self.visit_parse(n, ctx),
            UnresolvedPlan::Eval(n) => self.visit_eval(n, ctx),
            UnresolvedPlan::Aggregation(n) => self.visit_aggregation(n, ctx),
            UnresolvedPlan::Join(n) => self.visit_join(n, ctx),
            UnresolvedPlan::SubqueryAlias(n) => self.visit_subquery_alias(n, ctx),
            UnresolvedPlan::Lookup(n) => self.visit_lookup(n, ctx),
            UnresolvedPlan::Dedupe(n) => self.visit_dedupe(n, ctx),
            UnresolvedPlan::Window(n) => self.visit_window(n, ctx),
            UnresolvedPlan::FillNull(n) => self.visit_fill_null(n, ctx),
            UnresolvedPlan::RareTopN(n) => self.visit_rare_top_n(n, ctx),
            UnresolvedPlan::AppendCol(n) => self.visit_append_col(n, ctx),
            UnresolvedPlan::CloseCursor
            | UnresolvedPlan::FetchCursor
            | UnresolvedPlan::AnomalyDetection(_)
            | UnresolvedPlan::MachineLearning(_)
            | UnresolvedPlan::Paginate(_)
            | UnresolvedPlan::Kmeans(_)
            | UnresolvedPlan::TableFunction(_)
            | UnresolvedPlan::Trendline(_) => Err(PlanError::Unsupported(format!(
                "{} command is unsupported",
                node.command_name()
            ))),
        }
    }

    pub(crate) fn visit_input(
        &self,
        child: &ast::Child,
        command: &str,
        ctx: &mut PlanContext,
    ) -> Result<()> {
        match child {
            Some(child) => self.visit(child, ctx),
            None => Err(PlanError::semantic(format!("{} command has no input", command))),
        }
    }

    fn visit_relation(&self, node: &ast::Relation, ctx: &mut PlanContext) -> Result<()> {
        let table = self.provider.get_table_schema(&node.table.parts)?;
        let qualifier = node.table.simple_name().to_string();
        let schema = RowSchema::new(
            table
                .columns
                .iter()
                .map(|c| FieldType {
                    nullable: c.nullable,
                    ..FieldType::new(c.name.clone(), c.data_type.clone())
                        .with_qualifier(Some(qualifier.clone()))
                })
                .collect(),
        );
        ctx.scan(table.name.split('.').map(String::from).collect(), schema);
        Ok(())
    }

    fn visit_filter(&self, node: &ast::Filter, ctx: &mut PlanContext) -> Result<()> {
        self.visit_input(&node.child, "where", ctx)?;
        let schema = ctx.schema()?.clone();

        if node.condition.contains_subquery() {
            let correlation = ctx.open_correlation(schema.clone());
            let predicate = self.translate(&node.condition, &schema, ctx);
            ctx.close_correlation();
            let predicate = predicate?;
            let used = predicate.uses_correlation(correlation).then_some(correlation);
            ctx.filter(predicate, used)
        } else {
            let predicate = self.translate(&node.condition, &schema, ctx)?;
            ctx.filter(predicate, None)
        }
    }

    fn visit_project(&self, node: &ast::Project, ctx: &mut PlanContext) -> Result<()> {
        self.visit_input(&node.child, "fields", ctx)?;

        if let [wildcard @ (UnresolvedExpr::AllFields | UnresolvedExpr::AllFieldsExcludeMeta)] =
            node.project_list.as_slice()
        {
            self.remove_nested_fields(ctx)?;
            let force = matches!(wildcard, UnresolvedExpr::AllFieldsExcludeMeta);
            return self.remove_metadata_fields(ctx, force);
        }

        let schema = ctx.schema()?.clone();
        let mut exprs = Vec::new();
        let mut names = Vec::new();
        for item in &node.project_list {
            match item {
                UnresolvedExpr::AllFields | UnresolvedExpr::AllFieldsExcludeMeta => {
                    for (i, field) in schema.iter().enumerate() {
                        exprs.push(Expr::input_ref(i, field.data_type.clone()));
                        names.push(field.name.clone());
                    }
                }
                other => {
                    let expr = self.translate(other, &schema, ctx)?;
                    names.push(output_name(other, &expr, &schema));
                    exprs.push(expr);
                }
            }
        }

        if node.excluded {
            let indices = exprs
                .iter()
                .zip(&names)
                .map(|(expr, name)| {
                    expr.as_input_ref().ok_or_else(|| {
                        PlanError::semantic(format!("only fields can be excluded, got {}", name))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            return ctx.project_except(&indices);
        }

        if !ctx.is_resolving_subquery() {
            ctx.set_project_visited();
        }
        ctx.project(exprs, names)
    }

    /// Drop `a.b` when `a` is itself a column
    fn remove_nested_fields(&self, ctx: &mut PlanContext) -> Result<()> {
        let names = ctx.schema()?.names();
        let nested: Vec<usize> = names
            .iter()
            .enumerate()
            .filter(|(_, name)| {
                name.rsplit_once('.')
                    .is_some_and(|(parent, _)| names.iter().any(|n| n == parent))
            })
            .map(|(i, _)| i)
            .collect();
        if nested.is_empty() {
            return Ok(());
        }
        ctx.project_except(&nested)
    }

    /// Hide metadata columns from wildcard projections
    ///
    /// Applies when forced or when no explicit projection has run yet, and never
    /// removes every column.
    fn remove_metadata_fields(&self, ctx: &mut PlanContext, force: bool) -> Result<()> {
        if !force && ctx.is_project_visited() {
            return Ok(());
        }
        let schema = ctx.schema()?;
        let metadata: Vec<usize> = schema
            .iter()
            .enumerate()
            .filter(|(_, f)| self.config.is_metadata_field(&f.name))
            .map(|(i, _)| i)
            .collect();
        if metadata.is_empty() || metadata.len() == schema.len() {
            return Ok(());
        }
        ctx.project_except(&metadata)
    }

    fn visit_rename(&self, node: &ast::Rename, ctx: &mut PlanContext) -> Result<()> {
        self.visit_input(&node.child, "rename", ctx)?;
        let schema = ctx.schema()?.clone();
        let mut names = schema.names();

        for rename in &node.renames {
            let origin = self.translate(&rename.origin, &schema, ctx)?;
            let index = origin.as_input_ref().ok_or_else(|| {
                PlanError::semantic(format!(
                    "the original field {} cannot be resolved",
                    rename.origin
                ))
            })?;
            let UnresolvedExpr::Field(target) = &rename.target else {
                return Err(PlanError::semantic(format!(
                    "the target expected to be field, but is {}",
                    rename.target
                )));
            };
            names[index] = target.clone();
        }
        ctx.rename(names)
    }

    fn visit_sort(&self, node: &ast::Sort, ctx: &mut PlanContext) -> Result<()> {
        self.visit_input(&node.child, "sort", ctx)?;
        let schema = ctx.schema()?.clone();
        let keys = node
            .sort_list
            .iter()
            .map(|s| self.translate_sort_key(s, &schema, ctx))
            .collect::<Result<Vec<_>>>()?;
        ctx.sort(keys)
    }

    fn visit_head(&self, node: &ast::Head, ctx: &mut PlanContext) -> Result<()> {
        self.visit_input(&node.child, "head", ctx)?;
        ctx.limit(node.from, Some(node.size))
    }

    fn visit_parse(&self, node: &ast::Parse, ctx: &mut PlanContext) -> Result<()> {
        self.visit_input(&node.child, "parse", ctx)?;
        let schema = ctx.schema()?.clone();
        let source = self.translate(&node.source_field, &schema, ctx)?;

        let pattern = parse::effective_pattern(node.method, &node.pattern);
        let groups = parse::named_groups(node.method, pattern, &node.arguments)?;
        debug!(method = ?node.method, groups = groups.len(), "parse");

        let mut derived = Vec::with_capacity(groups.len());
        for group in groups {
            let expr = parse::extraction(self, node.method, source.clone(), pattern, &group)?;
            derived.push((expr, group));
        }
        self.project_overriding(ctx, derived, None)
    }

    fn visit_eval(&self, node: &ast::Eval, ctx: &mut PlanContext) -> Result<()> {
        self.visit_input(&node.child, "eval", ctx)?;

        for assignment in &node.expressions {
            let UnresolvedExpr::Let { field, expr } = assignment else {
                return Err(PlanError::semantic(format!(
                    "eval expects assignments, got {}",
                    assignment
                )));
            };
            let schema = ctx.schema()?.clone();

            if expr.contains_subquery() {
                let correlation = ctx.open_correlation(schema.clone());
                let value = self.translate(expr, &schema, ctx);
                ctx.close_correlation();
                let value = value?;
                let used = value.uses_correlation(correlation).then_some(correlation);
                self.project_overriding(ctx, vec![(value, field.clone())], used)?;
            } else {
                let value = self.translate(expr, &schema, ctx)?;
                self.project_overriding(ctx, vec![(value, field.clone())], None)?;
            }
        }
        Ok(())
    }

    /// Keep every column and add `derived`; a derived column whose name is
    /// already taken replaces that column in place
    fn project_overriding(
        &self,
        ctx: &mut PlanContext,
        derived: Vec<(Expr, String)>,
        correlation: Option<ppl_ir::CorrelationId>,
    ) -> Result<()> {
        let mut exprs = ctx.fields()?;
        let mut names = ctx.schema()?.names();
        for (expr, name) in derived {
            match names.iter().position(|n| *n == name) {
                Some(i) => exprs[i] = expr,
                None => {
                    exprs.push(expr);
                    names.push(name);
                }
            }
        }
        ctx.project_correlated(exprs, names, correlation)
    }

    fn visit_aggregation(&self, node: &ast::Aggregation, ctx: &mut PlanContext) -> Result<()> {
        self.visit_input(&node.child, "stats", ctx)?;

        let mut group_exprs: Vec<UnresolvedExpr> = node.span.iter().cloned().collect();
        group_exprs.extend(node.group_exprs.iter().cloned());
        self.aggregate_with_trimming(&group_exprs, &node.agg_exprs, ctx)?;

        // Aggregates first, then group keys
        let groups = group_exprs.len();
        let reorder: Vec<usize> = (groups..groups + node.agg_exprs.len())
            .chain(0..groups)
            .collect();
        ctx.project_indices(&reorder)
    }

    /// Narrow the input to the columns the aggregation reads, then aggregate
    ///
    /// Output is the group keys followed by the aggregate calls.
    pub(crate) fn aggregate_with_trimming(
        &self,
        group_exprs: &[UnresolvedExpr],
        agg_exprs: &[UnresolvedExpr],
        ctx: &mut PlanContext,
    ) -> Result<()> {
        let schema = ctx.schema()?.clone();
        let (groups, aggs) = self.resolve_aggregation(group_exprs, agg_exprs, &schema, ctx)?;

        let mut used: Vec<usize> = Vec::new();
        let referenced = groups
            .iter()
            .map(|(expr, _)| expr)
            .chain(aggs.iter().flat_map(|(call, _)| call.args.iter()));
        for expr in referenced {
            for index in expr.input_refs() {
                if !used.contains(&index) {
                    used.push(index);
                }
            }
        }
        if used.is_empty() {
            let (keys, names) = groups.into_iter().unzip();
            let (calls, agg_names) = aggs.into_iter().unzip();
            return ctx.aggregate(keys, names, calls, agg_names);
        }

        ctx.project_indices(&used)?;
        let trimmed = ctx.schema()?.clone();
        let (groups, aggs) = self.resolve_aggregation(group_exprs, agg_exprs, &trimmed, ctx)?;
        let (keys, names) = groups.into_iter().unzip();
        let (calls, agg_names) = aggs.into_iter().unzip();
        ctx.aggregate(keys, names, calls, agg_names)
    }

    #[allow(clippy::type_complexity)]
    fn resolve_aggregation(
        &self,
        group_exprs: &[UnresolvedExpr],
        agg_exprs: &[UnresolvedExpr],
        schema: &RowSchema,
        ctx: &mut PlanContext,
    ) -> Result<(Vec<(Expr, String)>, Vec<(ppl_ir::AggCall, String)>)> {
        let mut groups = Vec::with_capacity(group_exprs.len());
        for group in group_exprs {
            let expr = self.translate(group, schema, ctx)?;
            let name = output_name(group, &expr, schema);
            groups.push((expr, name));
        }
        let aggs = agg_exprs
            .iter()
            .map(|agg| self.translate_agg(agg, schema, ctx))
            .collect::<Result<Vec<_>>>()?;
        Ok((groups, aggs))
    }

    fn visit_join(&self, node: &ast::Join, ctx: &mut PlanContext) -> Result<()> {
        self.visit_input(&node.left, "join", ctx)?;
        if let Some(alias) = &node.left_alias {
            ctx.requalify(alias)?;
        }
        self.visit(&node.right, ctx)?;
        if let Some(alias) = &node.right_alias {
            ctx.requalify(alias)?;
        }

        let left = ctx.peek_at(1)?.schema().clone();
        let right = ctx.schema()?.clone();
        let combined = left.concat(&right);
        let condition = match &node.condition {
            Some(condition) => self.translate(condition, &combined, ctx)?,
            None => Expr::boolean(true),
        };

        let join_type = match node.join_type {
            ast::JoinType::Inner | ast::JoinType::Cross => JoinType::Inner,
            ast::JoinType::Left => JoinType::Left,
            ast::JoinType::Right => JoinType::Right,
            ast::JoinType::Full => JoinType::Full,
            ast::JoinType::Semi => JoinType::Semi,
            ast::JoinType::Anti => JoinType::Anti,
        };
        ctx.join(join_type, condition)?;
        if join_type.projects_left_only() {
            return Ok(());
        }
        self.rename_join_duplicates(ctx, left.len(), node.right_alias.as_deref())
    }

    /// Prefix right-side columns whose names clash with an earlier column
    fn rename_join_duplicates(
        &self,
        ctx: &mut PlanContext,
        left_len: usize,
        right_alias: Option<&str>,
    ) -> Result<()> {
        let schema = ctx.schema()?.clone();
        let mut names = schema.names();
        let mut renamed = false;
        for i in left_len..names.len() {
            if !names[..i].contains(&names[i]) {
                continue;
            }
            let field = &schema.fields[i];
            let qualifier = right_alias.or(field.qualifier.as_deref());
            let mut candidate = match qualifier {
                Some(q) => format!("{}.{}", q, field.name),
                None => field.name.clone(),
            };
            let mut suffix = 0;
            while names.contains(&candidate) {
                candidate = format!("{}{}", field.name, suffix);
                suffix += 1;
            }
            names[i] = candidate;
            renamed = true;
        }
        if renamed {
            ctx.rename(names)?;
        }
        Ok(())
    }

    fn visit_subquery_alias(&self, node: &ast::SubqueryAlias, ctx: &mut PlanContext) -> Result<()> {
        self.visit_input(&node.child, "alias", ctx)?;
        ctx.requalify(&node.alias)
    }

    fn visit_window(&self, node: &ast::Window, ctx: &mut PlanContext) -> Result<()> {
        self.visit_input(&node.child, "window", ctx)?;
        let schema = ctx.schema()?.clone();
        let mut calls = Vec::with_capacity(node.window_functions.len());
        let mut names = Vec::with_capacity(node.window_functions.len());
        for func in &node.window_functions {
            let (call, name) = self.translate_window(func, &schema, ctx)?;
            calls.push(call);
            names.push(name);
        }
        ctx.window(calls, names)
    }

    fn visit_fill_null(&self, node: &ast::FillNull, ctx: &mut PlanContext) -> Result<()> {
        self.visit_input(&node.child, "fillnull", ctx)?;
        let schema = ctx.schema()?.clone();

        for (i, r) in node.replacements.iter().enumerate() {
            if node.replacements[..i]
                .iter()
                .any(|prev| prev.field.eq_ignore_ascii_case(&r.field))
            {
                return Err(PlanError::semantic(format!(
                    "The field name {} appears more than once in fillnull",
                    r.field
                )));
            }
        }

        let replace_all = match &node.replacement_for_all {
            Some(e) => Some(self.translate(e, &schema, ctx)?),
            None => None,
        };

        let mut exprs = Vec::with_capacity(schema.len());
        let mut names = Vec::with_capacity(schema.len());
        for (i, field) in schema.iter().enumerate() {
            let column = Expr::input_ref(i, field.data_type.clone());
            let specific = node
                .replacements
                .iter()
                .find(|r| r.field.eq_ignore_ascii_case(&field.name));
            let replacement = match specific {
                Some(r) => Some(self.translate(&r.replacement, &schema, ctx)?),
                None => replace_all.clone(),
            };
            exprs.push(match replacement {
                Some(value) => self.call("coalesce", vec![column, value])?,
                None => column,
            });
            names.push(field.name.clone());
        }
        ctx.project(exprs, names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnInfo, MemorySchemaProvider, TableSchema};
    use crate::error::PlanErrorKind;
    use ppl_ast::dsl::*;
    use ppl_ir::{DataType, NullOrder, SortDirection};

    fn catalog() -> MemorySchemaProvider {
        MemorySchemaProvider::new().with_table(TableSchema {
            name: "logs".into(),
            columns: vec![
                ColumnInfo::new("_id", DataType::String),
                ColumnInfo::new("host", DataType::String),
                ColumnInfo::new("status", DataType::Int32),
                ColumnInfo::new("host.name", DataType::String),
            ],
        })
    }

    #[test]
    fn test_wildcard_hides_metadata_and_nested_fields() {
        let provider = catalog();
        let planner = Planner::new(&provider);

        let plan = planner
            .plan(&relation("logs").fields(vec![all_fields()]))
            .unwrap();
        assert_eq!(plan.schema().names(), vec!["host", "status"]);
    }

    #[test]
    fn test_wildcard_after_projection_keeps_metadata() {
        let provider = catalog();
        let planner = Planner::new(&provider);

        let query = relation("logs")
            .fields(vec![field("_id"), field("status")])
            .fields(vec![all_fields()]);
        let plan = planner.plan(&query).unwrap();
        assert_eq!(plan.schema().names(), vec!["_id", "status"]);
    }

    #[test]
    fn test_wildcard_keeps_metadata_when_nothing_else_remains() {
        let provider = MemorySchemaProvider::new().with_table(TableSchema {
            name: "meta".into(),
            columns: vec![
                ColumnInfo::new("_id", DataType::String),
                ColumnInfo::new("_index", DataType::String),
            ],
        });
        let planner = Planner::new(&provider);

        let plan = planner
            .plan(&relation("meta").fields(vec![all_fields()]))
            .unwrap();
        assert_eq!(plan.schema().names(), vec!["_id", "_index"]);
    }

    #[test]
    fn test_forced_wildcard_drops_metadata_after_projection() {
        let provider = catalog();
        let planner = Planner::new(&provider);

        let query = relation("logs")
            .fields(vec![field("_id"), field("status")])
            .fields(vec![UnresolvedExpr::AllFieldsExcludeMeta]);
        let plan = planner.plan(&query).unwrap();
        assert_eq!(plan.schema().names(), vec!["status"]);
    }

    #[test]
    fn test_subquery_projection_leaves_outer_wildcard_alone() {
        let provider = catalog();
        let planner = Planner::new(&provider);

        let query = relation("logs")
            .filter(exists(relation("logs").fields(vec![field("host")])))
            .fields(vec![all_fields()]);
        let plan = planner.plan(&query).unwrap();
        assert_eq!(plan.schema().names(), vec!["host", "status"]);
    }

    #[test]
    fn test_sort_null_order() {
        let provider = catalog();
        let planner = Planner::new(&provider);

        let query = relation("logs").sort(vec![
            asc(field("status")),
            desc(field("host")),
            ast::SortField {
                field: field("_id"),
                asc: true,
                nulls_first: Some(false),
            },
        ]);
        let LogicalPlan::Sort { keys, .. } = planner.plan(&query).unwrap() else {
            panic!("expected a sort");
        };
        let nulls: Vec<NullOrder> = keys.iter().map(|k| k.nulls).collect();
        assert_eq!(nulls, vec![NullOrder::First, NullOrder::Last, NullOrder::Last]);
        assert_eq!(keys[2].direction, SortDirection::Asc);
    }

    #[test]
    fn test_unsupported_command() {
        let provider = catalog();
        let planner = Planner::new(&provider);

        let err = planner.plan(&UnresolvedPlan::FetchCursor).unwrap_err();
        assert_eq!(err.kind(), PlanErrorKind::Unsupported);
    }

    #[test]
    fn test_depth_limit() {
        let provider = catalog();
        let planner = Planner::new(&provider).with_config(PlannerConfig {
            max_depth: 3,
            ..PlannerConfig::default()
        });

        let query = relation("logs").head(10, 0).head(5, 0).head(1, 0);
        let err = planner.plan(&query).unwrap_err();
        assert!(matches!(err, PlanError::DepthExceeded { limit: 3 }));
    }

    #[test]
    fn test_expression_nesting_counts_against_depth_limit() {
        let provider = catalog();
        let planner = Planner::new(&provider);

        let mut sum = field("status");
        for _ in 0..1000 {
            sum = binary(ppl_ast::BinOp::Add, sum, int(1));
        }
        let query = relation("logs").filter(gt(sum, int(0)));
        let err = planner.plan(&query).unwrap_err();
        assert!(matches!(err, PlanError::DepthExceeded { limit: 256 }));

        let mut sum = field("status");
        for _ in 0..100 {
            sum = binary(ppl_ast::BinOp::Add, sum, int(1));
        }
        assert!(planner.plan(&relation("logs").filter(gt(sum, int(0)))).is_ok());
    }

    #[test]
    fn test_unknown_table() {
        let provider = catalog();
        let planner = Planner::new(&provider);

        let err = planner.plan(&relation("missing")).unwrap_err();
        assert_eq!(err.kind(), PlanErrorKind::TableNotFound);
    }
}
