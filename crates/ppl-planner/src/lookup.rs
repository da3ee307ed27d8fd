//! The `lookup` command: enrich rows from a lookup table via a left join

use indexmap::IndexMap;
use ppl_ast::{self as ast, OutputStrategy};
use ppl_ir::{BinOp, Expr, JoinType};
use tracing::debug;

use crate::compiler::Planner;
use crate::context::PlanContext;
use crate::error::{PlanError, Result};

/// How lookup columns land in the output, computed from names alone
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LookupReconciliation {
    /// Mapping columns only needed for the join condition
    pub removed_lookup_fields: Vec<String>,
    /// Lookup columns carried into the output, in lookup order
    pub provided_fields: Vec<String>,
    /// Source column -> provided lookup column that lands on the same name
    pub duplicates: IndexMap<String, String>,
    /// Final names of the lookup-derived columns, in output order
    pub expected_names: Vec<String>,
}

impl LookupReconciliation {
    pub fn new(
        source_fields: &[String],
        lookup_fields: &[String],
        mapping: &IndexMap<String, String>,
        output: &IndexMap<String, String>,
        strategy: OutputStrategy,
    ) -> Self {
        let removed_lookup_fields: Vec<String> = mapping
            .keys()
            .filter(|k| !output.contains_key(*k))
            .cloned()
            .collect();
        let provided_fields: Vec<String> = lookup_fields
            .iter()
            .filter(|f| !removed_lookup_fields.contains(f))
            .cloned()
            .collect();
        let output_name = |field: &String| output.get(field).unwrap_or(field).clone();

        let mut duplicates = IndexMap::new();
        for field in &provided_fields {
            let name = output_name(field);
            if source_fields.contains(&name) {
                duplicates.insert(name, field.clone());
            }
        }

        let mut expected_names: Vec<String> = provided_fields.iter().map(output_name).collect();
        if strategy == OutputStrategy::Append && !duplicates.is_empty() {
            expected_names.retain(|name| !duplicates.contains_key(name));
            expected_names.extend(duplicates.keys().cloned());
        }

        Self {
            removed_lookup_fields,
            provided_fields,
            duplicates,
            expected_names,
        }
    }
}

impl<'a> Planner<'a> {
    pub(crate) fn visit_lookup(&self, node: &ast::Lookup, ctx: &mut PlanContext) -> Result<()> {
        self.visit_input(&node.child, "lookup", ctx)?;
        let source_fields = ctx.schema()?.names();

        self.visit(&node.lookup_relation, ctx)?;
        let lookup_schema = ctx.schema()?.clone();
        for field in node.mapping.keys().chain(node.output.keys()) {
            if !lookup_schema.contains(field) {
                return Err(PlanError::semantic(format!(
                    "field [{}] not found in the lookup table",
                    field
                )));
            }
        }
        for field in node.mapping.values() {
            if !source_fields.contains(field) {
                return Err(PlanError::semantic(format!(
                    "mapping field [{}] not found in the source",
                    field
                )));
            }
        }

        if !node.output.is_empty() {
            let wanted: Vec<usize> = lookup_schema
                .iter()
                .enumerate()
                .filter(|(_, f)| {
                    node.mapping.contains_key(&f.name) || node.output.contains_key(&f.name)
                })
                .map(|(i, _)| i)
                .collect();
            ctx.project_indices(&wanted)?;
        }
        let lookup_fields = ctx.schema()?.names();

        let plan = LookupReconciliation::new(
            &source_fields,
            &lookup_fields,
            &node.mapping,
            &node.output,
            node.strategy,
        );
        debug!(
            provided = plan.provided_fields.len(),
            duplicates = plan.duplicates.len(),
            strategy = ?node.strategy,
            "lookup"
        );

        let source_len = source_fields.len();
        let source_index = |name: &str| source_fields.iter().position(|f| f == name);
        let lookup_index =
            |name: &str| lookup_fields.iter().position(|f| f == name).map(|i| source_len + i);
        let missing = |name: &str| PlanError::semantic(format!("field [{}] not found", name));

        let source_schema = ctx.peek_at(1)?.schema().clone();
        let lookup_schema = ctx.schema()?.clone();
        let mut condition = Vec::with_capacity(node.mapping.len());
        for (lookup_field, source_field) in &node.mapping {
            let s = source_index(source_field).ok_or_else(|| missing(source_field))?;
            let l = lookup_index(lookup_field).ok_or_else(|| missing(lookup_field))?;
            condition.push(Expr::binary(
                BinOp::Eq,
                Expr::input_ref(s, source_schema.fields[s].data_type.clone()),
                Expr::input_ref(l, lookup_schema.fields[l - source_len].data_type.clone()),
            ));
        }
        ctx.join(JoinType::Left, Expr::and_all(condition))?;

        let mut removed = Vec::new();
        for field in &plan.removed_lookup_fields {
            removed.push(lookup_index(field).ok_or_else(|| missing(field))?);
        }
        let mut coalesced = Vec::new();
        let mut coalesced_names = Vec::new();
        for (source_field, provided) in &plan.duplicates {
            let s = source_index(source_field).ok_or_else(|| missing(source_field))?;
            removed.push(s);
            if node.strategy == OutputStrategy::Append {
                let l = lookup_index(provided).ok_or_else(|| missing(provided))?;
                removed.push(l);
                coalesced.push(self.call("coalesce", vec![ctx.field(s)?, ctx.field(l)?])?);
                coalesced_names.push(source_field.clone());
            }
        }

        if !coalesced.is_empty() {
            ctx.project_plus(coalesced, coalesced_names)?;
        }
        if !removed.is_empty() {
            ctx.project_except(&removed)?;
        }

        let mut names = ctx.schema()?.names();
        let kept_source = source_len - plan.duplicates.len();
        if names.len() != kept_source + plan.expected_names.len() {
            return Err(PlanError::semantic(format!(
                "lookup produced {} columns, expected {}",
                names.len(),
                kept_source + plan.expected_names.len()
            )));
        }
        names.truncate(kept_source);
        names.extend(plan.expected_names);
        ctx.rename(names)
    }
}
