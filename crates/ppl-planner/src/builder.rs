//! Operator construction on top of the build stack
//!
//! Each method pops its input(s), builds one operator and pushes it back.
//! Projections are normalised as they are built: identity projections are
//! dropped and a projection over another (uncorrelated) projection is merged
//! into it.

use ppl_ir::{
    AggCall, CorrelationId, Expr, FieldType, JoinType, LogicalPlan, RowSchema, SortKey,
    Value, WindowCall,
};

use crate::context::PlanContext;
use crate::error::{PlanError, Result};

/// Output schema of a projection of `exprs` over `input`
fn project_schema(input: &RowSchema, exprs: &[Expr], names: &[String]) -> RowSchema {
    RowSchema::new(
        exprs
            .iter()
            .zip(names)
            .map(|(expr, name)| match expr.as_input_ref().and_then(|i| input.field(i)) {
                Some(field) => field.with_name(name.clone()),
                None => FieldType::new(name.clone(), expr.data_type()),
            })
            .collect(),
    )
}

fn is_identity(input: &RowSchema, exprs: &[Expr], schema: &RowSchema) -> bool {
    exprs.len() == input.len()
        && exprs
            .iter()
            .enumerate()
            .all(|(i, e)| e.as_input_ref() == Some(i))
        && schema == input
}

impl PlanContext {
    pub fn scan(&mut self, table: Vec<String>, schema: RowSchema) {
        self.push(LogicalPlan::Scan { table, schema });
    }

    /// Reference to column `index` of the current plan
    pub fn field(&self, index: usize) -> Result<Expr> {
        let schema = self.schema()?;
        schema
            .field(index)
            .map(|f| Expr::input_ref(index, f.data_type.clone()))
            .ok_or_else(|| PlanError::semantic(format!("column index {} out of range", index)))
    }

    /// Reference to the first column of the current plan named `name`
    pub fn field_by_name(&self, name: &str) -> Result<Expr> {
        let index = self
            .schema()?
            .index_of(name)
            .ok_or_else(|| PlanError::semantic(format!("field [{}] not found", name)))?;
        self.field(index)
    }

    /// References to every column of the current plan
    pub fn fields(&self) -> Result<Vec<Expr>> {
        Ok(self
            .schema()?
            .iter()
            .enumerate()
            .map(|(i, f)| Expr::input_ref(i, f.data_type.clone()))
            .collect())
    }

    pub fn filter(&mut self, predicate: Expr, correlation: Option<CorrelationId>) -> Result<()> {
        if let Expr::Literal {
            value: Value::Bool(true),
            ..
        } = predicate
        {
            return Ok(());
        }
        let input = self.pop()?;
        let schema = input.schema().clone();
        self.push(LogicalPlan::Filter {
            input: Box::new(input),
            predicate,
            correlation,
            schema,
        });
        Ok(())
    }

    pub fn project(&mut self, exprs: Vec<Expr>, names: Vec<String>) -> Result<()> {
        self.project_correlated(exprs, names, None)
    }

    pub fn project_correlated(
        &mut self,
        exprs: Vec<Expr>,
        names: Vec<String>,
        correlation: Option<CorrelationId>,
    ) -> Result<()> {
        if exprs.len() != names.len() {
            return Err(PlanError::semantic(format!(
                "projection has {} expressions but {} names",
                exprs.len(),
                names.len()
            )));
        }
        let input = self.pop()?;
        let schema = project_schema(input.schema(), &exprs, &names);

        if correlation.is_none() && is_identity(input.schema(), &exprs, &schema) {
            self.push(input);
            return Ok(());
        }

        let plan = match input {
            LogicalPlan::Project {
                input: below,
                exprs: below_exprs,
                correlation: None,
                ..
            } if correlation.is_none() => {
                let merged: Vec<Expr> = exprs.iter().map(|e| e.inline(&below_exprs)).collect();
                if is_identity(below.schema(), &merged, &schema) {
                    *below
                } else {
                    LogicalPlan::Project {
                        input: below,
                        exprs: merged,
                        correlation: None,
                        schema,
                    }
                }
            }
            input => LogicalPlan::Project {
                input: Box::new(input),
                exprs,
                correlation,
                schema,
            },
        };
        self.push(plan);
        Ok(())
    }

    /// Keep every column and append `exprs` after them
    pub fn project_plus(&mut self, exprs: Vec<Expr>, names: Vec<String>) -> Result<()> {
        let mut all = self.fields()?;
        let mut all_names = self.schema()?.names();
        all.extend(exprs);
        all_names.extend(names);
        self.project(all, all_names)
    }

    /// Keep every column except those at `indices`
    pub fn project_except(&mut self, indices: &[usize]) -> Result<()> {
        let schema = self.schema()?.clone();
        let keep: Vec<usize> = (0..schema.len()).filter(|i| !indices.contains(i)).collect();
        self.project_indices(&keep)
    }

    /// Keep the columns at `indices`, in that order, under their current names
    pub fn project_indices(&mut self, indices: &[usize]) -> Result<()> {
        let schema = self.schema()?.clone();
        let mut exprs = Vec::with_capacity(indices.len());
        let mut names = Vec::with_capacity(indices.len());
        for &i in indices {
            exprs.push(self.field(i)?);
            names.push(schema.fields[i].name.clone());
        }
        self.project(exprs, names)
    }

    /// Relabel the columns of the current plan, keeping their values and order
    pub fn rename(&mut self, names: Vec<String>) -> Result<()> {
        let exprs = self.fields()?;
        self.project(exprs, names)
    }

    /// Make every column of the current plan reachable through `alias`
    pub fn requalify(&mut self, alias: &str) -> Result<()> {
        let plan = self.pop()?;
        let schema = plan.schema().requalify(alias);
        self.push(plan.with_schema(schema));
        Ok(())
    }

    /// Group by `group_keys`; output is the group keys followed by the aggregates
    pub fn aggregate(
        &mut self,
        group_keys: Vec<Expr>,
        group_names: Vec<String>,
        aggs: Vec<AggCall>,
        agg_names: Vec<String>,
    ) -> Result<()> {
        let input = self.pop()?;
        let mut schema = project_schema(input.schema(), &group_keys, &group_names);
        for (agg, name) in aggs.iter().zip(agg_names) {
            let mut field = FieldType::new(name, agg.data_type.clone());
            field.nullable = agg.func != "count";
            schema.fields.push(field);
        }
        self.push(LogicalPlan::Aggregate {
            input: Box::new(input),
            group_keys,
            aggs,
            schema,
        });
        Ok(())
    }

    /// Join the two topmost plans (left below right)
    ///
    /// The output keeps both sides' column names as they are, so duplicates
    /// may appear; callers reconcile them.
    pub fn join(&mut self, join_type: JoinType, condition: Expr) -> Result<()> {
        let right = self.pop()?;
        let left = self.pop()?;
        let schema = if join_type.projects_left_only() {
            left.schema().clone()
        } else {
            let (l, r) = match join_type {
                JoinType::Left => (left.schema().clone(), right.schema().as_nullable()),
                JoinType::Right => (left.schema().as_nullable(), right.schema().clone()),
                JoinType::Full => (left.schema().as_nullable(), right.schema().as_nullable()),
                _ => (left.schema().clone(), right.schema().clone()),
            };
            l.concat(&r)
        };
        self.push(LogicalPlan::Join {
            left: Box::new(left),
            right: Box::new(right),
            join_type,
            condition,
            schema,
        });
        Ok(())
    }

    pub fn sort(&mut self, keys: Vec<SortKey>) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let input = self.pop()?;
        let schema = input.schema().clone();
        self.push(LogicalPlan::Sort {
            input: Box::new(input),
            keys,
            schema,
        });
        Ok(())
    }

    pub fn limit(&mut self, offset: usize, fetch: Option<usize>) -> Result<()> {
        let input = self.pop()?;
        let schema = input.schema().clone();
        self.push(LogicalPlan::Limit {
            input: Box::new(input),
            offset,
            fetch,
            schema,
        });
        Ok(())
    }

    /// Append one column per window call
    pub fn window(&mut self, calls: Vec<WindowCall>, names: Vec<String>) -> Result<()> {
        let input = self.pop()?;
        let mut schema = input.schema().clone();
        for (call, name) in calls.iter().zip(names) {
            let mut field = FieldType::new(name, call.data_type.clone());
            field.nullable = !matches!(call.func.as_str(), "row_number" | "rank" | "dense_rank");
            schema.fields.push(field);
        }
        self.push(LogicalPlan::Window {
            input: Box::new(input),
            calls,
            schema,
        });
        Ok(())
    }
}
