//! Expression translation: unresolved AST expressions to IR expressions
//!
//! Field names resolve against the given schema first (exact name, then
//! `qualifier.name`), then against open correlation variables, innermost
//! first. Sub-queries are compiled in the same context and embedded.

use ppl_ast::{self as ast, UnresolvedExpr, UnresolvedPlan};
use ppl_ir::{
    AggCall, BinOp, DataType, Expr, FrameBound, FrameMode, LogicalPlan, NullOrder, RowSchema,
    SortDirection, SortKey, SubqueryKind, UnOp, Value, WindowCall, WindowFrame,
};
use tracing::trace;

use crate::compiler::Planner;
use crate::context::PlanContext;
use crate::error::{PlanError, Result};
use crate::registry::FunctionKind;

pub(crate) fn literal_value(lit: &ast::Literal) -> Value {
    match lit {
        ast::Literal::Null => Value::Null,
        ast::Literal::Bool(b) => Value::Bool(*b),
        ast::Literal::Int(i) => Value::Int(*i),
        ast::Literal::Float(f) => Value::Float(*f),
        ast::Literal::String(s) => Value::String(s.clone()),
    }
}

fn binary_op(op: ast::BinOp) -> BinOp {
    match op {
        ast::BinOp::Add => BinOp::Add,
        ast::BinOp::Sub => BinOp::Sub,
        ast::BinOp::Mul => BinOp::Mul,
        ast::BinOp::Div => BinOp::Div,
        ast::BinOp::Mod => BinOp::Mod,
        ast::BinOp::Eq => BinOp::Eq,
        ast::BinOp::Ne => BinOp::Ne,
        ast::BinOp::Lt => BinOp::Lt,
        ast::BinOp::Le => BinOp::Le,
        ast::BinOp::Gt => BinOp::Gt,
        ast::BinOp::Ge => BinOp::Ge,
        ast::BinOp::And => BinOp::And,
        ast::BinOp::Or => BinOp::Or,
        ast::BinOp::Xor => BinOp::Xor,
        ast::BinOp::Like => BinOp::Like,
    }
}

/// Exact name first, then `qualifier.name`
fn lookup(schema: &RowSchema, name: &str) -> Option<usize> {
    schema.index_of(name).or_else(|| {
        let (qualifier, rest) = name.split_once('.')?;
        schema.index_of_qualified(qualifier, rest)
    })
}

/// Column name for a projected expression
///
/// Aliases and assignments name themselves; a plain column reference keeps
/// the referenced column's name (so `e.DEPTNO` projects as `DEPTNO`).
pub(crate) fn output_name(expr: &UnresolvedExpr, resolved: &Expr, schema: &RowSchema) -> String {
    match expr {
        UnresolvedExpr::Alias { name, .. } | UnresolvedExpr::Let { field: name, .. } => {
            name.clone()
        }
        _ => resolved
            .as_input_ref()
            .and_then(|i| schema.field(i))
            .map(|f| f.name.clone())
            .unwrap_or_else(|| expr.display_name()),
    }
}

impl<'a> Planner<'a> {
    pub(crate) fn resolve_field(
        &self,
        name: &str,
        schema: &RowSchema,
        ctx: &PlanContext,
    ) -> Result<Expr> {
        if let Some(index) = lookup(schema, name) {
            return Ok(Expr::input_ref(index, schema.fields[index].data_type.clone()));
        }
        for correlation in ctx.correlations() {
            if let Some(index) = lookup(&correlation.schema, name) {
                let field = &correlation.schema.fields[index];
                trace!(field = name, correlation = %correlation.id, "resolved outer field");
                return Ok(Expr::CorrelField {
                    correlation: correlation.id,
                    index,
                    name: field.name.clone(),
                    data_type: field.data_type.clone(),
                });
            }
        }
        Err(PlanError::semantic(format!(
            "field [{}] not found; input fields are: [{}]",
            name,
            schema.names().join(", ")
        )))
    }

    /// Scalar function call checked against the registry
    pub(crate) fn call(&self, name: &str, args: Vec<Expr>) -> Result<Expr> {
        let arg_types: Vec<DataType> = args.iter().map(Expr::data_type).collect();
        let sig = self.registry.lookup(name, FunctionKind::Scalar, &arg_types)?;
        let data_type = sig.resolve_return_type(&arg_types);
        Ok(Expr::call(sig.name.clone(), args, data_type))
    }

    pub(crate) fn translate_all(
        &self,
        exprs: &[UnresolvedExpr],
        schema: &RowSchema,
        ctx: &mut PlanContext,
    ) -> Result<Vec<Expr>> {
        exprs
            .iter()
            .map(|e| self.translate(e, schema, ctx))
            .collect()
    }

    /// Translate `expr` against `schema`
    ///
    /// Each nesting level counts against the same depth bound as plan nodes.
    pub(crate) fn translate(
        &self,
        expr: &UnresolvedExpr,
        schema: &RowSchema,
        ctx: &mut PlanContext,
    ) -> Result<Expr> {
        ctx.enter_node()?;
        let result = self.translate_expr(expr, schema, ctx);
        ctx.exit_node();
        result
    }

    fn translate_expr(
        &self,
        expr: &UnresolvedExpr,
        schema: &RowSchema,
        ctx: &mut PlanContext,
    ) -> Result<Expr> {
        match expr {
            UnresolvedExpr::Literal(lit) => Ok(Expr::literal(literal_value(lit))),
            UnresolvedExpr::Field(name) => self.resolve_field(name, schema, ctx),
            UnresolvedExpr::AllFields | UnresolvedExpr::AllFieldsExcludeMeta => Err(
                PlanError::semantic("wildcard is only allowed as a projection"),
            ),
            UnresolvedExpr::Alias { expr, .. } | UnresolvedExpr::Let { expr, .. } => {
                self.translate(expr, schema, ctx)
            }
            UnresolvedExpr::Function { name, args } => {
                let args = self.translate_all(args, schema, ctx)?;
                match name.to_lowercase().as_str() {
                    "isnull" | "is null" => self.null_test(UnOp::IsNull, args),
                    "isnotnull" | "is not null" => self.null_test(UnOp::IsNotNull, args),
                    _ => self.call(name, args),
                }
            }
            UnresolvedExpr::Aggregate { name, .. } => Err(PlanError::semantic(format!(
                "aggregate function {} is not allowed here",
                name
            ))),
            UnresolvedExpr::BinaryOp { op, left, right } => {
                let left = self.translate(left, schema, ctx)?;
                let right = self.translate(right, schema, ctx)?;
                Ok(Expr::binary(binary_op(*op), left, right))
            }
            UnresolvedExpr::UnaryOp { op, expr } => {
                let inner = self.translate(expr, schema, ctx)?;
                let op = match op {
                    ast::UnOp::Neg => UnOp::Neg,
                    ast::UnOp::Not => UnOp::Not,
                };
                Ok(Expr::unary(op, inner))
            }
            UnresolvedExpr::In { expr, values } => {
                let needle = self.translate(expr, schema, ctx)?;
                let values = self.translate_all(values, schema, ctx)?;
                Ok(Expr::or_all(
                    values
                        .into_iter()
                        .map(|v| Expr::binary(BinOp::Eq, needle.clone(), v))
                        .collect(),
                ))
            }
            UnresolvedExpr::Case {
                branches,
                otherwise,
            } => {
                let mut resolved = Vec::with_capacity(branches.len());
                for (when, then) in branches {
                    let when = self.translate(when, schema, ctx)?;
                    let then = self.translate(then, schema, ctx)?;
                    resolved.push((when, then));
                }
                let otherwise = match otherwise {
                    Some(e) => Some(Box::new(self.translate(e, schema, ctx)?)),
                    None => None,
                };
                let data_type = resolved
                    .first()
                    .map(|(_, then)| then.data_type())
                    .unwrap_or(DataType::Null);
                Ok(Expr::Case {
                    branches: resolved,
                    otherwise,
                    data_type,
                })
            }
            UnresolvedExpr::Span { field, value, unit } => {
                let field = self.translate(field, schema, ctx)?;
                let unit = match unit {
                    Some(u) => Value::String(u.clone()),
                    None => Value::Null,
                };
                self.call(
                    "span",
                    vec![field, Expr::literal(literal_value(value)), Expr::literal(unit)],
                )
            }
            UnresolvedExpr::WindowFunction { .. } => Err(PlanError::semantic(
                "window functions are only allowed in the window command",
            )),
            UnresolvedExpr::ScalarSubquery(query) => {
                let plan = self.compile_subquery(query, ctx)?;
                let data_type = plan
                    .schema()
                    .field(0)
                    .map(|f| f.data_type.clone())
                    .unwrap_or(DataType::Unknown);
                Ok(Expr::Subquery {
                    kind: SubqueryKind::Scalar,
                    plan: Box::new(plan),
                    data_type,
                })
            }
            UnresolvedExpr::ExistsSubquery(query) => {
                let plan = self.compile_subquery(query, ctx)?;
                Ok(Expr::Subquery {
                    kind: SubqueryKind::Exists,
                    plan: Box::new(plan),
                    data_type: DataType::Bool,
                })
            }
            UnresolvedExpr::InSubquery { values, query } => {
                let needles = self.translate_all(values, schema, ctx)?;
                let plan = self.compile_subquery(query, ctx)?;
                if plan.schema().len() != needles.len() {
                    return Err(PlanError::semantic(format!(
                        "in-subquery compares {} values against {} columns",
                        needles.len(),
                        plan.schema().len()
                    )));
                }
                Ok(Expr::Subquery {
                    kind: SubqueryKind::In { needles },
                    plan: Box::new(plan),
                    data_type: DataType::Bool,
                })
            }
        }
    }

    fn null_test(&self, op: UnOp, mut args: Vec<Expr>) -> Result<Expr> {
        if args.len() != 1 {
            return Err(PlanError::semantic(format!(
                "null test takes one argument, got {}",
                args.len()
            )));
        }
        Ok(Expr::unary(op, args.remove(0)))
    }

    /// Compile a nested query; its result is popped off the stack
    fn compile_subquery(&self, query: &UnresolvedPlan, ctx: &mut PlanContext) -> Result<LogicalPlan> {
        ctx.enter_subquery();
        let compiled = self.visit(query, ctx).and_then(|_| ctx.pop());
        ctx.exit_subquery();
        compiled
    }

    /// Aggregate call and its output name
    pub(crate) fn translate_agg(
        &self,
        expr: &UnresolvedExpr,
        schema: &RowSchema,
        ctx: &mut PlanContext,
    ) -> Result<(AggCall, String)> {
        let (name, inner) = match expr {
            UnresolvedExpr::Alias { name, expr } => (name.clone(), expr.as_ref()),
            other => (other.display_name(), other),
        };
        let UnresolvedExpr::Aggregate {
            name: func,
            args,
            distinct,
        } = inner
        else {
            return Err(PlanError::semantic(format!(
                "expected an aggregate function, got {}",
                inner
            )));
        };

        let args = match args.as_slice() {
            [UnresolvedExpr::AllFields] => Vec::new(),
            args => self.translate_all(args, schema, ctx)?,
        };
        let arg_types: Vec<DataType> = args.iter().map(Expr::data_type).collect();
        let sig = self
            .registry
            .lookup(func, FunctionKind::Aggregate, &arg_types)?;
        let call = AggCall {
            func: sig.name.clone(),
            args,
            distinct: *distinct,
            data_type: sig.resolve_return_type(&arg_types),
        };
        Ok((call, name))
    }

    pub(crate) fn translate_sort_key(
        &self,
        field: &ast::SortField,
        schema: &RowSchema,
        ctx: &mut PlanContext,
    ) -> Result<SortKey> {
        let expr = self.translate(&field.field, schema, ctx)?;
        let direction = if field.asc {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        };
        let mut key = SortKey::new(expr, direction);
        if let Some(nulls_first) = field.nulls_first {
            key.nulls = if nulls_first {
                NullOrder::First
            } else {
                NullOrder::Last
            };
        }
        Ok(key)
    }

    /// Window call and its output name
    pub(crate) fn translate_window(
        &self,
        expr: &UnresolvedExpr,
        schema: &RowSchema,
        ctx: &mut PlanContext,
    ) -> Result<(WindowCall, String)> {
        let (name, inner) = match expr {
            UnresolvedExpr::Alias { name, expr } => (name.clone(), expr.as_ref()),
            other => (other.display_name(), other),
        };
        let UnresolvedExpr::WindowFunction {
            function,
            partition_by,
            sort_by,
        } = inner
        else {
            return Err(PlanError::semantic(format!(
                "expected a window function, got {}",
                inner
            )));
        };
        let (func, args) = match function.as_ref() {
            UnresolvedExpr::Function { name, args } | UnresolvedExpr::Aggregate { name, args, .. } => {
                (name, args)
            }
            other => {
                return Err(PlanError::semantic(format!(
                    "{} cannot be evaluated over a window",
                    other
                )))
            }
        };

        let args = match args.as_slice() {
            [UnresolvedExpr::AllFields] => Vec::new(),
            args => self.translate_all(args, schema, ctx)?,
        };
        let arg_types: Vec<DataType> = args.iter().map(Expr::data_type).collect();
        let sig = self.registry.lookup(func, FunctionKind::Window, &arg_types)?;
        let partition_by = self.translate_all(partition_by, schema, ctx)?;
        let order_by = sort_by
            .iter()
            .map(|s| self.translate_sort_key(s, schema, ctx))
            .collect::<Result<Vec<_>>>()?;
        let frame = if order_by.is_empty() {
            WindowFrame {
                mode: FrameMode::Rows,
                start: FrameBound::UnboundedPreceding,
                end: FrameBound::UnboundedFollowing,
            }
        } else {
            WindowFrame::running()
        };

        let call = WindowCall {
            func: sig.name.clone(),
            args,
            partition_by,
            order_by,
            frame,
            data_type: sig.resolve_return_type(&arg_types),
        };
        Ok((call, name))
    }
}
