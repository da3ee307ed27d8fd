//! Commands expressed through a `row_number()` window
//!
//! `dedup`, `top`/`rare` and `appendcol` each number rows with a hidden
//! column, filter or join on it, and drop it again before returning.

use ppl_ast::{self as ast, Argument, Literal, RareTopNKind, UnresolvedExpr};
use ppl_ir::{
    BinOp, DataType, Expr, JoinType, SortDirection, SortKey, UnOp, Value, WindowCall, WindowFrame,
};
use tracing::debug;

use crate::compiler::Planner;
use crate::context::PlanContext;
use crate::error::{PlanError, Result};

const ROW_NUMBER: &str = "_row_number_";
const ROW_NUMBER_MAIN: &str = "_row_number_main_";
const ROW_NUMBER_SUBSEARCH: &str = "_row_number_subsearch_";

fn row_number(partition_by: Vec<Expr>, order_by: Vec<SortKey>) -> WindowCall {
    WindowCall {
        func: "row_number".to_string(),
        args: Vec::new(),
        partition_by,
        order_by,
        frame: WindowFrame::running(),
        data_type: DataType::Int64,
    }
}

fn option<'o>(options: &'o [Argument], name: &str) -> Option<&'o Literal> {
    options
        .iter()
        .find(|a| a.name.eq_ignore_ascii_case(name))
        .map(|a| &a.value)
}

fn int_option(options: &[Argument], name: &str, default: i64) -> Result<i64> {
    match option(options, name) {
        None => Ok(default),
        Some(Literal::Int(v)) => Ok(*v),
        Some(other) => Err(PlanError::InvalidArgument(format!(
            "option {} expects an integer, got {}",
            name, other
        ))),
    }
}

fn bool_option(options: &[Argument], name: &str, default: bool) -> Result<bool> {
    match option(options, name) {
        None => Ok(default),
        Some(Literal::Bool(v)) => Ok(*v),
        Some(other) => Err(PlanError::InvalidArgument(format!(
            "option {} expects a boolean, got {}",
            name, other
        ))),
    }
}

fn string_option(options: &[Argument], name: &str, default: &str) -> Result<String> {
    match option(options, name) {
        None => Ok(default.to_string()),
        Some(Literal::String(v)) => Ok(v.clone()),
        Some(other) => Err(PlanError::InvalidArgument(format!(
            "option {} expects a string, got {}",
            name, other
        ))),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DedupeOptions {
    pub number: i64,
    pub keep_empty: bool,
    pub consecutive: bool,
}

impl DedupeOptions {
    pub fn from_arguments(options: &[Argument]) -> Result<Self> {
        Ok(Self {
            number: int_option(options, "number", 1)?,
            keep_empty: bool_option(options, "keepempty", false)?,
            consecutive: bool_option(options, "consecutive", false)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RareTopNOptions {
    pub limit: i64,
    pub count_field: String,
    pub show_count: bool,
}

impl RareTopNOptions {
    pub fn from_arguments(arguments: &[Argument]) -> Result<Self> {
        let limit = int_option(arguments, "noOfResults", 10)?;
        if limit < 0 {
            return Err(PlanError::InvalidArgument(format!(
                "number of results must not be negative, got {}",
                limit
            )));
        }
        Ok(Self {
            limit,
            count_field: string_option(arguments, "countField", "count")?,
            show_count: bool_option(arguments, "showCount", true)?,
        })
    }
}

impl<'a> Planner<'a> {
    pub(crate) fn visit_dedupe(&self, node: &ast::Dedupe, ctx: &mut PlanContext) -> Result<()> {
        let options = DedupeOptions::from_arguments(&node.options)?;
        if options.number < 1 {
            return Err(PlanError::InvalidArgument(
                "Number of duplicate events must be greater than 0".into(),
            ));
        }
        if options.consecutive {
            return Err(PlanError::Unsupported(
                "Consecutive deduplication is not supported".into(),
            ));
        }

        self.visit_input(&node.child, "dedup", ctx)?;
        let schema = ctx.schema()?.clone();
        let keys = self.translate_all(&node.fields, &schema, ctx)?;
        debug!(keys = keys.len(), number = options.number, keep_empty = options.keep_empty, "dedup");

        if !options.keep_empty {
            let not_null = keys
                .iter()
                .map(|k| Expr::unary(UnOp::IsNotNull, k.clone()))
                .collect();
            ctx.filter(Expr::and_all(not_null), None)?;
        }

        let order_by = keys
            .iter()
            .map(|k| SortKey::new(k.clone(), SortDirection::Asc))
            .collect();
        let rn_index = schema.len();
        ctx.window(vec![row_number(keys.clone(), order_by)], vec![ROW_NUMBER.into()])?;

        let within = Expr::binary(
            BinOp::Le,
            ctx.field(rn_index)?,
            Expr::literal(Value::Int(options.number)),
        );
        let predicate = if options.keep_empty {
            let mut any_null: Vec<Expr> = keys
                .into_iter()
                .map(|k| Expr::unary(UnOp::IsNull, k))
                .collect();
            any_null.push(within);
            Expr::or_all(any_null)
        } else {
            within
        };
        ctx.filter(predicate, None)?;
        ctx.project_except(&[rn_index])
    }

    pub(crate) fn visit_rare_top_n(&self, node: &ast::RareTopN, ctx: &mut PlanContext) -> Result<()> {
        let options = RareTopNOptions::from_arguments(&node.arguments)?;
        let command = match node.command {
            RareTopNKind::Top => "top",
            RareTopNKind::Rare => "rare",
        };
        self.visit_input(&node.child, command, ctx)?;

        if ctx.schema()?.contains(&options.count_field) {
            return Err(PlanError::semantic(format!(
                "Field `{}` already exists, change the count field by setting countfield='xyz'",
                options.count_field
            )));
        }

        let mut group_exprs = node.group_exprs.clone();
        group_exprs.extend(node.fields.iter().cloned());
        let count = UnresolvedExpr::Alias {
            name: options.count_field.clone(),
            expr: Box::new(UnresolvedExpr::Aggregate {
                name: "count".into(),
                args: Vec::new(),
                distinct: false,
            }),
        };
        self.aggregate_with_trimming(&group_exprs, &[count], ctx)?;

        let partition_by = (0..node.group_exprs.len())
            .map(|i| ctx.field(i))
            .collect::<Result<Vec<_>>>()?;
        let count_index = group_exprs.len();
        let direction = match node.command {
            RareTopNKind::Top => SortDirection::Desc,
            RareTopNKind::Rare => SortDirection::Asc,
        };
        let order_by = vec![SortKey::new(ctx.field(count_index)?, direction)];
        let rn_index = count_index + 1;
        ctx.window(vec![row_number(partition_by, order_by)], vec![ROW_NUMBER.into()])?;

        let within = Expr::binary(
            BinOp::Le,
            ctx.field(rn_index)?,
            Expr::literal(Value::Int(options.limit)),
        );
        ctx.filter(within, None)?;
        if options.show_count {
            ctx.project_except(&[rn_index])
        } else {
            ctx.project_except(&[count_index, rn_index])
        }
    }

    pub(crate) fn visit_append_col(&self, node: &ast::AppendCol, ctx: &mut PlanContext) -> Result<()> {
        self.visit_input(&node.child, "appendcol", ctx)?;
        let main_rn = ctx.schema()?.len();
        ctx.window(vec![row_number(Vec::new(), Vec::new())], vec![ROW_NUMBER_MAIN.into()])?;

        let relation = node
            .child
            .as_deref()
            .and_then(|child| child.base_relation())
            .ok_or_else(|| PlanError::semantic("appendcol requires a source relation"))?;
        let sub_search = node.sub_search.attach_leaf(relation.clone());
        self.visit(&sub_search, ctx)?;
        let sub_rn = ctx.schema()?.len();
        ctx.window(
            vec![row_number(Vec::new(), Vec::new())],
            vec![ROW_NUMBER_SUBSEARCH.into()],
        )?;

        let main_names = ctx.peek_at(1)?.schema().names();
        let main_width = main_names.len();

        if !node.override_columns {
            let sub_names = ctx.schema()?.names();
            let keep: Vec<usize> = sub_names
                .iter()
                .enumerate()
                .filter(|(_, name)| !main_names.contains(name))
                .map(|(i, _)| i)
                .collect();
            let sub_rn = keep.len() - 1;
            ctx.project_indices(&keep)?;

            let condition = Expr::binary(
                BinOp::Eq,
                Expr::input_ref(main_rn, DataType::Int64),
                Expr::input_ref(main_width + sub_rn, DataType::Int64),
            );
            ctx.join(JoinType::Full, condition)?;
            return ctx.project_except(&[main_rn, main_width + sub_rn]);
        }

        let sub_names = ctx.schema()?.names();
        let condition = Expr::binary(
            BinOp::Eq,
            Expr::input_ref(main_rn, DataType::Int64),
            Expr::input_ref(main_width + sub_rn, DataType::Int64),
        );
        ctx.join(JoinType::Full, condition.clone())?;

        let mut exprs = Vec::new();
        let mut names = Vec::new();
        for (i, name) in main_names.iter().enumerate() {
            if i == main_rn {
                continue;
            }
            let main = ctx.field(i)?;
            match sub_names.iter().position(|n| n == name) {
                Some(j) => {
                    let data_type = main.data_type();
                    exprs.push(Expr::Case {
                        branches: vec![(condition.clone(), ctx.field(main_width + j)?)],
                        otherwise: Some(Box::new(main)),
                        data_type,
                    });
                }
                None => exprs.push(main),
            }
            names.push(name.clone());
        }
        for (j, name) in sub_names.iter().enumerate() {
            if j == sub_rn || main_names.contains(name) {
                continue;
            }
            exprs.push(ctx.field(main_width + j)?);
            names.push(name.clone());
        }
        ctx.project(exprs, names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppl_ast::dsl::argument;

    #[test]
    fn test_dedupe_option_defaults() {
        let options = DedupeOptions::from_arguments(&[]).unwrap();
        assert_eq!(
            options,
            DedupeOptions {
                number: 1,
                keep_empty: false,
                consecutive: false
            }
        );
    }

    #[test]
    fn test_option_type_mismatch() {
        let err = DedupeOptions::from_arguments(&[argument("number", Literal::String("2".into()))])
            .unwrap_err();
        assert!(matches!(err, PlanError::InvalidArgument(_)));
    }

    #[test]
    fn test_rare_top_n_options() {
        let options = RareTopNOptions::from_arguments(&[
            argument("noofresults", Literal::Int(3)),
            argument("showCount", Literal::Bool(false)),
        ])
        .unwrap();
        assert_eq!(options.limit, 3);
        assert_eq!(options.count_field, "count");
        assert!(!options.show_count);
    }
}
