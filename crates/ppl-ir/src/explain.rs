//! Text rendering of logical plans, one operator per line

use std::fmt::{self, Write};

use crate::*;

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{:?}", v),
            Value::String(s) => write!(f, "'{}'", s),
        }
    }
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "MOD",
            BinOp::Eq => "=",
            BinOp::Ne => "<>",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "AND",
            BinOp::Or => "OR",
            BinOp::Xor => "XOR",
            BinOp::Like => "LIKE",
        }
    }
}

impl UnOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Not => "NOT",
            UnOp::IsNull => "IS NULL",
            UnOp::IsNotNull => "IS NOT NULL",
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinType::Inner => "inner",
            JoinType::Left => "left",
            JoinType::Right => "right",
            JoinType::Full => "full",
            JoinType::Semi => "semi",
            JoinType::Anti => "anti",
            JoinType::Cross => "inner",
        };
        write!(f, "{}", name)
    }
}

/// AND/OR chains print as one n-ary call
fn flatten<'a>(op: BinOp, expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    match expr {
        Expr::BinaryOp {
            op: inner,
            left,
            right,
            ..
        } if *inner == op => {
            flatten(op, left, out);
            flatten(op, right, out);
        }
        other => out.push(other),
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::InputRef { index, .. } => write!(f, "${}", index),
            Expr::CorrelField {
                correlation, name, ..
            } => write!(f, "{}.{}", correlation, name),
            Expr::Literal { value, .. } => write!(f, "{}", value),
            Expr::BinaryOp { op, left, right, .. } => {
                if matches!(op, BinOp::And | BinOp::Or) {
                    let mut operands = Vec::new();
                    flatten(*op, self, &mut operands);
                    write!(f, "{}(", op.symbol())?;
                    write_list(f, &operands)?;
                    write!(f, ")")
                } else {
                    write!(f, "{}({}, {})", op.symbol(), left, right)
                }
            }
            Expr::UnaryOp { op, expr, .. } => write!(f, "{}({})", op.symbol(), expr),
            Expr::FuncCall { func, args, .. } => {
                write!(f, "{}(", func.to_uppercase())?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::Case {
                branches,
                otherwise,
                ..
            } => {
                write!(f, "CASE(")?;
                for (when, then) in branches {
                    write!(f, "{}, {}, ", when, then)?;
                }
                match otherwise {
                    Some(e) => write!(f, "{})", e),
                    None => write!(f, "null)"),
                }
            }
            Expr::Subquery { kind, plan, .. } => {
                let body = plan.explain();
                match kind {
                    SubqueryKind::Scalar => write!(f, "$SCALAR_QUERY({{\n{}}})", body),
                    SubqueryKind::Exists => write!(f, "EXISTS({{\n{}}})", body),
                    SubqueryKind::In { needles } => {
                        write!(f, "IN(")?;
                        write_list(f, needles)?;
                        write!(f, ", {{\n{}}})", body)
                    }
                }
            }
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if self.direction == SortDirection::Desc {
            write!(f, " DESC")?;
        }
        match self.nulls {
            NullOrder::First => write!(f, " NULLS FIRST"),
            NullOrder::Last => write!(f, " NULLS LAST"),
        }
    }
}

impl fmt::Display for FrameBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameBound::UnboundedPreceding => write!(f, "UNBOUNDED PRECEDING"),
            FrameBound::Preceding(n) => write!(f, "{} PRECEDING", n),
            FrameBound::CurrentRow => write!(f, "CURRENT ROW"),
            FrameBound::Following(n) => write!(f, "{} FOLLOWING", n),
            FrameBound::UnboundedFollowing => write!(f, "UNBOUNDED FOLLOWING"),
        }
    }
}

impl fmt::Display for WindowCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.func.to_uppercase())?;
        write_list(f, &self.args)?;
        write!(f, ") OVER (")?;
        if !self.partition_by.is_empty() {
            write!(f, "PARTITION BY ")?;
            write_list(f, &self.partition_by)?;
            write!(f, " ")?;
        }
        if !self.order_by.is_empty() {
            write!(f, "ORDER BY ")?;
            write_list(f, &self.order_by)?;
            write!(f, " ")?;
        }
        let mode = match self.frame.mode {
            FrameMode::Rows => "ROWS",
            FrameMode::Range => "RANGE",
        };
        write!(f, "{} BETWEEN {} AND {})", mode, self.frame.start, self.frame.end)
    }
}

impl fmt::Display for AggCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.func.to_uppercase())?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        write_list(f, &self.args)?;
        write!(f, ")")
    }
}

/// Direction label; the default null order of each direction is left implicit
fn direction_label(key: &SortKey) -> &'static str {
    match (key.direction, key.nulls) {
        (SortDirection::Asc, NullOrder::First) => "ASC-nulls-first",
        (SortDirection::Asc, NullOrder::Last) => "ASC",
        (SortDirection::Desc, NullOrder::First) => "DESC",
        (SortDirection::Desc, NullOrder::Last) => "DESC-nulls-last",
    }
}

fn named<'a, T: fmt::Display>(
    names: impl Iterator<Item = &'a FieldType>,
    items: impl Iterator<Item = T>,
) -> Vec<String> {
    names
        .zip(items)
        .map(|(field, item)| format!("{}=[{}]", field.name, item))
        .collect()
}

impl LogicalPlan {
    /// Operator name followed by its attributes, without inputs
    fn describe(&self) -> String {
        match self {
            LogicalPlan::Scan { table, .. } => {
                format!("LogicalTableScan(table=[[{}]])", table.join(", "))
            }
            LogicalPlan::Filter {
                predicate,
                correlation,
                ..
            } => match correlation {
                Some(cor) => format!(
                    "LogicalFilter(condition=[{}], variablesSet=[[{}]])",
                    predicate, cor
                ),
                None => format!("LogicalFilter(condition=[{}])", predicate),
            },
            LogicalPlan::Project {
                exprs,
                correlation,
                schema,
                ..
            } => {
                let mut attrs = named(schema.iter(), exprs.iter());
                if let Some(cor) = correlation {
                    attrs.push(format!("variablesSet=[[{}]]", cor));
                }
                format!("LogicalProject({})", attrs.join(", "))
            }
            LogicalPlan::Aggregate {
                group_keys,
                aggs,
                schema,
                ..
            } => {
                let keys = group_keys
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut attrs = vec![format!("group=[{{{}}}]", keys)];
                attrs.extend(named(schema.iter().skip(group_keys.len()), aggs.iter()));
                format!("LogicalAggregate({})", attrs.join(", "))
            }
            LogicalPlan::Join {
                join_type,
                condition,
                ..
            } => format!(
                "LogicalJoin(condition=[{}], joinType=[{}])",
                condition, join_type
            ),
            LogicalPlan::Sort { keys, .. } => {
                let mut attrs = Vec::new();
                for (i, key) in keys.iter().enumerate() {
                    attrs.push(format!("sort{}=[{}]", i, key.expr));
                }
                for (i, key) in keys.iter().enumerate() {
                    attrs.push(format!("dir{}=[{}]", i, direction_label(key)));
                }
                format!("LogicalSort({})", attrs.join(", "))
            }
            LogicalPlan::Limit { offset, fetch, .. } => {
                let mut attrs = Vec::new();
                if *offset > 0 {
                    attrs.push(format!("offset=[{}]", offset));
                }
                if let Some(fetch) = fetch {
                    attrs.push(format!("fetch=[{}]", fetch));
                }
                format!("LogicalSort({})", attrs.join(", "))
            }
            LogicalPlan::Window {
                input,
                calls,
                schema,
            } => {
                let attrs = named(schema.iter().skip(input.schema().len()), calls.iter());
                format!("LogicalWindow({})", attrs.join(", "))
            }
        }
    }

    fn explain_into(&self, out: &mut String, depth: usize) {
        let pad = "  ".repeat(depth);
        let _ = writeln!(out, "{}{}", pad, self.describe());
        for input in self.inputs() {
            input.explain_into(out, depth + 1);
        }
    }

    /// Multi-line plan text, two spaces of indentation per level
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_into(&mut out, 0);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan() -> LogicalPlan {
        LogicalPlan::Scan {
            table: vec!["scott".into(), "EMP".into()],
            schema: RowSchema::new(vec![
                FieldType::new("EMPNO", DataType::Int32),
                FieldType::new("DEPTNO", DataType::Int32),
            ]),
        }
    }

    #[test]
    fn test_explain_nested_operators() {
        let filter = LogicalPlan::Filter {
            schema: scan().schema().clone(),
            input: Box::new(scan()),
            predicate: Expr::and_all(vec![
                Expr::binary(
                    BinOp::Gt,
                    Expr::input_ref(0, DataType::Int32),
                    Expr::literal(Value::Int(1)),
                ),
                Expr::unary(UnOp::IsNotNull, Expr::input_ref(1, DataType::Int32)),
                Expr::binary(
                    BinOp::Ne,
                    Expr::input_ref(1, DataType::Int32),
                    Expr::literal(Value::String("x".into())),
                ),
            ]),
            correlation: None,
        };
        let sort = LogicalPlan::Sort {
            schema: filter.schema().clone(),
            input: Box::new(filter),
            keys: vec![SortKey::new(
                Expr::input_ref(1, DataType::Int32),
                SortDirection::Desc,
            )],
        };

        assert_eq!(
            sort.explain(),
            "LogicalSort(sort0=[$1], dir0=[DESC-nulls-last])\n\
             \x20 LogicalFilter(condition=[AND(>($0, 1), IS NOT NULL($1), <>($1, 'x'))])\n\
             \x20   LogicalTableScan(table=[[scott, EMP]])\n"
        );
    }

    #[test]
    fn test_explain_window_call() {
        let call = WindowCall {
            func: "row_number".into(),
            args: vec![],
            partition_by: vec![Expr::input_ref(0, DataType::Int32)],
            order_by: vec![SortKey::new(
                Expr::input_ref(0, DataType::Int32),
                SortDirection::Asc,
            )],
            frame: WindowFrame::running(),
            data_type: DataType::Int64,
        };

        assert_eq!(
            call.to_string(),
            "ROW_NUMBER() OVER (PARTITION BY $0 ORDER BY $0 NULLS FIRST ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW)"
        );
    }
}
