//! PPL logical plan IR
//!
//! Relational operator tree produced by the planner. Every operator owns
//! its inputs and carries its output schema; the only back-references are
//! correlated fields, which name an enclosing scope by id.
//! All types serialize deterministically for fingerprinting.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;

mod explain;
mod types;
pub use types::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Value {
    /// Type a literal gets when nothing else constrains it
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Bool(_) => DataType::Bool,
            Value::Int(_) => DataType::Int64,
            Value::Float(_) => DataType::Float64,
            Value::String(_) => DataType::String,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    // Arithmetic
    Add, Sub, Mul, Div, Mod,
    // Comparison
    Eq, Ne, Lt, Le, Gt, Ge,
    // Logical
    And, Or, Xor,
    // String
    Like,
}

impl BinOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinOp::And | BinOp::Or | BinOp::Xor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Semi,
    Anti,
    Cross,
}

impl JoinType {
    /// Semi and anti joins only ever emit left rows
    pub fn projects_left_only(&self) -> bool {
        matches!(self, JoinType::Semi | JoinType::Anti)
    }
}

/// Id of a correlation variable; rendered `$cor<N>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub usize);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$cor{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SubqueryKind {
    Scalar,
    Exists,
    In { needles: Vec<Expr> },
}

/// Resolved scalar expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Expr {
    /// Column `index` of the operator's (combined) input
    InputRef { index: usize, data_type: DataType },
    /// Column of an enclosing query's current row
    CorrelField {
        correlation: CorrelationId,
        index: usize,
        name: String,
        data_type: DataType,
    },
    Literal { value: Value, data_type: DataType },
    BinaryOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        data_type: DataType,
    },
    UnaryOp {
        op: UnOp,
        expr: Box<Expr>,
        data_type: DataType,
    },
    FuncCall {
        func: String,
        args: Vec<Expr>,
        data_type: DataType,
    },
    Case {
        branches: Vec<(Expr, Expr)>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        otherwise: Option<Box<Expr>>,
        data_type: DataType,
    },
    Subquery {
        kind: SubqueryKind,
        plan: Box<LogicalPlan>,
        data_type: DataType,
    },
}

impl Expr {
    pub fn input_ref(index: usize, data_type: DataType) -> Self {
        Expr::InputRef { index, data_type }
    }

    pub fn literal(value: Value) -> Self {
        let data_type = value.data_type();
        Expr::Literal { value, data_type }
    }

    pub fn boolean(value: bool) -> Self {
        Expr::literal(Value::Bool(value))
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        let data_type = if op.is_comparison() || op.is_logical() || op == BinOp::Like {
            DataType::Bool
        } else {
            left.data_type()
        };
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
            data_type,
        }
    }

    pub fn unary(op: UnOp, expr: Expr) -> Self {
        let data_type = match op {
            UnOp::Neg => expr.data_type(),
            UnOp::Not | UnOp::IsNull | UnOp::IsNotNull => DataType::Bool,
        };
        Expr::UnaryOp {
            op,
            expr: Box::new(expr),
            data_type,
        }
    }

    pub fn call(func: impl Into<String>, args: Vec<Expr>, data_type: DataType) -> Self {
        Expr::FuncCall {
            func: func.into(),
            args,
            data_type,
        }
    }

    /// Conjunction of all predicates; `true` when there are none
    pub fn and_all(mut predicates: Vec<Expr>) -> Expr {
        match predicates.len() {
            0 => Expr::boolean(true),
            1 => predicates.remove(0),
            _ => {
                let first = predicates.remove(0);
                predicates
                    .into_iter()
                    .fold(first, |acc, p| Expr::binary(BinOp::And, acc, p))
            }
        }
    }

    /// Disjunction of all predicates; `false` when there are none
    pub fn or_all(mut predicates: Vec<Expr>) -> Expr {
        match predicates.len() {
            0 => Expr::boolean(false),
            1 => predicates.remove(0),
            _ => {
                let first = predicates.remove(0);
                predicates
                    .into_iter()
                    .fold(first, |acc, p| Expr::binary(BinOp::Or, acc, p))
            }
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Expr::InputRef { data_type, .. }
            | Expr::CorrelField { data_type, .. }
            | Expr::Literal { data_type, .. }
            | Expr::BinaryOp { data_type, .. }
            | Expr::UnaryOp { data_type, .. }
            | Expr::FuncCall { data_type, .. }
            | Expr::Case { data_type, .. }
            | Expr::Subquery { data_type, .. } => data_type.clone(),
        }
    }

    pub fn as_input_ref(&self) -> Option<usize> {
        match self {
            Expr::InputRef { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Pre-order walk, descending into sub-query plans
    pub fn walk(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        match self {
            Expr::InputRef { .. } | Expr::CorrelField { .. } | Expr::Literal { .. } => {}
            Expr::BinaryOp { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            Expr::UnaryOp { expr, .. } => expr.walk(f),
            Expr::FuncCall { args, .. } => args.iter().for_each(|a| a.walk(f)),
            Expr::Case {
                branches,
                otherwise,
                ..
            } => {
                for (when, then) in branches {
                    when.walk(f);
                    then.walk(f);
                }
                if let Some(e) = otherwise {
                    e.walk(f);
                }
            }
            Expr::Subquery { kind, plan, .. } => {
                if let SubqueryKind::In { needles } = kind {
                    needles.iter().for_each(|n| n.walk(f));
                }
                plan.for_each_expr(f);
            }
        }
    }

    /// Input columns referenced at this level; sub-query plans have their own inputs
    pub fn input_refs(&self) -> BTreeSet<usize> {
        let mut refs = BTreeSet::new();
        self.collect_input_refs(&mut refs);
        refs
    }

    fn collect_input_refs(&self, refs: &mut BTreeSet<usize>) {
        match self {
            Expr::InputRef { index, .. } => {
                refs.insert(*index);
            }
            Expr::CorrelField { .. } | Expr::Literal { .. } => {}
            Expr::BinaryOp { left, right, .. } => {
                left.collect_input_refs(refs);
                right.collect_input_refs(refs);
            }
            Expr::UnaryOp { expr, .. } => expr.collect_input_refs(refs),
            Expr::FuncCall { args, .. } => args.iter().for_each(|a| a.collect_input_refs(refs)),
            Expr::Case {
                branches,
                otherwise,
                ..
            } => {
                for (when, then) in branches {
                    when.collect_input_refs(refs);
                    then.collect_input_refs(refs);
                }
                if let Some(e) = otherwise {
                    e.collect_input_refs(refs);
                }
            }
            Expr::Subquery { kind, .. } => {
                if let SubqueryKind::In { needles } = kind {
                    needles.iter().for_each(|n| n.collect_input_refs(refs));
                }
            }
        }
    }

    /// Rebuild the expression with every input reference replaced by `f(index, type)`
    pub fn map_input_refs(&self, f: &mut dyn FnMut(usize, &DataType) -> Expr) -> Expr {
        match self {
            Expr::InputRef { index, data_type } => f(*index, data_type),
            Expr::CorrelField { .. } | Expr::Literal { .. } => self.clone(),
            Expr::BinaryOp {
                op,
                left,
                right,
                data_type,
            } => Expr::BinaryOp {
                op: *op,
                left: Box::new(left.map_input_refs(f)),
                right: Box::new(right.map_input_refs(f)),
                data_type: data_type.clone(),
            },
            Expr::UnaryOp {
                op,
                expr,
                data_type,
            } => Expr::UnaryOp {
                op: *op,
                expr: Box::new(expr.map_input_refs(f)),
                data_type: data_type.clone(),
            },
            Expr::FuncCall {
                func,
                args,
                data_type,
            } => Expr::FuncCall {
                func: func.clone(),
                args: args.iter().map(|a| a.map_input_refs(f)).collect(),
                data_type: data_type.clone(),
            },
            Expr::Case {
                branches,
                otherwise,
                data_type,
            } => Expr::Case {
                branches: branches
                    .iter()
                    .map(|(w, t)| (w.map_input_refs(f), t.map_input_refs(f)))
                    .collect(),
                otherwise: otherwise.as_ref().map(|e| Box::new(e.map_input_refs(f))),
                data_type: data_type.clone(),
            },
            Expr::Subquery {
                kind,
                plan,
                data_type,
            } => Expr::Subquery {
                kind: match kind {
                    SubqueryKind::In { needles } => SubqueryKind::In {
                        needles: needles.iter().map(|n| n.map_input_refs(f)).collect(),
                    },
                    other => other.clone(),
                },
                plan: plan.clone(),
                data_type: data_type.clone(),
            },
        }
    }

    /// Substitute the expressions of an underlying projection for its output refs
    pub fn inline(&self, below: &[Expr]) -> Expr {
        self.map_input_refs(&mut |index, data_type| {
            below
                .get(index)
                .cloned()
                .unwrap_or_else(|| Expr::input_ref(index, data_type.clone()))
        })
    }

    pub fn contains_subquery(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if matches!(e, Expr::Subquery { .. }) {
                found = true;
            }
        });
        found
    }

    /// Whether `correlation` is read anywhere below, sub-query plans included
    pub fn uses_correlation(&self, correlation: CorrelationId) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if let Expr::CorrelField { correlation: c, .. } = e {
                if *c == correlation {
                    found = true;
                }
            }
        });
        found
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggCall {
    pub func: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Expr>,
    #[serde(default)]
    pub distinct: bool,
    pub data_type: DataType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NullOrder {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub expr: Expr,
    pub direction: SortDirection,
    pub nulls: NullOrder,
}

impl SortKey {
    /// Ascending keys put nulls first, descending keys put them last
    pub fn new(expr: Expr, direction: SortDirection) -> Self {
        let nulls = match direction {
            SortDirection::Asc => NullOrder::First,
            SortDirection::Desc => NullOrder::Last,
        };
        Self {
            expr,
            direction,
            nulls,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(u64),
    CurrentRow,
    Following(u64),
    UnboundedFollowing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameMode {
    Rows,
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowFrame {
    pub mode: FrameMode,
    pub start: FrameBound,
    pub end: FrameBound,
}

impl WindowFrame {
    /// `ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW`
    pub fn running() -> Self {
        Self {
            mode: FrameMode::Rows,
            start: FrameBound::UnboundedPreceding,
            end: FrameBound::CurrentRow,
        }
    }
}

/// One window function evaluated per input row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowCall {
    pub func: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Expr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partition_by: Vec<Expr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<SortKey>,
    pub frame: WindowFrame,
    pub data_type: DataType,
}

/// Logical operator tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum LogicalPlan {
    Scan {
        table: Vec<String>,
        schema: RowSchema,
    },
    Filter {
        input: Box<LogicalPlan>,
        predicate: Expr,
        /// Correlation variable the predicate's sub-queries read, if any
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation: Option<CorrelationId>,
        schema: RowSchema,
    },
    Project {
        input: Box<LogicalPlan>,
        exprs: Vec<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation: Option<CorrelationId>,
        schema: RowSchema,
    },
    /// Output: group keys first, then aggregate calls
    Aggregate {
        input: Box<LogicalPlan>,
        group_keys: Vec<Expr>,
        aggs: Vec<AggCall>,
        schema: RowSchema,
    },
    /// Condition refers to the left columns followed by the right columns
    Join {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        join_type: JoinType,
        condition: Expr,
        schema: RowSchema,
    },
    Sort {
        input: Box<LogicalPlan>,
        keys: Vec<SortKey>,
        schema: RowSchema,
    },
    Limit {
        input: Box<LogicalPlan>,
        offset: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fetch: Option<usize>,
        schema: RowSchema,
    },
    /// Output: input columns followed by one column per call
    Window {
        input: Box<LogicalPlan>,
        calls: Vec<WindowCall>,
        schema: RowSchema,
    },
}

impl LogicalPlan {
    pub fn schema(&self) -> &RowSchema {
        match self {
            LogicalPlan::Scan { schema, .. }
            | LogicalPlan::Filter { schema, .. }
            | LogicalPlan::Project { schema, .. }
            | LogicalPlan::Aggregate { schema, .. }
            | LogicalPlan::Join { schema, .. }
            | LogicalPlan::Sort { schema, .. }
            | LogicalPlan::Limit { schema, .. }
            | LogicalPlan::Window { schema, .. } => schema,
        }
    }

    fn schema_mut(&mut self) -> &mut RowSchema {
        match self {
            LogicalPlan::Scan { schema, .. }
            | LogicalPlan::Filter { schema, .. }
            | LogicalPlan::Project { schema, .. }
            | LogicalPlan::Aggregate { schema, .. }
            | LogicalPlan::Join { schema, .. }
            | LogicalPlan::Sort { schema, .. }
            | LogicalPlan::Limit { schema, .. }
            | LogicalPlan::Window { schema, .. } => schema,
        }
    }

    /// Same operator with its output schema relabelled; column count must match
    pub fn with_schema(mut self, schema: RowSchema) -> Self {
        debug_assert_eq!(schema.len(), self.schema().len());
        *self.schema_mut() = schema;
        self
    }

    pub fn inputs(&self) -> Vec<&LogicalPlan> {
        match self {
            LogicalPlan::Scan { .. } => vec![],
            LogicalPlan::Join { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Project { input, .. }
            | LogicalPlan::Aggregate { input, .. }
            | LogicalPlan::Sort { input, .. }
            | LogicalPlan::Limit { input, .. }
            | LogicalPlan::Window { input, .. } => vec![input.as_ref()],
        }
    }

    /// Visit every expression in the tree, sub-query plans included
    pub fn for_each_expr(&self, f: &mut dyn FnMut(&Expr)) {
        match self {
            LogicalPlan::Scan { .. } | LogicalPlan::Limit { .. } => {}
            LogicalPlan::Filter { predicate, .. } => predicate.walk(f),
            LogicalPlan::Project { exprs, .. } => exprs.iter().for_each(|e| e.walk(f)),
            LogicalPlan::Aggregate {
                group_keys, aggs, ..
            } => {
                group_keys.iter().for_each(|e| e.walk(f));
                aggs.iter().flat_map(|a| a.args.iter()).for_each(|e| e.walk(f));
            }
            LogicalPlan::Join { condition, .. } => condition.walk(f),
            LogicalPlan::Sort { keys, .. } => keys.iter().for_each(|k| k.expr.walk(f)),
            LogicalPlan::Window { calls, .. } => {
                for call in calls {
                    call.args.iter().for_each(|e| e.walk(f));
                    call.partition_by.iter().for_each(|e| e.walk(f));
                    call.order_by.iter().for_each(|k| k.expr.walk(f));
                }
            }
        }
        for input in self.inputs() {
            input.for_each_expr(f);
        }
    }

    /// Calculate fingerprint (SHA-256 of the canonical JSON) for caching
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
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
                FieldType::new("SAL", DataType::Float64),
            ]),
        }
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let plan1 = LogicalPlan::Filter {
            schema: scan().schema().clone(),
            input: Box::new(scan()),
            predicate: Expr::binary(
                BinOp::Gt,
                Expr::input_ref(1, DataType::Float64),
                Expr::literal(Value::Int(1000)),
            ),
            correlation: None,
        };
        let plan2 = plan1.clone();

        assert_eq!(plan1.fingerprint().unwrap(), plan2.fingerprint().unwrap());
        assert_ne!(plan1.fingerprint().unwrap(), scan().fingerprint().unwrap());
    }

    #[test]
    fn test_json_round_trip() {
        let plan = LogicalPlan::Limit {
            schema: scan().schema().clone(),
            input: Box::new(scan()),
            offset: 1,
            fetch: Some(5),
        };

        let json = serde_json::to_string(&plan).unwrap();
        let parsed: LogicalPlan = serde_json::from_str(&json).unwrap();

        assert_eq!(plan.fingerprint().unwrap(), parsed.fingerprint().unwrap());
    }

    #[test]
    fn test_inline_substitutes_refs() {
        let below = vec![
            Expr::input_ref(3, DataType::Int32),
            Expr::binary(
                BinOp::Add,
                Expr::input_ref(0, DataType::Int32),
                Expr::literal(Value::Int(1)),
            ),
        ];
        let above = Expr::binary(
            BinOp::Gt,
            Expr::input_ref(1, DataType::Int32),
            Expr::input_ref(0, DataType::Int32),
        );

        let inlined = above.inline(&below);
        assert_eq!(inlined.input_refs(), BTreeSet::from([0, 3]));
    }

    #[test]
    fn test_uses_correlation_looks_into_subqueries() {
        let inner = LogicalPlan::Filter {
            schema: scan().schema().clone(),
            input: Box::new(scan()),
            predicate: Expr::binary(
                BinOp::Eq,
                Expr::input_ref(0, DataType::Int32),
                Expr::CorrelField {
                    correlation: CorrelationId(0),
                    index: 0,
                    name: "EMPNO".into(),
                    data_type: DataType::Int32,
                },
            ),
            correlation: None,
        };
        let exists = Expr::Subquery {
            kind: SubqueryKind::Exists,
            plan: Box::new(inner),
            data_type: DataType::Bool,
        };

        assert!(exists.contains_subquery());
        assert!(exists.uses_correlation(CorrelationId(0)));
        assert!(!exists.uses_correlation(CorrelationId(1)));
        assert!(exists.input_refs().is_empty());
    }
}
