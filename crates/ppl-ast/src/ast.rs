//! AST types for PPL
//!
//! The unresolved command tree produced by the parser. A parent owns its
//! children exclusively; the planner reads the tree and never mutates it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dotted table name, e.g. `scott.EMP`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    pub parts: Vec<String>,
}

impl QualifiedName {
    pub fn new(parts: Vec<String>) -> Self {
        Self { parts }
    }

    /// Split a dotted name into its parts
    pub fn parse(name: &str) -> Self {
        Self {
            parts: name.split('.').map(str::to_string).collect(),
        }
    }

    /// Last part of the name; used as the default field qualifier
    pub fn simple_name(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or("")
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.parts.join("."))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(v) => write!(f, "{}", v),
            Literal::String(s) => write!(f, "'{}'", s),
        }
    }
}

/// Named command option, e.g. `keepempty=true`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    pub value: Literal,
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
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "=",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Like => "like",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
}

/// Sort key of `sort` and of window `sort_by` clauses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortField {
    pub field: UnresolvedExpr,
    #[serde(default = "default_true")]
    pub asc: bool,
    /// Explicit null placement; `None` pairs asc with nulls-first and desc with nulls-last
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nulls_first: Option<bool>,
}

fn default_true() -> bool {
    true
}

/// Unresolved scalar/aggregate expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnresolvedExpr {
    Literal(Literal),
    /// Field reference; may be dotted (`a.b`) or qualified (`e.DEPTNO`)
    Field(String),
    AllFields,
    /// Wildcard that always drops metadata fields (join/sub-query sides)
    AllFieldsExcludeMeta,
    Alias {
        name: String,
        expr: Box<UnresolvedExpr>,
    },
    Function {
        name: String,
        args: Vec<UnresolvedExpr>,
    },
    Aggregate {
        name: String,
        #[serde(default)]
        args: Vec<UnresolvedExpr>,
        #[serde(default)]
        distinct: bool,
    },
    BinaryOp {
        op: BinOp,
        left: Box<UnresolvedExpr>,
        right: Box<UnresolvedExpr>,
    },
    UnaryOp {
        op: UnOp,
        expr: Box<UnresolvedExpr>,
    },
    /// Value list membership, `a in (1, 2)`
    In {
        expr: Box<UnresolvedExpr>,
        values: Vec<UnresolvedExpr>,
    },
    Case {
        branches: Vec<(UnresolvedExpr, UnresolvedExpr)>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        otherwise: Option<Box<UnresolvedExpr>>,
    },
    /// Bucket expression of `stats ... by span(field, value unit)`
    Span {
        field: Box<UnresolvedExpr>,
        value: Literal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
    },
    /// Assignment of `eval field = expr`
    Let {
        field: String,
        expr: Box<UnresolvedExpr>,
    },
    WindowFunction {
        function: Box<UnresolvedExpr>,
        #[serde(default)]
        partition_by: Vec<UnresolvedExpr>,
        #[serde(default)]
        sort_by: Vec<SortField>,
    },
    ScalarSubquery(Box<UnresolvedPlan>),
    ExistsSubquery(Box<UnresolvedPlan>),
    InSubquery {
        values: Vec<UnresolvedExpr>,
        query: Box<UnresolvedPlan>,
    },
}

impl UnresolvedExpr {
    /// Whether a sub-query appears anywhere below this expression
    ///
    /// Walks with an explicit stack, so arbitrarily deep expressions are safe.
    pub fn contains_subquery(&self) -> bool {
        let mut pending = vec![self];
        while let Some(expr) = pending.pop() {
            match expr {
                UnresolvedExpr::ScalarSubquery(_)
                | UnresolvedExpr::ExistsSubquery(_)
                | UnresolvedExpr::InSubquery { .. } => return true,
                UnresolvedExpr::Literal(_)
                | UnresolvedExpr::Field(_)
                | UnresolvedExpr::AllFields
                | UnresolvedExpr::AllFieldsExcludeMeta => {}
                UnresolvedExpr::Alias { expr, .. }
                | UnresolvedExpr::Let { expr, .. }
                | UnresolvedExpr::UnaryOp { expr, .. } => pending.push(expr),
                UnresolvedExpr::Function { args, .. } | UnresolvedExpr::Aggregate { args, .. } => {
                    pending.extend(args)
                }
                UnresolvedExpr::BinaryOp { left, right, .. } => {
                    pending.push(left);
                    pending.push(right);
                }
                UnresolvedExpr::In { expr, values } => {
                    pending.push(expr);
                    pending.extend(values);
                }
                UnresolvedExpr::Case { branches, otherwise } => {
                    for (when, then) in branches {
                        pending.push(when);
                        pending.push(then);
                    }
                    pending.extend(otherwise.as_deref());
                }
                UnresolvedExpr::Span { field, .. } => pending.push(field),
                UnresolvedExpr::WindowFunction {
                    function,
                    partition_by,
                    sort_by,
                } => {
                    pending.push(function);
                    pending.extend(partition_by);
                    pending.extend(sort_by.iter().map(|s| &s.field));
                }
            }
        }
        false
    }

    /// Name a computed column gets when the query does not alias it
    pub fn display_name(&self) -> String {
        match self {
            UnresolvedExpr::Alias { name, .. } | UnresolvedExpr::Let { field: name, .. } => {
                name.clone()
            }
            other => other.to_string(),
        }
    }
}

fn join_exprs(exprs: &[UnresolvedExpr]) -> String {
    exprs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for UnresolvedExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedExpr::Literal(lit) => write!(f, "{}", lit),
            UnresolvedExpr::Field(name) => write!(f, "{}", name),
            UnresolvedExpr::AllFields | UnresolvedExpr::AllFieldsExcludeMeta => write!(f, "*"),
            UnresolvedExpr::Alias { expr, .. } => write!(f, "{}", expr),
            UnresolvedExpr::Function { name, args } => write!(f, "{}({})", name, join_exprs(args)),
            UnresolvedExpr::Aggregate {
                name,
                args,
                distinct,
            } => {
                if *distinct {
                    write!(f, "{}(DISTINCT {})", name, join_exprs(args))
                } else {
                    write!(f, "{}({})", name, join_exprs(args))
                }
            }
            UnresolvedExpr::BinaryOp { op, left, right } => {
                write!(f, "{} {} {}", left, op.symbol(), right)
            }
            UnresolvedExpr::UnaryOp { op: UnOp::Neg, expr } => write!(f, "-{}", expr),
            UnresolvedExpr::UnaryOp { op: UnOp::Not, expr } => write!(f, "not {}", expr),
            UnresolvedExpr::In { expr, values } => write!(f, "{} in ({})", expr, join_exprs(values)),
            UnresolvedExpr::Case { .. } => write!(f, "case(...)"),
            UnresolvedExpr::Span { field, value, unit } => match unit {
                Some(unit) => write!(f, "span({}, {}{})", field, value, unit),
                None => write!(f, "span({}, {})", field, value),
            },
            UnresolvedExpr::Let { field, expr } => write!(f, "{} = {}", field, expr),
            UnresolvedExpr::WindowFunction { function, .. } => write!(f, "{} over (...)", function),
            UnresolvedExpr::ScalarSubquery(_) => write!(f, "[scalar subquery]"),
            UnresolvedExpr::ExistsSubquery(_) => write!(f, "exists [subquery]"),
            UnresolvedExpr::InSubquery { values, .. } => {
                write!(f, "({}) in [subquery]", join_exprs(values))
            }
        }
    }
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseMethod {
    Regex,
    Grok,
    Patterns,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputStrategy {
    Append,
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RareTopNKind {
    Top,
    Rare,
}

pub type Child = Option<Box<UnresolvedPlan>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub table: QualifiedName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub child: Child,
    pub condition: UnresolvedExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub child: Child,
    pub project_list: Vec<UnresolvedExpr>,
    /// `fields - a, b`: drop the listed fields instead of selecting them
    #[serde(default)]
    pub excluded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameMap {
    pub origin: UnresolvedExpr,
    pub target: UnresolvedExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rename {
    #[serde(default)]
    pub child: Child,
    pub renames: Vec<RenameMap>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    #[serde(default)]
    pub child: Child,
    pub sort_list: Vec<SortField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Head {
    #[serde(default)]
    pub child: Child,
    pub size: usize,
    #[serde(default)]
    pub from: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parse {
    #[serde(default)]
    pub child: Child,
    pub method: ParseMethod,
    pub source_field: UnresolvedExpr,
    pub pattern: String,
    #[serde(default)]
    pub arguments: IndexMap<String, Literal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Eval {
    #[serde(default)]
    pub child: Child,
    /// `Let` assignments, applied left to right
    pub expressions: Vec<UnresolvedExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    #[serde(default)]
    pub child: Child,
    pub agg_exprs: Vec<UnresolvedExpr>,
    #[serde(default)]
    pub group_exprs: Vec<UnresolvedExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<UnresolvedExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    #[serde(default)]
    pub left: Child,
    pub right: Box<UnresolvedPlan>,
    pub join_type: JoinType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<UnresolvedExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubqueryAlias {
    #[serde(default)]
    pub child: Child,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lookup {
    #[serde(default)]
    pub child: Child,
    pub lookup_relation: Box<UnresolvedPlan>,
    /// lookup-table mapping field -> source mapping field
    pub mapping: IndexMap<String, String>,
    /// lookup-table output field -> output alias; empty means every lookup field
    #[serde(default)]
    pub output: IndexMap<String, String>,
    pub strategy: OutputStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dedupe {
    #[serde(default)]
    pub child: Child,
    pub fields: Vec<UnresolvedExpr>,
    /// `number`, `keepempty`, `consecutive`
    #[serde(default)]
    pub options: Vec<Argument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    #[serde(default)]
    pub child: Child,
    pub window_functions: Vec<UnresolvedExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillNullReplacement {
    pub field: String,
    pub replacement: UnresolvedExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillNull {
    #[serde(default)]
    pub child: Child,
    #[serde(default)]
    pub replacements: Vec<FillNullReplacement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement_for_all: Option<UnresolvedExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RareTopN {
    #[serde(default)]
    pub child: Child,
    pub command: RareTopNKind,
    /// `noOfResults`, `countField`, `showCount`
    #[serde(default)]
    pub arguments: Vec<Argument>,
    pub fields: Vec<UnresolvedExpr>,
    #[serde(default)]
    pub group_exprs: Vec<UnresolvedExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppendCol {
    #[serde(default)]
    pub child: Child,
    /// Sub-search without a source; it runs over the main query's relation
    pub sub_search: Box<UnresolvedPlan>,
    #[serde(rename = "override", default)]
    pub override_columns: bool,
}

/// Payload of commands the planner rejects outright
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UnsupportedCommand {
    #[serde(default)]
    pub child: Child,
    #[serde(default)]
    pub arguments: Vec<Argument>,
}

/// Unresolved plan node, one variant per PPL command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum UnresolvedPlan {
    Relation(Relation),
    Filter(Filter),
    Project(Project),
    Rename(Rename),
    Sort(Sort),
    Head(Head),
    Parse(Parse),
    Eval(Eval),
    Aggregation(Aggregation),
    Join(Join),
    SubqueryAlias(SubqueryAlias),
    Lookup(Lookup),
    Dedupe(Dedupe),
    Window(Window),
    FillNull(FillNull),
    RareTopN(RareTopN),
    AppendCol(AppendCol),
    CloseCursor,
    FetchCursor,
    AnomalyDetection(UnsupportedCommand),
    MachineLearning(UnsupportedCommand),
    Paginate(UnsupportedCommand),
    Kmeans(UnsupportedCommand),
    TableFunction(UnsupportedCommand),
    Trendline(UnsupportedCommand),
}

impl UnresolvedPlan {
    /// Command name used in logs and error messages
    pub fn command_name(&self) -> &'static str {
        match self {
            UnresolvedPlan::Relation(_) => "source",
            UnresolvedPlan::Filter(_) => "where",
            UnresolvedPlan::Project(_) => "fields",
            UnresolvedPlan::Rename(_) => "rename",
            UnresolvedPlan::Sort(_) => "sort",
            UnresolvedPlan::Head(_) => "head",
            UnresolvedPlan::Parse(_) => "parse",
            UnresolvedPlan::Eval(_) => "eval",
            UnresolvedPlan::Aggregation(_) => "stats",
            UnresolvedPlan::Join(_) => "join",
            UnresolvedPlan::SubqueryAlias(_) => "as",
            UnresolvedPlan::Lookup(_) => "lookup",
            UnresolvedPlan::Dedupe(_) => "dedup",
            UnresolvedPlan::Window(_) => "window",
            UnresolvedPlan::FillNull(_) => "fillnull",
            UnresolvedPlan::RareTopN(n) => match n.command {
                RareTopNKind::Top => "top",
                RareTopNKind::Rare => "rare",
            },
            UnresolvedPlan::AppendCol(_) => "appendcol",
            UnresolvedPlan::CloseCursor => "close cursor",
            UnresolvedPlan::FetchCursor => "fetch cursor",
            UnresolvedPlan::AnomalyDetection(_) => "ad",
            UnresolvedPlan::MachineLearning(_) => "ml",
            UnresolvedPlan::Paginate(_) => "paginate",
            UnresolvedPlan::Kmeans(_) => "kmeans",
            UnresolvedPlan::TableFunction(_) => "table function",
            UnresolvedPlan::Trendline(_) => "trendline",
        }
    }

    /// Slot holding the primary (left-most) input, if the command has one
    fn input_slot(&self) -> Option<&Child> {
        match self {
            UnresolvedPlan::Relation(_)
            | UnresolvedPlan::CloseCursor
            | UnresolvedPlan::FetchCursor => None,
            UnresolvedPlan::Filter(n) => Some(&n.child),
            UnresolvedPlan::Project(n) => Some(&n.child),
            UnresolvedPlan::Rename(n) => Some(&n.child),
            UnresolvedPlan::Sort(n) => Some(&n.child),
            UnresolvedPlan::Head(n) => Some(&n.child),
            UnresolvedPlan::Parse(n) => Some(&n.child),
            UnresolvedPlan::Eval(n) => Some(&n.child),
            UnresolvedPlan::Aggregation(n) => Some(&n.child),
            UnresolvedPlan::Join(n) => Some(&n.left),
            UnresolvedPlan::SubqueryAlias(n) => Some(&n.child),
            UnresolvedPlan::Lookup(n) => Some(&n.child),
            UnresolvedPlan::Dedupe(n) => Some(&n.child),
            UnresolvedPlan::Window(n) => Some(&n.child),
            UnresolvedPlan::FillNull(n) => Some(&n.child),
            UnresolvedPlan::RareTopN(n) => Some(&n.child),
            UnresolvedPlan::AppendCol(n) => Some(&n.child),
            UnresolvedPlan::AnomalyDetection(n)
            | UnresolvedPlan::MachineLearning(n)
            | UnresolvedPlan::Paginate(n)
            | UnresolvedPlan::Kmeans(n)
            | UnresolvedPlan::TableFunction(n)
            | UnresolvedPlan::Trendline(n) => Some(&n.child),
        }
    }

    fn input_slot_mut(&mut self) -> Option<&mut Child> {
        match self {
            UnresolvedPlan::Relation(_)
            | UnresolvedPlan::CloseCursor
            | UnresolvedPlan::FetchCursor => None,
            UnresolvedPlan::Filter(n) => Some(&mut n.child),
            UnresolvedPlan::Project(n) => Some(&mut n.child),
            UnresolvedPlan::Rename(n) => Some(&mut n.child),
            UnresolvedPlan::Sort(n) => Some(&mut n.child),
            UnresolvedPlan::Head(n) => Some(&mut n.child),
            UnresolvedPlan::Parse(n) => Some(&mut n.child),
            UnresolvedPlan::Eval(n) => Some(&mut n.child),
            UnresolvedPlan::Aggregation(n) => Some(&mut n.child),
            UnresolvedPlan::Join(n) => Some(&mut n.left),
            UnresolvedPlan::SubqueryAlias(n) => Some(&mut n.child),
            UnresolvedPlan::Lookup(n) => Some(&mut n.child),
            UnresolvedPlan::Dedupe(n) => Some(&mut n.child),
            UnresolvedPlan::Window(n) => Some(&mut n.child),
            UnresolvedPlan::FillNull(n) => Some(&mut n.child),
            UnresolvedPlan::RareTopN(n) => Some(&mut n.child),
            UnresolvedPlan::AppendCol(n) => Some(&mut n.child),
            UnresolvedPlan::AnomalyDetection(n)
            | UnresolvedPlan::MachineLearning(n)
            | UnresolvedPlan::Paginate(n)
            | UnresolvedPlan::Kmeans(n)
            | UnresolvedPlan::TableFunction(n)
            | UnresolvedPlan::Trendline(n) => Some(&mut n.child),
        }
    }

    /// Primary input of this node
    pub fn input(&self) -> Option<&UnresolvedPlan> {
        self.input_slot().and_then(|c| c.as_deref())
    }

    /// The relation at the bottom of the primary-input chain
    pub fn base_relation(&self) -> Option<&UnresolvedPlan> {
        let mut node = self;
        loop {
            if let UnresolvedPlan::Relation(_) = node {
                return Some(node);
            }
            node = node.input()?;
        }
    }

    /// Returns a copy of this tree with `leaf` attached below its deepest input-less node
    pub fn attach_leaf(&self, leaf: UnresolvedPlan) -> UnresolvedPlan {
        let mut root = self.clone();
        let mut slot = root.input_slot_mut();
        while let Some(child) = slot {
            if child.is_none() {
                *child = Some(Box::new(leaf));
                break;
            }
            slot = child.as_mut().and_then(|next| next.input_slot_mut());
        }
        root
    }
}
