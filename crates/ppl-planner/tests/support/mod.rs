//! Shared fixtures: the scott catalog and a small reference evaluator
//!
//! The evaluator runs logical plans over in-memory rows so scenario tests can
//! check what a plan computes, not only how it prints.

#![allow(dead_code)]

use ppl_ir::{
    BinOp, CorrelationId, DataType, Expr, JoinType, LogicalPlan, NullOrder, SortDirection,
    SortKey, SubqueryKind, UnOp, Value,
};
use ppl_planner::{ColumnInfo, MemorySchemaProvider, TableSchema};
use std::cmp::Ordering;
use std::collections::HashMap;

pub type Row = Vec<Value>;

fn table(name: &str, columns: &[(&str, DataType)]) -> TableSchema {
    TableSchema {
        name: name.to_string(),
        columns: columns
            .iter()
            .map(|(n, t)| ColumnInfo::new(*n, t.clone()))
            .collect(),
    }
}

/// `scott.EMP`, `scott.DEPT` and `scott.SALGRADE`
pub fn scott() -> MemorySchemaProvider {
    use DataType::*;
    MemorySchemaProvider::new()
        .with_table(table(
            "scott.EMP",
            &[
                ("EMPNO", Int16),
                ("ENAME", Varchar(Some(10))),
                ("JOB", Varchar(Some(9))),
                ("MGR", Int16),
                ("HIREDATE", Date),
                ("SAL", Decimal { precision: 7, scale: 2 }),
                ("COMM", Decimal { precision: 7, scale: 2 }),
                ("DEPTNO", Int8),
            ],
        ))
        .with_table(table(
            "scott.DEPT",
            &[
                ("DEPTNO", Int8),
                ("DNAME", Varchar(Some(14))),
                ("LOC", Varchar(Some(13))),
            ],
        ))
        .with_table(table(
            "scott.SALGRADE",
            &[
                ("GRADE", Int32),
                ("LOSAL", Decimal { precision: 7, scale: 2 }),
                ("HISAL", Decimal { precision: 7, scale: 2 }),
            ],
        ))
}

/// In-memory table contents, keyed by the last part of the table name
#[derive(Default)]
pub struct Tables {
    rows: HashMap<String, Vec<Row>>,
}

impl Tables {
    pub fn with(mut self, name: &str, rows: Vec<Row>) -> Self {
        self.rows.insert(name.to_string(), rows);
        self
    }

    pub fn execute(&self, plan: &LogicalPlan) -> Vec<Row> {
        self.run(plan, &[])
    }

    fn run(&self, plan: &LogicalPlan, env: &[(CorrelationId, Row)]) -> Vec<Row> {
        match plan {
            LogicalPlan::Scan { table, .. } => {
                let name = table.last().expect("table name");
                self.rows.get(name).cloned().unwrap_or_default()
            }
            LogicalPlan::Filter {
                input,
                predicate,
                correlation,
                ..
            } => self
                .run(input, env)
                .into_iter()
                .filter(|row| {
                    let env = bind(env, *correlation, row);
                    truthy(&self.eval(predicate, row, &env))
                })
                .collect(),
            LogicalPlan::Project {
                input,
                exprs,
                correlation,
                ..
            } => self
                .run(input, env)
                .into_iter()
                .map(|row| {
                    let env = bind(env, *correlation, &row);
                    exprs.iter().map(|e| self.eval(e, &row, &env)).collect()
                })
                .collect(),
            LogicalPlan::Aggregate {
                input,
                group_keys,
                aggs,
                ..
            } => {
                let rows = self.run(input, env);
                let mut groups: Vec<(Row, Vec<Row>)> = Vec::new();
                for row in rows {
                    let key: Row = group_keys.iter().map(|k| self.eval(k, &row, env)).collect();
                    match groups.iter_mut().find(|(k, _)| *k == key) {
                        Some((_, members)) => members.push(row),
                        None => groups.push((key, vec![row])),
                    }
                }
                if groups.is_empty() && group_keys.is_empty() {
                    groups.push((Vec::new(), Vec::new()));
                }
                groups
                    .into_iter()
                    .map(|(mut key, members)| {
                        for agg in aggs {
                            let values: Vec<Value> = match agg.args.first() {
                                Some(arg) => members.iter().map(|r| self.eval(arg, r, env)).collect(),
                                None => vec![Value::Int(1); members.len()],
                            };
                            key.push(aggregate(&agg.func, values));
                        }
                        key
                    })
                    .collect()
            }
            LogicalPlan::Join {
                left,
                right,
                join_type,
                condition,
                ..
            } => self.join(left, right, *join_type, condition, env),
            LogicalPlan::Sort { input, keys, .. } => {
                let mut rows = self.run(input, env);
                rows.sort_by(|a, b| self.compare_keys(keys, a, b, env));
                rows
            }
            LogicalPlan::Limit {
                input,
                offset,
                fetch,
                ..
            } => self
                .run(input, env)
                .into_iter()
                .skip(*offset)
                .take(fetch.unwrap_or(usize::MAX))
                .collect(),
            LogicalPlan::Window { input, calls, .. } => {
                let mut rows = self.run(input, env);
                for call in calls {
                    assert_eq!(call.func, "row_number", "evaluator only numbers rows");
                    let mut order: Vec<usize> = (0..rows.len()).collect();
                    order.sort_by(|&a, &b| self.compare_keys(&call.order_by, &rows[a], &rows[b], env));
                    let mut counters: Vec<(Row, i64)> = Vec::new();
                    let mut numbers = vec![0i64; rows.len()];
                    for i in order {
                        let partition: Row = call
                            .partition_by
                            .iter()
                            .map(|p| self.eval(p, &rows[i], env))
                            .collect();
                        let n = match counters.iter_mut().find(|(k, _)| *k == partition) {
                            Some((_, n)) => {
                                *n += 1;
                                *n
                            }
                            None => {
                                counters.push((partition, 1));
                                1
                            }
                        };
                        numbers[i] = n;
                    }
                    for (row, n) in rows.iter_mut().zip(numbers) {
                        row.push(Value::Int(n));
                    }
                }
                rows
            }
        }
    }

    fn join(
        &self,
        left: &LogicalPlan,
        right: &LogicalPlan,
        join_type: JoinType,
        condition: &Expr,
        env: &[(CorrelationId, Row)],
    ) -> Vec<Row> {
        let left_rows = self.run(left, env);
        let right_rows = self.run(right, env);
        let left_nulls = vec![Value::Null; left.schema().len()];
        let right_nulls = vec![Value::Null; right.schema().len()];

        let mut out = Vec::new();
        let mut right_matched = vec![false; right_rows.len()];
        for l in &left_rows {
            let mut matched = false;
            for (j, r) in right_rows.iter().enumerate() {
                let joined: Row = l.iter().chain(r.iter()).cloned().collect();
                if truthy(&self.eval(condition, &joined, env)) {
                    matched = true;
                    right_matched[j] = true;
                    if !matches!(join_type, JoinType::Semi | JoinType::Anti) {
                        out.push(joined);
                    }
                }
            }
            match join_type {
                JoinType::Semi if matched => out.push(l.clone()),
                JoinType::Anti if !matched => out.push(l.clone()),
                JoinType::Left | JoinType::Full if !matched => {
                    out.push(l.iter().chain(right_nulls.iter()).cloned().collect())
                }
                _ => {}
            }
        }
        if matches!(join_type, JoinType::Right | JoinType::Full) {
            for (r, matched) in right_rows.iter().zip(right_matched) {
                if !matched {
                    out.push(left_nulls.iter().chain(r.iter()).cloned().collect());
                }
            }
        }
        out
    }

    fn compare_keys(
        &self,
        keys: &[SortKey],
        a: &Row,
        b: &Row,
        env: &[(CorrelationId, Row)],
    ) -> Ordering {
        for key in keys {
            let x = self.eval(&key.expr, a, env);
            let y = self.eval(&key.expr, b, env);
            let ord = match (x.is_null(), y.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) if key.nulls == NullOrder::First => Ordering::Less,
                (true, false) => Ordering::Greater,
                (false, true) if key.nulls == NullOrder::First => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => {
                    let ord = compare(&x, &y).unwrap_or(Ordering::Equal);
                    match key.direction {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    }
                }
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    fn eval(&self, expr: &Expr, row: &Row, env: &[(CorrelationId, Row)]) -> Value {
        match expr {
            Expr::InputRef { index, .. } => row[*index].clone(),
            Expr::CorrelField {
                correlation, index, ..
            } => env
                .iter()
                .rev()
                .find(|(id, _)| id == correlation)
                .map(|(_, r)| r[*index].clone())
                .expect("unbound correlation variable"),
            Expr::Literal { value, .. } => value.clone(),
            Expr::BinaryOp {
                op, left, right, ..
            } => {
                let l = self.eval(left, row, env);
                let r = self.eval(right, row, env);
                binary(*op, l, r)
            }
            Expr::UnaryOp { op, expr, .. } => {
                let v = self.eval(expr, row, env);
                match op {
                    UnOp::IsNull => Value::Bool(v.is_null()),
                    UnOp::IsNotNull => Value::Bool(!v.is_null()),
                    UnOp::Not => match v {
                        Value::Bool(b) => Value::Bool(!b),
                        _ => Value::Null,
                    },
                    UnOp::Neg => match v {
                        Value::Int(i) => Value::Int(-i),
                        Value::Float(f) => Value::Float(-f),
                        _ => Value::Null,
                    },
                }
            }
            Expr::FuncCall { func, args, .. } => {
                let args: Vec<Value> = args.iter().map(|a| self.eval(a, row, env)).collect();
                match func.as_str() {
                    "coalesce" => args.into_iter().find(|v| !v.is_null()).unwrap_or(Value::Null),
                    "upper" => match &args[0] {
                        Value::String(s) => Value::String(s.to_uppercase()),
                        _ => Value::Null,
                    },
                    "lower" => match &args[0] {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        _ => Value::Null,
                    },
                    other => panic!("evaluator does not implement {}", other),
                }
            }
            Expr::Case {
                branches,
                otherwise,
                ..
            } => branches
                .iter()
                .find(|(when, _)| truthy(&self.eval(when, row, env)))
                .map(|(_, then)| self.eval(then, row, env))
                .or_else(|| otherwise.as_ref().map(|e| self.eval(e, row, env)))
                .unwrap_or(Value::Null),
            Expr::Subquery { kind, plan, .. } => {
                let rows = self.run(plan, env);
                match kind {
                    SubqueryKind::Scalar => rows
                        .first()
                        .and_then(|r| r.first().cloned())
                        .unwrap_or(Value::Null),
                    SubqueryKind::Exists => Value::Bool(!rows.is_empty()),
                    SubqueryKind::In { needles } => {
                        let needles: Row = needles.iter().map(|n| self.eval(n, row, env)).collect();
                        Value::Bool(rows.iter().any(|r| *r == needles))
                    }
                }
            }
        }
    }
}

fn bind(
    env: &[(CorrelationId, Row)],
    correlation: Option<CorrelationId>,
    row: &Row,
) -> Vec<(CorrelationId, Row)> {
    let mut env = env.to_vec();
    if let Some(id) = correlation {
        env.push((id, row.clone()));
    }
    env
}

fn truthy(value: &Value) -> bool {
    matches!(value, Value::Bool(true))
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => as_f64(a)?.partial_cmp(&as_f64(b)?),
    }
}

fn binary(op: BinOp, l: Value, r: Value) -> Value {
    match op {
        BinOp::And => match (&l, &r) {
            (Value::Bool(false), _) | (_, Value::Bool(false)) => Value::Bool(false),
            (Value::Bool(true), Value::Bool(true)) => Value::Bool(true),
            _ => Value::Null,
        },
        BinOp::Or => match (&l, &r) {
            (Value::Bool(true), _) | (_, Value::Bool(true)) => Value::Bool(true),
            (Value::Bool(false), Value::Bool(false)) => Value::Bool(false),
            _ => Value::Null,
        },
        _ if l.is_null() || r.is_null() => Value::Null,
        BinOp::Eq => Value::Bool(compare(&l, &r) == Some(Ordering::Equal)),
        BinOp::Ne => Value::Bool(compare(&l, &r) != Some(Ordering::Equal)),
        BinOp::Lt => Value::Bool(compare(&l, &r) == Some(Ordering::Less)),
        BinOp::Le => Value::Bool(compare(&l, &r) != Some(Ordering::Greater)),
        BinOp::Gt => Value::Bool(compare(&l, &r) == Some(Ordering::Greater)),
        BinOp::Ge => Value::Bool(compare(&l, &r) != Some(Ordering::Less)),
        BinOp::Add | BinOp::Sub | BinOp::Mul => match (&l, &r) {
            (Value::Int(x), Value::Int(y)) => Value::Int(match op {
                BinOp::Add => x + y,
                BinOp::Sub => x - y,
                _ => x * y,
            }),
            _ => {
                let (x, y) = (as_f64(&l).unwrap_or(0.0), as_f64(&r).unwrap_or(0.0));
                Value::Float(match op {
                    BinOp::Add => x + y,
                    BinOp::Sub => x - y,
                    _ => x * y,
                })
            }
        },
        other => panic!("evaluator does not implement {:?}", other),
    }
}

fn aggregate(func: &str, values: Vec<Value>) -> Value {
    let present: Vec<Value> = values.into_iter().filter(|v| !v.is_null()).collect();
    match func {
        "count" => Value::Int(present.len() as i64),
        "sum" => present
            .iter()
            .cloned()
            .reduce(|a, b| binary(BinOp::Add, a, b))
            .unwrap_or(Value::Null),
        "min" => present
            .into_iter()
            .reduce(|a, b| if compare(&b, &a) == Some(Ordering::Less) { b } else { a })
            .unwrap_or(Value::Null),
        "max" => present
            .into_iter()
            .reduce(|a, b| if compare(&b, &a) == Some(Ordering::Greater) { b } else { a })
            .unwrap_or(Value::Null),
        other => panic!("evaluator does not implement {}", other),
    }
}

pub fn int(v: i64) -> Value {
    Value::Int(v)
}

pub fn string(v: &str) -> Value {
    Value::String(v.to_string())
}

pub fn null() -> Value {
    Value::Null
}
