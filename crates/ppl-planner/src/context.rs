//! Mutable state of a single compilation

use ppl_ir::{CorrelationId, LogicalPlan, RowSchema};
use tracing::debug;

use crate::error::{PlanError, Result};

/// An open correlation variable: the in-scope row of an enclosing operator
#[derive(Debug, Clone)]
pub struct Correlation {
    pub id: CorrelationId,
    pub schema: RowSchema,
}

/// Build stack, correlation scopes and flags of one compilation
///
/// The top of the stack is the result of the most recently visited node.
/// A context is created per compilation and never shared.
#[derive(Debug)]
pub struct PlanContext {
    stack: Vec<LogicalPlan>,
    correlations: Vec<Correlation>,
    next_correlation: usize,
    project_visited: bool,
    subquery_depth: usize,
    depth: usize,
    max_depth: usize,
}

impl PlanContext {
    pub fn new(max_depth: usize) -> Self {
        Self {
            stack: Vec::new(),
            correlations: Vec::new(),
            next_correlation: 0,
            project_visited: false,
            subquery_depth: 0,
            depth: 0,
            max_depth,
        }
    }

    pub fn push(&mut self, plan: LogicalPlan) {
        self.stack.push(plan);
    }

    pub fn pop(&mut self) -> Result<LogicalPlan> {
        self.stack
            .pop()
            .ok_or_else(|| PlanError::semantic("no input plan to operate on"))
    }

    pub fn peek(&self) -> Result<&LogicalPlan> {
        self.peek_at(0)
    }

    /// Plan `depth` entries below the top; 0 is the top
    pub fn peek_at(&self, depth: usize) -> Result<&LogicalPlan> {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .and_then(|i| self.stack.get(i))
            .ok_or_else(|| PlanError::semantic("no input plan to operate on"))
    }

    pub fn schema(&self) -> Result<&RowSchema> {
        Ok(self.peek()?.schema())
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Open a correlation variable over `schema`; it stays visible until closed
    pub fn open_correlation(&mut self, schema: RowSchema) -> CorrelationId {
        let id = CorrelationId(self.next_correlation);
        self.next_correlation += 1;
        debug!(correlation = %id, fields = schema.len(), "open correlation variable");
        self.correlations.push(Correlation { id, schema });
        id
    }

    pub fn close_correlation(&mut self) {
        if let Some(closed) = self.correlations.pop() {
            debug!(correlation = %closed.id, "close correlation variable");
        }
    }

    /// Open correlation variables, innermost first
    pub fn correlations(&self) -> impl Iterator<Item = &Correlation> {
        self.correlations.iter().rev()
    }

    pub fn is_project_visited(&self) -> bool {
        self.project_visited
    }

    pub fn set_project_visited(&mut self) {
        self.project_visited = true;
    }

    pub fn is_resolving_subquery(&self) -> bool {
        self.subquery_depth > 0
    }

    pub fn enter_subquery(&mut self) {
        self.subquery_depth += 1;
    }

    pub fn exit_subquery(&mut self) {
        self.subquery_depth = self.subquery_depth.saturating_sub(1);
    }

    /// Count one level of AST nesting; fails past the configured bound
    pub fn enter_node(&mut self) -> Result<()> {
        if self.depth >= self.max_depth {
            return Err(PlanError::DepthExceeded {
                limit: self.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    pub fn exit_node(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppl_ir::{DataType, FieldType};

    fn scan(name: &str) -> LogicalPlan {
        LogicalPlan::Scan {
            table: vec![name.to_string()],
            schema: RowSchema::new(vec![FieldType::new("a", DataType::Int32)]),
        }
    }

    #[test]
    fn test_stack_peek_at() {
        let mut ctx = PlanContext::new(8);
        ctx.push(scan("t1"));
        ctx.push(scan("t2"));

        assert!(matches!(ctx.peek_at(1).unwrap(), LogicalPlan::Scan { table, .. } if table[0] == "t1"));
        assert!(ctx.peek_at(2).is_err());
        ctx.pop().unwrap();
        ctx.pop().unwrap();
        assert!(ctx.pop().is_err());
    }

    #[test]
    fn test_correlations_innermost_first() {
        let mut ctx = PlanContext::new(8);
        let outer = ctx.open_correlation(RowSchema::default());
        let inner = ctx.open_correlation(RowSchema::default());

        let ids: Vec<_> = ctx.correlations().map(|c| c.id).collect();
        assert_eq!(ids, vec![inner, outer]);

        ctx.close_correlation();
        ctx.close_correlation();
        assert_eq!(ctx.correlations().count(), 0);
        assert_eq!(ctx.open_correlation(RowSchema::default()), CorrelationId(2));
    }

    #[test]
    fn test_depth_bound() {
        let mut ctx = PlanContext::new(2);
        ctx.enter_node().unwrap();
        ctx.enter_node().unwrap();
        assert!(matches!(
            ctx.enter_node(),
            Err(PlanError::DepthExceeded { limit: 2 })
        ));
    }
}
