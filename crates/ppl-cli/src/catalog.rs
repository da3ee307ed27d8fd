//! Catalog built from the configured tables

use ppl_planner::{MemorySchemaProvider, TableSchema};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CatalogBuildError {
    #[error("Table '{0}' is declared more than once")]
    DuplicateTable(String),

    #[error("Table '{table}' declares column '{column}' more than once")]
    DuplicateColumn { table: String, column: String },

    #[error("Table '{0}' has no columns")]
    EmptyTable(String),
}

/// Validate the declared tables and load them into an in-memory provider
pub fn build(tables: &[TableSchema]) -> Result<MemorySchemaProvider, CatalogBuildError> {
    let mut provider = MemorySchemaProvider::new();
    let mut seen = HashSet::new();

    for table in tables {
        if !seen.insert(table.name.as_str()) {
            return Err(CatalogBuildError::DuplicateTable(table.name.clone()));
        }
        if table.columns.is_empty() {
            return Err(CatalogBuildError::EmptyTable(table.name.clone()));
        }

        let mut columns = HashSet::new();
        for column in &table.columns {
            if !columns.insert(column.name.as_str()) {
                return Err(CatalogBuildError::DuplicateColumn {
                    table: table.name.clone(),
                    column: column.name.clone(),
                });
            }
        }

        debug!(table = %table.name, columns = table.columns.len(), "registered table");
        provider.add_table(table.clone());
    }

    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppl_ir::DataType;
    use ppl_planner::{ColumnInfo, SchemaProvider};

    fn table(name: &str, columns: &[&str]) -> TableSchema {
        TableSchema {
            name: name.into(),
            columns: columns
                .iter()
                .map(|c| ColumnInfo::new(*c, DataType::Int32))
                .collect(),
        }
    }

    #[test]
    fn test_build_registers_tables() {
        let provider = build(&[table("scott.EMP", &["EMPNO"]), table("scott.DEPT", &["DEPTNO"])]).unwrap();
        assert!(provider.get_table_schema(&["DEPT".into()]).is_ok());
    }

    #[test]
    fn test_build_rejects_duplicates() {
        assert!(matches!(
            build(&[table("T", &["a"]), table("T", &["b"])]),
            Err(CatalogBuildError::DuplicateTable(_))
        ));
        assert!(matches!(
            build(&[table("T", &["a", "a"])]),
            Err(CatalogBuildError::DuplicateColumn { .. })
        ));
        assert!(matches!(build(&[table("T", &[])]), Err(CatalogBuildError::EmptyTable(_))));
    }
}
