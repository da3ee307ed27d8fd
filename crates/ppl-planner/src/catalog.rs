//! Schema provider trait and types for table metadata lookup

use ppl_ir::DataType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Table '{0}' not found")]
    TableNotFound(String),
}

/// Column metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: DataType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }
}

/// Table schema information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Dotted table name, e.g. `scott.EMP`
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

/// Resolves table schemas while plans are compiled
///
/// One provider may serve many compilations at once, hence `Send + Sync`.
pub trait SchemaProvider: Send + Sync {
    /// Get schema for a table by its name parts
    fn get_table_schema(&self, name: &[String]) -> Result<TableSchema, CatalogError>;
}

/// In-memory provider, used by tests and by the CLI catalog
#[derive(Debug, Default)]
pub struct MemorySchemaProvider {
    tables: HashMap<String, TableSchema>,
}

impl MemorySchemaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, schema: TableSchema) {
        self.tables.insert(schema.name.clone(), schema);
    }

    pub fn with_table(mut self, schema: TableSchema) -> Self {
        self.add_table(schema);
        self
    }
}

impl SchemaProvider for MemorySchemaProvider {
    /// Full dotted name first, then a unique match on the last name part
    fn get_table_schema(&self, name: &[String]) -> Result<TableSchema, CatalogError> {
        let full = name.join(".");
        if let Some(schema) = self.tables.get(&full) {
            return Ok(schema.clone());
        }

        let simple = name.last().map(String::as_str).unwrap_or_default();
        let mut candidates = self
            .tables
            .values()
            .filter(|t| t.name.rsplit('.').next() == Some(simple));
        match (candidates.next(), candidates.next()) {
            (Some(schema), None) => Ok(schema.clone()),
            _ => Err(CatalogError::TableNotFound(full)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emp() -> TableSchema {
        TableSchema {
            name: "scott.EMP".into(),
            columns: vec![ColumnInfo::new("EMPNO", DataType::Int32)],
        }
    }

    #[test]
    fn test_lookup_by_full_and_simple_name() {
        let provider = MemorySchemaProvider::new().with_table(emp());

        assert!(provider.get_table_schema(&["scott".into(), "EMP".into()]).is_ok());
        assert!(provider.get_table_schema(&["EMP".into()]).is_ok());
        assert!(matches!(
            provider.get_table_schema(&["DEPT".into()]),
            Err(CatalogError::TableNotFound(name)) if name == "DEPT"
        ));
    }
}
