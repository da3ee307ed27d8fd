//! Type system and row schemas for the logical plan

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    // Primitives
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal { precision: u8, scale: u8 },

    // Text
    String,
    Varchar(Option<u32>),

    // Binary
    Binary,

    // Temporal
    Date,
    Time,
    Timestamp,
    Interval,

    // Complex
    Array(Box<DataType>),
    Struct(Vec<FieldType>),
    Map { key: Box<DataType>, value: Box<DataType> },

    // Special
    Null,
    Unknown,
}

impl DataType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::Float32
                | DataType::Float64
                | DataType::Decimal { .. }
        )
    }

    pub fn is_string(&self) -> bool {
        matches!(self, DataType::String | DataType::Varchar(_))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Bool => write!(f, "BOOLEAN"),
            DataType::Int8 => write!(f, "TINYINT"),
            DataType::Int16 => write!(f, "SMALLINT"),
            DataType::Int32 => write!(f, "INTEGER"),
            DataType::Int64 => write!(f, "BIGINT"),
            DataType::Float32 => write!(f, "REAL"),
            DataType::Float64 => write!(f, "DOUBLE"),
            DataType::Decimal { precision, scale } => write!(f, "DECIMAL({}, {})", precision, scale),
            DataType::String => write!(f, "VARCHAR"),
            DataType::Varchar(Some(n)) => write!(f, "VARCHAR({})", n),
            DataType::Varchar(None) => write!(f, "VARCHAR"),
            DataType::Binary => write!(f, "BINARY"),
            DataType::Date => write!(f, "DATE"),
            DataType::Time => write!(f, "TIME"),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
            DataType::Interval => write!(f, "INTERVAL"),
            DataType::Array(inner) => write!(f, "{} ARRAY", inner),
            DataType::Struct(_) => write!(f, "STRUCT"),
            DataType::Map { key, value } => write!(f, "MAP<{}, {}>", key, value),
            DataType::Null => write!(f, "NULL"),
            DataType::Unknown => write!(f, "ANY"),
        }
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldType {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    /// Table name or alias the column is reachable through, e.g. `e` in `e.DEPTNO`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
}

impl FieldType {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            qualifier: None,
        }
    }

    pub fn with_qualifier(mut self, qualifier: Option<String>) -> Self {
        self.qualifier = qualifier;
        self
    }

    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

/// Ordered (name, type) list describing an operator's output
///
/// Names are unique once a command finishes; joins may leave duplicates
/// behind for the reconciliation step to resolve.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSchema {
    pub fields: Vec<FieldType>,
}

impl RowSchema {
    pub fn new(fields: Vec<FieldType>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, index: usize) -> Option<&FieldType> {
        self.fields.get(index)
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// First column with exactly this name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// First column named `name` whose qualifier is `qualifier`
    pub fn index_of_qualified(&self, qualifier: &str, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name && f.qualifier.as_deref() == Some(qualifier))
    }

    /// Same columns, all reachable through `alias`
    pub fn requalify(&self, alias: &str) -> RowSchema {
        RowSchema {
            fields: self
                .fields
                .iter()
                .map(|f| f.clone().with_qualifier(Some(alias.to_string())))
                .collect(),
        }
    }

    /// Columns of `self` followed by columns of `other`
    pub fn concat(&self, other: &RowSchema) -> RowSchema {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.iter().cloned());
        RowSchema { fields }
    }

    /// Every column nullable, as seen through the outer side of a join
    pub fn as_nullable(&self) -> RowSchema {
        RowSchema {
            fields: self
                .fields
                .iter()
                .map(|f| FieldType {
                    nullable: true,
                    ..f.clone()
                })
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldType> {
        self.fields.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emp() -> RowSchema {
        RowSchema::new(vec![
            FieldType::new("EMPNO", DataType::Int32).with_qualifier(Some("EMP".into())),
            FieldType::new("DEPTNO", DataType::Int32).with_qualifier(Some("EMP".into())),
            FieldType::new("DEPTNO", DataType::Int32).with_qualifier(Some("DEPT".into())),
        ])
    }

    #[test]
    fn test_index_of_prefers_first_match() {
        assert_eq!(emp().index_of("DEPTNO"), Some(1));
        assert_eq!(emp().index_of_qualified("DEPT", "DEPTNO"), Some(2));
        assert_eq!(emp().index_of("MISSING"), None);
    }

    #[test]
    fn test_requalify_keeps_order() {
        let aliased = emp().requalify("e");
        assert_eq!(aliased.names(), emp().names());
        assert!(aliased.iter().all(|f| f.qualifier.as_deref() == Some("e")));
    }
}
