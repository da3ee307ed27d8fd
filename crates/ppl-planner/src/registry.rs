//! Function registry: signatures for scalar, aggregate and window functions

use ppl_ir::DataType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("{func} is not a {expected:?} function")]
    WrongKind { func: String, expected: FunctionKind },

    #[error("Type mismatch for function {func}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        func: String,
        expected: Vec<DataType>,
        actual: Vec<DataType>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionKind {
    Scalar,
    Aggregate,
    Window,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    /// Fixed argument types; `Unknown` accepts anything
    pub args: Vec<DataType>,
    /// The last argument type may repeat any number of times
    pub variadic: bool,
    /// `Unknown` means "same type as the first argument"
    pub return_type: DataType,
    pub kind: FunctionKind,
}

impl FunctionSignature {
    fn accepts(&self, arg_types: &[DataType]) -> bool {
        let arity_ok = if self.variadic {
            arg_types.len() + 1 >= self.args.len()
        } else {
            arg_types.len() == self.args.len()
        };
        arity_ok
            && arg_types.iter().enumerate().all(|(i, actual)| {
                let expected = self
                    .args
                    .get(i)
                    .or_else(|| self.args.last())
                    .unwrap_or(&DataType::Unknown);
                compatible(expected, actual)
            })
    }

    /// Result type for a call with these argument types
    pub fn resolve_return_type(&self, arg_types: &[DataType]) -> DataType {
        match (&self.return_type, arg_types.first()) {
            (DataType::Unknown, Some(first)) => first.clone(),
            (ret, _) => ret.clone(),
        }
    }
}

fn compatible(expected: &DataType, actual: &DataType) -> bool {
    expected == actual
        || matches!(expected, DataType::Unknown)
        || matches!(actual, DataType::Unknown | DataType::Null)
        || (expected.is_numeric() && actual.is_numeric())
        || (expected.is_string() && actual.is_string())
}

pub struct FunctionRegistry {
    functions: HashMap<String, Vec<FunctionSignature>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
        };
        registry.register_builtins();
        registry
    }

    fn add(&mut self, name: &str, args: Vec<DataType>, return_type: DataType, kind: FunctionKind) {
        self.register(FunctionSignature {
            name: name.to_string(),
            args,
            variadic: false,
            return_type,
            kind,
        });
    }

    fn add_variadic(&mut self, name: &str, args: Vec<DataType>, return_type: DataType, kind: FunctionKind) {
        self.register(FunctionSignature {
            name: name.to_string(),
            args,
            variadic: true,
            return_type,
            kind,
        });
    }

    fn register_builtins(&mut self) {
        use DataType::*;
        use FunctionKind::*;

        // Math
        for name in ["abs", "ceil", "floor", "round", "sign"] {
            self.add(name, vec![Unknown], Unknown, Scalar);
        }
        for name in ["sqrt", "exp", "ln", "log10"] {
            self.add(name, vec![Float64], Float64, Scalar);
        }
        self.add("pow", vec![Float64, Float64], Float64, Scalar);
        self.add("mod", vec![Unknown, Unknown], Unknown, Scalar);

        // Strings
        for name in ["upper", "lower", "trim", "ltrim", "rtrim", "reverse"] {
            self.add(name, vec![String], String, Scalar);
        }
        self.add("length", vec![String], Int32, Scalar);
        self.add_variadic("concat", vec![String], String, Scalar);
        self.add("substring", vec![String, Int32], String, Scalar);
        self.add("substring", vec![String, Int32, Int32], String, Scalar);
        self.add("locate", vec![String, String], Int32, Scalar);

        // Null handling
        self.add_variadic("coalesce", vec![Unknown], Unknown, Scalar);
        self.add("ifnull", vec![Unknown, Unknown], Unknown, Scalar);
        self.add("nullif", vec![Unknown, Unknown], Unknown, Scalar);
        self.add("isnull", vec![Unknown], Bool, Scalar);
        self.add("isnotnull", vec![Unknown], Bool, Scalar);
        self.add("if", vec![Bool, Unknown, Unknown], Unknown, Scalar);

        // Parse command extraction
        self.add("regexp_extract", vec![String, String, String], String, Scalar);
        self.add("regexp_replace", vec![String, String, String], String, Scalar);
        self.add(
            "grok",
            vec![String, String],
            Map {
                key: Box::new(String),
                value: Box::new(String),
            },
            Scalar,
        );
        self.add("item", vec![Unknown, String], String, Scalar);

        // Time buckets of `stats ... by span(...)`
        self.add("span", vec![Unknown, Unknown, Unknown], Unknown, Scalar);

        // Aggregates
        self.add("count", vec![], Int64, Aggregate);
        self.add("count", vec![Unknown], Int64, Aggregate);
        self.add("dc", vec![Unknown], Int64, Aggregate);
        self.add("distinct_count", vec![Unknown], Int64, Aggregate);
        self.add("sum", vec![Unknown], Unknown, Aggregate);
        self.add("min", vec![Unknown], Unknown, Aggregate);
        self.add("max", vec![Unknown], Unknown, Aggregate);
        for name in ["avg", "var_samp", "var_pop", "stddev_samp", "stddev_pop"] {
            self.add(name, vec![Unknown], Float64, Aggregate);
        }
        self.add("take", vec![Unknown, Int32], Unknown, Aggregate);

        // Ranking
        for name in ["row_number", "rank", "dense_rank"] {
            self.add(name, vec![], Int64, Window);
        }
    }

    pub fn register(&mut self, sig: FunctionSignature) {
        self.functions
            .entry(sig.name.clone())
            .or_default()
            .push(sig);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(&name.to_lowercase())
    }

    /// Find the overload of `name` with the given kind accepting `arg_types`
    ///
    /// Names are case-insensitive. Aggregates are also accepted where a
    /// window function is expected, since they can be evaluated over a frame.
    pub fn lookup(
        &self,
        name: &str,
        kind: FunctionKind,
        arg_types: &[DataType],
    ) -> Result<&FunctionSignature, RegistryError> {
        let key = name.to_lowercase();
        let overloads = self
            .functions
            .get(&key)
            .ok_or_else(|| RegistryError::FunctionNotFound(name.to_string()))?;

        let of_kind: Vec<&FunctionSignature> = overloads
            .iter()
            .filter(|sig| {
                sig.kind == kind
                    || (kind == FunctionKind::Window && sig.kind == FunctionKind::Aggregate)
            })
            .collect();
        if of_kind.is_empty() {
            return Err(RegistryError::WrongKind {
                func: name.to_string(),
                expected: kind,
            });
        }

        of_kind
            .iter()
            .find(|sig| sig.accepts(arg_types))
            .copied()
            .ok_or_else(|| RegistryError::TypeMismatch {
                func: name.to_string(),
                expected: of_kind[0].args.clone(),
                actual: arg_types.to_vec(),
            })
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
