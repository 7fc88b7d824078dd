// dataset/mod.rs - Table/row datasets loaded into a database before a test
//
// A dataset is a list of tables, each with a column list and rows of
// cell values. Table names are matched case-insensitively, the same way
// an unquoted SQL identifier is.
//
// On disk a dataset is a flat JSON document:
//
//   {
//     "users":  [ { "id": 1, "name": "alice" }, { "id": 2, "name": null } ],
//     "orders": [ { "id": 10, "user_id": 1 } ]
//   }
//
// Table order is the declaration order. Deletes run in reverse order and
// inserts in order, so parents should be listed before children.

pub mod resolver;

use std::fmt;

use serde_json::{Map, Value};

use crate::error::{FixtureError, Result};

pub use resolver::{DatasetResolver, ResourceLocator};

/// A single cell in a dataset row
#[derive(Clone, Debug, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    fn from_json(resource: &str, value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(CellValue::Null),
            Value::Bool(b) => Ok(CellValue::Bool(b)),
            Value::String(s) => Ok(CellValue::Text(s)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(CellValue::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(CellValue::Float(f))
                } else {
                    Err(FixtureError::DatasetShape {
                        resource: resource.to_string(),
                        reason: format!("number {n} does not fit in i64 or f64"),
                    })
                }
            }
            other => Err(FixtureError::DatasetShape {
                resource: resource.to_string(),
                reason: format!("cells must be scalars, found {other}"),
            }),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, "NULL"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Int(i) => write!(f, "{i}"),
            CellValue::Float(x) => write!(f, "{x}"),
            CellValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// One table of a dataset
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Table {
            name: name.into(),
            ..Table::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Appends a row given as (column, value) pairs.
    ///
    /// Unknown columns are added to the table; earlier rows get NULL for
    /// them, and this row gets NULL for any column it does not mention.
    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = (S, CellValue)>,
        S: Into<String>,
    {
        let mut row = vec![CellValue::Null; self.columns.len()];
        for (column, value) in cells {
            let column = column.into();
            let index = match self
                .columns
                .iter()
                .position(|c| c.eq_ignore_ascii_case(&column))
            {
                Some(index) => index,
                None => {
                    self.columns.push(column);
                    for existing in &mut self.rows {
                        existing.push(CellValue::Null);
                    }
                    row.push(CellValue::Null);
                    self.columns.len() - 1
                }
            };
            row[index] = value;
        }
        self.rows.push(row);
    }
}

/// An immutable set of tables to load before a test
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    tables: Vec<Table>,
}

impl Dataset {
    /// The dataset used when no resource is named or found
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name())
    }

    /// Case-insensitive table lookup
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Adds a table, merging rows into an existing table of the same name
    pub fn add_table(&mut self, table: Table) {
        match self
            .tables
            .iter_mut()
            .find(|t| t.name.eq_ignore_ascii_case(&table.name))
        {
            Some(existing) => {
                for row in table.rows {
                    let cells = table.columns.iter().cloned().zip(row);
                    existing.push_row(cells);
                }
            }
            None => self.tables.push(table),
        }
    }

    /// Parses the flat JSON dataset format. `resource` is only used in errors.
    pub fn from_json_str(resource: &str, text: &str) -> Result<Self> {
        let document: Map<String, Value> =
            serde_json::from_str(text).map_err(|source| FixtureError::DatasetParse {
                resource: resource.to_string(),
                source,
            })?;

        let mut dataset = Dataset::empty();
        for (table_name, rows) in document {
            let rows = match rows {
                Value::Array(rows) => rows,
                other => {
                    return Err(FixtureError::DatasetShape {
                        resource: resource.to_string(),
                        reason: format!("table `{table_name}` must be an array of rows, found {other}"),
                    })
                }
            };

            let mut table = Table::new(table_name.as_str());
            for row in rows {
                let Value::Object(cells) = row else {
                    return Err(FixtureError::DatasetShape {
                        resource: resource.to_string(),
                        reason: format!("rows of `{table_name}` must be objects"),
                    });
                };
                let mut converted = Vec::with_capacity(cells.len());
                for (column, value) in cells {
                    converted.push((column, CellValue::from_json(resource, value)?));
                }
                table.push_row(converted);
            }
            dataset.add_table(table);
        }
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_dataset() {
        let dataset = Dataset::empty();
        assert!(dataset.is_empty());
        assert_eq!(dataset.table_names().count(), 0);
    }

    #[test]
    fn test_parse_keeps_table_order() {
        let json = r#"{
            "users": [ { "id": 1, "name": "alice" } ],
            "orders": [ { "id": 10, "user_id": 1 } ],
            "audit": []
        }"#;
        let dataset = Dataset::from_json_str("order.json", json).unwrap();
        let names: Vec<&str> = dataset.table_names().collect();
        assert_eq!(names, vec!["users", "orders", "audit"]);
        assert_eq!(dataset.table("audit").unwrap().row_count(), 0);
    }

    #[test]
    fn test_table_lookup_is_case_insensitive() {
        let json = r#"{ "Users": [ { "id": 1 } ] }"#;
        let dataset = Dataset::from_json_str("case.json", json).unwrap();
        assert!(dataset.table("USERS").is_some());
        assert!(dataset.table("users").is_some());
    }

    #[test]
    fn test_same_table_in_different_casing_merges() {
        let json = r#"{
            "users": [ { "id": 1 } ],
            "USERS": [ { "id": 2, "name": "bob" } ]
        }"#;
        let dataset = Dataset::from_json_str("merge.json", json).unwrap();
        assert_eq!(dataset.tables().len(), 1);

        let users = dataset.table("users").unwrap();
        assert_eq!(users.columns(), &["id".to_string(), "name".to_string()]);
        assert_eq!(users.rows()[0], vec![CellValue::Int(1), CellValue::Null]);
        assert_eq!(
            users.rows()[1],
            vec![CellValue::Int(2), CellValue::Text("bob".to_string())]
        );
    }

    #[test]
    fn test_missing_cells_are_null() {
        let json = r#"{ "t": [ { "a": 1, "b": true }, { "a": 2.5 } ] }"#;
        let dataset = Dataset::from_json_str("nulls.json", json).unwrap();
        let t = dataset.table("t").unwrap();
        assert_eq!(t.rows()[0], vec![CellValue::Int(1), CellValue::Bool(true)]);
        assert_eq!(t.rows()[1], vec![CellValue::Float(2.5), CellValue::Null]);
    }

    #[test]
    fn test_nested_values_are_rejected() {
        let json = r#"{ "t": [ { "a": [1, 2] } ] }"#;
        let err = Dataset::from_json_str("nested.json", json).unwrap_err();
        assert!(matches!(err, FixtureError::DatasetShape { .. }));
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() {
        let err = Dataset::from_json_str("broken.json", "{ not json").unwrap_err();
        assert!(matches!(err, FixtureError::DatasetParse { .. }));
        assert!(err.to_string().contains("broken.json"));
    }
}
