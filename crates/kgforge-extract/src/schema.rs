//! Schema descriptions handed to the database extractors.
//!
//! Read either from the nested JSON structure
//! `{database_name, tables: [{name, columns: [{name, type, nullable, primary_key, foreign_key?}]}]}`
//! or derived from SQL DDL.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use sqlparser::ast::{ColumnOption, Expr, Ident, ObjectName, Statement, TableConstraint};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::{ExtractError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescription {
    #[serde(default)]
    pub database_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tables: Vec<TableSchema>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default, rename = "type")]
    pub table_type: Option<String>,
    #[serde(default)]
    pub row_count: Option<u64>,
    #[serde(default)]
    pub size_mb: Option<f64>,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub data_type: Option<String>,
    #[serde(default)]
    pub max_length: Option<u64>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub primary_key: bool,
    /// Absent, `false`, `{}` and `null` all mean "no foreign key".
    #[serde(default, deserialize_with = "deserialize_foreign_key")]
    pub foreign_key: Option<ForeignKeyRef>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub position: Option<u64>,
}

fn default_nullable() -> bool {
    true
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: None,
            max_length: None,
            nullable: true,
            default: None,
            primary_key: false,
            foreign_key: None,
            unique: false,
            indexed: false,
            comment: None,
            position: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
    #[serde(default)]
    pub constraint_name: Option<String>,
    #[serde(default)]
    pub on_delete: Option<String>,
    #[serde(default)]
    pub on_update: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawForeignKey {
    Reference(ForeignKeyRef),
    Other(serde_json::Value),
}

fn deserialize_foreign_key<'de, D>(deserializer: D) -> std::result::Result<Option<ForeignKeyRef>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawForeignKey::deserialize(deserializer)? {
        RawForeignKey::Reference(fk) => Some(fk),
        RawForeignKey::Other(_) => None,
    })
}

impl SchemaDescription {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Build a description from `CREATE TABLE` / `CREATE INDEX` statements.
    /// Other statements are ignored.
    pub fn from_sql_ddl(database_name: Option<&str>, sql: &str) -> Result<Self> {
        let dialect = GenericDialect {};
        let statements = Parser::parse_sql(&dialect, sql)?;

        let mut schema = SchemaDescription {
            database_name: database_name.map(str::to_string),
            ..Default::default()
        };
        let mut indexes: Vec<(String, Vec<String>)> = Vec::new();

        for stmt in statements {
            match stmt {
                Statement::CreateTable {
                    name,
                    columns: sql_columns,
                    constraints: sql_constraints,
                    ..
                } => {
                    let mut table = TableSchema {
                        name: object_name(&name),
                        ..Default::default()
                    };

                    for (position, col) in sql_columns.iter().enumerate() {
                        let data_type = col.data_type.to_string();
                        let mut column = ColumnSchema::new(col.name.value.clone());
                        column.max_length = declared_length(&data_type);
                        column.data_type = Some(data_type);
                        column.position = Some(position as u64 + 1);

                        for opt in &col.options {
                            match &opt.option {
                                ColumnOption::NotNull => column.nullable = false,
                                ColumnOption::Default(expr) => {
                                    column.default = Some(serde_json::Value::String(expr.to_string()))
                                }
                                ColumnOption::Unique { is_primary, .. } => {
                                    if *is_primary {
                                        column.primary_key = true;
                                        column.nullable = false;
                                    } else {
                                        column.unique = true;
                                    }
                                }
                                ColumnOption::ForeignKey {
                                    foreign_table,
                                    referred_columns,
                                    on_delete,
                                    on_update,
                                    ..
                                } => {
                                    column.foreign_key = Some(ForeignKeyRef {
                                        table: object_name(foreign_table),
                                        column: first_ident(referred_columns),
                                        constraint_name: opt.name.as_ref().map(|n| n.value.clone()),
                                        on_delete: on_delete.as_ref().map(ToString::to_string),
                                        on_update: on_update.as_ref().map(ToString::to_string),
                                    });
                                }
                                _ => {}
                            }
                        }
                        table.columns.push(column);
                    }

                    for constraint in &sql_constraints {
                        match constraint {
                            TableConstraint::ForeignKey {
                                name: constraint_name,
                                columns: fk_cols,
                                foreign_table,
                                referred_columns,
                                on_delete,
                                on_update,
                                ..
                            } => {
                                for (i, fk_col) in fk_cols.iter().enumerate() {
                                    let referred = referred_columns
                                        .get(i)
                                        .map(|c| c.value.clone())
                                        .unwrap_or_else(|| first_ident(referred_columns));
                                    if let Some(column) =
                                        table.columns.iter_mut().find(|c| c.name == fk_col.value)
                                    {
                                        column.foreign_key = Some(ForeignKeyRef {
                                            table: object_name(foreign_table),
                                            column: referred,
                                            constraint_name: constraint_name.as_ref().map(|n| n.value.clone()),
                                            on_delete: on_delete.as_ref().map(ToString::to_string),
                                            on_update: on_update.as_ref().map(ToString::to_string),
                                        });
                                    }
                                }
                            }
                            TableConstraint::Unique {
                                columns: uq_cols,
                                is_primary,
                                ..
                            } => {
                                for uq_col in uq_cols {
                                    if let Some(column) =
                                        table.columns.iter_mut().find(|c| c.name == uq_col.value)
                                    {
                                        if *is_primary {
                                            column.primary_key = true;
                                            column.nullable = false;
                                        } else if uq_cols.len() == 1 {
                                            column.unique = true;
                                        } else {
                                            column.indexed = true;
                                        }
                                    }
                                }
                            }
                            _ => {}
                        }
                    }

                    schema.tables.push(table);
                }
                Statement::CreateIndex {
                    table_name, columns, ..
                } => {
                    let cols = columns
                        .iter()
                        .filter_map(|c| match &c.expr {
                            Expr::Identifier(ident) => Some(ident.value.clone()),
                            _ => None,
                        })
                        .collect();
                    indexes.push((object_name(&table_name), cols));
                }
                _ => {}
            }
        }

        for (table_name, cols) in indexes {
            let Some(table) = schema.tables.iter_mut().find(|t| t.name == table_name) else {
                tracing::debug!(table = %table_name, "index on unknown table ignored");
                continue;
            };
            for column in table.columns.iter_mut().filter(|c| cols.contains(&c.name)) {
                column.indexed = true;
            }
        }

        if schema.tables.is_empty() {
            return Err(ExtractError::Schema("no CREATE TABLE statements found".into()));
        }
        Ok(schema)
    }
}

fn object_name(name: &ObjectName) -> String {
    name.0
        .last()
        .map(|ident| ident.value.clone())
        .unwrap_or_else(|| name.to_string())
}

fn first_ident(idents: &[Ident]) -> String {
    idents.first().map(|i| i.value.clone()).unwrap_or_default()
}

/// `VARCHAR(255)` -> 255.
fn declared_length(data_type: &str) -> Option<u64> {
    let re = Regex::new(r"^\s*\w+(?:\s+\w+)*\s*\(\s*(\d+)\s*\)").ok()?;
    re.captures(data_type)?.get(1)?.as_str().parse().ok()
}
