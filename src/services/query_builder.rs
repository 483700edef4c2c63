// Composable, immutable query descriptions over backing-store tables.
//
// Nothing here touches the store. A `Query` renders to SQL plus bound values;
// the storage layer is the only place it is executed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use crate::api::middleware::AppError;
use crate::models::Record;
use crate::validation::quote_identifier;

/// Reference to `table.column`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub name: String,
}

/// Shorthand for `ColumnRef { table, name }`
pub fn column(table: impl Into<String>, name: impl Into<String>) -> ColumnRef {
    ColumnRef {
        table: table.into(),
        name: name.into(),
    }
}

impl ColumnRef {
    fn compare(&self, op: Operator, value: impl Into<Value>) -> Predicate {
        Predicate::Compare {
            column: self.clone(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(&self, value: impl Into<Value>) -> Predicate {
        self.compare(Operator::Eq, value)
    }

    pub fn ne(&self, value: impl Into<Value>) -> Predicate {
        self.compare(Operator::Ne, value)
    }

    pub fn lt(&self, value: impl Into<Value>) -> Predicate {
        self.compare(Operator::Lt, value)
    }

    pub fn le(&self, value: impl Into<Value>) -> Predicate {
        self.compare(Operator::Le, value)
    }

    pub fn gt(&self, value: impl Into<Value>) -> Predicate {
        self.compare(Operator::Gt, value)
    }

    pub fn ge(&self, value: impl Into<Value>) -> Predicate {
        self.compare(Operator::Ge, value)
    }

    pub fn is_null(&self) -> Predicate {
        self.compare(Operator::Eq, Value::Null)
    }

    pub fn is_not_null(&self) -> Predicate {
        self.compare(Operator::Ne, Value::Null)
    }

    fn render(&self) -> Result<String, AppError> {
        Ok(format!(
            "{}.{}",
            quote_identifier(&self.table)?,
            quote_identifier(&self.name)?
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    fn sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
        }
    }
}

/// Order two scalars the way the store compares them once bound. Booleans
/// are stored as integers. Mismatched kinds never compare.
fn compare_scalars(left: &Value, right: &Value) -> Option<Ordering> {
    fn numeric(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => numeric(left)?.partial_cmp(&numeric(right)?),
    }
}

/// Filter expression tree, composed with AND
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        column: ColumnRef,
        op: Operator,
        value: Value,
    },
    And(Vec<Predicate>),
}

impl Predicate {
    /// Conjunction of `self` and `other`, flattening nested ANDs
    pub fn and(self, other: Predicate) -> Predicate {
        let mut terms = match self {
            Predicate::And(terms) => terms,
            single => vec![single],
        };
        match other {
            Predicate::And(more) => terms.extend(more),
            single => terms.push(single),
        }
        Predicate::And(terms)
    }

    /// Evaluate the terms on `table` against one in-memory row. Terms on other
    /// tables are skipped; a missing field reads as null.
    pub fn matches(&self, table: &str, record: &Record) -> bool {
        match self {
            Predicate::Compare { column, .. } if column.table != table => true,
            Predicate::Compare { column, op, value } => {
                let field = record.get(&column.name).unwrap_or(&Value::Null);
                match (op, value, field) {
                    (Operator::Eq, Value::Null, _) => field.is_null(),
                    (Operator::Ne, Value::Null, _) => !field.is_null(),
                    (_, _, Value::Null) => false,
                    _ => compare_scalars(field, value).is_some_and(|o| op.holds(o)),
                }
            }
            Predicate::And(terms) => terms.iter().all(|t| t.matches(table, record)),
        }
    }

    fn columns(&self) -> Vec<&ColumnRef> {
        match self {
            Predicate::Compare { column, .. } => vec![column],
            Predicate::And(terms) => terms.iter().flat_map(|t| t.columns()).collect(),
        }
    }

    fn render(&self, params: &mut Vec<Value>) -> Result<String, AppError> {
        match self {
            Predicate::Compare { column, op, value } => {
                let column = column.render()?;
                match (op, value) {
                    (Operator::Eq, Value::Null) => Ok(format!("{} IS NULL", column)),
                    (Operator::Ne, Value::Null) => Ok(format!("{} IS NOT NULL", column)),
                    (_, Value::Null) => Err(AppError::Validation(format!(
                        "Operator {:?} cannot compare against null",
                        op
                    ))),
                    (_, Value::Array(_)) | (_, Value::Object(_)) => Err(AppError::Validation(
                        format!("Predicate literal for {} must be scalar", column),
                    )),
                    _ => {
                        params.push(value.clone());
                        Ok(format!("{} {} ?{}", column, op.sql(), params.len()))
                    }
                }
            }
            Predicate::And(terms) if terms.is_empty() => Ok("1 = 1".to_string()),
            Predicate::And(terms) => {
                let rendered = terms
                    .iter()
                    .map(|t| t.render(params))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("({})", rendered.join(" AND ")))
            }
        }
    }
}

/// SQL text with positional (`?N`) bound values
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Unexecuted select over one or more tables.
///
/// Every builder step returns a new value, so one description can be reused
/// for the existence check and the authoritative read.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    tables: Vec<String>,
    predicates: Vec<Predicate>,
}

/// Start a query over `tables`. The first table is the write-back target.
pub fn select<I, S>(tables: I) -> Query
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Query {
        tables: tables.into_iter().map(Into::into).collect(),
        predicates: Vec::new(),
    }
}

impl Query {
    /// New query with `predicate` ANDed onto the existing filters
    pub fn filter(&self, predicate: Predicate) -> Query {
        let mut next = self.clone();
        next.predicates.push(predicate);
        next
    }

    /// New query with every predicate in `predicates` ANDed on
    pub fn filter_all<I>(&self, predicates: I) -> Query
    where
        I: IntoIterator<Item = Predicate>,
    {
        let mut next = self.clone();
        next.predicates.extend(predicates);
        next
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Table that fetched rows are written into
    pub fn target_table(&self) -> Result<&str, AppError> {
        self.tables
            .first()
            .map(String::as_str)
            .ok_or_else(|| AppError::Validation("Query must name at least one table".to_string()))
    }

    /// Whether a row bound for the target table satisfies every predicate on
    /// that table
    pub fn matches_target(&self, record: &Record) -> bool {
        match self.target_table() {
            Ok(table) => self.predicates.iter().all(|p| p.matches(table, record)),
            Err(_) => false,
        }
    }

    fn from_and_where(&self) -> Result<(String, String, Vec<Value>), AppError> {
        self.target_table()?;

        for predicate in &self.predicates {
            for column in predicate.columns() {
                if !self.tables.contains(&column.table) {
                    return Err(AppError::Validation(format!(
                        "Predicate references table {} which is not selected",
                        column.table
                    )));
                }
            }
        }

        let from = self
            .tables
            .iter()
            .map(|t| quote_identifier(t))
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");

        let mut params = Vec::new();
        let clause = if self.predicates.is_empty() {
            String::new()
        } else {
            let rendered = self
                .predicates
                .iter()
                .map(|p| p.render(&mut params))
                .collect::<Result<Vec<_>, _>>()?;
            format!(" WHERE {}", rendered.join(" AND "))
        };

        Ok((from, clause, params))
    }

    /// `SELECT` over the selected tables; with several tables, later tables'
    /// columns shadow same-named columns of earlier ones
    pub fn to_select_sql(&self, limit: Option<usize>) -> Result<CompiledQuery, AppError> {
        let (from, clause, params) = self.from_and_where()?;
        let projection = self
            .tables
            .iter()
            .map(|t| quote_identifier(t).map(|q| format!("{}.*", q)))
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");

        let mut sql = format!("SELECT {} FROM {}{}", projection, from, clause);
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        Ok(CompiledQuery { sql, params })
    }

    /// `DELETE` of the matching target rows; single-table queries only
    pub fn to_delete_sql(&self) -> Result<CompiledQuery, AppError> {
        if self.tables.len() != 1 {
            return Err(AppError::Validation(
                "Only single-table queries can be invalidated".to_string(),
            ));
        }
        let (from, clause, params) = self.from_and_where()?;
        Ok(CompiledQuery {
            sql: format!("DELETE FROM {}{}", from, clause),
            params,
        })
    }
}
