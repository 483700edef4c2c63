use sqlparser::ast::Statement;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use crate::api::middleware::AppError;

/// Read-only guard for SQL handed to relational source adapters
pub struct SqlValidator;

impl SqlValidator {
    fn parse(sql: &str) -> Result<Vec<Statement>, AppError> {
        let dialect = PostgreSqlDialect {};
        let statements = Parser::new(&dialect)
            .try_with_sql(sql)
            .and_then(|mut parser| parser.parse_statements())
            .map_err(|e| AppError::InvalidSql(format!("SQL parsing error: {}", e)))?;

        if statements.is_empty() {
            return Err(AppError::InvalidSql("Empty SQL query".to_string()));
        }

        Ok(statements)
    }

    /// Ensure `sql` is exactly one SELECT statement
    pub fn validate_select_only(sql: &str) -> Result<(), AppError> {
        let statements = Self::parse(sql)?;

        if statements.len() > 1 {
            return Err(AppError::InvalidSql(format!(
                "Expected a single statement, found {}",
                statements.len()
            )));
        }

        match &statements[0] {
            Statement::Query(_) => Ok(()),
            Statement::Insert { .. } => Err(Self::rejected("INSERT")),
            Statement::Update { .. } => Err(Self::rejected("UPDATE")),
            Statement::Delete { .. } => Err(Self::rejected("DELETE")),
            Statement::Drop { .. } => Err(Self::rejected("DROP")),
            Statement::CreateTable { .. } => Err(Self::rejected("CREATE TABLE")),
            Statement::AlterTable { .. } => Err(Self::rejected("ALTER TABLE")),
            other => Err(AppError::InvalidSql(format!(
                "Only SELECT queries are permitted. Found: {}",
                other
            ))),
        }
    }

    fn rejected(kind: &str) -> AppError {
        AppError::InvalidSql(format!(
            "{} statements are not allowed. Only SELECT queries are permitted.",
            kind
        ))
    }

    /// Validate `sql` and, when `limit` is given and the query has no LIMIT
    /// clause of its own, append one. Returns the SQL to run and whether a
    /// LIMIT was appended.
    pub fn prepare(sql: &str, limit: Option<u64>) -> Result<(String, bool), AppError> {
        Self::validate_select_only(sql)?;

        let limit = match limit {
            Some(limit) => limit,
            None => return Ok((sql.to_string(), false)),
        };

        if Self::has_limit(sql)? {
            Ok((sql.to_string(), false))
        } else {
            let trimmed_sql = sql.trim().trim_end_matches(';').trim();
            Ok((format!("{} LIMIT {}", trimmed_sql, limit), true))
        }
    }

    /// LIMIT detection on the AST, so names and comments containing "limit"
    /// are not mistaken for a clause
    fn has_limit(sql: &str) -> Result<bool, AppError> {
        let statements = Self::parse(sql)?;
        Ok(match &statements[0] {
            Statement::Query(query) => query.limit_clause.is_some(),
            _ => false,
        })
    }
}
