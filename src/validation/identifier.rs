use crate::api::middleware::AppError;

/// Check that a table or column name is a plain SQL identifier
/// (`[A-Za-z_][A-Za-z0-9_]*`)
pub fn validate_identifier(name: &str) -> Result<&str, AppError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(name)
    } else {
        Err(AppError::Validation(format!("Invalid identifier: {:?}", name)))
    }
}

/// Validate and double-quote an identifier for use in generated SQL
pub fn quote_identifier(name: &str) -> Result<String, AppError> {
    validate_identifier(name).map(|n| format!("\"{}\"", n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(validate_identifier("risk").is_ok());
        assert!(validate_identifier("_tmp1").is_ok());
        assert!(validate_identifier("cob_dt").is_ok());
        assert_eq!(quote_identifier("risk").unwrap(), "\"risk\"");
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1risk").is_err());
        assert!(validate_identifier("risk\"--").is_err());
        assert!(validate_identifier("a b").is_err());
    }
}
