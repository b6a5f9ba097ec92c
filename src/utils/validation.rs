use crate::utils::error::{PortalError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(PortalError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(PortalError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(PortalError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(PortalError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(PortalError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| PortalError::MissingConfigError {
        field: field_name.to_string(),
    })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(PortalError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(PortalError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

/// ISO 4217 style: three ASCII uppercase letters.
pub fn validate_currency(field_name: &str, currency: &str) -> Result<()> {
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(PortalError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: currency.to_string(),
            reason: "Currency must be a three-letter uppercase code".to_string(),
        });
    }
    Ok(())
}

pub fn validate_header_name(field_name: &str, header: &str) -> Result<()> {
    validate_non_empty_string(field_name, header)?;

    if !header
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(PortalError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: header.to_string(),
            reason: "Header names may only contain letters, digits, '-' and '_'".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("store.url", "https://example.com").is_ok());
        assert!(validate_url("store.url", "http://localhost:54321").is_ok());
        assert!(validate_url("store.url", "").is_err());
        assert!(validate_url("store.url", "invalid-url").is_err());
        assert!(validate_url("store.url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_currency() {
        assert!(validate_currency("currency", "USD").is_ok());
        assert!(validate_currency("currency", "usd").is_err());
        assert!(validate_currency("currency", "EURO").is_err());
    }

    #[test]
    fn test_validate_header_name() {
        assert!(validate_header_name("header", "x-webhook-secret").is_ok());
        assert!(validate_header_name("header", "x webhook").is_err());
        assert!(validate_header_name("header", " ").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("tolerance", 300, 1, 3600).is_ok());
        assert!(validate_range("tolerance", 0, 1, 3600).is_err());
    }
}
