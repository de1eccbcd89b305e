//! Per-option validators shared by commands

use crate::error::{M365Error, Result};

/// `8-4-4-4-12` hex GUID without braces
pub fn is_valid_guid(value: &str) -> bool {
    value.len() == 36 && uuid::Uuid::try_parse(value).is_ok()
}

pub fn validate_guid(option: &str, value: &str) -> Result<()> {
    if is_valid_guid(value) {
        Ok(())
    } else {
        Err(M365Error::ValidationError(format!(
            "'{}' is not a valid GUID for option '{}'",
            value, option
        )))
    }
}

/// Absolute https URL with a host
pub fn is_valid_sharepoint_url(value: &str) -> bool {
    match reqwest::Url::parse(value) {
        Ok(url) => url.scheme() == "https" && url.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}

pub fn validate_sharepoint_url(option: &str, value: &str) -> Result<()> {
    if is_valid_sharepoint_url(value) {
        Ok(())
    } else {
        Err(M365Error::ValidationError(format!(
            "'{}' is not a valid SharePoint Online site URL for option '{}'",
            value, option
        )))
    }
}

/// `local@domain` with a dotted domain
pub fn is_valid_user_principal_name(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.chars().any(char::is_whitespace)
}

pub fn validate_user_principal_name(option: &str, value: &str) -> Result<()> {
    if is_valid_user_principal_name(value) {
        Ok(())
    } else {
        Err(M365Error::ValidationError(format!(
            "'{}' is not a valid user principal name for option '{}'",
            value, option
        )))
    }
}

pub fn validate_positive_integer(option: &str, value: i64) -> Result<()> {
    if value > 0 {
        Ok(())
    } else {
        Err(M365Error::ValidationError(format!(
            "'{}' is not a positive number for option '{}'",
            value, option
        )))
    }
}

/// Case-insensitive match against `allowed`; returns the canonical spelling
pub fn validate_enum<'a>(option: &str, value: &str, allowed: &[&'a str]) -> Result<&'a str> {
    allowed
        .iter()
        .copied()
        .find(|candidate| candidate.eq_ignore_ascii_case(value))
        .ok_or_else(|| {
            M365Error::ValidationError(format!(
                "'{}' is not a valid value for option '{}'. Allowed values are {}",
                value,
                option,
                allowed.join(", ")
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guid() {
        assert!(is_valid_guid("b2307a39-e878-458b-bc90-03bc578531d6"));
        assert!(is_valid_guid("B2307A39-E878-458B-BC90-03BC578531D6"));
        assert!(!is_valid_guid("b2307a39e878458bbc9003bc578531d6"));
        assert!(!is_valid_guid("{b2307a39-e878-458b-bc90-03bc578531d6}"));
        assert!(!is_valid_guid("not-a-guid"));

        let err = validate_guid("id", "abc").unwrap_err();
        assert_eq!(err.to_string(), "'abc' is not a valid GUID for option 'id'");
    }

    #[test]
    fn test_sharepoint_url() {
        assert!(is_valid_sharepoint_url("https://contoso.sharepoint.com"));
        assert!(is_valid_sharepoint_url(
            "https://contoso.sharepoint.com/sites/marketing"
        ));
        assert!(!is_valid_sharepoint_url("http://contoso.sharepoint.com"));
        assert!(!is_valid_sharepoint_url("/sites/marketing"));
        assert!(!is_valid_sharepoint_url("contoso.sharepoint.com"));
    }

    #[test]
    fn test_user_principal_name() {
        assert!(is_valid_user_principal_name("john@contoso.com"));
        assert!(is_valid_user_principal_name(
            "john_contoso.com#EXT#@fabrikam.onmicrosoft.com"
        ));
        assert!(!is_valid_user_principal_name("john"));
        assert!(!is_valid_user_principal_name("@contoso.com"));
        assert!(!is_valid_user_principal_name("john@contoso"));
        assert!(!is_valid_user_principal_name("john doe@contoso.com"));
    }

    #[test]
    fn test_positive_integer() {
        assert!(validate_positive_integer("lcid", 1033).is_ok());
        assert!(validate_positive_integer("lcid", 0).is_err());
        assert!(validate_positive_integer("lcid", -5).is_err());
    }

    #[test]
    fn test_enum_is_case_insensitive() {
        let allowed = ["Topic", "Showcase", "Blank"];
        assert_eq!(validate_enum("siteDesign", "topic", &allowed).unwrap(), "Topic");

        let err = validate_enum("siteDesign", "fancy", &allowed).unwrap_err();
        assert_eq!(
            err.to_string(),
            "'fancy' is not a valid value for option 'siteDesign'. Allowed values are Topic, Showcase, Blank"
        );
    }
}
