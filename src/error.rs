use thiserror::Error;

#[derive(Error, Debug)]
pub enum M365Error {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("{message}")]
    ApiError { status: u16, message: String },

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Operation did not complete after {attempts} attempts: {url}")]
    OperationTimeout { url: String, attempts: u32 },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Interactive prompt error: {0}")]
    DialoguerError(#[from] dialoguer::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Invalid query: {0}")]
    QueryError(String),

    #[error("Not logged in. Run 'm365 login' first")]
    TokenNotFound,

    #[error("Tenant '{0}' not found")]
    TenantNotFound(String),
}

pub type Result<T> = std::result::Result<T, M365Error>;

impl M365Error {
    /// Build an API error from a failed response body, keeping the upstream message.
    pub fn from_response(status: u16, body: &str) -> Self {
        M365Error::ApiError {
            status,
            message: enhance_api_error(body),
        }
    }
}

/// Extract the upstream message from any of the error envelopes we talk to.
///
/// Recognized shapes:
/// - Graph / Power Platform: `{"error": {"code": "...", "message": "..."}}`
/// - SharePoint REST: `{"odata.error": {"message": {"value": "..."}}}`
///   or `{"error": {"message": {"value": "..."}}}`
/// - ClientSvc (CSOM): `[{"ErrorInfo": {"ErrorMessage": "..."}}, ...]`
///
/// Anything else is returned as-is.
pub fn upstream_message(body: &str) -> Option<(Option<String>, String)> {
    let json = serde_json::from_str::<serde_json::Value>(body).ok()?;

    if let Some(error_info) = json
        .as_array()
        .and_then(|items| items.first())
        .and_then(|first| first.get("ErrorInfo"))
        .filter(|info| !info.is_null())
    {
        let message = error_info
            .get("ErrorMessage")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown ClientSvc error")
            .to_string();
        let code = error_info
            .get("ErrorTypeName")
            .and_then(|c| c.as_str())
            .map(String::from);
        return Some((code, message));
    }

    let error_obj = json.get("odata.error").or_else(|| json.get("error"))?;

    let code = error_obj
        .get("code")
        .and_then(|c| c.as_str())
        .map(String::from);

    let message = match error_obj.get("message") {
        Some(serde_json::Value::String(m)) => m.clone(),
        Some(serde_json::Value::Object(m)) => m
            .get("value")
            .and_then(|v| v.as_str())
            .unwrap_or("No message")
            .to_string(),
        _ => error_obj.as_str().unwrap_or("No message").to_string(),
    };

    Some((code, message))
}

/// Format an upstream error body and add a hint for well-known Graph codes
pub fn enhance_api_error(error_response: &str) -> String {
    let Some((code, message)) = upstream_message(error_response) else {
        return error_response.to_string();
    };

    let Some(code) = code else {
        return message;
    };

    let hint = match code.as_str() {
        "Unauthorized" | "InvalidAuthenticationToken" => {
            "\nHint: Your access token may have expired. Run 'm365 login' again."
        }
        "Forbidden" | "InsufficientPrivileges" | "Authorization_RequestDenied" => {
            "\nHint: Check that the app registration has the required permissions and admin consent is granted."
        }
        "TooManyRequests" => "\nHint: API rate limit exceeded. Wait a moment and try again.",
        _ => "",
    };

    format!("{}: {}{}", code, message, hint)
}
