use crate::error::{M365Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "M365_CLI_CONFIG_DIR";

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub current_tenant: Option<String>,

    #[serde(default)]
    pub settings: Settings,
}

/// User-adjustable CLI settings (`m365 cli set-config`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Default output format when `--output` is not passed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    #[serde(default)]
    pub disable_telemetry: bool,

    /// Ask for confirmation before destructive commands
    #[serde(default = "default_prompt")]
    pub prompt: bool,
}

fn default_prompt() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output: None,
            disable_telemetry: false,
            prompt: true,
        }
    }
}

impl Settings {
    pub const KEYS: &'static [&'static str] = &["output", "disable_telemetry", "prompt"];

    pub fn get(&self, key: &str) -> Result<serde_json::Value> {
        match key {
            "output" => Ok(self
                .output
                .clone()
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null)),
            "disable_telemetry" => Ok(serde_json::Value::Bool(self.disable_telemetry)),
            "prompt" => Ok(serde_json::Value::Bool(self.prompt)),
            _ => Err(unknown_setting(key)),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "output" => {
                crate::output::OutputFormat::parse(value)?;
                self.output = Some(value.to_lowercase());
            }
            "disable_telemetry" => self.disable_telemetry = parse_bool(key, value)?,
            "prompt" => self.prompt = parse_bool(key, value)?,
            _ => return Err(unknown_setting(key)),
        }
        Ok(())
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "output": self.output,
            "disable_telemetry": self.disable_telemetry,
            "prompt": self.prompt,
        })
    }
}

fn unknown_setting(key: &str) -> M365Error {
    M365Error::ValidationError(format!(
        "'{}' is not a valid setting. Allowed settings: {}",
        key,
        Settings::KEYS.join(", ")
    ))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(M365Error::ValidationError(format!(
            "'{}' is not a valid value for '{}'. Use true or false",
            value, key
        ))),
    }
}

/// Tenant-specific configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TenantConfig {
    pub name: String,
    pub tenant_id: String,
    pub client_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(default)]
    pub auth_type: AuthType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Root SharePoint URL, e.g. https://contoso.sharepoint.com
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spo_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    DeviceCode,
    ClientCredentials,
}

/// Token cache for a single tenant/resource pair
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenCache {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub tenant_id: String,
    #[serde(default)]
    pub resource: String,
}

impl TokenCache {
    pub fn is_expired(&self) -> bool {
        // Leave a small margin so a token doesn't expire mid-request
        self.expires_at - chrono::Duration::seconds(60) < chrono::Utc::now()
    }
}

/// Configuration manager
#[derive(Clone, Debug)]
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            return Self::with_dir(dir);
        }

        let project_dirs = ProjectDirs::from("com", "m365-cli", "m365").ok_or_else(|| {
            M365Error::ConfigError("Failed to determine config directory".into())
        })?;

        Self::with_dir(project_dirs.config_dir())
    }

    /// Use an explicit config directory, creating it when missing
    pub fn with_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let config_dir = dir.as_ref().to_path_buf();
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)?;
        }
        Ok(Self { config_dir })
    }

    pub fn config_dir(&self) -> &PathBuf {
        &self.config_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn tenants_file(&self) -> PathBuf {
        self.config_dir.join("tenants.toml")
    }

    fn token_dir(&self, tenant_name: &str) -> PathBuf {
        self.config_dir.join("cache").join(tenant_name)
    }

    pub fn token_cache_file(&self, tenant_name: &str, resource: &str) -> PathBuf {
        self.token_dir(tenant_name)
            .join(format!("{}.token", resource_key(resource)))
    }

    /// Load main config
    pub fn load_config(&self) -> Result<Config> {
        let config_path = self.config_file();

        if !config_path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(config_path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save main config
    pub fn save_config(&self, config: &Config) -> Result<()> {
        let contents = toml::to_string_pretty(config)
            .map_err(|e| M365Error::ConfigError(format!("Failed to serialize config: {}", e)))?;
        fs::write(self.config_file(), contents)?;
        Ok(())
    }

    /// Load all tenants
    pub fn load_tenants(&self) -> Result<Vec<TenantConfig>> {
        let tenants_path = self.tenants_file();

        if !tenants_path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(tenants_path)?;

        #[derive(Deserialize)]
        struct TenantsFile {
            #[serde(default)]
            tenants: Vec<TenantConfig>,
        }

        let file: TenantsFile = toml::from_str(&contents)?;
        Ok(file.tenants)
    }

    /// Save all tenants
    pub fn save_tenants(&self, tenants: &[TenantConfig]) -> Result<()> {
        #[derive(Serialize)]
        struct TenantsFile<'a> {
            tenants: &'a [TenantConfig],
        }

        let contents = toml::to_string_pretty(&TenantsFile { tenants })
            .map_err(|e| M365Error::ConfigError(format!("Failed to serialize tenants: {}", e)))?;
        fs::write(self.tenants_file(), contents)?;
        Ok(())
    }

    /// Add or replace a tenant with the same name
    pub fn add_tenant(&self, tenant: TenantConfig) -> Result<()> {
        let mut tenants = self.load_tenants()?;
        tenants.retain(|t| t.name != tenant.name);
        tenants.push(tenant);
        self.save_tenants(&tenants)
    }

    pub fn get_tenant(&self, name: &str) -> Result<TenantConfig> {
        self.load_tenants()?
            .into_iter()
            .find(|t| t.name == name)
            .ok_or_else(|| M365Error::TenantNotFound(name.to_string()))
    }

    pub fn get_active_tenant(&self) -> Result<Option<TenantConfig>> {
        match self.load_config()?.current_tenant {
            Some(tenant_name) => Ok(Some(self.get_tenant(&tenant_name)?)),
            None => Ok(None),
        }
    }

    /// Active tenant, falling back to `M365_*` environment variables
    pub fn require_active_tenant(&self) -> Result<TenantConfig> {
        if let Some(tenant) = self.get_active_tenant()? {
            return Ok(tenant);
        }
        if let Some(tenant) = tenant_from_environment() {
            return Ok(tenant);
        }
        Err(M365Error::ConfigError(
            "No active tenant. Run 'm365 login' or 'm365 tenant switch <name>' first.".into(),
        ))
    }

    pub fn set_active_tenant(&self, tenant_name: &str) -> Result<()> {
        self.get_tenant(tenant_name)?;

        let mut config = self.load_config()?;
        config.current_tenant = Some(tenant_name.to_string());
        self.save_config(&config)
    }

    /// Remove a tenant, its token caches, and clear it if it was active
    pub fn remove_tenant(&self, tenant_name: &str) -> Result<()> {
        let mut tenants = self.load_tenants()?;
        let original_len = tenants.len();
        tenants.retain(|t| t.name != tenant_name);

        if tenants.len() == original_len {
            return Err(M365Error::TenantNotFound(tenant_name.to_string()));
        }

        self.save_tenants(&tenants)?;
        self.delete_tokens(tenant_name)?;

        let mut config = self.load_config()?;
        if config.current_tenant.as_deref() == Some(tenant_name) {
            config.current_tenant = None;
            self.save_config(&config)?;
        }

        Ok(())
    }

    pub fn save_token(&self, tenant_name: &str, token: &TokenCache) -> Result<()> {
        let token_dir = self.token_dir(tenant_name);
        if !token_dir.exists() {
            fs::create_dir_all(&token_dir)?;
        }

        let contents = serde_json::to_string_pretty(token)?;
        fs::write(self.token_cache_file(tenant_name, &token.resource), contents)?;
        Ok(())
    }

    /// Read a cached token regardless of expiry
    pub fn read_token(&self, tenant_name: &str, resource: &str) -> Result<Option<TokenCache>> {
        let token_path = self.token_cache_file(tenant_name, resource);

        if !token_path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(token_path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Load a cached token that is still valid
    pub fn load_token(&self, tenant_name: &str, resource: &str) -> Result<TokenCache> {
        let token = self
            .read_token(tenant_name, resource)?
            .ok_or(M365Error::TokenNotFound)?;

        if token.is_expired() {
            return Err(M365Error::AuthError("Token expired".into()));
        }

        Ok(token)
    }

    /// All cached tokens for a tenant, sorted by resource
    pub fn cached_tokens(&self, tenant_name: &str) -> Result<Vec<TokenCache>> {
        let token_dir = self.token_dir(tenant_name);
        if !token_dir.exists() {
            return Ok(Vec::new());
        }

        let mut tokens = Vec::new();
        for entry in fs::read_dir(token_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "token") {
                let contents = fs::read_to_string(&path)?;
                tokens.push(serde_json::from_str::<TokenCache>(&contents)?);
            }
        }
        tokens.sort_by(|a, b| a.resource.cmp(&b.resource));
        Ok(tokens)
    }

    /// Delete every cached token of a tenant
    pub fn delete_tokens(&self, tenant_name: &str) -> Result<()> {
        let token_dir = self.token_dir(tenant_name);

        if token_dir.exists() {
            fs::remove_dir_all(token_dir)?;
        }

        Ok(())
    }

    /// Load tenant from `<name>.env` (or `.env`) in the config directory
    ///
    /// Supports format:
    /// ```text
    /// # Contoso production
    /// TENANT_ID=xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx
    /// CLIENT_ID=xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx
    /// CLIENT_SECRET=your-secret-here
    /// SPO_URL=https://contoso.sharepoint.com
    /// ```
    pub fn load_env_file(&self, name: &str) -> Result<Option<TenantConfig>> {
        let env_path = self.config_dir.join(format!("{}.env", name.to_lowercase()));
        let fallback_path = self.config_dir.join(".env");

        let path = if env_path.exists() {
            env_path
        } else if fallback_path.exists() {
            fallback_path
        } else {
            return Ok(None);
        };

        let contents = fs::read_to_string(&path)?;
        Ok(vars_to_tenant(name, &parse_env_file(&contents)))
    }

    /// Get tenant by name, importing it from an env file when not yet configured
    pub fn get_tenant_or_env(&self, name: &str) -> Result<TenantConfig> {
        if let Ok(tenant) = self.get_tenant(name) {
            return Ok(tenant);
        }

        if let Some(tenant) = self.load_env_file(name)? {
            self.add_tenant(tenant.clone())?;
            return Ok(tenant);
        }

        Err(M365Error::TenantNotFound(name.to_string()))
    }
}

/// Turn a resource URL into a file-name-safe key
fn resource_key(resource: &str) -> String {
    resource
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

/// Parse simple KEY=VALUE env file format
fn parse_env_file(contents: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();

    for line in contents.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim();
            let value = if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                &value[1..value.len() - 1]
            } else {
                value
            };

            vars.insert(key.trim().to_uppercase(), value.to_string());
        }
    }

    vars
}

fn vars_to_tenant(name: &str, vars: &HashMap<String, String>) -> Option<TenantConfig> {
    let tenant_id = vars.get("TENANT_ID")?;
    let client_id = vars.get("CLIENT_ID")?;
    let client_secret = vars.get("CLIENT_SECRET").filter(|s| !s.is_empty());

    Some(TenantConfig {
        name: name.to_string(),
        tenant_id: tenant_id.clone(),
        client_id: client_id.clone(),
        client_secret: client_secret.cloned(),
        auth_type: if client_secret.is_some() {
            AuthType::ClientCredentials
        } else {
            AuthType::DeviceCode
        },
        description: vars.get("DESCRIPTION").cloned(),
        spo_url: vars.get("SPO_URL").cloned(),
    })
}

/// Tenant profile from `M365_TENANT_ID` / `M365_CLIENT_ID` / `M365_CLIENT_SECRET`
pub fn tenant_from_environment() -> Option<TenantConfig> {
    let vars: HashMap<String, String> = ["TENANT_ID", "CLIENT_ID", "CLIENT_SECRET", "SPO_URL"]
        .iter()
        .filter_map(|key| {
            std::env::var(format!("M365_{}", key))
                .ok()
                .map(|value| (key.to_string(), value))
        })
        .collect();

    vars_to_tenant("env", &vars)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(name: &str) -> TenantConfig {
        TenantConfig {
            name: name.to_string(),
            tenant_id: "00000000-0000-0000-0000-000000000001".into(),
            client_id: "00000000-0000-0000-0000-000000000002".into(),
            client_secret: None,
            auth_type: AuthType::DeviceCode,
            description: None,
            spo_url: None,
        }
    }

    #[test]
    fn test_tenant_roundtrip_and_active() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_dir(dir.path()).unwrap();

        manager.add_tenant(tenant("contoso")).unwrap();
        manager.add_tenant(tenant("fabrikam")).unwrap();
        manager.set_active_tenant("fabrikam").unwrap();

        assert_eq!(manager.load_tenants().unwrap().len(), 2);
        assert_eq!(
            manager.get_active_tenant().unwrap().unwrap().name,
            "fabrikam"
        );

        manager.remove_tenant("fabrikam").unwrap();
        assert!(manager.get_active_tenant().unwrap().is_none());
        assert!(matches!(
            manager.remove_tenant("fabrikam"),
            Err(M365Error::TenantNotFound(_))
        ));
    }

    #[test]
    fn test_token_cache_per_resource() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_dir(dir.path()).unwrap();

        let token = TokenCache {
            access_token: "abc".into(),
            refresh_token: Some("refresh".into()),
            expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
            tenant_id: "tid".into(),
            resource: "https://graph.microsoft.com".into(),
        };
        manager.save_token("contoso", &token).unwrap();

        let loaded = manager
            .load_token("contoso", "https://graph.microsoft.com")
            .unwrap();
        assert_eq!(loaded.access_token, "abc");
        assert!(matches!(
            manager.load_token("contoso", "https://api.bap.microsoft.com"),
            Err(M365Error::TokenNotFound)
        ));

        let expired = TokenCache {
            resource: "https://contoso.sharepoint.com".into(),
            expires_at: chrono::Utc::now() - chrono::Duration::minutes(5),
            ..token
        };
        manager.save_token("contoso", &expired).unwrap();
        assert!(matches!(
            manager.load_token("contoso", "https://contoso.sharepoint.com"),
            Err(M365Error::AuthError(_))
        ));
        assert_eq!(manager.cached_tokens("contoso").unwrap().len(), 2);

        manager.delete_tokens("contoso").unwrap();
        assert!(manager.cached_tokens("contoso").unwrap().is_empty());
    }

    #[test]
    fn test_parse_env_file() {
        let vars = parse_env_file(
            "# comment\nTENANT_ID=\"abc\"\nclient_id = 'def'\n\nCLIENT_SECRET=s3cr=t\n",
        );
        assert_eq!(vars["TENANT_ID"], "abc");
        assert_eq!(vars["CLIENT_ID"], "def");
        assert_eq!(vars["CLIENT_SECRET"], "s3cr=t");

        let tenant = vars_to_tenant("contoso", &vars).unwrap();
        assert_eq!(tenant.auth_type, AuthType::ClientCredentials);
    }

    #[test]
    fn test_settings_set_and_get() {
        let mut settings = Settings::default();
        settings.set("output", "TEXT").unwrap();
        settings.set("prompt", "false").unwrap();

        assert_eq!(settings.get("output").unwrap(), "text");
        assert_eq!(settings.get("prompt").unwrap(), false);
        assert!(settings.set("output", "yaml").is_err());
        assert!(settings.set("unknown", "1").is_err());
    }

    #[test]
    fn test_resource_key() {
        assert_eq!(resource_key("https://graph.microsoft.com"), "graph.microsoft.com");
        assert_eq!(
            resource_key("http://127.0.0.1:8080/"),
            "127.0.0.1_8080"
        );
    }
}
