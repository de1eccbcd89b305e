use crate::api::entra::{EntraClient, GroupType, PolicyType};
use crate::cmd::options::OptionSet;
use crate::cmd::{Command, CommandContext, run_command};
use crate::error::{M365Error, Result};
use crate::telemetry::{TelemetryProperties, used};
use crate::validation::{validate_enum, validate_guid, validate_user_principal_name};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde_json::{Value, json};

#[derive(Subcommand, Debug)]
pub enum EntraCommands {
    /// List users in the tenant
    ListUsers(ListUsers),
    /// Get a user by id or user principal name
    GetUser(GetUser),
    /// List groups, optionally of one type
    ListGroups(ListGroups),
    /// Get a group by id or display name
    GetGroup(GetGroup),
    /// Remove a group
    RemoveGroup(RemoveGroup),
    /// List app registrations
    ListApps(ListApps),
    /// Get an app registration
    GetApp(GetApp),
    /// List policies of one type or all types
    ListPolicies(ListPolicies),
}

pub async fn run(command: EntraCommands, ctx: &CommandContext) -> Result<()> {
    match command {
        EntraCommands::ListUsers(c) => run_command(&c, ctx).await,
        EntraCommands::GetUser(c) => run_command(&c, ctx).await,
        EntraCommands::ListGroups(c) => run_command(&c, ctx).await,
        EntraCommands::GetGroup(c) => run_command(&c, ctx).await,
        EntraCommands::RemoveGroup(c) => run_command(&c, ctx).await,
        EntraCommands::ListApps(c) => run_command(&c, ctx).await,
        EntraCommands::GetApp(c) => run_command(&c, ctx).await,
        EntraCommands::ListPolicies(c) => run_command(&c, ctx).await,
    }
}

#[derive(Args, Debug)]
pub struct ListUsers {
    /// Comma-separated properties to retrieve
    #[arg(short, long)]
    pub properties: Option<String>,

    /// OData filter, e.g. "accountEnabled eq true"
    #[arg(short, long)]
    pub filter: Option<String>,
}

impl Command for ListUsers {
    const NAME: &'static str = "entra list-users";
    const DEFAULT_PROPERTIES: &'static [&'static str] =
        &["id", "displayName", "mail", "userPrincipalName"];

    fn telemetry_properties(&self) -> TelemetryProperties {
        TelemetryProperties::from([
            ("properties".into(), used(&self.properties)),
            ("filter".into(), used(&self.filter)),
        ])
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let client = ctx.rest_client()?;
        let users = EntraClient::new(&client)
            .list_users(self.properties.as_deref(), self.filter.as_deref())
            .await?;
        ctx.print(&Value::Array(users), Self::DEFAULT_PROPERTIES)
    }
}

#[derive(Args, Debug)]
pub struct GetUser {
    /// Object id of the user
    #[arg(short, long)]
    pub id: Option<String>,

    /// User principal name, e.g. adele@contoso.com
    #[arg(short = 'n', long)]
    pub user_name: Option<String>,

    /// Comma-separated properties to retrieve
    #[arg(short, long)]
    pub properties: Option<String>,
}

impl Command for GetUser {
    const NAME: &'static str = "entra get-user";

    fn option_sets(&self) -> Vec<OptionSet> {
        vec![
            OptionSet::new()
                .option("id", self.id.is_some())
                .option("user-name", self.user_name.is_some()),
        ]
    }

    async fn validate(&self, _ctx: &CommandContext) -> Result<()> {
        if let Some(id) = &self.id {
            validate_guid("id", id)?;
        }
        if let Some(user_name) = &self.user_name {
            validate_user_principal_name("user-name", user_name)?;
        }
        Ok(())
    }

    fn telemetry_properties(&self) -> TelemetryProperties {
        TelemetryProperties::from([
            ("id".into(), used(&self.id)),
            ("userName".into(), used(&self.user_name)),
            ("properties".into(), used(&self.properties)),
        ])
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let client = ctx.rest_client()?;
        let key = self.id.as_deref().or(self.user_name.as_deref()).unwrap_or_default();
        let user = EntraClient::new(&client)
            .get_user(key, self.properties.as_deref())
            .await?;
        ctx.print(&user, Self::DEFAULT_PROPERTIES)
    }
}

#[derive(Args, Debug)]
pub struct ListGroups {
    /// Only groups of this type
    #[arg(long = "type")]
    pub group_type: Option<String>,
}

impl Command for ListGroups {
    const NAME: &'static str = "entra list-groups";
    const DEFAULT_PROPERTIES: &'static [&'static str] = &["id", "displayName", "groupType"];

    async fn validate(&self, _ctx: &CommandContext) -> Result<()> {
        if let Some(group_type) = &self.group_type {
            validate_enum("type", group_type, GroupType::ALL)?;
        }
        Ok(())
    }

    fn telemetry_properties(&self) -> TelemetryProperties {
        TelemetryProperties::from([("type".into(), used(&self.group_type))])
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let client = ctx.rest_client()?;
        let group_type = self.group_type.as_deref().and_then(GroupType::parse);
        let groups = EntraClient::new(&client).list_groups(group_type).await?;

        let groups: Vec<Value> = groups
            .into_iter()
            .map(|mut group| {
                let label = GroupType::of(&group).map(GroupType::label);
                if let Some(obj) = group.as_object_mut() {
                    obj.insert("groupType".into(), json!(label));
                }
                group
            })
            .collect();

        ctx.print(&Value::Array(groups), Self::DEFAULT_PROPERTIES)
    }
}

#[derive(Args, Debug)]
pub struct GetGroup {
    /// Object id of the group
    #[arg(short, long)]
    pub id: Option<String>,

    /// Display name of the group
    #[arg(short, long)]
    pub display_name: Option<String>,
}

impl Command for GetGroup {
    const NAME: &'static str = "entra get-group";

    fn option_sets(&self) -> Vec<OptionSet> {
        vec![
            OptionSet::new()
                .option("id", self.id.is_some())
                .option("display-name", self.display_name.is_some()),
        ]
    }

    async fn validate(&self, _ctx: &CommandContext) -> Result<()> {
        match &self.id {
            Some(id) => validate_guid("id", id),
            None => Ok(()),
        }
    }

    fn telemetry_properties(&self) -> TelemetryProperties {
        TelemetryProperties::from([
            ("id".into(), used(&self.id)),
            ("displayName".into(), used(&self.display_name)),
        ])
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let client = ctx.rest_client()?;
        let entra = EntraClient::new(&client);
        let group = match (&self.id, &self.display_name) {
            (Some(id), _) => entra.get_group(id).await?,
            (None, name) => {
                entra
                    .get_group_by_name(name.as_deref().unwrap_or_default())
                    .await?
            }
        };
        ctx.print(&group, Self::DEFAULT_PROPERTIES)
    }
}

#[derive(Args, Debug)]
pub struct RemoveGroup {
    /// Object id of the group
    #[arg(short, long)]
    pub id: Option<String>,

    /// Display name of the group
    #[arg(short, long)]
    pub display_name: Option<String>,

    /// Don't ask for confirmation
    #[arg(short, long)]
    pub force: bool,
}

impl Command for RemoveGroup {
    const NAME: &'static str = "entra remove-group";

    fn option_sets(&self) -> Vec<OptionSet> {
        vec![
            OptionSet::new()
                .option("id", self.id.is_some())
                .option("display-name", self.display_name.is_some()),
        ]
    }

    async fn validate(&self, _ctx: &CommandContext) -> Result<()> {
        match &self.id {
            Some(id) => validate_guid("id", id),
            None => Ok(()),
        }
    }

    fn telemetry_properties(&self) -> TelemetryProperties {
        TelemetryProperties::from([
            ("id".into(), used(&self.id)),
            ("displayName".into(), used(&self.display_name)),
            ("force".into(), Value::Bool(self.force)),
        ])
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let label = self
            .id
            .as_deref()
            .or(self.display_name.as_deref())
            .unwrap_or_default();
        if !ctx.confirm(
            self.force,
            &format!("Are you sure you want to remove group '{}'?", label),
        )? {
            return Ok(());
        }

        let client = ctx.rest_client()?;
        let entra = EntraClient::new(&client);
        let id = match (&self.id, &self.display_name) {
            (Some(id), _) => id.clone(),
            (None, name) => {
                let group = entra
                    .get_group_by_name(name.as_deref().unwrap_or_default())
                    .await?;
                group["id"].as_str().map(String::from).ok_or_else(|| {
                    M365Error::ApiError {
                        status: 200,
                        message: format!("Group '{}' was returned without an id", label),
                    }
                })?
            }
        };

        entra.delete_group(&id).await?;
        if ctx.verbose {
            eprintln!("{} Group '{}' removed", "✓".green(), label);
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct ListApps {}

impl Command for ListApps {
    const NAME: &'static str = "entra list-apps";
    const DEFAULT_PROPERTIES: &'static [&'static str] =
        &["appId", "id", "displayName", "signInAudience"];

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let client = ctx.rest_client()?;
        let apps = EntraClient::new(&client).list_apps().await?;
        ctx.print(&Value::Array(apps), Self::DEFAULT_PROPERTIES)
    }
}

#[derive(Args, Debug)]
pub struct GetApp {
    /// Object id of the app registration
    #[arg(short, long)]
    pub id: Option<String>,

    /// Application (client) id
    #[arg(long)]
    pub app_id: Option<String>,

    /// Display name of the app registration
    #[arg(short, long)]
    pub name: Option<String>,
}

impl Command for GetApp {
    const NAME: &'static str = "entra get-app";

    fn option_sets(&self) -> Vec<OptionSet> {
        vec![
            OptionSet::new()
                .option("id", self.id.is_some())
                .option("app-id", self.app_id.is_some())
                .option("name", self.name.is_some()),
        ]
    }

    async fn validate(&self, _ctx: &CommandContext) -> Result<()> {
        if let Some(id) = &self.id {
            validate_guid("id", id)?;
        }
        if let Some(app_id) = &self.app_id {
            validate_guid("app-id", app_id)?;
        }
        Ok(())
    }

    fn telemetry_properties(&self) -> TelemetryProperties {
        TelemetryProperties::from([
            ("id".into(), used(&self.id)),
            ("appId".into(), used(&self.app_id)),
            ("name".into(), used(&self.name)),
        ])
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let client = ctx.rest_client()?;
        let entra = EntraClient::new(&client);
        let app = match (&self.id, &self.app_id, &self.name) {
            (Some(id), _, _) => entra.get_app(id).await?,
            (None, Some(app_id), _) => entra.get_app_by_app_id(app_id).await?,
            (None, None, name) => {
                entra
                    .get_app_by_name(name.as_deref().unwrap_or_default())
                    .await?
            }
        };
        ctx.print(&app, Self::DEFAULT_PROPERTIES)
    }
}

#[derive(Args, Debug)]
pub struct ListPolicies {
    /// Policy type, or "all"
    #[arg(long = "type")]
    pub policy_type: Option<String>,
}

impl ListPolicies {
    fn allowed_types() -> Vec<&'static str> {
        PolicyType::ALL
            .iter()
            .map(PolicyType::name)
            .chain(std::iter::once("all"))
            .collect()
    }

    fn selected(&self) -> Vec<PolicyType> {
        match self.policy_type.as_deref().and_then(PolicyType::parse) {
            Some(policy_type) => vec![policy_type],
            None => PolicyType::ALL.to_vec(),
        }
    }
}

impl Command for ListPolicies {
    const NAME: &'static str = "entra list-policies";
    const DEFAULT_PROPERTIES: &'static [&'static str] =
        &["id", "displayName", "isOrganizationDefault"];

    async fn validate(&self, _ctx: &CommandContext) -> Result<()> {
        if let Some(policy_type) = &self.policy_type {
            validate_enum("type", policy_type, &Self::allowed_types())?;
        }
        Ok(())
    }

    fn telemetry_properties(&self) -> TelemetryProperties {
        TelemetryProperties::from([(
            "type".into(),
            json!(self.policy_type.as_deref().unwrap_or("all")),
        )])
    }

    async fn action(&self, ctx: &CommandContext) -> Result<()> {
        let client = ctx.rest_client()?;
        let entra = EntraClient::new(&client);

        let mut policies = Vec::new();
        for policy_type in self.selected() {
            policies.extend(entra.list_policies(policy_type).await?);
        }

        ctx.print(&Value::Array(policies), Self::DEFAULT_PROPERTIES)
    }
}
