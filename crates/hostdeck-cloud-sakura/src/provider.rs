//! Sakura Cloud provider agent implementation

use crate::usacloud::{CreateServerConfig, ServerInfo, Usacloud};
use async_trait::async_trait;
use hostdeck_cloud::{
    Account, AccountId, AgentFactory, AuthStatus, CloudError, DeployRequest, Instance, InstanceId,
    InstanceStatus, ProviderAgent, SshKey,
};
use std::sync::Arc;

pub const PROVIDER: &str = "sakura";

/// Zone used when neither the account nor the request names one
pub const DEFAULT_ZONE: &str = "is1a";

/// Parse plan string like "2core-4gb" to (core, memory_gb)
fn parse_plan(plan: Option<&str>) -> (i32, i32) {
    if let Some(p) = plan {
        let parts: Vec<&str> = p.split('-').collect();
        if parts.len() == 2 {
            let core = parts[0]
                .trim_end_matches("core")
                .parse::<i32>()
                .unwrap_or(1);
            let memory = parts[1].trim_end_matches("gb").parse::<i32>().unwrap_or(1);
            return (core, memory);
        }
    }
    (1, 1)
}

/// Map usacloud's instance status and availability onto the normalized set
fn normalize_status(instance_status: Option<&str>, availability: Option<&str>) -> InstanceStatus {
    if availability == Some("migrating") {
        return InstanceStatus::Installing;
    }
    match instance_status {
        Some("up") => InstanceStatus::Running,
        Some("down") => InstanceStatus::Stopped,
        Some("cleaning") => InstanceStatus::Pending,
        Some(raw) => InstanceStatus::Other(raw.to_string()),
        None => InstanceStatus::Pending,
    }
}

/// Sakura Cloud agent bound to one account
pub struct SakuraAgent {
    account_id: AccountId,
    usacloud: Usacloud,
}

impl SakuraAgent {
    pub fn new(account_id: AccountId, usacloud: Usacloud) -> Self {
        Self {
            account_id,
            usacloud,
        }
    }

    fn to_instance(&self, server: ServerInfo) -> Instance {
        let status = normalize_status(
            server.instance_status.as_deref(),
            server.availability.as_deref(),
        );
        let mut instance = Instance::new(
            InstanceId::new(PROVIDER, &server.id),
            self.account_id.clone(),
            server.name.clone(),
            status,
        );

        instance.ipv4 = server.ip_address();
        instance.power_state = server.instance_status.clone();
        instance.server_state = server.availability.clone();
        instance.location = Some(
            server
                .zone
                .as_ref()
                .map(|z| z.name.clone())
                .unwrap_or_else(|| self.usacloud.zone().to_string()),
        );
        if let (Some(cpu), Some(memory_mb)) = (server.cpu, server.memory_mb) {
            instance.plan = Some(format!("{}core-{}gb", cpu, memory_mb / 1024));
        }
        if let Some(cpu) = server.cpu {
            instance.extra.insert("cpu".into(), serde_json::json!(cpu));
        }
        if let Some(memory) = server.memory_mb {
            instance
                .extra
                .insert("memory_mb".into(), serde_json::json!(memory));
        }
        instance
    }

    /// An agent lists one zone, so it only deploys into that zone
    fn deploy_zone(&self, request: &DeployRequest) -> hostdeck_cloud::Result<()> {
        match request.region.as_deref() {
            Some(region) if region != self.usacloud.zone() => Err(CloudError::unsupported(
                PROVIDER,
                format!(
                    "deploy to zone {} from an account bound to {}",
                    region,
                    self.usacloud.zone()
                ),
            )),
            _ => Ok(()),
        }
    }

    fn native_id<'a>(&self, id: &'a InstanceId) -> hostdeck_cloud::Result<&'a str> {
        if id.provider() != PROVIDER {
            return Err(CloudError::InstanceNotFound(id.to_string()));
        }
        Ok(id.native_id())
    }
}

#[async_trait]
impl ProviderAgent for SakuraAgent {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn display_name(&self) -> &str {
        "さくらのクラウド"
    }

    async fn check_auth(&self) -> hostdeck_cloud::Result<AuthStatus> {
        match self.usacloud.check_auth().await {
            Ok(auth) => {
                let account_info = auth
                    .account
                    .map(|a| format!("{} ({})", a.name, a.id))
                    .unwrap_or_else(|| "Unknown".to_string());
                Ok(AuthStatus::ok(account_info))
            }
            Err(crate::SakuraError::UsacloudNotFound) => {
                Ok(AuthStatus::failed("usacloud がインストールされていません"))
            }
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn list_instances(&self) -> hostdeck_cloud::Result<Vec<Instance>> {
        let servers = self.usacloud.list_servers().await?;
        Ok(servers.into_iter().map(|s| self.to_instance(s)).collect())
    }

    async fn get_instance(&self, id: &InstanceId) -> hostdeck_cloud::Result<Instance> {
        let server = self.usacloud.read_server(self.native_id(id)?).await?;
        Ok(self.to_instance(server))
    }

    async fn start(&self, id: &InstanceId) -> hostdeck_cloud::Result<()> {
        self.usacloud.power_on(self.native_id(id)?).await?;
        Ok(())
    }

    async fn stop(&self, id: &InstanceId) -> hostdeck_cloud::Result<()> {
        self.usacloud.power_off(self.native_id(id)?).await?;
        Ok(())
    }

    async fn restart(&self, id: &InstanceId) -> hostdeck_cloud::Result<()> {
        self.usacloud.reset(self.native_id(id)?).await?;
        Ok(())
    }

    async fn destroy(&self, id: &InstanceId) -> hostdeck_cloud::Result<()> {
        self.usacloud.delete_server(self.native_id(id)?).await?;
        Ok(())
    }

    async fn deploy(&self, request: &DeployRequest) -> hostdeck_cloud::Result<InstanceId> {
        self.deploy_zone(request)?;
        let (core, memory) = parse_plan(request.plan.as_deref());
        let config = CreateServerConfig {
            name: request.name.clone(),
            core,
            memory,
            disk_size: request.get_option::<i32>("disk_size"),
            os_type: request.image.clone(),
            ssh_key_ids: request.ssh_key_ids.clone(),
        };

        let server = self.usacloud.create_server(&config).await?;
        tracing::info!("Created Sakura server {} ({})", server.name, server.id);
        Ok(InstanceId::new(PROVIDER, &server.id))
    }

    async fn ssh_keys(&self) -> hostdeck_cloud::Result<Vec<SshKey>> {
        let keys = self.usacloud.list_ssh_keys().await?;
        Ok(keys
            .into_iter()
            .map(|k| SshKey {
                id: k.id,
                name: k.name,
                public_key: k.public_key.unwrap_or_default(),
            })
            .collect())
    }

    /// A server is settled only once its disk migration has finished too
    fn is_settled(&self, instance: &Instance) -> bool {
        instance.status.is_stable()
            && matches!(instance.server_state.as_deref(), None | Some("available"))
    }
}

/// Builds a [`SakuraAgent`] from a persisted account
#[derive(Debug, Clone)]
pub struct SakuraAgentFactory {
    default_zone: String,
}

impl SakuraAgentFactory {
    pub fn new(default_zone: impl Into<String>) -> Self {
        Self {
            default_zone: default_zone.into(),
        }
    }
}

impl Default for SakuraAgentFactory {
    fn default() -> Self {
        Self::new(DEFAULT_ZONE)
    }
}

impl AgentFactory for SakuraAgentFactory {
    fn build(&self, account: &Account) -> hostdeck_cloud::Result<Arc<dyn ProviderAgent>> {
        if account.provider != PROVIDER {
            return Err(CloudError::unsupported(
                account.provider.clone(),
                "sakura agent construction",
            ));
        }
        let zone = account
            .settings
            .default_region
            .clone()
            .unwrap_or_else(|| self.default_zone.clone());
        let usacloud = Usacloud::new(
            zone,
            account.credentials.token.clone(),
            account.credentials.secret.clone(),
        );
        Ok(Arc::new(SakuraAgent::new(account.id.clone(), usacloud)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usacloud::{InterfaceInfo, ZoneInfo};
    use hostdeck_cloud::Credentials;

    fn agent() -> SakuraAgent {
        SakuraAgent::new(
            AccountId::from("sakura-test"),
            Usacloud::new("tk1a", "token", None),
        )
    }

    fn server(status: &str, availability: &str) -> ServerInfo {
        ServerInfo {
            id: "113100000001".to_string(),
            name: "web-01".to_string(),
            cpu: Some(2),
            memory_mb: Some(4096),
            instance_status: Some(status.to_string()),
            availability: Some(availability.to_string()),
            zone: Some(ZoneInfo {
                name: "is1a".to_string(),
            }),
            interfaces: Some(vec![InterfaceInfo {
                ip_address: Some("203.0.113.10".to_string()),
            }]),
        }
    }

    #[test]
    fn test_parse_plan() {
        assert_eq!(parse_plan(Some("2core-4gb")), (2, 4));
        assert_eq!(parse_plan(Some("4core-8gb")), (4, 8));
        assert_eq!(parse_plan(Some("bogus")), (1, 1));
        assert_eq!(parse_plan(None), (1, 1));
    }

    #[test]
    fn test_normalize_status() {
        assert_eq!(
            normalize_status(Some("up"), Some("available")),
            InstanceStatus::Running
        );
        assert_eq!(normalize_status(Some("down"), None), InstanceStatus::Stopped);
        assert_eq!(
            normalize_status(Some("cleaning"), None),
            InstanceStatus::Pending
        );
        assert_eq!(
            normalize_status(Some("down"), Some("migrating")),
            InstanceStatus::Installing
        );
        assert_eq!(
            normalize_status(Some("unknown"), None),
            InstanceStatus::Other("unknown".to_string())
        );
    }

    #[test]
    fn test_to_instance() {
        let instance = agent().to_instance(server("up", "available"));

        assert_eq!(instance.id.as_str(), "sakura:113100000001");
        assert_eq!(instance.account_id.as_str(), "sakura-test");
        assert_eq!(instance.status, InstanceStatus::Running);
        assert_eq!(instance.ipv4.as_deref(), Some("203.0.113.10"));
        assert_eq!(instance.location.as_deref(), Some("is1a"));
        assert_eq!(instance.plan.as_deref(), Some("2core-4gb"));
        assert_eq!(instance.extra["cpu"], serde_json::json!(2));
    }

    #[test]
    fn test_settled_requires_available_disk() {
        let agent = agent();
        assert!(agent.is_settled(&agent.to_instance(server("up", "available"))));
        assert!(!agent.is_settled(&agent.to_instance(server("up", "failed"))));
        assert!(!agent.is_settled(&agent.to_instance(server("cleaning", "available"))));
    }

    #[test]
    fn test_foreign_instance_id_is_not_found() {
        let agent = agent();
        let err = agent
            .native_id(&InstanceId::new("vultr", "abc"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_factory_uses_account_region() {
        let factory = SakuraAgentFactory::default();
        let account = Account::new(PROVIDER, "main", Credentials::new("t", Some("s".into())))
            .with_region("tk1b");
        let agent = factory.build(&account).unwrap();
        assert_eq!(agent.provider(), PROVIDER);

        let other = Account::new("vultr", "other", Credentials::new("t", None));
        assert!(factory.build(&other).is_err());
    }

    #[test]
    fn test_reinstall_is_unsupported() {
        let result = tokio_test::block_on(agent().reinstall(&InstanceId::new(PROVIDER, "1")));
        assert!(matches!(
            result,
            Err(CloudError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_deploy_zone_must_match_account_zone() {
        let agent = agent();
        assert!(agent.deploy_zone(&DeployRequest::new("web")).is_ok());

        let same = DeployRequest {
            region: Some("tk1a".to_string()),
            ..DeployRequest::new("web")
        };
        assert!(agent.deploy_zone(&same).is_ok());

        let other = DeployRequest {
            region: Some("is1b".to_string()),
            ..DeployRequest::new("web")
        };
        assert!(matches!(
            tokio_test::block_on(agent.deploy(&other)),
            Err(CloudError::UnsupportedOperation { .. })
        ));
    }
}
