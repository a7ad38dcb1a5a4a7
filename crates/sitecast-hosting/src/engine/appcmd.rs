//! Hosting engine driven through the `appcmd` administration tool.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::command::{describe_output, CommandRunner, DEFAULT_COMMAND_TIMEOUT};
use crate::config::{Binding, PoolConfig, Protocol};
use crate::error::{HostingError, HostingResult};

use super::{HostingEngine, ObjectState, SiteInfo};

const DEFAULT_APPCMD_PATH: &str = r"C:\Windows\System32\inetsrv\appcmd.exe";

/// Application id the engine registers HTTPS certificate bindings under.
const ENGINE_APP_ID: &str = "{4dc3e181-e14b-4a21-b022-59fc669b0914}";

/// Drives the engine by shelling out to `appcmd`, `netsh` and `icacls`.
#[derive(Debug, Clone)]
pub struct AppCmdEngine {
    appcmd: PathBuf,
    timeout: Duration,
}

impl AppCmdEngine {
    /// Locate `appcmd` on `PATH`, falling back to its standard location.
    pub fn new() -> Self {
        let appcmd =
            which::which("appcmd").unwrap_or_else(|_| PathBuf::from(DEFAULT_APPCMD_PATH));
        Self::with_path(appcmd)
    }

    pub fn with_path(appcmd: impl Into<PathBuf>) -> Self {
        Self {
            appcmd: appcmd.into(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn appcmd(&self, args: Vec<String>) -> HostingResult<Output> {
        CommandRunner::run_simple(&self.appcmd, &args, self.timeout).await
    }

    /// Run an `appcmd` command that must succeed.
    async fn appcmd_ok(&self, args: Vec<String>) -> HostingResult<Output> {
        let output = self.appcmd(args.clone()).await?;
        if !output.status.success() {
            return Err(HostingError::engine(format!(
                "appcmd {} failed: {}",
                args.first().map(String::as_str).unwrap_or_default(),
                describe_output(&output)
            )));
        }
        Ok(output)
    }

    async fn run_tool(&self, program: &str, args: Vec<String>) -> HostingResult<()> {
        let output = CommandRunner::run_simple(Path::new(program), &args, self.timeout).await?;
        if !output.status.success() {
            return Err(HostingError::command(format!(
                "{program} failed: {}",
                describe_output(&output)
            )));
        }
        Ok(())
    }
}

impl Default for AppCmdEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Format a duration as the engine's `hh:mm:ss` time span.
fn time_span(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Split an `appcmd list` line of the form `KIND "name" (k:v,k:v)`.
fn parse_list_line(line: &str) -> Option<(String, Vec<(String, String)>)> {
    let start = line.find('"')?;
    let rest = &line[start + 1..];
    let end = rest.find('"')?;
    let name = rest[..end].to_string();

    let attrs = rest[end + 1..]
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')');
    let pairs = attrs
        .split(',')
        .filter_map(|pair| {
            let (k, v) = pair.split_once(':')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .collect();

    Some((name, pairs))
}

/// Parse `appcmd list site` output. Binding values themselves contain
/// `:`, so they are re-joined from the raw attribute text.
fn parse_sites(stdout: &str) -> Vec<(String, ObjectState, Vec<Binding>)> {
    stdout
        .lines()
        .filter(|l| l.trim_start().starts_with("SITE"))
        .filter_map(|line| {
            let (name, _) = parse_list_line(line)?;
            let attrs = line.rsplit_once('(')?.1.trim_end_matches(')');
            let state = attrs
                .split(',')
                .find_map(|p| p.strip_prefix("state:"))
                .map_or(ObjectState::Unknown, ObjectState::parse);
            let bindings = attrs
                .split(',')
                .filter_map(|p| Binding::parse(p.strip_prefix("bindings:").unwrap_or(p)))
                .collect();
            Some((name, state, bindings))
        })
        .collect()
}

/// Parse `appcmd list app` output into `(site, pool)` pairs for root apps.
fn parse_apps(stdout: &str) -> Vec<(String, String)> {
    stdout
        .lines()
        .filter(|l| l.trim_start().starts_with("APP "))
        .filter_map(|line| {
            let (path, attrs) = parse_list_line(line)?;
            let site = path.strip_suffix('/')?.to_string();
            let pool = attrs
                .into_iter()
                .find(|(k, _)| k == "applicationPool")
                .map(|(_, v)| v)?;
            Some((site, pool))
        })
        .collect()
}

/// Parse `appcmd list apppool` output into `(pool, state)` pairs.
fn parse_pools(stdout: &str) -> Vec<(String, ObjectState)> {
    stdout
        .lines()
        .filter(|l| l.trim_start().starts_with("APPPOOL"))
        .filter_map(|line| {
            let (name, attrs) = parse_list_line(line)?;
            let state = attrs
                .into_iter()
                .find(|(k, _)| k == "state")
                .map_or(ObjectState::Unknown, |(_, v)| ObjectState::parse(&v));
            Some((name, state))
        })
        .collect()
}

#[async_trait]
impl HostingEngine for AppCmdEngine {
    async fn is_installed(&self) -> HostingResult<bool> {
        if !tokio::fs::try_exists(&self.appcmd).await.unwrap_or(false) {
            debug!(path = %self.appcmd.display(), "appcmd not found");
            return Ok(false);
        }
        Ok(self.appcmd(args(["list", "apppool"])).await?.status.success())
    }

    async fn pool_exists(&self, name: &str) -> HostingResult<bool> {
        let output = self
            .appcmd(vec!["list".into(), "apppool".into(), format!("/name:{name}")])
            .await?;
        Ok(output.status.success() && !output.stdout.is_empty())
    }

    async fn create_pool(&self, config: &PoolConfig) -> HostingResult<()> {
        info!(pool = %config.name, runtime = %config.runtime_version, pipeline = %config.pipeline_mode, "creating process pool");

        let output = self
            .appcmd(vec![
                "add".into(),
                "apppool".into(),
                format!("/name:{}", config.name),
                format!("/managedRuntimeVersion:{}", config.runtime_version),
                format!("/managedPipelineMode:{}", config.pipeline_mode),
            ])
            .await?;
        if !output.status.success() {
            return Err(HostingError::PoolConfiguration(format!(
                "pool {}: {}",
                config.name,
                describe_output(&output)
            )));
        }

        let mut settings = vec![
            "set".to_string(),
            "apppool".to_string(),
            format!("/apppool.name:{}", config.name),
            format!("/processModel.idleTimeout:{}", time_span(config.idle_timeout)),
            format!(
                "/startMode:{}",
                if config.always_running {
                    "AlwaysRunning"
                } else {
                    "OnDemand"
                }
            ),
        ];
        if let Some(identity) = &config.identity {
            settings.push("/processModel.identityType:SpecificUser".into());
            settings.push(format!("/processModel.userName:{}", identity.username));
            settings.push(format!("/processModel.password:{}", identity.password));
        }
        let output = self.appcmd(settings).await?;
        if !output.status.success() {
            return Err(HostingError::PoolConfiguration(format!(
                "pool {}: {}",
                config.name,
                describe_output(&output)
            )));
        }

        Ok(())
    }

    async fn delete_pool(&self, name: &str) -> HostingResult<()> {
        self.appcmd_ok(vec![
            "delete".into(),
            "apppool".into(),
            format!("/apppool.name:{name}"),
        ])
        .await
        .map(drop)
    }

    async fn site_exists(&self, name: &str) -> HostingResult<bool> {
        let output = self
            .appcmd(vec!["list".into(), "site".into(), format!("/name:{name}")])
            .await?;
        Ok(output.status.success() && !output.stdout.is_empty())
    }

    async fn create_site(
        &self,
        name: &str,
        physical_path: &Path,
        pool_name: &str,
    ) -> HostingResult<()> {
        self.appcmd_ok(vec![
            "add".into(),
            "site".into(),
            format!("/name:{name}"),
            format!("/physicalPath:{}", physical_path.display()),
        ])
        .await?;
        self.appcmd_ok(vec![
            "set".into(),
            "app".into(),
            format!("{name}/"),
            format!("/applicationPool:{pool_name}"),
        ])
        .await
        .map(drop)
    }

    async fn delete_site(&self, name: &str) -> HostingResult<()> {
        let output = self
            .appcmd(vec!["delete".into(), "site".into(), format!("/site.name:{name}")])
            .await?;
        if !output.status.success() {
            return Err(HostingError::SiteNotFound(format!(
                "{name}: {}",
                describe_output(&output)
            )));
        }
        Ok(())
    }

    async fn clear_bindings(&self, site: &str) -> HostingResult<()> {
        self.appcmd_ok(vec![
            "set".into(),
            "site".into(),
            format!("/site.name:{site}"),
            "/-bindings".into(),
        ])
        .await
        .map(drop)
    }

    async fn add_binding(&self, site: &str, binding: &Binding) -> HostingResult<()> {
        self.appcmd_ok(vec![
            "set".into(),
            "site".into(),
            format!("/site.name:{site}"),
            format!(
                "/+bindings.[protocol='{}',bindingInformation='{}']",
                binding.protocol.as_str(),
                binding.information()
            ),
        ])
        .await
        .map(drop)
    }

    async fn attach_certificate(
        &self,
        site: &str,
        binding: &Binding,
        thumbprint: &str,
    ) -> HostingResult<()> {
        if binding.protocol != Protocol::Https {
            return Err(HostingError::CertificateAttach(format!(
                "{site}: binding {binding} is not https"
            )));
        }

        let endpoint = if binding.host.is_empty() {
            format!("ipport=0.0.0.0:{}", binding.port)
        } else {
            format!("hostnameport={}:{}", binding.host, binding.port)
        };

        self.run_tool(
            "netsh",
            vec![
                "http".into(),
                "add".into(),
                "sslcert".into(),
                endpoint,
                format!("certhash={thumbprint}"),
                format!("appid={ENGINE_APP_ID}"),
                "certstorename=MY".into(),
            ],
        )
        .await
        .map_err(|e| HostingError::CertificateAttach(format!("{site}: {e}")))
    }

    async fn start_site(&self, name: &str) -> HostingResult<()> {
        self.appcmd_ok(vec!["start".into(), "site".into(), format!("/site.name:{name}")])
            .await
            .map(drop)
    }

    async fn stop_site(&self, name: &str) -> HostingResult<()> {
        self.appcmd_ok(vec!["stop".into(), "site".into(), format!("/site.name:{name}")])
            .await
            .map(drop)
    }

    async fn grant_modify(&self, path: &Path, identity: &str) -> HostingResult<()> {
        self.run_tool(
            "icacls",
            vec![
                path.display().to_string(),
                "/grant".into(),
                format!("{identity}:(OI)(CI)M"),
                "/T".into(),
                "/Q".into(),
            ],
        )
        .await
    }

    async fn list_sites(&self) -> HostingResult<Vec<SiteInfo>> {
        let sites = self.appcmd_ok(args(["list", "site"])).await?;
        let apps = self.appcmd_ok(args(["list", "app"])).await?;
        let pools = self.appcmd_ok(args(["list", "apppool"])).await?;

        let apps = parse_apps(&String::from_utf8_lossy(&apps.stdout));
        let pools = parse_pools(&String::from_utf8_lossy(&pools.stdout));

        Ok(parse_sites(&String::from_utf8_lossy(&sites.stdout))
            .into_iter()
            .map(|(name, state, bindings)| {
                let pool_name = apps
                    .iter()
                    .find(|(site, _)| *site == name)
                    .map(|(_, pool)| pool.clone());
                let pool_state = pool_name
                    .as_ref()
                    .and_then(|p| pools.iter().find(|(n, _)| n == p))
                    .map_or(ObjectState::Unknown, |(_, s)| *s);
                SiteInfo {
                    name,
                    state,
                    pool_name,
                    pool_state,
                    physical_path: None,
                    bindings,
                }
            })
            .collect())
    }
}
