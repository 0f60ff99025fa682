//! Credential resolution and session establishment
//!
//! Resolution order per org type: access token from the environment, then
//! username/password (+ security token) via SOAP login, then the `sf` CLI.

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use super::soap;
use crate::config::{Config, OrgType};

/// An authenticated REST session
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub instance_url: String,
    pub access_token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Credentials {
    AccessToken {
        instance_url: String,
        access_token: String,
    },
    Password {
        login_url: String,
        username: String,
        password: String,
        security_token: String,
    },
    SfCli {
        target_org: Option<String>,
    },
}

impl Credentials {
    /// Pick credentials for an org type from the environment and config
    pub fn resolve(org_type: OrgType, config: &Config) -> Self {
        Self::resolve_with(org_type, config, |name| std::env::var(name).ok())
    }

    fn resolve_with(
        org_type: OrgType,
        config: &Config,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let prefix = org_type.env_prefix();
        let var = |suffix: &str| env(&format!("{}_{}", prefix, suffix)).filter(|v| !v.is_empty());
        let org = config.org(org_type);

        let instance_url = var("INSTANCE_URL").or(org.instance_url);
        if let (Some(access_token), Some(instance_url)) = (var("ACCESS_TOKEN"), instance_url) {
            return Credentials::AccessToken {
                instance_url: instance_url.trim_end_matches('/').to_string(),
                access_token,
            };
        }

        if let (Some(username), Some(password)) = (var("USERNAME"), var("PASSWORD")) {
            return Credentials::Password {
                login_url: var("LOGIN_URL").unwrap_or_else(|| config.login_url.clone()),
                username,
                password,
                security_token: var("SECURITY_TOKEN").unwrap_or_default(),
            };
        }

        Credentials::SfCli {
            target_org: var("TARGET_ORG").or(org.target_org),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Credentials::AccessToken { instance_url, .. } => {
                format!("access token for {}", instance_url)
            }
            Credentials::Password { username, .. } => format!("SOAP login as {}", username),
            Credentials::SfCli { target_org: Some(alias) } => format!("sf CLI org '{}'", alias),
            Credentials::SfCli { target_org: None } => "sf CLI default org".to_string(),
        }
    }

    /// Exchange the credentials for a session
    pub async fn authenticate(&self, http: &reqwest::Client, api_version: &str) -> Result<Session> {
        log::info!("Authenticating with {}", self.describe());

        match self {
            Credentials::AccessToken {
                instance_url,
                access_token,
            } => Ok(Session {
                instance_url: instance_url.clone(),
                access_token: access_token.clone(),
            }),
            Credentials::Password {
                login_url,
                username,
                password,
                security_token,
            } => {
                soap_login(
                    http,
                    login_url,
                    api_version,
                    username,
                    &format!("{}{}", password, security_token),
                )
                .await
            }
            Credentials::SfCli { target_org } => sf_cli_session(target_org.as_deref()).await,
        }
    }
}

async fn soap_login(
    http: &reqwest::Client,
    login_url: &str,
    api_version: &str,
    username: &str,
    password: &str,
) -> Result<Session> {
    let url = format!("{}/services/Soap/u/{}", login_url.trim_end_matches('/'), api_version);

    let response = http
        .post(&url)
        .header("Content-Type", "text/xml; charset=UTF-8")
        .header("SOAPAction", "login")
        .body(soap::login_envelope(username, password))
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", url))?;

    let status = response.status().as_u16();
    let body = response.text().await.context("Failed to read login response")?;
    let login = soap::parse_login_response(status, &body).context("SOAP login failed")?;

    Ok(Session {
        instance_url: login.instance_url(),
        access_token: login.session_id,
    })
}

#[derive(Debug, Deserialize)]
struct SfOrgDisplay {
    status: i32,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    result: Option<SfOrgDisplayResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SfOrgDisplayResult {
    access_token: String,
    instance_url: String,
}

fn parse_sf_org_display(output: &str) -> Result<Session> {
    let display: SfOrgDisplay =
        serde_json::from_str(output).context("Unexpected output from `sf org display`")?;

    match display.result {
        Some(result) if display.status == 0 => Ok(Session {
            instance_url: result.instance_url.trim_end_matches('/').to_string(),
            access_token: result.access_token,
        }),
        _ => bail!(
            "`sf org display` failed: {}",
            display.message.unwrap_or_else(|| "no result".to_string())
        ),
    }
}

async fn sf_cli_session(target_org: Option<&str>) -> Result<Session> {
    let mut command = tokio::process::Command::new("sf");
    command.args(["org", "display", "--json"]);
    if let Some(alias) = target_org {
        command.args(["--target-org", alias]);
    }

    let output = command
        .output()
        .await
        .context("Failed to run the `sf` CLI (is it installed and on PATH?)")?;

    // sf prints its JSON to stdout even on failure
    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_sf_org_display(&stdout)
}
