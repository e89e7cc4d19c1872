use anyhow::{Context, Result};
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{debug, info, warn};

const PER_PAGE: usize = 100;

/// Whose repositories to list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountKind {
    User,
    Organization,
}

/// Repository record as returned by the GitHub REST API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRepo {
    pub name: String,
    pub full_name: String,
    pub clone_url: String,
    pub ssh_url: String,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub default_branch: Option<String>,
}

impl RemoteRepo {
    /// Owner part of `full_name`
    pub fn owner(&self) -> &str {
        self.full_name
            .split_once('/')
            .map(|(owner, _)| owner)
            .unwrap_or(&self.full_name)
    }
}

#[derive(Debug, Serialize)]
struct ListParams<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    per_page: usize,
    page: u32,
}

/// GitHub client wrapper used for repository listing
pub struct GitHubClient {
    client: Octocrab,
    authenticated: bool,
}

impl GitHubClient {
    /// Create a client, authenticated when a token is given
    pub fn new(token: Option<String>) -> Result<Self> {
        Self::build(None, token)
    }

    /// Create a client using `GITHUB_TOKEN` if it is set
    pub fn from_env() -> Result<Self> {
        let token = env::var("GITHUB_TOKEN").ok().filter(|t| !t.trim().is_empty());
        Self::new(token)
    }

    /// Create a client talking to a different API root (GitHub Enterprise, tests)
    pub fn with_base_uri(base_uri: &str, token: Option<String>) -> Result<Self> {
        Self::build(Some(base_uri), token)
    }

    fn build(base_uri: Option<&str>, token: Option<String>) -> Result<Self> {
        let mut builder = Octocrab::builder();
        if let Some(uri) = base_uri {
            builder = builder
                .base_uri(uri)
                .with_context(|| format!("Invalid GitHub API base URI: {}", uri))?;
        }

        let authenticated = token.is_some();
        let client = match token {
            Some(token) => builder.personal_token(token).build(),
            None => {
                warn!("GITHUB_TOKEN is not set; anonymous GitHub API access is limited to 60 requests per hour");
                builder.build()
            }
        }
        .context("Failed to create GitHub client")?;

        Ok(Self {
            client,
            authenticated,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// List every repository of a user or organization, following pagination
    pub async fn list_repositories(&self, account: &str, kind: AccountKind) -> Result<Vec<RemoteRepo>> {
        let (route, repo_type) = match kind {
            AccountKind::User => (format!("/users/{}/repos", account), "owner"),
            AccountKind::Organization => (format!("/orgs/{}/repos", account), "all"),
        };
        debug!("Fetching repositories from {}", route);

        let mut repositories = Vec::new();
        let mut page = 1u32;

        loop {
            let params = ListParams {
                kind: repo_type,
                per_page: PER_PAGE,
                page,
            };
            let items: Vec<RemoteRepo> = self
                .client
                .get(&route, Some(&params))
                .await
                .with_context(|| format!("Failed to fetch repositories for {} page {}", account, page))?;

            let count = items.len();
            repositories.extend(items);

            if count < PER_PAGE {
                break;
            }
            page += 1;
        }

        info!("Found {} repositories for {}", repositories.len(), account);
        Ok(repositories)
    }
}
