// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! GitHub-flavored context server.
//!
//! Pre-registers `search_repositories`, `get_repository`, `get_file_contents`
//! and `list_issues`. By default the handlers return synthetic payloads so
//! the server works offline. [`github_server_with_api`] swaps them for calls
//! to the GitHub REST API.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::ContextServer;
use crate::error::ToolError;
use crate::tools::{
    handler_fn, parse_arguments, ParamType, ToolDefinition, ToolHandler, ToolRegistry, ToolSpec,
};

/// Name the GitHub server reports in `initialize`.
pub const GITHUB_SERVER_NAME: &str = "github-mcp-server";

const GITHUB_API_URL: &str = "https://api.github.com";
const DEFAULT_SEARCH_LIMIT: usize = 10;
const DEFAULT_ISSUE_LIMIT: usize = 3;
/// GitHub's `per_page` ceiling. Larger requested limits are clamped to it.
const MAX_PAGE_SIZE: usize = 100;
const HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

fn page_size(limit: Option<usize>, default: usize) -> usize {
    limit.unwrap_or(default).min(MAX_PAGE_SIZE)
}

#[derive(Debug, Deserialize)]
struct RepoArgs {
    owner: String,
    repo: String,
}

#[derive(Debug, Deserialize)]
struct FileArgs {
    owner: String,
    repo: String,
    path: String,
    #[serde(default, rename = "ref")]
    git_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IssueArgs {
    owner: String,
    repo: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

fn definitions() -> [ToolDefinition; 4] {
    [
        ToolDefinition::new("search_repositories", "Search GitHub repositories")
            .with_param("query", ParamType::String)
            .with_param("limit", ParamType::Integer),
        ToolDefinition::new("get_repository", "Get repository details")
            .with_param("owner", ParamType::String)
            .with_param("repo", ParamType::String),
        ToolDefinition::new("get_file_contents", "Get the contents of a file in a repository")
            .with_param("owner", ParamType::String)
            .with_param("repo", ParamType::String)
            .with_param("path", ParamType::String)
            .with_param("ref", ParamType::String),
        ToolDefinition::new("list_issues", "List issues in a repository")
            .with_param("owner", ParamType::String)
            .with_param("repo", ParamType::String)
            .with_param("state", ParamType::String)
            .with_param("limit", ParamType::Integer),
    ]
}

fn mocked_handler(tool: &str) -> Arc<dyn ToolHandler> {
    match tool {
        "search_repositories" => handler_fn(|args| async move {
            let args: SearchArgs = parse_arguments(&args)?;
            Ok(mock_search(&args.query, page_size(args.limit, DEFAULT_SEARCH_LIMIT)))
        }),
        "get_repository" => handler_fn(|args| async move {
            let args: RepoArgs = parse_arguments(&args)?;
            Ok(json!({
                "full_name": format!("{}/{}", args.owner, args.repo),
                "owner": args.owner,
                "name": args.repo,
                "description": "Mock repository",
                "default_branch": "main",
                "stars": 42,
                "open_issues": 3,
                "language": "Rust",
            }))
        }),
        "get_file_contents" => handler_fn(|args| async move {
            let args: FileArgs = parse_arguments(&args)?;
            let content = format!("// Mock contents of {}\n", args.path);
            Ok(json!({
                "repository": format!("{}/{}", args.owner, args.repo),
                "path": args.path,
                "ref": args.git_ref.unwrap_or_else(|| "main".to_string()),
                "size": content.len(),
                "content": content,
            }))
        }),
        _ => handler_fn(|args| async move {
            let args: IssueArgs = parse_arguments(&args)?;
            let state = args.state.unwrap_or_else(|| "open".to_string());
            let issues: Vec<_> = (1..=page_size(args.limit, DEFAULT_ISSUE_LIMIT))
                .map(|number| {
                    json!({
                        "number": number,
                        "title": format!("Mock issue #{number}"),
                        "state": state,
                    })
                })
                .collect();
            Ok(json!({
                "repository": format!("{}/{}", args.owner, args.repo),
                "state": state,
                "issues": issues,
            }))
        }),
    }
}

fn mock_search(query: &str, limit: usize) -> serde_json::Value {
    let results: Vec<_> = (1..=limit)
        .map(|i| {
            json!({
                "name": format!("{query}-repo-{i}"),
                "full_name": format!("example/{query}-repo-{i}"),
                "description": format!("Mock repository {i} matching '{query}'"),
                "stars": 100 * i,
            })
        })
        .collect();
    json!({ "query": query, "total_count": limit, "results": results })
}

fn mocked_registry() -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    for definition in definitions() {
        let handler = mocked_handler(&definition.name);
        registry.register_spec(ToolSpec::new(definition, handler))?;
    }
    Ok(registry)
}

/// Build the GitHub server with mocked handlers.
pub fn github_server() -> Result<ContextServer, ToolError> {
    Ok(ContextServer::with_registry(GITHUB_SERVER_NAME, mocked_registry()?))
}

/// Build the GitHub server with handlers that call the REST API.
///
/// The token is optional; unauthenticated requests work but are heavily
/// rate limited.
pub fn github_server_with_api(token: Option<String>) -> Result<ContextServer, ToolError> {
    let mut registry = mocked_registry()?;
    let api = Arc::new(GitHubApi::new(token)?);

    for definition in definitions() {
        let handler = api_handler(&definition.name, Arc::clone(&api));
        registry.replace(ToolSpec::new(definition, handler));
    }

    Ok(ContextServer::with_registry(GITHUB_SERVER_NAME, registry))
}

fn api_handler(tool: &str, api: Arc<GitHubApi>) -> Arc<dyn ToolHandler> {
    match tool {
        "search_repositories" => handler_fn(move |args| {
            let api = Arc::clone(&api);
            async move {
                let args: SearchArgs = parse_arguments(&args)?;
                api.search_repositories(&args.query, page_size(args.limit, DEFAULT_SEARCH_LIMIT))
                    .await
            }
        }),
        "get_repository" => handler_fn(move |args| {
            let api = Arc::clone(&api);
            async move {
                let args: RepoArgs = parse_arguments(&args)?;
                api.get_json(&format!("/repos/{}/{}", args.owner, args.repo), &[])
                    .await
            }
        }),
        "get_file_contents" => handler_fn(move |args| {
            let api = Arc::clone(&api);
            async move {
                let args: FileArgs = parse_arguments(&args)?;
                api.get_file_contents(&args).await
            }
        }),
        _ => handler_fn(move |args| {
            let api = Arc::clone(&api);
            async move {
                let args: IssueArgs = parse_arguments(&args)?;
                let state = args.state.unwrap_or_else(|| "open".to_string());
                let per_page = page_size(args.limit, 30).to_string();
                let issues = api
                    .get_json(
                        &format!("/repos/{}/{}/issues", args.owner, args.repo),
                        &[("state", state.as_str()), ("per_page", per_page.as_str())],
                    )
                    .await?;
                Ok(json!({
                    "repository": format!("{}/{}", args.owner, args.repo),
                    "state": state,
                    "issues": issues,
                }))
            }
        }),
    }
}

/// Thin GitHub REST client used by the real handlers.
struct GitHubApi {
    client: Client,
    token: Option<String>,
    base_url: String,
}

impl GitHubApi {
    fn new(token: Option<String>) -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .user_agent(format!("agentlink/{}", crate::VERSION))
            .build()?;
        Ok(Self {
            client,
            token,
            base_url: GITHUB_API_URL.to_string(),
        })
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("accept", "application/vnd.github+json");
        if let Some(ref token) = self.token {
            req = req.header("authorization", format!("Bearer {}", token));
        }
        req
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<serde_json::Value, ToolError> {
        debug!(path = %path, "GitHub API request");
        let response = self.request(path).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::ExecutionFailed(format!(
                "GitHub API returned {}: {}",
                status.as_u16(),
                body
            )));
        }
        Ok(response.json().await?)
    }

    async fn search_repositories(&self, query: &str, limit: usize) -> Result<serde_json::Value, ToolError> {
        let per_page = limit.to_string();
        let body = self
            .get_json("/search/repositories", &[("q", query), ("per_page", per_page.as_str())])
            .await?;

        let results: Vec<_> = body["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .take(limit)
                    .map(|item| {
                        json!({
                            "name": item["name"],
                            "full_name": item["full_name"],
                            "description": item["description"],
                            "stars": item["stargazers_count"],
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!({
            "query": query,
            "total_count": body["total_count"],
            "results": results,
        }))
    }

    async fn get_file_contents(&self, args: &FileArgs) -> Result<serde_json::Value, ToolError> {
        let path = format!("/repos/{}/{}/contents/{}", args.owner, args.repo, args.path);
        let mut req = self.request(&path).header("accept", "application/vnd.github.raw");
        if let Some(ref git_ref) = args.git_ref {
            req = req.query(&[("ref", git_ref.as_str())]);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::ExecutionFailed(format!(
                "GitHub API returned {} for {}",
                status.as_u16(),
                args.path
            )));
        }
        let content = response.text().await?;

        Ok(json!({
            "repository": format!("{}/{}", args.owner, args.repo),
            "path": args.path,
            "ref": args.git_ref,
            "size": content.len(),
            "content": content,
        }))
    }
}
