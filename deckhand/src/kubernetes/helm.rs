//! Helm releases and chart lookup.
//!
//! Releases are managed through the `helm` binary. The chart URL a release
//! was installed from is stored in its values under [`CHART_URL_KEY`] so that
//! upgrades can find the chart again.

use super::KubeError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tracing::debug;

pub const CHART_URL_KEY: &str = "metadata_chart_url";
pub const ARTIFACT_HUB_URL: &str = "https://artifacthub.io";

/// Runs an external program and hands back its stdout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<String, KubeError>;
}

fn command_label(program: &str, args: &[String]) -> String {
    match args.first() {
        Some(sub) => format!("{} {}", program, sub),
        None => program.to_string(),
    }
}

/// Spawns the program as a child process.
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<String, KubeError> {
        debug!("Running {} {}", program, args.join(" "));
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| KubeError::Helm {
                command: command_label(program, args),
                message: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(KubeError::Helm {
                command: command_label(program, args),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Replays canned outputs in order and records every invocation.
#[derive(Default)]
pub struct ScriptedRunner {
    outputs: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new<I, S>(outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            outputs: Mutex::new(outputs.into_iter().map(|o| Ok(o.into())).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a failing invocation.
    pub fn then_fail(self, stderr: impl Into<String>) -> Self {
        if let Ok(mut outputs) = self.outputs.lock() {
            outputs.push_back(Err(stderr.into()));
        }
        self
    }

    /// Arguments of every invocation so far, program first.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<String, KubeError> {
        if let Ok(mut calls) = self.calls.lock() {
            let mut call = vec![program.to_string()];
            call.extend(args.iter().cloned());
            calls.push(call);
        }
        let next = self.outputs.lock().ok().and_then(|mut o| o.pop_front());
        match next {
            Some(Ok(stdout)) => Ok(stdout),
            Some(Err(message)) => Err(KubeError::Helm {
                command: command_label(program, args),
                message,
            }),
            None => Ok(String::new()),
        }
    }
}

/// Drop comment and blank lines from a values file.
pub fn strip_comments(values: &str) -> String {
    values
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Chart URL stored in release values under [`CHART_URL_KEY`].
pub fn recorded_chart_url(values_yaml: &str) -> Result<String, KubeError> {
    let parsed: Value = serde_yaml::from_str(values_yaml).unwrap_or(Value::Null);
    parsed
        .get(CHART_URL_KEY)
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .ok_or(KubeError::MissingChartUrl)
}

fn namespace_args(namespace: &str) -> Vec<String> {
    match namespace.trim() {
        "" => Vec::new(),
        super::ALL_NAMESPACES => vec!["--all-namespaces".to_string()],
        ns => vec!["--namespace".to_string(), ns.to_string()],
    }
}

fn args<const N: usize>(fixed: [&str; N]) -> Vec<String> {
    fixed.iter().map(|s| s.to_string()).collect()
}

/// Helm CLI wrapper.
#[derive(Clone)]
pub struct Helm {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    values_dir: PathBuf,
}

impl Helm {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            runner: Arc::new(ProcessRunner),
            binary: binary.into(),
            values_dir: std::env::temp_dir().join("deckhand"),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Directory the generated values files are written to.
    pub fn with_values_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.values_dir = dir.into();
        self
    }

    async fn helm(&self, args: Vec<String>) -> Result<String, KubeError> {
        self.runner.run(&self.binary, &args).await
    }

    /// Default values of a chart, without comments.
    pub async fn show_values(&self, chart_url: &str) -> Result<String, KubeError> {
        let out = self.helm(args(["show", "values", chart_url])).await?;
        Ok(strip_comments(&out))
    }

    /// User-supplied values of a release as YAML text.
    pub async fn release_values(&self, namespace: &str, name: &str) -> Result<String, KubeError> {
        let mut cmd = args(["get", "values", name, "-o", "yaml"]);
        cmd.extend(namespace_args(namespace));
        self.helm(cmd).await
    }

    /// Chart URL recorded in a release's values.
    pub async fn release_chart_url(&self, namespace: &str, name: &str) -> Result<String, KubeError> {
        let values = self.release_values(namespace, name).await?;
        recorded_chart_url(&values)
    }

    /// Write `values` plus the chart URL marker and return the file path.
    async fn write_values(
        &self,
        name: &str,
        chart_url: &str,
        values: &Map<String, Value>,
    ) -> Result<PathBuf, KubeError> {
        let mut values = values.clone();
        values.insert(CHART_URL_KEY.to_string(), Value::String(chart_url.to_string()));
        let yaml = serde_yaml::to_string(&values).map_err(|e| KubeError::Manifest(e.to_string()))?;

        let io_error = |e: std::io::Error| KubeError::Helm {
            command: "write values".to_string(),
            message: e.to_string(),
        };
        tokio::fs::create_dir_all(&self.values_dir)
            .await
            .map_err(io_error)?;
        let path = self.values_dir.join(format!("{}-values.yaml", name));
        tokio::fs::write(&path, yaml).await.map_err(io_error)?;
        Ok(path)
    }

    async fn values_args(
        &self,
        name: &str,
        chart_url: &str,
        values: &Map<String, Value>,
    ) -> Result<Vec<String>, KubeError> {
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let path = self.write_values(name, chart_url, values).await?;
        Ok(vec!["-f".to_string(), path.to_string_lossy().into_owned()])
    }

    pub async fn install(
        &self,
        namespace: &str,
        name: &str,
        chart_url: &str,
        values: &Map<String, Value>,
    ) -> Result<(), KubeError> {
        let mut cmd = args(["install", name, chart_url]);
        cmd.extend(namespace_args(namespace));
        cmd.extend(self.values_args(name, chart_url, values).await?);
        let out = self.helm(cmd).await?;
        debug!("helm install output: {}", out);
        Ok(())
    }

    /// Upgrade a release with the chart it was installed from.
    pub async fn upgrade(
        &self,
        namespace: &str,
        name: &str,
        values: &Map<String, Value>,
    ) -> Result<(), KubeError> {
        let chart_url = self.release_chart_url(namespace, name).await?;
        let mut cmd = args(["upgrade", name, &chart_url]);
        cmd.extend(namespace_args(namespace));
        cmd.extend(self.values_args(name, &chart_url, values).await?);
        let out = self.helm(cmd).await?;
        debug!("helm upgrade output: {}", out);
        Ok(())
    }

    /// Every release, failed and pending ones included.
    pub async fn list(&self, namespace: &str) -> Result<Vec<Value>, KubeError> {
        let mut cmd = args(["list", "--all", "-o", "json"]);
        cmd.extend(namespace_args(namespace));
        let out = self.helm(cmd).await?;
        serde_json::from_str(&out).map_err(|e| KubeError::Helm {
            command: "helm list".to_string(),
            message: format!("unexpected output: {}", e),
        })
    }

    /// Release status with its resources; chart notes are cut off.
    pub async fn status(&self, namespace: &str, name: &str) -> Result<String, KubeError> {
        let mut cmd = args(["status", name, "--show-resources"]);
        cmd.extend(namespace_args(namespace));
        let mut out = self.helm(cmd).await?;
        if let Some(index) = out.find("NOTES:") {
            out.truncate(index);
        }
        Ok(out)
    }

    pub async fn manifest(&self, namespace: &str, name: &str) -> Result<String, KubeError> {
        let mut cmd = args(["get", "manifest", name]);
        cmd.extend(namespace_args(namespace));
        self.helm(cmd).await
    }

    pub async fn uninstall(&self, namespace: &str, name: &str) -> Result<(), KubeError> {
        let mut cmd = args(["uninstall", name]);
        cmd.extend(namespace_args(namespace));
        let out = self.helm(cmd).await?;
        debug!("helm uninstall output: {}", out);
        Ok(())
    }
}

/// Chart picked from a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSummary {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub content_url: String,
}

#[derive(Deserialize)]
struct SearchResults {
    #[serde(default)]
    packages: Vec<PackageRef>,
}

#[derive(Deserialize)]
struct PackageRef {
    name: String,
    version: String,
    repository: RepositoryRef,
}

#[derive(Deserialize)]
struct RepositoryRef {
    name: String,
}

/// Artifact Hub package search.
#[derive(Debug, Clone)]
pub struct ArtifactHub {
    http: reqwest::Client,
    base_url: String,
}

impl ArtifactHub {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, KubeError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await
            .map_err(|e| KubeError::Search(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(KubeError::Search(format!("HTTP {}: {}", status.as_u16(), body)));
        }
        response
            .json()
            .await
            .map_err(|e| KubeError::Search(e.to_string()))
    }

    /// Most relevant chart from a verified publisher.
    pub async fn search(&self, keyword: &str) -> Result<ChartSummary, KubeError> {
        let results: SearchResults = self
            .get_json(
                "/api/v1/packages/search",
                &[
                    ("facets", "false"),
                    ("verified_publisher", "true"),
                    ("kind", "0"),
                    ("sort", "relevance"),
                    ("ts_query_web", keyword),
                ],
            )
            .await?;
        let package = results
            .packages
            .into_iter()
            .next()
            .ok_or_else(|| KubeError::Search("no matching helm chart found".to_string()))?;

        let path = format!(
            "/api/v1/packages/helm/{}/{}/{}",
            urlencoding::encode(&package.repository.name),
            urlencoding::encode(&package.name),
            urlencoding::encode(&package.version)
        );
        self.get_json(&path, &[]).await
    }
}
