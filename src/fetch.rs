//! Fetch execution
//!
//! [`Fetcher`] is the seam between the pipeline and the outside world;
//! [`ToolFetcher`] is the production implementation that shells out to a
//! yt-dlp-compatible tool, downloads documents over HTTP directly, and
//! delegates DRM key resolution to a [`DrmResolver`].

use crate::config::Config;
use crate::error::FetchError;
use crate::strategy::{FetchCommand, FetchPlan, FetchStrategy};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Extensions probed when the tool renames its output
const PROBE_EXTS: [&str; 5] = ["mp4", "mkv", "webm", "m4a", "pdf"];

/// Resolved DRM manifest and its decryption keys
#[derive(Clone, Debug)]
pub struct DrmManifest {
    /// Playable manifest URL
    pub manifest_url: String,
    /// Decryption keys in `kid:key` form
    pub keys: Vec<String>,
}

/// Retrieves one planned item to a local file
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Execute the plan and return the artifact path
    async fn fetch(&self, plan: &FetchPlan) -> Result<PathBuf, FetchError>;
}

/// Resolves a DRM manifest URL into its playable manifest and keys
#[async_trait]
pub trait DrmResolver: Send + Sync {
    /// Resolve manifest and keys for a protected URL
    async fn resolve(&self, url: &str) -> Result<DrmManifest, FetchError>;
}

/// Production fetcher backed by external tools and a direct HTTP client
pub struct ToolFetcher {
    fetch_tool: PathBuf,
    merge_tool: Option<PathBuf>,
    client: reqwest::Client,
    timeout: Duration,
    resolver: Option<Arc<dyn DrmResolver>>,
}

impl std::fmt::Debug for ToolFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolFetcher")
            .field("fetch_tool", &self.fetch_tool)
            .field("merge_tool", &self.merge_tool)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ToolFetcher {
    /// Locate the external tools and build a fetcher
    ///
    /// Explicit paths from [`ToolsConfig`](crate::config::ToolsConfig) win;
    /// otherwise PATH is searched when `search_path` is set. The merge
    /// tool is optional since only DRM plans need it.
    pub fn discover(
        config: &Config,
        resolver: Option<Arc<dyn DrmResolver>>,
    ) -> Result<Self, FetchError> {
        let fetch_tool = match &config.tools.fetch_tool_path {
            Some(path) => path.clone(),
            None if config.tools.search_path => which::which("yt-dlp")
                .map_err(|e| FetchError::ToolNotFound(format!("yt-dlp: {e}")))?,
            None => {
                return Err(FetchError::ToolNotFound(
                    "no fetch tool path configured and PATH search disabled".to_string(),
                ))
            }
        };
        let merge_tool = match &config.tools.merge_tool_path {
            Some(path) => Some(path.clone()),
            None if config.tools.search_path => which::which("mp4decrypt").ok(),
            None => None,
        };

        let client = reqwest::Client::builder()
            .timeout(config.download.fetch_timeout)
            .build()
            .unwrap_or_default();

        Ok(Self {
            fetch_tool,
            merge_tool,
            client,
            timeout: config.download.fetch_timeout,
            resolver,
        })
    }

    /// Run the fetch tool and locate the artifact it produced
    async fn run_tool(&self, command: &FetchCommand, output: &Path) -> Result<PathBuf, FetchError> {
        tracing::debug!(tool = %self.fetch_tool.display(), args = ?command.args, "spawning fetch tool");

        let child = Command::new(&self.fetch_tool)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let result = tokio::time::timeout(self.timeout, child.wait_with_output()).await;
        let out = match result {
            Ok(out) => out?,
            Err(_) => {
                return Err(FetchError::TimedOut {
                    timeout_secs: self.timeout.as_secs(),
                })
            }
        };

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(FetchError::ToolFailed {
                status: out.status.code().unwrap_or(-1),
                stderr: tail,
            });
        }

        probe_output(output)
    }

    /// Direct HTTP download to the expected output path
    async fn http_download(&self, url: &str, output: &Path) -> Result<PathBuf, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await?;
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output, &bytes).await?;
        Ok(output.to_path_buf())
    }

    /// Resolve keys and decrypt-and-merge a DRM stream
    async fn fetch_drm(&self, plan: &FetchPlan, output: &Path) -> Result<PathBuf, FetchError> {
        let resolver = self.resolver.as_ref().ok_or(FetchError::DrmUnresolved {
            url: plan.url.clone(),
        })?;
        let manifest = resolver.resolve(&plan.url).await?;
        if manifest.keys.is_empty() {
            return Err(FetchError::DrmUnresolved {
                url: plan.url.clone(),
            });
        }

        let merge_tool = self
            .merge_tool
            .as_ref()
            .ok_or_else(|| FetchError::ToolNotFound("merge tool".to_string()))?;

        let mut args = vec![manifest.manifest_url.clone()];
        for key in &manifest.keys {
            args.push("--key".to_string());
            args.push(key.clone());
        }
        args.push("-o".to_string());
        args.push(output.display().to_string());

        tracing::debug!(tool = %merge_tool.display(), manifest = %manifest.manifest_url, "spawning merge tool");
        let child = Command::new(merge_tool)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let out = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| FetchError::TimedOut {
                timeout_secs: self.timeout.as_secs(),
            })??;
        if !out.status.success() {
            return Err(FetchError::ToolFailed {
                status: out.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            });
        }

        probe_output(output)
    }

    /// Decrypt a fetched stream in place using its inline key
    async fn decrypt_in_place(&self, path: &Path, key: &str) -> Result<PathBuf, FetchError> {
        let merge_tool = self
            .merge_tool
            .as_ref()
            .ok_or_else(|| FetchError::ToolNotFound("merge tool".to_string()))?;

        let child = Command::new(merge_tool)
            .arg(path)
            .arg("--key")
            .arg(key)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let out = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| FetchError::TimedOut {
                timeout_secs: self.timeout.as_secs(),
            })??;
        if !out.status.success() {
            return Err(FetchError::ToolFailed {
                status: out.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            });
        }
        Ok(path.to_path_buf())
    }
}

#[async_trait]
impl Fetcher for ToolFetcher {
    async fn fetch(&self, plan: &FetchPlan) -> Result<PathBuf, FetchError> {
        let output = plan.output.as_ref().ok_or_else(|| FetchError::OutputMissing {
            template: plan.url.clone(),
        })?;

        match &plan.strategy {
            FetchStrategy::Direct | FetchStrategy::RenderedHtml => {
                self.http_download(&plan.url, output).await
            }
            FetchStrategy::Pdf { scrape: true } => {
                // Anti-bot host rejects tool user agents; plain client works
                let url = plan.url.replace(' ', "%20");
                self.http_download(&url, output).await
            }
            FetchStrategy::Drm => self.fetch_drm(plan, output).await,
            FetchStrategy::EncryptedStream { key } => {
                let command = plan.command.as_ref().ok_or_else(|| {
                    FetchError::OutputMissing {
                        template: output.display().to_string(),
                    }
                })?;
                let path = self.run_tool(command, output).await?;
                if key.is_empty() {
                    Ok(path)
                } else {
                    self.decrypt_in_place(&path, key).await
                }
            }
            FetchStrategy::ZipLink => Err(FetchError::OutputMissing {
                template: plan.url.clone(),
            }),
            _ => {
                let command = plan.command.as_ref().ok_or_else(|| {
                    FetchError::OutputMissing {
                        template: output.display().to_string(),
                    }
                })?;
                self.run_tool(command, output).await
            }
        }
    }
}

/// Find the artifact the tool produced
///
/// The tool sometimes picks its own container extension, so when the
/// expected path is absent the same stem is probed with known extensions.
fn probe_output(expected: &Path) -> Result<PathBuf, FetchError> {
    if expected.exists() {
        return Ok(expected.to_path_buf());
    }
    for ext in PROBE_EXTS {
        let candidate = expected.with_extension(ext);
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(FetchError::OutputMissing {
        template: expected.display().to_string(),
    })
}
