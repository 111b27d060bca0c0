//! CLI subprocess provider adapter
//!
//! Runs an interactively-authenticated agentic CLI tool as a bounded
//! subprocess inside a managed workspace. The prompt travels as a discrete
//! trailing argument, never through a shell or stdin. After a zero-exit run
//! the raw output goes through the interpreter (noise stripping, error
//! classification, event-stream parsing) and the workspace through artifact
//! detection; a non-zero exit has its stderr classified into the same typed
//! errors the failover router understands.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use taskforge_process::{ProcessConfig, ProcessError, ProcessRunner};

use crate::{
    artifacts,
    auth::{AuthEvidence, AuthStore},
    error::ProviderError,
    interpreter,
    models::{
        Capabilities, ChatRequest, ChatResponse, CostClass, ProviderDescriptor, ProviderKind,
        TaskType, TokenUsage,
    },
    provider::Provider,
    workspace::WorkspaceManager,
};

/// Default timeout for an agentic CLI run; these tools do real work
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Timeout for the lightweight auth probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Static description of one CLI tool
#[derive(Debug, Clone)]
pub struct CliToolSpec {
    /// Provider id, e.g. `claude`
    pub id: String,
    /// Human-readable name
    pub display_name: String,
    /// Executable name or path
    pub program: String,
    /// Arguments placed before the prompt
    pub base_args: Vec<String>,
    /// Arguments for the auth probe invocation; must issue a real request,
    /// since a bare version check exits zero even when logged out
    pub probe_args: Vec<String>,
    /// Extra environment for every invocation
    pub env: HashMap<String, String>,
    /// Override HOME so the tool reads its own config tree
    pub home_dir: Option<PathBuf>,
    /// Environment variable that may carry a credential
    pub credential_env: Option<String>,
    /// Credential files written by the tool's login flow
    pub credential_paths: Vec<PathBuf>,
    /// Advertised capabilities
    pub capabilities: Capabilities,
    /// Per-run timeout
    pub timeout: Duration,
}

impl CliToolSpec {
    /// Spec with defaults for a text-only chat tool
    pub fn new(id: impl Into<String>, program: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            program: program.into(),
            base_args: Vec::new(),
            probe_args: vec!["--print".to_string(), "ping".to_string()],
            env: HashMap::new(),
            home_dir: None,
            credential_env: None,
            credential_paths: Vec::new(),
            capabilities: Capabilities {
                task_types: vec![TaskType::Chat],
                max_context: 128_000,
                supports_vision: false,
                supports_tools: true,
                supports_embedding: false,
            },
            timeout: DEFAULT_TIMEOUT,
        }
    }

    fn evidence(&self) -> AuthEvidence {
        AuthEvidence {
            env_var: self.credential_env.clone(),
            credential_paths: self.credential_paths.clone(),
        }
    }
}

/// CLI subprocess adapter
pub struct CliProvider {
    spec: CliToolSpec,
    descriptor: ProviderDescriptor,
    runner: Arc<ProcessRunner>,
    auth: Arc<AuthStore>,
    workspaces: Arc<WorkspaceManager>,
}

impl CliProvider {
    /// Create a provider for one CLI tool
    pub fn new(
        spec: CliToolSpec,
        runner: Arc<ProcessRunner>,
        auth: Arc<AuthStore>,
        workspaces: Arc<WorkspaceManager>,
    ) -> Self {
        let descriptor = ProviderDescriptor {
            id: spec.id.clone(),
            kind: ProviderKind::Cli,
            display_name: spec.display_name.clone(),
            capabilities: spec.capabilities.clone(),
            cost_class: CostClass::Flat,
        };
        Self {
            spec,
            descriptor,
            runner,
            auth,
            workspaces,
        }
    }

    /// The underlying tool spec
    pub fn spec(&self) -> &CliToolSpec {
        &self.spec
    }

    /// Run the tool's probe invocation, a minimal real request
    ///
    /// Suitable as the probe closure for auth re-verification: it succeeds
    /// only when the tool is installed and answers an actual request without
    /// an auth complaint.
    pub async fn probe(&self) -> Result<(), ProviderError> {
        let config = self
            .base_config()
            .args(self.spec.probe_args.clone())
            .timeout(PROBE_TIMEOUT);

        let probe_id = format!("probe-{}-{}", self.spec.id, Utc::now().timestamp_micros());
        let output = self
            .runner
            .run(&probe_id, config)
            .await
            .map_err(classify_process_error)?;

        interpreter::classify_errors(&output.stdout)?;
        interpreter::classify_errors(&output.stderr)?;
        Ok(())
    }

    fn base_config(&self) -> ProcessConfig {
        let mut config = ProcessConfig::new(&self.spec.program);
        for (key, value) in &self.spec.env {
            config = config.env(key, value);
        }
        if let Some(home) = &self.spec.home_dir {
            config = config.env("HOME", home.display().to_string());
        }
        config
    }

    /// Render the conversation into a single prompt argument
    fn render_prompt(request: &ChatRequest) -> String {
        let mut parts = Vec::new();
        if let Some(system) = &request.system_prompt {
            if !system.trim().is_empty() {
                parts.push(system.trim().to_string());
            }
        }
        for message in &request.messages {
            parts.push(message.content.trim().to_string());
        }
        parts.join("\n\n")
    }
}

/// Non-zero exits carry the tool's complaint on stderr; classify it into the
/// same typed errors as stdout-level failures so the router treats both alike.
fn classify_process_error(err: ProcessError) -> ProviderError {
    if let ProcessError::NonZeroExit { ref stderr, .. } = err {
        if let Err(typed) = interpreter::classify_errors(stderr) {
            return typed;
        }
    }
    err.into()
}

#[async_trait]
impl Provider for CliProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        if !self.auth.is_authenticated(&self.spec.id, &self.spec.evidence()) {
            return Err(ProviderError::Auth(format!(
                "{} is not authenticated; run its login flow first",
                self.spec.id
            )));
        }

        let workspace = match &request.workspace {
            Some(path) => path.clone(),
            None => {
                let owner = request.user_id.as_deref().unwrap_or("default");
                self.workspaces.workspace_for(owner, &self.spec.id)?
            }
        };

        let started_at = SystemTime::now();
        let before = artifacts::snapshot(&workspace);

        let prompt = Self::render_prompt(&request);
        if prompt.is_empty() {
            return Err(ProviderError::Config("empty prompt".to_string()));
        }

        let timeout = request.timeout.unwrap_or(self.spec.timeout);
        let config = self
            .base_config()
            .args(self.spec.base_args.clone())
            .arg(prompt)
            .working_dir(&workspace)
            .timeout(timeout);

        let execution_id = request.execution_id.clone().unwrap_or_else(|| {
            format!("{}-{}", self.spec.id, Utc::now().timestamp_micros())
        });

        info!(
            provider = %self.spec.id,
            execution_id = %execution_id,
            workspace = %workspace.display(),
            "Running CLI tool"
        );

        let output = self
            .runner
            .run(&execution_id, config)
            .await
            .map_err(classify_process_error)?;

        debug!(
            provider = %self.spec.id,
            execution_id = %execution_id,
            duration_ms = %output.duration.as_millis(),
            "CLI tool finished"
        );

        let interpreted = interpreter::interpret(&output.stdout)?;

        // Artifact detection is best-effort: a scan hiccup must not fail an
        // otherwise successful run.
        let output_files = artifacts::detect(&output.stdout, &workspace, &before, started_at);
        if !output_files.is_empty() {
            info!(
                provider = %self.spec.id,
                execution_id = %execution_id,
                files = output_files.len(),
                "Detected output artifacts"
            );
        }

        Ok(ChatResponse {
            content: interpreted.content,
            model: request.model.unwrap_or_else(|| self.spec.id.clone()),
            provider: self.spec.id.clone(),
            usage: TokenUsage::default(),
            tool_calls: interpreted.tool_calls,
            output_files,
        })
    }

    async fn is_available(&self) -> bool {
        match self.probe().await {
            Ok(()) => true,
            Err(e) => {
                warn!(provider = %self.spec.id, error = %e, "CLI tool unavailable");
                false
            }
        }
    }
}
