//! Script-based hook handlers.
//!
//! Handlers spawn a child process per event, passing the [`HookPayload`] as
//! JSON on stdin and interpreting the exit status:
//!
//! - Exit 0 → [`HookAction::Continue`]
//! - Exit 1 → [`HookAction::Block`] with stderr as reason
//! - Other exit codes or timeout → error (non-fatal, logged by the registry)
//!
//! The payload fields are also exposed as `MPM_PACKAGE_NAME`,
//! `MPM_PLUGIN_DIR`, and `MPM_PLUGIN_VERSION` environment variables.

use std::{collections::HashMap, path::Path, time::Duration};

use {
    anyhow::{Context, Result, bail},
    async_trait::async_trait,
    tokio::{io::AsyncWriteExt, process::Command},
    tracing::debug,
};

use {
    mpm_common::hooks::{HookAction, HookEvent, HookHandler, HookPayload},
    mpm_config::ScriptHookConfig,
};

/// Script file name for each event inside a plugin's `hooks/` directory.
pub fn plugin_script_name(event: HookEvent) -> &'static str {
    match event {
        HookEvent::PostInstall => "on-install",
        HookEvent::PreUninstall => "pre-uninstall",
        HookEvent::PostEnable => "on-enable",
        HookEvent::PostDisable => "on-disable",
        HookEvent::PostUpdate => "on-update",
    }
}

fn payload_env(payload: &HookPayload) -> Vec<(String, String)> {
    let mut env = vec![
        (
            "MPM_PACKAGE_NAME".to_string(),
            payload.package_name().to_string(),
        ),
        (
            "MPM_PLUGIN_DIR".to_string(),
            payload.plugin_dir().display().to_string(),
        ),
    ];
    match payload {
        HookPayload::PostInstall { version, .. } => {
            env.push(("MPM_PLUGIN_VERSION".to_string(), version.clone()));
        },
        HookPayload::PreUninstall {
            version: Some(version),
            ..
        } => {
            env.push(("MPM_PLUGIN_VERSION".to_string(), version.clone()));
        },
        HookPayload::PostUpdate { new_version, .. } => {
            env.push(("MPM_PLUGIN_VERSION".to_string(), new_version.clone()));
        },
        _ => {},
    }
    env
}

/// Run a prepared command with the shared stdin/timeout/exit-code contract.
async fn run_hook_command(
    name: &str,
    mut cmd: Command,
    timeout: Duration,
    payload: &HookPayload,
) -> Result<HookAction> {
    let payload_json =
        serde_json::to_string(payload).context("failed to serialize hook payload")?;

    cmd.envs(payload_env(payload))
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn hook '{name}'"))?;

    // Write payload to stdin (ignore broken pipe if the script doesn't read it).
    if let Some(mut stdin) = child.stdin.take()
        && let Err(e) = stdin.write_all(payload_json.as_bytes()).await
        && e.kind() != std::io::ErrorKind::BrokenPipe
    {
        return Err(e.into());
    }

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .with_context(|| format!("hook '{name}' timed out after {timeout:?}"))?
        .with_context(|| format!("hook '{name}' failed to complete"))?;

    let exit_code = output.status.code().unwrap_or(-1);
    let stderr = String::from_utf8_lossy(&output.stderr);
    debug!(hook = %name, exit_code, "hook script completed");

    if exit_code == 1 {
        let reason = match stderr.trim().is_empty() {
            true => format!("hook '{name}' blocked the operation"),
            false => stderr.trim().to_string(),
        };
        return Ok(HookAction::Block(reason));
    }

    if exit_code != 0 {
        bail!(
            "hook '{name}' exited with code {exit_code}: {}",
            stderr.trim()
        );
    }

    Ok(HookAction::Continue)
}

// ── Configured hooks ────────────────────────────────────────────────────────

/// A hook handler configured in `mpm.toml`, run for every plugin.
pub struct ScriptHookHandler {
    hook_name: String,
    command: String,
    subscribed_events: Vec<HookEvent>,
    timeout: Duration,
    env: HashMap<String, String>,
}

impl ScriptHookHandler {
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        events: Vec<HookEvent>,
        timeout: Duration,
        env: HashMap<String, String>,
    ) -> Self {
        Self {
            hook_name: name.into(),
            command: command.into(),
            subscribed_events: events,
            timeout,
            env,
        }
    }

    /// Create from a [`ScriptHookConfig`].
    pub fn from_config(config: &ScriptHookConfig) -> Self {
        Self::new(
            config.name.clone(),
            config.command.clone(),
            config.events.clone(),
            Duration::from_secs(config.timeout),
            config.env.clone(),
        )
    }
}

#[async_trait]
impl HookHandler for ScriptHookHandler {
    fn name(&self) -> &str {
        &self.hook_name
    }

    fn events(&self) -> &[HookEvent] {
        &self.subscribed_events
    }

    async fn handle(&self, _event: HookEvent, payload: &HookPayload) -> Result<HookAction> {
        debug!(hook = %self.hook_name, command = %self.command, "spawning configured hook");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&self.command).envs(&self.env);
        run_hook_command(&self.hook_name, cmd, self.timeout, payload).await
    }
}

// ── Per-plugin scripts ──────────────────────────────────────────────────────

/// Runs scripts shipped inside the plugin itself: `hooks/<event>` relative
/// to the plugin directory (e.g. `hooks/on-install`), with the plugin
/// directory as working directory. Plugins without a matching script are
/// silently skipped.
pub struct PluginScriptHandler {
    timeout: Duration,
}

impl PluginScriptHandler {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for PluginScriptHandler {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl HookHandler for PluginScriptHandler {
    fn name(&self) -> &str {
        "plugin-scripts"
    }

    fn events(&self) -> &[HookEvent] {
        HookEvent::ALL
    }

    async fn handle(&self, event: HookEvent, payload: &HookPayload) -> Result<HookAction> {
        let plugin_dir: &Path = payload.plugin_dir();
        let script = plugin_dir.join("hooks").join(plugin_script_name(event));
        if !script.is_file() {
            return Ok(HookAction::Continue);
        }

        debug!(
            package = %payload.package_name(),
            script = %script.display(),
            "running plugin hook script"
        );
        let mut cmd = Command::new("sh");
        cmd.arg(&script).current_dir(plugin_dir);
        let name = format!("{}:{}", payload.package_name(), plugin_script_name(event));
        run_hook_command(&name, cmd, self.timeout, payload).await
    }
}
