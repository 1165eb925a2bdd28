//! Placeholder Resolver (spec §4.1).
//!
//! Resolves `${...}` forms in string fields against a layered resolution
//! context, with legacy bare-`$NAME` and `$: <command>` compatibility.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

const DEFAULT_DEPTH_CAP: usize = 10;
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("placeholder resolution exceeded depth cap of {0}")]
    DepthExceeded(usize),
    #[error("command `{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },
    #[error("command `{0}` timed out")]
    CommandTimeout(String),
    #[error("unresolved placeholder `{0}` in strict mode")]
    Unresolved(String),
}

/// Layered lookup context, built once per resolution pass and consulted
/// last-write-wins: predefined → process env → `MCP_HUB_ENV` → server env.
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    values: HashMap<String, String>,
}

impl ResolutionContext {
    /// Build the base context: predefined vars, then process env, then the
    /// `MCP_HUB_ENV` JSON object (if set and well-formed).
    pub fn build(workspace_folder: &Path) -> Self {
        let mut values = HashMap::new();

        let basename = workspace_folder
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let home = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_default();

        values.insert(
            "workspaceFolder".to_string(),
            workspace_folder.to_string_lossy().to_string(),
        );
        values.insert("userHome".to_string(), home);
        values.insert(
            "pathSeparator".to_string(),
            std::path::MAIN_SEPARATOR.to_string(),
        );
        values.insert("workspaceFolderBasename".to_string(), basename);
        values.insert(
            "cwd".to_string(),
            std::env::current_dir()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default(),
        );
        values.insert("/".to_string(), std::path::MAIN_SEPARATOR.to_string());

        // Process env overrides nothing predefined by name collision in
        // practice, but per spec priority process env comes after predefined.
        for (k, v) in std::env::vars() {
            values.insert(k, v);
        }

        if let Ok(raw) = std::env::var("MCP_HUB_ENV") {
            match serde_json::from_str::<serde_json::Value>(&raw) {
                Ok(serde_json::Value::Object(map)) => {
                    for (k, v) in map {
                        if let Some(s) = v.as_str() {
                            values.insert(format!("input:{k}"), s.to_string());
                        }
                    }
                }
                Ok(_) => warn!("MCP_HUB_ENV is not a JSON object, ignoring"),
                Err(err) => warn!(%err, "MCP_HUB_ENV is not valid JSON, ignoring"),
            }
        }

        Self { values }
    }

    /// Layer the server's own resolved env on top (spec: "the server's own
    /// resolved env after first pass"). Predefined names are never injected
    /// into this layer's source of truth for the server's runtime env.
    pub fn with_server_env(&self, server_env: &HashMap<String, String>) -> Self {
        let mut values = self.values.clone();
        for (k, v) in server_env {
            values.insert(k.clone(), v.clone());
        }
        Self { values }
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|s| s.as_str())
    }
}

pub struct Resolver {
    strict: bool,
    depth_cap: usize,
    command_timeout: Duration,
}

impl Default for Resolver {
    fn default() -> Self {
        Self {
            strict: true,
            depth_cap: DEFAULT_DEPTH_CAP,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl Resolver {
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            ..Default::default()
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Resolve a single string field (`url`, `command`, `cwd`, or any
    /// element of `args`/`headers`/`env`).
    pub async fn resolve(
        &self,
        template: &str,
        ctx: &ResolutionContext,
    ) -> Result<String, ResolveError> {
        self.resolve_depth(template, ctx, 0).await
    }

    /// Resolve an ordered sequence (`args`), each element independently.
    pub async fn resolve_args(
        &self,
        args: &[String],
        ctx: &ResolutionContext,
    ) -> Result<Vec<String>, ResolveError> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            out.push(self.resolve(&legacy_bare_var(arg, ctx), ctx).await?);
        }
        Ok(out)
    }

    /// Resolve a mapping (`env` or `headers`) in one pass. `env` values of
    /// `None`/empty fall back to the process environment.
    pub async fn resolve_env(
        &self,
        env: &HashMap<String, Option<String>>,
        ctx: &ResolutionContext,
    ) -> Result<HashMap<String, String>, ResolveError> {
        let mut out = HashMap::with_capacity(env.len());
        for (key, value) in env {
            let raw = match value {
                Some(v) if !v.is_empty() => legacy_command_alias(v),
                _ => std::env::var(key).unwrap_or_default(),
            };
            out.insert(key.clone(), self.resolve(&raw, ctx).await?);
        }
        Ok(out)
    }

    pub async fn resolve_headers(
        &self,
        headers: &HashMap<String, String>,
        ctx: &ResolutionContext,
    ) -> Result<HashMap<String, String>, ResolveError> {
        let mut out = HashMap::with_capacity(headers.len());
        for (key, value) in headers {
            out.insert(key.clone(), self.resolve(value, ctx).await?);
        }
        Ok(out)
    }

    fn resolve_depth<'a>(
        &'a self,
        template: &'a str,
        ctx: &'a ResolutionContext,
        depth: usize,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<String, ResolveError>> + 'a>>
    {
        Box::pin(async move {
            if depth > self.depth_cap {
                return if self.strict {
                    Err(ResolveError::DepthExceeded(self.depth_cap))
                } else {
                    Ok(template.to_string())
                };
            }

            let mut out = String::with_capacity(template.len());
            let bytes = template.as_bytes();
            let mut i = 0;
            while i < bytes.len() {
                if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
                    if let Some(end) = find_balanced_close(template, i + 2) {
                        let inner = &template[i + 2..end];
                        let resolved_inner = self.resolve_depth(inner, ctx, depth + 1).await?;
                        let value = self.lookup(&resolved_inner, ctx).await?;
                        match value {
                            Some(v) => out.push_str(&v),
                            None if self.strict => {
                                return Err(ResolveError::Unresolved(resolved_inner))
                            }
                            None => {
                                out.push_str("${");
                                out.push_str(&resolved_inner);
                                out.push('}');
                            }
                        }
                        i = end + 1;
                        continue;
                    }
                }
                out.push(template[i..].chars().next().unwrap());
                i += template[i..].chars().next().unwrap().len_utf8();
            }
            Ok(out)
        })
    }

    async fn lookup(
        &self,
        inner: &str,
        ctx: &ResolutionContext,
    ) -> Result<Option<String>, ResolveError> {
        if let Some(name) = inner.strip_prefix("env:") {
            return Ok(ctx.get(name).map(str::to_string));
        }
        if let Some(id) = inner.strip_prefix("input:") {
            return Ok(ctx.get(&format!("input:{id}")).map(str::to_string));
        }
        if let Some(cmd) = inner.strip_prefix("cmd:") {
            return self.run_command(cmd.trim()).await.map(Some);
        }
        Ok(ctx.get(inner).map(str::to_string))
    }

    async fn run_command(&self, command: &str) -> Result<String, ResolveError> {
        let fut = async {
            let parts = shell_words::split(command).map_err(|e| ResolveError::CommandFailed {
                command: command.to_string(),
                reason: e.to_string(),
            })?;
            let (program, args) = parts.split_first().ok_or_else(|| ResolveError::CommandFailed {
                command: command.to_string(),
                reason: "empty command".to_string(),
            })?;
            let output = tokio::process::Command::new(program)
                .args(args)
                .output()
                .await
                .map_err(|e| ResolveError::CommandFailed {
                    command: command.to_string(),
                    reason: e.to_string(),
                })?;
            if !output.status.success() {
                return Err(ResolveError::CommandFailed {
                    command: command.to_string(),
                    reason: format!("exit status {}", output.status),
                });
            }
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        };

        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ResolveError::CommandTimeout(command.to_string())),
        }
    }
}

/// Finds the index of the `}` that balances the `{` whose content starts at
/// `start`, accounting for nested `${`.
fn find_balanced_close(s: &str, start: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 1usize;
    let mut i = start;
    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            depth += 1;
            i += 2;
            continue;
        }
        if bytes[i] == b'}' {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

/// Legacy bare `$NAME` form in argument arrays, accepted with a deprecation
/// warning, rewritten to the canonical `${NAME}` form before normal
/// resolution runs.
fn legacy_bare_var(arg: &str, ctx: &ResolutionContext) -> String {
    if !arg.starts_with('$') || arg.starts_with("${") {
        return arg.to_string();
    }
    let name = &arg[1..];
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return arg.to_string();
    }
    if ctx.get(name).is_some() {
        warn!(name, "bare $NAME placeholders are deprecated, use ${{NAME}}");
        format!("${{{name}}}")
    } else {
        arg.to_string()
    }
}

/// Legacy `$: <command>` form in env values, rewritten to `${cmd: ...}`.
fn legacy_command_alias(value: &str) -> String {
    if let Some(command) = value.strip_prefix("$:") {
        warn!("`$: <command>` env values are deprecated, use ${{cmd: ...}}");
        format!("${{cmd:{command}}}")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn ctx_with(values: &[(&str, &str)]) -> ResolutionContext {
        let mut ctx = ResolutionContext::build(&PathBuf::from("/workspace"));
        for (k, v) in values {
            ctx.values.insert(k.to_string(), v.to_string());
        }
        ctx
    }

    #[tokio::test]
    async fn resolves_simple_var() {
        let ctx = ctx_with(&[("FOO", "bar")]);
        let resolver = Resolver::default();
        let out = resolver.resolve("prefix-${FOO}-suffix", &ctx).await.unwrap();
        assert_eq!(out, "prefix-bar-suffix");
    }

    #[tokio::test]
    async fn env_alias_matches_plain_lookup() {
        let ctx = ctx_with(&[("FOO", "bar")]);
        let resolver = Resolver::default();
        let out = resolver.resolve("${env:FOO}", &ctx).await.unwrap();
        assert_eq!(out, "bar");
    }

    #[tokio::test]
    async fn resolves_nested_placeholder() {
        let ctx = ctx_with(&[("KEY", "FOO"), ("FOO", "resolved")]);
        let resolver = Resolver::default();
        let out = resolver.resolve("${${KEY}}", &ctx).await.unwrap();
        assert_eq!(out, "resolved");
    }

    #[tokio::test]
    async fn strict_mode_errors_on_unresolved() {
        let ctx = ResolutionContext::build(&PathBuf::from("/workspace"));
        let resolver = Resolver::new(true);
        let err = resolver.resolve("${DOES_NOT_EXIST_XYZ}", &ctx).await;
        assert!(matches!(err, Err(ResolveError::Unresolved(_))));
    }

    #[tokio::test]
    async fn non_strict_mode_leaves_placeholder_literal() {
        let ctx = ResolutionContext::build(&PathBuf::from("/workspace"));
        let resolver = Resolver::new(false);
        let out = resolver.resolve("${DOES_NOT_EXIST_XYZ}", &ctx).await.unwrap();
        assert_eq!(out, "${DOES_NOT_EXIST_XYZ}");
    }

    #[tokio::test]
    async fn predefined_workspace_folder_resolves() {
        let ctx = ResolutionContext::build(&PathBuf::from("/home/user/proj"));
        let resolver = Resolver::default();
        let out = resolver.resolve("${workspaceFolder}", &ctx).await.unwrap();
        assert_eq!(out, "/home/user/proj");
        let base = resolver.resolve("${workspaceFolderBasename}", &ctx).await.unwrap();
        assert_eq!(base, "proj");
    }

    #[tokio::test]
    async fn cmd_placeholder_runs_shell_command() {
        let ctx = ResolutionContext::build(&PathBuf::from("/workspace"));
        let resolver = Resolver::default();
        let out = resolver.resolve("${cmd: echo hello}", &ctx).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn depth_cap_terminates_cycles() {
        // A pathological template with more nesting than the cap allows.
        let mut template = "X".to_string();
        for _ in 0..15 {
            template = format!("${{{template}}}");
        }
        let ctx = ResolutionContext::build(&PathBuf::from("/workspace"));
        let resolver = Resolver::new(true);
        let result = resolver.resolve(&template, &ctx).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn resolve_env_falls_back_to_process_env_when_empty() {
        std::env::set_var("MCP_HUB_TEST_FALLBACK", "from-process");
        let mut env = HashMap::new();
        env.insert("MCP_HUB_TEST_FALLBACK".to_string(), None);
        let ctx = ResolutionContext::build(&PathBuf::from("/workspace"));
        let resolver = Resolver::default();
        let resolved = resolver.resolve_env(&env, &ctx).await.unwrap();
        assert_eq!(
            resolved.get("MCP_HUB_TEST_FALLBACK"),
            Some(&"from-process".to_string())
        );
        std::env::remove_var("MCP_HUB_TEST_FALLBACK");
    }

    #[test]
    fn legacy_bare_var_rewrites_known_name() {
        let ctx = ctx_with(&[("FOO", "bar")]);
        assert_eq!(legacy_bare_var("$FOO", &ctx), "${FOO}");
    }

    #[test]
    fn legacy_bare_var_leaves_unknown_alone() {
        let ctx = ResolutionContext::build(&PathBuf::from("/workspace"));
        assert_eq!(legacy_bare_var("$NOT_A_VAR_XYZ", &ctx), "$NOT_A_VAR_XYZ");
    }

    #[test]
    fn legacy_command_alias_rewrites() {
        assert_eq!(legacy_command_alias("$: echo hi"), "${cmd: echo hi}");
    }
}
