//! Closed tool dispatch table.
//!
//! The tool set is fixed — bash, read, write, edit, glob, grep, browser —
//! and dispatched by name after validating arguments against each tool's
//! schema. Relative file paths are anchored to the workspace mount point.

use serde_json::json;
use tracing::{debug, instrument};

use drydock_core::env::ExecutionEnv;
use drydock_core::provider::ToolDefinition;

use crate::browser::BrowserController;

/// Fixed mount point for project files and uploads inside the environment.
pub const MOUNT_POINT: &str = "/workspace";

/// Errors local to a single tool call. The loop folds these into an
/// error-flagged tool result and continues.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments: {0}")]
    ArgumentError(String),
    #[error("text not found in file: {0}")]
    TextNotFound(String),
    #[error("execution failed: {0}")]
    Execution(String),
}

impl From<drydock_core::errors::EnvError> for ToolError {
    fn from(e: drydock_core::errors::EnvError) -> Self {
        ToolError::Execution(e.to_string())
    }
}

/// Shell-safe single quoting for user-supplied command arguments.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || "_-./".contains(c)) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Anchor a relative path to the mount point; absolute paths pass through.
pub fn anchor_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{MOUNT_POINT}/{path}")
    }
}

/// The tool schema advertised to the model. One entry per dispatchable tool.
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "bash".into(),
            description: "Execute a bash command in the environment. Returns stdout, stderr, and exit code.".into(),
            parameters_schema: json!({
                "type": "object",
                "required": ["command"],
                "properties": {
                    "command": {"type": "string", "description": "The bash command to execute"}
                }
            }),
        },
        ToolDefinition {
            name: "read".into(),
            description: "Read the contents of a file.".into(),
            parameters_schema: json!({
                "type": "object",
                "required": ["path"],
                "properties": {
                    "path": {"type": "string", "description": "The file path to read"}
                }
            }),
        },
        ToolDefinition {
            name: "write".into(),
            description: "Create or overwrite a file with the given content.".into(),
            parameters_schema: json!({
                "type": "object",
                "required": ["path", "content"],
                "properties": {
                    "path": {"type": "string", "description": "The file path (relative paths land in the workspace)"},
                    "content": {"type": "string", "description": "The file content"}
                }
            }),
        },
        ToolDefinition {
            name: "edit".into(),
            description: "Edit a file by replacing the first occurrence of old_text with new_text.".into(),
            parameters_schema: json!({
                "type": "object",
                "required": ["path", "old_text", "new_text"],
                "properties": {
                    "path": {"type": "string", "description": "The file path to edit"},
                    "old_text": {"type": "string", "description": "The exact text to replace"},
                    "new_text": {"type": "string", "description": "The new text to insert"}
                }
            }),
        },
        ToolDefinition {
            name: "glob".into(),
            description: "List files matching a name pattern (e.g. '*.py').".into(),
            parameters_schema: json!({
                "type": "object",
                "required": ["pattern"],
                "properties": {
                    "pattern": {"type": "string", "description": "The name pattern to match"},
                    "directory": {"type": "string", "description": "The directory to search in (default: '.')"}
                }
            }),
        },
        ToolDefinition {
            name: "grep".into(),
            description: "Search for a pattern in files. Returns matching lines.".into(),
            parameters_schema: json!({
                "type": "object",
                "required": ["pattern"],
                "properties": {
                    "pattern": {"type": "string", "description": "The text pattern to search for"},
                    "path": {"type": "string", "description": "File or directory to search in (default: '.')"}
                }
            }),
        },
        ToolDefinition {
            name: "browser".into(),
            description: "Control a headless browser: navigate, click, type, screenshot, extract, wait, execute, close.".into(),
            parameters_schema: json!({
                "type": "object",
                "required": ["action"],
                "properties": {
                    "action": {"type": "string", "description": "One of navigate, click, type, screenshot, extract, wait, execute, close"},
                    "url": {"type": "string", "description": "URL for navigate"},
                    "selector": {"type": "string", "description": "CSS selector for click, type, extract, wait"},
                    "text": {"type": "string", "description": "Text for type"},
                    "full_page": {"type": "boolean", "description": "Capture the full page when taking a screenshot"},
                    "timeout": {"type": "integer", "description": "Timeout in milliseconds (default 30000)"},
                    "javascript": {"type": "string", "description": "JavaScript for execute"}
                }
            }),
        },
    ]
}

/// Translates named tool calls into environment operations.
///
/// Holds the one piece of per-run tool state: the lazily bootstrapped
/// browser controller, force-closed during finalization.
pub struct ToolGateway {
    browser: BrowserController,
}

impl ToolGateway {
    pub fn new() -> Self {
        Self {
            browser: BrowserController::new(),
        }
    }

    /// Execute one tool call. Fails with `UnknownTool`, `ArgumentError`,
    /// `TextNotFound` or `Execution`; the payload is a JSON string.
    #[instrument(skip(self, args, env), fields(tool = name))]
    pub async fn execute(
        &mut self,
        name: &str,
        args: &serde_json::Value,
        env: &dyn ExecutionEnv,
    ) -> Result<String, ToolError> {
        validate_args(name, args)?;
        debug!("dispatching tool");

        match name {
            "bash" => {
                let command = require_str(args, "command")?;
                let out = env.exec(command).await?;
                Ok(json!({
                    "stdout": out.stdout,
                    "stderr": out.stderr,
                    "exit_code": out.exit_code,
                })
                .to_string())
            }

            "read" => {
                let path = anchor_path(require_str(args, "path")?);
                let content = env.read_file(&path).await?;
                Ok(json!({ "content": content }).to_string())
            }

            "write" => {
                let path = anchor_path(require_str(args, "path")?);
                let content = require_str(args, "content")?;
                env.write_file(&path, content.as_bytes()).await?;
                Ok(json!({ "success": true, "path": path }).to_string())
            }

            "edit" => {
                let path = anchor_path(require_str(args, "path")?);
                let old_text = require_str(args, "old_text")?;
                let new_text = require_str(args, "new_text")?;

                let content = env.read_file(&path).await?;
                if !content.contains(old_text) {
                    return Err(ToolError::TextNotFound(old_text.to_string()));
                }
                // First occurrence only: multi-site edits are ambiguous.
                let new_content = content.replacen(old_text, new_text, 1);
                env.write_file(&path, new_content.as_bytes()).await?;
                Ok(json!({ "success": true, "path": path }).to_string())
            }

            "glob" => {
                let pattern = require_str(args, "pattern")?;
                let directory = optional_str(args, "directory").unwrap_or(".");
                let out = env
                    .exec(&format!(
                        "find {} -name {} 2>/dev/null",
                        shell_quote(directory),
                        shell_quote(pattern)
                    ))
                    .await?;
                let files: Vec<&str> = out
                    .stdout
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .collect();
                Ok(json!({ "files": files }).to_string())
            }

            "grep" => {
                let pattern = require_str(args, "pattern")?;
                let path = optional_str(args, "path").unwrap_or(".");
                let out = env
                    .exec(&format!(
                        "grep -rn {} {} 2>/dev/null || true",
                        shell_quote(pattern),
                        shell_quote(path)
                    ))
                    .await?;
                Ok(json!({ "matches": out.stdout }).to_string())
            }

            "browser" => self.browser.execute(args, env).await,

            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    /// Whether the browser sub-resource was bootstrapped this run.
    pub fn browser_active(&self) -> bool {
        self.browser.is_active()
    }

    /// Force-close the browser sub-resource. Best-effort, called during
    /// finalization independent of run outcome.
    pub async fn close_browser(&mut self, env: &dyn ExecutionEnv) {
        self.browser.close(env).await;
    }
}

impl Default for ToolGateway {
    fn default() -> Self {
        Self::new()
    }
}

/// Check `args` against the tool's schema: every required field must be
/// present. Unknown tools fail here so dispatch stays closed.
fn validate_args(name: &str, args: &serde_json::Value) -> Result<(), ToolError> {
    let defs = definitions();
    let def = defs
        .iter()
        .find(|d| d.name == name)
        .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

    if let Some(required) = def.parameters_schema["required"].as_array() {
        for field in required.iter().filter_map(|f| f.as_str()) {
            if args.get(field).is_none() {
                return Err(ToolError::ArgumentError(format!(
                    "{name}: missing required argument `{field}`"
                )));
            }
        }
    }
    Ok(())
}

fn require_str<'a>(args: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    args[key]
        .as_str()
        .ok_or_else(|| ToolError::ArgumentError(format!("`{key}` must be a string")))
}

fn optional_str<'a>(args: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}
