//! Browser control sub-resource.
//!
//! A Playwright control script is written into the environment on first use
//! and driven through the command runner, one JSON action per invocation.
//! The controller persists across tool calls within a run and is
//! force-closed during finalization regardless of run outcome.

use base64::Engine as _;
use serde_json::json;
use tracing::{debug, warn};

use drydock_core::env::ExecutionEnv;

use crate::gateway::{shell_quote, ToolError};

const SCRIPT_PATH: &str = "/tmp/browser_control.py";
const SCREENSHOTS_DIR: &str = "/tmp/screenshots";
const DEFAULT_ACTION_TIMEOUT_MS: u64 = 30_000;

pub struct BrowserController {
    initialized: bool,
}

impl BrowserController {
    pub fn new() -> Self {
        Self { initialized: false }
    }

    pub fn is_active(&self) -> bool {
        self.initialized
    }

    async fn ensure_initialized(&mut self, env: &dyn ExecutionEnv) -> Result<(), ToolError> {
        if self.initialized {
            return Ok(());
        }
        debug!("bootstrapping browser control script");
        env.write_file(SCRIPT_PATH, CONTROL_SCRIPT.as_bytes()).await?;
        env.exec(&format!("mkdir -p {SCREENSHOTS_DIR}")).await?;
        self.initialized = true;
        Ok(())
    }

    /// Run one browser action. Action-level failures (timeouts, bad
    /// selectors) come back as `success: false` payloads; only transport
    /// failures against the environment are tool errors.
    pub async fn execute(
        &mut self,
        args: &serde_json::Value,
        env: &dyn ExecutionEnv,
    ) -> Result<String, ToolError> {
        let action = args["action"]
            .as_str()
            .ok_or_else(|| ToolError::ArgumentError("`action` must be a string".into()))?;

        self.ensure_initialized(env).await?;

        let mut command_args = json!({
            "action": action,
            "timeout": args
                .get("timeout")
                .and_then(|v| v.as_u64())
                .unwrap_or(DEFAULT_ACTION_TIMEOUT_MS),
        });
        for key in ["url", "selector", "text", "javascript"] {
            if let Some(value) = args.get(key).and_then(|v| v.as_str()) {
                command_args[key] = value.into();
            }
        }
        if args.get("full_page").and_then(|v| v.as_bool()).unwrap_or(false) {
            command_args["full_page"] = true.into();
        }

        let command = format!(
            "python3 {SCRIPT_PATH} {}",
            shell_quote(&command_args.to_string())
        );
        let out = env.exec(&command).await?;

        let mut result: serde_json::Value = match serde_json::from_str(out.stdout.trim()) {
            Ok(v) => v,
            Err(e) => {
                warn!(action, error = %e, "browser output was not valid JSON");
                return Ok(json!({
                    "success": false,
                    "error": format!("failed to parse browser result: {e}"),
                })
                .to_string());
            }
        };

        // Inline screenshot bytes so callers never touch environment paths.
        if let Some(path) = result["screenshot_path"].as_str().map(String::from) {
            match env.read_file_bytes(&path).await {
                Ok(bytes) => {
                    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                    result["screenshot_data"] = encoded.into();
                }
                Err(e) => warn!(path = %path, error = %e, "failed to read screenshot"),
            }
        }

        debug!(action, "browser action completed");
        Ok(result.to_string())
    }

    /// Force-close the browser. Best-effort; errors are logged and
    /// swallowed so cleanup never masks the run's outcome.
    pub async fn close(&mut self, env: &dyn ExecutionEnv) {
        if !self.initialized {
            return;
        }
        let args = json!({"action": "close"});
        if let Err(e) = self.execute(&args, env).await {
            warn!(error = %e, "browser close failed");
        }
        self.initialized = false;
    }
}

impl Default for BrowserController {
    fn default() -> Self {
        Self::new()
    }
}

/// Playwright control script executed inside the environment.
const CONTROL_SCRIPT: &str = r#"#!/usr/bin/env python3
import asyncio
import json
import sys
from pathlib import Path
from playwright.async_api import async_playwright, TimeoutError as PlaywrightTimeout

_browser = None
_page = None
_playwright = None


async def init_browser():
    global _browser, _page, _playwright
    if _browser is not None:
        return
    _playwright = await async_playwright().start()
    _browser = await _playwright.chromium.launch(
        headless=True,
        args=['--no-sandbox', '--disable-setuid-sandbox', '--disable-dev-shm-usage'],
    )
    _page = await _browser.new_page(viewport={'width': 1280, 'height': 720})


async def close_browser():
    global _browser, _page, _playwright
    if _page:
        await _page.close()
    if _browser:
        await _browser.close()
    if _playwright:
        await _playwright.stop()
    _browser = None
    _page = None
    _playwright = None


async def execute_action(args):
    action = args['action']
    timeout = args.get('timeout', 30000)

    if action != 'close':
        await init_browser()

    try:
        if action == 'navigate':
            url = args['url']
            await _page.goto(url, wait_until='domcontentloaded', timeout=timeout)
            return {'success': True, 'url': url}

        elif action == 'click':
            selector = args['selector']
            await _page.click(selector, timeout=timeout)
            return {'success': True, 'selector': selector}

        elif action == 'type':
            selector = args['selector']
            text = args['text']
            await _page.fill(selector, text, timeout=timeout)
            return {'success': True, 'selector': selector, 'text': text}

        elif action == 'screenshot':
            full_page = args.get('full_page', False)
            path = '/tmp/screenshots/shot_%d.png' % int(asyncio.get_event_loop().time() * 1000)
            Path(path).parent.mkdir(parents=True, exist_ok=True)
            await _page.screenshot(path=path, full_page=full_page, timeout=timeout)
            return {'success': True, 'screenshot_path': path}

        elif action == 'extract':
            selector = args['selector']
            elements = await _page.query_selector_all(selector)
            texts = []
            for element in elements:
                text = await element.text_content()
                if text:
                    texts.append(text.strip())
            return {'success': True, 'selector': selector, 'extracted_text': texts}

        elif action == 'wait':
            selector = args['selector']
            await _page.wait_for_selector(selector, timeout=timeout)
            return {'success': True, 'selector': selector}

        elif action == 'execute':
            result = await _page.evaluate(args['javascript'])
            return {'success': True, 'result': result}

        elif action == 'close':
            await close_browser()
            return {'success': True}

        else:
            return {'success': False, 'error': 'unknown action: %s' % action}

    except PlaywrightTimeout:
        return {'success': False, 'error': 'timeout executing %s' % action}
    except Exception as e:
        return {'success': False, 'error': str(e)}


async def main():
    if len(sys.argv) < 2:
        print(json.dumps({'success': False, 'error': 'no arguments provided'}))
        sys.exit(1)
    try:
        args = json.loads(sys.argv[1])
        result = await execute_action(args)
        print(json.dumps(result))
    except Exception as e:
        print(json.dumps({'success': False, 'error': str(e)}))
        sys.exit(1)


if __name__ == '__main__':
    asyncio.run(main())
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use drydock_env::LocalEnv;

    #[tokio::test]
    async fn first_use_bootstraps_script() {
        let env = LocalEnv::create().await.unwrap();
        let mut browser = BrowserController::new();
        assert!(!browser.is_active());

        // Action fails (no playwright in the scratch env) but the script
        // and screenshots dir must be in place.
        let _ = browser
            .execute(&json!({"action": "navigate", "url": "https://example.com"}), &env)
            .await
            .unwrap();

        assert!(browser.is_active());
        let script = env.read_file(SCRIPT_PATH).await.unwrap();
        assert!(script.contains("async_playwright"));
        env.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn failed_action_becomes_failure_payload() {
        let env = LocalEnv::create().await.unwrap();
        let mut browser = BrowserController::new();

        // "hover" is not a supported action, so every path (missing python,
        // missing playwright, or a healthy script) reports success: false.
        let payload = browser
            .execute(&json!({"action": "hover", "selector": "#x"}), &env)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed["success"], false);
        env.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn close_resets_state_and_never_errors() {
        let env = LocalEnv::create().await.unwrap();
        let mut browser = BrowserController::new();
        // Closing an unbootstrapped browser is a no-op.
        browser.close(&env).await;
        assert!(!browser.is_active());

        let _ = browser.execute(&json!({"action": "screenshot"}), &env).await;
        assert!(browser.is_active());
        browser.close(&env).await;
        assert!(!browser.is_active());
        env.destroy().await.unwrap();
    }

    #[test]
    fn control_script_covers_all_actions() {
        for action in ["navigate", "click", "type", "screenshot", "extract", "wait", "execute", "close"] {
            assert!(
                CONTROL_SCRIPT.contains(&format!("'{action}'")),
                "script missing action {action}"
            );
        }
    }
}
