//! The action envelope: a closed tagged variant with exhaustive dispatch.
//!
//! Unknown `type` tags never reach the executor; `parse_action` rejects them
//! at the adapter boundary.

use berth_driver::{
    ClipRect, CookieParam, MouseButton, ScreenshotFormat, WaitUntil,
};
use berth_types::{
    Error, ErrorKind, Result, Viewport, MAX_BATCH_SIZE, MAX_TYPE_TEXT_LEN, MAX_URL_LEN,
};
use serde::{Deserialize, Serialize};

fn default_click_count() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CookieOp {
    Set,
    Get,
    Delete,
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryDirection {
    Back,
    Forward,
    Refresh,
}

/// What a `wait` action waits for. Exactly one must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    #[serde(rename_all = "camelCase")]
    Navigate {
        url: String,
        #[serde(default)]
        wait_until: WaitUntil,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Click {
        selector: String,
        #[serde(default)]
        button: MouseButton,
        #[serde(default = "default_click_count")]
        click_count: u32,
        #[serde(default)]
        delay_ms: u64,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Type {
        selector: String,
        text: String,
        #[serde(default)]
        delay_ms: u64,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Select {
        selector: String,
        values: Vec<String>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    Hover {
        selector: String,
    },
    Focus {
        selector: String,
    },
    Blur {
        selector: String,
    },
    #[serde(rename_all = "camelCase")]
    Screenshot {
        #[serde(default)]
        selector: Option<String>,
        #[serde(default)]
        full_page: bool,
        #[serde(default)]
        format: ScreenshotFormat,
        #[serde(default)]
        quality: Option<u8>,
        #[serde(default)]
        clip: Option<ClipRect>,
    },
    #[serde(rename_all = "camelCase")]
    Pdf {
        #[serde(default)]
        landscape: bool,
        #[serde(default = "default_print_background")]
        print_background: bool,
        #[serde(default)]
        scale: Option<f64>,
        #[serde(default)]
        paper_width: Option<f64>,
        #[serde(default)]
        paper_height: Option<f64>,
        #[serde(default)]
        page_ranges: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Evaluate {
        code: String,
        #[serde(default)]
        args: Vec<serde_json::Value>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Wait {
        #[serde(flatten)]
        target: WaitTarget,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Cookie {
        operation: CookieOp,
        #[serde(default)]
        cookies: Vec<CookieParam>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        domain: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    HistoryNavigate {
        direction: HistoryDirection,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    SetViewport {
        #[serde(flatten)]
        viewport: Viewport,
    },
    #[serde(rename_all = "camelCase")]
    SetUserAgent {
        user_agent: String,
    },
    Content {},
    #[serde(rename_all = "camelCase")]
    Scroll {
        #[serde(default)]
        dx: f64,
        #[serde(default)]
        dy: f64,
    },
    #[serde(rename_all = "camelCase")]
    Upload {
        selector: String,
        file_path: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
}

fn default_print_background() -> bool {
    true
}

impl Action {
    /// Stable name used in records, metrics, and the catalog.
    pub fn action_type(&self) -> &'static str {
        match self {
            Action::Navigate { .. } => "navigate",
            Action::Click { .. } => "click",
            Action::Type { .. } => "type",
            Action::Select { .. } => "select",
            Action::Hover { .. } => "hover",
            Action::Focus { .. } => "focus",
            Action::Blur { .. } => "blur",
            Action::Screenshot { .. } => "screenshot",
            Action::Pdf { .. } => "pdf",
            Action::Evaluate { .. } => "evaluate",
            Action::Wait { .. } => "wait",
            Action::Cookie { .. } => "cookie",
            Action::HistoryNavigate { .. } => "historyNavigate",
            Action::SetViewport { .. } => "setViewport",
            Action::SetUserAgent { .. } => "setUserAgent",
            Action::Content {} => "content",
            Action::Scroll { .. } => "scroll",
            Action::Upload { .. } => "upload",
        }
    }

    /// The caller-requested timeout, if this action carries one.
    pub fn timeout_ms(&self) -> Option<u64> {
        match self {
            Action::Navigate { timeout_ms, .. }
            | Action::Click { timeout_ms, .. }
            | Action::Type { timeout_ms, .. }
            | Action::Select { timeout_ms, .. }
            | Action::Evaluate { timeout_ms, .. }
            | Action::Wait { timeout_ms, .. }
            | Action::HistoryNavigate { timeout_ms, .. }
            | Action::Upload { timeout_ms, .. } => *timeout_ms,
            _ => None,
        }
    }

    /// Parameter type checks that need no page or policy context.
    pub fn validate(&self) -> Result<()> {
        match self {
            Action::Navigate { url, .. } => {
                if url.is_empty() {
                    return Err(Error::invalid_argument("url must not be empty"));
                }
                if url.len() > MAX_URL_LEN {
                    return Err(Error::invalid_argument(format!(
                        "url length {} exceeds {MAX_URL_LEN}",
                        url.len()
                    )));
                }
            }
            Action::Click {
                selector,
                click_count,
                ..
            } => {
                require_selector(selector)?;
                if *click_count == 0 || *click_count > 3 {
                    return Err(Error::invalid_argument("clickCount must be 1..=3"));
                }
            }
            Action::Type { selector, text, .. } => {
                require_selector(selector)?;
                if text.len() > MAX_TYPE_TEXT_LEN {
                    return Err(Error::invalid_argument(format!(
                        "text length {} exceeds {MAX_TYPE_TEXT_LEN}",
                        text.len()
                    )));
                }
            }
            Action::Select {
                selector, values, ..
            } => {
                require_selector(selector)?;
                if values.is_empty() {
                    return Err(Error::invalid_argument("values must not be empty"));
                }
            }
            Action::Hover { selector }
            | Action::Focus { selector }
            | Action::Blur { selector } => require_selector(selector)?,
            Action::Screenshot { quality, .. } => {
                if quality.is_some_and(|q| q > 100) {
                    return Err(Error::invalid_argument("quality must be 0..=100"));
                }
            }
            Action::Pdf { scale, .. } => {
                if scale.is_some_and(|s| !(0.1..=2.0).contains(&s)) {
                    return Err(Error::invalid_argument("scale must be 0.1..=2.0"));
                }
            }
            Action::Evaluate { code, .. } => {
                if code.trim().is_empty() {
                    return Err(Error::invalid_argument("code must not be empty"));
                }
            }
            Action::Wait { target, .. } => {
                let set = [
                    target.selector.is_some(),
                    target.function.is_some(),
                    target.duration_ms.is_some(),
                ]
                .iter()
                .filter(|v| **v)
                .count();
                if set != 1 {
                    return Err(Error::invalid_argument(
                        "wait needs exactly one of selector, function, durationMs",
                    ));
                }
            }
            Action::Cookie {
                operation,
                cookies,
                name,
                ..
            } => match operation {
                CookieOp::Set => {
                    if cookies.is_empty() {
                        return Err(Error::invalid_argument("set requires cookies"));
                    }
                    for cookie in cookies {
                        validate_cookie(cookie)?;
                    }
                }
                CookieOp::Delete => {
                    if name.is_none() {
                        return Err(Error::invalid_argument("delete requires a cookie name"));
                    }
                }
                CookieOp::Get | CookieOp::Clear => {}
            },
            Action::SetViewport { viewport } => viewport.validate()?,
            Action::SetUserAgent { user_agent } => {
                if user_agent.is_empty() || user_agent.len() > 1024 {
                    return Err(Error::invalid_argument("userAgent must be 1..=1024 chars"));
                }
            }
            Action::Upload {
                selector,
                file_path,
                ..
            } => {
                require_selector(selector)?;
                if file_path.is_empty() {
                    return Err(Error::invalid_argument("filePath must not be empty"));
                }
            }
            Action::HistoryNavigate { .. } | Action::Content {} | Action::Scroll { .. } => {}
        }
        Ok(())
    }
}

fn require_selector(selector: &str) -> Result<()> {
    if selector.trim().is_empty() {
        return Err(Error::invalid_argument("selector must not be empty"));
    }
    if selector.len() > 1024 {
        return Err(Error::invalid_argument("selector exceeds 1024 chars"));
    }
    Ok(())
}

fn validate_cookie(cookie: &CookieParam) -> Result<()> {
    if cookie.name.is_empty() {
        return Err(Error::invalid_argument("cookie name must not be empty"));
    }
    // SameSite=None without Secure is rejected by browsers; fail early.
    if matches!(cookie.same_site, Some(berth_types::SameSite::None)) && !cookie.secure {
        return Err(Error::invalid_argument(
            "SameSite=None requires the Secure attribute",
        ));
    }
    Ok(())
}

/// Parse a raw envelope into the closed action set. Unknown `type` values
/// are `UnsupportedAction`; everything else malformed is `InvalidArgument`.
pub fn parse_action(value: serde_json::Value) -> Result<Action> {
    match serde_json::from_value::<Action>(value) {
        Ok(action) => Ok(action),
        Err(e) => {
            let msg = e.to_string();
            if msg.contains("unknown variant") {
                Err(Error::unsupported_action(msg))
            } else {
                Err(Error::invalid_argument(format!("malformed action: {msg}")))
            }
        }
    }
}

/// The outcome of one action, success or not. History records are derived
/// from this; adapters serialize it directly.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub action_type: String,
    pub context_id: String,
    pub page_id: Option<String>,
    pub success: bool,
    /// Action-specific payload (`finalUrl`, `value`, image bytes, ...).
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOptions {
    /// Abort the batch on the first failed action.
    #[serde(default = "default_true")]
    pub stop_on_error: bool,
    /// Concurrent actions; above 1 every action must target a distinct page.
    #[serde(default = "default_parallel")]
    pub parallel: usize,
}

fn default_true() -> bool {
    true
}

fn default_parallel() -> usize {
    1
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            stop_on_error: true,
            parallel: 1,
        }
    }
}

impl BatchOptions {
    pub fn validate(&self, batch_len: usize) -> Result<()> {
        if batch_len == 0 {
            return Err(Error::invalid_argument("batch must not be empty"));
        }
        if batch_len > MAX_BATCH_SIZE {
            return Err(Error::invalid_argument(format!(
                "batch size {batch_len} exceeds {MAX_BATCH_SIZE}"
            )));
        }
        if self.parallel == 0 || self.parallel > 8 {
            return Err(Error::invalid_argument("parallel must be 1..=8"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tagged_parse_and_defaults() {
        let action = parse_action(json!({
            "type": "navigate",
            "url": "https://example.com",
            "waitUntil": "networkidle0"
        }))
        .unwrap();
        match action {
            Action::Navigate { url, wait_until, timeout_ms } => {
                assert_eq!(url, "https://example.com");
                assert_eq!(wait_until, WaitUntil::NetworkIdle0);
                assert!(timeout_ms.is_none());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_unsupported() {
        let err = parse_action(json!({"type": "teleport", "where": "home"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedAction);
    }

    #[test]
    fn malformed_known_type_is_invalid() {
        let err = parse_action(json!({"type": "click"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn url_length_boundary() {
        let base = "https://example.com/";
        let url_ok = format!("{}{}", base, "a".repeat(MAX_URL_LEN - base.len()));
        assert_eq!(url_ok.len(), MAX_URL_LEN);
        let action = Action::Navigate {
            url: url_ok,
            wait_until: WaitUntil::Load,
            timeout_ms: None,
        };
        assert!(action.validate().is_ok());

        let url_long = format!("{}{}", base, "a".repeat(MAX_URL_LEN + 1 - base.len()));
        let action = Action::Navigate {
            url: url_long,
            wait_until: WaitUntil::Load,
            timeout_ms: None,
        };
        assert!(action.validate().is_err());
    }

    #[test]
    fn text_length_cap() {
        let action = Action::Type {
            selector: "#input".into(),
            text: "x".repeat(MAX_TYPE_TEXT_LEN + 1),
            delay_ms: 0,
            timeout_ms: None,
        };
        assert!(action.validate().is_err());
    }

    #[test]
    fn wait_requires_exactly_one_target() {
        let none = Action::Wait {
            target: WaitTarget::default(),
            timeout_ms: None,
        };
        assert!(none.validate().is_err());

        let both = Action::Wait {
            target: WaitTarget {
                selector: Some("#a".into()),
                duration_ms: Some(10),
                function: None,
            },
            timeout_ms: None,
        };
        assert!(both.validate().is_err());

        let one = Action::Wait {
            target: WaitTarget {
                duration_ms: Some(10),
                ..WaitTarget::default()
            },
            timeout_ms: None,
        };
        assert!(one.validate().is_ok());
    }

    #[test]
    fn samesite_none_requires_secure() {
        let mut cookie = CookieParam::new("sid", "v");
        cookie.same_site = Some(berth_types::SameSite::None);
        let action = Action::Cookie {
            operation: CookieOp::Set,
            cookies: vec![cookie.clone()],
            name: None,
            domain: None,
        };
        assert!(action.validate().is_err());

        cookie.secure = true;
        let action = Action::Cookie {
            operation: CookieOp::Set,
            cookies: vec![cookie],
            name: None,
            domain: None,
        };
        assert!(action.validate().is_ok());
    }

    #[test]
    fn batch_size_boundary() {
        let opts = BatchOptions::default();
        assert!(opts.validate(MAX_BATCH_SIZE).is_ok());
        assert!(opts.validate(MAX_BATCH_SIZE + 1).is_err());
        assert!(opts.validate(0).is_err());
    }

    #[test]
    fn viewport_flattens() {
        let action = parse_action(json!({
            "type": "setViewport",
            "width": 1280,
            "height": 720
        }))
        .unwrap();
        match action {
            Action::SetViewport { viewport } => {
                assert_eq!(viewport.width, 1280);
                assert_eq!(viewport.height, 720);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }
}
