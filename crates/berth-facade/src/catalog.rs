//! Machine-readable capability catalog.
//!
//! Adapters serve this for discovery; the shapes mirror the action
//! envelope exactly, so a client can build requests from it.

use serde_json::json;

pub fn catalog() -> serde_json::Value {
    json!({
        "service": "berth",
        "version": env!("CARGO_PKG_VERSION"),
        "actions": [
            {
                "type": "navigate",
                "required": { "url": "string (max 2048 chars, http/https)" },
                "optional": {
                    "waitUntil": ["load", "domcontentloaded", "networkidle0", "networkidle2"],
                    "timeoutMs": "integer"
                },
                "returns": { "finalUrl": "string", "statusCode": "integer?" },
                "errors": ["InvalidArgument", "BlockedByPolicy", "Timeout", "UpstreamProxyFailure"]
            },
            {
                "type": "click",
                "required": { "selector": "string" },
                "optional": {
                    "button": ["left", "right", "middle"],
                    "clickCount": "integer (1..=3)",
                    "delayMs": "integer",
                    "timeoutMs": "integer"
                },
                "returns": {},
                "errors": ["NotFound", "Timeout", "BrowserCrashed"]
            },
            {
                "type": "type",
                "required": { "selector": "string", "text": "string (max 100 KiB)" },
                "optional": { "delayMs": "integer", "timeoutMs": "integer" },
                "returns": {},
                "errors": ["NotFound", "Timeout", "BrowserCrashed"]
            },
            {
                "type": "select",
                "required": { "selector": "string", "values": "string[]" },
                "returns": { "selected": "string[]" },
                "errors": ["NotFound", "Timeout"]
            },
            { "type": "hover", "required": { "selector": "string" }, "returns": {} },
            { "type": "focus", "required": { "selector": "string" }, "returns": {} },
            { "type": "blur", "required": { "selector": "string" }, "returns": {} },
            {
                "type": "screenshot",
                "optional": {
                    "selector": "string",
                    "fullPage": "bool",
                    "format": ["png", "jpeg"],
                    "quality": "integer (0..=100, jpeg only)",
                    "clip": { "x": "number", "y": "number", "width": "number", "height": "number" }
                },
                "returns": { "image": "base64", "format": "string", "size": "integer" }
            },
            {
                "type": "pdf",
                "optional": {
                    "landscape": "bool",
                    "printBackground": "bool",
                    "scale": "number (0.1..=2.0)",
                    "paperWidth": "number",
                    "paperHeight": "number",
                    "pageRanges": "string"
                },
                "returns": { "pdf": "base64", "size": "integer" }
            },
            {
                "type": "evaluate",
                "required": { "code": "string" },
                "optional": { "args": "json[]", "timeoutMs": "integer" },
                "returns": { "value": "json" },
                "errors": ["BlockedByPolicy", "ScriptRuntimeError", "Timeout"]
            },
            {
                "type": "wait",
                "required": { "one of": ["selector", "function", "durationMs"] },
                "optional": { "timeoutMs": "integer" },
                "returns": {},
                "errors": ["Timeout", "BlockedByPolicy"]
            },
            {
                "type": "cookie",
                "required": { "operation": ["set", "get", "delete", "clear"] },
                "optional": { "cookies": "cookie[]", "name": "string", "domain": "string" },
                "returns": { "cookies": "cookie[]? (get)" },
                "notes": "SameSite=None requires Secure"
            },
            {
                "type": "historyNavigate",
                "required": { "direction": ["back", "forward", "refresh"] },
                "returns": { "finalUrl": "string", "statusCode": "integer?" },
                "errors": ["InvalidArgument"]
            },
            {
                "type": "setViewport",
                "required": { "width": "integer (100..=7680)", "height": "integer (100..=4320)" },
                "optional": {
                    "deviceScaleFactor": "number (0.1..=5.0)",
                    "hasTouch": "bool",
                    "isMobile": "bool",
                    "isLandscape": "bool"
                },
                "returns": { "viewport": "viewport" }
            },
            { "type": "setUserAgent", "required": { "userAgent": "string" }, "returns": {} },
            { "type": "content", "returns": { "content": "html string" } },
            { "type": "scroll", "optional": { "dx": "number", "dy": "number" }, "returns": {} },
            {
                "type": "upload",
                "required": { "selector": "string", "filePath": "string (under the configured prefix)" },
                "returns": {},
                "errors": ["BlockedByPolicy", "NotFound"]
            }
        ],
        "batch": { "maxSize": 100, "options": { "stopOnError": "bool (default true)", "parallel": "integer (1..=8)" } },
        "frontends": [
            { "protocol": "http", "path": "/api/v1" },
            { "protocol": "ws", "path": "/ws/events" },
            { "protocol": "rpc", "framing": "newline-delimited json over tcp" },
            { "protocol": "tool", "surface": "in-process" }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lists_every_action_type() {
        let catalog = catalog();
        let actions = catalog["actions"].as_array().unwrap();
        let types: Vec<&str> = actions
            .iter()
            .map(|a| a["type"].as_str().unwrap())
            .collect();
        for expected in [
            "navigate", "click", "type", "select", "hover", "focus", "blur", "screenshot",
            "pdf", "evaluate", "wait", "cookie", "historyNavigate", "setViewport",
            "setUserAgent", "content", "scroll", "upload",
        ] {
            assert!(types.contains(&expected), "missing {expected}");
        }
        assert_eq!(catalog["batch"]["maxSize"], 100);
    }
}
