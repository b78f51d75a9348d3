//! Action model: the closed catalog of browser-automation steps.
//!
//! [`ActionKind`] is the catalog. It maps every `type` tag to the fields that
//! tag requires, and is consulted both when a task is authored (the editor
//! fetches it) and when a raw action is validated before execution.
//! [`Action::validate`] turns untyped JSON into a typed [`Action`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Every action type understood by the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Wait,
    Input,
    Click,
    OptionalClick,
    Submit,
    Checkbox,
    Select,
    Hover,
    Navigate,
    ClickAndNavigate,
    Extract,
    ExtractText,
    Screenshot,
    ScreenshotOcr,
    SwitchToNewWindow,
    SwitchToLatestTab,
    LoopClickExtract,
    FindLinksExtract,
    ExtractLinksByKeyword,
    MathCaptcha,
    ImageCaptcha,
    GeetestCaptcha,
}

/// Expected JSON shape of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldShape {
    /// Non-blank string.
    Text,
    /// Number strictly greater than zero.
    Seconds,
    /// Number greater than or equal to zero.
    Delay,
    /// Integer >= 1.
    Count,
    /// Boolean.
    Flag,
    /// Non-empty list of non-blank strings.
    Selectors,
}

fn field_shape(field: &str) -> FieldShape {
    match field {
        "seconds" => FieldShape::Seconds,
        "wait_after_click" | "wait_after_visit" => FieldShape::Delay,
        "max_links" | "max_retries" => FieldShape::Count,
        "checked" => FieldShape::Flag,
        "extract_selectors" => FieldShape::Selectors,
        _ => FieldShape::Text,
    }
}

impl ActionKind {
    /// The full catalog, in editor display order.
    pub const ALL: [ActionKind; 22] = [
        Self::Wait,
        Self::Input,
        Self::Click,
        Self::OptionalClick,
        Self::Submit,
        Self::Checkbox,
        Self::Select,
        Self::Hover,
        Self::Navigate,
        Self::ClickAndNavigate,
        Self::Extract,
        Self::ExtractText,
        Self::Screenshot,
        Self::ScreenshotOcr,
        Self::SwitchToNewWindow,
        Self::SwitchToLatestTab,
        Self::LoopClickExtract,
        Self::FindLinksExtract,
        Self::ExtractLinksByKeyword,
        Self::MathCaptcha,
        Self::ImageCaptcha,
        Self::GeetestCaptcha,
    ];

    /// The `type` tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wait => "wait",
            Self::Input => "input",
            Self::Click => "click",
            Self::OptionalClick => "optional_click",
            Self::Submit => "submit",
            Self::Checkbox => "checkbox",
            Self::Select => "select",
            Self::Hover => "hover",
            Self::Navigate => "navigate",
            Self::ClickAndNavigate => "click_and_navigate",
            Self::Extract => "extract",
            Self::ExtractText => "extract_text",
            Self::Screenshot => "screenshot",
            Self::ScreenshotOcr => "screenshot_ocr",
            Self::SwitchToNewWindow => "switch_to_new_window",
            Self::SwitchToLatestTab => "switch_to_latest_tab",
            Self::LoopClickExtract => "loop_click_extract",
            Self::FindLinksExtract => "find_links_extract",
            Self::ExtractLinksByKeyword => "extract_links_by_keyword",
            Self::MathCaptcha => "math_captcha",
            Self::ImageCaptcha => "image_captcha",
            Self::GeetestCaptcha => "geetest_captcha",
        }
    }

    /// Look up a kind by its `type` tag.
    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == tag)
    }

    /// Fields that must be present and non-empty.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Wait => &["seconds"],
            Self::Input | Self::Select => &["target", "value"],
            Self::Click
            | Self::OptionalClick
            | Self::Submit
            | Self::Hover
            | Self::ClickAndNavigate
            | Self::Extract => &["target"],
            Self::Checkbox => &["target", "checked"],
            Self::Navigate => &["url"],
            Self::ExtractText | Self::SwitchToNewWindow | Self::SwitchToLatestTab => &[],
            Self::Screenshot => &["filename"],
            Self::ScreenshotOcr => &["filename", "summary_prompt"],
            Self::LoopClickExtract => &["list_selector", "extract_selectors", "wait_after_click"],
            Self::FindLinksExtract => &[
                "match_text",
                "extract_selectors",
                "max_links",
                "wait_after_visit",
            ],
            Self::ExtractLinksByKeyword => &["keyword", "max_links", "wait_after_visit"],
            Self::MathCaptcha | Self::ImageCaptcha => &["input_selector", "submit_selector"],
            Self::GeetestCaptcha => &["target_type", "max_retries"],
        }
    }

    /// Fields accepted but not required.
    pub fn optional_fields(&self) -> &'static [&'static str] {
        match self {
            Self::MathCaptcha | Self::ImageCaptcha => &["keyword"],
            _ => &[],
        }
    }

    /// Short human-readable name.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Wait => "Wait",
            Self::Input => "Input",
            Self::Click => "Click",
            Self::OptionalClick => "Optional Click",
            Self::Submit => "Submit",
            Self::Checkbox => "Checkbox",
            Self::Select => "Select",
            Self::Hover => "Hover",
            Self::Navigate => "Navigate",
            Self::ClickAndNavigate => "Click and Navigate",
            Self::Extract => "Extract",
            Self::ExtractText => "Extract Page Text",
            Self::Screenshot => "Screenshot",
            Self::ScreenshotOcr => "Screenshot OCR",
            Self::SwitchToNewWindow => "Switch to New Window",
            Self::SwitchToLatestTab => "Switch to Latest Tab",
            Self::LoopClickExtract => "Loop Click Extract",
            Self::FindLinksExtract => "Find Links Extract",
            Self::ExtractLinksByKeyword => "Extract Links by Keyword",
            Self::MathCaptcha => "Math Captcha",
            Self::ImageCaptcha => "Image Captcha",
            Self::GeetestCaptcha => "GeeTest Captcha",
        }
    }

    /// What the step does.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Wait => "Wait for the given number of seconds before the next step",
            Self::Input => "Type a value into the matched element",
            Self::Click => "Click the matched element",
            Self::OptionalClick => "Click the matched element if it exists, otherwise skip",
            Self::Submit => "Click a submit button or submit the form",
            Self::Checkbox => "Set the checked state of a checkbox",
            Self::Select => "Choose an option from a dropdown",
            Self::Hover => "Move the pointer over the matched element",
            Self::Navigate => "Load the given URL",
            Self::ClickAndNavigate => "Read the link URL and navigate to it in the same window",
            Self::Extract => "Mark this element as a data extraction point",
            Self::ExtractText => "Capture all text on the current page",
            Self::Screenshot => "Save a screenshot of the current page",
            Self::ScreenshotOcr => "Take a screenshot and summarise it with a vision model",
            Self::SwitchToNewWindow => "Move control to the newly opened window",
            Self::SwitchToLatestTab => "Move control to the most recently opened tab",
            Self::LoopClickExtract => "Click each list entry and extract its detail page",
            Self::FindLinksExtract => "Visit links containing the given text and extract details",
            Self::ExtractLinksByKeyword => "Collect links matching a keyword and fetch their text",
            Self::MathCaptcha => "Solve an arithmetic image captcha",
            Self::ImageCaptcha => "Recognise and fill an alphanumeric image captcha",
            Self::GeetestCaptcha => "Solve a GeeTest icon or slider captcha",
        }
    }

    /// Catalog entry for authoring clients.
    pub fn spec(&self) -> ActionSpec {
        ActionSpec {
            action_type: *self,
            label: self.label(),
            description: self.description(),
            params: self.required_fields(),
            optional_params: self.optional_fields(),
        }
    }
}

/// Serializable catalog entry.
#[derive(Debug, Clone, Serialize)]
pub struct ActionSpec {
    #[serde(rename = "type")]
    pub action_type: ActionKind,
    pub label: &'static str,
    pub description: &'static str,
    pub params: &'static [&'static str],
    pub optional_params: &'static [&'static str],
}

/// A validated action step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Wait {
        seconds: f64,
    },
    Input {
        target: String,
        value: String,
    },
    Click {
        target: String,
    },
    OptionalClick {
        target: String,
    },
    Submit {
        target: String,
    },
    Checkbox {
        target: String,
        checked: bool,
    },
    Select {
        target: String,
        value: String,
    },
    Hover {
        target: String,
    },
    Navigate {
        url: String,
    },
    ClickAndNavigate {
        target: String,
    },
    Extract {
        target: String,
    },
    ExtractText,
    Screenshot {
        filename: String,
    },
    ScreenshotOcr {
        filename: String,
        summary_prompt: String,
    },
    SwitchToNewWindow,
    SwitchToLatestTab,
    LoopClickExtract {
        list_selector: String,
        extract_selectors: Vec<String>,
        wait_after_click: f64,
    },
    FindLinksExtract {
        match_text: String,
        extract_selectors: Vec<String>,
        max_links: u32,
        wait_after_visit: f64,
    },
    ExtractLinksByKeyword {
        keyword: String,
        max_links: u32,
        wait_after_visit: f64,
    },
    MathCaptcha {
        input_selector: String,
        submit_selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        keyword: Option<String>,
    },
    ImageCaptcha {
        input_selector: String,
        submit_selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        keyword: Option<String>,
    },
    GeetestCaptcha {
        target_type: String,
        max_retries: u32,
    },
}

impl Action {
    /// Validate an untyped action object against the catalog.
    ///
    /// Fields are checked in catalog order and the first problem is returned.
    /// Fields outside the variant's declared set are dropped.
    pub fn validate(raw: &Value) -> Result<Action, ValidationError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| ValidationError::invalid("action", "expected a JSON object"))?;

        let tag = match obj.get("type") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim(),
            Some(v) if !is_empty(v) => {
                return Err(ValidationError::invalid("type", "expected a string"))
            }
            _ => return Err(ValidationError::missing("type")),
        };
        let kind = ActionKind::parse(tag)
            .ok_or_else(|| ValidationError::UnknownType(tag.to_string()))?;

        let mut clean = Map::new();
        clean.insert("type".to_string(), Value::String(kind.as_str().to_string()));

        for field in kind.required_fields() {
            match obj.get(*field) {
                Some(v) if !is_empty(v) => {
                    check_shape(field, v)?;
                    clean.insert((*field).to_string(), v.clone());
                }
                _ => return Err(ValidationError::missing(*field)),
            }
        }
        for field in kind.optional_fields() {
            if let Some(v) = obj.get(*field).filter(|v| !is_empty(v)) {
                check_shape(field, v)?;
                clean.insert((*field).to_string(), v.clone());
            }
        }

        serde_json::from_value(Value::Object(clean))
            .map_err(|e| ValidationError::invalid(kind.as_str(), e.to_string()))
    }

    /// Catalog kind of this action.
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Wait { .. } => ActionKind::Wait,
            Self::Input { .. } => ActionKind::Input,
            Self::Click { .. } => ActionKind::Click,
            Self::OptionalClick { .. } => ActionKind::OptionalClick,
            Self::Submit { .. } => ActionKind::Submit,
            Self::Checkbox { .. } => ActionKind::Checkbox,
            Self::Select { .. } => ActionKind::Select,
            Self::Hover { .. } => ActionKind::Hover,
            Self::Navigate { .. } => ActionKind::Navigate,
            Self::ClickAndNavigate { .. } => ActionKind::ClickAndNavigate,
            Self::Extract { .. } => ActionKind::Extract,
            Self::ExtractText => ActionKind::ExtractText,
            Self::Screenshot { .. } => ActionKind::Screenshot,
            Self::ScreenshotOcr { .. } => ActionKind::ScreenshotOcr,
            Self::SwitchToNewWindow => ActionKind::SwitchToNewWindow,
            Self::SwitchToLatestTab => ActionKind::SwitchToLatestTab,
            Self::LoopClickExtract { .. } => ActionKind::LoopClickExtract,
            Self::FindLinksExtract { .. } => ActionKind::FindLinksExtract,
            Self::ExtractLinksByKeyword { .. } => ActionKind::ExtractLinksByKeyword,
            Self::MathCaptcha { .. } => ActionKind::MathCaptcha,
            Self::ImageCaptcha { .. } => ActionKind::ImageCaptcha,
            Self::GeetestCaptcha { .. } => ActionKind::GeetestCaptcha,
        }
    }

    /// One-line summary used in run logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Wait { seconds } => format!("{seconds}s"),
            Self::Input { target, value } => format!("{target} → \"{value}\""),
            Self::Select { target, value } => format!("{target} → {value}"),
            Self::Click { target }
            | Self::OptionalClick { target }
            | Self::Submit { target }
            | Self::Hover { target }
            | Self::ClickAndNavigate { target }
            | Self::Extract { target } => target.clone(),
            Self::Checkbox { target, checked } => format!("{target} = {checked}"),
            Self::Navigate { url } => url.clone(),
            Self::ExtractText => "all page text".to_string(),
            Self::Screenshot { filename } => filename.clone(),
            Self::ScreenshotOcr { filename, .. } => format!("OCR: {filename}"),
            Self::SwitchToNewWindow => "new window".to_string(),
            Self::SwitchToLatestTab => "latest tab".to_string(),
            Self::LoopClickExtract { list_selector, .. } => format!("each of {list_selector}"),
            Self::FindLinksExtract {
                match_text,
                max_links,
                ..
            } => format!("links matching \"{match_text}\" (max {max_links})"),
            Self::ExtractLinksByKeyword {
                keyword, max_links, ..
            } => format!("links with keyword \"{keyword}\" (max {max_links})"),
            Self::MathCaptcha {
                input_selector,
                submit_selector,
                ..
            }
            | Self::ImageCaptcha {
                input_selector,
                submit_selector,
                ..
            } => format!("{input_selector} → {submit_selector}"),
            Self::GeetestCaptcha {
                target_type,
                max_retries,
            } => format!("{target_type} (retries {max_retries})"),
        }
    }
}

fn is_empty(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn check_shape(field: &str, v: &Value) -> Result<(), ValidationError> {
    match field_shape(field) {
        FieldShape::Text => {
            if !v.is_string() {
                return Err(ValidationError::invalid(field, "expected a string"));
            }
        }
        FieldShape::Seconds => match v.as_f64() {
            Some(n) if n > 0.0 => {}
            Some(_) => return Err(ValidationError::invalid(field, "must be greater than 0")),
            None => return Err(ValidationError::invalid(field, "expected a number")),
        },
        FieldShape::Delay => match v.as_f64() {
            Some(n) if n >= 0.0 => {}
            Some(_) => return Err(ValidationError::invalid(field, "must not be negative")),
            None => return Err(ValidationError::invalid(field, "expected a number")),
        },
        FieldShape::Count => match v.as_u64() {
            Some(n) if n >= 1 && n <= u64::from(u32::MAX) => {}
            _ => return Err(ValidationError::invalid(field, "expected a positive integer")),
        },
        FieldShape::Flag => {
            if !v.is_boolean() {
                return Err(ValidationError::invalid(field, "expected true or false"));
            }
        }
        FieldShape::Selectors => {
            let ok = v
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .all(|s| s.as_str().is_some_and(|s| !s.trim().is_empty()))
                })
                .unwrap_or(false);
            if !ok {
                return Err(ValidationError::invalid(
                    field,
                    "expected a list of selectors",
                ));
            }
        }
    }
    Ok(())
}
