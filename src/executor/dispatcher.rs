//! Scripted action sequences over named elements of the UI map.
//!
//! A script is a TOML or JSON document with a list of `steps`; each step is
//! tagged by `action`. Steps run strictly in order and the run stops at the
//! first failing step unless `continue_on_failure` is set.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::element::actions::{ClickOptions, InsertOptions, Via};
use crate::element::tree::UiTree;
use crate::errors::{MarketError, MarketResult};
use crate::executor::coordinator::Coordinator;
use crate::executor::input::{split_combo, MouseButton};
use crate::perception::types::{Point, Region};
use crate::perception::wait::Deadline;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub continue_on_failure: bool,
    #[serde(default)]
    pub steps: Vec<ScriptAction>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViaKind {
    #[default]
    Coordinates,
    Image,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptAction {
    Click {
        element: String,
        #[serde(default)]
        offset: Option<[i32; 2]>,
        #[serde(default)]
        confidence: Option<f64>,
        #[serde(default)]
        button: MouseButton,
        #[serde(default = "default_repeat")]
        repeat: u32,
        #[serde(default)]
        delay_ms: Option<u64>,
        #[serde(default)]
        walk: bool,
        #[serde(default)]
        via: ViaKind,
        /// Text to search for when `via = "text"`.
        #[serde(default)]
        needle: Option<String>,
        #[serde(default)]
        region: Option<Region>,
        #[serde(default)]
        fail_safe: bool,
    },
    Insert {
        element: String,
        text: String,
        #[serde(default)]
        interval_ms: u64,
        #[serde(default)]
        enter: bool,
        #[serde(default = "default_true")]
        clear: bool,
        #[serde(default)]
        offset: Option<[i32; 2]>,
        #[serde(default)]
        via: ViaKind,
        #[serde(default)]
        needle: Option<String>,
        #[serde(default)]
        region: Option<Region>,
    },
    WaitVisible {
        element: String,
        /// Falls back to the configured visibility timeout.
        #[serde(default)]
        timeout_ms: Option<u64>,
        /// Wait without a deadline; takes precedence over `timeout_ms`.
        #[serde(default)]
        forever: bool,
        #[serde(default)]
        confidence: Option<f64>,
    },
    WaitText {
        text: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
        #[serde(default)]
        forever: bool,
        #[serde(default)]
        region: Option<Region>,
    },
    Relocate {
        element: String,
        #[serde(default)]
        confidence: Option<f64>,
    },
    /// Hover over an element, a reference image or on-screen text; exactly
    /// one of the three must be set.
    MoveTo {
        #[serde(default)]
        element: Option<String>,
        #[serde(default)]
        image: Option<String>,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        offset: Option<[i32; 2]>,
        #[serde(default)]
        region: Option<Region>,
        #[serde(default)]
        confidence: Option<f64>,
    },
    Hotkey {
        keys: String,
    },
    Sleep {
        ms: u64,
    },
}

fn default_repeat() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl ScriptAction {
    pub fn describe(&self) -> String {
        match self {
            ScriptAction::Click { element, walk: true, .. } => format!("click {element} (walk)"),
            ScriptAction::Click { element, .. } => format!("click {element}"),
            ScriptAction::Insert { element, text, .. } => format!("insert {text:?} into {element}"),
            ScriptAction::WaitVisible { element, .. } => format!("wait for {element}"),
            ScriptAction::WaitText { text, .. } => format!("wait for text {text:?}"),
            ScriptAction::Relocate { element, .. } => format!("relocate {element}"),
            ScriptAction::MoveTo {
                element: Some(element), ..
            } => format!("move to {element}"),
            ScriptAction::MoveTo { image: Some(image), .. } => format!("move to image {image}"),
            ScriptAction::MoveTo { text: Some(text), .. } => format!("move to text {text:?}"),
            ScriptAction::MoveTo { .. } => "move to nothing".to_string(),
            ScriptAction::Hotkey { keys } => format!("hotkey {keys}"),
            ScriptAction::Sleep { ms } => format!("sleep {ms}ms"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub action: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub steps: Vec<StepReport>,
    /// Steps never attempted because an earlier one failed.
    pub skipped: usize,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.skipped == 0 && self.steps.iter().all(|s| s.success)
    }
}

/// Parse a script; `.json` files are JSON, everything else TOML.
pub fn load_script(path: &Path) -> MarketResult<Script> {
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let script: Script = if is_json {
        serde_json::from_str(&content)?
    } else {
        toml::from_str(&content)?
    };
    tracing::info!(path = %path.display(), steps = script.steps.len(), "script loaded");
    Ok(script)
}

pub fn run_script(tree: &mut UiTree, coord: &mut Coordinator, script: &Script) -> RunReport {
    let mut report = RunReport::default();
    for (index, action) in script.steps.iter().enumerate() {
        let description = action.describe();
        tracing::info!(step = index, action = %description, "running step");
        let outcome = dispatch(tree, coord, action);
        let step = match outcome {
            Ok(true) => StepReport {
                index,
                action: description,
                success: true,
                error: None,
            },
            Ok(false) => StepReport {
                index,
                action: description,
                success: false,
                error: None,
            },
            Err(e) => StepReport {
                index,
                action: description,
                success: false,
                error: Some(e.to_string()),
            },
        };
        let failed = !step.success;
        if failed {
            tracing::warn!(step = index, action = %step.action, error = ?step.error, "step failed");
        }
        report.steps.push(step);
        if failed && !script.continue_on_failure {
            report.skipped = script.steps.len() - index - 1;
            break;
        }
    }
    report
}

/// Run one action. `Ok(false)` is an ordinary miss; `Err` a broken step.
pub fn dispatch(tree: &mut UiTree, coord: &mut Coordinator, action: &ScriptAction) -> MarketResult<bool> {
    match action {
        ScriptAction::Click {
            element,
            offset,
            confidence,
            button,
            repeat,
            delay_ms,
            walk,
            via,
            needle,
            region,
            fail_safe,
        } => {
            let el = lookup(tree, element)?;
            let mut options = ClickOptions::default()
                .offset(offset.map(Point::from).unwrap_or_default())
                .button(*button)
                .repeat(*repeat)
                .walk(*walk)
                .via(resolve_via(*via, needle.as_deref(), *region)?)
                .fail_safe(*fail_safe);
            if let Some(c) = confidence {
                options = options.confidence(*c);
            }
            if let Some(ms) = delay_ms {
                options = options.delay(Duration::from_millis(*ms));
            }
            Ok(el.click(coord, &options))
        }
        ScriptAction::Insert {
            element,
            text,
            interval_ms,
            enter,
            clear,
            offset,
            via,
            needle,
            region,
        } => {
            let el = lookup(tree, element)?;
            let options = InsertOptions {
                interval: Duration::from_millis(*interval_ms),
                enter: *enter,
                offset: offset.map(Point::from).unwrap_or_default(),
                via: resolve_via(*via, needle.as_deref(), *region)?,
                clear: *clear,
            };
            Ok(el.insert(coord, text, &options))
        }
        ScriptAction::WaitVisible {
            element,
            timeout_ms,
            forever,
            confidence,
        } => {
            let el = lookup(tree, element)?;
            let deadline = deadline_for(coord, *timeout_ms, *forever);
            let confidence = confidence.unwrap_or(coord.timing().confidence);
            match deadline {
                Deadline::After(timeout) => Ok(el.is_visible(coord, confidence, timeout)),
                Deadline::Never => Ok(el.wait_till_visible(coord, Deadline::Never)),
            }
        }
        ScriptAction::WaitText {
            text,
            timeout_ms,
            forever,
            region,
        } => {
            let deadline = deadline_for(coord, *timeout_ms, *forever);
            Ok(coord.wait_text(text, deadline, *region).is_some())
        }
        ScriptAction::Relocate { element, confidence } => {
            let id = tree
                .find(element)
                .ok_or_else(|| MarketError::Script(format!("unknown element '{element}'")))?;
            let confidence = confidence.unwrap_or(coord.timing().confidence);
            Ok(tree.relocate(id, coord, confidence))
        }
        ScriptAction::MoveTo {
            element,
            image,
            text,
            offset,
            region,
            confidence,
        } => {
            let offset = offset.map(Point::from).unwrap_or_default();
            match (element, image, text) {
                (Some(element), None, None) => {
                    let el = lookup(tree, element)?;
                    Ok(el.move_to(coord, el.location().map(|at| at + offset)))
                }
                (None, Some(image), None) => {
                    let confidence = confidence.unwrap_or(coord.timing().confidence);
                    Ok(coord.move_to_image(image, offset, confidence))
                }
                (None, None, Some(text)) => Ok(coord.move_to_text(text, offset, *region)),
                _ => Err(MarketError::Script(
                    "move_to needs exactly one of element, image or text".into(),
                )),
            }
        }
        ScriptAction::Hotkey { keys } => {
            let combo = split_combo(keys);
            if combo.is_empty() {
                return Err(MarketError::Script("hotkey without keys".into()));
            }
            coord.hotkey(&combo)?;
            Ok(true)
        }
        ScriptAction::Sleep { ms } => {
            coord.sleep(Duration::from_millis(*ms));
            Ok(true)
        }
    }
}

fn lookup<'t>(tree: &'t UiTree, name: &str) -> MarketResult<crate::element::Element<'t>> {
    tree.get(name)
        .ok_or_else(|| MarketError::Script(format!("unknown element '{name}'")))
}

fn resolve_via(kind: ViaKind, needle: Option<&str>, region: Option<Region>) -> MarketResult<Via> {
    match kind {
        ViaKind::Coordinates => Ok(Via::Coordinates),
        ViaKind::Image => Ok(Via::Image),
        ViaKind::Text => {
            let needle = needle
                .filter(|n| !n.is_empty())
                .ok_or_else(|| MarketError::Script("via = \"text\" requires a needle".into()))?;
            Ok(Via::Text {
                needle: needle.to_string(),
                region,
            })
        }
    }
}

fn deadline_for(coord: &Coordinator, timeout_ms: Option<u64>, forever: bool) -> Deadline {
    if forever {
        return Deadline::Never;
    }
    Deadline::After(
        timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(coord.timing().visible_timeout),
    )
}
