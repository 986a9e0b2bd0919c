//! Validation System - Structural Rules over Raw Markup
//!
//! Rules are independent text-pattern predicates, not a parser.
//! The validator runs them in a fixed order and stops at the first failure.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use crate::config::ValidationConfig;

pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

/// Lower-cased tag names the elements rule accepts.
pub static SUPPORTED_ELEMENTS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "svg", "g", "defs", "symbol", "use", "switch",
        "path", "rect", "circle", "ellipse", "line", "polyline", "polygon",
        "text", "tspan", "textpath",
        "title", "desc", "metadata", "style",
        "lineargradient", "radialgradient", "stop",
        "clippath", "mask", "pattern", "marker", "image",
        "filter", "feblend", "fecolormatrix", "fecomponenttransfer", "fecomposite",
        "feconvolvematrix", "fediffuselighting", "fedisplacementmap", "fedistantlight",
        "fedropshadow", "feflood", "fefunca", "fefuncb", "fefuncg", "fefuncr",
        "fegaussianblur", "feimage", "femerge", "femergenode", "femorphology",
        "feoffset", "fepointlight", "fespecularlighting", "fespotlight", "fetile",
        "feturbulence",
    ]
    .into_iter()
    .collect()
});

static ROOT_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<svg[\s>/]").unwrap());
static NAMESPACE_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"xmlns\s*=\s*["']http://www\.w3\.org/2000/svg["']"#).unwrap()
});
static OPENING_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([A-Za-z][\w:.-]*)").unwrap());
static SELF_CLOSING_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[A-Za-z][^>]*/>").unwrap());
static CLOSING_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</[A-Za-z][\w:.-]*\s*>").unwrap());
static CONTENT_ELEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<(path|rect|circle|ellipse|line|polyline|polygon|text|g)[\s/>]").unwrap()
});
static VIEW_BOX_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\sviewBox\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());
static VIEW_BOX_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s,]+").unwrap());
static VIEW_BOX_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(&format!("^{}$", NUMBER)).unwrap());
static WIDTH_ATTR: Lazy<Regex> = Lazy::new(|| dimension_attr("width"));
static HEIGHT_ATTR: Lazy<Regex> = Lazy::new(|| dimension_attr("height"));
static STYLE_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\sstyle\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());
static STYLE_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[A-Za-z0-9-]+\s*:\s*[^;\s][^;]*?\s*(?:;\s*[A-Za-z0-9-]+\s*:\s*[^;\s][^;]*?\s*)*;?\s*$")
        .unwrap()
});
static TRANSFORM_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\stransform\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());
static TRANSFORM_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[A-Za-z]+\s*\([^()]*\)(?:[\s,]+[A-Za-z]+\s*\([^()]*\))*\s*$").unwrap()
});

/// Plain decimal number, optional sign and exponent.
const NUMBER: &str = r"[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?";

fn dimension_attr(name: &str) -> Regex {
    let pattern = format!(r#"\s{name}\s*=\s*["']\s*({NUMBER})"#);
    Regex::new(&pattern).unwrap()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Structure,
    ViewBox,
    Dimensions,
    Attributes,
    Elements,
}

impl RuleKind {
    pub fn name(self) -> &'static str {
        match self {
            RuleKind::Structure => "structure",
            RuleKind::ViewBox => "view_box",
            RuleKind::Dimensions => "dimensions",
            RuleKind::Attributes => "attributes",
            RuleKind::Elements => "elements",
        }
    }

    pub fn enabled_in(self, config: &ValidationConfig) -> bool {
        match self {
            RuleKind::Structure => config.structure,
            RuleKind::ViewBox => config.view_box,
            RuleKind::Dimensions => config.dimensions,
            RuleKind::Attributes => config.attributes,
            RuleKind::Elements => config.elements,
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("SVG markup is empty")]
    EmptyInput,

    #[error("{rule} check failed: {message}")]
    Rule { rule: RuleKind, message: String },
}

impl ValidationError {
    fn rule(rule: RuleKind, message: impl Into<String>) -> Self {
        ValidationError::Rule { rule, message: message.into() }
    }

    pub fn rule_kind(&self) -> Option<RuleKind> {
        match self {
            ValidationError::EmptyInput => None,
            ValidationError::Rule { rule, .. } => Some(*rule),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationViolation {
    /// `None` for empty input, which fails before any rule runs.
    pub rule: Option<RuleKind>,
    pub message: String,
}

/// Every enabled rule's outcome, without short-circuiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub rules_run: Vec<RuleKind>,
    pub violations: Vec<ValidationViolation>,
}

/// Validation rule trait - one independent predicate over markup text
pub trait ValidationRule: Send + Sync {
    fn kind(&self) -> RuleKind;

    /// Returns the failure message for the first offending construct.
    fn check(&self, markup: &str, config: &ValidationConfig) -> Result<(), String>;
}

// --- Concrete Rules ---

pub struct StructureRule;

impl ValidationRule for StructureRule {
    fn kind(&self) -> RuleKind { RuleKind::Structure }

    fn check(&self, markup: &str, _config: &ValidationConfig) -> Result<(), String> {
        if !ROOT_TAG.is_match(markup) {
            return Err("missing root tag <svg>".to_string());
        }
        if !NAMESPACE_DECL.is_match(markup) {
            return Err(format!("missing namespace declaration xmlns=\"{}\"", SVG_NAMESPACE));
        }

        // Counts only; mismatched names and nesting go unnoticed.
        let opening = OPENING_TAG.find_iter(markup).count();
        let self_closing = SELF_CLOSING_TAG.find_iter(markup).count();
        let closing = CLOSING_TAG.find_iter(markup).count();
        if opening - self_closing.min(opening) != closing {
            return Err(format!(
                "unbalanced tags: {} opening, {} self-closing, {} closing",
                opening, self_closing, closing
            ));
        }

        if !CONTENT_ELEMENT.is_match(markup) {
            return Err("document lacks valid content elements".to_string());
        }
        Ok(())
    }
}

pub struct ViewBoxRule;

impl ValidationRule for ViewBoxRule {
    fn kind(&self) -> RuleKind { RuleKind::ViewBox }

    fn check(&self, markup: &str, _config: &ValidationConfig) -> Result<(), String> {
        let caps = VIEW_BOX_ATTR
            .captures(markup)
            .ok_or_else(|| "missing viewBox attribute".to_string())?;
        let raw = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());

        let tokens: Vec<&str> = VIEW_BOX_SEPARATOR
            .split(raw.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.len() != 4 {
            return Err(format!("invalid format for viewBox \"{}\": expected 4 numbers", raw));
        }

        let mut values = [0.0f64; 4];
        for (slot, token) in values.iter_mut().zip(&tokens) {
            *slot = Some(*token)
                .filter(|t| VIEW_BOX_NUMBER.is_match(t))
                .and_then(|t| t.parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .ok_or_else(|| format!("invalid format for viewBox \"{}\": {} is not a number", raw, token))?;
        }

        let (width, height) = (values[2], values[3]);
        if !(width > 0.0 && height > 0.0) {
            return Err(format!(
                "invalid dimensions in viewBox \"{}\": width and height must be positive",
                raw
            ));
        }
        Ok(())
    }
}

pub struct DimensionsRule;

impl DimensionsRule {
    fn leading_number(re: &Regex, markup: &str) -> Option<f64> {
        re.captures(markup)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

impl ValidationRule for DimensionsRule {
    fn kind(&self) -> RuleKind { RuleKind::Dimensions }

    fn check(&self, markup: &str, config: &ValidationConfig) -> Result<(), String> {
        // First occurrence of each attribute; values without a numeric prefix are skipped.
        for (name, re) in [("width", &*WIDTH_ATTR), ("height", &*HEIGHT_ATTR)] {
            if let Some(value) = Self::leading_number(re, markup) {
                if !config.dimension_in_range(value) {
                    return Err(format!(
                        "{} out of range: {} not within [{}, {}]",
                        name, value, config.min_dimension, config.max_dimension
                    ));
                }
            }
        }
        Ok(())
    }
}

pub struct AttributesRule;

impl AttributesRule {
    fn first_nonconforming(attr: &Regex, value: &Regex, markup: &str) -> Option<String> {
        attr.captures_iter(markup)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|m| m.as_str())
            .find(|raw| !value.is_match(raw))
            .map(str::to_string)
    }
}

impl ValidationRule for AttributesRule {
    fn kind(&self) -> RuleKind { RuleKind::Attributes }

    fn check(&self, markup: &str, _config: &ValidationConfig) -> Result<(), String> {
        if let Some(raw) = Self::first_nonconforming(&STYLE_ATTR, &STYLE_VALUE, markup) {
            return Err(format!("invalid style attribute: \"{}\"", raw));
        }
        if let Some(raw) = Self::first_nonconforming(&TRANSFORM_ATTR, &TRANSFORM_VALUE, markup) {
            return Err(format!("invalid transform attribute: \"{}\"", raw));
        }
        Ok(())
    }
}

pub struct ElementsRule;

impl ValidationRule for ElementsRule {
    fn kind(&self) -> RuleKind { RuleKind::Elements }

    fn check(&self, markup: &str, _config: &ValidationConfig) -> Result<(), String> {
        for caps in OPENING_TAG.captures_iter(markup) {
            let name = caps[1].to_ascii_lowercase();
            if !SUPPORTED_ELEMENTS.contains(name.as_str()) {
                return Err(format!("unsupported element: <{}>", name));
            }
        }
        Ok(())
    }
}

/// Validator runs rules in order against a config
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(StructureRule),
                Box::new(ViewBoxRule),
                Box::new(DimensionsRule),
                Box::new(AttributesRule),
                Box::new(ElementsRule),
            ],
        }
    }

    /// Swap in a different implementation for one rule kind, keeping its position.
    pub fn with_rule(mut self, rule: Box<dyn ValidationRule>) -> Self {
        match self.rules.iter().position(|r| r.kind() == rule.kind()) {
            Some(idx) => self.rules[idx] = rule,
            None => self.rules.push(rule),
        }
        self
    }

    pub fn validate(&self, markup: &str, config: &ValidationConfig) -> Result<(), ValidationError> {
        let trimmed = markup.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyInput);
        }

        for rule in &self.rules {
            if !rule.kind().enabled_in(config) {
                continue;
            }
            rule.check(trimmed, config)
                .map_err(|message| ValidationError::rule(rule.kind(), message))?;
        }
        Ok(())
    }

    pub fn report(&self, markup: &str, config: &ValidationConfig) -> ValidationReport {
        let trimmed = markup.trim();
        let mut rules_run = vec![];
        let mut violations = vec![];

        if trimmed.is_empty() {
            violations.push(ValidationViolation {
                rule: None,
                message: ValidationError::EmptyInput.to_string(),
            });
        } else {
            for rule in self.rules.iter().filter(|r| r.kind().enabled_in(config)) {
                rules_run.push(rule.kind());
                if let Err(message) = rule.check(trimmed, config) {
                    violations.push(ValidationViolation { rule: Some(rule.kind()), message });
                }
            }
        }

        ValidationReport {
            valid: violations.is_empty(),
            rules_run,
            violations,
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

static DEFAULT_VALIDATOR: Lazy<Validator> = Lazy::new(Validator::new);

/// Validate with the default rule set.
pub fn validate(markup: &str, config: &ValidationConfig) -> Result<(), ValidationError> {
    DEFAULT_VALIDATOR.validate(markup, config)
}
