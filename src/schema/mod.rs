//! Declarative model schemas and the option validator.
//!
//! Every supported model is described by one static [`ModelSchema`] value.
//! Nothing outside this module branches on a model name; payload shape, CLI
//! surface and output naming are all read from the table.

use std::{collections::BTreeMap, fmt};

use serde::Serialize;

use crate::errors::ValidationError;

mod models;

pub use models::SCHEMAS;

/// Raw option bag as it arrives from the command line: payload key to text.
pub type RawOptions = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constraint {
    Choice(&'static [&'static str]),
    IntegerChoice(&'static [i64]),
    IntegerRange { min: i64, max: i64 },
    FloatRange { min: f64, max: f64 },
    Flag,
    Text,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Choice(choices) => write!(f, "one of {}", choices.join(", ")),
            Constraint::IntegerChoice(choices) => {
                let choices = choices.iter().map(i64::to_string).collect::<Vec<_>>();
                write!(f, "one of {}", choices.join(", "))
            }
            Constraint::IntegerRange { min, max } => write!(f, "an integer in {min}..={max}"),
            Constraint::FloatRange { min, max } => write!(f, "a number in {min:.1}..={max:.1}"),
            Constraint::Flag => write!(f, "true or false"),
            Constraint::Text => write!(f, "text"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    Text(&'static str),
    Integer(i64),
    Float(f64),
    Flag(bool),
}

impl DefaultValue {
    fn to_raw(self) -> String {
        match self {
            DefaultValue::Text(text) => text.to_string(),
            DefaultValue::Integer(value) => value.to_string(),
            DefaultValue::Float(value) => value.to_string(),
            DefaultValue::Flag(value) => value.to_string(),
        }
    }
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Text(text) if text.is_empty() => write!(f, "\"\""),
            _ => f.write_str(&self.to_raw()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Presence {
    Required,
    Default(DefaultValue),
    /// Left out of the payload entirely unless given.
    Optional,
}

#[derive(Debug, Clone, Copy)]
pub struct OptionSpec {
    /// Field name in the remote payload.
    pub key: &'static str,
    /// Long command line flag. For [`Constraint::Flag`] options this is a
    /// switch which sets the opposite of the default.
    pub flag: &'static str,
    pub help: &'static str,
    pub constraint: Constraint,
    pub presence: Presence,
}

/// How staged input URLs are merged into the payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputBinding {
    None,
    Single(&'static str),
    List(&'static str),
}

impl InputBinding {
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            InputBinding::None => count == 0,
            InputBinding::Single(_) => count == 1,
            InputBinding::List(_) => count >= 1,
        }
    }

    fn expected(&self) -> usize {
        match self {
            InputBinding::None => 0,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Positional {
    /// The input image or video reference.
    Input,
    /// A schema option given positionally, usually the prompt.
    Option(&'static str),
}

/// Where artifacts appear in the result document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArtifactField {
    List(&'static str),
    Single(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileLabel {
    None,
    Fixed(&'static str),
    WhenFlag {
        option: &'static str,
        when_set: &'static str,
        otherwise: &'static str,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct OutputLayout {
    pub artifacts: ArtifactField,
    /// Directory under the output root, e.g. `images/generated`.
    pub category: &'static str,
    pub extension: &'static str,
    pub prefix: Option<&'static str>,
    pub label: FileLabel,
    pub seed_in_name: bool,
}

#[derive(Debug)]
pub struct ModelSchema {
    /// Subcommand name.
    pub name: &'static str,
    pub model_id: &'static str,
    pub summary: &'static str,
    pub positionals: &'static [Positional],
    pub input: InputBinding,
    pub options: &'static [OptionSpec],
    pub output: OutputLayout,
}

impl ModelSchema {
    pub fn option(&self, key: &str) -> Option<&OptionSpec> {
        self.options.iter().find(|spec| spec.key == key)
    }

    /// Options exposed as `--flag`s, i.e. not taken positionally.
    pub fn flagged_options(&self) -> impl Iterator<Item = &OptionSpec> {
        self.options.iter().filter(|spec| {
            !self
                .positionals
                .iter()
                .any(|p| matches!(p, Positional::Option(key) if *key == spec.key))
        })
    }
}

pub fn find(name: &str) -> Option<&'static ModelSchema> {
    SCHEMAS.iter().copied().find(|schema| schema.name == name)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OptionValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Text(text) => f.write_str(text),
            OptionValue::Integer(value) => write!(f, "{value}"),
            OptionValue::Float(value) => write!(f, "{value}"),
            OptionValue::Flag(value) => write!(f, "{value}"),
        }
    }
}

/// Options after validation: every given or defaulted key, typed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedOptions {
    values: BTreeMap<&'static str, OptionValue>,
}

impl ValidatedOptions {
    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.values.get(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(OptionValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.values.get(key) {
            Some(OptionValue::Flag(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        match self.values.get(key) {
            Some(OptionValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &OptionValue)> {
        self.values.iter().map(|(key, value)| (*key, value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn invalid(spec: &OptionSpec, raw: &str) -> ValidationError {
    ValidationError::InvalidValue {
        name: spec.key.to_string(),
        value: raw.to_string(),
        constraint: spec.constraint.to_string(),
    }
}

fn parse_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|value| value.is_finite() && value.fract() == 0.0)
            .map(|value| value as i64)
    })
}

fn check(spec: &OptionSpec, raw: &str) -> Result<OptionValue, ValidationError> {
    match spec.constraint {
        Constraint::Choice(choices) => choices
            .iter()
            .find(|choice| **choice == raw)
            .map(|choice| OptionValue::Text(choice.to_string()))
            .ok_or_else(|| invalid(spec, raw)),
        Constraint::IntegerChoice(choices) => parse_integer(raw)
            .filter(|value| choices.contains(value))
            .map(OptionValue::Integer)
            .ok_or_else(|| invalid(spec, raw)),
        Constraint::IntegerRange { min, max } => parse_integer(raw)
            .filter(|value| (min..=max).contains(value))
            .map(OptionValue::Integer)
            .ok_or_else(|| invalid(spec, raw)),
        Constraint::FloatRange { min, max } => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite() && (min..=max).contains(value))
            .map(OptionValue::Float)
            .ok_or_else(|| invalid(spec, raw)),
        Constraint::Flag => match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(OptionValue::Flag(true)),
            "false" => Ok(OptionValue::Flag(false)),
            _ => Err(invalid(spec, raw)),
        },
        Constraint::Text => Ok(OptionValue::Text(raw.to_string())),
    }
}

/// Checks a raw option bag against `schema` and fills in defaults.
///
/// Defaults go through the same constraint check as given values, so a table
/// default outside its own allowed set is rejected instead of forwarded.
pub fn validate(
    raw: &RawOptions,
    schema: &ModelSchema,
) -> Result<ValidatedOptions, ValidationError> {
    if let Some(unknown) = raw.keys().find(|key| schema.option(key).is_none()) {
        return Err(ValidationError::UnknownOption(
            schema.name.to_string(),
            unknown.clone(),
        ));
    }

    let mut values = BTreeMap::new();
    for spec in schema.options {
        let value = match (raw.get(spec.key), spec.presence) {
            (Some(given), _) => check(spec, given)?,
            (None, Presence::Default(default)) => check(spec, &default.to_raw())?,
            (None, Presence::Required) => {
                return Err(ValidationError::MissingOption(
                    schema.name.to_string(),
                    spec.key.to_string(),
                ));
            }
            (None, Presence::Optional) => continue,
        };
        values.insert(spec.key, value);
    }

    Ok(ValidatedOptions { values })
}

pub fn validate_inputs(schema: &ModelSchema, inputs: &[String]) -> Result<(), ValidationError> {
    if schema.input.accepts(inputs.len()) {
        return Ok(());
    }
    Err(ValidationError::InputCount {
        model: schema.name.to_string(),
        expected: schema.input.expected(),
        given: inputs.len(),
    })
}

/// One invocation's request, fixed once built.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    schema: &'static ModelSchema,
    inputs: Vec<String>,
    options: RawOptions,
}

impl GenerationRequest {
    pub fn new(schema: &'static ModelSchema, inputs: Vec<String>, options: RawOptions) -> Self {
        Self {
            schema,
            inputs,
            options,
        }
    }

    pub fn schema(&self) -> &'static ModelSchema {
        self.schema
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn options(&self) -> &RawOptions {
        &self.options
    }
}
