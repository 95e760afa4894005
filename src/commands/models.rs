use std::fmt::Write;

use crate::schema::{Constraint, DefaultValue, ModelSchema, Positional, Presence, SCHEMAS};

fn usage(schema: &ModelSchema) -> String {
    let positionals = schema
        .positionals
        .iter()
        .map(|positional| match positional {
            Positional::Input => "<INPUT>".to_string(),
            Positional::Option(key) => format!("<{}>", key.to_uppercase()),
        })
        .collect::<Vec<_>>();
    format!("falgen {} {} [OPTIONS]", schema.name, positionals.join(" "))
}

fn describe(presence: &Presence) -> String {
    match presence {
        Presence::Required => "required".to_string(),
        Presence::Default(value) => format!("default {value}"),
        Presence::Optional => "optional".to_string(),
    }
}

/// Renders the model listing printed by `falgen models`.
pub fn render() -> String {
    let mut out = String::new();
    for schema in SCHEMAS {
        let _ = writeln!(out, "{} ({})", schema.name, schema.model_id);
        let _ = writeln!(out, "  {}", schema.summary);
        let _ = writeln!(out, "  usage: {}", usage(schema));
        let _ = writeln!(out, "  output: {}", schema.output.category);
        for spec in schema.flagged_options() {
            let (flag, detail) = match (spec.constraint, spec.presence) {
                (Constraint::Flag, Presence::Default(DefaultValue::Flag(default))) => (
                    format!("--{}", spec.flag),
                    format!("sets {} to {}", spec.key, !default),
                ),
                (constraint, presence) => (
                    format!("--{} <{}>", spec.flag, spec.key.to_uppercase()),
                    format!("{constraint}; {}", describe(&presence)),
                ),
            };
            let _ = writeln!(out, "    {flag:<32} {} ({detail})", spec.help);
        }
        out.push('\n');
    }
    out
}

pub fn process_models() {
    print!("{}", render());
}
