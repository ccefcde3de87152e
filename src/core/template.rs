//! Minimal template engine for configuration strings
//!
//! Supports `{{ .Field }}`, `{{ .Env.NAME }}` and `{{ urlPathEscape .Field }}`.
//! Rendering happens before values reach a release client, so any failure
//! here is a configuration error.

use crate::core::context::Context;
use crate::core::error::PublishError;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use std::collections::HashMap;

const EXPRESSION_PATTERN: &str =
    r"\{\{\s*(?:(?P<func>[A-Za-z]+)\s+)?\.(?P<path>[A-Za-z][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?)\s*\}\}";

/// Bytes left as-is in a path segment: unreserved plus sub-delimiters, `:` and `@`
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b',')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'@');

/// Template renderer bound to one run context
#[derive(Debug, Clone)]
pub struct Template {
    fields: HashMap<String, String>,
    env: HashMap<String, String>,
}

impl Template {
    pub fn new(ctx: &Context) -> Self {
        let mut fields = HashMap::new();
        fields.insert("ProjectName".to_string(), ctx.config.project_name.clone());
        fields.insert("Tag".to_string(), ctx.git.current_tag.clone());
        fields.insert(
            "PreviousTag".to_string(),
            ctx.git.previous_tag.clone().unwrap_or_default(),
        );
        fields.insert("Version".to_string(), ctx.version.clone());
        fields.insert("Commit".to_string(), ctx.git.commit.clone());
        fields.insert(
            "ShortCommit".to_string(),
            ctx.git.commit.chars().take(7).collect(),
        );
        fields.insert("Date".to_string(), ctx.date.to_rfc3339());

        Self {
            fields,
            env: ctx.env.clone(),
        }
    }

    /// Add or override a field for this render only
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Render a template string
    pub fn apply(&self, input: &str) -> Result<String, PublishError> {
        let pattern = Regex::new(EXPRESSION_PATTERN).map_err(|e| self.error(input, e.to_string()))?;

        let mut output = String::with_capacity(input.len());
        let mut last = 0;
        for cap in pattern.captures_iter(input) {
            let whole = cap.get(0).ok_or_else(|| self.error(input, "empty match"))?;
            output.push_str(self.literal(input, &input[last..whole.start()])?);

            let value = self.resolve(input, &cap["path"])?;
            let value = match cap.name("func").map(|m| m.as_str()) {
                None => value,
                Some("urlPathEscape") => url_path_escape(&value),
                Some(other) => {
                    return Err(self.error(input, format!("function {:?} not defined", other)));
                }
            };
            output.push_str(&value);
            last = whole.end();
        }

        output.push_str(self.literal(input, &input[last..])?);

        Ok(output)
    }

    /// Text between expressions; a leftover `{{` is an expression the pattern rejected
    fn literal<'a>(&self, input: &str, text: &'a str) -> Result<&'a str, PublishError> {
        if text.contains("{{") {
            return Err(self.error(input, "unterminated or malformed expression"));
        }
        Ok(text)
    }

    fn resolve(&self, input: &str, path: &str) -> Result<String, PublishError> {
        if let Some(name) = path.strip_prefix("Env.") {
            return self
                .env
                .get(name)
                .cloned()
                .ok_or_else(|| self.error(input, format!("environment variable {:?} not set", name)));
        }

        self.fields
            .get(path)
            .cloned()
            .ok_or_else(|| self.error(input, format!("field .{} not defined", path)))
    }

    fn error(&self, template: &str, message: impl Into<String>) -> PublishError {
        PublishError::Template {
            template: template.to_string(),
            message: message.into(),
        }
    }
}

/// Escape a string for use as a single URL path segment
pub fn url_path_escape(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}
