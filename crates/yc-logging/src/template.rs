// Copyright 2024-Present YANDEX LLC
// SPDX-License-Identifier: Apache-2.0

//! Record templates: strings with `{path/to/field}` placeholders.
//!
//! A raw template such as `begin_{simple}_{path/to/json/value}_end` compiles
//! into the skeleton `begin_%s_%s_end` and the ordered path list
//! `[["simple"], ["path", "to", "json", "value"]]`. Braces do not nest; a
//! `{` inside a group ends the match attempt.
//!
//! Rendering substitutes each path, resolved against a record, into its slot.
//! Templates without paths are literals and render without looking at the
//! record at all.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

use crate::errors::TemplateError;
use crate::path;
use crate::value::Value;

/// Positional slot marker used in [`Template::skeleton`].
pub const PLACEHOLDER: &str = "%s";

fn template_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    RE.get_or_init(|| Regex::new(r"\{[^{}]+\}").expect("template pattern is valid"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    skeleton: String,
    // Literal text around the slots, always `paths.len() + 1` long.
    pieces: Vec<String>,
    paths: Vec<Vec<String>>,
}

impl Template {
    /// Compiles `raw`. Pure and deterministic.
    #[must_use]
    pub fn compile(raw: &str) -> Self {
        let mut skeleton = String::with_capacity(raw.len());
        let mut pieces = Vec::new();
        let mut paths = Vec::new();
        let mut last = 0;

        for m in template_regex().find_iter(raw) {
            let literal = &raw[last..m.start()];
            skeleton.push_str(literal);
            skeleton.push_str(PLACEHOLDER);
            pieces.push(literal.to_owned());

            let inner = &raw[m.start() + 1..m.end() - 1];
            paths.push(inner.split('/').map(str::to_owned).collect());
            last = m.end();
        }

        let tail = &raw[last..];
        skeleton.push_str(tail);
        pieces.push(tail.to_owned());

        Template {
            skeleton,
            pieces,
            paths,
        }
    }

    #[must_use]
    pub fn skeleton(&self) -> &str {
        &self.skeleton
    }

    #[must_use]
    pub fn paths(&self) -> &[Vec<String>] {
        &self.paths
    }

    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.paths.is_empty()
    }

    /// Renders the template against `record`.
    ///
    /// Literal templates return the skeleton borrowed. Otherwise every path is
    /// resolved in order; the first failure aborts the render and is reported
    /// together with the failing path.
    pub fn render(&self, record: &Value) -> Result<Cow<'_, str>, TemplateError> {
        if self.is_literal() {
            return Ok(Cow::Borrowed(&self.skeleton));
        }

        let mut out = String::with_capacity(self.skeleton.len() * 2);
        for (piece, field_path) in self.pieces.iter().zip(&self.paths) {
            out.push_str(piece);
            let value = path::resolve(record, field_path).map_err(|source| TemplateError {
                path: field_path.join("/"),
                source,
            })?;
            out.push_str(&value);
        }
        if let Some(tail) = self.pieces.last() {
            out.push_str(tail);
        }
        Ok(Cow::Owned(out))
    }
}

impl From<&str> for Template {
    fn from(raw: &str) -> Self {
        Template::compile(raw)
    }
}
