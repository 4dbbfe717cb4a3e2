// src/interception/pattern.rs
//! Path template compiler
//!
//! Compiles templates like `/pets/:id` into a matcher that extracts named
//! parameters from a concrete path and a generator that re-serializes
//! parameters back into a path when a handler rewrote them.

use crate::utils::errors::{InterceptError, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Fixed text that must match exactly.
    Literal(String),
    /// A `:name` capture matching one non-empty segment.
    Param(String),
}

/// A compiled path template.
#[derive(Debug, Clone)]
pub struct PathPattern {
    template: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compile a template. Templates must start with `/`; parameters must
    /// be named. Compilation errors reject the registration that supplied
    /// the template and nothing else.
    pub fn compile(template: &str) -> Result<Self> {
        if !template.starts_with('/') {
            return Err(InterceptError::InvalidPattern(format!(
                "path template must start with '/': {template}"
            )));
        }

        let mut segments = Vec::new();
        for raw in template.split('/').skip(1) {
            if let Some(name) = raw.strip_prefix(':') {
                if name.is_empty() {
                    return Err(InterceptError::InvalidPattern(format!(
                        "unnamed parameter in path template: {template}"
                    )));
                }
                segments.push(Segment::Param(name.to_string()));
            } else {
                segments.push(Segment::Literal(raw.to_string()));
            }
        }

        Ok(Self {
            template: template.to_string(),
            segments,
        })
    }

    /// The original template text.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Whether the template captures any parameters.
    pub fn has_params(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Param(_)))
    }

    /// Match a concrete path, returning captured parameters on success.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = path.split('/').skip(1).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(&parts) {
            match segment {
                Segment::Literal(literal) => {
                    if literal != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    if part.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), part.to_string());
                }
            }
        }

        Some(params)
    }

    /// Re-serialize parameters into a concrete path (inverse of `matches`).
    ///
    /// The caller supplies a map covering every parameter the template
    /// names; parameters absent from the map render as empty segments.
    pub fn render(&self, params: &HashMap<String, String>) -> String {
        let mut path = String::new();
        for segment in &self.segments {
            path.push('/');
            match segment {
                Segment::Literal(literal) => path.push_str(literal),
                Segment::Param(name) => {
                    if let Some(value) = params.get(name) {
                        path.push_str(value);
                    }
                }
            }
        }
        path
    }
}
