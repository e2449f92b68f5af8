// SPDX-FileCopyrightText: 2026 Luni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Config errors as miette diagnostics, with key suggestions for typos.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Jaro-Winkler score a known key needs before it is offered as a fix.
const SUGGESTION_THRESHOLD: f64 = 0.75;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("`{key}` is not a luni setting")]
    #[diagnostic(
        code(luni::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        suggestion: Option<String>,
        /// Keys accepted in the same section, comma separated.
        valid_keys: String,
        #[label("unknown here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type ({detail})")]
    #[diagnostic(code(luni::config::invalid_type), help("use a {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
    },

    #[error("`{key}` is required")]
    #[diagnostic(
        code(luni::config::missing_key),
        help("set `{key}` in luni.toml or through a LUNI_* variable")
    )]
    MissingKey { key: String },

    /// Parsed fine but the value is unusable.
    #[error("{message}")]
    #[diagnostic(code(luni::config::validation))]
    Validation { message: String },

    #[error("could not load configuration: {0}")]
    #[diagnostic(code(luni::config::other))]
    Other(String),
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("perhaps `{s}`? this section accepts: {valid_keys}"),
        None => format!("this section accepts: {valid_keys}"),
    }
}

/// Split a figment failure into one [`ConfigError`] per underlying problem.
///
/// `sources` pairs a file path with its text so unknown keys can be pointed at.
pub fn figment_to_config_errors(
    err: figment::Error,
    sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| match &error.kind {
            Kind::UnknownField(field, expected) => {
                let (span, src) = locate(&error, field, sources).unzip();
                ConfigError::UnknownKey {
                    key: field.clone(),
                    suggestion: suggest_key(field, expected),
                    valid_keys: expected.join(", "),
                    span,
                    src,
                }
            }
            Kind::MissingField(field) => ConfigError::MissingKey {
                key: dotted(&error.path, field),
            },
            Kind::InvalidType(actual, expected) => ConfigError::InvalidType {
                key: error.path.join("."),
                detail: format!("got {actual}"),
                expected: expected.to_string(),
            },
            _ => ConfigError::Other(error.to_string()),
        })
        .collect()
}

fn dotted(path: &[String], field: &str) -> String {
    path.iter()
        .map(String::as_str)
        .chain(std::iter::once(field))
        .collect::<Vec<_>>()
        .join(".")
}

/// Span and named source of `field`, when the file it came from is known.
fn locate(
    error: &figment::error::Error,
    field: &str,
    sources: &[(String, String)],
) -> Option<(SourceSpan, NamedSource<String>)> {
    let file = match error.metadata.as_ref().and_then(|m| m.source.as_ref()) {
        Some(figment::Source::File(path)) => Some(path.display().to_string()),
        _ => None,
    };
    let (path, content) = match file {
        Some(file) => sources.iter().find(|(p, _)| *p == file)?,
        // Inline TOML carries no file origin.
        None if sources.len() == 1 => &sources[0],
        None => return None,
    };
    let offset = find_key_offset(content, &error.path, field)?;
    Some((
        SourceSpan::new(offset.into(), field.len()),
        NamedSource::new(path, content.clone()),
    ))
}

/// Byte offset of a `field = ...` line, searched after the `[section]` header
/// named by the first path segment.
pub fn find_key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let section_start = match path.first() {
        Some(section) => {
            let header = format!("[{section}]");
            content.find(&header)? + header.len()
        }
        None => 0,
    };

    let mut pos = section_start;
    for line in content[section_start..].split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        let rest = &line[indent..];
        if rest
            .strip_prefix(field)
            .is_some_and(|after| after.trim_start().starts_with('='))
        {
            return Some(pos + indent);
        }
        pos += line.len();
    }
    None
}

/// The closest known key, if any is close enough to be a likely typo.
pub fn suggest_key(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Print every error to stderr with miette's graphical renderer.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut out = String::new();
        match handler.render_report(&mut out, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{out}"),
            Err(_) => eprintln!("luni: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORE_KEYS: &[&str] = &["redis_url", "use_redis", "ttl_seconds"];

    #[test]
    fn typo_gets_suggestion() {
        assert_eq!(suggest_key("redis_ulr", STORE_KEYS), Some("redis_url".to_string()));
        assert_eq!(suggest_key("usa_redis", STORE_KEYS), Some("use_redis".to_string()));
    }

    #[test]
    fn unrelated_key_gets_none() {
        assert_eq!(suggest_key("qqqqqq", STORE_KEYS), None);
    }

    #[test]
    fn offset_points_at_key_in_section() {
        let content = "[agent]\nname = \"x\"\n[store]\n  redis_ulr = \"redis://h\"\n";
        let o = find_key_offset(content, &["store".to_string()], "redis_ulr").unwrap();
        assert_eq!(&content[o..o + 9], "redis_ulr");
    }

    #[test]
    fn prefix_of_longer_key_does_not_match() {
        let content = "[store]\nredis_url_old = 1\n";
        assert_eq!(find_key_offset(content, &["store".to_string()], "redis_url"), None);
    }

    #[test]
    fn missing_key_is_dotted() {
        assert_eq!(dotted(&["cache".into(), "domains".into()], "name"), "cache.domains.name");
    }
}
