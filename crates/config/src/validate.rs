//! Configuration validation.
//!
//! Detects syntax errors, unknown or misspelled fields, type errors, and
//! policy values that would make onboarding impossible to finish.

use std::{collections::HashMap, path::Path};

use crate::schema::QuillConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "policy", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "onboarding.min_topics"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration file.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<std::path::PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Upper bound on provider-photo reloads before the retry loop becomes a
/// noticeable stall on first sign-in.
const MAX_REASONABLE_RETRIES: u32 = 10;

/// Known keys per table, mirroring `schema.rs`.
fn known_fields() -> HashMap<&'static str, &'static [&'static str]> {
    HashMap::from([
        (
            "onboarding",
            &["min_topics", "restrict_to_catalog", "new_user_detection"][..],
        ),
        ("profile", &["name_min_chars", "name_max_chars"][..]),
        (
            "avatar",
            &[
                "max_upload_bytes",
                "canonical_size",
                "retry_attempts",
                "retry_backoff_ms",
            ][..],
        ),
        ("storage", &["flags_path", "profiles_path"][..]),
    ])
}

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (*c, levenshtein(needle, c)))
        .filter(|(_, d)| *d > 0 && *d <= max_distance)
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or discover the default config
/// file location if `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => crate::loader::find_config_file(),
    };

    let Some(ref actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Info,
                category: "file-ref",
                path: String::new(),
                message: "no config file found; using defaults".into(),
            }],
            config_path: None,
        };
    };

    match std::fs::read_to_string(actual_path) {
        Ok(content) => {
            let content = crate::env_subst::substitute_env(&content);
            let is_toml = actual_path
                .extension()
                .and_then(|e| e.to_str())
                .is_none_or(|e| e == "toml");
            let mut result = if is_toml {
                validate_toml_str(&content)
            } else {
                validate_parsed(&content, actual_path)
            };
            result.config_path = Some(actual_path.clone());
            result
        },
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("failed to read config file: {e}"),
            }],
            config_path: Some(actual_path.clone()),
        },
    }
}

/// Validate a TOML string without file-system side effects.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    // 1. Syntax
    let toml_value: toml::Value = match toml::from_str(toml_str) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("TOML syntax error: {e}"),
            });
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    // 2. Unknown fields
    if let Some(table) = toml_value.as_table() {
        check_unknown_fields(table, &mut diagnostics);
    }

    // 3. Types, then policy checks on the parsed config
    match toml::from_str::<QuillConfig>(toml_str) {
        Ok(config) => check_policy(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: format!("type error: {e}"),
        }),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

/// YAML and JSON configs: parse with the loader, then run policy checks.
/// Unknown fields are not reported for these formats.
fn validate_parsed(content: &str, path: &Path) -> ValidationResult {
    let mut diagnostics = Vec::new();
    match crate::loader::parse_config(content, path) {
        Ok(config) => check_policy(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "syntax",
            path: String::new(),
            message: format!("{e}"),
        }),
    }
    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_unknown_fields(table: &toml::Table, diagnostics: &mut Vec<Diagnostic>) {
    let schema = known_fields();
    let sections: Vec<&str> = schema.keys().copied().collect();

    for (section, value) in table {
        let Some(fields) = schema.get(section.as_str()) else {
            let msg = match suggest(section, &sections, 3) {
                Some(s) => format!("unknown field at top level (did you mean \"{s}\"?)"),
                None => "unknown field at top level".to_string(),
            };
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "unknown-field",
                path: section.clone(),
                message: msg,
            });
            continue;
        };

        let Some(inner) = value.as_table() else {
            continue;
        };
        for key in inner.keys() {
            if fields.contains(&key.as_str()) {
                continue;
            }
            let msg = match suggest(key, fields, 3) {
                Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
                None => "unknown field".to_string(),
            };
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "unknown-field",
                path: format!("{section}.{key}"),
                message: msg,
            });
        }
    }
}

fn check_policy(config: &QuillConfig, diagnostics: &mut Vec<Diagnostic>) {
    if config.onboarding.min_topics == 0 {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "policy",
            path: "onboarding.min_topics".into(),
            message: "must be at least 1".into(),
        });
    }

    let profile = &config.profile;
    if profile.name_min_chars == 0 {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "policy",
            path: "profile.name_min_chars".into(),
            message: "0 allows an empty full name".into(),
        });
    }
    if profile.name_min_chars > profile.name_max_chars {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "policy",
            path: "profile".into(),
            message: format!(
                "name_min_chars ({}) exceeds name_max_chars ({}); no name can pass",
                profile.name_min_chars, profile.name_max_chars
            ),
        });
    }

    let avatar = &config.avatar;
    if avatar.max_upload_bytes == 0 {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "policy",
            path: "avatar.max_upload_bytes".into(),
            message: "0 rejects every upload".into(),
        });
    }
    if avatar.retry_attempts > MAX_REASONABLE_RETRIES {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "policy",
            path: "avatar.retry_attempts".into(),
            message: format!(
                "{} attempts; more than {MAX_REASONABLE_RETRIES} delays first sign-in noticeably",
                avatar.retry_attempts
            ),
        });
    }
}
