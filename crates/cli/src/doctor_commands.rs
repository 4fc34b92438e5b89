//! `quill doctor`: config validation, onboarding policy sanity and local
//! storage health.
//!
//! Prints a structured report with `[ok]`, `[warn]`, `[fail]` or `[info]`
//! per item.

use std::path::Path;

use {
    anyhow::Result,
    quill_config::{
        QuillConfig,
        validate::{self, Severity},
    },
    quill_onboarding::{FileKeyValueStore, KeyValueStore, catalog::TOPICS},
};

// ── ANSI helpers ────────────────────────────────────────────────────────────

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    Warn,
    Fail,
    Info,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Fail => "fail",
            Self::Info => "info",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Self::Ok => GREEN,
            Self::Warn => YELLOW,
            Self::Fail => RED,
            Self::Info => CYAN,
        }
    }
}

impl From<Severity> for Status {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Error => Self::Fail,
            Severity::Warning => Self::Warn,
            Severity::Info => Self::Info,
        }
    }
}

struct CheckItem {
    status: Status,
    message: String,
}

struct Section {
    title: String,
    items: Vec<CheckItem>,
}

impl Section {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            items: Vec::new(),
        }
    }

    fn push(&mut self, status: Status, message: impl Into<String>) {
        self.items.push(CheckItem {
            status,
            message: message.into(),
        });
    }
}

fn print_report(sections: &[Section]) -> (usize, usize) {
    let mut errors = 0usize;
    let mut warnings = 0usize;

    for section in sections {
        eprintln!("{BOLD}{}{RESET}", section.title);
        for item in &section.items {
            let color = item.status.color();
            let label = item.status.label();
            eprintln!("  [{color}{label}{RESET}]  {}", item.message);
            match item.status {
                Status::Fail => errors += 1,
                Status::Warn => warnings += 1,
                _ => {},
            }
        }
        eprintln!();
    }

    (errors, warnings)
}

pub async fn handle_doctor() -> Result<()> {
    eprintln!("{BOLD}quill doctor{RESET}");
    eprintln!("{BOLD}============{RESET}\n");

    let mut sections = vec![check_config()];
    let config = quill_config::discover_and_load();
    sections.push(check_onboarding_policy(&config));
    sections.push(check_storage(&config));

    let (errors, warnings) = print_report(&sections);
    eprintln!("{BOLD}Summary:{RESET} {errors} error(s), {warnings} warning(s)");

    if errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn check_config() -> Section {
    let result = validate::validate(None);
    let label = result
        .config_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".into());
    let mut section = Section::new(format!("Config ({label})"));
    push_diagnostics(&mut section, &result.diagnostics);
    section
}

fn push_diagnostics(section: &mut Section, diagnostics: &[validate::Diagnostic]) {
    if diagnostics
        .iter()
        .any(|d| d.category == "syntax" && d.severity == Severity::Error)
    {
        for d in diagnostics.iter().filter(|d| d.category == "syntax") {
            section.push(Status::Fail, format!("syntax: {}", d.message));
        }
        return;
    }
    section.push(Status::Ok, "Syntax valid");

    let mut clean = true;
    for d in diagnostics {
        let msg = if d.path.is_empty() {
            d.message.clone()
        } else {
            format!("{}: {}", d.path, d.message)
        };
        if d.severity != Severity::Info {
            clean = false;
        }
        section.push(d.severity.into(), msg);
    }
    if clean {
        section.push(Status::Ok, "No unknown fields, type errors or policy problems");
    }
}

fn check_onboarding_policy(config: &QuillConfig) -> Section {
    let mut section = Section::new("Onboarding policy");
    let onboarding = &config.onboarding;

    match onboarding.min_topics {
        0 => section.push(Status::Fail, "min_topics is 0; topic selection is meaningless"),
        n if n > TOPICS.len() => section.push(
            Status::Fail,
            format!(
                "min_topics ({n}) exceeds the {} topics in the catalog; nobody can finish",
                TOPICS.len()
            ),
        ),
        n => section.push(
            Status::Ok,
            format!("At least {n} of {} topics required", TOPICS.len()),
        ),
    }

    if !onboarding.restrict_to_catalog {
        section.push(Status::Info, "Topics outside the catalog are accepted");
    }
    section.push(
        Status::Info,
        format!(
            "New users detected by {:?}",
            onboarding.new_user_detection
        ),
    );

    let avatar = &config.avatar;
    let worst_case: u64 = (1..=u64::from(avatar.retry_attempts))
        .map(|n| n.saturating_mul(avatar.retry_backoff_ms))
        .sum();
    section.push(
        Status::Info,
        format!(
            "Provider photo retries: {} attempt(s), up to {worst_case}ms",
            avatar.retry_attempts
        ),
    );

    section
}

fn check_storage(config: &QuillConfig) -> Section {
    let mut section = Section::new("Local storage");

    let flags_path = config.storage.flags_path();
    check_flags_file(&mut section, &flags_path);

    let profiles_path = config.storage.profiles_path();
    if profiles_path.exists() {
        match std::fs::read_to_string(&profiles_path)
            .map_err(anyhow::Error::from)
            .and_then(|data| {
                serde_json::from_str::<serde_json::Value>(&data).map_err(anyhow::Error::from)
            })
        {
            Ok(_) => section.push(
                Status::Ok,
                format!("Profile documents: {}", profiles_path.display()),
            ),
            Err(e) => section.push(
                Status::Fail,
                format!("Profile documents unreadable ({}): {e}", profiles_path.display()),
            ),
        }
    } else {
        section.push(
            Status::Info,
            format!(
                "{} not found (created on first profile commit)",
                profiles_path.display()
            ),
        );
    }

    section
}

fn check_flags_file(section: &mut Section, path: &Path) {
    if !path.exists() {
        section.push(
            Status::Info,
            format!("{} not found (created on first sign-in)", path.display()),
        );
        return;
    }
    match FileKeyValueStore::open(path) {
        Ok(store) => {
            let users = store
                .keys()
                .iter()
                .filter(|k| k.ends_with("_profile_completed"))
                .count();
            section.push(
                Status::Ok,
                format!("Flags: {} ({users} user record(s))", path.display()),
            );
            if let Some(current) = store.get("currentUser") {
                let uid = serde_json::from_str::<serde_json::Value>(&current)
                    .ok()
                    .and_then(|v| v["uid"].as_str().map(str::to_string));
                match uid {
                    Some(uid) => section.push(Status::Info, format!("Signed in: {uid}")),
                    None => section.push(Status::Warn, "currentUser entry is unreadable"),
                }
            }
        },
        Err(e) => section.push(
            Status::Fail,
            format!("Flags file unreadable ({}): {e}", path.display()),
        ),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn statuses(section: &Section) -> Vec<Status> {
        section.items.iter().map(|i| i.status).collect()
    }

    #[test]
    fn status_labels() {
        assert_eq!(Status::Ok.label(), "ok");
        assert_eq!(Status::Warn.label(), "warn");
        assert_eq!(Status::Fail.label(), "fail");
        assert_eq!(Status::Info.label(), "info");
    }

    #[test]
    fn print_report_counts_errors_and_warnings() {
        let mut section = Section::new("test");
        section.push(Status::Ok, "fine");
        section.push(Status::Warn, "caution");
        section.push(Status::Warn, "caution2");
        section.push(Status::Fail, "broken");
        section.push(Status::Info, "note");

        let (errors, warnings) = print_report(&[section]);
        assert_eq!(errors, 1);
        assert_eq!(warnings, 2);
    }

    #[test]
    fn default_policy_passes() {
        let section = check_onboarding_policy(&QuillConfig::default());
        assert!(!statuses(&section).contains(&Status::Fail));
        assert!(
            section
                .items
                .iter()
                .any(|i| i.message.contains("up to 3000ms"))
        );
    }

    #[test]
    fn minimum_above_catalog_fails() {
        let mut config = QuillConfig::default();
        config.onboarding.min_topics = TOPICS.len() + 1;
        let section = check_onboarding_policy(&config);
        assert_eq!(section.items[0].status, Status::Fail);
    }

    #[test]
    fn zero_minimum_fails() {
        let mut config = QuillConfig::default();
        config.onboarding.min_topics = 0;
        assert_eq!(
            check_onboarding_policy(&config).items[0].status,
            Status::Fail
        );
    }

    #[test]
    fn syntax_errors_short_circuit() {
        let result = validate::validate_toml_str("[onboarding\nmin_topics = 3");
        let mut section = Section::new("cfg");
        push_diagnostics(&mut section, &result.diagnostics);
        assert!(statuses(&section).iter().all(|s| *s == Status::Fail));
    }

    #[test]
    fn policy_diagnostics_are_reported() {
        let result = validate::validate_toml_str("[profile]\nname_min_chars = 10\nname_max_chars = 5\n");
        let mut section = Section::new("cfg");
        push_diagnostics(&mut section, &result.diagnostics);
        assert!(statuses(&section).contains(&Status::Fail));
    }

    #[test]
    fn corrupt_flags_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local_storage.json");
        std::fs::write(&path, "{not json").unwrap();
        let mut section = Section::new("storage");
        check_flags_file(&mut section, &path);
        assert_eq!(statuses(&section), vec![Status::Fail]);
    }

    #[test]
    fn flags_file_counts_users() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local_storage.json");
        std::fs::write(
            &path,
            r#"{"user_a_profile_completed":"true","user_b_profile_completed":"false","currentUser":"{\"uid\":\"a\"}"}"#,
        )
        .unwrap();
        let mut section = Section::new("storage");
        check_flags_file(&mut section, &path);
        assert!(section.items[0].message.contains("2 user record(s)"));
        assert_eq!(section.items[1].message, "Signed in: a");
    }
}
