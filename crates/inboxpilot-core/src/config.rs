//! InboxPilot configuration system.
//!
//! TOML file + environment overrides. The rule table lives here too: one
//! ordered, configuration-driven list of section rules instead of scattered
//! constant maps, so new rules are additive.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PilotError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PilotConfig {
    /// Todoist API bearer token. `TODOIST_API_TOKEN` takes precedence.
    #[serde(default)]
    pub api_token: String,
    #[serde(default)]
    pub debug: bool,
    /// Wall-clock offset from UTC, in minutes, for relative due-date math.
    #[serde(default)]
    pub timezone_offset_minutes: i32,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub rules: RuleTable,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            debug: false,
            timezone_offset_minutes: 0,
            gateway: GatewayConfig::default(),
            dedup: DedupConfig::default(),
            rules: RuleTable::default(),
        }
    }
}

impl PilotConfig {
    /// Load config from the default path, falling back to defaults when the
    /// file does not exist. `TODOIST_API_TOKEN` always overrides the file.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Load config from a specific path. Does not consult the environment;
    /// callers layer `apply_env` on top when they want the overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PilotError::Config(format!("failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| PilotError::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Get the default config path (~/.inboxpilot/config.toml).
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".inboxpilot")
            .join("config.toml")
    }

    /// Apply environment overrides (`TODOIST_API_TOKEN`, `DEBUG`).
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("TODOIST_API_TOKEN") {
            if !token.is_empty() {
                self.api_token = token;
            }
        }
        if let Ok(debug) = std::env::var("DEBUG") {
            self.debug = matches!(debug.to_lowercase().as_str(), "1" | "true" | "yes");
        }
    }
}

/// Gateway (HTTP server) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8008
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Deduplication cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Sliding suppression window, in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Hard cap on tracked task ids; oldest entries are evicted past this.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_window_secs() -> u64 {
    5
}
fn default_max_entries() -> usize {
    4096
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_entries: default_max_entries(),
        }
    }
}

/// The rule table: ordered section rules plus the label→project routes and
/// the handful of well-known names the resolver needs.
///
/// Section rules match by stable id when one is configured; the name is a
/// fallback for bootstrap setups and display. An id match always beats a
/// name match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTable {
    #[serde(default = "default_section_rules")]
    pub sections: Vec<SectionRule>,
    /// Ordered: for move directives, the task's labels are tried in task
    /// order against this table and the first hit wins.
    #[serde(default = "default_label_routes")]
    pub label_routes: Vec<LabelRoute>,
    /// Label that defers a task out of scheduling entirely.
    #[serde(default = "default_deferral_label")]
    pub deferral_label: String,
    /// Section (created on demand) that deferred tasks land in.
    #[serde(default = "default_later_section")]
    pub later_section: String,
    /// Name prefix of the staging section tasks are pulled back into.
    #[serde(default = "default_inbox_marker")]
    pub inbox_marker: String,
    /// Projects the client must never create sections inside (e.g. the inbox).
    #[serde(default)]
    pub protected_projects: Vec<String>,
}

fn default_deferral_label() -> String {
    "later".into()
}
fn default_later_section() -> String {
    "Later".into()
}
fn default_inbox_marker() -> String {
    "Inbox *".into()
}

impl Default for RuleTable {
    fn default() -> Self {
        Self {
            sections: default_section_rules(),
            label_routes: default_label_routes(),
            deferral_label: default_deferral_label(),
            later_section: default_later_section(),
            inbox_marker: default_inbox_marker(),
            protected_projects: Vec::new(),
        }
    }
}

impl RuleTable {
    /// Look up the rule for a section. Id matches take precedence over name
    /// matches regardless of table order — names can be renamed, ids cannot.
    pub fn rule_for(&self, section_id: &str, section_name: &str) -> Option<&SectionRule> {
        self.sections
            .iter()
            .find(|r| r.section_id.as_deref() == Some(section_id))
            .or_else(|| {
                self.sections
                    .iter()
                    .filter(|r| r.section_id.is_none())
                    .find(|r| r.section_name.as_deref() == Some(section_name))
            })
    }

    /// Resolve a context label to its target project, honoring table order.
    pub fn project_for_label(&self, label: &str) -> Option<&str> {
        self.label_routes
            .iter()
            .find(|r| r.label == label)
            .map(|r| r.project_id.as_str())
    }
}

/// One section rule: where it matches and what it does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionRule {
    #[serde(default)]
    pub section_id: Option<String>,
    #[serde(default)]
    pub section_name: Option<String>,
    pub action: SectionAction,
}

/// What a matched section rule does to the task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SectionAction {
    /// Tag with a context label; optionally route the task on to the label's
    /// project staging section in the same step.
    Label {
        label: String,
        #[serde(default)]
        route_to_inbox: bool,
    },
    /// Move the task by its first matching context label into an area of the
    /// label's target project.
    Move { target: MoveTarget },
    /// Schedule the task from a due-date template.
    Due {
        #[serde(flatten)]
        template: DueTemplate,
    },
    /// Pull the task back to unscheduled triage.
    ClearDue,
}

/// Landing area inside the project a move directive resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveTarget {
    Immediate,
    Parallel,
    Inbox,
}

impl MoveTarget {
    /// The section name (or prefix) the target maps to inside the project.
    pub fn section_name(&self) -> Option<&'static str> {
        match self {
            MoveTarget::Immediate => Some("Immediate--"),
            MoveTarget::Parallel => Some("Parallel=-"),
            MoveTarget::Inbox => None, // resolved via the inbox marker
        }
    }
}

/// Due-date template attached to a section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DueTemplate {
    /// Natural-language due string, or a relative offset like "+2 hours".
    pub due_string: String,
    #[serde(default = "default_due_lang")]
    pub lang: String,
    /// Attach a one-hour duration to the task.
    #[serde(default)]
    pub add_duration: bool,
    /// Also add a reminder this many minutes before the due time.
    #[serde(default)]
    pub reminder_minutes: Option<u32>,
}

fn default_due_lang() -> String {
    "en".into()
}

fn default_label_routes() -> Vec<LabelRoute> {
    vec![
        LabelRoute::new("context/work", "2327425429"),
        LabelRoute::new("context/home", "2244866374"),
        LabelRoute::new("context/side", "2327425662"),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelRoute {
    pub label: String,
    pub project_id: String,
}

impl LabelRoute {
    pub fn new(label: &str, project_id: &str) -> Self {
        Self {
            label: label.into(),
            project_id: project_id.into(),
        }
    }
}

fn default_section_rules() -> Vec<SectionRule> {
    fn named(name: &str, action: SectionAction) -> SectionRule {
        SectionRule {
            section_id: None,
            section_name: Some(name.into()),
            action,
        }
    }
    fn due(name: &str, due_string: &str, add_duration: bool) -> SectionRule {
        named(
            name,
            SectionAction::Due {
                template: DueTemplate {
                    due_string: due_string.into(),
                    lang: default_due_lang(),
                    add_duration,
                    reminder_minutes: None,
                },
            },
        )
    }

    vec![
        // Context labeling sections in the inbox
        named(
            "Work",
            SectionAction::Label {
                label: "context/work".into(),
                route_to_inbox: true,
            },
        ),
        named(
            "Home",
            SectionAction::Label {
                label: "context/home".into(),
                route_to_inbox: true,
            },
        ),
        named(
            "Side",
            SectionAction::Label {
                label: "context/side".into(),
                route_to_inbox: true,
            },
        ),
        // Move directives
        named(
            "Move to Immediate",
            SectionAction::Move {
                target: MoveTarget::Immediate,
            },
        ),
        named(
            "Move to Parallel",
            SectionAction::Move {
                target: MoveTarget::Parallel,
            },
        ),
        named(
            "Move to project Inbox",
            SectionAction::Move {
                target: MoveTarget::Inbox,
            },
        ),
        // Due templates
        due("Due Today", "today", false),
        due("Due 9am", "today at 9am", true),
        due("Due 12pm", "today at 12pm", true),
        due("Due 5pm", "today at 5pm", true),
        due("Tomorrow", "tomorrow", false),
        due("This Weekend", "saturday", false),
        due("Next Week", "next monday", false),
        // Landing sections inside target projects get scheduled right away
        due("Immediate--", "today at 9am", false),
        due("Parallel=-", "today at 9am", false),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PilotConfig::default();
        assert_eq!(config.gateway.port, 8008);
        assert_eq!(config.dedup.window_secs, 5);
        assert_eq!(config.rules.deferral_label, "later");
        assert!(!config.rules.sections.is_empty());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            api_token = "tok-123"
            timezone_offset_minutes = 120

            [gateway]
            port = 9000

            [dedup]
            window_secs = 30

            [[rules.sections]]
            section_id = "8800"
            section_name = "Deep Work"
            action = { kind = "label", label = "context/work" }
        "#;
        let config: PilotConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api_token, "tok-123");
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.dedup.window_secs, 30);
        assert_eq!(config.timezone_offset_minutes, 120);
        assert_eq!(config.rules.sections.len(), 1);
    }

    #[test]
    fn test_due_rule_from_toml() {
        // The tagged action with a flattened template is the trickiest shape
        // a config file can carry; parse it end to end.
        let toml_str = r#"
            [[rules.sections]]
            section_name = "Snooze"
            action = { kind = "due", due_string = "+2 hours", add_duration = true, reminder_minutes = 15 }
        "#;
        let config: PilotConfig = toml::from_str(toml_str).unwrap();
        let rule = &config.rules.sections[0];
        assert_eq!(rule.section_name.as_deref(), Some("Snooze"));
        match &rule.action {
            SectionAction::Due { template } => {
                assert_eq!(template.due_string, "+2 hours");
                assert_eq!(template.lang, "en");
                assert!(template.add_duration);
                assert_eq!(template.reminder_minutes, Some(15));
            }
            other => panic!("expected a due action, got {other:?}"),
        }
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: PilotConfig = toml::from_str("").unwrap();
        assert_eq!(config.gateway.host, "0.0.0.0");
        assert_eq!(config.dedup.max_entries, 4096);
    }

    #[test]
    fn test_rule_lookup_id_beats_name() {
        let table = RuleTable {
            sections: vec![
                SectionRule {
                    section_id: None,
                    section_name: Some("Work".into()),
                    action: SectionAction::ClearDue,
                },
                SectionRule {
                    section_id: Some("8800".into()),
                    section_name: Some("Old Name".into()),
                    action: SectionAction::Move {
                        target: MoveTarget::Inbox,
                    },
                },
            ],
            ..RuleTable::default()
        };
        // The section was renamed to "Work", but its id still matches the
        // move rule — the id wins.
        let rule = table.rule_for("8800", "Work").unwrap();
        assert!(matches!(rule.action, SectionAction::Move { .. }));

        // No id match falls back to name.
        let rule = table.rule_for("9999", "Work").unwrap();
        assert!(matches!(rule.action, SectionAction::ClearDue));
    }

    #[test]
    fn test_label_route_order() {
        let table = RuleTable::default();
        assert_eq!(table.project_for_label("context/work"), Some("2327425429"));
        assert_eq!(table.project_for_label("context/unknown"), None);
    }

    #[test]
    fn test_due_template_defaults() {
        let toml_str = r#"
            due_string = "+2 hours"
        "#;
        let template: DueTemplate = toml::from_str(toml_str).unwrap();
        assert_eq!(template.lang, "en");
        assert!(!template.add_duration);
        assert!(template.reminder_minutes.is_none());
    }
}
