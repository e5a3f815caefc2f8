//! Rule resolver — pure decision function from a task's section and labels
//! to an ordered list of actions. First matching rule wins; the deferral
//! label is terminal and checked before anything else.

use chrono::{DateTime, FixedOffset, Utc};

use inboxpilot_core::config::{DueTemplate, MoveTarget, RuleTable, SectionAction};
use inboxpilot_core::types::DueSpec;

use crate::due;

/// The snapshot the resolver decides on. Section name is already looked up
/// by the caller; the resolver itself never touches the network.
#[derive(Debug, Clone)]
pub struct TaskView<'a> {
    pub task_id: &'a str,
    pub project_id: &'a str,
    pub section_id: &'a str,
    pub section_name: &'a str,
    pub labels: &'a [String],
}

/// One mutation to apply, in order. Multi-step sequences are explicit lists
/// with a log-and-abandon partial-failure policy at the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    AddLabel {
        label: String,
    },
    StripLabel {
        label: String,
    },
    SetDueDate {
        spec: DueSpec,
        duration_minutes: Option<u32>,
    },
    AddReminder {
        minutes_before: u32,
    },
    RemoveDueDate,
    MoveToProject {
        project_id: String,
    },
    /// Move into a named section of a project, creating the section on
    /// demand (prefix-matched by the client).
    MoveToProjectSection {
        project_id: String,
        section_name: String,
    },
    NoOp {
        reason: String,
    },
}

/// Resolve the actions for a task. Precedence, first match wins:
///
/// 1. deferral label — park in the later section, unschedule, strip (terminal)
/// 2. move directive section — route by first matching context label
/// 3. context label section — tag, optionally route to the project staging
/// 4. due template section — schedule (relative offsets computed locally)
/// 5. staging/inbox marker section — unschedule
/// 6. nothing matched — no-op
pub fn resolve(
    table: &RuleTable,
    tz: FixedOffset,
    now: DateTime<Utc>,
    task: &TaskView<'_>,
) -> Vec<Action> {
    if task.labels.iter().any(|l| *l == table.deferral_label) {
        return vec![
            Action::MoveToProjectSection {
                project_id: task.project_id.to_string(),
                section_name: table.later_section.clone(),
            },
            Action::RemoveDueDate,
            Action::StripLabel {
                label: table.deferral_label.clone(),
            },
        ];
    }

    if let Some(rule) = table.rule_for(task.section_id, task.section_name) {
        return match &rule.action {
            SectionAction::Move { target } => resolve_move(table, *target, task),
            SectionAction::Label {
                label,
                route_to_inbox,
            } => {
                let mut actions = vec![Action::AddLabel {
                    label: label.clone(),
                }];
                if *route_to_inbox {
                    match table.project_for_label(label) {
                        Some(project_id) => actions.push(Action::MoveToProjectSection {
                            project_id: project_id.to_string(),
                            section_name: table.inbox_marker.clone(),
                        }),
                        None => tracing::debug!(
                            "label {label} has no project route, tagging only"
                        ),
                    }
                }
                actions
            }
            SectionAction::Due { template } => resolve_due(template, tz, now),
            SectionAction::ClearDue => vec![Action::RemoveDueDate],
        };
    }

    if task.section_name.starts_with(table.inbox_marker.as_str()) {
        return vec![Action::RemoveDueDate];
    }

    vec![Action::NoOp {
        reason: "no matching section".into(),
    }]
}

/// Try the task's labels in their existing order against the label→project
/// table; the first one with a route decides the target project.
fn resolve_move(table: &RuleTable, target: MoveTarget, task: &TaskView<'_>) -> Vec<Action> {
    let Some(project_id) = task
        .labels
        .iter()
        .find_map(|label| table.project_for_label(label))
    else {
        return vec![Action::NoOp {
            reason: "no matching label for moving".into(),
        }];
    };

    let section_name = match target.section_name() {
        Some(name) => name.to_string(),
        None => table.inbox_marker.clone(),
    };
    vec![Action::MoveToProjectSection {
        project_id: project_id.to_string(),
        section_name,
    }]
}

fn resolve_due(template: &DueTemplate, tz: FixedOffset, now: DateTime<Utc>) -> Vec<Action> {
    let duration_minutes = template.add_duration.then_some(60);
    let spec = match due::parse_relative(&template.due_string) {
        Some(offset) => match due::apply(offset, now, tz) {
            Ok(datetime) => DueSpec::Absolute { datetime },
            Err(e) => {
                tracing::warn!("unusable relative due '{}': {e}", template.due_string);
                return vec![Action::NoOp {
                    reason: format!("invalid relative due '{}'", template.due_string),
                }];
            }
        },
        None => DueSpec::Natural {
            string: template.due_string.clone(),
            lang: template.lang.clone(),
        },
    };

    let mut actions = vec![Action::SetDueDate {
        spec,
        duration_minutes,
    }];
    if let Some(minutes_before) = template.reminder_minutes {
        actions.push(Action::AddReminder { minutes_before });
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use inboxpilot_core::config::{LabelRoute, SectionRule};

    fn table() -> RuleTable {
        RuleTable::default()
    }

    fn tz() -> FixedOffset {
        FixedOffset::east_opt(2 * 3600).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 21, 30, 0).unwrap()
    }

    fn view<'a>(section_name: &'a str, labels: &'a [String]) -> TaskView<'a> {
        TaskView {
            task_id: "7001",
            project_id: "9000",
            section_id: "sec-1",
            section_name,
            labels,
        }
    }

    #[test]
    fn test_deferral_is_terminal_and_exact() {
        // Even in a section that would otherwise schedule the task.
        let labels = vec!["context/work".to_string(), "later".to_string()];
        let actions = resolve(&table(), tz(), now(), &view("Due 9am", &labels));
        assert_eq!(
            actions,
            vec![
                Action::MoveToProjectSection {
                    project_id: "9000".into(),
                    section_name: "Later".into(),
                },
                Action::RemoveDueDate,
                Action::StripLabel { label: "later".into() },
            ]
        );
    }

    #[test]
    fn test_move_first_matching_label_wins() {
        // work is mapped first in the table; the task lists work before home.
        let labels = vec!["context/work".to_string(), "context/home".to_string()];
        let actions = resolve(&table(), tz(), now(), &view("Move to project Inbox", &labels));
        assert_eq!(
            actions,
            vec![Action::MoveToProjectSection {
                project_id: "2327425429".into(),
                section_name: "Inbox *".into(),
            }]
        );

        // Task label order decides, not table order.
        let labels = vec!["context/home".to_string(), "context/work".to_string()];
        let actions = resolve(&table(), tz(), now(), &view("Move to Immediate", &labels));
        assert_eq!(
            actions,
            vec![Action::MoveToProjectSection {
                project_id: "2244866374".into(),
                section_name: "Immediate--".into(),
            }]
        );
    }

    #[test]
    fn test_move_without_matching_label_is_noop() {
        let labels = vec!["unrouted".to_string()];
        let actions = resolve(&table(), tz(), now(), &view("Move to Parallel", &labels));
        assert_eq!(
            actions,
            vec![Action::NoOp {
                reason: "no matching label for moving".into()
            }]
        );
    }

    #[test]
    fn test_context_label_tags_and_routes() {
        let actions = resolve(&table(), tz(), now(), &view("Work", &[]));
        assert_eq!(
            actions,
            vec![
                Action::AddLabel { label: "context/work".into() },
                Action::MoveToProjectSection {
                    project_id: "2327425429".into(),
                    section_name: "Inbox *".into(),
                },
            ]
        );
    }

    #[test]
    fn test_due_template_with_duration() {
        let actions = resolve(&table(), tz(), now(), &view("Due 9am", &[]));
        assert_eq!(
            actions,
            vec![Action::SetDueDate {
                spec: DueSpec::Natural {
                    string: "today at 9am".into(),
                    lang: "en".into(),
                },
                duration_minutes: Some(60),
            }]
        );
    }

    #[test]
    fn test_relative_due_computed_locally() {
        let mut t = table();
        t.sections.push(SectionRule {
            section_id: None,
            section_name: Some("Snooze".into()),
            action: SectionAction::Due {
                template: DueTemplate {
                    due_string: "+1 hour".into(),
                    lang: "en".into(),
                    add_duration: false,
                    reminder_minutes: Some(15),
                },
            },
        });
        let actions = resolve(&t, tz(), now(), &view("Snooze", &[]));
        // 21:30Z is 23:30 local (+02:00); one hour later stored as 22:30Z.
        assert_eq!(
            actions,
            vec![
                Action::SetDueDate {
                    spec: DueSpec::Absolute {
                        datetime: Utc.with_ymd_and_hms(2024, 1, 1, 22, 30, 0).unwrap(),
                    },
                    duration_minutes: None,
                },
                Action::AddReminder { minutes_before: 15 },
            ]
        );
    }

    #[test]
    fn test_inbox_marker_clears_due() {
        let actions = resolve(&table(), tz(), now(), &view("Inbox * (staging)", &[]));
        assert_eq!(actions, vec![Action::RemoveDueDate]);
    }

    #[test]
    fn test_landing_sections_schedule_9am() {
        let actions = resolve(&table(), tz(), now(), &view("Parallel=-", &[]));
        assert_eq!(
            actions,
            vec![Action::SetDueDate {
                spec: DueSpec::Natural {
                    string: "today at 9am".into(),
                    lang: "en".into(),
                },
                duration_minutes: None,
            }]
        );
    }

    #[test]
    fn test_unknown_section_is_noop() {
        let actions = resolve(&table(), tz(), now(), &view("Someday", &[]));
        assert_eq!(
            actions,
            vec![Action::NoOp { reason: "no matching section".into() }]
        );
    }

    #[test]
    fn test_label_without_route_tags_only() {
        let t = RuleTable {
            sections: vec![SectionRule {
                section_id: None,
                section_name: Some("Errands".into()),
                action: SectionAction::Label {
                    label: "context/errands".into(),
                    route_to_inbox: true,
                },
            }],
            label_routes: vec![LabelRoute::new("context/work", "2327425429")],
            ..RuleTable::default()
        };
        let actions = resolve(&t, tz(), now(), &view("Errands", &[]));
        assert_eq!(actions, vec![Action::AddLabel { label: "context/errands".into() }]);
    }
}
