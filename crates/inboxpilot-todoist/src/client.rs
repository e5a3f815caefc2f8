//! Todoist API client — single, idempotent-where-possible mutations.
//!
//! Reads go through the REST API; moves and reminders go through the Sync API
//! command endpoint, which is the only place Todoist exposes them. Every call
//! checks the rate-limit guard first and trips it on a 429.

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Offset, SecondsFormat, TimeZone, Utc};
use reqwest::StatusCode;

use inboxpilot_core::error::{PilotError, Result};
use inboxpilot_core::types::{Due, DueSpec, Project, Section, Task};

use crate::guard::RateLimitGuard;

const REST_BASE: &str = "https://api.todoist.com/rest/v2";
const SYNC_BASE: &str = "https://api.todoist.com/sync/v9";

pub struct TodoistClient {
    http: reqwest::Client,
    token: String,
    rest_base: String,
    sync_base: String,
    guard: RateLimitGuard,
    /// Projects we must never create sections inside (policy from config).
    protected_projects: Vec<String>,
    /// Wall-clock offset for resolving clock times in due strings.
    tz: FixedOffset,
}

impl TodoistClient {
    pub fn new(token: &str, guard: RateLimitGuard, protected_projects: Vec<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: token.into(),
            rest_base: REST_BASE.into(),
            sync_base: SYNC_BASE.into(),
            guard,
            protected_projects,
            tz: Utc.fix(),
        }
    }

    /// Point both APIs at a different host. Tests use this to talk to a mock
    /// server.
    pub fn with_base_url(mut self, base: &str) -> Self {
        self.rest_base = format!("{base}/rest/v2");
        self.sync_base = format!("{base}/sync/v9");
        self
    }

    pub fn with_timezone(mut self, tz: FixedOffset) -> Self {
        self.tz = tz;
        self
    }

    pub fn guard(&self) -> &RateLimitGuard {
        &self.guard
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/{path}", self.rest_base)
    }

    // ---- Reads ----

    pub async fn get_task(&self, task_id: &str) -> Result<Task> {
        let resp = self.get(&self.rest_url(&format!("tasks/{task_id}"))).await?;
        let resp = self.checked(resp, &format!("task {task_id}")).await?;
        resp.json()
            .await
            .map_err(|e| PilotError::Api {
                status: None,
                message: format!("invalid task response: {e}"),
            })
    }

    pub async fn get_section(&self, section_id: &str) -> Result<Section> {
        let resp = self
            .get(&self.rest_url(&format!("sections/{section_id}")))
            .await?;
        let resp = self.checked(resp, &format!("section {section_id}")).await?;
        resp.json()
            .await
            .map_err(|e| PilotError::Api {
                status: None,
                message: format!("invalid section response: {e}"),
            })
    }

    pub async fn get_project(&self, project_id: &str) -> Result<Project> {
        let resp = self
            .get(&self.rest_url(&format!("projects/{project_id}")))
            .await?;
        let resp = self.checked(resp, &format!("project {project_id}")).await?;
        resp.json()
            .await
            .map_err(|e| PilotError::Api {
                status: None,
                message: format!("invalid project response: {e}"),
            })
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        let resp = self.get(&self.rest_url("tasks")).await?;
        let resp = self.checked(resp, "active tasks").await?;
        resp.json()
            .await
            .map_err(|e| PilotError::Api {
                status: None,
                message: format!("invalid tasks response: {e}"),
            })
    }

    pub async fn list_sections(&self, project_id: &str) -> Result<Vec<Section>> {
        self.guard.check(Utc::now())?;
        let resp = self
            .http
            .get(self.rest_url("sections"))
            .query(&[("project_id", project_id)])
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport_err)?;
        let resp = self
            .checked(resp, &format!("sections of project {project_id}"))
            .await?;
        resp.json()
            .await
            .map_err(|e| PilotError::Api {
                status: None,
                message: format!("invalid sections response: {e}"),
            })
    }

    /// Find a section by exact name, then by prefix, creating it when absent.
    /// Refuses to create inside protected projects.
    pub async fn find_or_create_section(&self, project_id: &str, name: &str) -> Result<Section> {
        let sections = self.list_sections(project_id).await?;
        if let Some(section) = sections
            .iter()
            .find(|s| s.name == name)
            .or_else(|| sections.iter().find(|s| s.name.starts_with(name)))
        {
            return Ok(section.clone());
        }

        if self.protected_projects.iter().any(|p| p == project_id) {
            return Err(PilotError::Api {
                status: None,
                message: format!("refusing to create section '{name}' in protected project {project_id}"),
            });
        }

        let resp = self
            .post_json(
                &self.rest_url("sections"),
                &serde_json::json!({ "name": name, "project_id": project_id }),
            )
            .await?;
        let resp = self
            .checked(resp, &format!("create section '{name}' in {project_id}"))
            .await?;
        let section: Section = resp.json().await.map_err(|e| PilotError::Api {
            status: None,
            message: format!("invalid section response: {e}"),
        })?;
        tracing::info!("created section '{}' ({}) in project {project_id}", section.name, section.id);
        Ok(section)
    }

    // ---- Mutations ----

    /// Add a label to a task. Idempotent: no write when the label is already
    /// present. Returns whether a write happened.
    pub async fn add_label(&self, task_id: &str, label: &str) -> Result<bool> {
        let task = self.get_task(task_id).await?;
        if task.has_label(label) {
            tracing::debug!("task {task_id} already has label {label}, skipping write");
            return Ok(false);
        }
        let mut labels = task.labels;
        labels.push(label.to_string());
        self.update_task(task_id, &serde_json::json!({ "labels": labels }))
            .await?;
        tracing::info!("added label {label} to task {task_id}");
        Ok(true)
    }

    /// Set the due date. Natural-language specs are parsed by Todoist;
    /// absolute instants are written as RFC 3339 UTC. Optionally attaches a
    /// duration in minutes. When another task already occupies the exact
    /// target slot, this one is shifted an hour later.
    pub async fn set_due_date(
        &self,
        task_id: &str,
        spec: &DueSpec,
        duration_minutes: Option<u32>,
    ) -> Result<()> {
        let spec = self.deconflict(task_id, spec).await?;
        let mut body = match &spec {
            DueSpec::Natural { string, lang } => {
                serde_json::json!({ "due_string": string, "due_lang": lang })
            }
            DueSpec::Absolute { datetime } => serde_json::json!({
                "due_datetime": storage_datetime(*datetime)
            }),
        };
        if let Some(minutes) = duration_minutes {
            body["duration"] = serde_json::json!(minutes);
            body["duration_unit"] = serde_json::json!("minute");
        }
        self.update_task(task_id, &body).await?;
        match &spec {
            DueSpec::Natural { string, .. } => {
                tracing::info!("set due date to '{string}' for task {task_id}")
            }
            DueSpec::Absolute { datetime } => {
                tracing::info!("set due date to {datetime} for task {task_id}")
            }
        }
        Ok(())
    }

    /// Collision avoidance: scheduling two tasks onto the same minute buries
    /// one of them, so a taken slot pushes the new task one hour later.
    /// Only specs that pin an exact instant participate — absolute datetimes,
    /// and natural strings ending in an `HH:MM` clock time. Anything else is
    /// Todoist's to interpret and goes through untouched.
    async fn deconflict(&self, task_id: &str, spec: &DueSpec) -> Result<DueSpec> {
        let target = match spec {
            DueSpec::Absolute { datetime } => Some(*datetime),
            DueSpec::Natural { string, .. } => {
                clock_time(string).and_then(|t| next_occurrence(t, Utc::now(), self.tz))
            }
        };
        let Some(target) = target else {
            return Ok(spec.clone());
        };

        let occupied = self
            .list_tasks()
            .await?
            .iter()
            .any(|t| t.id != task_id && t.due.as_ref().and_then(Due::instant) == Some(target));
        if !occupied {
            return Ok(spec.clone());
        }

        tracing::info!("slot {target} already taken, scheduling task {task_id} an hour later");
        Ok(match spec {
            DueSpec::Absolute { datetime } => DueSpec::Absolute {
                datetime: *datetime + Duration::hours(1),
            },
            DueSpec::Natural { string, lang } => DueSpec::Natural {
                string: bump_hour(string).unwrap_or_else(|| string.clone()),
                lang: lang.clone(),
            },
        })
    }

    /// Clear the due date. No-op when the task is already unscheduled.
    /// Returns whether a write happened.
    pub async fn remove_due_date(&self, task_id: &str) -> Result<bool> {
        let task = self.get_task(task_id).await?;
        if task.due.is_none() {
            tracing::debug!("task {task_id} has no due date, skipping write");
            return Ok(false);
        }
        self.update_task(task_id, &serde_json::json!({ "due_string": "no date" }))
            .await?;
        tracing::info!("removed due date from task {task_id}");
        Ok(true)
    }

    /// Remove a label from a task. No-op when absent.
    pub async fn remove_label(&self, task_id: &str, label: &str) -> Result<bool> {
        let task = self.get_task(task_id).await?;
        if !task.has_label(label) {
            return Ok(false);
        }
        let labels: Vec<String> = task.labels.into_iter().filter(|l| l != label).collect();
        self.update_task(task_id, &serde_json::json!({ "labels": labels }))
            .await?;
        tracing::info!("removed label {label} from task {task_id}");
        Ok(true)
    }

    /// Move a task to a project and/or section via the Sync API `item_move`
    /// command. At least one target is required; a project move without a
    /// section leaves the task in the project's top area.
    pub async fn move_task(
        &self,
        task_id: &str,
        project_id: Option<&str>,
        section_id: Option<&str>,
    ) -> Result<()> {
        let mut args = serde_json::json!({ "id": task_id });
        // Sync API quirk: a command carrying both moves into the section only;
        // section ids already imply their project.
        match (section_id, project_id) {
            (Some(section), _) => args["section_id"] = serde_json::json!(section),
            (None, Some(project)) => args["project_id"] = serde_json::json!(project),
            (None, None) => {
                return Err(PilotError::Api {
                    status: None,
                    message: format!("move of task {task_id} needs a project or section target"),
                });
            }
        }
        self.sync_command("item_move", args).await?;
        tracing::info!(
            "moved task {task_id} to project={} section={}",
            project_id.unwrap_or("-"),
            section_id.unwrap_or("-")
        );
        Ok(())
    }

    /// Add a relative reminder. Only valid on a task that already has a due
    /// date — Todoist anchors relative reminders to it.
    pub async fn add_reminder(&self, task_id: &str, minutes_before: u32) -> Result<()> {
        let task = self.get_task(task_id).await?;
        if task.due.is_none() {
            return Err(PilotError::InvalidReminderTarget(format!(
                "task {task_id} has no due date"
            )));
        }
        self.sync_command(
            "reminder_add",
            serde_json::json!({
                "item_id": task_id,
                "type": "relative",
                "minute_offset": minutes_before,
            }),
        )
        .await?;
        tracing::info!("added reminder ({minutes_before}m before due) to task {task_id}");
        Ok(())
    }

    // ---- Plumbing ----

    async fn update_task(&self, task_id: &str, body: &serde_json::Value) -> Result<()> {
        let resp = self
            .post_json(&self.rest_url(&format!("tasks/{task_id}")), body)
            .await?;
        self.checked(resp, &format!("update task {task_id}")).await?;
        Ok(())
    }

    async fn sync_command(&self, command_type: &str, args: serde_json::Value) -> Result<()> {
        let body = serde_json::json!({
            "commands": [{
                "type": command_type,
                "uuid": uuid::Uuid::new_v4().to_string(),
                "args": args,
            }]
        });
        let resp = self
            .post_json(&format!("{}/sync", self.sync_base), &body)
            .await?;
        self.checked(resp, &format!("sync command {command_type}"))
            .await?;
        Ok(())
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        self.guard.check(Utc::now())?;
        self.http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport_err)
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<reqwest::Response> {
        self.guard.check(Utc::now())?;
        self.http
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(transport_err)
    }

    /// Map upstream status codes onto the error taxonomy, tripping the guard
    /// on 429.
    async fn checked(&self, resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(PilotError::NotFound(context.to_string()));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok());
            let now = Utc::now();
            self.guard.trip_after(now, retry_after);
            let reset_at = self
                .guard
                .active_until(now)
                .unwrap_or(now);
            return Err(PilotError::RateLimited { reset_at });
        }
        let message = resp.text().await.unwrap_or_default();
        Err(PilotError::Api {
            status: Some(status.as_u16()),
            message: format!("{context}: {message}"),
        })
    }
}

fn transport_err(e: reqwest::Error) -> PilotError {
    PilotError::Api {
        status: None,
        message: format!("request failed: {e}"),
    }
}

/// Format an absolute instant the way `set_due_date` stores it.
pub fn storage_datetime(datetime: DateTime<Utc>) -> String {
    datetime.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Trailing `HH:MM` clock time of a due string, when it ends in one.
fn clock_time(due_string: &str) -> Option<NaiveTime> {
    let token = due_string.split_whitespace().last()?;
    NaiveTime::parse_from_str(token, "%H:%M").ok()
}

/// Next instant at which the wall clock in `tz` reads `time`, strictly after
/// `now`.
fn next_occurrence(time: NaiveTime, now: DateTime<Utc>, tz: FixedOffset) -> Option<DateTime<Utc>> {
    let local = now.with_timezone(&tz);
    let mut candidate = local.date_naive().and_time(time);
    if candidate <= local.naive_local() {
        candidate += Duration::days(1);
    }
    tz.from_local_datetime(&candidate)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Rewrite the trailing clock time of a due string one hour later, wrapping
/// at midnight.
fn bump_hour(due_string: &str) -> Option<String> {
    let time = clock_time(due_string)?;
    let bumped = (time + Duration::hours(1)).format("%H:%M");
    Some(match due_string.rsplit_once(char::is_whitespace) {
        Some((prefix, _)) => format!("{prefix} {bumped}"),
        None => bumped.to_string(),
    })
}
