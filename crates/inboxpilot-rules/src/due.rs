//! Relative due-date arithmetic.
//!
//! Todoist's natural-language parser handles "today at 9am" fine but cannot
//! express arbitrary "+N unit" offsets, so those are computed locally:
//! wall-clock arithmetic in the configured timezone, calendar-aware months,
//! converted to UTC only at the point of writing.

use chrono::{DateTime, Duration, FixedOffset, Months, Utc};

use inboxpilot_core::error::{PilotError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetUnit {
    Hours,
    Days,
    Weeks,
    Months,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativeOffset {
    pub amount: u32,
    pub unit: OffsetUnit,
}

/// Parse a "+N unit" due string ("+1 hour", "+3 days", "+2 weeks",
/// "+1 month"). Returns `None` for anything else, which callers treat as a
/// natural-language string for Todoist to parse.
pub fn parse_relative(due_string: &str) -> Option<RelativeOffset> {
    let rest = due_string.trim().strip_prefix('+')?;
    let mut parts = rest.split_whitespace();
    let amount: u32 = parts.next()?.parse().ok()?;
    let unit = match parts.next()?.to_lowercase().as_str() {
        "hour" | "hours" => OffsetUnit::Hours,
        "day" | "days" => OffsetUnit::Days,
        "week" | "weeks" => OffsetUnit::Weeks,
        "month" | "months" => OffsetUnit::Months,
        _ => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(RelativeOffset { amount, unit })
}

/// Apply an offset to `now` in the configured timezone and return the UTC
/// instant to store. Months respect month length; everything else is plain
/// wall-clock addition (the offset is fixed, so hours never shift under it).
pub fn apply(offset: RelativeOffset, now: DateTime<Utc>, tz: FixedOffset) -> Result<DateTime<Utc>> {
    let local = now.with_timezone(&tz);
    let shifted = match offset.unit {
        OffsetUnit::Hours => local + Duration::hours(i64::from(offset.amount)),
        OffsetUnit::Days => local + Duration::days(i64::from(offset.amount)),
        OffsetUnit::Weeks => local + Duration::weeks(i64::from(offset.amount)),
        OffsetUnit::Months => local
            .checked_add_months(Months::new(offset.amount))
            .ok_or_else(|| {
                PilotError::InvalidDueSpec(format!("+{} months overflows", offset.amount))
            })?,
    };
    Ok(shifted.with_timezone(&Utc))
}
