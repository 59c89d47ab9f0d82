//! JQL rendering for pushed-down Jira filters.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};

use super::filter::{DateRange, JiraIssueFilter, UNASSIGNED};

/// Query used when nothing narrows the search.
pub const DEFAULT_JQL: &str = "order by created DESC";

const JQL_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Escape a value for use inside a double-quoted JQL string.
pub fn escape_jql_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn quoted(s: &str) -> String {
    format!("\"{}\"", escape_jql_string(s))
}

/// Jira reads JQL dates in the searching user's timezone, which may sit
/// anywhere from UTC-12 to UTC+14. Bounds are widened by the largest offset.
fn max_utc_offset() -> TimeDelta {
    TimeDelta::hours(14)
}

/// Lower bounds round down to the minute.
fn floor_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::minutes(1)).unwrap_or(ts)
}

/// Upper bounds round up to the minute.
fn ceil_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    let floor = floor_minute(ts);
    if floor == ts {
        ts
    } else {
        floor + TimeDelta::minutes(1)
    }
}

fn date_clauses(field: &str, range: &DateRange, clauses: &mut Vec<String>) {
    if let Some(from) = range.from {
        clauses.push(format!(
            "{} >= \"{}\"",
            field,
            floor_minute(from - max_utc_offset()).format(JQL_DATE_FORMAT)
        ));
    }
    if let Some(to) = range.to {
        clauses.push(format!(
            "{} <= \"{}\"",
            field,
            ceil_minute(to + max_utc_offset()).format(JQL_DATE_FORMAT)
        ));
    }
}

fn user_clause(field: &str, value: &str) -> String {
    if value.eq_ignore_ascii_case(UNASSIGNED) {
        format!("{} is EMPTY", field)
    } else {
        format!("{} = {}", field, quoted(value))
    }
}

/// Render every recognized constraint, in fixed field order.
pub fn filter_clauses(filter: &JiraIssueFilter) -> Vec<String> {
    let mut clauses = Vec::new();

    let equalities = [
        ("project", &filter.project),
        ("key", &filter.key),
        ("status", &filter.status),
        ("issuetype", &filter.issue_type),
        ("priority", &filter.priority),
        ("resolution", &filter.resolution),
    ];
    for (field, value) in equalities {
        if let Some(v) = value {
            clauses.push(format!("{} = {}", field, quoted(v)));
        }
    }

    if let Some(v) = &filter.assignee {
        clauses.push(user_clause("assignee", v));
    }
    if let Some(v) = &filter.reporter {
        clauses.push(user_clause("reporter", v));
    }
    if let Some(v) = &filter.summary {
        clauses.push(format!("summary ~ {}", quoted(v)));
    }
    if let Some(v) = &filter.description {
        clauses.push(format!("description ~ {}", quoted(v)));
    }
    for label in &filter.labels {
        clauses.push(format!("labels = {}", quoted(label)));
    }
    for component in &filter.components {
        clauses.push(format!("component = {}", quoted(component)));
    }

    date_clauses("created", &filter.created, &mut clauses);
    date_clauses("updated", &filter.updated, &mut clauses);
    date_clauses("resolved", &filter.resolved, &mut clauses);

    clauses
}

/// Build the JQL for one fetch from an optional base query and the
/// pushed-down filter.
///
/// A base query with nothing to add is returned as written. Otherwise its
/// condition is parenthesized, the filter clauses are ANDed on and any
/// `ORDER BY` from the base stays at the end.
pub fn build_jql(base: Option<&str>, filter: &JiraIssueFilter) -> String {
    let clauses = filter_clauses(filter);
    let base = base.map(str::trim).filter(|b| !b.is_empty());

    match (base, clauses.is_empty()) {
        (None, true) => DEFAULT_JQL.to_string(),
        (Some(base), true) => base.to_string(),
        (None, false) => format!("{} {}", clauses.join(" AND "), DEFAULT_JQL),
        (Some(base), false) => {
            let (condition, order_by) = split_order_by(base);
            let mut jql = if condition.is_empty() {
                clauses.join(" AND ")
            } else {
                format!("({}) AND {}", condition, clauses.join(" AND "))
            };
            if let Some(order_by) = order_by {
                jql.push(' ');
                jql.push_str(order_by);
            }
            jql
        }
    }
}

/// Split a JQL query into its condition and a trailing `ORDER BY` clause.
/// Keywords inside quoted strings or parentheses are ignored.
pub fn split_order_by(jql: &str) -> (&str, Option<&str>) {
    let bytes = jql.as_bytes();
    let mut quote: Option<u8> = None;
    let mut depth = 0usize;
    let mut found = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                _ if depth == 0 && is_order_by_at(bytes, i) => found = Some(i),
                _ => {}
            },
        }
        i += 1;
    }

    match found {
        Some(pos) => (jql[..pos].trim(), Some(jql[pos..].trim())),
        None => (jql.trim(), None),
    }
}

fn is_order_by_at(bytes: &[u8], i: usize) -> bool {
    let boundary_before = i == 0 || !is_word_byte(bytes[i - 1]);
    if !boundary_before || !starts_with_ignore_case(&bytes[i..], b"order") {
        return false;
    }
    let mut j = i + "order".len();
    let ws_start = j;
    while j < bytes.len() && bytes[j].is_ascii_whitespace() {
        j += 1;
    }
    if j == ws_start || !starts_with_ignore_case(&bytes[j..], b"by") {
        return false;
    }
    let after = j + "by".len();
    after == bytes.len() || !is_word_byte(bytes[after])
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn starts_with_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len() && haystack[..needle.len()].eq_ignore_ascii_case(needle)
}
