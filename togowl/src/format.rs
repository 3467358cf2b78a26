//! Text helpers for notification and timer titles.
//!
//! Everything here is a pure string transform: trimming the markers task
//! titles carry, choosing label prefixes, and rendering elapsed time.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

/// Default prefix for client labels
pub const CLIENT_PREFIX: &str = "👥";

/// Default prefix for project labels
pub const PROJECT_PREFIX: &str = "📂";

/// Shortcode prefixes for each kind of notification
pub mod event_prefix {
    pub const START: &str = ":clock9:";
    pub const PAUSE: &str = ":zzz:";
    pub const INTERRUPT: &str = ":bangbang:";
    pub const FORCE_STOP: &str = ":double_vertical_bar:";
    pub const DONE: &str = ":white_check_mark:";
    pub const DELETE: &str = ":wastebasket:";
}

lazy_static! {
    static ref BRACKET_CONTENTS: Regex = Regex::new(r"\(.+\)").unwrap();

    // "(9:00)", "(9:00-10:30)", "(9:00-)"
    static ref BRACKET_TIME: Regex = Regex::new(
        r" *\([0-9]{1,2}:[0-9]{2}-?([0-9]{1,2}:[0-9]{2})?\)"
    ).unwrap();

    // "[x2024/1/2]", "[x1/2]"
    static ref BRACKET_DATE: Regex = Regex::new(
        r" *\[x(\d{4}/\d{1,2}/\d{1,2}|\d{1,2}/\d{1,2})\]"
    ).unwrap();

    static ref PREFIX_EMOJI: Regex = Regex::new(r"^ *:[^:]+: *").unwrap();

    // Quick-add project markers such as "#Work"
    static ref PROJECT_MARKER: Regex = Regex::new(r" *#\S+").unwrap();

    // A label may carry its own shortcode: "Acme (:office:)"
    static ref LABEL_SHORTCODE: Regex = Regex::new(r"\((:[A-Za-z0-9_+\-]+:)\)").unwrap();

    static ref ISSUE_KEY: Regex = Regex::new(r"^([^-]+-[0-9]+) ").unwrap();
}

/// Remove the first bracketed section, brackets included
pub fn trim_bracket_contents(text: &str) -> String {
    BRACKET_CONTENTS.replace(text, "").into_owned()
}

/// Remove a bracketed time range such as "(9:00-10:00)"
pub fn trim_bracket_time(text: &str) -> String {
    BRACKET_TIME.replace(text, "").into_owned()
}

/// Remove a bracketed repeat date such as "[x2024/01/02]"
pub fn trim_bracket_date(text: &str) -> String {
    BRACKET_DATE.replace(text, "").into_owned()
}

/// Remove a leading ":shortcode:" prefix
pub fn trim_prefix_emoji(text: &str) -> String {
    PREFIX_EMOJI.replace(text, "").into_owned()
}

/// Title a timer entry gets when it is started from a task.
///
/// This is also the title the Done action compares against to decide whether
/// the linked task should be closed.
pub fn timer_title_from_task(task_title: &str) -> String {
    let title = trim_bracket_time(task_title);
    let title = trim_bracket_date(&title);
    let title = trim_prefix_emoji(&title);
    PROJECT_MARKER.replace_all(&title, "").trim().to_string()
}

/// Prefix for a label: its own shortcode if it carries one, else `default`
pub fn label_prefix(label: &str, default: &str) -> String {
    LABEL_SHORTCODE
        .captures(label)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| default.to_string())
}

/// Client part of a notification ("👥`Acme` > "), empty without a client
pub fn client_label(client: Option<&str>) -> String {
    match client.map(str::trim).filter(|c| !c.is_empty()) {
        Some(client) => format!(
            "{}`{}` > ",
            label_prefix(client, CLIENT_PREFIX),
            trim_bracket_contents(client).trim()
        ),
        None => String::new(),
    }
}

/// Project part of a notification ("📂`Website`"), empty without a project
pub fn project_label(project: Option<&str>) -> String {
    match project.map(str::trim).filter(|p| !p.is_empty()) {
        Some(project) => format!(
            "{}`{}`",
            label_prefix(project, PROJECT_PREFIX),
            trim_bracket_contents(project).trim()
        ),
        None => String::new(),
    }
}

/// Render elapsed seconds as "1h 05m", "12m 03s" or "9s"
pub fn format_elapsed(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds / 60) % 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Time part of a notification
pub fn time_label(seconds: u64) -> String {
    format!("`⏱{}`", format_elapsed(seconds))
}

/// Turn a leading issue key ("PROJ-12 ") into a link to the issue tracker
pub fn link_issue_key(text: &str, browser_url: Option<&str>) -> String {
    let base = match browser_url.map(|u| u.trim_end_matches('/')) {
        Some(base) if !base.is_empty() => base,
        _ => return text.to_string(),
    };

    ISSUE_KEY
        .replace(text, |caps: &Captures| {
            format!("<{}/{}|{}> ", base, &caps[1], &caps[1])
        })
        .into_owned()
}
