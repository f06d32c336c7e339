//! Date-Range Expander (§4.2, component C2)
//!
//! Expands `{<start>..<end>}` tokens embedded in a template into one
//! template per date in the range, so the placeholder engine (C1) later
//! substitutes `{date}`/`{ymd}` normally — this module never materializes a
//! URL itself, it only multiplies template strings.

use chrono::{Datelike, NaiveDate};
use std::sync::OnceLock;

const MAX_DAILY_ENTRIES: usize = 365;
const MAX_MONTHLY_ENTRIES: usize = 60;
const MAX_EXPANSION_ITERATIONS: usize = 10;
const DEFAULT_MAX_RESULTS: usize = 10_000;

fn range_token_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"\{(\d{8}|\d{6})\.\.(\d{8}|\d{6})\}").expect("static regex is valid")
    })
}

fn parse_ymd(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y%m%d").ok()
}

fn parse_ym(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{s}01"), "%Y%m%d").ok()
}

fn next_month(d: NaiveDate) -> NaiveDate {
    if d.month() == 12 {
        NaiveDate::from_ymd_opt(d.year() + 1, 1, 1).expect("valid date")
    } else {
        NaiveDate::from_ymd_opt(d.year(), d.month() + 1, 1).expect("valid date")
    }
}

/// Expands the first `{start..end}` token found in `template`, replacing it
/// with one template per date in the inclusive range. Returns the input
/// unchanged (a single-element vector) if no token is found, either
/// endpoint fails to parse, the lengths disagree, or `start > end` (§4.2).
pub fn expand_date_range(template: &str) -> Vec<String> {
    let Some(m) = range_token_regex().captures(template) else {
        return vec![template.to_string()];
    };

    let full = m.get(0).unwrap();
    let start_raw = &m[1];
    let end_raw = &m[2];

    if start_raw.len() != end_raw.len() {
        return vec![template.to_string()];
    }

    let is_daily = start_raw.len() == 8;
    let (start, end) = if is_daily {
        match (parse_ymd(start_raw), parse_ymd(end_raw)) {
            (Some(s), Some(e)) => (s, e),
            _ => return vec![template.to_string()],
        }
    } else {
        match (parse_ym(start_raw), parse_ym(end_raw)) {
            (Some(s), Some(e)) => (s, e),
            _ => return vec![template.to_string()],
        }
    };

    if start > end {
        return vec![template.to_string()];
    }

    let cap = if is_daily { MAX_DAILY_ENTRIES } else { MAX_MONTHLY_ENTRIES };
    let mut dates = Vec::new();
    let mut cursor = start;
    while cursor <= end && dates.len() < cap {
        dates.push(cursor);
        cursor = if is_daily {
            cursor.succ_opt().expect("date does not overflow")
        } else {
            next_month(cursor)
        };
    }

    dates
        .into_iter()
        .map(|d| {
            let token = if is_daily {
                d.format("%Y%m%d").to_string()
            } else {
                d.format("%Y%m").to_string()
            };
            format!("{}{}{}", &template[..full.start()], token, &template[full.end()..])
        })
        .collect()
}

/// Repeatedly expands every range token in every template until none remain
/// or `MAX_EXPANSION_ITERATIONS` elapse, guarding against pathological
/// nesting such as a template containing more than one range token.
pub fn expand_all_date_ranges(templates: &[String]) -> Vec<String> {
    let mut current = templates.to_vec();
    for _ in 0..MAX_EXPANSION_ITERATIONS {
        if !current.iter().any(|t| range_token_regex().is_match(t)) {
            break;
        }
        current = current.iter().flat_map(|t| expand_date_range(t)).collect();
    }
    current
}

/// The result of [`safe_expand_date_ranges`]: the expanded templates plus
/// whether the `max_results` cap was hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeExpansion {
    pub templates: Vec<String>,
    pub truncated: bool,
}

/// `safeExpandDateRanges` (§4.2): expands every template, then truncates the
/// flat result list to `max_results`, reporting whether truncation occurred.
pub fn safe_expand_date_ranges(templates: &[String], max_results: Option<usize>) -> SafeExpansion {
    let max_results = max_results.unwrap_or(DEFAULT_MAX_RESULTS);
    let expanded = expand_all_date_ranges(templates);
    if expanded.len() > max_results {
        SafeExpansion {
            templates: expanded[..max_results].to_vec(),
            truncated: true,
        }
    } else {
        SafeExpansion {
            templates: expanded,
            truncated: false,
        }
    }
}
