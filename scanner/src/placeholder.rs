//! Placeholder Engine (§4.1, component C1)
//!
//! Turns a template string plus a domain into a fully-qualified URL. Domain
//! parsing (registrable-suffix aware) lives here rather than in `shared`
//! because it is purely a materialization concern — the persisted `Domain`
//! entity only carries the original name.

use chrono::{DateTime, NaiveDate, Utc};
use shared::error::ScanError;
use std::sync::OnceLock;

/// Public suffixes with more than one label, per §4.1. Anything else falls
/// back to "last label is the TLD".
const MULTI_LEVEL_SUFFIXES: &[&str] = &[
    "co.uk", "com.cn", "com.au", "co.jp", "co.kr", "co.nz", "co.za", "com.br", "com.mx",
    "com.ar", "com.tw", "com.hk", "com.sg", "gov.uk", "ac.uk", "org.uk", "net.uk", "gov.au",
    "edu.au", "org.au", "ne.jp", "or.jp", "ac.jp", "go.jp",
];

/// The derived fields the placeholder engine computes from a host string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainParts {
    pub host: String,
    pub root_domain: String,
    pub subdomain: String,
    pub tld: String,
    pub sld: String,
    pub domain_underline: String,
    pub domain_nodot: String,
    pub domain_dash: String,
    pub domain_center: String,
}

impl DomainParts {
    pub fn parse(domain: &str) -> Self {
        let host = domain.to_lowercase();
        let labels: Vec<&str> = host.split('.').collect();

        let (tld, sld, subdomain) = if labels.len() >= 3 {
            let candidate = format!("{}.{}", labels[labels.len() - 2], labels[labels.len() - 1]);
            if MULTI_LEVEL_SUFFIXES.contains(&candidate.as_str()) {
                let sld = labels[labels.len() - 3].to_string();
                let subdomain = labels[..labels.len() - 3].join(".");
                (candidate, sld, subdomain)
            } else {
                let tld = labels[labels.len() - 1].to_string();
                let sld = labels[labels.len() - 2].to_string();
                let subdomain = labels[..labels.len() - 2].join(".");
                (tld, sld, subdomain)
            }
        } else if labels.len() == 2 {
            (
                labels[1].to_string(),
                labels[0].to_string(),
                String::new(),
            )
        } else {
            (String::new(), labels[0].to_string(), String::new())
        };

        let root_domain = if tld.is_empty() {
            sld.clone()
        } else {
            format!("{sld}.{tld}")
        };

        Self {
            domain_underline: host.replace('.', "_"),
            domain_nodot: host.replace('.', ""),
            domain_dash: host.replace('.', "-"),
            domain_center: sld.clone(),
            host,
            root_domain,
            subdomain,
            tld,
            sld,
        }
    }
}

/// Optional per-call substitution inputs. `rank` and `csv_date` are only
/// substituted when present (P9); `now` drives the date/time tokens and
/// defaults to the current time if not overridden, but tests should always
/// pass an explicit value for determinism.
#[derive(Debug, Clone)]
pub struct MaterializeOptions {
    pub rank: Option<i64>,
    pub csv_date: Option<NaiveDate>,
    pub now: DateTime<Utc>,
}

impl MaterializeOptions {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            rank: None,
            csv_date: None,
            now,
        }
    }

    pub fn with_rank(mut self, rank: i64) -> Self {
        self.rank = Some(rank);
        self
    }

    pub fn with_csv_date(mut self, csv_date: NaiveDate) -> Self {
        self.csv_date = Some(csv_date);
        self
    }
}

/// Brace/paren token names this engine understands (case-sensitive).
const SUPPORTED_PLAIN_TOKENS: &[&str] = &[
    "host",
    "domain",
    "root_domain",
    "topdomain",
    "subdomain",
    "tld",
    "sld",
    "domain_underline",
    "domain_nodot",
    "domain_dash",
    "domain_center",
    "year",
    "month",
    "day",
    "ymd",
    "date",
    "date_dash",
    "timestamp",
    "rank",
    "csv_date",
];

/// `#...#` token names this engine understands (case-insensitive).
const SUPPORTED_HASH_TOKENS: &[&str] = &[
    "domain",
    "topdomain",
    "underlinedomain",
    "domainnopoint",
    "midlinedomain",
    "domaincenter",
];

fn token_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"\{[a-z_]+\}|\([a-z_]+\)|#[a-zA-Z]+#").expect("static regex is valid")
    })
}

/// Extracts every placeholder-shaped token from a template and fails if any
/// is outside the supported set (§4.1 `validateTemplate`). A template with
/// no placeholders is valid.
pub fn validate_template(template: &str) -> Result<(), ScanError> {
    for m in token_regex().find_iter(template) {
        let raw = m.as_str();
        let supported = if let Some(name) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            SUPPORTED_PLAIN_TOKENS.contains(&name)
        } else if let Some(name) = raw.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
            SUPPORTED_PLAIN_TOKENS.contains(&name)
        } else {
            let name = raw.trim_matches('#').to_lowercase();
            SUPPORTED_HASH_TOKENS.contains(&name.as_str())
        };
        if !supported {
            return Err(ScanError::InvalidTemplate {
                template: template.to_string(),
                reason: format!("unsupported placeholder token {raw:?}"),
            });
        }
    }
    Ok(())
}

fn replace_case_insensitive(haystack: &str, needle: &str, replacement: &str) -> String {
    let pattern = regex::RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(true)
        .build()
        .expect("escaped literal is always a valid pattern");
    pattern.replace_all(haystack, regex::NoExpand(replacement)).into_owned()
}

/// Substitutes every recognized placeholder in `template` for `domain` and
/// prepends a scheme if the result does not already start with one,
/// reproducing the `https:/path…` historical quirk for leading slashes
/// (Design Notes §9 — preserved intentionally, see `DESIGN.md`).
pub fn materialize(template: &str, domain: &str, opts: &MaterializeOptions) -> Result<String, ScanError> {
    validate_template(template)?;

    let parts = DomainParts::parse(domain);
    let now = opts.now;

    let mut out = template.to_string();

    let plain: [(&str, String); 17] = [
        ("host", parts.host.clone()),
        ("domain", parts.host.clone()),
        ("root_domain", parts.root_domain.clone()),
        ("topdomain", parts.tld.clone()),
        ("subdomain", parts.subdomain.clone()),
        ("tld", parts.tld.clone()),
        ("sld", parts.sld.clone()),
        ("domain_underline", parts.domain_underline.clone()),
        ("domain_nodot", parts.domain_nodot.clone()),
        ("domain_dash", parts.domain_dash.clone()),
        ("domain_center", parts.domain_center.clone()),
        ("year", now.format("%Y").to_string()),
        ("month", now.format("%m").to_string()),
        ("day", now.format("%d").to_string()),
        ("ymd", now.format("%Y%m%d").to_string()),
        ("date", now.format("%Y%m%d").to_string()),
        ("date_dash", now.format("%Y-%m-%d").to_string()),
    ];
    for (key, value) in plain {
        out = out.replace(&format!("{{{key}}}"), &value);
        out = out.replace(&format!("({key})"), &value);
    }

    out = out.replace("{timestamp}", &now.timestamp().to_string());
    out = out.replace("(timestamp)", &now.timestamp().to_string());

    if let Some(rank) = opts.rank {
        out = out.replace("{rank}", &rank.to_string());
        out = out.replace("(rank)", &rank.to_string());
    }
    if let Some(csv_date) = opts.csv_date {
        let formatted = csv_date.format("%Y%m%d").to_string();
        out = out.replace("{csv_date}", &formatted);
        out = out.replace("(csv_date)", &formatted);
    }

    let hash_values: [(&str, &str); 6] = [
        ("domain", parts.host.as_str()),
        ("topdomain", parts.tld.as_str()),
        ("underlinedomain", parts.domain_underline.as_str()),
        ("domainnopoint", parts.domain_nodot.as_str()),
        ("midlinedomain", parts.domain_dash.as_str()),
        ("domaincenter", parts.domain_center.as_str()),
    ];
    for (key, value) in hash_values {
        out = replace_case_insensitive(&out, &format!("#{key}#"), value);
    }

    let scheme_re = regex::RegexBuilder::new(r"^https?://")
        .case_insensitive(true)
        .build()
        .expect("static pattern is valid");

    if scheme_re.is_match(&out) {
        Ok(out)
    } else if let Some(stripped) = out.strip_prefix('/') {
        Ok(format!("https:/{stripped}"))
    } else {
        Ok(format!("https://{out}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> MaterializeOptions {
        MaterializeOptions::new(
            DateTime::parse_from_rfc3339("2026-03-05T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        )
    }

    #[test]
    fn parses_simple_two_label_domain() {
        let p = DomainParts::parse("Example.COM");
        assert_eq!(p.host, "example.com");
        assert_eq!(p.tld, "com");
        assert_eq!(p.sld, "example");
        assert_eq!(p.subdomain, "");
        assert_eq!(p.root_domain, "example.com");
    }

    #[test]
    fn parses_multi_level_suffix() {
        let p = DomainParts::parse("www.shop.example.co.uk");
        assert_eq!(p.tld, "co.uk");
        assert_eq!(p.sld, "example");
        assert_eq!(p.subdomain, "www.shop");
        assert_eq!(p.root_domain, "example.co.uk");
    }

    #[test]
    fn falls_back_to_last_label_when_no_known_suffix_matches() {
        let p = DomainParts::parse("a.b.example.internal");
        assert_eq!(p.tld, "internal");
        assert_eq!(p.sld, "example");
        assert_eq!(p.subdomain, "a.b");
    }

    #[test]
    fn derived_string_forms_are_consistent() {
        let p = DomainParts::parse("my.example.com");
        assert_eq!(p.domain_underline, "my_example_com");
        assert_eq!(p.domain_nodot, "myexamplecom");
        assert_eq!(p.domain_dash, "my-example-com");
        assert_eq!(p.domain_center, "example");
    }

    #[test]
    fn materialize_is_deterministic_for_fixed_inputs() {
        let o = opts();
        let a = materialize("(domain)/backup.zip", "example.com", &o).unwrap();
        let b = materialize("(domain)/backup.zip", "example.com", &o).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "https://example.com/backup.zip");
    }

    #[test]
    fn rank_and_csv_date_are_substituted_only_when_provided() {
        let o = opts();
        let without = materialize("{host}/{rank}", "example.com", &o).unwrap();
        assert_eq!(without, "https://example.com/{rank}");

        let with_rank = materialize("{host}/{rank}", "example.com", &o.clone().with_rank(7)).unwrap();
        assert_eq!(with_rank, "https://example.com/7");
    }

    #[test]
    fn hash_tokens_are_case_insensitive() {
        let o = opts();
        let out = materialize("https://x/#DOMAIN#/#TopDomain#", "example.com", &o).unwrap();
        assert_eq!(out, "https://x/example.com/com");
    }

    #[test]
    fn prepends_https_when_scheme_is_missing() {
        let o = opts();
        let out = materialize("{host}/robots.txt", "example.com", &o).unwrap();
        assert_eq!(out, "https://example.com/robots.txt");
    }

    #[test]
    fn leading_slash_reproduces_the_historical_single_slash_quirk() {
        let o = opts();
        let out = materialize("/{host}/x", "example.com", &o).unwrap();
        assert_eq!(out, "https:/example.com/x");
    }

    #[test]
    fn existing_scheme_is_left_untouched() {
        let o = opts();
        let out = materialize("HTTP://{host}", "example.com", &o).unwrap();
        assert_eq!(out, "HTTP://example.com");
    }

    #[test]
    fn date_tokens_expand_from_now() {
        let o = opts();
        let out = materialize("{date}-{date_dash}-{ymd}", "example.com", &o).unwrap();
        assert_eq!(out, "https://20260305-2026-03-05-20260305");
    }

    #[test]
    fn validate_rejects_unsupported_tokens() {
        assert!(validate_template("{host}/{bogus}").is_err());
        assert!(validate_template("(sld)/ok").is_ok());
        assert!(validate_template("no placeholders here").is_ok());
    }
}
