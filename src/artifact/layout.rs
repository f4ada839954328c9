//! Grok-style layout patterns for object paths
//!
//! A layout such as `%{YEAR:year}/%{MONTHNUM:month}/(%{DATA:kind}/)?%{DATA}.json`
//! compiles into one anchored regex per alternative. `( … )?` groups are
//! optional and expand into "with" and "without" alternatives. A configured
//! path prefix adds prefixed twins of every alternative.
//!
//! Each alternative also keeps one regex per directory depth so the walker can
//! prune subtrees whose path can no longer match.

use std::collections::{BTreeMap, HashSet};

use regex::Regex;
use thiserror::Error;

const MAX_ALTERNATIVES: usize = 256;
const MAX_PATTERN_DEPTH: usize = 10;

#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error("unknown pattern %{{{0}}}")]
    UnknownPattern(String),

    #[error("unterminated %{{ in layout '{0}'")]
    Unterminated(String),

    #[error("invalid field name '{0}'")]
    InvalidFieldName(String),

    #[error("pattern %{{{0}}} nests too deeply")]
    TooDeep(String),

    #[error("layout expands into more than {MAX_ALTERNATIVES} alternatives")]
    TooManyAlternatives,

    #[error("field '{0}' appears in no layout alternative")]
    MissingField(String),

    #[error("invalid regex: {0}")]
    Regex(String),
}

/// Built-in patterns. None of them matches `/` except GREEDYDATA.
const BUILTIN_PATTERNS: &[(&str, &str)] = &[
    ("YEAR", r"\d{4}"),
    ("MONTHNUM", r"0[1-9]|1[0-2]"),
    ("MONTH", r"0[1-9]|1[0-2]"),
    ("MONTHDAY", r"0[1-9]|[12]\d|3[01]"),
    ("DAY", r"0[1-9]|[12]\d|3[01]"),
    ("HOUR", r"[01]\d|2[0-3]"),
    ("MINUTE", r"[0-5]\d"),
    ("SECOND", r"[0-5]\d|60"),
    ("INT", r"[+-]?\d+"),
    ("NUMBER", r"[+-]?\d+(?:\.\d+)?"),
    ("WORD", r"\w+"),
    ("NOTSPACE", r"[^\s/]+"),
    ("DATA", r"[^/]*?"),
    ("GREEDYDATA", r".*"),
];

#[derive(Debug, Clone)]
struct Alternative {
    full: Regex,
    /// `dirs[i]` matches a directory made of the first `i + 1` segments
    dirs: Vec<Regex>,
    /// Some pattern may cross `/`, so directory depth says nothing
    spanning: bool,
    fields: Vec<String>,
}

/// A compiled layout with all of its alternatives
#[derive(Debug, Clone)]
pub struct LayoutPattern {
    template: String,
    alternatives: Vec<Alternative>,
}

/// How the walker should treat a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirMatch {
    /// Some alternative can still match below; carries the fields seen so far
    Descend(BTreeMap<String, String>),
    SkipDir,
}

impl LayoutPattern {
    pub fn compile(
        template: &str,
        prefix: Option<&str>,
        custom: &BTreeMap<String, String>,
    ) -> Result<Self, LayoutError> {
        let patterns = PatternSet::new(custom);
        let expanded = expand_optional(template)?;

        let prefix = prefix.filter(|prefix| !prefix.is_empty());
        let mut alternatives = Vec::new();

        for variant in &expanded {
            let segments: Vec<&str> = variant.split('/').collect();
            alternatives.push(build_alternative(&[], &segments, &patterns)?);
        }

        if let Some(prefix) = prefix {
            let mut components: Vec<String> = prefix.split('/').map(regex::escape).collect();
            let last = components.pop().unwrap_or_default();

            for variant in &expanded {
                // `split` always yields at least one segment
                let segments: Vec<&str> = variant.split('/').collect();
                let (first, rest) = (segments[0], &segments[1..]);

                // Prefix joined directly onto the first segment
                let mut lead = components.clone();
                lead.push(last.clone());
                alternatives.push(build_joined(&lead, first, rest, &patterns)?);

                // Prefix is the start of a directory name of its own
                if !last.is_empty() {
                    let mut lead = components.clone();
                    lead.push(format!("{last}[^/]*"));
                    alternatives.push(build_alternative(&lead, &segments, &patterns)?);
                }
            }
        }

        if alternatives.len() > MAX_ALTERNATIVES {
            return Err(LayoutError::TooManyAlternatives);
        }

        Ok(Self {
            template: template.to_string(),
            alternatives,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn alternative_count(&self) -> usize {
        self.alternatives.len()
    }

    /// Match an object path; the first matching alternative wins
    pub fn match_path(&self, path: &str) -> Option<BTreeMap<String, String>> {
        self.alternatives
            .iter()
            .find_map(|alternative| captures(&alternative.full, path))
    }

    /// Decide whether a directory (no trailing `/`) may contain matches
    pub fn match_dir(&self, dir: &str) -> DirMatch {
        let depth = dir.split('/').count();
        let mut fields = BTreeMap::new();
        let mut possible = false;

        for alternative in &self.alternatives {
            if alternative.spanning {
                possible = true;
                continue;
            }
            let Some(regex) = alternative.dirs.get(depth - 1) else {
                continue;
            };
            if let Some(found) = captures(regex, dir) {
                possible = true;
                for (name, value) in found {
                    fields.entry(name).or_insert(value);
                }
            }
        }

        if possible {
            DirMatch::Descend(fields)
        } else {
            DirMatch::SkipDir
        }
    }

    /// Ensure each named field can be produced by at least one alternative
    pub fn require_fields(&self, required: &[&str]) -> Result<(), LayoutError> {
        for field in required {
            let present = self.alternatives.iter().any(|alternative| {
                alternative
                    .fields
                    .iter()
                    .any(|name| name.eq_ignore_ascii_case(field))
            });
            if !present {
                return Err(LayoutError::MissingField(field.to_string()));
            }
        }
        Ok(())
    }
}

fn captures(regex: &Regex, text: &str) -> Option<BTreeMap<String, String>> {
    let caps = regex.captures(text)?;
    Some(
        regex
            .capture_names()
            .flatten()
            .filter_map(|name| {
                caps.name(name)
                    .map(|value| (name.to_string(), value.as_str().to_string()))
            })
            .collect(),
    )
}

/// Lead segments are regex sources already; the rest are templates
fn build_alternative(
    lead: &[String],
    segments: &[&str],
    patterns: &PatternSet,
) -> Result<Alternative, LayoutError> {
    let mut translator = Translator::new(patterns);
    let mut sources: Vec<String> = lead.to_vec();
    for segment in segments {
        sources.push(translator.translate(segment)?);
    }
    finish(sources, translator)
}

/// Like `build_alternative`, with the last lead source glued onto `first`
fn build_joined(
    lead: &[String],
    first: &str,
    rest: &[&str],
    patterns: &PatternSet,
) -> Result<Alternative, LayoutError> {
    let mut translator = Translator::new(patterns);
    let mut sources: Vec<String> = lead.to_vec();
    let glued = translator.translate(first)?;
    match sources.last_mut() {
        Some(last) => last.push_str(&glued),
        None => sources.push(glued),
    }
    for segment in rest {
        sources.push(translator.translate(segment)?);
    }
    finish(sources, translator)
}

fn finish(sources: Vec<String>, translator: Translator<'_>) -> Result<Alternative, LayoutError> {
    let full = anchored(&sources.join("/"))?;
    let mut dirs = Vec::with_capacity(sources.len().saturating_sub(1));
    for depth in 1..sources.len() {
        dirs.push(anchored(&sources[..depth].join("/"))?);
    }
    Ok(Alternative {
        full,
        dirs,
        spanning: translator.spanning,
        fields: translator.fields,
    })
}

fn anchored(source: &str) -> Result<Regex, LayoutError> {
    Regex::new(&format!("^{source}$")).map_err(|e| LayoutError::Regex(e.to_string()))
}

struct PatternSet<'a> {
    custom: &'a BTreeMap<String, String>,
}

impl<'a> PatternSet<'a> {
    fn new(custom: &'a BTreeMap<String, String>) -> Self {
        Self { custom }
    }

    fn raw(&self, name: &str) -> Option<&str> {
        self.custom.get(name).map(String::as_str).or_else(|| {
            BUILTIN_PATTERNS
                .iter()
                .find(|(builtin, _)| *builtin == name)
                .map(|(_, body)| *body)
        })
    }

    /// Pattern body with nested `%{NAME}` references inlined
    fn resolve(&self, name: &str, depth: usize) -> Result<(String, bool), LayoutError> {
        if depth > MAX_PATTERN_DEPTH {
            return Err(LayoutError::TooDeep(name.to_string()));
        }
        let raw = self
            .raw(name)
            .ok_or_else(|| LayoutError::UnknownPattern(name.to_string()))?;

        let mut spanning =
            name == "GREEDYDATA" || (self.custom.contains_key(name) && may_match_slash(raw));

        let mut body = String::new();
        let mut rest = raw;
        while let Some(start) = rest.find("%{") {
            body.push_str(&rest[..start]);
            let end = rest[start..]
                .find('}')
                .ok_or_else(|| LayoutError::Unterminated(raw.to_string()))?;
            let inner = &rest[start + 2..start + end];
            let nested = inner.split(':').next().unwrap_or(inner);
            let (nested_body, nested_spanning) = self.resolve(nested, depth + 1)?;
            body.push_str(&format!("(?:{nested_body})"));
            spanning |= nested_spanning;
            rest = &rest[start + end + 1..];
        }
        body.push_str(rest);
        Ok((body, spanning))
    }
}

/// Whether a custom regex body could consume a `/`; unsure cases say yes
fn may_match_slash(raw: &str) -> bool {
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if matches!(chars.next(), Some('S' | 'W' | 'D' | '/')) {
                    return true;
                }
            }
            '.' | '/' => return true,
            '[' => {
                let negated = chars.next_if_eq(&'^').is_some();
                let mut members = String::new();
                // A leading `]` is a member, not the end of the class
                if let Some(first) = chars.next_if_eq(&']') {
                    members.push(first);
                }
                while let Some(member) = chars.next() {
                    match member {
                        ']' => break,
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                if matches!(escaped, 'S' | 'W' | 'D') && !negated {
                                    return true;
                                }
                                members.push(escaped);
                            }
                        }
                        other => members.push(other),
                    }
                }
                if negated != members.contains('/') {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

/// Translates template text into regex source, one alternative at a time
struct Translator<'a> {
    patterns: &'a PatternSet<'a>,
    used: HashSet<String>,
    fields: Vec<String>,
    spanning: bool,
}

impl<'a> Translator<'a> {
    fn new(patterns: &'a PatternSet<'a>) -> Self {
        Self {
            patterns,
            used: HashSet::new(),
            fields: Vec::new(),
            spanning: false,
        }
    }

    fn translate(&mut self, template: &str) -> Result<String, LayoutError> {
        let mut out = String::new();
        let mut rest = template;

        while let Some(start) = rest.find("%{") {
            out.push_str(&regex::escape(&rest[..start]));
            let end = rest[start..]
                .find('}')
                .ok_or_else(|| LayoutError::Unterminated(template.to_string()))?;
            let token = &rest[start + 2..start + end];
            let (name, field) = match token.split_once(':') {
                Some((name, field)) => (name, field),
                None => (token, token),
            };

            let (body, spanning) = self.patterns.resolve(name, 0)?;
            self.spanning |= spanning;

            if !valid_field_name(field) {
                return Err(LayoutError::InvalidFieldName(field.to_string()));
            }
            // Repeated names capture only once
            if self.used.insert(field.to_string()) {
                self.fields.push(field.to_string());
                out.push_str(&format!("(?P<{field}>{body})"));
            } else {
                out.push_str(&format!("(?:{body})"));
            }

            rest = &rest[start + end + 1..];
        }
        out.push_str(&regex::escape(rest));
        Ok(out)
    }
}

fn valid_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Expand `( … )?` groups into every with/without combination, "with" first
fn expand_optional(template: &str) -> Result<Vec<String>, LayoutError> {
    let Some((open, close)) = find_optional(template) else {
        return Ok(vec![template.to_string()]);
    };

    let before = &template[..open];
    let inner = &template[open + 1..close];
    let after = &template[close + 2..];

    let mut inners = expand_optional(inner)?;
    inners.push(String::new());
    let afters = expand_optional(after)?;

    let mut out = Vec::with_capacity(inners.len() * afters.len());
    for inner in &inners {
        for after in &afters {
            out.push(format!("{before}{inner}{after}"));
            if out.len() > MAX_ALTERNATIVES {
                return Err(LayoutError::TooManyAlternatives);
            }
        }
    }
    Ok(out)
}

/// First `(` whose matching `)` is followed by `?`, outside `%{…}` tokens
fn find_optional(template: &str) -> Option<(usize, usize)> {
    let bytes = template.as_bytes();
    let mut in_token = false;

    for open in 0..bytes.len() {
        match bytes[open] {
            b'{' if open > 0 && bytes[open - 1] == b'%' => in_token = true,
            b'}' => in_token = false,
            b'(' if !in_token => {
                let mut depth = 0usize;
                for close in open..bytes.len() {
                    match bytes[close] {
                        b'(' => depth += 1,
                        b')' => {
                            depth -= 1;
                            if depth == 0 {
                                if bytes.get(close + 1) == Some(&b'?') {
                                    return Some((open, close));
                                }
                                break;
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(template: &str, prefix: Option<&str>) -> LayoutPattern {
        LayoutPattern::compile(template, prefix, &BTreeMap::new()).unwrap()
    }

    fn field<'a>(fields: &'a BTreeMap<String, String>, name: &str) -> &'a str {
        fields.get(name).map(String::as_str).unwrap_or("<missing>")
    }

    #[test]
    fn test_unnamed_patterns_capture_under_pattern_name() {
        let layout = compile("%{YEAR}/%{MONTH}/%{DAY}/file.json", None);
        let fields = layout.match_path("2025/06/06/file.json").unwrap();
        assert_eq!(field(&fields, "YEAR"), "2025");
        assert_eq!(field(&fields, "MONTH"), "06");
        assert_eq!(field(&fields, "DAY"), "06");

        assert!(layout.match_path("2025/13/06/file.json").is_none());
        assert!(layout.match_path("2025/06/06/other.json").is_none());
    }

    #[test]
    fn test_prefixed_alternative() {
        let layout = compile("%{YEAR}/%{MONTH}/%{DAY}/file.json", Some("2025-06-06"));

        let prefixed = layout
            .match_path("2025-06-06activity/2025/06/06/file.json")
            .unwrap();
        let plain = layout.match_path("2025/06/06/file.json").unwrap();

        assert_eq!(prefixed, plain);
        assert_eq!(field(&prefixed, "YEAR"), "2025");
        assert_eq!(field(&prefixed, "MONTH"), "06");
        assert_eq!(field(&prefixed, "DAY"), "06");
    }

    #[test]
    fn test_directory_prefix() {
        let layout = compile("%{YEAR:year}/%{DATA:name}.json", Some("exports/"));
        assert_eq!(layout.alternative_count(), 2);

        let fields = layout.match_path("exports/2024/a.json").unwrap();
        assert_eq!(field(&fields, "year"), "2024");
        assert_eq!(field(&fields, "name"), "a");
        assert!(layout.match_path("exports/x/2024/a.json").is_none());
    }

    #[test]
    fn test_optional_segments_expand() {
        let layout = compile("logs/(%{WORD:kind}/)?%{YEAR:year}.json", None);
        assert_eq!(layout.alternative_count(), 2);

        let with = layout.match_path("logs/activity/2025.json").unwrap();
        assert_eq!(field(&with, "kind"), "activity");

        let without = layout.match_path("logs/2025.json").unwrap();
        assert!(!without.contains_key("kind"));
        assert_eq!(field(&without, "year"), "2025");
    }

    #[test]
    fn test_default_audit_layout() {
        let layout = compile(
            "cloudaudit.googleapis.com/%{DATA:type}/%{YEAR:year}/%{MONTHNUM:month}/%{MONTHDAY:day}/\
             %{HOUR:hour}:%{MINUTE:minute}:%{SECOND:second}_%{DATA:end_time}_%{DATA:suffix}.json",
            None,
        );
        let fields = layout
            .match_path("cloudaudit.googleapis.com/activity/2025/06/06/10:00:00_10:59:59_S0.json")
            .unwrap();
        assert_eq!(field(&fields, "type"), "activity");
        assert_eq!(field(&fields, "hour"), "10");
        assert_eq!(field(&fields, "end_time"), "10:59:59");
        assert_eq!(field(&fields, "suffix"), "S0");
    }

    #[test]
    fn test_dir_pruning() {
        let layout = compile("logs/%{YEAR:year}/%{MONTHNUM:month}/%{DATA}.json", None);

        assert_eq!(layout.match_dir("logs"), DirMatch::Descend(BTreeMap::new()));
        match layout.match_dir("logs/2025") {
            DirMatch::Descend(fields) => assert_eq!(field(&fields, "year"), "2025"),
            DirMatch::SkipDir => panic!("year directory pruned"),
        }
        assert_eq!(layout.match_dir("other"), DirMatch::SkipDir);
        assert_eq!(layout.match_dir("logs/tmp"), DirMatch::SkipDir);
        assert_eq!(layout.match_dir("logs/2025/06/deeper"), DirMatch::SkipDir);
    }

    #[test]
    fn test_spanning_pattern_disables_pruning() {
        let layout = compile("%{GREEDYDATA:path}.json", None);
        assert!(matches!(layout.match_dir("anything/at/all"), DirMatch::Descend(_)));
        let fields = layout.match_path("a/b/c.json").unwrap();
        assert_eq!(field(&fields, "path"), "a/b/c");
    }

    #[test]
    fn test_custom_patterns() {
        let mut custom = BTreeMap::new();
        custom.insert("DATESTAMP".to_string(), "%{YEAR}-%{MONTHNUM}".to_string());
        let layout = LayoutPattern::compile("%{DATESTAMP:stamp}/x.log", None, &custom).unwrap();

        let fields = layout.match_path("2025-06/x.log").unwrap();
        assert_eq!(field(&fields, "stamp"), "2025-06");
    }

    #[test]
    fn test_custom_pattern_crossing_directories_disables_pruning() {
        let mut custom = BTreeMap::new();
        custom.insert("DATEPATH".to_string(), "%{YEAR}/%{MONTHNUM}".to_string());
        custom.insert("UNTIL_UNDERSCORE".to_string(), "[^_]+".to_string());

        let layout =
            LayoutPattern::compile("logs/%{DATEPATH:date}/%{DATA:name}.json", None, &custom).unwrap();
        assert!(matches!(layout.match_dir("logs/2025"), DirMatch::Descend(_)));
        assert!(matches!(layout.match_dir("logs/2025/06"), DirMatch::Descend(_)));
        let fields = layout.match_path("logs/2025/06/a.json").unwrap();
        assert_eq!(field(&fields, "date"), "2025/06");

        let layout =
            LayoutPattern::compile("%{UNTIL_UNDERSCORE:head}_x.json", None, &custom).unwrap();
        assert!(matches!(layout.match_dir("a/b"), DirMatch::Descend(_)));
        assert_eq!(field(&layout.match_path("a/b_x.json").unwrap(), "head"), "a/b");
    }

    #[test]
    fn test_may_match_slash() {
        assert!(may_match_slash("a/b"));
        assert!(may_match_slash(".+"));
        assert!(may_match_slash(r"\S+"));
        assert!(may_match_slash("[^_]+"));
        assert!(may_match_slash("[a-z/]+"));
        assert!(!may_match_slash(r"[^/_]+"));
        assert!(!may_match_slash(r"\d{4}-\w+"));
        assert!(!may_match_slash(r"[a-z\.]+\.log"));
        assert!(!may_match_slash("%{YEAR}-%{MONTHNUM}"));
    }

    #[test]
    fn test_errors() {
        let none = BTreeMap::new();
        assert_eq!(
            LayoutPattern::compile("%{NOPE}/x", None, &none).unwrap_err(),
            LayoutError::UnknownPattern("NOPE".to_string())
        );
        assert!(matches!(
            LayoutPattern::compile("%{YEAR", None, &none),
            Err(LayoutError::Unterminated(_))
        ));
        assert_eq!(
            LayoutPattern::compile("%{YEAR:bad-name}", None, &none).unwrap_err(),
            LayoutError::InvalidFieldName("bad-name".to_string())
        );
    }

    #[test]
    fn test_require_fields() {
        let layout = compile("(%{YEAR:year}/)?%{DATA}.json", None);
        assert!(layout.require_fields(&["year", "DATA"]).is_ok());
        assert_eq!(
            layout.require_fields(&["month"]),
            Err(LayoutError::MissingField("month".to_string()))
        );
    }

    #[test]
    fn test_repeated_names_capture_once() {
        let layout = compile("%{DATA}/%{DATA}.json", None);
        let fields = layout.match_path("a/b.json").unwrap();
        assert_eq!(field(&fields, "DATA"), "a");
    }
}
