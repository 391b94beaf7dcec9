//! Request matching logic.
//!
//! Matches intercepted requests against the rules of one scenario, in file
//! order. The first enabled rule whose criteria all hold wins.

use crate::error::DecodeError;
use crate::http::HttpRequest;
use crate::scenario::{
    BodyMatcher, HeaderMatcher, PathMatcher, QueryMatcher, RequestMatcher, ScenarioDescriptor,
    ScenarioRule,
};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};

/// Context captured during matching (for template variables).
#[derive(Debug, Clone, Default)]
pub struct MatchContext {
    /// Path parameters extracted from template matching
    pub path_params: HashMap<String, String>,
    /// Query parameters
    pub query_params: HashMap<String, String>,
    /// Regex capture groups
    pub captures: HashMap<String, String>,
}

/// Result of matching a request against a scenario.
#[derive(Debug)]
pub struct MatchResult<'a> {
    /// Position of the rule in the scenario file
    pub index: usize,
    /// The matched rule
    pub rule: &'a ScenarioRule,
    /// Context captured during matching
    pub context: MatchContext,
}

/// Matcher compiled for one scenario descriptor.
///
/// Built fresh for every resolution; nothing is shared between requests.
pub struct RuleMatcher {
    /// Compiled path matchers, one slot per rule
    path_matchers: Vec<Option<CompiledPathMatcher>>,
    /// Every regex the scenario uses, keyed by pattern
    regexes: HashMap<String, Regex>,
}

enum CompiledPathMatcher {
    Exact(String),
    Prefix(String),
    Regex(Regex),
    Glob(globset::GlobMatcher),
    Template(PathTemplate),
}

struct PathTemplate {
    segments: Vec<TemplateSegment>,
}

enum TemplateSegment {
    Literal(String),
    Param(String),
}

impl PathTemplate {
    fn parse(template: &str) -> Self {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut in_param = false;
        let mut param_name = String::new();

        for ch in template.chars() {
            if ch == '{' && !in_param {
                if !current.is_empty() {
                    segments.push(TemplateSegment::Literal(std::mem::take(&mut current)));
                }
                in_param = true;
                param_name.clear();
            } else if ch == '}' && in_param {
                segments.push(TemplateSegment::Param(std::mem::take(&mut param_name)));
                in_param = false;
            } else if in_param {
                param_name.push(ch);
            } else {
                current.push(ch);
            }
        }

        if !current.is_empty() {
            segments.push(TemplateSegment::Literal(current));
        }

        Self { segments }
    }

    fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let mut params = HashMap::new();
        let mut remaining = path;

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                TemplateSegment::Literal(lit) => {
                    remaining = remaining.strip_prefix(lit.as_str())?;
                }
                TemplateSegment::Param(name) => {
                    let end_pos = match self.segments.get(i + 1) {
                        Some(TemplateSegment::Literal(next_lit)) => {
                            remaining.find(next_lit.as_str())?
                        }
                        _ => remaining.find('/').unwrap_or(remaining.len()),
                    };

                    // A parameter is one non-empty path segment
                    let value = &remaining[..end_pos];
                    if value.is_empty() || value.contains('/') {
                        return None;
                    }

                    params.insert(name.clone(), value.to_string());
                    remaining = &remaining[end_pos..];
                }
            }
        }

        // Must consume entire path
        if remaining.is_empty() {
            Some(params)
        } else {
            None
        }
    }
}

impl RuleMatcher {
    /// Compile a scenario, rejecting rules that cannot be evaluated.
    pub fn compile(scenario: &ScenarioDescriptor) -> Result<Self, DecodeError> {
        scenario.validate()?;

        let mut regexes = HashMap::new();
        let mut path_matchers = Vec::with_capacity(scenario.rules.len());

        for (index, rule) in scenario.rules.iter().enumerate() {
            let invalid = |message: String| DecodeError::InvalidRule {
                rule: rule.label(index),
                message,
            };

            for pattern in rule.request.regex_patterns() {
                if !regexes.contains_key(pattern) {
                    let regex = Regex::new(pattern).map_err(|e| invalid(e.to_string()))?;
                    regexes.insert(pattern.to_string(), regex);
                }
            }

            let compiled = match &rule.request.path {
                None => None,
                Some(PathMatcher::Exact { value }) => Some(CompiledPathMatcher::Exact(value.clone())),
                Some(PathMatcher::Prefix { value }) => {
                    Some(CompiledPathMatcher::Prefix(value.clone()))
                }
                Some(PathMatcher::Regex { pattern }) => {
                    let regex = Regex::new(pattern).map_err(|e| invalid(e.to_string()))?;
                    Some(CompiledPathMatcher::Regex(regex))
                }
                Some(PathMatcher::Glob { pattern }) => {
                    let glob = globset::Glob::new(pattern).map_err(|e| invalid(e.to_string()))?;
                    Some(CompiledPathMatcher::Glob(glob.compile_matcher()))
                }
                Some(PathMatcher::Template { template }) => {
                    Some(CompiledPathMatcher::Template(PathTemplate::parse(template)))
                }
            };
            path_matchers.push(compiled);
        }

        Ok(Self {
            path_matchers,
            regexes,
        })
    }

    /// Find the first matching rule for a request, in file order.
    pub fn find_match<'a>(
        &self,
        scenario: &'a ScenarioDescriptor,
        request: &HttpRequest,
    ) -> Option<MatchResult<'a>> {
        scenario
            .rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.enabled)
            .find_map(|(index, rule)| {
                self.matches_request(index, &rule.request, request)
                    .map(|context| MatchResult {
                        index,
                        rule,
                        context,
                    })
            })
    }

    fn matches_request(
        &self,
        rule_idx: usize,
        matcher: &RequestMatcher,
        request: &HttpRequest,
    ) -> Option<MatchContext> {
        let mut context = MatchContext::default();

        if !matcher.method.is_empty()
            && !matcher
                .method
                .iter()
                .any(|m| m.eq_ignore_ascii_case(&request.method))
        {
            return None;
        }

        if let Some(Some(path_matcher)) = self.path_matchers.get(rule_idx) {
            if !self.matches_path(path_matcher, request.path(), &mut context) {
                return None;
            }
        }

        context.query_params = request.query_params();

        for (name, qm) in &matcher.query {
            if !self.matches_query(&context.query_params, name, qm) {
                return None;
            }
        }

        for (name, hm) in &matcher.headers {
            if !self.matches_header(request.header(name), hm) {
                return None;
            }
        }

        if let Some(bm) = &matcher.body {
            if !self.matches_body(request.body_bytes(), bm) {
                return None;
            }
        }

        Some(context)
    }

    fn matches_path(
        &self,
        matcher: &CompiledPathMatcher,
        path: &str,
        context: &mut MatchContext,
    ) -> bool {
        match matcher {
            CompiledPathMatcher::Exact(value) => path == value,
            CompiledPathMatcher::Prefix(value) => path.starts_with(value.as_str()),
            CompiledPathMatcher::Regex(regex) => {
                let Some(captures) = regex.captures(path) else {
                    return false;
                };
                for (i, cap) in captures.iter().enumerate().skip(1) {
                    if let Some(m) = cap {
                        context.captures.insert(i.to_string(), m.as_str().to_string());
                    }
                }
                for name in regex.capture_names().flatten() {
                    if let Some(m) = captures.name(name) {
                        context.captures.insert(name.to_string(), m.as_str().to_string());
                    }
                }
                true
            }
            CompiledPathMatcher::Glob(glob) => glob.is_match(path),
            CompiledPathMatcher::Template(template) => match template.matches(path) {
                Some(params) => {
                    context.path_params = params;
                    true
                }
                None => false,
            },
        }
    }

    fn regex_matches(&self, pattern: &str, value: &str) -> bool {
        self.regexes
            .get(pattern)
            .map(|regex| regex.is_match(value))
            .unwrap_or(false)
    }

    fn matches_query(
        &self,
        query_params: &HashMap<String, String>,
        name: &str,
        matcher: &QueryMatcher,
    ) -> bool {
        match matcher {
            QueryMatcher::Exact { value } => query_params.get(name) == Some(value),
            QueryMatcher::Regex { pattern } => query_params
                .get(name)
                .map(|val| self.regex_matches(pattern, val))
                .unwrap_or(false),
            QueryMatcher::Present => query_params.contains_key(name),
            QueryMatcher::Absent => !query_params.contains_key(name),
        }
    }

    fn matches_header(&self, header_value: Option<&str>, matcher: &HeaderMatcher) -> bool {
        match matcher {
            HeaderMatcher::Exact { value } => header_value == Some(value.as_str()),
            HeaderMatcher::Regex { pattern } => header_value
                .map(|val| self.regex_matches(pattern, val))
                .unwrap_or(false),
            HeaderMatcher::Present => header_value.is_some(),
            HeaderMatcher::Absent => header_value.is_none(),
            HeaderMatcher::Contains { value } => header_value
                .map(|v| v.contains(value.as_str()))
                .unwrap_or(false),
        }
    }

    fn matches_body(&self, body: Option<&[u8]>, matcher: &BodyMatcher) -> bool {
        let body_str = body.and_then(|b| std::str::from_utf8(b).ok());

        match matcher {
            BodyMatcher::Exact { value } => body_str == Some(value.as_str()),
            BodyMatcher::Regex { pattern } => body_str
                .map(|bs| self.regex_matches(pattern, bs))
                .unwrap_or(false),
            BodyMatcher::JsonPath { expressions } => body_str
                .and_then(|bs| serde_json::from_str::<serde_json::Value>(bs).ok())
                .map(|json| matches_json_paths(&json, expressions))
                .unwrap_or(false),
            BodyMatcher::Contains { value } => body_str
                .map(|bs| bs.contains(value.as_str()))
                .unwrap_or(false),
            BodyMatcher::Json => body_str
                .map(|bs| serde_json::from_str::<serde_json::Value>(bs).is_ok())
                .unwrap_or(false),
            BodyMatcher::Empty => body.map(|b| b.is_empty()).unwrap_or(true),
        }
    }
}

fn matches_json_paths(
    json: &serde_json::Value,
    expressions: &BTreeMap<String, serde_json::Value>,
) -> bool {
    use jsonpath_rust::JsonPath;

    expressions.iter().all(|(path_expr, expected)| {
        let path: JsonPath = match JsonPath::try_from(path_expr.as_str()) {
            Ok(p) => p,
            Err(_) => return false,
        };

        let found = match path.find(json) {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Null => Vec::new(),
            other => vec![other],
        };

        // null expected: the path only has to resolve
        if expected.is_null() {
            !found.is_empty()
        } else {
            found.iter().any(|value| value == expected)
        }
    })
}
