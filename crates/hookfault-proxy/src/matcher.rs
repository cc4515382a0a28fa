//! Fault-eligibility rules and the segment path patterns they match on.
//!
//! A pattern such as `/routes/{id}/add/` is split into literal and wildcard
//! segments and compared segment by segment.

use crate::config::RuleConfig;
use crate::error::PatternError;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// Matches exactly one non-empty segment.
    Wildcard(String),
}

impl Segment {
    fn matches(&self, segment: &str) -> bool {
        match self {
            Segment::Literal(lit) => lit == segment,
            Segment::Wildcard(_) => !segment.is_empty(),
        }
    }
}

/// Path pattern made of `/`-separated segments.
///
/// The trailing slash is significant: `/v1/routes/visits/` does not match
/// `/v1/routes/visits`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
    trailing_slash: bool,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let (parts, trailing_slash) = split_path(pattern)
            .ok_or_else(|| PatternError::MissingLeadingSlash(pattern.to_string()))?;

        let mut segments = Vec::with_capacity(parts.len());
        let mut wildcards = 0;
        for part in parts {
            if let Some(name) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                if name.contains(['{', '}']) {
                    return Err(PatternError::PartialWildcard(pattern.to_string()));
                }
                wildcards += 1;
                if wildcards > 1 {
                    return Err(PatternError::MultipleWildcards(pattern.to_string()));
                }
                segments.push(Segment::Wildcard(name.to_string()));
            } else if part.contains(['{', '}']) {
                return Err(PatternError::PartialWildcard(pattern.to_string()));
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
            trailing_slash,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Anchored match against the whole request target, query included.
    pub fn matches(&self, path: &str) -> bool {
        let Some((parts, trailing)) = split_path(path) else {
            return false;
        };
        trailing == self.trailing_slash
            && parts.len() == self.segments.len()
            && self
                .segments
                .iter()
                .zip(parts.iter())
                .all(|(seg, part)| seg.matches(part))
    }

    /// Unanchored match: the pattern's segments appear as a consecutive run
    /// anywhere in the path. With a trailing slash in the pattern, the run
    /// must be followed by a `/`.
    pub fn found_in(&self, path: &str) -> bool {
        let Some((parts, trailing)) = split_path(path) else {
            return false;
        };
        let width = self.segments.len();
        if width == 0 {
            return !self.trailing_slash || trailing || !parts.is_empty();
        }
        if parts.len() < width {
            return false;
        }

        (0..=parts.len() - width).any(|start| {
            let end = start + width;
            let window_ok = self
                .segments
                .iter()
                .zip(&parts[start..end])
                .all(|(seg, part)| seg.matches(part));
            let slash_ok = !self.trailing_slash || end < parts.len() || trailing;
            window_ok && slash_ok
        })
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split `/a/b/` into (`["a", "b"]`, trailing slash). `None` if the path is
/// not absolute.
fn split_path(path: &str) -> Option<(Vec<&str>, bool)> {
    let rest = path.strip_prefix('/')?;
    let trailing = rest.ends_with('/');
    let body = if trailing {
        &rest[..rest.len() - 1]
    } else {
        rest
    };
    let parts = if body.is_empty() {
        Vec::new()
    } else {
        body.split('/').collect()
    };
    Some((parts, trailing))
}

/// Strip the query string from a request target.
pub fn path_only(path_and_query: &str) -> &str {
    path_and_query
        .split_once('?')
        .map(|(path, _)| path)
        .unwrap_or(path_and_query)
}

/// One fault-eligibility rule. Immutable once compiled.
#[derive(Debug, Clone)]
pub struct FaultRule {
    pub id: String,
    pub method: String,
    pub pattern: PathPattern,
    pub eligible_codes: Vec<u16>,
}

impl FaultRule {
    pub fn compile(config: &RuleConfig) -> Result<Self, PatternError> {
        Ok(Self {
            id: config.id.clone(),
            method: config.method.to_ascii_uppercase(),
            pattern: PathPattern::parse(&config.path)?,
            eligible_codes: config.codes.clone(),
        })
    }

    pub fn matches(&self, method: &str, path: &str) -> bool {
        self.method.eq_ignore_ascii_case(method) && self.pattern.matches(path)
    }

    pub fn is_eligible(&self, status: u16) -> bool {
        self.eligible_codes.contains(&status)
    }
}

/// Ordered rule set, evaluated top to bottom.
#[derive(Debug, Clone, Default)]
pub struct RuleMatcher {
    rules: Vec<FaultRule>,
}

impl RuleMatcher {
    pub fn new(rules: Vec<FaultRule>) -> Self {
        Self { rules }
    }

    pub fn compile(configs: &[RuleConfig]) -> Result<Self, PatternError> {
        let rules = configs
            .iter()
            .map(FaultRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rules))
    }

    /// First rule whose method and anchored pattern match. Later rules are
    /// never consulted once one matches, even if they would match too.
    pub fn find(&self, method: &str, path: &str) -> Option<&FaultRule> {
        self.rules.iter().find(|rule| rule.matches(method, path))
    }

    pub fn rules(&self) -> &[FaultRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
