//! Required request headers

use std::collections::HashSet;

use super::{BlockContext, RuleClass, RuleOutcome, SyncRule};
use crate::error::{AclError, Result};
use crate::matcher::MatcherWithWildcards;
use crate::value::{resolve_all, Value};

/// Whether all or any of the configured headers must be present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadersMode {
    /// `headers`: every configured header is required
    And,
    /// `headers_or`: one configured header suffices
    Or,
}

/// Matches request headers against `name:value` patterns
///
/// Names compare case-insensitively; values are wildcard patterns and may
/// reference request variables.
#[derive(Debug, Clone)]
pub struct HeadersRule {
    mode: HeadersMode,
    patterns: Vec<Value<String>>,
}

impl HeadersRule {
    pub fn new<I, S>(mode: HeadersMode, headers: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let key = rule_key(mode);
        let mut names = HashSet::new();
        let mut patterns = Vec::new();

        for header in headers {
            let header = header.as_ref();
            let Some((name, value)) = header.split_once(':') else {
                return Err(AclError::invalid_rule(
                    key,
                    format!("'{}' is not of the form name:value", header),
                ));
            };
            let name = name.trim().to_lowercase();
            if name.is_empty() {
                return Err(AclError::invalid_rule(key, format!("'{}' has an empty name", header)));
            }
            if mode == HeadersMode::And && !names.insert(name.clone()) {
                return Err(AclError::invalid_rule(
                    key,
                    format!("header '{}' is required more than once", name),
                ));
            }
            patterns.push(Value::text(format!("{}:{}", name, value.trim())));
        }

        if patterns.is_empty() {
            return Err(AclError::invalid_rule(key, "at least one header is required"));
        }

        Ok(Self { mode, patterns })
    }
}

fn rule_key(mode: HeadersMode) -> &'static str {
    match mode {
        HeadersMode::And => "headers",
        HeadersMode::Or => "headers_or",
    }
}

impl SyncRule for HeadersRule {
    fn key(&self) -> &str {
        rule_key(self.mode)
    }

    fn class(&self) -> RuleClass {
        RuleClass::Inspection
    }

    fn check(&self, ctx: &BlockContext<'_>) -> Result<RuleOutcome> {
        let present: Vec<String> = ctx
            .request()
            .headers()
            .iter()
            .map(|(name, value)| format!("{}:{}", name, value))
            .collect();

        let patterns = resolve_all(&self.patterns, &ctx.variables())?;
        let matches = |pattern: &String| {
            let matcher = MatcherWithWildcards::new([pattern.as_str()]);
            present.iter().any(|header| matcher.matches(header))
        };

        let matched = match self.mode {
            // an unresolvable pattern can never be satisfied
            HeadersMode::And => patterns.len() == self.patterns.len() && patterns.iter().all(matches),
            HeadersMode::Or => patterns.iter().any(matches),
        };

        Ok(RuleOutcome::from_bool(matched))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AclRequest;

    fn check(rule: &HeadersRule, request: &AclRequest) -> bool {
        rule.check(&BlockContext::new(request, "b")).unwrap().is_match()
    }

    #[test]
    fn test_all_headers_required() {
        let rule = HeadersRule::new(HeadersMode::And, ["X-Tenant:acme", "x-env:prod*"]).unwrap();

        let both = AclRequest::new("a")
            .with_header("x-tenant", "acme")
            .with_header("X-Env", "production");
        let one = AclRequest::new("a").with_header("x-tenant", "acme");

        assert!(check(&rule, &both));
        assert!(!check(&rule, &one));
    }

    #[test]
    fn test_any_header_suffices() {
        let rule = HeadersRule::new(HeadersMode::Or, ["x-a:1", "x-b:2"]).unwrap();

        assert!(check(&rule, &AclRequest::new("a").with_header("x-b", "2")));
        assert!(!check(&rule, &AclRequest::new("a").with_header("x-b", "3")));
        assert_eq!(rule.key(), "headers_or");
    }

    #[test]
    fn test_values_are_case_sensitive() {
        let rule = HeadersRule::new(HeadersMode::And, ["x-tenant:Acme"]).unwrap();
        assert!(!check(&rule, &AclRequest::new("a").with_header("x-tenant", "acme")));
    }

    #[test]
    fn test_variable_values() {
        let rule = HeadersRule::new(HeadersMode::And, ["x-owner:@{x-caller}"]).unwrap();

        let same = AclRequest::new("a")
            .with_header("x-owner", "bob")
            .with_header("x-caller", "bob");
        let missing = AclRequest::new("a").with_header("x-owner", "bob");

        assert!(check(&rule, &same));
        assert!(!check(&rule, &missing));
    }

    #[test]
    fn test_invalid_settings() {
        assert!(HeadersRule::new(HeadersMode::And, ["no-colon"]).is_err());
        assert!(HeadersRule::new(HeadersMode::And, [":value"]).is_err());
        assert!(HeadersRule::new(HeadersMode::And, ["x-a:1", "X-A:2"]).is_err());
        assert!(HeadersRule::new(HeadersMode::Or, ["x-a:1", "X-A:2"]).is_ok());
        assert!(HeadersRule::new(HeadersMode::Or, Vec::<String>::new()).is_err());
    }
}
