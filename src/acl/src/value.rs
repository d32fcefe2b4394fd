//! Configuration values that may reference per-request variables
//!
//! A raw setting containing `@` is kept as a template and resolved for each
//! request; anything else is parsed once when the rule is built.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::types::{AclRequest, LoggedUser};

/// Marker that turns a raw setting into a variable
pub const VARIABLE_MARKER: char = '@';

const PLACEHOLDER_OPEN: &str = "@{";
const PLACEHOLDER_CLOSE: char = '}';

/// A variable resolved to a string the value's parser rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot use '{resolved}' resolved from '{template}': {reason}")]
pub struct ResolvingError {
    /// String produced by substitution
    pub resolved: String,
    /// Template as configured
    pub template: String,
    /// Parser message
    pub reason: String,
}

/// Substitutes variables in a template against request-scoped context
pub trait VariableResolver {
    /// Resolve `template`, or `None` if it does not apply to this request
    fn resolve_variable(&self, template: &str) -> Option<String>;
}

impl<F> VariableResolver for F
where
    F: Fn(&str) -> Option<String>,
{
    fn resolve_variable(&self, template: &str) -> Option<String> {
        self(template)
    }
}

type Parser<T> = Arc<dyn Fn(&str) -> std::result::Result<T, String> + Send + Sync>;

/// A constant or a template resolved per request
#[derive(Clone)]
pub enum Value<T> {
    Const(T),
    Variable { template: String, parser: Parser<T> },
}

impl<T: Clone> Value<T> {
    /// Build a value from a raw setting
    ///
    /// Constants are parsed eagerly, so a malformed constant is reported
    /// here rather than on the first request.
    pub fn from_string<F>(raw: impl Into<String>, parser: F) -> std::result::Result<Self, ResolvingError>
    where
        F: Fn(&str) -> std::result::Result<T, String> + Send + Sync + 'static,
    {
        let raw = raw.into();
        if raw.contains(VARIABLE_MARKER) {
            return Ok(Value::Variable {
                template: raw,
                parser: Arc::new(parser),
            });
        }

        match parser(&raw) {
            Ok(value) => Ok(Value::Const(value)),
            Err(reason) => Err(ResolvingError {
                resolved: raw.clone(),
                template: raw,
                reason,
            }),
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Value::Variable { .. })
    }

    /// Value for the current request
    ///
    /// `Ok(None)` means the variable does not apply; `Err` means it applied
    /// but produced something the parser rejects.
    pub fn resolve(&self, resolver: &dyn VariableResolver) -> std::result::Result<Option<T>, ResolvingError> {
        match self {
            Value::Const(value) => Ok(Some(value.clone())),
            Value::Variable { template, parser } => {
                let Some(resolved) = resolver.resolve_variable(template) else {
                    return Ok(None);
                };
                parser(&resolved).map(Some).map_err(|reason| ResolvingError {
                    resolved,
                    template: template.clone(),
                    reason,
                })
            }
        }
    }
}

impl Value<String> {
    /// String value that is never rejected
    pub fn text(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.contains(VARIABLE_MARKER) {
            Value::Variable {
                template: raw,
                parser: Arc::new(|s: &str| Ok(s.to_string())),
            }
        } else {
            Value::Const(raw)
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Const(value) => f.debug_tuple("Const").field(value).finish(),
            Value::Variable { template, .. } => f.debug_tuple("Variable").field(template).finish(),
        }
    }
}

/// Resolve every value, dropping ones that do not apply
pub fn resolve_all<'a, T, I>(
    values: I,
    resolver: &dyn VariableResolver,
) -> std::result::Result<Vec<T>, ResolvingError>
where
    T: Clone + 'a,
    I: IntoIterator<Item = &'a Value<T>>,
{
    let mut resolved = Vec::new();
    for value in values {
        if let Some(v) = value.resolve(resolver)? {
            resolved.push(v);
        }
    }
    Ok(resolved)
}

/// Resolver substituting `@{user}` and `@{<header name>}` placeholders
///
/// `@{user}` is replaced first with the logged user's id; the remaining
/// placeholders are looked up among the request headers. A template with a
/// placeholder left unresolved yields `None`.
pub struct RequestVariables<'a> {
    request: &'a AclRequest,
    user: Option<&'a LoggedUser>,
}

impl<'a> RequestVariables<'a> {
    pub fn new(request: &'a AclRequest, user: Option<&'a LoggedUser>) -> Self {
        Self { request, user }
    }

    fn lookup(&self, name: &str) -> Option<&'a str> {
        if name == "user" {
            if let Some(user) = self.user {
                return Some(user.id.as_str());
            }
        }
        self.request.header(name)
    }
}

impl VariableResolver for RequestVariables<'_> {
    fn resolve_variable(&self, template: &str) -> Option<String> {
        if !template.contains(PLACEHOLDER_OPEN) {
            return Some(template.to_string());
        }

        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find(PLACEHOLDER_OPEN) {
            out.push_str(&rest[..start]);
            let after = &rest[start + PLACEHOLDER_OPEN.len()..];
            let Some(end) = after.find(PLACEHOLDER_CLOSE) else {
                debug!("Unterminated placeholder in '{}'", template);
                return None;
            };
            let name = &after[..end];
            match self.lookup(name) {
                Some(replacement) => out.push_str(replacement),
                None => {
                    debug!("Unable to resolve '{}' in '{}'", name, template);
                    return None;
                }
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);

        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Dept {
        Eng,
    }

    fn parse_dept(raw: &str) -> std::result::Result<Dept, String> {
        match raw {
            "eng" => Ok(Dept::Eng),
            other => Err(format!("unknown department '{}'", other)),
        }
    }

    #[test]
    fn test_const_is_parsed_eagerly() {
        let value = Value::from_string("eng", parse_dept).unwrap();
        assert!(!value.is_variable());

        let resolver = |_: &str| -> Option<String> { None };
        assert_eq!(value.resolve(&resolver).unwrap(), Some(Dept::Eng));

        let err = Value::from_string("sales", parse_dept).unwrap_err();
        assert_eq!(err.resolved, "sales");
    }

    #[test]
    fn test_variable_resolves_through_resolver() {
        let value = Value::from_string("@user.dept", parse_dept).unwrap();
        assert!(value.is_variable());

        let resolver = |t: &str| (t == "@user.dept").then(|| "eng".to_string());
        assert_eq!(value.resolve(&resolver).unwrap(), Some(Dept::Eng));
    }

    #[test]
    fn test_variable_rejected_by_parser() {
        let value = Value::from_string("@user.dept", parse_dept).unwrap();
        let resolver = |_: &str| Some("???".to_string());

        let err = value.resolve(&resolver).unwrap_err();
        assert_eq!(err.resolved, "???");
        assert_eq!(err.template, "@user.dept");
        assert!(err.to_string().contains("???"));
        assert!(err.to_string().contains("@user.dept"));
    }

    #[test]
    fn test_unresolved_variable_is_empty_not_error() {
        let value = Value::from_string("@user.dept", parse_dept).unwrap();
        let resolver = |_: &str| -> Option<String> { None };

        assert_eq!(value.resolve(&resolver).unwrap(), None);
    }

    #[test]
    fn test_request_variables_user_and_headers() {
        let request = AclRequest::new("indices:data/read/search").with_header("X-Tenant", "acme");
        let user = LoggedUser::new("alice");
        let resolver = RequestVariables::new(&request, Some(&user));

        assert_eq!(
            resolver.resolve_variable("logs-@{user}-@{x-tenant}"),
            Some("logs-alice-acme".to_string())
        );
        assert_eq!(resolver.resolve_variable("plain"), Some("plain".to_string()));
        assert_eq!(
            resolver.resolve_variable("alice@example.com"),
            Some("alice@example.com".to_string())
        );
    }

    #[test]
    fn test_request_variables_missing_placeholder() {
        let request = AclRequest::new("indices:data/read/search");
        let resolver = RequestVariables::new(&request, None);

        assert_eq!(resolver.resolve_variable("logs-@{user}"), None);
        assert_eq!(resolver.resolve_variable("logs-@{user"), None);
    }

    #[test]
    fn test_resolve_all_skips_inapplicable() {
        let request = AclRequest::new("indices:data/read/search");
        let resolver = RequestVariables::new(&request, None);
        let values = vec![Value::text("static"), Value::text("@{user}")];

        assert_eq!(resolve_all(&values, &resolver).unwrap(), vec!["static".to_string()]);
    }
}
