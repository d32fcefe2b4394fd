//! Restrict a block to some client addresses

use ipnet::IpNet;
use std::net::IpAddr;
use tracing::trace;

use super::{BlockContext, RuleClass, RuleOutcome, SyncRule};
use crate::error::{AclError, Result};
use crate::matcher::MatcherWithWildcards;
use crate::value::{resolve_all, Value};

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// A configured host entry
#[derive(Debug, Clone)]
enum HostPattern {
    Network(IpNet),
    Address(IpAddr),
    /// Hostname or address with wildcards
    Name(String),
}

impl HostPattern {
    fn parse(raw: &str) -> Self {
        if let Ok(net) = raw.parse::<IpNet>() {
            return HostPattern::Network(net);
        }
        if let Ok(addr) = raw.parse::<IpAddr>() {
            return HostPattern::Address(addr);
        }
        HostPattern::Name(raw.to_string())
    }

    fn matches(&self, address: &str) -> bool {
        match self {
            HostPattern::Network(net) => address.parse::<IpAddr>().is_ok_and(|ip| net.contains(&ip)),
            HostPattern::Address(expected) => address.parse::<IpAddr>().is_ok_and(|ip| ip == *expected),
            HostPattern::Name(pattern) => MatcherWithWildcards::new([pattern.as_str()]).matches(address),
        }
    }
}

/// Matches when the remote address is one of the configured hosts
///
/// Entries may be IP addresses, CIDR networks or wildcard host names. With
/// `accept_x_forwarded_for` the first address of an `X-Forwarded-For` header
/// is checked as well.
#[derive(Debug, Clone)]
pub struct HostsRule {
    hosts: Vec<Value<String>>,
    accept_x_forwarded_for: bool,
}

impl HostsRule {
    pub fn new<I, S>(hosts: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let hosts: Vec<Value<String>> = hosts.into_iter().map(Value::text).collect();
        if hosts.is_empty() {
            return Err(AclError::invalid_rule("hosts", "at least one host is required"));
        }
        Ok(Self {
            hosts,
            accept_x_forwarded_for: false,
        })
    }

    pub fn accepting_x_forwarded_for(mut self) -> Self {
        self.accept_x_forwarded_for = true;
        self
    }
}

impl SyncRule for HostsRule {
    fn key(&self) -> &str {
        "hosts"
    }

    fn class(&self) -> RuleClass {
        RuleClass::Inspection
    }

    fn check(&self, ctx: &BlockContext<'_>) -> Result<RuleOutcome> {
        let request = ctx.request();
        let mut addresses: Vec<&str> = request.remote_address.iter().map(String::as_str).collect();
        if self.accept_x_forwarded_for {
            if let Some(forwarded) = request.header(X_FORWARDED_FOR) {
                if let Some(first) = forwarded.split(',').next().map(str::trim).filter(|a| !a.is_empty()) {
                    addresses.push(first);
                }
            }
        }

        if addresses.is_empty() {
            trace!("[{}] request has no remote address", ctx.block());
            return Ok(RuleOutcome::NoMatch);
        }

        let patterns: Vec<HostPattern> = resolve_all(&self.hosts, &ctx.variables())?
            .iter()
            .map(|raw| HostPattern::parse(raw))
            .collect();

        let matched = addresses
            .iter()
            .any(|address| patterns.iter().any(|pattern| pattern.matches(address)));

        Ok(RuleOutcome::from_bool(matched))
    }
}
