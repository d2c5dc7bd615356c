//! BPF filter rule model and grammar codec.
//!
//! Grounded on `BpfUtils.py`: a `FilterRule` list composes by OR across
//! rules and AND within a rule, serialising to a libpcap filter expression
//! and parsing back via the same grammar.

use crate::error::AppError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    All,
}

impl Protocol {
    fn as_bpf(&self) -> Option<&'static str> {
        match self {
            Protocol::Tcp => Some("tcp"),
            Protocol::Udp => Some("udp"),
            Protocol::Icmp => Some("icmp"),
            Protocol::All => None,
        }
    }

    fn parse(s: &str) -> Option<Protocol> {
        match s {
            "tcp" => Some(Protocol::Tcp),
            "udp" => Some(Protocol::Udp),
            "icmp" => Some(Protocol::Icmp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    pub src_ip: Option<String>,
    pub dst_ip: Option<String>,
    #[serde(default)]
    pub src_port: Vec<u16>,
    #[serde(default)]
    pub dst_port: Vec<u16>,
    pub protocol: Option<Protocol>,
}

impl FilterRule {
    pub fn validate(&self) -> Result<(), AppError> {
        for host in [&self.src_ip, &self.dst_ip].into_iter().flatten() {
            if host.parse::<IpAddr>().is_err() && host.parse::<ipnet::IpNet>().is_err() {
                return Err(AppError::InvalidInput(format!("not an IP or CIDR: {host}")));
            }
        }
        for port in self.src_port.iter().chain(self.dst_port.iter()) {
            if *port == 0 {
                return Err(AppError::InvalidInput("port must be in [1, 65535]".into()));
            }
        }
        Ok(())
    }

    fn host_clause(host: &str) -> String {
        if host.contains('/') {
            format!("net {host}")
        } else {
            format!("host {host}")
        }
    }

    fn ports_clause(direction: &str, ports: &[u16]) -> Option<String> {
        if ports.is_empty() {
            return None;
        }
        let joined = ports
            .iter()
            .map(|p| format!("{direction} port {p}"))
            .collect::<Vec<_>>()
            .join(" or ");
        if ports.len() > 1 {
            Some(format!("({joined})"))
        } else {
            Some(joined)
        }
    }

    /// Renders this rule as a single parenthesised BPF clause, or `None` if
    /// the rule has no constraints at all.
    fn to_bpf_clause(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(ip) = &self.src_ip {
            parts.push(format!("src {}", Self::host_clause(ip)));
        }
        if let Some(ip) = &self.dst_ip {
            parts.push(format!("dst {}", Self::host_clause(ip)));
        }
        if let Some(clause) = Self::ports_clause("src", &self.src_port) {
            parts.push(clause);
        }
        if let Some(clause) = Self::ports_clause("dst", &self.dst_port) {
            parts.push(clause);
        }
        if let Some(proto) = self.protocol.and_then(|p| p.as_bpf()) {
            parts.push(proto.to_string());
        }
        if parts.is_empty() {
            None
        } else {
            Some(format!("({})", parts.join(" and ")))
        }
    }
}

/// Builds the full libpcap filter expression for a set of rules, joined by
/// ` or `. Returns `None` for an empty or entirely-unconstrained rule set
/// (capture with no filter).
pub fn build_filter_expression(rules: &[FilterRule]) -> Option<String> {
    let clauses: Vec<String> = rules.iter().filter_map(FilterRule::to_bpf_clause).collect();
    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" or "))
    }
}

fn host_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(src|dst)\s+(host|net)\s+(\S+)$").unwrap())
}

fn port_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(src|dst)\s+port\s+(\d+)$").unwrap())
}

/// Strict inverse of [`build_filter_expression`]'s per-rule grammar: parses
/// one parenthesised clause back into a `FilterRule`. Anything outside the
/// grammar is rejected rather than partially accepted.
fn parse_clause(clause: &str) -> Result<FilterRule, AppError> {
    let inner = clause
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| AppError::InvalidInput(format!("clause not parenthesised: {clause}")))?;

    let mut rule = FilterRule::default();
    for term in split_top_level_and(inner) {
        let term = term.trim();
        if let Some(caps) = host_regex().captures(term) {
            let direction = &caps[1];
            let value = caps[3].to_string();
            if direction == "src" {
                rule.src_ip = Some(value);
            } else {
                rule.dst_ip = Some(value);
            }
        } else if let Some(without_parens) = term.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
            let ports = parse_port_disjunction(without_parens)?;
            apply_ports(&mut rule, ports)?;
        } else if port_regex().is_match(term) {
            let ports = parse_port_disjunction(term)?;
            apply_ports(&mut rule, ports)?;
        } else if let Some(proto) = Protocol::parse(term) {
            rule.protocol = Some(proto);
        } else {
            return Err(AppError::InvalidInput(format!("unrecognised clause term: {term}")));
        }
    }
    Ok(rule)
}

fn apply_ports(rule: &mut FilterRule, ports: (String, Vec<u16>)) -> Result<(), AppError> {
    let (direction, values) = ports;
    if direction == "src" {
        rule.src_port = values;
    } else {
        rule.dst_port = values;
    }
    Ok(())
}

fn parse_port_disjunction(s: &str) -> Result<(String, Vec<u16>), AppError> {
    let mut direction = None;
    let mut ports = Vec::new();
    for term in s.split(" or ") {
        let caps = port_regex()
            .captures(term.trim())
            .ok_or_else(|| AppError::InvalidInput(format!("malformed port term: {term}")))?;
        let dir = caps[1].to_string();
        if let Some(d) = &direction {
            if *d != dir {
                return Err(AppError::InvalidInput("mixed src/dst ports in one disjunction".into()));
            }
        } else {
            direction = Some(dir.clone());
        }
        let port: u16 = caps[2]
            .parse()
            .map_err(|_| AppError::InvalidInput(format!("bad port value: {}", &caps[2])))?;
        ports.push(port);
    }
    Ok((direction.unwrap(), ports))
}

/// Splits on top-level ` and ` only, respecting one level of parentheses
/// (needed for the `(src port A or src port B)` sub-groups).
fn split_top_level_and(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            ' ' if depth == 0 && current.ends_with("and") => {
                let trimmed = current.trim_end_matches("and").trim_end().to_string();
                parts.push(trimmed);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Parses a full ` or `-joined BPF expression back into its constituent
/// rules.
pub fn parse_filter_expression(expr: &str) -> Result<Vec<FilterRule>, AppError> {
    if expr.trim().is_empty() {
        return Ok(Vec::new());
    }
    split_top_level_or(expr).iter().map(|clause| parse_clause(clause)).collect()
}

fn split_top_level_or(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in s.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            ' ' if depth == 0 && current.ends_with("or") => {
                let trimmed = current.trim_end_matches("or").trim_end().to_string();
                parts.push(trimmed);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Validates that an expression round-trips through the grammar: building
/// the parsed rules back out must reproduce the same clause set.
pub fn validate_filter_expression(expr: &str) -> Result<(), AppError> {
    let rules = parse_filter_expression(expr)?;
    for rule in &rules {
        rule.validate()?;
    }
    Ok(())
}
