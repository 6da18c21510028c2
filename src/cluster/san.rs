// src/cluster/san.rs
use super::topology::{Entrypoint, Node, Topology};
use std::ops::Range;

const VIP: &str = "VIP";
const ALB: &str = "ALB";
const HOSTNAME: &str = "hostname";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanKind {
    Ip,
    Dns,
}

/// The node a per-node certificate is being issued for.
#[derive(Debug, Clone, Copy)]
pub struct NodeContext<'a> {
    pub hostname: &'a str,
    pub node: &'a Node,
}

/// Inner name of a `{{ name }}` token.
pub fn placeholder(token: &str) -> Option<&str> {
    token
        .trim()
        .strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
        .map(str::trim)
}

/// Byte ranges of the `{{ hostname }}` tokens embedded in `template`, with
/// any inner spacing.
fn hostname_spans(template: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut offset = 0;
    while let Some(found) = template[offset..].find("{{") {
        let start = offset + found;
        let Some(len) = template[start..].find("}}") else {
            break;
        };
        let end = start + len + "}}".len();
        if placeholder(&template[start..end]) == Some(HOSTNAME) {
            spans.push(start..end);
        }
        offset = end;
    }
    spans
}

pub fn has_hostname_placeholder(template: &str) -> bool {
    !hostname_spans(template).is_empty()
}

pub fn substitute_hostname(template: &str, hostname: &str) -> String {
    let mut result = String::with_capacity(template.len());
    let mut copied = 0;
    for span in hostname_spans(template) {
        result.push_str(&template[copied..span.start]);
        result.push_str(hostname);
        copied = span.end;
    }
    result.push_str(&template[copied..]);
    result
}

/// Resolves SAN template tokens against the topology.
///
/// The result always starts with `base`; each `{{ role }}` token appends the
/// addresses of that role, any other token is appended verbatim. Duplicates
/// are kept.
pub fn resolve(
    tokens: &[String],
    kind: SanKind,
    topology: &Topology,
    node: Option<NodeContext<'_>>,
    base: &[String],
) -> Vec<String> {
    let mut resolved = base.to_vec();

    for token in tokens {
        let Some(name) = placeholder(token) else {
            resolved.push(token.trim().to_string());
            continue;
        };

        match (name, kind) {
            (VIP, SanKind::Ip) => {
                if let Entrypoint::Vip(ip) = topology.entrypoint() {
                    resolved.push(ip.to_string());
                }
            }
            (ALB, SanKind::Dns) => {
                if let Entrypoint::Alb(dns) = topology.entrypoint() {
                    resolved.push(dns);
                }
            }
            (VIP, SanKind::Dns) | (ALB, SanKind::Ip) => {}
            (HOSTNAME, SanKind::Ip) => {
                if let Some(ctx) = node {
                    resolved.extend(ctx.node.ips());
                }
            }
            (HOSTNAME, SanKind::Dns) => {
                if let Some(ctx) = node {
                    resolved.push(ctx.hostname.to_string());
                    resolved.extend(ctx.node.dns_names());
                }
            }
            (role, SanKind::Ip) => resolved.extend(topology.ips_for_role(role)),
            (role, SanKind::Dns) => resolved.extend(topology.dns_for_role(role)),
        }
    }

    resolved
}
