// src/cluster/topology.rs
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    pub private_ip: String,
    pub public_ip: String,
    pub private_dns: String,
    pub public_dns: String,
    pub role: String,
}

impl Node {
    /// Private DNS name, else the public one, without leading or trailing dots.
    pub fn fqdn(&self) -> Option<&str> {
        [&self.private_dns, &self.public_dns]
            .into_iter()
            .map(|dns| dns.trim().trim_matches('.'))
            .find(|dns| !dns.is_empty())
    }

    /// First label of [`Node::fqdn`], else `node-<index>`. Not unique across
    /// a topology; see [`Topology::hostnames`].
    pub fn hostname(&self, index: usize) -> String {
        self.fqdn()
            .and_then(|dns| dns.split('.').find(|label| !label.is_empty()))
            .map(str::to_string)
            .unwrap_or_else(|| format!("node-{}", index))
    }

    pub fn ips(&self) -> Vec<String> {
        [&self.private_ip, &self.public_ip]
            .into_iter()
            .filter(|ip| !ip.is_empty())
            .cloned()
            .collect()
    }

    pub fn dns_names(&self) -> Vec<String> {
        [&self.private_dns, &self.public_dns]
            .into_iter()
            .filter(|dns| !dns.is_empty())
            .cloned()
            .collect()
    }

    pub fn has_address(&self) -> bool {
        !self.ips().is_empty() || !self.dns_names().is_empty()
    }

    /// `masters` matches nodes with role `master` or `masters`; `nodes` and
    /// `all` match every node.
    pub fn has_role(&self, role: &str) -> bool {
        let role = role.trim();
        if role.eq_ignore_ascii_case("nodes") || role.eq_ignore_ascii_case("all") {
            return true;
        }
        let own = self.role.trim();
        own.eq_ignore_ascii_case(role)
            || role
                .strip_suffix('s')
                .map(|singular| own.eq_ignore_ascii_case(singular))
                .unwrap_or(false)
    }
}

/// Where clients reach the cluster API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entrypoint {
    Vip(IpAddr),
    Alb(String),
    Unset,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub entrypoint: String,
    #[serde(default)]
    pub port: u16,
}

impl Topology {
    pub fn new(nodes: Vec<Node>, entrypoint: &str, port: u16) -> Self {
        Self {
            nodes,
            entrypoint: entrypoint.to_string(),
            port,
        }
    }

    pub fn entrypoint(&self) -> Entrypoint {
        let address = self.entrypoint.trim();
        if address.is_empty() {
            return Entrypoint::Unset;
        }
        match address.parse::<IpAddr>() {
            Ok(ip) => Entrypoint::Vip(ip),
            Err(_) => Entrypoint::Alb(address.to_string()),
        }
    }

    /// One directory-safe host name per node, index-aligned with `nodes`.
    /// Short names are kept while unique; nodes sharing one fall back to their
    /// full DNS name, and anything still taken gets a `-<index>` suffix.
    pub fn hostnames(&self) -> Vec<String> {
        let short: Vec<String> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| node.hostname(index))
            .collect();

        let mut seen = HashSet::new();
        self.nodes
            .iter()
            .zip(&short)
            .enumerate()
            .map(|(index, (node, name))| {
                let shared = short.iter().filter(|other| *other == name).count() > 1;
                let mut name = match node.fqdn() {
                    Some(fqdn) if shared => fqdn.to_string(),
                    _ => name.clone(),
                };
                while !seen.insert(name.clone()) {
                    name = format!("{}-{}", name, index);
                }
                name
            })
            .collect()
    }

    pub fn nodes_with_role<'a>(&'a self, role: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes.iter().filter(move |node| node.has_role(role))
    }

    pub fn ips_for_role(&self, role: &str) -> Vec<String> {
        self.nodes_with_role(role).flat_map(Node::ips).collect()
    }

    pub fn dns_for_role(&self, role: &str) -> Vec<String> {
        self.nodes_with_role(role).flat_map(Node::dns_names).collect()
    }
}
