// src/cluster/specs.rs
use crate::cert::ExtKeyUsage;
use serde::{Deserialize, Serialize};

pub const ROOT_CA: &str = "root_ca";
pub const ETCD_ROOT_CA: &str = "etcd_root_ca";
pub const FRONT_PROXY_ROOT_CA: &str = "front_proxy_root_ca";
pub const INGRESS_ROOT_CA: &str = "ingress_root_ca";

pub const INGRESS: &str = "ingress";
pub const OPA: &str = "opa";

/// A certificate authority slot of the cluster PKI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaSpec {
    pub name: String,
    pub common_name: String,
    /// The generic CA is materialized first and is the fallback source for
    /// every other slot.
    #[serde(default)]
    pub generic: bool,
}

/// A leaf certificate issued by one of the CAs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafSpec {
    pub name: String,
    /// May contain `{{ hostname }}`, which makes the certificate per node.
    pub common_name: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub dns_names: Vec<String>,
    #[serde(default)]
    pub ip_addresses: Vec<String>,
    pub ca: String,
    #[serde(default)]
    pub ext_key_usage: Vec<ExtKeyUsage>,
}

fn ca(name: &str, common_name: &str, generic: bool) -> CaSpec {
    CaSpec {
        name: name.to_string(),
        common_name: common_name.to_string(),
        generic,
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

struct Leaf<'a> {
    name: &'a str,
    common_name: &'a str,
    organization: &'a str,
    dns: &'a [&'a str],
    ips: &'a [&'a str],
    ca: &'a str,
    usage: &'a [ExtKeyUsage],
}

impl From<Leaf<'_>> for LeafSpec {
    fn from(leaf: Leaf<'_>) -> Self {
        LeafSpec {
            name: leaf.name.to_string(),
            common_name: leaf.common_name.to_string(),
            organization: leaf.organization.to_string(),
            dns_names: strings(leaf.dns),
            ip_addresses: strings(leaf.ips),
            ca: leaf.ca.to_string(),
            ext_key_usage: leaf.usage.to_vec(),
        }
    }
}

pub fn default_ca_specs() -> Vec<CaSpec> {
    vec![
        ca(ROOT_CA, "kubernetes-ca", true),
        ca(ETCD_ROOT_CA, "etcd-ca", false),
        ca(FRONT_PROXY_ROOT_CA, "front-proxy-ca", false),
        ca(INGRESS_ROOT_CA, "ingress-ca", false),
    ]
}

pub fn default_leaf_specs() -> Vec<LeafSpec> {
    use ExtKeyUsage::{ClientAuth, ServerAuth};

    let apiserver_dns = [
        "kubernetes",
        "kubernetes.default",
        "kubernetes.default.svc",
        "kubernetes.default.svc.cluster.local",
        "{{ masters }}",
        "{{ ALB }}",
    ];

    vec![
        Leaf {
            name: "kube_apiserver",
            common_name: "kube-apiserver",
            organization: "",
            dns: &apiserver_dns,
            ips: &["{{ masters }}", "{{ VIP }}"],
            ca: ROOT_CA,
            usage: &[ServerAuth],
        }
        .into(),
        Leaf {
            name: "kubelet",
            common_name: "system:node:{{ hostname }}",
            organization: "system:nodes",
            dns: &["{{ hostname }}"],
            ips: &["{{ hostname }}"],
            ca: ROOT_CA,
            usage: &[ServerAuth, ClientAuth],
        }
        .into(),
        Leaf {
            name: "admin",
            common_name: "admin",
            organization: "system:masters",
            dns: &[],
            ips: &[],
            ca: ROOT_CA,
            usage: &[ClientAuth],
        }
        .into(),
        Leaf {
            name: "apiserver_kubelet_client",
            common_name: "kube-apiserver-kubelet-client",
            organization: "system:masters",
            dns: &[],
            ips: &[],
            ca: ROOT_CA,
            usage: &[ClientAuth],
        }
        .into(),
        Leaf {
            name: "kube_controller_manager",
            common_name: "system:kube-controller-manager",
            organization: "",
            dns: &[],
            ips: &[],
            ca: ROOT_CA,
            usage: &[ClientAuth],
        }
        .into(),
        Leaf {
            name: "kube_scheduler",
            common_name: "system:kube-scheduler",
            organization: "",
            dns: &[],
            ips: &[],
            ca: ROOT_CA,
            usage: &[ClientAuth],
        }
        .into(),
        Leaf {
            name: "kube_proxy",
            common_name: "system:kube-proxy",
            organization: "system:node-proxier",
            dns: &[],
            ips: &[],
            ca: ROOT_CA,
            usage: &[ClientAuth],
        }
        .into(),
        Leaf {
            name: "etcd_node",
            common_name: "etcd:{{ hostname }}",
            organization: "",
            dns: &["{{ masters }}", "{{ hostname }}"],
            ips: &["{{ masters }}", "{{ hostname }}"],
            ca: ETCD_ROOT_CA,
            usage: &[ServerAuth, ClientAuth],
        }
        .into(),
        Leaf {
            name: "apiserver_etcd_client",
            common_name: "kube-apiserver-etcd-client",
            organization: "system:masters",
            dns: &[],
            ips: &[],
            ca: ETCD_ROOT_CA,
            usage: &[ClientAuth],
        }
        .into(),
        Leaf {
            name: "front_proxy_client",
            common_name: "front-proxy-client",
            organization: "",
            dns: &[],
            ips: &[],
            ca: FRONT_PROXY_ROOT_CA,
            usage: &[ClientAuth],
        }
        .into(),
        Leaf {
            name: INGRESS,
            common_name: "ingress",
            organization: "",
            dns: &["{{ ALB }}", "{{ workers }}"],
            ips: &["{{ VIP }}", "{{ workers }}"],
            ca: INGRESS_ROOT_CA,
            usage: &[ServerAuth],
        }
        .into(),
        Leaf {
            name: OPA,
            common_name: "opa",
            organization: "",
            dns: &["opa", "opa.kube-system", "opa.kube-system.svc"],
            ips: &[],
            ca: INGRESS_ROOT_CA,
            usage: &[ServerAuth],
        }
        .into(),
    ]
}
