// src/cluster/platform.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::specs::{INGRESS, OPA};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[serde(alias = "aws")]
    Ec2,
    Eks,
    Aks,
    Azure,
    Openstack,
    Vsphere,
    Vra,
    Raw,
    Stacki,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ec2 => "ec2",
            Platform::Eks => "eks",
            Platform::Aks => "aks",
            Platform::Azure => "azure",
            Platform::Openstack => "openstack",
            Platform::Vsphere => "vsphere",
            Platform::Vra => "vra",
            Platform::Raw => "raw",
            Platform::Stacki => "stacki",
        }
    }

    /// EKS and AKS run their own control-plane PKI.
    pub fn manages_control_plane_pki(&self) -> bool {
        matches!(self, Platform::Eks | Platform::Aks)
    }

    /// Whether the leaf certificate `name` is issued on this platform.
    pub fn includes_leaf(&self, name: &str) -> bool {
        match self {
            Platform::Aks => name == INGRESS,
            Platform::Eks => name == INGRESS || name == OPA,
            _ => true,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ec2" | "aws" => Ok(Platform::Ec2),
            "eks" => Ok(Platform::Eks),
            "aks" => Ok(Platform::Aks),
            "azure" => Ok(Platform::Azure),
            "openstack" => Ok(Platform::Openstack),
            "vsphere" => Ok(Platform::Vsphere),
            "vra" => Ok(Platform::Vra),
            "raw" => Ok(Platform::Raw),
            "stacki" => Ok(Platform::Stacki),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}
