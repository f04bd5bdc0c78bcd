//! Logical services and their backend base URLs.
//!
//! # Responsibilities
//! - Name the downstream dependencies the gateway fronts
//! - Resolve a logical service to its configured base URL
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Exactly one base URL per service; no pooling or failover
//! - Trailing slashes stripped once, so `base + path` never doubles them

use std::fmt;

use crate::config::ServicesConfig;

/// A named downstream dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalService {
    Claims,
    Policy,
    Investment,
    Chaos,
}

impl LogicalService {
    pub const ALL: [LogicalService; 4] = [
        LogicalService::Claims,
        LogicalService::Policy,
        LogicalService::Investment,
        LogicalService::Chaos,
    ];

    /// Config key and `peer.service` span attribute.
    pub fn name(&self) -> &'static str {
        match self {
            LogicalService::Claims => "claims",
            LogicalService::Policy => "policy",
            LogicalService::Investment => "investment",
            LogicalService::Chaos => "chaos",
        }
    }

    /// Human-facing name used in error responses.
    pub fn display_name(&self) -> &'static str {
        match self {
            LogicalService::Claims => "Claims",
            LogicalService::Policy => "Policy",
            LogicalService::Investment => "Investment",
            LogicalService::Chaos => "Chaos Controller",
        }
    }

    /// Environment variable overriding this service's base URL.
    pub fn env_key(&self) -> String {
        format!("GATEWAY_{}_URL", self.name().to_uppercase())
    }

    pub(crate) fn base_url_in<'a>(&self, services: &'a ServicesConfig) -> &'a str {
        match self {
            LogicalService::Claims => &services.claims,
            LogicalService::Policy => &services.policy,
            LogicalService::Investment => &services.investment,
            LogicalService::Chaos => &services.chaos,
        }
    }

    pub(crate) fn base_url_in_mut<'a>(&self, services: &'a mut ServicesConfig) -> &'a mut String {
        match self {
            LogicalService::Claims => &mut services.claims,
            LogicalService::Policy => &mut services.policy,
            LogicalService::Investment => &mut services.investment,
            LogicalService::Chaos => &mut services.chaos,
        }
    }
}

impl fmt::Display for LogicalService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Static `logical service → base URL` table.
#[derive(Debug, Clone)]
pub struct ServiceRoutes {
    claims: String,
    policy: String,
    investment: String,
    chaos: String,
}

impl ServiceRoutes {
    pub fn from_config(services: &ServicesConfig) -> Self {
        let normalize = |url: &str| url.trim_end_matches('/').to_string();
        Self {
            claims: normalize(&services.claims),
            policy: normalize(&services.policy),
            investment: normalize(&services.investment),
            chaos: normalize(&services.chaos),
        }
    }

    /// Base URL for `service`, without a trailing slash.
    pub fn base_url(&self, service: LogicalService) -> &str {
        match service {
            LogicalService::Claims => &self.claims,
            LogicalService::Policy => &self.policy,
            LogicalService::Investment => &self.investment,
            LogicalService::Chaos => &self.chaos,
        }
    }
}
