//! # Principal
//!
//! Authenticated caller identity handed to the core by the outer layer.
//! Token validation and claim extraction happen before this point; the core
//! only checks roles and tenant scopes.

use std::fmt;

/// Scope prefix granting access to one tenant, e.g. `tenant_1234`.
pub const TENANT_SCOPE_PREFIX: &str = "tenant_";

/// Roles recognised by the batch lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Sends data and owns the batches it creates
    DataIntegrator,
    /// Internal processing (validation, pipelines)
    Internal,
    /// Read-only downstream consumer
    Consumer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataIntegrator => "data_integrator",
            Self::Internal => "internal",
            Self::Consumer => "consumer",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "data_integrator" => Some(Self::DataIntegrator),
            "internal" => Some(Self::Internal),
            "consumer" => Some(Self::Consumer),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller identity: subject plus claimed roles and scopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Subject claim; compared against `Batch::integrator_id` for ownership
    pub subject: String,
    pub roles: Vec<Role>,
    /// Raw scopes; tenant access is `tenant_<id>`
    pub scopes: Vec<String>,
}

impl Principal {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            roles: Vec::new(),
            scopes: Vec::new(),
        }
    }

    /// Build from raw claim strings; unknown role names are dropped.
    pub fn from_claims(subject: impl Into<String>, claims: &[String]) -> Self {
        let mut principal = Self::new(subject);
        for claim in claims {
            match Role::from_str_opt(claim) {
                Some(role) => principal.roles.push(role),
                None => principal.scopes.push(claim.clone()),
            }
        }
        principal
    }

    pub fn with_role(mut self, role: Role) -> Self {
        if !self.roles.contains(&role) {
            self.roles.push(role);
        }
        self
    }

    pub fn with_tenant(mut self, tenant_id: &str) -> Self {
        self.scopes.push(format!("{TENANT_SCOPE_PREFIX}{tenant_id}"));
        self
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_tenant(&self, tenant_id: &str) -> bool {
        self.scopes.iter().any(|scope| {
            scope
                .strip_prefix(TENANT_SCOPE_PREFIX)
                .is_some_and(|id| id == tenant_id)
        })
    }
}
