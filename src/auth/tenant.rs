//! Tenant configuration resolution
//!
//! Maps a user's email address to the OAuth client credentials of the
//! organization it belongs to. Rules are evaluated in order and matched
//! case-sensitively against the literal address. A tenant whose client id
//! is unset degrades to the default tenant instead of failing.

use crate::config::google::PERSONAL_TENANT;

/// OAuth client credentials of one tenant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl TenantConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Whether a client id has been provided
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty()
    }
}

/// How a rule matches an email address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainPattern {
    /// Address ends with the pattern (e.g. `@gmail.com`)
    Suffix(String),
    /// Address contains the pattern anywhere
    Contains(String),
}

impl DomainPattern {
    fn matches(&self, email: &str) -> bool {
        match self {
            DomainPattern::Suffix(suffix) => email.ends_with(suffix.as_str()),
            DomainPattern::Contains(needle) => !needle.is_empty() && email.contains(needle.as_str()),
        }
    }
}

/// A named tenant and the addresses it owns
#[derive(Debug, Clone)]
pub struct TenantRule {
    pub name: String,
    pub pattern: DomainPattern,
    pub config: TenantConfig,
}

impl TenantRule {
    pub fn suffix(name: &str, suffix: &str, config: TenantConfig) -> Self {
        Self {
            name: name.to_string(),
            pattern: DomainPattern::Suffix(suffix.to_string()),
            config,
        }
    }

    pub fn contains(name: &str, needle: &str, config: TenantConfig) -> Self {
        Self {
            name: name.to_string(),
            pattern: DomainPattern::Contains(needle.to_string()),
            config,
        }
    }
}

/// Outcome of resolving an email address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantResolution<'a> {
    /// Tenant whose credentials are returned
    pub tenant: &'a str,
    pub config: &'a TenantConfig,
    /// Tenant that matched but had no credentials, if the default was substituted
    pub fallback_from: Option<&'a str>,
}

/// Ordered domain-to-tenant resolver
#[derive(Debug, Clone)]
pub struct TenantResolver {
    default: TenantConfig,
    rules: Vec<TenantRule>,
}

impl TenantResolver {
    pub fn new(default: TenantConfig, rules: Vec<TenantRule>) -> Self {
        Self { default, rules }
    }

    /// Credentials for `email`, falling back to the default tenant
    pub fn resolve(&self, email: &str) -> &TenantConfig {
        self.resolve_detailed(email).config
    }

    /// Like [`resolve`](Self::resolve), but reports which tenant was chosen and why.
    pub fn resolve_detailed(&self, email: &str) -> TenantResolution<'_> {
        let matched = self.rules.iter().find(|rule| rule.pattern.matches(email));

        match matched {
            Some(rule) if rule.config.is_configured() => TenantResolution {
                tenant: &rule.name,
                config: &rule.config,
                fallback_from: None,
            },
            Some(rule) if rule.name == PERSONAL_TENANT => TenantResolution {
                tenant: PERSONAL_TENANT,
                config: &self.default,
                fallback_from: None,
            },
            Some(rule) => {
                tracing::warn!(
                    "Tenant '{}' config not set for {}, using default config",
                    rule.name,
                    email
                );
                TenantResolution {
                    tenant: PERSONAL_TENANT,
                    config: &self.default,
                    fallback_from: Some(&rule.name),
                }
            }
            None => TenantResolution {
                tenant: PERSONAL_TENANT,
                config: &self.default,
                fallback_from: None,
            },
        }
    }

    /// Credentials used before the user's email is known
    pub fn resolve_default(&self) -> &TenantConfig {
        tracing::debug!(
            "Using default config: clientId {}, clientSecret {}",
            presence(&self.default.client_id),
            presence(&self.default.client_secret)
        );
        &self.default
    }
}

fn presence(value: &str) -> &'static str {
    if value.is_empty() {
        "Not Set"
    } else {
        "Set"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(company_a: TenantConfig) -> TenantResolver {
        let personal = TenantConfig::new("personal-id", "personal-secret");
        TenantResolver::new(
            personal.clone(),
            vec![
                TenantRule::suffix(PERSONAL_TENANT, "@gmail.com", personal),
                TenantRule::contains("companyA", "tenantA.example", company_a),
                TenantRule::contains("companyB", "tenantB.example", TenantConfig::new("b-id", "b-secret")),
            ],
        )
    }

    #[test]
    fn test_gmail_address_resolves_to_personal() {
        let resolver = resolver(TenantConfig::new("a-id", "a-secret"));
        let resolution = resolver.resolve_detailed("user@gmail.com");
        assert_eq!(resolution.tenant, PERSONAL_TENANT);
        assert_eq!(resolution.config.client_id, "personal-id");
        assert_eq!(resolution.fallback_from, None);
    }

    #[test]
    fn test_configured_tenant_is_selected() {
        let resolver = resolver(TenantConfig::new("a-id", "a-secret"));
        assert_eq!(resolver.resolve("user@tenantA.example").client_id, "a-id");
        assert_eq!(resolver.resolve("ops@mail.tenantB.example").client_id, "b-id");
    }

    #[test]
    fn test_unconfigured_tenant_falls_back_with_diagnostic() {
        let resolver = resolver(TenantConfig::default());
        let resolution = resolver.resolve_detailed("user@tenantA.example");
        assert_eq!(resolution.config.client_id, "personal-id");
        assert_eq!(resolution.tenant, PERSONAL_TENANT);
        assert_eq!(resolution.fallback_from, Some("companyA"));
    }

    #[test]
    fn test_unknown_domain_uses_default() {
        let resolver = resolver(TenantConfig::new("a-id", "a-secret"));
        let resolution = resolver.resolve_detailed("someone@example.org");
        assert_eq!(resolution.config.client_id, "personal-id");
        assert_eq!(resolution.fallback_from, None);
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let resolver = resolver(TenantConfig::new("a-id", "a-secret"));
        assert_eq!(resolver.resolve("user@TENANTA.EXAMPLE").client_id, "personal-id");
        assert_eq!(resolver.resolve("user@tenantA.example").client_id, "a-id");
    }

    #[test]
    fn test_rules_are_evaluated_in_order() {
        let resolver = resolver(TenantConfig::new("a-id", "a-secret"));
        // Both tenant substrings present: the earlier rule wins.
        assert_eq!(
            resolver.resolve("tenantB.example@tenantA.example").client_id,
            "a-id"
        );
    }

    #[test]
    fn test_resolve_default() {
        let resolver = resolver(TenantConfig::new("a-id", "a-secret"));
        assert_eq!(resolver.resolve_default().client_id, "personal-id");
    }
}
