use async_trait::async_trait;
use companion_core::entitlements::IdentityProvider;
use std::collections::HashSet;

use crate::config::Config;

/// Identity taken from the process environment. Stands in for a hosted
/// auth and billing provider when running from the command line.
#[derive(Debug, Clone, Default)]
pub struct EnvIdentity {
    user_id: Option<String>,
    plans: HashSet<String>,
    features: HashSet<String>,
}

impl EnvIdentity {
    pub fn new(user_id: Option<String>, plans: Vec<String>, features: Vec<String>) -> Self {
        Self {
            user_id,
            plans: plans.into_iter().collect(),
            features: features.into_iter().collect(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.user_id.clone(),
            config.plans.clone(),
            config.features.clone(),
        )
    }
}

#[async_trait]
impl IdentityProvider for EnvIdentity {
    async fn current_user_id(&self) -> Option<String> {
        self.user_id.clone()
    }

    // Entitlements only apply to a signed-in user.
    async fn has_plan(&self, plan: String) -> bool {
        self.user_id.is_some() && self.plans.contains(&plan)
    }

    async fn has_feature(&self, feature: String) -> bool {
        self.user_id.is_some() && self.features.contains(&feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_core::entitlements::{Allowance, QuotaPolicy};

    #[tokio::test]
    async fn test_signed_in_user_entitlements() {
        let identity = EnvIdentity::new(
            Some("user_1".to_string()),
            vec![],
            vec!["10_companion_limit".to_string()],
        );
        assert_eq!(identity.current_user_id().await.as_deref(), Some("user_1"));
        assert!(!identity.has_plan("pro".to_string()).await);
        assert!(identity.has_feature("10_companion_limit".to_string()).await);
        assert_eq!(
            QuotaPolicy::default().allowance(&identity).await,
            Allowance::Capped(10)
        );
    }

    #[tokio::test]
    async fn test_anonymous_caller_has_no_entitlements() {
        let identity = EnvIdentity::new(None, vec!["pro".to_string()], vec![]);
        assert!(identity.current_user_id().await.is_none());
        assert!(!identity.has_plan("pro".to_string()).await);
        assert_eq!(
            QuotaPolicy::default().allowance(&identity).await,
            Allowance::Capped(0)
        );
    }
}
