use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

/// The identity and billing provider, as seen by the query layer.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, if any.
    async fn current_user_id(&self) -> Option<String>;

    async fn has_plan(&self, plan: String) -> bool;

    async fn has_feature(&self, feature: String) -> bool;
}

/// A feature that grants a fixed number of companions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureTier {
    pub feature: String,
    pub cap: usize,
}

impl FeatureTier {
    pub fn new(feature: &str, cap: usize) -> Self {
        Self {
            feature: feature.to_string(),
            cap,
        }
    }
}

/// How many companions a user may own.
///
/// Tiers are checked in order and the first feature the user holds wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub unlimited_plan: String,
    pub tiers: Vec<FeatureTier>,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            unlimited_plan: "pro".to_string(),
            tiers: vec![
                FeatureTier::new("3_companion_limit", 3),
                FeatureTier::new("10_companion_limit", 10),
            ],
        }
    }
}

/// The caller's companion allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allowance {
    Unlimited,
    Capped(usize),
}

impl Allowance {
    pub fn permits(&self, owned: usize) -> bool {
        match self {
            Allowance::Unlimited => true,
            Allowance::Capped(cap) => owned < *cap,
        }
    }
}

impl QuotaPolicy {
    /// Resolves the allowance for the current caller. No matching feature
    /// means a cap of zero.
    pub async fn allowance(&self, identity: &dyn IdentityProvider) -> Allowance {
        if identity.has_plan(self.unlimited_plan.clone()).await {
            return Allowance::Unlimited;
        }
        for tier in &self.tiers {
            if identity.has_feature(tier.feature.clone()).await {
                return Allowance::Capped(tier.cap);
            }
        }
        Allowance::Capped(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowance_permits() {
        assert!(Allowance::Unlimited.permits(1_000));
        assert!(Allowance::Capped(3).permits(2));
        assert!(!Allowance::Capped(3).permits(3));
        assert!(!Allowance::Capped(0).permits(0));
    }

    #[tokio::test]
    async fn test_unlimited_plan_short_circuits() {
        let mut identity = MockIdentityProvider::new();
        identity
            .expect_has_plan()
            .withf(|plan| plan == "pro")
            .returning(|_| true);
        identity.expect_has_feature().never();

        let allowance = QuotaPolicy::default().allowance(&identity).await;
        assert_eq!(allowance, Allowance::Unlimited);
    }

    #[tokio::test]
    async fn test_first_matching_feature_sets_cap() {
        let mut identity = MockIdentityProvider::new();
        identity.expect_has_plan().returning(|_| false);
        identity
            .expect_has_feature()
            .returning(|feature| feature == "10_companion_limit");

        let allowance = QuotaPolicy::default().allowance(&identity).await;
        assert_eq!(allowance, Allowance::Capped(10));
    }

    #[tokio::test]
    async fn test_no_feature_means_zero_cap() {
        let mut identity = MockIdentityProvider::new();
        identity.expect_has_plan().returning(|_| false);
        identity.expect_has_feature().returning(|_| false);

        let allowance = QuotaPolicy::default().allowance(&identity).await;
        assert_eq!(allowance, Allowance::Capped(0));
    }
}
