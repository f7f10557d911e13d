use crate::entitlements::QuotaPolicy;
use std::time::Duration;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_UPDATE_CAPACITY: usize = 64;

/// Tuning for a single voice call.
#[derive(Debug, Clone)]
pub struct CallConfig {
    connect_timeout: Duration,
    update_capacity: usize,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            update_capacity: DEFAULT_UPDATE_CAPACITY,
        }
    }
}

impl CallConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_update_capacity(mut self, capacity: usize) -> Self {
        self.update_capacity = capacity.max(1);
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn update_capacity(&self) -> usize {
        self.update_capacity
    }
}

/// Settings shared by every store-backed operation.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    query_timeout: Duration,
    quota: QuotaPolicy,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            quota: QuotaPolicy::default(),
        }
    }
}

impl QueryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_quota(mut self, quota: QuotaPolicy) -> Self {
        self.quota = quota;
        self
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    pub fn quota(&self) -> &QuotaPolicy {
        &self.quota
    }
}
