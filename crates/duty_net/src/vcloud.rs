use std::time::Duration;

use serde::Deserialize;

use duty_core::error::AppError;

use crate::cache::ReportCache;

const API_TIMEOUT: Duration = Duration::from_secs(15);
const API_VERSION_ACCEPT: &str = "application/json;version=39.1";
const CONSUMERS_PAGE_SIZE: u32 = 25;

/// Blocking client for the vCloud Director tenant API.
///
/// Uses the JSON cloudapi surfaces only; the legacy XML endpoints have no
/// counterpart here.
#[derive(Debug, Clone)]
pub struct VcloudClient {
    base_url: String,
    tenant: String,
    refresh_token: String,
}

/// A storage policy to report on, as named in the tenant config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRef {
    pub name: String,
    pub urn: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CapacityPool {
    #[serde(default)]
    pub allocated: i64,
    #[serde(default)]
    pub used: i64,
}

impl CapacityPool {
    pub fn used_pct(&self) -> Option<f64> {
        if self.allocated <= 0 {
            return None;
        }
        Some(self.used as f64 * 100.0 / self.allocated as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePolicyUsage {
    pub policy_name: String,
    pub total_used_mb: i64,
}

/// Snapshot shown by the usage report command.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudUsageReport {
    pub cpu_mhz: CapacityPool,
    pub memory_mb: CapacityPool,
    pub storage: Vec<StoragePolicyUsage>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConsumersPage {
    #[serde(rename = "pageCount", default)]
    pub(crate) page_count: u32,
    #[serde(default)]
    pub(crate) values: Vec<ConsumerRecord>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConsumerRecord {
    #[serde(rename = "storageConsumedMb", default)]
    pub(crate) storage_consumed_mb: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VdcRecord {
    #[serde(rename = "computeCapacity")]
    pub(crate) compute_capacity: ComputeCapacity,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ComputeCapacity {
    pub(crate) cpu: CapacityPool,
    pub(crate) memory: CapacityPool,
}

impl VcloudClient {
    pub fn new(
        base_url: impl Into<String>,
        tenant: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tenant: tenant.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Exchange the long-lived refresh token for a short-lived bearer token.
    fn bearer_token(&self) -> Result<String, AppError> {
        let url = format!("{}/oauth/tenant/{}/token", self.base_url, self.tenant);
        let resp = ureq::post(&url)
            .set("Accept", "application/json")
            .timeout(API_TIMEOUT)
            .send_form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", &self.refresh_token),
            ])
            .map_err(|e| {
                AppError::wrap("VCD_UNREACHABLE", "Failed to reach the vCloud API", e)
                    .with_retryable(true)
            })?;

        let token: TokenResponse = resp.into_json().map_err(|e| {
            AppError::wrap("VCD_BAD_RESPONSE", "vCloud token response was malformed", e)
        })?;

        token
            .access_token
            .ok_or_else(|| AppError::new("VCD_AUTH_FAILED", "vCloud returned no access token"))
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        token: &str,
    ) -> Result<T, AppError> {
        let resp = ureq::get(url)
            .set("Accept", API_VERSION_ACCEPT)
            .set("Authorization", &format!("Bearer {token}"))
            .timeout(API_TIMEOUT)
            .call()
            .map_err(|e| {
                AppError::wrap("VCD_UNREACHABLE", "Failed to reach the vCloud API", e)
                    .with_retryable(true)
            })?;

        resp.into_json()
            .map_err(|e| AppError::wrap("VCD_BAD_RESPONSE", "vCloud returned malformed JSON", e))
    }

    /// Sum consumed storage across all consumer pages of one policy.
    fn storage_policy_usage(
        &self,
        token: &str,
        policy: &PolicyRef,
    ) -> Result<StoragePolicyUsage, AppError> {
        let mut total_used_mb = 0;
        let mut page = 1;

        loop {
            let url = format!(
                "{}/cloudapi/1.0.0/orgVdcStoragePolicies/{}/consumers?page={page}&pageSize={CONSUMERS_PAGE_SIZE}",
                self.base_url, policy.urn
            );
            let body: ConsumersPage = self.get_json(&url, token)?;

            total_used_mb += body
                .values
                .iter()
                .map(|v| v.storage_consumed_mb)
                .sum::<i64>();

            if page >= body.page_count.max(1) {
                break;
            }
            page += 1;
        }

        Ok(StoragePolicyUsage {
            policy_name: policy.name.clone(),
            total_used_mb,
        })
    }

    fn vdc_capacity(&self, token: &str, vdc_urn: &str) -> Result<ComputeCapacity, AppError> {
        let url = format!("{}/cloudapi/1.0.0/vdcs/{}", self.base_url, vdc_urn);
        let record: VdcRecord = self.get_json(&url, token)?;
        Ok(record.compute_capacity)
    }

    pub fn usage_report(
        &self,
        vdc_urn: &str,
        policies: &[PolicyRef],
    ) -> Result<CloudUsageReport, AppError> {
        let token = self.bearer_token()?;

        let capacity = self.vdc_capacity(&token, vdc_urn)?;
        let mut storage = Vec::with_capacity(policies.len());
        for policy in policies {
            storage.push(self.storage_policy_usage(&token, policy)?);
        }

        Ok(CloudUsageReport {
            cpu_mhz: capacity.cpu,
            memory_mb: capacity.memory,
            storage,
        })
    }
}

/// The usage report behind a TTL cache, as handed to the chat command.
pub struct CloudReporter {
    client: VcloudClient,
    vdc_urn: String,
    policies: Vec<PolicyRef>,
    cache: ReportCache<CloudUsageReport>,
}

impl CloudReporter {
    pub fn new(client: VcloudClient, vdc_urn: impl Into<String>, policies: Vec<PolicyRef>) -> Self {
        Self {
            client,
            vdc_urn: vdc_urn.into(),
            policies,
            cache: ReportCache::new(),
        }
    }

    pub fn report(&self) -> Result<CloudUsageReport, AppError> {
        if let Some(cached) = self.cache.get() {
            return Ok(cached);
        }
        let fresh = self.client.usage_report(&self.vdc_urn, &self.policies)?;
        self.cache.put(fresh.clone());
        Ok(fresh)
    }
}
