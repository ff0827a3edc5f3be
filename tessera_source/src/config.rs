use serde::Deserialize;
use std::{path::PathBuf, time::Duration};

pub const ENV_S3_REGION: &str = "TESSERA_S3_REGION";
pub const ENV_S3_ENDPOINT: &str = "TESSERA_S3_ENDPOINT";
pub const ENV_GCS_SERVICE_ACCOUNT: &str = "TESSERA_GCS_SERVICE_ACCOUNT";

/// Limits applied to every resource fetch.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FetchConfig {
	/// Upper bound for a single fetch, including archive index loading.
	#[serde(default = "default_timeout_secs")]
	pub timeout_secs: u64,

	/// How often a ranged HTTP read is retried on connection or timeout errors.
	#[serde(default = "default_http_retries")]
	pub http_retries: u32,
}

fn default_timeout_secs() -> u64 {
	30
}

fn default_http_retries() -> u32 {
	3
}

impl FetchConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_secs)
	}
}

impl Default for FetchConfig {
	fn default() -> Self {
		Self {
			timeout_secs: default_timeout_secs(),
			http_retries: default_http_retries(),
		}
	}
}

/// Connection settings for S3-compatible storage and Google Cloud Storage.
///
/// Credentials are not part of this struct. S3 reads the usual `AWS_*` environment,
/// GCS the `GOOGLE_*` environment or the service account file named here.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ObjectStoreConfig {
	#[serde(default = "default_region")]
	pub region: String,

	/// Custom endpoint, e.g. a MinIO or R2 URL. Enables plain-HTTP access.
	#[serde(default)]
	pub endpoint: Option<String>,

	/// Path of a GCS service account key file.
	#[serde(default)]
	pub gcs_service_account: Option<PathBuf>,
}

fn default_region() -> String {
	String::from("us-east-1")
}

impl Default for ObjectStoreConfig {
	fn default() -> Self {
		Self {
			region: default_region(),
			endpoint: None,
			gcs_service_account: None,
		}
	}
}

impl ObjectStoreConfig {
	/// Applies `TESSERA_S3_REGION`, `TESSERA_S3_ENDPOINT` and `TESSERA_GCS_SERVICE_ACCOUNT`
	/// from the process environment.
	#[must_use]
	pub fn with_env_overrides(self) -> Self {
		self.with_overrides(|name| std::env::var(name).ok())
	}

	#[must_use]
	pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
		if let Some(region) = lookup(ENV_S3_REGION).filter(|v| !v.is_empty()) {
			self.region = region;
		}
		if let Some(endpoint) = lookup(ENV_S3_ENDPOINT).filter(|v| !v.is_empty()) {
			self.endpoint = Some(endpoint);
		}
		if let Some(path) = lookup(ENV_GCS_SERVICE_ACCOUNT).filter(|v| !v.is_empty()) {
			self.gcs_service_account = Some(PathBuf::from(path));
		}
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	#[test]
	fn defaults() {
		let fetch: FetchConfig = serde_yaml_ng::from_str("{}").unwrap();
		assert_eq!(fetch.timeout(), Duration::from_secs(30));
		assert_eq!(fetch.http_retries, 3);

		let store: ObjectStoreConfig = serde_yaml_ng::from_str("{}").unwrap();
		assert_eq!(store, ObjectStoreConfig::default());
		assert!(serde_yaml_ng::from_str::<ObjectStoreConfig>("bucket: x").is_err());
	}

	#[test]
	fn overrides_win_over_file_values() {
		let env: HashMap<&str, &str> = [
			(ENV_S3_ENDPOINT, "http://localhost:9000"),
			(ENV_S3_REGION, ""),
			(ENV_GCS_SERVICE_ACCOUNT, "/etc/gcs/key.json"),
		]
		.into();
		let config = ObjectStoreConfig {
			region: String::from("eu-central-1"),
			..ObjectStoreConfig::default()
		}
		.with_overrides(|name| env.get(name).map(|v| v.to_string()));

		assert_eq!(config.region, "eu-central-1");
		assert_eq!(config.endpoint.as_deref(), Some("http://localhost:9000"));
		assert_eq!(config.gcs_service_account, Some(PathBuf::from("/etc/gcs/key.json")));
	}
}
