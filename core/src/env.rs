use crate::ConfigError;

use url::Url;

pub const URL_VAR: &str = "SUPABASE_URL";
pub const KEY_VAR: &str = "SUPABASE_ANON_KEY";

/// Settings every process needs before it can talk to the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Env {
	pub api_url: String,
	pub api_key: String,
}

impl Env {
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Builds the settings from any key lookup, mostly so tests do not have to
	/// touch the process environment.
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let required = |name: &'static str| {
			lookup(name)
				.map(|value| value.trim().to_string())
				.filter(|value| !value.is_empty())
				.ok_or(ConfigError::Missing(name))
		};

		Self::new(required(URL_VAR)?, required(KEY_VAR)?)
	}

	pub fn new(api_url: String, api_key: String) -> Result<Self, ConfigError> {
		let parsed = Url::parse(&api_url).map_err(|e| ConfigError::InvalidUrl {
			url: api_url.clone(),
			reason: e.to_string(),
		})?;

		if !matches!(parsed.scheme(), "http" | "https") || parsed.host().is_none() {
			return Err(ConfigError::InvalidUrl {
				url: api_url,
				reason: "expected an absolute http(s) url".to_string(),
			});
		}

		Ok(Self {
			api_url: api_url.trim_end_matches('/').to_string(),
			api_key,
		})
	}
}
