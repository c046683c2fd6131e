use config_keys::{ConfigKey, RankingConfig, RankingKey, ViewTrackingConfig, ViewTrackingKey};
use thiserror::Error;

/// Everything the view tracker and the feed service read at start-up.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServiceConfig {
    pub tracking: ViewTrackingConfig,
    pub ranking: RankingConfig,
}

/// Remote configuration stored as JSON values in an HTTP key-value namespace.
pub struct KVConfig {
    client: reqwest::Client,
    url: String,
    token: String,
}

#[derive(Debug, Error)]
pub enum KVFetchError {
    #[error("request to config store failed: {0}")]
    Client(reqwest::Error),
    #[error("key not found and no fallback available")]
    KeyNotFound,
    #[error("config store returned status {0}")]
    StatusNotOk(u16),
    #[error("failed to read config store response: {0}")]
    Decode(reqwest::Error),
    #[error("invalid config value: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config store url or key name")]
    InvalidUrlOrKeyName,
}

impl KVConfig {
    pub fn new(url: String, token: String) -> KVConfig {
        KVConfig {
            client: reqwest::Client::new(),
            url,
            token,
        }
    }

    fn url<K: ConfigKey>(&self, key: &K) -> Result<String, KVFetchError> {
        let url = url::Url::parse(&self.url)
            .map(|url| url.join(&key.to_string()).map(|url| url.to_string()));

        let Ok(Ok(url)) = url else {
            return Err(KVFetchError::InvalidUrlOrKeyName);
        };

        Ok(url)
    }

    pub async fn get<K: ConfigKey>(&self, key: K) -> Result<K::Value, KVFetchError> {
        let url = self.url(&key)?;

        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(KVFetchError::Client)?;

        match resp.status().as_u16() {
            200 => {
                let value = resp.text().await.map_err(KVFetchError::Decode)?;
                Ok(serde_json::from_str(&value)?)
            }
            404 => <K as ConfigKey>::fallback().ok_or(KVFetchError::KeyNotFound),
            status_code => Err(KVFetchError::StatusNotOk(status_code)),
        }
    }

    /// Like [`KVConfig::get`], but any failure degrades to the key's fallback.
    pub async fn get_or_fallback<K: ConfigKey>(&self, key: K) -> Result<K::Value, KVFetchError> {
        let name = key.to_string();
        match self.get(key).await {
            Ok(value) => Ok(value),
            Err(e) => {
                log::warn!("failed to load config `{name}`: {e}, using fallback");
                <K as ConfigKey>::fallback().ok_or(e)
            }
        }
    }

    pub async fn set<K: ConfigKey>(&self, key: K, value: K::Value) -> Result<(), KVFetchError> {
        let url = self.url(&key)?;
        let value = serde_json::to_string(&value)?;

        let resp = self
            .client
            .post(url)
            .body(value)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(KVFetchError::Client)?;

        match resp.status().as_u16() {
            200 => Ok(()),
            status_code => Err(KVFetchError::StatusNotOk(status_code)),
        }
    }

    /// Loads both service configs. Keys that cannot be read use their defaults.
    pub async fn load_service_config(&self) -> ServiceConfig {
        let tracking = self
            .get_or_fallback(ViewTrackingKey)
            .await
            .unwrap_or_default();
        let ranking = self.get_or_fallback(RankingKey).await.unwrap_or_default();
        ServiceConfig { tracking, ranking }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_joined_onto_base_url() {
        let kv = KVConfig::new("https://kv.example.com/ns/".into(), "t".into());
        assert_eq!(
            kv.url(&ViewTrackingKey).unwrap(),
            "https://kv.example.com/ns/view-tracking"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let kv = KVConfig::new("not a url".into(), "t".into());
        assert!(matches!(
            kv.url(&RankingKey),
            Err(KVFetchError::InvalidUrlOrKeyName)
        ));
    }

    #[tokio::test]
    async fn unusable_store_falls_back_to_defaults() {
        let kv = KVConfig::new("not a url".into(), "t".into());
        let cfg = kv.get_or_fallback(ViewTrackingKey).await.unwrap();
        assert_eq!(cfg, ViewTrackingConfig::default());
    }

    #[tokio::test]
    async fn service_config_defaults_when_store_is_unusable() {
        let kv = KVConfig::new("not a url".into(), "t".into());
        assert_eq!(kv.load_service_config().await, ServiceConfig::default());
    }
}
