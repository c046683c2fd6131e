use rand::{distributions::Alphanumeric, Rng};
use store::LocalStorage;
use types::UnixMillis;

pub const FINGERPRINT_KEY: &str = "device_fingerprint";

const SUFFIX_LEN: usize = 9;

/// What the install reports about the platform it runs on
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformInfo {
    pub name: String,
    pub version: String,
}

impl PlatformInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn detect() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }
}

impl Default for PlatformInfo {
    fn default() -> Self {
        Self::detect()
    }
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect()
}

pub fn generate_fingerprint(platform: &PlatformInfo, now: UnixMillis) -> String {
    format!(
        "{}_{}_{now}_{}",
        platform.name,
        platform.version,
        random_suffix()
    )
}

pub fn fallback_fingerprint(now: UnixMillis) -> String {
    format!("fallback_{now}_{}", random_suffix())
}

/// Returns the install's fingerprint, generating and persisting one on first use.
///
/// Never fails: when storage is unusable a time and random based id is returned
/// instead, which will not survive a restart.
pub async fn get_or_create_fingerprint<L: LocalStorage>(
    storage: &L,
    platform: &PlatformInfo,
    now: UnixMillis,
) -> String {
    match storage.get(FINGERPRINT_KEY).await {
        Ok(Some(fingerprint)) if !fingerprint.is_empty() => return fingerprint,
        Ok(_) => {}
        Err(e) => {
            log::warn!("device fingerprint storage unavailable: {e}");
            return fallback_fingerprint(now);
        }
    }

    let fingerprint = generate_fingerprint(platform, now);
    if let Err(e) = storage.set(FINGERPRINT_KEY, fingerprint.clone()).await {
        log::warn!("failed to persist device fingerprint: {e}");
        return fallback_fingerprint(now);
    }

    log::info!("created device fingerprint {fingerprint}");
    fingerprint
}

#[cfg(test)]
mod tests {
    use store::MemoryLocalStorage;

    use super::*;

    #[tokio::test]
    async fn fingerprint_is_stable_once_stored() {
        let storage = MemoryLocalStorage::new();
        let platform = PlatformInfo::new("android", "14");

        let first = get_or_create_fingerprint(&storage, &platform, 1_000).await;
        assert!(first.starts_with("android_14_1000_"));
        assert_eq!(first.len(), "android_14_1000_".len() + SUFFIX_LEN);

        let second = get_or_create_fingerprint(&storage, &platform, 2_000).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn unavailable_storage_falls_back() {
        let storage = MemoryLocalStorage::new();
        storage.set_offline(true);

        let fingerprint = get_or_create_fingerprint(&storage, &PlatformInfo::detect(), 5).await;
        assert!(fingerprint.starts_with("fallback_5_"));
    }

    #[test]
    fn suffixes_differ() {
        let platform = PlatformInfo::new("ios", "17");
        assert_ne!(
            generate_fingerprint(&platform, 1),
            generate_fingerprint(&platform, 1)
        );
    }
}
