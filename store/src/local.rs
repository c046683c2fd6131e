use std::{error::Error, future::Future};

/// Device-local persistent key-value storage holding string values.
pub trait LocalStorage: Send + Sync {
    type Error: Error + Send + Sync + 'static;

    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send;

    fn set(&self, key: &str, value: String) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn remove(&self, keys: &[String]) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn get_all_keys(&self) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send;
}
