use reqwest::Client;
use std::time::Duration;

pub fn create_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(concat!("comic-sync/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
}
