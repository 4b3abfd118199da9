use std::time::Duration;

use reqwest::Client;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
/// Archives of large worlds take a while on slow uplinks.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Client shared by every remote call of a run.
pub fn build_http_client() -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(concat!("craftsync/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
}
