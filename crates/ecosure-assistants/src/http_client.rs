use reqwest::Client;

const DISABLE_SYSTEM_PROXY_ENV: &str = "ECOSURE_DISABLE_SYSTEM_PROXY";

pub(crate) fn build_http_client() -> Client {
    if !should_disable_system_proxy() {
        return Client::new();
    }

    Client::builder().no_proxy().build().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "Failed to build proxy-less client, using defaults");
        Client::new()
    })
}

fn should_disable_system_proxy() -> bool {
    if std::env::var_os(DISABLE_SYSTEM_PROXY_ENV).is_some() {
        return true;
    }

    cfg!(test)
}
