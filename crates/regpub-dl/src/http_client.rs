//! The process-wide HTTP agent used for artifact downloads.

use std::{
    sync::{LazyLock, RwLock},
    time::Duration,
};

use ureq::{Agent, Proxy};

const USER_AGENT: &str = concat!("regpub/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub user_agent: String,
    /// Budget for a whole request, body included. Each retry gets a fresh one.
    pub timeout: Option<Duration>,
    pub proxy: Option<Proxy>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: USER_AGENT.to_string(),
            timeout: Some(Duration::from_secs(30)),
            proxy: Proxy::try_from_env(),
        }
    }
}

impl ClientConfig {
    pub fn build(&self) -> Agent {
        ureq::Agent::config_builder()
            .user_agent(&self.user_agent)
            .proxy(self.proxy.clone())
            .timeout_global(self.timeout)
            .build()
            .into()
    }
}

static CLIENT: LazyLock<RwLock<(ClientConfig, Agent)>> = LazyLock::new(|| {
    let config = ClientConfig::default();
    let agent = config.build();
    RwLock::new((config, agent))
});

/// The shared agent. Agents are cheap handles over one connection pool.
pub fn agent() -> Agent {
    CLIENT
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .1
        .clone()
}

/// The configuration the shared agent was last built from.
pub fn client_config() -> ClientConfig {
    CLIENT
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .0
        .clone()
}

/// Applies `update` to the shared configuration and rebuilds the agent.
///
/// ```
/// use std::time::Duration;
/// use regpub_dl::http_client::configure_http_client;
///
/// configure_http_client(|cfg| cfg.timeout = Some(Duration::from_secs(60)));
/// ```
pub fn configure_http_client<F>(update: F)
where
    F: FnOnce(&mut ClientConfig),
{
    let mut client = CLIENT
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    update(&mut client.0);
    client.1 = client.0.build();
}
