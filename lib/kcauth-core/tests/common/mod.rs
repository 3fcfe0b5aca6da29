#![allow(dead_code, missing_docs, clippy::expect_used)]
use std::sync::Arc;

use jiff::Timestamp;
use kcauth_core::{
    ClientCredentialsConfig, ClientRegistry, ManualClock, RetryPolicy, TokenManager,
    TokenSettings,
};
use rstest::fixture;
use tracing::info;

mod fake_idp;
pub use self::fake_idp::*;

mod flaky;
pub use self::flaky::*;

pub fn init_tracing() {
    // should be run once, fail otherwise, we skip that error
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();

    info!("Tracing initialized");
}

#[fixture]
pub async fn idp() -> FakeIdp {
    init_tracing();
    match FakeIdp::start().await {
        Ok(idp) => idp,
        Err(error) => {
            panic!("fail to start fake identity provider: {error:?}");
        }
    }
}

#[fixture]
pub fn clock() -> ManualClock {
    ManualClock::new(Timestamp::UNIX_EPOCH)
}

/// Retries fast, so failing tests fail fast.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        min_delay: std::time::Duration::from_millis(1),
        max_delay: std::time::Duration::from_millis(5),
        max_retries: 2,
        jitter: false,
    }
}

pub fn client(idp: &FakeIdp, name: &str, client_id: &str) -> ClientCredentialsConfig {
    ClientCredentialsConfig::new(
        name,
        client_id,
        format!("{client_id}-secret"),
        idp.token_endpoint("Test"),
    )
    .expect("valid client config")
}

pub fn manager(idp: &FakeIdp, clock: &ManualClock, names: &[&str]) -> TokenManager {
    let registry = names
        .iter()
        .fold(ClientRegistry::builder(), |builder, name| {
            builder.add_client(client(idp, name, &format!("{name}-client")))
        })
        .build()
        .expect("valid registry");

    TokenManager::builder(registry)
        .with_clock(Arc::new(clock.clone()))
        .with_settings(TokenSettings {
            retry: fast_retry(),
            ..TokenSettings::default()
        })
        .build()
        .expect("should build manager")
}
