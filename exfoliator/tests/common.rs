// Shared helpers for tests that drive the client against the in-process simulator.
#![allow(dead_code)]

use std::time::Duration;

use exfoliator::{ClientConfig, ClientEvent};
use sim::{SimConfig, SimHandle};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn start_sim(program_ms: u64) -> SimHandle {
    init_tracing();
    let sim = sim::spawn(SimConfig {
        program_duration: Duration::from_millis(program_ms),
        ..SimConfig::default()
    })
    .await
    .expect("simulator should bind a local port");
    sim.save_program("P", "MOVE X CHIP_X\nMOVE Y CHIP_Y\nDELAY 1").await;
    sim
}

pub fn fast_config(url: String) -> ClientConfig {
    ClientConfig {
        url,
        reconnect_delay_ms: 100,
        confirm_timeout_ms: 200,
        settle_delay_ms: 50,
        ..ClientConfig::default()
    }
}

/// Receives events until one matches, failing the test after [`WAIT`].
pub async fn expect_event<F>(events: &mut broadcast::Receiver<ClientEvent>, mut matches: F) -> ClientEvent
where
    F: FnMut(&ClientEvent) -> bool,
{
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event stream closed"),
            }
        }
    };
    timeout(WAIT, wait).await.expect("timed out waiting for event")
}
