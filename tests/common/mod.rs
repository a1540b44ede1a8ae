//! Shared utilities for integration tests.
//!
//! `ChainScript` stands in for a node: tests queue broadcast failures, set
//! the dispatch error of the next finalized block, or make the broadcast or
//! finalization hang.

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use testnet_faucet::chain::{
    ss58, ChainConnector, ChainError, ChainProperties, ChainSession, ModuleErrorInfo, RawDispatchError,
    SubmissionRequest, TransportErrorKind, TxStatus, TxStatusStream,
};
use testnet_faucet::clock::ManualClock;
use testnet_faucet::config::FaucetConfig;
use testnet_faucet::http::{AppState, FaucetServer};
use testnet_faucet::lifecycle::{startup, Shutdown};
use testnet_faucet::notify::{Alert, Notifier, NotifyError};

pub const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
pub const BOB: &str = "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty";
pub const FAUCET_ACCOUNT: &str = "5FaucetAccount";

pub const MINUTE_MS: u64 = 60 * 1000;

/// Pallet index the script uses for the balances module.
pub const BALANCES_INDEX: u8 = 5;

/// Module error the script decodes as `balances.InsufficientBalance`.
pub fn insufficient_balance() -> RawDispatchError {
    RawDispatchError::Module {
        index: BALANCES_INDEX,
        error: [2, 0, 0, 0],
    }
}

/// Module error the script decodes as `balances.ExistentialDeposit`.
pub fn existential_deposit() -> RawDispatchError {
    RawDispatchError::Module {
        index: BALANCES_INDEX,
        error: [3, 0, 0, 0],
    }
}

pub fn bad_signature() -> ChainError {
    ChainError::transport(
        TransportErrorKind::BadSignature,
        Some(1002),
        "Transaction has a bad signature",
    )
}

pub fn cannot_pay_fees() -> ChainError {
    ChainError::transport(
        TransportErrorKind::CannotPayFees,
        Some(1010),
        "Invalid Transaction: Inability to pay some fees",
    )
}

/// Scripted node behavior shared by the connector and all its sessions.
#[derive(Default)]
pub struct ChainScript {
    pub connects: AtomicUsize,
    broadcast_errors: Mutex<VecDeque<ChainError>>,
    dispatch_error: Mutex<Option<RawDispatchError>>,
    hang: AtomicBool,
    stall_after_inclusion: AtomicBool,
    stall_broadcast: AtomicBool,
    next_nonce: AtomicU64,
    submissions: Mutex<Vec<SubmissionRequest>>,
}

impl ChainScript {
    /// Fail the next broadcast with `error`.
    pub fn fail_next_broadcast(&self, error: ChainError) {
        self.broadcast_errors.lock().unwrap().push_back(error);
    }

    /// Attach `error` to every finalized block until cleared.
    pub fn set_dispatch_error(&self, error: Option<RawDispatchError>) {
        *self.dispatch_error.lock().unwrap() = error;
    }

    /// Never finalize broadcast transfers.
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    /// Include broadcast transfers in a block, then never finalize them.
    pub fn set_stall_after_inclusion(&self, stall: bool) {
        self.stall_after_inclusion.store(stall, Ordering::SeqCst);
    }

    /// Never answer broadcast calls.
    pub fn set_stall_broadcast(&self, stall: bool) {
        self.stall_broadcast.store(stall, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<SubmissionRequest> {
        self.submissions.lock().unwrap().clone()
    }
}

pub struct ScriptedConnector(pub Arc<ChainScript>);

#[async_trait]
impl ChainConnector for ScriptedConnector {
    async fn connect(&self, _endpoint: &str) -> Result<Arc<dyn ChainSession>, ChainError> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedSession(self.0.clone())))
    }

    fn check_address(&self, address: &str, address_format: u16) -> Result<(), String> {
        ss58::check(address, address_format)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    fn funding_account(&self) -> String {
        FAUCET_ACCOUNT.to_string()
    }
}

struct ScriptedSession(Arc<ChainScript>);

#[async_trait]
impl ChainSession for ScriptedSession {
    async fn chain_properties(&self) -> Result<ChainProperties, ChainError> {
        Ok(ChainProperties {
            address_format: Some(42),
            token_decimals: Some(12),
            token_symbol: Some("WND".into()),
        })
    }

    async fn account_next_index(&self) -> Result<u64, ChainError> {
        Ok(self.0.next_nonce.load(Ordering::SeqCst))
    }

    async fn submit_transfer(&self, request: &SubmissionRequest) -> Result<TxStatusStream, ChainError> {
        if self.0.stall_broadcast.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(error) = self.0.broadcast_errors.lock().unwrap().pop_front() {
            return Err(error);
        }

        self.0.next_nonce.fetch_add(1, Ordering::SeqCst);
        self.0.submissions.lock().unwrap().push(request.clone());

        if self.0.hang.load(Ordering::SeqCst) {
            return Ok(stream::pending().boxed());
        }
        if self.0.stall_after_inclusion.load(Ordering::SeqCst) {
            return Ok(stream::iter(vec![
                Ok(TxStatus::Ready),
                Ok(TxStatus::Broadcast),
                Ok(TxStatus::InBlock {
                    block: "0x01".into(),
                }),
            ])
            .chain(stream::pending())
            .boxed());
        }

        let dispatch_error = self.0.dispatch_error.lock().unwrap().clone();
        Ok(stream::iter(vec![
            Ok(TxStatus::Ready),
            Ok(TxStatus::Broadcast),
            Ok(TxStatus::InBlock {
                block: "0x01".into(),
            }),
            Ok(TxStatus::Finalized {
                block: "0x01".into(),
                dispatch_error,
            }),
        ])
        .boxed())
    }

    fn decode_module_error(&self, raw: &RawDispatchError) -> Option<ModuleErrorInfo> {
        match raw {
            RawDispatchError::Module { index, error } if *index == BALANCES_INDEX => {
                let name = match error[0] {
                    2 => "InsufficientBalance",
                    3 => "ExistentialDeposit",
                    _ => return None,
                };
                Some(ModuleErrorInfo {
                    section: "balances".into(),
                    method: "transferKeepAlive".into(),
                    name: name.into(),
                })
            }
            _ => None,
        }
    }
}

/// Notifier that keeps every alert it is given.
#[derive(Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

/// Config used by the tests: 10 units, 2 per hour, 10 minute cooldown.
pub fn test_config() -> FaucetConfig {
    let mut config = FaucetConfig::default();
    config.network.name = "westend".into();
    config.network.endpoint = "ws://scripted".into();
    config.network.address_prefix = 42;
    config.network.decimals = 12;
    config.network.fund_amount = 10;
    config.network.limit_per_hour = 2;
    config.network.min_wait_time_minutes = 10;
    config.network.notification_cooldown_minutes = 480;
    config.network.finalization_timeout_secs = 1;
    config.network.broadcast_timeout_secs = 1;
    config.ip_rate_limit.enabled = false;
    config
}

pub struct Harness {
    pub state: AppState,
    pub chain: Arc<ChainScript>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    /// Alerts delivered so far, after in-flight deliveries finish.
    pub async fn alerts(&self) -> Vec<Alert> {
        self.state.pipeline.gate().flush().await;
        self.notifier.alerts()
    }

    /// Wait until at least `count` alerts were delivered, or give up after
    /// a few seconds and return what arrived.
    pub async fn wait_for_alerts(&self, count: usize) -> Vec<Alert> {
        for _ in 0..60 {
            let alerts = self.alerts().await;
            if alerts.len() >= count {
                return alerts;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.alerts().await
    }
}

pub fn harness(config: &FaucetConfig) -> Harness {
    let chain = Arc::new(ChainScript::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));

    let state = startup::assemble(
        config,
        Arc::new(ScriptedConnector(chain.clone())),
        notifier.clone(),
        clock.clone(),
    )
    .unwrap();

    Harness {
        state,
        chain,
        notifier,
        clock,
    }
}

/// Serve `state` on an ephemeral port.
pub async fn spawn_server(config: &FaucetConfig, state: AppState) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = FaucetServer::new(config, state);
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });

    (addr, shutdown)
}
