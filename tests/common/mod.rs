#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pixflow::api::AppState;
use pixflow::config::{PlatformSettings, ReconcilerConfig};
use pixflow::database::models::{AffiliateHistory, NewTransaction, UserAccount, Wallet};
use pixflow::database::{AccountStore, MemoryStore, Store, TransactionStore};
use pixflow::payments::{
    GatewayError, PaymentGateway, PayoutReceipt, PayoutRequest, ProviderStatus, QrCode, QrCodeRequest,
};
use pixflow::services::notification::{AdminNotification, Notifier};
use pixflow::services::{DepositService, LedgerPoster, WithdrawalService};
use pixflow::workers::ReconciliationEngine;

pub fn dec(raw: &str) -> BigDecimal {
    BigDecimal::from_str(raw).unwrap()
}

/// In-process gateway that answers from a script and records every call.
#[derive(Default)]
pub struct ScriptedGateway {
    statuses: Mutex<HashMap<String, ProviderStatus>>,
    payout_results: Mutex<VecDeque<Result<PayoutReceipt, GatewayError>>>,
    qr_counter: AtomicUsize,
    pub qr_requests: Mutex<Vec<QrCodeRequest>>,
    pub payout_requests: Mutex<Vec<PayoutRequest>>,
    pub status_queries: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn set_status(&self, external_id: &str, status: ProviderStatus) {
        self.statuses.lock().unwrap().insert(external_id.to_string(), status);
    }

    /// Queue the result of the next payout call. Unscripted payouts are accepted.
    pub fn push_payout_result(&self, result: Result<PayoutReceipt, GatewayError>) {
        self.payout_results.lock().unwrap().push_back(result);
    }

    pub fn payout_count(&self) -> usize {
        self.payout_requests.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn request_qr_code(&self, request: QrCodeRequest) -> Result<QrCode, GatewayError> {
        let n = self.qr_counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.qr_requests.lock().unwrap().push(request);
        Ok(QrCode {
            external_id: format!("ext-{}", n),
            transaction_id: format!("txn-{}", n),
            payload: Some(format!("00020126580014BR.GOV.BCB.PIX-{}", n)),
        })
    }

    async fn request_payout(&self, request: PayoutRequest) -> Result<PayoutReceipt, GatewayError> {
        let reference = request.reference.clone();
        self.payout_requests.lock().unwrap().push(request);
        let scripted = self.payout_results.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(PayoutReceipt {
                external_id: reference,
                provider_tx_id: Some("provider-tx".to_string()),
                message: "Transferência processada".to_string(),
            })
        })
    }

    async fn query_status(&self, external_id: &str) -> ProviderStatus {
        self.status_queries.lock().unwrap().push(external_id.to_string());
        self.statuses
            .lock()
            .unwrap()
            .get(external_id)
            .copied()
            .unwrap_or(ProviderStatus::Unknown)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<AdminNotification>>,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_admins(&self, notification: AdminNotification) {
        self.sent.lock().unwrap().push(notification);
    }
}

pub fn test_settings() -> PlatformSettings {
    PlatformSettings {
        initial_bonus_pct: dec("10"),
        bonus_rollover_multiplier: dec("3"),
        deposit_rollover_multiplier: dec("1"),
        ..PlatformSettings::default()
    }
}

pub struct Harness {
    pub store: MemoryStore,
    pub gateway: Arc<ScriptedGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub poster: LedgerPoster,
    pub engine: Arc<ReconciliationEngine>,
    pub deposits: Arc<DepositService>,
    pub withdrawals: Arc<WithdrawalService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: PlatformSettings) -> Self {
        let settings = Arc::new(settings);
        let store = MemoryStore::new();
        let shared: Arc<dyn Store> = Arc::new(store.clone());
        let gateway = Arc::new(ScriptedGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let poster = LedgerPoster::new(settings.clone());
        let config = ReconcilerConfig {
            poll_interval: Duration::from_millis(20),
            ..ReconcilerConfig::default()
        };

        let engine = Arc::new(ReconciliationEngine::new(
            shared.clone(),
            gateway.clone(),
            poster.clone(),
            notifier.clone(),
            config.clone(),
        ));
        let deposits = Arc::new(DepositService::new(shared.clone(), gateway.clone(), settings));
        let withdrawals = Arc::new(WithdrawalService::new(
            shared,
            gateway.clone(),
            poster.clone(),
            notifier.clone(),
            config.payout_lock_timeout,
        ));

        Self {
            store,
            gateway,
            notifier,
            poster,
            engine,
            deposits,
            withdrawals,
        }
    }

    pub fn app_state(&self, webhook_secret: Option<&str>) -> AppState {
        AppState {
            engine: self.engine.clone(),
            deposits: self.deposits.clone(),
            withdrawals: self.withdrawals.clone(),
            store: Arc::new(self.store.clone()),
            webhook_secret: webhook_secret.map(str::to_string),
            started_at: Instant::now(),
        }
    }

    /// A user with an empty profile and a wallet holding `balance`.
    pub async fn seed_user(&self, id: i64, balance: &str) {
        self.store
            .insert_user(UserAccount {
                id,
                name: format!("User {}", id),
                inviter_id: None,
                affiliate_baseline: BigDecimal::from(0),
                affiliate_cpa: BigDecimal::from(0),
            })
            .await;
        self.store
            .insert_wallet(Wallet::new(id, "BRL").with_balance(dec(balance)))
            .await;
    }

    /// A sponsor offering `cpa` once a referral deposits `baseline`, and a
    /// referred user with a pending CPA history. Returns the history.
    pub async fn seed_referral(&self, sponsor_id: i64, user_id: i64, baseline: &str, cpa: &str) -> AffiliateHistory {
        self.store
            .insert_user(UserAccount {
                id: sponsor_id,
                name: "Sponsor".to_string(),
                inviter_id: None,
                affiliate_baseline: dec(baseline),
                affiliate_cpa: dec(cpa),
            })
            .await;
        self.store.insert_wallet(Wallet::new(sponsor_id, "BRL")).await;
        self.store
            .insert_user(UserAccount {
                id: user_id,
                name: "Referred".to_string(),
                inviter_id: Some(sponsor_id),
                affiliate_baseline: BigDecimal::from(0),
                affiliate_cpa: BigDecimal::from(0),
            })
            .await;
        self.store.insert_wallet(Wallet::new(user_id, "BRL")).await;

        let history = AffiliateHistory::pending_cpa(user_id, sponsor_id);
        self.store.insert_affiliate_history(history.clone()).await;
        history
    }

    pub async fn pending_deposit(&self, user_id: i64, external_id: &str, amount: &str) {
        self.store
            .create_pending(NewTransaction {
                external_id: external_id.to_string(),
                payment_id: Some(format!("txn-{}", external_id)),
                user_id,
                amount: dec(amount),
                currency: "BRL".to_string(),
            })
            .await
            .unwrap();
    }

    pub async fn wallet(&self, user_id: i64) -> Wallet {
        self.store.find_wallet(user_id).await.unwrap().unwrap()
    }
}
