mod common;

use bigdecimal::BigDecimal;
use serde_json::json;
use std::time::Duration;

use common::{dec, Harness};
use pixflow::database::error::DatabaseError;
use pixflow::database::models::{
    AffiliateHistory, CommissionStatus, NewTransaction, TransactionStatus, UserAccount, Wallet, Withdrawal,
    WithdrawalStatus,
};
use pixflow::database::{TransactionStore, WithdrawalStore};
use pixflow::payments::{GatewayError, PayoutReceipt, PixKeyType, ProviderStatus};
use pixflow::services::ledger::CpaPosting;
use pixflow::services::withdrawal::WithdrawalRequest;
use pixflow::workers::{ReconcileError, WebhookDisposition};

fn paid_webhook(external_id: &str, amount: &str) -> serde_json::Value {
    json!({
        "transactionType": "RECEIVEPIX",
        "external_id": external_id,
        "status": "PAID",
        "amount": amount,
    })
}

fn payout_webhook(external_id: &str, status_id: &str) -> serde_json::Value {
    json!({
        "transactionType": "PAYMENT",
        "transactionId": "prov-77",
        "external_id": external_id,
        "statusCode": { "statusId": status_id },
    })
}

async fn withdraw(h: &Harness, user_id: i64, amount: &str) -> Withdrawal {
    h.withdrawals
        .request(
            user_id,
            WithdrawalRequest {
                amount: dec(amount),
                pix_key: "alice@example.com".to_string(),
                pix_key_type: PixKeyType::Email,
            },
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn finalize_twice_credits_once() {
    let h = Harness::new();
    h.seed_user(1, "0").await;
    h.pending_deposit(1, "dep-1", "100").await;

    let first = h.engine.finalize("dep-1").await.unwrap();
    assert!(!first.already_finalized);
    assert!(first.posting.is_some());

    let second = h.engine.finalize("dep-1").await.unwrap();
    assert!(second.already_finalized);
    assert!(second.posting.is_none());

    let wallet = h.wallet(1).await;
    assert_eq!(wallet.balance, dec("100"));
    assert_eq!(h.notifier.count(), 1);
}

#[tokio::test]
async fn concurrent_webhook_and_poll_credit_exactly_once() {
    let h = Harness::new();
    h.seed_user(1, "0").await;
    h.pending_deposit(1, "dep-race", "80").await;
    h.gateway.set_status("dep-race", ProviderStatus::Paid);

    let (webhook, poll) = tokio::join!(
        h.engine.on_webhook_event(paid_webhook("dep-race", "80")),
        h.engine.poll_pending(Duration::from_secs(600), 5),
    );

    let disposition = webhook.unwrap();
    let report = poll.unwrap();

    let webhook_applied = matches!(
        disposition,
        WebhookDisposition::DepositFinalized { already_finalized: false, .. }
    );
    let poll_applied = report.finalized == 1;
    assert!(webhook_applied ^ poll_applied, "exactly one path must apply the credit");

    assert_eq!(h.wallet(1).await.balance, dec("80"));
    assert_eq!(h.notifier.count(), 1);
}

#[tokio::test]
async fn first_deposit_bonus_is_credited_once() {
    let h = Harness::new();
    h.seed_user(1, "0").await;
    h.pending_deposit(1, "dep-a", "100").await;
    h.pending_deposit(1, "dep-b", "100").await;

    let first = h.engine.finalize("dep-a").await.unwrap();
    let posting = first.posting.unwrap();
    assert_eq!(posting.first_deposit_bonus, Some(dec("10")));

    let wallet = h.wallet(1).await;
    assert_eq!(wallet.balance_bonus, dec("10"));
    assert_eq!(wallet.balance_bonus_rollover, dec("30"));
    assert_eq!(wallet.balance_deposit_rollover, dec("100"));

    let second = h.engine.finalize("dep-b").await.unwrap();
    assert_eq!(second.posting.unwrap().first_deposit_bonus, None);

    let wallet = h.wallet(1).await;
    assert_eq!(wallet.balance, dec("200"));
    assert_eq!(wallet.balance_bonus, dec("10"));
}

#[tokio::test]
async fn cpa_is_paid_when_deposit_crosses_baseline() {
    let h = Harness::new();
    let history = h.seed_referral(10, 11, "50", "25").await;
    h.pending_deposit(11, "dep-cpa", "60").await;

    let outcome = h.engine.finalize("dep-cpa").await.unwrap();
    assert!(matches!(outcome.posting.unwrap().cpa, CpaPosting::Paid { sponsor_id: 10, .. }));

    let sponsor = h.wallet(10).await;
    assert_eq!(sponsor.refer_rewards, dec("25"));

    let history = h.store.affiliate_history(history.id).await.unwrap();
    assert_eq!(history.status, CommissionStatus::Paid);
    assert_eq!(history.commission_paid, dec("25"));
}

#[tokio::test]
async fn cpa_below_baseline_only_tracks_the_amount() {
    let h = Harness::new();
    let history = h.seed_referral(10, 11, "50", "25").await;
    h.pending_deposit(11, "dep-small", "30").await;

    h.engine.finalize("dep-small").await.unwrap();

    let tracked = h.store.affiliate_history(history.id).await.unwrap();
    assert_eq!(tracked.status, CommissionStatus::Pending);
    assert_eq!(tracked.deposited_amount, dec("30"));
    assert_eq!(h.wallet(10).await.refer_rewards, BigDecimal::from(0));

    // A second deposit pushes the cumulative amount over the baseline.
    h.pending_deposit(11, "dep-small-2", "20").await;
    h.engine.finalize("dep-small-2").await.unwrap();

    let paid = h.store.affiliate_history(history.id).await.unwrap();
    assert_eq!(paid.status, CommissionStatus::Paid);
    assert_eq!(h.wallet(10).await.refer_rewards, dec("25"));
}

#[tokio::test]
async fn self_referral_keeps_the_deposit_credit() {
    let h = Harness::new();
    h.store
        .insert_user(UserAccount {
            id: 5,
            name: "Self".to_string(),
            inviter_id: Some(5),
            affiliate_baseline: dec("50"),
            affiliate_cpa: dec("25"),
        })
        .await;
    h.store.insert_wallet(Wallet::new(5, "BRL")).await;
    let history = AffiliateHistory::pending_cpa(5, 5);
    h.store.insert_affiliate_history(history.clone()).await;
    h.pending_deposit(5, "dep-self", "60").await;

    let outcome = h.engine.finalize("dep-self").await.unwrap();
    assert_eq!(outcome.posting.unwrap().cpa, CpaPosting::None);

    let wallet = h.wallet(5).await;
    assert_eq!(wallet.balance, dec("60"));
    assert_eq!(wallet.balance_bonus, dec("6"));
    assert_eq!(wallet.refer_rewards, BigDecimal::from(0));
    let stored = h.store.affiliate_history(history.id).await.unwrap();
    assert_eq!(stored.status, CommissionStatus::Pending);
}

#[tokio::test]
async fn repeated_external_id_is_rejected() {
    let h = Harness::new();
    h.seed_user(1, "0").await;
    h.pending_deposit(1, "dep-dup", "40").await;

    let err = h
        .store
        .create_pending(NewTransaction {
            external_id: "dep-dup".to_string(),
            payment_id: None,
            user_id: 1,
            amount: dec("99"),
            currency: "BRL".to_string(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DatabaseError::DuplicateExternalId(ref id) if id == "dep-dup"));
    let kept = h.store.find_by_external_id("dep-dup").await.unwrap().unwrap();
    assert_eq!(kept.amount, dec("40"));
}

#[tokio::test]
async fn stale_pending_transactions_are_not_polled() {
    let h = Harness::new();
    h.seed_user(1, "0").await;
    h.pending_deposit(1, "dep-old", "40").await;
    h.pending_deposit(1, "dep-new", "40").await;
    assert!(h.store.backdate_transaction("dep-old", chrono::Duration::minutes(11)).await);
    h.gateway.set_status("dep-old", ProviderStatus::Paid);
    h.gateway.set_status("dep-new", ProviderStatus::Pending);

    let report = h.engine.poll_pending(Duration::from_secs(600), 5).await.unwrap();

    assert_eq!(report.checked, 1);
    assert_eq!(report.pending, 1);
    assert!(!report.statuses.contains_key("dep-old"));
    assert_eq!(h.gateway.status_queries.lock().unwrap().as_slice(), ["dep-new"]);

    // Aging out of the window never fails a transaction.
    let old = h.store.find_by_external_id("dep-old").await.unwrap().unwrap();
    assert_eq!(old.status, TransactionStatus::Pending);
}

#[tokio::test]
async fn poll_respects_batch_size_and_oldest_first() {
    let h = Harness::new();
    h.seed_user(1, "0").await;
    for (id, age) in [("dep-1", 5), ("dep-2", 4), ("dep-3", 3)] {
        h.pending_deposit(1, id, "10").await;
        h.store.backdate_transaction(id, chrono::Duration::minutes(age)).await;
    }

    let report = h.engine.poll_pending(Duration::from_secs(600), 2).await.unwrap();

    assert_eq!(report.checked, 2);
    assert_eq!(report.unknown, 2);
    assert_eq!(h.gateway.status_queries.lock().unwrap().as_slice(), ["dep-1", "dep-2"]);
}

#[tokio::test]
async fn explicit_failure_fails_and_unknown_keeps_pending() {
    let h = Harness::new();
    h.seed_user(1, "0").await;
    h.pending_deposit(1, "dep-fail", "10").await;
    h.pending_deposit(1, "dep-unknown", "10").await;
    h.gateway.set_status("dep-fail", ProviderStatus::Failed);

    let report = h.engine.poll_pending(Duration::from_secs(600), 5).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.unknown, 1);

    let failed = h.store.find_by_external_id("dep-fail").await.unwrap().unwrap();
    assert_eq!(failed.status, TransactionStatus::Failed);
    let unknown = h.store.find_by_external_id("dep-unknown").await.unwrap().unwrap();
    assert_eq!(unknown.status, TransactionStatus::Pending);

    // A late PAID for a failed deposit is refused without crediting.
    let err = h.engine.finalize("dep-fail").await.unwrap_err();
    assert!(err.is_ignorable());
    assert_eq!(h.wallet(1).await.balance, BigDecimal::from(0));
}

#[tokio::test]
async fn wrapped_webhook_payload_is_unwrapped() {
    let h = Harness::new();
    h.seed_user(1, "0").await;
    h.pending_deposit(1, "dep-wrapped", "25").await;

    let disposition = h
        .engine
        .on_webhook_event(json!({ "requestBody": paid_webhook("dep-wrapped", "25") }))
        .await
        .unwrap();

    assert_eq!(
        disposition,
        WebhookDisposition::DepositFinalized {
            external_id: "dep-wrapped".to_string(),
            already_finalized: false,
        }
    );
    assert_eq!(h.wallet(1).await.balance, dec("25"));
}

#[tokio::test]
async fn pending_webhook_changes_nothing() {
    let h = Harness::new();
    h.seed_user(1, "0").await;
    h.pending_deposit(1, "dep-wait", "25").await;

    let disposition = h
        .engine
        .on_webhook_event(json!({
            "transactionType": "RECEIVEPIX",
            "external_id": "dep-wait",
            "status": "WAITING_PAYMENT",
        }))
        .await
        .unwrap();

    assert!(matches!(disposition, WebhookDisposition::DepositPending { .. }));
    assert_eq!(h.wallet(1).await.balance, BigDecimal::from(0));
}

#[tokio::test]
async fn unknown_deposit_and_unknown_kind_are_ignorable() {
    let h = Harness::new();

    let missing = h.engine.on_webhook_event(paid_webhook("nope", "10")).await.unwrap_err();
    assert!(missing.is_ignorable());

    let kind = h
        .engine
        .on_webhook_event(json!({ "transactionType": "REFUND", "external_id": "x" }))
        .await
        .unwrap_err();
    assert!(matches!(kind, ReconcileError::Webhook(_)));
    assert!(kind.is_ignorable());
}

#[tokio::test]
async fn payout_webhook_confirms_withdrawal() {
    let h = Harness::new();
    h.seed_user(1, "500").await;
    let withdrawal = h
        .withdrawals
        .request(
            1,
            WithdrawalRequest {
                amount: dec("100"),
                pix_key: "alice@example.com".to_string(),
                pix_key_type: PixKeyType::Email,
            },
        )
        .await
        .unwrap();
    let paid = h.withdrawals.approve(withdrawal.id, "admin").await.unwrap();
    let external_id = paid.metadata.external_id.clone().unwrap();

    let disposition = h
        .engine
        .on_webhook_event(json!({
            "requestBody": {
                "transactionType": "PAYMENT",
                "transactionId": "prov-99",
                "external_id": external_id,
                "statusCode": { "statusId": "1", "description": "Paid" },
            }
        }))
        .await
        .unwrap();

    assert!(matches!(
        disposition,
        WebhookDisposition::PayoutConfirmed { already_applied: true, .. }
    ));

    let stored = h.store.find_withdrawal(withdrawal.id).await.unwrap().unwrap();
    assert_eq!(stored.status, WithdrawalStatus::Paid);
    assert_eq!(stored.metadata.webhook_transaction_id.as_deref(), Some("prov-99"));
    assert_eq!(stored.metadata.webhook_status_id, Some(1));
}

#[tokio::test]
async fn payout_webhook_pays_a_pending_withdrawal() {
    let h = Harness::new();
    h.seed_user(1, "500").await;
    let withdrawal = withdraw(&h, 1, "100").await;
    h.gateway
        .push_payout_result(Err(GatewayError::Timeout(Duration::from_secs(30))));
    h.withdrawals.approve(withdrawal.id, "admin").await.unwrap_err();

    let disposition = h
        .engine
        .on_webhook_event(payout_webhook(&withdrawal.payout_reference(), "1"))
        .await
        .unwrap();

    assert!(matches!(
        disposition,
        WebhookDisposition::PayoutConfirmed { already_applied: false, .. }
    ));
    let stored = h.store.find_withdrawal(withdrawal.id).await.unwrap().unwrap();
    assert_eq!(stored.status, WithdrawalStatus::Paid);
    assert_eq!(stored.metadata.webhook_status_id, Some(1));
    assert_eq!(h.wallet(1).await.balance, dec("400"));
}

#[tokio::test]
async fn payout_reference_resolves_after_provider_assigns_its_id() {
    let h = Harness::new();
    h.seed_user(1, "500").await;
    let withdrawal = withdraw(&h, 1, "100").await;
    h.gateway.push_payout_result(Ok(PayoutReceipt {
        external_id: "prov-ext-1".to_string(),
        provider_tx_id: Some("prov-tx-1".to_string()),
        message: "ok".to_string(),
    }));

    let paid = h.withdrawals.approve(withdrawal.id, "admin").await.unwrap();
    assert_eq!(paid.metadata.external_id.as_deref(), Some("prov-ext-1"));

    for key in [withdrawal.payout_reference(), "prov-ext-1".to_string()] {
        let found = h.store.find_withdrawal_by_external_id(&key).await.unwrap();
        assert_eq!(found.map(|w| w.id), Some(withdrawal.id), "lookup by {}", key);
    }

    let disposition = h
        .engine
        .on_webhook_event(payout_webhook(&withdrawal.payout_reference(), "1"))
        .await
        .unwrap();
    assert!(matches!(
        disposition,
        WebhookDisposition::PayoutConfirmed { already_applied: true, .. }
    ));
}

#[tokio::test]
async fn payout_webhook_leaves_cancelled_withdrawal_alone() {
    let h = Harness::new();
    h.seed_user(1, "500").await;
    let withdrawal = withdraw(&h, 1, "100").await;
    h.withdrawals.cancel(withdrawal.id, "admin").await.unwrap();

    let err = h
        .engine
        .on_webhook_event(payout_webhook(&withdrawal.payout_reference(), "1"))
        .await
        .unwrap_err();
    assert!(err.is_ignorable());

    let stored = h.store.find_withdrawal(withdrawal.id).await.unwrap().unwrap();
    assert_eq!(stored.status, WithdrawalStatus::Cancelled);
    assert!(stored.metadata.webhook_status_id.is_none());
    assert_eq!(h.wallet(1).await.balance, dec("500"));
}

#[tokio::test]
async fn unconfirmed_payout_status_is_ignored() {
    let h = Harness::new();

    let disposition = h
        .engine
        .on_webhook_event(json!({
            "transactionType": "PAYMENT",
            "external_id": "wd-1",
            "statusCode": { "statusId": 3 },
        }))
        .await
        .unwrap();

    assert_eq!(
        disposition,
        WebhookDisposition::PayoutIgnored {
            external_id: "wd-1".to_string(),
            status_id: 3,
        }
    );
}

#[tokio::test]
async fn worker_stops_on_shutdown_signal() {
    let h = Harness::new();
    h.seed_user(1, "0").await;
    h.pending_deposit(1, "dep-bg", "15").await;
    h.gateway.set_status("dep-bg", ProviderStatus::Paid);

    let (tx, rx) = tokio::sync::watch::channel(false);
    let engine = h.engine.clone();
    let worker = tokio::spawn(async move { engine.run(rx).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), worker)
        .await
        .expect("worker did not stop")
        .unwrap();

    assert_eq!(h.wallet(1).await.balance, dec("15"));
}
