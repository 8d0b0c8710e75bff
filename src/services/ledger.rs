//! Financial side effects of finalized deposits and cancelled withdrawals.
//!
//! The poster mutates an in-memory [`DepositContext`] loaded by the store
//! under lock and returns a [`DepositPosting`] describing what it did. The
//! store writes the mutated snapshot back in the same atomic unit as the
//! status flip, so effects are applied exactly once or not at all.

use bigdecimal::{BigDecimal, Zero};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::PlatformSettings;
use crate::database::error::DatabaseError;
use crate::database::models::{AffiliateHistory, CommissionStatus, Transaction, UserAccount, Wallet, Withdrawal};

/// Everything the ledger reads and may change for one deposit.
#[derive(Debug, Clone)]
pub struct DepositContext {
    pub wallet: Wallet,
    /// Paid deposits of this user before the current one
    pub prior_paid_deposits: i64,
    pub pending_cpa: Option<AffiliateHistory>,
    pub sponsor: Option<UserAccount>,
    pub sponsor_wallet: Option<Wallet>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CpaPosting {
    None,
    Paid {
        history_id: Uuid,
        sponsor_id: i64,
        commission: BigDecimal,
    },
    Tracked {
        history_id: Uuid,
        deposited_amount: BigDecimal,
    },
}

/// Effects applied for one finalized deposit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepositPosting {
    pub user_id: i64,
    pub balance_credit: BigDecimal,
    pub first_deposit_bonus: Option<BigDecimal>,
    pub bonus_rollover: Option<BigDecimal>,
    pub deposit_rollover: BigDecimal,
    pub vip_points: BigDecimal,
    pub vip_bonus: BigDecimal,
    pub vip_tiers_reached: Vec<String>,
    pub cpa: CpaPosting,
}

#[derive(Debug, Clone)]
pub struct LedgerPoster {
    settings: Arc<PlatformSettings>,
}

impl LedgerPoster {
    pub fn new(settings: Arc<PlatformSettings>) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PlatformSettings {
        &self.settings
    }

    /// Credit a paid deposit. The caller guarantees a single invocation per
    /// transaction.
    pub fn apply_deposit_effects(&self, tx: &Transaction, ctx: &mut DepositContext) -> DepositPosting {
        let amount = &tx.amount;
        let settings = &*self.settings;
        let wallet = &mut ctx.wallet;

        wallet.balance = &wallet.balance + amount;

        let mut first_deposit_bonus = None;
        let mut bonus_rollover = None;
        if ctx.prior_paid_deposits == 0 && settings.initial_bonus_pct > BigDecimal::zero() {
            let bonus = (amount * &settings.initial_bonus_pct / BigDecimal::from(100)).round(2);
            let rollover = (&bonus * &settings.bonus_rollover_multiplier).round(2);
            wallet.balance_bonus = &wallet.balance_bonus + &bonus;
            wallet.balance_bonus_rollover = rollover.clone();
            first_deposit_bonus = Some(bonus);
            bonus_rollover = Some(rollover);
        }

        let deposit_rollover = (amount * &settings.deposit_rollover_multiplier).round(2);
        wallet.balance_deposit_rollover = deposit_rollover.clone();

        let earned_points = amount * &settings.vip_points_per_unit;
        let points_before = wallet.vip_points.clone();
        let points_after = &points_before + &earned_points;
        let mut vip_bonus = BigDecimal::zero();
        let mut vip_tiers_reached = Vec::new();
        for tier in &settings.vip_tiers {
            if points_before < tier.threshold && tier.threshold <= points_after {
                vip_bonus = &vip_bonus + &tier.bonus;
                vip_tiers_reached.push(tier.name.clone());
            }
        }
        wallet.vip_points = points_after;
        wallet.balance_bonus = &wallet.balance_bonus + &vip_bonus;

        let cpa = evaluate_cpa(tx.user_id, amount, ctx);

        debug!(
            user_id = tx.user_id,
            external_id = %tx.external_id,
            first_deposit = first_deposit_bonus.is_some(),
            vip_tiers = ?vip_tiers_reached,
            cpa = ?cpa,
            "Deposit effects computed"
        );

        DepositPosting {
            user_id: tx.user_id,
            balance_credit: amount.clone(),
            first_deposit_bonus,
            bonus_rollover,
            deposit_rollover,
            vip_points: earned_points,
            vip_bonus,
            vip_tiers_reached,
            cpa,
        }
    }

    /// Give a cancelled withdrawal back to the user. Returns the refunded amount.
    pub fn apply_withdrawal_refund(&self, withdrawal: &Withdrawal, wallet: &mut Wallet) -> BigDecimal {
        wallet.balance = &wallet.balance + &withdrawal.amount;
        withdrawal.amount.clone()
    }
}

/// Reserve funds for a withdrawal request.
pub fn debit_balance(wallet: &mut Wallet, amount: &BigDecimal) -> Result<(), DatabaseError> {
    if &wallet.balance < amount {
        return Err(DatabaseError::InsufficientFunds {
            available: wallet.balance.clone(),
            requested: amount.clone(),
        });
    }
    wallet.balance = &wallet.balance - amount;
    Ok(())
}

fn evaluate_cpa(depositor_id: i64, amount: &BigDecimal, ctx: &mut DepositContext) -> CpaPosting {
    let history = match ctx.pending_cpa.as_mut() {
        Some(history) if history.status == CommissionStatus::Pending => history,
        _ => return CpaPosting::None,
    };
    // The depositor's wallet is already in `ctx.wallet`; a second copy as
    // sponsor would be written back over it.
    if history.inviter_id == depositor_id {
        warn!(user_id = depositor_id, history_id = %history.id, "Self-referral CPA history ignored");
        return CpaPosting::None;
    }
    let sponsor = match ctx.sponsor.as_ref() {
        Some(sponsor) => sponsor,
        None => return CpaPosting::None,
    };

    let tracked_total = &history.deposited_amount + amount;
    if amount >= &sponsor.affiliate_baseline || tracked_total >= sponsor.affiliate_baseline {
        let sponsor_wallet = match ctx.sponsor_wallet.as_mut() {
            Some(wallet) => wallet,
            None => {
                warn!(sponsor_id = sponsor.id, "Sponsor has no wallet, CPA left pending");
                return CpaPosting::None;
            }
        };
        sponsor_wallet.refer_rewards = &sponsor_wallet.refer_rewards + &sponsor.affiliate_cpa;
        history.status = CommissionStatus::Paid;
        history.commission_paid = sponsor.affiliate_cpa.clone();

        CpaPosting::Paid {
            history_id: history.id,
            sponsor_id: sponsor.id,
            commission: sponsor.affiliate_cpa.clone(),
        }
    } else {
        history.deposited_amount = tracked_total.clone();
        CpaPosting::Tracked {
            history_id: history.id,
            deposited_amount: tracked_total,
        }
    }
}
