use rust_decimal::Decimal;
use uuid::Uuid;

use ledger::{JournalKind, Ledger, NewJournalEntry};

use crate::error::CoreError;

fn validate_amount(amount: Decimal) -> Result<(), CoreError> {
    if amount <= Decimal::ZERO {
        return Err(CoreError::InvalidInput("amount must be strictly positive".into()));
    }
    if amount.round_dp(2) != amount {
        return Err(CoreError::InvalidInput(
            "amount must have at most two fractional digits".into(),
        ));
    }
    Ok(())
}

/// `Deposit(user, amount, reference)` (spec.md §4.6). Idempotent by
/// reference string: a second deposit with the same reference is rejected
/// with `Conflict` and leaves no trace.
pub async fn deposit<L: Ledger>(
    ledger: &L,
    user_id: Uuid,
    amount: Decimal,
    reference: String,
) -> Result<Decimal, CoreError> {
    validate_amount(amount)?;

    let mut txn = ledger.begin().await?;
    let result = deposit_txn(ledger, &mut txn, user_id, amount, &reference).await;
    match result {
        Ok(balance) => {
            ledger.commit(txn).await?;
            Ok(balance)
        }
        Err(err) => {
            ledger.rollback(txn).await?;
            Err(err)
        }
    }
}

async fn deposit_txn<L: Ledger>(
    ledger: &L,
    txn: &mut L::Txn,
    user_id: Uuid,
    amount: Decimal,
    reference: &str,
) -> Result<Decimal, CoreError> {
    if ledger.deposit_reference_exists(txn, reference).await? {
        return Err(CoreError::Conflict("duplicate deposit reference".into()));
    }
    let balance = ledger.update_user_balance(txn, user_id, amount).await?;
    ledger
        .insert_journal_entry(
            txn,
            NewJournalEntry {
                user_id,
                amount,
                kind: JournalKind::Deposit,
                reference: Some(reference.to_string()),
                auction_id: None,
            },
        )
        .await?;
    Ok(balance)
}

/// `Withdraw(user, amount, upi_id)` (spec.md §4.6). `upi_id` is accepted for
/// parity with the external interface (spec.md §6) but is opaque to the
/// core; it is recorded only as context for the journal reference.
pub async fn withdraw<L: Ledger>(
    ledger: &L,
    user_id: Uuid,
    amount: Decimal,
    upi_id: String,
) -> Result<Decimal, CoreError> {
    validate_amount(amount)?;

    let mut txn = ledger.begin().await?;
    let result = withdraw_txn(ledger, &mut txn, user_id, amount, &upi_id).await;
    match result {
        Ok(balance) => {
            ledger.commit(txn).await?;
            Ok(balance)
        }
        Err(err) => {
            ledger.rollback(txn).await?;
            Err(err)
        }
    }
}

async fn withdraw_txn<L: Ledger>(
    ledger: &L,
    txn: &mut L::Txn,
    user_id: Uuid,
    amount: Decimal,
    upi_id: &str,
) -> Result<Decimal, CoreError> {
    let balance = ledger.lock_user(txn, user_id).await?;
    if balance < amount {
        return Err(CoreError::InsufficientFunds);
    }
    let new_balance = ledger.update_user_balance(txn, user_id, -amount).await?;
    ledger
        .insert_journal_entry(
            txn,
            NewJournalEntry {
                user_id,
                amount,
                kind: JournalKind::Withdraw,
                reference: Some(upi_id.to_string()),
                auction_id: None,
            },
        )
        .await?;
    Ok(new_balance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::MemLedger;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn idempotent_deposit_scenario_from_spec_8_6() {
        let ledger = MemLedger::new();
        let user = Uuid::new_v4();
        ledger.seed_user(user, "Alice", "alice@example.com", dec!(0.00)).await;

        let balance = deposit(&ledger, user, dec!(100.00), "X".to_string()).await.unwrap();
        assert_eq!(balance, dec!(100.00));

        let err = deposit(&ledger, user, dec!(100.00), "X".to_string()).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        assert_eq!(ledger.get_balance(user).await.unwrap(), dec!(100.00));
    }

    #[tokio::test]
    async fn withdraw_requires_sufficient_balance() {
        let ledger = MemLedger::new();
        let user = Uuid::new_v4();
        ledger.seed_user(user, "Alice", "alice@example.com", dec!(50.00)).await;

        let err = withdraw(&ledger, user, dec!(100.00), "upi1".to_string()).await.unwrap_err();
        assert!(matches!(err, CoreError::InsufficientFunds));
        assert_eq!(ledger.get_balance(user).await.unwrap(), dec!(50.00));

        let balance = withdraw(&ledger, user, dec!(30.00), "upi1".to_string()).await.unwrap();
        assert_eq!(balance, dec!(20.00));
    }
}
