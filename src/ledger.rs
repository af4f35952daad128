use near_sdk::json_types::U128;
use near_sdk::store::{LookupMap, Vector};
use near_sdk::{env, near, AccountId, Timestamp};

use crate::asset::Asset;
use crate::escrow::{ClaimBatch, TimeLockDeposit};
use crate::timelocks::is_matured;

const DEFAULT_PAGE_LIMIT: u64 = 50;
pub const MAX_PAGE_LIMIT: u64 = 100;

/// Upper bound on the deposits one claim settles. Whatever matured beyond it
/// is left for the next claim.
pub const MAX_CLAIM_DEPOSITS: usize = 50;

/// Size of a recipient's list and its settled prefix. The list itself lives
/// in `EscrowLedger::deposit_ids`, one entry per position.
#[near(serializers = [borsh])]
#[derive(Clone, Copy, Default)]
pub struct RecipientLedger {
    pub count: u32,
    // Every position before this one is settled
    pub first_unsettled: u32,
}

#[near(serializers = [borsh])]
pub struct EscrowLedger {
    pub deposits: Vector<TimeLockDeposit>,
    pub recipients: LookupMap<AccountId, RecipientLedger>,
    // (recipient, position) -> id in `deposits`
    pub deposit_ids: LookupMap<(AccountId, u32), u32>,
    // Asset -> amount held for unsettled deposits
    pub custody: LookupMap<Asset, U128>,
}

impl EscrowLedger {
    pub fn new() -> Self {
        Self {
            deposits: Vector::new(b"d"),
            recipients: LookupMap::new(b"r"),
            deposit_ids: LookupMap::new(b"i"),
            custody: LookupMap::new(b"c"),
        }
    }

    /// Appends `deposit` to its recipient's list and takes its amount into
    /// custody. Returns the position in the recipient's list.
    pub fn record(&mut self, deposit: TimeLockDeposit) -> u64 {
        let id = self.deposits.len();
        let recipient = deposit.recipient.clone();
        self.credit_custody(&deposit.asset, deposit.amount);
        self.deposits.push(deposit);

        let mut ledger = self.recipient_ledger(&recipient);
        let position = ledger.count;
        ledger.count = position
            .checked_add(1)
            .unwrap_or_else(|| env::panic_str("Recipient ledger is full"));
        self.deposit_ids.insert((recipient.clone(), position), id);
        self.recipients.insert(recipient, ledger);
        position as u64
    }

    /// Writes every cached change to storage, so `env::storage_usage` reflects it.
    pub fn flush(&mut self) {
        self.deposits.flush();
        self.recipients.flush();
        self.deposit_ids.flush();
        self.custody.flush();
    }

    pub fn deposit_count(&self, recipient: &AccountId) -> u64 {
        self.recipient_ledger(recipient).count as u64
    }

    pub fn get(&self, recipient: &AccountId, index: u64) -> Option<&TimeLockDeposit> {
        let id = self.id_at(recipient, u32::try_from(index).ok()?)?;
        self.deposits.get(id)
    }

    pub fn deposits_of(
        &self,
        recipient: &AccountId,
        from_index: Option<u64>,
        limit: Option<u64>,
    ) -> Vec<TimeLockDeposit> {
        let from = from_index.unwrap_or(0);
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).min(MAX_PAGE_LIMIT);
        (from..self.deposit_count(recipient))
            .take(limit as usize)
            .filter_map(|index| self.get(recipient, index).cloned())
            .collect()
    }

    /// Matured, unsettled deposits of `recipient` at `now`, at most
    /// `MAX_CLAIM_DEPOSITS` of them, grouped per asset in the order each asset
    /// is first met. Nothing is modified.
    pub fn claimable(&self, recipient: &AccountId, now: Timestamp) -> Vec<ClaimBatch> {
        let ledger = self.recipient_ledger(recipient);

        let mut batches: Vec<ClaimBatch> = Vec::new();
        let mut taken = 0;
        for position in ledger.first_unsettled..ledger.count {
            if taken == MAX_CLAIM_DEPOSITS {
                break;
            }
            let Some(deposit) = self
                .id_at(recipient, position)
                .and_then(|id| self.deposits.get(id))
            else {
                continue;
            };
            if deposit.settled || !is_matured(deposit.matures_at.0, now) {
                continue;
            }

            taken += 1;
            let index = position as u64;
            match batches.iter_mut().find(|batch| batch.asset == deposit.asset) {
                Some(batch) => {
                    batch.amount = U128(checked_sum(batch.amount.0, deposit.amount.0));
                    batch.deposit_indices.push(index);
                }
                None => batches.push(ClaimBatch {
                    asset: deposit.asset.clone(),
                    amount: deposit.amount,
                    deposit_indices: vec![index],
                }),
            }
        }
        batches
    }

    /// Marks every claimable deposit of `recipient` settled and releases its
    /// amount from custody. The returned batches are what has to be paid out.
    pub fn settle_matured(&mut self, recipient: &AccountId, now: Timestamp) -> Vec<ClaimBatch> {
        let batches = self.claimable(recipient, now);
        for batch in &batches {
            self.set_settled(recipient, &batch.deposit_indices, true);
            self.debit_custody(&batch.asset, batch.amount);
        }
        if !batches.is_empty() {
            self.advance_cursor(recipient);
        }
        batches
    }

    /// Undoes the settlement of a batch whose payout did not go through.
    pub fn revert(&mut self, recipient: &AccountId, batch: &ClaimBatch) {
        self.set_settled(recipient, &batch.deposit_indices, false);
        self.credit_custody(&batch.asset, batch.amount);

        if let Some(lowest) = batch.deposit_indices.iter().min() {
            if let Some(ledger) = self.recipients.get_mut(recipient) {
                let lowest = u32::try_from(*lowest).unwrap_or(u32::MAX);
                ledger.first_unsettled = ledger.first_unsettled.min(lowest);
            }
        }
    }

    fn recipient_ledger(&self, recipient: &AccountId) -> RecipientLedger {
        self.recipients.get(recipient).copied().unwrap_or_default()
    }

    fn id_at(&self, recipient: &AccountId, position: u32) -> Option<u32> {
        self.deposit_ids
            .get(&(recipient.clone(), position))
            .copied()
    }

    fn set_settled(&mut self, recipient: &AccountId, indices: &[u64], settled: bool) {
        for index in indices {
            let Some(id) = u32::try_from(*index)
                .ok()
                .and_then(|position| self.id_at(recipient, position))
            else {
                continue;
            };
            if let Some(deposit) = self.deposits.get_mut(id) {
                deposit.settled = settled;
            }
        }
    }

    fn advance_cursor(&mut self, recipient: &AccountId) {
        let ledger = self.recipient_ledger(recipient);
        let mut cursor = ledger.first_unsettled;
        while cursor < ledger.count {
            match self
                .id_at(recipient, cursor)
                .and_then(|id| self.deposits.get(id))
            {
                Some(deposit) if deposit.settled => cursor += 1,
                _ => break,
            }
        }
        if let Some(ledger) = self.recipients.get_mut(recipient) {
            ledger.first_unsettled = cursor;
        }
    }
}

impl Default for EscrowLedger {
    fn default() -> Self {
        Self::new()
    }
}

pub trait HasCustody {
    fn custody_of(&self, asset: &Asset) -> U128;
    fn credit_custody(&mut self, asset: &Asset, amount: U128);
    fn debit_custody(&mut self, asset: &Asset, amount: U128);
}

impl HasCustody for EscrowLedger {
    fn custody_of(&self, asset: &Asset) -> U128 {
        self.custody.get(asset).cloned().unwrap_or(U128(0))
    }

    fn credit_custody(&mut self, asset: &Asset, amount: U128) {
        let current = self.custody_of(asset).0;
        self.custody
            .insert(asset.clone(), U128(checked_sum(current, amount.0)));
    }

    fn debit_custody(&mut self, asset: &Asset, amount: U128) {
        let current = self.custody_of(asset).0;
        let remaining = current
            .checked_sub(amount.0)
            .unwrap_or_else(|| env::panic_str("Custody underflow"));
        self.custody.insert(asset.clone(), U128(remaining));
    }
}

fn checked_sum(a: u128, b: u128) -> u128 {
    a.checked_add(b)
        .unwrap_or_else(|| env::panic_str("Custody overflow"))
}
