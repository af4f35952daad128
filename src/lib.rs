use near_sdk::json_types::{U128, U64};
use near_sdk::{
    assert_one_yocto, env, ext_contract, log, near, require, serde_json, AccountId, Gas,
    NearToken, Promise, PromiseError, PromiseOrValue,
};

mod asset;
mod errors;
mod escrow;
mod ledger;
mod registry;
mod storage;
mod timelocks;
mod utils;

pub use asset::Asset;
pub use errors::TimeLockError;
pub use escrow::{ClaimBatch, FtOnTransferMsg, TimeLockDeposit};
pub use storage::{StorageBalance, StorageBalanceBounds};

use asset::{Inbound, GAS_FOR_FT_TRANSFER_FROM};
use ledger::{EscrowLedger, HasCustody};
use registry::TokenRegistry;
use storage::{storage_cost, StorageManager, DEPOSIT_STORAGE_RESERVE};
use timelocks::Timelock;
use utils::log_timelock_event;

// Callbacks get at least this much, plus whatever gas the caller attached beyond it
const GAS_FOR_PULL_CALLBACK: Gas = Gas::from_tgas(20);
const GAS_FOR_CLAIM_CALLBACK: Gas = Gas::from_tgas(30);
// Kept for the calling method's own work
const GAS_FOR_CALL: Gas = Gas::from_tgas(20);

// Payouts return nothing. A longer result is still a successful transfer.
const MAX_PAYOUT_RESULT_LEN: usize = 64;

#[ext_contract(ext_self)]
pub trait SelfCallbacks {
    fn on_tokens_pulled(
        &mut self,
        depositor: AccountId,
        recipient: AccountId,
        asset: Asset,
        amount: U128,
        created_at: U64,
        matures_at: U64,
        reserved: U128,
    ) -> PromiseOrValue<u64>;
    fn abort_failed_pull(&self);
    fn on_claim_settled(&mut self, recipient: AccountId, batches: Vec<ClaimBatch>)
        -> Vec<ClaimBatch>;
}

// Define the contract structure
#[near(contract_state)]
pub struct Contract {
    pub owner_id: AccountId,
    pub registry: TokenRegistry,
    // Every deposit ever made, grouped per recipient, plus the custody totals
    pub ledger: EscrowLedger,
    // Prepaid storage of depositors
    pub storage: StorageManager,
}

// Without an explicit init the deploying account becomes the owner
impl Default for Contract {
    fn default() -> Self {
        Self {
            owner_id: env::predecessor_account_id(),
            registry: TokenRegistry::new(),
            ledger: EscrowLedger::new(),
            storage: StorageManager::new(),
        }
    }
}

#[near]
impl Contract {
    #[init]
    pub fn new(owner_id: AccountId) -> Self {
        Self {
            owner_id,
            registry: TokenRegistry::new(),
            ledger: EscrowLedger::new(),
            storage: StorageManager::new(),
        }
    }

    // --- OWNER ---

    /// Accepts deposits of `token_id`. Returns `false` if it was already enabled.
    pub fn enable_token(&mut self, token_id: AccountId) -> bool {
        self.assert_owner();
        let added = self.registry.enable(token_id.clone());
        if added {
            log_timelock_event("TOKEN_ENABLED", &[("token", token_id.to_string())]);
        }
        added
    }

    pub fn transfer_ownership(&mut self, new_owner_id: AccountId) {
        self.assert_owner();
        log_timelock_event(
            "OWNERSHIP_TRANSFERRED",
            &[
                ("from", self.owner_id.to_string()),
                ("to", new_owner_id.to_string()),
            ],
        );
        self.owner_id = new_owner_id;
    }

    // --- STORAGE ---

    /// Adds the attached value to the storage balance of `account_id`, the
    /// caller by default. Every deposit record is paid from the depositor's
    /// balance.
    #[payable]
    pub fn storage_deposit(&mut self, account_id: Option<AccountId>) -> StorageBalance {
        let account_id = account_id.unwrap_or_else(env::predecessor_account_id);
        let amount = env::attached_deposit().as_yoctonear();
        let balance = self.storage.deposit(&account_id, amount);
        log_timelock_event(
            "STORAGE_DEPOSITED",
            &[
                ("account", account_id.to_string()),
                ("amount", amount.to_string()),
            ],
        );
        balance
    }

    /// Sends back `amount` of the caller's unlocked storage balance, all of it
    /// by default.
    #[payable]
    pub fn storage_withdraw(&mut self, amount: Option<U128>) -> StorageBalance {
        assert_one_yocto();
        let account_id = env::predecessor_account_id();
        let amount = match amount {
            Some(amount) => amount.0,
            None => self
                .storage
                .balance_of(&account_id)
                .map(|balance| balance.available.0)
                .unwrap_or(0),
        };
        let balance = self.storage.withdraw(&account_id, amount);
        if amount > 0 {
            Promise::new(account_id.clone()).transfer(NearToken::from_yoctonear(amount));
        }
        log_timelock_event(
            "STORAGE_WITHDRAWN",
            &[
                ("account", account_id.to_string()),
                ("amount", amount.to_string()),
            ],
        );
        balance
    }

    pub fn storage_balance_of(&self, account_id: AccountId) -> Option<StorageBalance> {
        self.storage.balance_of(&account_id)
    }

    pub fn storage_balance_bounds(&self) -> StorageBalanceBounds {
        StorageManager::bounds()
    }

    // --- DEPOSITS ---

    /// Locks `amount` of `asset` for `recipient` until `delay_seconds` from now.
    ///
    /// Native NEAR must be attached in exactly `amount`. Tokens are pulled from
    /// the caller with `ft_transfer_from`, so the caller has to approve this
    /// contract first and attach nothing. The record is paid from the caller's
    /// storage balance. Resolves to the deposit's index in the recipient's list.
    #[payable]
    pub fn deposit(
        &mut self,
        recipient: AccountId,
        asset: Asset,
        amount: U128,
        delay_seconds: u64,
    ) -> PromiseOrValue<u64> {
        require!(
            self.registry.is_enabled(&asset),
            TimeLockError::AssetNotEnabled.message()
        );
        require!(amount.0 > 0, TimeLockError::InvalidAmount.message());

        let depositor = env::predecessor_account_id();
        let created_at = env::block_timestamp();
        let matures_at = maturity(created_at, delay_seconds);

        match asset.collect(&depositor, amount.0, env::attached_deposit()) {
            Inbound::Received => PromiseOrValue::Value(self.record_deposit(
                depositor, recipient, asset, amount, created_at, matures_at, 0,
            )),
            Inbound::Pending(pull) => {
                require!(
                    env::prepaid_gas()
                        >= GAS_FOR_CALL
                            .saturating_add(GAS_FOR_FT_TRANSFER_FROM)
                            .saturating_add(GAS_FOR_PULL_CALLBACK),
                    TimeLockError::NotEnoughGas.message()
                );
                // Held until the pull resolves, so the callback never runs short
                let reserved = storage_cost(DEPOSIT_STORAGE_RESERVE);
                self.storage.charge(&depositor, reserved);

                PromiseOrValue::Promise(
                    pull.then(
                        ext_self::ext(env::current_account_id())
                            .with_static_gas(GAS_FOR_PULL_CALLBACK)
                            .with_unused_gas_weight(1)
                            .on_tokens_pulled(
                                depositor,
                                recipient,
                                asset,
                                amount,
                                U64(created_at),
                                U64(matures_at),
                                U128(reserved),
                            ),
                    ),
                )
            }
        }
    }

    /// NEP-141 receiver: deposits tokens sent with `ft_transfer_call`.
    ///
    /// `msg` is a JSON `FtOnTransferMsg`. The record is paid from the sender's
    /// storage balance. Panicking here makes the token contract refund the
    /// sender in full.
    pub fn ft_on_transfer(
        &mut self,
        sender_id: AccountId,
        amount: U128,
        msg: String,
    ) -> PromiseOrValue<U128> {
        let asset = Asset::Ft(env::predecessor_account_id());
        require!(
            self.registry.is_enabled(&asset),
            TimeLockError::AssetNotEnabled.message()
        );
        require!(amount.0 > 0, TimeLockError::InvalidAmount.message());

        let params: FtOnTransferMsg =
            serde_json::from_str(&msg).unwrap_or_else(|_| TimeLockError::InvalidMessage.panic());

        let created_at = env::block_timestamp();
        let matures_at = maturity(created_at, params.delay_seconds);
        self.record_deposit(
            sender_id,
            params.recipient,
            asset,
            amount,
            created_at,
            matures_at,
            0,
        );

        PromiseOrValue::Value(U128(0))
    }

    // --- CLAIMS ---

    /// Pays the caller the deposits that have matured, one transfer per asset.
    /// At most `MAX_CLAIM_DEPOSITS` are settled per call; the rest wait for the
    /// next claim. Does nothing when no deposit is claimable.
    pub fn claim(&mut self) -> PromiseOrValue<Vec<ClaimBatch>> {
        let recipient = env::predecessor_account_id();
        let batches = self
            .ledger
            .settle_matured(&recipient, env::block_timestamp());

        let Some(payouts) = batches
            .iter()
            .map(|batch| batch.asset.send(recipient.clone(), batch.amount.0))
            .reduce(Promise::and)
        else {
            log!("Nothing to claim for {}", recipient);
            return PromiseOrValue::Value(Vec::new());
        };

        let required = batches
            .iter()
            .fold(GAS_FOR_CALL.saturating_add(GAS_FOR_CLAIM_CALLBACK), |gas, batch| {
                gas.saturating_add(batch.asset.payout_gas())
            });
        require!(
            env::prepaid_gas() >= required,
            TimeLockError::NotEnoughGas.message()
        );

        PromiseOrValue::Promise(
            payouts.then(
                ext_self::ext(env::current_account_id())
                    .with_static_gas(GAS_FOR_CLAIM_CALLBACK)
                    .with_unused_gas_weight(1)
                    .on_claim_settled(recipient, batches),
            ),
        )
    }

    // --- VIEWS ---

    pub fn claimable_info(&self, recipient: AccountId, index: u64) -> TimeLockDeposit {
        self.ledger
            .get(&recipient, index)
            .cloned()
            .unwrap_or_else(|| TimeLockError::IndexOutOfRange.panic())
    }

    pub fn get_deposit_count(&self, recipient: AccountId) -> u64 {
        self.ledger.deposit_count(&recipient)
    }

    /// A page of `recipient`'s deposits. `limit` is capped at `MAX_PAGE_LIMIT`.
    pub fn get_deposits(
        &self,
        recipient: AccountId,
        from_index: Option<u64>,
        limit: Option<u64>,
    ) -> Vec<TimeLockDeposit> {
        self.ledger.deposits_of(&recipient, from_index, limit)
    }

    /// What `claim` would pay `recipient` at the current block.
    pub fn get_claimable(&self, recipient: AccountId) -> Vec<ClaimBatch> {
        self.ledger.claimable(&recipient, env::block_timestamp())
    }

    pub fn get_custody(&self, asset: Asset) -> U128 {
        self.ledger.custody_of(&asset)
    }

    pub fn is_enabled(&self, asset: Asset) -> bool {
        self.registry.is_enabled(&asset)
    }

    pub fn get_enabled_tokens(&self) -> Vec<AccountId> {
        self.registry.enabled_tokens()
    }

    pub fn get_owner(&self) -> AccountId {
        self.owner_id.clone()
    }

    // --- PRIVATE CALLBACKS ---

    /// Records a token deposit once its pull succeeded. On failure the storage
    /// reservation is handed back and the call resolves through
    /// `abort_failed_pull`, so the deposit still fails with `TransferFailed`.
    #[private]
    pub fn on_tokens_pulled(
        &mut self,
        #[callback_result] result: Result<(), PromiseError>,
        depositor: AccountId,
        recipient: AccountId,
        asset: Asset,
        amount: U128,
        created_at: U64,
        matures_at: U64,
        reserved: U128,
    ) -> PromiseOrValue<u64> {
        if result.is_err() {
            log!("Token pull from {} failed; deposit aborted.", depositor);
            self.storage.release(&depositor, reserved.0);
            return PromiseOrValue::Promise(
                ext_self::ext(env::current_account_id()).abort_failed_pull(),
            );
        }
        PromiseOrValue::Value(self.record_deposit(
            depositor,
            recipient,
            asset,
            amount,
            created_at.0,
            matures_at.0,
            reserved.0,
        ))
    }

    #[private]
    pub fn abort_failed_pull(&self) {
        TimeLockError::TransferFailed.panic()
    }

    #[private]
    pub fn on_claim_settled(
        &mut self,
        recipient: AccountId,
        batches: Vec<ClaimBatch>,
    ) -> Vec<ClaimBatch> {
        let outcomes: Vec<bool> = (0..batches.len() as u64)
            .map(|i| {
                !matches!(
                    env::promise_result_checked(i, MAX_PAYOUT_RESULT_LEN),
                    Err(PromiseError::Failed)
                )
            })
            .collect();
        self.finish_claim(&recipient, batches, &outcomes)
    }
}

impl Contract {
    fn assert_owner(&self) {
        require!(
            env::predecessor_account_id() == self.owner_id,
            TimeLockError::Unauthorized.message()
        );
    }

    /// Stores the deposit and charges its storage to the depositor. `reserved`
    /// is what was already held back from the depositor's balance for it.
    #[allow(clippy::too_many_arguments)]
    fn record_deposit(
        &mut self,
        depositor: AccountId,
        recipient: AccountId,
        asset: Asset,
        amount: U128,
        created_at: u64,
        matures_at: u64,
        reserved: u128,
    ) -> u64 {
        let deposit = TimeLockDeposit {
            depositor: depositor.clone(),
            recipient: recipient.clone(),
            asset: asset.clone(),
            amount,
            created_at: U64(created_at),
            matures_at: U64(matures_at),
            settled: false,
        };

        self.ledger.flush();
        let usage_before = env::storage_usage();
        let index = self.ledger.record(deposit);
        self.ledger.flush();
        let cost = storage_cost(env::storage_usage().saturating_sub(usage_before));
        if cost > reserved {
            self.storage.charge(&depositor, cost - reserved);
        } else {
            self.storage.release(&depositor, reserved - cost);
        }

        log_timelock_event(
            "DEPOSITED",
            &[
                ("depositor", depositor.to_string()),
                ("recipient", recipient.to_string()),
                ("asset", asset.to_string()),
                ("amount", amount.0.to_string()),
                ("matures_at", matures_at.to_string()),
                ("index", index.to_string()),
            ],
        );
        index
    }

    /// Keeps the batches whose payout succeeded and puts the others back into
    /// custody, unsettled, so they can be claimed again.
    fn finish_claim(
        &mut self,
        recipient: &AccountId,
        batches: Vec<ClaimBatch>,
        outcomes: &[bool],
    ) -> Vec<ClaimBatch> {
        let mut paid = Vec::with_capacity(batches.len());
        for (i, batch) in batches.into_iter().enumerate() {
            let fields = [
                ("recipient", recipient.to_string()),
                ("asset", batch.asset.to_string()),
                ("amount", batch.amount.0.to_string()),
                ("deposits", batch.deposit_indices.len().to_string()),
            ];
            if outcomes.get(i).copied().unwrap_or(false) {
                log_timelock_event("CLAIMED", &fields);
                paid.push(batch);
            } else {
                self.ledger.revert(recipient, &batch);
                log_timelock_event("CLAIM_FAILED", &fields);
            }
        }
        paid
    }
}

fn maturity(created_at: u64, delay_seconds: u64) -> u64 {
    Timelock::new(created_at, delay_seconds)
        .matures_at()
        .unwrap_or_else(|| TimeLockError::InvalidDelay.panic())
}
