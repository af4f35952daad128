use near_sdk::json_types::U128;
use near_sdk::{env, ext_contract, near, require, AccountId, Gas, NearToken, Promise};

use crate::errors::TimeLockError;

pub const GAS_FOR_FT_TRANSFER: Gas = Gas::from_tgas(10);
pub const GAS_FOR_FT_TRANSFER_FROM: Gas = Gas::from_tgas(20);
const ONE_YOCTO: NearToken = NearToken::from_yoctonear(1);

const DEPOSIT_MEMO: &str = "TimeLock deposit";
const CLAIM_MEMO: &str = "TimeLock claim";

// NEP-141 token, plus the allowance-based pull used for deposits
#[ext_contract(ext_fungible_token)]
pub trait FungibleToken {
    fn ft_transfer(&mut self, receiver_id: AccountId, amount: U128, memo: Option<String>);
    fn ft_transfer_from(
        &mut self,
        owner_id: AccountId,
        new_owner_id: AccountId,
        amount: U128,
        memo: Option<String>,
    );
}

// Native NEAR or a NEP-141 token contract
#[near(serializers = [json, borsh])]
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Asset {
    Native,
    Ft(AccountId),
}

/// How an incoming deposit reaches custody.
pub enum Inbound {
    /// Already held by the contract (attached to the call).
    Received,
    /// Still to be pulled; the deposit must only be recorded once this resolves.
    Pending(Promise),
}

impl Asset {
    /// Moves `amount` from `owner` into the contract's custody.
    ///
    /// Native value has to be attached to the call in full. Tokens are pulled
    /// through the owner's allowance, and no native value may ride along.
    pub fn collect(&self, owner: &AccountId, amount: u128, attached: NearToken) -> Inbound {
        match self {
            Asset::Native => {
                require!(
                    attached.as_yoctonear() == amount,
                    TimeLockError::ValueMismatch.message()
                );
                Inbound::Received
            }
            Asset::Ft(token_id) => {
                require!(
                    attached.as_yoctonear() == 0,
                    TimeLockError::ValueMismatch.message()
                );
                let pull = ext_fungible_token::ext(token_id.clone())
                    .with_attached_deposit(ONE_YOCTO)
                    .with_static_gas(GAS_FOR_FT_TRANSFER_FROM)
                    .with_unused_gas_weight(0)
                    .ft_transfer_from(
                        owner.clone(),
                        env::current_account_id(),
                        U128(amount),
                        Some(DEPOSIT_MEMO.to_string()),
                    );
                Inbound::Pending(pull)
            }
        }
    }

    /// Pays `amount` out of custody to `receiver`.
    pub fn send(&self, receiver: AccountId, amount: u128) -> Promise {
        match self {
            Asset::Native => Promise::new(receiver).transfer(NearToken::from_yoctonear(amount)),
            Asset::Ft(token_id) => ext_fungible_token::ext(token_id.clone())
                .with_attached_deposit(ONE_YOCTO)
                .with_static_gas(GAS_FOR_FT_TRANSFER)
                .with_unused_gas_weight(0)
                .ft_transfer(receiver, U128(amount), Some(CLAIM_MEMO.to_string())),
        }
    }
}

impl Asset {
    /// Gas a payout of this asset is sent with.
    pub fn payout_gas(&self) -> Gas {
        match self {
            Asset::Native => Gas::from_gas(0),
            Asset::Ft(_) => GAS_FOR_FT_TRANSFER,
        }
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Asset::Native => f.write_str("native"),
            Asset::Ft(token_id) => write!(f, "{}", token_id),
        }
    }
}
