use near_sdk::json_types::{U128, U64};
use near_sdk::{near, AccountId};

use crate::asset::Asset;

// One time-locked deposit. Only `settled` ever changes after creation.
#[near(serializers = [json, borsh])]
#[derive(Clone, Debug, PartialEq)]
pub struct TimeLockDeposit {
    pub depositor: AccountId,
    pub recipient: AccountId,
    pub asset: Asset,
    pub amount: U128,
    pub created_at: U64,
    pub matures_at: U64, // nanoseconds
    pub settled: bool,
}

/// Everything a single claim pays out in one asset.
#[near(serializers = [json, borsh])]
#[derive(Clone, Debug, PartialEq)]
pub struct ClaimBatch {
    pub asset: Asset,
    pub amount: U128,
    /// Positions in the recipient's deposit list that this payout settles.
    pub deposit_indices: Vec<u64>,
}

// Message for ft_on_transfer to deposit tokens sent with ft_transfer_call
#[near(serializers = [json])]
pub struct FtOnTransferMsg {
    pub recipient: AccountId,
    pub delay_seconds: u64,
}
