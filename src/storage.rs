use near_sdk::json_types::U128;
use near_sdk::store::LookupMap;
use near_sdk::{env, near, AccountId, StorageUsage};

use crate::errors::TimeLockError;

/// Bytes an account's own balance entry takes, locked on registration.
pub const ACCOUNT_STORAGE_BYTES: StorageUsage = 200;

/// Bytes held back while a token pull is in flight. Account ids are at most
/// 64 bytes, so one record with its index entry always fits.
pub const DEPOSIT_STORAGE_RESERVE: StorageUsage = 1_000;

/// NEP-145 view of an account's storage balance. `total - available` is
/// locked by records the account has paid for.
#[near(serializers = [json, borsh])]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageBalance {
    pub total: U128,
    pub available: U128,
}

#[near(serializers = [json])]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageBalanceBounds {
    pub min: U128,
    pub max: Option<U128>,
}

pub fn storage_cost(bytes: StorageUsage) -> u128 {
    env::storage_byte_cost()
        .as_yoctonear()
        .saturating_mul(bytes as u128)
}

/// Prepaid storage per account. Depositors pay for the records they create.
#[near(serializers = [borsh])]
pub struct StorageManager {
    pub balances: LookupMap<AccountId, StorageBalance>,
}

impl StorageManager {
    pub fn new() -> Self {
        Self {
            balances: LookupMap::new(b"s"),
        }
    }

    pub fn bounds() -> StorageBalanceBounds {
        StorageBalanceBounds {
            min: U128(storage_cost(ACCOUNT_STORAGE_BYTES)),
            max: None,
        }
    }

    pub fn balance_of(&self, account_id: &AccountId) -> Option<StorageBalance> {
        self.balances.get(account_id).cloned()
    }

    /// Adds `amount` to the account's balance. A first deposit must cover the
    /// minimum, which stays locked for the balance entry itself.
    pub fn deposit(&mut self, account_id: &AccountId, amount: u128) -> StorageBalance {
        let balance = match self.balances.get(account_id) {
            Some(balance) => StorageBalance {
                total: U128(balance.total.0.saturating_add(amount)),
                available: U128(balance.available.0.saturating_add(amount)),
            },
            None => {
                let min = Self::bounds().min.0;
                if amount < min {
                    TimeLockError::InsufficientStorage.panic();
                }
                StorageBalance {
                    total: U128(amount),
                    available: U128(amount - min),
                }
            }
        };
        self.balances.insert(account_id.clone(), balance.clone());
        balance
    }

    /// Takes `amount` out of the available part. The caller sends it back.
    pub fn withdraw(&mut self, account_id: &AccountId, amount: u128) -> StorageBalance {
        let Some(balance) = self.balances.get_mut(account_id) else {
            TimeLockError::InsufficientStorage.panic();
        };
        if balance.available.0 < amount {
            TimeLockError::InsufficientStorage.panic();
        }
        balance.available = U128(balance.available.0 - amount);
        balance.total = U128(balance.total.0 - amount);
        balance.clone()
    }

    /// Locks `cost` of the account's available balance.
    pub fn charge(&mut self, account_id: &AccountId, cost: u128) {
        let Some(balance) = self.balances.get_mut(account_id) else {
            TimeLockError::InsufficientStorage.panic();
        };
        if balance.available.0 < cost {
            TimeLockError::InsufficientStorage.panic();
        }
        balance.available = U128(balance.available.0 - cost);
    }

    /// Unlocks `amount` that an earlier `charge` held back.
    pub fn release(&mut self, account_id: &AccountId, amount: u128) {
        if let Some(balance) = self.balances.get_mut(account_id) {
            balance.available = U128(balance.available.0.saturating_add(amount));
        }
    }
}

impl Default for StorageManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use near_sdk::test_utils::{accounts, VMContextBuilder};
    use near_sdk::testing_env;

    fn setup() -> StorageManager {
        testing_env!(VMContextBuilder::new().build());
        StorageManager::new()
    }

    #[test]
    fn first_deposit_locks_the_minimum() {
        let mut storage = setup();
        let min = StorageManager::bounds().min.0;

        let balance = storage.deposit(&accounts(1), min * 3);
        assert_eq!(balance.total, U128(min * 3));
        assert_eq!(balance.available, U128(min * 2));

        let balance = storage.deposit(&accounts(1), 5);
        assert_eq!(balance.available, U128(min * 2 + 5));
        assert!(storage.balance_of(&accounts(2)).is_none());
    }

    #[test]
    #[should_panic(expected = "InsufficientStorage")]
    fn first_deposit_below_minimum() {
        let mut storage = setup();
        storage.deposit(&accounts(1), StorageManager::bounds().min.0 - 1);
    }

    #[test]
    fn charge_locks_and_release_unlocks() {
        let mut storage = setup();
        let min = StorageManager::bounds().min.0;
        storage.deposit(&accounts(1), min + 100);

        storage.charge(&accounts(1), 60);
        let balance = storage.balance_of(&accounts(1)).unwrap();
        assert_eq!(balance.total, U128(min + 100));
        assert_eq!(balance.available, U128(40));

        storage.release(&accounts(1), 25);
        assert_eq!(storage.balance_of(&accounts(1)).unwrap().available, U128(65));

        let balance = storage.withdraw(&accounts(1), 65);
        assert_eq!(balance.total, U128(min + 35));
        assert_eq!(balance.available, U128(0));
    }

    #[test]
    #[should_panic(expected = "InsufficientStorage")]
    fn charge_beyond_available() {
        let mut storage = setup();
        storage.deposit(&accounts(1), StorageManager::bounds().min.0 + 10);
        storage.charge(&accounts(1), 11);
    }

    #[test]
    #[should_panic(expected = "InsufficientStorage")]
    fn charge_unregistered_account() {
        let mut storage = setup();
        storage.charge(&accounts(1), 1);
    }
}
