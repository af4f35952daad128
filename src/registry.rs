use near_sdk::{near, store::IterableSet, AccountId};

use crate::asset::Asset;

/// Token contracts accepted for deposits. Native NEAR is always accepted and
/// tokens are never removed once enabled.
#[near(serializers = [borsh])]
pub struct TokenRegistry {
    pub tokens: IterableSet<AccountId>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self {
            tokens: IterableSet::new(b"t"),
        }
    }

    /// Returns `false` when the token was already enabled.
    pub fn enable(&mut self, token_id: AccountId) -> bool {
        self.tokens.insert(token_id)
    }

    pub fn is_enabled(&self, asset: &Asset) -> bool {
        match asset {
            Asset::Native => true,
            Asset::Ft(token_id) => self.tokens.contains(token_id),
        }
    }

    pub fn enabled_tokens(&self) -> Vec<AccountId> {
        self.tokens.iter().cloned().collect()
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use near_sdk::test_utils::VMContextBuilder;
    use near_sdk::testing_env;

    fn token(name: &str) -> AccountId {
        name.parse().unwrap()
    }

    #[test]
    fn native_is_always_enabled() {
        testing_env!(VMContextBuilder::new().build());
        let registry = TokenRegistry::new();
        assert!(registry.is_enabled(&Asset::Native));
        assert!(registry.enabled_tokens().is_empty());
    }

    #[test]
    fn enabling_is_idempotent() {
        testing_env!(VMContextBuilder::new().build());
        let mut registry = TokenRegistry::new();
        assert!(!registry.is_enabled(&Asset::Ft(token("usdc.near"))));

        assert!(registry.enable(token("usdc.near")));
        assert!(!registry.enable(token("usdc.near")));

        assert!(registry.is_enabled(&Asset::Ft(token("usdc.near"))));
        assert!(!registry.is_enabled(&Asset::Ft(token("dai.near"))));
        assert_eq!(registry.enabled_tokens(), vec![token("usdc.near")]);
    }
}
