use near_sdk::env;

/// Every way a time-lock call can be rejected. A rejection panics, which makes
/// the host roll back the whole receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeLockError {
    Unauthorized,
    AssetNotEnabled,
    ValueMismatch,
    InvalidAmount,
    InvalidDelay,
    TransferFailed,
    IndexOutOfRange,
    InvalidMessage,
    InsufficientStorage,
    NotEnoughGas,
}

impl TimeLockError {
    pub const fn message(self) -> &'static str {
        match self {
            Self::Unauthorized => "Unauthorized: only the owner can call this method",
            Self::AssetNotEnabled => "AssetNotEnabled: this token is not enabled for deposits",
            Self::ValueMismatch => {
                "ValueMismatch: attached deposit does not match the deposited native amount"
            }
            Self::InvalidAmount => "InvalidAmount: deposit amount must be positive",
            Self::InvalidDelay => "InvalidDelay: delay overflows the block timestamp",
            Self::TransferFailed => "TransferFailed: token transfer was rejected",
            Self::IndexOutOfRange => "IndexOutOfRange: no deposit at this index",
            Self::InvalidMessage => "InvalidMessage: cannot parse ft_on_transfer message",
            Self::InsufficientStorage => {
                "InsufficientStorage: storage balance does not cover the new record"
            }
            Self::NotEnoughGas => "NotEnoughGas: attach more gas to pay out and settle",
        }
    }

    pub fn panic(self) -> ! {
        env::panic_str(self.message())
    }
}

impl AsRef<str> for TimeLockError {
    fn as_ref(&self) -> &str {
        self.message()
    }
}
