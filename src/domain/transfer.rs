use super::money::Amount;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// Banks offered by the bank-transfer form.
pub const KNOWN_BANKS: [&str; 10] = [
    "Bank of Kigali",
    "I&M Bank",
    "Equity Bank",
    "Access Bank",
    "BPR Bank",
    "Ecobank",
    "KCB Bank",
    "NCBA Bank",
    "GT Bank",
    "Cogebanque",
];

pub const PIN_MIN_LEN: usize = 4;
pub const PIN_MAX_LEN: usize = 6;

/// Money-movement rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    /// In-app wallet, addressed by phone.
    #[default]
    Wallet,
    MobileMoney,
    BankTransfer,
}

impl Channel {
    pub fn label(&self) -> &'static str {
        match self {
            Channel::Wallet => "BluePay",
            Channel::MobileMoney => "Mobile Money",
            Channel::BankTransfer => "Bank Transfer",
        }
    }

    /// Whether the destination is a phone number (as opposed to a bank account).
    pub fn uses_phone(&self) -> bool {
        !matches!(self, Channel::BankTransfer)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where the money goes. The shape follows the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Destination {
    Phone {
        phone: String,
    },
    BankAccount {
        bank_name: String,
        account_number: String,
    },
}

impl Destination {
    pub fn matches(&self, channel: Channel) -> bool {
        match self {
            Destination::Phone { .. } => channel.uses_phone(),
            Destination::BankAccount { .. } => !channel.uses_phone(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Phone { phone } => f.write_str(phone),
            Destination::BankAccount {
                bank_name,
                account_number,
            } => write!(f, "{bank_name} - {account_number}"),
        }
    }
}

/// Transaction PIN. Zeroed on drop and never printed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Pin(Zeroizing<String>);

impl Pin {
    /// Keeps digits only and at most six of them. Anything else is dropped
    /// silently rather than rejected.
    pub fn sanitize(input: &str) -> Self {
        let digits: String = input
            .chars()
            .filter(char::is_ascii_digit)
            .take(PIN_MAX_LEN)
            .collect();
        Self(Zeroizing::new(digits))
    }

    pub fn is_complete(&self) -> bool {
        self.0.len() >= PIN_MIN_LEN
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Raw digits, for the request body only.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pin({} digits)", self.0.len())
    }
}

/// One validated submission attempt. Built fresh from the form each time and
/// dropped (PIN zeroed) once the gateway has answered.
#[derive(Debug, Clone, PartialEq)]
pub struct SendMoneyRequest {
    pub channel: Channel,
    pub destination: Destination,
    pub amount: Amount,
    pub note: Option<String>,
    pub pin: Pin,
}

/// Shown on the success screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferReceipt {
    pub transaction_reference: String,
    pub channel: Channel,
    pub amount: Amount,
    pub destination: Destination,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferFailure {
    /// Machine-usable, e.g. `INSUFFICIENT_FUNDS` or `SUBMISSION_FAILED`.
    pub reason_code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum SendMoneyResult {
    Success(TransferReceipt),
    Failure(TransferFailure),
}

impl SendMoneyResult {
    pub fn is_success(&self) -> bool {
        matches!(self, SendMoneyResult::Success(_))
    }

    pub fn transaction_reference(&self) -> Option<&str> {
        match self {
            SendMoneyResult::Success(receipt) => Some(&receipt.transaction_reference),
            SendMoneyResult::Failure(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_sanitize_strips_and_truncates() {
        assert_eq!(Pin::sanitize("12a3-4").expose(), "1234");
        assert_eq!(Pin::sanitize("123456789").expose(), "123456");
        assert!(Pin::sanitize("abc").is_empty());
    }

    #[test]
    fn test_pin_completeness() {
        assert!(!Pin::sanitize("123").is_complete());
        assert!(Pin::sanitize("1234").is_complete());
        assert!(Pin::sanitize("123456").is_complete());
    }

    #[test]
    fn test_pin_debug_is_redacted() {
        let pin = Pin::sanitize("9876");
        assert_eq!(format!("{pin:?}"), "Pin(4 digits)");
    }

    #[test]
    fn test_destination_matches_channel() {
        let phone = Destination::Phone {
            phone: "+250788000000".into(),
        };
        let bank = Destination::BankAccount {
            bank_name: "KCB Bank".into(),
            account_number: "123".into(),
        };
        assert!(phone.matches(Channel::Wallet));
        assert!(phone.matches(Channel::MobileMoney));
        assert!(!phone.matches(Channel::BankTransfer));
        assert!(bank.matches(Channel::BankTransfer));
        assert!(!bank.matches(Channel::Wallet));
    }

    #[test]
    fn test_channel_serde_names() {
        assert_eq!(
            serde_json::to_string(&Channel::MobileMoney).unwrap(),
            "\"mobile-money\""
        );
        let parsed: Channel = serde_json::from_str("\"bank-transfer\"").unwrap();
        assert_eq!(parsed, Channel::BankTransfer);
    }
}
