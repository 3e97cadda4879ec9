use crate::domain::money::Amount;
use crate::domain::transfer::{Channel, Destination, Pin, SendMoneyRequest};
use crate::error::ValidationError;

/// Editable fields of the send-money form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Phone,
    BankName,
    AccountNumber,
    Amount,
    Note,
    Pin,
}

impl Field {
    /// Whether the field exists for `channel`. Phone and bank fields are
    /// mutually exclusive.
    pub fn applies_to(&self, channel: Channel) -> bool {
        match self {
            Field::Phone => channel.uses_phone(),
            Field::BankName | Field::AccountNumber => !channel.uses_phone(),
            Field::Amount | Field::Note | Field::Pin => true,
        }
    }
}

/// Raw form state, exactly as typed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    channel: Channel,
    phone: String,
    bank_name: String,
    account_number: String,
    amount: String,
    note: String,
    pin: Pin,
}

impl Draft {
    /// Creates a new empty draft for `channel`.
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            ..Default::default()
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn bank_name(&self) -> &str {
        &self.bank_name
    }

    pub fn account_number(&self) -> &str {
        &self.account_number
    }

    pub fn amount(&self) -> &str {
        &self.amount
    }

    pub fn note(&self) -> &str {
        &self.note
    }

    pub fn pin(&self) -> &Pin {
        &self.pin
    }

    /// Switches rail. Destination fields are dropped; amount, note and PIN stay.
    pub fn switch_channel(&mut self, channel: Channel) {
        if channel == self.channel {
            return;
        }
        self.channel = channel;
        self.phone.clear();
        self.bank_name.clear();
        self.account_number.clear();
    }

    /// Caller checks `Field::applies_to` first.
    pub fn set(&mut self, field: Field, value: &str) {
        match field {
            Field::Phone => self.phone = value.to_string(),
            Field::BankName => self.bank_name = value.to_string(),
            Field::AccountNumber => self.account_number = value.to_string(),
            Field::Amount => self.amount = value.to_string(),
            Field::Note => self.note = value.to_string(),
            Field::Pin => self.pin = Pin::sanitize(value),
        }
    }

    pub fn clear_pin(&mut self) {
        self.pin = Pin::default();
    }

    /// Builds a request, checking amount, then PIN, then destination.
    pub fn validate(&self) -> Result<SendMoneyRequest, ValidationError> {
        let amount = Amount::parse(&self.amount)?;

        if !self.pin.is_complete() {
            return Err(ValidationError::MissingPin);
        }

        let destination = if self.channel.uses_phone() {
            let phone = self.phone.trim();
            if phone.is_empty() {
                return Err(ValidationError::MissingPhone);
            }
            Destination::Phone {
                phone: phone.to_string(),
            }
        } else {
            let bank_name = self.bank_name.trim();
            let account_number = self.account_number.trim();
            if bank_name.is_empty() || account_number.is_empty() {
                return Err(ValidationError::MissingBankDetails);
            }
            Destination::BankAccount {
                bank_name: bank_name.to_string(),
                account_number: account_number.to_string(),
            }
        };

        let note = Some(self.note.trim())
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        Ok(SendMoneyRequest {
            channel: self.channel,
            destination,
            amount,
            note,
            pin: self.pin.clone(),
        })
    }
}
