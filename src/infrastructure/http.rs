use crate::config::ClientConfig;
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{IssuedToken, PaymentGateway, TokenRequest, TransferConfirmation};
use crate::domain::transfer::{Channel, Destination, SendMoneyRequest};
use crate::error::{PaymentError, Result};
use crate::interfaces::json::envelope;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct ValidateBody<'a> {
    qr_data: &'a str,
    signature: &'a str,
}

#[derive(Serialize)]
struct TokenPaymentBody<'a> {
    qr_data: &'a str,
    amount: Amount,
    pin: &'a str,
    message: &'a str,
}

#[derive(Serialize)]
struct PhoneTransferBody<'a> {
    phone: &'a str,
    amount: Amount,
    pin: &'a str,
    message: &'a str,
}

#[derive(Serialize)]
struct BankTransferBody<'a> {
    bank_name: &'a str,
    account_number: &'a str,
    amount: Amount,
    pin: &'a str,
    message: &'a str,
}

#[derive(Deserialize)]
struct BalanceData {
    balance: Balance,
}

/// `PaymentGateway` over the backend's REST API.
///
/// Wraps `reqwest::Client` with the base URL and the session's bearer token.
#[derive(Clone)]
pub struct HttpGateway {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpGateway {
    /// Creates a new gateway client. Fails when `config` does not validate.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.gateway_timeout)
            .connect_timeout(config.gateway_timeout)
            .build()
            .map_err(|e| PaymentError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.gateway_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            timeout: config.gateway_timeout,
        })
    }

    /// Base URL with any trailing slash removed.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> PaymentError {
        if err.is_timeout() {
            PaymentError::Timeout(self.timeout)
        } else {
            PaymentError::from(err)
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        default_message: &str,
    ) -> Result<T> {
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        envelope::decode(status, &body, default_message)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        default_message: &str,
    ) -> Result<T> {
        tracing::debug!(path, "POST");
        self.send(self.http.post(self.url(path)).json(body), default_message)
            .await
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_token(&self, request: &TokenRequest) -> Result<IssuedToken> {
        self.post("/qr/generate", request, "Failed to generate QR code")
            .await
    }

    async fn validate_token(&self, payload: &str, signature: &str) -> Result<()> {
        let body = ValidateBody {
            qr_data: payload,
            signature,
        };
        let _: serde_json::Value = self
            .post("/qr/validate", &body, "QR validation failed")
            .await?;
        Ok(())
    }

    async fn transfer(&self, request: &SendMoneyRequest) -> Result<TransferConfirmation> {
        let message = request.note.as_deref().unwrap_or("");
        let pin = request.pin.expose();
        match (&request.channel, &request.destination) {
            (Channel::Wallet, Destination::Phone { phone }) => {
                let body = PhoneTransferBody {
                    phone,
                    amount: request.amount,
                    pin,
                    message,
                };
                self.post("/payments/bluepay", &body, "Payment failed").await
            }
            (Channel::MobileMoney, Destination::Phone { phone }) => {
                let body = PhoneTransferBody {
                    phone,
                    amount: request.amount,
                    pin,
                    message,
                };
                self.post("/payments/mobile-money", &body, "Payment failed")
                    .await
            }
            (
                Channel::BankTransfer,
                Destination::BankAccount {
                    bank_name,
                    account_number,
                },
            ) => {
                let body = BankTransferBody {
                    bank_name,
                    account_number,
                    amount: request.amount,
                    pin,
                    message,
                };
                self.post("/payments/bank-transfer", &body, "Transfer failed")
                    .await
            }
            _ => Err(PaymentError::InvalidState(
                "destination does not match channel",
            )),
        }
    }

    async fn pay_token(
        &self,
        payload: &str,
        request: &SendMoneyRequest,
    ) -> Result<TransferConfirmation> {
        let body = TokenPaymentBody {
            qr_data: payload,
            amount: request.amount,
            pin: request.pin.expose(),
            message: request.note.as_deref().unwrap_or(""),
        };
        self.post("/qr/process-payment", &body, "Payment failed").await
    }

    async fn get_balance(&self) -> Result<Balance> {
        tracing::debug!(path = "/users/balance", "GET");
        let data: BalanceData = self
            .send(self.http.get(self.url("/users/balance")), "Failed to get balance")
            .await?;
        Ok(data.balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transfer::Pin;
    use rust_decimal_macros::dec;

    fn gateway(url: &str) -> HttpGateway {
        let config = ClientConfig {
            gateway_url: url.to_string(),
            gateway_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        HttpGateway::new(&config).unwrap()
    }

    #[test]
    fn test_base_url_is_normalized() {
        assert_eq!(gateway("http://localhost:5000/api/").base_url(), "http://localhost:5000/api");
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = ClientConfig {
            gateway_url: "localhost".into(),
            ..Default::default()
        };
        assert!(matches!(HttpGateway::new(&config), Err(PaymentError::Config(_))));
    }

    #[test]
    fn test_bank_body_uses_snake_case_fields() {
        let pin = Pin::sanitize("1234");
        let body = BankTransferBody {
            bank_name: "KCB Bank",
            account_number: "123",
            amount: Amount::new(dec!(100)).unwrap(),
            pin: pin.expose(),
            message: "",
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(
            json,
            r#"{"bank_name":"KCB Bank","account_number":"123","amount":100.0,"pin":"1234","message":""}"#
        );
    }

    #[tokio::test]
    async fn test_mismatched_destination_never_leaves_the_client() {
        let request = SendMoneyRequest {
            channel: Channel::BankTransfer,
            destination: Destination::Phone {
                phone: "+250788000000".into(),
            },
            amount: Amount::new(dec!(100)).unwrap(),
            note: None,
            pin: Pin::sanitize("1234"),
        };
        let err = gateway("http://127.0.0.1:9").transfer(&request).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_a_transport_error() {
        let err = gateway("http://127.0.0.1:9")
            .get_balance()
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }
}
