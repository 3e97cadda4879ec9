use crate::error::{PaymentError, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Success,
    Error,
    #[serde(other)]
    Unknown,
}

/// `{ "status": ..., "data": ..., "message": ..., "code": ... }` wrapper the
/// gateway puts around every answer, successful or not.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub status: EnvelopeStatus,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Turns an HTTP answer into the payload or a typed error.
///
/// `default_message` is used when the gateway rejects without saying why.
pub fn decode<T: DeserializeOwned>(http_status: u16, body: &str, default_message: &str) -> Result<T> {
    let http_ok = (200..300).contains(&http_status);

    let envelope: Envelope<serde_json::Value> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(_) if !http_ok => {
            return Err(PaymentError::gateway(
                format!("HTTP_{http_status}"),
                default_message,
            ));
        }
        Err(e) => {
            return Err(PaymentError::Transport(format!("invalid JSON response: {e}")));
        }
    };

    if http_ok && envelope.status == EnvelopeStatus::Success {
        let data = envelope.data.unwrap_or(serde_json::Value::Null);
        return serde_json::from_value(data)
            .map_err(|e| PaymentError::Transport(format!("unexpected response shape: {e}")));
    }

    let reason_code = envelope.code.unwrap_or_else(|| {
        if http_ok {
            "GATEWAY_ERROR".to_string()
        } else {
            format!("HTTP_{http_status}")
        }
    });
    let message = envelope
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| default_message.to_string());
    Err(PaymentError::Gateway {
        reason_code,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct BalanceData {
        balance: f64,
    }

    #[test]
    fn test_success_envelope() {
        let body = r#"{"status":"success","data":{"balance":1500}}"#;
        let data: BalanceData = decode(200, body, "Failed to get balance").unwrap();
        assert_eq!(data, BalanceData { balance: 1500.0 });
    }

    #[test]
    fn test_error_envelope_keeps_gateway_reason() {
        let body = r#"{"status":"error","code":"INSUFFICIENT_FUNDS","message":"Not enough money"}"#;
        let err = decode::<BalanceData>(400, body, "Payment failed").unwrap_err();
        match err {
            PaymentError::Gateway {
                reason_code,
                message,
            } => {
                assert_eq!(reason_code, "INSUFFICIENT_FUNDS");
                assert_eq!(message, "Not enough money");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_envelope_without_detail_uses_defaults() {
        let body = r#"{"status":"error"}"#;
        let err = decode::<BalanceData>(401, body, "Payment failed").unwrap_err();
        assert!(matches!(
            err,
            PaymentError::Gateway { ref reason_code, ref message }
                if reason_code == "HTTP_401" && message == "Payment failed"
        ));
    }

    #[test]
    fn test_error_status_on_http_200() {
        let body = r#"{"status":"error","message":"Invalid PIN"}"#;
        let err = decode::<BalanceData>(200, body, "Payment failed").unwrap_err();
        assert!(matches!(
            err,
            PaymentError::Gateway { ref reason_code, .. } if reason_code == "GATEWAY_ERROR"
        ));
    }

    #[test]
    fn test_garbage_body() {
        let err = decode::<BalanceData>(200, "<html>", "x").unwrap_err();
        assert!(err.is_transport());

        let err = decode::<BalanceData>(502, "Bad Gateway", "Payment failed").unwrap_err();
        assert!(matches!(err, PaymentError::Gateway { ref reason_code, .. } if reason_code == "HTTP_502"));
    }
}
