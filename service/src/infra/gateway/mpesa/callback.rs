//! Result [`Callback`] of an M-Pesa STK push.

use common::DateTime;
use serde::Deserialize;

use crate::domain::payment;

/// Result of an STK push, reported by M-Pesa to the configured callback URL.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Callback {
    /// Body of this [`Callback`].
    body: Body,
}

/// Body of a [`Callback`].
#[derive(Clone, Debug, Deserialize)]
struct Body {
    /// Reported result.
    #[serde(rename = "stkCallback")]
    stk_callback: StkCallback,
}

/// Reported result of an STK push.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StkCallback {
    /// Reference of the checkout session.
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,

    /// Numeric code of the result.
    result_code: i32,

    /// Human-readable description of the result.
    result_desc: String,

    /// Details of a successful charge.
    #[serde(default)]
    callback_metadata: Option<Metadata>,
}

/// Details of a successful charge.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Metadata {
    /// Named values.
    #[serde(default)]
    item: Vec<MetadataItem>,
}

/// Named value of a [`Metadata`].
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetadataItem {
    /// Name of this value.
    name: String,

    /// The value itself, if any.
    #[serde(default)]
    value: Option<serde_json::Value>,
}

impl Callback {
    /// Returns the M-Pesa receipt number of a successful charge, if reported.
    #[must_use]
    pub fn receipt(&self) -> Option<String> {
        self.body
            .stk_callback
            .callback_metadata
            .as_ref()?
            .item
            .iter()
            .find(|i| i.name == "MpesaReceiptNumber")?
            .value
            .as_ref()
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                v => v.to_string(),
            })
    }

    /// Converts this [`Callback`] into a [`payment::Resolution`].
    ///
    /// [`None`] is returned if the [`Callback`] lacks a checkout reference.
    #[must_use]
    pub fn into_resolution(self) -> Option<payment::Resolution> {
        let StkCallback {
            checkout_request_id,
            result_code,
            result_desc,
            ..
        } = self.body.stk_callback;

        Some(payment::Resolution {
            checkout_id: payment::CheckoutId::new(checkout_request_id)?,
            result_code: result_code.into(),
            result_description: result_desc,
            resolved_at: DateTime::now().coerce(),
        })
    }
}

#[cfg(test)]
mod spec {
    use crate::domain::payment;

    use super::Callback;

    #[test]
    fn parses_successful_charge() {
        let callback: Callback = serde_json::from_str(
            r#"{
                "Body": {
                    "stkCallback": {
                        "MerchantRequestID": "29115-34620561-1",
                        "CheckoutRequestID": "ws_CO_191220191020363925",
                        "ResultCode": 0,
                        "ResultDesc": "The service request is processed successfully.",
                        "CallbackMetadata": {
                            "Item": [
                                {"Name": "Amount", "Value": 1.00},
                                {"Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV"},
                                {"Name": "Balance"},
                                {"Name": "PhoneNumber", "Value": 254708374149}
                            ]
                        }
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(callback.receipt().as_deref(), Some("NLJ7RT61SV"));

        let resolution = callback.into_resolution().unwrap();
        assert_eq!(
            AsRef::<str>::as_ref(&resolution.checkout_id),
            "ws_CO_191220191020363925",
        );
        assert_eq!(resolution.status(), payment::Status::Completed);
    }

    #[test]
    fn parses_cancelled_charge() {
        let callback: Callback = serde_json::from_str(
            r#"{
                "Body": {
                    "stkCallback": {
                        "MerchantRequestID": "29115-34620561-1",
                        "CheckoutRequestID": "ws_CO_191220191020363925",
                        "ResultCode": 1032,
                        "ResultDesc": "Request cancelled by user"
                    }
                }
            }"#,
        )
        .unwrap();

        assert!(callback.receipt().is_none());

        let resolution = callback.into_resolution().unwrap();
        assert_eq!(resolution.status(), payment::Status::Failed);
        assert_eq!(
            resolution.result_code,
            payment::ResultCode::CANCELLED_BY_USER,
        );
        assert_eq!(resolution.result_description, "Request cancelled by user");
    }

    #[test]
    fn ignores_callback_without_checkout_reference() {
        let callback: Callback = serde_json::from_str(
            r#"{"Body": {"stkCallback": {
                "CheckoutRequestID": " ",
                "ResultCode": 0,
                "ResultDesc": "ok"
            }}}"#,
        )
        .unwrap();

        assert!(callback.into_resolution().is_none());
    }
}
