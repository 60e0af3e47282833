use crate::gateway::status::{ResultCode, TransactionStatus};

#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackEnvelope {
    pub body: CallbackBody,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    pub result_code: ResultCode,
    pub result_desc: String,
    /// Only present for successful payments
    #[serde(default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackMetadata {
    #[serde(default)]
    pub item: Vec<CallbackItem>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackItem {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// What the payment session keeps from a provider callback
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CallbackResult {
    pub status: TransactionStatus,
    pub result_description: String,
    pub receipt: Option<String>,
}

impl StkCallback {
    fn item(&self, name: &str) -> Option<&serde_json::Value> {
        self.callback_metadata
            .as_ref()?
            .item
            .iter()
            .find(|item| item.name == name)
            .map(|item| &item.value)
    }

    pub fn receipt_number(&self) -> Option<String> {
        self.item("MpesaReceiptNumber")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    }

    pub fn result(&self) -> CallbackResult {
        let code = self.result_code.as_code();
        CallbackResult {
            status: TransactionStatus::from_result(code.as_deref(), &self.result_desc),
            result_description: self.result_desc.clone(),
            receipt: self.receipt_number(),
        }
    }
}
