//! # JSON-RPC Wire Types
//!
//! Request/response envelopes and typed payloads for the Ethereum JSON-RPC
//! methods the harness needs. The HTTP plumbing lives in
//! [`super::client`]; this module is pure data.
//!
//! ## Method Index
//!
//! | Method                      | Used for                                  |
//! |----------------------------|-------------------------------------------|
//! | `eth_call`                  | Read-only contract calls                  |
//! | `eth_estimateGas`           | Gas estimate logged before each write     |
//! | `eth_sendTransaction`       | Node-signed state-changing calls          |
//! | `eth_sendRawTransaction`    | Locally signed state-changing calls       |
//! | `eth_chainId`               | EIP-155 replay protection when signing    |
//! | `eth_getTransactionCount`   | Nonce of the next locally signed call     |
//! | `eth_gasPrice`              | Gas price of the next locally signed call |
//! | `eth_getTransactionReceipt` | Confirmation and gas used                 |
//! | `eth_getBalance`            | Native balance of the operating account   |
//! | `personal_importRawKey`     | Hand the operating key to the node        |
//! | `personal_unlockAccount`    | Let the node sign for that account        |
//! | `evm_increaseTime`          | Simulated clock (test chains only)        |
//! | `evm_mine`                  | Force a block (test chains only)          |

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RPC Method Enumeration
// ---------------------------------------------------------------------------

/// Supported JSON-RPC methods, serialized by their wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcMethod {
    /// Parameters: `(call: CallRequest, block: "latest")`
    #[serde(rename = "eth_call")]
    Call,
    /// Parameters: `(call: CallRequest)`
    #[serde(rename = "eth_estimateGas")]
    EstimateGas,
    /// Parameters: `(call: CallRequest)`
    #[serde(rename = "eth_sendTransaction")]
    SendTransaction,
    /// Parameters: `(raw: Bytes)`
    #[serde(rename = "eth_sendRawTransaction")]
    SendRawTransaction,
    /// Parameters: none.
    #[serde(rename = "eth_chainId")]
    ChainId,
    /// Parameters: `(address: Address, block: "pending")`
    #[serde(rename = "eth_getTransactionCount")]
    GetTransactionCount,
    /// Parameters: none.
    #[serde(rename = "eth_gasPrice")]
    GasPrice,
    /// Parameters: `(tx_hash: B256)`
    #[serde(rename = "eth_getTransactionReceipt")]
    GetTransactionReceipt,
    /// Parameters: `(address: Address, block: "latest")`
    #[serde(rename = "eth_getBalance")]
    GetBalance,
    /// Parameters: `(private_key_hex: String, passphrase: String)`
    #[serde(rename = "personal_importRawKey")]
    ImportRawKey,
    /// Parameters: `(address: Address, passphrase: String, duration: u64)`
    #[serde(rename = "personal_unlockAccount")]
    UnlockAccount,
    /// Parameters: `(seconds: u64)`
    #[serde(rename = "evm_increaseTime")]
    IncreaseTime,
    /// Parameters: none.
    #[serde(rename = "evm_mine")]
    Mine,
}

impl RpcMethod {
    /// Wire name of the method, for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "eth_call",
            Self::EstimateGas => "eth_estimateGas",
            Self::SendTransaction => "eth_sendTransaction",
            Self::SendRawTransaction => "eth_sendRawTransaction",
            Self::ChainId => "eth_chainId",
            Self::GetTransactionCount => "eth_getTransactionCount",
            Self::GasPrice => "eth_gasPrice",
            Self::GetTransactionReceipt => "eth_getTransactionReceipt",
            Self::GetBalance => "eth_getBalance",
            Self::ImportRawKey => "personal_importRawKey",
            Self::UnlockAccount => "personal_unlockAccount",
            Self::IncreaseTime => "evm_increaseTime",
            Self::Mine => "evm_mine",
        }
    }
}

// ---------------------------------------------------------------------------
// RPC Request / Response
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version. Always "2.0".
    pub jsonrpc: String,
    /// Request identifier. Echoed back in the response.
    pub id: u64,
    /// The method to invoke.
    pub method: RpcMethod,
    /// Positional parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl RpcRequest {
    /// Creates a new RPC request with the given method and parameters.
    pub fn new(id: u64, method: RpcMethod, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method,
            params,
        }
    }
}

/// A JSON-RPC 2.0 response.
///
/// Exactly one of `result` or `error` is set by a conforming node, except
/// that `result` may legitimately be JSON `null` (e.g. a receipt for a
/// transaction that is not mined yet).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// JSON-RPC version. Always "2.0".
    pub jsonrpc: String,
    /// The request ID this response corresponds to.
    pub id: serde_json::Value,
    /// The successful result, if the method completed without error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// The error, if the method failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

// ---------------------------------------------------------------------------
// RPC Errors
// ---------------------------------------------------------------------------

/// JSON-RPC 2.0 error object as returned by an Ethereum node.
///
/// Nodes disagree on how they report a revert: geth uses code `3`, ganache
/// and hardhat use `-32000` with a "VM Exception ... revert" message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional error data (revert payload on some nodes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    /// Returns `true` if the node is telling us the EVM reverted.
    pub fn is_revert(&self) -> bool {
        self.code == 3 || self.message.to_ascii_lowercase().contains("revert")
    }
}

// ---------------------------------------------------------------------------
// Typed Payloads
// ---------------------------------------------------------------------------

/// Call object shared by `eth_call`, `eth_estimateGas` and
/// `eth_sendTransaction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    /// Sender. Required for sends, informative for calls.
    pub from: Address,
    /// Target contract.
    pub to: Address,
    /// ABI-encoded calldata.
    pub data: Bytes,
    /// Native value attached, omitted when zero.
    #[serde(default, skip_serializing_if = "U256::is_zero")]
    pub value: U256,
}

/// The subset of `eth_getTransactionReceipt` the harness reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    /// Hash of the mined transaction.
    pub transaction_hash: B256,
    /// `1` on success, `0` on revert. Absent on pre-Byzantium chains.
    #[serde(default)]
    pub status: Option<U256>,
    /// Gas actually consumed.
    pub gas_used: U256,
}

impl TransactionReceipt {
    /// Returns `true` unless the receipt explicitly reports failure.
    pub fn succeeded(&self) -> bool {
        self.status.map_or(true, |s| !s.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_request_serialization() {
        let req = RpcRequest::new(7, RpcMethod::Mine, serde_json::json!([]));

        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"evm_mine\""));
        assert!(json.contains("\"jsonrpc\":\"2.0\""));

        let recovered: RpcRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(recovered.method, RpcMethod::Mine);
        assert_eq!(recovered.id, 7);
    }

    #[test]
    fn method_names_match_wire_format() {
        let methods = [
            RpcMethod::Call,
            RpcMethod::EstimateGas,
            RpcMethod::SendTransaction,
            RpcMethod::SendRawTransaction,
            RpcMethod::ChainId,
            RpcMethod::GetTransactionCount,
            RpcMethod::GasPrice,
            RpcMethod::GetTransactionReceipt,
            RpcMethod::GetBalance,
            RpcMethod::ImportRawKey,
            RpcMethod::UnlockAccount,
            RpcMethod::IncreaseTime,
            RpcMethod::Mine,
        ];

        for method in methods {
            let json = serde_json::to_string(&method).unwrap();
            assert_eq!(json, format!("\"{}\"", method.as_str()));
            let recovered: RpcMethod = serde_json::from_str(&json).unwrap();
            assert_eq!(method, recovered);
        }
    }

    #[test]
    fn error_response_parses() {
        let raw = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"VM Exception while processing transaction: revert"}}"#;
        let resp: RpcResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.result.is_none());
        let err = resp.error.unwrap();
        assert_eq!(err.code, -32000);
        assert!(err.is_revert());
    }

    #[test]
    fn geth_revert_code_is_a_revert() {
        let err = RpcError {
            code: 3,
            message: "execution failed".into(),
            data: Some(serde_json::json!("0x")),
        };
        assert!(err.is_revert());

        let transient = RpcError {
            code: -32005,
            message: "request rate exceeded".into(),
            data: None,
        };
        assert!(!transient.is_revert());
    }

    #[test]
    fn call_request_omits_zero_value() {
        let call = CallRequest {
            from: Address::ZERO,
            to: Address::repeat_byte(0x11),
            data: Bytes::from(vec![0x06, 0xfd, 0xde, 0x03]),
            value: U256::ZERO,
        };
        let json = serde_json::to_value(&call).unwrap();
        assert!(json.get("value").is_none());
        assert_eq!(json["data"], "0x06fdde03");
    }

    #[test]
    fn receipt_status_decoding() {
        let raw = r#"{"transactionHash":"0x0000000000000000000000000000000000000000000000000000000000000001","status":"0x0","gasUsed":"0x5208"}"#;
        let receipt: TransactionReceipt = serde_json::from_str(raw).unwrap();
        assert!(!receipt.succeeded());
        assert_eq!(receipt.gas_used, U256::from(21_000u64));
    }
}
