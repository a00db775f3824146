//! Execution output types for Witness-EVM
//!
//! Receipts and the per-block result the validator returns. The consensus encodings
//! here feed the receipts root the block header is checked against.

use crate::errors::Result;
use crate::hashing::hash_struct;
use crate::types::{Address, Bloom, Bytes, Gas, Hash};
use alloc::vec::Vec;
use alloy_consensus::constants::{
    EIP1559_TX_TYPE_ID, EIP2930_TX_TYPE_ID, EIP4844_TX_TYPE_ID, EIP7702_TX_TYPE_ID,
};
use alloy_consensus::{ReceiptEnvelope, ReceiptWithBloom, TxType};
use alloy_eips::eip2718::{
    Encodable2718,
};
use serde::{Deserialize, Serialize};

/// EVM execution log entry
///
/// Represents an event emitted during contract execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Log {
    /// Contract that emitted the log
    pub address: Address,
    /// Log topics (up to 4, first is usually event signature)
    pub topics: Vec<Hash>,
    /// Log data (ABI-encoded event parameters)
    pub data: Bytes,
}

impl Log {
    /// Create a new log entry
    pub fn new(address: Address, topics: Vec<Hash>, data: impl Into<Bytes>) -> Self {
        Self {
            address,
            topics,
            data: data.into(),
        }
    }

    fn to_primitive(&self) -> alloy_primitives::Log {
        alloy_primitives::Log::new_unchecked(self.address, self.topics.clone(), self.data.clone())
    }
}

/// Transaction receipt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    /// EIP-2718 type of the transaction
    pub tx_type: u8,
    /// Whether the transaction succeeded (EIP-658 status)
    pub success: bool,
    /// Gas used in the block up to and including this transaction
    pub cumulative_gas_used: Gas,
    pub logs: Vec<Log>,
    pub logs_bloom: Bloom,
}

impl Receipt {
    /// Build a receipt, deriving its bloom from `logs`
    pub fn new(tx_type: TxType, success: bool, cumulative_gas_used: Gas, logs: Vec<Log>) -> Self {
        let mut logs_bloom = Bloom::ZERO;
        for log in &logs {
            logs_bloom.accrue_raw_log(log.address, &log.topics);
        }
        Self {
            tx_type: tx_type as u8,
            success,
            cumulative_gas_used,
            logs,
            logs_bloom,
        }
    }

    /// EIP-2718 consensus encoding
    pub fn encoded(&self) -> Vec<u8> {
        let receipt = alloy_consensus::Receipt {
            status: self.success.into(),
            cumulative_gas_used: self.cumulative_gas_used.into(),
            logs: self.logs.iter().map(Log::to_primitive).collect(),
        };
        let with_bloom = ReceiptWithBloom::new(receipt, self.logs_bloom);
        let envelope = match self.tx_type {
            EIP2930_TX_TYPE_ID => ReceiptEnvelope::Eip2930(with_bloom),
            EIP1559_TX_TYPE_ID => ReceiptEnvelope::Eip1559(with_bloom),
            EIP4844_TX_TYPE_ID => ReceiptEnvelope::Eip4844(with_bloom),
            EIP7702_TX_TYPE_ID => ReceiptEnvelope::Eip7702(with_bloom),
            _ => ReceiptEnvelope::Legacy(with_bloom),
        };
        envelope.encoded_2718()
    }
}

/// Result of one block's stateless execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionResult {
    pub receipts: Vec<Receipt>,
    /// Total gas used by the block
    pub gas_used: Gas,
    /// Post-state root
    pub state_root: Hash,
    pub receipts_root: Hash,
    /// Union of all receipt blooms
    pub logs_bloom: Bloom,
    pub blob_gas_used: Gas,
    /// All logs, in emission order
    pub logs: Vec<Log>,
}

impl ExecutionResult {
    /// Compute deterministic hash of this result
    pub fn hash(&self) -> Result<Hash> {
        hash_struct(self)
    }

    /// Number of transactions executed
    pub fn transaction_count(&self) -> usize {
        self.receipts.len()
    }

    /// Number of successful transactions
    pub fn success_count(&self) -> usize {
        self.receipts.iter().filter(|r| r.success).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_rlp::Decodable;

    #[test]
    fn test_log_creation() {
        let addr = Address::repeat_byte(0x01);
        let topic = Hash::repeat_byte(0x02);
        let data = vec![0x12, 0x34];

        let log = Log::new(addr, vec![topic], data.clone());

        assert_eq!(log.address, addr);
        assert_eq!(log.topics, vec![topic]);
        assert_eq!(log.data.as_ref(), data.as_slice());
    }

    #[test]
    fn test_receipt_bloom() {
        let addr = Address::repeat_byte(0x01);
        let topic = Hash::repeat_byte(0x02);
        let receipt = Receipt::new(
            TxType::Legacy,
            true,
            21_000,
            vec![Log::new(addr, vec![topic], Bytes::new())],
        );

        assert!(receipt.logs_bloom.contains_input(alloy_primitives::BloomInput::Raw(addr.as_slice())));
        assert!(receipt.logs_bloom.contains_input(alloy_primitives::BloomInput::Raw(topic.as_slice())));

        let empty = Receipt::new(TxType::Legacy, true, 21_000, vec![]);
        assert_eq!(empty.logs_bloom, Bloom::ZERO);
    }

    #[test]
    fn test_receipt_encoding() {
        let legacy = Receipt::new(TxType::Legacy, true, 21_000, vec![]);
        let encoded = legacy.encoded();
        // status 0x01, 0x82 0x5208, 0xb9 0x0100 ++ bloom, 0xc0: 1 + 3 + 259 + 1 = 0x0108
        assert_eq!(encoded.len(), 3 + 0x0108);
        assert_eq!(&encoded[..3], &[0xf9, 0x01, 0x08]);
        assert_eq!(&encoded[3..7], &[0x01, 0x82, 0x52, 0x08]);
        assert_eq!(encoded.last(), Some(&0xc0));

        let failed = Receipt::new(TxType::Eip1559, false, 21_000, vec![]);
        let encoded = failed.encoded();
        assert_eq!(encoded[0], 0x02);
        assert_eq!(encoded[4], 0x80);
    }

    #[test]
    fn test_receipt_with_logs_decodes() {
        let log = Log::new(Address::repeat_byte(0x01), vec![Hash::repeat_byte(0x02)], vec![0xff]);
        let receipt = Receipt::new(TxType::Eip2930, true, 50_000, vec![log.clone()]);
        let encoded = receipt.encoded();
        assert_eq!(encoded[0], 0x01);

        let decoded = ReceiptWithBloom::<alloy_consensus::Receipt>::decode(&mut &encoded[1..]).unwrap();
        assert_eq!(decoded.logs_bloom, receipt.logs_bloom);
        assert_eq!(decoded.receipt.logs, vec![log.to_primitive()]);
        assert!(decoded.receipt.status.coerce_status());
    }

    #[test]
    fn test_result_hash_deterministic() {
        let result = ExecutionResult {
            receipts: vec![Receipt::new(TxType::Legacy, true, 21_000, vec![])],
            gas_used: 21_000,
            state_root: Hash::repeat_byte(0x01),
            receipts_root: Hash::repeat_byte(0x02),
            logs_bloom: Bloom::ZERO,
            blob_gas_used: 0,
            logs: vec![],
        };

        assert_eq!(result.hash().unwrap(), result.clone().hash().unwrap());
        assert_eq!(result.transaction_count(), 1);
        assert_eq!(result.success_count(), 1);

        let other = ExecutionResult {
            gas_used: 42_000,
            ..result.clone()
        };
        assert_ne!(result.hash().unwrap(), other.hash().unwrap());
    }
}
