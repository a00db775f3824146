/*
Error types for Witness-EVM validation
Every failure of the stateless validation pipeline maps onto one ErrorKind, so callers can
tell an insufficient witness apart from a block that does not prove what it claims.
*/

use crate::types::{Gas, Hash};
use alloc::boxed::Box;
use alloc::string::{String, ToString};
use core::fmt;
use kona_mpt::TrieNodeError;
use thiserror::Error;

/// What kind of witness entry a lookup was missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WitnessEntry {
    /// Raw Merkle-Patricia trie node
    TrieNode,
    /// Contract bytecode
    Code,
    /// Ancestor block header
    Header,
}

impl fmt::Display for WitnessEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TrieNode => f.write_str("trie node"),
            Self::Code => f.write_str("code"),
            Self::Header => f.write_str("header"),
        }
    }
}

/// Pipeline stage an error surfaced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Building the chain context over the witness store
    PrepareContext,
    /// Linkage checks and opening the pre-state view
    PrepareExecParams,
    /// Running the state transition
    ExecuteBlock,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrepareContext => f.write_str("prepare execution context"),
            Self::PrepareExecParams => f.write_str("prepare execution params"),
            Self::ExecuteBlock => f.write_str("execute block"),
        }
    }
}

/// A post-state value the engine computed differently from the block header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Mismatch {
    #[error("gas used: block declares {expected}, computed {computed}")]
    GasUsed { expected: Gas, computed: Gas },

    #[error("logs bloom differs from block header")]
    LogsBloom,

    #[error("receipts root: block declares {expected}, computed {computed}")]
    ReceiptsRoot { expected: Hash, computed: Hash },

    #[error("state root: block declares {expected}, computed {computed}")]
    StateRoot { expected: Hash, computed: Hash },

    #[error("blob gas used: block declares {expected:?}, computed {computed}")]
    BlobGasUsed { expected: Option<Gas>, computed: Gas },
}

/// Coarse classification of [`WitnessEvmError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Empty block list, empty ancestor list, unusable chain configuration
    MalformedRequest,
    /// The first ancestor is not the parent of the block
    WitnessLinkage,
    /// A trie node, code blob or header needed by execution is not in the witness
    InsufficientWitness,
    /// Inconsistent block or transaction data
    TransactionValidation,
    /// The state transition itself failed (e.g. block gas limit reached)
    Execution,
    /// The execution result differs from what the block claims
    SelfValidationMismatch,
    /// Failure to serialize a value for fingerprinting
    Serialization,
}

/// Errors that can occur during Witness-EVM validation
#[derive(Debug, Error)]
pub enum WitnessEvmError {
    /// Request is structurally unusable
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Chain configuration cannot drive execution
    #[error("invalid chain config: {0}")]
    InvalidChainConfig(String),

    /// First ancestor does not hash-link to the block
    #[error(
        "first ancestor must be the parent of block {block_number}: block declares parent {expected}, ancestor hashes to {actual}"
    )]
    WitnessLinkage {
        block_number: u64,
        expected: Hash,
        actual: Hash,
    },

    /// The pre-state root node is not in the witness
    #[error("missing state root node {0}")]
    MissingRoot(Hash),

    /// Lookup of a hash absent from the witness store
    #[error("insufficient witness: missing {entry} {hash}")]
    InsufficientWitness { entry: WitnessEntry, hash: Hash },

    /// Witness blob could not be decoded
    #[error("invalid witness data: {0}")]
    InvalidWitness(String),

    /// Walking the partial trie failed on a missing or malformed node
    #[error("trie walk failed: {0}")]
    Trie(#[from] TrieNodeError),

    /// Block header or body inconsistent with its parent or its own commitments
    #[error("invalid block: {0}")]
    InvalidBlock(String),

    /// Transaction rejected by the engine before execution
    #[error("invalid transaction {index}: {reason}")]
    InvalidTransaction { index: usize, reason: String },

    /// A sample transaction could not be signed
    #[error("signing failed: {0}")]
    Signing(String),

    /// Block gas pool exhausted
    #[error("gas limit reached: transaction {index} wants {wanted} gas, {available} available")]
    GasLimitExceeded {
        index: usize,
        wanted: Gas,
        available: Gas,
    },

    /// State transition failed
    #[error("execution failed at transaction {index}: {reason}")]
    ExecutionFailed { index: usize, reason: String },

    /// Computed post-state differs from the block's claims
    #[error("self-validation mismatch: {0}")]
    SelfValidation(#[from] Mismatch),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// An error wrapped with the pipeline stage it surfaced in
    #[error("failed to {stage}: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<WitnessEvmError>,
    },
}

impl WitnessEvmError {
    /// Wrap `self` with the stage it surfaced in.
    pub fn in_stage(self, stage: Stage) -> Self {
        Self::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// Shorthand for a missing trie node.
    pub fn missing_node(hash: Hash) -> Self {
        Self::InsufficientWitness {
            entry: WitnessEntry::TrieNode,
            hash,
        }
    }

    /// Shorthand for an undecodable witness blob.
    pub fn invalid_witness(err: impl fmt::Display) -> Self {
        Self::InvalidWitness(err.to_string())
    }

    /// Innermost error, with stage wrappers removed.
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Classify this error, seeing through stage wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedRequest(_) | Self::InvalidChainConfig(_) => ErrorKind::MalformedRequest,
            Self::WitnessLinkage { .. } => ErrorKind::WitnessLinkage,
            Self::MissingRoot(_)
            | Self::InsufficientWitness { .. }
            | Self::InvalidWitness(_)
            | Self::Trie(_) => ErrorKind::InsufficientWitness,
            Self::InvalidBlock(_) | Self::InvalidTransaction { .. } | Self::Signing(_) => {
                ErrorKind::TransactionValidation
            }
            Self::GasLimitExceeded { .. } | Self::ExecutionFailed { .. } => ErrorKind::Execution,
            Self::SelfValidation(_) => ErrorKind::SelfValidationMismatch,
            Self::SerializationError(_) => ErrorKind::Serialization,
            Self::Stage { source, .. } => source.kind(),
        }
    }
}

/// Result type for Witness-EVM operations
pub type Result<T> = core::result::Result<T, WitnessEvmError>;

impl From<bincode::Error> for WitnessEvmError {
    fn from(err: bincode::Error) -> Self {
        WitnessEvmError::SerializationError(err.to_string())
    }
}

impl From<alloy_rlp::Error> for WitnessEvmError {
    fn from(err: alloy_rlp::Error) -> Self {
        WitnessEvmError::invalid_witness(err)
    }
}
