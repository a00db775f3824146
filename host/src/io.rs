//! I/O utilities for the host
//!
//! Reads and writes provable inputs as JSON and formats results for display.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use witness_evm_core::prelude::*;

/// Save ProverInput to a JSON file
pub fn save_input_json<P: AsRef<Path>>(input: &ProverInput, path: P) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(input).context("Failed to serialize ProverInput")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Load ProverInput from a JSON file
pub fn load_input_json<P: AsRef<Path>>(path: P) -> Result<ProverInput> {
    let path = path.as_ref();
    let json =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let input: ProverInput = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse ProverInput from {}", path.display()))?;
    Ok(input)
}

/// Format a hash as a hex string
pub fn format_hash(hash: &Hash) -> String {
    format!("0x{}", hex::encode(hash.as_slice()))
}

/// Format an execution result for display
pub fn format_result(result: &ExecutionResult) -> String {
    format!(
        "ExecutionResult {{\n  \
         transactions: {} ({} succeeded),\n  \
         gas_used: {},\n  \
         blob_gas_used: {},\n  \
         logs: {},\n  \
         state_root: {},\n  \
         receipts_root: {}\n\
         }}",
        result.transaction_count(),
        result.success_count(),
        result.gas_used,
        result.blob_gas_used,
        result.logs.len(),
        format_hash(&result.state_root),
        format_hash(&result.receipts_root),
    )
}
