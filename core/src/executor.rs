//! Provable executor: the validation entry point
//!
//! Runs the linear pipeline for one [`ProverInput`]:
//!
//! 1. assemble a fresh [`WitnessStore`] from the witness,
//! 2. build the [`ChainContext`] over it,
//! 3. check parent linkage and open the pre-state view at the parent's state root,
//! 4. hand the parameters to the driver chain.
//!
//! Each stage either passes a richer context on or aborts the pipeline. The store and
//! view live in this call's frame and are dropped on every return path.

use crate::chain::ChainContext;
use crate::context::RequestContext;
use crate::driver::{default_chain, BlockExecutor};
use crate::errors::{Result, Stage, WitnessEvmError};
use crate::evm::ExecParams;
use crate::input::ProverInput;
use crate::output::ExecutionResult;
use crate::state::PreStateView;
use crate::store::WitnessStore;
use alloc::boxed::Box;
use tracing::{error, info};

/// Stateless validator for provable inputs
///
/// Holds no per-call state, so one executor can serve many validations concurrently.
pub struct ProvableExecutor {
    driver: Box<dyn BlockExecutor>,
    validate: bool,
}

impl ProvableExecutor {
    /// Executor that checks every result against its block header
    pub fn new() -> Self {
        Self {
            driver: default_chain(),
            validate: true,
        }
    }

    /// Executor that computes results without checking the header's claims
    pub fn unchecked() -> Self {
        Self {
            validate: false,
            ..Self::new()
        }
    }

    pub fn validates(&self) -> bool {
        self.validate
    }

    /// Validate `input` by re-executing its first block
    pub fn execute(&self, input: &ProverInput) -> Result<ExecutionResult> {
        let ctx = request_context(input);
        let result = ctx.span().in_scope(|| self.run(&ctx, input));
        match &result {
            Ok(output) => info!(
                chain_id = input.chain_config.chain_id,
                block_number = ctx.block_number(),
                block_hash = ctx.block_hash().map(tracing::field::display),
                gas_used = output.gas_used,
                state_root = %output.state_root,
                "provable execution succeeded"
            ),
            Err(err) => error!(
                chain_id = input.chain_config.chain_id,
                block_number = ctx.block_number(),
                block_hash = ctx.block_hash().map(tracing::field::display),
                kind = ?err.kind(),
                error = %err,
                "provable execution failed"
            ),
        }
        result
    }

    fn run(&self, ctx: &RequestContext, input: &ProverInput) -> Result<ExecutionResult> {
        input.validate()?;
        let store = WitnessStore::from_witness(&input.witness);

        let chain = ChainContext::new(&input.chain_config, &store)
            .map_err(|err| err.in_stage(Stage::PrepareContext))?;

        let params = self
            .prepare_params(input, &store, chain)
            .map_err(|err| err.in_stage(Stage::PrepareExecParams))?;

        self.driver
            .execute(ctx, params)
            .map_err(|err| err.in_stage(Stage::ExecuteBlock))
    }

    fn prepare_params<'a>(
        &self,
        input: &'a ProverInput,
        store: &'a WitnessStore,
        chain: ChainContext<'a>,
    ) -> Result<ExecParams<'a>> {
        let (Some(block), Some(parent)) = (input.block(), input.witness.parent()) else {
            return Err(WitnessEvmError::MalformedRequest(
                "input needs a block and its parent header".into(),
            ));
        };
        let state = PreStateView::for_block(store, block, &input.witness.ancestors)?;
        Ok(ExecParams::new(block, parent, chain, state).with_validation(self.validate))
    }
}

/// Entry-point context, tagged with the block when the input has one
fn request_context(input: &ProverInput) -> RequestContext {
    let ctx = RequestContext::new("provable_executor");
    match input.block() {
        Some(block) => {
            ctx.with_block_tags(input.chain_config.chain_id, block.number(), block.hash())
        }
        None => ctx,
    }
}

impl Default for ProvableExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProverInputBuilder;
    use crate::errors::ErrorKind;
    use crate::hashing::keccak256;
    use crate::state::AccountState;
    use crate::types::{Address, Hash, U256};

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_executor_is_send_sync() {
        assert_send_sync::<ProvableExecutor>();
        assert!(ProvableExecutor::new().validates());
        assert!(!ProvableExecutor::unchecked().validates());
    }

    #[test]
    fn test_invalid_config_fails_in_context_stage() {
        let mut input = ProverInputBuilder::new().build().unwrap();
        input.chain_config.chain_id = 0;

        let err = ProvableExecutor::new().execute(&input).unwrap_err();
        assert!(matches!(
            err,
            WitnessEvmError::Stage {
                stage: Stage::PrepareContext,
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::MalformedRequest);
        assert!(err.to_string().starts_with("failed to prepare execution context"));
    }

    #[test]
    fn test_missing_root_fails_in_params_stage() {
        let mut input = ProverInputBuilder::new()
            .with_account(
                Address::repeat_byte(0x01),
                AccountState::new_with_balance(U256::from(1u64)),
            )
            .build()
            .unwrap();
        let root = input.witness.ancestors[0].state_root;
        input.witness.state.retain(|node| keccak256(node) != root);

        let err = ProvableExecutor::new().execute(&input).unwrap_err();
        assert!(matches!(err.root_cause(), WitnessEvmError::MissingRoot(r) if *r == root));
        assert!(err.to_string().starts_with("failed to prepare execution params"));
    }

    #[test]
    fn test_mismatch_fails_in_execute_stage() {
        let mut input = ProverInputBuilder::new().build().unwrap();
        input.blocks[0].header.receipts_root = Hash::repeat_byte(0x01);

        let err = ProvableExecutor::new().execute(&input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SelfValidationMismatch);
        assert!(err.to_string().starts_with("failed to execute block"));

        // The unchecked executor reports what the block really produces
        let result = ProvableExecutor::unchecked().execute(&input).unwrap();
        assert_ne!(result.receipts_root, input.blocks[0].header.receipts_root);
    }

    #[test]
    fn test_request_context_tags_first_block() {
        let input = ProverInputBuilder::new().build().unwrap();
        let ctx = request_context(&input);
        assert_eq!(ctx.component(), "provable_executor");
        assert_eq!(ctx.chain_id(), Some(input.chain_config.chain_id));
        assert_eq!(ctx.block_number(), Some(input.blocks[0].header.number));
        assert_eq!(ctx.block_hash(), Some(input.blocks[0].hash()));

        let mut empty = input.clone();
        empty.blocks.clear();
        let ctx = request_context(&empty);
        assert_eq!(ctx.block_number(), None);
        assert_eq!(ctx.chain_id(), None);
    }

    #[test]
    fn test_parent_number_overflow_is_invalid_block() {
        let mut input = ProverInputBuilder::new().build().unwrap();
        let parent = &mut input.witness.ancestors[0];
        parent.number = u64::MAX;
        input.blocks[0].header.parent_hash = parent.hash_slow();

        let err = ProvableExecutor::new().execute(&input).unwrap_err();
        assert!(matches!(err.root_cause(), WitnessEvmError::InvalidBlock(_)));
        assert_eq!(err.kind(), ErrorKind::TransactionValidation);
        assert!(err.to_string().contains("does not follow parent"));
    }
}
