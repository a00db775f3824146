//! Stateless execution driver
//!
//! The engine sits at the bottom of an ordered middleware chain. Middleware only observes:
//! it may extend the [`RequestContext`] and record the outcome, but passes parameters and
//! results through unchanged.

use crate::context::RequestContext;
use crate::errors::Result;
use crate::evm::{BlockEngine, ExecParams};
use crate::output::ExecutionResult;
use alloc::boxed::Box;
use alloc::vec::Vec;
use tracing::{debug, error, info};

/// Something that executes a block
pub trait BlockExecutor: Send + Sync {
    fn execute(&self, ctx: &RequestContext, params: ExecParams<'_>) -> Result<ExecutionResult>;
}

/// Wraps an executor in another executor
pub type Middleware = Box<dyn Fn(Box<dyn BlockExecutor>) -> Box<dyn BlockExecutor> + Send + Sync>;

/// The revm-backed engine
#[derive(Debug, Clone, Copy, Default)]
pub struct EvmExecutor;

impl BlockExecutor for EvmExecutor {
    fn execute(&self, _ctx: &RequestContext, params: ExecParams<'_>) -> Result<ExecutionResult> {
        BlockEngine::execute(params)
    }
}

/// Stack `middlewares` on `base`; the first one ends up outermost
pub fn compose(
    base: Box<dyn BlockExecutor>,
    middlewares: Vec<Middleware>,
) -> Box<dyn BlockExecutor> {
    middlewares
        .iter()
        .rev()
        .fold(base, |inner, middleware| middleware(inner))
}

/// Default chain: tags first, then logging
pub fn default_chain() -> Box<dyn BlockExecutor> {
    compose(
        Box::new(EvmExecutor),
        alloc::vec![with_tags("stateless_execution"), with_logging()],
    )
}

struct Tagged {
    inner: Box<dyn BlockExecutor>,
    component: &'static str,
}

impl BlockExecutor for Tagged {
    fn execute(&self, ctx: &RequestContext, params: ExecParams<'_>) -> Result<ExecutionResult> {
        let ctx = ctx.with_component(self.component).with_block_tags(
            params.chain.chain_id(),
            params.block.number(),
            params.block.hash(),
        );
        self.inner.execute(&ctx, params)
    }
}

/// Attach component name, chain id, block number and block hash to the context
pub fn with_tags(component: &'static str) -> Middleware {
    Box::new(move |inner| Box::new(Tagged { inner, component }))
}

struct Logged {
    inner: Box<dyn BlockExecutor>,
}

impl BlockExecutor for Logged {
    fn execute(&self, ctx: &RequestContext, params: ExecParams<'_>) -> Result<ExecutionResult> {
        let span = ctx.span();
        let _entered = span.enter();
        debug!(
            transactions = params.block.transactions.len(),
            validate = params.validate,
            "executing block"
        );

        let result = self.inner.execute(ctx, params);
        match &result {
            Ok(output) => info!(
                gas_used = output.gas_used,
                receipts = output.receipts.len(),
                state_root = %output.state_root,
                "block execution succeeded"
            ),
            Err(err) => error!(error = %err, kind = ?err.kind(), "block execution failed"),
        }
        result
    }
}

/// Record the outcome of every execution
pub fn with_logging() -> Middleware {
    Box::new(|inner| Box::new(Logged { inner }))
}
