//! Correlation metadata for one validation call

use crate::types::{BlockNumber, Hash};
use alloc::string::String;
use alloc::vec::Vec;
use tracing::{field, info_span, Span};

/// Tags attached to the logs of one validation
///
/// Passed down the execution stages explicitly; each layer extends a copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    components: Vec<String>,
    chain_id: Option<u64>,
    block_number: Option<BlockNumber>,
    block_hash: Option<Hash>,
}

impl RequestContext {
    pub fn new(component: impl Into<String>) -> Self {
        Self::default().with_component(component)
    }

    /// Copy of `self` nested under `component`
    pub fn with_component(&self, component: impl Into<String>) -> Self {
        let mut ctx = self.clone();
        ctx.components.push(component.into());
        ctx
    }

    /// Copy of `self` tagged with the block being executed
    pub fn with_block_tags(&self, chain_id: u64, number: BlockNumber, hash: Hash) -> Self {
        Self {
            chain_id: Some(chain_id),
            block_number: Some(number),
            block_hash: Some(hash),
            ..self.clone()
        }
    }

    /// Component path, outermost first
    pub fn component(&self) -> String {
        self.components.join("/")
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.chain_id
    }

    pub fn block_number(&self) -> Option<BlockNumber> {
        self.block_number
    }

    pub fn block_hash(&self) -> Option<Hash> {
        self.block_hash
    }

    /// Span carrying every tag as a structured field
    pub fn span(&self) -> Span {
        info_span!(
            "provable_execution",
            component = %self.component(),
            chain.id = self.chain_id,
            block.number = self.block_number,
            block.hash = self.block_hash.map(field::display),
        )
    }
}
