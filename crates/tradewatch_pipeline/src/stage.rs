//! The pipeline stage contract.

use async_trait::async_trait;

use tradewatch_protocol::{PipelineContext, PipelineResult};

/// A pipeline stage: consumes its input vector, never mutates the
/// context beyond metadata, and reports counters for everything it saw.
#[async_trait]
pub trait PipelineStage<In, Out>: Send + Sync
where
    In: Send + 'static,
    Out: Send + 'static,
{
    fn name(&self) -> &'static str;

    async fn process(&self, data: Vec<In>, context: &PipelineContext) -> PipelineResult<Out>;
}
