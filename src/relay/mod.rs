//! Batch compression and delivery
//!
//! - **Compressor**: zstd, shared by the inner (per-batch) and outer
//!   (per-segment) layers
//! - **Relay**: FIFO of compressed batches with the delivery state machine
//! - **Session**: collaborator contract for issuance and ingestion
//! - **Pipeline**: the single capture→buffer→relay task and its handle

pub mod compressor;
pub mod pipeline;
pub mod relay;
pub mod session;

pub use compressor::{CompressionLevel, Compressor};
pub use pipeline::{PipelineStats, RecordingPipeline};
pub use relay::{CompressedBatch, CompressionRelay, SessionState};
pub use session::{
    DeliveryPayload, IngestEnvelope, SessionBackend, SessionRequest, SessionTicket,
};
