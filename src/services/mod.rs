pub mod artifacts;
pub mod code_retry;
pub mod housekeeping;
pub mod order_assembly;
pub mod pricing;

pub use artifacts::{Artifact, ArtifactStore};
pub use code_retry::{BatchSummary, CodeRetryJob};
pub use order_assembly::assemble_order;
pub use pricing::{FixedPricing, PricingSource};
