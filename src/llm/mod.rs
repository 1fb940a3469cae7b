//! Vision model integration.

mod client;
pub mod pricing;
pub mod prompt;

pub use client::{
    TokenUsage, VisionBatch, VisionClient, VisionConfig, VisionError, VisionGenerator,
    VisionImage, VisionResult,
};
pub use pricing::{estimate_cost, PricingModel};
