//! Domain layer types: client-facing flag and segment definitions.

pub mod features;
pub mod segments;

pub use features::{
    ClientFeature, Constraint, Dependency, Override, Strategy, Variant, VariantPayload,
};
pub use segments::ClientSegment;
