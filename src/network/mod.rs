pub mod classifier;
pub mod metadata;
pub mod spec;

pub use classifier::{Classifier, ForwardPass};
pub use metadata::ModelMetadata;
pub use spec::ArchitectureSpec;
