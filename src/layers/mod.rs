pub mod dense;
pub mod dropout;
pub mod layer;

pub use dense::{Dense, DenseGradients};
pub use dropout::{Dropout, Mode};
pub use layer::Layer;
