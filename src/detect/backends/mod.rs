pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::{StubAuxiliaryClassifier, StubClassifier, StubDetector};

#[cfg(feature = "backend-tract")]
pub use tract::{Normalization, TractAuxiliaryClassifier, TractClassifier, TractDetector};
