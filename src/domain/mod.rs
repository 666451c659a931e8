pub mod reading;
pub mod severity;

pub use reading::*;
pub use severity::*;
