pub mod alert;
pub mod enums;
pub mod report;
pub mod validation;

pub use alert::*;
pub use enums::*;
pub use report::*;
pub use validation::*;
