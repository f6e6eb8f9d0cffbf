//! Domain models.

mod alert;
mod drug;
mod interaction;
mod prescription;
mod side_effect;

pub use alert::*;
pub use drug::*;
pub use interaction::*;
pub use prescription::*;
pub use side_effect::*;
