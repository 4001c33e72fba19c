pub mod auth;
pub mod decision;
pub mod enums;
pub mod history;
pub mod lenient;
pub mod patient;

pub use auth::*;
pub use decision::*;
pub use enums::*;
pub use history::*;
pub use patient::*;
