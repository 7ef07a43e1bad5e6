//! Username and password generation

pub mod password;
pub mod scheme;
pub mod username;

pub use password::PasswordGenerator;
pub use scheme::{CounterKind, Scheme, SchemeContext};
pub use username::UsernameGenerator;
