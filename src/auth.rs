//! Credentials, user tokens, scope sets, and OAuth state helpers.

pub mod scope;
pub mod state;
pub mod token;

pub use scope::*;
pub use state::*;
pub use token::{secret::*, *};
