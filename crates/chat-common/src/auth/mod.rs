//! Authentication credentials

mod token;

pub use token::{Token, TokenType};
