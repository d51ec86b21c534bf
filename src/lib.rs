#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod error;
pub mod session;
pub mod ws;

use crate::error::Error;

pub use session::Session;

pub type Result<T> = std::result::Result<T, Error>;
