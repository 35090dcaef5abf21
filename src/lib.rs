#![allow(clippy::collapsible_if)]

pub mod assist;
pub mod callback;
pub mod driver;
pub mod error;
pub mod executor;
pub mod fragment;
pub mod lop;
pub mod pattern;
pub mod selection;
pub mod staging;
pub mod tree;

pub use driver::Driver;
pub use error::{LopError, Result, RunError};
pub use executor::{ExecOptions, Executor, LopOutcome, RunReport};
pub use fragment::Fragment;
pub use tree::Tree;
