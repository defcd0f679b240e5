//! # Templates
//!
//! The read-only template lookup service: the built-in default template plus
//! any validated templates loaded from YAML.

pub mod builtin;
pub mod catalog;

pub use builtin::default_template;
pub use catalog::TemplateCatalog;
