//! View compilation: sources, templates and transforms.

pub mod source;
pub mod template;
pub mod transform;

pub use source::{compile_source, resolve_scan_mode, ScanMode};
pub use template::{render, render_transforms};
pub use transform::compile_transform;
