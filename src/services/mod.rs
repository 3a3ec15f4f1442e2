//! Domain services used by the HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own the archive logic so route handlers can stay focused
//! on protocol translation (JSON bodies, forms, redirects).

pub mod archive;
