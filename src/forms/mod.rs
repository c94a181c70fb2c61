//! Typed views over decoded request forms.
pub mod upload;
