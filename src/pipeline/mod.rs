//! Pipeline stages for turning statement PDFs into metric maps.
//!
//! Each submodule implements exactly one step. The geometric core
//! ([`segment`], [`classify`], [`period`]) is pure and synchronous; only
//! [`extract`] touches pdfium and only [`input`] touches the file system.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ period ──▶ segment ──▶ classify
//! (folder)  (pdfium)    (marker)   (rows)      (label/value)
//! ```
//!
//! 1. [`input`]    — list the statement files of a folder, check PDF magic
//! 2. [`extract`]  — read positioned text fragments; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 3. [`period`]   — find the period fragment and parse its date range
//! 4. [`segment`]  — rebuild rows from fragment geometry
//! 5. [`classify`] — decide which cell of a row is the value
//!
//! [`fragment`] holds the types shared by all stages.

pub mod classify;
pub mod extract;
pub mod fragment;
pub mod input;
pub mod period;
pub mod segment;
