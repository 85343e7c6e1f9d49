//! Pipeline stages for spreadsheet-to-PDF merging.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the external collaborators (calamine, tera, soffice) stay behind
//! narrow interfaces.
//!
//! ## Data Flow
//!
//! ```text
//! source ──▶ record ──▶ template ──▶ save ──▶ pdf
//! (sheet)    (bind)     (render)    (docx)   (soffice)
//! ```
//!
//! 1. [`source`]   — read the worksheet into [`record::Record`]s (blocking,
//!    run in `spawn_blocking`)
//! 2. [`record`]   — bind a record through the field mapping into a
//!    [`record::RecordContext`]
//! 3. [`placeholders`] — repair `{{ … }}` expressions Word split across runs
//! 4. [`template`] — compile the DOCX once, render one package per record
//! 5. [`pdf`]      — drive the headless office suite; the only stage with a
//!    child process

pub mod pdf;
pub mod placeholders;
pub mod record;
pub mod source;
pub mod template;
