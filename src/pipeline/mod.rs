//! Pipeline stages for PDF-to-EPUB conversion.
//!
//! Each submodule implements one transformation step and is testable on its
//! own. [`crate::convert`] wires them together per job.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ translate? ──▶ chapters ──▶ epub | paginate ──▶ roundtrip?
//! (paths)   (pdfium +   (per block,    (split on    (zip)  (printpdf)  (external
//!            layout)     fail-soft)     headings)                      converter)
//! ```
//!
//! 1. [`input`]     — validate the input file, name outputs, write atomically
//! 2. [`extract`]   — read words, metadata and a cover image via pdfium; runs
//!    in `spawn_blocking` because pdfium is not async-safe
//! 3. [`layout`]    — pure line/heading/paragraph reconstruction from words
//! 4. [`translate`] — unit-by-unit translation; a failed unit keeps its text
//! 5. [`chapters`]  — split blocks into chapters at headings
//! 6. [`markup`]    — text normalisation, XML escaping and inline emphasis
//! 7. [`epub`]      — EPUB 3 container with an NCX fallback
//! 8. [`paginate`]  — paginated PDF layout and serialisation
//! 9. [`roundtrip`] — optional pass through an external e-book converter

pub mod chapters;
pub mod epub;
pub mod extract;
pub mod input;
pub mod layout;
pub mod markup;
pub mod paginate;
pub mod roundtrip;
pub mod translate;
