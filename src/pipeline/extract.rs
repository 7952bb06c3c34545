//! Fragment extraction: turn a PDF into positioned text fragments via pdfium.
//!
//! ## Object handling
//!
//! * Text objects become one fragment each, with the object's bounds.
//! * Image objects are ignored.
//! * Form XObjects (figure groupings) are flattened: the text of every text
//!   object inside them, nested forms included, is concatenated without a
//!   separator into one fragment carrying the form's bounds. Statement
//!   generators often wrap a single label or amount in its own form.
//!
//! pdfium is a blocking C library; callers in async code run
//! [`FragmentSource::extract`] inside `tokio::task::spawn_blocking`.

use crate::error::ReconError;
use crate::pipeline::fragment::{BBox, PageFragments, TextFragment};
use crate::pipeline::input::check_pdf_magic;
use pdfium_render::prelude::*;
use std::io::Read;
use std::path::PathBuf;
use tracing::{debug, trace};

/// Produces positioned text fragments for one document.
///
/// Implementations must be `Send + Sync` so a single source can be shared
/// through the config and moved into blocking tasks.
pub trait FragmentSource: Send + Sync {
    /// Read one document from `reader` and return its fragments, per page.
    fn extract(&self, reader: &mut dyn Read) -> Result<Vec<PageFragments>, ReconError>;
}

/// The default [`FragmentSource`], backed by pdfium-render.
#[derive(Debug, Clone, Default)]
pub struct PdfiumSource {
    password: Option<String>,
}

impl PdfiumSource {
    pub fn new(password: Option<String>) -> Self {
        Self { password }
    }
}

impl FragmentSource for PdfiumSource {
    fn extract(&self, reader: &mut dyn Read) -> Result<Vec<PageFragments>, ReconError> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| ReconError::CorruptPdf {
                detail: format!("read failed: {e}"),
            })?;
        check_pdf_magic(&bytes)?;

        let pdfium = bind_pdfium()?;
        let password = self.password.as_deref();
        let document = pdfium
            .load_pdf_from_byte_vec(bytes, password)
            .map_err(|e| load_error(e, password.is_some()))?;

        let mut pages = Vec::new();
        for (page_index, page) in document.pages().iter().enumerate() {
            let mut fragments = Vec::new();
            let mut images = 0usize;
            for object in page.objects().iter() {
                collect_object(&object, &mut fragments, &mut images);
            }
            debug!(
                "Page {}: {} fragments, {} images ignored",
                page_index + 1,
                fragments.len(),
                images
            );
            pages.push(PageFragments {
                page_index,
                fragments,
            });
        }

        Ok(pages)
    }
}

/// Bind to a pdfium library.
///
/// Resolution order: `PDFIUM_LIB_PATH` (a library file or the directory
/// holding it), then the working directory, then the system library.
pub fn bind_pdfium() -> Result<Pdfium, ReconError> {
    let bindings = match std::env::var_os("PDFIUM_LIB_PATH") {
        Some(path) => {
            let path = PathBuf::from(path);
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            debug!("Binding pdfium from {}", lib.display());
            Pdfium::bind_to_library(&lib)
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| ReconError::PdfiumBindingFailed(format!("{e:?}")))?;

    Ok(Pdfium::new(bindings))
}

fn load_error(e: PdfiumError, had_password: bool) -> ReconError {
    let detail = format!("{e:?}");
    if detail.contains("Password") || detail.contains("password") {
        if had_password {
            ReconError::WrongPassword
        } else {
            ReconError::PasswordRequired
        }
    } else {
        ReconError::CorruptPdf { detail }
    }
}

fn collect_object(object: &PdfPageObject<'_>, out: &mut Vec<TextFragment>, images: &mut usize) {
    match object.object_type() {
        PdfPageObjectType::Text => {
            if let (Some(text), Some(bbox)) = (object.as_text_object(), object_bbox(object)) {
                out.push(TextFragment::new(bbox, text.text()));
            }
        }
        PdfPageObjectType::XObjectForm => {
            if let Some(form) = object.as_x_object_form_object() {
                let mut text = String::new();
                flatten_form_text(form, &mut text);
                match object_bbox(object) {
                    Some(bbox) if !text.is_empty() => out.push(TextFragment::new(bbox, text)),
                    _ => trace!("Form without text or bounds skipped"),
                }
            }
        }
        PdfPageObjectType::Image => *images += 1,
        _ => {}
    }
}

/// Concatenate the text of every text object inside a form, depth-first.
fn flatten_form_text(form: &PdfPageXObjectFormObject<'_>, out: &mut String) {
    for child in form.iter() {
        if let Some(text) = child.as_text_object() {
            out.push_str(&text.text());
        } else if let Some(inner) = child.as_x_object_form_object() {
            flatten_form_text(inner, out);
        }
    }
}

fn object_bbox(object: &PdfPageObject<'_>) -> Option<BBox> {
    let bounds = object.bounds().ok()?;
    Some(BBox::new(
        f64::from(bounds.left().value),
        f64::from(bounds.bottom().value),
        f64::from(bounds.right().value),
        f64::from(bounds.top().value),
    ))
}
