//! Document host functions: `document_len`, `document_read`, `document_write`.
//!
//! The document starts as the shell template of the render. Whatever the
//! guest writes last is what the render serializes.

use ssr_engine_core::store::GuestContext;

/// Access to the document of the render.
pub struct DocumentHost;

impl DocumentHost {
    /// Current document text.
    pub fn read(ctx: &GuestContext) -> String {
        ctx.document.render_to_string()
    }

    /// Replace the document.
    pub fn write(ctx: &GuestContext, document: String) {
        ctx.document.set_document(document);
    }
}
