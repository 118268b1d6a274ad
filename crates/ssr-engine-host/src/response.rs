//! Response host functions: `set_status`, `set_header`.
//!
//! Both are no-ops returning failure when the render was started without a
//! response handle.

use ssr_engine_core::store::GuestContext;
use tracing::{debug, warn};

/// Write access to the response of the render.
pub struct ResponseHost;

impl ResponseHost {
    /// Set the status code. Returns `false` if the code is not a valid HTTP
    /// status or there is no response.
    pub fn set_status(ctx: &GuestContext, status: i32) -> bool {
        let Ok(status) = u16::try_from(status) else {
            warn!(status, "Guest set an invalid status code");
            return false;
        };
        if !(100..=999).contains(&status) {
            warn!(status, "Guest set an invalid status code");
            return false;
        }

        let Some(response) = &ctx.response else {
            debug!(status, "Render has no response, status ignored");
            return false;
        };
        response.set_status(status);
        true
    }

    /// Set a header, replacing any existing value. Returns `false` if there
    /// is no response.
    pub fn set_header(ctx: &GuestContext, name: String, value: String) -> bool {
        let Some(response) = &ctx.response else {
            debug!(header = %name, "Render has no response, header ignored");
            return false;
        };
        response.set_header(name, value);
        true
    }
}
