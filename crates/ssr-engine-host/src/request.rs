//! Request host functions: `url_len`, `url_read`, `header_len`, `header_read`.

use ssr_engine_core::store::GuestContext;

/// Read-only access to the request being rendered.
pub struct RequestHost;

impl RequestHost {
    /// URL of the request (path and query).
    pub fn url(ctx: &GuestContext) -> &str {
        &ctx.request.url
    }

    /// Value of the header `name`, matched case-insensitively.
    pub fn header<'a>(ctx: &'a GuestContext, name: &str) -> Option<&'a str> {
        ctx.request.header(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ssr_engine_core::{PlatformState, RenderRequest};

    #[test]
    fn test_request_view() {
        let ctx = GuestContext::new(
            "test".into(),
            Arc::new(RenderRequest::get("/products?page=2").with_header("Accept-Language", "fr")),
            Arc::new(PlatformState::default()),
            None,
        );

        assert_eq!(RequestHost::url(&ctx), "/products?page=2");
        assert_eq!(RequestHost::header(&ctx, "accept-language"), Some("fr"));
        assert_eq!(RequestHost::header(&ctx, "cookie"), None);
    }
}
