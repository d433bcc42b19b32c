//! Handlers the kernel installs on its own.

use axum::http::header::ACCEPT;
use axum::http::StatusCode;

use crate::bus::HandlerResponse;
use crate::handler::registry::HandlerEntry;
use crate::routing::ErrorRoute;

/// `Error::show`: answers an `/error_XXX` route with its status.
///
/// AJAX callers and clients that accept JSON get an API error document,
/// everyone else a minimal page.
pub fn error_page() -> HandlerEntry {
    let reference = ErrorRoute::builtin_handler();
    HandlerEntry::new(reference.controller(), reference.action(), |ctx| {
        let status = ctx
            .route()
            .error_kind()
            .map(ErrorRoute::status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let reason = status.canonical_reason().unwrap_or("Error");

        let wants_json = ctx.request().is_ajax()
            || ctx
                .request()
                .header(ACCEPT.as_str())
                .map(|accept| accept.contains("application/json"))
                .unwrap_or(false);

        if wants_json {
            Ok(HandlerResponse::error(status, reason))
        } else {
            Ok(HandlerResponse::view(format!(
                "<h1>{} {}</h1>",
                status.as_u16(),
                reason
            ))
            .with_status(status))
        }
    })
}
