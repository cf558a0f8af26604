use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Propagates the client's `x-request-id` or assigns a fresh one.
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);

    let req_id_value = match req.headers().get(&header_name) {
        Some(value) => value.clone(),
        None => {
            let generated = Uuid::new_v4().to_string();
            match HeaderValue::from_str(&generated) {
                Ok(value) => {
                    req.headers_mut().insert(header_name.clone(), value.clone());
                    value
                }
                Err(_) => return next.run(req).await,
            }
        }
    };

    // Downstream handlers and the trace span read it from extensions
    req.extensions_mut().insert(req_id_value.clone());

    let mut res = next.run(req).await;
    res.headers_mut().insert(header_name, req_id_value);
    res
}
