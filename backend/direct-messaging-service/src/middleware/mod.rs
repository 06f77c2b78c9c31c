pub mod error_handling;

use crate::error::AppError;
use actix_web::{FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use uuid::Uuid;

/// Header carrying the authenticated user, set by the upstream gateway.
pub const VIEWER_HEADER: &str = "X-User-Id";

/// The authenticated viewer of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
    pub id: Uuid,
}

impl Viewer {
    fn from_headers(req: &HttpRequest) -> Result<Self, AppError> {
        let id = req
            .headers()
            .get(VIEWER_HEADER)
            .and_then(|h| h.to_str().ok())
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .filter(|id| !id.is_nil())
            .ok_or(AppError::Unauthorized)?;
        Ok(Self { id })
    }
}

impl FromRequest for Viewer {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        ready(Self::from_headers(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_viewer_from_header() {
        let id = Uuid::new_v4();
        let req = TestRequest::default()
            .insert_header((VIEWER_HEADER, id.to_string()))
            .to_http_request();
        assert_eq!(Viewer::from_headers(&req).unwrap().id, id);
    }

    #[test]
    fn test_missing_or_invalid_viewer_is_unauthorized() {
        let req = TestRequest::default().to_http_request();
        assert!(matches!(Viewer::from_headers(&req), Err(AppError::Unauthorized)));

        let req = TestRequest::default()
            .insert_header((VIEWER_HEADER, "not-a-uuid"))
            .to_http_request();
        assert!(matches!(Viewer::from_headers(&req), Err(AppError::Unauthorized)));

        let req = TestRequest::default()
            .insert_header((VIEWER_HEADER, Uuid::nil().to_string()))
            .to_http_request();
        assert!(matches!(Viewer::from_headers(&req), Err(AppError::Unauthorized)));
    }
}
