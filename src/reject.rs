use std::fmt::Display;
use warp::{
    http::{StatusCode, Uri},
    reject::{Reject, Rejection},
    reply::{Reply, Response},
};

/// How a 401 asks for credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Challenge {
    /// Plain message, the client retries through the login form
    Silent,
    /// `WWW-Authenticate` header for clients that sent Basic credentials
    Basic,
}

#[derive(Debug, Clone)]
pub enum QbRejection {
    BadRequest(String),
    Unauthorized(String, Challenge),
    LoginRequired,
    NotFound,
    InternalServerError,
}
impl Reject for QbRejection {}

impl QbRejection {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(..) => StatusCode::UNAUTHORIZED,
            Self::LoginRequired => StatusCode::SEE_OTHER,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Reply for QbRejection {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::BadRequest(reply) | Self::Unauthorized(reply, Challenge::Silent) => {
                warp::reply::with_status(reply, status).into_response()
            }
            Self::Unauthorized(reply, Challenge::Basic) => warp::reply::with_status(
                warp::reply::with_header(reply, "WWW-Authenticate", r#"Basic realm="qbnotes""#),
                status,
            )
            .into_response(),
            Self::LoginRequired => {
                warp::redirect::see_other(Uri::from_static("/login")).into_response()
            }
            Self::NotFound | Self::InternalServerError => warp::reply::with_status(
                status.canonical_reason().unwrap_or_default(),
                status,
            )
            .into_response(),
        }
    }
}

pub fn bad_request(reply: impl ToString) -> Rejection {
    warp::reject::custom(QbRejection::BadRequest(reply.to_string()))
}
pub fn unauthorized(reply: impl ToString, challenge: Challenge) -> Rejection {
    warp::reject::custom(QbRejection::Unauthorized(reply.to_string(), challenge))
}
pub fn login_required() -> Rejection {
    warp::reject::custom(QbRejection::LoginRequired)
}
pub fn not_found() -> Rejection {
    warp::reject::custom(QbRejection::NotFound)
}

/// Turns failures and missing values into rejections
pub trait TryExt<T>: Sized {
    fn or_reject(self, rejection: QbRejection) -> Result<T, Rejection>;

    fn or_404(self) -> Result<T, Rejection> {
        self.or_reject(QbRejection::NotFound)
    }
    fn or_500(self) -> Result<T, Rejection> {
        self.or_reject(QbRejection::InternalServerError)
    }
    fn or_bad_request(self, reply: impl ToString) -> Result<T, Rejection> {
        self.or_reject(QbRejection::BadRequest(reply.to_string()))
    }
    fn or_unauthorized(self, reply: impl ToString, challenge: Challenge) -> Result<T, Rejection> {
        self.or_reject(QbRejection::Unauthorized(reply.to_string(), challenge))
    }
}

impl<T, E: Display> TryExt<T> for Result<T, E> {
    fn or_reject(self, rejection: QbRejection) -> Result<T, Rejection> {
        self.map_err(|e| {
            if rejection.status().is_server_error() {
                tracing::error!("{}", e);
            } else {
                tracing::info!("{}", e);
            }
            warp::reject::custom(rejection)
        })
    }
}

impl<T> TryExt<T> for Option<T> {
    fn or_reject(self, rejection: QbRejection) -> Result<T, Rejection> {
        self.ok_or_else(|| warp::reject::custom(rejection))
    }
}

#[tracing::instrument(level = "debug")]
pub async fn handle_rejections(err: Rejection) -> Result<impl Reply, Rejection> {
    if err.is_not_found() {
        Ok(QbRejection::NotFound)
    } else if let Some(err) = err.find::<QbRejection>() {
        Ok(err.clone())
    } else {
        Err(err)
    }
}
