use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rocket::http::{Cookie, CookieJar, Status};
use rocket::outcome::Outcome::{Error as Failure, Success};
use rocket::request::{self, FromRequest, Request};
use rocket::time::OffsetDateTime;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::portal::Portal;
use crate::resp::problem::Problem;
use crate::role::Role;
use crate::session::{Principal, Session};

pub const AUTH_COOKIE_NAME: &str = "session";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken {
    #[serde(with = "chrono::serde::ts_seconds")]
    iat: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    exp: DateTime<Utc>,
    pub sub: String,
    pub role: Role,
}

impl SessionToken {
    pub fn new(principal: &Principal, valid_days: i64) -> SessionToken {
        let now = Utc::now();
        SessionToken {
            iat: now,
            exp: now + Duration::days(valid_days),
            sub: principal.id.clone(),
            role: principal.role,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.exp
    }

    pub fn encode_jwt(
        &self,
        secret: impl AsRef<[u8]>,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let header = Header::new(Algorithm::HS256);
        encode(&header, &self, &EncodingKey::from_secret(secret.as_ref()))
    }

    pub fn decode_jwt(
        token: &str,
        secret: impl AsRef<[u8]>,
    ) -> Result<SessionToken, jsonwebtoken::errors::Error> {
        decode::<SessionToken>(
            token,
            &DecodingKey::from_secret(secret.as_ref()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
    }
}

pub fn session_cookie(session: &Session) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE_NAME, session.token.clone()))
        .secure(true)
        .expires(OffsetDateTime::from_unix_timestamp(session.expires_at.timestamp()).ok())
        .path("/")
        .http_only(true)
        .finish()
}

pub fn auth_problem(detail: impl ToString) -> Problem {
    Problem::new_untyped(Status::Unauthorized, "Unable to authorize user.")
        .detail(detail)
        .clone()
}

fn extract_token(req: &Request<'_>, cookies: &CookieJar<'_>) -> Option<String> {
    let bearer = req
        .headers()
        .get_one("Authorization")
        .and_then(|it| it.strip_prefix("Bearer "))
        .map(|it| it.trim().to_string());

    bearer.or_else(|| cookies.get(AUTH_COOKIE_NAME).map(|c| c.value().to_string()))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Session {
    type Error = Problem;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        tracing::trace!("extracting session token from request");
        let token = match extract_token(req, req.cookies()) {
            Some(it) => it,
            None => return Failure((Status::Unauthorized, auth_problem("No session token."))),
        };

        let portal = match req.rocket().state::<Portal>() {
            Some(it) => it,
            None => {
                tracing::error!("portal isn't managed by rocket");
                let problem = Problem::from(ServiceError::RemoteUnavailable(
                    "portal state missing".to_string(),
                ));
                return Failure((problem.status, problem));
            }
        };

        match portal.identity().resume(&token).await {
            Ok(session) => {
                tracing::debug!("resumed session of user: {}", session.principal.id);
                Success(session)
            }
            Err(ServiceError::Unauthorized(reason)) => {
                Failure((Status::Unauthorized, auth_problem(reason)))
            }
            Err(e) => {
                let problem = Problem::from(e);
                Failure((problem.status, problem))
            }
        }
    }
}

pub mod doc {
    use utoipa::openapi::security::*;

    #[derive(Clone, Copy)]
    pub struct JWTAuth;

    impl From<JWTAuth> for SecurityScheme {
        fn from(_: JWTAuth) -> Self {
            let mut http = Http::new(HttpAuthScheme::Bearer);
            http.bearer_format = Some("JWT".to_string());
            SecurityScheme::Http(http)
        }
    }

    impl utoipa::Modify for JWTAuth {
        fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
            if let Some(c) = openapi.components.as_mut() {
                c.add_security_scheme("jwt", *self)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::SubsecRound;

    #[test]
    fn jwt_configured_properly() {
        let principal = Principal {
            id: "user-1".to_string(),
            role: Role::Guardian,
        };
        let mut token = SessionToken::new(&principal, 7);
        token.iat = token.iat.round_subsecs(0);
        token.exp = token.exp.round_subsecs(0);

        let encoded = token.encode_jwt("secret").expect("encoding should work");
        let decoded = SessionToken::decode_jwt(&encoded, "secret").expect("decoding should work");

        assert_eq!(decoded.iat, token.iat);
        assert_eq!(decoded.exp, token.exp);
        assert_eq!(decoded.sub, "user-1");
        assert_eq!(decoded.role, Role::Guardian);

        assert!(SessionToken::decode_jwt(&encoded, "other secret").is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let principal = Principal {
            id: "user-1".to_string(),
            role: Role::Student,
        };
        let token = SessionToken::new(&principal, -2);
        let encoded = token.encode_jwt("secret").expect("encoding should work");
        assert!(SessionToken::decode_jwt(&encoded, "secret").is_err());
    }
}
