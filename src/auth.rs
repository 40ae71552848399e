use crate::{
    config::{Config, PasswordConfig},
    db::{self, Session},
    reject::{self, Challenge, TryExt},
};
use anyhow::{anyhow, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::{fmt, str::FromStr};
use tokio::task;
use warp::{Filter, Rejection};

/// Permission level, ordered from least to most privileged
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
pub enum Level {
    Read = 1,
    Write = 2,
    Admin = 3,
}

impl FromStr for Level {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "1" | "read" => Ok(Self::Read),
            "2" | "write" => Ok(Self::Write),
            "3" | "admin" => Ok(Self::Admin),
            _ => Err(anyhow!("Unknown permission level `{}`", s)),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
            Self::Admin => f.write_str("admin"),
        }
    }
}

/// Requires a logged in user with at least the given level
///
/// Users are identified by their session cookie first, then by HTTP basic credentials.
/// Anonymous requests are redirected to the login page.
pub fn required(
    level: Level,
    db: &'static Db,
    config: &'static Config,
) -> impl Filter<Extract = (Session,), Error = Rejection> + Clone + Send + Sync + 'static {
    warp::cookie::optional(config.session.cookie.as_str())
        .and(warp::header::optional("Authorization"))
        .and_then(
            move |cookie: Option<String>, header: Option<String>| async move {
                let session = identify(cookie, header, db, config).await?;
                if session.level < level {
                    tracing::info!(user = %session.name, "insufficient permission level");
                    return Err(reject::unauthorized("Unauthorized", Challenge::Silent));
                }
                Ok(session)
            },
        )
}

#[tracing::instrument(level = "debug", skip(cookie, header, db, config))]
async fn identify(
    cookie: Option<String>,
    header: Option<String>,
    db: &Db,
    config: &Config,
) -> Result<Session, Rejection> {
    if let Some(token) = cookie {
        if let Some(session) = db::session(&token, db).or_500()? {
            return Ok(session);
        }
    }

    match header {
        Some(h) => basic(&h, db, config),
        None => Err(reject::login_required()),
    }
}

fn basic(header: &str, db: &Db, config: &Config) -> Result<Session, Rejection> {
    const DENIED: &str = "Unauthorized";

    let encoded = header
        .strip_prefix("Basic ")
        .or_unauthorized(DENIED, Challenge::Basic)?;
    let decoded = base64::decode(encoded).or_unauthorized(DENIED, Challenge::Basic)?;
    let decoded = String::from_utf8(decoded).or_unauthorized(DENIED, Challenge::Basic)?;
    let (name, password) = decoded
        .split_once(':')
        .or_unauthorized(DENIED, Challenge::Basic)?;

    login(name, password, db, config)
        .or_500()?
        .or_unauthorized(DENIED, Challenge::Basic)
}

/// Checks a user's credentials, returning their identity when they match
#[tracing::instrument(level = "debug", skip(password, db, config))]
pub fn login(name: &str, password: &str, db: &Db, config: &Config) -> Result<Option<Session>> {
    let user = match db::user(name, db)? {
        Some(u) => u,
        None => return Ok(None),
    };
    if !verify(&user.password_hash, password.as_bytes(), &config.password)? {
        return Ok(None);
    }

    Ok(Some(Session {
        name: name.to_owned(),
        level: user.level,
    }))
}

#[tracing::instrument(level = "debug", skip(password))]
pub fn hash(password: &[u8], config: &PasswordConfig) -> Result<String> {
    let mut cfg = argon2::Config::default();
    if let Some(hl) = config.hash_length {
        cfg.hash_length = hl;
    }
    if let Some(l) = config.lanes {
        cfg.lanes = l;
    }
    if let Some(mc) = config.memory_cost {
        cfg.mem_cost = mc;
    }
    if let Some(tc) = config.time_cost {
        cfg.time_cost = tc;
    }
    if let Some(s) = config.secret.as_ref().map(|s| s.as_bytes()) {
        cfg.secret = s;
    }

    let hashed = task::block_in_place(move || {
        let mut salt = vec![0; config.salt_length.unwrap_or(16)];
        rand::thread_rng().fill(&mut salt[..]);

        argon2::hash_encoded(password, &salt[..], &cfg)
    })?;
    Ok(hashed)
}

#[tracing::instrument(level = "debug", skip(encoded, password))]
fn verify(encoded: &str, password: &[u8], config: &PasswordConfig) -> Result<bool> {
    let res = match &config.secret {
        Some(s) => task::block_in_place(move || {
            argon2::verify_encoded_ext(encoded, password, s.as_bytes(), &[])
        })?,
        None => task::block_in_place(move || argon2::verify_encoded(encoded, password))?,
    };
    Ok(res)
}
