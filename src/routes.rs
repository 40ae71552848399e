use crate::{
    auth::Level,
    config::Config,
    db::{self, Entry, Group, Session},
    quiz, reject,
    reject::{Challenge, TryExt},
    stats::{self, Stats},
    transfer,
    util::{field, see_other, typeset},
};
use bytes::Buf;
use chrono::{Local, NaiveDate};
use futures_util::TryStreamExt;
use serde::Serialize;
use sled::Db;
use std::collections::HashMap;
use warp::{
    http::{header, HeaderValue, Uri},
    multipart::FormData,
    reply::{Reply, Response},
    Filter, Rejection,
};

const LOGIN_FORM: &str = r#"<!DOCTYPE html>
<html>
<head><title>qbnotes login</title></head>
<body>
<form method="post" action="/login">
<input name="username" placeholder="Username" autofocus>
<input name="password" type="password" placeholder="Password">
<button type="submit">Log in</button>
</form>
</body>
</html>
"#;

pub fn handler(
    config: &'static Config,
    db: &'static Db,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone + Send + Sync + 'static {
    let required = move |level| crate::auth::required(level, db, config);
    let form = move || {
        warp::body::content_length_limit(config.limits.form)
            .and(warp::body::form::<HashMap<String, String>>())
    };

    let all_groups = warp::path::end()
        .and(warp::get())
        .and(required(Level::Read))
        .and_then(move |_| all_groups(db));
    let group = warp::path!("group" / u64)
        .and(warp::get())
        .and(required(Level::Read))
        .and_then(move |id, _| group(id, db));
    let entry = warp::path!("entry" / u64)
        .and(warp::get())
        .and(required(Level::Read))
        .and_then(move |id, _| entry(id, db));

    let new_group = warp::path!("group" / "new")
        .and(warp::post())
        .and(required(Level::Admin))
        .and(form())
        .and_then(move |session, form| new_group(session, form, db));
    let new_entry_form = warp::path!("group" / u64 / "new")
        .and(warp::get())
        .and(required(Level::Write))
        .and_then(move |id, _| group_summary(id, db));
    let new_entry = warp::path!("group" / u64 / "new")
        .and(warp::post())
        .and(required(Level::Write))
        .and(form())
        .and_then(move |id, session, form| new_entry(id, session, form, db));
    let edit_entry_form = warp::path!("entry" / u64 / "edit")
        .and(warp::get())
        .and(required(Level::Write))
        .and_then(move |id, _| self::entry(id, db));
    let edit_entry = warp::path!("entry" / u64 / "edit")
        .and(warp::post())
        .and(required(Level::Write))
        .and(form())
        .and_then(move |id, session, form| edit_entry(id, session, form, db));
    let delete_group = warp::path!("group" / u64 / "delete")
        .and(warp::post())
        .and(required(Level::Admin))
        .and_then(move |id, session| delete_group(id, session, db));

    let login_form = warp::path!("login")
        .and(warp::get())
        .map(|| warp::reply::html(LOGIN_FORM));
    let login = warp::path!("login")
        .and(warp::post())
        .and(form())
        .and_then(move |form| login(form, db, config));
    let logout = warp::path!("logout")
        .and(warp::get())
        .and(warp::cookie::optional(config.session.cookie.as_str()))
        .and_then(move |cookie| logout(cookie, db, config));

    let study = warp::path!("group" / u64 / "study")
        .and(warp::get())
        .and(required(Level::Read))
        .and_then(move |id, _| study(id, db));
    let questions = warp::path!("group" / u64 / "study" / "q")
        .and(warp::get())
        .and(required(Level::Read))
        .and_then(move |id, _| questions(id, db));
    let search = warp::path!("group" / u64 / "search")
        .and(warp::get())
        .and(required(Level::Read))
        .and(warp::query::<HashMap<String, String>>())
        .and_then(move |id, _, query| search(id, query, db));
    let stats = warp::path!("group" / u64 / "stats")
        .and(warp::get())
        .and(required(Level::Read))
        .and_then(move |id, _| group_stats(id, db));

    let download = warp::path!("download")
        .and(warp::get())
        .and(required(Level::Read))
        .and_then(move |_| download(db));
    let upload = warp::path!("upload")
        .and(warp::post())
        .and(required(Level::Admin))
        .and(warp::multipart::form().max_length(config.limits.upload))
        .and_then(move |session, form| upload(session, form, db));

    all_groups
        .or(group)
        .or(entry)
        .or(new_group)
        .or(new_entry_form)
        .or(new_entry)
        .or(edit_entry_form)
        .or(edit_entry)
        .or(delete_group)
        .or(login_form)
        .or(login)
        .or(logout)
        .or(study)
        .or(questions)
        .or(search)
        .or(stats)
        .or(download)
        .or(upload)
        .recover(reject::handle_rejections)
        .with(warp::trace::request())
}

#[derive(Debug, Serialize)]
struct GroupSummary {
    id: u64,
    name: String,
    entries: usize,
}

#[derive(Debug, Serialize)]
struct GroupRef {
    id: u64,
    name: String,
}

#[derive(Debug, Serialize)]
struct EntrySummary {
    id: u64,
    title: String,
    creator: String,
    date_added: NaiveDate,
}

impl EntrySummary {
    fn new(id: u64, e: Entry) -> Self {
        Self {
            id,
            title: e.title,
            creator: e.creator,
            date_added: e.date_added,
        }
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn load_group(id: u64, db: &Db) -> Result<Group, Rejection> {
    db::group(id, db).or_500()?.or_404()
}

#[tracing::instrument(level = "debug", skip(db))]
async fn all_groups(db: &Db) -> Result<impl Reply, Rejection> {
    let mut groups: Vec<GroupSummary> = db::groups(db)
        .or_500()?
        .into_iter()
        .map(|(id, g)| GroupSummary {
            id,
            name: g.name,
            entries: g.entries.len(),
        })
        .collect();
    groups.sort_by(|a, b| b.entries.cmp(&a.entries));
    Ok(warp::reply::json(&groups))
}

#[tracing::instrument(level = "debug", skip(db))]
async fn group(id: u64, db: &Db) -> Result<impl Reply, Rejection> {
    #[derive(Serialize)]
    struct GroupDetail {
        id: u64,
        name: String,
        entries: Vec<EntrySummary>,
    }

    let group = load_group(id, db)?;
    let entries = db::entries(&group, db)
        .or_500()?
        .into_iter()
        .map(|(id, e)| EntrySummary::new(id, e))
        .collect();
    Ok(warp::reply::json(&GroupDetail {
        id,
        name: group.name,
        entries,
    }))
}

#[tracing::instrument(level = "debug", skip(db))]
async fn group_summary(id: u64, db: &Db) -> Result<impl Reply, Rejection> {
    let group = load_group(id, db)?;
    Ok(warp::reply::json(&GroupSummary {
        id,
        name: group.name,
        entries: group.entries.len(),
    }))
}

#[tracing::instrument(level = "debug", skip(db))]
async fn entry(id: u64, db: &Db) -> Result<impl Reply, Rejection> {
    #[derive(Serialize)]
    struct EntryDetail {
        id: u64,
        title: String,
        creator: String,
        notes: String,
        date_added: NaiveDate,
        group: GroupRef,
    }

    let entry = db::entry(id, db).or_500()?.or_404()?;
    let group = load_group(entry.group_id, db)?;
    Ok(warp::reply::json(&EntryDetail {
        id,
        title: entry.title,
        creator: entry.creator,
        notes: entry.notes,
        date_added: entry.date_added,
        group: GroupRef {
            id: entry.group_id,
            name: group.name,
        },
    }))
}

#[tracing::instrument(level = "debug", skip(form, db))]
async fn new_group(
    session: Session,
    form: HashMap<String, String>,
    db: &Db,
) -> Result<Response, Rejection> {
    let name = field(&form, "name")?;
    let id = db::insert_group(name, db).or_500()?;
    tracing::info!(user = %session.name, id, name, "group created");
    see_other("/".to_owned())
}

#[tracing::instrument(level = "debug", skip(form, db))]
async fn new_entry(
    group_id: u64,
    session: Session,
    form: HashMap<String, String>,
    db: &Db,
) -> Result<Response, Rejection> {
    load_group(group_id, db)?;
    let (title, creator, notes) = (
        field(&form, "title")?,
        field(&form, "creator")?,
        field(&form, "notes")?,
    );

    let id = db::insert_entry(group_id, title, creator, &typeset(notes), today(), db)
        .or_500()?
        .or_404()?;
    tracing::info!(user = %session.name, id, group_id, "entry created");
    see_other(format!("/entry/{}", id))
}

#[tracing::instrument(level = "debug", skip(form, db))]
async fn edit_entry(
    id: u64,
    session: Session,
    form: HashMap<String, String>,
    db: &Db,
) -> Result<Response, Rejection> {
    db::entry(id, db).or_500()?.or_404()?;
    let (title, creator, notes) = (
        field(&form, "title")?,
        field(&form, "creator")?,
        field(&form, "notes")?,
    );

    if !db::update_entry(id, title, creator, &typeset(notes), db).or_500()? {
        return Err(reject::not_found());
    }
    tracing::info!(user = %session.name, id, "entry updated");
    see_other(format!("/entry/{}", id))
}

#[tracing::instrument(level = "debug", skip(db))]
async fn delete_group(id: u64, session: Session, db: &Db) -> Result<Response, Rejection> {
    if !db::delete_group(id, db).or_500()? {
        return Err(reject::not_found());
    }
    tracing::info!(user = %session.name, id, "group deleted");
    see_other("/".to_owned())
}

#[tracing::instrument(level = "debug", skip(form, db, config))]
async fn login(
    form: HashMap<String, String>,
    db: &Db,
    config: &Config,
) -> Result<Response, Rejection> {
    let (name, password) = (field(&form, "username")?, field(&form, "password")?);
    let session = crate::auth::login(name, password, db, config)
        .or_500()?
        .or_unauthorized("Invalid username or password", Challenge::Silent)?;

    let token = db::create_session(&session, db).or_500()?;
    tracing::info!(user = %session.name, level = %session.level, "logged in");

    let mut cookie = format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax",
        config.session.cookie, token
    );
    if config.session.secure {
        cookie.push_str("; Secure");
    }

    let mut res = warp::redirect::see_other(Uri::from_static("/")).into_response();
    res.headers_mut()
        .insert(header::SET_COOKIE, HeaderValue::from_str(&cookie).or_500()?);
    Ok(res)
}

#[tracing::instrument(level = "debug", skip(cookie, db, config))]
async fn logout(cookie: Option<String>, db: &Db, config: &Config) -> Result<Response, Rejection> {
    if let Some(token) = cookie {
        db::delete_session(&token, db).or_500()?;
    }

    let cookie = format!("{}=; Max-Age=0; Path=/", config.session.cookie);
    let mut res = warp::redirect::see_other(Uri::from_static("/login")).into_response();
    res.headers_mut()
        .insert(header::SET_COOKIE, HeaderValue::from_str(&cookie).or_500()?);
    Ok(res)
}

#[tracing::instrument(level = "debug", skip(db))]
async fn study(id: u64, db: &Db) -> Result<impl Reply, Rejection> {
    #[derive(Serialize)]
    struct Study {
        id: u64,
        name: String,
        entries: usize,
        questions: String,
    }

    let group = load_group(id, db)?;
    Ok(warp::reply::json(&Study {
        id,
        entries: group.entries.len(),
        name: group.name,
        questions: format!("/group/{}/study/q", id),
    }))
}

#[tracing::instrument(level = "debug", skip(db))]
async fn questions(id: u64, db: &Db) -> Result<impl Reply, Rejection> {
    let group = load_group(id, db)?;
    let entries = db::entries(&group, db).or_500()?;
    let clues = quiz::questions(&entries, &mut rand::thread_rng());
    Ok(warp::reply::json(&clues))
}

#[tracing::instrument(level = "debug", skip(db))]
async fn search(
    id: u64,
    query: HashMap<String, String>,
    db: &Db,
) -> Result<Response, Rejection> {
    #[derive(Serialize)]
    struct Search<'a> {
        group: GroupRef,
        query: &'a str,
        results: Vec<EntrySummary>,
    }

    let group = load_group(id, db)?;
    let q = query.get("q").or_bad_request("Missing query")?;
    if q.is_empty() {
        return see_other(format!("/group/{}", id));
    }

    let needle = q.to_lowercase();
    let results = db::entries(&group, db)
        .or_500()?
        .into_iter()
        .filter(|(_, e)| e.notes.to_lowercase().contains(&needle))
        .map(|(id, e)| EntrySummary::new(id, e))
        .collect();
    Ok(warp::reply::json(&Search {
        group: GroupRef {
            id,
            name: group.name,
        },
        query: q,
        results,
    })
    .into_response())
}

#[tracing::instrument(level = "debug", skip(db))]
async fn group_stats(id: u64, db: &Db) -> Result<impl Reply, Rejection> {
    #[derive(Serialize)]
    struct GroupStats {
        group: GroupRef,
        #[serde(flatten)]
        stats: Stats,
    }

    let group = load_group(id, db)?;
    let entries = db::entries(&group, db).or_500()?;
    let stats = stats::compute(&entries, today());
    Ok(warp::reply::json(&GroupStats {
        group: GroupRef {
            id,
            name: group.name,
        },
        stats,
    }))
}

#[tracing::instrument(level = "debug", skip(db))]
async fn download(db: &Db) -> Result<impl Reply, Rejection> {
    let store = db::store(db).or_500()?;
    let body = transfer::to_pretty_json(&transfer::export(&store)).or_500()?;
    Ok(warp::reply::with_header(
        warp::reply::with_header(body, header::CONTENT_TYPE, "application/json"),
        header::CONTENT_DISPOSITION,
        r#"attachment; filename="qbnotes.json""#,
    ))
}

/// Merges an uploaded backup into the store
///
/// Nothing is written unless the whole document parses.
#[tracing::instrument(level = "debug", skip(form, db))]
async fn upload(session: Session, mut form: FormData, db: &Db) -> Result<Response, Rejection> {
    let mut file = None;
    while let Some(part) = form.try_next().await.or_bad_request("Malformed form")? {
        if part.name() != "file" {
            continue;
        }
        let data = part
            .stream()
            .try_fold(Vec::new(), |mut acc, buf| async move {
                acc.extend_from_slice(buf.chunk());
                Ok(acc)
            })
            .await
            .or_bad_request("Malformed form")?;
        file = Some(data);
    }

    let file = file.or_bad_request("Missing file")?;
    if file.is_empty() {
        return see_other("/".to_owned());
    }
    let doc = transfer::parse(&file).or_bad_request("Malformed upload document")?;

    let store = db::store(db).or_500()?;
    let plan = transfer::plan(doc, &store, today());
    let report = db::merge(&plan, db).or_500()?;
    tracing::info!(
        user = %session.name,
        groups_created = report.groups_created,
        entries_created = report.entries_created,
        entries_updated = report.entries_updated,
        "backup merged"
    );

    see_other("/".to_owned())
}
