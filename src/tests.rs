use crate::{
    auth::Level,
    config::{Config, PasswordConfig},
};
use serde_json::Value;
use sled::Db;
use tracing_subscriber::fmt::format::FmtSpan;
use warp::{http::StatusCode, test::RequestBuilder, Filter, Reply};

const PASSWORD: &str = "password";

fn setup() -> (&'static Config, &'static Db) {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_span_events(FmtSpan::CLOSE)
        .try_init()
        .ok();

    let config: &'static Config = Box::leak(Box::new(Config {
        password: PasswordConfig {
            memory_cost: Some(256),
            time_cost: Some(1),
            ..Default::default()
        },
        ..Default::default()
    }));
    let db: &'static Db = Box::leak(Box::new(
        sled::Config::default().temporary(true).open().unwrap(),
    ));

    crate::db::insert_user("admin", PASSWORD, Level::Admin, false, db, config).unwrap();
    crate::db::insert_user("writer", PASSWORD, Level::Write, false, db, config).unwrap();
    crate::db::insert_user("reader", PASSWORD, Level::Read, false, db, config).unwrap();

    (config, db)
}

fn form(path: &str, body: &str) -> RequestBuilder {
    warp::test::request()
        .method("POST")
        .path(path)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(body.to_owned())
}

fn location(reply: &warp::http::Response<bytes::Bytes>) -> &str {
    reply.headers().get("Location").unwrap().to_str().unwrap()
}

fn json(reply: &warp::http::Response<bytes::Bytes>) -> Value {
    serde_json::from_slice(reply.body()).unwrap()
}

async fn login<F>(filter: &F, name: &str) -> String
where
    F: Filter + 'static,
    F::Extract: Reply + Send,
{
    let reply = form("/login", &format!("username={}&password={}", name, PASSWORD))
        .reply(filter)
        .await;
    assert_eq!(reply.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&reply), "/");

    let cookie = reply
        .headers()
        .get("Set-Cookie")
        .unwrap()
        .to_str()
        .unwrap();
    cookie.split(';').next().unwrap().to_owned()
}

async fn create_group<F>(filter: &F, cookie: &str, name: &str) -> u64
where
    F: Filter + 'static,
    F::Extract: Reply + Send,
{
    let reply = form("/group/new", &format!("name={}", name))
        .header("Cookie", cookie)
        .reply(filter)
        .await;
    assert_eq!(reply.status(), StatusCode::SEE_OTHER);

    let reply = warp::test::request()
        .path("/")
        .header("Cookie", cookie)
        .reply(filter)
        .await;
    json(&reply)
        .as_array()
        .unwrap()
        .iter()
        .find(|g| g["name"] == name)
        .unwrap()["id"]
        .as_u64()
        .unwrap()
}

async fn create_entry<F>(filter: &F, cookie: &str, group: u64, body: &str) -> u64
where
    F: Filter + 'static,
    F::Extract: Reply + Send,
{
    let reply = form(&format!("/group/{}/new", group), body)
        .header("Cookie", cookie)
        .reply(filter)
        .await;
    assert_eq!(reply.status(), StatusCode::SEE_OTHER);
    location(&reply)
        .strip_prefix("/entry/")
        .unwrap()
        .parse()
        .unwrap()
}

fn multipart(path: &str, contents: &str) -> RequestBuilder {
    let boundary = "qbnotes-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"qbnotes.json\"\r\n\
         Content-Type: application/json\r\n\r\n{c}\r\n--{b}--\r\n",
        b = boundary,
        c = contents
    );
    warp::test::request()
        .method("POST")
        .path(path)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(body)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn anonymous_is_sent_to_login() {
    let (config, db) = setup();
    let filter = crate::routes::handler(config, db);

    let reply = warp::test::request().path("/").reply(&filter).await;
    assert_eq!(reply.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&reply), "/login");

    let reply = warp::test::request().path("/login").reply(&filter).await;
    assert_eq!(reply.status(), StatusCode::OK);
    assert!(std::str::from_utf8(reply.body()).unwrap().contains("<form"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bad_credentials() {
    let (config, db) = setup();
    let filter = crate::routes::handler(config, db);

    let reply = form("/login", "username=admin&password=wrong")
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::UNAUTHORIZED);
    assert!(reply.headers().get("Set-Cookie").is_none());

    let reply = form("/login", "username=nobody&password=wrong")
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::UNAUTHORIZED);

    let reply = form("/login", "username=admin&password=")
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::BAD_REQUEST);

    // retrying is always allowed
    login(&filter, "admin").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn logout_ends_session() {
    let (config, db) = setup();
    let filter = crate::routes::handler(config, db);
    let cookie = login(&filter, "reader").await;

    let reply = warp::test::request()
        .path("/logout")
        .header("Cookie", &cookie)
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&reply), "/login");

    let reply = warp::test::request()
        .path("/")
        .header("Cookie", &cookie)
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::SEE_OTHER);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn basic_credentials() {
    let (config, db) = setup();
    let filter = crate::routes::handler(config, db);

    let reply = warp::test::request()
        .path("/")
        .header(
            "Authorization",
            format!("Basic {}", base64::encode("reader:password")),
        )
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::OK);

    let reply = warp::test::request()
        .path("/")
        .header(
            "Authorization",
            format!("Basic {}", base64::encode("reader:nope")),
        )
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn entry_lifecycle() {
    let (config, db) = setup();
    let filter = crate::routes::handler(config, db);
    let admin = login(&filter, "admin").await;
    let writer = login(&filter, "writer").await;

    let group = create_group(&filter, &admin, "History").await;
    let entry = create_entry(
        &filter,
        &writer,
        group,
        "title=Ghent&creator=Adams&notes=ended+the+war+--+1814+->+peace",
    )
    .await;

    let reply = warp::test::request()
        .path(&format!("/entry/{}", entry))
        .header("Cookie", &writer)
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::OK);
    let detail = json(&reply);
    assert_eq!(detail["title"], "Ghent");
    assert_eq!(detail["notes"], "ended the war \u{2013} 1814 \u{2192} peace");
    assert_eq!(detail["group"]["name"], "History");
    let date_added = detail["date_added"].clone();

    let reply = form(
        &format!("/entry/{}/edit", entry),
        "title=Treaty+of+Ghent&creator=J.+Q.+Adams&notes=signed+1814",
    )
    .header("Cookie", &writer)
    .reply(&filter)
    .await;
    assert_eq!(reply.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&reply), format!("/entry/{}", entry));

    let reply = warp::test::request()
        .path(&format!("/entry/{}/edit", entry))
        .header("Cookie", &writer)
        .reply(&filter)
        .await;
    let detail = json(&reply);
    assert_eq!(detail["title"], "Treaty of Ghent");
    assert_eq!(detail["creator"], "J. Q. Adams");
    assert_eq!(detail["date_added"], date_added);

    let reply = warp::test::request()
        .path(&format!("/group/{}", group))
        .header("Cookie", &writer)
        .reply(&filter)
        .await;
    let detail = json(&reply);
    assert_eq!(detail["entries"].as_array().unwrap().len(), 1);
    assert_eq!(detail["entries"][0]["id"], entry);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_fields_save_nothing() {
    let (config, db) = setup();
    let filter = crate::routes::handler(config, db);
    let admin = login(&filter, "admin").await;
    let group = create_group(&filter, &admin, "Science").await;

    let reply = form(
        &format!("/group/{}/new", group),
        "title=Origin&creator=Darwin&notes=",
    )
    .header("Cookie", &admin)
    .reply(&filter)
    .await;
    assert_eq!(reply.status(), StatusCode::BAD_REQUEST);

    let reply = form("/group/new", "name=")
        .header("Cookie", &admin)
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::BAD_REQUEST);

    let groups = crate::db::groups(db).unwrap();
    assert_eq!(groups.len(), 1);
    assert!(groups[0].1.entries.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_ids() {
    let (config, db) = setup();
    let filter = crate::routes::handler(config, db);
    let admin = login(&filter, "admin").await;

    for path in &[
        "/group/4242",
        "/entry/4242",
        "/group/4242/stats",
        "/group/4242/study/q",
    ] {
        let reply = warp::test::request()
            .path(path)
            .header("Cookie", &admin)
            .reply(&filter)
            .await;
        assert_eq!(reply.status(), StatusCode::NOT_FOUND, "{}", path);
    }

    let reply = form("/group/4242/delete", "")
        .header("Cookie", &admin)
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::NOT_FOUND);

    let reply = form("/entry/4242/edit", "title=a&creator=b&notes=c")
        .header("Cookie", &admin)
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn levels_are_enforced() {
    let (config, db) = setup();
    let filter = crate::routes::handler(config, db);
    let admin = login(&filter, "admin").await;
    let writer = login(&filter, "writer").await;
    let reader = login(&filter, "reader").await;

    let group = create_group(&filter, &admin, "Art").await;
    let entry = create_entry(
        &filter,
        &admin,
        group,
        "title=Guernica&creator=Picasso&notes=bombing",
    )
    .await;

    let write_routes = vec![
        ("GET", format!("/group/{}/new", group)),
        ("POST", format!("/group/{}/new", group)),
        ("GET", format!("/entry/{}/edit", entry)),
        ("POST", format!("/entry/{}/edit", entry)),
    ];
    let admin_routes = vec![
        ("POST", "/group/new".to_owned()),
        ("POST", format!("/group/{}/delete", group)),
        ("POST", "/upload".to_owned()),
    ];

    for (method, path) in write_routes.iter().chain(&admin_routes) {
        let reply = warp::test::request()
            .method(method)
            .path(path)
            .header("Cookie", &reader)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body("name=x&title=x&creator=x&notes=x")
            .reply(&filter)
            .await;
        assert_eq!(reply.status(), StatusCode::UNAUTHORIZED, "{} {}", method, path);
    }
    for (method, path) in &admin_routes {
        let reply = warp::test::request()
            .method(method)
            .path(path)
            .header("Cookie", &writer)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body("name=x")
            .reply(&filter)
            .await;
        assert_eq!(reply.status(), StatusCode::UNAUTHORIZED, "{} {}", method, path);
    }

    for path in &[
        "/".to_owned(),
        format!("/group/{}", group),
        format!("/entry/{}", entry),
        format!("/group/{}/study", group),
        format!("/group/{}/study/q", group),
        format!("/group/{}/search?q=bomb", group),
        format!("/group/{}/stats", group),
        "/download".to_owned(),
    ] {
        let reply = warp::test::request()
            .path(path)
            .header("Cookie", &reader)
            .reply(&filter)
            .await;
        assert_eq!(reply.status(), StatusCode::OK, "{}", path);
    }

    let entry = crate::db::entry(entry, db).unwrap().unwrap();
    assert_eq!(entry.title, "Guernica");
    assert_eq!(crate::db::groups(db).unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deleting_a_group_deletes_its_entries() {
    let (config, db) = setup();
    let filter = crate::routes::handler(config, db);
    let admin = login(&filter, "admin").await;

    let group = create_group(&filter, &admin, "Music").await;
    let kept = create_group(&filter, &admin, "Film").await;
    let first = create_entry(&filter, &admin, group, "title=Bolero&creator=Ravel&notes=a").await;
    let second = create_entry(&filter, &admin, group, "title=Carmen&creator=Bizet&notes=b").await;
    let other = create_entry(&filter, &admin, kept, "title=Vertigo&creator=Hitchcock&notes=c").await;

    let reply = form(&format!("/group/{}/delete", group), "")
        .header("Cookie", &admin)
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&reply), "/");

    assert!(crate::db::group(group, db).unwrap().is_none());
    assert!(crate::db::entry(first, db).unwrap().is_none());
    assert!(crate::db::entry(second, db).unwrap().is_none());
    assert!(crate::db::entry(other, db).unwrap().is_some());

    let reply = warp::test::request()
        .path(&format!("/entry/{}", first))
        .header("Cookie", &admin)
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn search() {
    let (config, db) = setup();
    let filter = crate::routes::handler(config, db);
    let admin = login(&filter, "admin").await;

    let group = create_group(&filter, &admin, "History").await;
    let ghent = create_entry(
        &filter,
        &admin,
        group,
        "title=Ghent&creator=Adams&notes=Treaty+of+Ghent",
    )
    .await;
    create_entry(&filter, &admin, group, "title=Monroe&creator=Monroe&notes=1823").await;

    let reply = warp::test::request()
        .path(&format!("/group/{}/search?q=gHENT", group))
        .header("Cookie", &admin)
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::OK);
    let results = json(&reply);
    assert_eq!(results["query"], "gHENT");
    assert_eq!(results["results"].as_array().unwrap().len(), 1);
    assert_eq!(results["results"][0]["id"], ghent);

    let reply = warp::test::request()
        .path(&format!("/group/{}/search?q=", group))
        .header("Cookie", &admin)
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&reply), format!("/group/{}", group));

    let reply = warp::test::request()
        .path(&format!("/group/{}/search", group))
        .header("Cookie", &admin)
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stats() {
    let (config, db) = setup();
    let filter = crate::routes::handler(config, db);
    let admin = login(&filter, "admin").await;

    let group = create_group(&filter, &admin, "History").await;
    for (title, creator, len) in &[("A", "Adams", 50), ("B", "Monroe", 150), ("C", "Adams", 450)] {
        let body = format!("title={}&creator={}&notes={}", title, creator, "x".repeat(*len));
        create_entry(&filter, &admin, group, &body).await;
    }

    let reply = warp::test::request()
        .path(&format!("/group/{}/stats", group))
        .header("Cookie", &admin)
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::OK);
    let stats = json(&reply);
    assert_eq!(stats["group"]["name"], "History");
    assert_eq!(stats["nworks"], 3);
    assert_eq!(stats["ncreators"], 2);
    assert_eq!(stats["total_len"], 650);
    assert!((stats["avg_len"].as_f64().unwrap() - 216.67).abs() < 0.01);
    assert_eq!(
        stats["lengths_hist"]["data"],
        serde_json::json!([[0, 2], [200, 0], [400, 1]])
    );
    assert_eq!(stats["longest"][0], serde_json::json!(["C", 450]));

    let empty = create_group(&filter, &admin, "Empty").await;
    let reply = warp::test::request()
        .path(&format!("/group/{}/stats", empty))
        .header("Cookie", &admin)
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::OK);
    assert!(json(&reply)["avg_len"].is_null());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn study() {
    let (config, db) = setup();
    let filter = crate::routes::handler(config, db);
    let admin = login(&filter, "admin").await;

    let group = create_group(&filter, &admin, "Literature").await;
    create_entry(
        &filter,
        &admin,
        group,
        "title=Emma&creator=Austen&notes=%2B+matchmaking+in+Highbury%0A%2B+**Knightley**%0A---%0Aback",
    )
    .await;
    create_entry(&filter, &admin, group, "title=Short&creator=Anon&notes=tiny").await;

    let reply = warp::test::request()
        .path(&format!("/group/{}/study", group))
        .header("Cookie", &admin)
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::OK);
    assert_eq!(json(&reply)["entries"], 2);

    for _ in 0..10 {
        let reply = warp::test::request()
            .path(&format!("/group/{}/study/q", group))
            .header("Cookie", &admin)
            .reply(&filter)
            .await;
        assert_eq!(reply.status(), StatusCode::OK);
        let clues = json(&reply);
        for clue in clues.as_array().unwrap() {
            let text = clue["clue"].as_str().unwrap();
            assert!(text.chars().count() >= 16 || text.contains("**"), "{}", text);
            assert_eq!(clue["title"], "Emma");
            assert!(!text.starts_with('+'));
            assert_ne!(text, "back");
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn download_then_upload_round_trips() {
    let (config, db) = setup();
    let filter = crate::routes::handler(config, db);
    let admin = login(&filter, "admin").await;

    let history = create_group(&filter, &admin, "History").await;
    let art = create_group(&filter, &admin, "Art").await;
    create_entry(&filter, &admin, history, "title=Ghent&creator=Adams&notes=1814").await;
    create_entry(&filter, &admin, history, "title=Monroe&creator=Monroe&notes=1823").await;
    create_entry(&filter, &admin, art, "title=Guernica&creator=Picasso&notes=1937").await;

    let reply = warp::test::request()
        .path("/download")
        .header("Cookie", &admin)
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::OK);
    assert_eq!(
        reply.headers().get("Content-Disposition").unwrap(),
        r#"attachment; filename="qbnotes.json""#
    );
    let backup = std::str::from_utf8(reply.body()).unwrap().to_owned();
    let exported = json(&reply);
    assert_eq!(exported["History"]["Ghent"]["creator"], "Adams");
    assert_eq!(exported["Art"]["Guernica"]["notes"], "1937");

    let (config, db) = setup();
    let fresh = crate::routes::handler(config, db);
    let fresh_admin = login(&fresh, "admin").await;

    let reply = multipart("/upload", &backup)
        .header("Cookie", &fresh_admin)
        .reply(&fresh)
        .await;
    assert_eq!(reply.status(), StatusCode::SEE_OTHER);

    let reply = warp::test::request()
        .path("/download")
        .header("Cookie", &fresh_admin)
        .reply(&fresh)
        .await;
    assert_eq!(json(&reply), exported);

    // uploading again updates in place
    let reply = multipart("/upload", &backup)
        .header("Cookie", &fresh_admin)
        .reply(&fresh)
        .await;
    assert_eq!(reply.status(), StatusCode::SEE_OTHER);
    let groups = crate::db::groups(db).unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups.iter().map(|(_, g)| g.entries.len()).sum::<usize>(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn upload_merges_by_title_and_creator() {
    let (config, db) = setup();
    let filter = crate::routes::handler(config, db);
    let admin = login(&filter, "admin").await;

    let group = create_group(&filter, &admin, "History").await;
    let ghent = create_entry(&filter, &admin, group, "title=Ghent&creator=Adams&notes=old").await;
    let before = crate::db::entry(ghent, db).unwrap().unwrap();

    let doc = r#"{
        "History": {
            "Ghent": {"creator": "Adams", "notes": "new", "date": "2001-01-01"},
            "Vienna": {"creator": "Metternich", "notes": "1815", "date": "2010-05-04"}
        },
        "Science": {
            "Origin": {"creator": "Darwin", "notes": "finches"}
        }
    }"#;
    let reply = multipart("/upload", doc)
        .header("Cookie", &admin)
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&reply), "/");

    let after = crate::db::entry(ghent, db).unwrap().unwrap();
    assert_eq!(after.notes, "new");
    assert_eq!(after.date_added, before.date_added);

    let history = crate::db::group(group, db).unwrap().unwrap();
    assert_eq!(history.entries.len(), 2);
    let vienna = crate::db::entry(history.entries[1], db).unwrap().unwrap();
    assert_eq!(vienna.title, "Vienna");
    assert_eq!(vienna.date_added.to_string(), "2010-05-04");
    assert_eq!(vienna.group_id, group);

    let groups = crate::db::groups(db).unwrap();
    assert_eq!(groups.len(), 2);
    assert!(groups.iter().any(|(_, g)| g.name == "Science" && g.entries.len() == 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_upload_changes_nothing() {
    let (config, db) = setup();
    let filter = crate::routes::handler(config, db);
    let admin = login(&filter, "admin").await;

    let doc = r#"{"History": {"Ghent": {"creator": "Adams", "notes": "1814"}}, "Art": ["#;
    let reply = multipart("/upload", doc)
        .header("Cookie", &admin)
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::BAD_REQUEST);

    let doc = r#"{"History": {"Ghent": {"creator": "Adams", "notes": "1814", "date": "someday"}}}"#;
    let reply = multipart("/upload", doc)
        .header("Cookie", &admin)
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::BAD_REQUEST);

    assert!(crate::db::groups(db).unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn only_basic_failures_challenge() {
    let (config, db) = setup();
    let filter = crate::routes::handler(config, db);

    let reply = form("/login", "username=admin&password=wrong")
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::UNAUTHORIZED);
    assert!(reply.headers().get("WWW-Authenticate").is_none());
    assert_eq!(reply.body().as_ref(), b"Invalid username or password");

    let admin = login(&filter, "admin").await;
    let reader = login(&filter, "reader").await;
    let group = create_group(&filter, &admin, "History").await;
    let reply = warp::test::request()
        .path(&format!("/group/{}/new", group))
        .header("Cookie", &reader)
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::UNAUTHORIZED);
    assert!(reply.headers().get("WWW-Authenticate").is_none());

    let reply = warp::test::request()
        .path("/")
        .header(
            "Authorization",
            format!("Basic {}", base64::encode("reader:nope")),
        )
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        reply.headers().get("WWW-Authenticate").unwrap(),
        r#"Basic realm="qbnotes""#
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn new_entry_form_describes_group() {
    let (config, db) = setup();
    let filter = crate::routes::handler(config, db);
    let writer = login(&filter, "writer").await;
    let admin = login(&filter, "admin").await;

    let group = create_group(&filter, &admin, "Music").await;
    create_entry(&filter, &writer, group, "title=Carmen&creator=Bizet&notes=opera").await;

    let reply = warp::test::request()
        .path(&format!("/group/{}/new", group))
        .header("Cookie", &writer)
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::OK);
    assert_eq!(
        json(&reply),
        serde_json::json!({"id": group, "name": "Music", "entries": 1})
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn upload_reads_file_after_other_parts() {
    let (config, db) = setup();
    let filter = crate::routes::handler(config, db);
    let admin = login(&filter, "admin").await;

    let boundary = "qbnotes-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"comment\"\r\n\r\nnightly\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"qbnotes.json\"\r\n\
         Content-Type: application/json\r\n\r\n{c}\r\n--{b}--\r\n",
        b = boundary,
        c = r#"{"History":{"Ghent":{"creator":"Adams","notes":"1814"}}}"#
    );
    let reply = warp::test::request()
        .method("POST")
        .path("/upload")
        .header("Cookie", &admin)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(body)
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&reply), "/");

    let store = crate::db::store(db).unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(store[0].1.name, "History");
    assert_eq!(store[0].2[0].1.title, "Ghent");
    assert_eq!(store[0].2[0].1.notes, "1814");

    let reply = multipart("/upload", "")
        .header("Cookie", &admin)
        .reply(&filter)
        .await;
    assert_eq!(reply.status(), StatusCode::SEE_OTHER);
    assert_eq!(crate::db::store(db).unwrap().len(), 1);
}
