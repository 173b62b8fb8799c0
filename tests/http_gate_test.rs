use quill::config::Config;
use quill::db::{self, queries};
use quill::routes;
use quill::state::{AppState, DbPool};
use tempfile::TempDir;

/// Boot the app on an ephemeral port against a temp database.
async fn spawn_app() -> (String, DbPool, TempDir) {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("test.db");
    let pool = db::create_pool(&db_path).expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");

    let mut config = Config::default();
    config.database.path = Some(db_path);
    config.storage.path = Some(tmp.path().join("uploads"));

    let state = AppState {
        db: pool.clone(),
        config,
    };
    let app = routes::router().with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), pool, tmp)
}

fn seed_author(pool: &DbPool, username: &str, password: &str) -> String {
    let conn = pool.get().unwrap();
    let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST).unwrap();
    queries::insert_user(
        &conn,
        &queries::NewUser {
            username,
            first_name: "",
            last_name: "",
            email: "",
            password_hash: &hash,
        },
    )
    .unwrap()
}

fn seed_unpublished_post(pool: &DbPool, author_id: &str, title: &str) -> String {
    let conn = pool.get().unwrap();
    let id = queries::insert_post(
        &conn,
        author_id,
        &queries::NewPost {
            title,
            text: "draft body",
            pub_date: "2024-01-01 00:00:00",
            category_id: None,
            location_id: None,
            image_path: None,
        },
    )
    .unwrap();
    conn.execute(
        "UPDATE posts SET is_published = 0 WHERE id = ?1",
        rusqlite::params![id],
    )
    .unwrap();
    id
}

#[tokio::test]
async fn unpublished_post_is_404_for_anonymous_but_200_for_author() {
    let (base, pool, _tmp) = spawn_app().await;
    let author = seed_author(&pool, "alice", "correct horse battery");
    let post_id = seed_unpublished_post(&pool, &author, "Secret draft");

    // Anonymous request: indistinguishable from a missing post
    let anon = reqwest::Client::new();
    let resp = anon.get(format!("{base}/posts/{post_id}")).send().await.unwrap();
    assert_eq!(resp.status(), 404);

    // Log in as the author, then the same request serves the draft
    let client = reqwest::Client::builder()
        .cookie_store(true)
        .build()
        .unwrap();
    let login = client
        .post(format!("{base}/auth/login"))
        .form(&[("username", "alice"), ("password", "correct horse battery")])
        .send()
        .await
        .unwrap();
    assert!(login.status().is_success());

    let resp = client.get(format!("{base}/posts/{post_id}")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert!(body.contains("Secret draft"));
}

#[tokio::test]
async fn protected_actions_redirect_anonymous_users_to_login() {
    let (base, _pool, _tmp) = spawn_app().await;

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();
    let resp = client.get(format!("{base}/posts/create")).send().await.unwrap();
    assert_eq!(resp.status(), 303);
    assert_eq!(resp.headers()["location"], "/auth/login");
}

#[tokio::test]
async fn non_owner_edit_redirects_silently_to_the_post() {
    let (base, pool, _tmp) = spawn_app().await;
    let alice = seed_author(&pool, "alice", "correct horse battery");
    seed_author(&pool, "bob", "correct horse battery");
    let post_id = {
        let conn = pool.get().unwrap();
        queries::insert_post(
            &conn,
            &alice,
            &queries::NewPost {
                title: "Alice's post",
                text: "body",
                pub_date: "2024-01-01 00:00:00",
                category_id: None,
                location_id: None,
                image_path: None,
            },
        )
        .unwrap()
    };

    let client = reqwest::Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();
    let login = client
        .post(format!("{base}/auth/login"))
        .form(&[("username", "bob"), ("password", "correct horse battery")])
        .send()
        .await
        .unwrap();
    assert_eq!(login.status(), 303);

    // Not an error page: just a bounce back to the canonical view
    let resp = client
        .get(format!("{base}/posts/{post_id}/edit"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 303);
    assert_eq!(
        resp.headers()["location"],
        format!("/posts/{post_id}")
    );
}

#[tokio::test]
async fn registration_rejects_usernames_unsafe_for_urls() {
    let (base, pool, _tmp) = spawn_app().await;

    // A newline survives form encoding; accepted, it would later reach a
    // Location header via /profile/{username} redirects.
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/auth/registration"))
        .form(&[
            ("username", "a\nb"),
            ("password1", "correct horse battery"),
            ("password2", "correct horse battery"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert!(body.contains("Usernames may only contain"));

    let conn = pool.get().unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn mismatched_registration_passwords_create_no_user() {
    let (base, pool, _tmp) = spawn_app().await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/auth/registration"))
        .form(&[
            ("username", "carol"),
            ("password1", "correct horse battery"),
            ("password2", "battery horse correct"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert!(body.contains("Passwords do not match"));

    let conn = pool.get().unwrap();
    assert!(queries::user_by_username(&conn, "carol").unwrap().is_none());
}
