use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::{Category, Comment, Post, User};

/// Fixed page size for every post listing.
pub const PAGE_SIZE: i64 = 10;

/// Timestamp format used everywhere in the schema. Lexicographic order on
/// these strings matches chronological order, so SQL string comparison
/// against `pub_date` is sound.
pub const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn now_stamp() -> String {
    chrono::Utc::now().format(STAMP_FORMAT).to_string()
}

/// A post row as it appears in a feed listing, joined with its author and
/// optional category/location, annotated with its comment count.
#[derive(Debug, Clone)]
pub struct PostSummary {
    pub id: String,
    pub title: String,
    pub text: String,
    pub pub_date: String,
    pub author_username: String,
    pub category_title: String,
    pub category_slug: String,
    pub location_name: String,
    pub image_path: String,
    pub is_published: bool,
    pub comment_count: i64,
}

#[derive(Debug, Clone)]
pub struct PostPage {
    pub posts: Vec<PostSummary>,
    pub number: i64,
    pub total_pages: i64,
}

impl PostPage {
    pub fn has_prev(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total_pages
    }
}

/// An out-of-range page clamps to the nearest valid one; an empty result
/// set is still page 1 of 1.
fn clamp_page(requested: i64, total_rows: i64) -> (i64, i64) {
    let total_pages = ((total_rows + PAGE_SIZE - 1) / PAGE_SIZE).max(1);
    (requested.clamp(1, total_pages), total_pages)
}

fn summary_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PostSummary> {
    Ok(PostSummary {
        id: row.get(0)?,
        title: row.get(1)?,
        text: row.get(2)?,
        pub_date: row.get(3)?,
        author_username: row.get(4)?,
        category_title: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        category_slug: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        location_name: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        image_path: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        is_published: row.get(9)?,
        comment_count: row.get(10)?,
    })
}

const SUMMARY_COLUMNS: &str = "p.id, p.title, p.text, p.pub_date, u.username, \
     c.title, c.slug, l.name, p.image_path, p.is_published, \
     (SELECT COUNT(*) FROM comments cm WHERE cm.post_id = p.id)";

/// Home feed: published posts in published categories, dated at or before
/// `now`. Posts without a category never appear here.
pub fn home_feed(conn: &Connection, now: &str, page: i64) -> rusqlite::Result<PostPage> {
    let total_rows: i64 = conn.query_row(
        "SELECT COUNT(*) FROM posts p \
         JOIN categories c ON c.id = p.category_id \
         WHERE p.is_published = 1 AND c.is_published = 1 AND p.pub_date <= ?1",
        params![now],
        |row| row.get(0),
    )?;
    let (number, total_pages) = clamp_page(page, total_rows);

    let mut stmt = conn.prepare(&format!(
        "SELECT {SUMMARY_COLUMNS} FROM posts p \
         JOIN categories c ON c.id = p.category_id \
         JOIN users u ON u.id = p.author_id \
         LEFT JOIN locations l ON l.id = p.location_id \
         WHERE p.is_published = 1 AND c.is_published = 1 AND p.pub_date <= ?1 \
         ORDER BY p.pub_date DESC \
         LIMIT ?2 OFFSET ?3"
    ))?;
    let posts = stmt
        .query_map(
            params![now, PAGE_SIZE, (number - 1) * PAGE_SIZE],
            summary_from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(PostPage {
        posts,
        number,
        total_pages,
    })
}

/// Category feed. Returns `None` when the category does not exist or is
/// unpublished; an unpublished category 404s the whole listing.
pub fn category_feed(
    conn: &Connection,
    slug: &str,
    now: &str,
    page: i64,
) -> rusqlite::Result<Option<(Category, PostPage)>> {
    let category = conn
        .query_row(
            "SELECT id, title, slug, description, is_published, created_at \
             FROM categories WHERE slug = ?1 AND is_published = 1",
            params![slug],
            |row| {
                Ok(Category {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    slug: row.get(2)?,
                    description: row.get(3)?,
                    is_published: row.get(4)?,
                    created_at: row.get(5)?,
                })
            },
        )
        .optional()?;

    let Some(category) = category else {
        return Ok(None);
    };

    let total_rows: i64 = conn.query_row(
        "SELECT COUNT(*) FROM posts p \
         WHERE p.category_id = ?1 AND p.is_published = 1 AND p.pub_date <= ?2",
        params![category.id, now],
        |row| row.get(0),
    )?;
    let (number, total_pages) = clamp_page(page, total_rows);

    let mut stmt = conn.prepare(&format!(
        "SELECT {SUMMARY_COLUMNS} FROM posts p \
         JOIN categories c ON c.id = p.category_id \
         JOIN users u ON u.id = p.author_id \
         LEFT JOIN locations l ON l.id = p.location_id \
         WHERE p.category_id = ?1 AND p.is_published = 1 AND p.pub_date <= ?2 \
         ORDER BY p.pub_date DESC \
         LIMIT ?3 OFFSET ?4"
    ))?;
    let posts = stmt
        .query_map(
            params![category.id, now, PAGE_SIZE, (number - 1) * PAGE_SIZE],
            summary_from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Some((
        category,
        PostPage {
            posts,
            number,
            total_pages,
        },
    )))
}

/// Profile feed: every post by the named user, visibility flags ignored.
/// Returns `None` when the user does not exist.
pub fn profile_feed(
    conn: &Connection,
    username: &str,
    page: i64,
) -> rusqlite::Result<Option<(User, PostPage)>> {
    let Some(user) = user_by_username(conn, username)? else {
        return Ok(None);
    };

    let total_rows: i64 = conn.query_row(
        "SELECT COUNT(*) FROM posts p WHERE p.author_id = ?1",
        params![user.id],
        |row| row.get(0),
    )?;
    let (number, total_pages) = clamp_page(page, total_rows);

    let mut stmt = conn.prepare(&format!(
        "SELECT {SUMMARY_COLUMNS} FROM posts p \
         JOIN users u ON u.id = p.author_id \
         LEFT JOIN categories c ON c.id = p.category_id \
         LEFT JOIN locations l ON l.id = p.location_id \
         WHERE p.author_id = ?1 \
         ORDER BY p.pub_date DESC \
         LIMIT ?2 OFFSET ?3"
    ))?;
    let posts = stmt
        .query_map(
            params![user.id, PAGE_SIZE, (number - 1) * PAGE_SIZE],
            summary_from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Some((
        user,
        PostPage {
            posts,
            number,
            total_pages,
        },
    )))
}

/// A single post fetched unconditionally by id. Visibility is decided
/// after the fetch, never in the query.
#[derive(Debug, Clone)]
pub struct PostDetail {
    pub id: String,
    pub title: String,
    pub text: String,
    pub pub_date: String,
    pub author_id: String,
    pub author_username: String,
    pub category_id: Option<String>,
    pub category_title: String,
    pub category_slug: String,
    pub category_is_published: Option<bool>,
    pub location_id: Option<String>,
    pub location_name: String,
    pub image_path: String,
    pub is_published: bool,
}

impl PostDetail {
    /// The public-visibility predicate. A missing category does not hide
    /// the post here; only an explicitly unpublished one does.
    pub fn publicly_visible(&self, now: &str) -> bool {
        self.is_published
            && self.category_is_published.unwrap_or(true)
            && self.pub_date.as_str() <= now
    }

    /// The author always sees their own post; everyone else needs the
    /// public predicate to hold.
    pub fn visible_to(&self, viewer_id: Option<&str>, now: &str) -> bool {
        viewer_id == Some(self.author_id.as_str()) || self.publicly_visible(now)
    }
}

pub fn post_detail(conn: &Connection, post_id: &str) -> rusqlite::Result<Option<PostDetail>> {
    conn.query_row(
        "SELECT p.id, p.title, p.text, p.pub_date, p.author_id, u.username, \
                p.category_id, c.title, c.slug, c.is_published, \
                p.location_id, l.name, p.image_path, p.is_published \
         FROM posts p \
         JOIN users u ON u.id = p.author_id \
         LEFT JOIN categories c ON c.id = p.category_id \
         LEFT JOIN locations l ON l.id = p.location_id \
         WHERE p.id = ?1",
        params![post_id],
        |row| {
            Ok(PostDetail {
                id: row.get(0)?,
                title: row.get(1)?,
                text: row.get(2)?,
                pub_date: row.get(3)?,
                author_id: row.get(4)?,
                author_username: row.get(5)?,
                category_id: row.get(6)?,
                category_title: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                category_slug: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
                category_is_published: row.get(9)?,
                location_id: row.get(10)?,
                location_name: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
                image_path: row.get::<_, Option<String>>(12)?.unwrap_or_default(),
                is_published: row.get(13)?,
            })
        },
    )
    .optional()
}

/// A comment joined with its author's username, for the detail page.
#[derive(Debug, Clone)]
pub struct CommentRow {
    pub id: String,
    pub author_id: String,
    pub author_username: String,
    pub text: String,
    pub created_at: String,
}

/// Comments on a post, oldest first.
pub fn post_comments(conn: &Connection, post_id: &str) -> rusqlite::Result<Vec<CommentRow>> {
    let mut stmt = conn.prepare(
        "SELECT cm.id, cm.author_id, u.username, cm.text, cm.created_at \
         FROM comments cm \
         JOIN users u ON u.id = cm.author_id \
         WHERE cm.post_id = ?1 \
         ORDER BY cm.created_at ASC, cm.id ASC",
    )?;
    let rows = stmt
        .query_map(params![post_id], |row| {
            Ok(CommentRow {
                id: row.get(0)?,
                author_id: row.get(1)?,
                author_username: row.get(2)?,
                text: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?
        .collect();
    rows
}

/// Outcome of looking up an entity on behalf of a would-be mutator.
/// `NotOwner` is what the handlers turn into a silent redirect.
#[derive(Debug)]
pub enum OwnerLookup<T> {
    Missing,
    NotOwner,
    Owned(T),
}

pub fn post_for_owner(
    conn: &Connection,
    post_id: &str,
    user_id: &str,
) -> rusqlite::Result<OwnerLookup<Post>> {
    let post = conn
        .query_row(
            "SELECT id, title, text, pub_date, author_id, category_id, location_id, \
                    image_path, is_published, created_at \
             FROM posts WHERE id = ?1",
            params![post_id],
            |row| {
                Ok(Post {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    text: row.get(2)?,
                    pub_date: row.get(3)?,
                    author_id: row.get(4)?,
                    category_id: row.get(5)?,
                    location_id: row.get(6)?,
                    image_path: row.get(7)?,
                    is_published: row.get(8)?,
                    created_at: row.get(9)?,
                })
            },
        )
        .optional()?;

    Ok(match post {
        None => OwnerLookup::Missing,
        Some(p) if p.author_id != user_id => OwnerLookup::NotOwner,
        Some(p) => OwnerLookup::Owned(p),
    })
}

/// Comment lookup for mutation; the id must also belong to the stated
/// parent post.
pub fn comment_for_owner(
    conn: &Connection,
    post_id: &str,
    comment_id: &str,
    user_id: &str,
) -> rusqlite::Result<OwnerLookup<Comment>> {
    let comment = conn
        .query_row(
            "SELECT id, post_id, author_id, text, created_at \
             FROM comments WHERE id = ?1 AND post_id = ?2",
            params![comment_id, post_id],
            |row| {
                Ok(Comment {
                    id: row.get(0)?,
                    post_id: row.get(1)?,
                    author_id: row.get(2)?,
                    text: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )
        .optional()?;

    Ok(match comment {
        None => OwnerLookup::Missing,
        Some(c) if c.author_id != user_id => OwnerLookup::NotOwner,
        Some(c) => OwnerLookup::Owned(c),
    })
}

// -- Post mutations --

pub struct NewPost<'a> {
    pub title: &'a str,
    pub text: &'a str,
    pub pub_date: &'a str,
    pub category_id: Option<&'a str>,
    pub location_id: Option<&'a str>,
    pub image_path: Option<&'a str>,
}

/// Insert a post owned by `author_id`. The author is never taken from the
/// submitted form fields.
pub fn insert_post(conn: &Connection, author_id: &str, post: &NewPost) -> rusqlite::Result<String> {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO posts (id, title, text, pub_date, author_id, category_id, \
                            location_id, image_path) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            post.title,
            post.text,
            post.pub_date,
            author_id,
            post.category_id,
            post.location_id,
            post.image_path,
        ],
    )?;
    Ok(id)
}

/// Update a post. `author_id` is rewritten on every save, pinning the post
/// to whoever passed the ownership gate.
pub fn update_post(
    conn: &Connection,
    post_id: &str,
    author_id: &str,
    post: &NewPost,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE posts SET title = ?1, text = ?2, pub_date = ?3, author_id = ?4, \
                          category_id = ?5, location_id = ?6, image_path = ?7 \
         WHERE id = ?8",
        params![
            post.title,
            post.text,
            post.pub_date,
            author_id,
            post.category_id,
            post.location_id,
            post.image_path,
            post_id,
        ],
    )?;
    Ok(())
}

pub fn delete_post(conn: &Connection, post_id: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM posts WHERE id = ?1", params![post_id])?;
    Ok(())
}

// -- Comment mutations --

pub fn insert_comment(
    conn: &Connection,
    post_id: &str,
    author_id: &str,
    text: &str,
) -> rusqlite::Result<String> {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO comments (id, post_id, author_id, text, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, post_id, author_id, text, now_stamp()],
    )?;
    Ok(id)
}

pub fn update_comment(conn: &Connection, comment_id: &str, text: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE comments SET text = ?1 WHERE id = ?2",
        params![text, comment_id],
    )?;
    Ok(())
}

pub fn delete_comment(conn: &Connection, comment_id: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM comments WHERE id = ?1", params![comment_id])?;
    Ok(())
}

// -- Users --

pub fn user_by_username(conn: &Connection, username: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        "SELECT id, username, first_name, last_name, email, password_hash, created_at \
         FROM users WHERE username = ?1",
        params![username],
        user_from_row,
    )
    .optional()
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        email: row.get(4)?,
        password_hash: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Is `username` taken by anyone other than `exclude_id`?
pub fn username_taken(
    conn: &Connection,
    username: &str,
    exclude_id: Option<&str>,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE username = ?1 AND id != COALESCE(?2, '')",
        params![username, exclude_id],
        |row| row.get(0),
    )
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
}

pub fn insert_user(conn: &Connection, user: &NewUser) -> rusqlite::Result<String> {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO users (id, username, first_name, last_name, email, password_hash) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id,
            user.username,
            user.first_name,
            user.last_name,
            user.email,
            user.password_hash,
        ],
    )?;
    Ok(id)
}

pub fn update_profile(
    conn: &Connection,
    user_id: &str,
    username: &str,
    first_name: &str,
    last_name: &str,
    email: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET username = ?1, first_name = ?2, last_name = ?3, email = ?4 \
         WHERE id = ?5",
        params![username, first_name, last_name, email, user_id],
    )?;
    Ok(())
}

// -- Form select options --

/// Published categories for the post form's select, title order.
pub fn published_categories(conn: &Connection) -> rusqlite::Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT id, title FROM categories WHERE is_published = 1 ORDER BY title ASC",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect();
    rows
}

/// Published locations for the post form's select, name order.
pub fn published_locations(conn: &Connection) -> rusqlite::Result<Vec<(String, String)>> {
    let mut stmt =
        conn.prepare("SELECT id, name FROM locations WHERE is_published = 1 ORDER BY name ASC")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect();
    rows
}
