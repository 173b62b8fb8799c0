use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: String,
}

impl User {
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.username.clone()
        } else {
            name.to_string()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub is_published: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub is_published: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub text: String,
    pub pub_date: String,
    pub author_id: String,
    pub category_id: Option<String>,
    pub location_id: Option<String>,
    pub image_path: Option<String>,
    pub is_published: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub text: String,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_name_joins_first_and_last() {
        let user = User {
            id: "u1".into(),
            username: "alice".into(),
            first_name: "Alice".into(),
            last_name: "Liddell".into(),
            email: "".into(),
            password_hash: "".into(),
            created_at: "".into(),
        };
        assert_eq!(user.full_name(), "Alice Liddell");
    }

    #[test]
    fn full_name_falls_back_to_username() {
        let user = User {
            id: "u1".into(),
            username: "alice".into(),
            first_name: "".into(),
            last_name: "".into(),
            email: "".into(),
            password_hash: "".into(),
            created_at: "".into(),
        };
        assert_eq!(user.full_name(), "alice");
    }
}
