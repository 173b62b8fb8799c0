use axum::extract::multipart::Multipart;
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::path::Path;

use crate::error::{AppError, AppResult};

/// Accepted textual formats for a post's publication date. The first is
/// what a `datetime-local` input submits.
pub const PUB_DATE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

const MAX_TITLE_LEN: usize = 256;
const MIN_PASSWORD_LEN: usize = 8;

/// Try each accepted format in order.
pub fn parse_pub_date(input: &str) -> Option<NaiveDateTime> {
    PUB_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input.trim(), fmt).ok())
}

// -- Post form --

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub data: Vec<u8>,
}

impl ImageUpload {
    /// Write the upload into `uploads_dir` under a generated name,
    /// preserving the original extension. Returns the stored file name.
    pub fn store(&self, uploads_dir: &Path) -> std::io::Result<String> {
        let ext = Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        let name = format!("{}.{}", uuid::Uuid::now_v7(), ext);
        std::fs::create_dir_all(uploads_dir)?;
        std::fs::write(uploads_dir.join(&name), &self.data)?;
        Ok(name)
    }
}

/// Raw post form fields, as submitted. Kept verbatim so a failed submission
/// re-renders with what the user typed.
#[derive(Debug, Clone, Default)]
pub struct PostForm {
    pub title: String,
    pub text: String,
    pub pub_date: String,
    pub category_id: String,
    pub location_id: String,
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Default)]
pub struct PostFormErrors {
    pub title: Option<String>,
    pub text: Option<String>,
    pub pub_date: Option<String>,
}

impl PostFormErrors {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.text.is_none() && self.pub_date.is_none()
    }
}

/// A post form that passed validation. `pub_date` is normalized to the
/// canonical storage format.
#[derive(Debug)]
pub struct ValidPost {
    pub title: String,
    pub text: String,
    pub pub_date: String,
    pub category_id: Option<String>,
    pub location_id: Option<String>,
}

impl PostForm {
    /// Read the multipart body of a post create/edit submission. Unknown
    /// fields are ignored; an empty file part means "no new image".
    pub async fn from_multipart(multipart: &mut Multipart) -> AppResult<Self> {
        let mut form = PostForm::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("Malformed form body: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "title" => form.title = read_text(field).await?,
                "text" => form.text = read_text(field).await?,
                "pub_date" => form.pub_date = read_text(field).await?,
                "category" => form.category_id = read_text(field).await?,
                "location" => form.location_id = read_text(field).await?,
                "image" => {
                    let filename = field.file_name().unwrap_or_default().to_string();
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(format!("Malformed upload: {e}")))?;
                    if !filename.is_empty() && !data.is_empty() {
                        form.image = Some(ImageUpload {
                            filename,
                            data: data.to_vec(),
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(form)
    }

    pub fn validate(&self) -> Result<ValidPost, PostFormErrors> {
        let mut errors = PostFormErrors::default();

        let title = self.title.trim();
        if title.is_empty() {
            errors.title = Some("Title is required".into());
        } else if title.len() > MAX_TITLE_LEN {
            errors.title = Some(format!("Title must be at most {MAX_TITLE_LEN} characters"));
        }

        if self.text.trim().is_empty() {
            errors.text = Some("Text is required".into());
        }

        let pub_date = if self.pub_date.trim().is_empty() {
            errors.pub_date = Some("Publication date is required".into());
            None
        } else {
            match parse_pub_date(&self.pub_date) {
                Some(dt) => Some(dt.format(crate::db::queries::STAMP_FORMAT).to_string()),
                None => {
                    errors.pub_date = Some("Enter a valid date and time".into());
                    None
                }
            }
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ValidPost {
            title: title.to_string(),
            text: self.text.trim().to_string(),
            pub_date: pub_date.unwrap(),
            category_id: non_empty(&self.category_id),
            location_id: non_empty(&self.location_id),
        })
    }
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> AppResult<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed form field: {e}")))
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Usernames appear in URLs and redirect targets, so the charset is
/// restricted to letters, digits, and `@.+-_`.
fn valid_username(username: &str) -> bool {
    !username.is_empty()
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@.+-_".contains(c))
}

const USERNAME_CHARSET_ERROR: &str =
    "Usernames may only contain letters, digits, and @/./+/-/_";

// -- Comment form --

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

impl CommentForm {
    pub fn validate(&self) -> Result<String, String> {
        let text = self.text.trim();
        if text.is_empty() {
            Err("Comment text is required".into())
        } else {
            Ok(text.to_string())
        }
    }
}

// -- Registration form --

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password1: String,
    #[serde(default)]
    pub password2: String,
}

#[derive(Debug, Default)]
pub struct RegistrationErrors {
    pub username: Option<String>,
    pub password1: Option<String>,
    pub password2: Option<String>,
}

impl RegistrationErrors {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password1.is_none() && self.password2.is_none()
    }
}

impl RegistrationForm {
    /// `username_taken` comes from the database; uniqueness is a form error
    /// like any other.
    pub fn validate(&self, username_taken: bool) -> Result<(), RegistrationErrors> {
        let mut errors = RegistrationErrors::default();

        if self.username.trim().is_empty() {
            errors.username = Some("Username is required".into());
        } else if !valid_username(self.username.trim()) {
            errors.username = Some(USERNAME_CHARSET_ERROR.into());
        } else if username_taken {
            errors.username = Some("This username is already taken".into());
        }

        if self.password1.len() < MIN_PASSWORD_LEN {
            errors.password1 = Some(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            ));
        }
        if self.password1 != self.password2 {
            errors.password2 = Some("Passwords do not match".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

// -- Profile edit form --

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

impl ProfileForm {
    pub fn validate(&self, username_taken: bool) -> Result<(), String> {
        if self.username.trim().is_empty() {
            Err("Username is required".into())
        } else if !valid_username(self.username.trim()) {
            Err(USERNAME_CHARSET_ERROR.into())
        } else if username_taken {
            Err("This username is already taken".into())
        } else {
            Ok(())
        }
    }
}

// -- Login form --

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pub_date_accepts_all_three_formats() {
        assert!(parse_pub_date("2024-06-01T12:30").is_some());
        assert!(parse_pub_date("2024-06-01 12:30:45").is_some());
        assert!(parse_pub_date("2024-06-01 12:30").is_some());
    }

    #[test]
    fn pub_date_rejects_garbage() {
        assert!(parse_pub_date("").is_none());
        assert!(parse_pub_date("next tuesday").is_none());
        assert!(parse_pub_date("2024-13-01T00:00").is_none());
        assert!(parse_pub_date("01/06/2024").is_none());
    }

    #[test]
    fn post_form_normalizes_pub_date() {
        let form = PostForm {
            title: "Hello".into(),
            text: "World".into(),
            pub_date: "2024-06-01T12:30".into(),
            ..Default::default()
        };
        let valid = form.validate().unwrap();
        assert_eq!(valid.pub_date, "2024-06-01 12:30:00");
        assert!(valid.category_id.is_none());
        assert!(valid.location_id.is_none());
    }

    #[test]
    fn post_form_requires_title_text_and_date() {
        let errors = PostForm::default().validate().unwrap_err();
        assert!(errors.title.is_some());
        assert!(errors.text.is_some());
        assert!(errors.pub_date.is_some());
    }

    #[test]
    fn post_form_keeps_optional_associations() {
        let form = PostForm {
            title: "Hello".into(),
            text: "World".into(),
            pub_date: "2024-06-01 12:30".into(),
            category_id: "cat-1".into(),
            location_id: "loc-1".into(),
            ..Default::default()
        };
        let valid = form.validate().unwrap();
        assert_eq!(valid.category_id.as_deref(), Some("cat-1"));
        assert_eq!(valid.location_id.as_deref(), Some("loc-1"));
    }

    #[test]
    fn comment_form_rejects_blank_text() {
        assert!(CommentForm { text: "".into() }.validate().is_err());
        assert!(CommentForm { text: "   ".into() }.validate().is_err());
        assert_eq!(
            CommentForm {
                text: " hi there ".into()
            }
            .validate()
            .unwrap(),
            "hi there"
        );
    }

    #[test]
    fn registration_rejects_mismatched_passwords() {
        let form = RegistrationForm {
            username: "alice".into(),
            password1: "correct horse".into(),
            password2: "battery staple".into(),
            ..Default::default()
        };
        let errors = form.validate(false).unwrap_err();
        assert!(errors.password2.is_some());
        assert!(errors.username.is_none());
    }

    #[test]
    fn registration_rejects_short_password() {
        let form = RegistrationForm {
            username: "alice".into(),
            password1: "short".into(),
            password2: "short".into(),
            ..Default::default()
        };
        assert!(form.validate(false).unwrap_err().password1.is_some());
    }

    #[test]
    fn registration_rejects_username_with_unsafe_characters() {
        // These names would end up in /profile/{username} links and
        // redirect Location headers.
        for bad in ["a/b", "a\nb", "a b", "a%2Fb", "naïve"] {
            let form = RegistrationForm {
                username: bad.into(),
                password1: "correct horse".into(),
                password2: "correct horse".into(),
                ..Default::default()
            };
            let errors = form.validate(false).unwrap_err();
            assert!(errors.username.is_some(), "accepted {:?}", bad);
        }

        let form = RegistrationForm {
            username: "alice.b+c@example-1_2".into(),
            password1: "correct horse".into(),
            password2: "correct horse".into(),
            ..Default::default()
        };
        assert!(form.validate(false).is_ok());
    }

    #[test]
    fn profile_form_rejects_username_with_unsafe_characters() {
        for bad in ["a/b", "a\nb", "a b"] {
            let form = ProfileForm {
                username: bad.into(),
                ..Default::default()
            };
            assert!(form.validate(false).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn registration_rejects_taken_username() {
        let form = RegistrationForm {
            username: "alice".into(),
            password1: "correct horse".into(),
            password2: "correct horse".into(),
            ..Default::default()
        };
        assert!(form.validate(true).unwrap_err().username.is_some());
        assert!(form.validate(false).is_ok());
    }

    #[test]
    fn profile_form_checks_username() {
        let form = ProfileForm {
            username: "alice".into(),
            ..Default::default()
        };
        assert!(form.validate(false).is_ok());
        assert!(form.validate(true).is_err());
        let blank = ProfileForm::default();
        assert!(blank.validate(false).is_err());
    }

    #[test]
    fn image_upload_stores_with_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let upload = ImageUpload {
            filename: "photo.jpg".into(),
            data: vec![1, 2, 3],
        };
        let name = upload.store(tmp.path()).unwrap();
        assert!(name.ends_with(".jpg"));
        assert_eq!(std::fs::read(tmp.path().join(&name)).unwrap(), vec![1, 2, 3]);
    }
}
