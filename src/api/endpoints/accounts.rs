//! Helpers shared by the patient and clinic endpoints.

use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::booking::types::validate_text;
use crate::credentials;
use crate::db::repository::{
    email_taken, list_online_clinics, list_online_patients, username_taken,
};
use crate::events::RealtimeEvent;
use crate::models::enums::AccountKind;
use crate::models::AccountSummary;

pub const MAX_NAME_LEN: usize = 50;
pub const MAX_USERNAME_LEN: usize = 20;
pub const MAX_BIO_LEN: usize = 500;
pub const MAX_LOCATION_LEN: usize = 150;
const MIN_PASSWORD_LEN: usize = 6;
const MAX_PASSWORD_LEN: usize = 30;

/// `?searchTerm=` on the search endpoints.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(rename = "searchTerm", alias = "search_term")]
    pub search_term: Option<String>,
}

impl SearchQuery {
    pub fn term(&self) -> Result<String, ApiError> {
        match self.search_term.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => Ok(term.to_string()),
            _ => Err(ApiError::BadRequest("\"searchTerm\" is required".into())),
        }
    }
}

/// Validated username, email and password of a sign-up.
pub struct SignUp {
    pub username: String,
    pub email: String,
    pub password: String,
}

pub fn validate_sign_up(username: &str, email: &str, password: &str) -> Result<SignUp, ApiError> {
    Ok(SignUp {
        username: validate_text("username", username, MAX_USERNAME_LEN)?,
        email: validate_email(email)?,
        password: validate_password(password)?,
    })
}

pub fn validate_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(ApiError::BadRequest("\"email\" must be a valid email".into()))
    }
}

fn validate_password(raw: &str) -> Result<String, ApiError> {
    let len = raw.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "\"password\" length must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "\"password\" length must be less than or equal to {MAX_PASSWORD_LEN} characters long"
        )));
    }
    Ok(raw.to_string())
}

/// Reject an email or username already used by another account of `kind`.
pub fn ensure_unique(
    conn: &Connection,
    kind: AccountKind,
    email: &str,
    username: &str,
    except: Option<&Uuid>,
) -> Result<(), ApiError> {
    if email_taken(conn, kind, email, except)? {
        return Err(ApiError::BadRequest("Email already taken".into()));
    }
    if username_taken(conn, kind, username, except)? {
        return Err(ApiError::BadRequest("Username already taken".into()));
    }
    Ok(())
}

/// Runs on the blocking pool.
pub async fn hash_password(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || credentials::hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(format!("password hashing task: {e}")))
}

pub async fn verify_password(password: String, stored: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || credentials::verify_password(&password, &stored))
        .await
        .map_err(|e| ApiError::Internal(format!("password check task: {e}")))
}

/// Generated avatar for a new account.
pub fn avatar_url(seed: &str) -> String {
    format!("https://api.dicebear.com/7.x/micah/svg?seed={seed}")
}

/// Path ids that are not UUIDs cannot name an account.
pub fn parse_account_id(raw: &str, not_found: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(not_found.to_string()))
}

/// Accepts both account vocabularies: `user`/`patient` and `hospital`/`clinic`.
pub fn parse_account_kind(raw: &str) -> Option<AccountKind> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "user" | "patient" => Some(AccountKind::Patient),
        "hospital" | "clinic" => Some(AccountKind::Clinic),
        _ => None,
    }
}

/// Publish the current online list for `kind`.
pub fn broadcast_presence(ctx: &ApiContext, conn: &Connection, kind: AccountKind) -> Result<(), ApiError> {
    let events = ctx.core.events();
    match kind {
        AccountKind::Patient => {
            let online: Vec<AccountSummary> = list_online_patients(conn)?.iter().map(AccountSummary::from).collect();
            events.publish_serialized(RealtimeEvent::OnlineUsers, &online);
        }
        AccountKind::Clinic => {
            let online: Vec<AccountSummary> = list_online_clinics(conn)?.iter().map(AccountSummary::from).collect();
            events.publish_serialized(RealtimeEvent::OnlineHospitals, &online);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape_is_checked() {
        assert_eq!(validate_email(" Ada@Example.com ").unwrap(), "ada@example.com");
        for bad in ["", "ada", "@example.com", "ada@example", "ada@@example.com", "ada@.com"] {
            assert!(validate_email(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn password_length_bounds() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
        assert!(validate_password(&"x".repeat(30)).is_ok());
        assert!(validate_password(&"x".repeat(31)).is_err());
    }

    #[test]
    fn both_account_vocabularies_parse() {
        assert_eq!(parse_account_kind("user"), Some(AccountKind::Patient));
        assert_eq!(parse_account_kind("Hospital"), Some(AccountKind::Clinic));
        assert_eq!(parse_account_kind("clinic"), Some(AccountKind::Clinic));
        assert_eq!(parse_account_kind("admin"), None);
    }

    #[test]
    fn search_term_is_required() {
        let empty = SearchQuery { search_term: Some("  ".into()) };
        assert!(empty.term().is_err());
        let missing = SearchQuery { search_term: None };
        assert!(missing.term().is_err());
        let ok = SearchQuery { search_term: Some(" ada ".into()) };
        assert_eq!(ok.term().unwrap(), "ada");
    }
}
