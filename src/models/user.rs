//! User record model for storage, plus the Clerk user shape it is built from.

use crate::error::AppError;
use serde::{Deserialize, Serialize};

/// User record stored in Firestore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Internal identifier (also used as document ID)
    pub id: String,
    /// Clerk user ID; unique across records
    pub external_id: String,
    pub email: String,
    /// Never empty, see [`derive_username`]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub photo_url: String,
    /// Only ever changed by an increment
    pub credit_balance: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl UserRecord {
    /// Build a fresh record with a new internal id.
    pub fn from_new(new_user: NewUser, credit_balance: i64, now: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            external_id: new_user.external_id,
            email: new_user.email,
            username: new_user.username,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            photo_url: new_user.photo_url,
            credit_balance,
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }
}

/// Input for creating a user record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub external_id: String,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub photo_url: String,
}

impl NewUser {
    /// Build a creation record from a Clerk user.
    ///
    /// Uses the first email address; fails if the user has none.
    pub fn from_provider(user: &ProviderUser) -> Result<Self, AppError> {
        let email = user
            .first_email()
            .ok_or_else(|| {
                AppError::BadRequest(format!("user {} has no email address", user.id))
            })?
            .to_string();

        Ok(Self {
            username: derive_username(user.username.as_deref(), &email, &user.id),
            external_id: user.id.clone(),
            email,
            first_name: user.first_name.clone().flatten().unwrap_or_default(),
            last_name: user.last_name.clone().flatten().unwrap_or_default(),
            photo_url: user.image_url.clone().unwrap_or_default(),
        })
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub photo_url: Option<String>,
}

impl UserPatch {
    /// Build a patch from a `user.updated` payload.
    ///
    /// An absent or empty username keeps the stored one. A `null` name was
    /// cleared in Clerk and blanks the stored one.
    pub fn from_provider(user: &ProviderUser) -> Self {
        Self {
            first_name: user.first_name.clone().map(Option::unwrap_or_default),
            last_name: user.last_name.clone().map(Option::unwrap_or_default),
            username: user
                .username
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string),
            photo_url: user.image_url.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.field_names().is_empty()
    }

    /// Stored field names this patch writes.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.first_name.is_some() {
            fields.push("first_name");
        }
        if self.last_name.is_some() {
            fields.push("last_name");
        }
        if self.username.is_some() {
            fields.push("username");
        }
        if self.photo_url.is_some() {
            fields.push("photo_url");
        }
        fields
    }

    /// Apply the patch in memory and stamp `updated_at`.
    pub fn apply(&self, record: &mut UserRecord, now: &str) {
        if let Some(first_name) = &self.first_name {
            record.first_name = first_name.clone();
        }
        if let Some(last_name) = &self.last_name {
            record.last_name = last_name.clone();
        }
        if let Some(username) = &self.username {
            record.username = username.clone();
        }
        if let Some(photo_url) = &self.photo_url {
            record.photo_url = photo_url.clone();
        }
        record.updated_at = now.to_string();
    }
}

/// Pick a username: the provided one, else the email local-part, else
/// `user_<external_id>`.
pub fn derive_username(provided: Option<&str>, email: &str, external_id: &str) -> String {
    if let Some(username) = provided.map(str::trim).filter(|u| !u.is_empty()) {
        return username.to_string();
    }

    match email.split('@').next().map(str::trim) {
        Some(local) if !local.is_empty() => local.to_string(),
        _ => format!("user_{}", external_id),
    }
}

/// Clerk user object, as sent in webhook `data` and by `GET /users/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderUser {
    pub id: String,
    #[serde(default)]
    pub email_addresses: Vec<ProviderEmail>,
    #[serde(default)]
    pub username: Option<String>,
    /// `Some(None)` when Clerk sent `null`, `None` when the key was absent.
    #[serde(default, deserialize_with = "present")]
    pub first_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub last_name: Option<Option<String>>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub public_metadata: Option<serde_json::Value>,
}

impl ProviderUser {
    pub fn first_email(&self) -> Option<&str> {
        self.email_addresses
            .first()
            .map(|e| e.email_address.trim())
            .filter(|e| !e.is_empty())
    }

    /// Local record id previously written back to public metadata, if any.
    pub fn linked_user_id(&self) -> Option<&str> {
        self.public_metadata
            .as_ref()
            .and_then(|m| m.get("userId"))
            .and_then(|v| v.as_str())
    }
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEmail {
    pub email_address: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider_user(value: serde_json::Value) -> ProviderUser {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_derive_username() {
        assert_eq!(derive_username(Some("alice"), "a@b.com", "ext_1"), "alice");
        assert_eq!(derive_username(None, "a@b.com", "ext_1"), "a");
        assert_eq!(derive_username(Some(""), "bob@b.com", "ext_1"), "bob");
        assert_eq!(derive_username(Some("  "), "@b.com", "ext_1"), "user_ext_1");
        assert_eq!(derive_username(None, "", "ext_2"), "user_ext_2");
    }

    #[test]
    fn test_new_user_from_created_payload() {
        let user = provider_user(json!({
            "id": "ext_1",
            "email_addresses": [
                {"email_address": "a@b.com"},
                {"email_address": "second@b.com"}
            ],
            "username": null,
            "image_url": "https://img.example.com/a.png"
        }));

        let new_user = NewUser::from_provider(&user).unwrap();
        assert_eq!(new_user.external_id, "ext_1");
        assert_eq!(new_user.email, "a@b.com");
        assert_eq!(new_user.username, "a");
        assert_eq!(new_user.first_name, "");
        assert_eq!(new_user.last_name, "");
        assert_eq!(new_user.photo_url, "https://img.example.com/a.png");
    }

    #[test]
    fn test_new_user_requires_email() {
        let user = provider_user(json!({"id": "ext_1", "email_addresses": []}));
        assert!(matches!(
            NewUser::from_provider(&user),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_patch_keeps_username_when_blank() {
        let user = provider_user(json!({
            "id": "ext_1",
            "first_name": "X",
            "username": ""
        }));

        let patch = UserPatch::from_provider(&user);
        assert_eq!(patch.first_name.as_deref(), Some("X"));
        assert_eq!(patch.username, None);
        assert_eq!(patch.field_names(), vec!["first_name"]);
    }

    #[test]
    fn test_patch_blanks_null_names_and_skips_absent_ones() {
        let user = provider_user(json!({
            "id": "ext_1",
            "last_name": null,
            "image_url": "https://img.clerk.com/x.png"
        }));

        let patch = UserPatch::from_provider(&user);
        assert_eq!(patch.first_name, None);
        assert_eq!(patch.last_name.as_deref(), Some(""));
        assert_eq!(patch.field_names(), vec!["last_name", "photo_url"]);
    }

    #[test]
    fn test_patch_apply_touches_only_present_fields() {
        let new_user = NewUser {
            external_id: "ext_1".to_string(),
            email: "a@b.com".to_string(),
            username: "a".to_string(),
            first_name: "Ann".to_string(),
            last_name: "Lee".to_string(),
            photo_url: "p".to_string(),
        };
        let mut record = UserRecord::from_new(new_user, 10, "2024-01-01T00:00:00Z");

        let patch = UserPatch {
            first_name: Some("X".to_string()),
            ..Default::default()
        };
        patch.apply(&mut record, "2024-02-01T00:00:00Z");

        assert_eq!(record.first_name, "X");
        assert_eq!(record.last_name, "Lee");
        assert_eq!(record.username, "a");
        assert_eq!(record.photo_url, "p");
        assert_eq!(record.credit_balance, 10);
        assert_eq!(record.created_at, "2024-01-01T00:00:00Z");
        assert_eq!(record.updated_at, "2024-02-01T00:00:00Z");
    }

    #[test]
    fn test_linked_user_id() {
        let user = provider_user(json!({
            "id": "ext_1",
            "public_metadata": {"userId": "local-1"}
        }));
        assert_eq!(user.linked_user_id(), Some("local-1"));
        assert_eq!(ProviderUser::default().linked_user_id(), None);
    }
}
