//! Project and credential records

use std::fmt;

use serde::{Deserialize, Serialize};

/// A project as returned by the project store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    /// Store-internal identifier, passed back to `update`
    pub id: String,
    /// Public project reference
    #[serde(rename = "ref")]
    pub project_ref: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Database role
    #[serde(default)]
    pub database_user: Option<String>,
    /// Adaptive hash of the role's password
    #[serde(default)]
    pub database_password_hash: Option<String>,
}

impl ProjectRecord {
    /// Record with no credentials
    pub fn new(id: impl Into<String>, project_ref: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            project_ref: project_ref.into(),
            name: None,
            database_user: None,
            database_password_hash: None,
        }
    }

    /// Set the display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the database role
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.database_user = Some(user.into());
        self
    }

    /// Set the password hash
    #[must_use]
    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.database_password_hash = Some(hash.into());
        self
    }

    /// Credentials currently stored on the record
    #[must_use]
    pub fn credentials(&self) -> ProjectCredentials {
        ProjectCredentials::new(
            self.database_user.clone(),
            self.database_password_hash.clone(),
        )
    }
}

/// Fields written by `ProjectStore::update`; `None` leaves a field as is
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCredentialUpdate {
    /// New database role
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_user: Option<String>,
    /// New password hash
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_password_hash: Option<String>,
}

impl ProjectCredentialUpdate {
    /// Whether the update changes nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.database_user.is_none() && self.database_password_hash.is_none()
    }

    /// Apply onto `record`
    pub fn apply(&self, record: &mut ProjectRecord) {
        if let Some(user) = &self.database_user {
            record.database_user = Some(user.clone());
        }
        if let Some(hash) = &self.database_password_hash {
            record.database_password_hash = Some(hash.clone());
        }
    }
}

/// Username and password hash of one project.
///
/// Blank values are normalised to `None`, so `is_complete` holds exactly
/// when both fields are present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCredentials {
    user: Option<String>,
    password_hash: Option<String>,
    is_complete: bool,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ProjectCredentials {
    /// Build from optional parts
    #[must_use]
    pub fn new(user: Option<String>, password_hash: Option<String>) -> Self {
        let user = non_blank(user);
        let password_hash = non_blank(password_hash);
        let is_complete = user.is_some() && password_hash.is_some();
        Self {
            user,
            password_hash,
            is_complete,
        }
    }

    /// Both parts present
    pub fn complete(user: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self::new(Some(user.into()), Some(password_hash.into()))
    }

    /// Database role
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Password hash
    #[must_use]
    pub fn password_hash(&self) -> Option<&str> {
        self.password_hash.as_deref()
    }

    /// Both fields are present and non-blank
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    /// Which parts are missing
    #[must_use]
    pub fn gap(&self) -> CredentialGap {
        CredentialGap::of(self.user.is_some(), self.password_hash.is_some())
    }
}

/// Completeness category of a project's credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialGap {
    /// User and password hash present
    Complete,
    /// Only the password hash is present
    MissingUser,
    /// Only the user is present
    MissingPassword,
    /// Neither is present
    MissingBoth,
}

impl CredentialGap {
    /// Classify from presence flags
    #[must_use]
    pub const fn of(has_user: bool, has_password: bool) -> Self {
        match (has_user, has_password) {
            (true, true) => Self::Complete,
            (false, true) => Self::MissingUser,
            (true, false) => Self::MissingPassword,
            (false, false) => Self::MissingBoth,
        }
    }

    /// Anything missing
    #[must_use]
    pub const fn is_incomplete(self) -> bool {
        !matches!(self, Self::Complete)
    }
}

impl fmt::Display for CredentialGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Complete => "complete",
            Self::MissingUser => "missing_user",
            Self::MissingPassword => "missing_password",
            Self::MissingBoth => "missing_both",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn blank_fields_are_missing() {
        let creds = ProjectCredentials::new(Some("  ".into()), Some("$2b$12$abc".into()));
        assert!(!creds.is_complete());
        assert_eq!(creds.user(), None);
        assert_eq!(creds.gap(), CredentialGap::MissingUser);
    }

    #[test]
    fn gap_covers_every_combination() {
        assert_eq!(CredentialGap::of(true, true), CredentialGap::Complete);
        assert_eq!(CredentialGap::of(true, false), CredentialGap::MissingPassword);
        assert_eq!(CredentialGap::of(false, false), CredentialGap::MissingBoth);
        assert!(!CredentialGap::Complete.is_incomplete());
    }

    #[test]
    fn update_only_touches_given_fields() {
        let mut record = ProjectRecord::new("1", "alpha").with_user("proj_alpha_user");
        ProjectCredentialUpdate {
            database_user: None,
            database_password_hash: Some("$2b$04$hash".into()),
        }
        .apply(&mut record);

        assert_eq!(record.database_user.as_deref(), Some("proj_alpha_user"));
        assert!(record.credentials().is_complete());
    }

    #[test]
    fn record_deserializes_from_store_json() {
        let record: ProjectRecord =
            serde_json::from_str(r#"{"id":"7","ref":"default","database_user":null}"#).unwrap();
        assert_eq!(record.project_ref, "default");
        assert_eq!(record.credentials().gap(), CredentialGap::MissingBoth);
    }
}
