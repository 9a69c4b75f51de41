//! The authenticated user record carried by session states

use serde::{Deserialize, Serialize};

/// A signed-in user
///
/// `User::default()` is the empty user, returned by accessors when there is
/// no session to read from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub display_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            ..Default::default()
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_tokens(mut self, access: impl Into<String>, refresh: impl Into<String>) -> Self {
        self.access_token = Some(access.into());
        self.refresh_token = Some(refresh.into());
        self
    }

    /// True for the default/empty user
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }
}
