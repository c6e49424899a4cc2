use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Two users talking about one animal listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub animal_id: String,
    pub adopter_id: String,
    pub publisher_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Conversation {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.adopter_id == user_id || self.publisher_id == user_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub province: Option<String>,
}

pub const ANONYMOUS_SENDER: &str = "Alguien";

impl Profile {
    /// Name shown in notifications: full name, then the local part of the
    /// email, then a generic label.
    pub fn display_name(&self) -> &str {
        if let Some(name) = self.full_name.as_deref().map(str::trim)
            && !name.is_empty()
        {
            return name;
        }
        if let Some(email) = self.email.as_deref()
            && let Some(local) = email.split('@').next()
            && !local.trim().is_empty()
        {
            return local.trim();
        }
        ANONYMOUS_SENDER
    }
}
