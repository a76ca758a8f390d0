//! In-process stand-in for the user service the YouTube form talks to

use crate::state::forms::{AsyncValidator, DefaultValuesSource, FormValue, Validity};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: u32,
    pub name: String,
    pub email: String,
}

/// Known users, answered after a simulated network latency
#[derive(Debug, Clone)]
pub struct UserDirectory {
    users: Vec<User>,
    latency: Duration,
}

impl UserDirectory {
    pub fn new(users: Vec<User>) -> Self {
        Self {
            users,
            latency: Duration::ZERO,
        }
    }

    /// A few well-known accounts
    pub fn sample() -> Self {
        let users = [
            (1, "Leanne Graham", "Sincere@april.biz"),
            (2, "Ervin Howell", "Shanna@melissa.tv"),
            (3, "Clementine Bauch", "Nathan@yesenia.net"),
        ]
        .into_iter()
        .map(|(id, name, email)| User {
            id,
            name: name.to_string(),
            email: email.to_string(),
        })
        .collect();
        Self::new(users)
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    pub async fn user(&self, id: u32) -> Result<User> {
        self.round_trip().await;
        self.users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .with_context(|| format!("user {id} not found"))
    }

    pub async fn find_by_email(&self, email: &str) -> Vec<User> {
        self.round_trip().await;
        self.users
            .iter()
            .filter(|u| u.email == email)
            .cloned()
            .collect()
    }
}

/// Rejects email addresses that already belong to a user
pub struct EmailAvailable {
    directory: Arc<UserDirectory>,
}

impl EmailAvailable {
    pub fn new(directory: Arc<UserDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl AsyncValidator for EmailAvailable {
    async fn validate(&self, value: &FormValue) -> Result<Validity> {
        let email = value.as_text().unwrap_or_default();
        let matches = self.directory.find_by_email(email).await;
        Ok(Validity::check(matches.is_empty(), "Email already exists"))
    }
}

/// YouTube form defaults, seeded from the profile of user 1
pub struct ProfileDefaults {
    directory: Arc<UserDirectory>,
}

impl ProfileDefaults {
    pub fn new(directory: Arc<UserDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl DefaultValuesSource for ProfileDefaults {
    async fn load(&self) -> Result<FormValue> {
        let user = self.directory.user(1).await?;
        let values = FormValue::from(json!({
            "username": "Batman",
            "email": user.email,
            "channel": "",
            "address": { "line1": "", "line2": "" },
            "age": 0,
            "phone": [{ "number": "" }]
        }))
        .with("dob", FormValue::Date(Local::now().date_naive()));
        Ok(values)
    }
}
