//! Newsletter sign-ups

use crate::db::is_unique_violation;
use crate::db::repositories::NewsletterRepository;
use crate::models::NewsletterSubscriber;
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

#[derive(Debug, thiserror::Error)]
pub enum NewsletterError {
    #[error("{0}")]
    ValidationError(&'static str),

    #[error("This email is already subscribed")]
    AlreadySubscribed,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub struct NewsletterService {
    repo: Arc<dyn NewsletterRepository>,
}

impl NewsletterService {
    pub fn new(repo: Arc<dyn NewsletterRepository>) -> Self {
        Self { repo }
    }

    /// Subscribe an address; stored trimmed and lowercased
    pub async fn subscribe(&self, email: Option<&str>) -> Result<NewsletterSubscriber, NewsletterError> {
        let email = email.map(str::trim).unwrap_or_default();
        if email.is_empty() {
            return Err(NewsletterError::ValidationError("Email is required"));
        }
        if !is_valid_email(email) {
            return Err(NewsletterError::ValidationError(
                "Please enter a valid email address",
            ));
        }

        let email = email.to_lowercase();
        if self
            .repo
            .exists(&email)
            .await
            .context("Failed to check subscription")?
        {
            return Err(NewsletterError::AlreadySubscribed);
        }

        match self.repo.subscribe(&email).await {
            Ok(subscriber) => {
                tracing::info!("Newsletter subscription: {}", subscriber.email);
                Ok(subscriber)
            }
            Err(e) if is_unique_violation(&e) => Err(NewsletterError::AlreadySubscribed),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn count(&self) -> Result<i64, NewsletterError> {
        Ok(self.repo.count().await.context("Failed to count subscribers")?)
    }
}
