//! Blog model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Category, Image, Tag, UserSummary};

/// A blog post written from the admin panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blog {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub content: String,
    pub status: BlogStatus,
    pub published_at: Option<DateTime<Utc>>,
    /// Estimated reading time in minutes
    pub read_time: i64,
    pub views: i64,
    pub author_id: Option<i64>,
    pub category_id: Option<i64>,
    pub featured_image_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum BlogStatus {
    #[default]
    Draft,
    Published,
}

impl fmt::Display for BlogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlogStatus::Draft => write!(f, "DRAFT"),
            BlogStatus::Published => write!(f, "PUBLISHED"),
        }
    }
}

impl FromStr for BlogStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DRAFT" => Ok(BlogStatus::Draft),
            "PUBLISHED" => Ok(BlogStatus::Published),
            _ => Err(anyhow::anyhow!("Invalid blog status: {}", s)),
        }
    }
}

/// Blog with everything it references
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogDetail {
    #[serde(flatten)]
    pub blog: Blog,
    pub author: Option<UserSummary>,
    pub category: Option<Category>,
    pub featured_image: Option<Image>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone)]
pub struct CreateBlogInput {
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub content: String,
    pub status: BlogStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub read_time: i64,
    pub author_id: Option<i64>,
    pub category_id: Option<i64>,
    pub featured_image_id: Option<i64>,
}

/// Partial update. The nested options distinguish "leave unchanged" (`None`)
/// from "clear" (`Some(None)`).
#[derive(Debug, Clone, Default)]
pub struct UpdateBlogInput {
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub read_time: Option<i64>,
    pub status: Option<BlogStatus>,
    pub published_at: Option<Option<DateTime<Utc>>>,
    pub category_id: Option<Option<i64>>,
    pub featured_image_id: Option<Option<i64>>,
}

/// Filters for blog listings
#[derive(Debug, Clone, Default)]
pub struct BlogFilter {
    pub status: Option<BlogStatus>,
    /// Matched against title, excerpt, author name and author username
    pub search: Option<String>,
}
