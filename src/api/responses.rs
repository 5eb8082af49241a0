//! Shared API response types
//!
//! List endpoints answer with the items under an entity-specific key next to
//! the paging numbers, e.g. `{blogs, total, page, limit, totalPages}`.

use serde::Serialize;

use crate::models::{BlogDetail, CategoryWithCount, PagedResult, ThreadSummary, User};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: i64,
}

impl PageInfo {
    fn of<T>(result: &PagedResult<T>) -> Self {
        Self {
            total: result.total,
            page: result.page,
            limit: result.limit,
            total_pages: result.total_pages(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BlogListResponse {
    pub blogs: Vec<BlogDetail>,
    #[serde(flatten)]
    pub page: PageInfo,
}

impl From<PagedResult<BlogDetail>> for BlogListResponse {
    fn from(result: PagedResult<BlogDetail>) -> Self {
        Self {
            page: PageInfo::of(&result),
            blogs: result.items,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CategoryListResponse {
    pub categories: Vec<CategoryWithCount>,
    #[serde(flatten)]
    pub page: PageInfo,
}

impl From<PagedResult<CategoryWithCount>> for CategoryListResponse {
    fn from(result: PagedResult<CategoryWithCount>) -> Self {
        Self {
            page: PageInfo::of(&result),
            categories: result.items,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ThreadListResponse {
    pub threads: Vec<ThreadSummary>,
    #[serde(flatten)]
    pub page: PageInfo,
}

impl From<PagedResult<ThreadSummary>> for ThreadListResponse {
    fn from(result: PagedResult<ThreadSummary>) -> Self {
        Self {
            page: PageInfo::of(&result),
            threads: result.items,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<User>,
    #[serde(flatten)]
    pub page: PageInfo,
}

impl From<PagedResult<User>> for UserListResponse {
    fn from(result: PagedResult<User>) -> Self {
        Self {
            page: PageInfo::of(&result),
            users: result.items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ListParams;

    #[test]
    fn test_paged_shape() {
        let result = PagedResult::<ThreadSummary>::new(vec![], 21, &ListParams::new(2, 10));
        let json = serde_json::to_value(ThreadListResponse::from(result)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"threads": [], "total": 21, "page": 2, "limit": 10, "totalPages": 3})
        );
    }
}
