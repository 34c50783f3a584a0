//! # Scheduling REST Resources
//!
//! Thin CRUD wrappers over [`ApiClient`] for the collections the dashboard
//! pages read and write. Payloads stay opaque `serde_json::Value`s.

use std::fmt;

use reqwest::Method;
use serde_json::Value;

use super::ky_http::{ApiClient, ApiError, ApiResponse};

/// REST collections under `/api/v1/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// `courses/`
    Courses,
    /// `rooms/`
    Rooms,
    /// `users/`
    Users,
    /// `departments/`
    Departments,
    /// `time-slots/`
    TimeSlots,
    /// `enrollments/`
    Enrollments,
    /// `schedule/` (singular on the server)
    Schedules,
    /// `majors/`
    Majors,
}

impl Resource {
    /// Every resource, in declaration order.
    pub const ALL: [Resource; 8] = [
        Resource::Courses,
        Resource::Rooms,
        Resource::Users,
        Resource::Departments,
        Resource::TimeSlots,
        Resource::Enrollments,
        Resource::Schedules,
        Resource::Majors,
    ];

    /// Collection path relative to the API root, with its trailing slash.
    pub fn path(&self) -> &'static str {
        match self {
            Resource::Courses => "courses/",
            Resource::Rooms => "rooms/",
            Resource::Users => "users/",
            Resource::Departments => "departments/",
            Resource::TimeSlots => "time-slots/",
            Resource::Enrollments => "enrollments/",
            Resource::Schedules => "schedule/",
            Resource::Majors => "majors/",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path().trim_end_matches('/'))
    }
}

/// CRUD calls against the scheduling API root (e.g. `http://host:8000/api/v1/`).
#[derive(Debug, Clone)]
pub struct ResourceClient {
    api: ApiClient,
}

impl ResourceClient {
    /// Client for the API rooted at `api_root`.
    pub fn new(api_root: &str, token: Option<String>) -> Result<Self, ApiError> {
        Ok(Self {
            api: ApiClient::new(api_root, token)?,
        })
    }

    /// Wraps an already configured [`ApiClient`].
    pub fn from_api(api: ApiClient) -> Self {
        Self { api }
    }

    /// The underlying client.
    pub fn api(&mut self) -> &mut ApiClient {
        &mut self.api
    }

    /// `GET <resource>/`
    pub async fn list(&self, resource: Resource) -> Result<ApiResponse<Value>, ApiError> {
        self.api
            .request::<Value, ()>(Method::GET, resource.path(), None, None)
            .await
    }

    /// `GET <resource>/<id>`
    pub async fn get(&self, resource: Resource, id: &str) -> Result<ApiResponse<Value>, ApiError> {
        let url = self.api.item_url(resource.path(), id)?;
        self.api
            .request_url::<Value, ()>(Method::GET, url, None, None)
            .await
    }

    /// `POST <resource>/`
    pub async fn create(&self, resource: Resource, body: &Value) -> Result<ApiResponse<Value>, ApiError> {
        self.api
            .request(Method::POST, resource.path(), None, Some(body))
            .await
    }

    /// `PUT <resource>/<id>`
    pub async fn update(
        &self,
        resource: Resource,
        id: &str,
        body: &Value,
    ) -> Result<ApiResponse<Value>, ApiError> {
        let url = self.api.item_url(resource.path(), id)?;
        self.api
            .request_url(Method::PUT, url, None, Some(body))
            .await
    }

    /// `DELETE <resource>/<id>`
    pub async fn delete(&self, resource: Resource, id: &str) -> Result<ApiResponse<Value>, ApiError> {
        let url = self.api.item_url(resource.path(), id)?;
        self.api
            .request_url::<Value, ()>(Method::DELETE, url, None, None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_the_api_layout() {
        assert_eq!(Resource::TimeSlots.path(), "time-slots/");
        assert_eq!(Resource::Schedules.path(), "schedule/");
        assert_eq!(Resource::TimeSlots.to_string(), "time-slots");
        assert_eq!(Resource::ALL.len(), 8);
    }
}
