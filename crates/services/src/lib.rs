#![forbid(unsafe_code)]

pub mod api;
pub mod app_services;
pub mod auth_service;
pub mod course_session;
pub mod error;
pub mod lifetime;

pub use course_core::Clock;

pub use api::{ApiConfig, CourseApi, HttpCourseApi, InMemoryTokenStore, TokenStore};
pub use app_services::AppServices;
pub use auth_service::AuthService;
pub use course_session::{CourseSession, CourseSessionService, RetryReport};
pub use error::{ApiError, AppServicesError, AuthError, SessionError};
pub use lifetime::{SessionCloser, SessionLifetime};
