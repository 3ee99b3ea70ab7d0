pub mod api_client;
pub mod gallery;
pub mod upload_service;
