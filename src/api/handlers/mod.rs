pub mod adapters;
pub mod cache;
pub mod credentials;

use std::sync::Arc;

use crate::services::{DataSession, FetchOrCacheService};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<DataSession>,
    pub cache: Arc<FetchOrCacheService>,
}

impl AppState {
    pub fn new(session: Arc<DataSession>, cache: Arc<FetchOrCacheService>) -> Self {
        Self { session, cache }
    }
}
