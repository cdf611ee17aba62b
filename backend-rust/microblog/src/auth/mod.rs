use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Relation, SignUpRequest, User, UserSummary};
use crate::store::{Store, StoreError};

/// Header carrying the caller's raw API key
pub const API_KEY_HEADER: &str = "X-API-Key";
/// Header name used by the bundled web client
pub const API_KEY_HEADER_ALIAS: &str = "api-key";

const INVALID_CREDENTIALS: &str = "Invalid credentials.";
const MISSING_KEY: &str = "API key is missing.";

pub struct AuthService {
    store: Arc<Store>,
}

impl AuthService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// One-way digest of an API key. Only this value is ever persisted.
    pub fn hash_key(key: &Uuid) -> String {
        hex::encode(Sha256::digest(key.to_string().as_bytes()))
    }

    /// Register a new user. The caller is not signed in by this.
    pub fn sign_up(&self, request: &SignUpRequest) -> AppResult<UserSummary> {
        request.validate().map_err(AppError::Validation)?;
        let key = Uuid::parse_str(&request.key)
            .map_err(|_| AppError::Validation(vec!["key must be a valid UUID".to_string()]))?;

        let mut user = User::new(request.name.clone(), Self::hash_key(&key));
        self.store.transaction(|s| -> AppResult<()> {
            s.create(&mut user)?;
            Ok(())
        })?;

        log::info!("User {} signed up as {}", user.name, user.id);
        Ok(UserSummary::from(&user))
    }

    /// Resolve a raw key to its user. Malformed and unknown keys fail identically.
    pub fn authenticate(&self, raw_key: &str) -> AppResult<User> {
        let key = Uuid::parse_str(raw_key.trim())
            .map_err(|_| AppError::Unauthenticated(INVALID_CREDENTIALS.to_string()))?;
        let key_hash = Self::hash_key(&key);

        self.store.transaction(|s| -> AppResult<User> {
            s.find_one::<User>(
                "key_hash",
                &key_hash,
                &[Relation::Following, Relation::Followers],
            )
            .map_err(|e| match e {
                StoreError::NotFound(_) => {
                    AppError::Unauthenticated(INVALID_CREDENTIALS.to_string())
                }
                other => other.into(),
            })
        })
    }
}

/// The authenticated caller, resolved from the API key header
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn id(&self) -> &str {
        &self.0.id
    }
}

impl FromRequest for CurrentUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract_current_user(req))
    }
}

fn extract_current_user(req: &HttpRequest) -> AppResult<CurrentUser> {
    let auth_service = req.app_data::<web::Data<AuthService>>().ok_or_else(|| {
        log::error!("AuthService is not registered as app data");
        AppError::Internal
    })?;

    let header = req
        .headers()
        .get(API_KEY_HEADER)
        .or_else(|| req.headers().get(API_KEY_HEADER_ALIAS))
        .ok_or_else(|| AppError::Unauthenticated(MISSING_KEY.to_string()))?;

    let raw_key = header
        .to_str()
        .map_err(|_| AppError::Unauthenticated(INVALID_CREDENTIALS.to_string()))?;

    auth_service.authenticate(raw_key).map(CurrentUser)
}
