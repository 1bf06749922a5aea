//! In-memory credential store.
//!
//! Owns the three credential maps behind a single reader/writer lock. Handlers only
//! reach the maps through the operations below, so code redemption is one atomic
//! check-and-delete. Expired entries are never swept; they are detected on lookup.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use tokio::sync::RwLock;

use super::clock::{SystemTimeProvider, TimeProvider};
use super::types::{AccessToken, AuthorizationCode, Client};

/// Auth code lifetime: 10 minutes.
pub const AUTH_CODE_LIFETIME_SECS: i64 = 600;
/// Access token lifetime: 24 hours.
pub const ACCESS_TOKEN_LIFETIME_SECS: i64 = 24 * 3600;

const CLIENT_ID_LEN: usize = 32;
const CLIENT_SECRET_LEN: usize = 64;
const AUTH_CODE_LEN: usize = 32;
const ACCESS_TOKEN_LEN: usize = 64;

#[derive(Default)]
struct Maps {
    clients: HashMap<String, Client>,
    auth_codes: HashMap<String, AuthorizationCode>,
    access_tokens: HashMap<String, AccessToken>,
}

/// In-memory OAuth state store.
#[derive(Clone)]
pub struct OAuthStore {
    maps: Arc<RwLock<Maps>>,
    clock: Arc<dyn TimeProvider>,
}

impl OAuthStore {
    /// Create an empty store on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_time_provider(Arc::new(SystemTimeProvider))
    }

    /// Create a store that reads time from `clock`.
    #[must_use]
    pub fn with_time_provider(clock: Arc<dyn TimeProvider>) -> Self {
        Self { maps: Arc::new(RwLock::new(Maps::default())), clock }
    }

    /// Current time according to the store's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Generate `len` URL-safe characters from the OS CSPRNG.
    fn generate_token(len: usize) -> String {
        let mut bytes = vec![0u8; len];
        OsRng.fill_bytes(&mut bytes);
        let mut encoded = URL_SAFE_NO_PAD.encode(bytes);
        encoded.truncate(len);
        encoded
    }

    /// Register a new OAuth client (Dynamic Client Registration).
    pub async fn register_client(
        &self,
        client_name: String,
        redirect_uris: Vec<String>,
    ) -> Client {
        let issued_at = self.now();
        let mut maps = self.maps.write().await;

        let mut client_id = Self::generate_token(CLIENT_ID_LEN);
        while maps.clients.contains_key(&client_id) {
            client_id = Self::generate_token(CLIENT_ID_LEN);
        }

        let client = Client {
            client_id: client_id.clone(),
            client_secret: Self::generate_token(CLIENT_SECRET_LEN),
            client_name,
            redirect_uris,
            issued_at,
        };
        maps.clients.insert(client_id, client.clone());

        client
    }

    /// Look up a client by ID.
    pub async fn get_client(&self, client_id: &str) -> Option<Client> {
        self.maps.read().await.clients.get(client_id).cloned()
    }

    /// Issue an authorization code for `(client_id, redirect_uri)`.
    pub async fn issue_code(&self, client_id: &str, redirect_uri: &str) -> String {
        let code = Self::generate_token(AUTH_CODE_LEN);
        let expires_at = self.now() + TimeDelta::seconds(AUTH_CODE_LIFETIME_SECS);

        self.maps.write().await.auth_codes.insert(
            code.clone(),
            AuthorizationCode {
                code: code.clone(),
                client_id: client_id.to_owned(),
                redirect_uri: redirect_uri.to_owned(),
                expires_at,
            },
        );

        code
    }

    /// Remove and return an authorization code.
    ///
    /// The entry is gone after this call whether or not it has expired; the caller
    /// checks expiry and bindings on the returned record.
    pub async fn redeem_code(&self, code: &str) -> Option<AuthorizationCode> {
        self.maps.write().await.auth_codes.remove(code)
    }

    /// Issue an access token for a client.
    pub async fn issue_token(&self, client_id: &str) -> AccessToken {
        let token = AccessToken {
            token: Self::generate_token(ACCESS_TOKEN_LEN),
            client_id: client_id.to_owned(),
            expires_at: self.now() + TimeDelta::seconds(ACCESS_TOKEN_LIFETIME_SECS),
        };

        self.maps.write().await.access_tokens.insert(token.token.clone(), token.clone());

        token
    }

    /// Look up an access token. The caller checks expiry.
    pub async fn get_token(&self, token: &str) -> Option<AccessToken> {
        self.maps.read().await.access_tokens.get(token).cloned()
    }

    /// Number of `(clients, codes, tokens)` held, expired entries included.
    pub async fn counts(&self) -> (usize, usize, usize) {
        let maps = self.maps.read().await;
        (maps.clients.len(), maps.auth_codes.len(), maps.access_tokens.len())
    }
}

impl Default for OAuthStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OAuthStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthStore").finish_non_exhaustive()
    }
}
