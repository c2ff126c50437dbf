// Account session boundary and thought-signature cache

mod signatures;

pub use signatures::SignatureCache;

use crate::error::Result;
use crate::models::{AccountIdentity, Credentials};
use async_trait::async_trait;

/// The only persistence contract the core depends on.
///
/// The store may be shared with other in-flight calls; the core reads
/// credentials at the start of every logical call and writes refreshed
/// ones back through `save`, never caching them itself.
#[async_trait]
pub trait AccountSession: Send + Sync {
    async fn get_credentials(&self) -> Result<Credentials>;

    /// Persist credentials after a login or refresh.
    async fn save(&self, identity: &AccountIdentity, credentials: &Credentials) -> Result<()>;
}
