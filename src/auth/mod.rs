//! OAuth credential management
//!
//! Tenant resolution, credential persistence and the token lifecycle that
//! every Gmail call depends on.

pub mod manager;
pub mod provider;
pub mod store;
pub mod supabase;
pub mod tenant;

pub use manager::{AuthorizedClient, CredentialState, TokenManager};
pub use provider::{GoogleProvider, OAuthProvider};
pub use store::{CredentialStore, MemoryStore, UserCredentialRecord};
pub use supabase::SupabaseStore;
pub use tenant::{TenantConfig, TenantResolver};
