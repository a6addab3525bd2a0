//! In-memory storage implementations
//!
//! This module provides in-memory implementations of all storage traits.
//! These implementations are suitable for development, testing, and single
//! process deployments.

mod nonce;
mod oauth1;
mod provider;
mod relying_party;

pub use nonce::MemoryNonceStorage;
pub use oauth1::{MemoryServiceProviderStorage, MemoryTemporaryCredentialStore};
pub use provider::MemoryProviderStorage;
pub use relying_party::MemoryRelyingPartyAssociationStore;
