//! OpenID 2.0 (and 1.1) message authentication for Providers and relying parties.

pub mod association;
pub mod association_store;
pub mod diffie_hellman;
pub mod key_value_form;
pub mod message;
pub mod protocol;
pub mod provider;
pub mod relying_party;
pub mod signing;

pub use association::{Association, AssociationUsage};
pub use association_store::{
    HandleEncodingAssociationStore, KeyStorageAssociationStore, ProviderAssociationStore,
    association_store_for,
};
pub use message::Message;
pub use protocol::{AssociationType, Mode, ProtocolVersion, SessionType};
pub use provider::OpenIdProvider;
pub use relying_party::RelyingParty;
