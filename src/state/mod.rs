mod guards;
mod secret_manager;
mod token_store;

pub use guards::{InFlight, OperationGuard};
pub use secret_manager::{
    KeyringBackend, MemoryBackend, SecretBackend, SecretError, SecretManager,
    KEYRING_USER_ANILIST_KEY,
};
pub use token_store::TokenStore;
