mod cipher;
mod record;
mod storage;
mod store;

pub use cipher::RefreshTokenCipher;
pub use record::{TokenMeta, TokenRecord, jwt_expiry};
pub use storage::{FileStorage, MemoryStorage, TokenStorage};
pub use store::TokenStore;
