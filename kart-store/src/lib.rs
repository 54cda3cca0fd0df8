pub mod app_config;
pub mod database;
pub mod memory_repo;
pub mod order_repo;
pub mod redis_repo;

pub use app_config::{Config, TokenStore};
pub use database::DbClient;
pub use memory_repo::InMemoryOrderRepository;
pub use order_repo::PgOrderRepository;
pub use redis_repo::RedisTokenCache;
