#[cfg(feature = "with-redis")]
pub mod redis;

#[cfg(feature = "with-redis")]
use redis::RedisDataSource;

#[cfg(feature = "with-redis")]
/// A datasource service holding the stored clients and revocation marks;
/// users can change to another database, mysql or postgresql .etc. and add
/// corresponding implements.
/// for example: pub type DataSource = MysqlDataSource;
pub type DataSource = RedisDataSource;
