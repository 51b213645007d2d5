pub mod ranked_set;
pub mod redis_pool;
