pub mod settled_cache;
