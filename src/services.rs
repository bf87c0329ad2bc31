pub mod run_sync;
pub mod sync_tree;
