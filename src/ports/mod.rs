pub mod config_provider;
pub mod work_queue_store;

pub use config_provider::ConfigProvider;
pub use work_queue_store::{FindError, WorkQueueEntityManager};
