mod pools;
mod reports;
mod task_items;

pub use pools::PoolRepository;
pub use reports::ScenarioReportRepository;
pub use task_items::TaskItemRepository;
