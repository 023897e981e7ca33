// Background cache warming.
// Proactively populates the cache with tiered priority ahead of any request.

mod scheduler;

pub use scheduler::{Tier, WarmingScheduler, WarmingStatus, WarmingTask};
