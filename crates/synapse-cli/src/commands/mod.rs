pub mod audit;
pub mod dispatch;
pub mod migrate;
pub mod permission;
pub mod seed;
pub mod serve;
pub mod shared;
pub mod sla;
pub mod user;
