mod permission;
mod sla;
mod user;
mod values;

pub use permission::{GrantArgs, PermissionCommands};
pub use sla::SlaCommands;
pub use user::UserCommands;
pub use values::{ActionArg, ResourceArg, RoleArg};
