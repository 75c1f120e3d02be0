mod account;
mod init;

pub use account::{cmd_register, cmd_reset_token};
pub use init::cmd_init;
