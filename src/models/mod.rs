pub mod account;

pub use account::{Account, Credential, NewAccount, ValidationErrors};
