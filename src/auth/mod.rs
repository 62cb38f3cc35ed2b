pub mod google;
pub mod identity;
pub mod password;
pub mod tokens;
