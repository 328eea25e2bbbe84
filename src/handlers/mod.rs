pub mod health;
pub mod login;
pub mod register;
pub mod two_factor;

pub use health::health_check;
pub use login::login;
pub use register::register;
pub use two_factor::{
    get_2fa_status, request_provisioning, reveal_backup_codes, update_2fa, verify_2fa,
};
