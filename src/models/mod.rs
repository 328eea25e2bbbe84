pub mod site_settings;
pub mod user;
pub mod user_2fa;

pub use site_settings::SiteSettings;
pub use user::User;
pub use user_2fa::{TwoFactorCredential, User2faRow};
