#[cfg(test)]
pub mod memory;
pub mod site_settings;
pub mod user;
pub mod user_2fa;

#[cfg(test)]
pub use memory::MemoryTwoFactorStore;
pub use site_settings::SiteSettingsRepository;
pub use user::UserRepository;
pub use user_2fa::{PgTwoFactorStore, TransitionGuard, TwoFactorStore};
