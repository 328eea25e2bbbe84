pub mod auth;
pub mod backup_codes;
pub mod provisioning;
pub mod secret;
pub mod totp;
pub mod two_factor;

pub use auth::AuthService;
pub use backup_codes::BackupCodeManager;
pub use provisioning::ProvisioningService;
pub use secret::SecretCipher;
pub use two_factor::{TransitionOutcome, TwoFactorService, TwoFactorStatus};
